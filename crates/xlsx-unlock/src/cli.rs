use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{Args as ClapArgs, Parser, Subcommand, ValueEnum};
use serde::Serialize;
use tempfile::NamedTempFile;

use crate::detect;
use crate::error::UnlockError;
use crate::package::Compression;
use crate::pipeline::{self, UnlockOptions};
use crate::progress::UnprotectStage;
use crate::properties::{parse_timestamp, PropertySet};

#[derive(Clone, Copy, Debug, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum CompressionArg {
    Fastest,
    Default,
}

impl From<CompressionArg> for Compression {
    fn from(value: CompressionArg) -> Self {
        match value {
            CompressionArg::Fastest => Compression::Fastest,
            CompressionArg::Default => Compression::Default,
        }
    }
}

#[derive(Parser)]
#[command(
    name = "xlsx_unlock",
    about = "Remove sheet/workbook protection and edit document properties in XLSX packages."
)]
pub struct Args {
    /// Enable debug logging on stderr (overridden by RUST_LOG).
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Deflate level used for the rebuilt package.
    #[arg(long, value_enum, global = true, default_value_t = CompressionArg::Fastest)]
    compression: CompressionArg,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Remove workbook structure protection and every sheet protection.
    Unprotect {
        /// Workbook to unprotect.
        input: PathBuf,

        /// Destination (default: `<name>.unlocked.<ext>` next to the input).
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Print each pipeline checkpoint on stderr.
        #[arg(long)]
        progress: bool,

        /// Output format of the summary.
        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },
    /// Read or edit document properties.
    #[command(subcommand)]
    Props(PropsCommand),
}

#[derive(Subcommand)]
enum PropsCommand {
    /// Print the document properties.
    Show {
        input: PathBuf,

        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },
    /// Write document properties into a copy of the workbook.
    Set {
        input: PathBuf,

        /// Destination workbook.
        #[arg(short, long)]
        output: PathBuf,

        /// JSON object of properties (camelCase keys) applied before the individual flags.
        #[arg(long, value_name = "PATH")]
        json: Option<PathBuf>,

        #[command(flatten)]
        fields: PropertyArgs,
    },
}

/// Individual property flags. An empty string clears a text property.
#[derive(ClapArgs, Debug, Default)]
struct PropertyArgs {
    #[arg(long)]
    title: Option<String>,
    #[arg(long)]
    subject: Option<String>,
    #[arg(long)]
    creator: Option<String>,
    #[arg(long)]
    keywords: Option<String>,
    #[arg(long)]
    description: Option<String>,
    #[arg(long)]
    last_modified_by: Option<String>,
    #[arg(long)]
    category: Option<String>,
    #[arg(long)]
    content_status: Option<String>,
    #[arg(long)]
    revision: Option<String>,
    #[arg(long)]
    version: Option<String>,
    #[arg(long)]
    program_name: Option<String>,
    #[arg(long)]
    company: Option<String>,
    #[arg(long)]
    manager: Option<String>,
    #[arg(long)]
    language: Option<String>,
    #[arg(long, value_parser = parse_cli_timestamp)]
    created: Option<DateTime<Utc>>,
    #[arg(long, value_parser = parse_cli_timestamp)]
    modified: Option<DateTime<Utc>>,
    #[arg(long, value_parser = parse_cli_timestamp)]
    last_printed: Option<DateTime<Utc>>,
    #[arg(long)]
    scale: Option<bool>,
    #[arg(long)]
    links_dirty: Option<bool>,
}

impl PropertyArgs {
    fn into_property_set(self) -> PropertySet {
        PropertySet {
            title: self.title,
            subject: self.subject,
            creator: self.creator,
            keywords: self.keywords,
            description: self.description,
            last_modified_by: self.last_modified_by,
            category: self.category,
            content_status: self.content_status,
            revision: self.revision,
            version: self.version,
            program_name: self.program_name,
            company: self.company,
            manager: self.manager,
            language: self.language,
            created: self.created,
            modified: self.modified,
            last_printed: self.last_printed,
            scale: self.scale,
            links_dirty: self.links_dirty,
        }
    }
}

fn parse_cli_timestamp(input: &str) -> std::result::Result<DateTime<Utc>, String> {
    parse_timestamp(input).ok_or_else(|| {
        format!("invalid timestamp '{input}' (expected RFC 3339 with a four-digit year)")
    })
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct JsonUnprotect<'a> {
    input: &'a str,
    output: &'a str,
    was_protected: bool,
    workbook_protection_removed: bool,
    unprotected_sheets: &'a [String],
}

pub fn run() -> Result<()> {
    let args = Args::parse();
    run_with_args(args)
}

pub fn run_with_args(args: Args) -> Result<()> {
    init_logging(args.verbose);
    let options = UnlockOptions {
        compression: args.compression.into(),
        ..UnlockOptions::default()
    };

    match args.command {
        Command::Unprotect {
            input,
            output,
            progress,
            format,
        } => unprotect(&input, output, progress, format, &options),
        Command::Props(PropsCommand::Show { input, format }) => {
            show_properties(&input, format, &options)
        }
        Command::Props(PropsCommand::Set {
            input,
            output,
            json,
            fields,
        }) => set_properties(&input, &output, json.as_deref(), fields, &options),
    }
}

fn init_logging(verbose: bool) {
    let default_filter = if verbose { "debug" } else { "warn" };
    // A second initialization (e.g. from tests driving `run_with_args`) is harmless.
    let env = env_logger::Env::default().default_filter_or(default_filter);
    let _ = env_logger::Builder::from_env(env)
        .format_timestamp(None)
        .try_init();
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Read the input workbook, refusing encrypted containers after looking at the signature only.
fn read_input(path: &Path) -> Result<Vec<u8>> {
    let mut file =
        File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    if detect::sniff_reader(&mut file)?.is_encrypted() {
        return Err(UnlockError::EncryptedPackage.into());
    }
    let mut bytes = Vec::new();
    file.read_to_end(&mut bytes)
        .with_context(|| format!("failed to read {}", path.display()))?;
    Ok(bytes)
}

/// `book.xlsx` -> `book.unlocked.xlsx`, in the same directory.
fn default_output_path(input: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "workbook".to_string());
    let name = match input.extension() {
        Some(ext) => format!("{stem}.unlocked.{}", ext.to_string_lossy()),
        None => format!("{stem}.unlocked"),
    };
    input.with_file_name(name)
}

fn unprotect(
    input: &Path,
    output: Option<PathBuf>,
    progress: bool,
    format: OutputFormat,
    options: &UnlockOptions,
) -> Result<()> {
    let name = file_name(input);
    pipeline::check_extension(&name)?;
    let bytes = read_input(input)?;

    let mut sink = |stage: UnprotectStage| {
        log::info!("{}% {}", stage.percent(), stage.label());
        if progress {
            eprintln!("[{:>3}%] {}", stage.percent(), stage.label());
        }
    };
    let outcome = pipeline::unprotect_workbook_with_options(&name, &bytes, options, &mut sink)?;

    let output = output.unwrap_or_else(|| default_output_path(input));
    write_atomically(&output, &outcome.bytes)?;

    let input_display = input.to_string_lossy();
    let output_display = output.to_string_lossy();
    match format {
        OutputFormat::Text => {
            if outcome.was_protected() {
                println!("Removed protection from {input_display}");
                if outcome.report.workbook_protection_removed {
                    println!("  workbook structure: unprotected");
                }
                for sheet in &outcome.report.unprotected_sheets {
                    println!("  sheet: {sheet}");
                }
            } else {
                println!("No protection found in {input_display}");
            }
            println!("Wrote {output_display}");
        }
        OutputFormat::Json => {
            let report = JsonUnprotect {
                input: &input_display,
                output: &output_display,
                was_protected: outcome.was_protected(),
                workbook_protection_removed: outcome.report.workbook_protection_removed,
                unprotected_sheets: &outcome.report.unprotected_sheets,
            };
            print_json(&report)?;
        }
    }
    Ok(())
}

fn show_properties(input: &Path, format: OutputFormat, options: &UnlockOptions) -> Result<()> {
    let name = file_name(input);
    pipeline::check_extension(&name)?;
    let bytes = read_input(input)?;
    let props = pipeline::read_properties_with_options(&name, &bytes, options)?;

    match format {
        OutputFormat::Json => print_json(&props)?,
        OutputFormat::Text => {
            let serde_json::Value::Object(fields) = serde_json::to_value(&props)? else {
                anyhow::bail!("property set did not serialize to an object");
            };
            if fields.is_empty() {
                println!("(no document properties)");
            }
            for (key, value) in fields {
                match value {
                    serde_json::Value::String(text) => println!("{key}: {text}"),
                    other => println!("{key}: {other}"),
                }
            }
        }
    }
    Ok(())
}

fn set_properties(
    input: &Path,
    output: &Path,
    json: Option<&Path>,
    fields: PropertyArgs,
    options: &UnlockOptions,
) -> Result<()> {
    let name = file_name(input);
    pipeline::check_extension(&name)?;

    let mut edits = match json {
        Some(path) => {
            let text = fs::read_to_string(path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            serde_json::from_str::<PropertySet>(&text)
                .with_context(|| format!("invalid property JSON in {}", path.display()))?
        }
        None => PropertySet::default(),
    };
    edits.merge(&fields.into_property_set());
    if edits.is_empty() {
        log::warn!("no properties given; the workbook is rewritten unchanged");
    }

    let bytes = read_input(input)?;
    let rebuilt = pipeline::write_properties_with_options(&name, &bytes, &edits, options)?;
    write_atomically(output, &rebuilt)?;
    println!("Wrote {}", output.display());
    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let stdout = io::stdout();
    let mut handle = stdout.lock();
    serde_json::to_writer_pretty(&mut handle, value)?;
    handle.write_all(b"\n")?;
    Ok(())
}

/// Write `bytes` to a temp file next to `dest` and rename it into place, so a failed run never
/// leaves a truncated workbook behind.
fn write_atomically(dest: &Path, bytes: &[u8]) -> Result<()> {
    let dir = dest
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(dir).with_context(|| format!("failed to create {}", dir.display()))?;

    let mut tmp = NamedTempFile::new_in(dir)
        .with_context(|| format!("failed to create a temp file in {}", dir.display()))?;
    let file: &mut File = tmp.as_file_mut();
    file.write_all(bytes)?;
    file.flush()?;
    file.sync_all()?;
    tmp.persist(dest)
        .map_err(|err| err.error)
        .with_context(|| format!("failed to write {}", dest.display()))?;
    Ok(())
}
