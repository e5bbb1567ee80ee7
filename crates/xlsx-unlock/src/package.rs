use std::collections::BTreeMap;
use std::io::{Cursor, Write};

use zip::write::FileOptions;

use crate::error::PackageError;
use crate::zip_util::{
    part_name_lookup_key, part_names_equivalent, read_entry_with_budget, InflateBudget,
    DEFAULT_MAX_PART_BYTES, DEFAULT_MAX_TOTAL_BYTES,
};

/// Size limits enforced by [`XlsxPackage::from_bytes_limited`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PackageLimits {
    /// Maximum allowed uncompressed bytes for any single part.
    pub max_part_bytes: u64,
    /// Maximum allowed uncompressed bytes across the whole package.
    pub max_total_bytes: u64,
}

impl Default for PackageLimits {
    fn default() -> Self {
        Self {
            max_part_bytes: DEFAULT_MAX_PART_BYTES,
            max_total_bytes: DEFAULT_MAX_TOTAL_BYTES,
        }
    }
}

/// Deflate level used when writing a package back out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Compression {
    /// Lowest deflate level: these tools run interactively and output size is secondary.
    #[default]
    Fastest,
    /// The zip crate's default level.
    Default,
}

impl Compression {
    fn file_options(self) -> FileOptions<'static, ()> {
        let options =
            FileOptions::<()>::default().compression_method(zip::CompressionMethod::Deflated);
        match self {
            Compression::Fastest => options.compression_level(Some(1)),
            Compression::Default => options,
        }
    }
}

/// Spreadsheet package flavours accepted as input, keyed by file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkbookKind {
    /// Standard workbook (`.xlsx`).
    Workbook,
    /// Macro-enabled workbook (`.xlsm`).
    MacroEnabledWorkbook,
    /// Workbook template (`.xltx`).
    Template,
    /// Macro-enabled workbook template (`.xltm`).
    MacroEnabledTemplate,
}

impl WorkbookKind {
    pub fn from_extension(ext: &str) -> Option<Self> {
        const KINDS: [(&str, WorkbookKind); 4] = [
            ("xlsx", WorkbookKind::Workbook),
            ("xlsm", WorkbookKind::MacroEnabledWorkbook),
            ("xltx", WorkbookKind::Template),
            ("xltm", WorkbookKind::MacroEnabledTemplate),
        ];
        KINDS
            .iter()
            .find(|(candidate, _)| ext.eq_ignore_ascii_case(candidate))
            .map(|(_, kind)| *kind)
    }

    /// Canonical lowercase extension, without the dot.
    pub fn extension(self) -> &'static str {
        match self {
            WorkbookKind::Workbook => "xlsx",
            WorkbookKind::MacroEnabledWorkbook => "xlsm",
            WorkbookKind::Template => "xltx",
            WorkbookKind::MacroEnabledTemplate => "xltm",
        }
    }
}

/// In-memory OPC package: every file entry of the source zip, inflated.
///
/// Part bytes are kept verbatim. Editing code replaces whole parts via [`XlsxPackage::set_part`];
/// untouched parts are written back byte-for-byte and in their original entry order.
#[derive(Debug, Clone, Default)]
pub struct XlsxPackage {
    parts: BTreeMap<String, Vec<u8>>,
    order: Vec<String>,
}

impl XlsxPackage {
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, PackageError> {
        Self::from_bytes_limited(bytes, PackageLimits::default())
    }

    /// Load a package while capping the inflated size of each part and of the whole archive.
    pub fn from_bytes_limited(bytes: &[u8], limits: PackageLimits) -> Result<Self, PackageError> {
        let mut zip = zip::ZipArchive::new(Cursor::new(bytes))?;

        let mut package = XlsxPackage::default();
        let mut budget = InflateBudget::new(limits.max_total_bytes);
        for i in 0..zip.len() {
            let file = zip.by_index(i)?;
            if !file.is_file() {
                continue;
            }

            let name = file.name().to_string();
            let size = file.size();
            let buf = read_entry_with_budget(file, size, &name, limits.max_part_bytes, &mut budget)?;
            // Store entries under their exact names; equivalence only applies to lookups.
            if package.parts.insert(name.clone(), buf).is_none() {
                package.order.push(name);
            }
        }

        log::debug!("loaded package with {} parts", package.len());
        Ok(package)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Part names in entry order.
    pub fn part_names(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(String::as_str)
    }

    /// The stored name of the part equivalent to `name`, tolerating a leading `/`, `\`
    /// separators, percent-encoding and ASCII case differences.
    pub fn resolve_part_name(&self, name: &str) -> Option<&str> {
        if let Some((key, _)) = self.parts.get_key_value(name) {
            return Some(key.as_str());
        }
        self.order
            .iter()
            .find(|stored| part_names_equivalent(stored, name))
            .map(String::as_str)
    }

    pub fn part(&self, name: &str) -> Option<&[u8]> {
        let stored = self.resolve_part_name(name)?;
        self.parts.get(stored).map(Vec::as_slice)
    }

    /// Replace the part equivalent to `name` in place, or append a new part under `name`.
    pub fn set_part(&mut self, name: impl Into<String>, bytes: Vec<u8>) {
        let name = name.into();
        if let Some(stored) = self.resolve_part_name(&name).map(str::to_string) {
            self.parts.insert(stored, bytes);
            return;
        }
        self.order.push(name.clone());
        self.parts.insert(name, bytes);
    }

    /// Names of the parts that are direct children of `dir` (e.g. `xl/worksheets/`) with the given
    /// extension, in entry order.
    pub fn parts_in_dir<'a>(
        &'a self,
        dir: &str,
        extension: &'a str,
    ) -> impl Iterator<Item = &'a str> + 'a {
        let dir_key = part_name_lookup_key(dir);
        let extension_key = part_name_lookup_key(extension);
        self.part_names().filter(move |name| {
            crate::zip_util::is_direct_child_with_extension(name, &dir_key, &extension_key)
        })
    }

    pub fn write_to_bytes(&self, compression: Compression) -> Result<Vec<u8>, PackageError> {
        let mut buf = Vec::new();
        self.write_to(&mut buf, compression)?;
        Ok(buf)
    }

    pub fn write_to<W: Write>(&self, mut w: W, compression: Compression) -> Result<(), PackageError> {
        let cursor = Cursor::new(Vec::new());
        let mut zip = zip::ZipWriter::new(cursor);
        let options = compression.file_options();

        for name in &self.order {
            let Some(bytes) = self.parts.get(name) else {
                continue;
            };
            zip.start_file(name.as_str(), options)?;
            zip.write_all(bytes)?;
        }

        let cursor = zip.finish()?;
        w.write_all(&cursor.into_inner())?;
        Ok(())
    }
}
