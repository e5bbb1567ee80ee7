mod common;

use std::fs;
use std::path::Path;
use std::process::{Command, Output};

use common::{build_workbook, part_str, read_zip, Protection};
use xlsx_unlock::OLE_MAGIC;

fn run(args: &[&str], cwd: &Path) -> Output {
    Command::new(env!("CARGO_BIN_EXE_xlsx_unlock"))
        .args(args)
        .current_dir(cwd)
        .env_remove("RUST_LOG")
        .output()
        .expect("run xlsx_unlock")
}

fn describe(output: &Output) -> String {
    format!(
        "status: {}\nstdout:\n{}\nstderr:\n{}",
        output.status,
        String::from_utf8_lossy(&output.stdout),
        String::from_utf8_lossy(&output.stderr)
    )
}

#[test]
fn unprotect_writes_default_output_next_to_input() {
    let dir = tempfile::tempdir().unwrap();
    let input = build_workbook(Protection {
        workbook: true,
        sheets: [false, true, false],
    });
    fs::write(dir.path().join("book.xlsx"), &input).unwrap();

    let output = run(&["unprotect", "book.xlsx", "--progress"], dir.path());
    assert!(output.status.success(), "{}", describe(&output));

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Removed protection"), "{stdout}");
    assert!(stdout.contains("xl/worksheets/sheet2.xml"), "{stdout}");
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("[100%] Completed"), "{stderr}");

    let written = fs::read(dir.path().join("book.unlocked.xlsx")).unwrap();
    let parts = read_zip(&written);
    assert!(!part_str(&parts, "xl/workbook.xml").contains("workbookProtection"));
    assert!(!part_str(&parts, "xl/worksheets/sheet2.xml").contains("sheetProtection"));

    // The input is never modified.
    assert_eq!(fs::read(dir.path().join("book.xlsx")).unwrap(), input);
}

#[test]
fn unprotect_json_summary() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("clean.xlsx"), build_workbook(Protection::default())).unwrap();

    let output = run(
        &["unprotect", "clean.xlsx", "-o", "out/clean.xlsx", "--format", "json"],
        dir.path(),
    );
    assert!(output.status.success(), "{}", describe(&output));

    let summary: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(summary["wasProtected"], serde_json::json!(false));
    assert_eq!(summary["unprotectedSheets"], serde_json::json!([]));
    assert!(dir.path().join("out/clean.xlsx").exists());
}

#[test]
fn encrypted_input_fails_with_guidance_and_writes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let mut bytes = OLE_MAGIC.to_vec();
    bytes.resize(4096, 0);
    fs::write(dir.path().join("secret.xlsx"), &bytes).unwrap();

    let output = run(&["unprotect", "secret.xlsx"], dir.path());
    assert_eq!(output.status.code(), Some(2), "{}", describe(&output));
    let stderr = String::from_utf8_lossy(&output.stderr).to_ascii_lowercase();
    assert!(stderr.contains("password"), "{stderr}");
    assert!(!dir.path().join("secret.unlocked.xlsx").exists());
}

#[test]
fn unsupported_extension_exit_code() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("old.xls"), b"whatever").unwrap();
    let output = run(&["props", "show", "old.xls"], dir.path());
    assert_eq!(output.status.code(), Some(3), "{}", describe(&output));
}

#[test]
fn props_set_then_show() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("book.xlsx"), build_workbook(Protection::default())).unwrap();
    fs::write(
        dir.path().join("props.json"),
        r#"{"title":"From JSON","company":"Acme","scale":true}"#,
    )
    .unwrap();

    let output = run(
        &[
            "props",
            "set",
            "book.xlsx",
            "-o",
            "tagged.xlsx",
            "--json",
            "props.json",
            "--title",
            "From flags",
            "--modified",
            "2024-06-01T12:00:00Z",
        ],
        dir.path(),
    );
    assert!(output.status.success(), "{}", describe(&output));

    let output = run(&["props", "show", "tagged.xlsx", "--format", "json"], dir.path());
    assert!(output.status.success(), "{}", describe(&output));
    let props: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(
        props,
        serde_json::json!({
            "title": "From flags",
            "company": "Acme",
            "scale": true,
            "modified": "2024-06-01T12:00:00Z"
        })
    );

    let output = run(&["props", "show", "tagged.xlsx"], dir.path());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("company: Acme"), "{stdout}");
    assert!(stdout.contains("title: From flags"), "{stdout}");
}
