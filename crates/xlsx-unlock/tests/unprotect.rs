mod common;

use std::io::Cursor;

use common::{build_workbook, part, part_str, read_zip, workbook_parts, Protection};
use pretty_assertions::assert_eq;
use xlsx_unlock::{unprotect_workbook, NoProgress, UnprotectStage};

fn run(bytes: &[u8]) -> (xlsx_unlock::UnprotectOutcome, Vec<UnprotectStage>) {
    let mut stages = Vec::new();
    let mut sink = |stage: UnprotectStage| stages.push(stage);
    let outcome = unprotect_workbook("book.xlsx", bytes, &mut sink).expect("unprotect");
    (outcome, stages)
}

#[test]
fn unprotected_package_is_reported_clean_and_content_is_unchanged() {
    let source = workbook_parts(Protection::default());
    let (outcome, stages) = run(&common::build_zip(&source));

    assert!(!outcome.was_protected());
    assert_eq!(read_zip(&outcome.bytes), source);
    assert_eq!(
        stages,
        vec![
            UnprotectStage::ReadingStructure,
            UnprotectStage::AnalyzingWorkbook,
            UnprotectStage::ScanningWorksheets,
            UnprotectStage::Repackaging,
            UnprotectStage::Completed,
        ]
    );
}

#[test]
fn workbook_marker_only() {
    let input = build_workbook(Protection {
        workbook: true,
        sheets: [false; 3],
    });
    let (outcome, stages) = run(&input);

    assert!(outcome.was_protected());
    assert!(outcome.report.workbook_protection_removed);
    assert!(outcome.report.unprotected_sheets.is_empty());

    let out = read_zip(&outcome.bytes);
    let workbook = part_str(&out, "xl/workbook.xml");
    assert!(!workbook.contains("workbookProtection"));
    assert!(workbook.contains(r#"<sheet name="Summary &amp; Notes" sheetId="2" r:id="rId2"/>"#));
    roxmltree::Document::parse(workbook).expect("workbook stays well-formed");

    assert_eq!(
        stages,
        vec![
            UnprotectStage::ReadingStructure,
            UnprotectStage::AnalyzingWorkbook,
            UnprotectStage::RemovingWorkbookProtection,
            UnprotectStage::ScanningWorksheets,
            UnprotectStage::Repackaging,
            UnprotectStage::Completed,
        ]
    );
}

#[test]
fn protected_sheets_are_stripped_and_others_stay_byte_identical() {
    let source = workbook_parts(Protection {
        workbook: false,
        sheets: [true, false, true],
    });
    let (outcome, stages) = run(&common::build_zip(&source));

    assert!(outcome.was_protected());
    assert!(!outcome.report.workbook_protection_removed);
    assert_eq!(
        outcome.report.unprotected_sheets,
        vec!["xl/worksheets/sheet1.xml", "xl/worksheets/sheet3.xml"]
    );
    assert!(stages.contains(&UnprotectStage::ProtectionFoundInSheets));
    assert!(!stages.contains(&UnprotectStage::RemovingWorkbookProtection));

    let out = read_zip(&outcome.bytes);
    for name in ["xl/worksheets/sheet1.xml", "xl/worksheets/sheet3.xml"] {
        let text = part_str(&out, name);
        assert!(!text.contains("sheetProtection"), "{name} still protected");
        assert!(text.contains("<pageMargins"), "{name} lost content");
    }
    for name in [
        "xl/worksheets/sheet2.xml",
        "xl/workbook.xml",
        "xl/styles.xml",
        "[Content_Types].xml",
        "_rels/.rels",
        "xl/_rels/workbook.xml.rels",
    ] {
        assert_eq!(part(&out, name), part(&source, name), "{name} changed");
    }

    let names: Vec<&str> = out.iter().map(|(n, _)| n.as_str()).collect();
    let source_names: Vec<&str> = source.iter().map(|(n, _)| n.as_str()).collect();
    assert_eq!(names, source_names);
}

#[test]
fn stripping_is_idempotent() {
    let input = build_workbook(Protection {
        workbook: true,
        sheets: [true, true, true],
    });
    let (first, _) = run(&input);
    assert!(first.was_protected());
    assert_eq!(first.report.unprotected_sheets.len(), 3);

    let (second, _) = run(&first.bytes);
    assert!(!second.was_protected());
    assert_eq!(read_zip(&second.bytes), read_zip(&first.bytes));
}

#[test]
fn output_uses_deflate_for_every_entry() {
    let input = build_workbook(Protection {
        workbook: true,
        sheets: [true, false, false],
    });
    let outcome = unprotect_workbook("book.xlsm", &input, &mut NoProgress).unwrap();
    let mut archive = zip::ZipArchive::new(Cursor::new(outcome.bytes)).unwrap();
    for i in 0..archive.len() {
        let file = archive.by_index(i).unwrap();
        assert_eq!(file.compression(), zip::CompressionMethod::Deflated, "{}", file.name());
    }
}

#[test]
fn progress_percentages_are_monotonic() {
    let input = build_workbook(Protection {
        workbook: true,
        sheets: [true, true, false],
    });
    let (_, stages) = run(&input);
    let percents: Vec<u8> = stages.iter().map(|s| s.percent()).collect();
    assert_eq!(percents, vec![10, 25, 40, 55, 70, 90, 100]);
}
