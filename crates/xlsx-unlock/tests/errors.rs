mod common;

use common::{build_workbook, build_zip, workbook_parts, Protection};
use proptest::prelude::*;
use xlsx_unlock::{
    read_properties, unprotect_workbook, write_properties, NoProgress, PropertySet, UnlockError,
    OLE_MAGIC,
};

fn all_operations(file_name: &str, bytes: &[u8]) -> Vec<UnlockError> {
    vec![
        unprotect_workbook(file_name, bytes, &mut NoProgress).unwrap_err(),
        read_properties(file_name, bytes).unwrap_err(),
        write_properties(file_name, bytes, &PropertySet::default()).unwrap_err(),
    ]
}

#[test]
fn non_zip_bytes_are_corrupt_rather_than_encrypted() {
    for err in all_operations("book.xlsx", &[0, 0, 0, 0]) {
        assert!(matches!(err, UnlockError::CorruptPackage { .. }), "{err:?}");
    }
}

#[test]
fn truncated_signature_is_not_treated_as_encrypted() {
    for err in all_operations("book.xlsx", &OLE_MAGIC[..6]) {
        assert!(matches!(err, UnlockError::CorruptPackage { .. }), "{err:?}");
    }
}

#[test]
fn wrong_extension_is_rejected_even_for_valid_packages() {
    let input = build_workbook(Protection::default());
    for err in all_operations("book.xls", &input) {
        assert!(matches!(err, UnlockError::UnsupportedFormat { .. }), "{err:?}");
    }
    for err in all_operations("book.csv", &OLE_MAGIC) {
        assert!(matches!(err, UnlockError::UnsupportedFormat { .. }), "{err:?}");
    }
}

#[test]
fn malformed_worksheet_fails_the_unprotect_flow_as_corrupt() {
    let mut parts = workbook_parts(Protection::default());
    for (name, bytes) in parts.iter_mut() {
        if name == "xl/worksheets/sheet2.xml" {
            *bytes = b"<worksheet><sheetData></worksheet>".to_vec();
        }
    }
    let err = unprotect_workbook("book.xlsx", &build_zip(&parts), &mut NoProgress).unwrap_err();
    match err {
        UnlockError::CorruptPackage { message } => {
            assert!(message.contains("xl/worksheets/sheet2.xml"), "{message}")
        }
        other => panic!("expected CorruptPackage, got {other:?}"),
    }
}

#[test]
fn malformed_property_part_does_not_break_reading() {
    let mut parts = workbook_parts(Protection::default());
    parts.push(("docProps/core.xml".to_string(), b"<cp:coreProperties>".to_vec()));
    let props = read_properties("book.xlsx", &build_zip(&parts)).unwrap();
    assert!(props.is_empty());
}

#[test]
fn timestamps_past_year_9999_are_refused_by_the_writer() {
    let input = build_workbook(Protection::default());
    let edits = PropertySet {
        modified: chrono::DateTime::from_timestamp(253_402_300_800, 0),
        ..PropertySet::default()
    };
    assert!(edits.modified.is_some());
    match write_properties("book.xlsx", &input, &edits).unwrap_err() {
        UnlockError::Failed { message } => assert!(message.contains("modified"), "{message}"),
        other => panic!("expected Failed, got {other:?}"),
    }
}

proptest! {
    #[test]
    fn ole_signature_always_means_encrypted(tail in proptest::collection::vec(any::<u8>(), 0..512)) {
        let mut bytes = OLE_MAGIC.to_vec();
        bytes.extend_from_slice(&tail);
        for err in all_operations("secret.xlsx", &bytes) {
            prop_assert!(matches!(err, UnlockError::EncryptedPackage), "{:?}", err);
        }
    }
}
