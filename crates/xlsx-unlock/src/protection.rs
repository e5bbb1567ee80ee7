//! Removal of workbook- and sheet-level protection markers.
//!
//! Only the `<workbookProtection>` element of `xl/workbook.xml` and the `<sheetProtection>`
//! element of each worksheet part are touched. Parts without a marker keep their original bytes.

use crate::error::PackageError;
use crate::package::XlsxPackage;
use crate::progress::{ProgressSink, UnprotectStage};
use crate::xml::{XmlDomError, XmlPart};

pub const WORKBOOK_PART: &str = "xl/workbook.xml";
pub const WORKSHEETS_DIR: &str = "xl/worksheets/";

/// Element kinds whose presence enforces structural or editing restrictions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtectionMarker {
    Workbook,
    Sheet,
}

impl ProtectionMarker {
    pub fn local_name(self) -> &'static str {
        match self {
            ProtectionMarker::Workbook => "workbookProtection",
            ProtectionMarker::Sheet => "sheetProtection",
        }
    }
}

/// What a protection pass removed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UnprotectReport {
    pub workbook_protection_removed: bool,
    /// Worksheet part names that carried a `sheetProtection` marker, in package order.
    pub unprotected_sheets: Vec<String>,
}

impl UnprotectReport {
    /// True iff at least one marker of either kind existed before stripping.
    pub fn was_protected(&self) -> bool {
        self.workbook_protection_removed || !self.unprotected_sheets.is_empty()
    }
}

/// Remove every `marker` element from an XML part.
///
/// Returns the rewritten bytes, or `None` when the part contained no marker (callers keep the
/// original bytes in that case).
pub fn strip_marker(xml: &[u8], marker: ProtectionMarker) -> Result<Option<Vec<u8>>, XmlDomError> {
    let mut part = XmlPart::parse(xml)?;
    let found = part.descendants_by_local(marker.local_name());
    if found.is_empty() {
        return Ok(None);
    }
    for id in found {
        part.remove(id);
    }
    part.to_xml_bytes().map(Some)
}

/// Strip all protection markers from `package` in place.
///
/// The workbook part is processed first, then each worksheet part in package order. Progress is
/// reported for the analysis stages; the caller owns the loading and repackaging checkpoints.
pub fn strip_protection(
    package: &mut XlsxPackage,
    progress: &mut dyn ProgressSink,
) -> Result<UnprotectReport, PackageError> {
    let mut report = UnprotectReport::default();

    progress.checkpoint(UnprotectStage::AnalyzingWorkbook);
    if let Some(workbook) = package.part(WORKBOOK_PART) {
        let stripped = strip_marker(workbook, ProtectionMarker::Workbook)
            .map_err(|err| PackageError::xml(WORKBOOK_PART, err))?;
        if let Some(bytes) = stripped {
            log::debug!("removed workbook protection from {WORKBOOK_PART}");
            progress.checkpoint(UnprotectStage::RemovingWorkbookProtection);
            package.set_part(WORKBOOK_PART, bytes);
            report.workbook_protection_removed = true;
        }
    } else {
        log::warn!("package has no {WORKBOOK_PART}; skipping workbook protection");
    }

    progress.checkpoint(UnprotectStage::ScanningWorksheets);
    let sheets: Vec<String> = package
        .parts_in_dir(WORKSHEETS_DIR, ".xml")
        .map(str::to_string)
        .collect();
    for name in sheets {
        let Some(bytes) = package.part(&name) else {
            continue;
        };
        let stripped = strip_marker(bytes, ProtectionMarker::Sheet)
            .map_err(|err| PackageError::xml(name.as_str(), err))?;
        if let Some(bytes) = stripped {
            log::debug!("removed sheet protection from {name}");
            package.set_part(name.as_str(), bytes);
            report.unprotected_sheets.push(name);
        }
    }

    if !report.unprotected_sheets.is_empty() {
        progress.checkpoint(UnprotectStage::ProtectionFoundInSheets);
    }

    log::info!(
        "protection scan finished: workbook={}, sheets={}",
        report.workbook_protection_removed,
        report.unprotected_sheets.len()
    );
    Ok(report)
}
