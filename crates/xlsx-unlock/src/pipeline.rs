//! End-to-end operations over package bytes.
//!
//! Every entry point runs the same gate first: extension check, then the encryption signature, then
//! the zip load. Output bytes are only produced once every stage has succeeded.

use std::path::Path;

use crate::detect::ensure_not_encrypted;
use crate::error::UnlockError;
use crate::package::{Compression, PackageLimits, WorkbookKind, XlsxPackage};
use crate::progress::{ProgressSink, UnprotectStage};
use crate::properties::{self, PropertySet};
use crate::protection::{self, UnprotectReport};

/// Knobs shared by every pipeline operation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UnlockOptions {
    pub limits: PackageLimits,
    pub compression: Compression,
}

/// Result of [`unprotect_workbook`].
#[derive(Debug, Clone)]
pub struct UnprotectOutcome {
    pub bytes: Vec<u8>,
    pub report: UnprotectReport,
}

impl UnprotectOutcome {
    pub fn was_protected(&self) -> bool {
        self.report.was_protected()
    }
}

/// Reject file names whose extension is not a zip-based spreadsheet package.
pub fn check_extension(file_name: &str) -> Result<WorkbookKind, UnlockError> {
    let extension = Path::new(file_name)
        .extension()
        .and_then(|ext| ext.to_str())
        .unwrap_or_default();
    WorkbookKind::from_extension(extension).ok_or_else(|| UnlockError::UnsupportedFormat {
        file_name: file_name.to_string(),
        extension: extension.to_string(),
    })
}

fn load_package(bytes: &[u8], options: &UnlockOptions) -> Result<XlsxPackage, UnlockError> {
    ensure_not_encrypted(bytes)?;
    Ok(XlsxPackage::from_bytes_limited(bytes, options.limits)?)
}

/// Remove workbook and sheet protection from the package in `bytes`.
pub fn unprotect_workbook(
    file_name: &str,
    bytes: &[u8],
    progress: &mut dyn ProgressSink,
) -> Result<UnprotectOutcome, UnlockError> {
    unprotect_workbook_with_options(file_name, bytes, &UnlockOptions::default(), progress)
}

pub fn unprotect_workbook_with_options(
    file_name: &str,
    bytes: &[u8],
    options: &UnlockOptions,
    progress: &mut dyn ProgressSink,
) -> Result<UnprotectOutcome, UnlockError> {
    let kind = check_extension(file_name)?;
    log::info!("unprotecting {file_name} ({kind:?}, {} bytes)", bytes.len());

    progress.checkpoint(UnprotectStage::ReadingStructure);
    let mut package = load_package(bytes, options)?;

    let report = protection::strip_protection(&mut package, progress)?;

    progress.checkpoint(UnprotectStage::Repackaging);
    let bytes = package.write_to_bytes(options.compression)?;
    progress.checkpoint(UnprotectStage::Completed);

    Ok(UnprotectOutcome { bytes, report })
}

/// Read document metadata. Missing or malformed property parts yield empty fields, but the
/// package itself must load.
pub fn read_properties(file_name: &str, bytes: &[u8]) -> Result<PropertySet, UnlockError> {
    read_properties_with_options(file_name, bytes, &UnlockOptions::default())
}

pub fn read_properties_with_options(
    file_name: &str,
    bytes: &[u8],
    options: &UnlockOptions,
) -> Result<PropertySet, UnlockError> {
    check_extension(file_name)?;
    let package = load_package(bytes, options)?;
    Ok(properties::read_properties(&package))
}

/// Apply `edits` to the document metadata and return the rebuilt package.
pub fn write_properties(
    file_name: &str,
    bytes: &[u8],
    edits: &PropertySet,
) -> Result<Vec<u8>, UnlockError> {
    write_properties_with_options(file_name, bytes, edits, &UnlockOptions::default())
}

pub fn write_properties_with_options(
    file_name: &str,
    bytes: &[u8],
    edits: &PropertySet,
    options: &UnlockOptions,
) -> Result<Vec<u8>, UnlockError> {
    check_extension(file_name)?;
    let mut package = load_package(bytes, options)?;
    properties::write_properties(&mut package, edits)?;
    Ok(package.write_to_bytes(options.compression)?)
}
