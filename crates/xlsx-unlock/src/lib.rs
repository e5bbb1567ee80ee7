//! Protection removal and document-property editing for XLSX packages.
//!
//! The crate operates on the Open Packaging Convention layer: a workbook is loaded as a map of
//! part names to bytes ([`XlsxPackage`]), only the parts that need changing are parsed and
//! rewritten, and everything else is written back byte-for-byte.
//!
//! Two flows are exposed through [`pipeline`]:
//! - [`unprotect_workbook`] removes `workbookProtection` and every `sheetProtection` marker.
//! - [`read_properties`] / [`write_properties`] read and edit `docProps/core.xml` and
//!   `docProps/app.xml` through the shared [`PropertySet`] shape.
//!
//! Both flows reject files with a non-spreadsheet extension and password-encrypted (OLE
//! compound file) workbooks before attempting to open the zip container.

pub mod cli;
pub mod detect;
mod error;
pub mod package;
pub mod pipeline;
pub mod progress;
pub mod properties;
pub mod protection;
pub mod xml;
mod zip_util;

pub use detect::{classify_header, EncryptionStatus, OLE_MAGIC};
pub use error::{PackageError, UnlockError};
pub use package::{Compression, PackageLimits, WorkbookKind, XlsxPackage};
pub use pipeline::{
    read_properties, unprotect_workbook, write_properties, UnlockOptions, UnprotectOutcome,
};
pub use progress::{NoProgress, ProgressSink, UnprotectStage};
pub use properties::PropertySet;
pub use protection::UnprotectReport;
