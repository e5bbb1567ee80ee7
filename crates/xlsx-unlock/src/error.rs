use thiserror::Error;

use crate::xml::XmlDomError;

/// Low-level failures while loading, editing or writing a package.
#[derive(Debug, Error)]
pub enum PackageError {
    #[error("zip error: {0}")]
    Zip(#[from] zip::result::ZipError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse {part}: {source}")]
    Xml {
        part: String,
        #[source]
        source: XmlDomError,
    },
    #[error("package part is too large to load safely: {part} is {size} bytes (max {max} bytes)")]
    PartTooLarge { part: String, size: u64, max: u64 },
    #[error("package is too large to load safely: {total} bytes uncompressed (max {max} bytes)")]
    PackageTooLarge { total: u64, max: u64 },
    #[error("{property} timestamp {value} is outside years 0000-9999 and cannot be stored")]
    TimestampOutOfRange {
        property: &'static str,
        value: String,
    },
}

impl PackageError {
    pub(crate) fn xml(part: impl Into<String>, source: XmlDomError) -> Self {
        PackageError::Xml {
            part: part.into(),
            source,
        }
    }
}

/// Failures surfaced to callers of the pipeline.
///
/// Only the first two variants carry user-facing guidance; everything else is reported as a corrupt
/// package or a generic failure with the underlying message attached.
#[derive(Debug, Error)]
pub enum UnlockError {
    #[error(
        "this workbook is encrypted with an opening password; remove the password in Excel \
         (File > Info > Protect Workbook > Encrypt with Password) and try again"
    )]
    EncryptedPackage,
    #[error("unsupported file format `{extension}` for `{file_name}`; expected an Excel workbook (.xlsx)")]
    UnsupportedFormat { file_name: String, extension: String },
    #[error("the workbook could not be read; the file may be corrupted or encrypted ({message})")]
    CorruptPackage { message: String },
    #[error("failed to process the workbook: {message}")]
    Failed { message: String },
}

impl UnlockError {
    /// Wrap an arbitrary failure into the generic variant. Errors that already are an
    /// [`UnlockError`] are returned unchanged.
    pub fn wrap<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        let boxed: Box<dyn std::error::Error + Send + Sync> = Box::new(err);
        match boxed.downcast::<UnlockError>() {
            Ok(err) => *err,
            Err(other) => UnlockError::Failed {
                message: other.to_string(),
            },
        }
    }

    /// Process exit code used by the command-line front end.
    pub fn exit_code(&self) -> i32 {
        match self {
            UnlockError::EncryptedPackage => 2,
            UnlockError::UnsupportedFormat { .. } => 3,
            UnlockError::CorruptPackage { .. } => 4,
            UnlockError::Failed { .. } => 1,
        }
    }
}

impl From<PackageError> for UnlockError {
    fn from(err: PackageError) -> Self {
        match err {
            // Decompression failures surface as io errors from the zip reader.
            PackageError::Zip(_) | PackageError::Io(_) | PackageError::Xml { .. } => {
                UnlockError::CorruptPackage {
                    message: err.to_string(),
                }
            }
            other => UnlockError::wrap(other),
        }
    }
}
