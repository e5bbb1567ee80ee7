//! Encrypted-package detection.
//!
//! Excel saves password-to-open workbooks as an OLE compound file wrapping the encrypted zip, so
//! the container signature alone tells us the file cannot be processed. Nothing past the first
//! eight bytes is inspected.

use std::io::{Read, Seek, SeekFrom};

use crate::error::UnlockError;

/// OLE compound file signature (`D0 CF 11 E0 A1 B1 1A E1`).
pub const OLE_MAGIC: [u8; 8] = [0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncryptionStatus {
    NotEncrypted,
    Encrypted,
}

impl EncryptionStatus {
    pub fn is_encrypted(self) -> bool {
        self == EncryptionStatus::Encrypted
    }
}

/// Classify a file by its leading bytes. Inputs shorter than the signature are never encrypted.
pub fn classify_header(bytes: &[u8]) -> EncryptionStatus {
    match bytes.get(..OLE_MAGIC.len()) {
        Some(header) if header == OLE_MAGIC => EncryptionStatus::Encrypted,
        _ => EncryptionStatus::NotEncrypted,
    }
}

/// Classify a seekable stream, restoring its position to the start afterwards.
pub fn sniff_reader<R: Read + Seek>(reader: &mut R) -> std::io::Result<EncryptionStatus> {
    reader.seek(SeekFrom::Start(0))?;
    let mut header = [0u8; 8];
    let mut filled = 0;
    while filled < header.len() {
        let n = reader.read(&mut header[filled..])?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    reader.seek(SeekFrom::Start(0))?;
    Ok(classify_header(&header[..filled]))
}

/// Reject encrypted packages before any zip parsing is attempted.
pub fn ensure_not_encrypted(bytes: &[u8]) -> Result<(), UnlockError> {
    if classify_header(bytes).is_encrypted() {
        log::debug!("input carries the OLE compound file signature");
        return Err(UnlockError::EncryptedPackage);
    }
    Ok(())
}
