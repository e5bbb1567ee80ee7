use std::io::Read;

use crate::error::PackageError;

/// Default maximum uncompressed size of any single entry inflated into memory.
pub const DEFAULT_MAX_PART_BYTES: u64 = 256 * 1024 * 1024; // 256MiB

/// Default maximum total uncompressed bytes across all entries of one package.
pub const DEFAULT_MAX_TOTAL_BYTES: u64 = 512 * 1024 * 1024; // 512MiB

fn hex_val(b: u8) -> Option<u8> {
    match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'a'..=b'f' => Some(b - b'a' + 10),
        b'A'..=b'F' => Some(b - b'A' + 10),
        _ => None,
    }
}

/// Canonical key for a part name, used for case- and separator-insensitive lookup.
///
/// - percent-decodes valid `%xx` sequences
/// - strips leading `/` or `\` separators (also when percent-encoded)
/// - normalizes `\` to `/`
/// - ASCII-lowercases
///
/// The key is a byte vector because percent-decoding may produce bytes that are not UTF-8.
pub(crate) fn part_name_lookup_key(name: &str) -> Vec<u8> {
    let mut bytes = name.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut leading = true;
    while let Some(&b) = bytes.first() {
        let hi = bytes.get(1).copied().and_then(hex_val);
        let lo = bytes.get(2).copied().and_then(hex_val);
        let decoded = match (b, hi, lo) {
            (b'%', Some(hi), Some(lo)) => {
                bytes = &bytes[3..];
                (hi << 4) | lo
            }
            _ => {
                bytes = &bytes[1..];
                b
            }
        };

        if leading && matches!(decoded, b'/' | b'\\') {
            continue;
        }
        leading = false;

        out.push(if decoded == b'\\' {
            b'/'
        } else {
            decoded.to_ascii_lowercase()
        });
    }
    out
}

pub(crate) fn part_names_equivalent(a: &str, b: &str) -> bool {
    a == b || part_name_lookup_key(a) == part_name_lookup_key(b)
}

/// Whether `name` is a direct child of the directory whose lookup key is `dir_key` (which must end
/// in `/`) and carries the given lowercase extension.
pub(crate) fn is_direct_child_with_extension(name: &str, dir_key: &[u8], extension: &[u8]) -> bool {
    let key = part_name_lookup_key(name);
    let Some(rest) = key.strip_prefix(dir_key) else {
        return false;
    };
    !rest.contains(&b'/') && rest.len() > extension.len() && rest.ends_with(extension)
}

/// Running total of bytes inflated from one archive.
#[derive(Debug, Clone)]
pub(crate) struct InflateBudget {
    max_total_bytes: u64,
    used_bytes: u64,
}

impl InflateBudget {
    pub(crate) fn new(max_total_bytes: u64) -> Self {
        Self {
            max_total_bytes,
            used_bytes: 0,
        }
    }

    fn remaining_bytes(&self) -> u64 {
        self.max_total_bytes.saturating_sub(self.used_bytes)
    }

    fn over_budget(&self, additional: u64) -> PackageError {
        PackageError::PackageTooLarge {
            total: self.used_bytes.saturating_add(additional),
            max: self.max_total_bytes,
        }
    }
}

/// Inflate one archive entry, enforcing both the per-part limit and the shared budget.
///
/// The declared uncompressed size is only a fast path: reads are capped at `limit + 1` bytes so a
/// forged size field cannot make us inflate more than the limit allows.
pub(crate) fn read_entry_with_budget<R: Read>(
    entry: R,
    declared: u64,
    part: &str,
    max_part_bytes: u64,
    budget: &mut InflateBudget,
) -> Result<Vec<u8>, PackageError> {
    let effective_max = max_part_bytes.min(budget.remaining_bytes());
    let limited_by_total = effective_max < max_part_bytes;

    if declared > max_part_bytes {
        return Err(PackageError::PartTooLarge {
            part: part.to_string(),
            size: declared,
            max: max_part_bytes,
        });
    }
    if limited_by_total && declared > effective_max {
        return Err(budget.over_budget(declared));
    }

    let mut buf = Vec::new();
    entry
        .take(effective_max.saturating_add(1))
        .read_to_end(&mut buf)?;

    let observed = buf.len() as u64;
    if observed > effective_max {
        if limited_by_total {
            return Err(budget.over_budget(observed));
        }
        return Err(PackageError::PartTooLarge {
            part: part.to_string(),
            size: observed,
            max: max_part_bytes,
        });
    }

    budget.used_bytes = budget.used_bytes.saturating_add(observed);
    Ok(buf)
}
