use std::io::Read;

use crate::XlsxError;

/// Largest uncompressed size accepted for a single part.
///
/// Guards against ZIP bombs and forged `uncompressed_size` headers.
pub(crate) const DEFAULT_MAX_ZIP_PART_BYTES: u64 = 256 * 1024 * 1024; // 256MiB

/// Largest total uncompressed size accepted across a whole package.
pub(crate) const DEFAULT_MAX_ZIP_TOTAL_BYTES: u64 = 512 * 1024 * 1024; // 512MiB

/// Running total of inflated bytes for one package load.
#[derive(Debug)]
pub(crate) struct ZipInflateBudget {
    max_total_bytes: u64,
    used_bytes: u64,
}

impl ZipInflateBudget {
    pub(crate) fn new(max_total_bytes: u64) -> Self {
        Self {
            max_total_bytes,
            used_bytes: 0,
        }
    }

    pub(crate) fn remaining_bytes(&self) -> u64 {
        self.max_total_bytes.saturating_sub(self.used_bytes)
    }

    fn consume(&mut self, bytes: u64) -> Result<(), XlsxError> {
        self.used_bytes = self.used_bytes.checked_add(bytes).unwrap_or(u64::MAX);
        if self.used_bytes > self.max_total_bytes {
            return Err(XlsxError::PackageTooLarge {
                total: self.used_bytes,
                max: self.max_total_bytes,
            });
        }
        Ok(())
    }
}

/// Inflate one entry into memory without trusting its declared size.
///
/// The declared size is checked first as a fast path; the actual stream is then
/// read through a `take` guard one byte past the effective limit so a lying header
/// is still caught.
pub(crate) fn read_zip_entry_with_budget<R: Read>(
    entry: R,
    declared_size: u64,
    part: &str,
    max_part_bytes: u64,
    budget: &mut ZipInflateBudget,
) -> Result<Vec<u8>, XlsxError> {
    if declared_size > max_part_bytes {
        return Err(XlsxError::PartTooLarge {
            part: part.to_string(),
            size: declared_size,
            max: max_part_bytes,
        });
    }
    let remaining = budget.remaining_bytes();
    if declared_size > remaining {
        budget.consume(declared_size)?;
    }

    let effective_max = max_part_bytes.min(remaining);
    let mut buf = Vec::with_capacity(declared_size.min(effective_max) as usize);
    entry
        .take(effective_max.saturating_add(1))
        .read_to_end(&mut buf)?;

    let actual = buf.len() as u64;
    if actual > max_part_bytes {
        return Err(XlsxError::PartTooLarge {
            part: part.to_string(),
            size: actual,
            max: max_part_bytes,
        });
    }
    budget.consume(actual)?;
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lying_headers_are_still_bounded() {
        let mut budget = ZipInflateBudget::new(1024);
        let data = vec![b'x'; 64];
        let err = read_zip_entry_with_budget(&data[..], 8, "a.xml", 16, &mut budget).unwrap_err();
        match err {
            XlsxError::PartTooLarge { part, size, max } => {
                assert_eq!(part, "a.xml");
                assert_eq!(size, 17);
                assert_eq!(max, 16);
            }
            other => panic!("expected PartTooLarge, got {other:?}"),
        }
    }

    #[test]
    fn budget_spans_multiple_entries() {
        let mut budget = ZipInflateBudget::new(10);
        let first = read_zip_entry_with_budget(&b"hello"[..], 5, "a", 100, &mut budget).unwrap();
        assert_eq!(first, b"hello");
        let err =
            read_zip_entry_with_budget(&b"world!"[..], 6, "b", 100, &mut budget).unwrap_err();
        assert!(matches!(err, XlsxError::PackageTooLarge { max: 10, .. }));
    }
}

/// Canonical lookup key for a part name: leading separators stripped, `\` treated as
/// `/`, ASCII case folded. Producers disagree on all three.
pub(crate) fn part_name_key(name: &str) -> String {
    name.trim_start_matches(['/', '\\'])
        .chars()
        .map(|c| if c == '\\' { '/' } else { c.to_ascii_lowercase() })
        .collect()
}
