//! Human-readable memory sizes ("512M", "2GB", "1048576") for cache budgets.
//!
//! Multiples are binary (1K = 1024 bytes). Suffixes are case-insensitive and
//! the trailing `B` is optional.
use crate::error::{Result, SegmentationError};

const BYTES_PER_KB: usize = 1024;
const BYTES_PER_MB: usize = BYTES_PER_KB * 1024;
const BYTES_PER_GB: usize = BYTES_PER_MB * 1024;
const BYTES_PER_TB: usize = BYTES_PER_GB * 1024;

fn multiplier(unit: Option<char>) -> Option<usize> {
    match unit.map(|c| c.to_ascii_uppercase()) {
        None | Some('B') => Some(1),
        Some('K') => Some(BYTES_PER_KB),
        Some('M') => Some(BYTES_PER_MB),
        Some('G') => Some(BYTES_PER_GB),
        Some('T') => Some(BYTES_PER_TB),
        _ => None,
    }
}

/// Parse `^[0-9]+(K|M|G|T)?B?$` into a byte count.
pub fn parse_memory_size(s: &str) -> Result<usize> {
    let invalid = || SegmentationError::InvalidOptions(format!("Unrecognized size string: {s}"));
    let s = s.trim();
    let digits_end = s
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(s.len());
    if digits_end == 0 {
        return Err(invalid());
    }
    let value: usize = s[..digits_end].parse().map_err(|_| invalid())?;

    let mut suffix = s[digits_end..].chars();
    let unit = match (suffix.next(), suffix.next(), suffix.next()) {
        (None, None, None) => None,
        (Some(u), None, None) => Some(u),
        (Some(u), Some(b), None) if b.eq_ignore_ascii_case(&'b') && u != 'b' && u != 'B' => {
            Some(u)
        }
        _ => return Err(invalid()),
    };
    let mult = multiplier(unit).ok_or_else(invalid)?;
    value.checked_mul(mult).ok_or_else(invalid)
}

/// Format `bytes` in the unit named by `suffix` (B, K, M, G or T), truncating.
pub fn bytes_to_memory_size(bytes: usize, suffix: &str) -> Result<String> {
    let unit = suffix.chars().next().filter(|_| suffix.len() == 1);
    let (div, label) = match unit.map(|c| c.to_ascii_uppercase()) {
        Some('B') => (1, "B"),
        Some('K') => (BYTES_PER_KB, "KB"),
        Some('M') => (BYTES_PER_MB, "MB"),
        Some('G') => (BYTES_PER_GB, "GB"),
        Some('T') => (BYTES_PER_TB, "TB"),
        _ => {
            return Err(SegmentationError::InvalidOptions(format!(
                "Unrecognized suffix: {suffix}"
            )))
        }
    };
    Ok(format!("{}{label}", bytes / div))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_plain_and_suffixed_sizes() {
        assert_eq!(parse_memory_size("1024").unwrap(), 1024);
        assert_eq!(parse_memory_size("10B").unwrap(), 10);
        assert_eq!(parse_memory_size("2k").unwrap(), 2048);
        assert_eq!(parse_memory_size("3MB").unwrap(), 3 * 1024 * 1024);
        assert_eq!(parse_memory_size("1g").unwrap(), 1 << 30);
        assert_eq!(parse_memory_size("1Tb").unwrap(), 1usize << 40);
    }

    #[test]
    fn rejects_malformed_sizes() {
        for bad in ["", "G", "12X", "1.5G", "-1", "4BB", "3GiB"] {
            assert!(parse_memory_size(bad).is_err(), "accepted {bad:?}");
        }
    }

    #[test]
    fn formats_sizes_in_requested_unit() {
        assert_eq!(bytes_to_memory_size(3 << 30, "G").unwrap(), "3GB");
        assert_eq!(bytes_to_memory_size(1536, "k").unwrap(), "1KB");
        assert_eq!(bytes_to_memory_size(7, "B").unwrap(), "7B");
        assert!(bytes_to_memory_size(7, "X").is_err());
    }
}
