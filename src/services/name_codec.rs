//! Mapping between client filenames and the names files are stored under.
//!
//! A stored name is `<uploadTimestampMillis>-<sanitizedOriginalName>`. The
//! original name is recovered by splitting at the first `-`, which is always
//! the separator because the prefix is purely numeric.

use crate::utils::validation::sanitize_filename;
use chrono::Utc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Separator between the timestamp prefix and the original name
pub const SEPARATOR: char = '-';

static LAST_MILLIS: AtomicU64 = AtomicU64::new(0);

/// Current wall-clock milliseconds, strictly increasing within the process.
///
/// When two callers land on the same millisecond the later one is pushed to
/// the next millisecond, so encodes from one process never share a prefix.
pub fn next_millis() -> u64 {
    let now = Utc::now().timestamp_millis().max(0) as u64;
    let previous = LAST_MILLIS
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| {
            Some(now.max(last + 1))
        })
        .unwrap_or(now);
    now.max(previous + 1)
}

/// Encode an original filename using the process clock.
pub fn encode(original_name: &str) -> String {
    encode_at(original_name, next_millis())
}

/// Encode an original filename with an explicit timestamp.
pub fn encode_at(original_name: &str, millis: u64) -> String {
    format!("{}{}{}", millis, SEPARATOR, sanitize_filename(original_name))
}

/// Recover the display name from a stored name.
///
/// A name without any `-` is returned unchanged.
pub fn decode(stored_name: &str) -> &str {
    stored_name
        .split_once(SEPARATOR)
        .map(|(_, original)| original)
        .unwrap_or(stored_name)
}

/// Upload timestamp encoded in the prefix, if the prefix is numeric.
pub fn timestamp_of(stored_name: &str) -> Option<u64> {
    let (prefix, _) = stored_name.split_once(SEPARATOR)?;
    if prefix.is_empty() || !prefix.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    prefix.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_at() {
        assert_eq!(
            encode_at("report.final.pdf", 1700000000123),
            "1700000000123-report.final.pdf"
        );
        assert_eq!(encode_at("my notes.txt", 5), "5-my_notes.txt");
        assert_eq!(encode_at("", 5), "5-unnamed");
    }

    #[test]
    fn test_decode() {
        assert_eq!(decode("1700000000123-report.final.pdf"), "report.final.pdf");
        // Only the first separator splits
        assert_eq!(decode("1700000000123-my-file-v2.txt"), "my-file-v2.txt");
        assert_eq!(decode("no_separator.txt"), "no_separator.txt");
        assert_eq!(decode("123-"), "");
    }

    #[test]
    fn test_decode_recovers_sanitized_name() {
        for name in ["a.txt", "with space.bin", "ünïcode.md", "x-y-z", "../up.txt"] {
            let stored = encode_at(name, 42);
            assert_eq!(decode(&stored), sanitize_filename(name));
            // Fixed tick gives a deterministic result
            assert_eq!(stored, encode_at(name, 42));
        }
    }

    #[test]
    fn test_encoded_names_are_safe() {
        use crate::utils::validation::is_safe_stored_name;
        for name in ["../../etc/passwd", "..", "a/b\\c", "C:\\x", "...."] {
            let stored = encode(name);
            assert!(is_safe_stored_name(&stored), "unsafe encode: {}", stored);
        }
    }

    #[test]
    fn test_timestamp_of() {
        assert_eq!(timestamp_of("1700000000123-a.txt"), Some(1700000000123));
        assert_eq!(timestamp_of("abc-a.txt"), None);
        assert_eq!(timestamp_of("-a.txt"), None);
        assert_eq!(timestamp_of("12a-a.txt"), None);
        assert_eq!(timestamp_of("1700000000123"), None);
    }

    #[test]
    fn test_next_millis_is_strictly_increasing() {
        let mut last = next_millis();
        for _ in 0..1000 {
            let next = next_millis();
            assert!(next > last);
            last = next;
        }
    }

    #[test]
    fn test_encode_is_unique_in_tight_loop() {
        let names: std::collections::HashSet<String> =
            (0..500).map(|_| encode("same.txt")).collect();
        assert_eq!(names.len(), 500);
    }
}
