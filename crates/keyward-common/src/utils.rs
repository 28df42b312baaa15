//! Utility functions for Keyward
//!
//! Helpers shared by the configuration and request layers.

/// Parse a strictly positive integer, returning `None` for anything else.
///
/// Mirrors the lenient option handling of the service: a value that is
/// missing, non-numeric, zero or negative falls through to the next source.
///
/// # Examples
///
/// ```
/// use keyward_common::parse_positive;
///
/// assert_eq!(parse_positive("250"), Some(250));
/// assert_eq!(parse_positive(" 42 "), Some(42));
/// assert_eq!(parse_positive("0"), None);
/// assert_eq!(parse_positive("soon"), None);
/// ```
pub fn parse_positive(value: &str) -> Option<u64> {
    value.trim().parse::<u64>().ok().filter(|v| *v > 0)
}

/// Deduplicate keys while keeping their first-seen order
pub fn dedup_keys<S: AsRef<str>>(keys: &[S]) -> Vec<String> {
    let mut seen = std::collections::HashSet::with_capacity(keys.len());
    keys.iter()
        .map(|k| k.as_ref())
        .filter(|k| seen.insert(*k))
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_positive() {
        assert_eq!(parse_positive("1000"), Some(1000));
        assert_eq!(parse_positive("-5"), None);
        assert_eq!(parse_positive(""), None);
        assert_eq!(parse_positive("12ms"), None);
    }

    #[test]
    fn test_dedup_keys_keeps_order() {
        let keys = ["b", "a", "b", "c", "a"];
        assert_eq!(dedup_keys(&keys), vec!["b", "a", "c"]);
    }

    #[test]
    fn test_dedup_keys_empty() {
        let keys: [&str; 0] = [];
        assert!(dedup_keys(&keys).is_empty());
    }
}
