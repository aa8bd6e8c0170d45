pub mod ids;
pub mod logging;
pub mod time;

pub use ids::{build_task_identifiers, slugify, TaskIdentifiers};
pub use logging::{LogLevel, Logger};
pub use time::{now_iso, now_millis, now_secs};

/// Cuts `raw` at `max_chars` characters, on a char boundary.
pub fn truncate_chars(raw: &str, max_chars: usize) -> &str {
    match raw.char_indices().nth(max_chars) {
        Some((idx, _)) => &raw[..idx],
        None => raw,
    }
}

#[cfg(test)]
mod tests {
    use super::truncate_chars;

    #[test]
    fn truncate_chars_counts_characters_not_bytes() {
        assert_eq!(truncate_chars("hello", 10), "hello");
        assert_eq!(truncate_chars("hello", 3), "hel");
        assert_eq!(truncate_chars("héllo", 2), "hé");
        assert_eq!(truncate_chars("", 5), "");
    }
}
