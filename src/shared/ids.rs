use chrono::{DateTime, Utc};
use sha1::{Digest, Sha1};

pub const MAX_SANDBOX_NAME_LEN: usize = 63;
const SLUG_MAX_LEN: usize = 24;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskIdentifiers {
    pub task_id: String,
    pub sandbox_name: String,
    pub room_label: String,
}

/// Derives the task id, sandbox name, and room label for one accepted lobby
/// message. Deterministic: equal inputs yield equal output.
pub fn build_task_identifiers(
    project_key: &str,
    prompt: &str,
    lobby_event_id: &str,
    now: DateTime<Utc>,
) -> TaskIdentifiers {
    let timestamp = now.format("%Y%m%d%H%M%S").to_string();
    let hash = short_hash(project_key, lobby_event_id);
    let slug = slugify(prompt, "task", SLUG_MAX_LEN);

    let task_id = format!("{project_key}-{timestamp}-{hash}");
    let mut sandbox_name = format!("task-{timestamp}-{slug}-{hash}");
    sandbox_name.truncate(MAX_SANDBOX_NAME_LEN);
    let room_label = format!("{slug}-{hash}");

    TaskIdentifiers {
        task_id,
        sandbox_name,
        room_label,
    }
}

/// First six hex chars of SHA-1 over `<projectKey>:<lobbyEventId>`.
fn short_hash(project_key: &str, lobby_event_id: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(project_key.as_bytes());
    hasher.update(b":");
    hasher.update(lobby_event_id.as_bytes());
    hasher
        .finalize()
        .iter()
        .take(3)
        .map(|byte| format!("{byte:02x}"))
        .collect()
}

/// Lowercases, maps non-alphanumerics to `-`, collapses runs, trims edge
/// dashes, truncates to `max_len`, re-trims. An empty result becomes
/// `fallback`.
pub fn slugify(raw: &str, fallback: &str, max_len: usize) -> String {
    let mut slug = String::with_capacity(raw.len().min(max_len));
    let mut last_was_dash = true;
    for ch in raw.chars() {
        if ch.is_ascii_alphanumeric() {
            slug.push(ch.to_ascii_lowercase());
            last_was_dash = false;
        } else if !last_was_dash {
            slug.push('-');
            last_was_dash = true;
        }
    }
    while slug.ends_with('-') {
        slug.pop();
    }
    if slug.len() > max_len {
        slug.truncate(max_len);
        while slug.ends_with('-') {
            slug.pop();
        }
    }
    if slug.is_empty() {
        fallback.to_string()
    } else {
        slug
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn fixed_now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 7, 14, 30, 5).unwrap()
    }

    #[test]
    fn slugify_keeps_only_lowercase_alphanumerics_and_single_dashes() {
        assert_eq!(slugify("Implement OAuth migration", "task", 24), "implement-oauth-migratio");
        assert_eq!(slugify("  fix -- the / thing!! ", "task", 24), "fix-the-thing");
        assert_eq!(slugify("UPPER_case.mixed", "task", 24), "upper-case-mixed");
    }

    #[test]
    fn slugify_falls_back_when_nothing_survives() {
        assert_eq!(slugify("!!!", "task", 24), "task");
        assert_eq!(slugify("", "task", 24), "task");
        assert_eq!(slugify("---", "other", 24), "other");
    }

    #[test]
    fn slugify_never_leaves_edge_or_double_dashes() {
        for input in ["a--b", "-ab-", "a  b", "a.!.b", "trailing dash here-"] {
            let slug = slugify(input, "task", 24);
            assert!(!slug.starts_with('-'), "{slug}");
            assert!(!slug.ends_with('-'), "{slug}");
            assert!(!slug.contains("--"), "{slug}");
            assert!(slug.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-'));
        }
    }

    #[test]
    fn slugify_truncation_retrims_a_trailing_dash() {
        // Truncation at 24 cuts right after the second word's separator.
        let slug = slugify("abcdefghij abcdefghijkl end", "task", 24);
        assert_eq!(slug, "abcdefghij-abcdefghijkl");
    }

    #[test]
    fn identifiers_are_deterministic() {
        let a = build_task_identifiers("rc", "implement oauth", "$evt1", fixed_now());
        let b = build_task_identifiers("rc", "implement oauth", "$evt1", fixed_now());
        assert_eq!(a, b);
    }

    #[test]
    fn identifiers_follow_the_documented_shapes() {
        let ids = build_task_identifiers("rc", "implement oauth migration", "$evt1", fixed_now());
        assert_eq!(ids.task_id.len(), "rc-20240307143005-".len() + 6);
        assert!(ids.task_id.starts_with("rc-20240307143005-"));
        assert!(ids.sandbox_name.starts_with("task-20240307143005-"));
        assert!(ids.sandbox_name.len() <= MAX_SANDBOX_NAME_LEN);
        assert!(ids.room_label.ends_with(&ids.task_id[ids.task_id.len() - 6..]));

        let hash = &ids.task_id[ids.task_id.len() - 6..];
        assert_eq!(hash.len(), 6);
        assert!(hash.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn hash_distinguishes_event_ids() {
        let a = build_task_identifiers("rc", "same prompt", "$evt1", fixed_now());
        let b = build_task_identifiers("rc", "same prompt", "$evt2", fixed_now());
        assert_ne!(a.task_id, b.task_id);
        assert_ne!(a.sandbox_name, b.sandbox_name);
    }

    #[test]
    fn sandbox_name_stays_within_the_limit_for_long_inputs() {
        let prompt = "a".repeat(400);
        let key = "k".repeat(40);
        let ids = build_task_identifiers(&key, &prompt, "$evt", fixed_now());
        assert!(ids.sandbox_name.len() <= MAX_SANDBOX_NAME_LEN);
    }
}
