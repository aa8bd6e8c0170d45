use std::collections::BTreeMap;

const PASS_THROUGH_EXACT: [&str; 2] = ["OPENAI_API_KEY", "LOG_LEVEL"];
const PASS_THROUGH_PREFIX: &str = "CODEX_";

/// Whether a process env var is copied into the bridge environment.
pub fn should_pass_through(key: &str) -> bool {
    PASS_THROUGH_EXACT.contains(&key) || key.starts_with(PASS_THROUGH_PREFIX)
}

/// Copies the allow-listed subset of the process environment, then overlays
/// the fixed per-task keys (fixed keys win).
pub fn build_bridge_env(
    process_env: impl IntoIterator<Item = (String, String)>,
    fixed: impl IntoIterator<Item = (String, String)>,
) -> BTreeMap<String, String> {
    let mut env: BTreeMap<String, String> = process_env
        .into_iter()
        .filter(|(key, _)| should_pass_through(key))
        .collect();
    for (key, value) in fixed {
        env.insert(key, value);
    }
    env
}

#[cfg(test)]
mod tests {
    use super::*;

    fn owned(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn pass_through_matches_exact_keys_and_the_codex_prefix() {
        assert!(should_pass_through("OPENAI_API_KEY"));
        assert!(should_pass_through("LOG_LEVEL"));
        assert!(should_pass_through("CODEX_HOME"));
        assert!(should_pass_through("CODEX_"));

        assert!(!should_pass_through("PATH"));
        assert!(!should_pass_through("HOME"));
        assert!(!should_pass_through("openai_api_key"));
        assert!(!should_pass_through("MY_CODEX_FLAG"));
    }

    #[test]
    fn build_filters_the_process_env_and_overlays_fixed_keys() {
        let process = owned(&[
            ("OPENAI_API_KEY", "sk-123"),
            ("PATH", "/usr/bin"),
            ("CODEX_MODE", "full"),
            ("LOG_LEVEL", "debug"),
        ]);
        let fixed = owned(&[
            ("MATRIX_ROOM_ID", "!task:hs"),
            ("INITIAL_PROMPT", "implement oauth"),
        ]);

        let env = build_bridge_env(process, fixed);
        assert_eq!(env.get("OPENAI_API_KEY").map(String::as_str), Some("sk-123"));
        assert_eq!(env.get("CODEX_MODE").map(String::as_str), Some("full"));
        assert_eq!(env.get("LOG_LEVEL").map(String::as_str), Some("debug"));
        assert_eq!(env.get("MATRIX_ROOM_ID").map(String::as_str), Some("!task:hs"));
        assert!(!env.contains_key("PATH"));
    }

    #[test]
    fn fixed_keys_override_pass_through_values() {
        let process = owned(&[("LOG_LEVEL", "debug")]);
        let fixed = owned(&[("LOG_LEVEL", "info")]);
        let env = build_bridge_env(process, fixed);
        assert_eq!(env.get("LOG_LEVEL").map(String::as_str), Some("info"));
    }
}
