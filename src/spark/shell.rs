use std::collections::BTreeMap;

/// Single-quotes a string for interpolation into a shell script. Embedded
/// single quotes use the `'"'"'` convention.
pub fn shell_quote(raw: &str) -> String {
    format!("'{}'", raw.replace('\'', r#"'"'"'"#))
}

/// Emits `export KEY='value'; ` for each entry, in key order.
pub fn env_prelude(env: &BTreeMap<String, String>) -> String {
    env.iter()
        .map(|(key, value)| format!("export {key}={}; ", shell_quote(value)))
        .collect()
}
