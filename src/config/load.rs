use super::{Config, ConfigError};
use std::path::PathBuf;

pub const CONFIG_PATH_ENV: &str = "MATRIX_ORCHESTRATOR_CONFIG";
pub const DEFAULT_CONFIG_FILE: &str = "orchestrator.yaml";

pub fn resolve_config_path() -> PathBuf {
    std::env::var(CONFIG_PATH_ENV)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE))
}

pub fn load_config() -> Result<(PathBuf, Config), ConfigError> {
    let path = resolve_config_path();
    let config = Config::from_path(&path)?;
    Ok((path, config))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    static ENV_LOCK: Mutex<()> = Mutex::new(());

    #[test]
    fn config_path_defaults_to_orchestrator_yaml() {
        let _guard = ENV_LOCK.lock().expect("env lock");
        let old = std::env::var_os(CONFIG_PATH_ENV);
        std::env::remove_var(CONFIG_PATH_ENV);

        assert_eq!(resolve_config_path(), PathBuf::from(DEFAULT_CONFIG_FILE));

        if let Some(value) = old {
            std::env::set_var(CONFIG_PATH_ENV, value);
        }
    }

    #[test]
    fn config_path_env_override_wins() {
        let _guard = ENV_LOCK.lock().expect("env lock");
        let old = std::env::var_os(CONFIG_PATH_ENV);
        std::env::set_var(CONFIG_PATH_ENV, "/etc/orchestrator/custom.yaml");

        assert_eq!(
            resolve_config_path(),
            PathBuf::from("/etc/orchestrator/custom.yaml")
        );

        if let Some(value) = old {
            std::env::set_var(CONFIG_PATH_ENV, value);
        } else {
            std::env::remove_var(CONFIG_PATH_ENV);
        }
    }

    #[test]
    fn load_config_reports_missing_files() {
        let _guard = ENV_LOCK.lock().expect("env lock");
        let old = std::env::var_os(CONFIG_PATH_ENV);
        std::env::set_var(CONFIG_PATH_ENV, "/nonexistent/orchestrator.yaml");

        let err = load_config().expect_err("missing file should fail");
        assert!(err.to_string().contains("failed to read config file"));

        if let Some(value) = old {
            std::env::set_var(CONFIG_PATH_ENV, value);
        } else {
            std::env::remove_var(CONFIG_PATH_ENV);
        }
    }
}
