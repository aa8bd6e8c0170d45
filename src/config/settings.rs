use super::ConfigError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

pub const DEFAULT_STATE_FILE: &str = "data/orchestrator-state.json";
pub const DEFAULT_SYNC_TIMEOUT_MS: u64 = 30_000;
pub const DEFAULT_WORK_MOUNT_PATH: &str = "/work";
pub const DEFAULT_BOOTSTRAP_TIMEOUT_SEC: u64 = 1800;
pub const DEFAULT_BOOTSTRAP_RETRIES: u32 = 1;
pub const SUPPORTED_FORK_MODE: &str = "spark_fork";

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub homeserver_url: String,
    pub bot_user_id: String,
    #[serde(default)]
    pub bot_access_token: Option<String>,
    #[serde(default)]
    pub bot_password: Option<String>,
    pub workspace: WorkspaceConfig,
    pub runtime: RuntimeConfig,
    #[serde(default)]
    pub projects: Vec<ProjectConfig>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WorkspaceConfig {
    pub name: String,
    #[serde(default)]
    pub topic: Option<String>,
    #[serde(default)]
    pub team_members: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RuntimeConfig {
    #[serde(default = "default_state_file")]
    pub state_file: PathBuf,
    pub bridge_entrypoint: String,
    pub bridge_workdir: String,
    #[serde(default = "default_sync_timeout_ms")]
    pub sync_timeout_ms: u64,
    #[serde(default)]
    pub keep_error_rooms: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProjectConfig {
    pub key: String,
    pub display_name: String,
    pub repo: String,
    pub default_branch: String,
    pub matrix: ProjectMatrixConfig,
    pub spark: ProjectSparkConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProjectMatrixConfig {
    pub lobby_room_name: String,
    pub task_room_prefix: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProjectSparkConfig {
    pub project: String,
    pub base: String,
    pub main_spark: String,
    #[serde(default = "default_fork_mode")]
    pub fork_mode: String,
    pub work: WorkConfig,
    #[serde(default)]
    pub bootstrap: BootstrapConfig,
    #[serde(default)]
    pub services: Vec<ServiceConfig>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WorkConfig {
    pub volume: String,
    #[serde(default = "default_work_mount_path")]
    pub mount_path: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BootstrapConfig {
    #[serde(default)]
    pub script_if_exists: Option<String>,
    #[serde(default = "default_bootstrap_timeout_sec")]
    pub timeout_sec: u64,
    #[serde(default = "default_bootstrap_retries")]
    pub retries: u32,
}

impl Default for BootstrapConfig {
    fn default() -> Self {
        Self {
            script_if_exists: None,
            timeout_sec: DEFAULT_BOOTSTRAP_TIMEOUT_SEC,
            retries: DEFAULT_BOOTSTRAP_RETRIES,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ServiceConfig {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub enabled: bool,
}

fn default_state_file() -> PathBuf {
    PathBuf::from(DEFAULT_STATE_FILE)
}

fn default_sync_timeout_ms() -> u64 {
    DEFAULT_SYNC_TIMEOUT_MS
}

fn default_fork_mode() -> String {
    SUPPORTED_FORK_MODE.to_string()
}

fn default_work_mount_path() -> String {
    DEFAULT_WORK_MOUNT_PATH.to_string()
}

fn default_bootstrap_timeout_sec() -> u64 {
    DEFAULT_BOOTSTRAP_TIMEOUT_SEC
}

fn default_bootstrap_retries() -> u32 {
    DEFAULT_BOOTSTRAP_RETRIES
}

impl Config {
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let config: Self = serde_yaml::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let has_token = self
            .bot_access_token
            .as_deref()
            .is_some_and(|v| !v.trim().is_empty());
        let has_password = self
            .bot_password
            .as_deref()
            .is_some_and(|v| !v.trim().is_empty());
        match (has_token, has_password) {
            (false, false) => return Err(ConfigError::NoAuthConfigured),
            (true, true) => return Err(ConfigError::ConflictingAuth),
            _ => {}
        }

        if self.homeserver_url.trim().is_empty() {
            return Err(ConfigError::Invalid("homeserver_url must be non-empty".to_string()));
        }
        if self.bot_user_id.trim().is_empty() {
            return Err(ConfigError::Invalid("bot_user_id must be non-empty".to_string()));
        }

        let mut seen = BTreeSet::new();
        for project in &self.projects {
            if !seen.insert(project.key.clone()) {
                return Err(ConfigError::DuplicateProjectKey {
                    key: project.key.clone(),
                });
            }
            if project.spark.fork_mode != SUPPORTED_FORK_MODE {
                return Err(ConfigError::UnsupportedForkMode {
                    key: project.key.clone(),
                    mode: project.spark.fork_mode.clone(),
                });
            }
            for service in &project.spark.services {
                if service.enabled {
                    return Err(ConfigError::ServicesNotSupported {
                        key: project.key.clone(),
                        service: service.name.clone(),
                    });
                }
            }
        }
        Ok(())
    }
}
