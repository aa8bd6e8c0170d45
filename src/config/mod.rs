pub mod error;
pub mod load;
pub mod settings;

pub use error::ConfigError;
pub use load::{load_config, resolve_config_path, CONFIG_PATH_ENV, DEFAULT_CONFIG_FILE};
pub use settings::{
    BootstrapConfig, Config, ProjectConfig, ProjectMatrixConfig, ProjectSparkConfig, RuntimeConfig,
    ServiceConfig, WorkConfig, WorkspaceConfig, DEFAULT_STATE_FILE, DEFAULT_SYNC_TIMEOUT_MS,
    SUPPORTED_FORK_MODE,
};
