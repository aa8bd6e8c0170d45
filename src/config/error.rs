#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid yaml in {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("no authentication configured; set exactly one of bot_access_token or bot_password")]
    NoAuthConfigured,
    #[error("both bot_access_token and bot_password are set; configure exactly one")]
    ConflictingAuth,
    #[error("duplicate project key `{key}`")]
    DuplicateProjectKey { key: String },
    #[error("project `{key}` uses unsupported fork_mode `{mode}`; only `spark_fork` is supported")]
    UnsupportedForkMode { key: String, mode: String },
    #[error("project `{key}` enables service `{service}`; services are not supported in this version")]
    ServicesNotSupported { key: String, service: String },
    #[error("config validation failed: {0}")]
    Invalid(String),
}
