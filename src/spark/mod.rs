pub mod cli;
pub mod shell;

pub use cli::{parse_launch_output, SparkCli};
pub use shell::{env_prelude, shell_quote};

use std::collections::BTreeMap;

#[derive(Debug, thiserror::Error)]
pub enum SparkError {
    #[error("spark binary `{binary}` not found on PATH")]
    MissingBinary { binary: String },
    #[error("failed to run `{command}`: {source}")]
    Io {
        command: String,
        #[source]
        source: std::io::Error,
    },
    #[error("`{command}` timed out after {timeout_secs}s")]
    Timeout { command: String, timeout_secs: u64 },
    #[error("`{command}` exited with code {exit_code}: {output}")]
    CommandFailed {
        command: String,
        exit_code: i32,
        output: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MainSandboxSpec {
    pub project: String,
    pub base: String,
    pub main_sandbox: String,
    pub work_volume: String,
    pub work_mount_path: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoSyncSpec {
    pub project: String,
    pub sandbox_name: String,
    pub repo: String,
    pub branch: String,
    pub workdir: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SandboxBootstrapSpec {
    pub project: String,
    pub sandbox_name: String,
    pub workdir: String,
    pub script_path: String,
    pub timeout_sec: u64,
    pub retries: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForkSpec {
    pub project: String,
    pub task_sandbox: String,
    pub main_sandbox: String,
    pub tags: Vec<(String, String)>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeLaunchSpec {
    pub project: String,
    pub sandbox_name: String,
    pub bridge_entrypoint: String,
    pub bridge_workdir: String,
    pub env: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BridgeLaunch {
    pub pid: Option<u64>,
    pub process_id: Option<String>,
    pub raw_output: String,
}

/// The sandbox-side capability surface the orchestrator depends on.
/// Implemented by `SparkCli` in production and by recording fakes in tests.
pub trait SparkApi {
    fn verify_availability(&self) -> Result<(), SparkError>;
    fn ensure_work_volume(&self, project: &str, volume: &str) -> Result<(), SparkError>;
    fn ensure_main_sandbox(&self, spec: &MainSandboxSpec) -> Result<(), SparkError>;
    fn ensure_repo_in_main_sandbox(&self, spec: &RepoSyncSpec) -> Result<(), SparkError>;
    fn run_bootstrap(&self, spec: &SandboxBootstrapSpec) -> Result<(), SparkError>;
    fn create_task_sandbox_fork(&self, spec: &ForkSpec) -> Result<(), SparkError>;
    fn launch_bridge_in_sandbox(&self, spec: &BridgeLaunchSpec)
        -> Result<BridgeLaunch, SparkError>;
}
