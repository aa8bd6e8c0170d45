pub mod records;
pub mod sanitize;
pub mod store;

pub use records::{
    BridgeHandle, OrchestratorState, ProjectState, SparkShape, TaskState, TaskStatus,
    WorkspaceState, STATE_VERSION,
};
pub use sanitize::sanitize_state;
pub use store::StateStore;

#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("failed to read state file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to write state file {path}: {source}")]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to serialize state: {source}")]
    Serialize {
        #[source]
        source: serde_json::Error,
    },
}
