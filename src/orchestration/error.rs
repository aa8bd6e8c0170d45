use crate::matrix::ChatError;
use crate::spark::SparkError;
use crate::state::StateError;

#[derive(Debug, thiserror::Error)]
pub enum OrchestratorError {
    #[error("chat error: {0}")]
    Chat(#[from] ChatError),
    #[error("sandbox error: {0}")]
    Spark(#[from] SparkError),
    #[error("state error: {0}")]
    State(#[from] StateError),
    #[error("internal error: {0}")]
    Internal(String),
}

impl OrchestratorError {
    /// Persistence failures abort the process: continuing without durable
    /// progress would diverge from external reality.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::State(_))
    }
}
