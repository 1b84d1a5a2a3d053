use exec::ExecError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Execution failed: {0}")]
    Exec(#[from] ExecError),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Invalid plan {id}: {reason}")]
    InvalidPlan { id: String, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl EngineError {
    /// Create an invalid plan error.
    pub fn invalid_plan(id: impl ToString, reason: impl Into<String>) -> Self {
        Self::InvalidPlan {
            id: id.to_string(),
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;
