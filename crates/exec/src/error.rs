use thiserror::Error;
use tokio::task::JoinError;
use vars::VarsError;

#[derive(Debug, Error)]
pub enum ExecError {
    #[error("interrupted")]
    Canceled,

    #[error("timeout exceeded")]
    DeadlineExceeded,

    #[error(transparent)]
    Vars(#[from] VarsError),

    #[error("{}", join_errors(.0))]
    Multiple(Vec<ExecError>),

    /// An infrastructure failure after which the whole build may be re-run.
    #[error("{0}")]
    Retriable(Box<ExecError>),

    #[error("step panicked: {0}")]
    Panicked(String),

    #[error("invalid format {0}")]
    InvalidFormat(String),

    #[error("failed to parse {file} in format {format}: {message}")]
    Parse {
        file: String,
        format: String,
        message: String,
    },

    #[error("artifact not found: {0}")]
    ArtifactNotFound(String),

    #[error("file path '{0}' does not name an artifact")]
    UnspecifiedArtifact(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ExecError {
    /// Whether this error is, or contains, a cancellation of the run.
    ///
    /// A deadline is not a cancellation.
    pub fn is_canceled(&self) -> bool {
        match self {
            Self::Canceled => true,
            Self::Multiple(errors) => errors.iter().any(Self::is_canceled),
            _ => false,
        }
    }

    pub fn is_deadline_exceeded(&self) -> bool {
        match self {
            Self::DeadlineExceeded => true,
            Self::Multiple(errors) => errors.iter().any(Self::is_deadline_exceeded),
            _ => false,
        }
    }

    pub fn is_retriable(&self) -> bool {
        matches!(self, Self::Retriable(_))
    }

    /// Combine errors, collapsing a single error into itself.
    pub fn combine(errors: impl IntoIterator<Item = ExecError>) -> Option<ExecError> {
        let mut errors: Vec<ExecError> = errors.into_iter().collect();
        match errors.len() {
            0 => None,
            1 => errors.pop(),
            _ => Some(Self::Multiple(errors)),
        }
    }

    /// Convert a failed child task into an error, keeping the panic message.
    pub fn from_join(err: JoinError) -> Self {
        if err.is_cancelled() {
            return Self::Canceled;
        }

        let payload = err.into_panic();
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "unknown panic".to_string()
        };
        Self::Panicked(message)
    }
}

fn join_errors(errors: &[ExecError]) -> String {
    let lines: Vec<String> = errors.iter().map(|e| format!("* {}", e)).collect();
    format!("{} errors occurred:\n{}", errors.len(), lines.join("\n"))
}

pub type Result<T> = std::result::Result<T, ExecError>;
