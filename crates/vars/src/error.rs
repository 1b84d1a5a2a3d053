use thiserror::Error;

#[derive(Debug, Error)]
pub enum VarsError {
    #[error("invalid var '{raw}': {reason}")]
    InvalidReference { raw: String, reason: String },

    #[error("undefined vars: {}", .0.join(", "))]
    UndefinedVars(Vec<String>),

    #[error("unused vars: {}", .0.join(", "))]
    UnusedVars(Vec<String>),

    #[error("missing source '{0}' in var")]
    MissingSource(String),

    #[error("missing field '{field}' in var: {reference}")]
    MissingField { field: String, reference: String },

    #[error("cannot access field '{field}' of non-map value ({actual_type}) in var: {reference}")]
    InvalidField {
        field: String,
        actual_type: String,
        reference: String,
    },

    #[error("cannot interpolate non-primitive value ({value_type}) into string for var: {name}")]
    InvalidInterpolation { name: String, value_type: String },

    /// Failure reported by an external variable source.
    #[error("{0}")]
    Source(String),

    #[error("{}", join_errors(.0))]
    Multiple(Vec<VarsError>),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl VarsError {
    pub fn invalid_reference(raw: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidReference {
            raw: raw.into(),
            reason: reason.into(),
        }
    }

    /// Combine errors, collapsing a single error into itself.
    pub fn combine(mut errors: Vec<VarsError>) -> Option<VarsError> {
        match errors.len() {
            0 => None,
            1 => errors.pop(),
            _ => Some(Self::Multiple(errors)),
        }
    }
}

fn join_errors(errors: &[VarsError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

pub type Result<T> = std::result::Result<T, VarsError>;

/// Name of a JSON value's type, for error messages.
pub(crate) fn type_name(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "bool",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}
