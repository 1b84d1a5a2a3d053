use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    #[error("invalid duration: {0}")]
    InvalidDuration(String),
}

pub type Result<T> = std::result::Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let error = CoreError::InvalidDuration("10 parsecs".to_string());
        assert!(error.to_string().contains("10 parsecs"));
    }
}
