use thiserror::Error;

/// Core error type for the Flowline engine
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// Operation attempted on a token or instance in the wrong state
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// The model cannot be traversed as requested
    #[error("Unsupported model: {0}")]
    UnsupportedModel(String),

    /// A data input has no association or no upstream payload
    #[error("Unresolved data input: {0}")]
    UnresolvedDataInput(String),

    /// An activity raised a fault while running
    #[error("Activity fault: {0}")]
    ActivityFault(String),

    /// Process model not found
    #[error("Process model not found: {0}")]
    ProcessModelNotFound(String),

    /// Process instance not found
    #[error("Process instance not found: {0}")]
    ProcessInstanceNotFound(String),

    /// State store error
    #[error("State store error: {0}")]
    StateStoreError(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl From<serde_json::Error> for CoreError {
    fn from(err: serde_json::Error) -> Self {
        CoreError::SerializationError(err.to_string())
    }
}

impl From<String> for CoreError {
    fn from(err: String) -> Self {
        CoreError::Other(err)
    }
}

impl From<&str> for CoreError {
    fn from(err: &str) -> Self {
        CoreError::Other(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let errors = vec![
            (CoreError::InvalidState("released".to_string()), "Invalid state: released"),
            (CoreError::UnsupportedModel("fork".to_string()), "Unsupported model: fork"),
            (CoreError::UnresolvedDataInput("a.i".to_string()), "Unresolved data input: a.i"),
            (CoreError::ActivityFault("boom".to_string()), "Activity fault: boom"),
            (CoreError::ProcessModelNotFound("m1".to_string()), "Process model not found: m1"),
            (CoreError::ProcessInstanceNotFound("i1".to_string()), "Process instance not found: i1"),
            (CoreError::StateStoreError("db_err".to_string()), "State store error: db_err"),
            (CoreError::ConfigurationError("config_err".to_string()), "Configuration error: config_err"),
            (CoreError::SerializationError("ser_err".to_string()), "Serialization error: ser_err"),
            (CoreError::Other("other_err".to_string()), "other_err"),
        ];

        for (error, expected_msg) in errors {
            assert_eq!(error.to_string(), expected_msg);
        }
    }

    #[test]
    fn test_from_serde_json_error() {
        let json_error = serde_json::from_str::<serde_json::Value>("invalid json").unwrap_err();
        let error: CoreError = json_error.into();

        match error {
            CoreError::SerializationError(msg) => {
                assert!(msg.contains("expected value"));
            }
            _ => panic!("Expected SerializationError variant"),
        }
    }

    #[test]
    fn test_from_str() {
        let error: CoreError = "lost token".into();
        assert_eq!(error, CoreError::Other("lost token".to_string()));
    }
}
