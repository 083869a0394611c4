use thiserror::Error;

/// Main error type for the Sweepline system
#[derive(Error, Debug)]
pub enum SlError {
    #[error("Config diff error: {0}")]
    Diff(#[from] DiffError),

    #[error("Launch error: {0}")]
    Launch(#[from] LaunchError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Validation error: {0}")]
    Validation(String),
}

/// A trial configuration could not be resolved against the baseline.
///
/// Fatal to the submission that produced it; never retried.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DiffError {
    #[error("Key not found in baseline: {key}")]
    UnknownKey { key: String },

    #[error("Key {key} indexes into {parent}, which is not a sequence in the baseline")]
    NotASequence { key: String, parent: String },

    #[error("Index {index} out of range for {parent} (length {len}) while resolving {key}")]
    IndexOutOfRange {
        key: String,
        parent: String,
        index: usize,
        len: usize,
    },

    #[error("Configuration must be a mapping, got {kind}")]
    NotAMapping { kind: String },
}

/// The execution backend refused or failed to accept a submission.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LaunchError {
    #[error("Backend {backend} rejected submission: {reason}")]
    Rejected { backend: String, reason: String },

    #[error("Backend returned {got} handles for {expected} override sets")]
    HandleCountMismatch { expected: usize, got: usize },

    #[error("Backend {backend} is closed")]
    Closed { backend: String },

    #[error("Failed to spawn job #{index}: {message}")]
    Spawn { index: usize, message: String },

    #[error("Unknown backend: {tag}")]
    UnknownBackend { tag: String },
}

/// Result type alias for Sweepline operations
pub type SlResult<T> = Result<T, SlError>;

/// Macro for creating validation errors
#[macro_export]
macro_rules! validation_error {
    ($($arg:tt)*) => {
        $crate::SlError::Validation(format!($($arg)*))
    };
}

/// Macro for creating configuration errors
#[macro_export]
macro_rules! config_error {
    ($($arg:tt)*) => {
        $crate::SlError::Config(format!($($arg)*))
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let error = DiffError::IndexOutOfRange {
            key: "model.layers.4".into(),
            parent: "model.layers".into(),
            index: 4,
            len: 2,
        };

        assert!(error.to_string().contains("model.layers.4"));
        assert!(error.to_string().contains("length 2"));
    }

    #[test]
    fn test_error_conversion() {
        let launch_error = LaunchError::Closed {
            backend: "local".into(),
        };
        let sl_error: SlError = launch_error.into();

        match sl_error {
            SlError::Launch(LaunchError::Closed { .. }) => (),
            _ => panic!("Expected Launch error"),
        }
    }

    #[test]
    fn test_serialization_error_conversion() {
        let json_error = serde_json::from_str::<u32>("\"x\"").unwrap_err();
        let sl_error: SlError = json_error.into();
        assert!(matches!(sl_error, SlError::Serialization(_)));
    }

    #[test]
    fn test_macros() {
        let validation_err = validation_error!("n_jobs must be positive, got {}", 0);
        assert!(matches!(validation_err, SlError::Validation(_)));
        let config_err = config_error!("Missing required field: {}", "baseline");
        assert!(config_err.to_string().contains("baseline"));
    }
}
