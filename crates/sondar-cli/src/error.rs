//! Error types for the CLI

use thiserror::Error;

/// Result type for CLI operations
pub type CliResult<T> = Result<T, CliError>;

/// Errors that can occur in the CLI
#[derive(Debug, Error)]
pub enum CliError {
    /// Invalid argument
    #[error("Invalid argument: {message}")]
    InvalidArgument {
        /// Error message
        message: String,
    },

    /// Suite execution error
    #[error("Suite execution failed: {message}")]
    SuiteExecution {
        /// Error message
        message: String,
    },

    /// IO error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Sondar library error
    #[error("Sondar error: {0}")]
    Sondar(#[from] sondar::SondarError),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CliError {
    /// Create an invalid argument error
    #[must_use]
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    /// Create a suite execution error
    #[must_use]
    pub fn suite_execution(message: impl Into<String>) -> Self {
        Self::SuiteExecution {
            message: message.into(),
        }
    }

    /// The process exit code for this error.
    ///
    /// Malformed invocations (bad hook descriptor, unknown subtest) exit
    /// with the invalid-invocation code; everything else is a plain failure.
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::InvalidArgument { .. }
            | Self::Sondar(
                sondar::SondarError::HookParse { .. } | sondar::SondarError::UnknownSubtest { .. },
            ) => sondar::exit_code::INVALID,
            _ => sondar::exit_code::FAILURE,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn invalid_argument_maps_to_invalid_exit_code() {
        let err = CliError::invalid_argument("bad flag");
        assert!(err.to_string().contains("Invalid argument"));
        assert_eq!(err.exit_code(), sondar::exit_code::INVALID);
    }

    #[test]
    fn hook_parse_maps_to_invalid_exit_code() {
        let err = CliError::from(sondar::SondarError::HookParse {
            message: "unknown event".to_string(),
        });
        assert_eq!(err.exit_code(), sondar::exit_code::INVALID);
    }

    #[test]
    fn io_maps_to_failure_exit_code() {
        let err = CliError::from(std::io::Error::other("broken"));
        assert_eq!(err.exit_code(), sondar::exit_code::FAILURE);
    }
}
