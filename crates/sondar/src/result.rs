//! Result, error and status types for Sondar.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type for Sondar operations
pub type SondarResult<T> = Result<T, SondarError>;

/// Errors that can occur in Sondar
#[derive(Debug, Error)]
pub enum SondarError {
    /// A test requirement was not met; the scenario must be skipped
    #[error("requirement not met: {message}")]
    Requirement {
        /// Why the requirement was not met
        message: String,
    },

    /// A test assertion failed
    #[error("assertion failed: {message}")]
    Assertion {
        /// What was asserted
        message: String,
    },

    /// A subtest requested by exact name does not exist
    #[error("unknown subtest: {name}")]
    UnknownSubtest {
        /// The requested name
        name: String,
    },

    /// A hook descriptor could not be parsed
    #[error("invalid hook descriptor: {message}")]
    HookParse {
        /// Parse failure detail
        message: String,
    },

    /// A device node could not be found or identified
    #[error("device error: {message}")]
    Device {
        /// Error message
        message: String,
    },

    /// A sysfs/debugfs/configfs attribute had an unexpected value
    #[error("attribute {attr}: cannot parse {value:?}")]
    AttrParse {
        /// Attribute name
        attr: String,
        /// Raw attribute contents
        value: String,
    },

    /// Process management (fork/wait/kill) failed
    #[error("process error: {message}")]
    Process {
        /// Error message
        message: String,
    },

    /// An isolated child did not finish in time
    #[error("timed out after {ms}ms")]
    Timeout {
        /// Timeout in milliseconds
        ms: u64,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Low-level syscall error
    #[error("syscall error: {0}")]
    Sys(#[from] nix::errno::Errno),
}

impl SondarError {
    /// Create a requirement error (skip path)
    #[must_use]
    pub fn requirement(message: impl Into<String>) -> Self {
        Self::Requirement {
            message: message.into(),
        }
    }

    /// Create an assertion error (fail path)
    #[must_use]
    pub fn assertion(message: impl Into<String>) -> Self {
        Self::Assertion {
            message: message.into(),
        }
    }

    /// Create a device error
    #[must_use]
    pub fn device(message: impl Into<String>) -> Self {
        Self::Device {
            message: message.into(),
        }
    }

    /// Create a process error
    #[must_use]
    pub fn process(message: impl Into<String>) -> Self {
        Self::Process {
            message: message.into(),
        }
    }

    /// Whether this error is a requirement failure (classified SKIP)
    #[must_use]
    pub fn is_requirement(&self) -> bool {
        matches!(self, Self::Requirement { .. })
    }
}

/// Process exit codes of the validation-suite contract.
///
/// These values are a fixed external contract shared with runner tooling;
/// they must not change.
pub mod exit_code {
    /// Everything that ran succeeded
    pub const SUCCESS: i32 = 0;
    /// Nothing ran; every selected scenario was skipped
    pub const SKIP: i32 = 77;
    /// A scenario timed out
    pub const TIMEOUT: i32 = 78;
    /// The invocation itself was invalid (bad option, unknown subtest)
    pub const INVALID: i32 = 79;
    /// At least one scenario failed
    pub const FAILURE: i32 = 98;
    /// The suite aborted mid-run
    pub const ABORT: i32 = 112;
}

/// Classification of a test, subtest or dynamic subtest run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TestStatus {
    /// The scenario ran and all assertions held
    Success,
    /// A requirement was not met; nothing was verified
    Skip,
    /// An assertion failed or the body panicked
    Fail,
    /// An isolated scenario exceeded its deadline
    Timeout,
    /// An isolated scenario died on a signal
    Crash,
}

impl TestStatus {
    /// The result string used on the hook boundary.
    ///
    /// Only `SUCCESS`, `SKIP` and `FAIL` cross that boundary; timeouts and
    /// crashes are failures as far as hook consumers are concerned, and are
    /// distinguished by exit code instead.
    #[must_use]
    pub fn as_result_str(self) -> &'static str {
        match self {
            Self::Success => "SUCCESS",
            Self::Skip => "SKIP",
            Self::Fail | Self::Timeout | Self::Crash => "FAIL",
        }
    }

    /// The exit code a process reporting only this status would use
    #[must_use]
    pub fn exit_code(self) -> i32 {
        match self {
            Self::Success => exit_code::SUCCESS,
            Self::Skip => exit_code::SKIP,
            Self::Fail | Self::Crash => exit_code::FAILURE,
            Self::Timeout => exit_code::TIMEOUT,
        }
    }

    /// Whether the scenario counts as failed
    #[must_use]
    pub fn is_failure(self) -> bool {
        matches!(self, Self::Fail | Self::Timeout | Self::Crash)
    }
}

impl std::fmt::Display for TestStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_result_str())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn requirement_errors_are_skips() {
        let err = SondarError::requirement("no device");
        assert!(err.is_requirement());
        assert!(err.to_string().contains("no device"));

        let err = SondarError::assertion("broken");
        assert!(!err.is_requirement());
    }

    #[test]
    fn result_strings_collapse_to_three_values() {
        assert_eq!(TestStatus::Success.as_result_str(), "SUCCESS");
        assert_eq!(TestStatus::Skip.as_result_str(), "SKIP");
        assert_eq!(TestStatus::Fail.as_result_str(), "FAIL");
        assert_eq!(TestStatus::Timeout.as_result_str(), "FAIL");
        assert_eq!(TestStatus::Crash.as_result_str(), "FAIL");
    }

    #[test]
    fn exit_codes_follow_the_contract() {
        assert_eq!(TestStatus::Success.exit_code(), 0);
        assert_eq!(TestStatus::Skip.exit_code(), 77);
        assert_eq!(TestStatus::Timeout.exit_code(), 78);
        assert_eq!(TestStatus::Fail.exit_code(), 98);
        assert_eq!(TestStatus::Crash.exit_code(), 98);
    }
}
