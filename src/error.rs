//! Error types and handling for memsentinel
//!
//! Errors never cross the monitor's boundary from its timer loops: each loop
//! logs the failure and bumps the matching counter in [`ErrorCategory`] terms.
//! Direct calls (manual passes, configuration, status changes) return them.

use thiserror::Error;

/// Result type alias for memsentinel operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error categories used for failure counters and log routing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// A metrics provider read failed
    Sampling,
    /// A detection, pressure or advisory pass failed
    Analysis,
    /// A cleanup operation failed
    Cleanup,
    /// Configuration loading or validation failed
    Configuration,
    /// Caller supplied an invalid request
    Validation,
    /// Internal I/O or serialization failure
    Internal,
}

/// memsentinel error types
#[derive(Debug, Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Sampling error: {0}")]
    Sampling(String),

    #[error("Analysis error: {0}")]
    Analysis(String),

    #[error("Cleanup error: {0}")]
    Cleanup(String),

    #[error("Missing collaborator: {0}")]
    MissingCollaborator(String),

    #[error("Invalid thresholds: {0}")]
    InvalidThresholds(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Timeout: {0}")]
    Timeout(String),
}

impl Error {
    /// Category used when counting this failure
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Sampling(_) => ErrorCategory::Sampling,
            Self::Analysis(_) => ErrorCategory::Analysis,
            Self::Cleanup(_) | Self::MissingCollaborator(_) | Self::Timeout(_) => {
                ErrorCategory::Cleanup
            }
            Self::Config(_) | Self::InvalidThresholds(_) => ErrorCategory::Configuration,
            Self::InvalidState(_) | Self::NotFound(_) => ErrorCategory::Validation,
            Self::Io(_) | Self::Serialization(_) => ErrorCategory::Internal,
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(format!("JSON error: {}", err))
    }
}

impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Error::Config(format!("Failed to parse config: {}", err))
    }
}

impl From<toml::ser::Error> for Error {
    fn from(err: toml::ser::Error) -> Self {
        Error::Serialization(format!("TOML error: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_categories() {
        assert_eq!(
            Error::Sampling("provider offline".to_string()).category(),
            ErrorCategory::Sampling
        );
        assert_eq!(
            Error::MissingCollaborator("object pools".to_string()).category(),
            ErrorCategory::Cleanup
        );
        assert_eq!(
            Error::InvalidThresholds("not increasing".to_string()).category(),
            ErrorCategory::Configuration
        );
    }

    #[test]
    fn test_error_display() {
        let err = Error::Analysis("history too short".to_string());
        assert_eq!(err.to_string(), "Analysis error: history too short");
    }
}
