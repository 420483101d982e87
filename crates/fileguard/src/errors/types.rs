//! Error type definitions for the fileguard host
//!
//! `AppError` covers startup and configuration failures. Rejections coming out of the
//! engine are turned into [`ToolError`] before they reach a tool caller.

use file_access_guard::{PolicyError, Rejection};
use serde::Serialize;
use thiserror::Error;

/// Top-level application error type
#[derive(Error, Debug)]
pub enum AppError {
    /// Configuration could not be read or merged
    #[error("Configuration error: {0}")]
    ConfigLoad(#[from] Box<figment::Error>),

    /// Configuration was read but is not usable
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// The configured policy could not be built
    #[error("Policy error: {0}")]
    Policy(#[from] PolicyError),

    /// A path was refused by the engine
    #[error("{0}")]
    Rejected(#[from] Rejection),

    /// Output could not be serialized
    #[error("Serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl AppError {
    /// Create a configuration error
    pub fn configuration<S: Into<String>>(message: S) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }
}

impl From<figment::Error> for AppError {
    fn from(err: figment::Error) -> Self {
        Self::ConfigLoad(Box::new(err))
    }
}

/// The error shape tool handlers hand back to their caller.
///
/// `code` is one of `INVALID_INPUT`, `RESERVED_NAME`, `ACCESS_DENIED` or
/// `VALIDATION_ERROR`. `message` never contains a resolved filesystem path. None of
/// these are worth retrying: the caller has to change the input or the policy.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
#[error("{code}: {message}")]
pub struct ToolError {
    pub code: &'static str,
    pub message: String,
}

impl From<&Rejection> for ToolError {
    fn from(rejection: &Rejection) -> Self {
        Self {
            code: rejection.code(),
            message: rejection.to_string(),
        }
    }
}

impl From<Rejection> for ToolError {
    fn from(rejection: Rejection) -> Self {
        Self::from(&rejection)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_configuration_helper() {
        let err = AppError::configuration("max_read_bytes must be positive");
        assert_eq!(
            err.to_string(),
            "Configuration error: max_read_bytes must be positive"
        );
    }

    #[test]
    fn test_tool_error_serializes_code_and_message() -> Result<(), serde_json::Error> {
        let err = ToolError {
            code: "ACCESS_DENIED",
            message: "Access denied: ../x - outside allowed directory".to_string(),
        };
        let json = serde_json::to_value(&err)?;
        assert_eq!(json["code"], "ACCESS_DENIED");
        assert_eq!(
            json["message"],
            "Access denied: ../x - outside allowed directory"
        );
        Ok(())
    }
}
