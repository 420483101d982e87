//! Error types for the file access guard.
//!
//! Every pipeline failure is a [`Rejection`]. The set of kinds is small and stable so
//! callers can match on it exhaustively instead of inspecting messages. Messages only
//! ever contain the literal string the caller supplied, never a resolved filesystem path.

use serde::Serialize;
use std::path::PathBuf;

/// Result type for path resolution.
pub type Result<T> = std::result::Result<T, Rejection>;

/// A typed refusal produced by the path resolution pipeline.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Rejection {
    /// Malformed, non-string, oversized or illegal-character input.
    ///
    /// The input is deliberately not echoed: it may contain control characters
    /// or be arbitrarily long.
    #[error("Invalid path input: {reason}")]
    InvalidInput { reason: InvalidInputReason },

    /// A path component names a platform device (`CON`, `NUL`, `COM1`, ...).
    #[error("Reserved device name '{component}' in path: {input}")]
    ReservedName { input: String, component: String },

    /// Blacklist hit, whitelist miss, containment failure, symlink cycle or
    /// an unreadable / unwritable location.
    #[error("Access denied: {input} - {reason}")]
    AccessDenied { input: String, reason: DenialReason },

    /// A disallowed symlink, or an opened object that is not a regular file.
    #[error("Validation failed: {input} - {reason}")]
    ValidationError {
        input: String,
        reason: ValidationFailure,
    },
}

/// Discriminant of a [`Rejection`], for callers that only need the category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, strum::Display, strum::AsRefStr)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum RejectionKind {
    InvalidInput,
    ReservedName,
    AccessDenied,
    ValidationError,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, strum::Display)]
#[serde(rename_all = "snake_case")]
pub enum InvalidInputReason {
    #[strum(serialize = "path must be a string")]
    NotAString,
    #[strum(serialize = "path is empty")]
    Empty,
    #[strum(serialize = "path exceeds maximum length")]
    TooLong,
    #[strum(serialize = "path contains control characters")]
    ControlCharacter,
    #[strum(serialize = "path contains forbidden characters")]
    ForbiddenCharacter,
    #[strum(serialize = "home directory is unavailable")]
    HomeUnavailable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, strum::Display)]
#[serde(rename_all = "snake_case")]
pub enum DenialReason {
    #[strum(serialize = "protected system location")]
    Blacklisted,
    #[strum(serialize = "not in an allowed directory")]
    NotWhitelisted,
    #[strum(serialize = "outside allowed directory")]
    OutsideAllowedRoot,
    #[strum(serialize = "circular symlink")]
    CircularSymlink,
    #[strum(serialize = "unresolvable symlink")]
    DanglingSymlink,
    #[strum(serialize = "not accessible")]
    NotAccessible,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, strum::Display)]
#[serde(rename_all = "snake_case")]
pub enum ValidationFailure {
    #[strum(serialize = "symbolic links are not allowed")]
    SymlinkNotAllowed,
    #[strum(serialize = "not a regular file")]
    NotRegularFile,
}

impl Rejection {
    pub(crate) fn invalid(reason: InvalidInputReason) -> Self {
        Self::InvalidInput { reason }
    }

    pub(crate) fn denied(input: &str, reason: DenialReason) -> Self {
        Self::AccessDenied {
            input: input.to_string(),
            reason,
        }
    }

    pub(crate) fn validation(input: &str, reason: ValidationFailure) -> Self {
        Self::ValidationError {
            input: input.to_string(),
            reason,
        }
    }

    /// The category of this rejection.
    #[must_use]
    pub const fn kind(&self) -> RejectionKind {
        match self {
            Self::InvalidInput { .. } => RejectionKind::InvalidInput,
            Self::ReservedName { .. } => RejectionKind::ReservedName,
            Self::AccessDenied { .. } => RejectionKind::AccessDenied,
            Self::ValidationError { .. } => RejectionKind::ValidationError,
        }
    }

    /// Returns a machine-readable error code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::InvalidInput { .. } => "INVALID_INPUT",
            Self::ReservedName { .. } => "RESERVED_NAME",
            Self::AccessDenied { .. } => "ACCESS_DENIED",
            Self::ValidationError { .. } => "VALIDATION_ERROR",
        }
    }

    /// The denial reason, if this is an [`Rejection::AccessDenied`].
    #[must_use]
    pub const fn denial_reason(&self) -> Option<DenialReason> {
        match self {
            Self::AccessDenied { reason, .. } => Some(*reason),
            _ => None,
        }
    }
}

/// Errors raised while constructing a policy or blacklist.
#[derive(Debug, thiserror::Error)]
pub enum PolicyError {
    /// Allowed roots must be absolute
    #[error("Allowed root must be an absolute path: {path:?}")]
    RelativeRoot { path: PathBuf },

    /// Explicit allowed roots must exist as directories when the policy is built
    #[error("Allowed root is not an existing directory: {path:?}")]
    MissingRoot { path: PathBuf },

    /// A blacklist pattern failed to compile
    #[error("Invalid blocked pattern '{pattern}': {source}")]
    InvalidPattern {
        pattern: String,
        source: regex::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_do_not_leak_resolved_paths() {
        let rejection = Rejection::denied("../../../etc/passwd", DenialReason::Blacklisted);
        assert_eq!(
            rejection.to_string(),
            "Access denied: ../../../etc/passwd - protected system location"
        );
    }

    #[test]
    fn test_invalid_input_does_not_echo_input() {
        let rejection = Rejection::invalid(InvalidInputReason::ControlCharacter);
        assert_eq!(
            rejection.to_string(),
            "Invalid path input: path contains control characters"
        );
    }

    #[test]
    fn test_kind_and_code() {
        let rejection = Rejection::validation("link", ValidationFailure::SymlinkNotAllowed);
        assert_eq!(rejection.kind(), RejectionKind::ValidationError);
        assert_eq!(rejection.code(), "VALIDATION_ERROR");
        assert_eq!(rejection.kind().to_string(), "VALIDATION_ERROR");
        assert!(rejection.denial_reason().is_none());

        let denied = Rejection::denied("x", DenialReason::CircularSymlink);
        assert_eq!(denied.denial_reason(), Some(DenialReason::CircularSymlink));
        assert_eq!(denied.to_string(), "Access denied: x - circular symlink");
    }
}
