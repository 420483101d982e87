//! The path resolution pipeline.
//!
//! [`PathResolver::resolve`] takes an untrusted path string through ten ordered gates and
//! either proves it safe or returns the first [`Rejection`]:
//!
//! 1. shape (non-empty string)
//! 2. `~` and variable expansion
//! 3. character and length checks on the expanded string
//! 4. reserved device names
//! 5. lexical absolutization against the base directory
//! 6. blacklist, then whitelist and allowed roots, on the candidate path
//! 7. symlink policy on the final entry
//! 8. canonicalization up to the nearest existing ancestor
//! 9. blacklist and containment again on the real path
//! 10. existence and permission checks
//!
//! A [`ValidatedPath`] describes the filesystem at one instant. It is not `Clone` and
//! should be used right away; anything touching the path later must resolve again, or
//! use [`PathResolver::open_validated`] to close the gap between check and open.

use crate::error::{DenialReason, Rejection, Result, ValidationFailure};
use crate::input::{self, ExpansionContext};
use crate::policy::PathPolicy;
use crate::security::{self, Access};
use crate::sensitive::sanitize_for_logging;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs::File;

/// Per-call knobs for [`PathResolver::resolve`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolveOptions {
    /// The path must exist and be readable.
    pub require_exists: bool,
    /// The path (if it exists) must also be writable.
    pub check_write: bool,
    /// Overrides the policy's symlink setting for this call.
    pub allow_symlinks_override: Option<bool>,
}

impl Default for ResolveOptions {
    fn default() -> Self {
        Self::must_exist()
    }
}

impl ResolveOptions {
    #[must_use]
    pub const fn must_exist() -> Self {
        Self {
            require_exists: true,
            check_write: false,
            allow_symlinks_override: None,
        }
    }

    /// For paths about to be created: only the nearest existing ancestor must be writable.
    #[must_use]
    pub const fn allow_missing() -> Self {
        Self {
            require_exists: false,
            check_write: false,
            allow_symlinks_override: None,
        }
    }

    #[must_use]
    pub const fn with_write(mut self, check_write: bool) -> Self {
        self.check_write = check_write;
        self
    }

    #[must_use]
    pub const fn with_symlinks(mut self, allow: bool) -> Self {
        self.allow_symlinks_override = Some(allow);
        self
    }
}

/// A path that passed every layer of the pipeline.
#[derive(Debug, PartialEq, Eq)]
pub struct ValidatedPath {
    raw_input: String,
    resolved_real_path: PathBuf,
    existed: bool,
}

impl ValidatedPath {
    /// The literal string the caller supplied.
    #[must_use]
    pub fn raw_input(&self) -> &str {
        &self.raw_input
    }

    /// Absolute, canonical location.
    #[must_use]
    pub fn real_path(&self) -> &Path {
        &self.resolved_real_path
    }

    /// Whether the entry existed at resolution time.
    #[must_use]
    pub const fn existed(&self) -> bool {
        self.existed
    }

    #[must_use]
    pub fn into_real_path(self) -> PathBuf {
        self.resolved_real_path
    }
}

/// Resolves untrusted path strings against one [`PathPolicy`].
#[derive(Debug, Clone)]
pub struct PathResolver {
    policy: Arc<PathPolicy>,
    base_dir: Option<PathBuf>,
    expansion: ExpansionContext,
}

impl PathResolver {
    /// A resolver that interprets relative input against the current working directory
    /// and expands against the process environment.
    #[must_use]
    pub fn new(policy: impl Into<Arc<PathPolicy>>) -> Self {
        Self {
            policy: policy.into(),
            base_dir: std::env::current_dir().ok(),
            expansion: ExpansionContext::from_process(),
        }
    }

    #[must_use]
    pub fn with_base_dir<P: Into<PathBuf>>(mut self, base_dir: P) -> Self {
        self.base_dir = Some(base_dir.into());
        self
    }

    #[must_use]
    #[allow(clippy::missing_const_for_fn)]
    pub fn with_expansion(mut self, expansion: ExpansionContext) -> Self {
        self.expansion = expansion;
        self
    }

    #[must_use]
    pub fn policy(&self) -> &PathPolicy {
        &self.policy
    }

    #[must_use]
    pub fn base_dir(&self) -> Option<&Path> {
        self.base_dir.as_deref()
    }

    /// Run the full pipeline on `raw`.
    ///
    /// # Errors
    /// The first [`Rejection`] produced by any layer. Identical input, policy and
    /// filesystem state always produce the same outcome.
    pub async fn resolve(&self, raw: &str, options: ResolveOptions) -> Result<ValidatedPath> {
        let outcome = self.run_pipeline(raw, options).await;
        match &outcome {
            Ok(validated) => tracing::trace!(
                "Resolved {:?} (existed: {})",
                sanitize_for_logging(raw),
                validated.existed
            ),
            Err(rejection) => log_rejection(raw, rejection),
        }
        outcome
    }

    /// [`resolve`](Self::resolve) for tool arguments whose JSON shape has not been checked.
    ///
    /// # Errors
    /// [`Rejection::InvalidInput`] if `value` is not a string, otherwise as `resolve`.
    pub async fn resolve_value(
        &self,
        value: &serde_json::Value,
        options: ResolveOptions,
    ) -> Result<ValidatedPath> {
        match input::check_value_shape(value) {
            Ok(raw) => self.resolve(raw, options).await,
            Err(rejection) => {
                log_rejection("", &rejection);
                Err(rejection)
            }
        }
    }

    /// Resolve with symlinks disallowed, then open without following a symlink at the
    /// final step, so the opened file is the one that was validated.
    ///
    /// # Errors
    /// Any pipeline [`Rejection`]; [`Rejection::ValidationError`] if a symlink appeared
    /// after validation or the object is not a regular file; [`Rejection::AccessDenied`]
    /// if the open fails.
    pub async fn open_validated(&self, raw: &str) -> Result<(ValidatedPath, File)> {
        let validated = self
            .resolve(raw, ResolveOptions::must_exist().with_symlinks(false))
            .await?;

        match security::open_regular_nofollow(validated.real_path(), raw).await {
            Ok(file) => Ok((validated, file)),
            Err(rejection) => {
                log_rejection(raw, &rejection);
                Err(rejection)
            }
        }
    }

    async fn run_pipeline(&self, raw: &str, options: ResolveOptions) -> Result<ValidatedPath> {
        // Layers 1-5
        let base_dir = self.base_dir.as_deref().unwrap_or_else(|| Path::new(""));
        let candidate = input::prepare(raw, &self.expansion, base_dir)?;
        if !candidate.is_absolute() {
            return Err(Rejection::denied(raw, DenialReason::NotAccessible));
        }

        // Layer 6
        self.policy
            .check_candidate(&candidate)
            .map_err(|reason| Rejection::denied(raw, reason))?;

        // Layer 7
        let allow_symlinks = options
            .allow_symlinks_override
            .unwrap_or_else(|| self.policy.allows_symlinks());
        if !allow_symlinks {
            match security::entry_metadata(&candidate).await {
                Ok(Some(metadata)) if metadata.file_type().is_symlink() => {
                    return Err(Rejection::validation(raw, ValidationFailure::SymlinkNotAllowed));
                }
                Ok(_) => {}
                Err(err) if security::is_loop_error(&err) => {
                    return Err(Rejection::denied(raw, DenialReason::CircularSymlink));
                }
                Err(_) => return Err(Rejection::denied(raw, DenialReason::NotAccessible)),
            }
        }

        // Layer 8
        let canonical = security::canonicalize_existing_prefix(&candidate)
            .await
            .map_err(|reason| Rejection::denied(raw, reason))?;

        // Layer 9
        self.policy
            .check_real(&canonical.real_path)
            .map_err(|reason| Rejection::denied(raw, reason))?;

        // Layer 10
        let accessible = if canonical.existed {
            let mode = if options.check_write {
                Access::ReadWrite
            } else {
                Access::Read
            };
            security::has_access(&canonical.real_path, mode).await
        } else if options.require_exists {
            false
        } else {
            security::nearest_ancestor_writable(&canonical.real_path).await
        };
        if !accessible {
            return Err(Rejection::denied(raw, DenialReason::NotAccessible));
        }

        Ok(ValidatedPath {
            raw_input: raw.to_string(),
            resolved_real_path: canonical.real_path,
            existed: canonical.existed,
        })
    }
}

fn log_rejection(raw: &str, rejection: &Rejection) {
    match rejection {
        // The input may be huge or full of control characters.
        Rejection::InvalidInput { reason } => {
            tracing::debug!("Rejected path input ({}): {}", rejection.code(), reason);
        }
        Rejection::ReservedName { component, .. } => {
            tracing::debug!(
                "Rejected {:?} ({}): reserved name {}",
                sanitize_for_logging(raw),
                rejection.code(),
                component
            );
        }
        Rejection::AccessDenied { reason, .. } => {
            tracing::debug!(
                "Rejected {:?} ({}): {}",
                sanitize_for_logging(raw),
                rejection.code(),
                reason
            );
        }
        Rejection::ValidationError { reason, .. } => {
            tracing::debug!(
                "Rejected {:?} ({}): {}",
                sanitize_for_logging(raw),
                rejection.code(),
                reason
            );
        }
    }
}
