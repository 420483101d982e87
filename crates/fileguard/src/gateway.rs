//! The entry point tool handlers go through before touching the filesystem.
//!
//! A handler receives an untrusted path argument, asks the gateway to validate or inspect
//! it, and only ever works with the [`ValidatedPath`] or open file handed back. Every
//! decision is audited; every refusal comes back as a [`ToolError`].

use file_access_guard::input::check_value_shape;
use file_access_guard::{
    ContentClassifier, Inspection, PathResolver, Rejection, RejectionKind, ResolveOptions,
    SensitivityVerdict, ValidatedPath,
};
use serde::Serialize;
use serde_json::Value;
use strum::{Display, EnumString};
use tokio::fs::File;

use crate::audit::{AuditAction, AuditLogger, AuditOutcome};
use crate::config::Config;
use crate::errors::{AppResult, ToolError, ToolResult};

const INVALID_INPUT_PLACEHOLDER: &str = "<invalid input>";

/// What the handler is about to do with the path
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Display, EnumString)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum AccessIntent {
    /// Read an existing file or directory
    #[default]
    Read,
    /// Modify an existing entry
    Modify,
    /// Create a new entry; the path may not exist yet
    Create,
}

impl AccessIntent {
    pub const fn resolve_options(self) -> ResolveOptions {
        match self {
            Self::Read => ResolveOptions::must_exist(),
            Self::Modify => ResolveOptions::must_exist().with_write(true),
            Self::Create => ResolveOptions::allow_missing().with_write(true),
        }
    }
}

/// What `inspect` reports back to a tool caller. Contains no resolved path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InspectReport {
    pub path: String,
    pub sensitivity: SensitivityVerdict,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detected_type: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expected_types: Option<Vec<&'static str>>,
    pub extension_mismatch: bool,
    pub bytes_read: usize,
}

impl InspectReport {
    fn new(input: &str, inspection: Inspection) -> Self {
        let matched = inspection
            .classification
            .as_ref()
            .and_then(|c| c.matched_type);
        let mismatch = inspection.classification.and_then(|c| c.mismatch);
        Self {
            path: input.to_string(),
            sensitivity: inspection.sensitivity,
            detected_type: matched.map(|d| d.type_id),
            mime_type: matched.map(|d| d.mime_type),
            category: matched.map(|d| d.category.to_string()),
            extension_mismatch: mismatch.is_some(),
            expected_types: mismatch.map(|m| m.expected_types),
            bytes_read: inspection.bytes_read,
        }
    }
}

#[derive(Debug)]
pub struct ToolGateway {
    resolver: PathResolver,
    classifier: ContentClassifier,
    audit: AuditLogger,
}

impl ToolGateway {
    pub const fn new(
        resolver: PathResolver,
        classifier: ContentClassifier,
        audit: AuditLogger,
    ) -> Self {
        Self {
            resolver,
            classifier,
            audit,
        }
    }

    /// Build the policy, resolver, classifier and audit logger a [`Config`] describes.
    pub fn from_config(config: &Config) -> AppResult<Self> {
        let policy = config.build_policy()?;
        let mut resolver = PathResolver::new(policy);
        if let Some(base) = &config.security.base_directory {
            resolver = resolver.with_base_dir(base);
        }
        Ok(Self::new(
            resolver,
            ContentClassifier::with_config(config.classifier_config()),
            AuditLogger::new(config.sensitivity()),
        ))
    }

    pub const fn resolver(&self) -> &PathResolver {
        &self.resolver
    }

    pub const fn audit(&self) -> &AuditLogger {
        &self.audit
    }

    /// Validate a raw tool argument for `intent`.
    pub async fn validate(&self, argument: &Value, intent: AccessIntent) -> ToolResult<ValidatedPath> {
        self.validate_with(argument, intent.resolve_options()).await
    }

    /// Validate with explicit options, for callers that need to override symlink handling.
    pub async fn validate_with(
        &self,
        argument: &Value,
        options: ResolveOptions,
    ) -> ToolResult<ValidatedPath> {
        let shown = argument.as_str().unwrap_or_default();
        match self.resolver.resolve_value(argument, options).await {
            Ok(validated) => {
                self.audit
                    .record(AuditAction::Resolve, AuditOutcome::Allowed, shown, None);
                Ok(validated)
            }
            Err(rejection) => Err(self.rejected(AuditAction::Resolve, shown, &rejection)),
        }
    }

    /// Validate an existing path and report what its content really is.
    pub async fn inspect(&self, argument: &Value) -> ToolResult<InspectReport> {
        let validated = self.validate(argument, AccessIntent::Read).await?;
        let input = validated.raw_input();
        let inspection = match self.classifier.inspect(&validated).await {
            Ok(inspection) => inspection,
            Err(rejection) => return Err(self.rejected(AuditAction::Inspect, input, &rejection)),
        };

        let report = InspectReport::new(input, inspection);
        let (outcome, detail) = if report.sensitivity.is_sensitive {
            (
                AuditOutcome::Withheld,
                report.sensitivity.matched_pattern_description,
            )
        } else if report.extension_mismatch {
            (AuditOutcome::Mismatch, report.detected_type)
        } else {
            (AuditOutcome::Allowed, report.detected_type)
        };
        self.audit
            .record(AuditAction::Inspect, outcome, input, detail);
        Ok(report)
    }

    /// Open an existing regular file for streaming without following a symlink.
    pub async fn open_for_streaming(&self, argument: &Value) -> ToolResult<(ValidatedPath, File)> {
        let raw = match check_value_shape(argument) {
            Ok(raw) => raw,
            Err(rejection) => return Err(self.rejected(AuditAction::Open, "", &rejection)),
        };
        match self.resolver.open_validated(raw).await {
            Ok(opened) => {
                self.audit
                    .record(AuditAction::Open, AuditOutcome::Allowed, raw, None);
                Ok(opened)
            }
            Err(rejection) => Err(self.rejected(AuditAction::Open, raw, &rejection)),
        }
    }

    fn rejected(&self, action: AuditAction, input: &str, rejection: &Rejection) -> ToolError {
        // Invalid input may be huge or hold control characters; it is not recorded.
        let shown = match rejection.kind() {
            RejectionKind::InvalidInput => INVALID_INPUT_PLACEHOLDER,
            _ => input,
        };
        self.audit
            .record(action, AuditOutcome::Rejected, shown, Some(rejection.code()));
        ToolError::from(rejection)
    }
}
