//! Audit trail for path decisions.
//!
//! Every record is emitted on the `fileguard::audit` tracing target and kept in a small
//! in-memory ring. Paths are passed through the sensitive-path classifier before they are
//! stored or logged, so a record can be shipped anywhere.

use chrono::{DateTime, Utc};
use file_access_guard::{SensitivePathClassifier, Sensitivity};
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};
use strum::{AsRefStr, Display};

pub const AUDIT_TARGET: &str = "fileguard::audit";

const DEFAULT_RETAINED_RECORDS: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display, AsRefStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum AuditAction {
    Resolve,
    Inspect,
    Open,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display, AsRefStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum AuditOutcome {
    Allowed,
    Rejected,
    /// Content disagrees with the extension
    Mismatch,
    /// Sensitive file, content not read
    Withheld,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuditRecord {
    pub ts: DateTime<Utc>,
    pub action: AuditAction,
    pub outcome: AuditOutcome,
    /// Caller-supplied path after redaction
    pub path: String,
    /// Rejection code or detected type, depending on the outcome
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

#[derive(Debug)]
pub struct AuditLogger {
    classifier: &'static SensitivePathClassifier,
    retained: Mutex<VecDeque<AuditRecord>>,
    capacity: usize,
}

impl AuditLogger {
    pub fn new(sensitivity: Sensitivity) -> Self {
        Self::with_capacity(sensitivity, DEFAULT_RETAINED_RECORDS)
    }

    pub fn with_capacity(sensitivity: Sensitivity, capacity: usize) -> Self {
        Self {
            classifier: SensitivePathClassifier::for_sensitivity(sensitivity),
            retained: Mutex::new(VecDeque::with_capacity(capacity.min(DEFAULT_RETAINED_RECORDS))),
            capacity,
        }
    }

    /// Record one decision about `path`.
    pub fn record(
        &self,
        action: AuditAction,
        outcome: AuditOutcome,
        path: &str,
        detail: Option<&str>,
    ) -> AuditRecord {
        let record = AuditRecord {
            ts: Utc::now(),
            action,
            outcome,
            path: self.classifier.sanitize_for_logging(path),
            detail: detail.map(str::to_owned),
        };

        match outcome {
            AuditOutcome::Allowed => tracing::info!(
                target: AUDIT_TARGET,
                action = action.as_ref(),
                outcome = outcome.as_ref(),
                path = %record.path,
                "{} {}",
                action,
                outcome
            ),
            _ => tracing::warn!(
                target: AUDIT_TARGET,
                action = action.as_ref(),
                outcome = outcome.as_ref(),
                path = %record.path,
                detail = record.detail.as_deref().unwrap_or(""),
                "{} {}",
                action,
                outcome
            ),
        }

        if self.capacity > 0 {
            let mut retained = self
                .retained
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            if retained.len() == self.capacity {
                retained.pop_front();
            }
            retained.push_back(record.clone());
        }
        record
    }

    /// Most recent records, oldest first.
    pub fn recent(&self) -> Vec<AuditRecord> {
        self.retained
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect()
    }
}

impl Default for AuditLogger {
    fn default() -> Self {
        Self::new(Sensitivity::Standard)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_test::traced_test;

    #[test]
    #[traced_test]
    fn test_sensitive_paths_never_reach_the_log() {
        let audit = AuditLogger::default();
        let record = audit.record(
            AuditAction::Inspect,
            AuditOutcome::Withheld,
            "/home/user/.aws/credentials",
            None,
        );

        assert!(!record.path.contains("credentials"));
        assert!(record.path.contains("[REDACTED]"));
        assert!(logs_contain("inspect withheld"));
        assert!(!logs_contain("credentials"));
    }

    #[test]
    #[traced_test]
    fn test_rejections_carry_their_code() {
        let audit = AuditLogger::default();
        audit.record(
            AuditAction::Resolve,
            AuditOutcome::Rejected,
            "../../../etc/passwd",
            Some("ACCESS_DENIED"),
        );
        assert!(logs_contain("ACCESS_DENIED"));
        assert!(logs_contain("resolve rejected"));
    }

    #[test]
    fn test_retention_is_bounded() {
        let audit = AuditLogger::with_capacity(Sensitivity::Standard, 2);
        for name in ["a.txt", "b.txt", "c.txt"] {
            audit.record(AuditAction::Open, AuditOutcome::Allowed, name, None);
        }
        let paths: Vec<_> = audit.recent().into_iter().map(|r| r.path).collect();
        assert_eq!(paths, vec!["b.txt", "c.txt"]);
    }

    #[test]
    fn test_strict_logger_redacts_more() {
        let standard = AuditLogger::default();
        let strict = AuditLogger::new(Sensitivity::Strict);
        let path = "/srv/app/settings.json";

        let plain = standard.record(AuditAction::Resolve, AuditOutcome::Allowed, path, None);
        let redacted = strict.record(AuditAction::Resolve, AuditOutcome::Allowed, path, None);
        assert_eq!(plain.path, path);
        assert_ne!(redacted.path, path);
    }

    #[test]
    fn test_record_serializes_snake_case() -> Result<(), serde_json::Error> {
        let audit = AuditLogger::with_capacity(Sensitivity::Standard, 0);
        let record = audit.record(AuditAction::Open, AuditOutcome::Mismatch, "x.pdf", Some("EXE"));
        let json = serde_json::to_value(&record)?;
        assert_eq!(json["action"], "open");
        assert_eq!(json["outcome"], "mismatch");
        assert_eq!(json["detail"], "EXE");
        assert!(audit.recent().is_empty());
        Ok(())
    }
}
