//! Content classification by magic number.
//!
//! Reads a bounded prefix of a file and asks the [`SignatureDatabase`] what it actually
//! is. File extensions are only used to decide whether the content disagrees with the
//! name, which is the signal for disguised payloads (a `.pdf` that is really a PE
//! executable).

use crate::error::{DenialReason, Rejection, Result};
use crate::resolver::ValidatedPath;
use crate::security;
use crate::sensitive::{SensitivePathClassifier, Sensitivity, SensitivityVerdict, sanitize_for_logging};
use crate::signatures::{
    DEFAULT_MAX_READ_BYTES, MatchOptions, SignatureDatabase, SignatureDescriptor,
};
use serde::Serialize;
use std::path::Path;
use tokio::fs::File;
use tokio::io::AsyncReadExt;

/// Configuration for content classification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClassifierConfig {
    /// Maximum bytes read from a file and considered for matching
    pub max_read_bytes: usize,
    /// Whether structural validators run after a magic number match
    pub run_validators: bool,
    /// Pattern set used to refuse reading sensitive files
    pub sensitivity: Sensitivity,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            max_read_bytes: DEFAULT_MAX_READ_BYTES,
            run_validators: true,
            sensitivity: Sensitivity::Standard,
        }
    }
}

impl ClassifierConfig {
    const fn match_options(&self) -> MatchOptions {
        MatchOptions {
            max_read_bytes: self.max_read_bytes,
            run_validators: self.run_validators,
        }
    }
}

/// Content disagrees with every format registered for the file's extension.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Mismatch {
    pub expected_types: Vec<&'static str>,
    pub detected_type: &'static str,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClassificationResult {
    pub matched_type: Option<&'static SignatureDescriptor>,
    pub mismatch: Option<Mismatch>,
}

impl ClassificationResult {
    #[must_use]
    pub fn type_id(&self) -> Option<&'static str> {
        self.matched_type.map(|d| d.type_id)
    }
}

/// What [`ContentClassifier::inspect`] found.
///
/// `classification` is `None` when the path is sensitive: such files are never read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Inspection {
    pub sensitivity: SensitivityVerdict,
    pub classification: Option<ClassificationResult>,
    pub bytes_read: usize,
}

#[derive(Debug, Clone)]
pub struct ContentClassifier {
    config: ClassifierConfig,
    database: &'static SignatureDatabase,
}

impl ContentClassifier {
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(ClassifierConfig::default())
    }

    #[must_use]
    pub fn with_config(config: ClassifierConfig) -> Self {
        Self {
            config,
            database: SignatureDatabase::global(),
        }
    }

    #[must_use]
    pub const fn config(&self) -> &ClassifierConfig {
        &self.config
    }

    /// Classify content alone. `mismatch` is always `None`.
    #[must_use]
    pub fn classify(&self, bytes: &[u8]) -> ClassificationResult {
        ClassificationResult {
            matched_type: self.database.match_signature(bytes, self.config.match_options()),
            mismatch: None,
        }
    }

    /// Classify content and compare it with the extension of `path`.
    #[must_use]
    pub fn classify_named(&self, path: &Path, bytes: &[u8]) -> ClassificationResult {
        let matched_type = self.database.match_signature(bytes, self.config.match_options());
        let mismatch = matched_type.and_then(|detected| self.compare_with_extension(path, detected));
        ClassificationResult {
            matched_type,
            mismatch,
        }
    }

    /// Report a mismatch when `path` has a known extension and the detected content is
    /// none of the formats registered for it.
    ///
    /// No extension, an extension unknown to the database, or unrecognized content all
    /// yield `None`.
    #[must_use]
    pub fn detect_extension_mismatch(&self, path: &Path, bytes: &[u8]) -> Option<Mismatch> {
        self.classify_named(path, bytes).mismatch
    }

    fn compare_with_extension(
        &self,
        path: &Path,
        detected: &'static SignatureDescriptor,
    ) -> Option<Mismatch> {
        let ext = path.extension()?.to_str()?;
        let expected = self.database.for_extension(ext);
        if expected.is_empty() || expected.iter().any(|d| *d == detected) {
            return None;
        }
        Some(Mismatch {
            expected_types: expected.iter().map(|d| d.type_id).collect(),
            detected_type: detected.type_id,
        })
    }

    /// Read at most `max_read_bytes` from the current position of `file`.
    ///
    /// # Errors
    /// Returns the underlying I/O error if the read fails.
    pub async fn read_prefix(&self, file: &mut File) -> std::io::Result<Vec<u8>> {
        let limit = u64::try_from(self.config.max_read_bytes).unwrap_or(u64::MAX);
        let mut buffer = Vec::with_capacity(self.config.max_read_bytes.min(DEFAULT_MAX_READ_BYTES));
        file.take(limit).read_to_end(&mut buffer).await?;
        Ok(buffer)
    }

    /// Classify an already opened file. `path` supplies the extension and the sensitivity
    /// check; a sensitive file is not read.
    ///
    /// # Errors
    /// Returns the underlying I/O error if the read fails.
    pub async fn inspect_file(&self, file: &mut File, path: &Path) -> std::io::Result<Inspection> {
        let sensitivity = self.sensitivity_of(&path.to_string_lossy());
        if sensitivity.is_sensitive {
            return Ok(Self::skipped(sensitivity));
        }

        let prefix = self.read_prefix(file).await?;
        let classification = self.classify_named(path, &prefix);
        if let Some(mismatch) = &classification.mismatch {
            tracing::warn!(
                "Content of {} looks like {} but the extension expects {:?}",
                sanitize_for_logging(&path.to_string_lossy()),
                mismatch.detected_type,
                mismatch.expected_types
            );
        }

        Ok(Inspection {
            sensitivity,
            classification: Some(classification),
            bytes_read: prefix.len(),
        })
    }

    /// Open and classify a validated path.
    ///
    /// Sensitivity is judged on both the caller's input and the real path; if either is
    /// sensitive the file is not opened.
    ///
    /// # Errors
    /// Returns [`Rejection::ValidationError`] if the final entry is now a symlink or not a
    /// regular file, and [`Rejection::AccessDenied`] if it cannot be opened or read.
    pub async fn inspect(&self, validated: &ValidatedPath) -> Result<Inspection> {
        let input = validated.raw_input();
        let real_path = validated.real_path();

        let by_input = self.sensitivity_of(input);
        let sensitivity = if by_input.is_sensitive {
            by_input
        } else {
            self.sensitivity_of(&real_path.to_string_lossy())
        };
        if sensitivity.is_sensitive {
            tracing::debug!(
                "Not reading sensitive file {} ({})",
                sanitize_for_logging(input),
                sensitivity.matched_pattern_description.unwrap_or("sensitive")
            );
            return Ok(Self::skipped(sensitivity));
        }

        let mut file = security::open_regular_nofollow(real_path, input).await?;
        self.inspect_file(&mut file, real_path)
            .await
            .map_err(|_| Rejection::denied(input, DenialReason::NotAccessible))
    }

    fn sensitivity_of(&self, path: &str) -> SensitivityVerdict {
        SensitivePathClassifier::for_sensitivity(self.config.sensitivity).verdict(path)
    }

    const fn skipped(sensitivity: SensitivityVerdict) -> Inspection {
        Inspection {
            sensitivity,
            classification: None,
            bytes_read: 0,
        }
    }
}

impl Default for ContentClassifier {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const PNG_HEADER: &[u8] = &[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A];

    #[test]
    fn test_default_config() {
        let config = ClassifierConfig::default();
        assert_eq!(config.max_read_bytes, 64 * 1024);
        assert!(config.run_validators);
        assert_eq!(config.sensitivity, Sensitivity::Standard);
    }

    #[test]
    fn test_classify_png() {
        let result = ContentClassifier::new().classify(PNG_HEADER);
        assert_eq!(result.type_id(), Some("PNG"));
        assert!(result.mismatch.is_none());
    }

    #[test]
    fn test_exe_disguised_as_pdf() {
        let classifier = ContentClassifier::new();
        let mismatch = classifier.detect_extension_mismatch(Path::new("invoice.pdf"), b"MZ\x90\x00\x03\x00");

        let mismatch = mismatch.expect("PE content under .pdf should be flagged");
        assert_eq!(mismatch.detected_type, "EXE");
        assert_eq!(mismatch.expected_types, vec!["PDF"]);
        assert!(!mismatch.expected_types.contains(&mismatch.detected_type));
    }

    #[test]
    fn test_matching_extension_is_not_a_mismatch() {
        let classifier = ContentClassifier::new();
        assert!(classifier
            .detect_extension_mismatch(Path::new("report.PDF"), b"%PDF-1.7\n")
            .is_none());
        // Either GIF variant satisfies .gif
        assert!(classifier
            .detect_extension_mismatch(Path::new("anim.gif"), b"GIF87a\x01\x00")
            .is_none());
    }

    #[test]
    fn test_no_verdict_without_extension_or_match() {
        let classifier = ContentClassifier::new();
        assert!(classifier
            .detect_extension_mismatch(Path::new("README"), b"MZ")
            .is_none());
        assert!(classifier
            .detect_extension_mismatch(Path::new("notes.txt"), b"MZ")
            .is_none());
        assert!(classifier
            .detect_extension_mismatch(Path::new("report.pdf"), b"plain words")
            .is_none());
    }

    #[test]
    fn test_classify_named_reports_both() {
        let result = ContentClassifier::new().classify_named(Path::new("photo.jpg"), PNG_HEADER);
        assert_eq!(result.type_id(), Some("PNG"));
        assert_eq!(
            result.mismatch.map(|m| m.detected_type),
            Some("PNG")
        );
    }

    #[tokio::test]
    async fn test_read_prefix_is_bounded() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let mut temp_file = NamedTempFile::new()?;
        temp_file.write_all(&[b'a'; 4096])?;

        let classifier = ContentClassifier::with_config(ClassifierConfig {
            max_read_bytes: 100,
            ..ClassifierConfig::default()
        });
        let mut file = File::open(temp_file.path()).await?;
        let prefix = classifier.read_prefix(&mut file).await?;
        assert_eq!(prefix.len(), 100);
        Ok(())
    }

    #[tokio::test]
    async fn test_inspect_file_classifies_content() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("image.png");
        std::fs::write(&path, PNG_HEADER)?;

        let mut file = File::open(&path).await?;
        let inspection = ContentClassifier::new().inspect_file(&mut file, &path).await?;

        assert!(!inspection.sensitivity.is_sensitive);
        assert_eq!(inspection.bytes_read, PNG_HEADER.len());
        assert_eq!(
            inspection.classification.and_then(|c| c.type_id()),
            Some("PNG")
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_inspect_file_skips_sensitive_files() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join(".env");
        std::fs::write(&path, "API_KEY=hunter2")?;

        let mut file = File::open(&path).await?;
        let inspection = ContentClassifier::new().inspect_file(&mut file, &path).await?;

        assert!(inspection.sensitivity.is_sensitive);
        assert!(inspection.classification.is_none());
        assert_eq!(inspection.bytes_read, 0);
        Ok(())
    }
}
