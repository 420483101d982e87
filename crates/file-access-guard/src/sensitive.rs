//! Sensitive-path recognition.
//!
//! A pure matcher over path strings that flags credential, key and history files. It
//! never touches the filesystem: a path can be sensitive without existing. Matching is
//! case-insensitive and treats `\` like `/`.

use crate::error::PolicyError;
use regex::{RegexSet, RegexSetBuilder};
use serde::Serialize;
use std::sync::OnceLock;

/// Marker substituted for the final segment of a sensitive path.
pub const REDACTION_MARKER: &str = "[REDACTED]";

/// `(pattern, description)`; the description is what audit logs may record.
pub type PatternRule = (&'static str, &'static str);

const STANDARD_RULES: &[PatternRule] = &[
    // Directories
    (r"(^|/)\.ssh(/|$)", "SSH directory"),
    (r"(^|/)\.aws(/|$)", "AWS configuration directory"),
    (r"(^|/)\.gnupg(/|$)", "GnuPG directory"),
    // Files
    (r"(^|/)\.env[^/]*$", "environment file"),
    (r"(^|/)id_(rsa|dsa|ecdsa|ed25519)$", "SSH private key"),
    (r"(^|/)\.kube/config$", "Kubernetes config"),
    (
        r"\.(pem|key|p12|pfx|jks|keystore|ppk)$",
        "private key or certificate store",
    ),
    (
        r"(^|/)(shadow|gshadow|passwd|master\.passwd)$",
        "system account database",
    ),
    (
        r"(^|/)(\.[a-z0-9_]*_history|\.history|fish_history)$",
        "shell history",
    ),
    (
        r"(^|/)(\.netrc|\.pgpass|\.git-credentials|\.npmrc|\.pypirc)$",
        "credential store",
    ),
    (
        r"(^|/)[^/]*(password|passwd|secret|credential|token)[^/]*$",
        "credential name",
    ),
    (r"(\.(bak|backup|old|orig|swp|swo)|~)$", "backup file"),
];

const STRICT_RULES: &[PatternRule] = &[
    (r"(^|/)config\.json$", "generic config file"),
    (
        r"(^|/)(settings|secrets?|credentials?)\.(json|ya?ml|toml|ini)$",
        "settings file",
    ),
    (
        r"(^|/)\.(docker|azure|gcloud|kube|terraform\.d)(/|$)",
        "cloud tool configuration directory",
    ),
    (r"(^|/)\.git/config$", "repository config"),
    (r"\.(sqlite3?|db|kdbx)$", "local database"),
    (r"\.(tfstate|tfvars)$", "infrastructure state"),
];

/// Which pattern sets a classifier uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Sensitivity {
    #[default]
    Standard,
    /// Standard plus a broader set for higher-paranoia contexts.
    Strict,
}

/// Result of classifying one path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SensitivityVerdict {
    pub is_sensitive: bool,
    pub matched_pattern_description: Option<&'static str>,
}

impl SensitivityVerdict {
    const NOT_SENSITIVE: Self = Self {
        is_sensitive: false,
        matched_pattern_description: None,
    };
}

#[derive(Debug)]
pub struct SensitivePathClassifier {
    // `None` only if the built-in patterns failed to compile; every path is then sensitive.
    set: Option<RegexSet>,
    descriptions: Vec<&'static str>,
}

impl SensitivePathClassifier {
    /// Build a classifier from `(pattern, description)` rules.
    ///
    /// Patterns are matched case-insensitively against the path with `\` turned into `/`.
    ///
    /// # Errors
    /// Returns [`PolicyError::InvalidPattern`] if a pattern does not compile.
    pub fn new(rules: &[PatternRule]) -> Result<Self, PolicyError> {
        for (pattern, _) in rules {
            regex::Regex::new(pattern).map_err(|source| PolicyError::InvalidPattern {
                pattern: (*pattern).to_string(),
                source,
            })?;
        }
        let set = RegexSetBuilder::new(rules.iter().map(|(pattern, _)| *pattern))
            .case_insensitive(true)
            .build()
            .map_err(|source| PolicyError::InvalidPattern {
                pattern: "<sensitive pattern set>".to_string(),
                source,
            })?;

        Ok(Self {
            set: Some(set),
            descriptions: rules.iter().map(|(_, description)| *description).collect(),
        })
    }

    fn built_in(rules: Vec<PatternRule>) -> Self {
        Self::new(&rules).unwrap_or_else(|err| {
            tracing::error!("Sensitive path patterns failed to compile, treating all paths as sensitive: {err}");
            Self {
                set: None,
                descriptions: Vec::new(),
            }
        })
    }

    /// The shared standard classifier.
    #[must_use]
    pub fn standard() -> &'static Self {
        static STANDARD: OnceLock<SensitivePathClassifier> = OnceLock::new();
        STANDARD.get_or_init(|| Self::built_in(STANDARD_RULES.to_vec()))
    }

    /// The shared strict classifier.
    #[must_use]
    pub fn strict() -> &'static Self {
        static STRICT: OnceLock<SensitivePathClassifier> = OnceLock::new();
        STRICT.get_or_init(|| {
            Self::built_in(STANDARD_RULES.iter().chain(STRICT_RULES).copied().collect())
        })
    }

    #[must_use]
    pub fn for_sensitivity(sensitivity: Sensitivity) -> &'static Self {
        match sensitivity {
            Sensitivity::Standard => Self::standard(),
            Sensitivity::Strict => Self::strict(),
        }
    }

    #[must_use]
    pub fn verdict(&self, path: &str) -> SensitivityVerdict {
        let Some(set) = &self.set else {
            return SensitivityVerdict {
                is_sensitive: true,
                matched_pattern_description: Some("classifier unavailable"),
            };
        };

        let normalized = path.replace('\\', "/");
        set.matches(&normalized)
            .iter()
            .next()
            .map_or(SensitivityVerdict::NOT_SENSITIVE, |index| SensitivityVerdict {
                is_sensitive: true,
                matched_pattern_description: self.descriptions.get(index).copied(),
            })
    }

    #[must_use]
    pub fn is_sensitive(&self, path: &str) -> bool {
        self.verdict(path).is_sensitive
    }

    /// Which pattern fired. Suitable for audit logs; never contains the path.
    #[must_use]
    pub fn describe_match(&self, path: &str) -> Option<&'static str> {
        self.verdict(path).matched_pattern_description
    }

    /// The path with its final segment replaced by [`REDACTION_MARKER`] when sensitive,
    /// otherwise unchanged.
    #[must_use]
    pub fn sanitize_for_logging(&self, path: &str) -> String {
        if !self.is_sensitive(path) {
            return path.to_string();
        }

        let trimmed = path.trim_end_matches(['/', '\\']);
        match trimmed.rfind(['/', '\\']) {
            Some(index) => format!("{}{REDACTION_MARKER}", &trimmed[..=index]),
            None => REDACTION_MARKER.to_string(),
        }
    }
}

/// [`SensitivePathClassifier::is_sensitive`] with the standard patterns.
#[must_use]
pub fn is_sensitive(path: &str) -> bool {
    SensitivePathClassifier::standard().is_sensitive(path)
}

/// [`SensitivePathClassifier::sanitize_for_logging`] with the standard patterns.
#[must_use]
pub fn sanitize_for_logging(path: &str) -> String {
    SensitivePathClassifier::standard().sanitize_for_logging(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("/home/user/.env", "environment file")]
    #[case("/srv/app/.env.production", "environment file")]
    #[case("/home/user/.ssh/id_ed25519", "SSH directory")]
    #[case("id_rsa", "SSH private key")]
    #[case("/home/user/.aws/credentials", "AWS configuration directory")]
    #[case("/home/user/.kube/config", "Kubernetes config")]
    #[case("/etc/ssl/private/server.KEY", "private key or certificate store")]
    #[case("/etc/shadow", "system account database")]
    #[case("/home/user/.bash_history", "shell history")]
    #[case("/home/user/.zsh_history", "shell history")]
    #[case("/home/user/.netrc", "credential store")]
    #[case("/home/user/Documents/Passwords.xlsx", "credential name")]
    #[case("/home/user/api_token.txt", "credential name")]
    #[case("/home/user/notes.txt.bak", "backup file")]
    #[case("/home/user/draft.md~", "backup file")]
    #[case(r"C:\Users\me\.ssh\known_hosts", "SSH directory")]
    fn test_standard_patterns(#[case] path: &str, #[case] description: &'static str) {
        let classifier = SensitivePathClassifier::standard();
        assert_eq!(
            classifier.verdict(path),
            SensitivityVerdict {
                is_sensitive: true,
                matched_pattern_description: Some(description),
            }
        );
    }

    #[rstest]
    #[case("/home/user/readme.txt")]
    #[case("/home/user/Documents/report.pdf")]
    #[case("/home/user/environment/notes.md")]
    #[case("/home/user/id_rsa.pub")]
    #[case("/home/user/project/config.json")]
    fn test_ordinary_paths_are_not_sensitive(#[case] path: &str) {
        assert!(!is_sensitive(path));
        assert!(SensitivePathClassifier::standard().describe_match(path).is_none());
    }

    #[rstest]
    #[case("/home/user/project/config.json")]
    #[case("/home/user/.docker/config.json")]
    #[case("/repo/.git/config")]
    #[case("/home/user/vault.kdbx")]
    #[case("/srv/infra/prod.tfstate")]
    fn test_strict_mode_adds_patterns(#[case] path: &str) {
        assert!(SensitivePathClassifier::strict().is_sensitive(path));
    }

    #[test]
    fn test_strict_is_a_superset() {
        let strict = SensitivePathClassifier::for_sensitivity(Sensitivity::Strict);
        assert!(strict.is_sensitive("/home/user/.env"));
        assert_eq!(
            strict.describe_match("/home/user/.env"),
            Some("environment file")
        );
    }

    #[rstest]
    #[case("/home/user/.env", "/home/user/[REDACTED]")]
    #[case(r"C:\Users\me\.aws\credentials", r"C:\Users\me\.aws\[REDACTED]")]
    #[case("/home/user/.ssh/", "/home/user/[REDACTED]")]
    #[case("id_rsa", "[REDACTED]")]
    #[case("/home/user/readme.txt", "/home/user/readme.txt")]
    fn test_sanitize_for_logging(#[case] path: &str, #[case] expected: &str) {
        assert_eq!(sanitize_for_logging(path), expected);
    }

    #[test]
    fn test_redacted_env_path_does_not_mention_env() {
        assert!(!sanitize_for_logging("/home/user/.env").contains(".env"));
    }

    #[test]
    fn test_invalid_custom_rule_is_reported() {
        let err = SensitivePathClassifier::new(&[("(unclosed", "broken")]);
        assert!(matches!(err, Err(PolicyError::InvalidPattern { .. })));
    }

    #[test]
    fn test_custom_rules_from_outside_the_module() -> Result<(), PolicyError> {
        let rules: Vec<crate::PatternRule> = vec![(r"(^|/)vault(/|$)", "vault directory")];
        let classifier = SensitivePathClassifier::new(&rules)?;
        assert_eq!(
            classifier.describe_match(r"D:\Team\VAULT\keys.txt"),
            Some("vault directory")
        );
        assert!(!classifier.is_sensitive("/srv/vaulted/readme.md"));
        Ok(())
    }
}
