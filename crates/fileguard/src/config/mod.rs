use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use file_access_guard::input::expand;
use file_access_guard::policy::{platform_blocked_patterns, platform_user_directories};
use file_access_guard::{
    ClassifierConfig, ExpansionContext, PathPolicy, PolicySource, Sensitivity,
    sanitize_for_logging,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::errors::{AppError, AppResult};

pub mod defaults;

use defaults::*;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub security: SecurityConfig,
    #[serde(default)]
    pub classifier: ClassifierSection,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Which paths the engine will hand out
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecurityConfig {
    /// Confine every resolution to these directories, which are also whitelisted.
    /// Empty means unconfined.
    #[serde(default)]
    pub allowed_roots: Vec<PathBuf>,
    /// User-added whitelist entries; `~` and `$VAR` are expanded at load time
    #[serde(default)]
    pub custom_allowed_directories: Vec<String>,
    /// Whitelist Documents, Downloads, Desktop, Pictures, Music and Videos
    #[serde(default = "default_include_default_directories")]
    pub include_default_directories: bool,
    /// Extra regular expressions matched against the normalized path
    #[serde(default)]
    pub extra_blocked_patterns: Vec<String>,
    #[serde(default = "default_include_platform_blacklist")]
    pub include_platform_blacklist: bool,
    #[serde(default = "default_enforce_whitelist")]
    pub enforce_whitelist: bool,
    #[serde(default = "default_allow_symlinks")]
    pub allow_symlinks: bool,
    #[serde(default = "default_strict_sensitivity")]
    pub strict_sensitivity: bool,
    /// Directory relative inputs are resolved against; the working directory when unset
    #[serde(default)]
    pub base_directory: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassifierSection {
    #[serde(default = "default_max_read_bytes")]
    pub max_read_bytes: usize,
    #[serde(default = "default_run_validators")]
    pub run_validators: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_json_logs")]
    pub json: bool,
}

fn default_include_default_directories() -> bool {
    DEFAULT_INCLUDE_DEFAULT_DIRECTORIES
}

fn default_include_platform_blacklist() -> bool {
    DEFAULT_INCLUDE_PLATFORM_BLACKLIST
}

fn default_enforce_whitelist() -> bool {
    DEFAULT_ENFORCE_WHITELIST
}

fn default_allow_symlinks() -> bool {
    DEFAULT_ALLOW_SYMLINKS
}

fn default_strict_sensitivity() -> bool {
    DEFAULT_STRICT_SENSITIVITY
}

fn default_max_read_bytes() -> usize {
    DEFAULT_MAX_READ_BYTES
}

fn default_run_validators() -> bool {
    DEFAULT_RUN_VALIDATORS
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

fn default_json_logs() -> bool {
    DEFAULT_JSON_LOGS
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            allowed_roots: Vec::new(),
            custom_allowed_directories: Vec::new(),
            include_default_directories: default_include_default_directories(),
            extra_blocked_patterns: Vec::new(),
            include_platform_blacklist: default_include_platform_blacklist(),
            enforce_whitelist: default_enforce_whitelist(),
            allow_symlinks: default_allow_symlinks(),
            strict_sensitivity: default_strict_sensitivity(),
            base_directory: None,
        }
    }
}

impl Default for ClassifierSection {
    fn default() -> Self {
        Self {
            max_read_bytes: default_max_read_bytes(),
            run_validators: default_run_validators(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: default_json_logs(),
        }
    }
}

impl Config {
    /// Load from `$FILEGUARD_CONFIG`, falling back to `fileguard.toml` in the working directory.
    pub fn load() -> AppResult<Self> {
        let config_file =
            std::env::var(CONFIG_FILE_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_FILE.to_string());
        Self::load_from_file(&config_file)
    }

    /// Defaults, then the TOML file (if present), then `FILEGUARD_*` environment variables.
    ///
    /// Nested keys use a double underscore: `FILEGUARD_SECURITY__ENFORCE_WHITELIST=false`.
    pub fn load_from_file<P: AsRef<Path>>(config_file: P) -> AppResult<Self> {
        let config_file = config_file.as_ref();
        if config_file.exists() {
            info!("Loading configuration from {}", config_file.display());
        } else {
            debug!(
                "Config file {} not found, using defaults",
                config_file.display()
            );
        }

        let config: Self = Figment::from(Serialized::defaults(Self::default()))
            .merge(Toml::file(config_file))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the engine cannot work with
    pub fn validate(&self) -> AppResult<()> {
        let max = self.classifier.max_read_bytes;
        if max == 0 || max > MAX_READ_BYTES_CEILING {
            return Err(AppError::configuration(format!(
                "classifier.max_read_bytes must be between 1 and {MAX_READ_BYTES_CEILING}, got {max}"
            )));
        }

        if !LOG_LEVELS.contains(&self.logging.level.to_ascii_lowercase().as_str()) {
            return Err(AppError::configuration(format!(
                "logging.level must be one of {}, got '{}'",
                LOG_LEVELS.join(", "),
                self.logging.level
            )));
        }

        if let Some(base) = &self.security.base_directory
            && !base.is_absolute()
        {
            return Err(AppError::configuration(
                "security.base_directory must be an absolute path",
            ));
        }

        Ok(())
    }

    /// Build the immutable policy snapshot this configuration describes.
    pub fn build_policy(&self) -> AppResult<PathPolicy> {
        let source = ConfigPolicySource::new(&self.security);
        let policy = PathPolicy::from_source(&source)?;
        if self.security.allowed_roots.is_empty() {
            return Ok(policy);
        }
        Ok(policy.confined_to(self.security.allowed_roots.iter().cloned())?)
    }

    pub fn classifier_config(&self) -> ClassifierConfig {
        ClassifierConfig {
            max_read_bytes: self.classifier.max_read_bytes,
            run_validators: self.classifier.run_validators,
            sensitivity: self.sensitivity(),
        }
    }

    pub const fn sensitivity(&self) -> Sensitivity {
        if self.security.strict_sensitivity {
            Sensitivity::Strict
        } else {
            Sensitivity::Standard
        }
    }
}

/// [`PolicySource`] backed by the `[security]` section.
#[derive(Debug, Clone)]
pub struct ConfigPolicySource {
    security: SecurityConfig,
    expansion: ExpansionContext,
}

impl ConfigPolicySource {
    pub fn new(security: &SecurityConfig) -> Self {
        Self::with_expansion(security, ExpansionContext::from_process())
    }

    pub fn with_expansion(security: &SecurityConfig, expansion: ExpansionContext) -> Self {
        Self {
            security: security.clone(),
            expansion,
        }
    }
}

impl PolicySource for ConfigPolicySource {
    fn default_allowed_directories(&self) -> Vec<PathBuf> {
        if self.security.include_default_directories {
            platform_user_directories()
        } else {
            Vec::new()
        }
    }

    /// Expanded custom directories, plus the allowed roots, which are always whitelisted.
    fn custom_allowed_directories(&self) -> Vec<PathBuf> {
        self.security
            .custom_allowed_directories
            .iter()
            .filter_map(|dir| match expand(dir, &self.expansion) {
                Ok(expanded) if Path::new(expanded.as_ref()).is_absolute() => {
                    Some(PathBuf::from(expanded.into_owned()))
                }
                Ok(_) => {
                    warn!(
                        "Skipping custom allowed directory {}: not an absolute path",
                        sanitize_for_logging(dir)
                    );
                    None
                }
                Err(e) => {
                    warn!(
                        "Skipping custom allowed directory {}: {}",
                        sanitize_for_logging(dir),
                        e
                    );
                    None
                }
            })
            .chain(self.security.allowed_roots.iter().cloned())
            .collect()
    }

    fn always_blocked_patterns(&self) -> Vec<String> {
        let mut patterns = if self.security.include_platform_blacklist {
            platform_blocked_patterns()
        } else {
            Vec::new()
        };
        patterns.extend(self.security.extra_blocked_patterns.iter().cloned());
        patterns
    }

    fn enforce_whitelist(&self) -> bool {
        self.security.enforce_whitelist
    }

    fn allow_symlinks(&self) -> bool {
        self.security.allow_symlinks
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::collections::HashMap;

    type TestResult = Result<(), Box<dyn std::error::Error>>;

    #[test]
    fn test_defaults_validate() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert!(config.security.enforce_whitelist);
        assert_eq!(config.classifier.max_read_bytes, 64 * 1024);
        assert_eq!(config.sensitivity(), Sensitivity::Standard);
    }

    #[test]
    #[serial]
    fn test_missing_file_yields_defaults() -> TestResult {
        let temp_dir = tempfile::tempdir()?;
        let config = Config::load_from_file(temp_dir.path().join("absent.toml"))?;
        assert_eq!(config, Config::default());
        assert!(!temp_dir.path().join("absent.toml").exists());
        Ok(())
    }

    #[test]
    #[serial]
    fn test_toml_then_environment() -> TestResult {
        let temp_dir = tempfile::tempdir()?;
        let path = temp_dir.path().join("fileguard.toml");
        std::fs::write(
            &path,
            r#"
[security]
enforce_whitelist = false
extra_blocked_patterns = ["(^|/)secrets(/|$)"]

[classifier]
max_read_bytes = 4096
"#,
        )?;

        // SAFETY: serialized with every other test that touches the environment
        unsafe { std::env::set_var("FILEGUARD_CLASSIFIER__RUN_VALIDATORS", "false") };
        let loaded = Config::load_from_file(&path);
        unsafe { std::env::remove_var("FILEGUARD_CLASSIFIER__RUN_VALIDATORS") };
        let config = loaded?;

        assert!(!config.security.enforce_whitelist);
        assert_eq!(config.security.extra_blocked_patterns.len(), 1);
        assert_eq!(config.classifier.max_read_bytes, 4096);
        assert!(!config.classifier.run_validators);
        assert!(config.security.allow_symlinks);
        Ok(())
    }

    #[test]
    #[serial]
    fn test_out_of_range_read_limit_is_rejected() -> TestResult {
        let temp_dir = tempfile::tempdir()?;
        let path = temp_dir.path().join("fileguard.toml");
        std::fs::write(&path, "[classifier]\nmax_read_bytes = 0\n")?;

        let err = Config::load_from_file(&path).err().ok_or("expected an error")?;
        assert!(matches!(err, AppError::Configuration { .. }));
        Ok(())
    }

    #[test]
    fn test_unknown_log_level_is_rejected() {
        let mut config = Config::default();
        config.logging.level = "loud".to_string();
        assert!(config.validate().is_err());
        config.logging.level = "DEBUG".to_string();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_policy_source_expands_custom_directories() {
        let security = SecurityConfig {
            custom_allowed_directories: vec![
                "~/projects".to_string(),
                "$DATA/shared".to_string(),
                "$UNSET/never".to_string(),
            ],
            allowed_roots: vec![PathBuf::from("/srv/shared")],
            include_default_directories: false,
            ..SecurityConfig::default()
        };
        let expansion = ExpansionContext::fixed(
            Some(PathBuf::from("/home/tester")),
            HashMap::from([("DATA".to_string(), "/data".to_string())]),
        );
        let source = ConfigPolicySource::with_expansion(&security, expansion);

        assert!(source.default_allowed_directories().is_empty());
        assert_eq!(
            source.custom_allowed_directories(),
            vec![
                PathBuf::from("/home/tester/projects"),
                PathBuf::from("/data/shared"),
                PathBuf::from("/srv/shared")
            ]
        );
    }

    #[test]
    fn test_policy_source_blocked_patterns() {
        let security = SecurityConfig {
            include_platform_blacklist: false,
            extra_blocked_patterns: vec!["(^|/)private(/|$)".to_string()],
            ..SecurityConfig::default()
        };
        let source = ConfigPolicySource::new(&security);
        assert_eq!(source.always_blocked_patterns(), vec!["(^|/)private(/|$)"]);

        let with_platform = ConfigPolicySource::new(&SecurityConfig::default());
        assert!(with_platform.always_blocked_patterns().len() > 1);
    }

    #[test]
    fn test_build_policy_confines_to_allowed_roots() -> TestResult {
        let temp_dir = tempfile::tempdir()?;
        let config = Config {
            security: SecurityConfig {
                allowed_roots: vec![temp_dir.path().to_path_buf()],
                include_default_directories: false,
                ..SecurityConfig::default()
            },
            ..Config::default()
        };
        let policy = config.build_policy()?;
        assert_eq!(policy.allowed_roots().map(<[_]>::len), Some(1));

        let missing = Config {
            security: SecurityConfig {
                allowed_roots: vec![temp_dir.path().join("gone")],
                ..SecurityConfig::default()
            },
            ..Config::default()
        };
        assert!(matches!(missing.build_policy(), Err(AppError::Policy(_))));
        Ok(())
    }

    #[test]
    fn test_strict_sensitivity_flows_into_classifier_config() {
        let mut config = Config::default();
        config.security.strict_sensitivity = true;
        config.classifier.run_validators = false;
        let classifier = config.classifier_config();
        assert_eq!(classifier.sensitivity, Sensitivity::Strict);
        assert!(!classifier.run_validators);
    }
}
