/// Configuration default values
///
/// This module contains all the default values for configuration options,
/// making them easily changeable in one central location.
// Loading
pub const DEFAULT_CONFIG_FILE: &str = "fileguard.toml";
pub const CONFIG_FILE_ENV: &str = "FILEGUARD_CONFIG";
pub const ENV_PREFIX: &str = "FILEGUARD_";

// Security defaults
pub const DEFAULT_INCLUDE_DEFAULT_DIRECTORIES: bool = true;
pub const DEFAULT_INCLUDE_PLATFORM_BLACKLIST: bool = true;
pub const DEFAULT_ENFORCE_WHITELIST: bool = true;
pub const DEFAULT_ALLOW_SYMLINKS: bool = true;
pub const DEFAULT_STRICT_SENSITIVITY: bool = false;

// Classifier defaults
pub const DEFAULT_MAX_READ_BYTES: usize = 64 * 1024;
pub const MAX_READ_BYTES_CEILING: usize = 16 * 1024 * 1024;
pub const DEFAULT_RUN_VALIDATORS: bool = true;

// Logging defaults
pub const DEFAULT_LOG_LEVEL: &str = "info";
pub const DEFAULT_JSON_LOGS: bool = false;
pub const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];
