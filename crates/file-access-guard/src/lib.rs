//! # File Access Guard
//!
//! Proves that an untrusted path string names a safe location, and finds out what a file
//! really is before anyone acts on it.
//!
//! ## Features
//!
//! - **Layered path resolution**: expansion, character and reserved-name checks,
//!   blacklist before whitelist, loop-aware canonicalization, containment re-check on
//!   the real path, and access checks
//! - **TOCTOU-hardened open**: `open_validated` refuses to follow a symlink at open time
//! - **Magic number detection** from an ordered signature database, with structural
//!   validators for ZIP, RIFF, ISO-BMFF and EBML containers
//! - **Extension mismatch detection** for disguised payloads
//! - **Sensitive path recognition** and log redaction
//! - **Typed rejections** that never echo resolved filesystem paths
//!
//! ## Basic Usage
//!
//! ```rust,no_run
//! use file_access_guard::{PathPolicy, PathResolver, ResolveOptions, ContentClassifier};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let policy = PathPolicy::builder()
//!     .allowed_root("/srv/shared")
//!     .build()?;
//! let resolver = PathResolver::new(policy);
//!
//! let (validated, mut file) = resolver.open_validated("/srv/shared/report.pdf").await?;
//! let inspection = ContentClassifier::new()
//!     .inspect_file(&mut file, validated.real_path())
//!     .await?;
//! if let Some(mismatch) = inspection.classification.and_then(|c| c.mismatch) {
//!     println!("{} is really {}", validated.raw_input(), mismatch.detected_type);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Policies
//!
//! A [`PathPolicy`] is immutable. Build it once from a [`PolicySource`] (or the builder)
//! and share it; rebuild it when the configuration changes.
//!
//! ```rust,no_run
//! use file_access_guard::{PathPolicy, PlatformPolicySource};
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let source = PlatformPolicySource::new().with_custom_directories(["/data/projects"]);
//! let policy = PathPolicy::from_source(&source)?;
//! assert!(policy.enforces_whitelist());
//! # Ok(())
//! # }
//! ```
//!
//! ## Sensitive paths
//!
//! ```rust
//! use file_access_guard::sanitize_for_logging;
//!
//! assert_eq!(sanitize_for_logging("/home/user/.env"), "/home/user/[REDACTED]");
//! assert_eq!(sanitize_for_logging("/home/user/readme.txt"), "/home/user/readme.txt");
//! ```

pub mod categorize;
pub mod error;
pub mod file_types;
pub mod input;
pub mod policy;
pub mod resolver;
mod security;
pub mod sensitive;
pub mod signatures;

pub use categorize::{CategoryStrategy, ContentStrategy, ExtensionStrategy, categorize_with};
pub use error::{
    DenialReason, InvalidInputReason, PolicyError, Rejection, RejectionKind, Result,
    ValidationFailure,
};
pub use file_types::{ClassificationResult, ClassifierConfig, ContentClassifier, Inspection, Mismatch};
pub use input::ExpansionContext;
pub use policy::{Blacklist, PathPolicy, PathPolicyBuilder, PlatformPolicySource, PolicySource, Root};
pub use resolver::{PathResolver, ResolveOptions, ValidatedPath};
pub use sensitive::{
    PatternRule, SensitivePathClassifier, Sensitivity, SensitivityVerdict, is_sensitive, sanitize_for_logging,
};
pub use signatures::{
    Category, Magic, MatchOptions, SignatureDatabase, SignatureDescriptor, descriptors_for_extension,
    match_signature,
};
