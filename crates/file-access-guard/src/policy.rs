//! Access policies: allowed roots, the platform blacklist and the policy source interface.
//!
//! A [`PathPolicy`] is an immutable snapshot built once (typically at startup, or whenever
//! the configuration is reloaded) and passed by reference into every resolution. Nothing
//! in here is mutated after construction.

use crate::error::{DenialReason, PolicyError};
use regex::{RegexSet, RegexSetBuilder};
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[cfg(target_os = "macos")]
const PLATFORM_BLOCKED_PATTERNS: &[&str] = &[
    r"^/System(/|$)",
    r"^/Library(/|$)",
    r"^/bin(/|$)",
    r"^/sbin(/|$)",
    r"^/usr(/|$)",
    r"^/etc(/|$)",
    r"^/dev(/|$)",
    r"^/private/etc(/|$)",
    r"^/private/var/log(/|$)",
    r"^/private/var/db(/|$)",
    r"^/private/var/root(/|$)",
];

#[cfg(windows)]
const PLATFORM_BLOCKED_PATTERNS: &[&str] = &[
    r"^[a-z]:/windows(/|$)",
    r"^[a-z]:/program files(/|$)",
    r"^[a-z]:/program files \(x86\)(/|$)",
    r"^[a-z]:/programdata(/|$)",
    r"^[a-z]:/\$recycle\.bin(/|$)",
    r"^[a-z]:/system volume information(/|$)",
    r"^[a-z]:/recovery(/|$)",
];

// /var itself stays reachable: only its system subtrees are blocked.
#[cfg(not(any(target_os = "macos", windows)))]
const PLATFORM_BLOCKED_PATTERNS: &[&str] = &[
    r"^/etc(/|$)",
    r"^/usr(/|$)",
    r"^/bin(/|$)",
    r"^/sbin(/|$)",
    r"^/lib(32|64)?(/|$)",
    r"^/boot(/|$)",
    r"^/root(/|$)",
    r"^/proc(/|$)",
    r"^/sys(/|$)",
    r"^/dev(/|$)",
    r"^/run(/|$)",
    r"^/var/log(/|$)",
    r"^/var/run(/|$)",
    r"^/var/spool(/|$)",
    r"^/var/lib(/|$)",
];

/// Compiled set of always-blocked path patterns.
///
/// Patterns are regular expressions matched against the forward-slash form of a path
/// (case-insensitively on Windows).
#[derive(Debug, Clone)]
pub struct Blacklist {
    patterns: Vec<String>,
    set: RegexSet,
}

impl Blacklist {
    /// Compile a blacklist from pattern strings.
    ///
    /// # Errors
    /// Returns [`PolicyError::InvalidPattern`] naming the first pattern that fails to compile.
    pub fn new<I, S>(patterns: I) -> Result<Self, PolicyError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let patterns: Vec<String> = patterns.into_iter().map(Into::into).collect();

        // Compile individually first so the error can name the offending pattern.
        for pattern in &patterns {
            if let Err(source) = regex::Regex::new(pattern) {
                return Err(PolicyError::InvalidPattern {
                    pattern: pattern.clone(),
                    source,
                });
            }
        }

        let set = RegexSetBuilder::new(&patterns)
            .case_insensitive(cfg!(windows))
            .build()
            .map_err(|source| PolicyError::InvalidPattern {
                pattern: patterns.join(" | "),
                source,
            })?;

        Ok(Self { patterns, set })
    }

    /// A blacklist that blocks nothing.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            patterns: Vec::new(),
            set: RegexSet::empty(),
        }
    }

    /// The always-blocked system locations for the compilation target.
    ///
    /// # Errors
    /// Only fails if a built-in pattern is malformed.
    pub fn platform_default() -> Result<Self, PolicyError> {
        Self::new(platform_blocked_patterns())
    }

    /// Returns a new blacklist with `extra` appended.
    ///
    /// # Errors
    /// Returns [`PolicyError::InvalidPattern`] if an added pattern does not compile.
    pub fn extended<I, S>(&self, extra: I) -> Result<Self, PolicyError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(
            self.patterns
                .iter()
                .cloned()
                .chain(extra.into_iter().map(Into::into)),
        )
    }

    #[must_use]
    pub fn is_blocked(&self, path: &Path) -> bool {
        self.set.is_match(&match_form(path))
    }

    /// The first pattern that matches `path`, for diagnostics.
    #[must_use]
    pub fn matching_pattern(&self, path: &Path) -> Option<&str> {
        self.set
            .matches(&match_form(path))
            .iter()
            .next()
            .map(|idx| self.patterns[idx].as_str())
    }

    #[must_use]
    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}

/// The built-in blocked patterns for the compilation target, as strings.
#[must_use]
pub fn platform_blocked_patterns() -> Vec<String> {
    PLATFORM_BLOCKED_PATTERNS
        .iter()
        .map(|p| (*p).to_string())
        .collect()
}

// Canonical Windows paths carry a verbatim prefix (`\\?\C:\...`) that patterns don't expect.
fn match_form(path: &Path) -> String {
    let lossy = path.to_string_lossy();
    let unprefixed = lossy
        .strip_prefix(r"\\?\UNC\")
        .map(|rest| format!(r"\\{rest}"))
        .or_else(|| lossy.strip_prefix(r"\\?\").map(str::to_string))
        .unwrap_or_else(|| lossy.to_string());
    unprefixed.replace('\\', "/")
}

/// Read interface onto whoever owns the whitelist and blacklist configuration.
///
/// The engine only reads from a source; refreshing it is the owner's business.
pub trait PolicySource {
    /// Directories allowed out of the box (platform user folders).
    fn default_allowed_directories(&self) -> Vec<PathBuf>;

    /// Directories the user added.
    fn custom_allowed_directories(&self) -> Vec<PathBuf>;

    /// Patterns that are always denied, regardless of the whitelist.
    fn always_blocked_patterns(&self) -> Vec<String>;

    /// Whether paths must fall inside a whitelisted directory.
    fn enforce_whitelist(&self) -> bool {
        true
    }

    fn allow_symlinks(&self) -> bool {
        true
    }
}

/// Policy source built from the platform's standard user directories.
#[derive(Debug, Clone, Default)]
pub struct PlatformPolicySource {
    custom: Vec<PathBuf>,
}

impl PlatformPolicySource {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add user-configured allowed directories.
    #[must_use]
    pub fn with_custom_directories<I, P>(mut self, dirs: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        self.custom.extend(dirs.into_iter().map(Into::into));
        self
    }
}

/// Documents, Downloads, Desktop, Pictures, Music and Videos, where the platform defines them.
#[must_use]
pub fn platform_user_directories() -> Vec<PathBuf> {
    [
        dirs::document_dir(),
        dirs::download_dir(),
        dirs::desktop_dir(),
        dirs::picture_dir(),
        dirs::audio_dir(),
        dirs::video_dir(),
    ]
    .into_iter()
    .flatten()
    .collect()
}

impl PolicySource for PlatformPolicySource {
    fn default_allowed_directories(&self) -> Vec<PathBuf> {
        platform_user_directories()
    }

    fn custom_allowed_directories(&self) -> Vec<PathBuf> {
        self.custom.clone()
    }

    fn always_blocked_patterns(&self) -> Vec<String> {
        platform_blocked_patterns()
    }
}

/// An allowed directory, remembered both as written and as its real path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Root {
    lexical: PathBuf,
    canonical: PathBuf,
}

impl Root {
    fn new(path: PathBuf) -> Self {
        let canonical = std::fs::canonicalize(&path).unwrap_or_else(|_| path.clone());
        Self {
            lexical: path,
            canonical,
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.lexical
    }

    #[must_use]
    pub fn canonical(&self) -> &Path {
        &self.canonical
    }

    /// Component-wise containment of a not-yet-resolved path.
    #[must_use]
    pub fn contains_lexical(&self, path: &Path) -> bool {
        path.starts_with(&self.lexical) || path.starts_with(&self.canonical)
    }

    /// Component-wise containment of a canonical path.
    #[must_use]
    pub fn contains_real(&self, real: &Path) -> bool {
        real.starts_with(&self.canonical)
    }
}

/// Immutable snapshot of what a resolution is allowed to reach.
#[derive(Debug, Clone)]
pub struct PathPolicy {
    allowed_roots: Option<Vec<Root>>,
    whitelist: Vec<Root>,
    blacklist: Arc<Blacklist>,
    enforce_whitelist: bool,
    allow_symlinks: bool,
}

impl PathPolicy {
    #[must_use]
    pub fn builder() -> PathPolicyBuilder {
        PathPolicyBuilder::new()
    }

    /// Build a whitelist-governed policy from a [`PolicySource`].
    ///
    /// # Errors
    /// Returns an error if a blocked pattern does not compile or a whitelist entry is relative.
    pub fn from_source(source: &dyn PolicySource) -> Result<Self, PolicyError> {
        let blacklist = Blacklist::new(source.always_blocked_patterns())?;
        Self::builder()
            .whitelist_dirs(source.default_allowed_directories())
            .whitelist_dirs(source.custom_allowed_directories())
            .blacklist(Arc::new(blacklist))
            .enforce_whitelist(source.enforce_whitelist())
            .allow_symlinks(source.allow_symlinks())
            .build()
    }

    /// Derive a policy that additionally confines resolution to `roots`.
    ///
    /// # Errors
    /// Returns an error if a root is relative or not an existing directory.
    pub fn confined_to<I, P>(&self, roots: I) -> Result<Self, PolicyError>
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        let roots = roots
            .into_iter()
            .map(|p| explicit_root(p.into()))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            allowed_roots: Some(roots),
            ..self.clone()
        })
    }

    #[must_use]
    pub fn with_allow_symlinks(&self, allow: bool) -> Self {
        Self {
            allow_symlinks: allow,
            ..self.clone()
        }
    }

    #[must_use]
    pub fn allowed_roots(&self) -> Option<&[Root]> {
        self.allowed_roots.as_deref()
    }

    #[must_use]
    pub fn whitelist(&self) -> &[Root] {
        &self.whitelist
    }

    #[must_use]
    pub fn blacklist(&self) -> &Blacklist {
        &self.blacklist
    }

    #[must_use]
    pub const fn enforces_whitelist(&self) -> bool {
        self.enforce_whitelist
    }

    #[must_use]
    pub const fn allows_symlinks(&self) -> bool {
        self.allow_symlinks
    }

    /// Blacklist and containment decision for an absolute, lexically normalized path.
    ///
    /// The blacklist is consulted first and always wins.
    pub(crate) fn check_candidate(&self, candidate: &Path) -> Result<(), DenialReason> {
        if self.blacklist.is_blocked(candidate) {
            return Err(DenialReason::Blacklisted);
        }
        if self.enforce_whitelist && !self.whitelist.iter().any(|r| r.contains_lexical(candidate))
        {
            return Err(DenialReason::NotWhitelisted);
        }
        if let Some(roots) = &self.allowed_roots
            && !roots.iter().any(|r| r.contains_lexical(candidate))
        {
            return Err(DenialReason::OutsideAllowedRoot);
        }
        Ok(())
    }

    /// The same decision repeated against a canonical path.
    pub(crate) fn check_real(&self, real: &Path) -> Result<(), DenialReason> {
        if self.blacklist.is_blocked(real) {
            return Err(DenialReason::Blacklisted);
        }
        if self.enforce_whitelist && !self.whitelist.iter().any(|r| r.contains_real(real)) {
            return Err(DenialReason::OutsideAllowedRoot);
        }
        if let Some(roots) = &self.allowed_roots
            && !roots.iter().any(|r| r.contains_real(real))
        {
            return Err(DenialReason::OutsideAllowedRoot);
        }
        Ok(())
    }
}

fn explicit_root(path: PathBuf) -> Result<Root, PolicyError> {
    if !path.is_absolute() {
        return Err(PolicyError::RelativeRoot { path });
    }
    if !path.is_dir() {
        return Err(PolicyError::MissingRoot { path });
    }
    Ok(Root::new(path))
}

/// Builder for [`PathPolicy`].
pub struct PathPolicyBuilder {
    allowed_roots: Option<Vec<PathBuf>>,
    whitelist: Vec<PathBuf>,
    blacklist: Option<Arc<Blacklist>>,
    enforce_whitelist: bool,
    allow_symlinks: bool,
}

impl PathPolicyBuilder {
    fn new() -> Self {
        Self {
            allowed_roots: None,
            whitelist: Vec::new(),
            blacklist: None,
            enforce_whitelist: false,
            allow_symlinks: true,
        }
    }

    /// Confine resolution to this directory (may be called repeatedly).
    #[must_use]
    pub fn allowed_root<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.allowed_roots
            .get_or_insert_with(Vec::new)
            .push(path.into());
        self
    }

    #[must_use]
    pub fn allowed_roots<I, P>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        self.allowed_roots
            .get_or_insert_with(Vec::new)
            .extend(paths.into_iter().map(Into::into));
        self
    }

    #[must_use]
    pub fn whitelist_dir<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.whitelist.push(path.into());
        self
    }

    #[must_use]
    pub fn whitelist_dirs<I, P>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        self.whitelist.extend(paths.into_iter().map(Into::into));
        self
    }

    /// Use this blacklist instead of the platform default.
    #[must_use]
    pub fn blacklist(mut self, blacklist: Arc<Blacklist>) -> Self {
        self.blacklist = Some(blacklist);
        self
    }

    #[must_use]
    #[allow(clippy::missing_const_for_fn)]
    pub fn enforce_whitelist(mut self, enforce: bool) -> Self {
        self.enforce_whitelist = enforce;
        self
    }

    #[must_use]
    #[allow(clippy::missing_const_for_fn)]
    pub fn allow_symlinks(mut self, allow: bool) -> Self {
        self.allow_symlinks = allow;
        self
    }

    /// Build the policy.
    ///
    /// # Errors
    /// Returns an error if:
    /// - An allowed root or whitelist entry is relative
    /// - An allowed root is not an existing directory
    /// - The platform blacklist fails to compile
    pub fn build(self) -> Result<PathPolicy, PolicyError> {
        let allowed_roots = self
            .allowed_roots
            .map(|roots| {
                roots
                    .into_iter()
                    .map(explicit_root)
                    .collect::<Result<Vec<_>, _>>()
            })
            .transpose()?;

        let mut whitelist = Vec::with_capacity(self.whitelist.len());
        for path in self.whitelist {
            if !path.is_absolute() {
                return Err(PolicyError::RelativeRoot { path });
            }
            if !path.is_dir() {
                tracing::debug!("Skipping whitelist entry that does not exist: {:?}", path);
                continue;
            }
            let root = Root::new(path);
            if !whitelist.contains(&root) {
                whitelist.push(root);
            }
        }

        let blacklist = match self.blacklist {
            Some(blacklist) => blacklist,
            None => Arc::new(Blacklist::platform_default()?),
        };

        tracing::debug!(
            "PathPolicy built - allowed_roots: {}, whitelist: {}, blocked patterns: {}, enforce_whitelist: {}, allow_symlinks: {}",
            allowed_roots.as_ref().map_or(0, Vec::len),
            whitelist.len(),
            blacklist.patterns().len(),
            self.enforce_whitelist,
            self.allow_symlinks
        );

        Ok(PathPolicy {
            allowed_roots,
            whitelist,
            blacklist,
            enforce_whitelist: self.enforce_whitelist,
            allow_symlinks: self.allow_symlinks,
        })
    }
}
