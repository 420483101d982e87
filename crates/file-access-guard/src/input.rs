//! Input sanitation: the filesystem-free front of the resolution pipeline.
//!
//! Expansion always happens before character validation, so the checks see the string
//! that will actually be used rather than whatever the caller typed.

use crate::error::{InvalidInputReason, Rejection, Result};
use std::borrow::Cow;
use std::collections::HashMap;
use std::convert::Infallible;
use std::path::{Component, Path, PathBuf};

/// Maximum accepted length of an expanded path, in bytes.
pub const MAX_PATH_BYTES: usize = 4096;

/// Characters rejected on every platform.
pub const FORBIDDEN_CHARS: &[char] = &['<', '>', '"', '|', '?', '*'];

const RESERVED_DEVICE_NAMES: &[&str] = &[
    "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7", "COM8",
    "COM9", "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
];

/// Where `$VAR` references are looked up.
#[derive(Debug, Clone)]
pub enum VariableSource {
    /// The process environment at the time of the call.
    Process,
    /// A fixed set of variables.
    Fixed(HashMap<String, String>),
}

/// Home directory and variables used for `~` and `$VAR` expansion.
#[derive(Debug, Clone)]
pub struct ExpansionContext {
    home_dir: Option<PathBuf>,
    variables: VariableSource,
}

impl ExpansionContext {
    /// Use the current user's home directory and the process environment.
    #[must_use]
    pub fn from_process() -> Self {
        Self {
            home_dir: dirs::home_dir(),
            variables: VariableSource::Process,
        }
    }

    /// Use an explicit home directory and variable map.
    #[must_use]
    pub fn fixed(home_dir: Option<PathBuf>, variables: HashMap<String, String>) -> Self {
        Self {
            home_dir,
            variables: VariableSource::Fixed(variables),
        }
    }

    #[must_use]
    pub fn home_dir(&self) -> Option<&Path> {
        self.home_dir.as_deref()
    }

    fn lookup(&self, name: &str) -> Option<String> {
        match &self.variables {
            VariableSource::Process => std::env::var(name).ok(),
            VariableSource::Fixed(vars) => vars.get(name).cloned(),
        }
    }
}

impl Default for ExpansionContext {
    fn default() -> Self {
        Self::from_process()
    }
}

/// Layer 1: the input must be a non-empty string.
///
/// # Errors
/// [`Rejection::InvalidInput`] when the input is empty or whitespace only.
pub fn check_shape(raw: &str) -> Result<()> {
    if raw.trim().is_empty() {
        return Err(Rejection::invalid(InvalidInputReason::Empty));
    }
    Ok(())
}

/// Layer 1 for untyped tool arguments.
///
/// # Errors
/// [`Rejection::InvalidInput`] when the value is not a string, or is empty.
pub fn check_value_shape(value: &serde_json::Value) -> Result<&str> {
    let raw = value
        .as_str()
        .ok_or(Rejection::invalid(InvalidInputReason::NotAString))?;
    check_shape(raw)?;
    Ok(raw)
}

fn refers_to_home(raw: &str) -> bool {
    let mut chars = raw.chars();
    chars.next() == Some('~') && matches!(chars.next(), None | Some('/' | '\\'))
}

/// Layer 2: expand `~`, `$VAR` and `${VAR}`.
///
/// Only the current user's home is expanded; `~other` is left untouched. A `$NAME` that
/// is not defined stays literal (`~$report.docx`, `price$5.txt`); the expanded string is
/// still subject to every later layer.
///
/// # Errors
/// [`Rejection::InvalidInput`] when no home directory is known for a `~` path.
pub fn expand<'a>(raw: &'a str, ctx: &ExpansionContext) -> Result<Cow<'a, str>> {
    let tilde_expanded: Cow<'a, str> = if refers_to_home(raw) {
        let home = ctx
            .home_dir()
            .and_then(Path::to_str)
            .ok_or(Rejection::invalid(InvalidInputReason::HomeUnavailable))?;
        let rest = &raw[1..];
        Cow::Owned(format!("{home}{rest}"))
    } else {
        Cow::Borrowed(raw)
    };

    if !tilde_expanded.contains('$') {
        return Ok(tilde_expanded);
    }

    let expanded = match shellexpand::env_with_context(tilde_expanded.as_ref(), |name| {
        Ok::<_, Infallible>(ctx.lookup(name))
    }) {
        Ok(expanded) => expanded,
        Err(err) => match err.cause {},
    };

    Ok(Cow::Owned(expanded.into_owned()))
}

/// Layer 3: length, control characters and the cross-platform unsafe set.
///
/// # Errors
/// [`Rejection::InvalidInput`] naming which check failed.
pub fn check_characters(expanded: &str) -> Result<()> {
    if expanded.trim().is_empty() {
        return Err(Rejection::invalid(InvalidInputReason::Empty));
    }
    if expanded.len() > MAX_PATH_BYTES {
        return Err(Rejection::invalid(InvalidInputReason::TooLong));
    }
    if expanded.chars().any(char::is_control) {
        return Err(Rejection::invalid(InvalidInputReason::ControlCharacter));
    }
    if expanded.contains(FORBIDDEN_CHARS) {
        return Err(Rejection::invalid(InvalidInputReason::ForbiddenCharacter));
    }
    Ok(())
}

/// Returns the device name a single path component collides with, if any.
///
/// Only an exact match of the component (minus one extension) counts: `con.txt` is
/// reserved, `CONSOLE.txt` and `con.tar.gz` are not.
#[must_use]
pub fn reserved_device_name(component: &str) -> Option<&'static str> {
    let base = component
        .rsplit_once('.')
        .map_or(component, |(base, _ext)| base);
    RESERVED_DEVICE_NAMES
        .iter()
        .copied()
        .find(|name| base.eq_ignore_ascii_case(name))
}

/// Layer 4: reject any component that names a platform device.
///
/// # Errors
/// [`Rejection::ReservedName`] carrying the caller's input and the offending component.
pub fn check_reserved_names(raw: &str, expanded: &str) -> Result<()> {
    for component in expanded.split(['/', '\\']).filter(|c| !c.is_empty()) {
        if reserved_device_name(component).is_some() {
            return Err(Rejection::ReservedName {
                input: raw.to_string(),
                component: component.to_string(),
            });
        }
    }
    Ok(())
}

/// Layer 5: join onto `base_dir` and normalize `.` / `..` without touching the filesystem.
#[must_use]
pub fn absolutize(expanded: &str, base_dir: &Path) -> PathBuf {
    let path = Path::new(expanded);
    if path.is_absolute() {
        normalize_lexically(path)
    } else {
        normalize_lexically(&base_dir.join(path))
    }
}

/// Resolve `.` and `..` components lexically. `..` never climbs above the root.
#[must_use]
pub fn normalize_lexically(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Prefix(_) | Component::RootDir => normalized.push(component),
            Component::CurDir => {}
            Component::ParentDir => {
                if matches!(normalized.components().next_back(), Some(Component::Normal(_))) {
                    normalized.pop();
                }
            }
            Component::Normal(part) => normalized.push(part),
        }
    }
    normalized
}

/// Layers 1 through 5 in order, yielding the absolute candidate path.
///
/// # Errors
/// The first [`Rejection`] produced by any layer.
pub fn prepare(raw: &str, ctx: &ExpansionContext, base_dir: &Path) -> Result<PathBuf> {
    check_shape(raw)?;
    let expanded = expand(raw, ctx)?;
    check_characters(&expanded)?;
    check_reserved_names(raw, &expanded)?;
    Ok(absolutize(&expanded, base_dir))
}
