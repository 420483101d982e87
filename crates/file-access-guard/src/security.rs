//! Filesystem probes used by the resolver: loop-aware canonicalization, access checks
//! and the no-follow open.
//!
//! All calls go through `tokio::fs` (or `spawn_blocking` for `access(2)`) so a slow
//! filesystem only suspends the calling task.

use crate::error::{DenialReason, Rejection, Result, ValidationFailure};
use std::ffi::OsString;
use std::io;
use std::path::{Path, PathBuf};
use tokio::fs;

#[cfg(windows)]
const ERROR_CANT_RESOLVE_FILENAME: i32 = 1921;
#[cfg(windows)]
const FILE_FLAG_OPEN_REPARSE_POINT: u32 = 0x0020_0000;

/// Whether `err` is the OS reporting too many levels of symbolic links.
pub(crate) fn is_loop_error(err: &io::Error) -> bool {
    #[cfg(unix)]
    {
        err.raw_os_error() == Some(libc::ELOOP)
    }
    #[cfg(windows)]
    {
        err.raw_os_error() == Some(ERROR_CANT_RESOLVE_FILENAME)
    }
    #[cfg(not(any(unix, windows)))]
    {
        let _ = err;
        false
    }
}

fn denial_for(err: &io::Error) -> DenialReason {
    if is_loop_error(err) {
        DenialReason::CircularSymlink
    } else if err.kind() == io::ErrorKind::NotFound {
        DenialReason::DanglingSymlink
    } else {
        DenialReason::NotAccessible
    }
}

/// `lstat` of the entry itself. `Ok(None)` when nothing is there.
pub(crate) async fn entry_metadata(path: &Path) -> io::Result<Option<std::fs::Metadata>> {
    match fs::symlink_metadata(path).await {
        Ok(metadata) => Ok(Some(metadata)),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(err) => Err(err),
    }
}

/// Result of canonicalizing a possibly non-existent path.
#[derive(Debug)]
pub(crate) struct Canonicalized {
    pub(crate) real_path: PathBuf,
    pub(crate) existed: bool,
}

/// Canonicalize `candidate` as far as its nearest existing ancestor and re-append the
/// missing tail.
///
/// `candidate` must be absolute and lexically normalized. Every step removes one
/// component, so the walk is bounded by the path depth even when an ancestor loops.
pub(crate) async fn canonicalize_existing_prefix(
    candidate: &Path,
) -> std::result::Result<Canonicalized, DenialReason> {
    let mut existing = candidate.to_path_buf();
    let mut missing: Vec<OsString> = Vec::new();

    loop {
        match entry_metadata(&existing).await {
            Ok(Some(_)) => break,
            Ok(None) => {
                let Some(name) = existing.file_name() else {
                    return Err(DenialReason::NotAccessible);
                };
                missing.push(name.to_os_string());
                if !existing.pop() {
                    return Err(DenialReason::NotAccessible);
                }
            }
            Err(err) if is_loop_error(&err) => return Err(DenialReason::CircularSymlink),
            Err(_) => return Err(DenialReason::NotAccessible),
        }
    }

    let mut real_path = fs::canonicalize(&existing)
        .await
        .map_err(|err| denial_for(&err))?;
    real_path.extend(missing.iter().rev());

    Ok(Canonicalized {
        real_path,
        existed: missing.is_empty(),
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Access {
    Read,
    ReadWrite,
    Write,
}

/// Whether the current process may access `path` in `mode`.
///
/// Any failure to answer counts as "no".
pub(crate) async fn has_access(path: &Path, mode: Access) -> bool {
    #[cfg(unix)]
    {
        use std::os::unix::ffi::OsStrExt;

        let Ok(c_path) = std::ffi::CString::new(path.as_os_str().as_bytes()) else {
            return false;
        };
        let flags = match mode {
            Access::Read => libc::R_OK,
            Access::ReadWrite => libc::R_OK | libc::W_OK,
            Access::Write => libc::W_OK,
        };
        // SAFETY: `c_path` is a valid NUL-terminated string that outlives the call.
        tokio::task::spawn_blocking(move || unsafe { libc::access(c_path.as_ptr(), flags) } == 0)
            .await
            .unwrap_or(false)
    }
    #[cfg(not(unix))]
    {
        match fs::metadata(path).await {
            Ok(metadata) => mode == Access::Read || !metadata.permissions().readonly(),
            Err(_) => false,
        }
    }
}

/// Walk upward from the parent of `path` to the first existing entry; it must be a
/// writable directory.
pub(crate) async fn nearest_ancestor_writable(path: &Path) -> bool {
    for ancestor in path.ancestors().skip(1) {
        match fs::metadata(ancestor).await {
            Ok(metadata) if metadata.is_dir() => return has_access(ancestor, Access::Write).await,
            Ok(_) => return false,
            Err(err) if err.kind() == io::ErrorKind::NotFound => continue,
            Err(_) => return false,
        }
    }
    false
}

/// Open `path` read-only without following a symlink in the final component, then prove
/// the opened object is a regular file.
///
/// `input` is the caller's string, the only thing that appears in a rejection.
pub(crate) async fn open_regular_nofollow(path: &Path, input: &str) -> Result<fs::File> {
    let mut options = fs::OpenOptions::new();
    options.read(true);
    #[cfg(unix)]
    {
        // O_NONBLOCK keeps a FIFO from stalling the open; it is rejected below anyway.
        options.custom_flags(libc::O_NOFOLLOW | libc::O_NONBLOCK);
    }
    #[cfg(windows)]
    {
        options.custom_flags(FILE_FLAG_OPEN_REPARSE_POINT);
    }

    let file = options.open(path).await.map_err(|err| {
        if is_loop_error(&err) {
            Rejection::validation(input, ValidationFailure::SymlinkNotAllowed)
        } else {
            Rejection::denied(input, DenialReason::NotAccessible)
        }
    })?;

    let metadata = file
        .metadata()
        .await
        .map_err(|_| Rejection::denied(input, DenialReason::NotAccessible))?;
    if metadata.file_type().is_symlink() {
        return Err(Rejection::validation(input, ValidationFailure::SymlinkNotAllowed));
    }
    if !metadata.is_file() {
        return Err(Rejection::validation(input, ValidationFailure::NotRegularFile));
    }

    Ok(file)
}
