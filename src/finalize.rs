//! Promotion of staged output files.
//!
//! Updates never write to their destination directly. Output is staged in a
//! sibling temporary file that is removed when dropped, so any failure before
//! promotion leaves the destination untouched and no partial file behind.
//!
//! An in-place update then runs three steps: remove a stale backup, move the
//! original to the backup path, move the staged file to the original path.
//! A crash between the last two steps leaves the original path missing with
//! its content intact under the backup path.

use std::ffi::OsString;
use std::fs;
use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};

use tempfile::{Builder, NamedTempFile, PersistError};
use tracing::{debug, warn};

use crate::error::{Error, IoContext, Result};
use crate::files::parent_dir;

pub const DEFAULT_BACKUP_SUFFIX: &str = ".bak";
const STAGING_SUFFIX: &str = ".updating";

/// Creates an empty temporary file in the same directory as `dest`.
///
/// The file gets the permissions of `dest` when it exists, otherwise the
/// mode a plain `File::create` would give it.
pub fn stage_beside(dest: &Path) -> Result<NamedTempFile> {
    let dir = parent_dir(dest);
    let name = dest
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "csvedit".to_string());
    let prefix = format!(".{name}.");

    let mut builder = Builder::new();
    builder.prefix(&prefix).suffix(STAGING_SUFFIX);
    #[cfg(unix)]
    builder.permissions(std::os::unix::fs::PermissionsExt::from_mode(0o666));
    let staged = builder
        .tempfile_in(dir)
        .io_context(|| format!("creating temporary file in {}", dir.display()))?;

    match fs::metadata(dest) {
        Ok(meta) => fs::set_permissions(staged.path(), meta.permissions())
            .io_context(|| format!("copying permissions of {}", dest.display()))?,
        Err(err) if err.kind() == ErrorKind::NotFound => {}
        Err(err) => {
            return Err(Error::io(format!("reading metadata of {}", dest.display()), err));
        }
    }
    Ok(staged)
}

/// `original` with `suffix` appended to its full name.
pub fn backup_path(original: &Path, suffix: &str) -> PathBuf {
    let mut name = OsString::from(original.as_os_str());
    name.push(suffix);
    PathBuf::from(name)
}

/// Swaps `staged` into `original`, keeping the previous content at the
/// backup path. Returns the backup path.
pub fn replace_with_backup(
    staged: NamedTempFile,
    original: &Path,
    suffix: &str,
) -> Result<PathBuf> {
    if suffix.is_empty() {
        return Err(Error::invocation("--backup suffix must not be empty"));
    }
    let backup = backup_path(original, suffix);

    remove_stale_backup(&backup)?;
    move_file(original, &backup)?;
    debug!(original = %original.display(), backup = %backup.display(), "original moved to backup");

    promote(staged, original).map_err(|err| match err {
        Error::Io { context, source } => Error::io(
            format!("{context}; previous content is kept at {}", backup.display()),
            source,
        ),
        other => other,
    })?;
    Ok(backup)
}

/// Moves `staged` to `dest`, replacing any existing file.
pub fn promote(staged: NamedTempFile, dest: &Path) -> Result<()> {
    let PersistError { error, file } = match staged.persist(dest) {
        Ok(_) => return Ok(()),
        Err(err) => err,
    };
    warn!(dest = %dest.display(), %error, "rename failed; falling back to copy");

    let temp = file.path().to_path_buf();
    copy_over(&temp, dest)?;
    file.close().io_context(|| {
        format!(
            "removing {} after copying it to {}; both files now exist",
            temp.display(),
            dest.display()
        )
    })
}

/// Renames `from` to `to`, or copies then deletes when rename fails.
pub fn move_file(from: &Path, to: &Path) -> Result<()> {
    let error = match fs::rename(from, to) {
        Ok(()) => return Ok(()),
        Err(err) => err,
    };
    warn!(
        from = %from.display(),
        to = %to.display(),
        %error,
        "rename failed; falling back to copy"
    );

    copy_then_remove(from, to)
}

/// Copies `from` over `to`, then deletes `from`.
///
/// A failed delete is fatal: both paths then hold the same content.
pub fn copy_then_remove(from: &Path, to: &Path) -> Result<()> {
    copy_over(from, to)?;
    fs::remove_file(from).io_context(|| {
        format!(
            "removing {} after copying it to {}; both files now exist",
            from.display(),
            to.display()
        )
    })
}

/// Copies `from` over `to`. A copy that fails after `to` was opened
/// removes the partial destination; if that fails too, the error names it.
fn copy_over(from: &Path, to: &Path) -> Result<()> {
    let context = || format!("copying {} to {}", from.display(), to.display());
    fs::metadata(from).io_context(context)?;
    match fs::copy(from, to) {
        Ok(_) => Ok(()),
        Err(err) => Err(discard_partial(to, context(), err)),
    }
}

fn discard_partial(partial: &Path, context: String, err: io::Error) -> Error {
    match fs::remove_file(partial) {
        Ok(()) => Error::io(context, err),
        Err(cleanup) if cleanup.kind() == ErrorKind::NotFound => Error::io(context, err),
        Err(cleanup) => Error::io(
            format!(
                "{context} failed ({err}); removing the partial file {} also failed",
                partial.display()
            ),
            cleanup,
        ),
    }
}

fn remove_stale_backup(backup: &Path) -> Result<()> {
    match fs::symlink_metadata(backup) {
        Ok(_) => fs::remove_file(backup)
            .io_context(|| format!("removing existing backup {}", backup.display())),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
        Err(err) => Err(Error::io(
            format!("checking existing backup {}", backup.display()),
            err,
        )),
    }
}
