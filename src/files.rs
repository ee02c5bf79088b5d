use std::fs::{self, File};
use std::io::{BufReader, ErrorKind};
use std::path::{Component, Path, PathBuf};

use crate::error::{Error, IoContext, Result};

const READ_BUFFER_BYTES: usize = 1 << 20;
const MAX_ASCENT: usize = 64;

/// Opens an existing regular file for buffered line reading.
pub fn open_input(path: &Path) -> Result<BufReader<File>> {
    let metadata = match fs::metadata(path) {
        Ok(meta) => meta,
        Err(err) if err.kind() == ErrorKind::NotFound => {
            return Err(not_found(path));
        }
        Err(err) => {
            return Err(Error::io(
                format!("reading metadata for {}", path.display()),
                err,
            ));
        }
    };
    if !metadata.is_file() {
        return Err(Error::input(format!(
            "input is not a file: {}",
            path.display()
        )));
    }

    let file = File::open(path).io_context(|| format!("opening {}", path.display()))?;
    Ok(BufReader::with_capacity(READ_BUFFER_BYTES, file))
}

/// Rejects an output path that names a directory.
pub fn check_output(path: &Path) -> Result<()> {
    if path.is_dir() {
        return Err(Error::input(format!(
            "--output points to a directory, expected a file path: {}",
            path.display()
        )));
    }
    Ok(())
}

/// Directory that should hold temporary siblings of `path`.
pub fn parent_dir(path: &Path) -> &Path {
    path.parent()
        .filter(|dir| !dir.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."))
}

fn not_found(path: &Path) -> Error {
    match suggest_path(path) {
        Some(hint) => Error::input(format!(
            "file not found: {}; did you mean {}?",
            path.display(),
            hint.display()
        )),
        None => Error::input(format!("file not found: {}", path.display())),
    }
}

/// Looks for `original` relative to the working directory's ancestors.
pub fn suggest_path(original: &Path) -> Option<PathBuf> {
    if original.as_os_str().is_empty() || original.is_absolute() {
        return None;
    }
    let base = std::env::current_dir().ok()?;
    suggest_path_from(&base, original)
}

fn suggest_path_from(base: &Path, needle: &Path) -> Option<PathBuf> {
    let relative: PathBuf = needle
        .components()
        .filter(|component| matches!(component, Component::Normal(_)))
        .collect();
    if relative.as_os_str().is_empty() {
        return None;
    }

    base.ancestors()
        .skip(1)
        .take(MAX_ASCENT)
        .map(|dir| dir.join(&relative))
        .find(|candidate| candidate.is_file())
}
