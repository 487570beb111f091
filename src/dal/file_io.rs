use std::{
    fs,
    io::Write,
    path::{Path, PathBuf},
};

use tempfile::NamedTempFile;

use crate::error::StorageError;

pub fn parent_dir(path: &Path) -> PathBuf {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

pub fn ensure_parent_dir(path: &Path) -> Result<(), StorageError> {
    let dir = parent_dir(path);
    fs::create_dir_all(&dir).map_err(|e| StorageError::io(dir, e))
}

/// Replaces `path` with `contents` via a synced temp file in the same
/// directory, so readers see either the old or the new bytes.
pub fn write_atomically(path: &Path, contents: &[u8]) -> Result<(), StorageError> {
    let mut tmp =
        NamedTempFile::new_in(parent_dir(path)).map_err(|e| StorageError::io(path, e))?;
    tmp.write_all(contents)
        .and_then(|_| tmp.as_file().sync_all())
        .map_err(|e| StorageError::io(tmp.path(), e))?;
    tmp.persist(path)
        .map_err(|e| StorageError::io(path, e.error))?;
    Ok(())
}
