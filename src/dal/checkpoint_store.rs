use std::{
    fs, io,
    path::{Path, PathBuf},
};

use crate::{
    dal::file_io::{ensure_parent_dir, write_atomically},
    domain::Checkpoint,
    error::StorageError,
};

/// File-backed resume position. Single writer: the running scraper.
pub struct CheckpointStore {
    path: PathBuf,
}

impl CheckpointStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        CheckpointStore { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Page to resume from. Missing or unreadable state means page 1.
    pub fn load(&self) -> u32 {
        match self.read() {
            Ok(Some(checkpoint)) => {
                log::info!(
                    "Resuming from page {} ({})",
                    checkpoint.last_page,
                    self.path.display()
                );
                checkpoint.last_page.max(1)
            }
            Ok(None) => {
                log::info!("No checkpoint at {}, starting from page 1", self.path.display());
                1
            }
            Err(e) => {
                log::warn!("Ignoring unreadable checkpoint, starting from page 1: {}", e);
                1
            }
        }
    }

    /// Persists `page`. Failures are logged and swallowed: losing an update
    /// only means a page gets scraped again on resume.
    pub fn save(&self, page: u32) {
        match self.try_save(page) {
            Ok(()) => log::debug!("Checkpoint saved at page {}", page),
            Err(e) => log::error!("Failed to save checkpoint for page {}: {}", page, e),
        }
    }

    fn read(&self) -> Result<Option<Checkpoint>, StorageError> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(StorageError::io(&self.path, e)),
        };
        serde_json::from_str(&contents)
            .map(Some)
            .map_err(|e| StorageError::json(&self.path, e))
    }

    fn try_save(&self, page: u32) -> Result<(), StorageError> {
        ensure_parent_dir(&self.path)?;
        let body = serde_json::to_vec(&Checkpoint::new(page))
            .map_err(|e| StorageError::json(&self.path, e))?;
        write_atomically(&self.path, &body)
    }
}
