use std::{path::PathBuf, time::Duration};

use thiserror::Error;

use crate::services::RunSummary;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("CSV error on {path}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("JSON error on {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("refusing to rewrite corrupt document {path}: {reason}")]
    Corrupt { path: PathBuf, reason: String },
}

impl StorageError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        StorageError::Io {
            path: path.into(),
            source,
        }
    }

    pub fn json(path: impl Into<PathBuf>, source: serde_json::Error) -> Self {
        StorageError::Json {
            path: path.into(),
            source,
        }
    }
}

#[derive(Debug, Error)]
pub enum ScrapeError {
    /// Element missing or stale, click intercepted. Worth retrying.
    #[error("transient UI failure: {0}")]
    TransientUi(String),

    #[error("timed out after {waited:?} waiting for {what}")]
    Timeout { what: String, waited: Duration },

    #[error("browser driver error: {0}")]
    Driver(String),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("fatal error while {context}: {source}")]
    Fatal {
        context: String,
        #[source]
        source: Box<ScrapeError>,
    },
}

impl ScrapeError {
    pub fn fatal(context: impl Into<String>, source: ScrapeError) -> Self {
        match source {
            already @ ScrapeError::Fatal { .. } => already,
            source => ScrapeError::Fatal {
                context: context.into(),
                source: Box::new(source),
            },
        }
    }

    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ScrapeError::TransientUi(_) | ScrapeError::Timeout { .. }
        )
    }
}

/// Terminal failure of a run. The summary is still reported to the operator.
#[derive(Debug, Error)]
#[error("run aborted on page {}: {error}", .summary.last_page)]
pub struct RunAborted {
    pub summary: RunSummary,
    #[source]
    pub error: ScrapeError,
}
