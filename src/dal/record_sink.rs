use std::{
    collections::HashSet,
    fs::{self, File, OpenOptions},
    io::{self, Read, Seek, SeekFrom, Write},
    path::{Path, PathBuf},
};

use serde::Deserialize;
use serde_json::Value;

use crate::{
    dal::file_io::{ensure_parent_dir, write_atomically},
    domain::HotelRecord,
    error::StorageError,
};

/// Layout of the structured output file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentFormat {
    /// One JSON array, rewritten in full on every append.
    #[default]
    JsonArray,
    /// One JSON object per line, appended.
    JsonLines,
}

/// How to take back a document append.
enum DocumentUndo {
    /// Rewrite the array file with its earlier contents.
    Restore(String),
    /// Cut the lines file back to its earlier length.
    Truncate(u64),
}

/// Dual-format writer: a CSV row and a structured document entry per record.
///
/// Files are opened per operation and closed on return, and every append is
/// synced before it returns, so nothing is buffered between records.
pub struct RecordSink {
    csv_path: PathBuf,
    document_path: PathBuf,
    format: DocumentFormat,
}

impl RecordSink {
    pub fn new(
        csv_path: impl Into<PathBuf>,
        document_path: impl Into<PathBuf>,
        format: DocumentFormat,
    ) -> Self {
        RecordSink {
            csv_path: csv_path.into(),
            document_path: document_path.into(),
            format,
        }
    }

    pub fn csv_path(&self) -> &Path {
        &self.csv_path
    }

    pub fn document_path(&self) -> &Path {
        &self.document_path
    }

    /// Creates whichever outputs are missing. Existing data is never touched.
    pub fn initialize(&self) -> Result<(), StorageError> {
        ensure_parent_dir(&self.csv_path)?;
        ensure_parent_dir(&self.document_path)?;

        if is_missing_or_empty(&self.csv_path)? {
            let mut writer =
                csv::Writer::from_path(&self.csv_path).map_err(|e| self.csv_error(e))?;
            writer
                .write_record(HotelRecord::FIELDS)
                .map_err(|e| self.csv_error(e))?;
            writer
                .flush()
                .map_err(|e| StorageError::io(&self.csv_path, e))?;
            log::info!("Created {}", self.csv_path.display());
        }

        if is_missing_or_empty(&self.document_path)? {
            let empty: &[u8] = match self.format {
                DocumentFormat::JsonArray => b"[]",
                DocumentFormat::JsonLines => b"",
            };
            write_atomically(&self.document_path, empty)?;
            log::info!("Created {}", self.document_path.display());
        }

        Ok(())
    }

    /// Writes `record` to both outputs. Either both writes happened or an
    /// error is returned and neither file gained the record.
    ///
    /// The document is written first and the CSV row last. If the row fails
    /// the document is put back the way it was.
    pub fn append(&self, record: &HotelRecord) -> Result<(), StorageError> {
        let row = record
            .to_row()
            .map_err(|e| StorageError::json(&self.csv_path, e))?;
        let undo = self.append_document(record)?;
        if let Err(e) = self.append_row(&row) {
            self.undo_document(undo);
            return Err(e);
        }
        Ok(())
    }

    /// Every record currently held by the structured output.
    pub fn read_all(&self) -> Result<Vec<Value>, StorageError> {
        match self.format {
            DocumentFormat::JsonArray => self.read_array(),
            DocumentFormat::JsonLines => self.read_lines(),
        }
    }

    /// `hotel_code` values already persisted, used to skip finished cards
    /// when a run resumes mid-page.
    pub fn stored_identifiers(&self) -> Result<HashSet<String>, StorageError> {
        Ok(self
            .read_all()?
            .iter()
            .filter_map(|record| record.get("hotel_code")?.as_str().map(str::to_string))
            .collect())
    }

    fn append_row(&self, row: &[String]) -> Result<(), StorageError> {
        let file = OpenOptions::new()
            .append(true)
            .open(&self.csv_path)
            .map_err(|e| StorageError::io(&self.csv_path, e))?;

        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(file);
        writer.write_record(row).map_err(|e| self.csv_error(e))?;
        let file = writer
            .into_inner()
            .map_err(|e| StorageError::io(&self.csv_path, e.into_error()))?;
        file.sync_data()
            .map_err(|e| StorageError::io(&self.csv_path, e))
    }

    fn append_document(&self, record: &HotelRecord) -> Result<DocumentUndo, StorageError> {
        let value =
            serde_json::to_value(record).map_err(|e| StorageError::json(&self.document_path, e))?;

        match self.format {
            DocumentFormat::JsonArray => {
                let previous = read_or_empty(&self.document_path)?;
                let mut records = self.parse_array(&previous)?;
                records.push(value);
                let body = serde_json::to_vec_pretty(&records)
                    .map_err(|e| StorageError::json(&self.document_path, e))?;
                write_atomically(&self.document_path, &body)?;
                Ok(DocumentUndo::Restore(previous))
            }
            DocumentFormat::JsonLines => {
                let previous_len = file_len(&self.document_path)?;
                let mut line = Vec::new();
                if !ends_with_newline(&self.document_path)? {
                    // A crash mid-line left a torn tail; start on a fresh line.
                    line.push(b'\n');
                }
                serde_json::to_writer(&mut line, &value)
                    .map_err(|e| StorageError::json(&self.document_path, e))?;
                line.push(b'\n');
                let mut file = self.open_document_for_append()?;
                file.write_all(&line)
                    .and_then(|_| file.sync_data())
                    .map_err(|e| StorageError::io(&self.document_path, e))?;
                Ok(DocumentUndo::Truncate(previous_len))
            }
        }
    }

    /// Puts the document back after the CSV row could not be written.
    fn undo_document(&self, undo: DocumentUndo) {
        let restored = match undo {
            DocumentUndo::Restore(previous) => {
                write_atomically(&self.document_path, previous.as_bytes())
            }
            DocumentUndo::Truncate(len) => OpenOptions::new()
                .write(true)
                .open(&self.document_path)
                .and_then(|file| {
                    file.set_len(len)?;
                    file.sync_data()
                })
                .map_err(|e| StorageError::io(&self.document_path, e)),
        };
        match restored {
            Ok(()) => log::warn!(
                "Rolled back {} after the CSV row failed",
                self.document_path.display()
            ),
            Err(e) => log::error!("Failed to roll back the structured output: {}", e),
        }
    }

    fn open_document_for_append(&self) -> Result<File, StorageError> {
        OpenOptions::new()
            .append(true)
            .create(true)
            .open(&self.document_path)
            .map_err(|e| StorageError::io(&self.document_path, e))
    }

    fn read_array(&self) -> Result<Vec<Value>, StorageError> {
        let contents = read_or_empty(&self.document_path)?;
        self.parse_array(&contents)
    }

    fn parse_array(&self, contents: &str) -> Result<Vec<Value>, StorageError> {
        if contents.trim().is_empty() {
            return Ok(vec![]);
        }
        match serde_json::from_str::<Value>(contents) {
            Ok(Value::Array(records)) => Ok(records),
            Ok(other) => Err(StorageError::Corrupt {
                path: self.document_path.clone(),
                reason: format!("expected a JSON array, found {}", json_kind(&other)),
            }),
            Err(e) => Err(StorageError::Corrupt {
                path: self.document_path.clone(),
                reason: e.to_string(),
            }),
        }
    }

    fn read_lines(&self) -> Result<Vec<Value>, StorageError> {
        let contents = read_or_empty(&self.document_path)?;
        let mut records = vec![];
        for (i, line) in contents.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            // Lines are independent; one torn by a crash does not spoil the rest.
            match serde_json::from_str::<Value>(line) {
                Ok(value) => records.push(value),
                Err(e) => log::warn!(
                    "Skipping unreadable line {} in {}: {}",
                    i + 1,
                    self.document_path.display(),
                    e
                ),
            }
        }
        Ok(records)
    }

    fn csv_error(&self, source: csv::Error) -> StorageError {
        StorageError::Csv {
            path: self.csv_path.clone(),
            source,
        }
    }
}

fn is_missing_or_empty(path: &Path) -> Result<bool, StorageError> {
    match fs::metadata(path) {
        Ok(meta) => Ok(meta.len() == 0),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(true),
        Err(e) => Err(StorageError::io(path, e)),
    }
}

fn file_len(path: &Path) -> Result<u64, StorageError> {
    match fs::metadata(path) {
        Ok(meta) => Ok(meta.len()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(0),
        Err(e) => Err(StorageError::io(path, e)),
    }
}

fn ends_with_newline(path: &Path) -> Result<bool, StorageError> {
    let mut file = match File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(true),
        Err(e) => return Err(StorageError::io(path, e)),
    };
    let len = file
        .metadata()
        .map_err(|e| StorageError::io(path, e))?
        .len();
    if len == 0 {
        return Ok(true);
    }
    let mut last = [0u8; 1];
    file.seek(SeekFrom::End(-1))
        .and_then(|_| file.read_exact(&mut last))
        .map_err(|e| StorageError::io(path, e))?;
    Ok(last[0] == b'\n')
}

fn read_or_empty(path: &Path) -> Result<String, StorageError> {
    match fs::read_to_string(path) {
        Ok(contents) => Ok(contents),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(String::new()),
        Err(e) => Err(StorageError::io(path, e)),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
