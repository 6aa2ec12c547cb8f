//! Persisted records, one file per identifier.
//!
//! File names follow `prefix + zero-padded id + "." + extension`, e.g.
//! `student007.json`. The producer saves a file *before* publishing its id,
//! and [`RecordStore::save`] writes through a temporary file in the same
//! directory and a rename, so a consumer never observes a partially written
//! file.

use crate::error::{Result, StoreError};
use crate::record::Record;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::debug;

/// Where and how record files are named.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Directory holding the record files
    pub dir: PathBuf,

    /// File name prefix
    pub prefix: String,

    /// File extension, without the dot
    pub extension: String,

    /// Minimum digits in the zero-padded id
    pub width: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("records"),
            prefix: "student".to_string(),
            extension: "json".to_string(),
            width: 3,
        }
    }
}

/// Directory-backed record store.
#[derive(Debug, Clone)]
pub struct RecordStore {
    config: StoreConfig,
}

impl RecordStore {
    /// Open a store, creating its directory if needed.
    pub fn open(config: StoreConfig) -> Result<Self> {
        fs::create_dir_all(&config.dir)?;
        Ok(Self { config })
    }

    /// Directory holding the record files.
    pub fn dir(&self) -> &Path {
        &self.config.dir
    }

    /// File name for `id`, e.g. `student001.json`.
    pub fn file_name(&self, id: u32) -> String {
        format!(
            "{}{:0width$}.{}",
            self.config.prefix,
            id,
            self.config.extension,
            width = self.config.width
        )
    }

    /// Full path of the file for `id`.
    pub fn path_for(&self, id: u32) -> PathBuf {
        self.config.dir.join(self.file_name(id))
    }

    /// Persist `record` under `id`, replacing any previous file.
    pub fn save(&self, id: u32, record: &Record) -> Result<PathBuf> {
        let path = self.path_for(id);
        let text = record.to_text()?;

        // Write to a uniquely named temp file in the same directory, then
        // rename. The temp file is removed on drop if anything fails.
        let mut tmp = NamedTempFile::new_in(self.dir())?;
        tmp.write_all(text.as_bytes())?;
        tmp.persist(&path).map_err(|e| e.error)?;

        debug!(path = %path.display(), "saved record");
        Ok(path)
    }

    /// Read and validate the record stored under `id`.
    ///
    /// # Errors
    /// - `StoreError::NotFound` if there is no file
    /// - `Error::Serialization` if the file is not a valid record
    pub fn load(&self, id: u32) -> Result<Record> {
        let path = self.path_for(id);
        let text = match fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(StoreError::NotFound {
                    path: path.display().to_string(),
                }
                .into());
            }
            Err(e) => return Err(e.into()),
        };

        let record = Record::from_text(&text)?;
        debug!(path = %path.display(), student = %record, "parsed record");
        Ok(record)
    }

    /// Delete the file stored under `id`.
    pub fn remove(&self, id: u32) -> Result<()> {
        let path = self.path_for(id);
        match fs::remove_file(&path) {
            Ok(()) => {
                debug!(path = %path.display(), "deleted record file");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Err(StoreError::NotFound {
                path: path.display().to_string(),
            }
            .into()),
            Err(e) => Err(e.into()),
        }
    }

    /// Whether a file is stored under `id`.
    pub fn exists(&self, id: u32) -> bool {
        self.path_for(id).is_file()
    }
}
