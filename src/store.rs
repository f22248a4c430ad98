//! JSON result persistence: one file per processed document under the data
//! directory, keyed by a generated UUID.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::pipeline::DocumentRecord;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Storage I/O failure: {0}")]
    Io(#[from] std::io::Error),
    #[error("Record serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Invalid result id: {0}")]
    InvalidId(String),
}

/// One row of the processing history, newest first.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub file_id: String,
    pub timestamp: DateTime<Utc>,
    pub claim_number: Option<String>,
    pub status: String,
}

pub struct ResultStore {
    dir: PathBuf,
}

impl ResultStore {
    /// Open the store, creating its directory if needed.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Persist a record and return its generated id.
    pub fn save(&self, record: &DocumentRecord) -> Result<String, StoreError> {
        let id = Uuid::new_v4().to_string();
        let json = serde_json::to_vec_pretty(record)?;
        fs::write(self.record_path(&id), json)?;
        tracing::debug!(id, filename = %record.filename, "record persisted");
        Ok(id)
    }

    /// Load a record by id; `None` when no such record exists.
    pub fn load(&self, id: &str) -> Result<Option<DocumentRecord>, StoreError> {
        let id = Self::validate_id(id)?;
        let path = self.record_path(&id);
        if !path.exists() {
            return Ok(None);
        }
        let bytes = fs::read(path)?;
        Ok(Some(serde_json::from_slice(&bytes)?))
    }

    /// List all persisted records, newest first. Unreadable files are logged
    /// and skipped rather than failing the listing.
    pub fn history(&self) -> Result<Vec<HistoryEntry>, StoreError> {
        let mut entries = Vec::new();

        for dirent in fs::read_dir(&self.dir)? {
            let dirent = dirent?;
            let path = dirent.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let Some(id) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };

            let record: DocumentRecord = match fs::read(&path)
                .map_err(StoreError::from)
                .and_then(|bytes| serde_json::from_slice(&bytes).map_err(StoreError::from))
            {
                Ok(record) => record,
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "skipping unreadable record");
                    continue;
                }
            };

            entries.push(HistoryEntry {
                file_id: id.to_string(),
                timestamp: record.timestamp,
                claim_number: record.extracted_data.claim_number,
                status: record.validation.status.as_str().to_string(),
            });
        }

        entries.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        Ok(entries)
    }

    /// Ids come from URLs; only well-formed UUIDs may touch the filesystem.
    fn validate_id(id: &str) -> Result<String, StoreError> {
        Uuid::parse_str(id)
            .map(|u| u.to_string())
            .map_err(|_| StoreError::InvalidId(id.to_string()))
    }

    fn record_path(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{id}.json"))
    }
}
