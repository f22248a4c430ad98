//! Request and response bodies for the HTTP API.

use serde::{Deserialize, Serialize};

use crate::pipeline::DocumentRecord;
use crate::store::HistoryEntry;

#[derive(Debug, Serialize, Deserialize)]
pub struct UploadResponse {
    pub success: bool,
    pub file_id: String,
    pub original_name: String,
    pub result: DocumentRecord,
}

/// One entry of a batch run; either a record or the reason it failed.
#[derive(Debug, Serialize, Deserialize)]
pub struct BatchItem {
    pub filename: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<DocumentRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct BatchResponse {
    pub success: bool,
    /// Files that produced a record, not counting per-file failures.
    pub processed: usize,
    pub results: Vec<BatchItem>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HistoryResponse {
    pub history: Vec<HistoryEntry>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub ollama_available: bool,
}
