use std::path::PathBuf;

use serde::Serialize;

use crate::parser::BookFormat;
use crate::pipeline::IngestWarning;
use crate::record::BookRecord;
use crate::status::BookStatus;

/// Where the uploaded bytes can be read from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadHandle {
    pub path: PathBuf,
    /// Original filename, used only to settle ambiguous ZIP uploads.
    pub filename_hint: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestRequest {
    pub book_id: String,
    pub upload: UploadHandle,
}

impl IngestRequest {
    pub fn new(book_id: impl Into<String>, path: impl Into<PathBuf>, filename_hint: Option<String>) -> Self {
        Self {
            book_id: book_id.into(),
            upload: UploadHandle {
                path: path.into(),
                filename_hint,
            },
        }
    }

    /// Rebuilds the request a record was created for.
    pub fn from_record(record: &BookRecord) -> Self {
        Self::new(
            record.id.clone(),
            record.upload_path.clone(),
            record.original_filename.clone(),
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum JobOutcome {
    Completed {
        format: BookFormat,
        cover_stored: bool,
    },
    Failed {
        detail: String,
    },
    /// The record was already terminal; nothing was done.
    Skipped {
        status: BookStatus,
    },
    /// Another run moved the record first.
    Superseded {
        current: BookStatus,
    },
    /// The record does not exist (or was deleted mid-flight).
    Missing,
    /// The record store failed; the record is left for the sweep.
    Aborted {
        reason: String,
    },
}

#[derive(Debug, Clone)]
pub struct JobResult {
    pub book_id: String,
    pub outcome: JobOutcome,
    pub warnings: Vec<IngestWarning>,
}

impl JobResult {
    pub fn is_completed(&self) -> bool {
        matches!(self.outcome, JobOutcome::Completed { .. })
    }
}
