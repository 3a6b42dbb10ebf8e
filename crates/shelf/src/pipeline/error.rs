use std::time::Duration;

use thiserror::Error;

use crate::error::{ParseError, RecordError, StorageError};

/// Reasons an ingestion ends in `failed`.
///
/// The `Display` text becomes the record's `error_detail` and is shown to
/// users, so storage variants never render the backend's own message.
#[derive(Error, Debug)]
pub enum IngestError {
    #[error("Upload could not be read")]
    Upload {
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error("Storage unavailable after {attempts} attempts")]
    StorageUnavailable { attempts: u32 },

    #[error("Storage rejected the file")]
    Storage(#[source] StorageError),

    #[error("Parsing exceeded the time budget of {}s", .0.as_secs())]
    Timeout(Duration),

    #[error("Parser terminated unexpectedly")]
    ParserCrashed(String),
}

/// Failure of a pipeline step: either the ingestion itself or the record
/// store it reports to.
#[derive(Error, Debug)]
pub(crate) enum StepError {
    #[error(transparent)]
    Ingest(#[from] IngestError),

    #[error(transparent)]
    Record(#[from] RecordError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestWarning {
    CoverSkipped { reason: String },
}
