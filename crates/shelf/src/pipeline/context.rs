use std::sync::Arc;

use crate::parser::{ParsedDocument, Parser};
use crate::storage::ObjectKey;
use crate::worker::job::{IngestRequest, JobOutcome, JobResult};

use super::error::IngestWarning;

/// State accumulated while one upload moves through the pipeline.
pub struct IngestContext {
    pub request: IngestRequest,

    // Set once the upload has been read.
    pub bytes: Option<Arc<[u8]>>,
    pub parser: Option<Parser>,

    pub original_key: Option<ObjectKey>,
    pub parsed: Option<ParsedDocument>,
    pub cover_key: Option<ObjectKey>,
    pub thumbnail_key: Option<ObjectKey>,

    pub warnings: Vec<IngestWarning>,
}

impl IngestContext {
    pub fn new(request: IngestRequest) -> Self {
        Self {
            request,
            bytes: None,
            parser: None,
            original_key: None,
            parsed: None,
            cover_key: None,
            thumbnail_key: None,
            warnings: Vec::new(),
        }
    }

    pub fn book_id(&self) -> &str {
        &self.request.book_id
    }

    /// Every object this job has written so far.
    pub fn stored_keys(&self) -> Vec<ObjectKey> {
        [&self.original_key, &self.cover_key, &self.thumbnail_key]
            .into_iter()
            .flatten()
            .cloned()
            .collect()
    }

    pub fn finish(self, outcome: JobOutcome) -> JobResult {
        JobResult {
            book_id: self.request.book_id,
            outcome,
            warnings: self.warnings,
        }
    }
}
