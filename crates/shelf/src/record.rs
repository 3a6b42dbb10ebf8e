//! Book upload records and the store the ingestion job writes through.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::db::{book_repo, Database};
use crate::error::RecordError;
use crate::parser::{BookFormat, BookMetadata};
use crate::status::BookStatus;
use crate::storage::ObjectKey;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BookRecord {
    pub id: String,
    pub status: BookStatus,
    pub format: Option<BookFormat>,
    pub metadata: Option<BookMetadata>,
    pub original_filename: Option<String>,
    pub upload_path: PathBuf,
    pub original_object_key: Option<ObjectKey>,
    pub cover_object_key: Option<ObjectKey>,
    pub thumbnail_object_key: Option<ObjectKey>,
    pub page_count: Option<u32>,
    pub file_size_bytes: Option<u64>,
    pub error_detail: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// Changes applied together with a status transition.
///
/// `None` fields leave the stored value untouched. `format` and `metadata`
/// travel as one `parsed` pair and are only written if not yet set.
/// `error_detail` replaces the stored value on every update.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordUpdate {
    pub status: BookStatus,
    pub original_object_key: Option<ObjectKey>,
    pub cover_object_key: Option<ObjectKey>,
    pub thumbnail_object_key: Option<ObjectKey>,
    pub parsed: Option<(BookFormat, BookMetadata)>,
    pub page_count: Option<u32>,
    pub file_size_bytes: Option<u64>,
    pub error_detail: Option<String>,
}

impl RecordUpdate {
    pub fn transition(status: BookStatus) -> Self {
        Self {
            status,
            original_object_key: None,
            cover_object_key: None,
            thumbnail_object_key: None,
            parsed: None,
            page_count: None,
            file_size_bytes: None,
            error_detail: None,
        }
    }

    pub fn with_original_key(mut self, key: ObjectKey) -> Self {
        self.original_object_key = Some(key);
        self
    }

    pub fn with_file_size(mut self, bytes: u64) -> Self {
        self.file_size_bytes = Some(bytes);
        self
    }

    pub fn with_parsed(
        mut self,
        format: BookFormat,
        metadata: BookMetadata,
        page_count: Option<u32>,
    ) -> Self {
        self.parsed = Some((format, metadata));
        self.page_count = page_count;
        self
    }

    pub fn with_cover(mut self, cover: ObjectKey, thumbnail: ObjectKey) -> Self {
        self.cover_object_key = Some(cover);
        self.thumbnail_object_key = Some(thumbnail);
        self
    }

    pub fn with_error(mut self, detail: impl Into<String>) -> Self {
        self.error_detail = Some(detail.into());
        self
    }
}

/// Persistence collaborator of the ingestion job.
///
/// `update_record` applies only if the record is currently in `expected`
/// and the state machine allows `expected -> update.status`; otherwise it
/// returns `Conflict` and leaves the record unmodified.
pub trait RecordStore: Send + Sync {
    fn get_record(&self, id: &str) -> Result<Option<BookRecord>, RecordError>;

    fn update_record(
        &self,
        id: &str,
        update: &RecordUpdate,
        expected: BookStatus,
    ) -> Result<(), RecordError>;
}

impl RecordStore for Database {
    fn get_record(&self, id: &str) -> Result<Option<BookRecord>, RecordError> {
        Ok(book_repo::find_by_id(self, id)?)
    }

    fn update_record(
        &self,
        id: &str,
        update: &RecordUpdate,
        expected: BookStatus,
    ) -> Result<(), RecordError> {
        book_repo::update_conditional(self, id, update, expected)
    }
}
