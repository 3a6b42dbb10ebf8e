//! Book repository: operations on the `books` table.

use std::path::{Path, PathBuf};

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};

use super::{Database, DatabaseError};
use crate::error::RecordError;
use crate::ids::generate_book_id;
use crate::parser::{BookFormat, BookMetadata};
use crate::record::{BookRecord, RecordUpdate};
use crate::status::BookStatus;
use crate::storage::ObjectKey;

/// A raw book row from the database.
#[derive(Debug, Clone)]
struct BookRow {
    id: String,
    status: String,
    format: Option<String>,
    metadata: Option<String>,
    original_filename: Option<String>,
    upload_path: String,
    original_object_key: Option<String>,
    cover_object_key: Option<String>,
    thumbnail_object_key: Option<String>,
    page_count: Option<u32>,
    file_size_bytes: Option<i64>,
    error_detail: Option<String>,
    created_at: String,
    updated_at: String,
    completed_at: Option<String>,
}

impl BookRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            status: row.get("status")?,
            format: row.get("format")?,
            metadata: row.get("metadata")?,
            original_filename: row.get("original_filename")?,
            upload_path: row.get("upload_path")?,
            original_object_key: row.get("original_object_key")?,
            cover_object_key: row.get("cover_object_key")?,
            thumbnail_object_key: row.get("thumbnail_object_key")?,
            page_count: row.get("page_count")?,
            file_size_bytes: row.get("file_size_bytes")?,
            error_detail: row.get("error_detail")?,
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
            completed_at: row.get("completed_at")?,
        })
    }

    fn into_record(self) -> Result<BookRecord, DatabaseError> {
        let status = self
            .status
            .parse::<BookStatus>()
            .map_err(|_| invalid("status", &self.status))?;

        let format = self
            .format
            .as_deref()
            .map(|f| f.parse::<BookFormat>().map_err(|_| invalid("format", f)))
            .transpose()?;

        let metadata = self
            .metadata
            .as_deref()
            .map(|m| serde_json::from_str::<BookMetadata>(m).map_err(|_| invalid("metadata", m)))
            .transpose()?;

        Ok(BookRecord {
            id: self.id,
            status,
            format,
            metadata,
            original_filename: self.original_filename,
            upload_path: PathBuf::from(self.upload_path),
            original_object_key: self.original_object_key.map(ObjectKey::new),
            cover_object_key: self.cover_object_key.map(ObjectKey::new),
            thumbnail_object_key: self.thumbnail_object_key.map(ObjectKey::new),
            page_count: self.page_count,
            file_size_bytes: self.file_size_bytes.map(|n| n.max(0) as u64),
            error_detail: self.error_detail,
            created_at: parse_timestamp("created_at", &self.created_at)?,
            updated_at: parse_timestamp("updated_at", &self.updated_at)?,
            completed_at: self
                .completed_at
                .as_deref()
                .map(|t| parse_timestamp("completed_at", t))
                .transpose()?,
        })
    }
}

fn invalid(column: &'static str, value: &str) -> DatabaseError {
    DatabaseError::InvalidRow {
        column,
        value: value.to_string(),
    }
}

fn parse_timestamp(column: &'static str, value: &str) -> Result<DateTime<Utc>, DatabaseError> {
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|_| invalid(column, value))
}

/// Fixed-width RFC 3339 so that text comparison orders timestamps.
fn format_timestamp(t: DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Creates a new `pending` record with a fresh book id.
pub fn insert_pending(
    db: &Database,
    original_filename: Option<&str>,
    upload_path: &Path,
) -> Result<BookRecord, DatabaseError> {
    let id = generate_book_id();
    let now = format_timestamp(Utc::now());

    db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO books (id, status, original_filename, upload_path, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
            params![
                id,
                BookStatus::Pending.as_str(),
                original_filename,
                upload_path.to_string_lossy(),
                now,
            ],
        )?;
        Ok(())
    })?;

    log::debug!("Inserted pending book {}", id);

    find_by_id(db, &id)?.ok_or_else(|| invalid("id", &id))
}

pub fn find_by_id(db: &Database, id: &str) -> Result<Option<BookRecord>, DatabaseError> {
    db.with_conn(|conn| load(conn, id))?
        .map(BookRow::into_record)
        .transpose()
}

fn load(conn: &Connection, id: &str) -> Result<Option<BookRow>, DatabaseError> {
    let row = conn
        .query_row(
            "SELECT * FROM books WHERE id = ?1",
            params![id],
            BookRow::from_row,
        )
        .optional()?;
    Ok(row)
}

fn current_status(conn: &Connection, id: &str) -> Result<Option<BookStatus>, DatabaseError> {
    let status: Option<String> = conn
        .query_row(
            "SELECT status FROM books WHERE id = ?1",
            params![id],
            |r| r.get(0),
        )
        .optional()?;

    status
        .map(|s| s.parse::<BookStatus>().map_err(|_| invalid("status", &s)))
        .transpose()
}

enum Applied {
    Yes,
    Missing,
    Rejected(BookStatus),
}

/// Applies `update` only if the record is in `expected` and the state
/// machine permits the transition. A rejected update leaves the row as is.
pub fn update_conditional(
    db: &Database,
    id: &str,
    update: &RecordUpdate,
    expected: BookStatus,
) -> Result<(), RecordError> {
    let (format, metadata) = match &update.parsed {
        Some((format, metadata)) => {
            let json = serde_json::to_string(metadata).map_err(|e| DatabaseError::InvalidRow {
                column: "metadata",
                value: e.to_string(),
            })?;
            (Some(format.as_str()), Some(json))
        }
        None => (None, None),
    };

    let now = Utc::now();
    let completed_at = update.status.is_terminal().then(|| format_timestamp(now));

    let applied = db.with_conn(|conn| {
        match current_status(conn, id)? {
            None => return Ok(Applied::Missing),
            Some(current) if current != expected || !current.can_transition_to(update.status) => {
                return Ok(Applied::Rejected(current))
            }
            Some(_) => {}
        }

        let changed = conn.execute(
            "UPDATE books SET
                status = ?2,
                original_object_key = COALESCE(?3, original_object_key),
                cover_object_key = COALESCE(?4, cover_object_key),
                thumbnail_object_key = COALESCE(?5, thumbnail_object_key),
                format = COALESCE(format, ?6),
                metadata = COALESCE(metadata, ?7),
                page_count = COALESCE(?8, page_count),
                file_size_bytes = COALESCE(?9, file_size_bytes),
                error_detail = ?10,
                updated_at = ?11,
                completed_at = COALESCE(?12, completed_at)
             WHERE id = ?1 AND status = ?13",
            params![
                id,
                update.status.as_str(),
                update.original_object_key.as_ref().map(ObjectKey::as_str),
                update.cover_object_key.as_ref().map(ObjectKey::as_str),
                update.thumbnail_object_key.as_ref().map(ObjectKey::as_str),
                format,
                metadata,
                update.page_count,
                update.file_size_bytes.map(|n| n as i64),
                update.error_detail,
                format_timestamp(now),
                completed_at,
                expected.as_str(),
            ],
        )?;

        if changed == 1 {
            return Ok(Applied::Yes);
        }

        // Another connection moved the record between the read and the write.
        Ok(match current_status(conn, id)? {
            Some(current) => Applied::Rejected(current),
            None => Applied::Missing,
        })
    })?;

    match applied {
        Applied::Yes => Ok(()),
        Applied::Missing => Err(RecordError::NotFound(id.to_string())),
        Applied::Rejected(current) => Err(RecordError::Conflict {
            id: id.to_string(),
            current,
            requested: update.status,
        }),
    }
}

/// Deletes a record. Returns whether a row was removed.
pub fn delete(db: &Database, id: &str) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| {
        let removed = conn.execute("DELETE FROM books WHERE id = ?1", params![id])?;
        Ok(removed > 0)
    })
}

/// Unfinished records (`pending` or `processing`) whose last transition is
/// older than `cutoff`, oldest first.
pub fn find_stale(
    db: &Database,
    cutoff: DateTime<Utc>,
) -> Result<Vec<BookRecord>, DatabaseError> {
    let rows = db.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT * FROM books WHERE status IN (?1, ?2) AND updated_at < ?3
             ORDER BY updated_at ASC",
        )?;
        let rows = stmt
            .query_map(
                params![
                    BookStatus::Pending.as_str(),
                    BookStatus::Processing.as_str(),
                    format_timestamp(cutoff)
                ],
                BookRow::from_row,
            )?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })?;

    rows.into_iter().map(BookRow::into_record).collect()
}

pub fn count_by_status(db: &Database, status: BookStatus) -> Result<u64, DatabaseError> {
    db.with_conn(|conn| {
        let count: u64 = conn.query_row(
            "SELECT COUNT(*) FROM books WHERE status = ?1",
            params![status.as_str()],
            |r| r.get(0),
        )?;
        Ok(count)
    })
}
