pub mod config;
pub mod cover;
pub mod db;
pub mod error;
pub mod ids;
pub mod logging;
pub mod parser;
pub mod pipeline;
pub mod record;
pub mod sanitize;
pub mod secrets;
pub mod status;
pub mod storage;
pub mod worker;

pub use config::{load_config, Config};
pub use db::Database;
pub use error::{
    ConfigError, ParseError, RecordError, Result, ShelfError, StorageError, WorkerError,
};
pub use parser::{BookFormat, BookMetadata, ParsedDocument, Parser, ParserRegistry};
pub use pipeline::{IngestError, IngestionJob, PipelineConfig};
pub use record::{BookRecord, RecordStore, RecordUpdate};
pub use status::BookStatus;
pub use storage::{create_backend, FileStorage, ObjectKey, ObjectStorage, StorageBackend};
pub use worker::{IngestRequest, JobOutcome, JobResult, UploadHandle, WorkerPool};
