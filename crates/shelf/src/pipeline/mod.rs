pub mod budget;
pub mod config;
pub mod context;
pub mod error;
pub mod retry;
pub mod runner;

pub use budget::run_with_budget;
pub use config::PipelineConfig;
pub use context::IngestContext;
pub use error::{IngestError, IngestWarning};
pub use retry::{retry_transient, RetryPolicy};
pub use runner::IngestionJob;
