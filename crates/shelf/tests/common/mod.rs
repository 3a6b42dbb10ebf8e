//! Shared utilities for shelf integration tests.
//!
//! - `TestHarness`: temp upload/storage dirs, in-memory database, job wiring
//! - `TestStorage` / `RecordingStore`: instrumented collaborators
//! - builders for synthetic PDF, EPUB and cover fixtures

pub mod builders;
pub mod harness;

pub use builders::*;
pub use harness::{RecordHook, RecordingStore, TestHarness, TestStorage};
