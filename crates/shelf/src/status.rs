//! Lifecycle of a book upload record.
//!
//! ```text
//! pending ──► processing ──► completed
//!                 │  ▲
//!                 │  └─ re-entry (retried job)
//!                 └────► failed
//! ```
//!
//! `completed` and `failed` are terminal. The record store enforces these
//! transitions with a conditional update keyed on the expected current status.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BookStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl BookStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            BookStatus::Pending => "pending",
            BookStatus::Processing => "processing",
            BookStatus::Completed => "completed",
            BookStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, BookStatus::Completed | BookStatus::Failed)
    }

    /// Whether the state machine permits moving from `self` to `next`.
    pub fn can_transition_to(self, next: BookStatus) -> bool {
        matches!(
            (self, next),
            (BookStatus::Pending, BookStatus::Processing)
                | (BookStatus::Processing, BookStatus::Processing)
                | (BookStatus::Processing, BookStatus::Completed)
                | (BookStatus::Processing, BookStatus::Failed)
        )
    }
}

impl fmt::Display for BookStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown book status '{0}'")]
pub struct UnknownStatus(pub String);

impl FromStr for BookStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(BookStatus::Pending),
            "processing" => Ok(BookStatus::Processing),
            "completed" => Ok(BookStatus::Completed),
            "failed" => Ok(BookStatus::Failed),
            other => Err(UnknownStatus(other.to_string())),
        }
    }
}
