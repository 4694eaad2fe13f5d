//! Best-Effort Operations
//!
//! Cleanup steps whose failure must never fail the request they belong
//! to: fetching the evidence for the attachment and deleting the blob
//! afterwards. Their outcome is logged and then dropped.

use std::fmt::Display;
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BestEffort<T> {
    Completed(T),
    Failed(String),
}

impl<T> BestEffort<T> {
    pub fn from_result<E: Display>(result: Result<T, E>) -> Self {
        match result {
            Ok(value) => BestEffort::Completed(value),
            Err(e) => BestEffort::Failed(e.to_string()),
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, BestEffort::Completed(_))
    }

    /// Log the outcome under `operation` and keep the value, if any
    pub fn log(self, operation: &str) -> Option<T> {
        match self {
            BestEffort::Completed(value) => {
                debug!("{} completed", operation);
                Some(value)
            }
            BestEffort::Failed(reason) => {
                warn!("{} failed (ignored): {}", operation, reason);
                None
            }
        }
    }
}
