//! # Error Types
//!
//! Structured error handling for claim cycles and store adapters using
//! `thiserror` instead of `Box<dyn Error>` patterns.
//!
//! Two failure families are kept deliberately separate:
//!
//! - [`ClaimError`]: faults that abort the current cycle (a store round trip
//!   failed, or a configuration was rejected). Each store call is
//!   independently atomic, so an aborted cycle leaves no partially-applied
//!   transition behind.
//! - [`ProcessingError`]: a failure reported by the injected
//!   [`TaskProcessor`](crate::claim::TaskProcessor). These never abort a
//!   cycle; the engine skips the completion step for the affected task and
//!   lease expiry drives the retry.
//!
//! A conditional update that matches zero documents is *not* an error in
//! either family: it means another claimant won the race.

use thiserror::Error;

/// Cycle-fatal errors surfaced by [`ClaimEngine`](crate::claim::ClaimEngine)
/// and [`TaskStore`](crate::store::TaskStore) implementations.
#[derive(Error, Debug)]
pub enum ClaimError {
    #[error("Store error: {operation}: {message}")]
    Store { operation: String, message: String },

    #[error("Configuration error: {message}")]
    Configuration { message: String },
}

impl ClaimError {
    /// Create a store error naming the failing store operation.
    pub fn store(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Store {
            operation: operation.into(),
            message: message.into(),
        }
    }

    /// Create a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }
}

/// Failure reported by a task processor.
///
/// Opaque to the engine beyond the fact of failure; the message is logged
/// and the task is left in `processing` for lease-based retry.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct ProcessingError {
    pub message: String,
}

impl ProcessingError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// A processor call that outran the configured deadline.
    pub fn timed_out(timeout: std::time::Duration) -> Self {
        Self {
            message: format!("processing timed out after {}s", timeout.as_secs()),
        }
    }
}

pub type Result<T> = std::result::Result<T, ClaimError>;
