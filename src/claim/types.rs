//! # Claim Engine Types
//!
//! The processing-callback boundary between the engine and business logic.

use async_trait::async_trait;

use crate::error::ProcessingError;
use crate::models::Task;

/// Business processing for a claimed task, injected by the caller.
///
/// The engine interprets the result only as success or failure: success
/// makes the task part of the completion update, failure leaves it in
/// `processing` for lease-based retry. Everything else about the work is
/// opaque.
///
/// Implementations must be shareable across concurrent cycles (`Send +
/// Sync`); a processor holding per-call mutable state should keep it behind
/// its own synchronization.
#[async_trait]
pub trait TaskProcessor: Send + Sync {
    async fn process(&self, task: &Task) -> Result<(), ProcessingError>;

    /// Identifier used in logs.
    fn name(&self) -> &'static str {
        "task_processor"
    }
}
