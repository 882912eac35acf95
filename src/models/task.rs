//! # Task Model
//!
//! The unit of work claimed, processed, and completed by worker cycles.
//!
//! ## Lifecycle
//!
//! Tasks are created externally in `pending`, claimed into `processing` with
//! a fresh `locked_at`, and either reach `done` (lock cleared) or age past
//! the lease timeout and become claimable again. The status progression is
//! monotonic: `pending → processing → done`. A task whose lease has expired
//! stays in `processing`; it is the lease age, not the status, that makes it
//! eligible again, for any claimant including the one that originally locked
//! it.
//!
//! ## Payload
//!
//! The business payload is stored as opaque JSON; the claiming logic never
//! inspects it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Lifecycle states of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Processing,
    Done,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Processing => "processing",
            TaskStatus::Done => "done",
        }
    }

    /// `done` is terminal; no further transitions are permitted.
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Done)
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown status string from a store.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Unknown task status: {0}")]
pub struct ParseTaskStatusError(pub String);

impl FromStr for TaskStatus {
    type Err = ParseTaskStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(TaskStatus::Pending),
            "processing" => Ok(TaskStatus::Processing),
            "done" => Ok(TaskStatus::Done),
            other => Err(ParseTaskStatusError(other.to_string())),
        }
    }
}

/// A task instance as read from a store.
///
/// `id` is assigned by the store at creation and is monotonically
/// increasing, which is what gives "lowest id first" its
/// oldest-created-first meaning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: i64,
    pub status: TaskStatus,
    /// Set when the task is claimed into `processing`, cleared on
    /// completion. `None` on a `processing` task means the lock was never
    /// recorded and the task is always claimable.
    pub locked_at: Option<DateTime<Utc>>,
    /// Opaque business payload; never inspected by the claiming logic.
    pub payload: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl Task {
    /// Whether the lease on this task is older than the given cutoff.
    ///
    /// An absent `locked_at` counts as expired: a lock that was never
    /// recorded holds nothing.
    pub fn lease_expired(&self, stale_before: DateTime<Utc>) -> bool {
        match self.locked_at {
            None => true,
            Some(locked_at) => locked_at < stale_before,
        }
    }
}

/// New task for creation (without store-generated fields).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewTask {
    pub payload: serde_json::Value,
}

impl NewTask {
    pub fn new(payload: serde_json::Value) -> Self {
        Self { payload }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn task_locked_at(locked_at: Option<DateTime<Utc>>) -> Task {
        Task {
            id: 1,
            status: TaskStatus::Processing,
            locked_at,
            payload: serde_json::json!({}),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn status_round_trips_through_strings() {
        for status in [TaskStatus::Pending, TaskStatus::Processing, TaskStatus::Done] {
            assert_eq!(status.as_str().parse::<TaskStatus>().unwrap(), status);
        }
        assert!("cancelled".parse::<TaskStatus>().is_err());
    }

    #[test]
    fn only_done_is_terminal() {
        assert!(!TaskStatus::Pending.is_terminal());
        assert!(!TaskStatus::Processing.is_terminal());
        assert!(TaskStatus::Done.is_terminal());
    }

    #[test]
    fn missing_lock_counts_as_expired() {
        let cutoff = Utc::now();
        assert!(task_locked_at(None).lease_expired(cutoff));
    }

    #[test]
    fn lease_comparison_is_strict() {
        let cutoff = Utc::now();
        // Exactly at the cutoff the lease is still held.
        assert!(!task_locked_at(Some(cutoff)).lease_expired(cutoff));
        assert!(task_locked_at(Some(cutoff - Duration::seconds(1))).lease_expired(cutoff));
        assert!(!task_locked_at(Some(cutoff + Duration::seconds(1))).lease_expired(cutoff));
    }
}
