//! # Atomic Store Adapter
//!
//! ## Architecture: Capability Interface over Storage Engines
//!
//! The claim engine never talks to a storage engine directly. It consumes the
//! [`TaskStore`] trait: three primitive operations that any engine with
//! per-document atomic conditional writes can provide:
//!
//! - **`find_eligible`**: a plain read, no locking
//! - **`conditional_update`**: conditional bulk write, matched at execution
//!   time, atomic per document
//! - **`find_one_and_update`**: select-first-and-mutate in one indivisible
//!   step
//!
//! All synchronization between claimants is delegated to these primitives;
//! the core holds no in-process locks, queues, or semaphores of its own.
//!
//! Predicates and field sets are a closed, typed vocabulary
//! ([`TaskFilter`] / [`TaskChange`]) rather than a free-form query language.
//! [`TaskFilter::matches`] is the single executable form of each predicate:
//! the in-memory store evaluates it directly and the Postgres store compiles
//! the same variants to SQL.

pub mod memory;
pub mod postgres;

pub use memory::{InMemoryTaskStore, StatusCounts};
pub use postgres::PostgresTaskStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::models::{Task, TaskStatus};

/// Claim ordering over the store's monotonic task ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClaimOrder {
    /// Id ascending: oldest-created-first. The fairness default.
    OldestFirst,
    /// Id descending. Useful for stores where recent work is hot.
    NewestFirst,
}

impl Default for ClaimOrder {
    fn default() -> Self {
        ClaimOrder::OldestFirst
    }
}

/// Typed predicates understood by every store adapter.
///
/// Filters are matched against document state *at execution time* of the
/// store operation, never at call time; that re-evaluation is what closes
/// the race window between a plain read and a conditional write.
#[derive(Debug, Clone, PartialEq)]
pub enum TaskFilter {
    /// `status == pending`. The bulk variant's candidate-selection read.
    Pending,
    /// The full claim-eligibility predicate: pending, or processing with an
    /// absent or expired lease.
    Claimable { stale_before: DateTime<Utc> },
    /// [`TaskFilter::Claimable`] restricted to a candidate id set. Used by
    /// the bulk lock step to re-check eligibility inside the update.
    ClaimableIn {
        ids: Vec<i64>,
        stale_before: DateTime<Utc>,
    },
    /// `status == processing` restricted to an id set. Used for the bulk
    /// post-claim re-read and as the completion guard.
    ProcessingIn { ids: Vec<i64> },
}

impl TaskFilter {
    /// Evaluate this predicate against a single document.
    pub fn matches(&self, task: &Task) -> bool {
        match self {
            TaskFilter::Pending => task.status == TaskStatus::Pending,
            TaskFilter::Claimable { stale_before } => is_claimable(task, *stale_before),
            TaskFilter::ClaimableIn { ids, stale_before } => {
                ids.contains(&task.id) && is_claimable(task, *stale_before)
            }
            TaskFilter::ProcessingIn { ids } => {
                task.status == TaskStatus::Processing && ids.contains(&task.id)
            }
        }
    }
}

/// The claim-eligibility predicate. Single source of truth for "is this task
/// safe to pick up", shared by both claim variants via
/// [`LeasePolicy`](crate::claim::LeasePolicy).
fn is_claimable(task: &Task, stale_before: DateTime<Utc>) -> bool {
    match task.status {
        TaskStatus::Pending => true,
        TaskStatus::Processing => task.lease_expired(stale_before),
        TaskStatus::Done => false,
    }
}

/// Typed field sets applied by conditional writes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TaskChange {
    /// Transition into `processing` and record the lease start.
    Claim { locked_at: DateTime<Utc> },
    /// Transition into `done` and clear the lock.
    Complete,
}

impl TaskChange {
    /// Apply this change to an owned document. In-memory adapters use this;
    /// SQL adapters compile the equivalent `SET` clause.
    pub fn apply(&self, task: &mut Task) {
        match self {
            TaskChange::Claim { locked_at } => {
                task.status = TaskStatus::Processing;
                task.locked_at = Some(*locked_at);
            }
            TaskChange::Complete => {
                task.status = TaskStatus::Done;
                task.locked_at = None;
            }
        }
    }
}

/// The three primitive operations the claim engine consumes.
///
/// Implementations must guarantee per-document atomicity of the conditional
/// writes: when two claimants race over the same document, exactly one of
/// them observes it as modified.
#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Plain read of documents matching `filter`, ordered by id per `order`,
    /// truncated to `limit` when given. Takes no locks and makes no claim.
    async fn find_eligible(
        &self,
        filter: &TaskFilter,
        order: ClaimOrder,
        limit: Option<usize>,
    ) -> Result<Vec<Task>>;

    /// Apply `change` to every document matching `filter` at execution time,
    /// atomically per document. Returns the count actually modified; zero
    /// means every candidate went to another claimant, which is a normal
    /// outcome rather than an error.
    async fn conditional_update(&self, filter: &TaskFilter, change: TaskChange) -> Result<u64>;

    /// Atomically select the first document matching `filter` (by `order`),
    /// apply `change`, and return the post-update document. No other
    /// claimant can interleave between the match and the write for the
    /// returned document.
    async fn find_one_and_update(
        &self,
        filter: &TaskFilter,
        change: TaskChange,
        order: ClaimOrder,
    ) -> Result<Option<Task>>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn task(id: i64, status: TaskStatus, locked_at: Option<DateTime<Utc>>) -> Task {
        Task {
            id,
            status,
            locked_at,
            payload: serde_json::json!({}),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn pending_filter_matches_only_pending() {
        let filter = TaskFilter::Pending;
        assert!(filter.matches(&task(1, TaskStatus::Pending, None)));
        assert!(!filter.matches(&task(1, TaskStatus::Processing, None)));
        assert!(!filter.matches(&task(1, TaskStatus::Done, None)));
    }

    #[test]
    fn claimable_accepts_stale_processing_but_not_fresh() {
        let now = Utc::now();
        let filter = TaskFilter::Claimable { stale_before: now };
        assert!(filter.matches(&task(1, TaskStatus::Pending, None)));
        assert!(filter.matches(&task(1, TaskStatus::Processing, None)));
        assert!(filter.matches(&task(
            1,
            TaskStatus::Processing,
            Some(now - Duration::seconds(1)),
        )));
        assert!(!filter.matches(&task(1, TaskStatus::Processing, Some(now))));
        assert!(!filter.matches(&task(1, TaskStatus::Done, None)));
    }

    #[test]
    fn claimable_in_requires_id_membership() {
        let now = Utc::now();
        let filter = TaskFilter::ClaimableIn {
            ids: vec![1, 2],
            stale_before: now,
        };
        assert!(filter.matches(&task(1, TaskStatus::Pending, None)));
        assert!(!filter.matches(&task(3, TaskStatus::Pending, None)));
    }

    #[test]
    fn processing_in_guards_status_and_ids() {
        let filter = TaskFilter::ProcessingIn { ids: vec![7] };
        let now = Utc::now();
        assert!(filter.matches(&task(7, TaskStatus::Processing, Some(now))));
        assert!(!filter.matches(&task(7, TaskStatus::Pending, None)));
        assert!(!filter.matches(&task(8, TaskStatus::Processing, Some(now))));
    }

    #[test]
    fn changes_apply_expected_transitions() {
        let now = Utc::now();
        let mut t = task(1, TaskStatus::Pending, None);

        TaskChange::Claim { locked_at: now }.apply(&mut t);
        assert_eq!(t.status, TaskStatus::Processing);
        assert_eq!(t.locked_at, Some(now));

        TaskChange::Complete.apply(&mut t);
        assert_eq!(t.status, TaskStatus::Done);
        assert_eq!(t.locked_at, None);
    }
}
