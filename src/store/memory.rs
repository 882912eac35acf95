//! # In-Memory Store
//!
//! A process-local [`TaskStore`] backed by a mutex-guarded `BTreeMap`. Every
//! trait operation runs entirely under the guard, so each store call is
//! atomic with respect to every other: the same contract a remote engine
//! provides per document, strengthened here to per call.
//!
//! Used by the integration tests and the demo fleet; also a reasonable
//! single-process queue when durability is not required.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use crate::error::Result;
use crate::models::{NewTask, Task, TaskStatus};
use crate::store::{ClaimOrder, TaskChange, TaskFilter, TaskStore};

/// Task counts by status, for observability and test assertions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatusCounts {
    pub pending: usize,
    pub processing: usize,
    pub done: usize,
}

struct StoreState {
    /// Single source of truth. BTreeMap keeps iteration id-ascending, which
    /// is what the fairness ordering leans on.
    tasks: BTreeMap<i64, Task>,
    next_id: i64,
}

/// In-memory store implementation.
pub struct InMemoryTaskStore {
    state: Mutex<StoreState>,
}

impl InMemoryTaskStore {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(StoreState {
                tasks: BTreeMap::new(),
                next_id: 1,
            }),
        }
    }

    /// Insert a new pending task, returning its assigned id. Ids are
    /// monotonically increasing, so insertion order is creation order.
    pub fn insert(&self, new_task: NewTask) -> i64 {
        self.insert_with_state(new_task, TaskStatus::Pending, None)
    }

    /// Insert a task directly in a chosen state. Fixture helper for
    /// exercising recovery paths (for example a `processing` task whose
    /// lease has already expired).
    pub fn insert_with_state(
        &self,
        new_task: NewTask,
        status: TaskStatus,
        locked_at: Option<DateTime<Utc>>,
    ) -> i64 {
        let mut state = self.state.lock();
        let id = state.next_id;
        state.next_id += 1;
        state.tasks.insert(
            id,
            Task {
                id,
                status,
                locked_at,
                payload: new_task.payload,
                created_at: Utc::now(),
            },
        );
        id
    }

    /// Fetch a single task by id.
    pub fn get(&self, id: i64) -> Option<Task> {
        self.state.lock().tasks.get(&id).cloned()
    }

    /// Counts by status for observability.
    pub fn counts_by_status(&self) -> StatusCounts {
        let state = self.state.lock();
        let mut counts = StatusCounts::default();
        for task in state.tasks.values() {
            match task.status {
                TaskStatus::Pending => counts.pending += 1,
                TaskStatus::Processing => counts.processing += 1,
                TaskStatus::Done => counts.done += 1,
            }
        }
        counts
    }

    /// Clone out every task, id ascending.
    pub fn snapshot(&self) -> Vec<Task> {
        self.state.lock().tasks.values().cloned().collect()
    }
}

impl Default for InMemoryTaskStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TaskStore for InMemoryTaskStore {
    async fn find_eligible(
        &self,
        filter: &TaskFilter,
        order: ClaimOrder,
        limit: Option<usize>,
    ) -> Result<Vec<Task>> {
        let state = self.state.lock();
        let limit = limit.unwrap_or(usize::MAX);
        let matching = |task: &&Task| filter.matches(task);
        let cloned = |task: &Task| task.clone();

        let found = match order {
            ClaimOrder::OldestFirst => state
                .tasks
                .values()
                .filter(matching)
                .take(limit)
                .map(cloned)
                .collect(),
            ClaimOrder::NewestFirst => state
                .tasks
                .values()
                .rev()
                .filter(matching)
                .take(limit)
                .map(cloned)
                .collect(),
        };
        Ok(found)
    }

    async fn conditional_update(&self, filter: &TaskFilter, change: TaskChange) -> Result<u64> {
        let mut state = self.state.lock();
        let mut modified = 0u64;
        for task in state.tasks.values_mut() {
            if filter.matches(task) {
                change.apply(task);
                modified += 1;
            }
        }
        Ok(modified)
    }

    async fn find_one_and_update(
        &self,
        filter: &TaskFilter,
        change: TaskChange,
        order: ClaimOrder,
    ) -> Result<Option<Task>> {
        let mut state = self.state.lock();
        let id = match order {
            ClaimOrder::OldestFirst => state
                .tasks
                .values()
                .find(|task| filter.matches(task))
                .map(|task| task.id),
            ClaimOrder::NewestFirst => state
                .tasks
                .values()
                .rev()
                .find(|task| filter.matches(task))
                .map(|task| task.id),
        };

        Ok(id.map(|id| {
            let task = state
                .tasks
                .get_mut(&id)
                .expect("matched id is present under the same guard");
            change.apply(task);
            task.clone()
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn seeded(n: i64) -> InMemoryTaskStore {
        let store = InMemoryTaskStore::new();
        for i in 0..n {
            store.insert(NewTask::new(serde_json::json!({ "seq": i })));
        }
        store
    }

    #[tokio::test]
    async fn find_eligible_respects_order_and_limit() {
        let store = seeded(5);

        let oldest = store
            .find_eligible(&TaskFilter::Pending, ClaimOrder::OldestFirst, Some(3))
            .await
            .unwrap();
        assert_eq!(oldest.iter().map(|t| t.id).collect::<Vec<_>>(), vec![1, 2, 3]);

        let newest = store
            .find_eligible(&TaskFilter::Pending, ClaimOrder::NewestFirst, Some(2))
            .await
            .unwrap();
        assert_eq!(newest.iter().map(|t| t.id).collect::<Vec<_>>(), vec![5, 4]);
    }

    #[tokio::test]
    async fn second_claim_over_same_candidates_wins_nothing() {
        let store = seeded(3);
        let now = Utc::now();
        let filter = TaskFilter::ClaimableIn {
            ids: vec![1, 2, 3],
            stale_before: now - Duration::seconds(300),
        };

        let first = store
            .conditional_update(&filter, TaskChange::Claim { locked_at: now })
            .await
            .unwrap();
        assert_eq!(first, 3);

        // The same conditional update re-evaluated against current state:
        // every candidate now holds a fresh lease, so the race is lost.
        let second = store
            .conditional_update(&filter, TaskChange::Claim { locked_at: now })
            .await
            .unwrap();
        assert_eq!(second, 0);
    }

    #[tokio::test]
    async fn find_one_and_update_returns_post_update_document() {
        let store = seeded(2);
        let now = Utc::now();

        let claimed = store
            .find_one_and_update(
                &TaskFilter::Claimable {
                    stale_before: now - Duration::seconds(300),
                },
                TaskChange::Claim { locked_at: now },
                ClaimOrder::OldestFirst,
            )
            .await
            .unwrap()
            .expect("a pending task is claimable");

        assert_eq!(claimed.id, 1);
        assert_eq!(claimed.status, TaskStatus::Processing);
        assert_eq!(claimed.locked_at, Some(now));
        assert_eq!(store.get(1).unwrap().status, TaskStatus::Processing);
    }

    #[tokio::test]
    async fn complete_clears_the_lock() {
        let store = InMemoryTaskStore::new();
        let id = store.insert_with_state(
            NewTask::new(serde_json::json!({})),
            TaskStatus::Processing,
            Some(Utc::now()),
        );

        let modified = store
            .conditional_update(&TaskFilter::ProcessingIn { ids: vec![id] }, TaskChange::Complete)
            .await
            .unwrap();

        assert_eq!(modified, 1);
        let task = store.get(id).unwrap();
        assert_eq!(task.status, TaskStatus::Done);
        assert_eq!(task.locked_at, None);
    }

    #[tokio::test]
    async fn counts_track_statuses() {
        let store = seeded(2);
        store.insert_with_state(
            NewTask::new(serde_json::json!({})),
            TaskStatus::Done,
            None,
        );

        assert_eq!(
            store.counts_by_status(),
            StatusCounts {
                pending: 2,
                processing: 0,
                done: 1
            }
        );
    }
}
