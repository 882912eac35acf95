//! # Claim Engine
//!
//! ## Architecture: Lease-Based Claiming over Atomic Conditional Writes
//!
//! The engine implements the claim → process → complete cycle in two
//! variants that share one state model and one eligibility predicate:
//!
//! - **Bulk** ([`ClaimEngine::run_bulk_cycle`]): per round, read up to
//!   `batch_size` pending candidates, conditionally lock whatever is still
//!   eligible among them in one bulk write, process each claimed task, and
//!   complete the successes in one bulk write. The in-update eligibility
//!   re-check closes the race window between the candidate read and the
//!   lock.
//! - **Single** ([`ClaimEngine::run_single_cycle`]): one atomic
//!   find-one-and-claim per task. No read-then-update window exists at all,
//!   at the price of one round trip per task.
//!
//! ## Concurrency
//!
//! The engine holds no shared mutable state; cycle totals are local and
//! returned to the caller. Mutual exclusion between claimants comes entirely
//! from the store's per-document conditional writes, so any number of
//! overlapping cycles (other threads, other processes, or a trigger that
//! double-fires) can run against the same store. Claimants sharing a store
//! should use a common `batch_size`: the post-claim re-read spans the whole
//! candidate set, and uniform batches keep concurrent candidate sets either
//! identical or disjoint.
//!
//! ## Recovery
//!
//! Lease expiry is the only recovery mechanism. A claimant that crashes or
//! stalls leaves its tasks in `processing`; once their `locked_at` ages past
//! the lease timeout they are claimable again. There is no heartbeat
//! renewal: a processor that runs past the lease timeout can lose its task
//! to another claimant, and the completion write of the loser then matches
//! zero documents.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, instrument, warn};

use crate::claim::{LeasePolicy, TaskProcessor};
use crate::config::ClaimConfig;
use crate::error::{ProcessingError, Result};
use crate::models::Task;
use crate::store::{TaskChange, TaskFilter, TaskStore};

/// Claim engine for one logical claimant.
///
/// Cheap to construct per invocation or to share behind `Arc`; every method
/// takes `&self`.
pub struct ClaimEngine {
    store: Arc<dyn TaskStore>,
    policy: LeasePolicy,
    config: ClaimConfig,
}

impl ClaimEngine {
    /// Create an engine with the default configuration (batch of 10,
    /// 5-minute lease, 60-second process deadline).
    pub fn new(store: Arc<dyn TaskStore>) -> Self {
        let config = ClaimConfig::default();
        let policy = LeasePolicy::new(config.lease_timeout);
        Self {
            store,
            policy,
            config,
        }
    }

    /// Create an engine with a custom configuration.
    pub fn with_config(store: Arc<dyn TaskStore>, config: ClaimConfig) -> Result<Self> {
        config.validate()?;
        let policy = LeasePolicy::new(config.lease_timeout);
        Ok(Self {
            store,
            policy,
            config,
        })
    }

    pub fn config(&self) -> &ClaimConfig {
        &self.config
    }

    pub fn policy(&self) -> LeasePolicy {
        self.policy
    }

    /// Run the bulk claim cycle to exhaustion of eligible work.
    ///
    /// Returns the number of tasks this claimant fully completed. The cycle
    /// ends when a candidate-selection read comes back empty; losing an
    /// entire candidate set to competitors just moves on to a fresh
    /// selection.
    #[instrument(skip(self, processor), fields(processor = processor.name()))]
    pub async fn run_bulk_cycle(&self, processor: &dyn TaskProcessor) -> Result<u64> {
        let mut total_completed = 0u64;

        loop {
            let now = Utc::now();

            // Plain candidate read; not yet a claim.
            let candidates = self
                .store
                .find_eligible(
                    &TaskFilter::Pending,
                    self.config.order,
                    Some(self.config.batch_size),
                )
                .await?;
            if candidates.is_empty() {
                break;
            }
            let candidate_ids: Vec<i64> = candidates.iter().map(|task| task.id).collect();

            // One conditional bulk write locks whatever is still eligible
            // among the candidates. The re-check inside the update is what
            // makes a concurrent claimant lose cleanly instead of double-
            // claiming.
            let won = self
                .store
                .conditional_update(
                    &TaskFilter::ClaimableIn {
                        ids: candidate_ids.clone(),
                        stale_before: self.policy.stale_before(now),
                    },
                    TaskChange::Claim { locked_at: now },
                )
                .await?;
            if won == 0 {
                debug!(
                    candidates = candidate_ids.len(),
                    "Lost entire candidate set to other claimants; reselecting"
                );
                continue;
            }
            debug!(won, candidates = candidate_ids.len(), "Claimed batch");

            // Re-read our subset now in processing. Under normal operation
            // this equals the won set; the re-read guards against partial
            // visibility of the bulk write.
            let claimed = self
                .store
                .find_eligible(
                    &TaskFilter::ProcessingIn {
                        ids: candidate_ids,
                    },
                    self.config.order,
                    None,
                )
                .await?;

            let mut completed_ids = Vec::with_capacity(claimed.len());
            for task in &claimed {
                match self.process_with_deadline(processor, task).await {
                    Ok(()) => completed_ids.push(task.id),
                    Err(error) => {
                        // Excluded from completion; the lease expires and a
                        // later cycle retries it.
                        warn!(
                            task_id = task.id,
                            error = %error,
                            "Processing failed; leaving task for lease-expiry retry"
                        );
                    }
                }
            }

            if !completed_ids.is_empty() {
                let completed = self
                    .store
                    .conditional_update(
                        &TaskFilter::ProcessingIn {
                            ids: completed_ids,
                        },
                        TaskChange::Complete,
                    )
                    .await?;
                total_completed += completed;
            }
        }

        info!(total_completed, "Bulk claim cycle drained eligible work");
        Ok(total_completed)
    }

    /// Run the single-item claim cycle to exhaustion of eligible work.
    ///
    /// Selection and locking happen in one indivisible store operation, so
    /// unlike the bulk variant this path can also reclaim stale
    /// `processing` tasks directly: the full eligibility predicate drives
    /// the claim.
    #[instrument(skip(self, processor), fields(processor = processor.name()))]
    pub async fn run_single_cycle(&self, processor: &dyn TaskProcessor) -> Result<u64> {
        let mut total_completed = 0u64;

        loop {
            let now = Utc::now();
            let claimed = self
                .store
                .find_one_and_update(
                    &self.policy.claimable_filter(now),
                    TaskChange::Claim { locked_at: now },
                    self.config.order,
                )
                .await?;
            let Some(task) = claimed else {
                break;
            };
            debug!(task_id = task.id, "Claimed task");

            match self.process_with_deadline(processor, &task).await {
                Ok(()) => {
                    let completed = self
                        .store
                        .conditional_update(
                            &TaskFilter::ProcessingIn {
                                ids: vec![task.id],
                            },
                            TaskChange::Complete,
                        )
                        .await?;
                    total_completed += completed;
                }
                Err(error) => {
                    warn!(
                        task_id = task.id,
                        error = %error,
                        "Processing failed; leaving task for lease-expiry retry"
                    );
                }
            }
        }

        info!(total_completed, "Single claim cycle drained eligible work");
        Ok(total_completed)
    }

    /// Invoke the processor under the configured deadline. An elapsed
    /// deadline is a processing failure, not a cycle fault.
    async fn process_with_deadline(
        &self,
        processor: &dyn TaskProcessor,
        task: &Task,
    ) -> std::result::Result<(), ProcessingError> {
        match self.config.process_timeout {
            Some(deadline) => match tokio::time::timeout(deadline, processor.process(task)).await {
                Ok(result) => result,
                Err(_elapsed) => Err(ProcessingError::timed_out(deadline)),
            },
            None => processor.process(task).await,
        }
    }
}
