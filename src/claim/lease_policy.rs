//! # Lease Policy
//!
//! Pure decision logic for claim eligibility and lease cutoffs. No side
//! effects, no I/O; both claim variants consume the same predicate, so this
//! is the only place "is this task safe to pick up" is defined.

use chrono::{DateTime, Duration, Utc};
use std::time::Duration as StdDuration;

use crate::models::Task;
use crate::store::TaskFilter;

/// Lease policy: how long a `processing` lock is honored before the task is
/// considered abandoned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LeasePolicy {
    lease_timeout: Duration,
}

impl LeasePolicy {
    pub fn new(lease_timeout: StdDuration) -> Self {
        Self {
            // An out-of-range timeout saturates to "leases never expire".
            lease_timeout: Duration::from_std(lease_timeout).unwrap_or(Duration::MAX),
        }
    }

    /// The cutoff instant: locks recorded strictly before it are expired.
    pub fn stale_before(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now.checked_sub_signed(self.lease_timeout)
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    }

    /// Whether `task` is safe for any claimant to attempt to claim at `now`:
    /// pending, or processing with an absent or expired lease.
    pub fn is_claimable(&self, task: &Task, now: DateTime<Utc>) -> bool {
        self.claimable_filter(now).matches(task)
    }

    /// The eligibility predicate in filter form, for store calls.
    pub fn claimable_filter(&self, now: DateTime<Utc>) -> TaskFilter {
        TaskFilter::Claimable {
            stale_before: self.stale_before(now),
        }
    }
}

impl Default for LeasePolicy {
    fn default() -> Self {
        Self::new(StdDuration::from_secs(300)) // 5 minutes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TaskStatus;
    use proptest::prelude::*;

    fn task(status: TaskStatus, locked_at: Option<DateTime<Utc>>) -> Task {
        Task {
            id: 1,
            status,
            locked_at,
            payload: serde_json::json!({}),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn pending_is_always_claimable() {
        let policy = LeasePolicy::default();
        assert!(policy.is_claimable(&task(TaskStatus::Pending, None), Utc::now()));
    }

    #[test]
    fn fresh_processing_lease_is_honored() {
        let policy = LeasePolicy::default();
        let now = Utc::now();
        assert!(!policy.is_claimable(&task(TaskStatus::Processing, Some(now)), now));
    }

    #[test]
    fn six_minute_old_lock_is_claimable_under_five_minute_timeout() {
        let policy = LeasePolicy::new(StdDuration::from_secs(300));
        let now = Utc::now();
        let stale = task(TaskStatus::Processing, Some(now - Duration::minutes(6)));
        assert!(policy.is_claimable(&stale, now));
    }

    #[test]
    fn lock_exactly_at_the_cutoff_is_still_held() {
        let policy = LeasePolicy::new(StdDuration::from_secs(300));
        let now = Utc::now();
        let at_cutoff = task(TaskStatus::Processing, Some(policy.stale_before(now)));
        assert!(!policy.is_claimable(&at_cutoff, now));
    }

    #[test]
    fn never_locked_processing_is_claimable() {
        let policy = LeasePolicy::default();
        assert!(policy.is_claimable(&task(TaskStatus::Processing, None), Utc::now()));
    }

    #[test]
    fn done_is_never_claimable() {
        let policy = LeasePolicy::default();
        assert!(!policy.is_claimable(&task(TaskStatus::Done, None), Utc::now()));
    }

    proptest! {
        /// Claim eligibility of a processing task depends only on whether
        /// the lock age exceeds the timeout.
        #[test]
        fn processing_eligibility_tracks_lock_age(
            timeout_secs in 1i64..86_400,
            age_secs in 0i64..172_800,
        ) {
            let policy = LeasePolicy::new(StdDuration::from_secs(timeout_secs as u64));
            let now = Utc::now();
            let locked = task(
                TaskStatus::Processing,
                Some(now - Duration::seconds(age_secs)),
            );
            prop_assert_eq!(
                policy.is_claimable(&locked, now),
                age_secs > timeout_secs
            );
        }

        /// Pending tasks are claimable under any timeout.
        #[test]
        fn pending_claimable_under_any_timeout(timeout_secs in 1u64..86_400) {
            let policy = LeasePolicy::new(StdDuration::from_secs(timeout_secs));
            prop_assert!(policy.is_claimable(&task(TaskStatus::Pending, None), Utc::now()));
        }
    }
}
