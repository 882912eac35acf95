//! # Claim Configuration
//!
//! Plain-value configuration for claim cycles: how many tasks a bulk round
//! competes for, how long a lease is honored, and how long a single
//! processor call may run. No file formats or environment layers; callers
//! construct the struct and hand it to the engine.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::warn;

use crate::error::{ClaimError, Result};
use crate::store::ClaimOrder;

/// Configuration for claim cycle behavior.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClaimConfig {
    /// Maximum number of tasks a bulk round selects and competes for.
    pub batch_size: usize,
    /// How long a `processing` lock is honored before the task counts as
    /// abandoned and becomes claimable again.
    pub lease_timeout: Duration,
    /// Deadline for a single processor call; elapsing counts as a
    /// processing failure. `None` disables the deadline and lets a stuck
    /// processor block its claimant indefinitely.
    pub process_timeout: Option<Duration>,
    /// Claim ordering over task ids.
    pub order: ClaimOrder,
}

impl Default for ClaimConfig {
    fn default() -> Self {
        Self {
            batch_size: 10,
            lease_timeout: Duration::from_secs(300), // 5 minutes
            process_timeout: Some(Duration::from_secs(60)),
            order: ClaimOrder::OldestFirst,
        }
    }
}

impl ClaimConfig {
    /// Validate the configuration before use.
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(ClaimError::configuration("batch_size must be at least 1"));
        }
        if self.lease_timeout.is_zero() {
            return Err(ClaimError::configuration(
                "lease_timeout must be greater than zero",
            ));
        }
        if let Some(process_timeout) = self.process_timeout {
            if process_timeout.is_zero() {
                return Err(ClaimError::configuration(
                    "process_timeout must be greater than zero when set",
                ));
            }
            if process_timeout >= self.lease_timeout {
                // Legal, but a deadline that outlives the lease means a slow
                // processor can lose its task to another claimant mid-call.
                warn!(
                    process_timeout_secs = process_timeout.as_secs(),
                    lease_timeout_secs = self.lease_timeout.as_secs(),
                    "process_timeout is not shorter than lease_timeout; slow work risks being reclaimed"
                );
            }
        }
        Ok(())
    }
}
