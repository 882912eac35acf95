//! # Claiming Core
//!
//! The claim engine and its decision logic:
//!
//! - [`LeasePolicy`]: pure eligibility predicate and lease cutoffs
//! - [`ClaimEngine`]: the bulk and single-item claim/process/complete
//!   cycles
//! - [`TaskProcessor`]: the injected business-processing boundary

pub mod engine;
pub mod lease_policy;
pub mod types;

pub use engine::ClaimEngine;
pub use lease_policy::LeasePolicy;
pub use types::TaskProcessor;
