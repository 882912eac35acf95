#![allow(clippy::doc_markdown)] // Allow technical terms like PostgreSQL, SQLx in docs
#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Worklease
//!
//! Lease-based task claiming for fleets of independent workers sharing a
//! mutable store.
//!
//! ## Overview
//!
//! Worklease lets any number of worker processes pull units of work from a
//! shared store without double-processing, without a central lock manager,
//! and with automatic recovery from crashed workers. Mutual exclusion and
//! crash recovery are built entirely on the store's atomic conditional
//! read-modify-write operations; there are no distributed locks and no
//! coordinator.
//!
//! ## Architecture
//!
//! - **Claim Engine** ([`claim::ClaimEngine`]): the claim → process →
//!   complete cycle, in a batched variant and a single-item variant that
//!   share one state model.
//! - **Lease Policy** ([`claim::LeasePolicy`]): the pure eligibility
//!   predicate (pending, or processing with an expired lease) and the
//!   lease cutoff arithmetic. The single source of "safe to pick up" truth.
//! - **Atomic Store Adapter** ([`store::TaskStore`]): a capability
//!   interface of three primitives (plain read, conditional bulk update,
//!   atomic find-one-and-update) with in-memory and PostgreSQL
//!   implementations.
//!
//! Delivery is at-least-once: a claimant that crashes between claiming and
//! completing leaves its task in `processing` until the lease expires, at
//! which point any claimant may pick it up again.
//!
//! ## Module Organization
//!
//! - [`models`] - The task data model and status lifecycle
//! - [`store`] - Store capability trait plus in-memory and Postgres adapters
//! - [`claim`] - Lease policy, claim engine, and the processor boundary
//! - [`config`] - Claim cycle configuration
//! - [`error`] - Structured error handling
//! - [`logging`] - Tracing subscriber setup for binaries and tests
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use worklease::{
//!     ClaimEngine, InMemoryTaskStore, NewTask, ProcessingError, Task, TaskProcessor, TaskStore,
//! };
//!
//! struct PrintProcessor;
//!
//! #[async_trait::async_trait]
//! impl TaskProcessor for PrintProcessor {
//!     async fn process(&self, task: &Task) -> Result<(), ProcessingError> {
//!         println!("processing task {}", task.id);
//!         Ok(())
//!     }
//! }
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let store = Arc::new(InMemoryTaskStore::new());
//! store.insert(NewTask::new(serde_json::json!({ "order_id": 42 })));
//!
//! let engine = ClaimEngine::new(Arc::clone(&store) as Arc<dyn TaskStore>);
//! let completed = engine.run_bulk_cycle(&PrintProcessor).await?;
//! assert_eq!(completed, 1);
//! # Ok(())
//! # }
//! ```

pub mod claim;
pub mod config;
pub mod error;
pub mod logging;
pub mod models;
pub mod store;

pub use claim::{ClaimEngine, LeasePolicy, TaskProcessor};
pub use config::ClaimConfig;
pub use error::{ClaimError, ProcessingError, Result};
pub use models::{NewTask, Task, TaskStatus};
pub use store::{
    ClaimOrder, InMemoryTaskStore, PostgresTaskStore, StatusCounts, TaskChange, TaskFilter,
    TaskStore,
};
