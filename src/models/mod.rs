//! # Data Models
//!
//! The task data model shared by the claim engine and every store adapter.

pub mod task;

pub use task::{NewTask, ParseTaskStatusError, Task, TaskStatus};
