//! Demo fleet: three workers racing overlapping bulk claim cycles over one
//! shared in-memory store, with jittered per-task processing latency.
//!
//! Run with `cargo run --bin claim_demo` (set `RUST_LOG=debug` to watch the
//! per-round claim traffic).

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use rand::Rng;
use tracing::info;

use worklease::{
    ClaimEngine, InMemoryTaskStore, NewTask, ProcessingError, Task, TaskProcessor, TaskStore,
};

const SEEDED_TASKS: i64 = 25;
const WORKERS: usize = 3;

/// Simulates variable business-processing latency.
struct JitteredProcessor;

#[async_trait]
impl TaskProcessor for JitteredProcessor {
    async fn process(&self, task: &Task) -> Result<(), ProcessingError> {
        let delay_ms: u64 = rand::thread_rng().gen_range(10..250);
        tokio::time::sleep(Duration::from_millis(delay_ms)).await;
        info!(task_id = task.id, delay_ms, "Processed task");
        Ok(())
    }

    fn name(&self) -> &'static str {
        "jittered_demo"
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    worklease::logging::init_logging();

    let store = Arc::new(InMemoryTaskStore::new());
    for seq in 0..SEEDED_TASKS {
        store.insert(NewTask::new(serde_json::json!({ "seq": seq })));
    }
    info!(seeded = SEEDED_TASKS, workers = WORKERS, "Starting fleet");

    let mut handles = Vec::with_capacity(WORKERS);
    for worker_id in 0..WORKERS {
        let engine = ClaimEngine::new(Arc::clone(&store) as Arc<dyn TaskStore>);
        handles.push(tokio::spawn(async move {
            let completed = engine.run_bulk_cycle(&JitteredProcessor).await?;
            info!(worker_id, completed, "Worker cycle finished");
            Ok::<u64, worklease::ClaimError>(completed)
        }));
    }

    let mut total = 0u64;
    for handle in handles {
        total += handle.await??;
    }

    let counts = store.counts_by_status();
    info!(
        total,
        done = counts.done,
        pending = counts.pending,
        processing = counts.processing,
        "Fleet drained the store"
    );
    Ok(())
}
