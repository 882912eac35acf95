//! # Postgres Store
//!
//! ## Architecture: Conditional Writes over `worklease_tasks`
//!
//! [`PostgresTaskStore`] maps the three [`TaskStore`] primitives onto plain
//! SQL with runtime-bound parameters:
//!
//! - `find_eligible` → `SELECT ... WHERE <filter> ORDER BY id ... LIMIT n`
//! - `conditional_update` → `UPDATE ... SET <change> WHERE <filter>`, with
//!   the row count taken from the command tag
//! - `find_one_and_update` → an `UPDATE ... RETURNING` over a
//!   `FOR UPDATE SKIP LOCKED` subselect, so selection and mutation are one
//!   indivisible step and concurrent claimants skip rather than block
//!
//! Filters and changes are compiled from the same typed vocabulary the rest
//! of the crate uses; there is no hand-written SQL at call sites.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, QueryBuilder};
use tracing::debug;

use crate::error::{ClaimError, Result};
use crate::models::{NewTask, Task, TaskStatus};
use crate::store::{ClaimOrder, TaskChange, TaskFilter, TaskStore};

const TASKS_TABLE: &str = "worklease_tasks";

const CREATE_TASKS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS worklease_tasks (
    id BIGSERIAL PRIMARY KEY,
    status TEXT NOT NULL DEFAULT 'pending',
    locked_at TIMESTAMPTZ,
    payload JSONB NOT NULL DEFAULT '{}'::jsonb,
    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
);

CREATE INDEX IF NOT EXISTS worklease_tasks_status_id_idx
    ON worklease_tasks (status, id);
"#;

/// Internal struct for SQL query results; status arrives as text and is
/// parsed on the way out.
#[derive(sqlx::FromRow)]
struct TaskRow {
    id: i64,
    status: String,
    locked_at: Option<DateTime<Utc>>,
    payload: serde_json::Value,
    created_at: DateTime<Utc>,
}

impl TryFrom<TaskRow> for Task {
    type Error = ClaimError;

    fn try_from(row: TaskRow) -> Result<Task> {
        let status: TaskStatus = row
            .status
            .parse()
            .map_err(|e: crate::models::ParseTaskStatusError| {
                ClaimError::store("decode_row", e.to_string())
            })?;
        Ok(Task {
            id: row.id,
            status,
            locked_at: row.locked_at,
            payload: row.payload,
            created_at: row.created_at,
        })
    }
}

/// Postgres-backed store implementation.
pub struct PostgresTaskStore {
    pool: PgPool,
}

impl PostgresTaskStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create the tasks table and its claim index if they do not exist.
    /// Idempotent; safe to run from several processes.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::raw_sql(CREATE_TASKS_TABLE)
            .execute(&self.pool)
            .await
            .map_err(|e| ClaimError::store("migrate", e.to_string()))?;
        debug!(table = TASKS_TABLE, "Schema ensured");
        Ok(())
    }

    /// Insert a new pending task, returning its assigned id.
    pub async fn create_task(&self, new_task: &NewTask) -> Result<i64> {
        let row: (i64,) = sqlx::query_as(
            "INSERT INTO worklease_tasks (payload) VALUES ($1) RETURNING id",
        )
        .bind(&new_task.payload)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| ClaimError::store("create_task", e.to_string()))?;
        Ok(row.0)
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn order_sql(order: ClaimOrder) -> &'static str {
    match order {
        ClaimOrder::OldestFirst => " ORDER BY id ASC",
        ClaimOrder::NewestFirst => " ORDER BY id DESC",
    }
}

/// Push the eligibility predicate: pending, or processing with an absent or
/// expired lease. The strict `<` matches the policy predicate exactly.
fn push_claimable(builder: &mut QueryBuilder<'_, Postgres>, stale_before: DateTime<Utc>) {
    builder
        .push("(status = ")
        .push_bind(TaskStatus::Pending.as_str())
        .push(" OR (status = ")
        .push_bind(TaskStatus::Processing.as_str())
        .push(" AND (locked_at IS NULL OR locked_at < ")
        .push_bind(stale_before)
        .push(")))");
}

fn push_filter(builder: &mut QueryBuilder<'_, Postgres>, filter: &TaskFilter) {
    match filter {
        TaskFilter::Pending => {
            builder
                .push("status = ")
                .push_bind(TaskStatus::Pending.as_str());
        }
        TaskFilter::Claimable { stale_before } => push_claimable(builder, *stale_before),
        TaskFilter::ClaimableIn { ids, stale_before } => {
            builder
                .push("id = ANY(")
                .push_bind(ids.clone())
                .push(") AND ");
            push_claimable(builder, *stale_before);
        }
        TaskFilter::ProcessingIn { ids } => {
            builder
                .push("status = ")
                .push_bind(TaskStatus::Processing.as_str())
                .push(" AND id = ANY(")
                .push_bind(ids.clone())
                .push(")");
        }
    }
}

fn push_change(builder: &mut QueryBuilder<'_, Postgres>, change: TaskChange) {
    match change {
        TaskChange::Claim { locked_at } => {
            builder
                .push("status = ")
                .push_bind(TaskStatus::Processing.as_str())
                .push(", locked_at = ")
                .push_bind(locked_at);
        }
        TaskChange::Complete => {
            builder
                .push("status = ")
                .push_bind(TaskStatus::Done.as_str())
                .push(", locked_at = NULL");
        }
    }
}

#[async_trait]
impl TaskStore for PostgresTaskStore {
    async fn find_eligible(
        &self,
        filter: &TaskFilter,
        order: ClaimOrder,
        limit: Option<usize>,
    ) -> Result<Vec<Task>> {
        let mut builder = QueryBuilder::<Postgres>::new(
            "SELECT id, status, locked_at, payload, created_at FROM worklease_tasks WHERE ",
        );
        push_filter(&mut builder, filter);
        builder.push(order_sql(order));
        if let Some(limit) = limit {
            builder.push(" LIMIT ").push_bind(limit as i64);
        }

        let rows: Vec<TaskRow> = builder
            .build_query_as()
            .fetch_all(&self.pool)
            .await
            .map_err(|e| ClaimError::store("find_eligible", e.to_string()))?;

        rows.into_iter().map(Task::try_from).collect()
    }

    async fn conditional_update(&self, filter: &TaskFilter, change: TaskChange) -> Result<u64> {
        let mut builder = QueryBuilder::<Postgres>::new("UPDATE worklease_tasks SET ");
        push_change(&mut builder, change);
        builder.push(" WHERE ");
        push_filter(&mut builder, filter);

        let result = builder
            .build()
            .execute(&self.pool)
            .await
            .map_err(|e| ClaimError::store("conditional_update", e.to_string()))?;

        Ok(result.rows_affected())
    }

    async fn find_one_and_update(
        &self,
        filter: &TaskFilter,
        change: TaskChange,
        order: ClaimOrder,
    ) -> Result<Option<Task>> {
        // SKIP LOCKED keeps concurrent claimants from serializing on the
        // same head-of-line row; whoever holds the row lock wins it, everyone
        // else moves on to the next match.
        let mut builder = QueryBuilder::<Postgres>::new("UPDATE worklease_tasks SET ");
        push_change(&mut builder, change);
        builder.push(" WHERE id = (SELECT id FROM worklease_tasks WHERE ");
        push_filter(&mut builder, filter);
        builder
            .push(order_sql(order))
            .push(" LIMIT 1 FOR UPDATE SKIP LOCKED)")
            .push(" RETURNING id, status, locked_at, payload, created_at");

        let row: Option<TaskRow> = builder
            .build_query_as()
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| ClaimError::store("find_one_and_update", e.to_string()))?;

        row.map(Task::try_from).transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn claimable_filter_compiles_to_lease_predicate() {
        let mut builder = QueryBuilder::<Postgres>::new("");
        push_filter(
            &mut builder,
            &TaskFilter::Claimable {
                stale_before: Utc::now() - Duration::seconds(300),
            },
        );
        let sql = builder.sql();
        assert!(sql.contains("status = $1 OR (status = $2"));
        assert!(sql.contains("locked_at IS NULL OR locked_at < $3"));
    }

    #[test]
    fn claimable_in_filter_binds_id_array_first() {
        let mut builder = QueryBuilder::<Postgres>::new("");
        push_filter(
            &mut builder,
            &TaskFilter::ClaimableIn {
                ids: vec![1, 2, 3],
                stale_before: Utc::now(),
            },
        );
        assert!(builder.sql().starts_with("id = ANY($1) AND (status = $2"));
    }

    #[test]
    fn complete_change_clears_lock_inline() {
        let mut builder = QueryBuilder::<Postgres>::new("UPDATE worklease_tasks SET ");
        push_change(&mut builder, TaskChange::Complete);
        assert!(builder.sql().ends_with("status = $1, locked_at = NULL"));
    }

    #[test]
    fn single_claim_uses_skip_locked_subselect() {
        let mut builder = QueryBuilder::<Postgres>::new("UPDATE worklease_tasks SET ");
        push_change(&mut builder, TaskChange::Claim { locked_at: Utc::now() });
        builder.push(" WHERE id = (SELECT id FROM worklease_tasks WHERE ");
        push_filter(
            &mut builder,
            &TaskFilter::Claimable {
                stale_before: Utc::now(),
            },
        );
        builder.push(" ORDER BY id ASC LIMIT 1 FOR UPDATE SKIP LOCKED)");
        assert!(builder.sql().contains("FOR UPDATE SKIP LOCKED"));
    }
}
