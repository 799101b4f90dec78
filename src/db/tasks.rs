//! Batch task tracking for the task runner.

use crate::error::DatabaseError;
use crate::store::TaskStore;
use crate::types::{BatchId, BatchTaskStatus, ProcessingResult, TaskId, TaskState};
use crate::{Error, Result};
use async_trait::async_trait;

use super::{Database, TaskRow};

const TASK_COLUMNS: &str = "id, batch_id, state, attempts, result, error, created_at, updated_at";

#[async_trait]
impl TaskStore for Database {
    async fn create_task(&self, batch_id: BatchId) -> Result<TaskId> {
        let now = chrono::Utc::now().timestamp();

        let result = sqlx::query(
            r#"
            INSERT INTO batch_tasks (batch_id, state, attempts, created_at, updated_at)
            VALUES (?, ?, 0, ?, ?)
            "#,
        )
        .bind(batch_id)
        .bind(TaskState::Pending.to_i32())
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to insert batch task: {}",
                e
            )))
        })?;

        Ok(TaskId(result.last_insert_rowid()))
    }

    async fn get_task(&self, id: TaskId) -> Result<Option<BatchTaskStatus>> {
        let row = sqlx::query_as::<_, TaskRow>(&format!(
            "SELECT {TASK_COLUMNS} FROM batch_tasks WHERE id = ?"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to get batch task: {}",
                e
            )))
        })?;

        row.map(TaskRow::into_status).transpose()
    }

    async fn find_active_task_for_batch(&self, batch_id: BatchId) -> Result<Option<TaskId>> {
        let id: Option<TaskId> = sqlx::query_scalar(
            r#"
            SELECT id FROM batch_tasks
            WHERE batch_id = ? AND state IN (?, ?)
            ORDER BY id ASC
            LIMIT 1
            "#,
        )
        .bind(batch_id)
        .bind(TaskState::Pending.to_i32())
        .bind(TaskState::Running.to_i32())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to find active batch task: {}",
                e
            )))
        })?;

        Ok(id)
    }

    async fn mark_task_running(&self, id: TaskId, attempt: u32) -> Result<()> {
        let now = chrono::Utc::now().timestamp();

        sqlx::query("UPDATE batch_tasks SET state = ?, attempts = ?, updated_at = ? WHERE id = ?")
            .bind(TaskState::Running.to_i32())
            .bind(i64::from(attempt))
            .bind(now)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to mark batch task running: {}",
                    e
                )))
            })?;

        Ok(())
    }

    async fn finish_task(
        &self,
        id: TaskId,
        state: TaskState,
        result: Option<&ProcessingResult>,
        error: Option<&str>,
    ) -> Result<()> {
        let now = chrono::Utc::now().timestamp();
        let result_json = result.map(serde_json::to_string).transpose()?;

        sqlx::query(
            "UPDATE batch_tasks SET state = ?, result = ?, error = ?, updated_at = ? WHERE id = ?",
        )
        .bind(state.to_i32())
        .bind(result_json)
        .bind(error)
        .bind(now)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to finish batch task: {}",
                e
            )))
        })?;

        Ok(())
    }

    async fn list_unfinished_tasks(&self) -> Result<Vec<BatchTaskStatus>> {
        let rows = sqlx::query_as::<_, TaskRow>(&format!(
            "SELECT {TASK_COLUMNS} FROM batch_tasks WHERE state IN (?, ?) ORDER BY id ASC"
        ))
        .bind(TaskState::Pending.to_i32())
        .bind(TaskState::Running.to_i32())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to list unfinished batch tasks: {}",
                e
            )))
        })?;

        rows.into_iter().map(TaskRow::into_status).collect()
    }
}
