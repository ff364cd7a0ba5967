//! Postgres task store.
//!
//! The task document lives in a `jsonb` column. Patches run in a single
//! transaction holding a row lock, so concurrent patches to one task are
//! applied one after the other.

use async_trait::async_trait;
use sqlx::{postgres::PgPool, types::Json, Row};
use tracing::{debug, instrument};
use vmalloc_id::TaskId;

use super::{apply_patch, StoreError, TaskPatch, TaskStore};
use crate::model::AllocationTask;

/// Task store backed by the `allocation_tasks` table.
#[derive(Clone)]
pub struct PgTaskStore {
    pool: PgPool,
}

impl PgTaskStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn decode(row: &sqlx::postgres::PgRow) -> Result<AllocationTask, StoreError> {
    let Json(document) = row
        .try_get::<Json<serde_json::Value>, _>("document")
        .map_err(StoreError::Database)?;
    task_from_document(document)
}

/// Documents written by an older schema surface as `Serialization`, not as a
/// database failure.
fn task_from_document(document: serde_json::Value) -> Result<AllocationTask, StoreError> {
    Ok(serde_json::from_value(document)?)
}

#[async_trait]
impl TaskStore for PgTaskStore {
    #[instrument(skip(self, task), fields(task_id = %task.id))]
    async fn create(&self, task: &AllocationTask) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            INSERT INTO allocation_tasks (task_id, stage, version, document, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (task_id) DO NOTHING
            "#,
        )
        .bind(task.id.to_string())
        .bind(task.stage.as_str())
        .bind(task.version.value())
        .bind(Json(task))
        .bind(task.created_at)
        .bind(task.updated_at)
        .execute(&self.pool)
        .await
        .map_err(StoreError::Database)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::Conflict(task.id));
        }

        debug!("Task stored");
        Ok(())
    }

    async fn get(&self, id: TaskId) -> Result<AllocationTask, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT document
            FROM allocation_tasks
            WHERE task_id = $1
            "#,
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(StoreError::Database)?
        .ok_or(StoreError::NotFound(id))?;

        decode(&row)
    }

    #[instrument(skip(self, patch), fields(task_id = %id, stage = ?patch.stage))]
    async fn patch(&self, id: TaskId, patch: TaskPatch) -> Result<AllocationTask, StoreError> {
        let mut tx = self.pool.begin().await.map_err(StoreError::Database)?;

        let row = sqlx::query(
            r#"
            SELECT document
            FROM allocation_tasks
            WHERE task_id = $1
            FOR UPDATE
            "#,
        )
        .bind(id.to_string())
        .fetch_optional(&mut *tx)
        .await
        .map_err(StoreError::Database)?
        .ok_or(StoreError::NotFound(id))?;

        let mut task = decode(&row)?;
        apply_patch(&mut task, patch)?;

        sqlx::query(
            r#"
            UPDATE allocation_tasks
            SET stage = $2, version = $3, document = $4, updated_at = $5
            WHERE task_id = $1
            "#,
        )
        .bind(id.to_string())
        .bind(task.stage.as_str())
        .bind(task.version.value())
        .bind(Json(&task))
        .bind(task.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(StoreError::Database)?;

        tx.commit().await.map_err(StoreError::Database)?;

        debug!(version = %task.version, "Task patched");
        Ok(task)
    }

    async fn list_active(&self) -> Result<Vec<AllocationTask>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT document
            FROM allocation_tasks
            WHERE stage NOT IN ('COMPLETED', 'ERROR')
            ORDER BY created_at
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(StoreError::Database)?;

        rows.iter().map(decode).collect()
    }
}
