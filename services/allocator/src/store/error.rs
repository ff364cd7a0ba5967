//! Task store error types.

use thiserror::Error;
use vmalloc_id::TaskId;

use crate::model::SubStage;

/// Task store operation errors.
#[derive(Debug, Error)]
pub enum StoreError {
    /// No task with this id.
    #[error("task not found: {0}")]
    NotFound(TaskId),

    /// A task with this id already exists.
    #[error("task already exists: {0}")]
    Conflict(TaskId),

    /// The task reached a terminal stage and no longer accepts updates.
    #[error("task {id} is {stage} and cannot be updated")]
    Terminal { id: TaskId, stage: SubStage },

    /// Failed to execute a query.
    #[error("query failed: {0}")]
    Database(#[source] sqlx::Error),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
