//! In-process task store.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::{debug, instrument};
use vmalloc_id::TaskId;

use super::{apply_patch, StoreError, TaskPatch, TaskStore};
use crate::model::AllocationTask;

/// Task store backed by a map. Patches are serialized by the write lock.
#[derive(Debug, Default)]
pub struct MemoryTaskStore {
    tasks: RwLock<HashMap<TaskId, AllocationTask>>,
}

impl MemoryTaskStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TaskStore for MemoryTaskStore {
    #[instrument(skip(self, task), fields(task_id = %task.id))]
    async fn create(&self, task: &AllocationTask) -> Result<(), StoreError> {
        let mut tasks = self.tasks.write().await;
        if tasks.contains_key(&task.id) {
            return Err(StoreError::Conflict(task.id));
        }
        tasks.insert(task.id, task.clone());
        debug!("Task stored");
        Ok(())
    }

    async fn get(&self, id: TaskId) -> Result<AllocationTask, StoreError> {
        self.tasks
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or(StoreError::NotFound(id))
    }

    #[instrument(skip(self, patch), fields(task_id = %id, stage = ?patch.stage))]
    async fn patch(&self, id: TaskId, patch: TaskPatch) -> Result<AllocationTask, StoreError> {
        let mut tasks = self.tasks.write().await;
        let task = tasks.get_mut(&id).ok_or(StoreError::NotFound(id))?;

        // Apply to a copy so a rejected patch leaves the stored task intact.
        let mut updated = task.clone();
        apply_patch(&mut updated, patch)?;
        *task = updated.clone();

        debug!(version = %updated.version, "Task patched");
        Ok(updated)
    }

    async fn list_active(&self) -> Result<Vec<AllocationTask>, StoreError> {
        let mut active: Vec<AllocationTask> = self
            .tasks
            .read()
            .await
            .values()
            .filter(|task| !task.stage.is_terminal())
            .cloned()
            .collect();
        active.sort_by_key(|task| task.created_at);
        Ok(active)
    }
}
