//! Durable task store.
//!
//! Tasks are mutated only through [`TaskPatch`]es. Each field of a patch has
//! a fixed merge policy:
//!
//! - scalar fields replace the current value when present
//! - `custom_properties` merge by key, incoming wins
//! - `resource_names`, `host_assignments` and `resource_links` are accretive
//!   (ordered union)
//!
//! A patch whose stage is the checkpoint stage folds `resource_names` and
//! `host_assignments` with [`MergePolicy::Trimmed`] instead, so a same-size
//! revision replaces the collection rather than growing it.

mod error;
mod memory;
mod postgres;

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::Utc;
use vmalloc_id::TaskId;
use vmalloc_reconcile::{merge_collection, MergePolicy};

use crate::model::{AllocationTask, HostAssignment, SubStage, TaskFailure};

pub use error::StoreError;
pub use memory::MemoryTaskStore;
pub use postgres::PgTaskStore;

/// Persistence for allocation tasks.
#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Stores a new task.
    async fn create(&self, task: &AllocationTask) -> Result<(), StoreError>;

    async fn get(&self, id: TaskId) -> Result<AllocationTask, StoreError>;

    /// Applies `patch` atomically and returns the updated task.
    ///
    /// The update is visible to every read that starts after this returns.
    async fn patch(&self, id: TaskId, patch: TaskPatch) -> Result<AllocationTask, StoreError>;

    /// Tasks not yet in a terminal stage, oldest first.
    async fn list_active(&self) -> Result<Vec<AllocationTask>, StoreError>;
}

/// A partial update of an [`AllocationTask`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskPatch {
    pub stage: Option<SubStage>,
    pub resource_pool_link: Option<String>,
    pub endpoint_link: Option<String>,
    pub endpoint_compute_link: Option<String>,
    pub endpoint_type: Option<String>,
    pub profile_links: Option<Vec<String>>,
    pub custom_properties: Option<BTreeMap<String, String>>,
    pub resource_names: Option<Vec<String>>,
    pub host_assignments: Option<Vec<HostAssignment>>,
    pub resource_links: Option<Vec<String>>,
    pub checkpoint_completed: Option<bool>,
    pub failure: Option<TaskFailure>,
}

impl TaskPatch {
    /// A patch that only moves the task to `stage`.
    pub fn to_stage(stage: SubStage) -> Self {
        Self {
            stage: Some(stage),
            ..Default::default()
        }
    }

    /// Policy for the collection fields touched by the checkpoint.
    fn checkpoint_policy(&self) -> MergePolicy {
        if self.stage == Some(SubStage::CHECKPOINT) {
            MergePolicy::Trimmed
        } else {
            MergePolicy::Accretive
        }
    }
}

/// Applies `patch` to `task` in place and bumps its version.
///
/// Shared by every store so the merge rules cannot drift between them.
pub fn apply_patch(task: &mut AllocationTask, patch: TaskPatch) -> Result<(), StoreError> {
    if task.stage.is_terminal() {
        return Err(StoreError::Terminal {
            id: task.id,
            stage: task.stage,
        });
    }

    let collection_policy = patch.checkpoint_policy();

    if let Some(stage) = patch.stage {
        task.stage = stage;
    }
    if let Some(link) = patch.resource_pool_link {
        task.resource_pool_link = Some(link);
    }
    if let Some(link) = patch.endpoint_link {
        task.endpoint_link = Some(link);
    }
    if let Some(link) = patch.endpoint_compute_link {
        task.endpoint_compute_link = Some(link);
    }
    if let Some(endpoint_type) = patch.endpoint_type {
        task.endpoint_type = Some(endpoint_type);
    }
    merge_collection(
        &mut task.profile_links,
        patch.profile_links.as_deref(),
        MergePolicy::Replace,
    );
    if let Some(properties) = patch.custom_properties {
        task.custom_properties.extend(properties);
    }
    merge_collection(
        &mut task.resource_names,
        patch.resource_names.as_deref(),
        collection_policy,
    );
    merge_collection(
        &mut task.host_assignments,
        patch.host_assignments.as_deref(),
        collection_policy,
    );
    merge_collection(
        &mut task.resource_links,
        patch.resource_links.as_deref(),
        MergePolicy::Accretive,
    );
    if let Some(done) = patch.checkpoint_completed {
        task.checkpoint_completed = done;
    }
    if let Some(failure) = patch.failure {
        task.failure = Some(failure);
    }

    task.version = task.version.next();
    task.updated_at = Utc::now();
    Ok(())
}
