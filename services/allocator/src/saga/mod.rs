//! The allocation saga.
//!
//! A task advances through its stages one handler at a time:
//!
//! ```text
//! CREATED -> CONTEXT_PREPARED -> RESOURCES_NAMES -> SELECT_PLACEMENT_COMPUTES
//!   -> START_COMPUTE_ALLOCATION -> COMPUTE_ALLOCATION_COMPLETED -> COMPLETED
//! ```
//!
//! Each handler reads what it needs from the task and the collaborators and
//! returns a [`TaskPatch`]; the driver persists the patch before the next
//! handler runs. A handler error moves the task to `ERROR`. The extensibility
//! checkpoint runs once at `START_COMPUTE_ALLOCATION`, before provisioning.

mod checkpoint;
mod configure;
mod context;
mod finalize;
mod placement;
mod provision;

use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::task::JoinHandle;
use tracing::{error, info, instrument, warn};
use vmalloc_id::TaskId;

use crate::collaborators::Collaborators;
use crate::error::SagaError;
use crate::model::{AllocationRequest, AllocationTask, SubStage, TaskFailure};
use crate::store::{TaskPatch, TaskStore};

pub use checkpoint::{reorder_host_assignments, replacement_names};
pub use context::rank_profiles;

type InFlight = Arc<Mutex<HashSet<TaskId>>>;

/// Marks a task as driven for as long as it is held.
struct DriveClaim {
    id: TaskId,
    in_flight: InFlight,
}

impl Drop for DriveClaim {
    fn drop(&mut self) {
        self.in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.id);
    }
}

/// Runs allocation tasks against a task store and a set of collaborators.
#[derive(Clone)]
pub struct AllocationSaga {
    store: Arc<dyn TaskStore>,
    collaborators: Collaborators,
    in_flight: InFlight,
}

impl AllocationSaga {
    pub fn new(store: Arc<dyn TaskStore>, collaborators: Collaborators) -> Self {
        Self {
            store,
            collaborators,
            in_flight: Arc::default(),
        }
    }

    pub fn store(&self) -> &Arc<dyn TaskStore> {
        &self.store
    }

    /// Validates and persists a new task in `CREATED`.
    ///
    /// Invalid requests are rejected without storing anything.
    #[instrument(skip(self, request), fields(description = %request.resource_description_link))]
    pub async fn submit(&self, request: AllocationRequest) -> Result<AllocationTask, SagaError> {
        let task = AllocationTask::from_request(request)?;
        self.store.create(&task).await?;
        info!(
            task_id = %task.id,
            resource_count = task.resource_count,
            "Allocation task accepted"
        );
        Ok(task)
    }

    /// Whether a driver currently holds `id`.
    pub fn is_in_flight(&self, id: TaskId) -> bool {
        self.in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(&id)
    }

    fn claim(&self, id: TaskId) -> Result<DriveClaim, SagaError> {
        let mut in_flight = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
        if !in_flight.insert(id) {
            return Err(SagaError::AlreadyRunning(id));
        }
        Ok(DriveClaim {
            id,
            in_flight: Arc::clone(&self.in_flight),
        })
    }

    /// Drives `id` in the background.
    pub fn spawn(&self, id: TaskId) -> JoinHandle<Result<AllocationTask, SagaError>> {
        let saga = self.clone();
        tokio::spawn(async move { saga.drive(id).await })
    }

    /// Runs stage handlers until the task is terminal and returns it.
    ///
    /// Store failures stop the driver and leave the task in its current
    /// stage so it can be resumed.
    #[instrument(skip(self), fields(task_id = %id))]
    pub async fn drive(&self, id: TaskId) -> Result<AllocationTask, SagaError> {
        let _claim = self.claim(id)?;
        let mut task = self.store.get(id).await?;

        while !task.stage.is_terminal() {
            let from = task.stage;
            task = match self.advance(&task).await {
                Ok(patch) => self.store.patch(id, patch).await?,
                Err(error) => self.fail(&task, error).await?,
            };

            if task.stage != from {
                info!(from = %from, to = %task.stage, "Stage transition");
            }
            if task.stage.is_terminal() {
                self.report_outcome(&task).await;
            }
        }

        Ok(task)
    }

    /// Runs the handler for the task's current stage.
    async fn advance(&self, task: &AllocationTask) -> Result<TaskPatch, SagaError> {
        let collaborators = &self.collaborators;
        match task.stage {
            SubStage::Created => context::prepare_context(collaborators, task).await,
            SubStage::ContextPrepared => configure::configure_template(collaborators, task).await,
            SubStage::ResourcesNames => placement::request_names(collaborators, task).await,
            SubStage::SelectPlacementComputes => {
                placement::select_placement(collaborators, task).await
            }
            SubStage::StartComputeAllocation if !task.checkpoint_completed => {
                checkpoint::run_checkpoint(collaborators, task).await
            }
            SubStage::StartComputeAllocation => provision::allocate(collaborators, task).await,
            SubStage::ComputeAllocationCompleted => {
                finalize::sequence_resources(collaborators, task).await
            }
            // The driver never advances a terminal task.
            SubStage::Completed | SubStage::Error => Ok(TaskPatch::default()),
        }
    }

    async fn fail(
        &self,
        task: &AllocationTask,
        error: SagaError,
    ) -> Result<AllocationTask, SagaError> {
        error!(
            stage = %task.stage,
            code = error.code(),
            error = %error,
            "Allocation task failed"
        );

        let patch = TaskPatch {
            stage: Some(SubStage::Error),
            failure: Some(TaskFailure {
                code: error.code().to_string(),
                message: error.to_string(),
                stage: task.stage,
            }),
            ..Default::default()
        };
        Ok(self.store.patch(task.id, patch).await?)
    }

    async fn report_outcome(&self, task: &AllocationTask) {
        let (Some(target), Some(outcome)) = (&task.callback, task.outcome()) else {
            return;
        };
        if let Err(e) = self.collaborators.callbacks.deliver(target, &outcome).await {
            warn!(callback = %target.link, error = %e, "Failed to deliver task outcome");
        }
    }
}
