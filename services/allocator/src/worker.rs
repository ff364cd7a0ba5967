//! Resume worker.
//!
//! Picks up tasks left in a non-terminal stage (after a restart, or after a
//! driver stopped on a store error) and drives them again.

use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, error, info, instrument};

use crate::saga::AllocationSaga;
use crate::store::StoreError;

/// Periodically resumes active tasks that no driver holds.
pub struct ResumeWorker {
    saga: AllocationSaga,
    interval: Duration,
}

impl ResumeWorker {
    pub fn new(saga: AllocationSaga, interval: Duration) -> Self {
        Self { saga, interval }
    }

    /// Run until shutdown is signaled.
    #[instrument(skip(self, shutdown))]
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(
            interval_secs = self.interval.as_secs(),
            "Starting resume worker"
        );

        let mut interval = tokio::time::interval(self.interval);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(e) = self.resume_pass().await {
                        error!(error = %e, "Resume pass failed");
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("Resume worker shutting down");
                        break;
                    }
                }
            }
        }
    }

    /// Spawns a driver for every active task not already in flight.
    ///
    /// Returns how many drivers were started.
    pub async fn resume_pass(&self) -> Result<usize, StoreError> {
        let active = self.saga.store().list_active().await?;

        let mut resumed = 0;
        for task in active {
            if self.saga.is_in_flight(task.id) {
                continue;
            }
            debug!(task_id = %task.id, stage = %task.stage, "Resuming allocation task");
            self.saga.spawn(task.id);
            resumed += 1;
        }

        if resumed > 0 {
            info!(resumed, "Resumed allocation tasks");
        }
        Ok(resumed)
    }
}
