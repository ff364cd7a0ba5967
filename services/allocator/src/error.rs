//! Error types for the allocation saga.

use thiserror::Error;
use vmalloc_events::EventError;
use vmalloc_id::TaskId;
use vmalloc_reconcile::{JoinError, SequenceError};

use crate::store::StoreError;

/// Bad input at submission. No task record is created.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("'resource_pool_link' and 'group_placement_link' cannot both be empty")]
    MissingPoolReference,

    #[error("'resource_description_link' is required")]
    MissingDescription,

    #[error("'resource_count' must be greater than 0, got {0}")]
    NonPositiveCount(i64),

    #[error("'resource_count' {0} is out of range")]
    CountTooLarge(i64),
}

/// A failed call to an external collaborator.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CollaboratorError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("request to {target} failed: {message}")]
    Transport { target: String, message: String },

    #[error("{target} returned {status}: {message}")]
    Status {
        target: String,
        status: u16,
        message: String,
    },

    #[error("failed to decode {target}: {message}")]
    Decode { target: String, message: String },

    /// The collaborator answered, but the answer is unusable.
    #[error("invalid response: {0}")]
    Invalid(String),

    #[error("{0}")]
    Rejected(String),
}

impl CollaboratorError {
    pub fn decode(target: impl Into<String>, err: impl std::fmt::Display) -> Self {
        Self::Decode {
            target: target.into(),
            message: err.to_string(),
        }
    }
}

/// Failures that end an allocation task in `ERROR`.
#[derive(Debug, Error)]
pub enum SagaError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("{context}: {source}")]
    Collaborator {
        context: String,
        #[source]
        source: CollaboratorError,
    },

    #[error("placement group {0} has no resource pool")]
    MissingResourcePool(String),

    #[error("no endpoint link resolvable from pool, template or request properties")]
    MissingEndpoint,

    #[error("task is missing '{0}'")]
    MissingField(&'static str),

    #[error("no available profiles for endpoint {endpoint_link} of type {endpoint_type}")]
    NoProfiles {
        endpoint_link: String,
        endpoint_type: String,
    },

    #[error("template enhancement failed for all {attempts} candidate profiles: {last_error}")]
    ProfilesExhausted { attempts: usize, last_error: String },

    #[error("not enough placements ({available}) for the requested resource count ({requested})")]
    InsufficientPlacement { available: usize, requested: u32 },

    #[error("unknown host: {0}")]
    UnknownHostReference(String),

    #[error("invalid checkpoint response: {0}")]
    InvalidCheckpointResponse(String),

    #[error("failed to sequence allocated resources: {0}")]
    Sequencing(#[from] SequenceError),

    #[error("expected {expected} newly allocated resources, found {actual}")]
    SequenceCount { expected: u32, actual: usize },

    #[error("resource creation did not report: {0}")]
    Abandoned(#[from] JoinError),

    #[error("failed to build notification: {0}")]
    Notification(#[from] EventError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("task {0} is already being driven")]
    AlreadyRunning(TaskId),
}

impl SagaError {
    /// Wraps a collaborator failure with what the saga was doing.
    ///
    /// ```ignore
    /// documents.fetch(link).await.map_err(SagaError::collaborator("fetch resource pool"))?;
    /// ```
    pub fn collaborator(context: impl Into<String>) -> impl FnOnce(CollaboratorError) -> Self {
        let context = context.into();
        move |source| Self::Collaborator { context, source }
    }

    /// Stable code stored with the task failure.
    pub fn code(&self) -> &'static str {
        match self {
            SagaError::Validation(_) => "validation_error",
            SagaError::Collaborator { .. } => "collaborator_error",
            SagaError::MissingResourcePool(_) => "missing_resource_pool",
            SagaError::MissingEndpoint => "missing_endpoint",
            SagaError::MissingField(_) => "invalid_task_state",
            SagaError::NoProfiles { .. } => "no_profiles",
            SagaError::ProfilesExhausted { .. } => "profiles_exhausted",
            SagaError::InsufficientPlacement { .. } => "insufficient_placement",
            SagaError::UnknownHostReference(_) => "unknown_host_reference",
            SagaError::InvalidCheckpointResponse(_) => "invalid_checkpoint_response",
            SagaError::Sequencing(_) | SagaError::SequenceCount { .. } => "sequencing_error",
            SagaError::Abandoned(_) => "resource_creation_abandoned",
            SagaError::Notification(_) => "notification_error",
            SagaError::Store(_) => "store_error",
            SagaError::AlreadyRunning(_) => "already_running",
        }
    }
}
