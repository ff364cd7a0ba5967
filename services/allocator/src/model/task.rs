//! The allocation task record.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use vmalloc_id::{TaskId, TaskVersion};

use super::properties;
use crate::error::ValidationError;

/// Stage of an allocation task.
///
/// Stages advance strictly in declaration order; `Error` is reachable from
/// every non-terminal stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SubStage {
    Created,
    ContextPrepared,
    ResourcesNames,
    SelectPlacementComputes,
    StartComputeAllocation,
    ComputeAllocationCompleted,
    Completed,
    Error,
}

impl SubStage {
    /// Stage at which the extensibility checkpoint runs.
    pub const CHECKPOINT: SubStage = SubStage::StartComputeAllocation;

    pub fn as_str(&self) -> &'static str {
        match self {
            SubStage::Created => "CREATED",
            SubStage::ContextPrepared => "CONTEXT_PREPARED",
            SubStage::ResourcesNames => "RESOURCES_NAMES",
            SubStage::SelectPlacementComputes => "SELECT_PLACEMENT_COMPUTES",
            SubStage::StartComputeAllocation => "START_COMPUTE_ALLOCATION",
            SubStage::ComputeAllocationCompleted => "COMPUTE_ALLOCATION_COMPLETED",
            SubStage::Completed => "COMPLETED",
            SubStage::Error => "ERROR",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, SubStage::Completed | SubStage::Error)
    }
}

impl fmt::Display for SubStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where one logical resource unit will be placed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostAssignment {
    pub host_link: String,

    /// Display name of the host. Fixed placements have none.
    #[serde(default)]
    pub name: Option<String>,

    /// Other placement metadata, carried through untouched.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, String>,
}

impl HostAssignment {
    pub fn new(host_link: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            host_link: host_link.into(),
            name: Some(name.into()),
            metadata: BTreeMap::new(),
        }
    }

    /// An assignment to a fixed placement target.
    pub fn fixed(host_link: impl Into<String>) -> Self {
        Self {
            host_link: host_link.into(),
            name: None,
            metadata: BTreeMap::new(),
        }
    }
}

/// Where the terminal outcome of a task is delivered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallbackTarget {
    /// Absolute URL, or a path relative to the resource API.
    pub link: String,
}

/// Terminal outcome reported to the caller's callback.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum CallbackOutcome {
    Completed {
        task_id: TaskId,
        resource_links: Vec<String>,
    },
    Failed {
        task_id: TaskId,
        code: String,
        message: String,
    },
}

/// First failure recorded on a task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskFailure {
    /// Stable machine-readable code.
    pub code: String,
    pub message: String,
    /// Stage the task was in when it failed.
    pub stage: SubStage,
}

/// A request to allocate compute resources.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AllocationRequest {
    pub resource_description_link: String,
    pub resource_count: i64,
    #[serde(default)]
    pub resource_pool_link: Option<String>,
    #[serde(default)]
    pub group_placement_link: Option<String>,
    #[serde(default)]
    pub custom_properties: BTreeMap<String, String>,
    #[serde(default)]
    pub tenant_links: Vec<String>,
    #[serde(default)]
    pub callback: Option<CallbackTarget>,
}

impl AllocationRequest {
    /// Entry validation, run before any task record exists.
    pub fn validate(&self) -> Result<u32, ValidationError> {
        if self.resource_pool_link.is_none() && self.group_placement_link.is_none() {
            return Err(ValidationError::MissingPoolReference);
        }
        if self.resource_description_link.trim().is_empty() {
            return Err(ValidationError::MissingDescription);
        }
        if self.resource_count < 1 {
            return Err(ValidationError::NonPositiveCount(self.resource_count));
        }
        u32::try_from(self.resource_count)
            .map_err(|_| ValidationError::CountTooLarge(self.resource_count))
    }
}

/// The persistent record of one allocation saga.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AllocationTask {
    pub id: TaskId,
    pub version: TaskVersion,
    pub stage: SubStage,

    // Inputs
    pub resource_description_link: String,
    pub resource_count: u32,
    /// Requested pool, or the pool resolved from the placement group.
    #[serde(default)]
    pub resource_pool_link: Option<String>,
    #[serde(default)]
    pub group_placement_link: Option<String>,
    #[serde(default)]
    pub custom_properties: BTreeMap<String, String>,
    #[serde(default)]
    pub tenant_links: Vec<String>,
    #[serde(default)]
    pub callback: Option<CallbackTarget>,

    // Service fields
    #[serde(default)]
    pub endpoint_link: Option<String>,
    #[serde(default)]
    pub endpoint_compute_link: Option<String>,
    #[serde(default)]
    pub endpoint_type: Option<String>,
    #[serde(default)]
    pub profile_links: Vec<String>,
    #[serde(default)]
    pub resource_names: Vec<String>,
    #[serde(default)]
    pub host_assignments: Vec<HostAssignment>,
    #[serde(default)]
    pub resource_links: Vec<String>,
    #[serde(default)]
    pub checkpoint_completed: bool,
    #[serde(default)]
    pub failure: Option<TaskFailure>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AllocationTask {
    /// Validates `request` and builds a fresh task in `CREATED`.
    pub fn from_request(request: AllocationRequest) -> Result<Self, ValidationError> {
        let resource_count = request.validate()?;
        let now = Utc::now();

        Ok(Self {
            id: TaskId::new(),
            version: TaskVersion::INITIAL,
            stage: SubStage::Created,
            resource_description_link: request.resource_description_link,
            resource_count,
            resource_pool_link: request.resource_pool_link,
            group_placement_link: request.group_placement_link,
            custom_properties: request.custom_properties,
            tenant_links: request.tenant_links,
            callback: request.callback,
            endpoint_link: None,
            endpoint_compute_link: None,
            endpoint_type: None,
            profile_links: Vec::new(),
            resource_names: Vec::new(),
            host_assignments: Vec::new(),
            resource_links: Vec::new(),
            checkpoint_completed: false,
            failure: None,
            created_at: now,
            updated_at: now,
        })
    }

    /// Context id of this deployment; the task id until one is stamped.
    pub fn context_id(&self) -> String {
        self.custom_properties
            .get(properties::CONTEXT_ID)
            .cloned()
            .unwrap_or_else(|| self.id.to_string())
    }

    pub fn property(&self, key: &str) -> Option<&str> {
        self.custom_properties.get(key).map(String::as_str)
    }

    /// Display names of the current host assignments, in order.
    pub fn host_selections(&self) -> Vec<Option<String>> {
        self.host_assignments
            .iter()
            .map(|assignment| assignment.name.clone())
            .collect()
    }

    pub fn outcome(&self) -> Option<CallbackOutcome> {
        match self.stage {
            SubStage::Completed => Some(CallbackOutcome::Completed {
                task_id: self.id,
                resource_links: self.resource_links.clone(),
            }),
            SubStage::Error => {
                let (code, message) = match &self.failure {
                    Some(failure) => (failure.code.clone(), failure.message.clone()),
                    None => ("unknown".to_string(), "task failed".to_string()),
                };
                Some(CallbackOutcome::Failed {
                    task_id: self.id,
                    code,
                    message,
                })
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn request() -> AllocationRequest {
        AllocationRequest {
            resource_description_link: "/resources/compute-descriptions/web".to_string(),
            resource_count: 2,
            resource_pool_link: Some("/resources/pools/default".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_from_request_starts_created() {
        let task = AllocationTask::from_request(request()).unwrap();
        assert_eq!(task.stage, SubStage::Created);
        assert_eq!(task.resource_count, 2);
        assert_eq!(task.version, TaskVersion::INITIAL);
        assert!(task.resource_links.is_empty());
    }

    #[rstest]
    #[case(0)]
    #[case(-3)]
    fn test_rejects_non_positive_count(#[case] count: i64) {
        let err = AllocationTask::from_request(AllocationRequest {
            resource_count: count,
            ..request()
        })
        .unwrap_err();
        assert_eq!(err, ValidationError::NonPositiveCount(count));
    }

    #[test]
    fn test_rejects_missing_pool_and_group() {
        let err = AllocationTask::from_request(AllocationRequest {
            resource_pool_link: None,
            group_placement_link: None,
            ..request()
        })
        .unwrap_err();
        assert_eq!(err, ValidationError::MissingPoolReference);
    }

    #[test]
    fn test_group_alone_is_enough() {
        let task = AllocationTask::from_request(AllocationRequest {
            resource_pool_link: None,
            group_placement_link: Some("/resources/group-placements/g1".to_string()),
            ..request()
        })
        .unwrap();
        assert!(task.resource_pool_link.is_none());
    }

    #[test]
    fn test_context_id_defaults_to_task_id() {
        let mut task = AllocationTask::from_request(request()).unwrap();
        assert_eq!(task.context_id(), task.id.to_string());

        task.custom_properties
            .insert(properties::CONTEXT_ID.to_string(), "ctx-1".to_string());
        assert_eq!(task.context_id(), "ctx-1");
    }

    #[test]
    fn test_stage_wire_names() {
        let json = serde_json::to_string(&SubStage::StartComputeAllocation).unwrap();
        assert_eq!(json, "\"START_COMPUTE_ALLOCATION\"");
        assert_eq!(SubStage::ComputeAllocationCompleted.to_string(), "COMPUTE_ALLOCATION_COMPLETED");
        assert!(SubStage::Error.is_terminal());
        assert!(!SubStage::CHECKPOINT.is_terminal());
    }

    #[test]
    fn test_failed_outcome_carries_code() {
        let mut task = AllocationTask::from_request(request()).unwrap();
        assert!(task.outcome().is_none());

        task.stage = SubStage::Error;
        task.failure = Some(TaskFailure {
            code: "insufficient_placement".to_string(),
            message: "1 placements for 2 resources".to_string(),
            stage: SubStage::StartComputeAllocation,
        });
        match task.outcome() {
            Some(CallbackOutcome::Failed { code, .. }) => assert_eq!(code, "insufficient_placement"),
            other => panic!("unexpected outcome: {other:?}"),
        }
    }
}
