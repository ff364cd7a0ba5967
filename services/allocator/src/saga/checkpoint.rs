//! Extensibility checkpoint at `START_COMPUTE_ALLOCATION`.
//!
//! The subscriber sees the generated names and the display names of the
//! assigned hosts, and may answer with a new host order (and new names).
//! The answer is reconciled into a same-size revision and stored with the
//! checkpoint stage, which makes the store trim instead of union.

use std::collections::HashSet;

use tracing::{info, instrument};
use vmalloc_events::{
    CheckpointPayload, CheckpointResponse, Notification, COMPUTE_ALLOCATION_TOPIC_ID,
};

use crate::collaborators::Collaborators;
use crate::error::SagaError;
use crate::model::{AllocationTask, HostAssignment, SubStage};
use crate::store::TaskPatch;

/// Reorders `current` to follow `requested` host names.
///
/// Returns `Ok(None)` when there is nothing to change: no names requested,
/// or the requested order already matches. Position `k` of the result holds
/// the assignment named `requested[k]`; positions past the end of
/// `requested` keep their current assignment.
pub fn reorder_host_assignments(
    current: &[HostAssignment],
    requested: Option<&[String]>,
) -> Result<Option<Vec<HostAssignment>>, SagaError> {
    let Some(requested) = requested.filter(|names| !names.is_empty()) else {
        return Ok(None);
    };

    let unchanged = current.len() == requested.len()
        && current
            .iter()
            .zip(requested)
            .all(|(assignment, name)| assignment.name.as_deref() == Some(name.as_str()));
    if unchanged {
        return Ok(None);
    }

    if requested.len() > current.len() {
        return Err(SagaError::InvalidCheckpointResponse(format!(
            "{} host selections for {} assignments",
            requested.len(),
            current.len()
        )));
    }

    let mut reordered = current.to_vec();
    for (position, name) in requested.iter().enumerate() {
        let assignment = current
            .iter()
            .find(|assignment| assignment.name.as_deref() == Some(name.as_str()))
            .ok_or_else(|| SagaError::UnknownHostReference(name.clone()))?;
        reordered[position] = assignment.clone();
    }

    Ok(Some(reordered))
}

/// Validates replacement resource names from a checkpoint response.
///
/// Returns `Ok(None)` when no names were sent or they match the current ones.
pub fn replacement_names(
    current: &[String],
    expected: u32,
    requested: Option<&[String]>,
) -> Result<Option<Vec<String>>, SagaError> {
    let Some(requested) = requested.filter(|names| !names.is_empty()) else {
        return Ok(None);
    };
    if requested == current {
        return Ok(None);
    }

    if requested.len() != expected as usize {
        return Err(SagaError::InvalidCheckpointResponse(format!(
            "{} resource names for {expected} resources",
            requested.len()
        )));
    }
    let mut seen = HashSet::new();
    if let Some(duplicate) = requested.iter().find(|name| !seen.insert(name.as_str())) {
        return Err(SagaError::InvalidCheckpointResponse(format!(
            "duplicate resource name {duplicate}"
        )));
    }

    Ok(Some(requested.to_vec()))
}

fn reconcile(task: &AllocationTask, response: &CheckpointResponse) -> Result<TaskPatch, SagaError> {
    let mut patch = TaskPatch {
        stage: Some(SubStage::CHECKPOINT),
        checkpoint_completed: Some(true),
        ..Default::default()
    };

    if let Some(hosts) = reorder_host_assignments(&task.host_assignments, response.requested_hosts())? {
        info!(hosts = ?response.requested_hosts(), "Host assignments reordered by subscriber");
        patch.host_assignments = Some(hosts);
    }
    if let Some(names) = replacement_names(
        &task.resource_names,
        task.resource_count,
        response.requested_names(),
    )? {
        info!(names = ?names, "Resource names replaced by subscriber");
        patch.resource_names = Some(names);
    }

    Ok(patch)
}

#[instrument(skip_all, fields(task_id = %task.id))]
pub(super) async fn run_checkpoint(
    collaborators: &Collaborators,
    task: &AllocationTask,
) -> Result<TaskPatch, SagaError> {
    let channel = &collaborators.notifications;

    let notification = Notification::builder()
        .topic(COMPUTE_ALLOCATION_TOPIC_ID, channel.is_blocking())
        .task(task.id, SubStage::CHECKPOINT.as_str())
        .payload(CheckpointPayload {
            resource_names: task.resource_names.clone(),
            host_selections: task.host_selections(),
        })
        .build()?;

    let response = channel
        .publish(&notification)
        .await
        .map_err(SagaError::collaborator("failed to publish checkpoint notification"))?
        .unwrap_or_default();

    reconcile(task, &response)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::AllocationRequest;

    fn assignments(names: &[&str]) -> Vec<HostAssignment> {
        names
            .iter()
            .map(|name| {
                let mut assignment =
                    HostAssignment::new(format!("/resources/compute/{name}"), *name);
                assignment
                    .metadata
                    .insert("cluster".to_string(), format!("cl-{name}"));
                assignment
            })
            .collect()
    }

    fn names(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_empty_response_is_no_change() {
        let current = assignments(&["A", "B"]);
        assert_eq!(reorder_host_assignments(&current, None).unwrap(), None);
        assert_eq!(reorder_host_assignments(&current, Some(&[])).unwrap(), None);
    }

    #[test]
    fn test_same_order_is_no_change() {
        let current = assignments(&["A", "B"]);
        let requested = names(&["A", "B"]);
        assert_eq!(
            reorder_host_assignments(&current, Some(&requested)).unwrap(),
            None
        );
    }

    #[test]
    fn test_reorder_keeps_other_fields() {
        let current = assignments(&["A", "B"]);
        let requested = names(&["B", "A"]);
        let reordered = reorder_host_assignments(&current, Some(&requested))
            .unwrap()
            .unwrap();

        assert_eq!(reordered, vec![current[1].clone(), current[0].clone()]);
        assert_eq!(reordered[0].metadata["cluster"], "cl-B");
        assert_eq!(reordered[0].host_link, "/resources/compute/B");
    }

    #[test]
    fn test_unknown_host_rejected() {
        let current = assignments(&["A", "B"]);
        let requested = names(&["A", "C"]);
        let err = reorder_host_assignments(&current, Some(&requested)).unwrap_err();
        assert!(matches!(err, SagaError::UnknownHostReference(name) if name == "C"));
    }

    #[test]
    fn test_unnamed_fixed_placements_are_unknown() {
        let current = vec![HostAssignment::fixed("/resources/compute/pinned"); 2];
        let requested = names(&["pinned"]);
        assert!(matches!(
            reorder_host_assignments(&current, Some(&requested)),
            Err(SagaError::UnknownHostReference(_))
        ));
    }

    #[test]
    fn test_longer_response_rejected() {
        let current = assignments(&["A"]);
        let requested = names(&["A", "A"]);
        assert!(matches!(
            reorder_host_assignments(&current, Some(&requested)),
            Err(SagaError::InvalidCheckpointResponse(_))
        ));
    }

    #[test]
    fn test_replacement_names() {
        let current = names(&["web-1", "web-2"]);
        assert_eq!(replacement_names(&current, 2, None).unwrap(), None);
        assert_eq!(replacement_names(&current, 2, Some(&current)).unwrap(), None);

        let renamed = names(&["db-1", "db-2"]);
        assert_eq!(
            replacement_names(&current, 2, Some(&renamed)).unwrap(),
            Some(renamed)
        );

        let short = names(&["db-1"]);
        assert!(matches!(
            replacement_names(&current, 2, Some(&short)),
            Err(SagaError::InvalidCheckpointResponse(_))
        ));
    }

    #[test]
    fn test_reconcile_marks_checkpoint_done() {
        let mut task = AllocationTask::from_request(AllocationRequest {
            resource_description_link: "/d/web".to_string(),
            resource_count: 2,
            resource_pool_link: Some("/pools/p".to_string()),
            ..Default::default()
        })
        .unwrap();
        task.resource_names = names(&["web-1", "web-2"]);
        task.host_assignments = assignments(&["A", "B"]);

        let patch = reconcile(&task, &CheckpointResponse::default()).unwrap();
        assert_eq!(patch.checkpoint_completed, Some(true));
        assert_eq!(patch.stage, Some(SubStage::StartComputeAllocation));
        assert!(patch.host_assignments.is_none());

        let response = CheckpointResponse {
            host_selections: Some(names(&["B", "A"])),
            resource_names: None,
        };
        let patch = reconcile(&task, &response).unwrap();
        assert_eq!(
            patch.host_assignments.unwrap(),
            vec![task.host_assignments[1].clone(), task.host_assignments[0].clone()]
        );
    }
}
