//! `COMPUTE_ALLOCATION_COMPLETED`: collect and order the created resources.

use tracing::{info, instrument};
use vmalloc_reconcile::{parse_ordinal, sequence, SequenceCandidate};

use crate::collaborators::{Collaborators, ResourceQuery};
use crate::error::SagaError;
use crate::model::{properties, AllocationTask, ComputeState, SubStage, KIND_COMPUTE};
use crate::store::TaskPatch;

fn candidate(compute: ComputeState) -> Option<SequenceCandidate> {
    let link = compute.self_link?;
    let ordinal = parse_ordinal(
        compute
            .custom_properties
            .get(properties::CLUSTER_INDEX)
            .map(String::as_str),
    );
    Some(SequenceCandidate::new(link, compute.name, ordinal))
}

#[instrument(skip_all, fields(task_id = %task.id, context_id = %task.context_id()))]
pub(super) async fn sequence_resources(
    collaborators: &Collaborators,
    task: &AllocationTask,
) -> Result<TaskPatch, SagaError> {
    let query = ResourceQuery::of_kind(KIND_COMPUTE)
        .field("description_link", task.resource_description_link.clone())
        .property(properties::CONTEXT_ID, task.context_id());

    let computes: Vec<ComputeState> = collaborators
        .documents
        .query_as(&query)
        .await
        .map_err(SagaError::collaborator("failed to query allocated compute resources"))?;

    let ordered = sequence(computes.into_iter().filter_map(candidate))?;
    if ordered.untagged != task.resource_count as usize {
        return Err(SagaError::SequenceCount {
            expected: task.resource_count,
            actual: ordered.untagged,
        });
    }

    info!(
        resources = ordered.links.len(),
        existing = ordered.tagged,
        "Allocated resources sequenced"
    );
    Ok(TaskPatch {
        stage: Some(SubStage::Completed),
        resource_links: Some(ordered.links),
        ..Default::default()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    use crate::model::{ComputeType, LifecycleState, PowerState};

    fn compute(link: Option<&str>, index: Option<&str>) -> ComputeState {
        let mut custom_properties = BTreeMap::new();
        if let Some(index) = index {
            custom_properties.insert(properties::CLUSTER_INDEX.to_string(), index.to_string());
        }
        ComputeState {
            self_link: link.map(str::to_string),
            id: "c".to_string(),
            name: "web".to_string(),
            compute_type: ComputeType::VmGuest,
            power_state: PowerState::On,
            lifecycle_state: LifecycleState::Provisioning,
            description_link: "/d/web".to_string(),
            parent_link: None,
            resource_pool_link: None,
            endpoint_link: None,
            disk_links: Vec::new(),
            network_interface_links: None,
            address: None,
            host_name: None,
            custom_properties,
            tenant_links: Vec::new(),
            tag_links: Vec::new(),
        }
    }

    #[test]
    fn test_candidate_reads_cluster_index() {
        let tagged = candidate(compute(Some("/c/1"), Some("3"))).unwrap();
        assert_eq!(tagged.ordinal, Some(3));

        let malformed = candidate(compute(Some("/c/2"), Some("-1"))).unwrap();
        assert_eq!(malformed.ordinal, None);
    }

    #[test]
    fn test_candidate_skips_unlinked() {
        assert!(candidate(compute(None, Some("0"))).is_none());
    }
}
