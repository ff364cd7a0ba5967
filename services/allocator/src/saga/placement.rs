//! `RESOURCES_NAMES` and `SELECT_PLACEMENT_COMPUTES`.

use std::collections::HashSet;

use tracing::{info, instrument};

use crate::collaborators::{Collaborators, NameRequest, PlacementRequest};
use crate::error::{CollaboratorError, SagaError};
use crate::model::{properties, AllocationTask, ComputeDescription, HostAssignment, SubStage};
use crate::store::TaskPatch;

/// Name format seeded from the template name.
pub(crate) fn default_name_format(template_name: &str) -> String {
    format!("{template_name}-%s")
}

fn check_names(names: &[String], expected: u32) -> Result<(), CollaboratorError> {
    if names.len() != expected as usize {
        return Err(CollaboratorError::Invalid(format!(
            "expected {expected} names, got {}",
            names.len()
        )));
    }
    let mut seen = HashSet::new();
    if let Some(duplicate) = names.iter().find(|name| !seen.insert(name.as_str())) {
        return Err(CollaboratorError::Invalid(format!(
            "duplicate generated name {duplicate}"
        )));
    }
    Ok(())
}

#[instrument(skip_all, fields(task_id = %task.id))]
pub(super) async fn request_names(
    collaborators: &Collaborators,
    task: &AllocationTask,
) -> Result<TaskPatch, SagaError> {
    let template: ComputeDescription = collaborators
        .documents
        .fetch(&task.resource_description_link)
        .await
        .map_err(SagaError::collaborator("failed to retrieve compute description"))?;

    let request = NameRequest {
        base_format: default_name_format(&template.name),
        count: task.resource_count,
        tenant_links: task.tenant_links.clone(),
        custom_properties: task.custom_properties.clone(),
    };

    let names = collaborators
        .names
        .generate(&request)
        .await
        .and_then(|names| check_names(&names, task.resource_count).map(|()| names))
        .map_err(SagaError::collaborator("failed to generate resource names"))?;

    info!(names = ?names, "Resource names generated");
    Ok(TaskPatch {
        stage: Some(SubStage::SelectPlacementComputes),
        resource_names: Some(names),
        ..Default::default()
    })
}

#[instrument(skip_all, fields(task_id = %task.id))]
pub(super) async fn select_placement(
    collaborators: &Collaborators,
    task: &AllocationTask,
) -> Result<TaskPatch, SagaError> {
    let assignments = match task.property(properties::PLACEMENT_LINK) {
        Some(link) => {
            info!(placement_link = %link, "Using fixed placement");
            vec![HostAssignment::fixed(link); task.resource_count as usize]
        }
        None => {
            let request = PlacementRequest {
                template_link: task.resource_description_link.clone(),
                resource_count: task.resource_count,
                resource_pool_links: task.resource_pool_link.iter().cloned().collect(),
                endpoint_link: task.endpoint_link.clone(),
                context_id: task.context_id(),
                tenant_links: task.tenant_links.clone(),
                custom_properties: task.custom_properties.clone(),
            };
            collaborators
                .placement
                .select(&request)
                .await
                .map_err(SagaError::collaborator("placement selection failed"))?
        }
    };

    info!(placements = assignments.len(), "Placement selected");
    Ok(TaskPatch {
        stage: Some(SubStage::StartComputeAllocation),
        host_assignments: Some(assignments),
        ..Default::default()
    })
}
