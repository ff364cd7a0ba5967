//! `CONTEXT_PREPARED`: customize the template for the endpoint and the
//! first candidate profile that accepts it.

use tracing::{info, instrument, warn};
use vmalloc_reconcile::merge_properties;

use crate::collaborators::{Collaborators, EnhanceContext};
use crate::error::SagaError;
use crate::model::{properties, AllocationTask, ComputeDescription, EndpointCompute, SubStage};
use crate::store::TaskPatch;

#[instrument(skip_all, fields(task_id = %task.id))]
pub(super) async fn configure_template(
    collaborators: &Collaborators,
    task: &AllocationTask,
) -> Result<TaskPatch, SagaError> {
    let documents = &collaborators.documents;

    let mut template: ComputeDescription = documents
        .fetch(&task.resource_description_link)
        .await
        .map_err(SagaError::collaborator("failed to retrieve compute description"))?;

    let endpoint_compute_link = task
        .endpoint_compute_link
        .as_deref()
        .ok_or(SagaError::MissingField("endpoint_compute_link"))?;
    let endpoint_compute: EndpointCompute = documents
        .fetch(endpoint_compute_link)
        .await
        .map_err(SagaError::collaborator("failed to retrieve endpoint compute"))?;
    let endpoint_description: ComputeDescription = documents
        .fetch(&endpoint_compute.description_link)
        .await
        .map_err(SagaError::collaborator(
            "failed to retrieve endpoint compute description",
        ))?;

    template.inherit_endpoint(&endpoint_description);

    let mut task_properties = task.custom_properties.clone();
    if task_properties.contains_key(properties::CONTAINER_HOST) {
        template.supported_children = vec![properties::DOCKER_CONTAINER_CHILD.to_string()];
        task_properties
            .entry(properties::DOCKER_ADAPTER_TYPE.to_string())
            .or_insert_with(|| properties::DOCKER_ADAPTER_TYPE_DEFAULT.to_string());
    }
    template.custom_properties =
        merge_properties([&template.custom_properties, &task_properties]);

    let mut context = EnhanceContext {
        endpoint_link: task.endpoint_link.clone(),
        endpoint_type: task.endpoint_type.clone(),
        resource_pool_link: task.resource_pool_link.clone(),
        region_id: endpoint_description.region_id.clone(),
        zone_id: endpoint_description.zone_id.clone(),
        profile_link: String::new(),
    };

    let mut last_error = None;
    for profile_link in &task.profile_links {
        context.profile_link = profile_link.clone();

        let mut enhanced = match collaborators
            .enhancer
            .enhance(&context, template.clone())
            .await
        {
            Ok(enhanced) => enhanced,
            Err(e) => {
                warn!(profile_link = %profile_link, error = %e, "Template enhancement failed");
                last_error = Some(e);
                continue;
            }
        };

        enhanced
            .custom_properties
            .insert(properties::PROFILE_LINK.to_string(), profile_link.clone());

        let saved: ComputeDescription = documents
            .replace(&task.resource_description_link, &enhanced)
            .await
            .map_err(SagaError::collaborator("failed to update compute description"))?;

        info!(profile_link = %profile_link, "Template configured");
        return Ok(TaskPatch {
            stage: Some(SubStage::ResourcesNames),
            custom_properties: Some(saved.custom_properties),
            ..Default::default()
        });
    }

    Err(SagaError::ProfilesExhausted {
        attempts: task.profile_links.len(),
        last_error: last_error
            .map(|e| e.to_string())
            .unwrap_or_else(|| "no candidate profiles".to_string()),
    })
}
