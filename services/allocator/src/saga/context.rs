//! `CREATED`: resolve pool, endpoint and candidate profiles.

use tracing::{info, instrument};
use vmalloc_reconcile::merge_properties;

use crate::collaborators::{Collaborators, ProfileCatalog, ProfileQuery};
use crate::error::SagaError;
use crate::model::{
    properties, AllocationTask, ComputeDescription, Endpoint, PlacementGroup, Profile,
    ResourcePool, SubStage,
};
use crate::store::TaskPatch;

async fn resolve_pool(
    collaborators: &Collaborators,
    task: &AllocationTask,
) -> Result<ResourcePool, SagaError> {
    let documents = &collaborators.documents;

    if let Some(link) = &task.resource_pool_link {
        return documents
            .fetch(link)
            .await
            .map_err(SagaError::collaborator(format!("failed to retrieve resource pool {link}")));
    }

    let group_link = task
        .group_placement_link
        .as_deref()
        .ok_or(SagaError::MissingField("group_placement_link"))?;
    let group: PlacementGroup = documents
        .fetch(group_link)
        .await
        .map_err(SagaError::collaborator(format!(
            "failed to retrieve placement group {group_link}"
        )))?;
    let pool_link = group
        .resource_pool_link
        .ok_or_else(|| SagaError::MissingResourcePool(group_link.to_string()))?;

    documents
        .fetch(&pool_link)
        .await
        .map_err(SagaError::collaborator(format!(
            "failed to retrieve resource pool {pool_link}"
        )))
}

/// Orders found profiles by their position in `preferred`, then keeps the
/// endpoint-specific ones if there are any, else the type-generic ones.
pub fn rank_profiles(endpoint_link: &str, preferred: &[String], found: Vec<Profile>) -> Vec<String> {
    let mut found = found;
    if !preferred.is_empty() {
        found.sort_by_key(|profile| {
            preferred
                .iter()
                .position(|link| *link == profile.self_link)
                .unwrap_or(usize::MAX)
        });
    }

    let (specific, generic): (Vec<Profile>, Vec<Profile>) = found
        .into_iter()
        .partition(|profile| profile.endpoint_link.as_deref() == Some(endpoint_link));

    let chosen = if specific.is_empty() { generic } else { specific };
    chosen.into_iter().map(|profile| profile.self_link).collect()
}

async fn query_profiles(
    catalog: &dyn ProfileCatalog,
    endpoint: &Endpoint,
    tenant_links: &[String],
    preferred: &[String],
) -> Result<Vec<String>, SagaError> {
    let mut query = ProfileQuery {
        endpoint_link: endpoint.self_link.clone(),
        endpoint_type: endpoint.endpoint_type.clone(),
        tenant_links: tenant_links.to_vec(),
        profile_links: preferred.to_vec(),
    };

    let mut found = catalog
        .find_profiles(&query)
        .await
        .map_err(SagaError::collaborator("failed to query profiles"))?;

    if found.is_empty() && !query.tenant_links.is_empty() {
        info!(
            endpoint_link = %endpoint.self_link,
            "No group profiles found, falling back to global profiles"
        );
        query.tenant_links.clear();
        found = catalog
            .find_profiles(&query)
            .await
            .map_err(SagaError::collaborator("failed to query global profiles"))?;
    }

    if found.is_empty() {
        return Err(SagaError::NoProfiles {
            endpoint_link: endpoint.self_link.clone(),
            endpoint_type: endpoint.endpoint_type.clone(),
        });
    }

    Ok(rank_profiles(&endpoint.self_link, preferred, found))
}

#[instrument(skip_all, fields(task_id = %task.id))]
pub(super) async fn prepare_context(
    collaborators: &Collaborators,
    task: &AllocationTask,
) -> Result<TaskPatch, SagaError> {
    let pool = resolve_pool(collaborators, task).await?;

    let template: ComputeDescription = collaborators
        .documents
        .fetch(&task.resource_description_link)
        .await
        .map_err(SagaError::collaborator("failed to retrieve compute description"))?;

    // request overrides template overrides pool
    let mut merged = merge_properties([
        &pool.custom_properties,
        &template.custom_properties,
        &task.custom_properties,
    ]);

    let endpoint_link = merged
        .get(properties::ENDPOINT_LINK)
        .cloned()
        .ok_or(SagaError::MissingEndpoint)?;
    let endpoint: Endpoint = collaborators
        .documents
        .fetch(&endpoint_link)
        .await
        .map_err(SagaError::collaborator(format!(
            "failed to retrieve endpoint {endpoint_link}"
        )))?;

    let context_id = merged
        .get(properties::CONTEXT_ID)
        .cloned()
        .unwrap_or_else(|| task.id.to_string());

    let preferred = collaborators
        .profiles
        .nic_profile_constraints(&template, &context_id, &task.tenant_links)
        .await
        .map_err(SagaError::collaborator("failed to get profile constraints"))?;

    let profile_links = query_profiles(
        collaborators.profiles.as_ref(),
        &endpoint,
        &task.tenant_links,
        &preferred,
    )
    .await?;

    info!(
        endpoint_link = %endpoint.self_link,
        endpoint_type = %endpoint.endpoint_type,
        profiles = ?profile_links,
        "Context prepared"
    );

    merged
        .entry(properties::CONTEXT_ID.to_string())
        .or_insert(context_id);
    merged
        .entry(properties::RESOURCE_POOL_LINK.to_string())
        .or_insert_with(|| pool.self_link.clone());

    Ok(TaskPatch {
        stage: Some(SubStage::ContextPrepared),
        resource_pool_link: Some(pool.self_link),
        endpoint_link: Some(endpoint.self_link),
        endpoint_compute_link: Some(endpoint.compute_link),
        endpoint_type: Some(endpoint.endpoint_type),
        profile_links: Some(profile_links),
        custom_properties: Some(merged),
        ..Default::default()
    })
}
