//! `START_COMPUTE_ALLOCATION`: create one compute resource per requested unit.
//!
//! Every unit runs as its own tokio task and reports into a single join. Inside
//! a unit, disk and NIC creation fan out the same way and both settle before
//! the compute record that references them is created.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::json;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;
use vmalloc_id::links;
use vmalloc_reconcile::fan_out_channel;

use crate::collaborators::{Collaborators, ResourceQuery, SubnetRequest};
use crate::error::{CollaboratorError, SagaError};
use crate::model::{
    properties, AllocationTask, ComputeDescription, ComputeNetwork, ComputeState, ComputeType,
    DiskState, HostAssignment, LifecycleState, NicDescription, NicState, PowerState, Profile,
    SubStage, KIND_COMPUTE_NETWORK,
};
use crate::store::TaskPatch;

/// One fan-out unit: a named resource bound to its host.
#[derive(Debug, Clone)]
struct ResourceUnit {
    id: String,
    name: String,
    host: HostAssignment,
}

impl ResourceUnit {
    fn new(name: &str, host: HostAssignment) -> Self {
        Self {
            id: name.replace(' ', "-"),
            name: name.to_string(),
            host,
        }
    }
}

/// What every unit of one task shares.
struct Provisioning {
    collaborators: Collaborators,
    template: ComputeDescription,
    profile: Profile,
    nic_descriptions: Vec<NicDescription>,
    properties: BTreeMap<String, String>,
    description_link: String,
    resource_pool_link: Option<String>,
    group_placement_link: Option<String>,
    endpoint_link: Option<String>,
    context_id: String,
    tenant_links: Vec<String>,
}

fn created_link(kind: &str, self_link: Option<String>) -> Result<String, SagaError> {
    self_link.ok_or_else(|| {
        SagaError::collaborator(format!("failed to create {kind}"))(CollaboratorError::Invalid(
            format!("created {kind} has no self link"),
        ))
    })
}

impl Provisioning {
    async fn create_disk(&self, description_link: String) -> Result<String, SagaError> {
        let documents = &self.collaborators.documents;

        let mut disk: DiskState = documents
            .fetch(&description_link)
            .await
            .map_err(SagaError::collaborator(format!(
                "failed to retrieve disk {description_link}"
            )))?;
        disk.id = Uuid::new_v4().to_string();
        disk.self_link = None;
        disk.tenant_links = self.tenant_links.clone();
        disk.custom_properties
            .insert(properties::TEMPLATE_DISK_LINK.to_string(), description_link);

        let created: DiskState = documents
            .create(links::DISK_FACTORY, &disk)
            .await
            .map_err(SagaError::collaborator("failed to create disk"))?;
        created_link("disk", created.self_link)
    }

    async fn create_nic(&self, description: NicDescription) -> Result<String, SagaError> {
        let request = SubnetRequest {
            endpoint_link: self.endpoint_link.clone(),
            region_id: self.template.region_id.clone(),
            profile_link: self.profile.self_link.clone(),
            nic_description: description.clone(),
            tenant_links: self.tenant_links.clone(),
        };
        let subnet = self
            .collaborators
            .profiles
            .select_subnet(&request)
            .await
            .map_err(SagaError::collaborator(format!(
                "failed to select subnet for {}",
                description.name
            )))?;

        let nic = NicState {
            id: Uuid::new_v4().to_string(),
            name: description.name,
            self_link: None,
            description_link: description.self_link,
            subnet_link: subnet.self_link,
            network_link: subnet.network_link,
            address: description.address,
            security_group_links: self.profile.security_group_links.clone(),
            endpoint_link: self.endpoint_link.clone(),
            tenant_links: self.tenant_links.clone(),
            custom_properties: description.custom_properties,
        };

        let created: NicState = self
            .collaborators
            .documents
            .create(links::NIC_FACTORY, &nic)
            .await
            .map_err(SagaError::collaborator("failed to create network interface"))?;
        created_link("network interface", created.self_link)
    }

    /// Records the provisioning profile on same-context networks the
    /// template's NICs attach to.
    async fn claim_networks(&self) -> Result<(), SagaError> {
        if self.nic_descriptions.is_empty() || self.template.has_property(properties::NO_NIC_VM) {
            return Ok(());
        }

        let documents = &self.collaborators.documents;
        let query = ResourceQuery::of_kind(KIND_COMPUTE_NETWORK)
            .property(properties::CONTEXT_ID, self.context_id.clone())
            .any_of(
                "name",
                self.nic_descriptions.iter().map(|nic| nic.name.clone()),
            );
        let networks: Vec<ComputeNetwork> = documents
            .query_as(&query)
            .await
            .map_err(SagaError::collaborator("failed to query compute networks"))?;

        for network in networks
            .into_iter()
            .filter(|network| network.provision_profile_link.is_none())
        {
            documents
                .patch(
                    &network.self_link,
                    json!({ "provision_profile_link": self.profile.self_link }),
                )
                .await
                .map_err(SagaError::collaborator(format!(
                    "failed to update compute network {}",
                    network.self_link
                )))?;
            debug!(network = %network.self_link, "Compute network claimed by profile");
        }
        Ok(())
    }

    async fn create_disks(self: &Arc<Self>) -> Result<Vec<String>, SagaError> {
        let (participants, join) =
            fan_out_channel::<String, SagaError>(self.template.disk_desc_links.len());
        for (participant, link) in participants.into_iter().zip(&self.template.disk_desc_links) {
            let this = Arc::clone(self);
            let link = link.clone();
            tokio::spawn(async move { participant.report(this.create_disk(link).await) });
        }
        join.wait().await
    }

    async fn create_nics(self: &Arc<Self>) -> Result<Vec<String>, SagaError> {
        let (participants, join) =
            fan_out_channel::<String, SagaError>(self.nic_descriptions.len());
        for (participant, description) in participants.into_iter().zip(&self.nic_descriptions) {
            let this = Arc::clone(self);
            let description = description.clone();
            tokio::spawn(async move { participant.report(this.create_nic(description).await) });
        }
        let nics = join.wait().await?;
        self.claim_networks().await?;
        Ok(nics)
    }

    fn compute_state(
        &self,
        unit: &ResourceUnit,
        disk_links: Vec<String>,
        nic_links: Vec<String>,
    ) -> ComputeState {
        let mut custom_properties = self.properties.clone();
        if let Some(group) = &self.group_placement_link {
            custom_properties.insert(properties::GROUP_PLACEMENT_LINK.to_string(), group.clone());
        }
        custom_properties.insert(
            properties::PLACEMENT_LINK.to_string(),
            unit.host.host_link.clone(),
        );
        custom_properties.insert(
            properties::COMPUTE_TYPE.to_string(),
            properties::COMPUTE_TYPE_VM.to_string(),
        );

        ComputeState {
            self_link: None,
            id: unit.id.clone(),
            name: unit.name.clone(),
            compute_type: ComputeType::VmGuest,
            power_state: PowerState::On,
            lifecycle_state: LifecycleState::Provisioning,
            description_link: self.description_link.clone(),
            parent_link: Some(unit.host.host_link.clone()),
            resource_pool_link: self.resource_pool_link.clone(),
            endpoint_link: self.endpoint_link.clone(),
            disk_links,
            network_interface_links: (!nic_links.is_empty()).then_some(nic_links),
            address: self.properties.get(properties::IP_ADDRESS).cloned(),
            host_name: self.properties.get(properties::HOST_NAME).cloned(),
            custom_properties,
            tenant_links: self.template.tenant_links.clone(),
            tag_links: self.template.tag_links.clone(),
        }
    }

    async fn create_resource(self: Arc<Self>, unit: ResourceUnit) -> Result<String, SagaError> {
        // Both fan-outs must settle before the unit reports, even when one fails.
        let (disks, nics) = tokio::join!(self.create_disks(), self.create_nics());
        let (disk_links, nic_links) = (disks?, nics?);
        debug!(
            resource = %unit.name,
            host = %unit.host.host_link,
            disks = disk_links.len(),
            nics = nic_links.len(),
            "Creating compute resource"
        );

        let compute = self.compute_state(&unit, disk_links, nic_links);
        let created: ComputeState = self
            .collaborators
            .documents
            .create(links::COMPUTE_FACTORY, &compute)
            .await
            .map_err(SagaError::collaborator(format!(
                "failed to create compute {}",
                unit.name
            )))?;
        created_link("compute", created.self_link)
    }
}

#[instrument(skip_all, fields(task_id = %task.id, resource_count = task.resource_count))]
pub(super) async fn allocate(
    collaborators: &Collaborators,
    task: &AllocationTask,
) -> Result<TaskPatch, SagaError> {
    let count = task.resource_count as usize;
    if task.host_assignments.len() < count {
        return Err(SagaError::InsufficientPlacement {
            available: task.host_assignments.len(),
            requested: task.resource_count,
        });
    }
    if task.resource_names.len() < count {
        return Err(SagaError::MissingField("resource_names"));
    }

    let documents = &collaborators.documents;
    let template: ComputeDescription = documents
        .fetch(&task.resource_description_link)
        .await
        .map_err(SagaError::collaborator("failed to retrieve compute description"))?;
    let profile_link = template
        .custom_properties
        .get(properties::PROFILE_LINK)
        .ok_or(SagaError::MissingField("profile_link"))?;
    let profile: Profile = documents
        .fetch(profile_link)
        .await
        .map_err(SagaError::collaborator(format!(
            "failed to retrieve profile {profile_link}"
        )))?;

    let mut nic_descriptions = Vec::with_capacity(template.nic_desc_links.len());
    for link in &template.nic_desc_links {
        let description: NicDescription = documents
            .fetch(link)
            .await
            .map_err(SagaError::collaborator(format!(
                "failed to retrieve network interface description {link}"
            )))?;
        nic_descriptions.push(description);
    }

    let context_id = task.context_id();
    let mut stamped = task.custom_properties.clone();
    stamped.insert(properties::CONTEXT_ID.to_string(), context_id.clone());
    stamped.insert(
        properties::COMPOSITE_COMPONENT_LINK.to_string(),
        links::build_path(&[links::COMPOSITE_COMPONENT_FACTORY, &context_id]),
    );
    stamped.insert(properties::COMPUTE_HOST.to_string(), "true".to_string());

    let resource_pool_link = stamped
        .get(properties::RESOURCE_POOL_LINK)
        .cloned()
        .or_else(|| task.resource_pool_link.clone());

    let shared = Arc::new(Provisioning {
        collaborators: collaborators.clone(),
        template,
        profile,
        nic_descriptions,
        properties: stamped.clone(),
        description_link: task.resource_description_link.clone(),
        resource_pool_link,
        group_placement_link: task.group_placement_link.clone(),
        endpoint_link: task.endpoint_link.clone(),
        context_id,
        tenant_links: task.tenant_links.clone(),
    });

    let (participants, join) = fan_out_channel::<String, SagaError>(count);
    let units = task
        .resource_names
        .iter()
        .zip(&task.host_assignments)
        .map(|(name, host)| ResourceUnit::new(name, host.clone()));
    for (participant, unit) in participants.into_iter().zip(units) {
        let shared = Arc::clone(&shared);
        tokio::spawn(async move { participant.report(shared.create_resource(unit).await) });
    }

    let created = join.wait().await.inspect_err(|e| {
        warn!(error = %e, "Compute resource creation failed");
    })?;
    info!(created = created.len(), "Compute resources created");

    Ok(TaskPatch {
        stage: Some(SubStage::ComputeAllocationCompleted),
        custom_properties: Some(stamped),
        ..Default::default()
    })
}
