//! Documents the allocator reads from and writes to the document store.
//!
//! Only the fields the allocator touches are typed. Documents that are read,
//! modified and written back keep everything else in `extra` so a round trip
//! does not drop fields owned by other services.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Query kind of compute resources.
pub const KIND_COMPUTE: &str = "compute";

/// Query kind of deployment networks.
pub const KIND_COMPUTE_NETWORK: &str = "compute-network";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourcePool {
    pub self_link: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub custom_properties: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlacementGroup {
    pub self_link: String,
    #[serde(default)]
    pub resource_pool_link: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Endpoint {
    pub self_link: String,
    pub endpoint_type: String,
    /// Compute record representing the endpoint itself.
    pub compute_link: String,
}

/// Compute record of an endpoint; only its description matters here.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EndpointCompute {
    pub self_link: String,
    pub description_link: String,
}

/// A compute template ("compute description").
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ComputeDescription {
    #[serde(default)]
    pub self_link: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub custom_properties: BTreeMap<String, String>,
    #[serde(default)]
    pub disk_desc_links: Vec<String>,
    #[serde(default)]
    pub nic_desc_links: Vec<String>,
    #[serde(default)]
    pub supported_children: Vec<String>,
    #[serde(default)]
    pub instance_adapter_reference: Option<String>,
    #[serde(default)]
    pub boot_adapter_reference: Option<String>,
    #[serde(default)]
    pub power_adapter_reference: Option<String>,
    #[serde(default)]
    pub region_id: Option<String>,
    #[serde(default)]
    pub zone_id: Option<String>,
    #[serde(default)]
    pub environment_name: Option<String>,
    #[serde(default)]
    pub tag_links: Vec<String>,
    #[serde(default)]
    pub tenant_links: Vec<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ComputeDescription {
    /// Copies adapter, region and environment settings from the endpoint's
    /// own description.
    pub fn inherit_endpoint(&mut self, endpoint: &ComputeDescription) {
        self.instance_adapter_reference = endpoint.instance_adapter_reference.clone();
        self.boot_adapter_reference = endpoint.boot_adapter_reference.clone();
        self.power_adapter_reference = endpoint.power_adapter_reference.clone();
        self.region_id = endpoint.region_id.clone();
        self.environment_name = endpoint.environment_name.clone();
    }

    pub fn has_property(&self, key: &str) -> bool {
        self.custom_properties.contains_key(key)
    }
}

/// An environment profile: image, instance type and network mappings for
/// one endpoint or endpoint type.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub self_link: String,
    #[serde(default)]
    pub name: String,
    /// Set for endpoint-specific profiles; unset for type-generic ones.
    #[serde(default)]
    pub endpoint_link: Option<String>,
    #[serde(default)]
    pub endpoint_type: Option<String>,
    #[serde(default)]
    pub tenant_links: Vec<String>,
    #[serde(default)]
    pub security_group_links: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DiskState {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub self_link: Option<String>,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub tenant_links: Vec<String>,
    #[serde(default)]
    pub custom_properties: BTreeMap<String, String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NicDescription {
    pub self_link: String,
    pub name: String,
    #[serde(default)]
    pub assignment: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub custom_properties: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Subnet {
    pub self_link: String,
    #[serde(default)]
    pub network_link: Option<String>,
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NicState {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub self_link: Option<String>,
    pub description_link: String,
    pub subnet_link: String,
    #[serde(default)]
    pub network_link: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub security_group_links: Vec<String>,
    #[serde(default)]
    pub endpoint_link: Option<String>,
    #[serde(default)]
    pub tenant_links: Vec<String>,
    #[serde(default)]
    pub custom_properties: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ComputeType {
    VmHost,
    VmGuest,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PowerState {
    On,
    Off,
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LifecycleState {
    Provisioning,
    Ready,
    Retired,
}

/// A compute resource record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComputeState {
    #[serde(default)]
    pub self_link: Option<String>,
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub compute_type: ComputeType,
    pub power_state: PowerState,
    pub lifecycle_state: LifecycleState,
    pub description_link: String,
    #[serde(default)]
    pub parent_link: Option<String>,
    #[serde(default)]
    pub resource_pool_link: Option<String>,
    #[serde(default)]
    pub endpoint_link: Option<String>,
    #[serde(default)]
    pub disk_links: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network_interface_links: Option<Vec<String>>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub host_name: Option<String>,
    #[serde(default)]
    pub custom_properties: BTreeMap<String, String>,
    #[serde(default)]
    pub tenant_links: Vec<String>,
    #[serde(default)]
    pub tag_links: Vec<String>,
}

/// A network declared by the deployment.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ComputeNetwork {
    pub self_link: String,
    pub name: String,
    #[serde(default)]
    pub provision_profile_link: Option<String>,
}
