//! Custom property keys the allocator reads or stamps.
//!
//! Keys with a leading `__` are service-owned and not meant to be set by
//! end users, though callers may pre-seed some of them (context id, fixed
//! placement, address).

/// Context id shared by every resource of one logical deployment.
pub const CONTEXT_ID: &str = "__composition_context_id";

/// Ordinal of a materialized resource within its context.
pub const CLUSTER_INDEX: &str = "__cluster_index";

/// Resolved resource pool.
pub const RESOURCE_POOL_LINK: &str = "__resourcePoolLink";

/// Endpoint the allocation targets. Set on the pool, template or request.
pub const ENDPOINT_LINK: &str = "__endpointLink";

/// Fixed placement target. When present the placement selector is skipped.
/// Also stamped on each compute record with the host it was placed on.
pub const PLACEMENT_LINK: &str = "__placementLink";

/// Profile chosen while enhancing the template.
pub const PROFILE_LINK: &str = "__profileLink";

/// Composite component the resources belong to.
pub const COMPOSITE_COMPONENT_LINK: &str = "__composition_component_link";

/// Marks the created resources as compute hosts.
pub const COMPUTE_HOST: &str = "__computeHost";

/// Requests that the resources be usable as container hosts.
pub const CONTAINER_HOST: &str = "compute.container.host";

/// Adapter type of a container host.
pub const DOCKER_ADAPTER_TYPE: &str = "__adapterDockerType";

/// Default for [`DOCKER_ADAPTER_TYPE`].
pub const DOCKER_ADAPTER_TYPE_DEFAULT: &str = "API";

/// Child workload type a container host supports.
pub const DOCKER_CONTAINER_CHILD: &str = "DOCKER_CONTAINER";

/// Template provisions machines without network interfaces bound to
/// deployment networks.
pub const NO_NIC_VM: &str = "__noNicVM";

/// Disk description a disk was cloned from.
pub const TEMPLATE_DISK_LINK: &str = "__templateDiskLink";

/// Group placement the allocation was made under.
pub const GROUP_PLACEMENT_LINK: &str = "__groupResourcePlacementLink";

pub const COMPUTE_TYPE: &str = "__computeType";
pub const COMPUTE_TYPE_VM: &str = "VirtualMachine";

/// Pre-assigned address of the machine.
pub const IP_ADDRESS: &str = "__ipAddress";

/// Pre-assigned hostname of the machine.
pub const HOST_NAME: &str = "__hostName";
