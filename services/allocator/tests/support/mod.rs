//! In-process collaborators for end-to-end saga tests.

#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use vmalloc_allocator::collaborators::{
    CallbackSink, Collaborators, DocumentStore, EnhanceContext, NameGenerator, NameRequest,
    NotificationChannel, PlacementRequest, PlacementSelector, ProfileCatalog, ProfileQuery,
    ResourceQuery, SubnetRequest, TemplateEnhancer,
};
use vmalloc_allocator::error::CollaboratorError;
use vmalloc_allocator::model::{
    properties, AllocationRequest, CallbackOutcome, CallbackTarget, ComputeDescription,
    HostAssignment, Profile, Subnet, KIND_COMPUTE, KIND_COMPUTE_NETWORK,
};
use vmalloc_allocator::saga::AllocationSaga;
use vmalloc_allocator::store::MemoryTaskStore;
use vmalloc_events::{CheckpointPayload, CheckpointResponse, Notification};
use vmalloc_id::links;

pub const POOL: &str = "/resources/pools/p1";
pub const GROUP: &str = "/resources/placement-groups/g1";
pub const ENDPOINT: &str = "/resources/endpoints/e1";
pub const ENDPOINT_COMPUTE: &str = "/resources/endpoint-computes/e1";
pub const ENDPOINT_DESCRIPTION: &str = "/resources/compute-descriptions/e1";
pub const TEMPLATE: &str = "/resources/compute-descriptions/web";
pub const DISK_DESCRIPTION: &str = "/resources/disk-descriptions/boot";
pub const NIC_DESCRIPTION: &str = "/resources/nic-descriptions/frontend";
pub const PROFILE: &str = "/resources/profiles/aws-e1";
pub const NETWORK: &str = "/resources/compute-networks/frontend";
pub const CONTEXT: &str = "ctx-1";

const KIND_DISK: &str = "disk";
const KIND_NIC: &str = "network-interface";

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}

#[derive(Debug, Clone)]
struct StoredDocument {
    kind: String,
    body: Value,
}

/// Document store over a map of self-link to document.
#[derive(Default)]
pub struct FakeDocuments {
    documents: Mutex<BTreeMap<String, StoredDocument>>,
    failing_factories: Mutex<HashSet<String>>,
    failing_names: Mutex<HashSet<String>>,
    slow_factories: Mutex<HashMap<String, Duration>>,
    next_id: AtomicUsize,
}

impl FakeDocuments {
    pub fn insert(&self, kind: &str, link: &str, mut body: Value) {
        body["self_link"] = json!(link);
        lock(&self.documents).insert(
            link.to_string(),
            StoredDocument {
                kind: kind.to_string(),
                body,
            },
        );
    }

    pub fn document(&self, link: &str) -> Option<Value> {
        lock(&self.documents).get(link).map(|doc| doc.body.clone())
    }

    pub fn of_kind(&self, kind: &str) -> Vec<Value> {
        lock(&self.documents)
            .values()
            .filter(|doc| doc.kind == kind)
            .map(|doc| doc.body.clone())
            .collect()
    }

    pub fn computes(&self) -> Vec<Value> {
        self.of_kind(KIND_COMPUTE)
    }

    pub fn disks(&self) -> Vec<Value> {
        self.of_kind(KIND_DISK)
    }

    pub fn nics(&self) -> Vec<Value> {
        self.of_kind(KIND_NIC)
    }

    /// Makes every create under `factory_link` fail.
    pub fn fail_creates_under(&self, factory_link: &str) {
        lock(&self.failing_factories).insert(factory_link.to_string());
    }

    /// Makes creating a document whose `name` is `name` fail.
    pub fn fail_create_named(&self, name: &str) {
        lock(&self.failing_names).insert(name.to_string());
    }

    /// Holds every create under `factory_link` for `delay` before storing it.
    pub fn delay_creates_under(&self, factory_link: &str, delay: Duration) {
        lock(&self.slow_factories).insert(factory_link.to_string(), delay);
    }

    /// Stamps a cluster index on a compute, as the deployment layer does once
    /// a resource joins a cluster.
    pub fn set_cluster_index(&self, link: &str, index: usize) {
        if let Some(doc) = lock(&self.documents).get_mut(link) {
            doc.body["custom_properties"][properties::CLUSTER_INDEX] = json!(index.to_string());
        }
    }

    fn kind_of_factory(factory_link: &str) -> &str {
        match factory_link {
            links::COMPUTE_FACTORY => KIND_COMPUTE,
            links::DISK_FACTORY => KIND_DISK,
            links::NIC_FACTORY => KIND_NIC,
            other => links::last_segment(other),
        }
    }
}

#[async_trait]
impl DocumentStore for FakeDocuments {
    async fn get(&self, link: &str) -> Result<Value, CollaboratorError> {
        self.document(link)
            .ok_or_else(|| CollaboratorError::NotFound(link.to_string()))
    }

    async fn post(&self, factory_link: &str, mut body: Value) -> Result<Value, CollaboratorError> {
        let named = body.get("name").and_then(Value::as_str).unwrap_or_default();
        if lock(&self.failing_factories).contains(factory_link)
            || lock(&self.failing_names).contains(named)
        {
            return Err(CollaboratorError::Status {
                target: factory_link.to_string(),
                status: 500,
                message: "injected failure".to_string(),
            });
        }
        let delay = lock(&self.slow_factories).get(factory_link).copied();
        match delay {
            Some(delay) => tokio::time::sleep(delay).await,
            None => tokio::task::yield_now().await,
        }

        let n = self.next_id.fetch_add(1, Ordering::SeqCst);
        let link = links::build_path(&[factory_link, &format!("r{n:04}")]);
        body["self_link"] = json!(link);
        self.insert(Self::kind_of_factory(factory_link), &link, body.clone());
        Ok(body)
    }

    async fn put(&self, link: &str, body: Value) -> Result<Value, CollaboratorError> {
        let kind = lock(&self.documents)
            .get(link)
            .map(|doc| doc.kind.clone())
            .ok_or_else(|| CollaboratorError::NotFound(link.to_string()))?;
        self.insert(&kind, link, body);
        self.get(link).await
    }

    async fn patch(&self, link: &str, body: Value) -> Result<Value, CollaboratorError> {
        let mut documents = lock(&self.documents);
        let doc = documents
            .get_mut(link)
            .ok_or_else(|| CollaboratorError::NotFound(link.to_string()))?;
        if let (Some(target), Some(fields)) = (doc.body.as_object_mut(), body.as_object()) {
            for (key, value) in fields {
                target.insert(key.clone(), value.clone());
            }
        }
        Ok(doc.body.clone())
    }

    async fn query(&self, query: &ResourceQuery) -> Result<Vec<Value>, CollaboratorError> {
        Ok(self
            .of_kind(&query.kind)
            .into_iter()
            .filter(|doc| query.matches(doc))
            .collect())
    }
}

/// Profile catalog over a fixed profile list.
#[derive(Default)]
pub struct FakeProfiles {
    pub profiles: Mutex<Vec<Profile>>,
    pub preferred: Mutex<Vec<String>>,
    pub queries: Mutex<Vec<ProfileQuery>>,
    pub subnet_requests: Mutex<Vec<SubnetRequest>>,
}

#[async_trait]
impl ProfileCatalog for FakeProfiles {
    async fn nic_profile_constraints(
        &self,
        _template: &ComputeDescription,
        _context_id: &str,
        _tenant_links: &[String],
    ) -> Result<Vec<String>, CollaboratorError> {
        Ok(lock(&self.preferred).clone())
    }

    async fn find_profiles(&self, query: &ProfileQuery) -> Result<Vec<Profile>, CollaboratorError> {
        lock(&self.queries).push(query.clone());
        Ok(lock(&self.profiles)
            .iter()
            .filter(|profile| match &profile.endpoint_link {
                Some(link) => *link == query.endpoint_link,
                None => profile.endpoint_type.as_deref() == Some(query.endpoint_type.as_str()),
            })
            .filter(|profile| {
                if query.tenant_links.is_empty() {
                    profile.tenant_links.is_empty()
                } else {
                    profile
                        .tenant_links
                        .iter()
                        .any(|tenant| query.tenant_links.contains(tenant))
                }
            })
            .cloned()
            .collect())
    }

    async fn select_subnet(&self, request: &SubnetRequest) -> Result<Subnet, CollaboratorError> {
        lock(&self.subnet_requests).push(request.clone());
        Ok(Subnet {
            self_link: "/resources/subnets/frontend-a".to_string(),
            network_link: Some(NETWORK.to_string()),
            name: request.nic_description.name.clone(),
        })
    }
}

/// Sequential names; never repeats across calls.
#[derive(Default)]
pub struct FakeNames {
    next: AtomicUsize,
    pub fail: Mutex<bool>,
}

#[async_trait]
impl NameGenerator for FakeNames {
    async fn generate(&self, request: &NameRequest) -> Result<Vec<String>, CollaboratorError> {
        if *lock(&self.fail) {
            return Err(CollaboratorError::Rejected("name service down".to_string()));
        }
        let start = self.next.fetch_add(request.count as usize, Ordering::SeqCst);
        Ok((0..request.count as usize)
            .map(|i| request.base_format.replace("%s", &(start + i + 1).to_string()))
            .collect())
    }
}

/// Returns the configured assignments, or one per requested unit cycling
/// through them.
#[derive(Default)]
pub struct FakePlacement {
    pub hosts: Mutex<Vec<HostAssignment>>,
    /// When set, return `hosts` verbatim regardless of the requested count.
    pub verbatim: Mutex<bool>,
    pub requests: Mutex<Vec<PlacementRequest>>,
}

#[async_trait]
impl PlacementSelector for FakePlacement {
    async fn select(
        &self,
        request: &PlacementRequest,
    ) -> Result<Vec<HostAssignment>, CollaboratorError> {
        lock(&self.requests).push(request.clone());
        let hosts = lock(&self.hosts).clone();
        if *lock(&self.verbatim) || hosts.is_empty() {
            return Ok(hosts);
        }
        Ok(hosts
            .iter()
            .cycle()
            .take(request.resource_count as usize)
            .cloned()
            .collect())
    }
}

/// Accepts the template for every profile except the rejected ones.
#[derive(Default)]
pub struct FakeEnhancer {
    pub rejected: Mutex<HashSet<String>>,
    pub attempts: Mutex<Vec<String>>,
}

#[async_trait]
impl TemplateEnhancer for FakeEnhancer {
    async fn enhance(
        &self,
        context: &EnhanceContext,
        mut template: ComputeDescription,
    ) -> Result<ComputeDescription, CollaboratorError> {
        lock(&self.attempts).push(context.profile_link.clone());
        if lock(&self.rejected).contains(&context.profile_link) {
            return Err(CollaboratorError::Rejected(format!(
                "no image mapping in {}",
                context.profile_link
            )));
        }
        template
            .extra
            .insert("instance_type".to_string(), json!("small"));
        Ok(template)
    }
}

/// Records every notification and answers with a scripted response.
#[derive(Default)]
pub struct ScriptedChannel {
    pub blocking: bool,
    pub response: Mutex<Option<CheckpointResponse>>,
    pub published: Mutex<Vec<Notification<CheckpointPayload>>>,
}

impl ScriptedChannel {
    pub fn blocking() -> Self {
        Self {
            blocking: true,
            ..Default::default()
        }
    }

    pub fn respond_with(&self, response: CheckpointResponse) {
        *lock(&self.response) = Some(response);
    }

    pub fn published(&self) -> Vec<Notification<CheckpointPayload>> {
        lock(&self.published).clone()
    }
}

#[async_trait]
impl NotificationChannel for ScriptedChannel {
    fn is_blocking(&self) -> bool {
        self.blocking
    }

    async fn publish(
        &self,
        notification: &Notification<CheckpointPayload>,
    ) -> Result<Option<CheckpointResponse>, CollaboratorError> {
        lock(&self.published).push(notification.clone());
        if !self.blocking {
            return Ok(None);
        }
        Ok(Some(lock(&self.response).clone().unwrap_or_default()))
    }
}

#[derive(Default)]
pub struct RecordingSink {
    pub delivered: Mutex<Vec<(CallbackTarget, CallbackOutcome)>>,
}

#[async_trait]
impl CallbackSink for RecordingSink {
    async fn deliver(
        &self,
        target: &CallbackTarget,
        outcome: &CallbackOutcome,
    ) -> Result<(), CollaboratorError> {
        lock(&self.delivered).push((target.clone(), outcome.clone()));
        Ok(())
    }
}

/// A seeded set of fakes plus an in-memory task store.
pub struct World {
    pub documents: Arc<FakeDocuments>,
    pub profiles: Arc<FakeProfiles>,
    pub names: Arc<FakeNames>,
    pub placement: Arc<FakePlacement>,
    pub enhancer: Arc<FakeEnhancer>,
    pub channel: Arc<ScriptedChannel>,
    pub callbacks: Arc<RecordingSink>,
    pub store: Arc<MemoryTaskStore>,
}

impl World {
    /// A world with one endpoint, one profile and two candidate hosts.
    pub fn seeded() -> Self {
        let world = Self {
            documents: Arc::default(),
            profiles: Arc::default(),
            names: Arc::default(),
            placement: Arc::default(),
            enhancer: Arc::default(),
            channel: Arc::new(ScriptedChannel::blocking()),
            callbacks: Arc::default(),
            store: Arc::new(MemoryTaskStore::new()),
        };
        world.seed();
        world
    }

    fn seed(&self) {
        let docs = &self.documents;
        docs.insert(
            "resource-pool",
            POOL,
            json!({
                "name": "pool-1",
                "custom_properties": { (properties::ENDPOINT_LINK): ENDPOINT },
            }),
        );
        docs.insert(
            "placement-group",
            GROUP,
            json!({ "resource_pool_link": POOL }),
        );
        docs.insert(
            "endpoint",
            ENDPOINT,
            json!({ "endpoint_type": "aws", "compute_link": ENDPOINT_COMPUTE }),
        );
        docs.insert(
            "endpoint-compute",
            ENDPOINT_COMPUTE,
            json!({ "description_link": ENDPOINT_DESCRIPTION }),
        );
        docs.insert(
            "compute-description",
            ENDPOINT_DESCRIPTION,
            json!({
                "name": "e1",
                "region_id": "us-east-1",
                "zone_id": "us-east-1a",
                "environment_name": "AWS",
                "instance_adapter_reference": "/adapters/aws/instance",
            }),
        );
        docs.insert(
            "compute-description",
            TEMPLATE,
            json!({
                "name": "web",
                "disk_desc_links": [DISK_DESCRIPTION],
                "nic_desc_links": [NIC_DESCRIPTION],
                "tag_links": ["/resources/tags/web"],
                "cpu_count": 2,
            }),
        );
        docs.insert(
            "disk-description",
            DISK_DESCRIPTION,
            json!({ "id": "boot", "name": "boot", "capacity_mb": 8192 }),
        );
        docs.insert(
            "nic-description",
            NIC_DESCRIPTION,
            json!({ "name": "frontend", "assignment": "dynamic" }),
        );
        docs.insert(
            "profile",
            PROFILE,
            json!({
                "name": "aws-e1",
                "endpoint_link": ENDPOINT,
                "endpoint_type": "aws",
                "security_group_links": ["/resources/security-groups/web"],
            }),
        );
        docs.insert(
            KIND_COMPUTE_NETWORK,
            NETWORK,
            json!({
                "name": "frontend",
                "custom_properties": { (properties::CONTEXT_ID): CONTEXT },
            }),
        );

        lock(&self.profiles.profiles).push(Profile {
            self_link: PROFILE.to_string(),
            name: "aws-e1".to_string(),
            endpoint_link: Some(ENDPOINT.to_string()),
            endpoint_type: Some("aws".to_string()),
            tenant_links: Vec::new(),
            security_group_links: vec!["/resources/security-groups/web".to_string()],
        });

        *lock(&self.placement.hosts) = vec![
            HostAssignment::new("/resources/hosts/a", "A"),
            HostAssignment::new("/resources/hosts/b", "B"),
        ];
    }

    /// Adds a profile to both the catalog and the document store.
    pub fn add_profile(&self, profile: Profile) {
        self.documents.insert(
            "profile",
            &profile.self_link,
            serde_json::to_value(&profile).unwrap(),
        );
        lock(&self.profiles.profiles).push(profile);
    }

    pub fn collaborators(&self) -> Collaborators {
        Collaborators {
            documents: self.documents.clone(),
            profiles: self.profiles.clone(),
            names: self.names.clone(),
            placement: self.placement.clone(),
            enhancer: self.enhancer.clone(),
            notifications: self.channel.clone(),
            callbacks: self.callbacks.clone(),
        }
    }

    pub fn saga(&self) -> AllocationSaga {
        AllocationSaga::new(self.store.clone(), self.collaborators())
    }

    pub fn delivered(&self) -> Vec<(CallbackTarget, CallbackOutcome)> {
        lock(&self.callbacks.delivered).clone()
    }
}

/// A request for `count` resources from the seeded template and pool.
pub fn request(count: i64) -> AllocationRequest {
    AllocationRequest {
        resource_description_link: TEMPLATE.to_string(),
        resource_count: count,
        resource_pool_link: Some(POOL.to_string()),
        custom_properties: BTreeMap::from([(
            properties::CONTEXT_ID.to_string(),
            CONTEXT.to_string(),
        )]),
        callback: Some(CallbackTarget {
            link: "/callbacks/deployment-1".to_string(),
        }),
        ..Default::default()
    }
}

pub fn strings(raw: &[&str]) -> Vec<String> {
    raw.iter().map(|s| s.to_string()).collect()
}
