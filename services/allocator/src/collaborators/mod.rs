//! External services the saga consumes.
//!
//! Every collaborator sits behind an object-safe async trait so the saga can
//! run against the HTTP implementations in [`http`] or in-process fakes.

pub mod http;

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;
use vmalloc_events::{CheckpointPayload, CheckpointResponse, Notification, TopicDefinition};

use crate::error::CollaboratorError;
use crate::model::{
    CallbackOutcome, CallbackTarget, ComputeDescription, HostAssignment, NicDescription, Profile,
    Subnet,
};

/// Match criteria for a resource query. All clauses must hold.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceQuery {
    pub kind: String,
    /// Top-level field equality.
    #[serde(default)]
    pub fields: BTreeMap<String, String>,
    /// Custom property equality.
    #[serde(default)]
    pub properties: BTreeMap<String, String>,
    /// Top-level field membership.
    #[serde(default)]
    pub any_of: BTreeMap<String, Vec<String>>,
}

impl ResourceQuery {
    pub fn of_kind(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            ..Default::default()
        }
    }

    pub fn field(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    pub fn property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    pub fn any_of<I, S>(mut self, name: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.any_of
            .insert(name.into(), values.into_iter().map(Into::into).collect());
        self
    }

    /// Whether `document` satisfies every clause. Kind is not checked.
    pub fn matches(&self, document: &Value) -> bool {
        let field = |name: &str| document.get(name).and_then(Value::as_str);

        self.fields
            .iter()
            .all(|(name, expected)| field(name) == Some(expected.as_str()))
            && self.properties.iter().all(|(key, expected)| {
                document
                    .get("custom_properties")
                    .and_then(|props| props.get(key))
                    .and_then(Value::as_str)
                    == Some(expected.as_str())
            })
            && self.any_of.iter().all(|(name, allowed)| {
                field(name).is_some_and(|value| allowed.iter().any(|a| a == value))
            })
    }
}

/// Profile search.
///
/// Matches profiles bound to `endpoint_link`, or unbound profiles of
/// `endpoint_type`. An empty `tenant_links` searches global profiles; an
/// empty `profile_links` does not restrict by link.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileQuery {
    pub endpoint_link: String,
    pub endpoint_type: String,
    #[serde(default)]
    pub tenant_links: Vec<String>,
    #[serde(default)]
    pub profile_links: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubnetRequest {
    pub endpoint_link: Option<String>,
    pub region_id: Option<String>,
    pub profile_link: String,
    pub nic_description: NicDescription,
    #[serde(default)]
    pub tenant_links: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NameRequest {
    /// Format with a single `%s` placeholder for the generated suffix.
    pub base_format: String,
    pub count: u32,
    #[serde(default)]
    pub tenant_links: Vec<String>,
    #[serde(default)]
    pub custom_properties: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlacementRequest {
    pub template_link: String,
    pub resource_count: u32,
    pub resource_pool_links: Vec<String>,
    pub endpoint_link: Option<String>,
    pub context_id: String,
    #[serde(default)]
    pub tenant_links: Vec<String>,
    #[serde(default)]
    pub custom_properties: BTreeMap<String, String>,
}

/// Inputs to template enhancement for one candidate profile.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnhanceContext {
    pub endpoint_link: Option<String>,
    pub endpoint_type: Option<String>,
    pub resource_pool_link: Option<String>,
    pub region_id: Option<String>,
    pub zone_id: Option<String>,
    pub profile_link: String,
}

/// JSON documents addressed by self-link.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn get(&self, link: &str) -> Result<Value, CollaboratorError>;

    /// Creates a document under `factory_link`; returns it with its self-link.
    async fn post(&self, factory_link: &str, body: Value) -> Result<Value, CollaboratorError>;

    async fn put(&self, link: &str, body: Value) -> Result<Value, CollaboratorError>;

    async fn patch(&self, link: &str, body: Value) -> Result<Value, CollaboratorError>;

    /// Expanded documents matching `query`.
    async fn query(&self, query: &ResourceQuery) -> Result<Vec<Value>, CollaboratorError>;
}

fn decode<T: DeserializeOwned>(target: &str, value: Value) -> Result<T, CollaboratorError> {
    serde_json::from_value(value).map_err(|e| CollaboratorError::decode(target, e))
}

fn encode<T: Serialize>(target: &str, body: &T) -> Result<Value, CollaboratorError> {
    serde_json::to_value(body).map_err(|e| CollaboratorError::decode(target, e))
}

impl dyn DocumentStore {
    pub async fn fetch<T: DeserializeOwned>(&self, link: &str) -> Result<T, CollaboratorError> {
        let value = self.get(link).await?;
        decode(link, value)
    }

    pub async fn create<T, R>(&self, factory_link: &str, body: &T) -> Result<R, CollaboratorError>
    where
        T: Serialize,
        R: DeserializeOwned,
    {
        let body = encode(factory_link, body)?;
        let value = self.post(factory_link, body).await?;
        decode(factory_link, value)
    }

    pub async fn replace<T, R>(&self, link: &str, body: &T) -> Result<R, CollaboratorError>
    where
        T: Serialize,
        R: DeserializeOwned,
    {
        let body = encode(link, body)?;
        let value = self.put(link, body).await?;
        decode(link, value)
    }

    pub async fn query_as<T: DeserializeOwned>(
        &self,
        query: &ResourceQuery,
    ) -> Result<Vec<T>, CollaboratorError> {
        self.query(query)
            .await?
            .into_iter()
            .map(|value| decode(&query.kind, value))
            .collect()
    }
}

#[async_trait]
pub trait ProfileCatalog: Send + Sync {
    /// Profile links preferred by the networks the template's NICs attach to.
    async fn nic_profile_constraints(
        &self,
        template: &ComputeDescription,
        context_id: &str,
        tenant_links: &[String],
    ) -> Result<Vec<String>, CollaboratorError>;

    async fn find_profiles(&self, query: &ProfileQuery) -> Result<Vec<Profile>, CollaboratorError>;

    async fn select_subnet(&self, request: &SubnetRequest) -> Result<Subnet, CollaboratorError>;
}

#[async_trait]
pub trait NameGenerator: Send + Sync {
    /// Returns `request.count` unique names.
    async fn generate(&self, request: &NameRequest) -> Result<Vec<String>, CollaboratorError>;
}

#[async_trait]
pub trait PlacementSelector: Send + Sync {
    /// One assignment per requested unit, or fewer.
    async fn select(
        &self,
        request: &PlacementRequest,
    ) -> Result<Vec<HostAssignment>, CollaboratorError>;
}

#[async_trait]
pub trait TemplateEnhancer: Send + Sync {
    async fn enhance(
        &self,
        context: &EnhanceContext,
        template: ComputeDescription,
    ) -> Result<ComputeDescription, CollaboratorError>;
}

#[async_trait]
pub trait NotificationChannel: Send + Sync {
    fn is_blocking(&self) -> bool;

    /// Publishes a checkpoint notification.
    ///
    /// `None` means the channel did not wait for a subscriber decision.
    async fn publish(
        &self,
        notification: &Notification<CheckpointPayload>,
    ) -> Result<Option<CheckpointResponse>, CollaboratorError>;
}

/// Channel used when no subscriber is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopChannel;

#[async_trait]
impl NotificationChannel for NoopChannel {
    fn is_blocking(&self) -> bool {
        false
    }

    async fn publish(
        &self,
        _notification: &Notification<CheckpointPayload>,
    ) -> Result<Option<CheckpointResponse>, CollaboratorError> {
        Ok(None)
    }
}

#[async_trait]
pub trait CallbackSink: Send + Sync {
    async fn deliver(
        &self,
        target: &CallbackTarget,
        outcome: &CallbackOutcome,
    ) -> Result<(), CollaboratorError>;
}

#[async_trait]
pub trait TopicRegistry: Send + Sync {
    /// Registers `topic`. Registering the same topic again is a no-op.
    async fn register(&self, topic: &TopicDefinition) -> Result<(), CollaboratorError>;
}

/// Everything the saga talks to.
#[derive(Clone)]
pub struct Collaborators {
    pub documents: Arc<dyn DocumentStore>,
    pub profiles: Arc<dyn ProfileCatalog>,
    pub names: Arc<dyn NameGenerator>,
    pub placement: Arc<dyn PlacementSelector>,
    pub enhancer: Arc<dyn TemplateEnhancer>,
    pub notifications: Arc<dyn NotificationChannel>,
    pub callbacks: Arc<dyn CallbackSink>,
}
