//! HTTP implementations of the collaborator traits.
//!
//! All collaborators except the notification channel are reached through
//! one resource API. Bodies are JSON in both directions.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{RequestBuilder, StatusCode};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};
use vmalloc_events::{CheckpointPayload, CheckpointResponse, Notification, TopicDefinition};

use super::{
    CallbackSink, Collaborators, DocumentStore, EnhanceContext, NameGenerator, NameRequest,
    NoopChannel, NotificationChannel, PlacementRequest, PlacementSelector, ProfileCatalog,
    ProfileQuery, ResourceQuery, SubnetRequest, TemplateEnhancer, TopicRegistry,
};
use crate::config::Config;
use crate::error::CollaboratorError;
use crate::model::{
    CallbackOutcome, CallbackTarget, ComputeDescription, HostAssignment, Profile, Subnet,
};

/// `request_timeout` bounds a whole exchange; `None` leaves only the connect
/// timeout, so a slow peer is waited on indefinitely.
fn build_client(
    connect_timeout: Duration,
    request_timeout: Option<Duration>,
) -> Result<reqwest::Client, CollaboratorError> {
    let mut builder = reqwest::Client::builder().connect_timeout(connect_timeout);
    if let Some(timeout) = request_timeout {
        builder = builder.timeout(timeout);
    }
    builder.build().map_err(|e| CollaboratorError::Transport {
        target: "http client".to_string(),
        message: e.to_string(),
    })
}

fn transport(target: &str, err: reqwest::Error) -> CollaboratorError {
    CollaboratorError::Transport {
        target: target.to_string(),
        message: err.to_string(),
    }
}

/// Maps a non-success response to an error.
async fn error_for(target: &str, response: reqwest::Response) -> CollaboratorError {
    let status = response.status();
    if status == StatusCode::NOT_FOUND {
        return CollaboratorError::NotFound(target.to_string());
    }
    let message = response.text().await.unwrap_or_default();
    warn!(link = %target, status = %status, body = %message, "Collaborator request failed");
    CollaboratorError::Status {
        target: target.to_string(),
        status: status.as_u16(),
        message,
    }
}

async fn send_json<T: DeserializeOwned>(
    target: &str,
    request: RequestBuilder,
) -> Result<T, CollaboratorError> {
    let response = request.send().await.map_err(|e| transport(target, e))?;
    if !response.status().is_success() {
        return Err(error_for(target, response).await);
    }
    response
        .json()
        .await
        .map_err(|e| CollaboratorError::decode(target, e))
}

async fn send_empty(target: &str, request: RequestBuilder) -> Result<(), CollaboratorError> {
    let response = request.send().await.map_err(|e| transport(target, e))?;
    if !response.status().is_success() {
        return Err(error_for(target, response).await);
    }
    Ok(())
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    #[serde(default)]
    documents: Vec<Value>,
}

#[derive(Debug, Serialize)]
struct ConstraintsRequest<'a> {
    template: &'a ComputeDescription,
    context_id: &'a str,
    tenant_links: &'a [String],
}

#[derive(Debug, Deserialize)]
struct ConstraintsResponse {
    #[serde(default)]
    profile_links: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct ProfilesResponse {
    #[serde(default)]
    profiles: Vec<Profile>,
}

#[derive(Debug, Deserialize)]
struct NamesResponse {
    names: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct PlacementResponse {
    #[serde(default)]
    host_assignments: Vec<HostAssignment>,
}

#[derive(Debug, Serialize)]
struct EnhanceRequest<'a> {
    context: &'a EnhanceContext,
    template: ComputeDescription,
}

/// Client for the resource API.
#[derive(Debug, Clone)]
pub struct ResourceClient {
    client: reqwest::Client,
    base_url: String,
}

impl ResourceClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, CollaboratorError> {
        Ok(Self {
            client: build_client(timeout, Some(timeout))?,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Builds a URL for a document link or service path.
    fn url(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            return path.to_string();
        }
        format!("{}{}", self.base_url, path)
    }
}

#[async_trait]
impl DocumentStore for ResourceClient {
    async fn get(&self, link: &str) -> Result<Value, CollaboratorError> {
        debug!(link, "Loading document");
        send_json(link, self.client.get(self.url(link))).await
    }

    async fn post(&self, factory_link: &str, body: Value) -> Result<Value, CollaboratorError> {
        send_json(factory_link, self.client.post(self.url(factory_link)).json(&body)).await
    }

    async fn put(&self, link: &str, body: Value) -> Result<Value, CollaboratorError> {
        send_json(link, self.client.put(self.url(link)).json(&body)).await
    }

    async fn patch(&self, link: &str, body: Value) -> Result<Value, CollaboratorError> {
        send_json(link, self.client.patch(self.url(link)).json(&body)).await
    }

    async fn query(&self, query: &ResourceQuery) -> Result<Vec<Value>, CollaboratorError> {
        let response: QueryResponse =
            send_json("/query", self.client.post(self.url("/query")).json(query)).await?;
        Ok(response.documents)
    }
}

#[async_trait]
impl ProfileCatalog for ResourceClient {
    async fn nic_profile_constraints(
        &self,
        template: &ComputeDescription,
        context_id: &str,
        tenant_links: &[String],
    ) -> Result<Vec<String>, CollaboratorError> {
        let path = "/profiles/nic-constraints";
        let body = ConstraintsRequest {
            template,
            context_id,
            tenant_links,
        };
        let response: ConstraintsResponse =
            send_json(path, self.client.post(self.url(path)).json(&body)).await?;
        Ok(response.profile_links)
    }

    async fn find_profiles(&self, query: &ProfileQuery) -> Result<Vec<Profile>, CollaboratorError> {
        let path = "/profiles/query";
        let response: ProfilesResponse =
            send_json(path, self.client.post(self.url(path)).json(query)).await?;
        Ok(response.profiles)
    }

    async fn select_subnet(&self, request: &SubnetRequest) -> Result<Subnet, CollaboratorError> {
        let path = "/subnets/select";
        send_json(path, self.client.post(self.url(path)).json(request)).await
    }
}

#[async_trait]
impl NameGenerator for ResourceClient {
    async fn generate(&self, request: &NameRequest) -> Result<Vec<String>, CollaboratorError> {
        let path = "/names/generate";
        let response: NamesResponse =
            send_json(path, self.client.post(self.url(path)).json(request)).await?;
        Ok(response.names)
    }
}

#[async_trait]
impl PlacementSelector for ResourceClient {
    async fn select(
        &self,
        request: &PlacementRequest,
    ) -> Result<Vec<HostAssignment>, CollaboratorError> {
        let path = "/placements/select";
        let response: PlacementResponse =
            send_json(path, self.client.post(self.url(path)).json(request)).await?;
        Ok(response.host_assignments)
    }
}

#[async_trait]
impl TemplateEnhancer for ResourceClient {
    async fn enhance(
        &self,
        context: &EnhanceContext,
        template: ComputeDescription,
    ) -> Result<ComputeDescription, CollaboratorError> {
        let path = "/templates/enhance";
        let body = EnhanceRequest { context, template };
        send_json(path, self.client.post(self.url(path)).json(&body)).await
    }
}

#[async_trait]
impl CallbackSink for ResourceClient {
    async fn deliver(
        &self,
        target: &CallbackTarget,
        outcome: &CallbackOutcome,
    ) -> Result<(), CollaboratorError> {
        send_empty(
            &target.link,
            self.client.post(self.url(&target.link)).json(outcome),
        )
        .await
    }
}

#[async_trait]
impl TopicRegistry for ResourceClient {
    async fn register(&self, topic: &TopicDefinition) -> Result<(), CollaboratorError> {
        let path = format!("/extensibility/topics/{}", topic.id);
        send_empty(&path, self.client.put(self.url(&path)).json(topic)).await
    }
}

/// Publishes checkpoint notifications to a subscriber endpoint.
///
/// A blocking channel waits for the subscriber's answer; an empty answer
/// body means "no change".
#[derive(Debug, Clone)]
pub struct HttpNotificationChannel {
    client: reqwest::Client,
    url: String,
    blocking: bool,
}

impl HttpNotificationChannel {
    /// A blocking channel only bounds connecting: the subscriber decides
    /// when the task resumes.
    pub fn new(url: &str, blocking: bool, timeout: Duration) -> Result<Self, CollaboratorError> {
        let request_timeout = (!blocking).then_some(timeout);
        Ok(Self {
            client: build_client(timeout, request_timeout)?,
            url: url.to_string(),
            blocking,
        })
    }
}

#[async_trait]
impl NotificationChannel for HttpNotificationChannel {
    fn is_blocking(&self) -> bool {
        self.blocking
    }

    async fn publish(
        &self,
        notification: &Notification<CheckpointPayload>,
    ) -> Result<Option<CheckpointResponse>, CollaboratorError> {
        debug!(
            topic_id = %notification.topic_id,
            task_id = %notification.task_id,
            blocking = self.blocking,
            "Publishing checkpoint notification"
        );

        let response = self
            .client
            .post(&self.url)
            .json(notification)
            .send()
            .await
            .map_err(|e| transport(&self.url, e))?;
        if !response.status().is_success() {
            return Err(error_for(&self.url, response).await);
        }
        if !self.blocking {
            return Ok(None);
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| transport(&self.url, e))?;
        if body.iter().all(u8::is_ascii_whitespace) {
            return Ok(Some(CheckpointResponse::default()));
        }
        serde_json::from_slice(&body)
            .map(Some)
            .map_err(|e| CollaboratorError::decode(&self.url, e))
    }
}

impl Collaborators {
    /// HTTP collaborators for `config`.
    pub fn http(config: &Config) -> Result<Self, CollaboratorError> {
        let client = Arc::new(ResourceClient::new(
            &config.resource_api_url,
            config.request_timeout,
        )?);

        let notifications: Arc<dyn NotificationChannel> = match &config.extensibility {
            Some(ext) => Arc::new(HttpNotificationChannel::new(
                &ext.url,
                ext.blocking,
                config.request_timeout,
            )?),
            None => Arc::new(NoopChannel),
        };

        Ok(Self {
            documents: client.clone(),
            profiles: client.clone(),
            names: client.clone(),
            placement: client.clone(),
            enhancer: client.clone(),
            notifications,
            callbacks: client,
        })
    }
}
