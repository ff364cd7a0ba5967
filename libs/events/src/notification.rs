//! Notification envelope and checkpoint payloads.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use vmalloc_id::{NotificationId, TaskId};

use crate::EventError;

/// Envelope for one publication on an extensibility topic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification<P> {
    pub notification_id: NotificationId,
    pub occurred_at: DateTime<Utc>,
    pub topic_id: String,
    /// Task that published the notification.
    pub task_id: TaskId,
    /// Stage the task is parked in while the subscriber decides.
    pub stage: String,
    pub blocking: bool,
    pub payload: P,
}

impl<P> Notification<P> {
    pub fn builder() -> NotificationBuilder<P> {
        NotificationBuilder::new()
    }
}

/// Builder for [`Notification`].
#[derive(Debug)]
pub struct NotificationBuilder<P> {
    topic_id: Option<String>,
    task_id: Option<TaskId>,
    stage: Option<String>,
    blocking: bool,
    payload: Option<P>,
}

impl<P> NotificationBuilder<P> {
    pub fn new() -> Self {
        Self {
            topic_id: None,
            task_id: None,
            stage: None,
            blocking: false,
            payload: None,
        }
    }

    pub fn topic(mut self, topic_id: impl Into<String>, blocking: bool) -> Self {
        self.topic_id = Some(topic_id.into());
        self.blocking = blocking;
        self
    }

    pub fn task(mut self, task_id: TaskId, stage: impl Into<String>) -> Self {
        self.task_id = Some(task_id);
        self.stage = Some(stage.into());
        self
    }

    pub fn payload(mut self, payload: P) -> Self {
        self.payload = Some(payload);
        self
    }

    /// Builds the envelope with a fresh id, stamped now.
    pub fn build(self) -> Result<Notification<P>, EventError> {
        Ok(Notification {
            notification_id: NotificationId::new(),
            occurred_at: Utc::now(),
            topic_id: self.topic_id.ok_or(EventError::MissingField("topic_id"))?,
            task_id: self.task_id.ok_or(EventError::MissingField("task_id"))?,
            stage: self.stage.ok_or(EventError::MissingField("stage"))?,
            blocking: self.blocking,
            payload: self.payload.ok_or(EventError::MissingField("payload"))?,
        })
    }
}

impl<P> Default for NotificationBuilder<P> {
    fn default() -> Self {
        Self::new()
    }
}

/// What a checkpoint subscriber sees.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckpointPayload {
    pub resource_names: Vec<String>,
    /// Display names of the assigned hosts, in assignment order. A host
    /// without a display name is `null`.
    pub host_selections: Vec<Option<String>>,
}

/// What a blocking checkpoint subscriber answers.
///
/// Absent or empty lists mean "no change".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckpointResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_names: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host_selections: Option<Vec<String>>,
}

impl CheckpointResponse {
    /// The requested host order, if the subscriber asked for one.
    pub fn requested_hosts(&self) -> Option<&[String]> {
        self.host_selections.as_deref().filter(|h| !h.is_empty())
    }

    /// The replacement resource names, if the subscriber sent any.
    pub fn requested_names(&self) -> Option<&[String]> {
        self.resource_names.as_deref().filter(|n| !n.is_empty())
    }
}
