//! Extensibility topic bootstrap.

use tracing::info;
use vmalloc_events::compute_allocation_topic;

use crate::collaborators::TopicRegistry;
use crate::error::CollaboratorError;

/// Registers the topics the saga publishes to. Safe to repeat.
pub async fn register_topics(registry: &dyn TopicRegistry) -> Result<(), CollaboratorError> {
    let topic = compute_allocation_topic();
    registry.register(&topic).await?;
    info!(topic_id = %topic.id, blocking = topic.blocking, "Extensibility topic registered");
    Ok(())
}
