//! # vmalloc-events
//!
//! Extensibility topic and notification types for the vmalloc allocator.
//!
//! ## Checkpoint Topic
//!
//! The allocation saga exposes one extensibility checkpoint, published right
//! before compute resources are materialized. Its topic is described by a
//! [`TopicDefinition`] that the process bootstrap registers once; the saga
//! itself only needs the topic id and the payload/response shapes.
//!
//! ## Notifications
//!
//! Every publication is wrapped in a [`Notification`] envelope carrying the
//! topic, the task it belongs to, the task stage and a payload. Subscribers
//! of a blocking topic answer with a [`CheckpointResponse`].

mod error;
mod notification;
mod topic;

pub use error::EventError;
pub use notification::*;
pub use topic::*;
