//! vmalloc compute allocator.
//!
//! This crate ships the `allocator` binary; the library surface exposes the
//! saga, its collaborator traits and the task stores for integration testing.

pub mod collaborators;
pub mod config;
pub mod db;
pub mod error;
pub mod model;
pub mod saga;
pub mod store;
pub mod topics;
pub mod worker;
