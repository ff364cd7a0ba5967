//! # vmalloc-id
//!
//! Typed identifiers and document links for the vmalloc allocator.
//!
//! ## ID Format
//!
//! Task-level identifiers use a prefixed format: `{prefix}_{ulid}`
//!
//! Examples:
//! - `calloc_01HV4Z2WQXKJNM8GPQY6VBKC3D`
//! - `ntf_01HV4Z3MXNKPQR9HSTZ7WCLD4E`
//!
//! ## Document Links
//!
//! Every record the allocator reads or writes (pools, templates, disks,
//! network interfaces, compute resources) is addressed by a self-link: an
//! absolute, slash-separated path such as `/resources/compute/web-01`.
//! The [`links`] module holds the small set of helpers for building and
//! inspecting those paths.

mod error;
pub mod links;
mod macros;
mod types;

pub use error::{decode_prefixed, IdError};
pub use types::*;

pub use ulid::Ulid;

#[doc(hidden)]
pub use serde as __serde;
