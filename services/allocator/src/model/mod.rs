//! Domain model: the task record, the documents it works on, and the
//! custom property keys that tie them together.

pub mod properties;
mod resources;
mod task;

pub use resources::*;
pub use task::*;
