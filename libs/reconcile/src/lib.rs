//! Allocation reconciliation primitives.
//!
//! Pure building blocks used by the allocation saga:
//!
//! - [`join`]: a fan-out/join counter that turns N independently completing
//!   operations into a single continuation carrying the first failure.
//! - [`sequence`]: the gap-filling resource sequencer that produces a stable
//!   ordering over a context's resources across scale-out and rollback.
//! - [`merge`]: collection and property-map merge policies used when partial
//!   updates are applied to a task document.
//!
//! # Invariants
//!
//! - A join continuation fires exactly once, after every participant reported
//! - Sequencing is deterministic: the output depends only on the input set,
//!   not on the order resources were observed in
//! - Merges never reorder elements that are kept

pub mod join;
pub mod merge;
pub mod sequence;

pub use join::{fan_out, fan_out_channel, Join, JoinError, Participant};
pub use merge::{merge_collection, merge_properties, trim_front, MergePolicy};
pub use sequence::{parse_ordinal, sequence, Sequence, SequenceCandidate, SequenceError};
