//! Typed ID definitions.

use crate::define_id;

// =============================================================================
// Tasks
// =============================================================================

define_id!(TaskId, "calloc");

// =============================================================================
// Extensibility
// =============================================================================

define_id!(NotificationId, "ntf");

// =============================================================================
// Task Document Version
// =============================================================================

/// Monotonic version of a persisted task document.
///
/// Bumped by the task store on every accepted update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TaskVersion(i64);

impl TaskVersion {
    /// Version of a freshly created task document.
    pub const INITIAL: Self = Self(1);

    #[must_use]
    pub const fn new(version: i64) -> Self {
        Self(version)
    }

    #[must_use]
    pub const fn value(&self) -> i64 {
        self.0
    }

    #[must_use]
    pub const fn next(&self) -> Self {
        Self(self.0 + 1)
    }
}

impl Default for TaskVersion {
    fn default() -> Self {
        Self::INITIAL
    }
}

impl std::fmt::Display for TaskVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for TaskVersion {
    fn from(version: i64) -> Self {
        Self(version)
    }
}

impl serde::Serialize for TaskVersion {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_i64(self.0)
    }
}

impl<'de> serde::Deserialize<'de> for TaskVersion {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let version = i64::deserialize(deserializer)?;
        Ok(Self(version))
    }
}

// =============================================================================
// Tests
// =============================================================================
