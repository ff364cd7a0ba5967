//! Extensibility topic definitions.

use serde::{Deserialize, Serialize};

/// Topic id of the pre-allocation checkpoint.
pub const COMPUTE_ALLOCATION_TOPIC_ID: &str = "compute.allocation.pre";

/// Schema field carrying the generated resource names.
pub const FIELD_RESOURCE_NAMES: &str = "resourceNames";

/// Schema field carrying the assigned host display names.
pub const FIELD_HOST_SELECTIONS: &str = "hostSelections";

/// Value type of a schema field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    Value,
    List,
    Map,
}

/// One field a subscriber may read (and, on blocking topics, write back).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemaField {
    pub name: String,
    pub field_type: FieldType,
    pub data_type: String,
    pub label: String,
    pub description: String,
}

impl SchemaField {
    /// A list-of-strings field.
    pub fn string_list(name: &str, label: &str, description: &str) -> Self {
        Self {
            name: name.to_string(),
            field_type: FieldType::List,
            data_type: "string".to_string(),
            label: label.to_string(),
            description: description.to_string(),
        }
    }
}

/// The task stage a topic is bound to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskBinding {
    /// Task kind, e.g. `ComputeAllocationTask`.
    pub task: String,
    /// Stage name, e.g. `START_COMPUTE_ALLOCATION`.
    pub stage: String,
}

/// A registrable extensibility topic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TopicDefinition {
    pub id: String,
    pub name: String,
    pub description: String,
    /// Whether subscribers hold the task until they answer.
    pub blocking: bool,
    pub binding: TaskBinding,
    pub schema: Vec<SchemaField>,
}

/// The pre-allocation checkpoint topic.
pub fn compute_allocation_topic() -> TopicDefinition {
    TopicDefinition {
        id: COMPUTE_ALLOCATION_TOPIC_ID.to_string(),
        name: "Compute allocation".to_string(),
        description: "Pre allocation for compute resources".to_string(),
        blocking: true,
        binding: TaskBinding {
            task: "ComputeAllocationTask".to_string(),
            stage: "START_COMPUTE_ALLOCATION".to_string(),
        },
        schema: vec![
            SchemaField::string_list(
                FIELD_RESOURCE_NAMES,
                "Generated resource names",
                "Generated resource names",
            ),
            SchemaField::string_list(
                FIELD_HOST_SELECTIONS,
                "Selected hosts",
                "Host selections for resource",
            ),
        ],
    }
}
