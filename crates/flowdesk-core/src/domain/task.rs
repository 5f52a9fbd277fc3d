use crate::domain::workflow::WorkflowId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Value object: Task ID
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaskId(pub String);

impl TaskId {
    /// Create a task id from anything string-like
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a fresh random id
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle status of a task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Waiting to be worked
    #[default]
    Pending,
    /// Being worked
    InProgress,
    /// Finished
    Completed,
    /// Abandoned
    Cancelled,
}

/// Task priority
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TaskPriority {
    /// Low urgency
    Low,
    /// Default urgency
    #[default]
    Medium,
    /// Elevated urgency
    High,
    /// Drop-everything urgency
    Critical,
}

impl TaskPriority {
    /// Parse a priority name case-insensitively; anything outside
    /// low/medium/high/critical is rejected
    pub fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "low" => Some(Self::Low),
            "medium" => Some(Self::Medium),
            "high" => Some(Self::High),
            "critical" => Some(Self::Critical),
            _ => None,
        }
    }
}

/// A unit of work correlated to a workflow step.
///
/// Tasks are a separate aggregate: `workflow_id` is a weak
/// back-reference for traceability, and deleting the workflow does
/// not cascade here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    /// Unique identifier
    pub id: TaskId,

    /// Short title (already interpolated)
    pub title: String,

    /// Longer description (already interpolated)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Lifecycle status
    pub status: TaskStatus,

    /// Priority
    pub priority: TaskPriority,

    /// Validated assignee identity, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assignee_id: Option<String>,

    /// SLA-derived due date, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub due_at: Option<DateTime<Utc>>,

    /// Weak back-reference to the owning workflow
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workflow_id: Option<WorkflowId>,

    /// Provenance: kind of entity this task was generated from
    pub source_entity_type: String,

    /// Provenance: id of the entity this task was generated from
    pub source_entity_id: String,

    /// Free-form labels from the task template
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,

    /// Correlation metadata (step id/name, template id/name,
    /// correlation type)
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub metadata: serde_json::Map<String, serde_json::Value>,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,
}
