use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Value object: Step ID, unique within its owning workflow
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StepId(pub String);

impl StepId {
    /// Create a step id from anything string-like
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl std::fmt::Display for StepId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// How a step is executed (by whom the eventual `advance` call comes)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepType {
    /// Executed by the system without human action
    Auto,
    /// Executed by a human operator
    Manual,
    /// Requires an explicit approval decision
    Approval,
}

/// Runtime status of a step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    /// Not yet reached
    #[default]
    Pending,
    /// The active step, waiting on an `advance` call
    InProgress,
    /// Approved and finished
    Completed,
    /// Rejected
    Failed,
    /// Skipped or retried past
    Skipped,
}

impl StepStatus {
    /// Terminal step states are set only by the state machine
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Skipped)
    }
}

/// One node in a workflow's ordered, branchable step sequence.
///
/// Steps are embedded in the owning [`Workflow`](super::workflow::Workflow)
/// aggregate and mutated only through it; `next_steps` is adjacency data
/// over the workflow's step arena, not a live object graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Step {
    /// Identifier, unique within the workflow
    pub id: StepId,

    /// Human-readable name
    pub name: String,

    /// Optional description
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Execution type
    #[serde(rename = "type")]
    pub step_type: StepType,

    /// Declared assignee (identity token), if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assignee: Option<String>,

    /// Free-form step configuration
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config: Option<serde_json::Value>,

    /// Branch targets: ids of steps this step may hand off to
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub next_steps: Vec<StepId>,

    /// Runtime status
    #[serde(default)]
    pub status: StepStatus,

    /// When the step reached a terminal state
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,

    /// Actor that drove the step to a terminal state
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_by: Option<String>,

    /// Free-form result payload supplied on the closing transition
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<serde_json::Value>,
}

impl Step {
    /// Create a new pending step with no runtime state
    pub fn new(id: impl Into<String>, name: impl Into<String>, step_type: StepType) -> Self {
        Self {
            id: StepId::new(id),
            name: name.into(),
            description: None,
            step_type,
            assignee: None,
            config: None,
            next_steps: Vec::new(),
            status: StepStatus::Pending,
            completed_at: None,
            completed_by: None,
            output: None,
        }
    }

    /// Set the description
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Set the declared assignee
    pub fn with_assignee(mut self, assignee: impl Into<String>) -> Self {
        self.assignee = Some(assignee.into());
        self
    }

    /// Set the branch targets
    pub fn with_next_steps(mut self, next_steps: Vec<StepId>) -> Self {
        self.next_steps = next_steps;
        self
    }

    /// Clear all runtime fields and return the step to `pending`.
    /// Used by rollback.
    pub(crate) fn reset(&mut self) {
        self.status = StepStatus::Pending;
        self.completed_at = None;
        self.completed_by = None;
        self.output = None;
    }
}
