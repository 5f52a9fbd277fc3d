use crate::domain::step::{Step, StepId, StepStatus};
use crate::CoreError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashSet;
use uuid::Uuid;

/// Open key/value context carried by a workflow, merged with data
/// supplied on each transition
pub type WorkflowContext = serde_json::Map<String, serde_json::Value>;

/// Value object: Workflow ID
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WorkflowId(pub String);

impl WorkflowId {
    /// Create a workflow id from anything string-like
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a fresh random id
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl std::fmt::Display for WorkflowId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Business shape of a workflow
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowType {
    /// Escalation path for an incident
    IncidentEscalation,
    /// Approval chain
    Approval,
    /// Change request processing
    ChangeRequest,
    /// Employee/equipment onboarding
    Onboarding,
    /// Employee/equipment offboarding
    Offboarding,
    /// Periodic or post-hoc review
    Review,
}

/// Lifecycle status of a workflow
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    /// Created but no step active yet
    Pending,
    /// Actively executing
    InProgress,
    /// All steps finished
    Completed,
    /// Cancelled by an actor
    Cancelled,
    /// A step was rejected
    Failed,
}

impl WorkflowStatus {
    /// Terminal states reject further advancement
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled | Self::Failed)
    }
}

/// Decision supplied to `advance`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdvanceAction {
    /// Complete the current step and move on
    Approve,
    /// Fail the current step and the workflow
    Reject,
    /// Skip the current step
    Skip,
    /// Skip past the current step to run it again later (analytics
    /// signal only; the engine never retries on its own)
    Retry,
}

/// Input for creating a workflow directly (not from a template)
#[derive(Debug, Clone, Default)]
pub struct WorkflowSpec {
    /// Human-readable name
    pub name: String,
    /// Business shape
    pub workflow_type: Option<WorkflowType>,
    /// Target business object id; a placeholder is generated if absent
    pub entity_id: Option<String>,
    /// Target business object type
    pub entity_type: Option<String>,
    /// Optional weak reference to an incident
    pub incident_id: Option<String>,
    /// Ordered step definitions
    pub steps: Vec<Step>,
    /// Initial context
    pub context: WorkflowContext,
}

/// Aggregate root: a persisted instance of a multi-step process.
///
/// The workflow owns its steps exclusively as an embedded arena
/// (a list addressed by stable step id); `next_steps` entries are
/// adjacency data over that arena. All mutation happens through
/// [`advance`](Workflow::advance), [`rollback`](Workflow::rollback)
/// and [`cancel`](Workflow::cancel), each of which bumps the
/// optimistic `version` counter used by the repository to detect
/// lost updates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workflow {
    /// Unique identifier
    pub id: WorkflowId,

    /// Human-readable name
    pub name: String,

    /// Business shape
    #[serde(rename = "type")]
    pub workflow_type: WorkflowType,

    /// Lifecycle status
    pub status: WorkflowStatus,

    /// The business object this workflow targets
    pub entity_id: String,

    /// Type of the targeted business object
    pub entity_type: String,

    /// Optional weak reference to an incident
    #[serde(skip_serializing_if = "Option::is_none")]
    pub incident_id: Option<String>,

    /// The active step, or `None` when none remain
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_step_id: Option<StepId>,

    /// Embedded, ordered step arena
    pub steps: Vec<Step>,

    /// Open key/value context used for interpolation and analytics
    #[serde(default)]
    pub context: WorkflowContext,

    /// Optimistic concurrency counter, bumped on every mutation
    pub version: u64,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Last-updated timestamp
    pub updated_at: DateTime<Utc>,

    /// Completion timestamp, if the workflow ran to the end
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl Workflow {
    /// Create and initialize a workflow from a validated spec.
    ///
    /// Fails with [`CoreError::Validation`] if the step set is empty,
    /// a step id repeats, or a `next_steps` entry does not resolve.
    /// The first step is promoted to `in_progress` and becomes the
    /// current step.
    pub fn new(spec: WorkflowSpec) -> Result<Self, CoreError> {
        Self::validate_steps(&spec.steps)?;

        let mut steps = spec.steps;
        for (index, step) in steps.iter_mut().enumerate() {
            step.status = if index == 0 {
                StepStatus::InProgress
            } else {
                StepStatus::Pending
            };
        }
        let first_step_id = steps[0].id.clone();

        let id = WorkflowId::generate();
        let entity_id = spec
            .entity_id
            .unwrap_or_else(|| format!("workflow-{}", id.0));
        let now = Utc::now();

        Ok(Self {
            id,
            name: spec.name,
            workflow_type: spec.workflow_type.unwrap_or(WorkflowType::Review),
            status: WorkflowStatus::InProgress,
            entity_id,
            entity_type: spec.entity_type.unwrap_or_else(|| "workflow".to_string()),
            incident_id: spec.incident_id,
            current_step_id: Some(first_step_id),
            steps,
            context: spec.context,
            version: 1,
            created_at: now,
            updated_at: now,
            completed_at: None,
        })
    }

    /// Validate a step set: non-empty, unique ids, every `next_steps`
    /// entry resolves to a known id
    pub fn validate_steps(steps: &[Step]) -> Result<(), CoreError> {
        if steps.is_empty() {
            return Err(CoreError::Validation(
                "Workflow must have at least one step".to_string(),
            ));
        }

        let mut step_ids = HashSet::new();
        for step in steps {
            if !step_ids.insert(&step.id) {
                return Err(CoreError::Validation(format!(
                    "Duplicate step id: {}",
                    step.id
                )));
            }
        }

        for step in steps {
            for next in &step.next_steps {
                if !step_ids.contains(next) {
                    return Err(CoreError::Validation(format!(
                        "Step {} references unknown next step: {}",
                        step.id, next
                    )));
                }
            }
        }

        Ok(())
    }

    /// Position of a step in the arena
    pub fn step_index(&self, id: &StepId) -> Option<usize> {
        self.steps.iter().position(|step| &step.id == id)
    }

    /// Look up a step by id
    pub fn step(&self, id: &StepId) -> Option<&Step> {
        self.steps.iter().find(|step| &step.id == id)
    }

    /// Advance the state machine by closing the current step.
    ///
    /// `approve` completes the step, `reject` fails it, `skip` and
    /// `retry` mark it skipped. The next step defaults to the one
    /// immediately following in sequence; an explicit `next_step_id`
    /// overrides that for `approve`/`skip` only. When no next step
    /// exists the workflow completes; `reject` always leaves the
    /// workflow `failed`.
    pub fn advance(
        &mut self,
        action: AdvanceAction,
        actor: &str,
        comment: Option<&str>,
        data: Option<WorkflowContext>,
        next_step_id: Option<&StepId>,
    ) -> Result<(), CoreError> {
        if self.status.is_terminal() {
            return Err(CoreError::InvalidState(format!(
                "Cannot advance workflow in status {:?}",
                self.status
            )));
        }

        let current_id = self.current_step_id.clone().ok_or_else(|| {
            CoreError::InvalidState("Workflow has no active step".to_string())
        })?;
        let current_index = self.step_index(&current_id).ok_or_else(|| {
            CoreError::InvalidState(format!(
                "Current step {} is missing from the workflow",
                current_id
            ))
        })?;

        let next_index = match action {
            AdvanceAction::Approve | AdvanceAction::Skip => match next_step_id {
                Some(target) => Some(self.step_index(target).ok_or_else(|| {
                    CoreError::NotFound(format!("Next step not found: {}", target))
                })?),
                None => (current_index + 1 < self.steps.len()).then_some(current_index + 1),
            },
            // Reject and retry fall back to strict sequence order
            _ => (current_index + 1 < self.steps.len()).then_some(current_index + 1),
        };

        let now = Utc::now();
        let current = &mut self.steps[current_index];
        current.status = match action {
            AdvanceAction::Approve => StepStatus::Completed,
            AdvanceAction::Reject => StepStatus::Failed,
            AdvanceAction::Skip | AdvanceAction::Retry => StepStatus::Skipped,
        };
        current.completed_at = Some(now);
        current.completed_by = Some(actor.to_string());

        let mut output = data.clone().unwrap_or_default();
        if let Some(comment) = comment {
            output.insert("comment".to_string(), json!(comment));
        }
        if !output.is_empty() {
            current.output = Some(serde_json::Value::Object(output));
        }

        match next_index {
            Some(index) => {
                self.steps[index].status = StepStatus::InProgress;
                self.current_step_id = Some(self.steps[index].id.clone());
            }
            None => {
                self.current_step_id = None;
                self.status = WorkflowStatus::Completed;
                self.completed_at = Some(now);
            }
        }

        if action == AdvanceAction::Reject {
            self.status = WorkflowStatus::Failed;
        }

        if let Some(data) = data {
            self.merge_context(data);
        }

        self.touch();
        Ok(())
    }

    /// Roll the workflow back to a previous (or current) step.
    ///
    /// The target step becomes `in_progress`, everything after it is
    /// reset to `pending`, and steps before it are left untouched.
    /// Idempotent for a fixed target.
    pub fn rollback(
        &mut self,
        target: &StepId,
        actor: &str,
        reason: Option<&str>,
    ) -> Result<(), CoreError> {
        let target_index = self
            .step_index(target)
            .ok_or_else(|| CoreError::NotFound(format!("Step not found: {}", target)))?;

        for index in target_index..self.steps.len() {
            self.steps[index].reset();
        }
        self.steps[target_index].status = StepStatus::InProgress;

        self.current_step_id = Some(target.clone());
        self.status = WorkflowStatus::InProgress;
        self.completed_at = None;

        if let Some(reason) = reason {
            self.context
                .insert("rollbackReason".to_string(), json!(reason));
        }
        self.context.insert("rolledBackBy".to_string(), json!(actor));
        self.context
            .insert("rolledBackAt".to_string(), json!(Utc::now().to_rfc3339()));

        self.touch();
        Ok(())
    }

    /// Cancel the workflow. Disallowed once completed; step statuses
    /// are left as they are.
    pub fn cancel(&mut self, actor: &str, reason: &str) -> Result<(), CoreError> {
        if self.status == WorkflowStatus::Completed {
            return Err(CoreError::InvalidState(
                "Cannot cancel a completed workflow".to_string(),
            ));
        }

        self.status = WorkflowStatus::Cancelled;
        self.context
            .insert("cancellationReason".to_string(), json!(reason));
        self.context.insert("cancelledBy".to_string(), json!(actor));
        self.context
            .insert("cancelledAt".to_string(), json!(Utc::now().to_rfc3339()));

        self.touch();
        Ok(())
    }

    /// Shallow-merge transition data into the context; caller data
    /// wins on key collision
    pub fn merge_context(&mut self, data: WorkflowContext) {
        for (key, value) in data {
            self.context.insert(key, value);
        }
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
        self.version += 1;
    }
}
