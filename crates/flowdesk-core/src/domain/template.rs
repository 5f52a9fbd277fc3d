//! Immutable workflow template definitions.
//!
//! Templates are reusable blueprints: each one describes a workflow
//! shape (ordered step definitions, optional branch targets) plus the
//! tasks those steps should spawn. They are loaded once at process
//! start and never mutated.

use crate::domain::step::{Step, StepId, StepType};
use crate::domain::task::TaskPriority;
use crate::domain::workflow::{WorkflowContext, WorkflowType};
use serde::{Deserialize, Serialize};

/// Value object: Template ID
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TemplateId(pub String);

impl TemplateId {
    /// Create a template id from anything string-like
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl std::fmt::Display for TemplateId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Attribute lists a template matches against during auto-selection
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TemplateMatchRule {
    /// Incident priorities this template applies to (case-insensitive)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub priorities: Vec<String>,

    /// Intake channels this template applies to
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub channels: Vec<String>,

    /// Category ids this template applies to
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub category_ids: Vec<String>,
}

impl TemplateMatchRule {
    /// A rule with no constraints at all (generic-fallback scoring)
    pub fn is_empty(&self) -> bool {
        self.priorities.is_empty() && self.channels.is_empty() && self.category_ids.is_empty()
    }
}

/// Blueprint for a task spawned from a template step
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskTemplate {
    /// Title, may contain `${dotted.path}` placeholders
    pub title: String,

    /// Description, may contain `${dotted.path}` placeholders
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Fixed priority; falls back to the incident priority in context
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<TaskPriority>,

    /// Effort estimate, used for the due date when no SLA is set
    #[serde(skip_serializing_if = "Option::is_none")]
    pub estimated_minutes: Option<f64>,

    /// Labels copied onto the generated task
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
}

/// Per-step template configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TemplateStepConfig {
    /// SLA window in minutes; drives the generated task's due date
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sla_minutes: Option<f64>,
}

/// One step definition inside a template
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplateStep {
    /// Step id, unique within the template
    pub id: StepId,

    /// Human-readable name
    pub name: String,

    /// Optional description
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Execution type
    #[serde(rename = "type")]
    pub step_type: StepType,

    /// Declared assignee (identity token), validated at correlation
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assignee: Option<String>,

    /// Branch targets
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub next_steps: Vec<StepId>,

    /// Template-only configuration; not carried onto runtime steps
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config: Option<TemplateStepConfig>,

    /// Blueprint for the correlated task; not carried onto runtime steps
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_template: Option<TaskTemplate>,
}

impl TemplateStep {
    /// Materialize the runtime step this definition describes.
    /// `task_template` and `config` stay behind on the template where
    /// the task correlator reads them.
    pub fn materialize(&self) -> Step {
        Step {
            id: self.id.clone(),
            name: self.name.clone(),
            description: self.description.clone(),
            step_type: self.step_type,
            assignee: self.assignee.clone(),
            config: None,
            next_steps: self.next_steps.clone(),
            status: Default::default(),
            completed_at: None,
            completed_by: None,
            output: None,
        }
    }

    /// Minutes until the generated task is due: SLA wins, then the
    /// effort estimate; non-positive values yield no due date
    pub fn due_minutes(&self) -> Option<f64> {
        let minutes = self
            .config
            .as_ref()
            .and_then(|config| config.sla_minutes)
            .or_else(|| {
                self.task_template
                    .as_ref()
                    .and_then(|template| template.estimated_minutes)
            })?;
        (minutes > 0.0).then_some(minutes)
    }
}

/// A reusable, immutable workflow blueprint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowTemplate {
    /// Unique identifier
    pub id: TemplateId,

    /// Human-readable name
    pub name: String,

    /// Workflow shape produced by this template
    #[serde(rename = "type")]
    pub workflow_type: WorkflowType,

    /// Kind of case this template handles (currently only "incident")
    pub case_type: String,

    /// Inactive templates are never listed, selected, or instantiated
    pub is_active: bool,

    /// Whether the selector may pick this template automatically
    pub auto_assign: bool,

    /// Selection constraints; absent means generic fallback
    #[serde(skip_serializing_if = "Option::is_none")]
    pub match_rule: Option<TemplateMatchRule>,

    /// Ordered step definitions
    pub steps: Vec<TemplateStep>,

    /// Context seeded into every workflow created from this template
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub default_context: WorkflowContext,
}

/// Slim listing view of a template
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplateSummary {
    /// Template id
    pub id: TemplateId,
    /// Template name
    pub name: String,
    /// Workflow shape
    pub workflow_type: WorkflowType,
    /// Case type
    pub case_type: String,
    /// Auto-selection eligibility
    pub auto_assign: bool,
    /// Number of steps
    pub step_count: usize,
}

impl From<&WorkflowTemplate> for TemplateSummary {
    fn from(template: &WorkflowTemplate) -> Self {
        Self {
            id: template.id.clone(),
            name: template.name.clone(),
            workflow_type: template.workflow_type,
            case_type: template.case_type.clone(),
            auto_assign: template.auto_assign,
            step_count: template.steps.len(),
        }
    }
}
