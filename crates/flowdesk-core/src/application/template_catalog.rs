//! The template catalog: a process-lifetime, immutable registry of
//! workflow templates plus the score-based auto-selector.

use crate::domain::step::{StepId, StepType};
use crate::domain::task::TaskPriority;
use crate::domain::template::{
    TaskTemplate, TemplateId, TemplateMatchRule, TemplateStep, TemplateStepConfig,
    TemplateSummary, WorkflowTemplate,
};
use crate::domain::workflow::WorkflowType;
use crate::CoreError;
use serde_json::json;
use std::collections::HashMap;
use tracing::debug;

/// Incident attributes the selector scores templates against
#[derive(Debug, Clone, Default)]
pub struct SelectionCriteria {
    /// Case type to select for; defaults to `"incident"`
    pub case_type: Option<String>,
    /// Incident priority (matched case-insensitively)
    pub priority: Option<String>,
    /// Intake channel
    pub channel: Option<String>,
    /// Category id
    pub category_id: Option<String>,
}

const DEFAULT_CASE_TYPE: &str = "incident";

/// Read-only lookup table over the loaded templates.
///
/// Built once at process start; lookups are by id or by case-type
/// filter, and [`select`](TemplateCatalog::select) runs the scoring
/// algorithm over the catalog in load order.
pub struct TemplateCatalog {
    templates: Vec<WorkflowTemplate>,
    index: HashMap<TemplateId, usize>,
}

impl TemplateCatalog {
    /// Build a catalog, rejecting duplicate template ids
    pub fn new(templates: Vec<WorkflowTemplate>) -> Result<Self, CoreError> {
        let mut index = HashMap::with_capacity(templates.len());
        for (position, template) in templates.iter().enumerate() {
            if index.insert(template.id.clone(), position).is_some() {
                return Err(CoreError::Validation(format!(
                    "Duplicate template id: {}",
                    template.id
                )));
            }
        }
        Ok(Self { templates, index })
    }

    /// Load a catalog from a JSON document (an array of templates)
    pub fn from_json(document: &str) -> Result<Self, CoreError> {
        let templates: Vec<WorkflowTemplate> = serde_json::from_str(document)?;
        Self::new(templates)
    }

    /// The built-in ITSM catalog used when no deployment-specific
    /// catalog document is supplied
    pub fn builtin() -> Self {
        Self::new(builtin_templates()).expect("builtin template ids are unique")
    }

    /// Summaries of active templates, optionally filtered by case type
    pub fn list(&self, case_type: Option<&str>) -> Vec<TemplateSummary> {
        self.templates
            .iter()
            .filter(|template| template.is_active)
            .filter(|template| case_type.map_or(true, |wanted| template.case_type == wanted))
            .map(TemplateSummary::from)
            .collect()
    }

    /// Look up an active template by id
    pub fn by_id(&self, id: &TemplateId) -> Option<&WorkflowTemplate> {
        self.index
            .get(id)
            .map(|position| &self.templates[*position])
            .filter(|template| template.is_active)
    }

    /// Pick the best-fit auto-assignable template for the criteria.
    ///
    /// Scoring: +4 for a category match, +3 for a priority match
    /// (case-insensitive), +2 for a channel match; a template with no
    /// match constraints at all scores +1 as the generic fallback.
    /// The first template (in load order) with the strictly highest
    /// positive score wins, so selection is deterministic.
    pub fn select(&self, criteria: &SelectionCriteria) -> Option<&WorkflowTemplate> {
        let case_type = criteria.case_type.as_deref().unwrap_or(DEFAULT_CASE_TYPE);

        let mut best: Option<&WorkflowTemplate> = None;
        let mut best_score = 0;
        for template in &self.templates {
            if !template.is_active || !template.auto_assign || template.case_type != case_type {
                continue;
            }
            let score = match_score(template.match_rule.as_ref(), criteria);
            debug!(template = %template.id, score, "Scored template candidate");
            if score > best_score {
                best_score = score;
                best = Some(template);
            }
        }
        best
    }
}

fn match_score(rule: Option<&TemplateMatchRule>, criteria: &SelectionCriteria) -> i32 {
    let rule = match rule {
        Some(rule) if !rule.is_empty() => rule,
        // No constraints at all: generic fallback
        _ => return 1,
    };

    let mut score = 0;
    if let Some(category_id) = &criteria.category_id {
        if rule.category_ids.iter().any(|id| id == category_id) {
            score += 4;
        }
    }
    if let Some(priority) = &criteria.priority {
        if rule
            .priorities
            .iter()
            .any(|candidate| candidate.eq_ignore_ascii_case(priority))
        {
            score += 3;
        }
    }
    if let Some(channel) = &criteria.channel {
        if rule.channels.iter().any(|candidate| candidate == channel) {
            score += 2;
        }
    }
    score
}

fn builtin_templates() -> Vec<WorkflowTemplate> {
    vec![
        WorkflowTemplate {
            id: TemplateId::new("incident-critical-escalation"),
            name: "Critical incident escalation".to_string(),
            workflow_type: WorkflowType::IncidentEscalation,
            case_type: DEFAULT_CASE_TYPE.to_string(),
            is_active: true,
            auto_assign: true,
            match_rule: Some(TemplateMatchRule {
                priorities: vec!["critical".to_string(), "high".to_string()],
                channels: vec!["phone".to_string(), "chat".to_string()],
                category_ids: Vec::new(),
            }),
            steps: vec![
                TemplateStep {
                    id: StepId::new("triage"),
                    name: "Triage".to_string(),
                    description: Some("Assess impact and confirm severity".to_string()),
                    step_type: StepType::Manual,
                    assignee: None,
                    next_steps: vec![StepId::new("mitigate")],
                    config: Some(TemplateStepConfig {
                        sla_minutes: Some(30.0),
                    }),
                    task_template: Some(TaskTemplate {
                        title: "Triage ${incident.ticketNumber}".to_string(),
                        description: Some(
                            "Confirm severity of ${incident.title} and page the on-call team"
                                .to_string(),
                        ),
                        priority: Some(TaskPriority::Critical),
                        estimated_minutes: None,
                        tags: vec!["escalation".to_string()],
                    }),
                },
                TemplateStep {
                    id: StepId::new("mitigate"),
                    name: "Mitigate".to_string(),
                    description: None,
                    step_type: StepType::Manual,
                    assignee: None,
                    next_steps: vec![StepId::new("postmortem")],
                    config: Some(TemplateStepConfig {
                        sla_minutes: Some(120.0),
                    }),
                    task_template: Some(TaskTemplate {
                        title: "Mitigate ${incident.ticketNumber}".to_string(),
                        description: None,
                        priority: Some(TaskPriority::Critical),
                        estimated_minutes: None,
                        tags: vec!["escalation".to_string()],
                    }),
                },
                TemplateStep {
                    id: StepId::new("postmortem"),
                    name: "Postmortem review".to_string(),
                    description: None,
                    step_type: StepType::Approval,
                    assignee: None,
                    next_steps: Vec::new(),
                    config: None,
                    task_template: Some(TaskTemplate {
                        title: "Postmortem for ${incident.ticketNumber}".to_string(),
                        description: None,
                        priority: Some(TaskPriority::Medium),
                        estimated_minutes: Some(480.0),
                        tags: vec!["postmortem".to_string()],
                    }),
                },
            ],
            default_context: serde_json::Map::from_iter([(
                "escalation".to_string(),
                json!(true),
            )]),
        },
        WorkflowTemplate {
            id: TemplateId::new("incident-change-remediation"),
            name: "Change-driven remediation".to_string(),
            workflow_type: WorkflowType::ChangeRequest,
            case_type: DEFAULT_CASE_TYPE.to_string(),
            is_active: true,
            auto_assign: true,
            match_rule: Some(TemplateMatchRule {
                priorities: Vec::new(),
                channels: Vec::new(),
                category_ids: vec!["change".to_string()],
            }),
            steps: vec![
                TemplateStep {
                    id: StepId::new("draft-change"),
                    name: "Draft change request".to_string(),
                    description: None,
                    step_type: StepType::Manual,
                    assignee: None,
                    next_steps: vec![StepId::new("approve-change")],
                    config: None,
                    task_template: Some(TaskTemplate {
                        title: "Draft change for ${incident.ticketNumber}".to_string(),
                        description: None,
                        priority: None,
                        estimated_minutes: Some(60.0),
                        tags: vec!["change".to_string()],
                    }),
                },
                TemplateStep {
                    id: StepId::new("approve-change"),
                    name: "Approve change".to_string(),
                    description: None,
                    step_type: StepType::Approval,
                    assignee: None,
                    next_steps: vec![StepId::new("apply-change")],
                    config: Some(TemplateStepConfig {
                        sla_minutes: Some(240.0),
                    }),
                    task_template: Some(TaskTemplate {
                        title: "Approve change for ${incident.ticketNumber}".to_string(),
                        description: None,
                        priority: None,
                        estimated_minutes: None,
                        tags: vec!["change".to_string(), "approval".to_string()],
                    }),
                },
                TemplateStep {
                    id: StepId::new("apply-change"),
                    name: "Apply change".to_string(),
                    description: None,
                    step_type: StepType::Auto,
                    assignee: None,
                    next_steps: Vec::new(),
                    config: None,
                    task_template: None,
                },
            ],
            default_context: serde_json::Map::new(),
        },
        WorkflowTemplate {
            id: TemplateId::new("incident-triage-generic"),
            name: "Generic incident triage".to_string(),
            workflow_type: WorkflowType::IncidentEscalation,
            case_type: DEFAULT_CASE_TYPE.to_string(),
            is_active: true,
            auto_assign: true,
            match_rule: None,
            steps: vec![
                TemplateStep {
                    id: StepId::new("triage"),
                    name: "Triage".to_string(),
                    description: None,
                    step_type: StepType::Manual,
                    assignee: None,
                    next_steps: vec![StepId::new("resolve")],
                    config: None,
                    task_template: Some(TaskTemplate {
                        title: "Triage ${incident.ticketNumber}".to_string(),
                        description: None,
                        priority: None,
                        estimated_minutes: Some(45.0),
                        tags: Vec::new(),
                    }),
                },
                TemplateStep {
                    id: StepId::new("resolve"),
                    name: "Resolve".to_string(),
                    description: None,
                    step_type: StepType::Manual,
                    assignee: None,
                    next_steps: Vec::new(),
                    config: None,
                    task_template: Some(TaskTemplate {
                        title: "Resolve ${incident.ticketNumber}".to_string(),
                        description: None,
                        priority: None,
                        estimated_minutes: Some(120.0),
                        tags: Vec::new(),
                    }),
                },
            ],
            default_context: serde_json::Map::new(),
        },
    ]
}
