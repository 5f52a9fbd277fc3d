//! Task correlation: turning a template's task blueprints into
//! concrete tasks bound to a freshly created workflow.

use crate::domain::repository::IdentityDirectory;
use crate::domain::task::{Task, TaskId, TaskPriority, TaskStatus};
use crate::domain::template::WorkflowTemplate;
use crate::domain::workflow::{Workflow, WorkflowContext};
use crate::CoreError;
use chrono::{Duration, Utc};
use serde_json::{json, Value};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

/// Generates the tasks a template's steps call for.
///
/// Assignees are resolved defensively: a declared assignee only lands
/// on a task after the [`IdentityDirectory`] confirms it belongs to
/// the organization, so a stale identity in a template degrades to an
/// unassigned task instead of failing workflow creation.
pub struct TaskCorrelator {
    identity: Arc<dyn IdentityDirectory>,
}

impl TaskCorrelator {
    /// Create a correlator backed by the given identity directory
    pub fn new(identity: Arc<dyn IdentityDirectory>) -> Self {
        Self { identity }
    }

    /// Build one task per template step that carries a task blueprint.
    ///
    /// Titles and descriptions are interpolated against the workflow
    /// context, the first generated task starts `in_progress` (the
    /// rest are pending), and due dates derive from each step's SLA
    /// or effort estimate.
    pub async fn correlate(
        &self,
        template: &WorkflowTemplate,
        workflow: &Workflow,
    ) -> Result<Vec<Task>, CoreError> {
        let verified = self.verified_assignees(template, &workflow.context).await?;
        let fallback_assignee = context_assignee(&workflow.context)
            .filter(|candidate| verified.contains(candidate));

        let now = Utc::now();
        let mut tasks = Vec::new();
        for step in &template.steps {
            let blueprint = match &step.task_template {
                Some(blueprint) => blueprint,
                None => continue,
            };

            let assignee_id = step
                .assignee
                .as_ref()
                .filter(|candidate| verified.contains(candidate.as_str()))
                .cloned()
                .or_else(|| fallback_assignee.clone());

            let priority = blueprint
                .priority
                .or_else(|| context_incident_priority(&workflow.context))
                .unwrap_or_default();

            let due_at = step
                .due_minutes()
                .map(|minutes| now + Duration::seconds((minutes * 60.0) as i64));

            let description = blueprint
                .description
                .as_ref()
                .map(|text| interpolate(text, &workflow.context))
                .filter(|text| !text.is_empty());

            tasks.push(Task {
                id: TaskId::generate(),
                title: interpolate(&blueprint.title, &workflow.context),
                description,
                status: TaskStatus::Pending,
                priority,
                assignee_id,
                due_at,
                workflow_id: Some(workflow.id.clone()),
                source_entity_type: "workflow".to_string(),
                source_entity_id: workflow.id.0.clone(),
                tags: blueprint.tags.clone(),
                metadata: serde_json::Map::from_iter([
                    ("workflowStepId".to_string(), json!(step.id.0)),
                    ("workflowStepName".to_string(), json!(step.name)),
                    ("workflowTemplateId".to_string(), json!(template.id.0)),
                    ("workflowTemplateName".to_string(), json!(template.name)),
                    ("correlationType".to_string(), json!("workflow_step")),
                ]),
                created_at: now,
            });
        }
        if let Some(first) = tasks.first_mut() {
            first.status = TaskStatus::InProgress;
        }
        debug!(
            workflow = %workflow.id,
            template = %template.id,
            count = tasks.len(),
            "Correlated tasks for workflow"
        );
        Ok(tasks)
    }

    /// One directory round-trip for every UUID-shaped candidate
    async fn verified_assignees(
        &self,
        template: &WorkflowTemplate,
        context: &WorkflowContext,
    ) -> Result<HashSet<String>, CoreError> {
        let mut candidates: Vec<String> = template
            .steps
            .iter()
            .filter_map(|step| step.assignee.clone())
            .collect();
        if let Some(candidate) = context_assignee(context) {
            candidates.push(candidate);
        }
        candidates.retain(|candidate| Uuid::parse_str(candidate).is_ok());
        candidates.sort();
        candidates.dedup();

        if candidates.is_empty() {
            return Ok(HashSet::new());
        }
        self.identity.verify_members(&candidates).await
    }
}

fn context_assignee(context: &WorkflowContext) -> Option<String> {
    context
        .get("assigneeId")
        .and_then(Value::as_str)
        .map(str::to_string)
}

fn context_incident_priority(context: &WorkflowContext) -> Option<TaskPriority> {
    context
        .get("incident")
        .and_then(|incident| incident.get("priority"))
        .and_then(Value::as_str)
        .and_then(TaskPriority::parse)
}

/// Replace every `${dotted.path}` placeholder with the string value at
/// that path in the context. Missing paths and non-string values
/// become the empty string; the result is trimmed.
pub fn interpolate(template: &str, context: &WorkflowContext) -> String {
    let mut output = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find("${") {
        output.push_str(&rest[..start]);
        let after_open = &rest[start + 2..];
        match after_open.find('}') {
            Some(end) => {
                let path = &after_open[..end];
                if let Some(value) = lookup_path(context, path).and_then(Value::as_str) {
                    output.push_str(value);
                }
                rest = &after_open[end + 1..];
            }
            // Unclosed placeholder: keep the literal text
            None => {
                output.push_str(&rest[start..]);
                rest = "";
            }
        }
    }
    output.push_str(rest);
    output.trim().to_string()
}

fn lookup_path<'a>(context: &'a WorkflowContext, path: &str) -> Option<&'a Value> {
    let mut segments = path.split('.');
    let mut current = context.get(segments.next()?)?;
    for segment in segments {
        current = current.as_object()?.get(segment)?;
    }
    Some(current)
}
