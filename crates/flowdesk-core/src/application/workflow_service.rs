//! Application service coordinating workflow lifecycle operations.
//!
//! This is the single entry point callers use: it loads aggregates,
//! delegates state transitions to the domain, persists the result with
//! optimistic concurrency, and appends best-effort audit records.

use crate::application::task_correlator::TaskCorrelator;
use crate::application::template_catalog::{SelectionCriteria, TemplateCatalog};
use crate::domain::audit::AuditRecord;
use crate::domain::repository::{
    AuditSink, TaskRepository, WorkflowFilter, WorkflowRepository, WorkflowUnitOfWork,
};
use crate::domain::step::StepId;
use crate::domain::task::Task;
use crate::domain::template::{TemplateId, TemplateStep, WorkflowTemplate};
use crate::domain::workflow::{
    AdvanceAction, Workflow, WorkflowContext, WorkflowId, WorkflowSpec,
};
use crate::CoreError;
use serde_json::json;
use std::sync::Arc;
use tracing::{info, warn};

/// Caller-supplied overrides applied when instantiating a template
#[derive(Debug, Clone, Default)]
pub struct TemplateOverrides {
    /// Replace the template's name
    pub name: Option<String>,
    /// Target business object id
    pub entity_id: Option<String>,
    /// Target business object type
    pub entity_type: Option<String>,
    /// Weak reference to an incident
    pub incident_id: Option<String>,
    /// Context merged over the template's defaults (caller wins)
    pub context: WorkflowContext,
    /// Set to `false` to instantiate without generating tasks
    pub correlate_tasks: bool,
}

impl TemplateOverrides {
    /// Overrides that change nothing and correlate tasks
    pub fn none() -> Self {
        Self {
            correlate_tasks: true,
            ..Default::default()
        }
    }
}

/// One `advance` request
#[derive(Debug, Clone)]
pub struct AdvanceCommand {
    /// The decision for the current step
    pub action: AdvanceAction,
    /// Who decided
    pub actor: String,
    /// Free-form note stored in the step output
    pub comment: Option<String>,
    /// Transition data merged into the workflow context
    pub data: Option<WorkflowContext>,
    /// Explicit branch target (honored for approve/skip only)
    pub next_step_id: Option<StepId>,
}

impl AdvanceCommand {
    /// A bare command with just an action and an actor
    pub fn new(action: AdvanceAction, actor: impl Into<String>) -> Self {
        Self {
            action,
            actor: actor.into(),
            comment: None,
            data: None,
            next_step_id: None,
        }
    }
}

/// Incident attributes driving template auto-selection
#[derive(Debug, Clone)]
pub struct IncidentAttributes {
    /// Incident id
    pub id: String,
    /// Human-facing ticket number, e.g. `INC-1001`
    pub ticket_number: String,
    /// Short incident title
    pub title: String,
    /// Incident priority name
    pub priority: Option<String>,
    /// Intake channel
    pub channel: Option<String>,
    /// Category id
    pub category_id: Option<String>,
}

/// The workflow engine facade.
pub struct WorkflowService {
    workflows: Arc<dyn WorkflowRepository>,
    tasks: Arc<dyn TaskRepository>,
    unit_of_work: Arc<dyn WorkflowUnitOfWork>,
    catalog: Arc<TemplateCatalog>,
    correlator: TaskCorrelator,
    audit: Arc<dyn AuditSink>,
}

impl WorkflowService {
    /// Wire up the service from its collaborators
    pub fn new(
        workflows: Arc<dyn WorkflowRepository>,
        tasks: Arc<dyn TaskRepository>,
        unit_of_work: Arc<dyn WorkflowUnitOfWork>,
        catalog: Arc<TemplateCatalog>,
        correlator: TaskCorrelator,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        Self {
            workflows,
            tasks,
            unit_of_work,
            catalog,
            correlator,
            audit,
        }
    }

    /// The template catalog backing this service
    pub fn catalog(&self) -> &TemplateCatalog {
        &self.catalog
    }

    /// Create a workflow directly from a spec, without a template
    pub async fn create_workflow(
        &self,
        spec: WorkflowSpec,
        actor: &str,
    ) -> Result<Workflow, CoreError> {
        let workflow = Workflow::new(spec)?;
        self.workflows.insert(&workflow).await?;
        info!(workflow = %workflow.id, name = %workflow.name, "Created workflow");
        self.record(
            AuditRecord::new("workflow.created", "workflow", workflow.id.0.clone())
                .with_metadata("actor", json!(actor)),
        )
        .await;
        Ok(workflow)
    }

    /// Instantiate a template: materialize its steps, merge context
    /// (caller overrides win over template defaults), correlate tasks,
    /// and persist workflow plus tasks atomically.
    pub async fn create_from_template(
        &self,
        template_id: &TemplateId,
        overrides: TemplateOverrides,
        actor: &str,
    ) -> Result<(Workflow, Vec<Task>), CoreError> {
        let template = self
            .catalog
            .by_id(template_id)
            .ok_or_else(|| CoreError::NotFound(format!("Template not found: {}", template_id)))?;
        let (workflow, tasks) = self.instantiate(template, overrides, actor).await?;
        Ok((workflow, tasks))
    }

    /// Auto-select a template for the incident and instantiate it.
    ///
    /// Returns `Ok(None)` when no template scores: an unmatched
    /// incident is a normal outcome, not an error. The created
    /// workflow's context is seeded with an `incident` snapshot used
    /// by task interpolation.
    pub async fn auto_assign_from_incident(
        &self,
        incident: &IncidentAttributes,
    ) -> Result<Option<(Workflow, Vec<Task>)>, CoreError> {
        let criteria = SelectionCriteria {
            case_type: None,
            priority: incident.priority.clone(),
            channel: incident.channel.clone(),
            category_id: incident.category_id.clone(),
        };
        let template = match self.catalog.select(&criteria) {
            Some(template) => template,
            None => {
                info!(incident = %incident.id, "No workflow template matched incident");
                return Ok(None);
            }
        };
        info!(
            incident = %incident.id,
            template = %template.id,
            "Auto-selected workflow template"
        );

        let mut context = WorkflowContext::new();
        context.insert(
            "incident".to_string(),
            json!({
                "id": incident.id,
                "ticketNumber": incident.ticket_number,
                "title": incident.title,
                "priority": incident.priority,
                "channel": incident.channel,
                "categoryId": incident.category_id,
            }),
        );
        context.insert("incidentId".to_string(), json!(incident.id));
        context.insert("entityId".to_string(), json!(incident.id));

        let overrides = TemplateOverrides {
            name: Some(format!("{} - {}", template.name, incident.ticket_number)),
            entity_id: Some(incident.id.clone()),
            entity_type: Some("incident".to_string()),
            incident_id: Some(incident.id.clone()),
            context,
            correlate_tasks: true,
        };
        let created = self.instantiate(template, overrides, "system").await?;
        Ok(Some(created))
    }

    async fn instantiate(
        &self,
        template: &WorkflowTemplate,
        overrides: TemplateOverrides,
        actor: &str,
    ) -> Result<(Workflow, Vec<Task>), CoreError> {
        let mut context = template.default_context.clone();
        for (key, value) in overrides.context {
            context.insert(key, value);
        }

        let workflow = Workflow::new(WorkflowSpec {
            name: overrides.name.unwrap_or_else(|| template.name.clone()),
            workflow_type: Some(template.workflow_type),
            entity_id: overrides.entity_id,
            entity_type: overrides.entity_type,
            incident_id: overrides.incident_id,
            steps: template.steps.iter().map(TemplateStep::materialize).collect(),
            context,
        })?;

        let tasks = if overrides.correlate_tasks {
            self.correlator.correlate(template, &workflow).await?
        } else {
            Vec::new()
        };

        self.unit_of_work
            .create_workflow_with_tasks(&workflow, &tasks)
            .await?;
        info!(
            workflow = %workflow.id,
            template = %template.id,
            tasks = tasks.len(),
            "Instantiated workflow from template"
        );
        self.record(
            AuditRecord::new("workflow.created", "workflow", workflow.id.0.clone())
                .with_metadata("actor", json!(actor))
                .with_metadata("templateId", json!(template.id.0))
                .with_metadata("taskCount", json!(tasks.len())),
        )
        .await;
        Ok((workflow, tasks))
    }

    /// Advance a workflow's current step and persist the result
    pub async fn advance_workflow(
        &self,
        id: &WorkflowId,
        command: AdvanceCommand,
    ) -> Result<Workflow, CoreError> {
        let mut workflow = self.get_workflow(id).await?;
        let closed_step = workflow.current_step_id.clone();
        workflow.advance(
            command.action,
            &command.actor,
            command.comment.as_deref(),
            command.data,
            command.next_step_id.as_ref(),
        )?;
        self.workflows.update(&workflow).await?;
        info!(
            workflow = %workflow.id,
            action = ?command.action,
            status = ?workflow.status,
            "Advanced workflow"
        );
        let mut record =
            AuditRecord::new("workflow.advanced", "workflow", workflow.id.0.clone())
                .with_metadata("actor", json!(command.actor))
                .with_metadata("action", json!(format!("{:?}", command.action)))
                .with_metadata("stepId", json!(closed_step.map(|step| step.0)));
        if let Some(comment) = &command.comment {
            record = record.with_metadata("comment", json!(comment));
        }
        self.record(record).await;
        Ok(workflow)
    }

    /// Roll a workflow back to an earlier step and persist the result
    pub async fn rollback_workflow(
        &self,
        id: &WorkflowId,
        target: &StepId,
        actor: &str,
        reason: Option<&str>,
    ) -> Result<Workflow, CoreError> {
        let mut workflow = self.get_workflow(id).await?;
        workflow.rollback(target, actor, reason)?;
        self.workflows.update(&workflow).await?;
        info!(workflow = %workflow.id, step = %target, "Rolled back workflow");
        self.record(
            AuditRecord::new("workflow.rolled_back", "workflow", workflow.id.0.clone())
                .with_metadata("actor", json!(actor))
                .with_metadata("stepId", json!(target.0)),
        )
        .await;
        Ok(workflow)
    }

    /// Cancel a workflow and persist the result
    pub async fn cancel_workflow(
        &self,
        id: &WorkflowId,
        actor: &str,
        reason: &str,
    ) -> Result<Workflow, CoreError> {
        let mut workflow = self.get_workflow(id).await?;
        workflow.cancel(actor, reason)?;
        self.workflows.update(&workflow).await?;
        info!(workflow = %workflow.id, "Cancelled workflow");
        self.record(
            AuditRecord::new("workflow.cancelled", "workflow", workflow.id.0.clone())
                .with_metadata("actor", json!(actor))
                .with_metadata("reason", json!(reason)),
        )
        .await;
        Ok(workflow)
    }

    /// Delete a workflow. Correlated tasks survive; their
    /// back-reference simply stops resolving.
    pub async fn delete_workflow(&self, id: &WorkflowId, actor: &str) -> Result<(), CoreError> {
        self.workflows.delete(id).await?;
        info!(workflow = %id, "Deleted workflow");
        self.record(
            AuditRecord::new("workflow.deleted", "workflow", id.0.clone())
                .with_metadata("actor", json!(actor)),
        )
        .await;
        Ok(())
    }

    /// Fetch a workflow or fail with [`CoreError::NotFound`]
    pub async fn get_workflow(&self, id: &WorkflowId) -> Result<Workflow, CoreError> {
        self.workflows
            .find_by_id(id)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("Workflow not found: {}", id)))
    }

    /// List workflows matching the filter
    pub async fn list_workflows(&self, filter: &WorkflowFilter) -> Result<Vec<Workflow>, CoreError> {
        self.workflows.list(filter).await
    }

    /// Tasks correlated to a workflow
    pub async fn tasks_for_workflow(&self, id: &WorkflowId) -> Result<Vec<Task>, CoreError> {
        self.tasks.find_for_workflow(id).await
    }

    /// Audit writes never fail the primary operation
    async fn record(&self, record: AuditRecord) {
        if let Err(error) = self.audit.append(record).await {
            warn!(%error, "Audit sink rejected record");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::repository::IdentityDirectory;
    use crate::domain::step::{Step, StepType};
    use crate::domain::workflow::WorkflowStatus;
    use async_trait::async_trait;
    use chrono::{DateTime, Utc};
    use pretty_assertions::assert_eq;
    use std::collections::{HashMap, HashSet};
    use std::sync::Mutex;

    #[derive(Default)]
    struct MemStore {
        workflows: Mutex<HashMap<String, Workflow>>,
        tasks: Mutex<Vec<Task>>,
        fail_task_insert: bool,
    }

    #[async_trait]
    impl WorkflowRepository for MemStore {
        async fn find_by_id(&self, id: &WorkflowId) -> Result<Option<Workflow>, CoreError> {
            Ok(self.workflows.lock().unwrap().get(&id.0).cloned())
        }

        async fn insert(&self, workflow: &Workflow) -> Result<(), CoreError> {
            self.workflows
                .lock()
                .unwrap()
                .insert(workflow.id.0.clone(), workflow.clone());
            Ok(())
        }

        async fn update(&self, workflow: &Workflow) -> Result<(), CoreError> {
            let mut workflows = self.workflows.lock().unwrap();
            let stored = workflows
                .get(&workflow.id.0)
                .ok_or_else(|| CoreError::NotFound(workflow.id.0.clone()))?;
            if stored.version + 1 != workflow.version {
                return Err(CoreError::Conflict("stale version".to_string()));
            }
            workflows.insert(workflow.id.0.clone(), workflow.clone());
            Ok(())
        }

        async fn delete(&self, id: &WorkflowId) -> Result<(), CoreError> {
            self.workflows.lock().unwrap().remove(&id.0);
            Ok(())
        }

        async fn list(&self, filter: &WorkflowFilter) -> Result<Vec<Workflow>, CoreError> {
            Ok(self
                .workflows
                .lock()
                .unwrap()
                .values()
                .filter(|workflow| filter.matches(workflow))
                .cloned()
                .collect())
        }

        async fn find_updated_since(
            &self,
            cutoff: DateTime<Utc>,
        ) -> Result<Vec<Workflow>, CoreError> {
            Ok(self
                .workflows
                .lock()
                .unwrap()
                .values()
                .filter(|workflow| workflow.updated_at >= cutoff)
                .cloned()
                .collect())
        }
    }

    #[async_trait]
    impl TaskRepository for MemStore {
        async fn insert_many(&self, tasks: &[Task]) -> Result<(), CoreError> {
            if self.fail_task_insert {
                return Err(CoreError::Store("task insert failed".to_string()));
            }
            self.tasks.lock().unwrap().extend_from_slice(tasks);
            Ok(())
        }

        async fn find_for_workflow(&self, workflow_id: &WorkflowId) -> Result<Vec<Task>, CoreError> {
            Ok(self
                .tasks
                .lock()
                .unwrap()
                .iter()
                .filter(|task| task.workflow_id.as_ref() == Some(workflow_id))
                .cloned()
                .collect())
        }
    }

    #[async_trait]
    impl WorkflowUnitOfWork for MemStore {
        async fn create_workflow_with_tasks(
            &self,
            workflow: &Workflow,
            tasks: &[Task],
        ) -> Result<(), CoreError> {
            self.insert_many(tasks).await?;
            self.insert(workflow).await
        }
    }

    struct OpenDirectory;

    #[async_trait]
    impl IdentityDirectory for OpenDirectory {
        async fn verify_members(
            &self,
            candidates: &[String],
        ) -> Result<HashSet<String>, CoreError> {
            Ok(candidates.iter().cloned().collect())
        }
    }

    struct NullSink;

    #[async_trait]
    impl AuditSink for NullSink {
        async fn append(&self, _record: AuditRecord) -> Result<(), CoreError> {
            Ok(())
        }
    }

    fn service_over(store: Arc<MemStore>) -> WorkflowService {
        WorkflowService::new(
            store.clone(),
            store.clone(),
            store,
            Arc::new(TemplateCatalog::builtin()),
            TaskCorrelator::new(Arc::new(OpenDirectory)),
            Arc::new(NullSink),
        )
    }

    fn incident(priority: &str, channel: &str) -> IncidentAttributes {
        IncidentAttributes {
            id: "inc-1".to_string(),
            ticket_number: "INC-1001".to_string(),
            title: "Database outage".to_string(),
            priority: Some(priority.to_string()),
            channel: Some(channel.to_string()),
            category_id: None,
        }
    }

    #[tokio::test]
    async fn test_create_from_template_persists_workflow_and_tasks() {
        let store = Arc::new(MemStore::default());
        let service = service_over(store.clone());

        let (workflow, tasks) = service
            .create_from_template(
                &TemplateId::new("incident-critical-escalation"),
                TemplateOverrides::none(),
                "alice",
            )
            .await
            .unwrap();

        assert_eq!(workflow.status, WorkflowStatus::InProgress);
        assert_eq!(tasks.len(), 3);
        assert_eq!(service.get_workflow(&workflow.id).await.unwrap().version, 1);
        assert_eq!(
            service.tasks_for_workflow(&workflow.id).await.unwrap().len(),
            3
        );
        // Template default context survives instantiation
        assert_eq!(workflow.context["escalation"], json!(true));
    }

    #[tokio::test]
    async fn test_create_from_unknown_template_is_not_found() {
        let service = service_over(Arc::new(MemStore::default()));
        let result = service
            .create_from_template(
                &TemplateId::new("missing"),
                TemplateOverrides::none(),
                "alice",
            )
            .await;
        assert!(matches!(result, Err(CoreError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_failed_task_insert_creates_no_workflow() {
        let store = Arc::new(MemStore {
            fail_task_insert: true,
            ..Default::default()
        });
        let service = service_over(store.clone());

        let result = service
            .create_from_template(
                &TemplateId::new("incident-critical-escalation"),
                TemplateOverrides::none(),
                "alice",
            )
            .await;
        assert!(matches!(result, Err(CoreError::Store(_))));
        assert!(store.workflows.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_auto_assign_matches_and_seeds_incident_context() {
        let service = service_over(Arc::new(MemStore::default()));

        let created = service
            .auto_assign_from_incident(&incident("critical", "phone"))
            .await
            .unwrap()
            .expect("a template should match");
        let (workflow, tasks) = created;

        assert_eq!(workflow.incident_id.as_deref(), Some("inc-1"));
        assert_eq!(workflow.entity_type, "incident");
        assert_eq!(workflow.context["incident"]["ticketNumber"], json!("INC-1001"));
        assert!(tasks[0].title.contains("INC-1001"));
    }

    #[tokio::test]
    async fn test_auto_assign_without_match_is_none() {
        // A catalog holding only constrained templates
        let catalog = TemplateCatalog::new(vec![]).unwrap();
        let store = Arc::new(MemStore::default());
        let service = WorkflowService::new(
            store.clone(),
            store.clone(),
            store,
            Arc::new(catalog),
            TaskCorrelator::new(Arc::new(OpenDirectory)),
            Arc::new(NullSink),
        );

        let created = service
            .auto_assign_from_incident(&incident("low", "email"))
            .await
            .unwrap();
        assert!(created.is_none());
    }

    #[tokio::test]
    async fn test_advance_persists_the_new_version() {
        let store = Arc::new(MemStore::default());
        let service = service_over(store);

        let workflow = service
            .create_workflow(
                WorkflowSpec {
                    name: "Direct".to_string(),
                    steps: vec![
                        Step::new("a", "A", StepType::Manual),
                        Step::new("b", "B", StepType::Manual),
                    ],
                    ..Default::default()
                },
                "alice",
            )
            .await
            .unwrap();

        let advanced = service
            .advance_workflow(
                &workflow.id,
                AdvanceCommand::new(AdvanceAction::Approve, "alice"),
            )
            .await
            .unwrap();
        assert_eq!(advanced.version, 2);
        assert_eq!(advanced.current_step_id, Some(StepId::new("b")));

        let stored = service.get_workflow(&workflow.id).await.unwrap();
        assert_eq!(stored.version, 2);
    }

    #[tokio::test]
    async fn test_operations_on_missing_workflow_are_not_found() {
        let service = service_over(Arc::new(MemStore::default()));
        let missing = WorkflowId::new("missing");

        let result = service.get_workflow(&missing).await;
        assert!(matches!(result, Err(CoreError::NotFound(_))));

        let result = service
            .advance_workflow(&missing, AdvanceCommand::new(AdvanceAction::Approve, "a"))
            .await;
        assert!(matches!(result, Err(CoreError::NotFound(_))));

        let result = service
            .rollback_workflow(&missing, &StepId::new("a"), "a", None)
            .await;
        assert!(matches!(result, Err(CoreError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_cancel_and_delete_round_trip() {
        let store = Arc::new(MemStore::default());
        let service = service_over(store);

        let workflow = service
            .create_workflow(
                WorkflowSpec {
                    name: "Short".to_string(),
                    steps: vec![Step::new("a", "A", StepType::Manual)],
                    ..Default::default()
                },
                "alice",
            )
            .await
            .unwrap();

        let cancelled = service
            .cancel_workflow(&workflow.id, "bob", "duplicate request")
            .await
            .unwrap();
        assert_eq!(cancelled.status, WorkflowStatus::Cancelled);
        assert_eq!(cancelled.context["cancellationReason"], json!("duplicate request"));

        service.delete_workflow(&workflow.id, "bob").await.unwrap();
        let result = service.get_workflow(&workflow.id).await;
        assert!(matches!(result, Err(CoreError::NotFound(_))));
    }
}
