//! Collaborator traits for the Flowdesk core.
//!
//! The engine treats persistence, identity lookup, and audit logging
//! as external capabilities. External crates implement these traits to
//! provide concrete mechanisms (see `flowdesk-state-inmemory`).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashSet;

use super::audit::AuditRecord;
use super::task::Task;
use super::workflow::{Workflow, WorkflowId, WorkflowStatus, WorkflowType};
use crate::CoreError;

/// Optional filters for workflow listing
#[derive(Debug, Clone, Default)]
pub struct WorkflowFilter {
    /// Keep only workflows in this status
    pub status: Option<WorkflowStatus>,
    /// Keep only workflows of this type
    pub workflow_type: Option<WorkflowType>,
    /// Keep only workflows referencing this incident
    pub incident_id: Option<String>,
}

impl WorkflowFilter {
    /// Whether a workflow passes every set filter
    pub fn matches(&self, workflow: &Workflow) -> bool {
        if let Some(status) = self.status {
            if workflow.status != status {
                return false;
            }
        }
        if let Some(workflow_type) = self.workflow_type {
            if workflow.workflow_type != workflow_type {
                return false;
            }
        }
        if let Some(incident_id) = &self.incident_id {
            if workflow.incident_id.as_ref() != Some(incident_id) {
                return false;
            }
        }
        true
    }
}

/// Transactional record store for workflow aggregates
#[async_trait]
pub trait WorkflowRepository: Send + Sync {
    /// Find a workflow by id
    async fn find_by_id(&self, id: &WorkflowId) -> Result<Option<Workflow>, CoreError>;

    /// Insert a new workflow; the id must not already exist
    async fn insert(&self, workflow: &Workflow) -> Result<(), CoreError>;

    /// Persist a mutated workflow with an optimistic version check:
    /// the stored version must be exactly one behind `workflow.version`,
    /// otherwise the update fails with [`CoreError::Conflict`] and the
    /// caller must re-read and resubmit.
    async fn update(&self, workflow: &Workflow) -> Result<(), CoreError>;

    /// Delete a workflow; correlated tasks are left alone
    async fn delete(&self, id: &WorkflowId) -> Result<(), CoreError>;

    /// List workflows matching the filter
    async fn list(&self, filter: &WorkflowFilter) -> Result<Vec<Workflow>, CoreError>;

    /// All workflows updated at or after the cutoff (analytics window)
    async fn find_updated_since(&self, cutoff: DateTime<Utc>) -> Result<Vec<Workflow>, CoreError>;
}

/// Record store for correlated tasks
#[async_trait]
pub trait TaskRepository: Send + Sync {
    /// Bulk-insert tasks in one statement
    async fn insert_many(&self, tasks: &[Task]) -> Result<(), CoreError>;

    /// Tasks back-referencing a workflow
    async fn find_for_workflow(&self, workflow_id: &WorkflowId) -> Result<Vec<Task>, CoreError>;
}

/// Multi-statement atomic transaction primitive.
///
/// `create_from_template` persists the workflow and its correlated
/// tasks through this trait so a task bulk-insert failure leaves no
/// orphaned workflow behind.
#[async_trait]
pub trait WorkflowUnitOfWork: Send + Sync {
    /// Atomically insert a workflow and its correlated tasks
    async fn create_workflow_with_tasks(
        &self,
        workflow: &Workflow,
        tasks: &[Task],
    ) -> Result<(), CoreError>;
}

/// Identity lookup: which candidate identities belong to the
/// organization. Used to validate task assignees.
#[async_trait]
pub trait IdentityDirectory: Send + Sync {
    /// Returns the subset of `candidates` that are organization members
    async fn verify_members(&self, candidates: &[String]) -> Result<HashSet<String>, CoreError>;
}

/// Append-only audit sink
#[async_trait]
pub trait AuditSink: Send + Sync {
    /// Append one audit record
    async fn append(&self, record: AuditRecord) -> Result<(), CoreError>;
}
