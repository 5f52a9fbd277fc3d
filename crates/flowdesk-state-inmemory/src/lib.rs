//! In-memory record store for the Flowdesk workflow engine.
//!
//! This crate implements the collaborator traits defined in
//! `flowdesk-core` over concurrent maps. It is the reference backend:
//! useful for development, testing, and single-process deployments
//! where durability is not required.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use std::sync::Arc;

/// Identity directory and audit sink implementations
pub mod collaborators;
/// Workflow/task stores and the transaction primitive
pub mod repositories;

pub use collaborators::{InMemoryAuditSink, InMemoryIdentityDirectory};
pub use repositories::{InMemoryTaskRepository, InMemoryUnitOfWork, InMemoryWorkflowRepository};

use flowdesk_core::domain::repository::{
    AuditSink, IdentityDirectory, TaskRepository, WorkflowRepository, WorkflowUnitOfWork,
};
use flowdesk_core::{TaskCorrelator, TemplateCatalog, WorkflowService};

/// Bundles one consistent set of in-memory stores.
///
/// The unit of work and the plain repositories share the same
/// underlying maps, so reads through the repositories observe writes
/// committed through the unit of work.
pub struct InMemoryStateProvider {
    workflows: Arc<InMemoryWorkflowRepository>,
    tasks: Arc<InMemoryTaskRepository>,
    unit_of_work: Arc<InMemoryUnitOfWork>,
    identity: Arc<InMemoryIdentityDirectory>,
    audit: Arc<InMemoryAuditSink>,
}

impl InMemoryStateProvider {
    /// Create a provider with empty stores and an empty directory
    pub fn new() -> Self {
        let workflows = Arc::new(InMemoryWorkflowRepository::new());
        let tasks = Arc::new(InMemoryTaskRepository::new());
        let unit_of_work = Arc::new(InMemoryUnitOfWork::new(workflows.clone(), tasks.clone()));
        Self {
            workflows,
            tasks,
            unit_of_work,
            identity: Arc::new(InMemoryIdentityDirectory::new()),
            audit: Arc::new(InMemoryAuditSink::new()),
        }
    }

    /// The workflow store
    pub fn workflows(&self) -> Arc<dyn WorkflowRepository> {
        self.workflows.clone()
    }

    /// The task store
    pub fn tasks(&self) -> Arc<dyn TaskRepository> {
        self.tasks.clone()
    }

    /// The transaction primitive over both stores
    pub fn unit_of_work(&self) -> Arc<dyn WorkflowUnitOfWork> {
        self.unit_of_work.clone()
    }

    /// The identity directory (concrete, so members can be added)
    pub fn identity(&self) -> Arc<InMemoryIdentityDirectory> {
        self.identity.clone()
    }

    /// The audit sink (concrete, so records can be inspected)
    pub fn audit(&self) -> Arc<InMemoryAuditSink> {
        self.audit.clone()
    }

    /// Wire a [`WorkflowService`] over this provider's stores
    pub fn workflow_service(&self, catalog: Arc<TemplateCatalog>) -> WorkflowService {
        let identity: Arc<dyn IdentityDirectory> = self.identity.clone();
        let audit: Arc<dyn AuditSink> = self.audit.clone();
        WorkflowService::new(
            self.workflows(),
            self.tasks(),
            self.unit_of_work(),
            catalog,
            TaskCorrelator::new(identity),
            audit,
        )
    }
}

impl Default for InMemoryStateProvider {
    fn default() -> Self {
        Self::new()
    }
}
