//! Concurrent-map record stores and the in-memory transaction
//! primitive.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

use flowdesk_core::domain::repository::{
    TaskRepository, WorkflowFilter, WorkflowRepository, WorkflowUnitOfWork,
};
use flowdesk_core::{CoreError, Task, Workflow, WorkflowId};

/// Workflow store over a concurrent map.
///
/// The optimistic version check in [`update`](WorkflowRepository::update)
/// runs under the shard lock of the workflow's entry, so two racing
/// writers cannot both pass it.
pub struct InMemoryWorkflowRepository {
    workflows: Arc<DashMap<String, Workflow>>,
}

impl InMemoryWorkflowRepository {
    /// Create an empty store
    pub fn new() -> Self {
        Self {
            workflows: Arc::new(DashMap::with_capacity(64)),
        }
    }

    fn contains(&self, id: &WorkflowId) -> bool {
        self.workflows.contains_key(&id.0)
    }

    fn insert_unchecked(&self, workflow: &Workflow) {
        self.workflows
            .insert(workflow.id.0.clone(), workflow.clone());
    }
}

impl Default for InMemoryWorkflowRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl WorkflowRepository for InMemoryWorkflowRepository {
    async fn find_by_id(&self, id: &WorkflowId) -> Result<Option<Workflow>, CoreError> {
        Ok(self.workflows.get(&id.0).map(|entry| entry.clone()))
    }

    async fn insert(&self, workflow: &Workflow) -> Result<(), CoreError> {
        match self.workflows.entry(workflow.id.0.clone()) {
            dashmap::mapref::entry::Entry::Occupied(_) => Err(CoreError::Conflict(format!(
                "Workflow already exists: {}",
                workflow.id
            ))),
            dashmap::mapref::entry::Entry::Vacant(entry) => {
                entry.insert(workflow.clone());
                debug!(workflow = %workflow.id, "Stored workflow");
                Ok(())
            }
        }
    }

    async fn update(&self, workflow: &Workflow) -> Result<(), CoreError> {
        let mut entry = self.workflows.get_mut(&workflow.id.0).ok_or_else(|| {
            CoreError::NotFound(format!("Workflow not found: {}", workflow.id))
        })?;
        if entry.version + 1 != workflow.version {
            return Err(CoreError::Conflict(format!(
                "Workflow {} is at version {}, update carries {}",
                workflow.id, entry.version, workflow.version
            )));
        }
        *entry = workflow.clone();
        Ok(())
    }

    async fn delete(&self, id: &WorkflowId) -> Result<(), CoreError> {
        self.workflows
            .remove(&id.0)
            .map(|_| ())
            .ok_or_else(|| CoreError::NotFound(format!("Workflow not found: {}", id)))
    }

    async fn list(&self, filter: &WorkflowFilter) -> Result<Vec<Workflow>, CoreError> {
        let mut workflows: Vec<Workflow> = self
            .workflows
            .iter()
            .filter(|entry| filter.matches(entry.value()))
            .map(|entry| entry.clone())
            .collect();
        workflows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(workflows)
    }

    async fn find_updated_since(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<Workflow>, CoreError> {
        Ok(self
            .workflows
            .iter()
            .filter(|entry| entry.updated_at >= cutoff)
            .map(|entry| entry.clone())
            .collect())
    }
}

/// Task store over a concurrent map
pub struct InMemoryTaskRepository {
    tasks: Arc<DashMap<String, Task>>,
}

impl InMemoryTaskRepository {
    /// Create an empty store
    pub fn new() -> Self {
        Self {
            tasks: Arc::new(DashMap::with_capacity(64)),
        }
    }

    fn any_exists(&self, tasks: &[Task]) -> Option<String> {
        tasks
            .iter()
            .find(|task| self.tasks.contains_key(&task.id.0))
            .map(|task| task.id.0.clone())
    }

    fn insert_all_unchecked(&self, tasks: &[Task]) {
        for task in tasks {
            self.tasks.insert(task.id.0.clone(), task.clone());
        }
    }
}

impl Default for InMemoryTaskRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TaskRepository for InMemoryTaskRepository {
    async fn insert_many(&self, tasks: &[Task]) -> Result<(), CoreError> {
        // All-or-nothing: reject the whole batch before writing anything
        if let Some(existing) = self.any_exists(tasks) {
            return Err(CoreError::Conflict(format!(
                "Task already exists: {existing}"
            )));
        }
        self.insert_all_unchecked(tasks);
        debug!(count = tasks.len(), "Stored task batch");
        Ok(())
    }

    async fn find_for_workflow(&self, workflow_id: &WorkflowId) -> Result<Vec<Task>, CoreError> {
        let mut tasks: Vec<Task> = self
            .tasks
            .iter()
            .filter(|entry| entry.workflow_id.as_ref() == Some(workflow_id))
            .map(|entry| entry.clone())
            .collect();
        tasks.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.0.cmp(&b.id.0)));
        Ok(tasks)
    }
}

/// In-memory transaction: a commit mutex plus validate-then-write.
///
/// All preconditions (fresh workflow id, fresh task ids) are checked
/// under the mutex before the first write, so a failure leaves both
/// stores untouched.
pub struct InMemoryUnitOfWork {
    workflows: Arc<InMemoryWorkflowRepository>,
    tasks: Arc<InMemoryTaskRepository>,
    commit: Mutex<()>,
}

impl InMemoryUnitOfWork {
    /// Create a unit of work over the given stores
    pub fn new(
        workflows: Arc<InMemoryWorkflowRepository>,
        tasks: Arc<InMemoryTaskRepository>,
    ) -> Self {
        Self {
            workflows,
            tasks,
            commit: Mutex::new(()),
        }
    }
}

#[async_trait]
impl WorkflowUnitOfWork for InMemoryUnitOfWork {
    async fn create_workflow_with_tasks(
        &self,
        workflow: &Workflow,
        tasks: &[Task],
    ) -> Result<(), CoreError> {
        let _guard = self.commit.lock().await;

        if self.workflows.contains(&workflow.id) {
            return Err(CoreError::Conflict(format!(
                "Workflow already exists: {}",
                workflow.id
            )));
        }
        if let Some(existing) = self.tasks.any_exists(tasks) {
            return Err(CoreError::Conflict(format!(
                "Task already exists: {existing}"
            )));
        }

        self.tasks.insert_all_unchecked(tasks);
        self.workflows.insert_unchecked(workflow);
        debug!(
            workflow = %workflow.id,
            tasks = tasks.len(),
            "Committed workflow with tasks"
        );
        Ok(())
    }
}
