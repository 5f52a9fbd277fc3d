//! In-memory identity directory and audit sink.

use async_trait::async_trait;
use dashmap::DashSet;
use std::collections::HashSet;
use std::sync::Mutex;
use tracing::debug;

use flowdesk_core::domain::repository::{AuditSink, IdentityDirectory};
use flowdesk_core::{AuditRecord, CoreError};

/// Membership set backed by a concurrent set
pub struct InMemoryIdentityDirectory {
    members: DashSet<String>,
}

impl InMemoryIdentityDirectory {
    /// Create an empty directory
    pub fn new() -> Self {
        Self {
            members: DashSet::new(),
        }
    }

    /// Create a directory pre-populated with members
    pub fn with_members<I, S>(members: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let directory = Self::new();
        for member in members {
            directory.members.insert(member.into());
        }
        directory
    }

    /// Register a member
    pub fn add(&self, member: impl Into<String>) {
        self.members.insert(member.into());
    }
}

impl Default for InMemoryIdentityDirectory {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl IdentityDirectory for InMemoryIdentityDirectory {
    async fn verify_members(&self, candidates: &[String]) -> Result<HashSet<String>, CoreError> {
        Ok(candidates
            .iter()
            .filter(|candidate| self.members.contains(candidate.as_str()))
            .cloned()
            .collect())
    }
}

/// Append-only audit log kept in a vector, mostly for tests and
/// single-process deployments
pub struct InMemoryAuditSink {
    records: Mutex<Vec<AuditRecord>>,
}

impl InMemoryAuditSink {
    /// Create an empty sink
    pub fn new() -> Self {
        Self {
            records: Mutex::new(Vec::new()),
        }
    }

    /// Snapshot of everything appended so far
    pub fn records(&self) -> Vec<AuditRecord> {
        self.records
            .lock()
            .map(|records| records.clone())
            .unwrap_or_default()
    }
}

impl Default for InMemoryAuditSink {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AuditSink for InMemoryAuditSink {
    async fn append(&self, record: AuditRecord) -> Result<(), CoreError> {
        debug!(action = %record.action, resource_id = %record.resource_id, "Audit");
        self.records
            .lock()
            .map_err(|_| CoreError::Store("audit log poisoned".to_string()))?
            .push(record);
        Ok(())
    }
}
