use serde::{Deserialize, Serialize};

/// An append-only audit entry emitted after workflow mutations.
///
/// Writing it is delegated to an [`AuditSink`](super::repository::AuditSink)
/// collaborator and is best-effort: a sink failure never rolls back
/// the primary operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRecord {
    /// What happened, e.g. `workflow.advanced`
    pub action: String,

    /// Resource kind, e.g. `workflow`
    pub resource: String,

    /// Resource identifier
    pub resource_id: String,

    /// Free-form detail about the mutation
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub metadata: serde_json::Map<String, serde_json::Value>,

    /// Correlates the record with the request that caused it
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
}

impl AuditRecord {
    /// Create a record with empty metadata
    pub fn new(
        action: impl Into<String>,
        resource: impl Into<String>,
        resource_id: impl Into<String>,
    ) -> Self {
        Self {
            action: action.into(),
            resource: resource.into(),
            resource_id: resource_id.into(),
            metadata: serde_json::Map::new(),
            correlation_id: None,
        }
    }

    /// Attach a metadata entry
    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Attach a correlation id
    pub fn with_correlation(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = Some(correlation_id.into());
        self
    }
}
