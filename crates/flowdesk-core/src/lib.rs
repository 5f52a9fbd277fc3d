//! Flowdesk core: a persisted workflow orchestration engine for ITSM
//! processes.
//!
//! The crate is split into two layers:
//!
//! - [`domain`]: the [`Workflow`] aggregate and its state machine,
//!   step and task value objects, template definitions, and the
//!   collaborator traits persistence backends implement.
//! - [`application`]: the [`WorkflowService`] facade, the
//!   [`TemplateCatalog`] with score-based auto-selection, the
//!   [`TaskCorrelator`] that turns template blueprints into tasks,
//!   and the [`ExceptionAnalyticsService`] report builder.
//!
//! Persistence is pluggable: the engine only talks to the traits in
//! [`domain::repository`]. See `flowdesk-state-inmemory` for the
//! reference backend.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

/// Application services
pub mod application;
/// Domain model
pub mod domain;
/// Error types
pub mod error;

pub use error::CoreError;

pub use application::analytics::{AnalyticsSummary, ExceptionAnalyticsService};
pub use application::task_correlator::TaskCorrelator;
pub use application::template_catalog::{SelectionCriteria, TemplateCatalog};
pub use application::workflow_service::{
    AdvanceCommand, IncidentAttributes, TemplateOverrides, WorkflowService,
};
pub use domain::audit::AuditRecord;
pub use domain::repository::{
    AuditSink, IdentityDirectory, TaskRepository, WorkflowFilter, WorkflowRepository,
    WorkflowUnitOfWork,
};
pub use domain::step::{Step, StepId, StepStatus, StepType};
pub use domain::task::{Task, TaskId, TaskPriority, TaskStatus};
pub use domain::template::{TemplateId, TemplateSummary, WorkflowTemplate};
pub use domain::workflow::{
    AdvanceAction, Workflow, WorkflowContext, WorkflowId, WorkflowSpec, WorkflowStatus,
    WorkflowType,
};
