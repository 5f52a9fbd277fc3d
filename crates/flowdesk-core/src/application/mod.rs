//! Application layer - services coordinating the domain with its
//! collaborators

/// Windowed exception and retry analytics
pub mod analytics;
/// Task generation from template blueprints
pub mod task_correlator;
/// Template registry and score-based auto-selection
pub mod template_catalog;
/// Workflow lifecycle facade
pub mod workflow_service;
