//! Domain layer - aggregates, value objects, and collaborator traits

/// Audit records appended after workflow mutations
pub mod audit;
/// Collaborator traits (record store, identity, audit sink)
pub mod repository;
/// Step value objects embedded in the workflow aggregate
pub mod step;
/// The correlated task aggregate
pub mod task;
/// Immutable workflow template definitions
pub mod template;
/// The workflow aggregate root and its state machine
pub mod workflow;
