//! Windowed exception analytics over recently active workflows.
//!
//! The report is computed on demand from the record store; nothing is
//! pre-aggregated. Retry and rollback signals are read from the
//! conventional context markers the engine (and its callers) write.

use crate::domain::repository::WorkflowRepository;
use crate::domain::step::{Step, StepStatus};
use crate::domain::workflow::{Workflow, WorkflowStatus};
use crate::CoreError;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

const DEFAULT_WINDOW_DAYS: i64 = 30;
const TOP_FAILED_STEPS: usize = 5;
const RECENT_EXCEPTIONS: usize = 6;

/// How often a named step failed inside the window
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedStepCount {
    /// Step name
    pub name: String,
    /// Failure occurrences
    pub count: usize,
}

/// One workflow that ended `failed` or `cancelled` inside the window
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExceptionRecord {
    /// Workflow id
    pub workflow_id: String,
    /// Workflow name
    pub workflow_name: String,
    /// Current status
    pub status: WorkflowStatus,
    /// Names of steps that failed
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub failed_steps: Vec<String>,
    /// Whether the workflow was rolled back
    pub rolled_back: bool,
    /// Best-effort reason: `cancellationReason`, else `rollbackReason`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Last-updated timestamp (records are sorted by this, newest first)
    pub updated_at: DateTime<Utc>,
}

/// The analytics report for one window
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyticsSummary {
    /// Window length in days
    pub window_days: i64,
    /// Workflows updated inside the window
    pub total_workflows: usize,
    /// Steps that left `pending` (completed, failed, skipped, active)
    pub executed_steps: usize,
    /// Steps that failed
    pub failed_steps: usize,
    /// Steps that were skipped
    pub skipped_steps: usize,
    /// Workflows carrying a retry marker
    pub retry_signals: usize,
    /// Workflows that were rolled back
    pub rollback_signals: usize,
    /// failed / executed, as a percentage rounded to one decimal
    pub step_failure_rate_percent: f64,
    /// retry signals / workflows, as a percentage rounded to one decimal
    pub retry_signal_rate_percent: f64,
    /// Most frequently failing step names, at most five
    pub top_failed_steps: Vec<FailedStepCount>,
    /// Most recently updated exception workflows, at most six
    pub recent_exceptions: Vec<ExceptionRecord>,
}

/// Computes exception reports over the workflow record store
pub struct ExceptionAnalyticsService {
    workflows: Arc<dyn WorkflowRepository>,
}

impl ExceptionAnalyticsService {
    /// Create a service over the given record store
    pub fn new(workflows: Arc<dyn WorkflowRepository>) -> Self {
        Self { workflows }
    }

    /// Build the report for the trailing window (default 30 days)
    pub async fn report(&self, window_days: Option<i64>) -> Result<AnalyticsSummary, CoreError> {
        let window_days = window_days.unwrap_or(DEFAULT_WINDOW_DAYS).max(1);
        let cutoff = Utc::now() - Duration::days(window_days);
        let workflows = self.workflows.find_updated_since(cutoff).await?;
        debug!(window_days, count = workflows.len(), "Computing exception report");
        Ok(summarize(window_days, &workflows))
    }
}

fn summarize(window_days: i64, workflows: &[Workflow]) -> AnalyticsSummary {
    let mut executed_steps = 0;
    let mut failed_steps = 0;
    let mut skipped_steps = 0;
    let mut retry_signals = 0;
    let mut rollback_signals = 0;
    let mut failure_counts: HashMap<&str, usize> = HashMap::new();
    let mut exceptions: Vec<ExceptionRecord> = Vec::new();

    for workflow in workflows {
        let mut workflow_failed_steps = Vec::new();
        for step in &workflow.steps {
            if step.status != StepStatus::Pending {
                executed_steps += 1;
            }
            match step.status {
                StepStatus::Failed => {
                    failed_steps += 1;
                    *failure_counts.entry(step.name.as_str()).or_default() += 1;
                    workflow_failed_steps.push(step.name.clone());
                }
                StepStatus::Skipped => skipped_steps += 1,
                _ => {}
            }
        }

        let retried = has_retry_signal(workflow);
        if retried {
            retry_signals += 1;
        }
        let rolled_back = workflow.context.contains_key("rolledBackAt");
        if rolled_back {
            rollback_signals += 1;
        }

        // Only workflows that ended badly count as recent exceptions;
        // retry/rollback signals on live workflows feed the rates only
        let is_exception = matches!(
            workflow.status,
            WorkflowStatus::Failed | WorkflowStatus::Cancelled
        );
        if is_exception {
            exceptions.push(ExceptionRecord {
                workflow_id: workflow.id.0.clone(),
                workflow_name: workflow.name.clone(),
                status: workflow.status,
                failed_steps: workflow_failed_steps,
                rolled_back,
                reason: exception_reason(workflow),
                updated_at: workflow.updated_at,
            });
        }
    }

    let mut top_failed_steps: Vec<FailedStepCount> = failure_counts
        .into_iter()
        .map(|(name, count)| FailedStepCount {
            name: name.to_string(),
            count,
        })
        .collect();
    top_failed_steps.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.name.cmp(&b.name)));
    top_failed_steps.truncate(TOP_FAILED_STEPS);

    exceptions.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
    exceptions.truncate(RECENT_EXCEPTIONS);

    AnalyticsSummary {
        window_days,
        total_workflows: workflows.len(),
        executed_steps,
        failed_steps,
        skipped_steps,
        retry_signals,
        rollback_signals,
        step_failure_rate_percent: percentage(failed_steps, executed_steps),
        retry_signal_rate_percent: percentage(retry_signals, workflows.len()),
        top_failed_steps,
        recent_exceptions: exceptions,
    }
}

/// Percentage rounded to one decimal place; 0 for an empty denominator
fn percentage(numerator: usize, denominator: usize) -> f64 {
    if denominator == 0 {
        return 0.0;
    }
    (numerator as f64 / denominator as f64 * 1000.0).round() / 10.0
}

fn exception_reason(workflow: &Workflow) -> Option<String> {
    workflow
        .context
        .get("cancellationReason")
        .or_else(|| workflow.context.get("rollbackReason"))
        .and_then(Value::as_str)
        .map(str::to_string)
}

/// A workflow carries a retry signal if its context (or any step
/// output) holds one of the conventional retry markers
fn has_retry_signal(workflow: &Workflow) -> bool {
    if marker_in(&workflow.context) {
        return true;
    }
    workflow.steps.iter().any(step_output_has_marker)
}

fn marker_in(map: &serde_json::Map<String, Value>) -> bool {
    let positive = |key: &str| {
        map.get(key)
            .and_then(Value::as_f64)
            .map_or(false, |count| count > 0.0)
    };
    let truthy = |key: &str| map.get(key).and_then(Value::as_bool).unwrap_or(false);

    positive("retryCount")
        || positive("retries")
        || map.get("retriedStepId").map_or(false, |v| !v.is_null())
        || truthy("retryRequested")
        || truthy("retry")
}

fn step_output_has_marker(step: &Step) -> bool {
    step.output
        .as_ref()
        .and_then(Value::as_object)
        .map_or(false, marker_in)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::step::{Step, StepType};
    use crate::domain::workflow::{AdvanceAction, WorkflowSpec};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn workflow_with_steps(count: usize) -> Workflow {
        let steps = (0..count)
            .map(|index| Step::new(format!("s{index}"), format!("Step {index}"), StepType::Manual))
            .collect();
        Workflow::new(WorkflowSpec {
            name: "w".to_string(),
            steps,
            ..Default::default()
        })
        .unwrap()
    }

    #[test]
    fn test_rates_on_a_mixed_population() {
        // Ten workflows of two steps each; in four of them the first
        // step fails, in two more the context marks a retry. Every
        // workflow has its first step executed plus the second step
        // active in the non-failed ones.
        let mut workflows = Vec::new();
        for index in 0..10 {
            let mut workflow = workflow_with_steps(2);
            if index < 4 {
                workflow.advance(AdvanceAction::Reject, "op", None, None, None).unwrap();
            } else {
                workflow.advance(AdvanceAction::Approve, "op", None, None, None).unwrap();
            }
            if (4..6).contains(&index) {
                workflow.context.insert("retryCount".to_string(), json!(1));
            }
            workflows.push(workflow);
        }

        let summary = summarize(30, &workflows);
        assert_eq!(summary.total_workflows, 10);
        // 4 failed firsts + 6 completed firsts + 6 active seconds
        assert_eq!(summary.executed_steps, 16);
        assert_eq!(summary.failed_steps, 4);
        assert_eq!(summary.retry_signals, 2);
        assert_eq!(summary.step_failure_rate_percent, 25.0);
        assert_eq!(summary.retry_signal_rate_percent, 20.0);
    }

    #[test]
    fn test_rates_are_zero_on_empty_population() {
        let summary = summarize(30, &[]);
        assert_eq!(summary.total_workflows, 0);
        assert_eq!(summary.step_failure_rate_percent, 0.0);
        assert_eq!(summary.retry_signal_rate_percent, 0.0);
        assert!(summary.top_failed_steps.is_empty());
        assert!(summary.recent_exceptions.is_empty());
    }

    #[test]
    fn test_rounding_to_one_decimal() {
        assert_eq!(percentage(1, 3), 33.3);
        assert_eq!(percentage(2, 3), 66.7);
        assert_eq!(percentage(1, 1), 100.0);
        assert_eq!(percentage(0, 5), 0.0);
    }

    #[test]
    fn test_top_failed_steps_sorted_and_capped() {
        let mut workflows = Vec::new();
        // Step names fail with distinct frequencies: f0 once, f1 twice, ...
        for frequency in 0..7 {
            for _ in 0..=frequency {
                let mut workflow = Workflow::new(WorkflowSpec {
                    name: "w".to_string(),
                    steps: vec![Step::new("s", format!("f{frequency}"), StepType::Manual)],
                    ..Default::default()
                })
                .unwrap();
                workflow.advance(AdvanceAction::Reject, "op", None, None, None).unwrap();
                workflows.push(workflow);
            }
        }

        let summary = summarize(30, &workflows);
        assert_eq!(summary.top_failed_steps.len(), 5);
        assert_eq!(
            summary.top_failed_steps[0],
            FailedStepCount {
                name: "f6".to_string(),
                count: 7
            }
        );
        assert_eq!(summary.top_failed_steps[4].name, "f2");
    }

    #[test]
    fn test_recent_exceptions_newest_first_and_capped() {
        let mut workflows = Vec::new();
        for index in 0..8 {
            let mut workflow = workflow_with_steps(1);
            workflow.name = format!("w{index}");
            workflow.advance(AdvanceAction::Reject, "op", None, None, None).unwrap();
            workflow.updated_at = Utc::now() + Duration::seconds(index);
            workflows.push(workflow);
        }

        let summary = summarize(30, &workflows);
        assert_eq!(summary.recent_exceptions.len(), 6);
        assert_eq!(summary.recent_exceptions[0].workflow_name, "w7");
        assert_eq!(summary.recent_exceptions[5].workflow_name, "w2");
        assert!(summary.recent_exceptions[0].failed_steps.contains(&"Step 0".to_string()));
    }

    #[test]
    fn test_live_rollback_counts_as_signal_but_not_exception() {
        let mut workflow = workflow_with_steps(2);
        workflow.advance(AdvanceAction::Approve, "op", None, None, None).unwrap();
        workflow
            .rollback(&crate::domain::step::StepId::new("s0"), "op", Some("redo"))
            .unwrap();

        let summary = summarize(30, std::slice::from_ref(&workflow));
        assert_eq!(summary.rollback_signals, 1);
        // Still in progress after the rollback, so not an exception
        assert!(summary.recent_exceptions.is_empty());
    }

    #[test]
    fn test_cancelled_workflow_is_a_recent_exception() {
        let mut workflow = workflow_with_steps(2);
        workflow.cancel("op", "requested in error").unwrap();

        let summary = summarize(30, std::slice::from_ref(&workflow));
        assert_eq!(summary.recent_exceptions.len(), 1);
        let record = &summary.recent_exceptions[0];
        assert_eq!(record.status, WorkflowStatus::Cancelled);
        assert_eq!(record.reason.as_deref(), Some("requested in error"));
        assert!(record.failed_steps.is_empty());
        assert!(!record.rolled_back);
    }

    #[test]
    fn test_failed_after_rollback_reports_the_rollback_reason() {
        let mut workflow = workflow_with_steps(2);
        workflow.advance(AdvanceAction::Approve, "op", None, None, None).unwrap();
        workflow
            .rollback(&crate::domain::step::StepId::new("s1"), "op", Some("wrong branch"))
            .unwrap();
        workflow.advance(AdvanceAction::Reject, "op", None, None, None).unwrap();

        let summary = summarize(30, std::slice::from_ref(&workflow));
        assert_eq!(summary.recent_exceptions.len(), 1);
        let record = &summary.recent_exceptions[0];
        assert_eq!(record.status, WorkflowStatus::Failed);
        assert!(record.rolled_back);
        assert_eq!(record.reason.as_deref(), Some("wrong branch"));
        assert_eq!(record.failed_steps, vec!["Step 1".to_string()]);
    }

    #[test]
    fn test_retry_markers_in_step_output() {
        let mut workflow = workflow_with_steps(2);
        let mut data = serde_json::Map::new();
        data.insert("retryRequested".to_string(), json!(true));
        workflow.advance(AdvanceAction::Retry, "op", None, Some(data), None).unwrap();

        let summary = summarize(30, std::slice::from_ref(&workflow));
        assert_eq!(summary.retry_signals, 1);
        assert_eq!(summary.skipped_steps, 1);
    }

    #[test]
    fn test_healthy_workflows_are_not_exceptions() {
        let mut workflow = workflow_with_steps(1);
        workflow.advance(AdvanceAction::Approve, "op", None, None, None).unwrap();

        let summary = summarize(30, std::slice::from_ref(&workflow));
        assert_eq!(summary.failed_steps, 0);
        assert!(summary.recent_exceptions.is_empty());
    }
}
