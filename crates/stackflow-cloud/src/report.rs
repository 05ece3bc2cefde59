//! Outcome of one plan run

use crate::handle::ResourceHandle;
use crate::plan::Action;
use crate::status::OperationResult;
use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

/// Per-step state machine: `Pending -> Executing -> {Succeeded, Skipped, Failed, WaitingOnExternalAction}`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StepState {
    Pending,
    Executing,
    Succeeded,
    /// Already converged, no mutation issued
    Skipped,
    Failed,
    /// Suspended until the operator confirms an out-of-band action
    WaitingOnExternalAction,
}

impl std::fmt::Display for StepState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StepState::Pending => write!(f, "pending"),
            StepState::Executing => write!(f, "executing"),
            StepState::Succeeded => write!(f, "succeeded"),
            StepState::Skipped => write!(f, "skipped"),
            StepState::Failed => write!(f, "failed"),
            StepState::WaitingOnExternalAction => write!(f, "waiting on external action"),
        }
    }
}

/// Audit record of one step
#[derive(Debug, Clone, Serialize)]
pub struct StepRecord {
    pub label: String,
    pub handle: ResourceHandle,
    pub action: Action,
    pub state: StepState,

    /// Mutating calls issued (including retries)
    pub attempts: u32,

    /// Describe calls issued by the waiter
    pub polls: u32,

    /// Whether a create/update/delete actually went out
    pub mutated: bool,

    /// The wait ended with `ReturnLastKnown` instead of a terminal status
    pub wait_timed_out: bool,

    pub last_result: Option<OperationResult>,
    pub error: Option<String>,
}

impl StepRecord {
    pub(crate) fn pending(label: &str, handle: &ResourceHandle, action: Action) -> Self {
        Self {
            label: label.to_string(),
            handle: handle.clone(),
            action,
            state: StepState::Pending,
            attempts: 0,
            polls: 0,
            mutated: false,
            wait_timed_out: false,
            last_result: None,
            error: None,
        }
    }
}

/// Overall status of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanStatus {
    Completed,
    Failed,
    /// Stopped at a checkpoint; re-run the plan once the operator action is done
    Suspended,
    /// Aborted through the cancellation token; re-run to continue
    Cancelled,
}

impl std::fmt::Display for PlanStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PlanStatus::Completed => write!(f, "completed"),
            PlanStatus::Failed => write!(f, "failed"),
            PlanStatus::Suspended => write!(f, "suspended"),
            PlanStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Actionable description of the step that stopped a plan
#[derive(Error, Debug, Clone, Serialize)]
#[error("Plan '{plan}' failed at step {step} ({label}): {action} {resource} after {attempts} attempt(s): {message}")]
pub struct StepFailure {
    pub plan: String,
    /// Zero-based step index
    pub step: usize,
    pub label: String,
    pub action: Action,
    pub resource: String,
    pub attempts: u32,
    pub message: String,

    /// Last raw provider payload, if one was observed
    pub raw: Option<serde_json::Value>,
}

/// Result of [`Orchestrator::execute`](crate::Orchestrator::execute)
#[derive(Debug, Clone, Serialize)]
pub struct PlanReport {
    pub plan: String,
    pub status: PlanStatus,
    pub steps: Vec<StepRecord>,
    pub failure: Option<StepFailure>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl PlanReport {
    pub fn is_success(&self) -> bool {
        self.status == PlanStatus::Completed
    }

    pub fn failure(&self) -> Option<&StepFailure> {
        self.failure.as_ref()
    }

    /// Number of create/update/delete calls the run issued
    pub fn mutation_count(&self) -> u32 {
        self.steps
            .iter()
            .filter(|s| s.mutated)
            .map(|s| s.attempts)
            .sum()
    }

    pub fn count(&self, state: StepState) -> usize {
        self.steps.iter().filter(|s| s.state == state).count()
    }

    /// Step the run stopped at for operator input
    pub fn waiting_step(&self) -> Option<&StepRecord> {
        self.steps
            .iter()
            .find(|s| s.state == StepState::WaitingOnExternalAction)
    }

    /// Convert a failed run into an error, leaving other outcomes untouched
    pub fn into_result(self) -> std::result::Result<PlanReport, StepFailure> {
        match self.failure {
            Some(failure) if self.status == PlanStatus::Failed => Err(failure),
            _ => Ok(self),
        }
    }
}
