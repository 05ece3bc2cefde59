//! Error types for lifecycle operations

use crate::handle::ResourceKind;
use crate::plan::Action;
use crate::status::{OperationResult, ResourceStatus};
use thiserror::Error;

/// Normalized provider error returned by every [`LifecycleClient`](crate::LifecycleClient) call.
///
/// Each variant carries the raw provider message so that it can be shown
/// to the operator verbatim.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClientError {
    #[error("Resource already exists: {0}")]
    AlreadyExists(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Transient failure: {0}")]
    Transient(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Version conflict (current version: {}): {message}", expected_version.as_deref().unwrap_or("unknown"))]
    Conflict {
        expected_version: Option<String>,
        message: String,
    },

    #[error("Resource in use: {0}")]
    InUse(String),

    #[error("Provider error: {0}")]
    Provider(String),
}

impl ClientError {
    /// Errors worth retrying with a fixed delay
    pub fn is_retryable(&self) -> bool {
        matches!(self, ClientError::Transient(_) | ClientError::InUse(_))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, ClientError::NotFound(_))
    }

    /// Raw provider message
    pub fn message(&self) -> &str {
        match self {
            ClientError::AlreadyExists(m)
            | ClientError::InvalidArgument(m)
            | ClientError::PermissionDenied(m)
            | ClientError::Transient(m)
            | ClientError::NotFound(m)
            | ClientError::InUse(m)
            | ClientError::Provider(m) => m,
            ClientError::Conflict { message, .. } => message,
        }
    }
}

pub type Result<T> = std::result::Result<T, ClientError>;

/// Errors raised by the [`PollingWaiter`](crate::PollingWaiter)
#[derive(Error, Debug, Clone, PartialEq)]
pub enum WaitError {
    #[error("{handle} reached failure status '{status}' after {attempts} attempt(s)")]
    Failed {
        handle: String,
        status: ResourceStatus,
        attempts: u32,
        last: Box<OperationResult>,
    },

    #[error("Timed out waiting for {handle} after {attempts} attempt(s)")]
    Timeout {
        handle: String,
        attempts: u32,
        last: Option<Box<OperationResult>>,
    },

    #[error("Wait for {handle} cancelled after {attempts} attempt(s)")]
    Cancelled { handle: String, attempts: u32 },

    #[error("Describe of {handle} failed on attempt {attempts}: {source}")]
    Client {
        handle: String,
        attempts: u32,
        source: ClientError,
    },
}

impl WaitError {
    pub fn attempts(&self) -> u32 {
        match self {
            WaitError::Failed { attempts, .. }
            | WaitError::Timeout { attempts, .. }
            | WaitError::Cancelled { attempts, .. }
            | WaitError::Client { attempts, .. } => *attempts,
        }
    }

    /// Last observation made before the wait ended, if any
    pub fn last_result(&self) -> Option<&OperationResult> {
        match self {
            WaitError::Failed { last, .. } => Some(last),
            WaitError::Timeout { last, .. } => last.as_deref(),
            _ => None,
        }
    }
}

/// Plan construction errors, raised before anything is executed
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PlanError {
    #[error("Plan '{0}' has no steps")]
    EmptyPlan(String),

    #[error("Step {step}: invalid wait policy: {reason}")]
    InvalidWaitPolicy { step: usize, reason: String },

    #[error("Step {step}: payload '{payload}' cannot be used to {action} a {kind}")]
    PayloadMismatch {
        step: usize,
        kind: ResourceKind,
        action: Action,
        payload: &'static str,
    },

    #[error("Step {step}: invalid payload: {reason}")]
    InvalidPayload { step: usize, reason: String },

    #[error("Handle {key} is used with conflicting ids '{first}' and '{second}'")]
    ConflictingHandle {
        key: String,
        first: String,
        second: String,
    },

    #[error("Step {step} deletes {dependency} before its dependent {dependent} is deleted")]
    DependencyDeletedFirst {
        step: usize,
        dependency: String,
        dependent: String,
    },

    #[error("Step {step} deletes {dependency} but a later step still modifies its dependent {dependent}")]
    DependentTouchedAfterDelete {
        step: usize,
        dependency: String,
        dependent: String,
    },

    #[error("Step {step} deletes {handle} without a preceding step that {requirement}")]
    MissingPrerequisite {
        step: usize,
        handle: String,
        requirement: &'static str,
    },

    #[error("Dependency cycle detected: {0}")]
    DependencyCycle(String),

    #[error("Cannot read source directory {path}: {reason}")]
    UnreadableSource { path: String, reason: String },
}

/// Run-time failure of a single step
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StepError {
    #[error("{0}")]
    Client(ClientError),

    #[error("gave up after {attempts} attempt(s): {last}")]
    RetriesExhausted { attempts: u32, last: ClientError },

    #[error(transparent)]
    Wait(WaitError),

    #[error("{0} does not exist")]
    Missing(String),

    #[error("cancelled by operator")]
    Cancelled,
}

impl From<ClientError> for StepError {
    fn from(err: ClientError) -> Self {
        StepError::Client(err)
    }
}

impl From<WaitError> for StepError {
    fn from(err: WaitError) -> Self {
        match err {
            WaitError::Cancelled { .. } => StepError::Cancelled,
            other => StepError::Wait(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(ClientError::Transient("throttled".into()).is_retryable());
        assert!(ClientError::InUse("OAC attached".into()).is_retryable());
        assert!(!ClientError::PermissionDenied("denied".into()).is_retryable());
        assert!(
            !ClientError::Conflict {
                expected_version: Some("E2".into()),
                message: "stale".into()
            }
            .is_retryable()
        );
    }

    #[test]
    fn test_conflict_message_names_version() {
        let err = ClientError::Conflict {
            expected_version: Some("E2QWRUHAPOMQZL".into()),
            message: "PreconditionFailed".into(),
        };
        assert_eq!(
            err.to_string(),
            "Version conflict (current version: E2QWRUHAPOMQZL): PreconditionFailed"
        );
        assert_eq!(err.message(), "PreconditionFailed");
    }

    #[test]
    fn test_cancelled_wait_becomes_cancelled_step() {
        let err = WaitError::Cancelled {
            handle: "distribution 'site'".into(),
            attempts: 2,
        };
        assert_eq!(StepError::from(err), StepError::Cancelled);
    }
}
