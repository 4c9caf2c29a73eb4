//! Error types for the calcflow engine.
//!
//! Caller-visible conditions (`Validation`, `NotFound`, `PermissionDenied`) are surfaced
//! verbatim. Everything storage- or runtime-related collapses into `Internal`, whose message
//! never carries storage details.

use thiserror::Error;

use crate::database::StoreError;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CalcflowError {
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Permission denied: {0}")]
    PermissionDenied(String),
    #[error("Internal error: {0}")]
    Internal(String),
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl CalcflowError {
    /// Whether the condition is meant to be shown to the caller as-is
    pub fn is_caller_visible(&self) -> bool {
        matches!(
            self,
            Self::Validation(_) | Self::NotFound(_) | Self::PermissionDenied(_)
        )
    }
}

impl From<StoreError> for CalcflowError {
    fn from(error: StoreError) -> Self {
        match error {
            StoreError::UserNotFound { user_id } => {
                CalcflowError::NotFound(format!("unknown user {user_id}"))
            }
            StoreError::TaskNotFound { task_id, .. } => {
                CalcflowError::NotFound(format!("task {task_id} not found"))
            }
            other => {
                tracing::error!(error = %other, "storage operation failed");
                CalcflowError::Internal("storage failure".to_string())
            }
        }
    }
}

impl From<crate::config::ConfigurationError> for CalcflowError {
    fn from(error: crate::config::ConfigurationError) -> Self {
        CalcflowError::Configuration(error.to_string())
    }
}

impl From<crate::expression::ReductionError> for CalcflowError {
    fn from(error: crate::expression::ReductionError) -> Self {
        CalcflowError::InvariantViolation(error.to_string())
    }
}

impl From<crate::execution::WorkerPoolError> for CalcflowError {
    fn from(error: crate::execution::WorkerPoolError) -> Self {
        match error {
            crate::execution::WorkerPoolError::WorkerNotFound { worker_id } => {
                CalcflowError::NotFound(format!("worker {worker_id} not found"))
            }
            other => CalcflowError::Internal(other.to_string()),
        }
    }
}

impl From<crate::execution::EvaluationError> for CalcflowError {
    fn from(error: crate::execution::EvaluationError) -> Self {
        CalcflowError::Internal(error.to_string())
    }
}

impl From<crate::state_machine::StateTransitionError> for CalcflowError {
    fn from(error: crate::state_machine::StateTransitionError) -> Self {
        CalcflowError::InvariantViolation(error.to_string())
    }
}

pub type Result<T> = std::result::Result<T, CalcflowError>;
