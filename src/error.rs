//! Error taxonomy for the risk-decision pipeline.
//!
//! None of these reach the caller of `analyze`: each variant maps onto a
//! degradation path inside the orchestrator.

use thiserror::Error;

/// Failures a scoring tier can report.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Model artifact missing, corrupt, or inference failed.
    #[error("model unavailable: {0}")]
    ModelUnavailable(String),

    /// Feature vector or scaler dimension does not match the model.
    #[error("feature mismatch: expected {expected} features, got {actual}")]
    FeatureMismatch { expected: usize, actual: usize },

    /// Remote inference service unreachable, timed out, or returned an error.
    #[error("remote scorer unavailable: {0}")]
    RemoteUnavailable(String),

    /// Dynamic rule whose condition cannot be evaluated.
    #[error("malformed rule '{rule}': {reason}")]
    MalformedRule { rule: String, reason: String },

    /// Anything else; converted into the failure-policy decision.
    #[error("internal fault: {0}")]
    Internal(String),
}

/// Rejected alert transitions.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AlertError {
    #[error("alert for transaction {0} is already resolved")]
    AlreadyResolved(String),

    #[error("no alert for transaction {0}")]
    NotFound(String),
}

pub type Result<T, E = PipelineError> = std::result::Result<T, E>;
