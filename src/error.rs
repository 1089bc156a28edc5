//! Error taxonomy for booking and claim workflow operations.
//!
//! Callers are expected to branch on the variant: an `InvalidStateTransition`
//! means the action is not allowed from the current state, a
//! `PreconditionNotMet` means the action exists but its window has not opened
//! (or has closed), and a `Validation` means the input itself needs fixing.
//! None of these are retried internally.

#[derive(thiserror::Error, Debug)]
pub enum WorkflowError {
    #[error("'{action}' is not allowed while the {entity} is in state {state}")]
    InvalidStateTransition {
        entity: &'static str,
        action: &'static str,
        state: String,
    },
    #[error("precondition not met: {0}")]
    PreconditionNotMet(String),
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("{entity} '{id}' was not found")]
    NotFound { entity: &'static str, id: String },
    #[error("record '{id}' was modified concurrently, reload and retry")]
    Conflict { id: String },
    #[error("storage failure")]
    Store(#[from] sled::Error),
    #[error("record codec failure: {0}")]
    Codec(String),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl WorkflowError {
    /// Shorthand for transition guards.
    pub fn invalid_transition(
        entity: &'static str,
        action: &'static str,
        state: impl Into<String>,
    ) -> Self {
        Self::InvalidStateTransition {
            entity,
            action,
            state: state.into(),
        }
    }
}
