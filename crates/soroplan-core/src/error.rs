use thiserror::Error;

use crate::plan::SessionStatus;

/// Failures reported by a record store implementation.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The stored plan moved on since it was read (optimistic check failed).
    #[error("Plan {plan_id} was modified concurrently (expected revision {expected}, found {found})")]
    Conflict {
        plan_id: String,
        expected: u64,
        found: u64,
    },
    #[error("Plan {0} already exists")]
    DuplicatePlan(String),
    #[error("Plan {0} not found")]
    PlanNotFound(String),
    #[error("Store backend error: {0}")]
    Backend(String),
}

/// Rejected skill parameter sets.
#[derive(Debug, Error, PartialEq)]
pub enum ParamError {
    #[error("{field} must be a probability in [0, 1], got {value}")]
    OutOfRange { field: &'static str, value: f64 },
    #[error("guess ({guess}) + slip ({slip}) must stay below 1")]
    NotIdentifiable { guess: f64, slip: f64 },
}

/// A lifecycle step that the plan's current status does not allow.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("Cannot move plan from {from:?} to {to:?}")]
pub struct TransitionError {
    pub from: SessionStatus,
    pub to: SessionStatus,
}
