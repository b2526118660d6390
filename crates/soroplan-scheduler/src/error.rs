use soroplan_core::{SessionStatus, SkillId, StoreError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SessionError {
    /// Lifecycle operation attempted from a status that does not allow it.
    #[error("Cannot {operation} plan {plan_id} while it is {status:?}")]
    InvalidTransition {
        plan_id: String,
        status: SessionStatus,
        operation: &'static str,
    },
    #[error("Slot {slot_index} of plan {plan_id} does not exist or is already resolved")]
    SlotNotFound { plan_id: String, slot_index: usize },
    #[error("No BKT priors configured for practicing skills: {}", .skills.join(", "))]
    MissingPrerequisiteData { skills: Vec<SkillId> },
    #[error("Player {0} has no practicing skills")]
    NoPracticingSkills(String),
    #[error("Plan {0} not found")]
    PlanNotFound(String),
    #[error("Problem generation failed for slot {slot_index}: {reason}")]
    ProblemGeneration { slot_index: usize, reason: String },
    #[error("Invalid planner configuration: {0}")]
    InvalidConfig(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

pub type Result<T> = std::result::Result<T, SessionError>;
