#![warn(clippy::unwrap_used, clippy::expect_used)]

//! Core types and collaborator traits for soroplan.
//!
//! Everything the engine consumes from the outside world (progress tracking,
//! skill priors, attempt history, problem generation, plan persistence, time)
//! is a trait here, so handles are passed explicitly into each operation.

pub mod attempt;
pub mod error;
pub mod plan;
pub mod skill;

mod telemetry;

use std::collections::HashMap;
use time::OffsetDateTime;

pub use attempt::{Attempt, HelpLevel, HelpTrigger};
pub use error::{ParamError, StoreError, TransitionError};
pub use plan::{
    CompletionReason, GeneratedProblem, Part, PartKind, PlanWarning, ProblemGenerationMode,
    SessionPlan, SessionStatus, Slot, SlotRecord, SlotResult,
};
pub use skill::{clamp_p_known, MasteryBand, SkillBktParams, SkillId, SkillMastery};

#[cfg(feature = "telemetry")]
#[doc(hidden)]
pub use tracing as __tracing;

/// Lists the skills a player is currently practicing.
pub trait ProgressTracker {
    fn practicing_skills(&self, player_id: &str) -> Result<Vec<SkillId>, StoreError>;
}

/// Pure lookup of per-skill BKT parameters.
pub trait SkillPriorStore {
    fn skill_params(&self, skill_id: &str) -> Option<SkillBktParams>;
}

impl SkillPriorStore for HashMap<SkillId, SkillBktParams> {
    fn skill_params(&self, skill_id: &str) -> Option<SkillBktParams> {
        self.get(skill_id).copied()
    }
}

/// Read side of the append-only attempt history.
pub trait AttemptHistory {
    /// The most recent `limit` attempts of a player, **oldest first**.
    fn recent_attempts(&self, player_id: &str, limit: usize) -> Result<Vec<Attempt>, StoreError>;
}

/// Turns a skill set into a concrete problem. Invoked once per slot at
/// session start.
pub trait ProblemGenerator {
    fn generate(&mut self, skills_required: &[SkillId]) -> Result<GeneratedProblem, String>;
}

/// Record store for session plans and their slot results.
///
/// Writes are optimistic: each carries the revision the caller read, and the
/// store rejects it with [`StoreError::Conflict`] when the stored revision
/// differs. A successful write stores `expected_revision + 1`.
pub trait PlanStore {
    fn load_plan(&self, plan_id: &str) -> Result<Option<SessionPlan>, StoreError>;
    fn insert_plan(&self, plan: SessionPlan) -> Result<(), StoreError>;
    fn save_plan(&self, plan: &SessionPlan, expected_revision: u64) -> Result<(), StoreError>;
    /// Saves the plan and appends `attempt` to the player's history in one
    /// step.
    fn commit_slot_result(
        &self,
        plan: &SessionPlan,
        expected_revision: u64,
        attempt: Attempt,
    ) -> Result<(), StoreError>;
}

/// Time source, injectable for deterministic tests.
pub trait Clock {
    fn now(&self) -> OffsetDateTime;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> OffsetDateTime {
        OffsetDateTime::now_utc()
    }
}
