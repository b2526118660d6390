#![warn(clippy::unwrap_used, clippy::expect_used)]

//! Bayesian knowledge tracing for soroplan.
//!
//! [`MasteryEstimator`] replays a learner's attempt history into per-skill
//! mastery estimates; failed multi-skill attempts are split across their
//! skills by the [`blame`] module before the "observed incorrect" update is
//! applied.

pub mod blame;
pub mod estimator;
pub mod update;

pub use blame::{
    attribute, BlameAttributor, BlameMethod, BlameResult, SkillEvidence,
    DEFAULT_MAX_EXACT_SKILLS,
};
pub use estimator::{
    confidence_from_opportunities, BlameEvent, MasteryEstimator, MasteryTrace,
    CONFIDENCE_HALF_SATURATION,
};
