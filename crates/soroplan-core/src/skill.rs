//! Skill identifiers, externally supplied BKT parameters and the derived
//! per-skill mastery record.

use serde::{Deserialize, Serialize};

use crate::error::ParamError;

/// Opaque identifier of one arithmetic sub-technique, e.g.
/// `"tenComplements.9=10-1"`. Never decomposed by the engine.
pub type SkillId = String;

/// Lower bound applied to every `p_known` estimate.
pub const P_KNOWN_FLOOR: f64 = 0.001;
/// Upper bound applied to every `p_known` estimate.
pub const P_KNOWN_CEIL: f64 = 0.999;

/// Clamps a probability into `[P_KNOWN_FLOOR, P_KNOWN_CEIL]`.
///
/// Non-finite input collapses to the floor.
#[must_use]
pub fn clamp_p_known(p: f64) -> f64 {
    if p.is_finite() {
        p.clamp(P_KNOWN_FLOOR, P_KNOWN_CEIL)
    } else {
        P_KNOWN_FLOOR
    }
}

/// Per-skill Bayesian Knowledge Tracing constants.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SkillBktParams {
    /// P(known) before any observation.
    pub prior_known: f64,
    /// Chance of a correct answer without knowing the skill.
    pub guess_prob: f64,
    /// Chance of a wrong answer despite knowing the skill.
    pub slip_prob: f64,
    /// Chance of moving unknown → known per exercised opportunity.
    pub learn_prob: f64,
}

impl Default for SkillBktParams {
    fn default() -> Self {
        Self {
            prior_known: 0.3,
            guess_prob: 0.2,
            slip_prob: 0.1,
            learn_prob: 0.1,
        }
    }
}

impl SkillBktParams {
    /// Checks that every field is a probability and that the model stays
    /// identifiable (`guess + slip < 1`).
    pub fn validate(&self) -> Result<(), ParamError> {
        for (field, value) in [
            ("prior_known", self.prior_known),
            ("guess_prob", self.guess_prob),
            ("slip_prob", self.slip_prob),
            ("learn_prob", self.learn_prob),
        ] {
            if !value.is_finite() || !(0.0..=1.0).contains(&value) {
                return Err(ParamError::OutOfRange { field, value });
            }
        }
        if self.guess_prob + self.slip_prob >= 1.0 {
            return Err(ParamError::NotIdentifiable {
                guess: self.guess_prob,
                slip: self.slip_prob,
            });
        }
        Ok(())
    }
}

/// Coarse mastery classification used by banded scheduling policies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MasteryBand {
    NearMastered,
    Partial,
    Weak,
    VeryWeak,
}

impl MasteryBand {
    pub const NEAR_MASTERED_MIN: f64 = 0.80;
    pub const PARTIAL_MIN: f64 = 0.50;
    pub const WEAK_MIN: f64 = 0.25;

    #[must_use]
    pub fn from_p_known(p: f64) -> Self {
        if p >= Self::NEAR_MASTERED_MIN {
            Self::NearMastered
        } else if p >= Self::PARTIAL_MIN {
            Self::Partial
        } else if p >= Self::WEAK_MIN {
            Self::Weak
        } else {
            Self::VeryWeak
        }
    }
}

/// Derived mastery estimate for one skill. Never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkillMastery {
    pub skill_id: SkillId,
    /// Posterior P(known), always inside `(0, 1)`.
    pub p_known: f64,
    /// How much evidence backs `p_known`; grows with opportunities, never 1.
    pub confidence: f64,
    /// Attempts that exercised this skill.
    pub opportunities: u32,
    /// Of those, how many were answered correctly.
    pub successes: u32,
}

impl SkillMastery {
    #[must_use]
    pub fn band(&self) -> MasteryBand {
        MasteryBand::from_p_known(self.p_known)
    }

    #[must_use]
    pub fn is_new(&self) -> bool {
        self.opportunities == 0
    }
}
