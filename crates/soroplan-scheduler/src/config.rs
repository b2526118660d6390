//! Planner configuration.

use serde::{Deserialize, Serialize};
use soroplan_bkt::{BlameAttributor, BlameMethod, MasteryEstimator, DEFAULT_MAX_EXACT_SKILLS};
use soroplan_core::{MasteryBand, PartKind};

use crate::error::{Result, SessionError};

/// Share of the duration budget given to one practice part.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PartShare {
    pub kind: PartKind,
    pub share: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlannerConfig {
    /// Minutes a mastered single-skill problem takes.
    pub base_minutes_per_problem: f64,
    /// `p_known` from which a skill counts as mastered.
    pub mastery_threshold: f64,
    /// How many recent attempts feed the estimator.
    pub history_window: usize,
    /// Chance that a weak focus skill is paired with a mastered one.
    pub pairing_rate: f64,
    /// Extra cost per additional targeted skill.
    pub multi_skill_surcharge: f64,
    /// Parts in order; shares may sum to less than 1, leaving the rest unplanned.
    pub part_shares: Vec<PartShare>,
    pub blame_method: BlameMethod,
    pub max_exact_blame_skills: usize,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            base_minutes_per_problem: 0.5,
            mastery_threshold: MasteryBand::NEAR_MASTERED_MIN,
            history_window: 500,
            pairing_rate: 0.25,
            multi_skill_surcharge: 0.25,
            part_shares: vec![
                PartShare {
                    kind: PartKind::Abacus,
                    share: 0.5,
                },
                PartShare {
                    kind: PartKind::Visualization,
                    share: 0.3,
                },
                PartShare {
                    kind: PartKind::Linear,
                    share: 0.2,
                },
            ],
            blame_method: BlameMethod::Bayesian,
            max_exact_blame_skills: DEFAULT_MAX_EXACT_SKILLS,
        }
    }
}

impl PlannerConfig {
    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: String| Err(SessionError::InvalidConfig(msg));

        if !(self.base_minutes_per_problem.is_finite() && self.base_minutes_per_problem > 0.0) {
            return invalid(format!(
                "base_minutes_per_problem must be positive, got {}",
                self.base_minutes_per_problem
            ));
        }
        for (name, value) in [
            ("mastery_threshold", self.mastery_threshold),
            ("pairing_rate", self.pairing_rate),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return invalid(format!("{name} must lie in [0, 1], got {value}"));
            }
        }
        if !(self.multi_skill_surcharge.is_finite() && self.multi_skill_surcharge >= 0.0) {
            return invalid(format!(
                "multi_skill_surcharge must be non-negative, got {}",
                self.multi_skill_surcharge
            ));
        }
        if self.history_window == 0 {
            return invalid("history_window must be at least 1".to_string());
        }
        if self.part_shares.is_empty() {
            return invalid("part_shares must name at least one part".to_string());
        }
        if self
            .part_shares
            .iter()
            .any(|p| !(p.share.is_finite() && p.share >= 0.0))
        {
            return invalid("part shares must be non-negative".to_string());
        }
        let total: f64 = self.part_shares.iter().map(|p| p.share).sum();
        if total <= 0.0 || total > 1.0 + 1e-9 {
            return invalid(format!("part shares must sum to (0, 1], got {total}"));
        }
        Ok(())
    }

    #[must_use]
    pub fn estimator(&self) -> MasteryEstimator {
        MasteryEstimator::new(
            self.blame_method,
            BlameAttributor::new(self.max_exact_blame_skills),
        )
    }
}
