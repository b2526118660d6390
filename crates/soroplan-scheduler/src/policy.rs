//! Slot selection policies, one per [`ProblemGenerationMode`].
//!
//! A policy decides two things for the planner: which practicing skill a slot
//! should focus on next, and how expensive (in minutes) a problem on that
//! skill is expected to be. Budget bookkeeping, pairing and repetition
//! avoidance stay in the planner so every policy obeys the same limits.

use rand::distributions::{Distribution, WeightedIndex};
use rand::{Rng, RngCore};
use soroplan_core::{MasteryBand, ProblemGenerationMode, SkillId, SkillMastery};
use std::collections::HashMap;

/// Weakness assumed for a skill without any evidence.
const NEUTRAL_WEAKNESS: f64 = 0.5;
/// Floor on adaptive selection weights so mastered skills still get review.
const REVIEW_WEIGHT: f64 = 0.2;
const WEAKNESS_GAIN: f64 = 4.0;
/// Cost multiplier for a skill the learner has never practiced.
const CLASSIC_NEW_SKILL_COST: f64 = 1.5;

pub trait SlotPolicy {
    fn mode(&self) -> ProblemGenerationMode;

    /// Relative chance of `mastery` becoming the next slot focus.
    fn selection_weight(&self, mastery: &SkillMastery) -> f64;

    /// Multiplier on the base per-problem time. Never below 1.
    fn cost_multiplier(&self, mastery: &SkillMastery) -> f64;

    /// Whether a weak focus skill may be paired with a mastered one.
    fn pairs_skills(&self) -> bool {
        false
    }

    /// Index into `eligible` of the next focus skill.
    ///
    /// `exposures` counts how often each skill was targeted so far in the
    /// plan being built. `eligible` is never empty.
    fn choose_focus(
        &self,
        eligible: &[&SkillMastery],
        _exposures: &HashMap<SkillId, u32>,
        rng: &mut dyn RngCore,
    ) -> usize {
        let weights: Vec<f64> = eligible
            .iter()
            .map(|m| {
                let w = self.selection_weight(m);
                if w.is_finite() && w > 0.0 {
                    w
                } else {
                    0.0
                }
            })
            .collect();
        match WeightedIndex::new(&weights) {
            Ok(dist) => dist.sample(rng),
            Err(_) => rng.gen_range(0..eligible.len()),
        }
    }
}

/// Policy implementing `mode`.
#[must_use]
pub fn policy_for(mode: ProblemGenerationMode) -> Box<dyn SlotPolicy> {
    match mode {
        ProblemGenerationMode::Classic => Box::new(ClassicPolicy),
        ProblemGenerationMode::Adaptive => Box::new(AdaptivePolicy),
        ProblemGenerationMode::AdaptiveBkt => Box::new(AdaptiveBktPolicy),
    }
}

/// `c·(1 − p) + (1 − c)·0.5`: unproven estimates are pulled toward neutral.
#[must_use]
pub fn weakness(mastery: &SkillMastery) -> f64 {
    let c = mastery.confidence.clamp(0.0, 1.0);
    c * (1.0 - mastery.p_known) + (1.0 - c) * NEUTRAL_WEAKNESS
}

fn adaptive_weight(mastery: &SkillMastery) -> f64 {
    let w = weakness(mastery);
    REVIEW_WEIGHT + WEAKNESS_GAIN * w * w
}

/// Mastery-agnostic rotation through the practicing skills.
#[derive(Debug, Clone, Copy, Default)]
pub struct ClassicPolicy;

impl SlotPolicy for ClassicPolicy {
    fn mode(&self) -> ProblemGenerationMode {
        ProblemGenerationMode::Classic
    }

    fn selection_weight(&self, _mastery: &SkillMastery) -> f64 {
        1.0
    }

    fn cost_multiplier(&self, mastery: &SkillMastery) -> f64 {
        if mastery.is_new() {
            CLASSIC_NEW_SKILL_COST
        } else {
            1.0
        }
    }

    /// Least-exposed skill first; ties keep the (shuffled) eligible order.
    fn choose_focus(
        &self,
        eligible: &[&SkillMastery],
        exposures: &HashMap<SkillId, u32>,
        _rng: &mut dyn RngCore,
    ) -> usize {
        eligible
            .iter()
            .enumerate()
            .min_by_key(|(i, m)| (exposures.get(&m.skill_id).copied().unwrap_or(0), *i))
            .map_or(0, |(i, _)| i)
    }
}

/// Weakness-weighted selection with band-based cost.
#[derive(Debug, Clone, Copy, Default)]
pub struct AdaptivePolicy;

impl SlotPolicy for AdaptivePolicy {
    fn mode(&self) -> ProblemGenerationMode {
        ProblemGenerationMode::Adaptive
    }

    fn selection_weight(&self, mastery: &SkillMastery) -> f64 {
        adaptive_weight(mastery)
    }

    fn cost_multiplier(&self, mastery: &SkillMastery) -> f64 {
        match mastery.band() {
            MasteryBand::NearMastered => 1.0,
            MasteryBand::Partial => 1.3,
            MasteryBand::Weak => 1.6,
            MasteryBand::VeryWeak => 2.0,
        }
    }

    fn pairs_skills(&self) -> bool {
        true
    }
}

/// Weakness-weighted selection with cost continuous in `p_known`.
#[derive(Debug, Clone, Copy, Default)]
pub struct AdaptiveBktPolicy;

impl SlotPolicy for AdaptiveBktPolicy {
    fn mode(&self) -> ProblemGenerationMode {
        ProblemGenerationMode::AdaptiveBkt
    }

    fn selection_weight(&self, mastery: &SkillMastery) -> f64 {
        adaptive_weight(mastery)
    }

    /// `1 + (1 − p)^1.5`: 1 when mastered, approaching 2 when unknown.
    fn cost_multiplier(&self, mastery: &SkillMastery) -> f64 {
        1.0 + (1.0 - mastery.p_known).clamp(0.0, 1.0).powf(1.5)
    }

    fn pairs_skills(&self) -> bool {
        true
    }
}
