//! Blame attribution for failed multi-skill attempts.
//!
//! A problem succeeds only when every exercised skill is applied correctly,
//! so a wrong answer says "at least one of these skills failed". The
//! attributor decides how much of that failure each skill is charged with.
//!
//! Two strategies exist:
//!
//! * [`BlameMethod::Heuristic`]: `(1 − p_i) / Σ (1 − p_j)`, linear in the
//!   number of skills.
//! * [`BlameMethod::Bayesian`]: exact enumeration of the 2ⁿ known/unknown
//!   assignments under the conjunctive guess/slip model. Each assignment's
//!   posterior mass is shared equally among the skills that explain the
//!   failure in it (its unknown skills; all skills when only slips can
//!   explain it).
//!
//! The bayesian cost is exponential, so requests above
//! [`BlameAttributor::max_exact_skills`] fall back to the heuristic.

use serde::{Deserialize, Serialize};
use soroplan_core::{warn_event, SkillBktParams, SkillId};

use crate::update::{partial_update, posterior_incorrect};

/// Largest skill count the bayesian method enumerates exactly (2⁵ = 32
/// assignments).
pub const DEFAULT_MAX_EXACT_SKILLS: usize = 5;

/// Hard ceiling for exact enumeration regardless of configuration.
pub const MAX_ENUMERABLE_SKILLS: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BlameMethod {
    Heuristic,
    #[default]
    Bayesian,
}

/// Current belief about one skill exercised by the failed attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct SkillEvidence {
    pub skill_id: SkillId,
    pub p_known: f64,
    pub params: SkillBktParams,
}

/// Blame charged to one skill, plus its blame-scaled posterior.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlameResult {
    pub skill_id: SkillId,
    pub blame_weight: f64,
    pub updated_p_known: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlameAttributor {
    /// Cap on exact enumeration; above it the heuristic is used.
    pub max_exact_skills: usize,
}

impl Default for BlameAttributor {
    fn default() -> Self {
        Self {
            max_exact_skills: DEFAULT_MAX_EXACT_SKILLS,
        }
    }
}

impl BlameAttributor {
    #[must_use]
    pub fn new(max_exact_skills: usize) -> Self {
        Self {
            max_exact_skills: max_exact_skills.min(MAX_ENUMERABLE_SKILLS),
        }
    }

    /// The method actually used for `skill_count` skills.
    #[must_use]
    pub fn effective_method(&self, requested: BlameMethod, skill_count: usize) -> BlameMethod {
        match requested {
            BlameMethod::Bayesian if skill_count > self.max_exact_skills => BlameMethod::Heuristic,
            other => other,
        }
    }

    /// Distributes the blame for one failed attempt.
    ///
    /// Weights sum to one and do not depend on input order. Each skill's
    /// `updated_p_known` is its "observed incorrect" posterior applied with
    /// strength equal to its blame weight.
    #[must_use]
    pub fn attribute(&self, skills: &[SkillEvidence], method: BlameMethod) -> Vec<BlameResult> {
        if skills.is_empty() {
            return Vec::new();
        }

        let effective = self.effective_method(method, skills.len());
        if effective != method {
            warn_event!(
                "blame attribution overflow: {} skills exceed exact cap {}, using heuristic",
                skills.len(),
                self.max_exact_skills
            );
        }

        let weights = match effective {
            BlameMethod::Heuristic => {
                let p: Vec<f64> = skills.iter().map(|s| s.p_known).collect();
                heuristic_weights(&p)
            }
            BlameMethod::Bayesian => bayesian_weights(skills),
        };

        skills
            .iter()
            .zip(weights)
            .map(|(skill, weight)| BlameResult {
                skill_id: skill.skill_id.clone(),
                blame_weight: weight,
                updated_p_known: partial_update(
                    skill.p_known,
                    posterior_incorrect(skill.p_known, &skill.params),
                    weight,
                ),
            })
            .collect()
    }
}

/// [`BlameAttributor::attribute`] with the default exact-enumeration cap.
#[must_use]
pub fn attribute(skills: &[SkillEvidence], method: BlameMethod) -> Vec<BlameResult> {
    BlameAttributor::default().attribute(skills, method)
}

/// `(1 − p_i) / Σ (1 − p_j)`; an even split when every skill is certain.
#[must_use]
pub fn heuristic_weights(p_known: &[f64]) -> Vec<f64> {
    let doubts: Vec<f64> = p_known.iter().map(|p| (1.0 - p).max(0.0)).collect();
    normalize_or_even(doubts)
}

/// Posterior share of responsibility under the conjunctive model.
///
/// With low slip (around 0.1 or less) a moderate mastery gap splits more
/// sharply than [`heuristic_weights`]. Higher slip puts more mass on the
/// all-known assignment, which is shared evenly, so the split softens and can
/// fall below the heuristic one. A mastery cliff stays near-total either way.
#[must_use]
pub fn bayesian_weights(skills: &[SkillEvidence]) -> Vec<f64> {
    let n = skills.len();
    if n == 0 {
        return Vec::new();
    }
    if n > MAX_ENUMERABLE_SKILLS {
        let p: Vec<f64> = skills.iter().map(|s| s.p_known).collect();
        return heuristic_weights(&p);
    }

    let mut responsibility = vec![0.0_f64; n];
    let mut unknown = Vec::with_capacity(n);

    // Bit i set = skill i known.
    for assignment in 0_u32..(1_u32 << n) {
        unknown.clear();
        let mut prior = 1.0;
        let mut p_success = 1.0;
        for (i, skill) in skills.iter().enumerate() {
            if assignment & (1 << i) != 0 {
                prior *= skill.p_known;
                p_success *= 1.0 - skill.params.slip_prob;
            } else {
                prior *= 1.0 - skill.p_known;
                p_success *= skill.params.guess_prob;
                unknown.push(i);
            }
        }

        let joint = prior * (1.0 - p_success);
        if joint <= 0.0 {
            continue;
        }
        if unknown.is_empty() {
            // Only slips explain this failure.
            let share = joint / n as f64;
            responsibility.iter_mut().for_each(|r| *r += share);
        } else {
            let share = joint / unknown.len() as f64;
            for &i in &unknown {
                responsibility[i] += share;
            }
        }
    }

    if responsibility.iter().sum::<f64>() <= 0.0 {
        let p: Vec<f64> = skills.iter().map(|s| s.p_known).collect();
        return heuristic_weights(&p);
    }
    normalize_or_even(responsibility)
}

fn normalize_or_even(values: Vec<f64>) -> Vec<f64> {
    if values.is_empty() {
        return values;
    }
    let total: f64 = values.iter().sum();
    if total > 0.0 && total.is_finite() {
        values.into_iter().map(|v| v / total).collect()
    } else {
        let even = 1.0 / values.len() as f64;
        vec![even; values.len()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn evidence(id: &str, p_known: f64) -> SkillEvidence {
        SkillEvidence {
            skill_id: id.into(),
            p_known,
            params: SkillBktParams::default(),
        }
    }

    fn noisy_evidence(id: &str, p_known: f64) -> SkillEvidence {
        SkillEvidence {
            params: SkillBktParams {
                guess_prob: 0.3,
                slip_prob: 0.3,
                ..SkillBktParams::default()
            },
            ..evidence(id, p_known)
        }
    }

    fn weight_of(results: &[BlameResult], id: &str) -> f64 {
        results
            .iter()
            .find(|r| r.skill_id == id)
            .map_or(f64::NAN, |r| r.blame_weight)
    }

    #[test]
    fn single_skill_takes_all_blame() {
        for method in [BlameMethod::Heuristic, BlameMethod::Bayesian] {
            let results = attribute(&[evidence("a", 0.7)], method);
            assert_eq!(results.len(), 1);
            assert!((results[0].blame_weight - 1.0).abs() < 1e-12);
            assert!(results[0].updated_p_known < 0.7);
        }
    }

    #[test]
    fn empty_input_yields_nothing() {
        assert!(attribute(&[], BlameMethod::Bayesian).is_empty());
    }

    #[test]
    fn heuristic_splits_evenly_when_everything_is_certain() {
        let w = heuristic_weights(&[1.0, 1.0, 1.0]);
        assert!(w.iter().all(|x| (x - 1.0 / 3.0).abs() < 1e-12));
    }

    #[test]
    fn mastery_cliff_separates_weak_from_strong() {
        let skills = [evidence("strong", 0.99), evidence("weak", 0.01)];
        let heuristic = attribute(&skills, BlameMethod::Heuristic);
        let bayesian = attribute(&skills, BlameMethod::Bayesian);

        let h = weight_of(&heuristic, "weak");
        let b = weight_of(&bayesian, "weak");
        assert!(h > 0.90, "heuristic weak blame {h}");
        assert!(b > 0.95, "bayesian weak blame {b}");
        assert!(b >= h, "bayesian {b} should be at least heuristic {h}");
    }

    #[test]
    fn bayesian_is_more_extreme_for_moderate_gap_at_default_noise() {
        let skills = [evidence("strong", 0.95), evidence("weak", 0.10)];
        let h = weight_of(&attribute(&skills, BlameMethod::Heuristic), "weak");
        let b = weight_of(&attribute(&skills, BlameMethod::Bayesian), "weak");
        assert!(h > 0.5 && b > 0.5);
        assert!((b - 0.5).abs() > (h - 0.5).abs(), "bayesian {b} vs heuristic {h}");
    }

    #[test]
    fn high_slip_softens_moderate_gaps_but_keeps_the_cliff() {
        let cliff = [noisy_evidence("strong", 0.99), noisy_evidence("weak", 0.01)];
        let b = weight_of(&attribute(&cliff, BlameMethod::Bayesian), "weak");
        assert!(b > 0.95, "bayesian weak blame {b}");

        let moderate = [noisy_evidence("strong", 0.95), noisy_evidence("weak", 0.10)];
        let h = weight_of(&attribute(&moderate, BlameMethod::Heuristic), "weak");
        let b = weight_of(&attribute(&moderate, BlameMethod::Bayesian), "weak");
        assert!(h > 0.5 && b > 0.5);
        assert!(b < h, "slip-explained mass should soften bayesian {b} below heuristic {h}");
    }

    #[test]
    fn zero_blame_leaves_p_known_in_place() {
        let results = attribute(
            &[evidence("certain", 1.0), evidence("guessing", 0.001)],
            BlameMethod::Heuristic,
        );
        let certain = &results[0];
        assert!(certain.blame_weight < 1e-2);
        // Clamped prior sits at the ceiling and barely moves.
        assert!(certain.updated_p_known > 0.99);
    }

    #[test]
    fn overflow_falls_back_to_heuristic() {
        let attributor = BlameAttributor::new(2);
        let skills = [evidence("a", 0.9), evidence("b", 0.5), evidence("c", 0.2)];
        assert_eq!(
            attributor.effective_method(BlameMethod::Bayesian, skills.len()),
            BlameMethod::Heuristic
        );

        let capped = attributor.attribute(&skills, BlameMethod::Bayesian);
        let heuristic = attributor.attribute(&skills, BlameMethod::Heuristic);
        for (c, h) in capped.iter().zip(&heuristic) {
            assert!((c.blame_weight - h.blame_weight).abs() < 1e-12);
        }
    }
}
