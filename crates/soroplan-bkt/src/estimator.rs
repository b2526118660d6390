//! Per-skill mastery estimation by replaying attempt history.
//!
//! The estimator holds no state between calls. Every estimate is recomputed
//! from the ordered history so concurrent appends can never leave a stale
//! cached value behind.

use serde::{Deserialize, Serialize};
use soroplan_core::{
    clamp_p_known, debug_event, Attempt, HelpLevel, SkillBktParams, SkillId, SkillMastery,
    SkillPriorStore,
};
use std::collections::BTreeMap;

use crate::blame::{BlameAttributor, BlameMethod, BlameResult, SkillEvidence};
use crate::update::{learn_transition, partial_update, posterior_correct};

/// Opportunity count at which confidence reaches 0.5.
pub const CONFIDENCE_HALF_SATURATION: f64 = 5.0;

/// Evidence strength of a correct answer by help level used (0..=3).
const HELP_EVIDENCE_WEIGHTS: [f64; 4] = [1.0, 0.75, 0.5, 0.25];

/// `n / (n + k)`: zero without data, monotone, never reaches one.
#[must_use]
pub fn confidence_from_opportunities(opportunities: u32) -> f64 {
    let n = f64::from(opportunities);
    n / (n + CONFIDENCE_HALF_SATURATION)
}

#[must_use]
pub fn help_evidence_weight(level: HelpLevel) -> f64 {
    HELP_EVIDENCE_WEIGHTS[usize::from(u8::from(level)).min(HELP_EVIDENCE_WEIGHTS.len() - 1)]
}

/// Blame handed out for one failed attempt during a replay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlameEvent {
    /// Position of the attempt in the history slice passed in.
    pub attempt_index: usize,
    pub method: BlameMethod,
    pub results: Vec<BlameResult>,
}

/// Estimates plus the blame decisions that produced them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MasteryTrace {
    pub masteries: Vec<SkillMastery>,
    pub blame_events: Vec<BlameEvent>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MasteryEstimator {
    pub blame_method: BlameMethod,
    pub attributor: BlameAttributor,
}

struct SkillState {
    params: SkillBktParams,
    p_known: f64,
    opportunities: u32,
    successes: u32,
}

impl SkillState {
    fn new(params: SkillBktParams) -> Self {
        Self {
            params,
            p_known: clamp_p_known(params.prior_known),
            opportunities: 0,
            successes: 0,
        }
    }

    fn mastery(&self, skill_id: &str) -> SkillMastery {
        SkillMastery {
            skill_id: skill_id.to_string(),
            p_known: self.p_known,
            confidence: confidence_from_opportunities(self.opportunities),
            opportunities: self.opportunities,
            successes: self.successes,
        }
    }
}

impl MasteryEstimator {
    #[must_use]
    pub fn new(blame_method: BlameMethod, attributor: BlameAttributor) -> Self {
        Self {
            blame_method,
            attributor,
        }
    }

    /// Mastery of every skill seen in `history`, sorted by skill id.
    #[must_use]
    pub fn estimate<P>(&self, history: &[Attempt], priors: &P) -> Vec<SkillMastery>
    where
        P: SkillPriorStore + ?Sized,
    {
        self.estimate_with_trace(history, priors, &[]).masteries
    }

    /// Like [`estimate`](Self::estimate), but also reports `skills` that
    /// never appear in the history (at their prior, confidence 0).
    #[must_use]
    pub fn estimate_for<P>(
        &self,
        history: &[Attempt],
        priors: &P,
        skills: &[SkillId],
    ) -> Vec<SkillMastery>
    where
        P: SkillPriorStore + ?Sized,
    {
        self.estimate_with_trace(history, priors, skills).masteries
    }

    /// Replays `history` in chronological order.
    ///
    /// Attempts are ordered by `recorded_at`; ties keep their input order.
    #[must_use]
    pub fn estimate_with_trace<P>(
        &self,
        history: &[Attempt],
        priors: &P,
        skills: &[SkillId],
    ) -> MasteryTrace
    where
        P: SkillPriorStore + ?Sized,
    {
        let mut states: BTreeMap<SkillId, SkillState> = BTreeMap::new();
        for skill in skills {
            states
                .entry(skill.clone())
                .or_insert_with(|| SkillState::new(lookup_params(priors, skill)));
        }

        let mut ordered: Vec<(usize, &Attempt)> = history.iter().enumerate().collect();
        ordered.sort_by_key(|(_, attempt)| attempt.recorded_at);

        let mut blame_events = Vec::new();
        for (attempt_index, attempt) in ordered {
            let exercised = unique_skills(&attempt.skills_exercised);
            if exercised.is_empty() {
                continue;
            }
            for skill in &exercised {
                states
                    .entry((*skill).clone())
                    .or_insert_with(|| SkillState::new(lookup_params(priors, skill)));
            }

            if attempt.is_correct {
                let strength = help_evidence_weight(attempt.help_level_used);
                for skill in &exercised {
                    if let Some(state) = states.get_mut(*skill) {
                        let target = posterior_correct(state.p_known, &state.params);
                        state.p_known = partial_update(state.p_known, target, strength);
                        state.successes += 1;
                    }
                }
            } else {
                let evidence: Vec<SkillEvidence> = exercised
                    .iter()
                    .filter_map(|skill| {
                        states.get(*skill).map(|state| SkillEvidence {
                            skill_id: (*skill).clone(),
                            p_known: state.p_known,
                            params: state.params,
                        })
                    })
                    .collect();
                let method = self
                    .attributor
                    .effective_method(self.blame_method, evidence.len());
                let results = self.attributor.attribute(&evidence, self.blame_method);
                for result in &results {
                    if let Some(state) = states.get_mut(&result.skill_id) {
                        state.p_known = clamp_p_known(result.updated_p_known);
                    }
                }
                blame_events.push(BlameEvent {
                    attempt_index,
                    method,
                    results,
                });
            }

            for skill in &exercised {
                if let Some(state) = states.get_mut(*skill) {
                    state.p_known = learn_transition(state.p_known, &state.params);
                    state.opportunities += 1;
                }
            }
        }

        MasteryTrace {
            masteries: states
                .iter()
                .map(|(skill_id, state)| state.mastery(skill_id))
                .collect(),
            blame_events,
        }
    }
}

fn lookup_params<P>(priors: &P, skill_id: &str) -> SkillBktParams
where
    P: SkillPriorStore + ?Sized,
{
    priors.skill_params(skill_id).unwrap_or_else(|| {
        debug_event!("no priors configured for skill {skill_id}, using defaults");
        SkillBktParams::default()
    })
}

fn unique_skills(skills: &[SkillId]) -> Vec<&SkillId> {
    let mut unique: Vec<&SkillId> = Vec::with_capacity(skills.len());
    for skill in skills {
        if !unique.contains(&skill) {
            unique.push(skill);
        }
    }
    unique
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use time::{Duration, OffsetDateTime};

    fn attempt(skills: &[&str], correct: bool, minute: i64) -> Attempt {
        Attempt::new(
            skills.iter().map(|s| (*s).to_string()).collect(),
            correct,
            3_000,
            HelpLevel::None,
            OffsetDateTime::UNIX_EPOCH + Duration::minutes(minute),
        )
    }

    fn priors() -> HashMap<SkillId, SkillBktParams> {
        let mut map = HashMap::new();
        map.insert(
            "a".to_string(),
            SkillBktParams {
                prior_known: 0.4,
                ..SkillBktParams::default()
            },
        );
        map
    }

    #[test]
    fn untouched_skill_reports_prior_and_zero_confidence() {
        let estimator = MasteryEstimator::default();
        let masteries = estimator.estimate_for(&[], &priors(), &["a".to_string()]);
        assert_eq!(masteries.len(), 1);
        assert!((masteries[0].p_known - 0.4).abs() < 1e-12);
        assert!(masteries[0].confidence.abs() < f64::EPSILON);
        assert!(masteries[0].is_new());
    }

    #[test]
    fn confidence_saturates_below_one() {
        assert!(confidence_from_opportunities(0).abs() < f64::EPSILON);
        assert!((confidence_from_opportunities(5) - 0.5).abs() < 1e-12);
        assert!(confidence_from_opportunities(25) >= 0.8);
        assert!(confidence_from_opportunities(u32::MAX) < 1.0);
    }

    #[test]
    fn help_discounts_correct_evidence() {
        let estimator = MasteryEstimator::default();
        let unaided = estimator.estimate(&[attempt(&["a"], true, 0)], &priors());
        let mut helped = attempt(&["a"], true, 0);
        helped.help_level_used = HelpLevel::Walkthrough;
        let aided = estimator.estimate(&[helped], &priors());
        assert!(aided[0].p_known < unaided[0].p_known);
        assert_eq!(aided[0].successes, 1);
    }

    #[test]
    fn replay_follows_recorded_at_not_slice_order() {
        let estimator = MasteryEstimator::default();
        let chronological = vec![attempt(&["a"], false, 0), attempt(&["a"], true, 1)];
        let shuffled = vec![chronological[1].clone(), chronological[0].clone()];
        let a = estimator.estimate(&chronological, &priors());
        let b = estimator.estimate(&shuffled, &priors());
        assert!((a[0].p_known - b[0].p_known).abs() < 1e-12);
    }

    #[test]
    fn duplicate_skill_in_one_attempt_counts_once() {
        let estimator = MasteryEstimator::default();
        let masteries = estimator.estimate(&[attempt(&["a", "a"], true, 0)], &priors());
        assert_eq!(masteries[0].opportunities, 1);
    }

    #[test]
    fn failures_emit_blame_events() {
        let estimator = MasteryEstimator::default();
        let history = vec![attempt(&["a", "b"], true, 0), attempt(&["a", "b"], false, 1)];
        let trace = estimator.estimate_with_trace(&history, &priors(), &[]);
        assert_eq!(trace.blame_events.len(), 1);
        assert_eq!(trace.blame_events[0].attempt_index, 1);
        assert_eq!(trace.blame_events[0].method, BlameMethod::Bayesian);
        let total: f64 = trace.blame_events[0]
            .results
            .iter()
            .map(|r| r.blame_weight)
            .sum();
        assert!((total - 1.0).abs() < 1e-9);
        // "b" has no configured priors and falls back to defaults.
        assert_eq!(trace.masteries.len(), 2);
    }
}
