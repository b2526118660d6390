//! Budgeted plan construction.
//!
//! The planner turns mastery estimates into a draft [`SessionPlan`]: each part
//! gets its share of the duration and is filled greedily with slots chosen by
//! the mode's [`SlotPolicy`] until nothing else fits. Unused minutes roll over
//! into the next part, so the whole plan never exceeds the requested
//! duration.

use rand::seq::SliceRandom;
use rand::Rng;
use soroplan_core::{
    debug_event, warn_event, Part, PlanWarning, ProblemGenerationMode, SessionPlan, SessionStatus,
    SkillId, SkillMastery, Slot,
};
use std::collections::HashMap;
use time::OffsetDateTime;
use uuid::Builder;

use crate::config::PlannerConfig;
use crate::error::Result;
use crate::policy::{policy_for, SlotPolicy};

/// Slack for float accumulation when comparing costs against the budget.
const BUDGET_EPSILON: f64 = 1e-12;

/// What to plan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanRequest {
    pub player_id: String,
    pub duration_minutes: u32,
    pub mode: ProblemGenerationMode,
}

#[derive(Debug, Clone)]
pub struct SessionPlanner {
    config: PlannerConfig,
}

impl SessionPlanner {
    pub fn new(config: PlannerConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    #[must_use]
    pub fn config(&self) -> &PlannerConfig {
        &self.config
    }

    /// Estimated minutes for one problem targeting `skills`.
    ///
    /// The slowest skill sets the pace; every extra skill adds the
    /// multi-skill surcharge.
    #[must_use]
    pub fn slot_cost(&self, policy: &dyn SlotPolicy, skills: &[&SkillMastery]) -> f64 {
        let multiplier = skills
            .iter()
            .map(|m| policy.cost_multiplier(m))
            .fold(1.0, f64::max);
        let extra = skills.len().saturating_sub(1) as f64;
        self.config.base_minutes_per_problem * multiplier * (1.0 + self.config.multi_skill_surcharge * extra)
    }

    /// Selection-weighted mean single-skill cost under `mode`.
    #[must_use]
    pub fn expected_slot_minutes(&self, mode: ProblemGenerationMode, masteries: &[SkillMastery]) -> f64 {
        let policy = policy_for(mode);
        let (weighted, total) = masteries.iter().fold((0.0, 0.0), |(acc, total), m| {
            let w = policy.selection_weight(m).max(0.0);
            (acc + w * self.slot_cost(policy.as_ref(), &[m]), total + w)
        });
        if total > 0.0 {
            weighted / total
        } else {
            self.config.base_minutes_per_problem
        }
    }

    /// Builds a draft plan from mastery estimates of the practicing skills.
    ///
    /// When not even the cheapest slot fits, the plan has no slots and
    /// carries a [`PlanWarning::BudgetExhausted`].
    pub fn plan<R>(
        &self,
        request: &PlanRequest,
        masteries: &[SkillMastery],
        now: OffsetDateTime,
        rng: &mut R,
    ) -> SessionPlan
    where
        R: Rng,
    {
        let policy = policy_for(request.mode);
        let id = Builder::from_random_bytes(rng.gen()).into_uuid().to_string();
        let duration = f64::from(request.duration_minutes);

        let mut order: Vec<&SkillMastery> = masteries.iter().collect();
        order.shuffle(rng);

        let cheapest = order
            .iter()
            .map(|m| self.slot_cost(policy.as_ref(), &[*m]))
            .fold(f64::INFINITY, f64::min);

        // Parts only ever hand out their shares of the duration.
        let plannable: f64 = self
            .config
            .part_shares
            .iter()
            .map(|share| duration * share.share)
            .sum();

        let mut parts = Vec::with_capacity(self.config.part_shares.len());
        let mut warnings = Vec::new();

        if !cheapest.is_finite() || cheapest > plannable + BUDGET_EPSILON {
            warn_event!(
                "budget exhausted for player {}: {:.2} of {} min cannot fit a {:.2} min slot",
                request.player_id,
                plannable,
                request.duration_minutes,
                cheapest
            );
            warnings.push(PlanWarning::BudgetExhausted {
                duration_minutes: request.duration_minutes,
                cheapest_slot_minutes: if cheapest.is_finite() { cheapest } else { 0.0 },
            });
            parts.extend(self.config.part_shares.iter().map(|share| Part {
                kind: share.kind,
                budget_minutes: duration * share.share,
                slots: Vec::new(),
            }));
        } else {
            debug_event!(
                "planning {} min for player {} ({}), about {:.1} slots",
                request.duration_minutes,
                request.player_id,
                request.mode,
                duration / self.expected_slot_minutes(request.mode, masteries)
            );
            let mut filler = PartFiller {
                planner: self,
                policy: policy.as_ref(),
                order,
                previous: None,
                exposures: HashMap::new(),
                next_index: 0,
                warnings: &mut warnings,
            };
            let mut carry = 0.0;
            for share in &self.config.part_shares {
                let budget = duration * share.share;
                let mut remaining = budget + carry;
                let slots = filler.fill(&mut remaining, rng);
                carry = remaining.max(0.0);
                parts.push(Part {
                    kind: share.kind,
                    budget_minutes: budget,
                    slots,
                });
            }
        }

        let estimated_minutes = parts
            .iter()
            .flat_map(|p| p.slots.iter())
            .map(|s| s.estimated_cost_minutes)
            .sum();

        SessionPlan {
            id,
            player_id: request.player_id.clone(),
            status: SessionStatus::Draft,
            mode: request.mode,
            duration_minutes: request.duration_minutes,
            estimated_minutes,
            parts,
            warnings,
            revision: 0,
            created_at: now,
            approved_at: None,
            started_at: None,
            completed_at: None,
            completion: None,
        }
    }
}

struct PartFiller<'a> {
    planner: &'a SessionPlanner,
    policy: &'a dyn SlotPolicy,
    order: Vec<&'a SkillMastery>,
    previous: Option<Vec<SkillId>>,
    exposures: HashMap<SkillId, u32>,
    next_index: usize,
    warnings: &'a mut Vec<PlanWarning>,
}

impl<'a> PartFiller<'a> {
    fn fill<R>(&mut self, remaining: &mut f64, rng: &mut R) -> Vec<Slot>
    where
        R: Rng,
    {
        let mut slots = Vec::new();
        while let Some(skills) = self.next_skills(*remaining, rng) {
            let cost = self.planner.slot_cost(self.policy, &skills);
            *remaining -= cost;

            let skills_targeted: Vec<SkillId> = skills.iter().map(|m| m.skill_id.clone()).collect();
            for skill in &skills_targeted {
                *self.exposures.entry(skill.clone()).or_insert(0) += 1;
            }
            if self.previous.as_ref() == Some(&skills_targeted) {
                debug_event!("slot {} repeats its predecessor", self.next_index);
                self.warnings.push(PlanWarning::RepeatedSkillSet {
                    slot_index: self.next_index,
                });
            }
            self.previous = Some(skills_targeted.clone());

            slots.push(Slot {
                index: self.next_index,
                skills_targeted,
                estimated_cost_minutes: cost,
                problem: None,
                result: None,
            });
            self.next_index += 1;
        }
        slots
    }

    /// Skill set of the next slot, sorted by id, or `None` when nothing fits.
    fn next_skills<R>(&self, remaining: f64, rng: &mut R) -> Option<Vec<&'a SkillMastery>>
    where
        R: Rng,
    {
        let fits = |skills: &[&SkillMastery]| {
            self.planner.slot_cost(self.policy, skills) <= remaining + BUDGET_EPSILON
        };

        let fresh: Vec<&'a SkillMastery> = self
            .order
            .iter()
            .copied()
            .filter(|m| !self.repeats(&[*m]))
            .collect();
        let pool = if fresh.is_empty() { &self.order } else { &fresh };
        if pool.is_empty() {
            return None;
        }

        let focus = pool[self.policy.choose_focus(pool, &self.exposures, &mut *rng)];
        let mut skills = vec![focus];

        if self.policy.pairs_skills() && focus.p_known < self.planner.config.mastery_threshold {
            let supports: Vec<&'a SkillMastery> = self
                .order
                .iter()
                .copied()
                .filter(|m| {
                    m.skill_id != focus.skill_id && m.p_known >= self.planner.config.mastery_threshold
                })
                .collect();
            if !supports.is_empty() && rng.gen_bool(self.planner.config.pairing_rate) {
                if let Some(support) = supports.choose(rng) {
                    let mut pair = vec![focus, *support];
                    pair.sort_by(|a, b| a.skill_id.cmp(&b.skill_id));
                    if !self.repeats(&pair) && fits(&pair) {
                        skills = pair;
                    }
                }
            }
        }

        if fits(&skills) {
            return Some(skills);
        }

        // Focus too expensive for what is left: take the cheapest fitting
        // skill from the same pool, so repeats stay off the table.
        pool.iter()
            .copied()
            .filter(|m| fits(&[*m]))
            .min_by(|a, b| {
                self.planner
                    .slot_cost(self.policy, &[*a])
                    .total_cmp(&self.planner.slot_cost(self.policy, &[*b]))
            })
            .map(|m| vec![m])
    }

    fn repeats(&self, skills: &[&SkillMastery]) -> bool {
        self.previous.as_ref().is_some_and(|prev| {
            prev.len() == skills.len() && prev.iter().zip(skills).all(|(p, m)| *p == m.skill_id)
        })
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn mastery(id: &str, p_known: f64, opportunities: u32) -> SkillMastery {
        let n = f64::from(opportunities);
        SkillMastery {
            skill_id: id.into(),
            p_known,
            confidence: n / (n + 5.0),
            opportunities,
            successes: opportunities / 2,
        }
    }

    fn request(duration_minutes: u32, mode: ProblemGenerationMode) -> PlanRequest {
        PlanRequest {
            player_id: "p1".into(),
            duration_minutes,
            mode,
        }
    }

    fn planner() -> SessionPlanner {
        SessionPlanner::new(PlannerConfig::default()).expect("default config is valid")
    }

    fn skills() -> Vec<SkillMastery> {
        vec![
            mastery("direct-add", 0.95, 30),
            mastery("five-complement", 0.7, 12),
            mastery("ten-complement", 0.1, 8),
        ]
    }

    #[test]
    fn multi_skill_cost_adds_surcharge() {
        let planner = planner();
        let policy = policy_for(ProblemGenerationMode::Classic);
        let a = mastery("a", 0.9, 10);
        let b = mastery("b", 0.9, 10);
        let single = planner.slot_cost(policy.as_ref(), &[&a]);
        let pair = planner.slot_cost(policy.as_ref(), &[&a, &b]);
        assert!((single - 0.5).abs() < 1e-12);
        assert!((pair - 0.625).abs() < 1e-12);
    }

    #[test]
    fn plan_respects_duration_in_every_mode() {
        let planner = planner();
        let masteries = skills();
        for mode in ProblemGenerationMode::ALL {
            for duration in [1, 3, 10, 25] {
                let mut rng = ChaCha8Rng::seed_from_u64(u64::from(duration));
                let plan = planner.plan(&request(duration, mode), &masteries, OffsetDateTime::UNIX_EPOCH, &mut rng);
                assert!(
                    plan.estimated_minutes <= f64::from(duration) + 1e-9,
                    "{mode} {duration}: {}",
                    plan.estimated_minutes
                );
                assert!(plan.slot_count() > 0);
                assert_eq!(plan.status, SessionStatus::Draft);
                assert_eq!(plan.parts.len(), 3);
            }
        }
    }

    #[test]
    fn slot_indices_are_unique_and_consecutive() {
        let planner = planner();
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let plan = planner.plan(
            &request(15, ProblemGenerationMode::AdaptiveBkt),
            &skills(),
            OffsetDateTime::UNIX_EPOCH,
            &mut rng,
        );
        let indices: Vec<usize> = plan.slots().map(|s| s.index).collect();
        let expected: Vec<usize> = (0..plan.slot_count()).collect();
        assert_eq!(indices, expected);
    }

    #[test]
    fn consecutive_slots_differ_when_alternatives_exist() {
        let planner = planner();
        for mode in ProblemGenerationMode::ALL {
            let mut rng = ChaCha8Rng::seed_from_u64(99);
            let plan = planner.plan(&request(20, mode), &skills(), OffsetDateTime::UNIX_EPOCH, &mut rng);
            let sets: Vec<&Vec<SkillId>> = plan.slots().map(|s| &s.skills_targeted).collect();
            for pair in sets.windows(2) {
                assert_ne!(pair[0], pair[1], "{mode}");
            }
            assert!(plan.warnings.is_empty());
        }
    }

    #[test]
    fn single_skill_repeats_with_warning() {
        let planner = planner();
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let plan = planner.plan(
            &request(2, ProblemGenerationMode::Classic),
            &[mastery("only", 0.9, 10)],
            OffsetDateTime::UNIX_EPOCH,
            &mut rng,
        );
        assert_eq!(plan.slot_count(), 4);
        let repeated = plan
            .warnings
            .iter()
            .filter(|w| matches!(w, PlanWarning::RepeatedSkillSet { .. }))
            .count();
        assert_eq!(repeated, 3);
    }

    #[test]
    fn zero_duration_exhausts_budget() {
        let planner = planner();
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let plan = planner.plan(
            &request(0, ProblemGenerationMode::Adaptive),
            &skills(),
            OffsetDateTime::UNIX_EPOCH,
            &mut rng,
        );
        assert_eq!(plan.slot_count(), 0);
        assert!(plan.estimated_minutes.abs() < f64::EPSILON);
        assert!(matches!(
            plan.warnings.as_slice(),
            [PlanWarning::BudgetExhausted { duration_minutes: 0, .. }]
        ));
    }

    #[test]
    fn partial_shares_bound_the_feasibility_check() {
        let config = PlannerConfig {
            part_shares: vec![crate::config::PartShare {
                kind: soroplan_core::PartKind::Abacus,
                share: 0.4,
            }],
            ..PlannerConfig::default()
        };
        let planner = SessionPlanner::new(config).unwrap();
        let skills = [mastery("a", 0.95, 20)];

        let mut rng = ChaCha8Rng::seed_from_u64(5);
        let plan = planner.plan(
            &request(1, ProblemGenerationMode::Classic),
            &skills,
            OffsetDateTime::UNIX_EPOCH,
            &mut rng,
        );
        assert_eq!(plan.slot_count(), 0);
        assert!(matches!(
            plan.warnings.as_slice(),
            [PlanWarning::BudgetExhausted { duration_minutes: 1, .. }]
        ));

        let plan = planner.plan(
            &request(2, ProblemGenerationMode::Classic),
            &skills,
            OffsetDateTime::UNIX_EPOCH,
            &mut rng,
        );
        assert!(plan.slot_count() > 0);
        assert!(plan.estimated_minutes <= 0.8 + 1e-9);
        assert!(!plan
            .warnings
            .iter()
            .any(|w| matches!(w, PlanWarning::BudgetExhausted { .. })));
    }

    #[test]
    fn same_seed_same_plan() {
        let planner = planner();
        let build = || {
            let mut rng = ChaCha8Rng::seed_from_u64(42);
            planner.plan(
                &request(12, ProblemGenerationMode::Adaptive),
                &skills(),
                OffsetDateTime::UNIX_EPOCH,
                &mut rng,
            )
        };
        assert_eq!(build(), build());
    }

    #[test]
    fn pairs_only_weak_focus_with_mastered_support() {
        let planner = SessionPlanner::new(PlannerConfig {
            pairing_rate: 1.0,
            ..PlannerConfig::default()
        })
        .unwrap();
        let mut rng = ChaCha8Rng::seed_from_u64(5);
        let masteries = skills();
        let plan = planner.plan(
            &request(30, ProblemGenerationMode::AdaptiveBkt),
            &masteries,
            OffsetDateTime::UNIX_EPOCH,
            &mut rng,
        );
        let mut saw_pair = false;
        for slot in plan.slots().filter(|s| s.skills_targeted.len() == 2) {
            saw_pair = true;
            assert!(slot.skills_targeted.contains(&"direct-add".to_string()));
        }
        assert!(saw_pair);
    }

    #[test]
    fn expected_slot_minutes_grows_with_weakness() {
        let planner = planner();
        let strong = [mastery("a", 0.95, 30), mastery("b", 0.9, 30)];
        let weak = [mastery("a", 0.1, 30), mastery("b", 0.2, 30)];
        let mode = ProblemGenerationMode::AdaptiveBkt;
        assert!(planner.expected_slot_minutes(mode, &weak) > planner.expected_slot_minutes(mode, &strong));
    }
}
