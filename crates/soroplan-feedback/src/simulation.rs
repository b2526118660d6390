//! Seeded multi-session simulation of the full practice loop.
//!
//! A [`SimulatedLearner`] with known ground-truth mastery answers every slot
//! of plan after plan (plan → approve → start → record) while the engine only
//! sees the recorded attempts. Comparing modes on the same learner and seed
//! shows how well each one surfaces the learner's weak skills.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use soroplan_core::{
    debug_event, Clock, GeneratedProblem, ProblemGenerationMode, ProblemGenerator, SessionPlan,
    SkillBktParams, SkillId, SkillMastery, SlotResult,
};
use soroplan_scheduler::{
    InMemoryStore, PlanRequest, PlannerConfig, Result, SessionContext, SessionService,
    StaticProgress,
};
use std::cell::Cell;
use std::collections::{BTreeMap, HashMap};
use time::{Duration, OffsetDateTime};

use crate::{summarize, OutcomeStatistics, SurfacingReport};

/// Problem generator drawing one single-digit term per required skill.
#[derive(Debug, Clone)]
pub struct SeededGenerator {
    rng: ChaCha8Rng,
}

impl SeededGenerator {
    #[must_use]
    pub fn new(seed: u64) -> Self {
        Self {
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }
}

impl ProblemGenerator for SeededGenerator {
    fn generate(&mut self, skills_required: &[SkillId]) -> std::result::Result<GeneratedProblem, String> {
        if skills_required.is_empty() {
            return Err("no skills to build a problem from".to_string());
        }
        let mut terms = vec![self.rng.gen_range(1..=9)];
        terms.extend(skills_required.iter().map(|_| self.rng.gen_range(1..=9)));
        Ok(GeneratedProblem {
            answer: terms.iter().sum(),
            terms,
            skills_required: skills_required.to_vec(),
        })
    }
}

/// Ground truth for one skill of the simulated learner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulatedSkill {
    pub skill_id: SkillId,
    /// Probability the learner actually knows the skill.
    pub true_p_known: f64,
    /// Priors handed to the engine; guess and slip also drive the learner.
    #[serde(default)]
    pub params: SkillBktParams,
}

/// Learner whose answers follow the conjunctive guess/slip model.
#[derive(Debug, Clone)]
pub struct SimulatedLearner {
    skills: BTreeMap<SkillId, SimulatedSkill>,
    /// Ground-truth gain per practiced opportunity.
    learn_rate: f64,
}

impl SimulatedLearner {
    #[must_use]
    pub fn new(skills: &[SimulatedSkill], learn_rate: f64) -> Self {
        Self {
            skills: skills
                .iter()
                .map(|s| (s.skill_id.clone(), s.clone()))
                .collect(),
            learn_rate: learn_rate.clamp(0.0, 1.0),
        }
    }

    #[must_use]
    pub fn true_p_known(&self, skill_id: &str) -> Option<f64> {
        self.skills.get(skill_id).map(|s| s.true_p_known)
    }

    /// Answers a problem; unknown skills are treated as never learned.
    pub fn answer<R: Rng>(&mut self, skills: &[SkillId], rng: &mut R) -> bool {
        let mut correct = true;
        for skill_id in skills {
            let (p_known, params) = self
                .skills
                .get(skill_id)
                .map_or((0.0, SkillBktParams::default()), |s| (s.true_p_known, s.params));
            let applied = if rng.gen_bool(p_known.clamp(0.0, 1.0)) {
                !rng.gen_bool(params.slip_prob.clamp(0.0, 1.0))
            } else {
                rng.gen_bool(params.guess_prob.clamp(0.0, 1.0))
            };
            correct &= applied;
        }
        for skill_id in skills {
            if let Some(skill) = self.skills.get_mut(skill_id) {
                skill.true_p_known += (1.0 - skill.true_p_known) * self.learn_rate;
            }
        }
        correct
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    pub seed: u64,
    pub sessions: usize,
    pub duration_minutes: u32,
    pub learn_rate: f64,
    pub response_time_ms: u64,
    pub planner: PlannerConfig,
    pub skills: Vec<SimulatedSkill>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        let skill = |id: &str, true_p_known: f64| SimulatedSkill {
            skill_id: id.to_string(),
            true_p_known,
            params: SkillBktParams::default(),
        };
        Self {
            seed: 7,
            sessions: 30,
            duration_minutes: 10,
            learn_rate: 0.01,
            response_time_ms: 4_000,
            planner: PlannerConfig::default(),
            skills: vec![
                skill("basic.directAddition", 0.95),
                skill("basic.directSubtraction", 0.9),
                skill("fiveComplements.4=5-1", 0.9),
                skill("fiveComplements.3=5-2", 0.85),
                skill("tenComplements.1=10-9", 0.05),
            ],
        }
    }
}

impl SimulationConfig {
    /// Skills whose ground truth starts below the mastery threshold.
    #[must_use]
    pub fn weak_skills(&self) -> Vec<SkillId> {
        self.skills
            .iter()
            .filter(|s| s.true_p_known < self.planner.mastery_threshold)
            .map(|s| s.skill_id.clone())
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModeReport {
    pub mode: ProblemGenerationMode,
    pub surfacing: SurfacingReport,
    pub outcomes: OutcomeStatistics,
    /// Engine estimates after the last session.
    pub final_masteries: Vec<SkillMastery>,
    /// Learner ground truth after the last session.
    pub final_true_p_known: BTreeMap<SkillId, f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationReport {
    pub seed: u64,
    pub sessions: usize,
    pub weak_skills: Vec<SkillId>,
    pub modes: Vec<ModeReport>,
}

impl SimulationReport {
    #[must_use]
    pub fn mode(&self, mode: ProblemGenerationMode) -> Option<&ModeReport> {
        self.modes.iter().find(|report| report.mode == mode)
    }
}

struct SteppedClock(Cell<OffsetDateTime>);

impl Clock for SteppedClock {
    fn now(&self) -> OffsetDateTime {
        self.0.get()
    }
}

/// Runs every mode against an identical learner and seed.
pub fn run(config: &SimulationConfig) -> Result<SimulationReport> {
    let weak_skills = config.weak_skills();
    let modes = ProblemGenerationMode::ALL
        .iter()
        .map(|&mode| run_mode(config, mode, &weak_skills))
        .collect::<Result<Vec<_>>>()?;
    Ok(SimulationReport {
        seed: config.seed,
        sessions: config.sessions,
        weak_skills,
        modes,
    })
}

fn run_mode(
    config: &SimulationConfig,
    mode: ProblemGenerationMode,
    weak_skills: &[SkillId],
) -> Result<ModeReport> {
    const PLAYER: &str = "simulated";

    let service = SessionService::with_config(config.planner.clone())?;
    let store = InMemoryStore::new();
    let priors: HashMap<SkillId, SkillBktParams> = config
        .skills
        .iter()
        .map(|s| (s.skill_id.clone(), s.params))
        .collect();
    let practicing: Vec<SkillId> = config.skills.iter().map(|s| s.skill_id.clone()).collect();
    let progress = StaticProgress::new().with_player(PLAYER, practicing.clone());
    let clock = SteppedClock(Cell::new(OffsetDateTime::UNIX_EPOCH));
    let ctx = SessionContext {
        plans: &store,
        history: &store,
        priors: &priors,
        progress: &progress,
        clock: &clock,
    };

    let mut rng = ChaCha8Rng::seed_from_u64(config.seed);
    let mut generator = SeededGenerator::new(config.seed.wrapping_add(1));
    let mut learner = SimulatedLearner::new(&config.skills, config.learn_rate);
    let request = PlanRequest {
        player_id: PLAYER.to_string(),
        duration_minutes: config.duration_minutes,
        mode,
    };

    let mut plans: Vec<SessionPlan> = Vec::with_capacity(config.sessions);
    for session in 0..config.sessions {
        let draft = service.generate_session_plan(&ctx, &request, &mut rng)?;
        service.approve_session_plan(&ctx, &draft.id)?;
        let active = service.start_session_plan(&ctx, &mut generator, &draft.id)?;

        for slot in active.slots() {
            let Some(problem) = slot.problem.clone() else {
                continue;
            };
            let is_correct = learner.answer(&slot.skills_targeted, &mut rng);
            let result = SlotResult {
                slot_index: slot.index,
                student_answer: if is_correct { problem.answer } else { problem.answer + 1 },
                problem,
                is_correct,
                response_time_ms: config.response_time_ms,
                skills_exercised: slot.skills_targeted.clone(),
                help_level_used: Default::default(),
                incorrect_attempts: u32::from(!is_correct),
                help_trigger: Default::default(),
            };
            service.record_slot_result(&ctx, &draft.id, result)?;
        }

        if let Some(plan) = service.get_session_plan(&ctx, &draft.id)? {
            plans.push(plan);
        }
        debug_event!("simulation {mode}: session {session} done");
        clock.0.set(clock.0.get() + Duration::days(1));
    }

    let attempts: Vec<_> = plans
        .iter()
        .flat_map(|plan| plan.slots())
        .filter_map(|slot| slot.result.as_ref().map(|record| record.attempt.clone()))
        .collect();
    let final_masteries = service.compute_mastery_from_history(&ctx, &attempts);
    let final_true_p_known = practicing
        .iter()
        .filter_map(|id| learner.true_p_known(id).map(|p| (id.clone(), p)))
        .collect();

    Ok(ModeReport {
        mode,
        surfacing: SurfacingReport::measure(&plans, weak_skills, practicing.len()),
        outcomes: summarize(&attempts),
        final_masteries,
        final_true_p_known,
    })
}
