//! Session lifecycle: draft → approved → active → completed.
//!
//! [`SessionService`] is stateless apart from its planner. Every operation
//! receives its collaborators through a [`SessionContext`], reads the plan,
//! applies one forward step and writes it back with the revision it read.
//! A rejected write is re-read once to report what actually happened; it is
//! never retried.

use rand::Rng;
use soroplan_core::{
    debug_event, warn_event, Attempt, AttemptHistory, Clock, CompletionReason, PlanStore,
    ProblemGenerator, ProgressTracker, SessionPlan, SessionStatus, SkillId, SkillMastery,
    SkillPriorStore, SlotRecord, SlotResult, StoreError,
};
use time::OffsetDateTime;

use crate::config::PlannerConfig;
use crate::error::{Result, SessionError};
use crate::planner::{PlanRequest, SessionPlanner};

/// Collaborator handles for one lifecycle call.
#[derive(Clone, Copy)]
pub struct SessionContext<'a> {
    pub plans: &'a dyn PlanStore,
    pub history: &'a dyn AttemptHistory,
    pub priors: &'a dyn SkillPriorStore,
    pub progress: &'a dyn ProgressTracker,
    pub clock: &'a dyn Clock,
}

#[derive(Debug, Clone)]
pub struct SessionService {
    planner: SessionPlanner,
}

impl SessionService {
    #[must_use]
    pub fn new(planner: SessionPlanner) -> Self {
        Self { planner }
    }

    pub fn with_config(config: PlannerConfig) -> Result<Self> {
        Ok(Self::new(SessionPlanner::new(config)?))
    }

    #[must_use]
    pub fn planner(&self) -> &SessionPlanner {
        &self.planner
    }

    /// Estimates mastery for the player's practicing skills, plans a draft
    /// and stores it.
    pub fn generate_session_plan<R>(
        &self,
        ctx: &SessionContext<'_>,
        request: &PlanRequest,
        rng: &mut R,
    ) -> Result<SessionPlan>
    where
        R: Rng,
    {
        let practicing = dedup(ctx.progress.practicing_skills(&request.player_id)?);
        if practicing.is_empty() {
            return Err(SessionError::NoPracticingSkills(request.player_id.clone()));
        }

        let missing: Vec<SkillId> = practicing
            .iter()
            .filter(|skill| ctx.priors.skill_params(skill).is_none())
            .cloned()
            .collect();
        if !missing.is_empty() {
            return Err(SessionError::MissingPrerequisiteData { skills: missing });
        }

        let history = ctx
            .history
            .recent_attempts(&request.player_id, self.planner.config().history_window)?;
        let masteries: Vec<SkillMastery> = self
            .planner
            .config()
            .estimator()
            .estimate_for(&history, ctx.priors, &practicing)
            .into_iter()
            .filter(|m| practicing.contains(&m.skill_id))
            .collect();

        let plan = self
            .planner
            .plan(request, &masteries, ctx.clock.now(), rng);
        ctx.plans.insert_plan(plan.clone())?;
        debug_event!(
            "plan {} drafted for player {}: {} slots, {:.2}/{} min",
            plan.id,
            plan.player_id,
            plan.slot_count(),
            plan.estimated_minutes,
            plan.duration_minutes
        );
        Ok(plan)
    }

    pub fn approve_session_plan(&self, ctx: &SessionContext<'_>, plan_id: &str) -> Result<SessionPlan> {
        let mut plan = load(ctx, plan_id)?;
        let expected = plan.revision;
        advance(&mut plan, SessionStatus::Approved, ctx.clock.now(), "approve")?;
        save(ctx, &mut plan, expected, "approve")?;
        Ok(plan)
    }

    /// Activates an approved plan, generating each slot's problem once.
    ///
    /// A plan without slots completes right after activation.
    pub fn start_session_plan(
        &self,
        ctx: &SessionContext<'_>,
        generator: &mut dyn ProblemGenerator,
        plan_id: &str,
    ) -> Result<SessionPlan> {
        let mut plan = load(ctx, plan_id)?;
        let expected = plan.revision;
        let now = ctx.clock.now();
        advance(&mut plan, SessionStatus::Active, now, "start")?;

        for slot in plan.slots_mut() {
            let problem = generator
                .generate(&slot.skills_targeted)
                .map_err(|reason| SessionError::ProblemGeneration {
                    slot_index: slot.index,
                    reason,
                })?;
            slot.problem = Some(problem);
        }

        if plan.slot_count() == 0 {
            complete(&mut plan, CompletionReason::AllResolved, now)?;
        }
        save(ctx, &mut plan, expected, "start")?;
        Ok(plan)
    }

    /// Resolves one slot and appends the matching attempt to history.
    pub fn record_slot_result(
        &self,
        ctx: &SessionContext<'_>,
        plan_id: &str,
        result: SlotResult,
    ) -> Result<()> {
        const OPERATION: &str = "record a result for";

        let mut plan = load(ctx, plan_id)?;
        let expected = plan.revision;
        if plan.status != SessionStatus::Active {
            return Err(invalid(&plan, OPERATION));
        }

        let now = ctx.clock.now();
        if is_overdue(&plan, now) {
            warn_event!("plan {plan_id} passed its deadline, completing on timeout");
            complete(&mut plan, CompletionReason::Timeout, now)?;
            save(ctx, &mut plan, expected, OPERATION)?;
            return Err(invalid(&plan, OPERATION));
        }

        let slot_index = result.slot_index;
        let slot_not_found = || SessionError::SlotNotFound {
            plan_id: plan_id.to_string(),
            slot_index,
        };
        let slot = plan.slot_mut(slot_index).ok_or_else(slot_not_found)?;
        if slot.is_resolved() {
            return Err(slot_not_found());
        }

        let skills_exercised = if !result.skills_exercised.is_empty() {
            result.skills_exercised
        } else if !result.problem.skills_required.is_empty() {
            result.problem.skills_required.clone()
        } else {
            slot.skills_targeted.clone()
        };
        let attempt = Attempt {
            skills_exercised,
            is_correct: result.is_correct,
            response_time_ms: result.response_time_ms,
            help_level_used: result.help_level_used,
            recorded_at: now,
            plan_id: Some(plan_id.to_string()),
            slot_index: Some(slot_index),
        };
        if slot.problem.is_none() {
            slot.problem = Some(result.problem);
        }
        slot.result = Some(SlotRecord {
            attempt: attempt.clone(),
            student_answer: result.student_answer,
            incorrect_attempts: result.incorrect_attempts,
            help_trigger: result.help_trigger,
        });

        if plan.all_resolved() {
            complete(&mut plan, CompletionReason::AllResolved, now)?;
        }

        match ctx.plans.commit_slot_result(&plan, expected, attempt) {
            Ok(()) => {
                debug_event!(
                    "plan {plan_id}: slot {slot_index} resolved ({}/{})",
                    plan.resolved_count(),
                    plan.slot_count()
                );
                Ok(())
            }
            Err(err) => Err(classify_conflict(ctx, plan_id, Some(slot_index), OPERATION, err)),
        }
    }

    /// Completes an active plan whose deadline has passed. Other active plans
    /// are returned unchanged.
    pub fn expire_overdue(&self, ctx: &SessionContext<'_>, plan_id: &str) -> Result<SessionPlan> {
        const OPERATION: &str = "expire";

        let mut plan = load(ctx, plan_id)?;
        if plan.status != SessionStatus::Active {
            return Err(invalid(&plan, OPERATION));
        }
        let now = ctx.clock.now();
        if !is_overdue(&plan, now) {
            return Ok(plan);
        }
        let expected = plan.revision;
        warn_event!("plan {plan_id} expired with {} of {} slots resolved", plan.resolved_count(), plan.slot_count());
        complete(&mut plan, CompletionReason::Timeout, now)?;
        save(ctx, &mut plan, expected, OPERATION)?;
        Ok(plan)
    }

    pub fn get_session_plan(&self, ctx: &SessionContext<'_>, plan_id: &str) -> Result<Option<SessionPlan>> {
        Ok(ctx.plans.load_plan(plan_id)?)
    }

    /// Mastery of every skill in `attempts`, using the context's priors.
    #[must_use]
    pub fn compute_mastery_from_history(
        &self,
        ctx: &SessionContext<'_>,
        attempts: &[Attempt],
    ) -> Vec<SkillMastery> {
        self.planner.config().estimator().estimate(attempts, ctx.priors)
    }
}

fn dedup(skills: Vec<SkillId>) -> Vec<SkillId> {
    let mut unique = Vec::with_capacity(skills.len());
    for skill in skills {
        if !unique.contains(&skill) {
            unique.push(skill);
        }
    }
    unique
}

fn load(ctx: &SessionContext<'_>, plan_id: &str) -> Result<SessionPlan> {
    ctx.plans
        .load_plan(plan_id)?
        .ok_or_else(|| SessionError::PlanNotFound(plan_id.to_string()))
}

fn invalid(plan: &SessionPlan, operation: &'static str) -> SessionError {
    SessionError::InvalidTransition {
        plan_id: plan.id.clone(),
        status: plan.status,
        operation,
    }
}

fn advance(
    plan: &mut SessionPlan,
    to: SessionStatus,
    now: OffsetDateTime,
    operation: &'static str,
) -> Result<()> {
    plan.advance(to, now).map_err(|_| invalid(plan, operation))?;
    debug_event!("plan {} is now {:?}", plan.id, to);
    Ok(())
}

fn complete(plan: &mut SessionPlan, reason: CompletionReason, now: OffsetDateTime) -> Result<()> {
    advance(plan, SessionStatus::Completed, now, "complete")?;
    plan.completion = Some(reason);
    Ok(())
}

fn is_overdue(plan: &SessionPlan, now: OffsetDateTime) -> bool {
    plan.deadline().is_some_and(|deadline| now >= deadline)
}

/// Writes `plan` based on `expected`; on success `plan` carries the stored
/// revision.
fn save(
    ctx: &SessionContext<'_>,
    plan: &mut SessionPlan,
    expected: u64,
    operation: &'static str,
) -> Result<()> {
    match ctx.plans.save_plan(plan, expected) {
        Ok(()) => {
            plan.revision = expected + 1;
            Ok(())
        }
        Err(err) => Err(classify_conflict(ctx, &plan.id, None, operation, err)),
    }
}

/// Turns a rejected write into the error the caller would have seen had it
/// read the newer plan. Non-conflict failures pass through.
fn classify_conflict(
    ctx: &SessionContext<'_>,
    plan_id: &str,
    slot_index: Option<usize>,
    operation: &'static str,
    err: StoreError,
) -> SessionError {
    if !matches!(err, StoreError::Conflict { .. }) {
        return err.into();
    }
    let current = match ctx.plans.load_plan(plan_id) {
        Ok(Some(plan)) => plan,
        Ok(None) => return SessionError::PlanNotFound(plan_id.to_string()),
        Err(reload) => return reload.into(),
    };
    debug_event!("write to plan {plan_id} lost a race, plan is now {:?}", current.status);

    if let Some(slot_index) = slot_index {
        if current.status == SessionStatus::Active
            && current.slot(slot_index).map_or(true, |slot| slot.is_resolved())
        {
            return SessionError::SlotNotFound {
                plan_id: plan_id.to_string(),
                slot_index,
            };
        }
        if current.status != SessionStatus::Active {
            return invalid(&current, operation);
        }
        return err.into();
    }
    invalid(&current, operation)
}
