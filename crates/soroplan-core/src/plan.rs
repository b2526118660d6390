//! Session plans, their parts and slots, and the forward-only status
//! machine that governs them.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use time::{Duration, OffsetDateTime};

use crate::attempt::{Attempt, HelpLevel, HelpTrigger};
use crate::error::TransitionError;
use crate::skill::SkillId;

/// Lifecycle status of a session plan. Transitions only ever move one step
/// forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Draft,
    Approved,
    Active,
    Completed,
}

impl SessionStatus {
    /// The only status this one may move to.
    #[must_use]
    pub fn next(self) -> Option<Self> {
        match self {
            Self::Draft => Some(Self::Approved),
            Self::Approved => Some(Self::Active),
            Self::Active => Some(Self::Completed),
            Self::Completed => None,
        }
    }

    #[must_use]
    pub fn can_advance_to(self, to: Self) -> bool {
        self.next() == Some(to)
    }
}

/// Scheduling policy used to build a plan. Chosen per session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProblemGenerationMode {
    Classic,
    Adaptive,
    AdaptiveBkt,
}

impl ProblemGenerationMode {
    pub const ALL: [Self; 3] = [Self::Classic, Self::Adaptive, Self::AdaptiveBkt];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Classic => "classic",
            Self::Adaptive => "adaptive",
            Self::AdaptiveBkt => "adaptive-bkt",
        }
    }
}

impl fmt::Display for ProblemGenerationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProblemGenerationMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "classic" => Ok(Self::Classic),
            "adaptive" => Ok(Self::Adaptive),
            "adaptive-bkt" | "adaptive_bkt" => Ok(Self::AdaptiveBkt),
            other => Err(format!(
                "unknown mode '{other}' (expected classic, adaptive or adaptive-bkt)"
            )),
        }
    }
}

/// Practice format of a plan part.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PartKind {
    /// Working on a physical or on-screen abacus.
    Abacus,
    /// Mental abacus, beads imagined.
    Visualization,
    /// Problems written as a single equation line.
    Linear,
}

/// Concrete problem bound to a slot at session start.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedProblem {
    pub terms: Vec<i64>,
    pub answer: i64,
    pub skills_required: Vec<SkillId>,
}

/// Result payload submitted by the client for one slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlotResult {
    pub slot_index: usize,
    pub problem: GeneratedProblem,
    pub student_answer: i64,
    pub is_correct: bool,
    pub response_time_ms: u64,
    /// Falls back to the problem's `skills_required` when empty.
    #[serde(default)]
    pub skills_exercised: Vec<SkillId>,
    #[serde(default)]
    pub help_level_used: HelpLevel,
    #[serde(default)]
    pub incorrect_attempts: u32,
    #[serde(default)]
    pub help_trigger: HelpTrigger,
}

/// What was stored when a slot got resolved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlotRecord {
    pub attempt: Attempt,
    pub student_answer: i64,
    pub incorrect_attempts: u32,
    pub help_trigger: HelpTrigger,
}

/// One schedulable unit of a plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Slot {
    /// Unique across the whole plan.
    pub index: usize,
    pub skills_targeted: Vec<SkillId>,
    /// Planned share of the duration budget, in minutes.
    pub estimated_cost_minutes: f64,
    /// Filled at session start.
    pub problem: Option<GeneratedProblem>,
    /// Filled once the result is recorded.
    pub result: Option<SlotRecord>,
}

impl Slot {
    #[must_use]
    pub fn is_filled(&self) -> bool {
        self.problem.is_some()
    }

    #[must_use]
    pub fn is_resolved(&self) -> bool {
        self.result.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Part {
    pub kind: PartKind,
    pub budget_minutes: f64,
    pub slots: Vec<Slot>,
}

/// Non-fatal conditions met while planning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum PlanWarning {
    /// Not even the cheapest slot fits the requested duration.
    BudgetExhausted {
        duration_minutes: u32,
        cheapest_slot_minutes: f64,
    },
    /// Only one skill set was available, so a slot repeats its predecessor.
    RepeatedSkillSet { slot_index: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CompletionReason {
    AllResolved,
    Timeout,
}

/// A learner's planned practice session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionPlan {
    pub id: String,
    pub player_id: String,
    pub status: SessionStatus,
    pub mode: ProblemGenerationMode,
    pub duration_minutes: u32,
    /// Sum of the slots' estimated costs.
    pub estimated_minutes: f64,
    pub parts: Vec<Part>,
    #[serde(default)]
    pub warnings: Vec<PlanWarning>,
    /// Bumped on every stored write; used for optimistic checks.
    #[serde(default)]
    pub revision: u64,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub approved_at: Option<OffsetDateTime>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub started_at: Option<OffsetDateTime>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub completed_at: Option<OffsetDateTime>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completion: Option<CompletionReason>,
}

impl SessionPlan {
    pub fn slots(&self) -> impl Iterator<Item = &Slot> {
        self.parts.iter().flat_map(|part| part.slots.iter())
    }

    pub fn slots_mut(&mut self) -> impl Iterator<Item = &mut Slot> {
        self.parts.iter_mut().flat_map(|part| part.slots.iter_mut())
    }

    #[must_use]
    pub fn slot(&self, index: usize) -> Option<&Slot> {
        self.slots().find(|slot| slot.index == index)
    }

    pub fn slot_mut(&mut self, index: usize) -> Option<&mut Slot> {
        self.slots_mut().find(|slot| slot.index == index)
    }

    #[must_use]
    pub fn slot_count(&self) -> usize {
        self.parts.iter().map(|part| part.slots.len()).sum()
    }

    #[must_use]
    pub fn resolved_count(&self) -> usize {
        self.slots().filter(|slot| slot.is_resolved()).count()
    }

    #[must_use]
    pub fn all_resolved(&self) -> bool {
        self.slots().all(Slot::is_resolved)
    }

    /// End of the duration budget, once the plan has started.
    #[must_use]
    pub fn deadline(&self) -> Option<OffsetDateTime> {
        self.started_at
            .map(|start| start + Duration::minutes(i64::from(self.duration_minutes)))
    }

    /// Moves the status one step forward and stamps the matching timestamp.
    pub fn advance(&mut self, to: SessionStatus, now: OffsetDateTime) -> Result<(), TransitionError> {
        if !self.status.can_advance_to(to) {
            return Err(TransitionError {
                from: self.status,
                to,
            });
        }
        match to {
            SessionStatus::Approved => self.approved_at = Some(now),
            SessionStatus::Active => self.started_at = Some(now),
            SessionStatus::Completed => self.completed_at = Some(now),
            SessionStatus::Draft => {}
        }
        self.status = to;
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;

    fn empty_plan() -> SessionPlan {
        SessionPlan {
            id: "plan-1".into(),
            player_id: "p1".into(),
            status: SessionStatus::Draft,
            mode: ProblemGenerationMode::Classic,
            duration_minutes: 10,
            estimated_minutes: 1.0,
            parts: vec![Part {
                kind: PartKind::Abacus,
                budget_minutes: 10.0,
                slots: vec![
                    Slot {
                        index: 0,
                        skills_targeted: vec!["a".into()],
                        estimated_cost_minutes: 0.5,
                        problem: None,
                        result: None,
                    },
                    Slot {
                        index: 1,
                        skills_targeted: vec!["b".into()],
                        estimated_cost_minutes: 0.5,
                        problem: None,
                        result: None,
                    },
                ],
            }],
            warnings: vec![],
            revision: 0,
            created_at: OffsetDateTime::UNIX_EPOCH,
            approved_at: None,
            started_at: None,
            completed_at: None,
            completion: None,
        }
    }

    #[test]
    fn status_only_moves_one_step_forward() {
        assert!(SessionStatus::Draft.can_advance_to(SessionStatus::Approved));
        assert!(!SessionStatus::Draft.can_advance_to(SessionStatus::Active));
        assert!(!SessionStatus::Active.can_advance_to(SessionStatus::Approved));
        assert!(!SessionStatus::Completed.can_advance_to(SessionStatus::Completed));
        assert_eq!(SessionStatus::Completed.next(), None);
    }

    #[test]
    fn advance_stamps_timestamps_and_rejects_skips() {
        let mut plan = empty_plan();
        let now = OffsetDateTime::UNIX_EPOCH + Duration::hours(1);

        let err = plan.advance(SessionStatus::Active, now).unwrap_err();
        assert_eq!(err.from, SessionStatus::Draft);
        assert_eq!(plan.status, SessionStatus::Draft);

        plan.advance(SessionStatus::Approved, now).unwrap();
        plan.advance(SessionStatus::Active, now).unwrap();
        assert_eq!(plan.started_at, Some(now));
        assert_eq!(plan.deadline(), Some(now + Duration::minutes(10)));
    }

    #[test]
    fn slot_lookup_spans_parts() {
        let mut plan = empty_plan();
        plan.parts.push(Part {
            kind: PartKind::Linear,
            budget_minutes: 2.0,
            slots: vec![Slot {
                index: 2,
                skills_targeted: vec!["c".into()],
                estimated_cost_minutes: 0.5,
                problem: None,
                result: None,
            }],
        });
        assert_eq!(plan.slot_count(), 3);
        assert_eq!(plan.slot(2).map(|s| s.skills_targeted[0].as_str()), Some("c"));
        assert!(plan.slot(3).is_none());
        assert!(!plan.all_resolved());
    }

    #[test]
    fn mode_parses_and_serializes_kebab_case() {
        assert_eq!(
            "adaptive-bkt".parse::<ProblemGenerationMode>(),
            Ok(ProblemGenerationMode::AdaptiveBkt)
        );
        assert!("bkt".parse::<ProblemGenerationMode>().is_err());
        let json = serde_json::to_string(&ProblemGenerationMode::AdaptiveBkt).expect("serialize");
        assert_eq!(json, "\"adaptive-bkt\"");
    }

    #[test]
    fn plan_serializes_with_rfc3339_timestamps() {
        let plan = empty_plan();
        let json = serde_json::to_string(&plan).expect("serialize");
        assert!(json.contains("\"created_at\":\"1970-01-01T00:00:00Z\""));
        let back: SessionPlan = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, plan);
    }
}
