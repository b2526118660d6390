#![warn(clippy::unwrap_used, clippy::expect_used)]

//! Retrospective analysis of practice sessions.
//!
//! This crate reads finished (or partially finished) plans and attempt
//! histories and reports how a learner did and how well a scheduling mode
//! surfaced weak skills. It never changes plans or estimates itself.

pub mod simulation;

use serde::{Deserialize, Serialize};
use soroplan_core::{
    Attempt, CompletionReason, HelpLevel, ProblemGenerationMode, SessionPlan, SessionStatus,
    SkillId,
};
use std::collections::{BTreeMap, BTreeSet};

// Pattern detection thresholds
/// Minimum attempts on a skill before its failure rate is judged
const PATTERN_MIN_ATTEMPTS_PER_SKILL: usize = 5;
/// Failure rate (60%) above which a skill is flagged
const PATTERN_HIGH_FAILURE_THRESHOLD: f64 = 0.6;
/// Share of helped answers (50%) above which help reliance is flagged
const PATTERN_HELP_RELIANCE_THRESHOLD: f64 = 0.5;
/// Share of resolved slots (50%) below which a timed-out session is flagged
const PATTERN_LOW_COMPLETION_THRESHOLD: f64 = 0.5;

/// Statistics aggregated from attempts.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutcomeStatistics {
    /// Total number of attempts (successes + failures).
    pub total: usize,
    pub successes: usize,
    pub failures: usize,
    /// Attempts answered with any help level above none.
    pub helped: usize,
    pub total_response_ms: u64,
}

impl OutcomeStatistics {
    pub fn record(&mut self, attempt: &Attempt) {
        self.total += 1;
        if attempt.is_correct {
            self.successes += 1;
        } else {
            self.failures += 1;
        }
        if attempt.help_level_used > HelpLevel::None {
            self.helped += 1;
        }
        self.total_response_ms = self.total_response_ms.saturating_add(attempt.response_time_ms);
    }

    /// Success rate (0.0 to 1.0).
    #[must_use]
    pub fn success_rate(&self) -> f64 {
        self.ratio(self.successes)
    }

    /// Failure rate (0.0 to 1.0).
    #[must_use]
    pub fn failure_rate(&self) -> f64 {
        debug_assert!(
            self.successes + self.failures == self.total,
            "OutcomeStatistics totals are inconsistent"
        );
        if self.total == 0 {
            return 0.0;
        }
        1.0 - self.success_rate()
    }

    #[must_use]
    pub fn help_rate(&self) -> f64 {
        self.ratio(self.helped)
    }

    #[must_use]
    pub fn mean_response_ms(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        #[allow(clippy::cast_precision_loss)]
        {
            self.total_response_ms as f64 / self.total as f64
        }
    }

    fn ratio(&self, count: usize) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        #[allow(clippy::cast_precision_loss)]
        {
            count as f64 / self.total as f64
        }
    }
}

/// Per-skill statistics; a multi-skill attempt counts toward every skill.
#[must_use]
pub fn aggregate_by_skill(attempts: &[Attempt]) -> BTreeMap<SkillId, OutcomeStatistics> {
    let mut stats: BTreeMap<SkillId, OutcomeStatistics> = BTreeMap::new();
    for attempt in attempts {
        let unique: BTreeSet<&SkillId> = attempt.skills_exercised.iter().collect();
        for skill in unique {
            stats.entry(skill.clone()).or_default().record(attempt);
        }
    }
    stats
}

#[must_use]
pub fn summarize(attempts: &[Attempt]) -> OutcomeStatistics {
    let mut stats = OutcomeStatistics::default();
    for attempt in attempts {
        stats.record(attempt);
    }
    stats
}

/// Flags skills and sessions that need attention.
#[derive(Debug, Clone, Copy)]
pub struct SessionAnalyzer {
    /// Minimum number of attempts before any pattern is reported
    min_attempts: usize,
}

impl Default for SessionAnalyzer {
    fn default() -> Self {
        Self { min_attempts: 10 }
    }
}

impl SessionAnalyzer {
    #[must_use]
    pub fn new(min_attempts: usize) -> Self {
        Self { min_attempts }
    }

    /// Heuristic patterns over a set of attempts, most specific first.
    #[must_use]
    pub fn analyze_patterns(&self, attempts: &[Attempt]) -> Vec<String> {
        let mut patterns = Vec::new();
        if attempts.len() < self.min_attempts {
            return patterns;
        }

        for (skill, stats) in aggregate_by_skill(attempts) {
            if stats.total >= PATTERN_MIN_ATTEMPTS_PER_SKILL
                && stats.failure_rate() > PATTERN_HIGH_FAILURE_THRESHOLD
            {
                patterns.push(format!(
                    "High failure rate ({:.1}%) on skill '{}'",
                    stats.failure_rate() * 100.0,
                    skill
                ));
            }
        }

        let overall = summarize(attempts);
        if overall.help_rate() > PATTERN_HELP_RELIANCE_THRESHOLD {
            patterns.push(format!(
                "Help used on {:.1}% of problems",
                overall.help_rate() * 100.0
            ));
        }
        patterns
    }

    #[must_use]
    pub fn summarize_plan(&self, plan: &SessionPlan) -> SessionSummary {
        let attempts: Vec<Attempt> = plan
            .slots()
            .filter_map(|slot| slot.result.as_ref().map(|record| record.attempt.clone()))
            .collect();

        let mut patterns = self.analyze_patterns(&attempts);
        let slots_planned = plan.slot_count();
        if plan.completion == Some(CompletionReason::Timeout) && slots_planned > 0 {
            #[allow(clippy::cast_precision_loss)]
            let completed = attempts.len() as f64 / slots_planned as f64;
            if completed < PATTERN_LOW_COMPLETION_THRESHOLD {
                patterns.push(format!(
                    "Session timed out with only {}/{} slots resolved",
                    attempts.len(),
                    slots_planned
                ));
            }
        }

        SessionSummary {
            plan_id: plan.id.clone(),
            player_id: plan.player_id.clone(),
            mode: plan.mode,
            status: plan.status,
            completion: plan.completion,
            duration_minutes: plan.duration_minutes,
            estimated_minutes: plan.estimated_minutes,
            slots_planned,
            slots_resolved: attempts.len(),
            overall: summarize(&attempts),
            per_skill: aggregate_by_skill(&attempts),
            patterns,
        }
    }
}

/// Outcome of one session plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub plan_id: String,
    pub player_id: String,
    pub mode: ProblemGenerationMode,
    pub status: SessionStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completion: Option<CompletionReason>,
    pub duration_minutes: u32,
    pub estimated_minutes: f64,
    pub slots_planned: usize,
    pub slots_resolved: usize,
    pub overall: OutcomeStatistics,
    pub per_skill: BTreeMap<SkillId, OutcomeStatistics>,
    pub patterns: Vec<String>,
}

impl SessionSummary {
    /// Summary with the default analyzer thresholds.
    #[must_use]
    pub fn from_plan(plan: &SessionPlan) -> Self {
        SessionAnalyzer::default().summarize_plan(plan)
    }
}

/// How often a set of target skills was scheduled compared to a uniform
/// rotation over all practicing skills.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SurfacingReport {
    pub targets: Vec<SkillId>,
    pub practicing_count: usize,
    pub slots: usize,
    /// Σ over slots of targeted skills that are in `targets`.
    pub target_exposures: usize,
    /// `slots · |targets| / practicing_count`.
    pub expected_exposures: f64,
    /// `target_exposures / expected_exposures`; 1.0 means uniform.
    pub ratio: f64,
}

impl SurfacingReport {
    #[must_use]
    pub fn measure<'a>(
        plans: impl IntoIterator<Item = &'a SessionPlan>,
        targets: &[SkillId],
        practicing_count: usize,
    ) -> Self {
        let target_set: BTreeSet<&SkillId> = targets.iter().collect();
        let mut slots = 0;
        let mut target_exposures = 0;
        for plan in plans {
            for slot in plan.slots() {
                slots += 1;
                target_exposures += slot
                    .skills_targeted
                    .iter()
                    .filter(|skill| target_set.contains(skill))
                    .count();
            }
        }

        #[allow(clippy::cast_precision_loss)]
        let expected_exposures = if practicing_count == 0 {
            0.0
        } else {
            slots as f64 * target_set.len() as f64 / practicing_count as f64
        };
        #[allow(clippy::cast_precision_loss)]
        let ratio = if expected_exposures > 0.0 {
            target_exposures as f64 / expected_exposures
        } else {
            0.0
        };

        Self {
            targets: target_set.into_iter().cloned().collect(),
            practicing_count,
            slots,
            target_exposures,
            expected_exposures,
            ratio,
        }
    }
}
