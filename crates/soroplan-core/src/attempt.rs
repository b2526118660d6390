//! Recorded problem results, the raw material of mastery estimation.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::skill::SkillId;

/// How much help the learner used on a problem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum HelpLevel {
    #[default]
    None = 0,
    Hint = 1,
    Guided = 2,
    Walkthrough = 3,
}

impl TryFrom<u8> for HelpLevel {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::None),
            1 => Ok(Self::Hint),
            2 => Ok(Self::Guided),
            3 => Ok(Self::Walkthrough),
            other => Err(format!("help level must be 0..=3, got {other}")),
        }
    }
}

impl From<HelpLevel> for u8 {
    fn from(level: HelpLevel) -> Self {
        level as u8
    }
}

/// What caused help to be shown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum HelpTrigger {
    #[default]
    None,
    Manual,
    AutoTime,
    AutoErrors,
}

/// One immutable, recorded problem result.
///
/// A problem is answered correctly only if every exercised skill was
/// applied correctly (modulo guess/slip noise).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attempt {
    pub skills_exercised: Vec<SkillId>,
    pub is_correct: bool,
    pub response_time_ms: u64,
    #[serde(default)]
    pub help_level_used: HelpLevel,
    #[serde(with = "time::serde::rfc3339")]
    pub recorded_at: OffsetDateTime,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plan_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slot_index: Option<usize>,
}

impl Attempt {
    /// Builds a free-standing attempt (not tied to a plan slot).
    #[must_use]
    pub fn new(
        skills_exercised: Vec<SkillId>,
        is_correct: bool,
        response_time_ms: u64,
        help_level_used: HelpLevel,
        recorded_at: OffsetDateTime,
    ) -> Self {
        Self {
            skills_exercised,
            is_correct,
            response_time_ms,
            help_level_used,
            recorded_at,
            plan_id: None,
            slot_index: None,
        }
    }
}
