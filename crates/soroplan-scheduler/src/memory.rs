//! In-process implementations of the collaborator traits.
//!
//! [`InMemoryStore`] serves both plans and attempt history behind one lock,
//! so a slot result and its attempt are committed together. Its
//! [`StoreSnapshot`] is what the CLI persists between invocations.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use soroplan_core::{
    Attempt, AttemptHistory, PlanStore, ProgressTracker, SessionPlan, SkillId, StoreError,
};
use std::collections::BTreeMap;

/// Serializable contents of an [`InMemoryStore`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoreSnapshot {
    #[serde(default)]
    pub plans: BTreeMap<String, SessionPlan>,
    /// Attempt history per player, in append order.
    #[serde(default)]
    pub attempts: BTreeMap<String, Vec<Attempt>>,
}

#[derive(Debug, Default)]
pub struct InMemoryStore {
    inner: RwLock<StoreSnapshot>,
}

impl InMemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn from_snapshot(snapshot: StoreSnapshot) -> Self {
        Self {
            inner: RwLock::new(snapshot),
        }
    }

    #[must_use]
    pub fn snapshot(&self) -> StoreSnapshot {
        self.inner.read().clone()
    }

    /// Appends an attempt outside of any plan (imports, seeding).
    pub fn append_attempt(&self, player_id: &str, attempt: Attempt) {
        self.inner
            .write()
            .attempts
            .entry(player_id.to_string())
            .or_default()
            .push(attempt);
    }

    /// Plans of `player_id`, oldest first.
    #[must_use]
    pub fn plans_for(&self, player_id: &str) -> Vec<SessionPlan> {
        let mut plans: Vec<SessionPlan> = self
            .inner
            .read()
            .plans
            .values()
            .filter(|plan| plan.player_id == player_id)
            .cloned()
            .collect();
        plans.sort_by_key(|plan| plan.created_at);
        plans
    }

    fn check_revision(
        snapshot: &StoreSnapshot,
        plan_id: &str,
        expected_revision: u64,
    ) -> Result<(), StoreError> {
        let stored = snapshot
            .plans
            .get(plan_id)
            .ok_or_else(|| StoreError::PlanNotFound(plan_id.to_string()))?;
        if stored.revision != expected_revision {
            return Err(StoreError::Conflict {
                plan_id: plan_id.to_string(),
                expected: expected_revision,
                found: stored.revision,
            });
        }
        Ok(())
    }

    fn store_next_revision(snapshot: &mut StoreSnapshot, plan: &SessionPlan, expected_revision: u64) {
        let mut stored = plan.clone();
        stored.revision = expected_revision + 1;
        snapshot.plans.insert(stored.id.clone(), stored);
    }
}

impl PlanStore for InMemoryStore {
    fn load_plan(&self, plan_id: &str) -> Result<Option<SessionPlan>, StoreError> {
        Ok(self.inner.read().plans.get(plan_id).cloned())
    }

    fn insert_plan(&self, plan: SessionPlan) -> Result<(), StoreError> {
        let mut guard = self.inner.write();
        if guard.plans.contains_key(&plan.id) {
            return Err(StoreError::DuplicatePlan(plan.id));
        }
        guard.plans.insert(plan.id.clone(), plan);
        Ok(())
    }

    fn save_plan(&self, plan: &SessionPlan, expected_revision: u64) -> Result<(), StoreError> {
        let mut guard = self.inner.write();
        Self::check_revision(&guard, &plan.id, expected_revision)?;
        Self::store_next_revision(&mut guard, plan, expected_revision);
        Ok(())
    }

    fn commit_slot_result(
        &self,
        plan: &SessionPlan,
        expected_revision: u64,
        attempt: Attempt,
    ) -> Result<(), StoreError> {
        let mut guard = self.inner.write();
        Self::check_revision(&guard, &plan.id, expected_revision)?;
        Self::store_next_revision(&mut guard, plan, expected_revision);
        guard
            .attempts
            .entry(plan.player_id.clone())
            .or_default()
            .push(attempt);
        Ok(())
    }
}

impl AttemptHistory for InMemoryStore {
    fn recent_attempts(&self, player_id: &str, limit: usize) -> Result<Vec<Attempt>, StoreError> {
        let guard = self.inner.read();
        let Some(all) = guard.attempts.get(player_id) else {
            return Ok(Vec::new());
        };
        let mut recent: Vec<Attempt> = all.clone();
        recent.sort_by_key(|attempt| attempt.recorded_at);
        let skip = recent.len().saturating_sub(limit);
        Ok(recent.split_off(skip))
    }
}

/// Fixed practicing-skill lists per player.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StaticProgress {
    players: BTreeMap<String, Vec<SkillId>>,
}

impl StaticProgress {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, player_id: impl Into<String>, skills: Vec<SkillId>) {
        self.players.insert(player_id.into(), skills);
    }

    #[must_use]
    pub fn with_player(mut self, player_id: impl Into<String>, skills: Vec<SkillId>) -> Self {
        self.set(player_id, skills);
        self
    }
}

impl ProgressTracker for StaticProgress {
    fn practicing_skills(&self, player_id: &str) -> Result<Vec<SkillId>, StoreError> {
        Ok(self.players.get(player_id).cloned().unwrap_or_default())
    }
}
