//! In-memory state behind the store.

use std::collections::HashSet;
use std::time::Duration;

use questline_core::{Day, Goal, GoalId, Milestone, MilestoneId, QuestSnapshot, Roadmap, Task, TaskId, Time};
use questline_progress::{is_fresh, ErrorKind, ProgressionEngine, QuestError, TaskAccess, TtlCache};

/// The most recent failure, kept until cleared or overwritten.
#[derive(Debug, Clone, PartialEq)]
pub struct LastError {
    /// Classification
    pub kind: ErrorKind,

    /// Human-readable message
    pub message: String,

    /// When it happened
    pub at: Time,
}

impl LastError {
    pub(crate) fn new(err: &QuestError, at: Time) -> Self {
        Self {
            kind: err.kind(),
            message: err.to_string(),
            at,
        }
    }
}

pub(crate) struct StoreState {
    pub goals: Vec<Goal>,
    pub last_fetch: Option<Time>,
    pub roadmaps: TtlCache<GoalId, Roadmap>,
    pub progression: ProgressionEngine,
    pub tasks: TtlCache<Day, Vec<Task>>,
    pub access: TaskAccess,
    /// Goals deleted this session; late responses must not resurrect them
    pub deleted: HashSet<GoalId>,
    pub loading: usize,
    pub refreshing_quests: bool,
    pub refreshing_today: bool,
    pub last_error: Option<LastError>,
}

impl StoreState {
    pub fn new(ttl: Duration) -> Self {
        Self {
            goals: Vec::new(),
            last_fetch: None,
            roadmaps: TtlCache::new(ttl),
            progression: ProgressionEngine::new(),
            tasks: TtlCache::new(ttl),
            access: TaskAccess::default(),
            deleted: HashSet::new(),
            loading: 0,
            refreshing_quests: false,
            refreshing_today: false,
            last_error: None,
        }
    }

    /// Replace the persisted part of the state; transient flags are kept.
    pub fn restore(&mut self, snapshot: QuestSnapshot) {
        let ttl = self.roadmaps.ttl();
        self.goals = snapshot.goals;
        self.last_fetch = snapshot.last_fetch;
        self.roadmaps = TtlCache::from_entries(snapshot.roadmap_cache, ttl);
        self.progression = ProgressionEngine::restore(snapshot.active_roadmap);
    }

    pub fn snapshot(&self) -> QuestSnapshot {
        QuestSnapshot {
            goals: self.goals.clone(),
            roadmap_cache: self.roadmaps.entries().clone(),
            active_roadmap: self.progression.selection().cloned(),
            last_fetch: self.last_fetch,
        }
    }

    pub fn goals_fresh(&self, now: Time) -> bool {
        self.last_fetch
            .map(|at| is_fresh(at, now, self.roadmaps.ttl()))
            .unwrap_or(false)
    }

    pub fn goal(&self, id: &GoalId) -> Option<&Goal> {
        self.goals.iter().find(|g| &g.id == id)
    }

    /// Replace the goal list with a server response.
    pub fn replace_goals(&mut self, goals: Vec<Goal>, now: Time) {
        self.goals = goals
            .into_iter()
            .filter(|g| !self.deleted.contains(&g.id))
            .collect();
        self.last_fetch = Some(now);

        let goals = self.goals.clone();
        for goal in &goals {
            self.sync_goal(goal);
        }
    }

    /// Insert or replace a goal everywhere it is denormalized.
    pub fn upsert_goal(&mut self, goal: Goal) {
        if self.deleted.contains(&goal.id) {
            return;
        }
        self.sync_goal(&goal);
        match self.goals.iter_mut().find(|g| g.id == goal.id) {
            Some(existing) => *existing = goal,
            None => self.goals.push(goal),
        }
    }

    fn sync_goal(&mut self, goal: &Goal) {
        if let Some(roadmap) = self.roadmaps.get_mut(&goal.id) {
            roadmap.goal = goal.clone();
        }
        self.progression.update_goal(goal);
    }

    /// Drop a deleted goal from every cache. Task lists holding its tasks
    /// are expired so the next read shows what the server did with them.
    /// Returns whether the selection was cleared.
    pub fn remove_goal(&mut self, id: &GoalId) -> bool {
        self.goals.retain(|g| &g.id != id);
        self.roadmaps.invalidate(id);
        self.deleted.insert(id.clone());

        let days: Vec<Day> = self
            .tasks
            .entries()
            .iter()
            .filter(|(_, entry)| entry.value.iter().any(|t| t.goal_id.as_ref() == Some(id)))
            .map(|(day, _)| *day)
            .collect();
        for day in &days {
            self.tasks.expire(day);
        }
        self.progression.forget_goal(id)
    }

    /// Cache a roadmap unless its goal was deleted meanwhile.
    pub fn put_roadmap(&mut self, roadmap: Roadmap, now: Time) -> bool {
        let goal_id = roadmap.goal.id.clone();
        if self.deleted.contains(&goal_id) {
            return false;
        }
        self.roadmaps.put(goal_id, roadmap, now);
        true
    }

    /// Best local copy of a goal's milestones: the selection first, then the
    /// cache regardless of age.
    pub fn known_milestones(&self, goal_id: &GoalId) -> Option<Vec<Milestone>> {
        if let Some(selection) = self.progression.selection() {
            if &selection.goal_id == goal_id && !selection.roadmap_unavailable {
                return Some(selection.milestones.clone());
            }
        }
        self.roadmaps
            .get(goal_id)
            .map(|entry| entry.value.milestones.clone())
    }

    /// Find the goal owning a milestone among the locally known roadmaps.
    pub fn milestone_owner(&self, milestone_id: &MilestoneId) -> Option<(GoalId, Vec<Milestone>)> {
        if let Some(selection) = self.progression.selection() {
            if selection.milestones.iter().any(|m| &m.id == milestone_id) {
                return Some((selection.goal_id.clone(), selection.milestones.clone()));
            }
        }
        self.roadmaps.entries().iter().find_map(|(goal_id, entry)| {
            entry
                .value
                .milestones
                .iter()
                .any(|m| &m.id == milestone_id)
                .then(|| (goal_id.clone(), entry.value.milestones.clone()))
        })
    }

    pub fn tasks_for(&self, day: Day) -> Vec<Task> {
        self.tasks
            .get(&day)
            .map(|entry| entry.value.clone())
            .unwrap_or_default()
    }

    pub fn find_task(&self, id: &TaskId) -> Option<&Task> {
        self.tasks
            .entries()
            .values()
            .flat_map(|entry| entry.value.iter())
            .find(|t| &t.id == id)
    }

    /// Put a confirmed task into the cached list of its day, removing it
    /// from any other day it was listed under.
    pub fn upsert_task(&mut self, task: Task) {
        for tasks in self.tasks.values_mut() {
            tasks.retain(|t| t.id != task.id);
        }
        if let Some(tasks) = self.tasks.get_mut(&task.due_date) {
            tasks.push(task);
        }
    }

    pub fn remove_task(&mut self, id: &TaskId) -> Option<Day> {
        let day = self.find_task(id).map(|t| t.due_date);
        for tasks in self.tasks.values_mut() {
            tasks.retain(|t| &t.id != id);
        }
        day
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, Utc};
    use questline_core::{GoalStatus, RoadmapStatus, TaskPriority, TaskStatus};
    use questline_progress::CACHE_EXPIRY;

    fn goal(id: &str) -> Goal {
        let now = Utc::now();
        Goal {
            id: GoalId::new(id),
            title: format!("Goal {}", id),
            description: String::new(),
            category: String::new(),
            target_date: None,
            status: GoalStatus::Active,
            roadmap_status: RoadmapStatus::Ready,
            created_at: now,
            updated_at: now,
        }
    }

    fn task(id: &str, day: Day) -> Task {
        let now = Utc::now();
        Task {
            id: TaskId::new(id),
            title: id.to_string(),
            description: String::new(),
            due_date: day,
            priority: TaskPriority::Medium,
            status: TaskStatus::Pending,
            goal_id: Some(GoalId::new("g1")),
            milestone_id: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_deleted_goal_is_not_resurrected() {
        let mut state = StoreState::new(CACHE_EXPIRY);
        let now = Utc::now();
        state.replace_goals(vec![goal("g1"), goal("g2")], now);
        state.put_roadmap(
            Roadmap {
                goal: goal("g1"),
                milestones: vec![],
            },
            now,
        );

        state.remove_goal(&GoalId::new("g1"));
        assert!(state.roadmaps.get(&GoalId::new("g1")).is_none());

        assert!(!state.put_roadmap(
            Roadmap {
                goal: goal("g1"),
                milestones: vec![],
            },
            now,
        ));
        state.replace_goals(vec![goal("g1"), goal("g2")], now);
        assert_eq!(state.goals.len(), 1);
        assert_eq!(state.goals[0].id, GoalId::new("g2"));
    }

    #[test]
    fn test_upsert_task_moves_between_days() {
        let mut state = StoreState::new(CACHE_EXPIRY);
        let today = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap();
        let tomorrow = NaiveDate::from_ymd_opt(2024, 5, 2).unwrap();
        let now = Utc::now();
        state.tasks.put(today, vec![task("t1", today)], now);
        state.tasks.put(tomorrow, vec![], now);

        state.upsert_task(task("t1", tomorrow));

        assert!(state.tasks_for(today).is_empty());
        assert_eq!(state.tasks_for(tomorrow).len(), 1);
        assert_eq!(state.remove_task(&TaskId::new("t1")), Some(tomorrow));
        assert!(state.tasks_for(tomorrow).is_empty());
    }

    #[test]
    fn test_snapshot_round_trips_persisted_fields() {
        let mut state = StoreState::new(CACHE_EXPIRY);
        let now = Utc::now();
        state.replace_goals(vec![goal("g1")], now);
        state.refreshing_today = true;

        let mut restored = StoreState::new(CACHE_EXPIRY);
        restored.restore(state.snapshot());
        assert_eq!(restored.goals, state.goals);
        assert_eq!(restored.last_fetch, Some(now));
        assert!(!restored.refreshing_today);
    }

    #[test]
    fn test_removed_goal_expires_its_task_lists() {
        let mut state = StoreState::new(CACHE_EXPIRY);
        let today = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap();
        let tomorrow = NaiveDate::from_ymd_opt(2024, 5, 2).unwrap();
        let now = Utc::now();
        let mut unrelated = task("t2", tomorrow);
        unrelated.goal_id = None;
        state.tasks.put(today, vec![task("t1", today)], now);
        state.tasks.put(tomorrow, vec![unrelated], now);

        state.remove_goal(&GoalId::new("g1"));

        assert!(state.tasks.get_fresh(&today, now).is_none());
        assert!(state.tasks.get_fresh(&tomorrow, now).is_some());
        // Cached tasks keep what the server last said about them
        assert_eq!(state.tasks_for(today)[0].goal_id, Some(GoalId::new("g1")));
    }
}
