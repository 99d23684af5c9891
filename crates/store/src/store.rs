//! The quest store.
//!
//! [`QuestStore`] is a cheap-to-clone handle shared by every consumer. Reads
//! go through selectors over the in-memory state; actions call the gateway
//! first and only commit what the server confirmed. The persisted part of
//! the state is written to the snapshot store after each change.

use std::sync::Arc;

use questline_core::{
    ActiveRoadmap, Day, Goal, GoalId, GoalStatus, GoalUpdate, Milestone, MilestoneId, NewGoal,
    NewTask, Roadmap, RoadmapProgress, RoadmapStatus, Task, TaskId, TaskStatus, TaskUpdate,
    Time,
};
use questline_gateway::QuestGateway;
use questline_progress::{
    auto_select_candidate, complete_and_advance, ensure_can_bind, normalize_roadmap,
    AvailableTasks, Clock, GenerationPoller, PollHandle, PollOutcome, PollRegistry, QuestError,
    Result, SelectionTicket, SystemClock, TaskAccess, TaskAccessState,
};
use questline_storage::SnapshotStore;
use tokio::sync::{broadcast, Mutex, MutexGuard};
use tracing::{debug, info, warn};

use crate::config::StoreConfig;
use crate::events::QuestEvent;
use crate::signal::{QuestMutationSignal, SignalConfidence};
use crate::state::{LastError, StoreState};

/// Shared handle to the quest state.
#[derive(Clone)]
pub struct QuestStore {
    inner: Arc<Inner>,
}

struct Inner {
    gateway: Arc<dyn QuestGateway>,
    snapshots: Arc<dyn SnapshotStore>,
    clock: Arc<dyn Clock>,
    config: StoreConfig,
    state: Mutex<StoreState>,
    pollers: PollRegistry,
    events: broadcast::Sender<QuestEvent>,
}

impl QuestStore {
    /// Create a store on the wall clock.
    pub fn new(
        gateway: Arc<dyn QuestGateway>,
        snapshots: Arc<dyn SnapshotStore>,
        config: StoreConfig,
    ) -> Self {
        Self::with_clock(gateway, snapshots, config, Arc::new(SystemClock))
    }

    /// Create a store on the given clock.
    pub fn with_clock(
        gateway: Arc<dyn QuestGateway>,
        snapshots: Arc<dyn SnapshotStore>,
        config: StoreConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let (events, _) = broadcast::channel(config.event_capacity.max(1));
        Self {
            inner: Arc::new(Inner {
                gateway,
                snapshots,
                clock,
                state: Mutex::new(StoreState::new(config.cache_ttl)),
                config,
                pollers: PollRegistry::new(),
                events,
            }),
        }
    }

    /// Configuration in use.
    pub fn config(&self) -> &StoreConfig {
        &self.inner.config
    }

    /// Receive store events from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<QuestEvent> {
        self.inner.events.subscribe()
    }

    /// Load the persisted snapshot. Returns whether one was found.
    pub async fn restore(&self) -> Result<bool> {
        match self.inner.snapshots.load().await {
            Ok(Some(snapshot)) => {
                info!("Restored {} goals from snapshot", snapshot.goals.len());
                self.state().await.restore(snapshot);
                Ok(true)
            }
            Ok(None) => Ok(false),
            Err(e) => Err(self.fail(QuestError::Persistence(e.to_string())).await),
        }
    }

    /// Write the persisted part of the state. Failures are recorded, never
    /// returned.
    pub async fn persist(&self) {
        let snapshot = self.state().await.snapshot();
        if let Err(e) = self.inner.snapshots.save(&snapshot).await {
            self.fail(QuestError::Persistence(e.to_string())).await;
        }
    }

    /// Forget everything, stop all polling and remove the snapshot.
    pub async fn reset(&self) -> Result<()> {
        self.inner.pollers.cancel_all().await;
        *self.state().await = StoreState::new(self.inner.config.cache_ttl);
        self.emit(QuestEvent::ActiveRoadmapChanged { goal_id: None });
        if let Err(e) = self.inner.snapshots.clear().await {
            return Err(self.fail(QuestError::Persistence(e.to_string())).await);
        }
        info!("Quest state reset");
        Ok(())
    }

    // ---------------------------------------------------------------
    // Goals
    // ---------------------------------------------------------------

    /// Goal list, from cache while fresh unless `force` is set.
    ///
    /// The first successful fetch of a session auto-selects the first goal
    /// with a ready roadmap if nothing is selected yet.
    pub async fn fetch_goals(&self, force: bool) -> Result<Vec<Goal>> {
        {
            let mut state = self.state().await;
            if !force && state.goals_fresh(self.now()) {
                debug!("Goals served from cache");
                return Ok(state.goals.clone());
            }
            state.loading += 1;
        }

        let result = self.inner.gateway.list_goals().await;

        let (goals, ticket) = {
            let mut state = self.state().await;
            state.loading = state.loading.saturating_sub(1);
            let goals = match result {
                Ok(goals) => goals,
                Err(e) => {
                    let err = QuestError::from(e);
                    self.record(&mut state, &err);
                    return Err(err);
                }
            };
            state.replace_goals(goals, self.now());

            let candidate = auto_select_candidate(&state.goals).map(|g| g.id.clone());
            let ticket = candidate.and_then(|id| state.progression.begin_auto_selection(&id));
            (state.goals.clone(), ticket)
        };

        info!("Fetched {} goals", goals.len());
        self.emit(QuestEvent::GoalsRefreshed { count: goals.len() });
        self.persist().await;

        if let Some(ticket) = ticket {
            if let Err(e) = self.select(ticket).await {
                debug!("Auto-selection failed: {}", e);
            }
        }
        Ok(goals)
    }

    /// Create a goal.
    pub async fn create_goal(&self, goal: NewGoal) -> Result<Goal> {
        if let Err(e) = goal.validate() {
            return Err(self.fail(e.into()).await);
        }

        let goal = match self.inner.gateway.create_goal(&goal).await {
            Ok(goal) => goal,
            Err(e) => return Err(self.fail(e.into()).await),
        };
        info!("Created goal {} ({})", goal.id, goal.title);
        self.state().await.upsert_goal(goal.clone());
        self.persist().await;
        Ok(goal)
    }

    /// Update a goal.
    pub async fn update_goal(&self, goal_id: &GoalId, update: GoalUpdate) -> Result<Goal> {
        if let Err(e) = update.validate() {
            return Err(self.fail(e.into()).await);
        }

        let goal = match self.inner.gateway.update_goal(goal_id, &update).await {
            Ok(goal) => goal,
            Err(e) => return Err(self.fail(e.into()).await),
        };
        debug!("Updated goal {}", goal.id);
        self.state().await.upsert_goal(goal.clone());
        self.persist().await;
        Ok(goal)
    }

    /// Mark a goal completed.
    pub async fn complete_goal(&self, goal_id: &GoalId) -> Result<Goal> {
        self.update_goal(goal_id, GoalUpdate::status(GoalStatus::Completed))
            .await
    }

    /// Pause a goal.
    pub async fn pause_goal(&self, goal_id: &GoalId) -> Result<Goal> {
        self.update_goal(goal_id, GoalUpdate::status(GoalStatus::Paused))
            .await
    }

    /// Delete a goal. Its cached roadmap, selection and generation poll go
    /// with it.
    pub async fn delete_goal(&self, goal_id: &GoalId) -> Result<()> {
        if let Err(e) = self.inner.gateway.delete_goal(goal_id).await {
            return Err(self.fail(e.into()).await);
        }

        self.inner.pollers.cancel(goal_id).await;
        let cleared = self.state().await.remove_goal(goal_id);
        info!("Deleted goal {}", goal_id);

        self.emit(QuestEvent::GoalDeleted(goal_id.clone()));
        if cleared {
            self.emit(QuestEvent::ActiveRoadmapChanged { goal_id: None });
        }
        self.persist().await;
        Ok(())
    }

    // ---------------------------------------------------------------
    // Roadmaps
    // ---------------------------------------------------------------

    /// Roadmap of a goal, from cache while fresh unless `force` is set.
    /// Refreshes the selection if the goal is the one selected.
    pub async fn fetch_roadmap(&self, goal_id: &GoalId, force: bool) -> Result<Roadmap> {
        let goal = self.resolve_goal(goal_id).await?;
        let ticket = {
            let state = self.state().await;
            (state.progression.selected_goal() == Some(goal_id))
                .then(|| state.progression.begin_refresh(goal_id))
        };

        let roadmap = self.resolve_roadmap(goal, force).await?;
        if let Some(ticket) = ticket {
            let selection = ActiveRoadmap::new(roadmap.goal.clone(), roadmap.milestones.clone());
            self.apply_selection(&ticket, selection).await;
        }
        self.persist().await;
        Ok(roadmap)
    }

    /// Select the goal whose roadmap drives progression.
    ///
    /// Returns the new selection, or `None` if a later selection superseded
    /// this one while it was loading. When the roadmap cannot be loaded the
    /// goal is still selected, flagged as unavailable, and the error is
    /// returned.
    pub async fn set_active_roadmap(&self, goal_id: &GoalId) -> Result<Option<ActiveRoadmap>> {
        let ticket = self.state().await.progression.begin_selection(goal_id);
        self.select(ticket).await
    }

    /// Drop the selection.
    pub async fn clear_active_roadmap(&self) {
        self.state().await.progression.clear();
        self.emit(QuestEvent::ActiveRoadmapChanged { goal_id: None });
        self.persist().await;
    }

    /// Ask the server to generate a goal's roadmap and poll until it is
    /// done.
    ///
    /// Returns `None` without calling the server if generation of the goal
    /// is already being started or polled.
    pub async fn generate_roadmap(&self, goal_id: &GoalId) -> Result<Option<PollHandle>> {
        let Some(token) = self.inner.pollers.try_reserve(goal_id).await else {
            debug!("Roadmap generation for goal {} already in progress", goal_id);
            return Ok(None);
        };

        if let Err(e) = self.inner.gateway.trigger_roadmap_generation(goal_id).await {
            self.inner.pollers.finish(goal_id, token).await;
            return Err(self.fail(e.into()).await);
        }
        info!("Roadmap generation started for goal {}", goal_id);

        let since = {
            let mut state = self.state().await;
            if let Some(mut goal) = state.goal(goal_id).cloned() {
                goal.roadmap_status = RoadmapStatus::Generating;
                state.upsert_goal(goal);
            }
            state.progression.intent()
        };
        self.persist().await;

        let store = self.clone();
        let target = goal_id.clone();
        let handle = self
            .inner
            .pollers
            .spawn_reserved(goal_id, token, move |token| async move {
                let result = store.finish_generation(&target, since).await;
                store.inner.pollers.finish(&target, token).await;
                result
            })
            .await;
        Ok(Some(handle))
    }

    /// Stop polling a goal's generation. The goal keeps its `generating`
    /// status until the next goal refresh.
    pub async fn cancel_generation(&self, goal_id: &GoalId) -> bool {
        self.inner.pollers.cancel(goal_id).await
    }

    /// Complete the active milestone of a goal.
    ///
    /// Returns the milestone activated in its place, `None` when the roadmap
    /// is finished.
    pub async fn complete_milestone(
        &self,
        goal_id: &GoalId,
        milestone_id: &MilestoneId,
    ) -> Result<Option<MilestoneId>> {
        let known = self.state().await.known_milestones(goal_id);
        let mut milestones = match known {
            Some(milestones) => milestones,
            None => {
                let goal = self.resolve_goal(goal_id).await?;
                self.resolve_roadmap(goal, false).await?.milestones
            }
        };

        let activated = match complete_and_advance(&mut milestones, milestone_id) {
            Ok(activated) => activated,
            Err(err) => return Err(self.fail(err).await),
        };

        if let Err(e) = self
            .inner
            .gateway
            .complete_milestone(goal_id, milestone_id)
            .await
        {
            return Err(self.fail(e.into()).await);
        }

        {
            let mut state = self.state().await;
            state.roadmaps.invalidate(goal_id);
            state.progression.replace_milestones(goal_id, milestones);
            // Completion can move tasks server-side
            state.tasks.expire_all();
        }
        self.check_task_access().await;

        match &activated {
            Some(next) => info!("Milestone {} completed, {} is now active", milestone_id, next),
            None => info!(
                "Milestone {} completed, roadmap of goal {} finished",
                milestone_id, goal_id
            ),
        }
        self.emit(QuestEvent::MilestoneCompleted {
            goal_id: goal_id.clone(),
            milestone_id: milestone_id.clone(),
            activated: activated.clone(),
        });
        self.persist().await;
        Ok(activated)
    }

    // ---------------------------------------------------------------
    // Tasks
    // ---------------------------------------------------------------

    /// Tasks due on `day`, from cache while fresh unless `force` is set.
    pub async fn fetch_tasks(&self, day: Day, force: bool) -> Result<Vec<Task>> {
        {
            let mut state = self.state().await;
            if !force {
                if let Some(tasks) = state.tasks.get_fresh(&day, self.now()) {
                    debug!("Tasks for {} served from cache", day);
                    return Ok(tasks.clone());
                }
            }
            state.loading += 1;
        }

        let result = self.inner.gateway.list_tasks(day).await;

        let tasks = {
            let mut state = self.state().await;
            state.loading = state.loading.saturating_sub(1);
            match result {
                Ok(tasks) => {
                    state.tasks.put(day, tasks.clone(), self.now());
                    tasks
                }
                Err(e) => {
                    let err = QuestError::from(e);
                    self.record(&mut state, &err);
                    return Err(err);
                }
            }
        };

        debug!("Fetched {} tasks for {}", tasks.len(), day);
        self.emit(QuestEvent::TasksChanged { day });
        if day == self.today() {
            self.check_task_access().await;
        }
        Ok(tasks)
    }

    /// Tasks due today.
    pub async fn fetch_today_tasks(&self, force: bool) -> Result<Vec<Task>> {
        self.fetch_tasks(self.today(), force).await
    }

    /// Tasks due tomorrow.
    pub async fn fetch_future_tasks(&self, force: bool) -> Result<Vec<Task>> {
        self.fetch_tasks(self.tomorrow(), force).await
    }

    /// Create a task.
    pub async fn create_task(&self, task: NewTask) -> Result<Task> {
        if let Err(e) = task.validate() {
            return Err(self.fail(e.into()).await);
        }
        if let Some(milestone_id) = &task.milestone_id {
            self.check_bindable(milestone_id).await?;
        }

        let task = match self.inner.gateway.create_task(&task).await {
            Ok(task) => task,
            Err(e) => return Err(self.fail(e.into()).await),
        };
        info!("Created task {} due {}", task.id, task.due_date);
        let day = task.due_date;
        self.state().await.upsert_task(task.clone());
        self.tasks_changed(day).await;
        Ok(task)
    }

    /// Update a task.
    pub async fn update_task(&self, task_id: &TaskId, update: TaskUpdate) -> Result<Task> {
        if let Err(e) = update.validate() {
            return Err(self.fail(e.into()).await);
        }
        if let Some(milestone_id) = &update.milestone_id {
            self.check_bindable(milestone_id).await?;
        }

        let task = match self.inner.gateway.update_task(task_id, &update).await {
            Ok(task) => task,
            Err(e) => return Err(self.fail(e.into()).await),
        };
        debug!("Updated task {}", task.id);
        let day = task.due_date;
        self.state().await.upsert_task(task.clone());
        self.tasks_changed(day).await;
        Ok(task)
    }

    /// Mark a task completed.
    pub async fn complete_task(&self, task_id: &TaskId) -> Result<Task> {
        self.update_task(task_id, TaskUpdate::status(TaskStatus::Completed))
            .await
    }

    /// Delete a task.
    pub async fn delete_task(&self, task_id: &TaskId) -> Result<()> {
        if let Err(e) = self.inner.gateway.delete_task(task_id).await {
            return Err(self.fail(e.into()).await);
        }
        info!("Deleted task {}", task_id);
        let day = self.state().await.remove_task(task_id);
        self.tasks_changed(day.unwrap_or_else(|| self.today())).await;
        Ok(())
    }

    /// Attach a task to a milestone of a locally known roadmap. Locked
    /// milestones are refused.
    pub async fn bind_task_to_milestone(
        &self,
        task_id: &TaskId,
        milestone_id: &MilestoneId,
    ) -> Result<Task> {
        let update = TaskUpdate {
            milestone_id: Some(milestone_id.clone()),
            ..Default::default()
        };
        if self.state().await.milestone_owner(milestone_id).is_none() {
            let err = QuestError::NotFound(format!("milestone {}", milestone_id));
            return Err(self.fail(err).await);
        }
        self.update_task(task_id, update).await
    }

    /// Recompute whether future tasks are unlocked from today's cached
    /// tasks.
    pub async fn check_task_access(&self) -> bool {
        let today = self.today();
        let (access, changed) = {
            let mut state = self.state().await;
            let access = TaskAccess::evaluate(&state.tasks_for(today));
            let changed = access.can_access_future != state.access.can_access_future;
            state.access = access;
            (access, changed)
        };

        if changed {
            info!(
                "Future tasks {} ({:.0}% of today done)",
                if access.can_access_future { "unlocked" } else { "locked" },
                access.completion_rate * 100.0
            );
            self.emit(QuestEvent::TaskAccessChanged {
                can_access_future: access.can_access_future,
            });
        }
        access.can_access_future
    }

    /// Today's tasks and, if unlocked, tomorrow's.
    pub async fn get_available_tasks(&self) -> AvailableTasks {
        let (today, tomorrow) = (self.today(), self.tomorrow());
        let state = self.state().await;
        AvailableTasks::compute(&state.tasks_for(today), &state.tasks_for(tomorrow))
    }

    /// Today's and tomorrow's cached tasks with the last access decision.
    pub async fn task_access_state(&self) -> TaskAccessState {
        let (today, tomorrow) = (self.today(), self.tomorrow());
        let state = self.state().await;
        TaskAccessState {
            today: state.tasks_for(today),
            future: state.tasks_for(tomorrow),
            can_access_future: state.access.can_access_future,
        }
    }

    // ---------------------------------------------------------------
    // Refresh
    // ---------------------------------------------------------------

    /// Reload today's and tomorrow's tasks, then re-check access.
    ///
    /// Returns `Ok(false)` without doing anything if a refresh is already
    /// running.
    pub async fn refresh_today_data(&self) -> Result<bool> {
        {
            let mut state = self.state().await;
            if state.refreshing_today {
                debug!("Today refresh already running");
                return Ok(false);
            }
            state.refreshing_today = true;
        }

        let result = async {
            self.fetch_tasks(self.today(), true).await?;
            self.fetch_tasks(self.tomorrow(), true).await?;
            Ok::<_, QuestError>(())
        }
        .await;
        self.check_task_access().await;

        self.state().await.refreshing_today = false;
        result.map(|_| true)
    }

    /// Reload goals, the selected roadmap and today's data.
    ///
    /// Returns `Ok(false)` without doing anything if a refresh is already
    /// running.
    pub async fn refresh_quests_data(&self) -> Result<bool> {
        {
            let mut state = self.state().await;
            if state.refreshing_quests {
                debug!("Quest refresh already running");
                return Ok(false);
            }
            state.refreshing_quests = true;
        }

        let result = async {
            self.fetch_goals(true).await?;
            let selected = self
                .state()
                .await
                .progression
                .selection()
                .filter(|s| s.goal.has_roadmap())
                .map(|s| s.goal_id.clone());
            if let Some(goal_id) = selected {
                self.fetch_roadmap(&goal_id, true).await?;
            }
            self.refresh_today_data().await?;
            Ok::<_, QuestError>(())
        }
        .await;

        self.state().await.refreshing_quests = false;
        result.map(|_| true)
    }

    /// React to quest data changed by another subsystem.
    pub async fn apply_signal(&self, signal: &QuestMutationSignal) -> Result<bool> {
        if !signal.touches_quests() {
            return Ok(false);
        }
        if signal.confidence == SignalConfidence::Heuristic {
            debug!("Refreshing quests on a keyword match, the reply may not have changed anything");
        }
        self.refresh_quests_data().await
    }

    // ---------------------------------------------------------------
    // Selectors
    // ---------------------------------------------------------------

    /// Known goals.
    pub async fn goals(&self) -> Vec<Goal> {
        self.state().await.goals.clone()
    }

    /// A known goal.
    pub async fn goal(&self, goal_id: &GoalId) -> Option<Goal> {
        self.state().await.goal(goal_id).cloned()
    }

    /// Cached roadmap of a goal, regardless of age.
    pub async fn cached_roadmap(&self, goal_id: &GoalId) -> Option<Roadmap> {
        self.state()
            .await
            .roadmaps
            .get(goal_id)
            .map(|entry| entry.value.clone())
    }

    /// Current selection.
    pub async fn active_roadmap(&self) -> Option<ActiveRoadmap> {
        self.state().await.progression.selection().cloned()
    }

    /// Milestone in progress within the selection.
    pub async fn active_milestone(&self) -> Option<Milestone> {
        self.state().await.progression.active_milestone().cloned()
    }

    /// Completion of a goal's locally known roadmap.
    pub async fn roadmap_progress(&self, goal_id: &GoalId) -> Option<RoadmapProgress> {
        self.state()
            .await
            .known_milestones(goal_id)
            .map(|milestones| RoadmapProgress::of(&milestones))
    }

    /// Cached tasks due today.
    pub async fn today_tasks(&self) -> Vec<Task> {
        let today = self.today();
        self.state().await.tasks_for(today)
    }

    /// Cached tasks due tomorrow, whether unlocked or not.
    pub async fn future_tasks(&self) -> Vec<Task> {
        let tomorrow = self.tomorrow();
        self.state().await.tasks_for(tomorrow)
    }

    /// Current day on the store's clock.
    pub fn today(&self) -> Day {
        self.inner.clock.today()
    }

    /// Last access decision.
    pub async fn can_access_future(&self) -> bool {
        self.state().await.access.can_access_future
    }

    /// Whether a network fetch is in flight.
    pub async fn is_loading(&self) -> bool {
        self.state().await.loading > 0
    }

    /// Whether a refresh is running.
    pub async fn is_refreshing(&self) -> bool {
        let state = self.state().await;
        state.refreshing_quests || state.refreshing_today
    }

    /// Whether a goal's roadmap generation is being polled.
    pub async fn is_generating(&self, goal_id: &GoalId) -> bool {
        self.inner.pollers.is_active(goal_id).await
    }

    /// Most recent failure.
    pub async fn last_error(&self) -> Option<LastError> {
        self.state().await.last_error.clone()
    }

    /// Forget the most recent failure.
    pub async fn clear_error(&self) {
        self.state().await.last_error = None;
    }

    // ---------------------------------------------------------------
    // Internals
    // ---------------------------------------------------------------

    async fn state(&self) -> MutexGuard<'_, StoreState> {
        self.inner.state.lock().await
    }

    fn now(&self) -> Time {
        self.inner.clock.now()
    }


    fn tomorrow(&self) -> Day {
        let today = self.today();
        today.succ_opt().unwrap_or(today)
    }

    fn emit(&self, event: QuestEvent) {
        // No subscribers is fine
        let _ = self.inner.events.send(event);
    }

    fn record(&self, state: &mut StoreState, err: &QuestError) {
        warn!("{}", err);
        state.last_error = Some(LastError::new(err, self.now()));
    }

    async fn fail(&self, err: QuestError) -> QuestError {
        let mut state = self.state().await;
        self.record(&mut state, &err);
        err
    }

    async fn apply_selection(&self, ticket: &SelectionTicket, selection: ActiveRoadmap) -> bool {
        let applied = self.state().await.progression.apply(ticket, selection);
        if applied {
            self.emit(QuestEvent::ActiveRoadmapChanged {
                goal_id: Some(ticket.goal_id().clone()),
            });
        }
        applied
    }

    /// Local goal, or fetched from the server if unknown.
    async fn resolve_goal(&self, goal_id: &GoalId) -> Result<Goal> {
        let local = self.state().await.goal(goal_id).cloned();
        if let Some(goal) = local {
            return Ok(goal);
        }

        match self.inner.gateway.get_goal(goal_id).await {
            Ok(goal) => {
                self.state().await.upsert_goal(goal.clone());
                Ok(goal)
            }
            Err(e) => Err(self.fail(e.into()).await),
        }
    }

    /// Roadmap of `goal` through the cache.
    async fn resolve_roadmap(&self, goal: Goal, force: bool) -> Result<Roadmap> {
        {
            let mut state = self.state().await;
            if !force {
                if let Some(roadmap) = state.roadmaps.get_fresh(&goal.id, self.now()) {
                    debug!("Roadmap of goal {} served from cache", goal.id);
                    return Ok(roadmap.clone());
                }
            }
            state.loading += 1;
        }

        let result = self.inner.gateway.get_roadmap(&goal.id).await;

        let mut state = self.state().await;
        state.loading = state.loading.saturating_sub(1);
        match result {
            Ok(milestones) => {
                let roadmap = Roadmap {
                    milestones: normalize_roadmap(&goal.id, milestones),
                    goal,
                };
                if !state.put_roadmap(roadmap.clone(), self.now()) {
                    debug!("Goal {} was deleted while its roadmap loaded", roadmap.goal.id);
                }
                Ok(roadmap)
            }
            Err(e) => {
                let err = QuestError::from(e);
                self.record(&mut state, &err);
                Err(err)
            }
        }
    }

    async fn select(&self, ticket: SelectionTicket) -> Result<Option<ActiveRoadmap>> {
        let goal = self.resolve_goal(ticket.goal_id()).await?;

        let selection = if goal.has_roadmap() {
            match self.resolve_roadmap(goal.clone(), false).await {
                Ok(roadmap) => ActiveRoadmap::new(roadmap.goal, roadmap.milestones),
                Err(err) => {
                    self.apply_selection(&ticket, ActiveRoadmap::unavailable(goal))
                        .await;
                    self.persist().await;
                    return Err(err);
                }
            }
        } else {
            ActiveRoadmap::without_roadmap(goal)
        };

        let applied = self.apply_selection(&ticket, selection.clone()).await;
        if applied {
            self.persist().await;
        }
        Ok(applied.then_some(selection))
    }

    async fn check_bindable(&self, milestone_id: &MilestoneId) -> Result<()> {
        let owner = self.state().await.milestone_owner(milestone_id);
        if let Some((_, milestones)) = owner {
            if let Err(err) = ensure_can_bind(&milestones, milestone_id) {
                return Err(self.fail(err).await);
            }
        }
        Ok(())
    }

    async fn tasks_changed(&self, day: Day) {
        self.emit(QuestEvent::TasksChanged { day });
        self.check_task_access().await;
    }

    /// Body of a generation poll loop.
    async fn finish_generation(&self, goal_id: &GoalId, since: u64) -> Result<PollOutcome> {
        let poller = GenerationPoller::new(self.inner.gateway.clone(), self.inner.config.poll);
        let outcome = match poller.run(goal_id).await {
            Ok(outcome) => outcome,
            Err(err) => return Err(self.fail(err).await),
        };

        match &outcome {
            PollOutcome::Ready(goal) => self.roadmap_ready(goal.clone(), since).await,
            PollOutcome::Failed(goal) => {
                let err = QuestError::GenerationFailed(goal_id.clone());
                {
                    let mut state = self.state().await;
                    state.upsert_goal(goal.clone());
                    self.record(&mut state, &err);
                }
                self.emit(QuestEvent::GenerationFailed(goal_id.clone()));
            }
            PollOutcome::TimedOut { attempts } => {
                let err = QuestError::GenerationTimeout {
                    goal_id: goal_id.clone(),
                    attempts: *attempts,
                };
                {
                    let mut state = self.state().await;
                    if let Some(mut goal) = state.goal(goal_id).cloned() {
                        goal.roadmap_status = RoadmapStatus::Error;
                        state.upsert_goal(goal);
                    }
                    self.record(&mut state, &err);
                }
                self.emit(QuestEvent::GenerationTimedOut {
                    goal_id: goal_id.clone(),
                    attempts: *attempts,
                });
            }
        }

        self.persist().await;
        Ok(outcome)
    }

    async fn roadmap_ready(&self, goal: Goal, since: u64) {
        let ticket = {
            let mut state = self.state().await;
            if state.deleted.contains(&goal.id) {
                return;
            }
            state.upsert_goal(goal.clone());
            state.roadmaps.invalidate(&goal.id);
            match state.progression.begin_selection_since(&goal.id, since) {
                Some(ticket) => Some(ticket),
                None if state.progression.selected_goal() == Some(&goal.id) => {
                    Some(state.progression.begin_refresh(&goal.id))
                }
                None => None,
            }
        };
        info!("Roadmap ready for goal {}", goal.id);
        self.emit(QuestEvent::RoadmapReady(goal.id.clone()));

        let selection = match self.resolve_roadmap(goal.clone(), true).await {
            Ok(roadmap) => ActiveRoadmap::new(roadmap.goal, roadmap.milestones),
            Err(_) => ActiveRoadmap::unavailable(goal),
        };
        if let Some(ticket) = ticket {
            self.apply_selection(&ticket, selection).await;
        }
    }
}
