//! In-process quest gateway.
//!
//! Keeps goals, roadmaps and tasks in memory and behaves like the remote
//! API, including asynchronous roadmap generation. Calls are counted per
//! endpoint, can be made to fail, and can be held until released so that
//! interleavings of concurrent requests are reproducible.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use questline_core::{
    Day, Goal, GoalId, GoalStatus, GoalUpdate, Milestone, MilestoneId, MilestoneStatus, NewGoal,
    NewTask, RoadmapStatus, Task, TaskId, TaskStatus, TaskUpdate,
};
use tokio::sync::{Mutex, Notify};
use tracing::debug;

use super::{GatewayError, QuestGateway, Result};

/// Gateway operations, used to count, fail or hold calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endpoint {
    /// `GET /goals`
    ListGoals,
    /// `GET /goals/{id}`
    GetGoal,
    /// `POST /goals`
    CreateGoal,
    /// `PUT /goals/{id}`
    UpdateGoal,
    /// `DELETE /goals/{id}`
    DeleteGoal,
    /// `GET /goals/{id}/roadmap`
    GetRoadmap,
    /// `POST /goals/{id}/roadmap/generate`
    GenerateRoadmap,
    /// `POST /goals/{id}/milestones/{mid}/complete`
    CompleteMilestone,
    /// `GET /tasks?date=`
    ListTasks,
    /// `POST /tasks`
    CreateTask,
    /// `PUT /tasks/{id}`
    UpdateTask,
    /// `DELETE /tasks/{id}`
    DeleteTask,
}

/// Failure injected into the next call of an endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Failure {
    /// Server error (500)
    Server,
    /// Entity missing (404)
    NotFound,
    /// Token rejected (401)
    Unauthorized,
}

impl Failure {
    fn into_error(self, endpoint: Endpoint) -> GatewayError {
        match self {
            Failure::Server => GatewayError::Status {
                status: 500,
                body: format!("injected failure on {:?}", endpoint),
            },
            Failure::NotFound => GatewayError::NotFound(format!("{:?}", endpoint)),
            Failure::Unauthorized => GatewayError::Unauthorized,
        }
    }
}

/// Holds a single call until released.
#[derive(Clone)]
pub struct Gate(Arc<Notify>);

impl Gate {
    /// Let the held call complete.
    pub fn release(&self) {
        self.0.notify_one();
    }
}

struct GenerationScript {
    /// Statuses reported by successive `get_goal` calls
    statuses: VecDeque<RoadmapStatus>,
    /// Roadmap published once the goal turns ready
    milestones: Vec<Milestone>,
}

#[derive(Default)]
struct MemoryState {
    goals: Vec<Goal>,
    roadmaps: HashMap<GoalId, Vec<Milestone>>,
    tasks: Vec<Task>,
    generation: HashMap<GoalId, GenerationScript>,
    calls: HashMap<Endpoint, usize>,
    failures: HashMap<Endpoint, VecDeque<Failure>>,
    gates: HashMap<Endpoint, VecDeque<Arc<Notify>>>,
}

impl MemoryState {
    fn goal_mut(&mut self, id: &GoalId) -> Result<&mut Goal> {
        self.goals
            .iter_mut()
            .find(|g| &g.id == id)
            .ok_or_else(|| GatewayError::NotFound(format!("goal {}", id)))
    }

    fn task_mut(&mut self, id: &TaskId) -> Result<&mut Task> {
        self.tasks
            .iter_mut()
            .find(|t| &t.id == id)
            .ok_or_else(|| GatewayError::NotFound(format!("task {}", id)))
    }
}

/// Gateway that keeps all data in process.
#[derive(Default)]
pub struct MemoryGateway {
    state: Mutex<MemoryState>,
}

impl MemoryGateway {
    /// Create an empty gateway.
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a goal as if it had been created on the server.
    pub async fn insert_goal(&self, goal: Goal) {
        let mut state = self.state.lock().await;
        state.goals.retain(|g| g.id != goal.id);
        state.goals.push(goal);
    }

    /// Store the roadmap of a goal.
    pub async fn insert_roadmap(&self, goal_id: &GoalId, milestones: Vec<Milestone>) {
        self.state
            .lock()
            .await
            .roadmaps
            .insert(goal_id.clone(), milestones);
    }

    /// Store a task.
    pub async fn insert_task(&self, task: Task) {
        let mut state = self.state.lock().await;
        state.tasks.retain(|t| t.id != task.id);
        state.tasks.push(task);
    }

    /// Script the roadmap statuses successive `get_goal` calls report while
    /// the goal is generating. The last status sticks once the script runs
    /// out; `milestones` become the roadmap when `Ready` is reported.
    pub async fn script_generation(
        &self,
        goal_id: &GoalId,
        statuses: Vec<RoadmapStatus>,
        milestones: Vec<Milestone>,
    ) {
        self.state.lock().await.generation.insert(
            goal_id.clone(),
            GenerationScript {
                statuses: statuses.into(),
                milestones,
            },
        );
    }

    /// Make the next call to `endpoint` fail.
    pub async fn fail_next(&self, endpoint: Endpoint, failure: Failure) {
        self.state
            .lock()
            .await
            .failures
            .entry(endpoint)
            .or_default()
            .push_back(failure);
    }

    /// Hold the next call to `endpoint` until the returned gate is released.
    pub async fn hold_next(&self, endpoint: Endpoint) -> Gate {
        let notify = Arc::new(Notify::new());
        self.state
            .lock()
            .await
            .gates
            .entry(endpoint)
            .or_default()
            .push_back(notify.clone());
        Gate(notify)
    }

    /// Number of calls made to `endpoint`.
    pub async fn calls(&self, endpoint: Endpoint) -> usize {
        self.state
            .lock()
            .await
            .calls
            .get(&endpoint)
            .copied()
            .unwrap_or(0)
    }

    /// Server-side copy of a goal.
    pub async fn goal(&self, id: &GoalId) -> Option<Goal> {
        self.state
            .lock()
            .await
            .goals
            .iter()
            .find(|g| &g.id == id)
            .cloned()
    }

    /// Server-side copy of a roadmap.
    pub async fn roadmap(&self, goal_id: &GoalId) -> Option<Vec<Milestone>> {
        self.state.lock().await.roadmaps.get(goal_id).cloned()
    }

    /// Server-side copy of all tasks.
    pub async fn tasks(&self) -> Vec<Task> {
        self.state.lock().await.tasks.clone()
    }

    /// Count the call, then wait on a gate and apply an injected failure.
    async fn begin(&self, endpoint: Endpoint) -> Result<()> {
        let (gate, failure) = {
            let mut state = self.state.lock().await;
            *state.calls.entry(endpoint).or_insert(0) += 1;
            let gate = state.gates.get_mut(&endpoint).and_then(|q| q.pop_front());
            let failure = state.failures.get_mut(&endpoint).and_then(|q| q.pop_front());
            (gate, failure)
        };

        if let Some(gate) = gate {
            debug!("Holding {:?} until released", endpoint);
            gate.notified().await;
        }

        match failure {
            Some(failure) => Err(failure.into_error(endpoint)),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl QuestGateway for MemoryGateway {
    async fn list_goals(&self) -> Result<Vec<Goal>> {
        self.begin(Endpoint::ListGoals).await?;
        Ok(self.state.lock().await.goals.clone())
    }

    async fn get_goal(&self, id: &GoalId) -> Result<Goal> {
        self.begin(Endpoint::GetGoal).await?;
        let mut state = self.state.lock().await;

        let generating = state.goal_mut(id)?.roadmap_status == RoadmapStatus::Generating;
        if generating {
            let next = state
                .generation
                .get_mut(id)
                .and_then(|script| script.statuses.pop_front());
            if let Some(status) = next {
                state.goal_mut(id)?.roadmap_status = status;
                if status.is_terminal() {
                    if let Some(script) = state.generation.remove(id) {
                        if status == RoadmapStatus::Ready {
                            state.roadmaps.insert(id.clone(), script.milestones);
                        }
                    }
                }
            }
        }

        Ok(state.goal_mut(id)?.clone())
    }

    async fn create_goal(&self, goal: &NewGoal) -> Result<Goal> {
        self.begin(Endpoint::CreateGoal).await?;
        let now = Utc::now();
        let goal = Goal {
            id: GoalId::generate(),
            title: goal.title.clone(),
            description: goal.description.clone(),
            category: goal.category.clone(),
            target_date: goal.target_date,
            status: GoalStatus::Active,
            roadmap_status: RoadmapStatus::None,
            created_at: now,
            updated_at: now,
        };
        self.state.lock().await.goals.push(goal.clone());
        Ok(goal)
    }

    async fn update_goal(&self, id: &GoalId, update: &GoalUpdate) -> Result<Goal> {
        self.begin(Endpoint::UpdateGoal).await?;
        let mut state = self.state.lock().await;
        let goal = state.goal_mut(id)?;
        update.apply(goal, Utc::now());
        Ok(goal.clone())
    }

    async fn delete_goal(&self, id: &GoalId) -> Result<()> {
        self.begin(Endpoint::DeleteGoal).await?;
        let mut state = self.state.lock().await;
        state.goal_mut(id)?;
        state.goals.retain(|g| &g.id != id);
        state.roadmaps.remove(id);
        state.generation.remove(id);
        Ok(())
    }

    async fn get_roadmap(&self, goal_id: &GoalId) -> Result<Vec<Milestone>> {
        self.begin(Endpoint::GetRoadmap).await?;
        let mut state = self.state.lock().await;
        state.goal_mut(goal_id)?;
        Ok(state.roadmaps.get(goal_id).cloned().unwrap_or_default())
    }

    async fn trigger_roadmap_generation(&self, goal_id: &GoalId) -> Result<()> {
        self.begin(Endpoint::GenerateRoadmap).await?;
        let mut state = self.state.lock().await;
        let goal = state.goal_mut(goal_id)?;
        goal.roadmap_status = RoadmapStatus::Generating;
        goal.updated_at = Utc::now();
        Ok(())
    }

    async fn complete_milestone(&self, goal_id: &GoalId, milestone_id: &MilestoneId) -> Result<()> {
        self.begin(Endpoint::CompleteMilestone).await?;
        let mut state = self.state.lock().await;
        let milestones = state
            .roadmaps
            .get_mut(goal_id)
            .ok_or_else(|| GatewayError::NotFound(format!("roadmap {}", goal_id)))?;
        milestones.sort_by_key(|m| m.sequence);

        let milestone = milestones
            .iter_mut()
            .find(|m| &m.id == milestone_id)
            .ok_or_else(|| GatewayError::NotFound(format!("milestone {}", milestone_id)))?;
        milestone.complete().map_err(|e| GatewayError::Status {
            status: 409,
            body: e.to_string(),
        })?;

        if let Some(next) = milestones
            .iter_mut()
            .find(|m| m.status == MilestoneStatus::Locked)
        {
            next.status = MilestoneStatus::Active;
        }
        Ok(())
    }

    async fn list_tasks(&self, date: Day) -> Result<Vec<Task>> {
        self.begin(Endpoint::ListTasks).await?;
        Ok(self
            .state
            .lock()
            .await
            .tasks
            .iter()
            .filter(|t| t.due_date == date)
            .cloned()
            .collect())
    }

    async fn create_task(&self, task: &NewTask) -> Result<Task> {
        self.begin(Endpoint::CreateTask).await?;
        let now = Utc::now();
        let task = Task {
            id: TaskId::generate(),
            title: task.title.clone(),
            description: task.description.clone(),
            due_date: task.due_date,
            priority: task.priority,
            status: TaskStatus::Pending,
            goal_id: task.goal_id.clone(),
            milestone_id: task.milestone_id.clone(),
            created_at: now,
            updated_at: now,
        };
        self.state.lock().await.tasks.push(task.clone());
        Ok(task)
    }

    async fn update_task(&self, id: &TaskId, update: &TaskUpdate) -> Result<Task> {
        self.begin(Endpoint::UpdateTask).await?;
        let mut state = self.state.lock().await;
        let task = state.task_mut(id)?;
        update.apply(task, Utc::now());
        Ok(task.clone())
    }

    async fn delete_task(&self, id: &TaskId) -> Result<()> {
        self.begin(Endpoint::DeleteTask).await?;
        let mut state = self.state.lock().await;
        state.task_mut(id)?;
        state.tasks.retain(|t| &t.id != id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn goal(id: &str, roadmap_status: RoadmapStatus) -> Goal {
        let now = Utc::now();
        Goal {
            id: GoalId::new(id),
            title: format!("Goal {}", id),
            description: String::new(),
            category: String::new(),
            target_date: None,
            status: GoalStatus::Active,
            roadmap_status,
            created_at: now,
            updated_at: now,
        }
    }

    fn milestone(goal: &str, sequence: u32, status: MilestoneStatus) -> Milestone {
        Milestone {
            id: MilestoneId::new(format!("{}-m{}", goal, sequence)),
            goal_id: GoalId::new(goal),
            sequence,
            title: format!("Step {}", sequence),
            description: String::new(),
            duration_estimate: None,
            status,
        }
    }

    #[tokio::test]
    async fn test_scripted_generation_publishes_roadmap() {
        let gateway = MemoryGateway::new();
        let id = GoalId::new("g1");
        gateway.insert_goal(goal("g1", RoadmapStatus::None)).await;
        gateway
            .script_generation(
                &id,
                vec![RoadmapStatus::Generating, RoadmapStatus::Ready],
                vec![milestone("g1", 1, MilestoneStatus::Active)],
            )
            .await;

        gateway.trigger_roadmap_generation(&id).await.unwrap();
        assert_eq!(
            gateway.get_goal(&id).await.unwrap().roadmap_status,
            RoadmapStatus::Generating
        );
        assert!(gateway.get_roadmap(&id).await.unwrap().is_empty());

        assert_eq!(
            gateway.get_goal(&id).await.unwrap().roadmap_status,
            RoadmapStatus::Ready
        );
        assert_eq!(gateway.get_roadmap(&id).await.unwrap().len(), 1);
        assert_eq!(gateway.calls(Endpoint::GetGoal).await, 2);
    }

    #[tokio::test]
    async fn test_injected_failure_applies_once() {
        let gateway = MemoryGateway::new();
        gateway.fail_next(Endpoint::ListGoals, Failure::Server).await;

        assert!(matches!(
            gateway.list_goals().await,
            Err(GatewayError::Status { status: 500, .. })
        ));
        assert!(gateway.list_goals().await.unwrap().is_empty());
        assert_eq!(gateway.calls(Endpoint::ListGoals).await, 2);
    }

    #[tokio::test]
    async fn test_complete_milestone_activates_next() {
        let gateway = MemoryGateway::new();
        let id = GoalId::new("g1");
        gateway.insert_goal(goal("g1", RoadmapStatus::Ready)).await;
        gateway
            .insert_roadmap(
                &id,
                vec![
                    milestone("g1", 2, MilestoneStatus::Locked),
                    milestone("g1", 1, MilestoneStatus::Active),
                ],
            )
            .await;

        gateway
            .complete_milestone(&id, &MilestoneId::new("g1-m1"))
            .await
            .unwrap();

        let roadmap = gateway.roadmap(&id).await.unwrap();
        assert_eq!(roadmap[0].status, MilestoneStatus::Completed);
        assert_eq!(roadmap[1].status, MilestoneStatus::Active);

        let err = gateway
            .complete_milestone(&id, &MilestoneId::new("g1-m1"))
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::Status { status: 409, .. }));
    }

    #[tokio::test]
    async fn test_held_call_waits_for_release() {
        let gateway = Arc::new(MemoryGateway::new());
        let gate = gateway.hold_next(Endpoint::ListGoals).await;

        let pending = tokio::spawn({
            let gateway = gateway.clone();
            async move { gateway.list_goals().await }
        });
        tokio::task::yield_now().await;
        assert!(!pending.is_finished());

        gate.release();
        assert!(pending.await.unwrap().is_ok());
    }
}
