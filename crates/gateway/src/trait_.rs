//! Gateway trait abstraction.

use async_trait::async_trait;
use questline_core::{
    Day, Goal, GoalId, GoalUpdate, Milestone, MilestoneId, NewGoal, NewTask, Task, TaskId,
    TaskUpdate,
};

/// Error type for gateway operations.
pub type Result<T> = std::result::Result<T, GatewayError>;

/// Errors that can occur while talking to the remote quest API.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// Network failure
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Response body could not be decoded
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Entity does not exist (404)
    #[error("Not found: {0}")]
    NotFound(String),

    /// Bearer token rejected (401)
    #[error("Unauthorized")]
    Unauthorized,

    /// Any other non-success status
    #[error("Server returned {status}: {body}")]
    Status {
        /// HTTP status code
        status: u16,
        /// Response body
        body: String,
    },

    /// Other error
    #[error("{0}")]
    Other(String),
}

impl GatewayError {
    /// Whether the server reported the entity as missing.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

/// Authoritative store of goals, roadmaps and tasks.
///
/// Roadmap generation is asynchronous: [`trigger_roadmap_generation`]
/// returns as soon as the request is accepted and callers poll
/// [`get_goal`] for the roadmap status.
///
/// [`trigger_roadmap_generation`]: QuestGateway::trigger_roadmap_generation
/// [`get_goal`]: QuestGateway::get_goal
#[async_trait]
pub trait QuestGateway: Send + Sync {
    // === Goal operations ===

    /// List the caller's goals.
    async fn list_goals(&self) -> Result<Vec<Goal>>;

    /// Load a goal by ID.
    async fn get_goal(&self, id: &GoalId) -> Result<Goal>;

    /// Create a goal.
    async fn create_goal(&self, goal: &NewGoal) -> Result<Goal>;

    /// Update a goal.
    async fn update_goal(&self, id: &GoalId, update: &GoalUpdate) -> Result<Goal>;

    /// Delete a goal.
    async fn delete_goal(&self, id: &GoalId) -> Result<()>;

    // === Roadmap operations ===

    /// Fetch the milestones of a goal's roadmap.
    async fn get_roadmap(&self, goal_id: &GoalId) -> Result<Vec<Milestone>>;

    /// Ask the server to generate a roadmap. Fire-and-forget.
    async fn trigger_roadmap_generation(&self, goal_id: &GoalId) -> Result<()>;

    /// Mark the active milestone completed.
    async fn complete_milestone(&self, goal_id: &GoalId, milestone_id: &MilestoneId) -> Result<()>;

    // === Task operations ===

    /// List tasks due on `date`.
    async fn list_tasks(&self, date: Day) -> Result<Vec<Task>>;

    /// Create a task.
    async fn create_task(&self, task: &NewTask) -> Result<Task>;

    /// Update a task.
    async fn update_task(&self, id: &TaskId, update: &TaskUpdate) -> Result<Task>;

    /// Delete a task.
    async fn delete_task(&self, id: &TaskId) -> Result<()>;
}
