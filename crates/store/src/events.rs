//! Notifications published by the store.

use questline_core::{Day, GoalId, MilestoneId};

/// Something observable changed in the store.
#[derive(Debug, Clone, PartialEq)]
pub enum QuestEvent {
    /// The goal list was reloaded from the server
    GoalsRefreshed {
        /// Goals received
        count: usize,
    },
    /// A goal was deleted
    GoalDeleted(GoalId),
    /// The active roadmap selection changed or was refreshed
    ActiveRoadmapChanged {
        /// Newly selected goal, `None` when cleared
        goal_id: Option<GoalId>,
    },
    /// Roadmap generation finished successfully
    RoadmapReady(GoalId),
    /// The server reported roadmap generation as failed
    GenerationFailed(GoalId),
    /// Polling gave up on roadmap generation
    GenerationTimedOut {
        /// Goal being generated
        goal_id: GoalId,
        /// Polls made
        attempts: u32,
    },
    /// A milestone was completed
    MilestoneCompleted {
        /// Owning goal
        goal_id: GoalId,
        /// Completed milestone
        milestone_id: MilestoneId,
        /// Milestone activated in its place, `None` when the roadmap is finished
        activated: Option<MilestoneId>,
    },
    /// Tasks of a day were reloaded or changed
    TasksChanged {
        /// Affected day
        day: Day,
    },
    /// Access to future tasks flipped
    TaskAccessChanged {
        /// New value
        can_access_future: bool,
    },
}
