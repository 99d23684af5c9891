//! Questline core data models.
//!
//! Plain, serializable value types for goals, their roadmaps of milestones
//! and daily tasks. Ownership between entities is expressed through id
//! fields only, so persisted snapshots stay flat and free of cycles.

#![warn(missing_docs)]

// Core identities
mod id;

// Goals and their roadmaps
mod goal;
mod milestone;
mod roadmap;

// Daily work
mod task;

// Cross-session persistence
mod snapshot;

// Re-exports
pub use id::*;

pub use goal::{Goal, GoalStatus, GoalUpdate, NewGoal, RoadmapStatus};
pub use milestone::{Milestone, MilestoneStatus, TransitionError};
pub use roadmap::{ActiveRoadmap, CacheEntry, Roadmap, RoadmapProgress};
pub use task::{NewTask, Task, TaskPriority, TaskStatus, TaskUpdate};
pub use snapshot::QuestSnapshot;

/// Timestamp type
pub type Time = chrono::DateTime<chrono::Utc>;

/// Calendar day used to scope tasks.
pub type Day = chrono::NaiveDate;

/// Input rejected before any request leaves the client.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    /// A required text field is empty or whitespace.
    #[error("{0} must not be empty")]
    EmptyField(&'static str),

    /// An update carries no changes.
    #[error("update for {0} contains no changes")]
    EmptyUpdate(&'static str),
}

pub(crate) fn require_text(field: &'static str, value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        Err(ValidationError::EmptyField(field))
    } else {
        Ok(())
    }
}
