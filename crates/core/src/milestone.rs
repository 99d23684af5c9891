//! Milestone model - one step of a goal's roadmap.

use serde::{Deserialize, Serialize};
use crate::id::{GoalId, MilestoneId};

/// A milestone is a stage of a goal's roadmap.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Milestone {
    /// Unique identifier
    pub id: MilestoneId,

    /// Owning goal
    pub goal_id: GoalId,

    /// Position in the roadmap, strictly increasing within a goal
    pub sequence: u32,

    /// Milestone title
    pub title: String,

    /// Description
    #[serde(default)]
    pub description: String,

    /// Human readable duration estimate ("2 weeks")
    #[serde(default)]
    pub duration_estimate: Option<String>,

    /// Milestone status
    pub status: MilestoneStatus,
}

impl Milestone {
    /// Move `locked -> active`.
    pub fn activate(&mut self) -> Result<(), TransitionError> {
        self.transition(MilestoneStatus::Active)
    }

    /// Move `active -> completed`.
    pub fn complete(&mut self) -> Result<(), TransitionError> {
        self.transition(MilestoneStatus::Completed)
    }

    /// Locked milestones cannot hold tasks.
    pub fn can_hold_tasks(&self) -> bool {
        self.status != MilestoneStatus::Locked
    }

    fn transition(&mut self, to: MilestoneStatus) -> Result<(), TransitionError> {
        if !self.status.can_transition_to(to) {
            return Err(TransitionError {
                milestone: self.id.clone(),
                from: self.status,
                to,
            });
        }
        self.status = to;
        Ok(())
    }
}

/// Milestone status. Transitions only go forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MilestoneStatus {
    /// Not reached yet
    Locked,
    /// Currently worked on
    Active,
    /// Done
    Completed,
}

impl MilestoneStatus {
    /// Whether `self -> to` is a legal step.
    pub fn can_transition_to(&self, to: MilestoneStatus) -> bool {
        matches!(
            (self, to),
            (Self::Locked, Self::Active) | (Self::Active, Self::Completed)
        )
    }
}

impl std::fmt::Display for MilestoneStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MilestoneStatus::Locked => write!(f, "locked"),
            MilestoneStatus::Active => write!(f, "active"),
            MilestoneStatus::Completed => write!(f, "completed"),
        }
    }
}

/// Rejected milestone state change.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("milestone {milestone} cannot move from {from} to {to}")]
pub struct TransitionError {
    /// Milestone that was asked to move
    pub milestone: MilestoneId,
    /// Current status
    pub from: MilestoneStatus,
    /// Requested status
    pub to: MilestoneStatus,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn milestone(status: MilestoneStatus) -> Milestone {
        Milestone {
            id: MilestoneId::new("m1"),
            goal_id: GoalId::new("g1"),
            sequence: 1,
            title: "Base mileage".to_string(),
            description: String::new(),
            duration_estimate: None,
            status,
        }
    }

    #[test]
    fn test_forward_transitions() {
        let mut m = milestone(MilestoneStatus::Locked);
        assert!(!m.can_hold_tasks());
        m.activate().unwrap();
        assert!(m.can_hold_tasks());
        m.complete().unwrap();
        assert_eq!(m.status, MilestoneStatus::Completed);
    }

    #[test]
    fn test_no_regression_or_skipping() {
        let mut locked = milestone(MilestoneStatus::Locked);
        let err = locked.complete().unwrap_err();
        assert_eq!(err.from, MilestoneStatus::Locked);
        assert_eq!(err.to, MilestoneStatus::Completed);

        let mut done = milestone(MilestoneStatus::Completed);
        assert!(done.activate().is_err());
        assert_eq!(done.status, MilestoneStatus::Completed);
    }
}
