//! Roadmap values: cached milestone lists and the active selection.

use serde::{Deserialize, Serialize};
use crate::goal::Goal;
use crate::id::GoalId;
use crate::milestone::{Milestone, MilestoneStatus};
use crate::Time;

/// A goal together with its ordered milestones.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Roadmap {
    /// Denormalized owning goal
    pub goal: Goal,

    /// Milestones ordered by sequence
    pub milestones: Vec<Milestone>,
}

/// A cached value and the moment it was fetched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry<V> {
    /// Cached value
    #[serde(flatten)]
    pub value: V,

    /// When the value was fetched from the remote API
    pub fetched_at: Time,
}

/// The roadmap currently shown to the user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveRoadmap {
    /// Selected goal
    pub goal_id: GoalId,

    /// Denormalized goal
    pub goal: Goal,

    /// Milestones ordered by sequence; empty when no roadmap is available
    pub milestones: Vec<Milestone>,

    /// Set when the roadmap fetch failed and `milestones` is a placeholder
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub roadmap_unavailable: bool,
}

impl ActiveRoadmap {
    /// Selection with a full roadmap.
    pub fn new(goal: Goal, milestones: Vec<Milestone>) -> Self {
        Self {
            goal_id: goal.id.clone(),
            goal,
            milestones,
            roadmap_unavailable: false,
        }
    }

    /// Selection for a goal whose roadmap is not (yet) available.
    pub fn without_roadmap(goal: Goal) -> Self {
        Self::new(goal, Vec::new())
    }

    /// Selection degraded after a failed roadmap fetch.
    pub fn unavailable(goal: Goal) -> Self {
        Self {
            roadmap_unavailable: true,
            ..Self::without_roadmap(goal)
        }
    }

    /// The milestone currently in progress, if any.
    pub fn active_milestone(&self) -> Option<&Milestone> {
        self.milestones
            .iter()
            .find(|m| m.status == MilestoneStatus::Active)
    }

    /// Completion summary of the milestones.
    pub fn progress(&self) -> RoadmapProgress {
        RoadmapProgress::of(&self.milestones)
    }
}

/// Progress tracking for a roadmap.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct RoadmapProgress {
    /// Completed milestones
    pub completed_milestones: usize,

    /// Total milestones
    pub total_milestones: usize,

    /// Percentage complete
    pub percentage: f32,
}

impl RoadmapProgress {
    /// Summarize a milestone list.
    pub fn of(milestones: &[Milestone]) -> Self {
        let total = milestones.len();
        let completed = milestones
            .iter()
            .filter(|m| m.status == MilestoneStatus::Completed)
            .count();
        let percentage = if total > 0 {
            (completed as f32 / total as f32) * 100.0
        } else {
            0.0
        };

        Self {
            completed_milestones: completed,
            total_milestones: total,
            percentage,
        }
    }

    /// Every milestone is completed.
    pub fn is_finished(&self) -> bool {
        self.total_milestones > 0 && self.completed_milestones == self.total_milestones
    }
}
