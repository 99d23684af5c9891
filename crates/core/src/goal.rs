//! Goal model - long-term objective with an optional generated roadmap.

use serde::{Deserialize, Serialize};
use crate::id::GoalId;
use crate::{require_text, Day, Time, ValidationError};

/// A goal is a long-term objective the user works towards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Goal {
    /// Unique identifier
    pub id: GoalId,

    /// Goal title
    pub title: String,

    /// Detailed description
    #[serde(default)]
    pub description: String,

    /// Free-form category ("health", "career", ...)
    #[serde(default)]
    pub category: String,

    /// Date the user wants to reach the goal by
    #[serde(default)]
    pub target_date: Option<Day>,

    /// Lifecycle status
    pub status: GoalStatus,

    /// State of the asynchronously generated roadmap
    #[serde(default)]
    pub roadmap_status: RoadmapStatus,

    /// When created
    pub created_at: Time,

    /// Last updated
    pub updated_at: Time,
}

impl Goal {
    /// Whether the roadmap can be fetched for this goal.
    pub fn has_roadmap(&self) -> bool {
        self.roadmap_status == RoadmapStatus::Ready
    }
}

/// Goal lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum GoalStatus {
    /// Goal is being worked on
    #[default]
    Active,
    /// Goal reached
    Completed,
    /// Goal put on hold
    Paused,
}

/// Roadmap generation status of a goal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RoadmapStatus {
    /// No roadmap requested
    #[default]
    None,
    /// Generation requested, not finished
    Generating,
    /// Milestones are available
    Ready,
    /// Generation failed or timed out
    Error,
}

impl RoadmapStatus {
    /// Whether generation has finished, successfully or not.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Ready | Self::Error)
    }
}

impl std::fmt::Display for RoadmapStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RoadmapStatus::None => write!(f, "none"),
            RoadmapStatus::Generating => write!(f, "generating"),
            RoadmapStatus::Ready => write!(f, "ready"),
            RoadmapStatus::Error => write!(f, "error"),
        }
    }
}

/// Payload for creating a goal.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewGoal {
    /// Goal title
    pub title: String,
    /// Detailed description
    pub description: String,
    /// Category
    pub category: String,
    /// Target date
    pub target_date: Option<Day>,
}

impl NewGoal {
    /// Create a goal payload with just a title.
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Default::default()
        }
    }

    /// Check required fields.
    pub fn validate(&self) -> Result<(), ValidationError> {
        require_text("title", &self.title)
    }
}

/// Partial update of a goal. `None` fields are left untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GoalUpdate {
    /// New title
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// New description
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// New category
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    /// New target date
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_date: Option<Day>,
    /// New lifecycle status
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<GoalStatus>,
}

impl GoalUpdate {
    /// Update that only changes the lifecycle status.
    pub fn status(status: GoalStatus) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }

    /// Check the update is non-empty and keeps required fields filled.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.title.is_none()
            && self.description.is_none()
            && self.category.is_none()
            && self.target_date.is_none()
            && self.status.is_none()
        {
            return Err(ValidationError::EmptyUpdate("goal"));
        }
        if let Some(title) = &self.title {
            require_text("title", title)?;
        }
        Ok(())
    }

    /// Apply the update to a local copy.
    pub fn apply(&self, goal: &mut Goal, now: Time) {
        if let Some(title) = &self.title {
            goal.title = title.clone();
        }
        if let Some(description) = &self.description {
            goal.description = description.clone();
        }
        if let Some(category) = &self.category {
            goal.category = category.clone();
        }
        if let Some(target_date) = self.target_date {
            goal.target_date = Some(target_date);
        }
        if let Some(status) = self.status {
            goal.status = status;
        }
        goal.updated_at = now;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roadmap_status_wire_names() {
        assert_eq!(serde_json::to_string(&RoadmapStatus::None).unwrap(), "\"none\"");
        assert_eq!(
            serde_json::to_string(&RoadmapStatus::Generating).unwrap(),
            "\"generating\""
        );
        assert!(RoadmapStatus::Ready.is_terminal());
        assert!(RoadmapStatus::Error.is_terminal());
        assert!(!RoadmapStatus::Generating.is_terminal());
    }

    #[test]
    fn test_goal_without_roadmap_status_defaults_to_none() {
        let json = r#"{
            "id": "g1",
            "title": "Run a marathon",
            "status": "active",
            "created_at": "2026-01-01T00:00:00Z",
            "updated_at": "2026-01-01T00:00:00Z"
        }"#;
        let goal: Goal = serde_json::from_str(json).unwrap();
        assert_eq!(goal.roadmap_status, RoadmapStatus::None);
        assert!(!goal.has_roadmap());
    }

    #[test]
    fn test_new_goal_requires_title() {
        assert_eq!(
            NewGoal::new("   ").validate(),
            Err(ValidationError::EmptyField("title"))
        );
        assert!(NewGoal::new("Learn Rust").validate().is_ok());
    }

    #[test]
    fn test_empty_goal_update_rejected() {
        assert_eq!(
            GoalUpdate::default().validate(),
            Err(ValidationError::EmptyUpdate("goal"))
        );
        assert!(GoalUpdate::status(GoalStatus::Paused).validate().is_ok());
    }
}
