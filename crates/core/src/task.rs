//! Task model - short-lived actionable item for a given day.

use serde::{Deserialize, Serialize};
use crate::id::{GoalId, MilestoneId, TaskId};
use crate::{require_text, Day, Time, ValidationError};

/// A task is a unit of work scheduled for a day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    /// Unique identifier
    pub id: TaskId,

    /// Task title
    pub title: String,

    /// Detailed description
    #[serde(default)]
    pub description: String,

    /// Day the task is scheduled for
    pub due_date: Day,

    /// Priority
    #[serde(default)]
    pub priority: TaskPriority,

    /// Current status
    pub status: TaskStatus,

    /// Goal this task contributes to
    #[serde(default)]
    pub goal_id: Option<GoalId>,

    /// Milestone this task belongs to
    #[serde(default)]
    pub milestone_id: Option<MilestoneId>,

    /// Creation timestamp
    pub created_at: Time,

    /// Last update timestamp
    pub updated_at: Time,
}

impl Task {
    /// Whether the task is done.
    pub fn is_completed(&self) -> bool {
        self.status == TaskStatus::Completed
    }
}

/// Task priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TaskPriority {
    /// Low priority
    Low,
    /// Medium priority
    #[default]
    Medium,
    /// High priority
    High,
}

impl std::str::FromStr for TaskPriority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            other => Err(format!("unknown priority: {}", other)),
        }
    }
}

/// Task lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TaskStatus {
    /// Not started
    #[default]
    Pending,
    /// Being worked on
    InProgress,
    /// Done
    Completed,
}

/// Payload for creating a task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewTask {
    /// Task title
    pub title: String,
    /// Description
    pub description: String,
    /// Scheduled day
    pub due_date: Day,
    /// Priority
    pub priority: TaskPriority,
    /// Linked goal
    pub goal_id: Option<GoalId>,
    /// Linked milestone
    pub milestone_id: Option<MilestoneId>,
}

impl NewTask {
    /// Create a medium priority task for `due_date`.
    pub fn new(title: impl Into<String>, due_date: Day) -> Self {
        Self {
            title: title.into(),
            description: String::new(),
            due_date,
            priority: TaskPriority::default(),
            goal_id: None,
            milestone_id: None,
        }
    }

    /// Check required fields.
    pub fn validate(&self) -> Result<(), ValidationError> {
        require_text("title", &self.title)
    }
}

/// Partial update of a task. `None` fields are left untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskUpdate {
    /// New title
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// New description
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// New day
    #[serde(skip_serializing_if = "Option::is_none")]
    pub due_date: Option<Day>,
    /// New priority
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<TaskPriority>,
    /// New status
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<TaskStatus>,
    /// New milestone binding
    #[serde(skip_serializing_if = "Option::is_none")]
    pub milestone_id: Option<MilestoneId>,
}

impl TaskUpdate {
    /// Update that only changes the status.
    pub fn status(status: TaskStatus) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }

    /// Check the update is non-empty and keeps required fields filled.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.title.is_none()
            && self.description.is_none()
            && self.due_date.is_none()
            && self.priority.is_none()
            && self.status.is_none()
            && self.milestone_id.is_none()
        {
            return Err(ValidationError::EmptyUpdate("task"));
        }
        if let Some(title) = &self.title {
            require_text("title", title)?;
        }
        Ok(())
    }

    /// Apply the update to a local copy.
    pub fn apply(&self, task: &mut Task, now: Time) {
        if let Some(title) = &self.title {
            task.title = title.clone();
        }
        if let Some(description) = &self.description {
            task.description = description.clone();
        }
        if let Some(due_date) = self.due_date {
            task.due_date = due_date;
        }
        if let Some(priority) = self.priority {
            task.priority = priority;
        }
        if let Some(status) = self.status {
            task.status = status;
        }
        if let Some(milestone_id) = &self.milestone_id {
            task.milestone_id = Some(milestone_id.clone());
        }
        task.updated_at = now;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_wire_names() {
        assert_eq!(
            serde_json::to_string(&TaskStatus::InProgress).unwrap(),
            "\"in-progress\""
        );
        assert_eq!(serde_json::to_string(&TaskPriority::High).unwrap(), "\"high\"");
    }

    #[test]
    fn test_priority_parsing() {
        assert_eq!("HIGH".parse::<TaskPriority>(), Ok(TaskPriority::High));
        assert!("urgent".parse::<TaskPriority>().is_err());
    }

    #[test]
    fn test_new_task_requires_title() {
        let day = Day::from_ymd_opt(2026, 3, 1).unwrap();
        assert_eq!(
            NewTask::new("", day).validate(),
            Err(ValidationError::EmptyField("title"))
        );
        assert!(NewTask::new("Stretch", day).validate().is_ok());
    }

    #[test]
    fn test_update_apply_touches_only_given_fields() {
        let day = Day::from_ymd_opt(2026, 3, 1).unwrap();
        let created = chrono::Utc::now();
        let mut task = Task {
            id: TaskId::new("t1"),
            title: "Stretch".to_string(),
            description: "10 minutes".to_string(),
            due_date: day,
            priority: TaskPriority::Low,
            status: TaskStatus::Pending,
            goal_id: None,
            milestone_id: None,
            created_at: created,
            updated_at: created,
        };

        let later = created + chrono::Duration::minutes(5);
        TaskUpdate::status(TaskStatus::Completed).apply(&mut task, later);

        assert!(task.is_completed());
        assert_eq!(task.title, "Stretch");
        assert_eq!(task.priority, TaskPriority::Low);
        assert_eq!(task.updated_at, later);
    }
}
