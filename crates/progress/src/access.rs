//! Progressive access to future tasks.
//!
//! Tasks scheduled after today stay hidden until enough of today's tasks
//! are done. The check is pull-based: callers re-run it after every change
//! to today's tasks.

use questline_core::Task;
use serde::Serialize;

/// Share of today's tasks that must be completed to unlock future tasks.
pub const FUTURE_ACCESS_THRESHOLD: f64 = 0.8;

/// Completed share of `today`. An empty day counts as 0, not 100%.
pub fn completion_rate(today: &[Task]) -> f64 {
    if today.is_empty() {
        return 0.0;
    }
    let completed = today.iter().filter(|t| t.is_completed()).count();
    completed as f64 / today.len() as f64
}

/// Whether `rate` unlocks future tasks (inclusive at the threshold).
pub fn can_access_future(rate: f64) -> bool {
    rate >= FUTURE_ACCESS_THRESHOLD
}

/// Result of the last access check.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct TaskAccess {
    /// Completed share of today's tasks
    pub completion_rate: f64,

    /// Future tasks are visible
    pub can_access_future: bool,
}

impl TaskAccess {
    /// Evaluate access from today's tasks.
    pub fn evaluate(today: &[Task]) -> Self {
        let completion_rate = completion_rate(today);
        Self {
            completion_rate,
            can_access_future: can_access_future(completion_rate),
        }
    }
}

/// Today's and tomorrow's tasks with the access flag.
#[derive(Debug, Clone, Default, Serialize)]
pub struct TaskAccessState {
    /// Tasks due today
    pub today: Vec<Task>,

    /// Tasks due tomorrow
    pub future: Vec<Task>,

    /// Future tasks may be shown
    pub can_access_future: bool,
}

/// What the task screens may show.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AvailableTasks {
    /// Today's tasks, always shown
    pub today: Vec<Task>,

    /// Future tasks, empty while locked
    pub future: Vec<Task>,

    /// Future section is unlocked. Distinguishes "locked" from "nothing scheduled".
    pub show_future: bool,
}

impl AvailableTasks {
    /// Gate `future` on the completion of `today`.
    pub fn compute(today: &[Task], future: &[Task]) -> Self {
        let show_future = TaskAccess::evaluate(today).can_access_future;
        Self {
            today: today.to_vec(),
            future: if show_future { future.to_vec() } else { Vec::new() },
            show_future,
        }
    }
}
