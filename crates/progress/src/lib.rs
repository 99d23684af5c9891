//! Progression engine for goals, roadmaps and daily tasks.
//!
//! Roadmap caching, the active roadmap selection with its milestone state
//! machine, roadmap generation polling, and the gate on future tasks.

#![warn(missing_docs)]

pub mod error;
pub mod clock;
pub mod cache;
pub mod progression;
pub mod access;
pub mod poller;

pub use error::{ErrorKind, QuestError, Result};
pub use clock::{Clock, ManualClock, SystemClock};
pub use cache::{is_fresh, TtlCache, CACHE_EXPIRY};
pub use progression::{
    activate_next, auto_select_candidate, check_roadmap, complete_and_advance, ensure_can_bind,
    normalize_roadmap,
    ProgressionEngine, RoadmapAnomaly, SelectionTicket,
};
pub use access::{
    can_access_future, completion_rate, AvailableTasks, TaskAccess, TaskAccessState,
    FUTURE_ACCESS_THRESHOLD,
};
pub use poller::{GenerationPoller, PollConfig, PollHandle, PollOutcome, PollRegistry};
