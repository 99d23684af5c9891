//! Quest store
//!
//! The facade the application talks to: read selectors plus actions over
//! goals, roadmaps and tasks, backed by the remote quest API, a TTL cache
//! and a persisted snapshot.

#![warn(missing_docs)]

pub mod config;
pub mod events;
pub mod signal;
mod state;
pub mod store;

pub use config::StoreConfig;
pub use events::QuestEvent;
pub use signal::{MutatedEntity, QuestMutationSignal, SignalConfidence};
pub use state::LastError;
pub use store::QuestStore;
