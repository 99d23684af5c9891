//! Store configuration.

use std::time::Duration;

use questline_progress::{PollConfig, CACHE_EXPIRY};
use serde::{Deserialize, Serialize};

/// Tunables of a [`QuestStore`](crate::QuestStore).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Freshness window of cached goals, roadmaps and task lists
    pub cache_ttl: Duration,

    /// Roadmap generation polling
    pub poll: PollConfig,

    /// Buffered events per subscriber before the oldest are dropped
    pub event_capacity: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            cache_ttl: CACHE_EXPIRY,
            poll: PollConfig::default(),
            event_capacity: 64,
        }
    }
}
