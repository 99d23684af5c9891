//! Roadmap generation polling.
//!
//! Generation runs on the server; the client polls the goal until its
//! roadmap status becomes `ready` or `error`, or until the attempt budget is
//! spent. Each poll loop runs as its own task so it can be aborted, and the
//! [`PollRegistry`] keeps at most one loop per goal.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use questline_core::{Goal, GoalId, RoadmapStatus};
use questline_gateway::QuestGateway;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tokio::task::{AbortHandle, JoinHandle};
use tracing::{debug, info, warn};

use crate::error::{QuestError, Result};

/// Polling parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollConfig {
    /// Pause between two polls
    pub interval: Duration,

    /// Polls before giving up
    pub max_attempts: u32,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(2),
            max_attempts: 30,
        }
    }
}

/// How a poll loop ended.
#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome {
    /// The server finished the roadmap
    Ready(Goal),
    /// The server reported a generation error
    Failed(Goal),
    /// The attempt budget ran out while still generating
    TimedOut {
        /// Polls made
        attempts: u32,
    },
}

impl PollOutcome {
    /// Turn failures into the matching [`QuestError`].
    pub fn into_result(self, goal_id: &GoalId) -> Result<Goal> {
        match self {
            PollOutcome::Ready(goal) => Ok(goal),
            PollOutcome::Failed(_) => Err(QuestError::GenerationFailed(goal_id.clone())),
            PollOutcome::TimedOut { attempts } => Err(QuestError::GenerationTimeout {
                goal_id: goal_id.clone(),
                attempts,
            }),
        }
    }
}

/// Polls a goal until its roadmap generation finishes.
pub struct GenerationPoller {
    gateway: Arc<dyn QuestGateway>,
    config: PollConfig,
}

impl GenerationPoller {
    /// Create a poller.
    pub fn new(gateway: Arc<dyn QuestGateway>, config: PollConfig) -> Self {
        Self { gateway, config }
    }

    /// Poll until a terminal status or the attempt budget is spent.
    ///
    /// Transport failures use up an attempt; a missing goal ends the loop
    /// with `NotFound`. No timer is left running once this returns.
    pub async fn run(&self, goal_id: &GoalId) -> Result<PollOutcome> {
        let max_attempts = self.config.max_attempts.max(1);
        let mut attempts = 0u32;

        loop {
            attempts += 1;
            match self.gateway.get_goal(goal_id).await {
                Ok(goal) => match goal.roadmap_status {
                    RoadmapStatus::Ready => {
                        info!("Roadmap for goal {} ready after {} polls", goal_id, attempts);
                        return Ok(PollOutcome::Ready(goal));
                    }
                    RoadmapStatus::Error => {
                        warn!("Server reported roadmap generation failure for goal {}", goal_id);
                        return Ok(PollOutcome::Failed(goal));
                    }
                    status => {
                        debug!(
                            "Goal {} roadmap {} (poll {}/{})",
                            goal_id, status, attempts, max_attempts
                        );
                    }
                },
                Err(e) if e.is_not_found() => return Err(e.into()),
                Err(e) => warn!("Poll {}/{} for goal {} failed: {}", attempts, max_attempts, goal_id, e),
            }

            if attempts >= max_attempts {
                warn!("Giving up on goal {} after {} polls", goal_id, attempts);
                return Ok(PollOutcome::TimedOut { attempts });
            }
            tokio::time::sleep(self.config.interval).await;
        }
    }
}

/// Running poll loop for one goal.
#[derive(Debug)]
pub struct PollHandle {
    goal_id: GoalId,
    join: JoinHandle<Result<PollOutcome>>,
}

impl PollHandle {
    /// Goal being polled.
    pub fn goal_id(&self) -> &GoalId {
        &self.goal_id
    }

    /// Wait for the loop to end. `None` if it was cancelled.
    pub async fn wait(self) -> Option<Result<PollOutcome>> {
        match self.join.await {
            Ok(result) => Some(result),
            Err(e) if e.is_cancelled() => None,
            Err(e) => Some(Err(QuestError::Transport(format!("poll task failed: {}", e)))),
        }
    }
}

/// Tracks the poll loops in flight, one per goal.
///
/// A goal is reserved before generation is triggered and the loop is
/// attached to the reservation once the trigger succeeded, so a goal never
/// has two triggers or two loops at once.
#[derive(Default)]
pub struct PollRegistry {
    active: Mutex<HashMap<GoalId, (u64, Option<AbortHandle>)>>,
    next_token: Mutex<u64>,
}

impl PollRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim `goal_id`. Returns the reservation token, or `None` if the
    /// goal is already reserved or polled.
    pub async fn try_reserve(&self, goal_id: &GoalId) -> Option<u64> {
        let mut active = self.active.lock().await;
        if active.contains_key(goal_id) {
            debug!("Poll for goal {} already running", goal_id);
            return None;
        }

        let token = {
            let mut next = self.next_token.lock().await;
            *next += 1;
            *next
        };
        active.insert(goal_id.clone(), (token, None));
        Some(token)
    }

    /// Run the loop built by `make` under the reservation `token`.
    ///
    /// If the reservation was cancelled meanwhile the loop is aborted
    /// before it starts and the handle reports cancellation.
    pub async fn spawn_reserved<F, Fut>(
        &self,
        goal_id: &GoalId,
        token: u64,
        make: F,
    ) -> PollHandle
    where
        F: FnOnce(u64) -> Fut,
        Fut: Future<Output = Result<PollOutcome>> + Send + 'static,
    {
        let mut active = self.active.lock().await;
        let join = tokio::spawn(make(token));
        match active.get_mut(goal_id) {
            Some((t, handle)) if *t == token => *handle = Some(join.abort_handle()),
            _ => {
                debug!("Reservation for goal {} was cancelled", goal_id);
                join.abort();
            }
        }

        PollHandle {
            goal_id: goal_id.clone(),
            join,
        }
    }

    /// Reserve `goal_id` and spawn the loop built by `make`, unless one is
    /// already running. `make` receives the token to pass to [`finish`].
    ///
    /// [`finish`]: PollRegistry::finish
    pub async fn spawn<F, Fut>(&self, goal_id: &GoalId, make: F) -> Option<PollHandle>
    where
        F: FnOnce(u64) -> Fut,
        Fut: Future<Output = Result<PollOutcome>> + Send + 'static,
    {
        let token = self.try_reserve(goal_id).await?;
        Some(self.spawn_reserved(goal_id, token, make).await)
    }

    /// Release the reservation `token`. Called by a loop when it ends on
    /// its own, or when generation could not be triggered.
    pub async fn finish(&self, goal_id: &GoalId, token: u64) {
        let mut active = self.active.lock().await;
        if active.get(goal_id).map(|(t, _)| *t) == Some(token) {
            active.remove(goal_id);
        }
    }

    /// Abort the loop for `goal_id`. Returns whether one was reserved or
    /// running.
    pub async fn cancel(&self, goal_id: &GoalId) -> bool {
        match self.active.lock().await.remove(goal_id) {
            Some((_, handle)) => {
                if let Some(handle) = handle {
                    handle.abort();
                }
                info!("Cancelled roadmap poll for goal {}", goal_id);
                true
            }
            None => false,
        }
    }

    /// Abort every loop.
    pub async fn cancel_all(&self) {
        for (_, (_, handle)) in self.active.lock().await.drain() {
            if let Some(handle) = handle {
                handle.abort();
            }
        }
    }

    /// Whether `goal_id` is reserved or polled.
    pub async fn is_active(&self, goal_id: &GoalId) -> bool {
        self.active.lock().await.contains_key(goal_id)
    }
}
