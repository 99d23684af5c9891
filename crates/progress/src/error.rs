//! Error taxonomy of the quest engine.

use questline_core::{GoalId, TransitionError, ValidationError};
use questline_gateway::GatewayError;

/// Error type for engine and store operations.
pub type Result<T> = std::result::Result<T, QuestError>;

/// Errors surfaced to the store's callers.
#[derive(Debug, thiserror::Error)]
pub enum QuestError {
    /// Network failure, server error or rejected credentials
    #[error("Transport error: {0}")]
    Transport(String),

    /// The entity does not exist on the server
    #[error("Not found: {0}")]
    NotFound(String),

    /// The server reported roadmap generation as failed
    #[error("Roadmap generation failed for goal {0}")]
    GenerationFailed(GoalId),

    /// Polling gave up before the server finished generating
    #[error("Roadmap generation for goal {goal_id} timed out after {attempts} attempts")]
    GenerationTimeout {
        /// Goal being generated
        goal_id: GoalId,
        /// Polls made before giving up
        attempts: u32,
    },

    /// Input rejected before calling the server
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Milestone state machine violation
    #[error("Invalid transition: {0}")]
    InvalidTransition(String),

    /// Snapshot could not be loaded or saved
    #[error("Persistence error: {0}")]
    Persistence(String),
}

/// Copyable classification of a [`QuestError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// See [`QuestError::Transport`]
    Transport,
    /// See [`QuestError::NotFound`]
    NotFound,
    /// See [`QuestError::GenerationFailed`]
    GenerationFailed,
    /// See [`QuestError::GenerationTimeout`]
    GenerationTimeout,
    /// See [`QuestError::Validation`]
    Validation,
    /// See [`QuestError::InvalidTransition`]
    InvalidTransition,
    /// See [`QuestError::Persistence`]
    Persistence,
}

impl QuestError {
    /// Classify the error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Transport(_) => ErrorKind::Transport,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::GenerationFailed(_) => ErrorKind::GenerationFailed,
            Self::GenerationTimeout { .. } => ErrorKind::GenerationTimeout,
            Self::Validation(_) => ErrorKind::Validation,
            Self::InvalidTransition(_) => ErrorKind::InvalidTransition,
            Self::Persistence(_) => ErrorKind::Persistence,
        }
    }

    /// Errors produced by the client itself rather than reported by the server.
    pub fn is_client_synthesized(&self) -> bool {
        matches!(
            self,
            Self::GenerationTimeout { .. } | Self::Validation(_) | Self::InvalidTransition(_)
        )
    }
}

impl From<GatewayError> for QuestError {
    fn from(err: GatewayError) -> Self {
        match err {
            GatewayError::NotFound(what) => QuestError::NotFound(what),
            other => QuestError::Transport(other.to_string()),
        }
    }
}

impl From<TransitionError> for QuestError {
    fn from(err: TransitionError) -> Self {
        QuestError::InvalidTransition(err.to_string())
    }
}
