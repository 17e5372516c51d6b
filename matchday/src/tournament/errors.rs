//! Tournament error types.

use thiserror::Error;

use super::models::{Stage, TournamentId, TournamentState};
use crate::access::{Action, ActorId};

/// Tournament errors
#[derive(Debug, Error)]
pub enum TournamentError {
    /// Malformed or out-of-range input
    #[error("Validation failed: {0}")]
    Validation(String),

    /// A match the standings cannot fold
    #[error("Invalid match #{index}: {reason}")]
    InvalidMatch { index: usize, reason: String },

    /// Playoff size is not a supported power of two
    #[error("Invalid bracket size {size} for {teams} teams (supported: 4 or 8)")]
    InvalidBracketSize { size: usize, teams: usize },

    /// Bracket stage requested out of order
    #[error(
        "Illegal stage transition in tournament {tournament_id}: current stage is {current}, requested {requested}"
    )]
    IllegalStageTransition {
        tournament_id: TournamentId,
        current: Stage,
        requested: Stage,
    },

    /// Lifecycle operation not allowed in the current state
    #[error("Cannot {action} while tournament {tournament_id} is {state}")]
    InvalidTransition {
        tournament_id: TournamentId,
        state: TournamentState,
        action: &'static str,
    },

    /// Counted match that needs an explicit reset before it can change
    #[error("Match #{index} of the {stage} in tournament {tournament_id} is locked; reset it first")]
    LockedMatch {
        tournament_id: TournamentId,
        stage: Stage,
        index: usize,
    },

    /// Concurrent write detected by the store
    #[error("Tournament {tournament_id} was modified concurrently (expected version {expected_version})")]
    Conflict {
        tournament_id: TournamentId,
        expected_version: i64,
    },

    /// Career saved by someone else since it was loaded
    #[error("Participant {participant} was modified concurrently (expected version {expected_version})")]
    ParticipantConflict {
        participant: String,
        expected_version: i64,
    },

    #[error("Tournament not found: {0}")]
    NotFound(TournamentId),

    #[error("Participant not found: {0}")]
    ParticipantNotFound(String),

    #[error("Team category not found: {0}")]
    CategoryNotFound(String),

    /// A tournament entry with no participant record or no team
    #[error("Unknown participant {participant} in tournament {tournament_id}")]
    UnknownParticipant {
        tournament_id: TournamentId,
        participant: String,
    },

    #[error("Actor {actor} is not allowed to {action}")]
    Denied { actor: ActorId, action: Action },

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl TournamentError {
    /// Get a client-safe error message that doesn't leak storage internals
    pub fn client_message(&self) -> String {
        match self {
            TournamentError::Database(_) | TournamentError::Serialization(_) => {
                "Internal server error".to_string()
            }
            _ => self.to_string(),
        }
    }

    /// Only storage conflicts are worth retrying, and only with fresh data.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            TournamentError::Conflict { .. } | TournamentError::ParticipantConflict { .. }
        )
    }
}

/// Result type for tournament operations
pub type TournamentResult<T> = Result<T, TournamentError>;
