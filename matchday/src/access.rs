//! Access control for mutating tournament operations.
//!
//! Only admins may change tournaments. The manager asks an [`AccessControl`]
//! implementation before every mutation and treats a refusal as final.

use async_trait::async_trait;
use log::warn;
use serde::{Deserialize, Serialize};
use sqlx::{PgPool, Row};
use std::{collections::HashSet, fmt, sync::Arc};
use tokio::sync::RwLock;

use crate::tournament::{TournamentError, TournamentResult};

/// Identity of whoever issues a command
pub type ActorId = i64;

/// Mutating operations subject to authorization
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    ManageParticipants,
    ManageCategories,
    CreateTournament,
    SetupTournament,
    SubmitMatch,
    ResetMatch,
    AdvancePlayoff,
    ArchiveTournament,
    DeleteTournament,
    SyncStats,
    ManageAdmins,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Action::ManageParticipants => "manage participants",
            Action::ManageCategories => "manage team categories",
            Action::CreateTournament => "create a tournament",
            Action::SetupTournament => "set up a tournament",
            Action::SubmitMatch => "submit a match",
            Action::ResetMatch => "reset a match",
            Action::AdvancePlayoff => "advance the playoff",
            Action::ArchiveTournament => "archive a tournament",
            Action::DeleteTournament => "delete a tournament",
            Action::SyncStats => "sync participant stats",
            Action::ManageAdmins => "manage admins",
        };
        f.write_str(text)
    }
}

/// Decides whether an actor may perform an action
#[async_trait]
pub trait AccessControl: Send + Sync {
    /// `Ok(())` when allowed, `TournamentError::Denied` otherwise
    async fn authorize(&self, actor: ActorId, action: Action) -> TournamentResult<()>;
}

fn denied(actor: ActorId, action: Action) -> TournamentError {
    warn!("Actor {} denied: {}", actor, action);
    TournamentError::Denied { actor, action }
}

/// In-memory set of admin ids
#[derive(Debug, Default)]
pub struct AdminRegistry {
    admins: RwLock<HashSet<ActorId>>,
}

impl AdminRegistry {
    pub fn new(admins: impl IntoIterator<Item = ActorId>) -> Self {
        Self {
            admins: RwLock::new(admins.into_iter().collect()),
        }
    }

    pub async fn add_admin(&self, actor: ActorId) {
        self.admins.write().await.insert(actor);
    }

    pub async fn remove_admin(&self, actor: ActorId) -> bool {
        self.admins.write().await.remove(&actor)
    }

    pub async fn is_admin(&self, actor: ActorId) -> bool {
        self.admins.read().await.contains(&actor)
    }
}

#[async_trait]
impl AccessControl for AdminRegistry {
    async fn authorize(&self, actor: ActorId, action: Action) -> TournamentResult<()> {
        if self.is_admin(actor).await {
            Ok(())
        } else {
            Err(denied(actor, action))
        }
    }
}

/// Admin ids stored in the `admins` table
#[derive(Clone)]
pub struct PgAdminRegistry {
    pool: Arc<PgPool>,
}

impl PgAdminRegistry {
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }

    pub async fn add_admin(&self, actor: ActorId) -> TournamentResult<()> {
        sqlx::query("INSERT INTO admins (user_id) VALUES ($1) ON CONFLICT (user_id) DO NOTHING")
            .bind(actor)
            .execute(self.pool.as_ref())
            .await?;
        Ok(())
    }

    pub async fn is_admin(&self, actor: ActorId) -> TournamentResult<bool> {
        let row = sqlx::query("SELECT EXISTS(SELECT 1 FROM admins WHERE user_id = $1) AS is_admin")
            .bind(actor)
            .fetch_one(self.pool.as_ref())
            .await?;
        Ok(row.get("is_admin"))
    }
}

#[async_trait]
impl AccessControl for PgAdminRegistry {
    async fn authorize(&self, actor: ActorId, action: Action) -> TournamentResult<()> {
        if self.is_admin(actor).await? {
            Ok(())
        } else {
            Err(denied(actor, action))
        }
    }
}
