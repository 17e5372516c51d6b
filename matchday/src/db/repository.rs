//! Storage traits for tournaments, participants and team categories.
//!
//! The manager only talks to these traits, so the same lifecycle runs against
//! PostgreSQL in production and [`MemoryStore`] in tests. Tournament saves are
//! versioned: a save succeeds only if the stored version still matches the
//! one that was loaded, otherwise it fails with `TournamentError::Conflict`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};
use std::{
    collections::{BTreeMap, HashMap},
    sync::{
        Arc,
        atomic::{AtomicI64, Ordering},
    },
};
use tokio::sync::RwLock;

use crate::participant::{CareerStats, Participant};
use crate::tournament::{
    TeamCategory, Tournament, TournamentConfig, TournamentError, TournamentId, TournamentResult,
};

/// Trait for tournament storage
#[async_trait]
pub trait TournamentRepository: Send + Sync {
    /// Create an empty tournament in setup and assign its id
    async fn create_tournament(&self, config: &TournamentConfig) -> TournamentResult<Tournament>;

    /// Load a tournament, `NotFound` if it does not exist
    async fn load_tournament(&self, id: TournamentId) -> TournamentResult<Tournament>;

    /// Store `tournament` if its version is still current.
    ///
    /// Returns the new version.
    async fn save_tournament(&self, tournament: &Tournament) -> TournamentResult<i64>;

    /// Delete a tournament
    async fn delete_tournament(&self, id: TournamentId) -> TournamentResult<()>;

    /// List tournaments, newest first
    async fn list_tournaments(&self, active_only: bool) -> TournamentResult<Vec<Tournament>>;
}

/// Trait for participant storage
#[async_trait]
pub trait ParticipantRepository: Send + Sync {
    /// Register a new participant with empty stats
    async fn create_participant(&self, name: &str) -> TournamentResult<Participant>;

    /// Load a participant, `ParticipantNotFound` if unknown
    async fn load_participant(&self, name: &str) -> TournamentResult<Participant>;

    /// Save participants in one batch, bumping each version. Nothing is
    /// saved if any of them changed since it was loaded
    /// (`ParticipantConflict`).
    async fn save_participants(&self, participants: &[Participant]) -> TournamentResult<()>;

    /// All participants, ordered by name
    async fn list_participants(&self) -> TournamentResult<Vec<Participant>>;

    /// Load several participants keyed by name
    async fn load_participants(
        &self,
        names: &[String],
    ) -> TournamentResult<HashMap<String, Participant>> {
        let mut loaded = HashMap::with_capacity(names.len());
        for name in names {
            loaded.insert(name.clone(), self.load_participant(name).await?);
        }
        Ok(loaded)
    }
}

/// Trait for team category storage
#[async_trait]
pub trait TeamCategoryRepository: Send + Sync {
    /// Insert or replace a category
    async fn save_category(&self, category: &TeamCategory) -> TournamentResult<()>;

    /// Load a category, `CategoryNotFound` if unknown
    async fn load_category(&self, name: &str) -> TournamentResult<TeamCategory>;

    /// All categories, ordered by name
    async fn list_categories(&self) -> TournamentResult<Vec<TeamCategory>>;
}

/// PostgreSQL implementation of all three repositories.
///
/// Documents are stored as JSONB next to a few indexed columns.
#[derive(Clone)]
pub struct PgStore {
    pool: Arc<PgPool>,
}

impl PgStore {
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }

    fn decode_tournament(row: &sqlx::postgres::PgRow) -> TournamentResult<Tournament> {
        let mut tournament: Tournament = serde_json::from_value(row.get("document"))?;
        tournament.version = row.get("version");
        Ok(tournament)
    }
}

#[async_trait]
impl TournamentRepository for PgStore {
    async fn create_tournament(&self, config: &TournamentConfig) -> TournamentResult<Tournament> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query(
            r#"
            INSERT INTO tournaments (name, is_active, is_completed, document, version)
            VALUES ($1, FALSE, FALSE, '{}'::jsonb, 0)
            RETURNING id, created_at
            "#,
        )
        .bind(&config.name)
        .fetch_one(&mut *tx)
        .await?;

        let id: TournamentId = row.get("id");
        let created_at: DateTime<Utc> = row.get("created_at");
        let tournament = Tournament::new(id, config.clone(), created_at);

        sqlx::query("UPDATE tournaments SET document = $1 WHERE id = $2")
            .bind(serde_json::to_value(&tournament)?)
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(tournament)
    }

    async fn load_tournament(&self, id: TournamentId) -> TournamentResult<Tournament> {
        let row = sqlx::query("SELECT document, version FROM tournaments WHERE id = $1")
            .bind(id)
            .fetch_optional(self.pool.as_ref())
            .await?
            .ok_or(TournamentError::NotFound(id))?;

        Self::decode_tournament(&row)
    }

    async fn save_tournament(&self, tournament: &Tournament) -> TournamentResult<i64> {
        let row = sqlx::query(
            r#"
            UPDATE tournaments
            SET document = $1, name = $2, is_active = $3, is_completed = $4, version = version + 1
            WHERE id = $5 AND version = $6
            RETURNING version
            "#,
        )
        .bind(serde_json::to_value(tournament)?)
        .bind(&tournament.name)
        .bind(tournament.is_active)
        .bind(tournament.is_completed)
        .bind(tournament.id)
        .bind(tournament.version)
        .fetch_optional(self.pool.as_ref())
        .await?;

        if let Some(row) = row {
            return Ok(row.get("version"));
        }

        let exists = sqlx::query("SELECT 1 FROM tournaments WHERE id = $1")
            .bind(tournament.id)
            .fetch_optional(self.pool.as_ref())
            .await?
            .is_some();
        Err(if exists {
            TournamentError::Conflict {
                tournament_id: tournament.id,
                expected_version: tournament.version,
            }
        } else {
            TournamentError::NotFound(tournament.id)
        })
    }

    async fn delete_tournament(&self, id: TournamentId) -> TournamentResult<()> {
        let result = sqlx::query("DELETE FROM tournaments WHERE id = $1")
            .bind(id)
            .execute(self.pool.as_ref())
            .await?;
        if result.rows_affected() == 0 {
            return Err(TournamentError::NotFound(id));
        }
        Ok(())
    }

    async fn list_tournaments(&self, active_only: bool) -> TournamentResult<Vec<Tournament>> {
        let rows = sqlx::query(
            r#"
            SELECT document, version FROM tournaments
            WHERE NOT $1 OR is_active
            ORDER BY created_at DESC, id DESC
            "#,
        )
        .bind(active_only)
        .fetch_all(self.pool.as_ref())
        .await?;

        rows.iter().map(Self::decode_tournament).collect()
    }
}

#[async_trait]
impl ParticipantRepository for PgStore {
    async fn create_participant(&self, name: &str) -> TournamentResult<Participant> {
        let participant = Participant::new(name);
        let inserted = sqlx::query(
            "INSERT INTO participants (name, stats) VALUES ($1, $2) ON CONFLICT (name) DO NOTHING",
        )
        .bind(name)
        .bind(serde_json::to_value(&participant.stats)?)
        .execute(self.pool.as_ref())
        .await?;

        if inserted.rows_affected() == 0 {
            return Err(TournamentError::Validation(format!(
                "participant {name} already exists"
            )));
        }
        Ok(participant)
    }

    async fn load_participant(&self, name: &str) -> TournamentResult<Participant> {
        let row = sqlx::query("SELECT name, stats, version FROM participants WHERE name = $1")
            .bind(name)
            .fetch_optional(self.pool.as_ref())
            .await?
            .ok_or_else(|| TournamentError::ParticipantNotFound(name.to_string()))?;

        Ok(Participant {
            name: row.get("name"),
            stats: serde_json::from_value::<CareerStats>(row.get("stats"))?,
            version: row.get("version"),
        })
    }

    async fn save_participants(&self, participants: &[Participant]) -> TournamentResult<()> {
        // Dropping the transaction on an early return rolls the batch back.
        let mut tx = self.pool.begin().await?;
        for participant in participants {
            let updated = sqlx::query(
                r#"
                UPDATE participants SET stats = $2, version = version + 1
                WHERE name = $1 AND version = $3
                "#,
            )
            .bind(&participant.name)
            .bind(serde_json::to_value(&participant.stats)?)
            .bind(participant.version)
            .execute(&mut *tx)
            .await?;

            if updated.rows_affected() == 0 {
                let exists = sqlx::query("SELECT 1 FROM participants WHERE name = $1")
                    .bind(&participant.name)
                    .fetch_optional(&mut *tx)
                    .await?
                    .is_some();
                return Err(if exists {
                    TournamentError::ParticipantConflict {
                        participant: participant.name.clone(),
                        expected_version: participant.version,
                    }
                } else {
                    TournamentError::ParticipantNotFound(participant.name.clone())
                });
            }
        }
        tx.commit().await?;
        Ok(())
    }

    async fn list_participants(&self) -> TournamentResult<Vec<Participant>> {
        let rows = sqlx::query("SELECT name, stats, version FROM participants ORDER BY name")
            .fetch_all(self.pool.as_ref())
            .await?;

        rows.iter()
            .map(|r| -> TournamentResult<Participant> {
                Ok(Participant {
                    name: r.get("name"),
                    stats: serde_json::from_value(r.get("stats"))?,
                    version: r.get("version"),
                })
            })
            .collect()
    }
}

#[async_trait]
impl TeamCategoryRepository for PgStore {
    async fn save_category(&self, category: &TeamCategory) -> TournamentResult<()> {
        sqlx::query(
            r#"
            INSERT INTO team_categories (name, teams) VALUES ($1, $2)
            ON CONFLICT (name) DO UPDATE SET teams = EXCLUDED.teams
            "#,
        )
        .bind(&category.name)
        .bind(serde_json::to_value(&category.teams)?)
        .execute(self.pool.as_ref())
        .await?;
        Ok(())
    }

    async fn load_category(&self, name: &str) -> TournamentResult<TeamCategory> {
        let row = sqlx::query("SELECT name, teams FROM team_categories WHERE name = $1")
            .bind(name)
            .fetch_optional(self.pool.as_ref())
            .await?
            .ok_or_else(|| TournamentError::CategoryNotFound(name.to_string()))?;

        Ok(TeamCategory {
            name: row.get("name"),
            teams: serde_json::from_value(row.get("teams"))?,
        })
    }

    async fn list_categories(&self) -> TournamentResult<Vec<TeamCategory>> {
        let rows = sqlx::query("SELECT name, teams FROM team_categories ORDER BY name")
            .fetch_all(self.pool.as_ref())
            .await?;

        rows.iter()
            .map(|r| -> TournamentResult<TeamCategory> {
                Ok(TeamCategory {
                    name: r.get("name"),
                    teams: serde_json::from_value(r.get("teams"))?,
                })
            })
            .collect()
    }
}

/// In-memory implementation of all three repositories
#[derive(Default)]
pub struct MemoryStore {
    /// Last id handed out; ids are never reused, even after a delete
    last_id: AtomicI64,
    tournaments: RwLock<BTreeMap<TournamentId, Tournament>>,
    participants: RwLock<BTreeMap<String, Participant>>,
    categories: RwLock<BTreeMap<String, TeamCategory>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TournamentRepository for MemoryStore {
    async fn create_tournament(&self, config: &TournamentConfig) -> TournamentResult<Tournament> {
        let mut tournaments = self.tournaments.write().await;
        let id = self.last_id.fetch_add(1, Ordering::SeqCst) + 1;
        let tournament = Tournament::new(id, config.clone(), Utc::now());
        tournaments.insert(id, tournament.clone());
        Ok(tournament)
    }

    async fn load_tournament(&self, id: TournamentId) -> TournamentResult<Tournament> {
        self.tournaments
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or(TournamentError::NotFound(id))
    }

    async fn save_tournament(&self, tournament: &Tournament) -> TournamentResult<i64> {
        let mut tournaments = self.tournaments.write().await;
        let stored = tournaments
            .get_mut(&tournament.id)
            .ok_or(TournamentError::NotFound(tournament.id))?;

        if stored.version != tournament.version {
            return Err(TournamentError::Conflict {
                tournament_id: tournament.id,
                expected_version: tournament.version,
            });
        }

        *stored = tournament.clone();
        stored.version += 1;
        Ok(stored.version)
    }

    async fn delete_tournament(&self, id: TournamentId) -> TournamentResult<()> {
        self.tournaments
            .write()
            .await
            .remove(&id)
            .map(|_| ())
            .ok_or(TournamentError::NotFound(id))
    }

    async fn list_tournaments(&self, active_only: bool) -> TournamentResult<Vec<Tournament>> {
        Ok(self
            .tournaments
            .read()
            .await
            .values()
            .rev()
            .filter(|t| !active_only || t.is_active)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl ParticipantRepository for MemoryStore {
    async fn create_participant(&self, name: &str) -> TournamentResult<Participant> {
        let mut participants = self.participants.write().await;
        if participants.contains_key(name) {
            return Err(TournamentError::Validation(format!(
                "participant {name} already exists"
            )));
        }
        let participant = Participant::new(name);
        participants.insert(name.to_string(), participant.clone());
        Ok(participant)
    }

    async fn load_participant(&self, name: &str) -> TournamentResult<Participant> {
        self.participants
            .read()
            .await
            .get(name)
            .cloned()
            .ok_or_else(|| TournamentError::ParticipantNotFound(name.to_string()))
    }

    async fn save_participants(&self, participants: &[Participant]) -> TournamentResult<()> {
        let mut stored = self.participants.write().await;
        for participant in participants {
            let current = stored
                .get(&participant.name)
                .ok_or_else(|| TournamentError::ParticipantNotFound(participant.name.clone()))?;
            if current.version != participant.version {
                return Err(TournamentError::ParticipantConflict {
                    participant: participant.name.clone(),
                    expected_version: participant.version,
                });
            }
        }
        for participant in participants {
            let mut saved = participant.clone();
            saved.version += 1;
            stored.insert(saved.name.clone(), saved);
        }
        Ok(())
    }

    async fn list_participants(&self) -> TournamentResult<Vec<Participant>> {
        Ok(self.participants.read().await.values().cloned().collect())
    }
}

#[async_trait]
impl TeamCategoryRepository for MemoryStore {
    async fn save_category(&self, category: &TeamCategory) -> TournamentResult<()> {
        self.categories
            .write()
            .await
            .insert(category.name.clone(), category.clone());
        Ok(())
    }

    async fn load_category(&self, name: &str) -> TournamentResult<TeamCategory> {
        self.categories
            .read()
            .await
            .get(name)
            .cloned()
            .ok_or_else(|| TournamentError::CategoryNotFound(name.to_string()))
    }

    async fn list_categories(&self) -> TournamentResult<Vec<TeamCategory>> {
        Ok(self.categories.read().await.values().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_store_assigns_sequential_ids() {
        let store = MemoryStore::new();
        let first = store
            .create_tournament(&TournamentConfig::standard("One"))
            .await
            .unwrap();
        let second = store
            .create_tournament(&TournamentConfig::standard("Two"))
            .await
            .unwrap();
        assert_eq!((first.id, second.id), (1, 2));

        let listed = store.list_tournaments(false).await.unwrap();
        let ids: Vec<TournamentId> = listed.iter().map(|t| t.id).collect();
        assert_eq!(ids, vec![2, 1]);
        assert!(store.list_tournaments(true).await.unwrap().is_empty());

        store.delete_tournament(second.id).await.unwrap();
        let third = store
            .create_tournament(&TournamentConfig::standard("Three"))
            .await
            .unwrap();
        assert_eq!(third.id, 3);
    }

    #[tokio::test]
    async fn test_stale_save_is_a_conflict() {
        let store = MemoryStore::new();
        let created = store
            .create_tournament(&TournamentConfig::standard("Race"))
            .await
            .unwrap();

        let mut first = store.load_tournament(created.id).await.unwrap();
        let mut second = store.load_tournament(created.id).await.unwrap();

        first.name = "First writer".to_string();
        assert_eq!(store.save_tournament(&first).await.unwrap(), 1);

        second.name = "Second writer".to_string();
        let err = store.save_tournament(&second).await.unwrap_err();
        assert!(matches!(
            err,
            TournamentError::Conflict {
                expected_version: 0,
                ..
            }
        ));
        assert!(err.is_retryable());

        let stored = store.load_tournament(created.id).await.unwrap();
        assert_eq!(stored.name, "First writer");
        assert_eq!(stored.version, 1);
    }

    #[tokio::test]
    async fn test_missing_records() {
        let store = MemoryStore::new();
        assert!(matches!(
            store.load_tournament(9).await,
            Err(TournamentError::NotFound(9))
        ));
        assert!(matches!(
            store.delete_tournament(9).await,
            Err(TournamentError::NotFound(9))
        ));
        assert!(matches!(
            store.load_participant("ghost").await,
            Err(TournamentError::ParticipantNotFound(_))
        ));
        assert!(matches!(
            store.load_category("Nations").await,
            Err(TournamentError::CategoryNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_stale_career_save_changes_nothing() {
        let store = MemoryStore::new();
        store.create_participant("ann").await.unwrap();
        store.create_participant("bob").await.unwrap();

        let first = store
            .load_participants(&["ann".to_string(), "bob".to_string()])
            .await
            .unwrap();
        let second = first.clone();

        let mut ann = first["ann"].clone();
        ann.stats.total_points = 8;
        store.save_participants(&[ann]).await.unwrap();

        let mut stale_bob = second["bob"].clone();
        stale_bob.stats.total_points = 4;
        let mut stale_ann = second["ann"].clone();
        stale_ann.stats.total_points = 2;
        let err = store
            .save_participants(&[stale_bob, stale_ann])
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            TournamentError::ParticipantConflict { ref participant, expected_version: 0 } if participant == "ann"
        ));
        assert!(err.is_retryable());

        // The batch is all or nothing.
        assert_eq!(store.load_participant("ann").await.unwrap().stats.total_points, 8);
        assert_eq!(store.load_participant("bob").await.unwrap().version, 0);
        assert!(matches!(
            store.save_participants(&[Participant::new("ghost")]).await,
            Err(TournamentError::ParticipantNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_participants_are_unique() {
        let store = MemoryStore::new();
        store.create_participant("ann").await.unwrap();
        assert!(store.create_participant("ann").await.is_err());

        let mut ann = store.load_participant("ann").await.unwrap();
        ann.stats.total_points = 10;
        store.save_participants(&[ann.clone()]).await.unwrap();

        let loaded = store
            .load_participants(&["ann".to_string()])
            .await
            .unwrap();
        assert_eq!(loaded["ann"].stats, ann.stats);
        assert_eq!(loaded["ann"].version, 1);
        assert!(
            store
                .load_participants(&["ann".to_string(), "bob".to_string()])
                .await
                .is_err()
        );
    }
}
