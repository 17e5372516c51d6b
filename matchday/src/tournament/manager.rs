//! Tournament manager: authorization, storage and stats around the lifecycle.
//!
//! Every mutation follows the same sequence: authorize the actor, load the
//! tournament, apply one [`TournamentLifecycle`] operation, then save it
//! back. The save is versioned, so two writers racing on the same tournament
//! cannot both win; the loser gets `TournamentError::Conflict` and should
//! retry with fresh data.

use log::{info, warn};
use rand::Rng;
use std::{collections::HashMap, sync::Arc};

use super::{
    errors::{TournamentError, TournamentResult},
    lifecycle::TournamentLifecycle,
    models::{
        MatchResult, Stage, StandingsRow, TeamCategory, Tournament, TournamentConfig,
        TournamentId, TournamentState,
    },
    playoff::PlayoffEngine,
};
use crate::{
    access::{AccessControl, Action, ActorId},
    db::{ParticipantRepository, TeamCategoryRepository, TournamentRepository},
    participant::{LeaderboardEntry, Participant, ParticipantStatsAggregator},
};

/// Career saves attempted before a conflict is handed to the caller
const CAREER_SAVE_ATTEMPTS: usize = 5;

/// Tournament manager
#[derive(Clone)]
pub struct TournamentManager {
    tournaments: Arc<dyn TournamentRepository>,
    participants: Arc<dyn ParticipantRepository>,
    categories: Arc<dyn TeamCategoryRepository>,
    access: Arc<dyn AccessControl>,
    aggregator: ParticipantStatsAggregator,
}

impl TournamentManager {
    /// Create a new tournament manager
    pub fn new(
        tournaments: Arc<dyn TournamentRepository>,
        participants: Arc<dyn ParticipantRepository>,
        categories: Arc<dyn TeamCategoryRepository>,
        access: Arc<dyn AccessControl>,
        aggregator: ParticipantStatsAggregator,
    ) -> Self {
        Self {
            tournaments,
            participants,
            categories,
            access,
            aggregator,
        }
    }

    /// Create a manager backed by one store for all three repositories
    pub fn with_store<S>(
        store: Arc<S>,
        access: Arc<dyn AccessControl>,
        aggregator: ParticipantStatsAggregator,
    ) -> Self
    where
        S: TournamentRepository + ParticipantRepository + TeamCategoryRepository + 'static,
    {
        Self::new(store.clone(), store.clone(), store, access, aggregator)
    }

    async fn save(&self, tournament: &mut Tournament) -> TournamentResult<()> {
        match self.tournaments.save_tournament(tournament).await {
            Ok(version) => {
                tournament.version = version;
                Ok(())
            }
            Err(e) => {
                if e.is_retryable() {
                    warn!("Concurrent update of tournament {}: {}", tournament.id, e);
                }
                Err(e)
            }
        }
    }

    /// Authorize, load, apply `op`, save.
    async fn mutate<T, F>(
        &self,
        actor: ActorId,
        action: Action,
        id: TournamentId,
        op: F,
    ) -> TournamentResult<(Tournament, T)>
    where
        F: FnOnce(&mut Tournament) -> TournamentResult<T> + Send,
        T: Send,
    {
        self.access.authorize(actor, action).await?;
        self.update(id, op).await
    }

    /// Load, apply `op`, save. Callers authorize first.
    async fn update<T, F>(&self, id: TournamentId, op: F) -> TournamentResult<(Tournament, T)>
    where
        F: FnOnce(&mut Tournament) -> TournamentResult<T> + Send,
        T: Send,
    {
        let mut tournament = self.tournaments.load_tournament(id).await?;
        let value = op(&mut tournament)?;
        self.save(&mut tournament).await?;
        Ok((tournament, value))
    }

    async fn category_of(&self, tournament: &Tournament) -> TournamentResult<TeamCategory> {
        let name = tournament.team_category.as_deref().ok_or_else(|| {
            TournamentError::Validation(format!(
                "tournament {} has no team category",
                tournament.id
            ))
        })?;
        self.categories.load_category(name).await
    }

    async fn load_careers(
        &self,
        tournament: &Tournament,
    ) -> TournamentResult<HashMap<String, Participant>> {
        self.participants
            .load_participants(&tournament.participants)
            .await
            .map_err(|e| match e {
                TournamentError::ParticipantNotFound(participant) => {
                    TournamentError::UnknownParticipant {
                        tournament_id: tournament.id,
                        participant,
                    }
                }
                other => other,
            })
    }

    /// Load the careers of `tournament`'s participants, apply `fold` and
    /// save the ones that changed. A concurrent career save is retried with
    /// fresh data.
    async fn update_careers<F>(&self, tournament: &Tournament, fold: F) -> TournamentResult<()>
    where
        F: Fn(HashMap<String, Participant>) -> TournamentResult<HashMap<String, Participant>>
            + Send
            + Sync,
    {
        let mut attempt = 1;
        loop {
            let careers = self.load_careers(tournament).await?;
            let changed: Vec<Participant> = fold(careers.clone())?
                .into_values()
                .filter(|p| careers.get(&p.name) != Some(p))
                .collect();
            if changed.is_empty() {
                return Ok(());
            }

            match self.participants.save_participants(&changed).await {
                Err(e) if e.is_retryable() && attempt < CAREER_SAVE_ATTEMPTS => {
                    warn!(
                        "Career update for tournament {} raced (attempt {}): {}",
                        tournament.id, attempt, e
                    );
                    attempt += 1;
                }
                result => return result,
            }
        }
    }

    /// Fold a freshly completed tournament into participant careers
    async fn apply_stats(&self, tournament: &Tournament) -> TournamentResult<()> {
        self.update_careers(tournament, |careers| self.aggregator.apply(tournament, careers))
            .await
    }

    // Registry

    /// Register a new participant
    pub async fn create_participant(&self, actor: ActorId, name: &str) -> TournamentResult<Participant> {
        self.access.authorize(actor, Action::ManageParticipants).await?;
        if name.trim().is_empty() {
            return Err(TournamentError::Validation(
                "participant name is empty".to_string(),
            ));
        }
        let participant = self.participants.create_participant(name).await?;
        info!("Participant {} registered", name);
        Ok(participant)
    }

    /// Create or replace a team category
    pub async fn create_category(
        &self,
        actor: ActorId,
        name: &str,
        teams: Vec<String>,
    ) -> TournamentResult<TeamCategory> {
        self.access.authorize(actor, Action::ManageCategories).await?;
        let category = TeamCategory::new(name, teams)?;
        self.categories.save_category(&category).await?;
        info!("Team category {} saved with {} teams", name, category.teams.len());
        Ok(category)
    }

    // Setup

    /// Create a tournament in setup
    pub async fn create_tournament(
        &self,
        actor: ActorId,
        config: TournamentConfig,
    ) -> TournamentResult<Tournament> {
        self.access.authorize(actor, Action::CreateTournament).await?;
        config.validate()?;
        let tournament = self.tournaments.create_tournament(&config).await?;
        info!("Tournament {} created: {}", tournament.id, tournament.name);
        Ok(tournament)
    }

    /// Register an existing participant for a tournament in setup
    pub async fn add_participant(
        &self,
        actor: ActorId,
        id: TournamentId,
        name: &str,
    ) -> TournamentResult<Tournament> {
        self.access.authorize(actor, Action::SetupTournament).await?;
        self.participants.load_participant(name).await?;
        let (tournament, ()) = self
            .update(id, |t| TournamentLifecycle::add_participant(t, name))
            .await?;
        Ok(tournament)
    }

    pub async fn remove_participant(
        &self,
        actor: ActorId,
        id: TournamentId,
        name: &str,
    ) -> TournamentResult<Tournament> {
        let (tournament, ()) = self
            .mutate(actor, Action::SetupTournament, id, |t| {
                TournamentLifecycle::remove_participant(t, name)
            })
            .await?;
        Ok(tournament)
    }

    pub async fn set_team_category(
        &self,
        actor: ActorId,
        id: TournamentId,
        category: &str,
    ) -> TournamentResult<Tournament> {
        self.access.authorize(actor, Action::SetupTournament).await?;
        let category = self.categories.load_category(category).await?;
        let (tournament, ()) = self
            .update(id, |t| TournamentLifecycle::set_team_category(t, &category))
            .await?;
        Ok(tournament)
    }

    /// Hand `team` to `participant`
    pub async fn assign_team(
        &self,
        actor: ActorId,
        id: TournamentId,
        participant: &str,
        team: &str,
    ) -> TournamentResult<Tournament> {
        self.access.authorize(actor, Action::SetupTournament).await?;
        let mut tournament = self.tournaments.load_tournament(id).await?;
        let category = self.category_of(&tournament).await?;
        TournamentLifecycle::assign_team(&mut tournament, &category, participant, team)?;
        self.save(&mut tournament).await?;
        Ok(tournament)
    }

    /// Randomly assign teams from the tournament's category
    pub async fn draw_teams<R: Rng + Send + ?Sized>(
        &self,
        actor: ActorId,
        id: TournamentId,
        rng: &mut R,
    ) -> TournamentResult<Vec<(String, String)>> {
        self.access.authorize(actor, Action::SetupTournament).await?;
        let mut tournament = self.tournaments.load_tournament(id).await?;
        let category = self.category_of(&tournament).await?;
        let draw = TournamentLifecycle::draw_teams(&mut tournament, &category, rng)?;
        self.save(&mut tournament).await?;
        Ok(draw)
    }

    /// Close setup and open the group stage
    pub async fn complete_setup(&self, actor: ActorId, id: TournamentId) -> TournamentResult<Tournament> {
        let (tournament, ()) = self
            .mutate(actor, Action::SetupTournament, id, TournamentLifecycle::complete_setup)
            .await?;
        Ok(tournament)
    }

    // Matches

    /// Record a group match.
    ///
    /// The last group match seeds the playoff, or completes the tournament
    /// when it has none.
    pub async fn submit_group_match(
        &self,
        actor: ActorId,
        id: TournamentId,
        result: MatchResult,
    ) -> TournamentResult<Tournament> {
        let (tournament, completed) = self
            .mutate(actor, Action::SubmitMatch, id, |t| {
                TournamentLifecycle::submit_group_match(t, &result)?;
                if !TournamentLifecycle::group_stage_complete(t) {
                    return Ok(false);
                }
                if t.playoff_size.is_some() {
                    TournamentLifecycle::start_playoff(t)?;
                    Ok(false)
                } else {
                    TournamentLifecycle::complete(t)?;
                    Ok(true)
                }
            })
            .await?;

        if completed {
            self.apply_stats(&tournament).await?;
        }
        Ok(tournament)
    }

    /// Record a playoff match in `stage`.
    ///
    /// The bracket advances as soon as the stage is decided, and the
    /// tournament completes when the final is in.
    pub async fn submit_playoff_match(
        &self,
        actor: ActorId,
        id: TournamentId,
        stage: Stage,
        result: MatchResult,
    ) -> TournamentResult<Tournament> {
        let (tournament, completed) = self
            .mutate(actor, Action::SubmitMatch, id, |t| {
                TournamentLifecycle::record_playoff_result(t, stage, &result)?;
                Self::advance_if_decided(t)
            })
            .await?;

        if completed {
            self.apply_stats(&tournament).await?;
        }
        Ok(tournament)
    }

    /// Advance the bracket from `from` by hand
    pub async fn advance_playoff(
        &self,
        actor: ActorId,
        id: TournamentId,
        from: Stage,
    ) -> TournamentResult<Tournament> {
        let (tournament, completed) = self
            .mutate(actor, Action::AdvancePlayoff, id, |t| {
                let next = TournamentLifecycle::advance_playoff(t, from)?;
                if next == Stage::Completed {
                    TournamentLifecycle::complete(t)?;
                    return Ok(true);
                }
                Ok(false)
            })
            .await?;

        if completed {
            self.apply_stats(&tournament).await?;
        }
        Ok(tournament)
    }

    /// Seed the bracket from the group table by hand, e.g. after
    /// `reset_playoff` on a finished group stage
    pub async fn start_playoff(&self, actor: ActorId, id: TournamentId) -> TournamentResult<Tournament> {
        let (tournament, _) = self
            .mutate(actor, Action::AdvancePlayoff, id, TournamentLifecycle::start_playoff)
            .await?;
        Ok(tournament)
    }

    fn advance_if_decided(tournament: &mut Tournament) -> TournamentResult<bool> {
        if !PlayoffEngine::stage_decided(&tournament.playoff) {
            return Ok(false);
        }
        let current = tournament.playoff.current_stage;
        if TournamentLifecycle::advance_playoff(tournament, current)? == Stage::Completed {
            TournamentLifecycle::complete(tournament)?;
            return Ok(true);
        }
        Ok(false)
    }

    /// Uncount group match `index` so it can be resubmitted
    pub async fn reset_group_match(
        &self,
        actor: ActorId,
        id: TournamentId,
        index: usize,
    ) -> TournamentResult<Tournament> {
        let (tournament, ()) = self
            .mutate(actor, Action::ResetMatch, id, |t| {
                TournamentLifecycle::reset_group_match(t, index)
            })
            .await?;
        Ok(tournament)
    }

    /// Delete the most recent group match
    pub async fn remove_last_group_match(
        &self,
        actor: ActorId,
        id: TournamentId,
    ) -> TournamentResult<Tournament> {
        let (tournament, _) = self
            .mutate(
                actor,
                Action::ResetMatch,
                id,
                TournamentLifecycle::remove_last_group_match,
            )
            .await?;
        Ok(tournament)
    }

    /// Clear playoff match `index` of `stage` and everything after it
    pub async fn reset_playoff_from(
        &self,
        actor: ActorId,
        id: TournamentId,
        stage: Stage,
        index: usize,
    ) -> TournamentResult<Tournament> {
        let (tournament, ()) = self
            .mutate(actor, Action::ResetMatch, id, |t| {
                TournamentLifecycle::reset_playoff_from(t, stage, index)
            })
            .await?;
        Ok(tournament)
    }

    /// Drop the bracket and reopen the group stage
    pub async fn reset_playoff(&self, actor: ActorId, id: TournamentId) -> TournamentResult<Tournament> {
        let (tournament, ()) = self
            .mutate(actor, Action::ResetMatch, id, TournamentLifecycle::reset_playoff)
            .await?;
        Ok(tournament)
    }

    // Archival

    /// Show or hide a tournament. Completed tournaments stay inactive.
    pub async fn set_active(
        &self,
        actor: ActorId,
        id: TournamentId,
        active: bool,
    ) -> TournamentResult<Tournament> {
        let (tournament, ()) = self
            .mutate(actor, Action::ArchiveTournament, id, |t| {
                TournamentLifecycle::set_active(t, active)
            })
            .await?;
        Ok(tournament)
    }

    /// Delete a tournament, withdrawing its stats from participant careers
    pub async fn delete_tournament(&self, actor: ActorId, id: TournamentId) -> TournamentResult<()> {
        self.access.authorize(actor, Action::DeleteTournament).await?;
        let tournament = self.tournaments.load_tournament(id).await?;

        if tournament.is_completed {
            self.update_careers(&tournament, |careers| {
                Ok(ParticipantStatsAggregator::revoke(id, careers))
            })
            .await?;
        }

        self.tournaments.delete_tournament(id).await?;
        info!("Tournament {} deleted", id);
        Ok(())
    }

    /// Apply a completed tournament's stats again. Participants that already
    /// carry it are left alone, so this is safe to repeat.
    pub async fn sync_participant_stats(&self, actor: ActorId, id: TournamentId) -> TournamentResult<()> {
        self.access.authorize(actor, Action::SyncStats).await?;
        let tournament = self.tournaments.load_tournament(id).await?;
        self.apply_stats(&tournament).await
    }

    // Queries

    pub async fn tournament(&self, id: TournamentId) -> TournamentResult<Tournament> {
        self.tournaments.load_tournament(id).await
    }

    pub async fn standings(&self, id: TournamentId) -> TournamentResult<Vec<StandingsRow>> {
        Ok(self.tournaments.load_tournament(id).await?.standings)
    }

    pub async fn state(&self, id: TournamentId) -> TournamentResult<TournamentState> {
        Ok(self.tournaments.load_tournament(id).await?.state())
    }

    /// Teams still alive in the bracket
    pub async fn current_stage_teams(&self, id: TournamentId) -> TournamentResult<Vec<String>> {
        let tournament = self.tournaments.load_tournament(id).await?;
        Ok(PlayoffEngine::current_stage_teams(&tournament.playoff))
    }

    pub async fn list_tournaments(&self, active_only: bool) -> TournamentResult<Vec<Tournament>> {
        self.tournaments.list_tournaments(active_only).await
    }

    pub async fn participant(&self, name: &str) -> TournamentResult<Participant> {
        self.participants.load_participant(name).await
    }

    pub async fn categories(&self) -> TournamentResult<Vec<TeamCategory>> {
        self.categories.list_categories().await
    }

    /// All-time participant table
    pub async fn leaderboard(&self) -> TournamentResult<Vec<LeaderboardEntry>> {
        let participants = self.participants.list_participants().await?;
        Ok(ParticipantStatsAggregator::leaderboard(&participants))
    }
}
