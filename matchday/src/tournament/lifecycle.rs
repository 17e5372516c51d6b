//! Tournament lifecycle: setup -> active -> playoff -> completed.
//!
//! Every operation here is synchronous and works on a tournament the caller
//! has already loaded; persisting the result is the caller's job. Operations
//! check the derived [`TournamentState`] first and fail with
//! `InvalidTransition` when called out of order.

use log::{debug, info};
use rand::{Rng, seq::SliceRandom};

use super::{
    errors::{TournamentError, TournamentResult},
    models::{Match, MatchResult, SUPPORTED_BRACKET_SIZES, Stage, TeamCategory, Tournament, TournamentState},
    playoff::PlayoffEngine,
    standings::StandingsEngine,
};

/// Validated state changes on a [`Tournament`]
pub struct TournamentLifecycle;

impl TournamentLifecycle {
    fn require(
        tournament: &Tournament,
        expected: TournamentState,
        action: &'static str,
    ) -> TournamentResult<()> {
        let state = tournament.state();
        if state != expected {
            return Err(TournamentError::InvalidTransition {
                tournament_id: tournament.id,
                state,
                action,
            });
        }
        Ok(())
    }

    /// Register a participant during setup
    pub fn add_participant(tournament: &mut Tournament, name: &str) -> TournamentResult<()> {
        Self::require(tournament, TournamentState::Setup, "add a participant")?;

        if tournament.has_participant(name) {
            return Err(TournamentError::Validation(format!(
                "{name} is already registered"
            )));
        }
        if tournament.participants.len() >= tournament.max_participants {
            return Err(TournamentError::Validation(format!(
                "tournament is full ({} participants max)",
                tournament.max_participants
            )));
        }

        tournament.participants.push(name.to_string());
        Ok(())
    }

    /// Unregister a participant during setup, dropping their team assignment
    pub fn remove_participant(tournament: &mut Tournament, name: &str) -> TournamentResult<()> {
        Self::require(tournament, TournamentState::Setup, "remove a participant")?;

        if !tournament.has_participant(name) {
            return Err(TournamentError::UnknownParticipant {
                tournament_id: tournament.id,
                participant: name.to_string(),
            });
        }

        tournament.participants.retain(|p| p != name);
        tournament.participant_teams.remove(name);
        Ok(())
    }

    /// Choose the team category. Switching categories clears assignments.
    pub fn set_team_category(
        tournament: &mut Tournament,
        category: &TeamCategory,
    ) -> TournamentResult<()> {
        Self::require(tournament, TournamentState::Setup, "change the team category")?;

        if tournament.team_category.as_deref() != Some(category.name.as_str()) {
            tournament.participant_teams.clear();
            tournament.team_category = Some(category.name.clone());
        }
        Ok(())
    }

    /// Assign `team` from the tournament's category to `participant`
    pub fn assign_team(
        tournament: &mut Tournament,
        category: &TeamCategory,
        participant: &str,
        team: &str,
    ) -> TournamentResult<()> {
        Self::require(tournament, TournamentState::Setup, "assign a team")?;
        Self::check_category(tournament, category)?;

        if !tournament.has_participant(participant) {
            return Err(TournamentError::UnknownParticipant {
                tournament_id: tournament.id,
                participant: participant.to_string(),
            });
        }
        if !category.contains(team) {
            return Err(TournamentError::Validation(format!(
                "{team} is not in category {}",
                category.name
            )));
        }
        if let Some(owner) = tournament.participant_of(team) {
            if owner != participant {
                return Err(TournamentError::Validation(format!(
                    "{team} is already taken by {owner}"
                )));
            }
        }

        tournament
            .participant_teams
            .insert(participant.to_string(), team.to_string());
        Ok(())
    }

    /// Randomly hand every participant a distinct team from `category`.
    ///
    /// Returns the `(participant, team)` pairs in registration order.
    pub fn draw_teams<R: Rng + ?Sized>(
        tournament: &mut Tournament,
        category: &TeamCategory,
        rng: &mut R,
    ) -> TournamentResult<Vec<(String, String)>> {
        Self::require(tournament, TournamentState::Setup, "draw teams")?;
        Self::check_category(tournament, category)?;

        if category.teams.len() < tournament.participants.len() {
            return Err(TournamentError::Validation(format!(
                "category {} has {} teams for {} participants",
                category.name,
                category.teams.len(),
                tournament.participants.len()
            )));
        }

        let mut teams = category.teams.clone();
        teams.shuffle(rng);

        let draw: Vec<(String, String)> = tournament
            .participants
            .iter()
            .cloned()
            .zip(teams)
            .collect();
        tournament.participant_teams = draw.iter().cloned().collect();

        info!(
            "Drew {} teams from {} for tournament {}",
            draw.len(),
            category.name,
            tournament.id
        );
        Ok(draw)
    }

    fn check_category(tournament: &Tournament, category: &TeamCategory) -> TournamentResult<()> {
        if tournament.team_category.as_deref() != Some(category.name.as_str()) {
            return Err(TournamentError::Validation(format!(
                "tournament {} does not use category {}",
                tournament.id, category.name
            )));
        }
        Ok(())
    }

    /// Close setup and open the group stage.
    ///
    /// Requires the participant count within bounds, a team category, a team
    /// for every participant, and a playoff size that fits the field.
    pub fn complete_setup(tournament: &mut Tournament) -> TournamentResult<()> {
        Self::require(tournament, TournamentState::Setup, "complete setup")?;

        let count = tournament.participants.len();
        if count < tournament.min_participants || count > tournament.max_participants {
            return Err(TournamentError::Validation(format!(
                "need between {} and {} participants, have {}",
                tournament.min_participants, tournament.max_participants, count
            )));
        }
        if tournament.team_category.is_none() {
            return Err(TournamentError::Validation(
                "team category is not set".to_string(),
            ));
        }
        if let Some(missing) = tournament
            .participants
            .iter()
            .find(|p| !tournament.participant_teams.contains_key(*p))
        {
            return Err(TournamentError::UnknownParticipant {
                tournament_id: tournament.id,
                participant: missing.clone(),
            });
        }
        if let Some(size) = tournament.playoff_size {
            if !SUPPORTED_BRACKET_SIZES.contains(&size) || size > count {
                return Err(TournamentError::InvalidBracketSize { size, teams: count });
            }
        }

        tournament.standings = StandingsEngine::compute(&[], &tournament.teams())?;
        tournament.setup_completed = true;
        tournament.is_active = true;

        info!(
            "Tournament {} setup completed with {} participants",
            tournament.id, count
        );
        Ok(())
    }

    /// Record a group match and recompute the table. Returns the match index.
    ///
    /// Each pair of teams meets once. A pairing that already counts is
    /// locked; one that was reset is overwritten in place.
    pub fn submit_group_match(
        tournament: &mut Tournament,
        result: &MatchResult,
    ) -> TournamentResult<usize> {
        Self::require(tournament, TournamentState::Active, "submit a group match")?;

        let existing = tournament
            .matches
            .iter()
            .position(|m| m.is_pairing(&result.team1, &result.team2));

        let candidate = match existing {
            Some(index) => {
                let slot = &tournament.matches[index];
                if slot.counted {
                    return Err(TournamentError::LockedMatch {
                        tournament_id: tournament.id,
                        stage: Stage::None,
                        index,
                    });
                }
                Match::from_result(&result.oriented_to(&slot.team1))
            }
            None => Match::from_result(result),
        };

        let index = existing.unwrap_or(tournament.matches.len());
        let mut matches = tournament.matches.clone();
        if index == matches.len() {
            matches.push(candidate);
        } else {
            matches[index] = candidate;
        }

        // Validate against the full set before touching the tournament.
        let standings = StandingsEngine::compute(&matches, &tournament.teams())?;
        tournament.matches = matches;
        tournament.standings = standings;

        debug!(
            "Tournament {} group match #{} recorded: {} {}-{} {}",
            tournament.id, index, result.team1, result.score1, result.score2, result.team2
        );
        Ok(index)
    }

    fn require_group_editable(tournament: &Tournament, index: usize) -> TournamentResult<()> {
        match tournament.state() {
            TournamentState::Active => Ok(()),
            TournamentState::Playoff => Err(TournamentError::LockedMatch {
                tournament_id: tournament.id,
                stage: Stage::None,
                index,
            }),
            state => Err(TournamentError::InvalidTransition {
                tournament_id: tournament.id,
                state,
                action: "change a group match",
            }),
        }
    }

    /// Uncount group match `index` so it can be submitted again.
    ///
    /// Once the playoff is seeded the group table is locked; reset the
    /// playoff first.
    pub fn reset_group_match(tournament: &mut Tournament, index: usize) -> TournamentResult<()> {
        Self::require_group_editable(tournament, index)?;

        let slot = tournament.matches.get_mut(index).ok_or_else(|| {
            TournamentError::Validation(format!("no group match #{index}"))
        })?;
        slot.clear_result();
        tournament.standings = StandingsEngine::compute(&tournament.matches, &tournament.teams())?;

        info!("Tournament {} group match #{} reset", tournament.id, index);
        Ok(())
    }

    /// Delete the most recently added group match.
    pub fn remove_last_group_match(tournament: &mut Tournament) -> TournamentResult<Match> {
        let last = tournament.matches.len().checked_sub(1).ok_or_else(|| {
            TournamentError::Validation("no group matches to remove".to_string())
        })?;
        Self::require_group_editable(tournament, last)?;

        let removed = tournament.matches.remove(last);
        tournament.standings = StandingsEngine::compute(&tournament.matches, &tournament.teams())?;

        info!(
            "Tournament {} removed group match {} vs {}",
            tournament.id, removed.team1, removed.team2
        );
        Ok(removed)
    }

    /// Every pair of teams has a counted result.
    pub fn group_stage_complete(tournament: &Tournament) -> bool {
        let teams: Vec<String> = tournament.teams().into_iter().collect();
        if teams.len() < 2 {
            return false;
        }
        teams.iter().enumerate().all(|(i, a)| {
            teams[i + 1..].iter().all(|b| {
                tournament
                    .matches
                    .iter()
                    .any(|m| m.counted && m.is_played() && m.is_pairing(a, b))
            })
        })
    }

    /// Seed the playoff from the final group table.
    pub fn start_playoff(tournament: &mut Tournament) -> TournamentResult<Stage> {
        Self::require(tournament, TournamentState::Active, "start the playoff")?;

        let Some(size) = tournament.playoff_size else {
            return Err(TournamentError::InvalidTransition {
                tournament_id: tournament.id,
                state: tournament.state(),
                action: "start a playoff that is not configured",
            });
        };
        if !Self::group_stage_complete(tournament) {
            return Err(TournamentError::InvalidTransition {
                tournament_id: tournament.id,
                state: tournament.state(),
                action: "start the playoff before every group match is counted",
            });
        }

        tournament.playoff = PlayoffEngine::seed(&tournament.standings, size)?;
        Ok(tournament.playoff.current_stage)
    }

    /// Record a playoff result in `stage`. Returns the match index.
    pub fn record_playoff_result(
        tournament: &mut Tournament,
        stage: Stage,
        result: &MatchResult,
    ) -> TournamentResult<usize> {
        if tournament.state() != TournamentState::Playoff {
            if tournament.state() == TournamentState::Active {
                return Err(TournamentError::IllegalStageTransition {
                    tournament_id: tournament.id,
                    current: Stage::None,
                    requested: stage,
                });
            }
            Self::require(tournament, TournamentState::Playoff, "submit a playoff match")?;
        }
        if tournament.playoff.current_stage == Stage::Completed {
            return Err(TournamentError::InvalidTransition {
                tournament_id: tournament.id,
                state: tournament.state(),
                action: "submit a match after the final",
            });
        }
        PlayoffEngine::record(tournament.id, &mut tournament.playoff, stage, result)
    }

    /// Move the bracket on from `from`.
    pub fn advance_playoff(tournament: &mut Tournament, from: Stage) -> TournamentResult<Stage> {
        Self::require(tournament, TournamentState::Playoff, "advance the playoff")?;
        PlayoffEngine::advance(tournament.id, &mut tournament.playoff, from)
    }

    /// Clear playoff match `index` in `stage` and every later round.
    pub fn reset_playoff_from(
        tournament: &mut Tournament,
        stage: Stage,
        index: usize,
    ) -> TournamentResult<()> {
        Self::require(tournament, TournamentState::Playoff, "reset a playoff match")?;
        PlayoffEngine::reset_from(tournament.id, &mut tournament.playoff, stage, index)
    }

    /// Drop the whole bracket and return to the group stage.
    pub fn reset_playoff(tournament: &mut Tournament) -> TournamentResult<()> {
        Self::require(tournament, TournamentState::Playoff, "reset the playoff")?;
        tournament.playoff = Default::default();
        info!("Tournament {} playoff cleared", tournament.id);
        Ok(())
    }

    /// Mark the tournament completed.
    ///
    /// With a playoff the bracket must have produced a winner; without one
    /// every group match must count.
    pub fn complete(tournament: &mut Tournament) -> TournamentResult<()> {
        let ready = match (tournament.state(), tournament.playoff_size) {
            (TournamentState::Playoff, Some(_)) => {
                tournament.playoff.current_stage == Stage::Completed
            }
            (TournamentState::Active, None) => Self::group_stage_complete(tournament),
            _ => false,
        };
        if !ready {
            return Err(TournamentError::InvalidTransition {
                tournament_id: tournament.id,
                state: tournament.state(),
                action: "complete the tournament",
            });
        }

        tournament.is_completed = true;
        tournament.is_active = false;

        info!("Tournament {} completed", tournament.id);
        Ok(())
    }

    /// Toggle visibility. Completed tournaments can be archived but never
    /// re-activated.
    pub fn set_active(tournament: &mut Tournament, active: bool) -> TournamentResult<()> {
        if active && tournament.is_completed {
            return Err(TournamentError::InvalidTransition {
                tournament_id: tournament.id,
                state: tournament.state(),
                action: "re-activate",
            });
        }
        tournament.is_active = active;
        Ok(())
    }

    /// Team that won: bracket winner, or group leader without a playoff.
    pub fn champion(tournament: &Tournament) -> Option<&str> {
        if !tournament.is_completed {
            return None;
        }
        match tournament.playoff_size {
            Some(_) => tournament.playoff.winner.as_deref(),
            None => tournament.standings.first().map(|row| row.team.as_str()),
        }
    }
}
