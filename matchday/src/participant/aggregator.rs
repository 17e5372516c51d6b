//! Folds completed tournaments into participant careers.
//!
//! Application is keyed by tournament id: a participant whose
//! `tournament_stats` already holds the id is left untouched, so replaying a
//! completion is a no-op rather than an error.

use log::{info, warn};
use std::collections::{BTreeMap, HashMap};

use super::models::{LeaderboardEntry, Participant, Place, PointsTable, TournamentStat};
use crate::tournament::{
    PlayoffEngine, Stage, Tournament, TournamentError, TournamentId, TournamentResult,
};

/// Computes placements and career updates for completed tournaments
#[derive(Debug, Clone, Default)]
pub struct ParticipantStatsAggregator {
    points: PointsTable,
}

impl ParticipantStatsAggregator {
    pub fn new(points: PointsTable) -> Self {
        Self { points }
    }

    /// Final place of `team`: bracket result first, group rank otherwise.
    fn place(tournament: &Tournament, team: &str, group_rank: usize) -> Place {
        if tournament.playoff_size.is_none() {
            return match group_rank {
                1 => Place::First,
                2 => Place::Second,
                3 => Place::Third,
                rank => Place::Group { rank },
            };
        }

        let playoff = &tournament.playoff;
        if playoff.winner.as_deref() == Some(team) {
            return Place::First;
        }
        match PlayoffEngine::eliminated_in(playoff, team) {
            Some(Stage::Final) => Place::Second,
            Some(Stage::SemiFinals) => Place::Third,
            _ => Place::Group { rank: group_rank },
        }
    }

    /// Snapshot for every participant of a completed tournament, keyed by
    /// participant name.
    ///
    /// # Errors
    ///
    /// * `TournamentError::InvalidTransition` - tournament not completed
    /// * `TournamentError::UnknownParticipant` - a participant has no team,
    ///   or the team is missing from the standings
    pub fn tournament_stats(
        &self,
        tournament: &Tournament,
    ) -> TournamentResult<BTreeMap<String, TournamentStat>> {
        if !tournament.is_completed {
            return Err(TournamentError::InvalidTransition {
                tournament_id: tournament.id,
                state: tournament.state(),
                action: "apply participant stats",
            });
        }

        let mut snapshots = BTreeMap::new();
        for participant in &tournament.participants {
            let unknown = || TournamentError::UnknownParticipant {
                tournament_id: tournament.id,
                participant: participant.clone(),
            };
            let team = tournament.team_of(participant).ok_or_else(unknown)?;
            let rank = tournament.group_rank(team).ok_or_else(unknown)?;

            let place = Self::place(tournament, team, rank);
            let mut stat = TournamentStat::new(tournament.id, place);
            stat.points = self.points.award(place, rank);

            for m in tournament.matches.iter().filter(|m| m.counted) {
                let Some((scored, conceded)) = m.goals_for(team) else {
                    continue;
                };
                stat.goals_scored += i64::from(scored);
                stat.goals_conceded += i64::from(conceded);
                stat.matches_played += 1;
                match scored.cmp(&conceded) {
                    std::cmp::Ordering::Greater => stat.wins += 1,
                    std::cmp::Ordering::Less => stat.losses += 1,
                    std::cmp::Ordering::Equal => stat.draws += 1,
                }
            }

            // Knockout games always have a winner, shoot-outs included.
            for m in tournament.playoff.all_matches().filter(|m| m.counted) {
                let Some((scored, conceded)) = m.goals_for(team) else {
                    continue;
                };
                stat.goals_scored += i64::from(scored);
                stat.goals_conceded += i64::from(conceded);
                stat.matches_played += 1;
                if m.winner() == Some(team) {
                    stat.wins += 1;
                } else {
                    stat.losses += 1;
                }
            }

            snapshots.insert(participant.clone(), stat);
        }
        Ok(snapshots)
    }

    /// Fold a completed tournament into `participants`.
    ///
    /// Every participant of the tournament must be present in the map. All
    /// checks run before anything is modified. Participants that already
    /// carry this tournament are skipped.
    pub fn apply(
        &self,
        tournament: &Tournament,
        mut participants: HashMap<String, Participant>,
    ) -> TournamentResult<HashMap<String, Participant>> {
        let snapshots = self.tournament_stats(tournament)?;

        if let Some(missing) = snapshots.keys().find(|name| !participants.contains_key(*name)) {
            return Err(TournamentError::UnknownParticipant {
                tournament_id: tournament.id,
                participant: missing.clone(),
            });
        }

        let mut applied = 0;
        for (name, stat) in snapshots {
            let Some(participant) = participants.get_mut(&name) else {
                continue;
            };
            if participant.has_tournament(tournament.id) {
                warn!(
                    "Tournament {} already applied to {}, skipping",
                    tournament.id, name
                );
                continue;
            }
            participant.record_tournament(stat);
            applied += 1;
        }

        if applied > 0 {
            info!(
                "Applied tournament {} to {} participant careers",
                tournament.id, applied
            );
        }
        Ok(participants)
    }

    /// Remove `tournament_id` from every participant in the map and rebuild
    /// their totals. Participants without it are returned unchanged.
    pub fn revoke(
        tournament_id: TournamentId,
        mut participants: HashMap<String, Participant>,
    ) -> HashMap<String, Participant> {
        for participant in participants.values_mut() {
            if participant.has_tournament(tournament_id) {
                participant
                    .stats
                    .tournament_stats
                    .retain(|s| s.tournament_id != tournament_id);
                participant.recompute_totals();
            }
        }
        participants
    }

    /// All-time table: total points, wins, goal difference (descending),
    /// then name.
    pub fn leaderboard<'a>(
        participants: impl IntoIterator<Item = &'a Participant>,
    ) -> Vec<LeaderboardEntry> {
        let mut sorted: Vec<&Participant> = participants.into_iter().collect();
        sorted.sort_by(|a, b| {
            b.stats
                .total_points
                .cmp(&a.stats.total_points)
                .then_with(|| b.stats.wins.cmp(&a.stats.wins))
                .then_with(|| b.stats.goals_difference().cmp(&a.stats.goals_difference()))
                .then_with(|| a.name.cmp(&b.name))
        });

        sorted
            .into_iter()
            .enumerate()
            .map(|(i, p)| LeaderboardEntry {
                rank: i + 1,
                name: p.name.clone(),
                total_points: p.stats.total_points,
                tournaments_played: p.stats.tournaments_played,
                wins: p.stats.wins,
                draws: p.stats.draws,
                losses: p.stats.losses,
                goals_difference: p.stats.goals_difference(),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tournament::{
        MatchResult, TeamCategory, TournamentConfig, TournamentLifecycle,
    };
    use chrono::Utc;

    const PLAYERS: [(&str, &str); 4] = [
        ("ann", "Arsenal"),
        ("bob", "Barcelona"),
        ("cid", "Celtic"),
        ("dan", "Dortmund"),
    ];

    fn started(config: TournamentConfig) -> Tournament {
        let category = TeamCategory::new(
            "Clubs",
            PLAYERS.iter().map(|(_, team)| team.to_string()).collect(),
        )
        .unwrap();
        let mut t = Tournament::new(42, config, Utc::now());
        TournamentLifecycle::set_team_category(&mut t, &category).unwrap();
        for (player, team) in PLAYERS {
            TournamentLifecycle::add_participant(&mut t, player).unwrap();
            TournamentLifecycle::assign_team(&mut t, &category, player, team).unwrap();
        }
        TournamentLifecycle::complete_setup(&mut t).unwrap();
        for (a, b, s1, s2) in [
            ("Arsenal", "Barcelona", 2, 1),
            ("Celtic", "Dortmund", 0, 0),
            ("Arsenal", "Celtic", 1, 1),
            ("Barcelona", "Dortmund", 3, 0),
            ("Arsenal", "Dortmund", 2, 0),
            ("Barcelona", "Celtic", 1, 1),
        ] {
            TournamentLifecycle::submit_group_match(&mut t, &MatchResult::new(a, b, s1, s2))
                .unwrap();
        }
        t
    }

    /// Arsenal top the group, Dortmund win the cup on penalties.
    fn completed_cup() -> Tournament {
        let mut t = started(TournamentConfig::league("Cup", 4, 4).with_playoff(4));
        TournamentLifecycle::start_playoff(&mut t).unwrap();
        TournamentLifecycle::record_playoff_result(
            &mut t,
            Stage::SemiFinals,
            &MatchResult::new("Arsenal", "Dortmund", 0, 1),
        )
        .unwrap();
        TournamentLifecycle::record_playoff_result(
            &mut t,
            Stage::SemiFinals,
            &MatchResult::new("Barcelona", "Celtic", 3, 2),
        )
        .unwrap();
        TournamentLifecycle::advance_playoff(&mut t, Stage::SemiFinals).unwrap();
        TournamentLifecycle::record_playoff_result(
            &mut t,
            Stage::Final,
            &MatchResult::new("Dortmund", "Barcelona", 1, 1).with_penalties(4, 2),
        )
        .unwrap();
        TournamentLifecycle::advance_playoff(&mut t, Stage::Final).unwrap();
        TournamentLifecycle::complete(&mut t).unwrap();
        t
    }

    fn roster() -> HashMap<String, Participant> {
        PLAYERS
            .iter()
            .map(|(name, _)| (name.to_string(), Participant::new(*name)))
            .collect()
    }

    #[test]
    fn test_places_and_points_from_bracket() {
        let t = completed_cup();
        let stats = ParticipantStatsAggregator::default()
            .tournament_stats(&t)
            .unwrap();

        // Group order: Arsenal, Barcelona, Celtic, Dortmund.
        assert_eq!(stats["dan"].place, Place::First);
        assert_eq!(stats["dan"].points, 8);
        assert_eq!(stats["bob"].place, Place::Second);
        assert_eq!(stats["bob"].points, 6);
        assert_eq!(stats["ann"].place, Place::Third);
        assert_eq!(stats["ann"].points, 4);
        assert_eq!(stats["cid"].place, Place::Third);
        assert_eq!(stats["cid"].points, 4);
    }

    #[test]
    fn test_match_tallies_include_playoff() {
        let t = completed_cup();
        let stats = ParticipantStatsAggregator::default()
            .tournament_stats(&t)
            .unwrap();

        // Dortmund: group D1 L2, semi W 1-0, final 1-1 won on penalties.
        let dan = &stats["dan"];
        assert_eq!(dan.matches_played, 5);
        assert_eq!((dan.wins, dan.draws, dan.losses), (2, 1, 2));
        assert_eq!((dan.goals_scored, dan.goals_conceded), (2, 6));
        for stat in stats.values() {
            assert_eq!(stat.matches_played, stat.wins + stat.draws + stat.losses);
        }
    }

    #[test]
    fn test_league_places_follow_group_rank() {
        let mut t = started(TournamentConfig::league("League", 4, 4));
        TournamentLifecycle::complete(&mut t).unwrap();
        let stats = ParticipantStatsAggregator::default()
            .tournament_stats(&t)
            .unwrap();
        assert_eq!(stats["ann"].place, Place::First);
        assert_eq!(stats["bob"].place, Place::Second);
        assert_eq!(stats["cid"].place, Place::Third);
        assert_eq!(stats["dan"].place, Place::Group { rank: 4 });
        assert_eq!(stats["dan"].points, 0);
    }

    #[test]
    fn test_apply_requires_completed_tournament() {
        let t = started(TournamentConfig::league("League", 4, 4));
        let err = ParticipantStatsAggregator::default()
            .apply(&t, roster())
            .unwrap_err();
        assert!(matches!(err, TournamentError::InvalidTransition { .. }));
    }

    #[test]
    fn test_apply_is_idempotent() {
        let t = completed_cup();
        let aggregator = ParticipantStatsAggregator::default();
        let once = aggregator.apply(&t, roster()).unwrap();
        let twice = aggregator.apply(&t, once.clone()).unwrap();
        assert_eq!(once, twice);
        assert_eq!(once["dan"].stats.tournaments_played, 1);
        assert_eq!(once["dan"].stats.total_points, 8);
    }

    #[test]
    fn test_missing_participant_changes_nothing() {
        let t = completed_cup();
        let mut partial = roster();
        partial.remove("cid");
        let err = ParticipantStatsAggregator::default()
            .apply(&t, partial)
            .unwrap_err();
        assert!(matches!(
            err,
            TournamentError::UnknownParticipant { ref participant, .. } if participant == "cid"
        ));
    }

    #[test]
    fn test_revoke_restores_previous_career() {
        let t = completed_cup();
        let aggregator = ParticipantStatsAggregator::default();
        let before = roster();
        let after = aggregator.apply(&t, before.clone()).unwrap();
        let revoked = ParticipantStatsAggregator::revoke(t.id, after);
        assert_eq!(revoked, before);
    }

    #[test]
    fn test_leaderboard_order() {
        let t = completed_cup();
        let careers = ParticipantStatsAggregator::default()
            .apply(&t, roster())
            .unwrap();
        let board = ParticipantStatsAggregator::leaderboard(careers.values());
        let names: Vec<&str> = board.iter().map(|e| e.name.as_str()).collect();
        // ann and cid tie on points; ann has more wins.
        assert_eq!(names, vec!["dan", "bob", "ann", "cid"]);
        assert_eq!(board[0].rank, 1);
    }
}
