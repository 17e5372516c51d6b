//! Single-elimination bracket progression.
//!
//! The bracket is a state machine over [`Stage`]:
//!
//! ```text
//! None -> QuarterFinals -> SemiFinals -> Final -> Completed
//! ```
//!
//! Four-team brackets are seeded straight into the semi-finals. Winners are
//! paired by bracket adjacency (winner of match 1 meets winner of match 2,
//! and so on); rounds are never re-seeded. A result that already fed an
//! advancement can only change after [`PlayoffEngine::reset_from`], which
//! also clears every later round.

use log::{debug, info};

use super::{
    errors::{TournamentError, TournamentResult},
    models::{
        Match, MatchResult, Playoff, SUPPORTED_BRACKET_SIZES, Stage, StandingsRow, TournamentId,
    },
};

/// Drives a [`Playoff`] through its stages
pub struct PlayoffEngine;

impl PlayoffEngine {
    /// Seed positions in bracket order for `size` teams.
    ///
    /// Consecutive entries meet in the opening round, e.g. for eight teams
    /// `[1, 8, 4, 5, 2, 7, 3, 6]`.
    pub fn bracket_order(size: usize) -> Vec<usize> {
        let mut order = vec![1];
        while order.len() < size {
            let n = order.len() * 2;
            order = order.iter().flat_map(|&seed| [seed, n + 1 - seed]).collect();
        }
        order
    }

    /// Seed a bracket from ranked standings.
    ///
    /// # Errors
    ///
    /// * `TournamentError::InvalidBracketSize` - `size` is not 4 or 8, or
    ///   fewer teams than `size` are ranked
    pub fn seed(standings: &[StandingsRow], size: usize) -> TournamentResult<Playoff> {
        let opening = match Stage::opening_round(size) {
            Some(stage) if SUPPORTED_BRACKET_SIZES.contains(&size) && standings.len() >= size => {
                stage
            }
            _ => {
                return Err(TournamentError::InvalidBracketSize {
                    size,
                    teams: standings.len(),
                });
            }
        };

        let order = Self::bracket_order(size);
        let pairings: Vec<Match> = order
            .chunks(2)
            .map(|pair| {
                Match::pairing(
                    standings[pair[0] - 1].team.clone(),
                    standings[pair[1] - 1].team.clone(),
                )
            })
            .collect();

        let mut playoff = Playoff {
            current_stage: opening,
            bracket_size: size,
            ..Default::default()
        };
        match opening {
            Stage::QuarterFinals => playoff.quarter_finals = pairings,
            _ => playoff.semi_finals = pairings,
        }

        info!("Playoff seeded with {} teams, opening in the {}", size, opening);
        Ok(playoff)
    }

    /// Record the result of a pairing in `stage`. Returns the match index.
    ///
    /// # Errors
    ///
    /// * `TournamentError::IllegalStageTransition` - `stage` has not been
    ///   reached or is not part of this bracket
    /// * `TournamentError::LockedMatch` - the match already counts, or its
    ///   stage was already advanced
    /// * `TournamentError::Validation` - teams are not a pairing of `stage`,
    ///   or the result has no winner
    pub fn record(
        tournament_id: TournamentId,
        playoff: &mut Playoff,
        stage: Stage,
        result: &MatchResult,
    ) -> TournamentResult<usize> {
        let current = playoff.current_stage;
        if current == Stage::None || stage > current || !playoff.includes(stage) {
            return Err(TournamentError::IllegalStageTransition {
                tournament_id,
                current,
                requested: stage,
            });
        }

        let index = playoff
            .matches(stage)
            .iter()
            .position(|m| m.is_pairing(&result.team1, &result.team2))
            .ok_or_else(|| {
                TournamentError::Validation(format!(
                    "{} vs {} is not a {} pairing",
                    result.team1, result.team2, stage
                ))
            })?;

        let slot = &mut playoff.matches_mut(stage)[index];
        if stage < current || slot.counted {
            return Err(TournamentError::LockedMatch {
                tournament_id,
                stage,
                index,
            });
        }

        let mut candidate = slot.clone();
        candidate.record(&result.oriented_to(&slot.team1));
        candidate
            .check()
            .map_err(TournamentError::Validation)?;
        if !candidate.is_decisive() {
            return Err(TournamentError::Validation(format!(
                "{} matches need a winner: {} vs {} ended level",
                stage, candidate.team1, candidate.team2
            )));
        }
        *slot = candidate;

        debug!("Recorded {} match #{} in tournament {}", stage, index, tournament_id);
        Ok(index)
    }

    /// Whether every match of the current stage counts and has a winner.
    pub fn stage_decided(playoff: &Playoff) -> bool {
        let matches = playoff.matches(playoff.current_stage);
        !matches.is_empty() && matches.iter().all(|m| m.counted && m.is_decisive())
    }

    /// Move the bracket on from `from`. Returns the new stage.
    ///
    /// Passing the stage explicitly makes a repeated advancement of the same
    /// stage an error instead of skipping a round.
    ///
    /// # Errors
    ///
    /// * `TournamentError::IllegalStageTransition` - `from` is not the
    ///   current stage, or one of its matches is missing a decisive result
    pub fn advance(
        tournament_id: TournamentId,
        playoff: &mut Playoff,
        from: Stage,
    ) -> TournamentResult<Stage> {
        let illegal = |current| TournamentError::IllegalStageTransition {
            tournament_id,
            current,
            requested: from.next().unwrap_or(Stage::Completed),
        };

        if playoff.current_stage != from || !from.is_knockout_round() {
            return Err(illegal(playoff.current_stage));
        }
        if !Self::stage_decided(playoff) {
            return Err(illegal(from));
        }

        let winners: Vec<String> = playoff
            .matches(from)
            .iter()
            .filter_map(|m| m.winner().map(str::to_string))
            .collect();

        let next = match from {
            Stage::QuarterFinals => {
                playoff.semi_finals = pair_adjacent(&winners);
                Stage::SemiFinals
            }
            Stage::SemiFinals => {
                playoff.final_match = pair_adjacent(&winners).into_iter().next();
                Stage::Final
            }
            _ => {
                playoff.winner = winners.into_iter().next();
                Stage::Completed
            }
        };
        playoff.current_stage = next;

        info!(
            "Tournament {} playoff advanced from the {} to {}",
            tournament_id, from, next
        );
        Ok(next)
    }

    /// Clear match `index` of `stage` and every round after it, rewinding
    /// the bracket to `stage`.
    ///
    /// # Errors
    ///
    /// * `TournamentError::IllegalStageTransition` - bracket not running,
    ///   already completed, or `stage` not reached
    /// * `TournamentError::Validation` - no match at `index`
    pub fn reset_from(
        tournament_id: TournamentId,
        playoff: &mut Playoff,
        stage: Stage,
        index: usize,
    ) -> TournamentResult<()> {
        let current = playoff.current_stage;
        if matches!(current, Stage::None | Stage::Completed)
            || stage > current
            || !playoff.includes(stage)
        {
            return Err(TournamentError::IllegalStageTransition {
                tournament_id,
                current,
                requested: stage,
            });
        }

        let slot = playoff
            .matches_mut(stage)
            .get_mut(index)
            .ok_or_else(|| {
                TournamentError::Validation(format!("the {stage} have no match #{index}"))
            })?;
        slot.clear_result();

        if stage < Stage::SemiFinals {
            playoff.semi_finals.clear();
        }
        if stage < Stage::Final {
            playoff.final_match = None;
        }
        playoff.winner = None;
        playoff.current_stage = stage;

        info!(
            "Tournament {} playoff reset to the {} (match #{})",
            tournament_id, stage, index
        );
        Ok(())
    }

    /// Teams still alive in the bracket.
    pub fn current_stage_teams(playoff: &Playoff) -> Vec<String> {
        match playoff.current_stage {
            Stage::Completed => playoff.winner.iter().cloned().collect(),
            stage => playoff
                .matches(stage)
                .iter()
                .flat_map(|m| [m.team1.clone(), m.team2.clone()])
                .collect(),
        }
    }

    /// Round in which `team` was knocked out, if it was.
    pub fn eliminated_in(playoff: &Playoff, team: &str) -> Option<Stage> {
        [Stage::QuarterFinals, Stage::SemiFinals, Stage::Final]
            .into_iter()
            .find(|&stage| {
                playoff
                    .matches(stage)
                    .iter()
                    .any(|m| m.counted && m.loser() == Some(team))
            })
    }
}

fn pair_adjacent(winners: &[String]) -> Vec<Match> {
    winners
        .chunks(2)
        .filter(|pair| pair.len() == 2)
        .map(|pair| Match::pairing(pair[0].clone(), pair[1].clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ranked(teams: &[&str]) -> Vec<StandingsRow> {
        teams.iter().map(|t| StandingsRow::new(*t)).collect()
    }

    fn pairs(matches: &[Match]) -> Vec<(&str, &str)> {
        matches
            .iter()
            .map(|m| (m.team1.as_str(), m.team2.as_str()))
            .collect()
    }

    fn eight_team_bracket() -> Playoff {
        PlayoffEngine::seed(&ranked(&["1", "2", "3", "4", "5", "6", "7", "8"]), 8).unwrap()
    }

    fn play_quarter_finals(playoff: &mut Playoff) {
        for (a, b) in [("1", "8"), ("4", "5"), ("2", "7"), ("3", "6")] {
            PlayoffEngine::record(1, playoff, Stage::QuarterFinals, &MatchResult::new(a, b, 2, 0))
                .unwrap();
        }
    }

    #[test]
    fn test_bracket_order() {
        assert_eq!(PlayoffEngine::bracket_order(4), vec![1, 4, 2, 3]);
        assert_eq!(PlayoffEngine::bracket_order(8), vec![1, 8, 4, 5, 2, 7, 3, 6]);
    }

    #[test]
    fn test_seed_eight_pairs_top_against_bottom() {
        let playoff = eight_team_bracket();
        assert_eq!(playoff.current_stage, Stage::QuarterFinals);
        assert_eq!(
            pairs(&playoff.quarter_finals),
            vec![("1", "8"), ("4", "5"), ("2", "7"), ("3", "6")]
        );
    }

    #[test]
    fn test_seed_four_opens_with_semi_finals() {
        let playoff = PlayoffEngine::seed(&ranked(&["A", "B", "C", "D", "E"]), 4).unwrap();
        assert_eq!(playoff.current_stage, Stage::SemiFinals);
        assert!(playoff.quarter_finals.is_empty());
        assert_eq!(pairs(&playoff.semi_finals), vec![("A", "D"), ("B", "C")]);
    }

    #[test]
    fn test_seed_rejects_unsupported_sizes() {
        let err = PlayoffEngine::seed(&ranked(&["A", "B", "C", "D", "E", "F"]), 6).unwrap_err();
        assert!(matches!(err, TournamentError::InvalidBracketSize { size: 6, .. }));

        let err = PlayoffEngine::seed(&ranked(&["A", "B", "C"]), 4).unwrap_err();
        assert!(matches!(err, TournamentError::InvalidBracketSize { size: 4, teams: 3 }));
    }

    #[test]
    fn test_full_bracket_progression() {
        let mut playoff = eight_team_bracket();
        play_quarter_finals(&mut playoff);
        assert!(PlayoffEngine::stage_decided(&playoff));

        let next = PlayoffEngine::advance(1, &mut playoff, Stage::QuarterFinals).unwrap();
        assert_eq!(next, Stage::SemiFinals);
        assert_eq!(pairs(&playoff.semi_finals), vec![("1", "4"), ("2", "3")]);

        PlayoffEngine::record(1, &mut playoff, Stage::SemiFinals, &MatchResult::new("4", "1", 1, 0))
            .unwrap();
        PlayoffEngine::record(
            1,
            &mut playoff,
            Stage::SemiFinals,
            &MatchResult::new("2", "3", 1, 1).with_penalties(3, 4),
        )
        .unwrap();
        PlayoffEngine::advance(1, &mut playoff, Stage::SemiFinals).unwrap();
        let final_match = playoff.final_match.as_ref().unwrap();
        assert_eq!((final_match.team1.as_str(), final_match.team2.as_str()), ("4", "3"));

        PlayoffEngine::record(1, &mut playoff, Stage::Final, &MatchResult::new("4", "3", 0, 2))
            .unwrap();
        let next = PlayoffEngine::advance(1, &mut playoff, Stage::Final).unwrap();
        assert_eq!(next, Stage::Completed);
        assert_eq!(playoff.winner.as_deref(), Some("3"));
        assert_eq!(PlayoffEngine::current_stage_teams(&playoff), vec!["3".to_string()]);
        assert_eq!(PlayoffEngine::eliminated_in(&playoff, "4"), Some(Stage::Final));
        assert_eq!(PlayoffEngine::eliminated_in(&playoff, "1"), Some(Stage::SemiFinals));
        assert_eq!(PlayoffEngine::eliminated_in(&playoff, "8"), Some(Stage::QuarterFinals));
        assert_eq!(PlayoffEngine::eliminated_in(&playoff, "3"), None);
    }

    #[test]
    fn test_reversed_submission_is_oriented_to_pairing() {
        let mut playoff = eight_team_bracket();
        PlayoffEngine::record(1, &mut playoff, Stage::QuarterFinals, &MatchResult::new("8", "1", 3, 1))
            .unwrap();
        let m = &playoff.quarter_finals[0];
        assert_eq!((m.score1, m.score2), (Some(1), Some(3)));
        assert_eq!(m.winner(), Some("8"));
    }

    #[test]
    fn test_advance_requires_every_match_decided() {
        let mut playoff = eight_team_bracket();
        PlayoffEngine::record(1, &mut playoff, Stage::QuarterFinals, &MatchResult::new("1", "8", 1, 0))
            .unwrap();
        let err = PlayoffEngine::advance(1, &mut playoff, Stage::QuarterFinals).unwrap_err();
        assert!(matches!(err, TournamentError::IllegalStageTransition { .. }));
        assert_eq!(playoff.current_stage, Stage::QuarterFinals);
    }

    #[test]
    fn test_readvancing_a_stage_is_illegal() {
        let mut playoff = eight_team_bracket();
        play_quarter_finals(&mut playoff);
        PlayoffEngine::advance(1, &mut playoff, Stage::QuarterFinals).unwrap();
        let err = PlayoffEngine::advance(1, &mut playoff, Stage::QuarterFinals).unwrap_err();
        assert!(matches!(
            err,
            TournamentError::IllegalStageTransition {
                current: Stage::SemiFinals,
                ..
            }
        ));
    }

    #[test]
    fn test_recording_a_future_stage_is_illegal() {
        let mut playoff = eight_team_bracket();
        let err = PlayoffEngine::record(1, &mut playoff, Stage::Final, &MatchResult::new("1", "2", 1, 0))
            .unwrap_err();
        assert!(matches!(
            err,
            TournamentError::IllegalStageTransition {
                requested: Stage::Final,
                ..
            }
        ));
    }

    #[test]
    fn test_undecided_playoff_result_is_rejected() {
        let mut playoff = eight_team_bracket();
        let err = PlayoffEngine::record(1, &mut playoff, Stage::QuarterFinals, &MatchResult::new("1", "8", 2, 2))
            .unwrap_err();
        assert!(matches!(err, TournamentError::Validation(_)));
        assert!(!playoff.quarter_finals[0].counted);
    }

    #[test]
    fn test_counted_match_is_locked() {
        let mut playoff = eight_team_bracket();
        PlayoffEngine::record(1, &mut playoff, Stage::QuarterFinals, &MatchResult::new("1", "8", 1, 0))
            .unwrap();
        let err = PlayoffEngine::record(1, &mut playoff, Stage::QuarterFinals, &MatchResult::new("1", "8", 0, 1))
            .unwrap_err();
        assert!(matches!(err, TournamentError::LockedMatch { index: 0, .. }));
    }

    #[test]
    fn test_advanced_stage_is_locked_until_reset() {
        let mut playoff = eight_team_bracket();
        play_quarter_finals(&mut playoff);
        PlayoffEngine::advance(1, &mut playoff, Stage::QuarterFinals).unwrap();
        PlayoffEngine::record(1, &mut playoff, Stage::SemiFinals, &MatchResult::new("1", "4", 1, 0))
            .unwrap();

        let err = PlayoffEngine::record(1, &mut playoff, Stage::QuarterFinals, &MatchResult::new("4", "5", 0, 1))
            .unwrap_err();
        assert!(matches!(
            err,
            TournamentError::LockedMatch {
                stage: Stage::QuarterFinals,
                index: 1,
                ..
            }
        ));

        // Cascading reset: the semi-final built on the stale winner disappears.
        PlayoffEngine::reset_from(1, &mut playoff, Stage::QuarterFinals, 1).unwrap();
        assert_eq!(playoff.current_stage, Stage::QuarterFinals);
        assert!(playoff.semi_finals.is_empty());
        assert!(playoff.final_match.is_none());
        assert!(!playoff.quarter_finals[1].counted);
        assert!(playoff.quarter_finals[0].counted);

        PlayoffEngine::record(1, &mut playoff, Stage::QuarterFinals, &MatchResult::new("4", "5", 0, 1))
            .unwrap();
        PlayoffEngine::advance(1, &mut playoff, Stage::QuarterFinals).unwrap();
        assert_eq!(pairs(&playoff.semi_finals), vec![("1", "5"), ("2", "3")]);
    }

    #[test]
    fn test_reset_rejects_unreached_and_completed() {
        let mut playoff = eight_team_bracket();
        let err = PlayoffEngine::reset_from(1, &mut playoff, Stage::SemiFinals, 0).unwrap_err();
        assert!(matches!(err, TournamentError::IllegalStageTransition { .. }));

        let err = PlayoffEngine::reset_from(1, &mut playoff, Stage::QuarterFinals, 9).unwrap_err();
        assert!(matches!(err, TournamentError::Validation(_)));

        playoff.current_stage = Stage::Completed;
        let err = PlayoffEngine::reset_from(1, &mut playoff, Stage::Final, 0).unwrap_err();
        assert!(matches!(err, TournamentError::IllegalStageTransition { .. }));
    }
}
