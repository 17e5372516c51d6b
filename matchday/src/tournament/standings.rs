//! Group-stage standings.
//!
//! The table is rebuilt from scratch on every call: counted matches are
//! folded into one row per team and the rows are sorted by
//! points, goal difference, goals scored and finally team name. The last
//! key makes the order total, so the result never depends on input order.

use log::debug;
use std::{
    cmp::Ordering,
    collections::{BTreeMap, BTreeSet},
};

use super::{
    errors::{TournamentError, TournamentResult},
    models::{Match, StandingsRow},
};

/// Folds group matches into a ranked table
pub struct StandingsEngine;

impl StandingsEngine {
    /// Compute the ranked table for `teams`.
    ///
    /// Only matches with `counted = true` and both scores present contribute.
    /// Every team in `teams` gets a row, even without matches.
    ///
    /// # Errors
    ///
    /// * `TournamentError::InvalidMatch` - a match names a team outside
    ///   `teams`, has a negative score, records penalties after a
    ///   non-drawn score, or pushes a goal tally past `i32::MAX`
    pub fn compute(matches: &[Match], teams: &BTreeSet<String>) -> TournamentResult<Vec<StandingsRow>> {
        let mut rows: BTreeMap<&str, StandingsRow> = teams
            .iter()
            .map(|team| (team.as_str(), StandingsRow::new(team.as_str())))
            .collect();

        for (index, m) in matches.iter().enumerate() {
            m.check()
                .map_err(|reason| TournamentError::InvalidMatch { index, reason })?;
            for team in [&m.team1, &m.team2] {
                if !teams.contains(team) {
                    return Err(TournamentError::InvalidMatch {
                        index,
                        reason: format!("{team} is not registered in this tournament"),
                    });
                }
            }

            if !m.counted {
                continue;
            }
            let (Some(score1), Some(score2)) = (m.score1, m.score2) else {
                continue;
            };

            // Penalties never change points: a shoot-out follows a draw.
            for (team, scored, conceded) in [(&m.team1, score1, score2), (&m.team2, score2, score1)] {
                if let Some(row) = rows.get_mut(team.as_str()) {
                    row.record(scored, conceded)
                        .map_err(|reason| TournamentError::InvalidMatch { index, reason })?;
                }
            }
        }

        let mut table: Vec<StandingsRow> = rows.into_values().collect();
        table.sort_by(compare_rows);

        debug!(
            "Standings recomputed: {} teams from {} matches",
            table.len(),
            matches.len()
        );

        Ok(table)
    }
}

/// Table order: points, goal difference, goals for (all descending), then
/// team name ascending.
pub fn compare_rows(a: &StandingsRow, b: &StandingsRow) -> Ordering {
    b.points
        .cmp(&a.points)
        .then_with(|| b.goals_difference.cmp(&a.goals_difference))
        .then_with(|| b.goals_for.cmp(&a.goals_for))
        .then_with(|| a.team.cmp(&b.team))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tournament::models::MatchResult;

    fn teams(names: &[&str]) -> BTreeSet<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn played(t1: &str, t2: &str, s1: i32, s2: i32) -> Match {
        Match::from_result(&MatchResult::new(t1, t2, s1, s2))
    }

    fn row<'a>(table: &'a [StandingsRow], team: &str) -> &'a StandingsRow {
        table.iter().find(|r| r.team == team).unwrap()
    }

    #[test]
    fn test_four_team_example_table() {
        let matches = vec![
            played("A", "B", 2, 1),
            played("C", "D", 0, 0),
            played("A", "C", 1, 1),
            played("B", "D", 3, 0),
            played("A", "D", 2, 0),
            played("B", "C", 1, 1),
        ];
        let table = StandingsEngine::compute(&matches, &teams(&["A", "B", "C", "D"])).unwrap();

        let order: Vec<&str> = table.iter().map(|r| r.team.as_str()).collect();
        assert_eq!(order, vec!["A", "B", "C", "D"]);

        let a = row(&table, "A");
        assert_eq!((a.won, a.drawn, a.lost), (2, 1, 0));
        assert_eq!(a.points, 7);
        assert_eq!((a.goals_for, a.goals_against, a.goals_difference), (5, 2, 3));

        let b = row(&table, "B");
        assert_eq!((b.won, b.drawn, b.lost), (1, 1, 1));
        assert_eq!(b.points, 4);
        assert_eq!((b.goals_for, b.goals_against, b.goals_difference), (5, 3, 2));

        let c = row(&table, "C");
        assert_eq!(c.points, 3);
        assert_eq!((c.goals_for, c.goals_against), (2, 2));

        let d = row(&table, "D");
        assert_eq!(d.points, 1);
        assert_eq!((d.goals_for, d.goals_against, d.goals_difference), (0, 5, -5));
    }

    #[test]
    fn test_teams_without_matches_get_zero_rows() {
        let table =
            StandingsEngine::compute(&[played("A", "B", 1, 0)], &teams(&["A", "B", "C"])).unwrap();
        assert_eq!(table.len(), 3);
        assert_eq!(row(&table, "C"), &StandingsRow::new("C"));
    }

    #[test]
    fn test_uncounted_matches_are_ignored() {
        let mut m = played("A", "B", 4, 0);
        m.counted = false;
        let table = StandingsEngine::compute(&[m], &teams(&["A", "B"])).unwrap();
        assert!(table.iter().all(|r| r.played == 0));
    }

    #[test]
    fn test_penalties_count_as_draw() {
        let m = Match::from_result(&MatchResult::new("A", "B", 1, 1).with_penalties(5, 3));
        let table = StandingsEngine::compute(&[m], &teams(&["A", "B"])).unwrap();
        assert!(table.iter().all(|r| r.drawn == 1 && r.points == 1));
    }

    #[test]
    fn test_tie_breaks_fall_through_to_name() {
        // Identical records: order decided by name alone.
        let matches = vec![played("Zeta", "Alpha", 1, 1)];
        let table = StandingsEngine::compute(&matches, &teams(&["Zeta", "Alpha"])).unwrap();
        assert_eq!(table[0].team, "Alpha");

        // Same points and difference, more goals scored wins.
        let matches = vec![
            played("A", "C", 3, 2),
            played("B", "C", 1, 0),
        ];
        let table = StandingsEngine::compute(&matches, &teams(&["A", "B", "C"])).unwrap();
        assert_eq!(table[0].team, "A");
        assert_eq!(table[1].team, "B");
    }

    #[test]
    fn test_unknown_team_is_rejected_with_index() {
        let matches = vec![played("A", "B", 1, 0), played("A", "X", 1, 0)];
        let err = StandingsEngine::compute(&matches, &teams(&["A", "B"])).unwrap_err();
        assert!(matches!(err, TournamentError::InvalidMatch { index: 1, .. }));
    }

    #[test]
    fn test_goal_overflow_is_rejected_with_index() {
        let matches = vec![played("A", "B", i32::MAX, 0), played("A", "C", 1, 0)];
        let err = StandingsEngine::compute(&matches, &teams(&["A", "B", "C"])).unwrap_err();
        assert!(matches!(err, TournamentError::InvalidMatch { index: 1, .. }));
    }

    #[test]
    fn test_negative_score_is_rejected() {
        let err = StandingsEngine::compute(&[played("A", "B", -2, 0)], &teams(&["A", "B"]))
            .unwrap_err();
        assert!(matches!(err, TournamentError::InvalidMatch { index: 0, .. }));
    }
}
