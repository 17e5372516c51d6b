/// Property-based tests for the group table
///
/// These tests check that standings depend only on the set of counted
/// matches and that every team and every point is accounted for.
use matchday::tournament::{Match, MatchResult, StandingsEngine};
use proptest::prelude::*;
use std::collections::BTreeSet;

const TEAMS: [&str; 6] = ["Ajax", "Benfica", "Celtic", "Dinamo", "Espanyol", "Feyenoord"];

fn team_set(n: usize) -> BTreeSet<String> {
    TEAMS[..n].iter().map(|t| t.to_string()).collect()
}

// Strategy for a list of matches between the first `n` teams
fn matches_strategy(n: usize) -> impl Strategy<Value = Vec<Match>> {
    prop::collection::vec((0..n, 0..n, 0i32..6, 0i32..6, any::<bool>()), 0..25).prop_map(
        move |raw| {
            raw.into_iter()
                .filter(|(a, b, ..)| a != b)
                .map(|(a, b, s1, s2, counted)| {
                    let mut m = Match::from_result(&MatchResult::new(TEAMS[a], TEAMS[b], s1, s2));
                    m.counted = counted;
                    m
                })
                .collect()
        },
    )
}

fn shuffled(matches: &[Match], seed: u64) -> Vec<Match> {
    use rand::{SeedableRng, rngs::StdRng, seq::SliceRandom};
    let mut copy = matches.to_vec();
    copy.shuffle(&mut StdRng::seed_from_u64(seed));
    copy
}

proptest! {
    #[test]
    fn prop_standings_ignore_match_order(matches in matches_strategy(6), seed in any::<u64>()) {
        let teams = team_set(6);
        let original = StandingsEngine::compute(&matches, &teams).unwrap();
        let reordered = StandingsEngine::compute(&shuffled(&matches, seed), &teams).unwrap();
        prop_assert_eq!(original, reordered);
    }

    #[test]
    fn prop_every_team_appears_once(matches in matches_strategy(5)) {
        let teams = team_set(5);
        let table = StandingsEngine::compute(&matches, &teams).unwrap();
        let listed: BTreeSet<String> = table.iter().map(|r| r.team.clone()).collect();
        prop_assert_eq!(table.len(), teams.len());
        prop_assert_eq!(listed, teams);
    }

    #[test]
    fn prop_points_match_raw_tally(matches in matches_strategy(6)) {
        let table = StandingsEngine::compute(&matches, &team_set(6)).unwrap();

        let counted: Vec<&Match> = matches.iter().filter(|m| m.counted).collect();
        let decided = counted.iter().filter(|m| m.score1 != m.score2).count() as u32;
        let drawn = counted.len() as u32 - decided;

        let points: u32 = table.iter().map(|r| r.points).sum();
        prop_assert_eq!(points, 3 * decided + 2 * drawn);

        let wins: u32 = table.iter().map(|r| r.won).sum();
        let losses: u32 = table.iter().map(|r| r.lost).sum();
        prop_assert_eq!(wins, decided);
        prop_assert_eq!(losses, decided);

        let goal_difference: i32 = table.iter().map(|r| r.goals_difference).sum();
        prop_assert_eq!(goal_difference, 0);

        for row in &table {
            prop_assert_eq!(row.played, row.won + row.drawn + row.lost);
        }
    }

    #[test]
    fn prop_table_is_sorted(matches in matches_strategy(6)) {
        let table = StandingsEngine::compute(&matches, &team_set(6)).unwrap();
        for pair in table.windows(2) {
            prop_assert_ne!(
                matchday::tournament::compare_rows(&pair[0], &pair[1]),
                std::cmp::Ordering::Greater
            );
        }
    }
}
