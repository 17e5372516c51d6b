//! Participant career records and the ranking points table.

use serde::{Deserialize, Serialize};
use std::{env, fmt};

use crate::tournament::TournamentId;

/// Final place of a participant in one tournament
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Place {
    First,
    Second,
    /// Semi-final loser; both share third place
    Third,
    /// Did not reach the podium; `rank` is the final group position
    Group { rank: usize },
}

impl fmt::Display for Place {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Place::First => write!(f, "first"),
            Place::Second => write!(f, "second"),
            Place::Third => write!(f, "third"),
            Place::Group { rank } => write!(f, "group (#{rank})"),
        }
    }
}

/// One tournament's contribution to a participant's career
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TournamentStat {
    pub tournament_id: TournamentId,
    pub place: Place,
    /// Ranking points awarded for this tournament
    pub points: u32,
    pub goals_scored: i64,
    pub goals_conceded: i64,
    pub wins: u32,
    pub losses: u32,
    pub draws: u32,
    pub matches_played: u32,
}

impl TournamentStat {
    /// Empty snapshot for `tournament_id`
    pub fn new(tournament_id: TournamentId, place: Place) -> Self {
        Self {
            tournament_id,
            place,
            points: 0,
            goals_scored: 0,
            goals_conceded: 0,
            wins: 0,
            losses: 0,
            draws: 0,
            matches_played: 0,
        }
    }
}

/// Career totals plus the per-tournament snapshots they are summed from
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CareerStats {
    pub total_points: u32,
    pub goals_scored: i64,
    pub goals_conceded: i64,
    pub wins: u32,
    pub losses: u32,
    pub draws: u32,
    pub matches_played: u32,
    pub tournaments_played: u32,
    #[serde(default)]
    pub tournament_stats: Vec<TournamentStat>,
}

impl CareerStats {
    fn absorb(&mut self, stat: &TournamentStat) {
        self.total_points += stat.points;
        self.goals_scored += stat.goals_scored;
        self.goals_conceded += stat.goals_conceded;
        self.wins += stat.wins;
        self.losses += stat.losses;
        self.draws += stat.draws;
        self.matches_played += stat.matches_played;
        self.tournaments_played += 1;
    }

    pub fn goals_difference(&self) -> i64 {
        self.goals_scored - self.goals_conceded
    }
}

/// A registered player
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    /// Unique name, used as the participant's identity
    pub name: String,
    #[serde(default)]
    pub stats: CareerStats,
    /// Bumped by the store on every save
    #[serde(default)]
    pub version: i64,
}

impl Participant {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            stats: CareerStats::default(),
            version: 0,
        }
    }

    /// Whether `tournament_id` is already folded into this career
    pub fn has_tournament(&self, tournament_id: TournamentId) -> bool {
        self.stats
            .tournament_stats
            .iter()
            .any(|s| s.tournament_id == tournament_id)
    }

    /// Append a snapshot and add it to the totals
    pub fn record_tournament(&mut self, stat: TournamentStat) {
        self.stats.absorb(&stat);
        self.stats.tournament_stats.push(stat);
    }

    /// Rebuild career totals from the snapshots alone
    pub fn recompute_totals(&mut self) {
        let snapshots = std::mem::take(&mut self.stats.tournament_stats);
        self.stats = CareerStats::default();
        for stat in &snapshots {
            self.stats.absorb(stat);
        }
        self.stats.tournament_stats = snapshots;
    }
}

/// Ranking points awarded when a tournament completes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PointsTable {
    pub winner: u32,
    pub runner_up: u32,
    pub semi_finalist: u32,
    /// Bonus for finishing the group stage in the top `group_bonus_places`
    pub group_bonus: u32,
    pub group_bonus_places: usize,
}

impl PointsTable {
    /// Create the table from environment variables
    ///
    /// Expected environment variables:
    /// - `MD_POINTS_WINNER` (default: 8)
    /// - `MD_POINTS_RUNNER_UP` (default: 4)
    /// - `MD_POINTS_SEMI_FINALIST` (default: 2)
    /// - `MD_POINTS_GROUP_BONUS` (default: 2)
    /// - `MD_POINTS_GROUP_BONUS_PLACES` (default: 3)
    ///
    /// Unparseable values fall back to the default.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            winner: env_or("MD_POINTS_WINNER", defaults.winner),
            runner_up: env_or("MD_POINTS_RUNNER_UP", defaults.runner_up),
            semi_finalist: env_or("MD_POINTS_SEMI_FINALIST", defaults.semi_finalist),
            group_bonus: env_or("MD_POINTS_GROUP_BONUS", defaults.group_bonus),
            group_bonus_places: env_or("MD_POINTS_GROUP_BONUS_PLACES", defaults.group_bonus_places),
        }
    }

    /// Points for finishing in `place` after ranking `group_rank` in the group
    pub fn award(&self, place: Place, group_rank: usize) -> u32 {
        let podium = match place {
            Place::First => self.winner,
            Place::Second => self.runner_up,
            Place::Third => self.semi_finalist,
            Place::Group { .. } => 0,
        };
        let bonus = if group_rank <= self.group_bonus_places {
            self.group_bonus
        } else {
            0
        };
        podium + bonus
    }
}

impl Default for PointsTable {
    fn default() -> Self {
        Self {
            winner: 8,
            runner_up: 4,
            semi_finalist: 2,
            group_bonus: 2,
            group_bonus_places: 3,
        }
    }
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// One line of the all-time table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaderboardEntry {
    pub rank: usize,
    pub name: String,
    pub total_points: u32,
    pub tournaments_played: u32,
    pub wins: u32,
    pub draws: u32,
    pub losses: u32,
    pub goals_difference: i64,
}
