//! Tournament data models: matches, standings rows, playoff bracket and the
//! tournament document itself.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{
    collections::{BTreeMap, BTreeSet},
    fmt,
};

use super::errors::{TournamentError, TournamentResult};

/// Tournament ID type
pub type TournamentId = i64;

/// Bracket sizes the playoff supports.
pub const SUPPORTED_BRACKET_SIZES: [usize; 2] = [4, 8];

/// Playoff stage.
///
/// Variants are declared in bracket order, so `Ord` follows progression:
/// `None < QuarterFinals < SemiFinals < Final < Completed`. `None` doubles as
/// the group stage when used to locate a match.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    #[default]
    None,
    QuarterFinals,
    SemiFinals,
    Final,
    Completed,
}

impl Stage {
    /// Stage that follows this one, if any.
    pub fn next(self) -> Option<Stage> {
        match self {
            Stage::None => Some(Stage::QuarterFinals),
            Stage::QuarterFinals => Some(Stage::SemiFinals),
            Stage::SemiFinals => Some(Stage::Final),
            Stage::Final => Some(Stage::Completed),
            Stage::Completed => None,
        }
    }

    /// Whether matches can be played in this stage.
    pub fn is_knockout_round(self) -> bool {
        matches!(
            self,
            Stage::QuarterFinals | Stage::SemiFinals | Stage::Final
        )
    }

    /// First knockout round for a bracket of `size` teams.
    pub fn opening_round(size: usize) -> Option<Stage> {
        match size {
            8 => Some(Stage::QuarterFinals),
            4 => Some(Stage::SemiFinals),
            _ => None,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::None => write!(f, "group stage"),
            Stage::QuarterFinals => write!(f, "quarter-finals"),
            Stage::SemiFinals => write!(f, "semi-finals"),
            Stage::Final => write!(f, "final"),
            Stage::Completed => write!(f, "completed"),
        }
    }
}

/// Lifecycle state, derived from the tournament flags and playoff stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TournamentState {
    /// Participants and teams are being arranged
    Setup,
    /// Group matches are being played
    Active,
    /// Bracket is running
    Playoff,
    /// Final results are in
    Completed,
}

impl fmt::Display for TournamentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TournamentState::Setup => write!(f, "in setup"),
            TournamentState::Active => write!(f, "in the group stage"),
            TournamentState::Playoff => write!(f, "in the playoff"),
            TournamentState::Completed => write!(f, "completed"),
        }
    }
}

/// Outcome of the regular (plus extra time) score of a match.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Team1,
    Team2,
    Draw,
}

/// A result as submitted by the caller, before it is stored as a [`Match`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchResult {
    pub team1: String,
    pub team2: String,
    pub score1: i32,
    pub score2: i32,
    pub extra_time: bool,
    /// Goals scored during extra time, included in `score1`/`score2`
    pub extra_score: Option<(i32, i32)>,
    /// Shoot-out score, present only when the match went to penalties
    pub penalty_score: Option<(i32, i32)>,
    pub date: DateTime<Utc>,
}

impl MatchResult {
    /// Create a result played in regular time
    pub fn new(team1: impl Into<String>, team2: impl Into<String>, score1: i32, score2: i32) -> Self {
        Self {
            team1: team1.into(),
            team2: team2.into(),
            score1,
            score2,
            extra_time: false,
            extra_score: None,
            penalty_score: None,
            date: Utc::now(),
        }
    }

    /// Mark the match as decided after extra time
    pub fn after_extra_time(mut self, extra1: i32, extra2: i32) -> Self {
        self.extra_time = true;
        self.extra_score = Some((extra1, extra2));
        self
    }

    /// Record a penalty shoot-out
    pub fn with_penalties(mut self, penalties1: i32, penalties2: i32) -> Self {
        self.penalty_score = Some((penalties1, penalties2));
        self
    }

    /// Set the match date
    pub fn on(mut self, date: DateTime<Utc>) -> Self {
        self.date = date;
        self
    }

    /// The same result seen from `team1`'s side. Swaps sides when `team1`
    /// is listed second.
    pub fn oriented_to(&self, team1: &str) -> MatchResult {
        if self.team1 == team1 {
            return self.clone();
        }
        let swap = |pair: Option<(i32, i32)>| pair.map(|(a, b)| (b, a));
        MatchResult {
            team1: self.team2.clone(),
            team2: self.team1.clone(),
            score1: self.score2,
            score2: self.score1,
            extra_time: self.extra_time,
            extra_score: swap(self.extra_score),
            penalty_score: swap(self.penalty_score),
            date: self.date,
        }
    }
}

/// A group or playoff match.
///
/// Playoff pairings exist before they are played, so scores are optional.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Match {
    pub team1: String,
    pub team2: String,
    pub score1: Option<i32>,
    pub score2: Option<i32>,
    #[serde(default)]
    pub extra_time: bool,
    #[serde(default)]
    pub extra_score1: Option<i32>,
    #[serde(default)]
    pub extra_score2: Option<i32>,
    #[serde(default)]
    pub penalties: bool,
    #[serde(default)]
    pub penalty_score1: Option<i32>,
    #[serde(default)]
    pub penalty_score2: Option<i32>,
    pub date: Option<DateTime<Utc>>,
    /// Already folded into standings / bracket progression
    #[serde(default)]
    pub counted: bool,
}

impl Match {
    /// Create an unplayed pairing
    pub fn pairing(team1: impl Into<String>, team2: impl Into<String>) -> Self {
        Self {
            team1: team1.into(),
            team2: team2.into(),
            score1: None,
            score2: None,
            extra_time: false,
            extra_score1: None,
            extra_score2: None,
            penalties: false,
            penalty_score1: None,
            penalty_score2: None,
            date: None,
            counted: false,
        }
    }

    /// Create a counted match from a submitted result
    pub fn from_result(result: &MatchResult) -> Self {
        let mut m = Self::pairing(result.team1.clone(), result.team2.clone());
        m.record(result);
        m
    }

    /// Store `result` (already oriented to this pairing) and mark the match counted.
    pub fn record(&mut self, result: &MatchResult) {
        self.score1 = Some(result.score1);
        self.score2 = Some(result.score2);
        self.extra_time = result.extra_time;
        self.extra_score1 = result.extra_score.map(|(a, _)| a);
        self.extra_score2 = result.extra_score.map(|(_, b)| b);
        self.penalties = result.penalty_score.is_some();
        self.penalty_score1 = result.penalty_score.map(|(a, _)| a);
        self.penalty_score2 = result.penalty_score.map(|(_, b)| b);
        self.date = Some(result.date);
        self.counted = true;
    }

    /// Drop the recorded result, keeping the pairing.
    pub fn clear_result(&mut self) {
        *self = Self::pairing(std::mem::take(&mut self.team1), std::mem::take(&mut self.team2));
    }

    pub fn is_played(&self) -> bool {
        self.score1.is_some() && self.score2.is_some()
    }

    /// Same two teams, in either order.
    pub fn is_pairing(&self, a: &str, b: &str) -> bool {
        (self.team1 == a && self.team2 == b) || (self.team1 == b && self.team2 == a)
    }

    /// Outcome on the scoreboard, ignoring penalties.
    pub fn outcome(&self) -> Option<Outcome> {
        let (s1, s2) = (self.score1?, self.score2?);
        Some(match s1.cmp(&s2) {
            std::cmp::Ordering::Greater => Outcome::Team1,
            std::cmp::Ordering::Less => Outcome::Team2,
            std::cmp::Ordering::Equal => Outcome::Draw,
        })
    }

    /// Team that goes through: score winner, else shoot-out winner.
    pub fn winner(&self) -> Option<&str> {
        match self.outcome()? {
            Outcome::Team1 => Some(&self.team1),
            Outcome::Team2 => Some(&self.team2),
            Outcome::Draw if self.penalties => {
                let (p1, p2) = (self.penalty_score1?, self.penalty_score2?);
                match p1.cmp(&p2) {
                    std::cmp::Ordering::Greater => Some(&self.team1),
                    std::cmp::Ordering::Less => Some(&self.team2),
                    std::cmp::Ordering::Equal => None,
                }
            }
            Outcome::Draw => None,
        }
    }

    pub fn loser(&self) -> Option<&str> {
        let winner = self.winner()?;
        Some(if winner == self.team1 {
            &self.team2
        } else {
            &self.team1
        })
    }

    pub fn is_decisive(&self) -> bool {
        self.winner().is_some()
    }

    /// `(scored, conceded)` for `team`, if it played in this match.
    pub fn goals_for(&self, team: &str) -> Option<(i32, i32)> {
        let (s1, s2) = (self.score1?, self.score2?);
        if self.team1 == team {
            Some((s1, s2))
        } else if self.team2 == team {
            Some((s2, s1))
        } else {
            None
        }
    }

    /// Shape checks that do not depend on the tournament.
    pub fn check(&self) -> Result<(), String> {
        if self.team1.is_empty() || self.team2.is_empty() {
            return Err("team name is empty".to_string());
        }
        if self.team1 == self.team2 {
            return Err(format!("{} cannot play itself", self.team1));
        }
        let negative = [
            self.score1,
            self.score2,
            self.extra_score1,
            self.extra_score2,
            self.penalty_score1,
            self.penalty_score2,
        ]
        .into_iter()
        .flatten()
        .any(|s| s < 0);
        if negative {
            return Err("scores cannot be negative".to_string());
        }
        if self.penalties && self.outcome() != Some(Outcome::Draw) {
            return Err("penalties are only taken after a draw".to_string());
        }
        Ok(())
    }
}

/// One row of the group table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StandingsRow {
    pub team: String,
    pub played: u32,
    pub won: u32,
    pub drawn: u32,
    pub lost: u32,
    pub goals_for: i32,
    pub goals_against: i32,
    pub goals_difference: i32,
    pub points: u32,
}

impl StandingsRow {
    /// Empty row for a team that has not played yet
    pub fn new(team: impl Into<String>) -> Self {
        Self {
            team: team.into(),
            played: 0,
            won: 0,
            drawn: 0,
            lost: 0,
            goals_for: 0,
            goals_against: 0,
            goals_difference: 0,
            points: 0,
        }
    }

    /// Add one match from this team's perspective. Fails, leaving the row
    /// untouched, when a goal tally would overflow.
    pub fn record(&mut self, scored: i32, conceded: i32) -> Result<(), String> {
        let overflow = || format!("goal tally of {} overflows", self.team);
        let goals_for = self.goals_for.checked_add(scored).ok_or_else(overflow)?;
        let goals_against = self.goals_against.checked_add(conceded).ok_or_else(overflow)?;
        let goals_difference = goals_for.checked_sub(goals_against).ok_or_else(overflow)?;

        self.played += 1;
        self.goals_for = goals_for;
        self.goals_against = goals_against;
        self.goals_difference = goals_difference;
        match scored.cmp(&conceded) {
            std::cmp::Ordering::Greater => self.won += 1,
            std::cmp::Ordering::Less => self.lost += 1,
            std::cmp::Ordering::Equal => self.drawn += 1,
        }
        self.points = 3 * self.won + self.drawn;
        Ok(())
    }
}

/// Single-elimination bracket
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Playoff {
    pub current_stage: Stage,
    /// Number of teams seeded into the bracket (0 until seeded)
    #[serde(default)]
    pub bracket_size: usize,
    #[serde(default)]
    pub quarter_finals: Vec<Match>,
    #[serde(default)]
    pub semi_finals: Vec<Match>,
    #[serde(rename = "final", default)]
    pub final_match: Option<Match>,
    #[serde(default)]
    pub winner: Option<String>,
}

impl Playoff {
    /// Matches of a knockout round (empty for `None`/`Completed`).
    pub fn matches(&self, stage: Stage) -> &[Match] {
        match stage {
            Stage::QuarterFinals => &self.quarter_finals,
            Stage::SemiFinals => &self.semi_finals,
            Stage::Final => self.final_match.as_slice(),
            Stage::None | Stage::Completed => &[],
        }
    }

    pub fn matches_mut(&mut self, stage: Stage) -> &mut [Match] {
        match stage {
            Stage::QuarterFinals => &mut self.quarter_finals,
            Stage::SemiFinals => &mut self.semi_finals,
            Stage::Final => self.final_match.as_mut_slice(),
            Stage::None | Stage::Completed => &mut [],
        }
    }

    /// All playoff matches in bracket order.
    pub fn all_matches(&self) -> impl Iterator<Item = &Match> {
        self.quarter_finals
            .iter()
            .chain(self.semi_finals.iter())
            .chain(self.final_match.iter())
    }

    /// Whether `stage` is played in this bracket (quarter-finals are skipped
    /// for four teams).
    pub fn includes(&self, stage: Stage) -> bool {
        match Stage::opening_round(self.bracket_size) {
            Some(first) => stage.is_knockout_round() && stage >= first,
            None => false,
        }
    }

    pub fn is_seeded(&self) -> bool {
        self.current_stage != Stage::None
    }
}

/// Named pool of teams a tournament draws from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeamCategory {
    pub name: String,
    pub teams: Vec<String>,
}

impl TeamCategory {
    /// Create a category, rejecting empty names and duplicate teams
    pub fn new(name: impl Into<String>, teams: Vec<String>) -> TournamentResult<Self> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(TournamentError::Validation(
                "team category name is empty".to_string(),
            ));
        }
        let mut seen = BTreeSet::new();
        for team in &teams {
            if team.trim().is_empty() {
                return Err(TournamentError::Validation(format!(
                    "category {name} contains an empty team name"
                )));
            }
            if !seen.insert(team.as_str()) {
                return Err(TournamentError::Validation(format!(
                    "category {name} lists {team} twice"
                )));
            }
        }
        Ok(Self { name, teams })
    }

    pub fn contains(&self, team: &str) -> bool {
        self.teams.iter().any(|t| t == team)
    }
}

/// Tournament configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TournamentConfig {
    /// Tournament name
    pub name: String,
    /// Minimum participants required to finish setup
    pub min_participants: usize,
    /// Maximum participants allowed
    pub max_participants: usize,
    /// Teams seeded into the playoff; `None` ends the tournament after the group stage
    pub playoff_size: Option<usize>,
}

impl TournamentConfig {
    /// Standard evening format: 5-6 participants, top four go to the playoff
    pub fn standard(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            min_participants: 5,
            max_participants: 6,
            playoff_size: Some(4),
        }
    }

    /// Round robin only, the group table decides the winner
    pub fn league(name: impl Into<String>, min_participants: usize, max_participants: usize) -> Self {
        Self {
            name: name.into(),
            min_participants,
            max_participants,
            playoff_size: None,
        }
    }

    pub fn with_playoff(mut self, size: usize) -> Self {
        self.playoff_size = Some(size);
        self
    }

    /// Check bounds before a tournament is created
    pub fn validate(&self) -> TournamentResult<()> {
        if self.name.trim().is_empty() {
            return Err(TournamentError::Validation(
                "tournament name is empty".to_string(),
            ));
        }
        if self.min_participants < 2 {
            return Err(TournamentError::Validation(format!(
                "min_participants must be at least 2, got {}",
                self.min_participants
            )));
        }
        if self.max_participants < self.min_participants {
            return Err(TournamentError::Validation(format!(
                "max_participants ({}) is below min_participants ({})",
                self.max_participants, self.min_participants
            )));
        }
        if let Some(size) = self.playoff_size {
            if !SUPPORTED_BRACKET_SIZES.contains(&size) || size > self.max_participants {
                return Err(TournamentError::InvalidBracketSize {
                    size,
                    teams: self.max_participants,
                });
            }
        }
        Ok(())
    }

    /// Default name for the `ordinal`-th tournament created on `date`
    pub fn dated_name(date: DateTime<Utc>, ordinal: u32) -> String {
        format!("{} Tournament #{}", date.format("%Y-%m-%d"), ordinal)
    }
}

/// Tournament document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tournament {
    pub id: TournamentId,
    pub name: String,
    pub participants: Vec<String>,
    pub min_participants: usize,
    pub max_participants: usize,
    #[serde(default)]
    pub playoff_size: Option<usize>,
    #[serde(default)]
    pub team_category: Option<String>,
    /// participant -> team
    #[serde(default)]
    pub participant_teams: BTreeMap<String, String>,
    #[serde(default)]
    pub matches: Vec<Match>,
    #[serde(default)]
    pub standings: Vec<StandingsRow>,
    #[serde(default)]
    pub playoff: Playoff,
    pub is_active: bool,
    pub setup_completed: bool,
    pub is_completed: bool,
    pub created_at: DateTime<Utc>,
    /// Optimistic concurrency token, bumped by the store on every save
    #[serde(default)]
    pub version: i64,
}

impl Tournament {
    /// Create an empty tournament in setup
    pub fn new(id: TournamentId, config: TournamentConfig, created_at: DateTime<Utc>) -> Self {
        Self {
            id,
            name: config.name,
            participants: Vec::new(),
            min_participants: config.min_participants,
            max_participants: config.max_participants,
            playoff_size: config.playoff_size,
            team_category: None,
            participant_teams: BTreeMap::new(),
            matches: Vec::new(),
            standings: Vec::new(),
            playoff: Playoff::default(),
            is_active: false,
            setup_completed: false,
            is_completed: false,
            created_at,
            version: 0,
        }
    }

    pub fn state(&self) -> TournamentState {
        if self.is_completed {
            TournamentState::Completed
        } else if self.playoff.is_seeded() {
            TournamentState::Playoff
        } else if self.setup_completed {
            TournamentState::Active
        } else {
            TournamentState::Setup
        }
    }

    pub fn has_participant(&self, name: &str) -> bool {
        self.participants.iter().any(|p| p == name)
    }

    /// Teams assigned to participants
    pub fn teams(&self) -> BTreeSet<String> {
        self.participant_teams.values().cloned().collect()
    }

    pub fn team_of(&self, participant: &str) -> Option<&str> {
        self.participant_teams.get(participant).map(String::as_str)
    }

    pub fn participant_of(&self, team: &str) -> Option<&str> {
        self.participant_teams
            .iter()
            .find(|(_, t)| t.as_str() == team)
            .map(|(p, _)| p.as_str())
    }

    /// 1-based rank of `team` in the current standings
    pub fn group_rank(&self, team: &str) -> Option<usize> {
        self.standings
            .iter()
            .position(|row| row.team == team)
            .map(|i| i + 1)
    }
}
