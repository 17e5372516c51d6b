//! # Matchday
//!
//! Tournament core for small football (and video game football) leagues:
//! a round-robin group stage, an optional single-elimination playoff, and
//! career statistics for every participant across completed tournaments.
//!
//! ## Core Modules
//!
//! - [`tournament`]: data model, standings and playoff engines, lifecycle
//!   state machine and the [`TournamentManager`] façade
//! - [`participant`]: career records, ranking points and the stats aggregator
//! - [`access`]: authorization of mutating operations
//! - [`db`]: storage traits with PostgreSQL and in-memory implementations
//!
//! ## Example
//!
//! ```
//! use matchday::tournament::{Match, MatchResult, StandingsEngine};
//! use std::collections::BTreeSet;
//!
//! let teams: BTreeSet<String> = ["Ajax", "Inter"].iter().map(|t| t.to_string()).collect();
//! let matches = vec![Match::from_result(&MatchResult::new("Ajax", "Inter", 2, 1))];
//! let table = StandingsEngine::compute(&matches, &teams).unwrap();
//! assert_eq!(table[0].team, "Ajax");
//! assert_eq!(table[0].points, 3);
//! ```

/// Authorization of mutating operations.
pub mod access;

/// Storage traits and implementations.
pub mod db;

/// Participant careers and ranking points.
pub mod participant;

/// Tournament model, engines and lifecycle.
pub mod tournament;

pub use access::{AccessControl, Action, ActorId, AdminRegistry};
pub use participant::{Participant, ParticipantStatsAggregator, PointsTable};
pub use tournament::{
    MatchResult, Stage, Tournament, TournamentConfig, TournamentError, TournamentManager,
    TournamentResult,
};
