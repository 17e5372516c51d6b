//! Tournaments: group stage, playoff bracket and lifecycle.
//!
//! - [`StandingsEngine`] rebuilds the group table from counted matches
//! - [`PlayoffEngine`] seeds and advances the single-elimination bracket
//! - [`TournamentLifecycle`] guards the setup -> active -> playoff ->
//!   completed state machine
//! - [`TournamentManager`] wraps the lifecycle with access control,
//!   versioned storage and participant stats
//!
//! ## Example
//!
//! ```no_run
//! use matchday::access::AdminRegistry;
//! use matchday::db::MemoryStore;
//! use matchday::participant::ParticipantStatsAggregator;
//! use matchday::tournament::{TournamentConfig, TournamentManager};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let admin = 1;
//!     let manager = TournamentManager::with_store(
//!         Arc::new(MemoryStore::new()),
//!         Arc::new(AdminRegistry::new([admin])),
//!         ParticipantStatsAggregator::default(),
//!     );
//!
//!     let tournament = manager
//!         .create_tournament(admin, TournamentConfig::standard("Friday Cup"))
//!         .await?;
//!     println!("{} is {}", tournament.name, manager.state(tournament.id).await?);
//!     Ok(())
//! }
//! ```

pub mod errors;
pub mod lifecycle;
pub mod manager;
pub mod models;
pub mod playoff;
pub mod standings;

pub use errors::{TournamentError, TournamentResult};
pub use lifecycle::TournamentLifecycle;
pub use manager::TournamentManager;
pub use models::{
    Match, MatchResult, Outcome, Playoff, SUPPORTED_BRACKET_SIZES, Stage, StandingsRow,
    TeamCategory, Tournament, TournamentConfig, TournamentId, TournamentState,
};
pub use playoff::PlayoffEngine;
pub use standings::{StandingsEngine, compare_rows};
