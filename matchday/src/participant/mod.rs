//! Participant careers.
//!
//! A participant's career is a cached projection of the completed
//! tournaments they played in. It is only ever changed by
//! [`ParticipantStatsAggregator`], never edited by hand.

pub mod aggregator;
pub mod models;

pub use aggregator::ParticipantStatsAggregator;
pub use models::{CareerStats, LeaderboardEntry, Participant, Place, PointsTable, TournamentStat};
