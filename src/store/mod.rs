//! Shared server-side stores

pub mod leaderboard;

pub use leaderboard::{LeaderboardEntry, ServerStore};
