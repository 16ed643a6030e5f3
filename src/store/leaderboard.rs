//! Process-wide race leaderboard and server counters

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use tracing::info;

/// Most entries kept on the board
pub const LEADERBOARD_CAPACITY: usize = 100;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LeaderboardEntry {
    pub id: String,
    pub nickname: String,
    /// Race time in seconds
    pub time: f64,
    pub recorded_at: DateTime<Utc>,
}

/// Shared state outliving any single lobby. Injected into the game task and HTTP routes.
#[derive(Debug, Default)]
pub struct ServerStore {
    leaderboard: RwLock<Vec<LeaderboardEntry>>,
    clients_seen: AtomicU64,
}

impl ServerStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a race time. Only the best time per id survives; the board stays sorted
    /// ascending. Returns true when the time became the id's best.
    pub fn record_time(&self, id: &str, nickname: &str, time: f64) -> bool {
        if !time.is_finite() || time < 0.0 {
            return false;
        }
        let mut board = self.leaderboard.write();
        if let Some(pos) = board.iter().position(|e| e.id == id) {
            if board[pos].time <= time {
                return false;
            }
            board.remove(pos);
        }

        let entry = LeaderboardEntry {
            id: id.to_string(),
            nickname: nickname.to_string(),
            time,
            recorded_at: Utc::now(),
        };
        let at = board.partition_point(|e| e.time <= time);
        board.insert(at, entry);
        board.truncate(LEADERBOARD_CAPACITY);
        info!(player = %id, time, rank = at + 1, "Leaderboard updated");
        true
    }

    pub fn leaderboard(&self) -> Vec<LeaderboardEntry> {
        self.leaderboard.read().clone()
    }

    pub fn best_time(&self, id: &str) -> Option<f64> {
        self.leaderboard.read().iter().find(|e| e.id == id).map(|e| e.time)
    }

    pub fn client_connected(&self) -> u64 {
        self.clients_seen.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn clients_seen(&self) -> u64 {
        self.clients_seen.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn times(store: &ServerStore) -> Vec<f64> {
        store.leaderboard().iter().map(|e| e.time).collect()
    }

    #[test]
    fn keeps_only_best_time_per_player() {
        let store = ServerStore::new();
        assert!(store.record_time("a", "alice", 42.0));
        assert!(!store.record_time("a", "alice", 50.0));
        assert_eq!(times(&store), vec![42.0]);

        assert!(store.record_time("a", "alice", 30.0));
        assert_eq!(times(&store), vec![30.0]);
        assert_eq!(store.best_time("a"), Some(30.0));
    }

    #[test]
    fn stays_sorted_after_each_insert() {
        let store = ServerStore::new();
        for (i, t) in [55.0, 12.5, 80.0, 33.3, 12.5, 1.0].into_iter().enumerate() {
            store.record_time(&format!("p{i}"), "racer", t);
            let board = times(&store);
            assert!(board.windows(2).all(|w| w[0] <= w[1]), "unsorted: {board:?}");
        }
        assert_eq!(store.leaderboard().len(), 6);
    }

    #[test]
    fn rejects_nonsense_times() {
        let store = ServerStore::new();
        assert!(!store.record_time("a", "alice", f64::NAN));
        assert!(!store.record_time("a", "alice", -1.0));
        assert!(store.leaderboard().is_empty());
    }

    #[test]
    fn counts_clients() {
        let store = ServerStore::new();
        store.client_connected();
        assert_eq!(store.client_connected(), 2);
        assert_eq!(store.clients_seen(), 2);
    }
}
