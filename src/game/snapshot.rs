//! worldState snapshot building

use std::collections::HashMap;

use crate::ws::protocol::{PlayerSnapshot, ServerMsg, SessionId};

use super::session::Session;

/// Builds the per-tick aggregate snapshot
#[derive(Debug, Default)]
pub struct SnapshotBuilder {
    tick: u64,
}

impl SnapshotBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ticks broadcast so far
    pub fn tick(&self) -> u64 {
        self.tick
    }

    /// Build the next worldState message, ordered by session id
    pub fn build(&mut self, timestamp: u64, sessions: &HashMap<SessionId, Session>) -> ServerMsg {
        self.tick += 1;

        let mut players: Vec<PlayerSnapshot> =
            sessions.values().map(|s| s.state.snapshot()).collect();
        players.sort_unstable_by_key(|p| p.id);

        ServerMsg::WorldState {
            tick: self.tick,
            timestamp,
            players,
        }
    }
}

/// Snapshot traffic counters for the health endpoint and logs
#[derive(Debug, Default, Clone, Copy)]
pub struct SnapshotStats {
    pub total_snapshots: u64,
    pub total_bytes: u64,
    pub avg_players_per_snapshot: f32,
}

impl SnapshotStats {
    pub fn record(&mut self, player_count: usize, bytes: usize) {
        self.total_snapshots += 1;
        self.total_bytes += bytes as u64;

        // Running average
        let n = self.total_snapshots as f32;
        self.avg_players_per_snapshot =
            self.avg_players_per_snapshot * ((n - 1.0) / n) + (player_count as f32 / n);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stats_running_average() {
        let mut stats = SnapshotStats::default();
        stats.record(2, 100);
        stats.record(4, 300);
        assert_eq!(stats.total_snapshots, 2);
        assert_eq!(stats.total_bytes, 400);
        assert!((stats.avg_players_per_snapshot - 3.0).abs() < 1e-5);
    }

    #[test]
    fn tick_counter_increments() {
        let mut builder = SnapshotBuilder::new();
        let sessions = HashMap::new();
        match builder.build(10, &sessions) {
            ServerMsg::WorldState { tick, players, .. } => {
                assert_eq!(tick, 1);
                assert!(players.is_empty());
            }
            other => panic!("unexpected {other:?}"),
        }
        builder.build(11, &sessions);
        assert_eq!(builder.tick(), 2);
    }
}
