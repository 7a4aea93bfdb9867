//! Session store and authoritative tick loop
//!
//! One task owns every [`Session`]. Socket handlers feed it [`WorldEvent`]s;
//! the broadcast tick, keepalive sweep, idle reaper and respawn timers all
//! run on the same `select!` loop, so no state is shared across tasks.
//! Inbound updates are applied as they arrive, not at tick boundaries.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::util::time::{interval_for_rate, unix_millis};
use crate::ws::protocol::{AnimationState, ClientMsg, PlayerSnapshot, ServerMsg, SessionId};

use super::combat::{CombatSystem, HitClaim, HitOutcome, HitRejected};
use super::session::{validate_shot, Outbound, PlayerState, ReportedState, Session};
use super::snapshot::{SnapshotBuilder, SnapshotStats};
use super::spawn::SpawnPlanner;

/// Why a session ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisconnectReason {
    /// Clean close from either side
    Closed,
    /// Socket error
    TransportError(String),
    /// No inbound activity for the hard timeout
    IdleTimeout,
}

/// Input to the world task
#[derive(Debug)]
pub enum WorldEvent {
    Connected {
        session_id: SessionId,
        outbound: mpsc::UnboundedSender<Outbound>,
    },
    Message {
        session_id: SessionId,
        msg: ClientMsg,
    },
    /// Inbound traffic that carries no game message (pongs, dropped frames)
    Activity { session_id: SessionId },
    Disconnected {
        session_id: SessionId,
        reason: DisconnectReason,
    },
}

/// The world task has stopped
#[derive(Debug, thiserror::Error)]
#[error("world task is not running")]
pub struct WorldClosed;

/// Cloneable handle used by socket handlers
#[derive(Clone)]
pub struct WorldHandle {
    event_tx: mpsc::Sender<WorldEvent>,
    next_session_id: Arc<AtomicU32>,
    session_count: Arc<AtomicUsize>,
}

impl WorldHandle {
    /// Monotonically increasing session id
    pub fn allocate_session_id(&self) -> SessionId {
        self.next_session_id.fetch_add(1, Ordering::Relaxed)
    }

    pub async fn send(&self, event: WorldEvent) -> Result<(), WorldClosed> {
        self.event_tx.send(event).await.map_err(|_| WorldClosed)
    }

    pub fn session_count(&self) -> usize {
        self.session_count.load(Ordering::Relaxed)
    }
}

/// The authoritative session store
pub struct World {
    config: Arc<Config>,
    sessions: HashMap<SessionId, Session>,
    spawner: SpawnPlanner,
    snapshots: SnapshotBuilder,
    stats: SnapshotStats,
    session_count: Arc<AtomicUsize>,
    event_rx: mpsc::Receiver<WorldEvent>,
}

impl World {
    pub fn new(config: Arc<Config>) -> (Self, WorldHandle) {
        let (event_tx, event_rx) = mpsc::channel(1024);
        let session_count = Arc::new(AtomicUsize::new(0));

        let handle = WorldHandle {
            event_tx,
            next_session_id: Arc::new(AtomicU32::new(1)),
            session_count: session_count.clone(),
        };

        let spawner =
            SpawnPlanner::from_optional_seed(config.spawn_seed, config.spawn_radius, config.spawn_height);

        let world = Self {
            config,
            sessions: HashMap::new(),
            spawner,
            snapshots: SnapshotBuilder::new(),
            stats: SnapshotStats::default(),
            session_count,
            event_rx,
        };

        (world, handle)
    }

    /// Run the event loop until every handle is dropped
    pub async fn run(mut self) {
        let mut tick = interval(interval_for_rate(self.config.tick_rate_hz));
        tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut keepalive = interval(self.config.ping_interval);
        keepalive.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut reaper = interval(self.config.idle_check_interval);
        reaper.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!(tick_rate_hz = self.config.tick_rate_hz, "World loop started");

        loop {
            let respawn_deadline = self.next_respawn_deadline();

            tokio::select! {
                _ = tick.tick() => self.broadcast_world_state(),
                _ = keepalive.tick() => self.ping_quiet_sessions(Instant::now()),
                _ = reaper.tick() => self.reap_idle_sessions(Instant::now()),
                _ = sleep_until_opt(respawn_deadline) => self.run_due_respawns(Instant::now()),
                event = self.event_rx.recv() => match event {
                    Some(event) => self.handle_event(event, Instant::now()),
                    None => break,
                },
            }
        }

        info!(
            snapshots = self.stats.total_snapshots,
            bytes = self.stats.total_bytes,
            "World loop stopped"
        );
    }

    pub fn handle_event(&mut self, event: WorldEvent, now: Instant) {
        match event {
            WorldEvent::Connected {
                session_id,
                outbound,
            } => self.on_connect(session_id, outbound, now),
            WorldEvent::Message { session_id, msg } => self.on_message(session_id, msg, now),
            WorldEvent::Activity { session_id } => {
                if let Some(session) = self.sessions.get_mut(&session_id) {
                    session.touch(now);
                }
            }
            WorldEvent::Disconnected { session_id, reason } => {
                self.remove_session(session_id, reason);
            }
        }
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    pub fn player(&self, id: SessionId) -> Option<&PlayerState> {
        self.sessions.get(&id).map(|s| &s.state)
    }

    pub fn snapshot_stats(&self) -> SnapshotStats {
        self.stats
    }

    /// Accept a new session
    fn on_connect(&mut self, id: SessionId, outbound: mpsc::UnboundedSender<Outbound>, now: Instant) {
        if self.sessions.contains_key(&id) {
            warn!(session_id = id, "Duplicate session id, ignoring connect");
            return;
        }

        let state = PlayerState::spawned(id, self.spawner.next_position(), self.config.max_health);
        let snapshot = state.snapshot();

        let mut others: Vec<PlayerSnapshot> =
            self.sessions.values().map(|s| s.state.snapshot()).collect();
        others.sort_unstable_by_key(|p| p.id);

        self.sessions.insert(id, Session::new(state, outbound, now));
        self.session_count.store(self.sessions.len(), Ordering::Relaxed);

        self.send_to(
            id,
            &ServerMsg::Init {
                id,
                state: snapshot,
                players: others,
            },
        );
        self.broadcast(&ServerMsg::PlayerJoined { player: snapshot }, Some(id));

        info!(
            session_id = id,
            session_count = self.sessions.len(),
            "Session accepted"
        );
    }

    fn on_message(&mut self, id: SessionId, msg: ClientMsg, now: Instant) {
        let Some(session) = self.sessions.get_mut(&id) else {
            debug!(session_id = id, "Message for unknown session");
            return;
        };
        session.touch(now);

        match msg {
            ClientMsg::PlayerUpdate {
                position,
                rotation,
                animation,
                health,
            } => {
                let report = ReportedState {
                    position,
                    rotation,
                    animation,
                    health,
                };
                let defeated = session.awaiting_respawn();
                if let Err(e) = session.state.apply_update(&report, defeated) {
                    warn!(session_id = id, error = %e, "Rejected player update");
                }
            }
            ClientMsg::Shoot {
                position,
                direction,
            } => {
                if session.awaiting_respawn() {
                    debug!(session_id = id, "Shot from defeated player dropped");
                    return;
                }
                match validate_shot(position, direction) {
                    Ok(direction) => self.broadcast(
                        &ServerMsg::PlayerShoot {
                            shooter_id: id,
                            position,
                            direction,
                        },
                        Some(id),
                    ),
                    Err(e) => warn!(session_id = id, error = %e, "Rejected shot"),
                }
            }
            ClientMsg::PlayerHit {
                target_id,
                damage,
                hit_zone,
            } => {
                let claim = HitClaim {
                    shooter_id: id,
                    target_id,
                    damage,
                    hit_zone,
                };
                match self.resolve_hit(&claim, now) {
                    Ok(outcome) => self.announce_hit(&outcome),
                    Err(e) => debug!(session_id = id, error = %e, "Hit claim dropped"),
                }
            }
            ClientMsg::Ping => self.send_to(id, &ServerMsg::Pong),
            ClientMsg::Pong => {}
        }
    }

    /// Apply a client-reported hit to the target's authoritative state
    pub fn resolve_hit(&mut self, claim: &HitClaim, now: Instant) -> Result<HitOutcome, HitRejected> {
        CombatSystem::check_claim(claim)?;

        if !self.sessions.contains_key(&claim.shooter_id) {
            return Err(HitRejected::UnknownShooter(claim.shooter_id));
        }
        let respawn_delay = self.config.respawn_delay;
        let target = self
            .sessions
            .get_mut(&claim.target_id)
            .ok_or(HitRejected::UnknownTarget(claim.target_id))?;

        if target.awaiting_respawn() || target.state.is_defeated() {
            return Err(HitRejected::TargetDefeated(claim.target_id));
        }

        let (health, defeated) = CombatSystem::apply_damage(target.state.health, claim.damage);
        target.state.health = health;

        if defeated {
            target.state.animation = AnimationState::Dead;
            target.respawn_at = Some(now + respawn_delay);
        }

        Ok(HitOutcome {
            shooter_id: claim.shooter_id,
            target_id: claim.target_id,
            damage: claim.damage,
            hit_zone: claim.hit_zone,
            health,
            defeated,
        })
    }

    fn announce_hit(&mut self, outcome: &HitOutcome) {
        self.send_to(
            outcome.target_id,
            &ServerMsg::PlayerDamaged {
                source_id: outcome.shooter_id,
                damage: outcome.damage,
                hit_zone: outcome.hit_zone,
                health: outcome.health,
            },
        );
        self.send_to(
            outcome.shooter_id,
            &ServerMsg::HitConfirmed {
                target_id: outcome.target_id,
                health: outcome.health,
            },
        );
        self.broadcast(
            &ServerMsg::HealthUpdate {
                player_id: outcome.target_id,
                health: outcome.health,
            },
            None,
        );

        if outcome.defeated {
            self.broadcast(
                &ServerMsg::PlayerDefeated {
                    player_id: outcome.target_id,
                    killer_id: outcome.shooter_id,
                },
                None,
            );
            info!(
                victim_id = outcome.target_id,
                killer_id = outcome.shooter_id,
                respawn_in_ms = self.config.respawn_delay.as_millis() as u64,
                "Player defeated"
            );
        }
    }

    pub fn next_respawn_deadline(&self) -> Option<Instant> {
        self.sessions.values().filter_map(|s| s.respawn_at).min()
    }

    /// Respawn every session whose timer has elapsed
    pub fn run_due_respawns(&mut self, now: Instant) {
        let due: Vec<SessionId> = self
            .sessions
            .values()
            .filter(|s| s.respawn_at.is_some_and(|at| at <= now))
            .map(|s| s.id())
            .collect();

        for id in due {
            // The session may have gone away since the deadline was computed.
            let Some(session) = self.sessions.get_mut(&id) else {
                continue;
            };
            let position = self.spawner.next_position();

            session.respawn_at = None;
            let max_health = session.state.max_health;
            session.state = PlayerState::spawned(id, position, max_health);
            let snapshot = session.state.snapshot();

            self.send_to(id, &ServerMsg::Respawn { state: snapshot });
            self.broadcast(&ServerMsg::PlayerRespawned { player: snapshot }, Some(id));

            info!(session_id = id, "Player respawned");
        }
    }

    /// Gather every session into one worldState and send it to all of them
    pub fn broadcast_world_state(&mut self) {
        if self.sessions.is_empty() {
            return;
        }

        let msg = self.snapshots.build(unix_millis(), &self.sessions);
        let Some(text) = encode(&msg) else {
            return;
        };
        self.stats.record(self.sessions.len(), text.len());

        for session in self.sessions.values() {
            session.send(Outbound::Text(text.clone()));
        }
    }

    /// Send a keepalive ping to sessions that have gone quiet
    pub fn ping_quiet_sessions(&mut self, now: Instant) {
        let quiet_after = self.config.idle_ping_after;
        let repeat_after = self.config.ping_interval;

        for session in self.sessions.values_mut() {
            if now.duration_since(session.last_activity) < quiet_after {
                continue;
            }
            let recently_pinged = session
                .last_ping
                .is_some_and(|at| now.duration_since(at) < repeat_after);
            if recently_pinged {
                continue;
            }
            debug!(session_id = session.id(), "Pinging quiet session");
            session.send(Outbound::Ping);
            session.last_ping = Some(now);
        }
    }

    /// Close sessions with no inbound activity for the hard timeout
    pub fn reap_idle_sessions(&mut self, now: Instant) {
        let timeout = self.config.idle_timeout;
        let idle: Vec<SessionId> = self
            .sessions
            .values()
            .filter(|s| now.duration_since(s.last_activity) >= timeout)
            .map(|s| s.id())
            .collect();

        for id in idle {
            if let Some(session) = self.sessions.get(&id) {
                warn!(session_id = id, "Closing idle session");
                session.send(Outbound::Close);
            }
            self.remove_session(id, DisconnectReason::IdleTimeout);
        }
    }

    /// Single exit path for sessions; returns whether the session existed.
    pub fn remove_session(&mut self, id: SessionId, reason: DisconnectReason) -> bool {
        if self.sessions.remove(&id).is_none() {
            return false;
        }
        self.session_count.store(self.sessions.len(), Ordering::Relaxed);

        self.broadcast(&ServerMsg::PlayerLeft { id }, None);

        info!(
            session_id = id,
            reason = ?reason,
            session_count = self.sessions.len(),
            "Session closed"
        );
        true
    }

    fn send_to(&self, id: SessionId, msg: &ServerMsg) {
        if let (Some(session), Some(text)) = (self.sessions.get(&id), encode(msg)) {
            session.send(Outbound::Text(text));
        }
    }

    fn broadcast(&self, msg: &ServerMsg, except: Option<SessionId>) {
        let Some(text) = encode(msg) else {
            return;
        };
        for session in self.sessions.values() {
            if Some(session.id()) != except {
                session.send(Outbound::Text(text.clone()));
            }
        }
    }
}

fn encode(msg: &ServerMsg) -> Option<Arc<str>> {
    match msg.encode() {
        Ok(text) => Some(Arc::from(text)),
        Err(e) => {
            warn!(error = %e, "Failed to serialize server message");
            None
        }
    }
}

async fn sleep_until_opt(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn world() -> World {
        let config = Config {
            spawn_seed: Some(1),
            ..Config::default()
        };
        World::new(Arc::new(config)).0
    }

    fn connect(world: &mut World, id: SessionId, now: Instant) -> mpsc::UnboundedReceiver<Outbound> {
        let (tx, rx) = mpsc::unbounded_channel();
        world.handle_event(
            WorldEvent::Connected {
                session_id: id,
                outbound: tx,
            },
            now,
        );
        rx
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<Outbound>) -> Vec<Outbound> {
        let mut out = Vec::new();
        while let Ok(frame) = rx.try_recv() {
            out.push(frame);
        }
        out
    }

    #[test]
    fn handle_allocates_increasing_ids() {
        let (_world, handle) = World::new(Arc::new(Config::default()));
        let a = handle.allocate_session_id();
        let b = handle.allocate_session_id();
        assert!(b > a);
    }

    #[test]
    fn session_count_tracks_store() {
        let mut world = world();
        let now = Instant::now();
        let _a = connect(&mut world, 1, now);
        let _b = connect(&mut world, 2, now);
        assert_eq!(world.session_count(), 2);
        assert_eq!(world.session_count.load(Ordering::Relaxed), 2);

        assert!(world.remove_session(1, DisconnectReason::Closed));
        assert!(!world.remove_session(1, DisconnectReason::Closed));
        assert_eq!(world.session_count(), 1);
    }

    #[test]
    fn quiet_session_is_pinged_once_per_interval() {
        let mut world = world();
        let start = Instant::now();
        let mut rx = connect(&mut world, 1, start);
        drain(&mut rx);

        world.ping_quiet_sessions(start + Duration::from_secs(5));
        assert!(drain(&mut rx).is_empty());

        world.ping_quiet_sessions(start + Duration::from_secs(11));
        let frames = drain(&mut rx);
        assert_eq!(frames.len(), 1);
        assert!(matches!(frames[0], Outbound::Ping));

        world.ping_quiet_sessions(start + Duration::from_secs(12));
        assert!(drain(&mut rx).is_empty());

        world.ping_quiet_sessions(start + Duration::from_secs(17));
        assert_eq!(drain(&mut rx).len(), 1);
    }

    #[test]
    fn activity_resets_idle_clock() {
        let mut world = world();
        let start = Instant::now();
        let _rx = connect(&mut world, 1, start);

        world.handle_event(
            WorldEvent::Activity { session_id: 1 },
            start + Duration::from_secs(20),
        );
        world.reap_idle_sessions(start + Duration::from_secs(31));
        assert_eq!(world.session_count(), 1);

        world.reap_idle_sessions(start + Duration::from_secs(51));
        assert_eq!(world.session_count(), 0);
    }

    #[test]
    fn broadcast_records_stats_and_skips_empty_world() {
        let mut world = world();
        world.broadcast_world_state();
        assert_eq!(world.snapshot_stats().total_snapshots, 0);

        let mut rx = connect(&mut world, 1, Instant::now());
        drain(&mut rx);
        world.broadcast_world_state();

        let stats = world.snapshot_stats();
        assert_eq!(stats.total_snapshots, 1);
        assert!(stats.total_bytes > 0);
        assert_eq!(drain(&mut rx).len(), 1);
    }

    #[test]
    fn respawn_positions_follow_the_seeded_sequence() {
        let mut world = world();
        let config = Config::default();
        let mut expected = SpawnPlanner::new(1, config.spawn_radius, config.spawn_height);

        let now = Instant::now();
        let _a = connect(&mut world, 1, now);
        let _b = connect(&mut world, 2, now);
        let _c = connect(&mut world, 3, now);
        for id in 1..=3 {
            assert_eq!(world.player(id).unwrap().position, expected.next_position());
        }

        for target_id in [2, 3] {
            let claim = HitClaim {
                shooter_id: 1,
                target_id,
                damage: 100.0,
                hit_zone: crate::ws::protocol::HitZone::Body,
            };
            assert!(world.resolve_hit(&claim, now).unwrap().defeated);
        }
        world.remove_session(3, DisconnectReason::Closed);

        world.run_due_respawns(now + config.respawn_delay);
        assert_eq!(world.player(2).unwrap().position, expected.next_position());
        assert_eq!(world.player(2).unwrap().health, config.max_health);
    }

    #[test]
    fn no_respawn_deadline_without_defeat() {
        let mut world = world();
        let _rx = connect(&mut world, 1, Instant::now());
        assert_eq!(world.next_respawn_deadline(), None);
    }
}
