//! Per-frame client driver
//!
//! One call to [`ClientApp::frame`] runs, in order: drain the inbound queue,
//! integrate the local controller for the scheduler's fixed steps, fire and
//! advance projectiles, send the throttled `playerUpdate`, and interpolate
//! remote players. Nothing here runs concurrently with anything else.

use std::time::{Duration, Instant};

use glam::Vec3;
use tracing::{debug, info};

use super::config::ClientConfig;
use super::connection::ConnectionManager;
use super::remote::RemoteRegistry;
use super::transport::Transport;
use crate::sim::movement::{CollisionResolver, LocalController, MovementConfig, MovementInput};
use crate::sim::projectile::ProjectileSet;
use crate::sim::timestep::{FixedTimestep, TimestepConfig};
use crate::sim::Handle;
use crate::ws::protocol::{AnimationState, ClientMsg, HitZone, ServerMsg, SessionId};

/// Input sampled once per rendered frame
#[derive(Debug, Clone, Copy, Default)]
pub struct FrameInput {
    pub movement: MovementInput,
    pub fire: bool,
}

/// What a frame did, for the presentation layer and tests
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FrameReport {
    pub messages: usize,
    pub steps: u32,
    pub alpha: f32,
    pub fired: bool,
    pub hits_claimed: u32,
    pub update_sent: bool,
}

pub struct ClientApp<T: Transport, R: CollisionResolver> {
    config: ClientConfig,
    connection: ConnectionManager<T>,
    timestep: FixedTimestep,
    controller: LocalController,
    resolver: R,
    remotes: RemoteRegistry,
    projectiles: ProjectileSet,
    health: f32,
    max_health: f32,
    defeated: bool,
    /// Simulation clock in seconds, advanced by fixed steps only
    sim_time: f64,
    /// Look and jump input not yet consumed by a fixed step
    pending: MovementInput,
    last_update_sent: Option<Instant>,
}

impl<T: Transport, R: CollisionResolver> ClientApp<T, R> {
    pub fn new(transport: T, resolver: R, config: ClientConfig) -> Self {
        Self::with_tuning(
            transport,
            resolver,
            config,
            MovementConfig::default(),
            TimestepConfig::default(),
        )
    }

    pub fn with_tuning(
        transport: T,
        resolver: R,
        config: ClientConfig,
        movement: MovementConfig,
        timestep: TimestepConfig,
    ) -> Self {
        let connection = ConnectionManager::new(transport, &config);
        Self {
            config,
            connection,
            timestep: FixedTimestep::new(timestep),
            controller: LocalController::new(movement, Vec3::ZERO),
            resolver,
            remotes: RemoteRegistry::new(),
            projectiles: ProjectileSet::new(),
            health: 0.0,
            max_health: 0.0,
            defeated: false,
            sim_time: 0.0,
            pending: MovementInput::default(),
            last_update_sent: None,
        }
    }

    pub fn connect(&mut self) {
        self.connection.connect();
    }

    pub fn connection(&self) -> &ConnectionManager<T> {
        &self.connection
    }

    pub fn connection_mut(&mut self) -> &mut ConnectionManager<T> {
        &mut self.connection
    }

    pub fn controller(&self) -> &LocalController {
        &self.controller
    }

    pub fn remotes(&self) -> &RemoteRegistry {
        &self.remotes
    }

    pub fn projectiles(&self) -> &ProjectileSet {
        &self.projectiles
    }

    pub fn health(&self) -> f32 {
        self.health
    }

    pub fn max_health(&self) -> f32 {
        self.max_health
    }

    pub fn is_defeated(&self) -> bool {
        self.defeated
    }

    pub fn local_id(&self) -> Option<SessionId> {
        self.connection.local_id()
    }

    /// Run one rendered frame.
    pub fn frame(&mut self, now: Instant, frame_delta: f32, input: &FrameInput) -> FrameReport {
        let mut report = FrameReport::default();

        self.connection.poll(now);
        let inbound: Vec<ServerMsg> = self.connection.drain().collect();
        report.messages = inbound.len();
        for msg in inbound {
            self.apply(msg, now);
        }

        let plan = self.timestep.advance(frame_delta);
        report.steps = plan.steps;
        report.alpha = plan.alpha;
        self.accumulate_input(&input.movement);

        for _ in 0..plan.steps {
            self.sim_time += f64::from(plan.fixed_dt);
            if self.defeated {
                continue;
            }
            let step_input = self.take_step_input(&input.movement);
            self.controller
                .step(&step_input, plan.fixed_dt, self.sim_time, &mut self.resolver);
        }

        if input.fire {
            report.fired = self.fire();
        }

        for _ in 0..plan.steps {
            report.hits_claimed += self.advance_projectiles(plan.fixed_dt);
        }

        report.update_sent = self.send_update(now);
        self.remotes.interpolate(self.config.interpolation_fraction);
        report
    }

    fn apply(&mut self, msg: ServerMsg, now: Instant) {
        let local_id = self.connection.local_id();
        let is_local = |id: SessionId| Some(id) == local_id;

        match msg {
            ServerMsg::Init { id, state, players } => {
                info!(id, "Joined world");
                self.remotes.clear();
                self.projectiles.clear();
                self.controller.teleport(state.position, state.rotation);
                self.health = state.health;
                self.max_health = state.max_health;
                self.defeated = state.health <= 0.0;
                for player in players.iter().filter(|p| p.id != id) {
                    self.remotes.upsert(player, now);
                }
            }
            ServerMsg::PlayerJoined { player } => {
                if !is_local(player.id) {
                    self.remotes.upsert(&player, now);
                }
            }
            ServerMsg::PlayerLeft { id } => {
                self.remotes.remove(id);
            }
            ServerMsg::WorldState { players, .. } => {
                for player in players.iter().filter(|p| !is_local(p.id)) {
                    self.remotes.upsert(player, now);
                }
            }
            ServerMsg::PlayerShoot {
                shooter_id,
                position,
                direction,
            } => {
                self.projectiles.spawn(
                    shooter_id,
                    position,
                    direction,
                    self.config.projectile_speed,
                    self.config.projectile_ttl,
                );
            }
            ServerMsg::PlayerDamaged {
                source_id, health, ..
            } => {
                debug!(source_id, health, "Took damage");
                self.health = health;
            }
            ServerMsg::HitConfirmed { target_id, health } => {
                self.remotes.set_health(target_id, health);
            }
            ServerMsg::HealthUpdate { player_id, health } => {
                if is_local(player_id) {
                    self.health = health;
                } else {
                    self.remotes.set_health(player_id, health);
                }
            }
            ServerMsg::PlayerDefeated {
                player_id,
                killer_id,
            } => {
                if is_local(player_id) {
                    info!(killer_id, "Defeated");
                    self.health = 0.0;
                    self.defeated = true;
                } else {
                    self.remotes.set_health(player_id, 0.0);
                }
            }
            ServerMsg::Respawn { state } => {
                info!("Respawned");
                self.controller.teleport(state.position, state.rotation);
                self.health = state.health;
                self.max_health = state.max_health;
                self.defeated = false;
            }
            ServerMsg::PlayerRespawned { player } => {
                self.remotes.teleport(&player, now);
            }
            ServerMsg::Ping | ServerMsg::Pong => {}
        }
    }

    fn accumulate_input(&mut self, input: &MovementInput) {
        self.pending.jump_pressed |= input.jump_pressed;
        self.pending.yaw_delta += input.yaw_delta;
        self.pending.pitch_delta += input.pitch_delta;
    }

    /// Axes apply to every step; edges and look deltas only to the first.
    fn take_step_input(&mut self, input: &MovementInput) -> MovementInput {
        let pending = std::mem::take(&mut self.pending);
        MovementInput {
            forward: input.forward,
            right: input.right,
            sprint: input.sprint,
            jump_pressed: pending.jump_pressed,
            yaw_delta: pending.yaw_delta,
            pitch_delta: pending.pitch_delta,
        }
    }

    fn fire(&mut self) -> bool {
        let Some(local_id) = self.connection.local_id() else {
            return false;
        };
        if self.defeated || !self.controller.try_shoot(self.sim_time) {
            return false;
        }

        let muzzle = self.controller.position() + Vec3::Y * self.config.eye_height;
        let direction = self.controller.aim_direction();
        self.projectiles.spawn(
            local_id,
            muzzle,
            direction,
            self.config.projectile_speed,
            self.config.projectile_ttl,
        );
        self.connection.send(&ClientMsg::Shoot {
            position: muzzle,
            direction,
        });
        true
    }

    /// Step projectiles and claim hits for our own. Returns claims sent.
    fn advance_projectiles(&mut self, dt: f32) -> u32 {
        self.projectiles.advance(dt);

        let Some(local_id) = self.connection.local_id() else {
            return 0;
        };

        let mut hits: Vec<(Handle, SessionId, HitZone)> = Vec::new();
        for (handle, projectile) in self.projectiles.iter() {
            if projectile.owner_id != local_id || projectile.hit {
                continue;
            }
            let from = projectile.position - projectile.velocity * dt;
            let struck = self
                .remotes
                .iter()
                .filter(|(_, remote)| !remote.is_defeated())
                .find_map(|(_, remote)| {
                    sweep_hit(
                        from,
                        projectile.position,
                        remote.position,
                        self.config.hit_radius,
                        self.config.player_height,
                    )
                    .map(|impact| {
                        let zone = hit_zone_at(
                            impact.y - remote.position.y,
                            self.config.player_height,
                        );
                        (remote.network_id, zone)
                    })
                });
            if let Some((target_id, zone)) = struck {
                hits.push((handle, target_id, zone));
            }
        }

        let mut claimed = 0;
        for (handle, target_id, hit_zone) in hits {
            if !self.projectiles.mark_hit(handle) {
                continue;
            }
            let damage = self.config.base_damage * hit_zone.multiplier();
            debug!(target_id, damage, ?hit_zone, "Claiming hit");
            if self.connection.send(&ClientMsg::PlayerHit {
                target_id,
                damage,
                hit_zone,
            }) {
                claimed += 1;
            }
        }
        claimed
    }

    fn send_update(&mut self, now: Instant) -> bool {
        if !self.connection.is_connected() || self.connection.local_id().is_none() {
            return false;
        }
        let due = self
            .last_update_sent
            .map_or(true, |last| now.duration_since(last) >= self.send_interval());
        if !due {
            return false;
        }

        let animation = if self.defeated {
            AnimationState::Dead
        } else {
            self.controller.animation()
        };
        let sent = self.connection.send(&ClientMsg::PlayerUpdate {
            position: self.controller.position(),
            rotation: self.controller.rotation(),
            animation,
            health: self.health,
        });
        if sent {
            self.last_update_sent = Some(now);
        }
        sent
    }

    fn send_interval(&self) -> Duration {
        self.config.send_interval
    }
}

/// First point of the segment `from..to` inside a vertical capsule standing
/// on `feet`, sampled at half-radius spacing.
fn sweep_hit(from: Vec3, to: Vec3, feet: Vec3, radius: f32, height: f32) -> Option<Vec3> {
    let length = from.distance(to);
    let samples = ((length / (radius * 0.5)).ceil() as u32).clamp(1, 256);
    let radius_sq = radius * radius;

    (0..=samples).find_map(|i| {
        let point = from.lerp(to, i as f32 / samples as f32);
        let axis_y = point.y.clamp(feet.y, feet.y + height);
        let axis = Vec3::new(feet.x, axis_y, feet.z);
        (point.distance_squared(axis) <= radius_sq).then_some(point)
    })
}

/// Zone from impact height above the feet
fn hit_zone_at(height_above_feet: f32, player_height: f32) -> HitZone {
    let ratio = height_above_feet / player_height;
    if ratio >= 0.85 {
        HitZone::Head
    } else if ratio >= 0.45 {
        HitZone::Body
    } else {
        HitZone::Limb
    }
}
