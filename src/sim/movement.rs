//! Local movement state machine
//!
//! Integrates one locally-controlled character per fixed step: jump
//! execution with coyote time and input buffering, gravity, horizontal
//! input in the character's facing, and a swept-collision pass delegated to
//! a [`CollisionResolver`].

use glam::{Quat, Vec3};

use crate::ws::protocol::AnimationState;

/// Movement tuning constants
#[derive(Debug, Clone, Copy)]
pub struct MovementConfig {
    /// Horizontal speed in units per second
    pub base_speed: f32,
    pub sprint_multiplier: f32,
    /// Horizontal speed multiplier while airborne
    pub air_control: f32,
    /// Vertical velocity set when a jump fires
    pub jump_speed: f32,
    pub gravity: f32,
    pub terminal_fall_speed: f32,
    /// Downward speed applied while grounded to stay on slopes
    pub ground_stick_speed: f32,
    /// Seconds after leaving the ground during which a jump is still allowed
    pub coyote_window: f64,
    /// Seconds a jump press stays buffered
    pub jump_buffer_window: f64,
    /// Minimum seconds between two jumps
    pub jump_cooldown: f64,
    /// Minimum seconds between two shots
    pub shot_cooldown: f64,
    /// Pitch limit in radians
    pub max_pitch: f32,
}

impl Default for MovementConfig {
    fn default() -> Self {
        Self {
            base_speed: 6.0,
            sprint_multiplier: 1.6,
            air_control: 0.4,
            jump_speed: 8.0,
            gravity: 24.0,
            terminal_fall_speed: 50.0,
            ground_stick_speed: 2.0,
            coyote_window: 0.12,
            jump_buffer_window: 0.15,
            jump_cooldown: 0.25,
            shot_cooldown: 0.15,
            max_pitch: 1.5,
        }
    }
}

/// Per-frame player intent
#[derive(Debug, Clone, Copy, Default)]
pub struct MovementInput {
    /// Forward axis, -1..1
    pub forward: f32,
    /// Right axis, -1..1
    pub right: f32,
    /// Jump was pressed this frame (edge, not level)
    pub jump_pressed: bool,
    pub sprint: bool,
    pub yaw_delta: f32,
    pub pitch_delta: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MoveState {
    #[default]
    Grounded,
    Jumping,
    Falling,
}

/// Outcome of one swept move
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SweepResult {
    /// Displacement actually allowed
    pub allowed: Vec3,
    /// Whether the character stands on a floor after the move
    pub grounded: bool,
}

/// Swept-collision collaborator
pub trait CollisionResolver {
    fn sweep(&mut self, from: Vec3, desired: Vec3) -> SweepResult;
}

/// Infinite horizontal floor with an optional ceiling
#[derive(Debug, Clone, Copy)]
pub struct GroundPlane {
    pub floor: f32,
    pub ceiling: Option<f32>,
}

impl GroundPlane {
    const CONTACT_EPSILON: f32 = 1e-3;

    pub fn new(floor: f32) -> Self {
        Self {
            floor,
            ceiling: None,
        }
    }

    pub fn with_ceiling(floor: f32, ceiling: f32) -> Self {
        Self {
            floor,
            ceiling: Some(ceiling),
        }
    }
}

impl CollisionResolver for GroundPlane {
    fn sweep(&mut self, from: Vec3, desired: Vec3) -> SweepResult {
        let mut allowed = desired;
        let target_y = from.y + desired.y;

        if target_y < self.floor {
            allowed.y = self.floor - from.y;
        }
        if let Some(ceiling) = self.ceiling {
            if target_y > ceiling {
                allowed.y = (ceiling - from.y).max(0.0);
            }
        }

        let grounded = from.y + allowed.y <= self.floor + Self::CONTACT_EPSILON;
        SweepResult { allowed, grounded }
    }
}

/// State owned by the local player's controller
#[derive(Debug, Clone)]
pub struct LocalControllerState {
    pub position: Vec3,
    pub yaw: f32,
    pub pitch: f32,
    pub vertical_velocity: f32,
    pub move_state: MoveState,
    pub grounded: bool,
    pub last_grounded: f64,
    pub last_jump: f64,
    /// Single-slot jump buffer: press time of the pending request
    pub jump_requested_at: Option<f64>,
    pub last_shot: f64,
    /// Horizontal speed of the last step, used for animation
    pub horizontal_speed: f32,
    pub sprinting: bool,
}

impl LocalControllerState {
    pub fn at(position: Vec3) -> Self {
        Self {
            position,
            yaw: 0.0,
            pitch: 0.0,
            vertical_velocity: 0.0,
            move_state: MoveState::Falling,
            grounded: false,
            last_grounded: f64::NEG_INFINITY,
            last_jump: f64::NEG_INFINITY,
            jump_requested_at: None,
            last_shot: f64::NEG_INFINITY,
            horizontal_speed: 0.0,
            sprinting: false,
        }
    }
}

impl Default for LocalControllerState {
    fn default() -> Self {
        Self::at(Vec3::ZERO)
    }
}

#[derive(Debug, Clone)]
pub struct LocalController {
    config: MovementConfig,
    state: LocalControllerState,
}

impl LocalController {
    pub fn new(config: MovementConfig, position: Vec3) -> Self {
        Self {
            config,
            state: LocalControllerState::at(position),
        }
    }

    pub fn config(&self) -> &MovementConfig {
        &self.config
    }

    pub fn state(&self) -> &LocalControllerState {
        &self.state
    }

    pub fn position(&self) -> Vec3 {
        self.state.position
    }

    /// Body rotation (yaw only)
    pub fn rotation(&self) -> Quat {
        Quat::from_rotation_y(self.state.yaw)
    }

    /// Unit aim direction from yaw and pitch
    pub fn aim_direction(&self) -> Vec3 {
        let orientation = Quat::from_rotation_y(self.state.yaw) * Quat::from_rotation_x(self.state.pitch);
        orientation * Vec3::NEG_Z
    }

    /// Hard reset after a server-driven teleport (init, respawn)
    pub fn teleport(&mut self, position: Vec3, rotation: Quat) {
        let (yaw, _, _) = rotation.to_euler(glam::EulerRot::YXZ);
        let last_shot = self.state.last_shot;
        self.state = LocalControllerState::at(position);
        self.state.yaw = yaw;
        self.state.last_shot = last_shot;
    }

    pub fn can_jump(&self, now: f64) -> bool {
        let state = &self.state;
        let on_ground = state.grounded || now - state.last_grounded < self.config.coyote_window;
        on_ground && now - state.last_jump > self.config.jump_cooldown
    }

    /// Integrate one fixed step at simulation time `now`.
    pub fn step<R: CollisionResolver>(
        &mut self,
        input: &MovementInput,
        dt: f32,
        now: f64,
        resolver: &mut R,
    ) {
        self.apply_look(input);

        if self.state.grounded {
            self.state.last_grounded = now;
        }

        if input.jump_pressed {
            self.state.jump_requested_at = Some(now);
        }
        if let Some(pressed_at) = self.state.jump_requested_at {
            if now - pressed_at > self.config.jump_buffer_window {
                self.state.jump_requested_at = None;
            }
        }

        let jumped = self.state.jump_requested_at.is_some() && self.can_jump(now);
        if jumped {
            self.state.vertical_velocity = self.config.jump_speed;
            self.state.last_jump = now;
            self.state.jump_requested_at = None;
            self.state.grounded = false;
        }

        let airborne = !self.state.grounded;
        if airborne {
            self.state.vertical_velocity = (self.state.vertical_velocity - self.config.gravity * dt)
                .max(-self.config.terminal_fall_speed);
        } else {
            self.state.vertical_velocity = -self.config.ground_stick_speed;
        }

        let horizontal = self.horizontal_velocity(input, airborne);
        let desired = horizontal * dt + Vec3::Y * (self.state.vertical_velocity * dt);
        let result = resolver.sweep(self.state.position, desired);

        self.state.position += result.allowed;
        self.state.horizontal_speed = Vec3::new(result.allowed.x, 0.0, result.allowed.z).length() / dt;
        self.state.sprinting = input.sprint;

        if self.state.vertical_velocity > 0.0 && result.allowed.y < desired.y - 1e-5 {
            // Ceiling
            self.state.vertical_velocity = 0.0;
        }

        self.state.grounded = result.grounded && self.state.vertical_velocity <= 0.0;
        if self.state.grounded {
            self.state.vertical_velocity = 0.0;
        }

        self.state.move_state = if self.state.grounded {
            MoveState::Grounded
        } else if self.state.vertical_velocity > 0.0 {
            MoveState::Jumping
        } else {
            MoveState::Falling
        };
    }

    /// Consume the shot cooldown; returns whether a shot may fire now.
    pub fn try_shoot(&mut self, now: f64) -> bool {
        if now - self.state.last_shot < self.config.shot_cooldown {
            return false;
        }
        self.state.last_shot = now;
        true
    }

    pub fn animation(&self) -> AnimationState {
        match self.state.move_state {
            MoveState::Jumping => AnimationState::Jump,
            MoveState::Falling => AnimationState::Fall,
            MoveState::Grounded if self.state.horizontal_speed < 0.1 => AnimationState::Idle,
            MoveState::Grounded if self.state.sprinting => AnimationState::Run,
            MoveState::Grounded => AnimationState::Walk,
        }
    }

    fn apply_look(&mut self, input: &MovementInput) {
        self.state.yaw = (self.state.yaw + input.yaw_delta).rem_euclid(std::f32::consts::TAU);
        self.state.pitch =
            (self.state.pitch + input.pitch_delta).clamp(-self.config.max_pitch, self.config.max_pitch);
    }

    fn horizontal_velocity(&self, input: &MovementInput, airborne: bool) -> Vec3 {
        let local = Vec3::new(input.right, 0.0, -input.forward);
        if local.length_squared() < 1e-6 {
            return Vec3::ZERO;
        }

        let mut speed = self.config.base_speed;
        if airborne {
            speed *= self.config.air_control;
        }
        if input.sprint {
            speed *= self.config.sprint_multiplier;
        }

        self.rotation() * local.normalize() * speed
    }
}
