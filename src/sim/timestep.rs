//! Fixed-timestep scheduler
//!
//! Turns a variable frame delta into a whole number of fixed simulation
//! steps plus a blend fraction for the presentation layer.

/// Scheduler tuning
#[derive(Debug, Clone, Copy)]
pub struct TimestepConfig {
    /// Fixed simulation step in seconds
    pub fixed_dt: f32,
    /// Largest frame delta accepted before clamping (stall protection)
    pub max_frame_time: f32,
    /// Smallest frame delta considered; shorter frames are raised to this
    pub min_frame_time: f32,
    /// Ceiling on steps run in a single frame
    pub max_steps_per_frame: u32,
}

impl Default for TimestepConfig {
    fn default() -> Self {
        Self {
            fixed_dt: 1.0 / 60.0,
            max_frame_time: 0.25,
            min_frame_time: 0.001,
            max_steps_per_frame: 5,
        }
    }
}

/// What the caller should simulate this frame
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepPlan {
    pub should_integrate: bool,
    pub steps: u32,
    pub fixed_dt: f32,
    /// Leftover time as a fraction of one step, in `[0, 1)`
    pub alpha: f32,
}

#[derive(Debug, Clone)]
pub struct FixedTimestep {
    config: TimestepConfig,
    accumulator: f32,
}

impl Default for FixedTimestep {
    fn default() -> Self {
        Self::new(TimestepConfig::default())
    }
}

impl FixedTimestep {
    pub fn new(config: TimestepConfig) -> Self {
        Self {
            config,
            accumulator: 0.0,
        }
    }

    pub fn config(&self) -> &TimestepConfig {
        &self.config
    }

    pub fn fixed_dt(&self) -> f32 {
        self.config.fixed_dt
    }

    /// Feed one measured frame delta (seconds) and get the step plan.
    pub fn advance(&mut self, frame_delta: f32) -> StepPlan {
        let fixed_dt = self.config.fixed_dt;
        let delta = if frame_delta.is_finite() {
            frame_delta.clamp(self.config.min_frame_time, self.config.max_frame_time)
        } else {
            self.config.min_frame_time
        };

        self.accumulator += delta;

        let mut steps = (self.accumulator / fixed_dt).floor() as u32;
        if steps > self.config.max_steps_per_frame {
            steps = self.config.max_steps_per_frame;
        }
        self.accumulator -= steps as f32 * fixed_dt;

        // Fell too far behind: drop the whole steps we will never catch up on.
        if self.accumulator >= fixed_dt {
            self.accumulator %= fixed_dt;
        }
        self.accumulator = self.accumulator.max(0.0);

        StepPlan {
            should_integrate: steps > 0,
            steps,
            fixed_dt,
            alpha: (self.accumulator / fixed_dt).clamp(0.0, 0.999_999),
        }
    }

    /// Current blend fraction without advancing
    pub fn alpha(&self) -> f32 {
        self.accumulator / self.config.fixed_dt
    }

    pub fn reset(&mut self) {
        self.accumulator = 0.0;
    }
}
