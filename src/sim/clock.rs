//! Fixed-step clock
//!
//! Turns variable frame deltas into a whole number of fixed steps and keeps
//! simulated time. A frame gap above the stall threshold marks the frame as
//! stalled: the delta is clamped and spawn requests are dropped.

use crate::consts::SIM_DT;
use crate::settings::PhysicsSettings;

/// Steps to run for one frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameBudget {
    pub steps: u32,
    pub stalled: bool,
}

/// Accumulator-based fixed-step driver
#[derive(Debug, Clone)]
pub struct FixedStepClock {
    step_dt: f32,
    max_frame_dt: f32,
    max_substeps: u32,
    stall_threshold: f32,
    accumulator: f32,
    ticks: u64,
    stalled: bool,
}

impl FixedStepClock {
    pub fn new(settings: &PhysicsSettings) -> Self {
        Self {
            step_dt: SIM_DT,
            max_frame_dt: settings.max_frame_dt,
            max_substeps: settings.max_substeps.max(1),
            stall_threshold: settings.stall_threshold,
            accumulator: 0.0,
            ticks: 0,
            stalled: false,
        }
    }

    /// Feed one frame's wall-clock delta (seconds)
    pub fn begin_frame(&mut self, elapsed: f32) -> FrameBudget {
        let elapsed = if elapsed.is_finite() { elapsed.max(0.0) } else { f32::MAX };
        self.stalled = elapsed > self.stall_threshold;

        self.accumulator += elapsed.min(self.max_frame_dt);
        let mut steps = 0;
        while self.accumulator >= self.step_dt && steps < self.max_substeps {
            self.accumulator -= self.step_dt;
            steps += 1;
        }
        if steps == self.max_substeps {
            // Drop the backlog instead of catching up next frame
            self.accumulator = self.accumulator.min(self.step_dt);
        }

        FrameBudget {
            steps,
            stalled: self.stalled,
        }
    }

    /// Record one executed step
    pub fn tick(&mut self) {
        self.ticks += 1;
    }

    /// Whether the last frame was a stall
    pub fn is_stalled(&self) -> bool {
        self.stalled
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    pub fn step_dt(&self) -> f32 {
        self.step_dt
    }

    /// Simulated seconds since start
    pub fn now(&self) -> f64 {
        self.ticks as f64 * self.step_dt as f64
    }
}

/// Periodic timer on simulated time
#[derive(Debug, Clone)]
pub struct Interval {
    period: f64,
    next_at: f64,
}

impl Interval {
    pub fn new(period: f32, start: f64) -> Self {
        let period = period.max(SIM_DT) as f64;
        Self {
            period,
            next_at: start + period,
        }
    }

    /// True once per elapsed period; missed periods collapse into one firing
    pub fn due(&mut self, now: f64) -> bool {
        if now < self.next_at {
            return false;
        }
        while self.next_at <= now {
            self.next_at += self.period;
        }
        true
    }
}
