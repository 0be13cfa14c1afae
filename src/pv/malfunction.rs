//! Malfunction overrides for the photovoltaic input data.
//!
//! Each timed override is a small explicit state machine
//! (Idle → RampingIn → Holding → RampingOut → Idle) whose only mutable
//! fields are the elapsed time and the captured start magnitude. The owning
//! step function ticks it once per step through `apply`, and it disarms
//! itself once the elapsed time exceeds the configured duration.

use std::f64::consts::PI;

/// Phase of a timed override.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OverridePhase {
    /// Not armed; input passes through untouched.
    #[default]
    Idle,
    /// Blending from the captured start value toward the target.
    RampingIn,
    /// Holding the target value.
    Holding,
    /// Blending back toward the captured start value.
    RampingOut,
}

/// Illumination-magnitude override with sinusoidal ramp-in/hold/ramp-out.
///
/// The blend factor follows `0.5 * (1 - cos(pi * t / ramp_time))`, so the
/// transition starts and ends with zero slope.
#[derive(Debug, Clone, Default)]
pub struct FluxRampOverride {
    /// Override target magnitude.
    target: f64,
    /// Total armed duration in seconds.
    duration: f64,
    /// Ramp-in/ramp-out time in seconds, clamped to half the duration.
    ramp_time: f64,
    /// Current phase.
    phase: OverridePhase,
    /// Time since arming.
    elapsed: f64,
    /// Ambient value captured on the first tick after arming.
    start_value: f64,
}

impl FluxRampOverride {
    /// Arm the override. `ramp_time` longer than half the duration is
    /// clamped so the hold phase never goes negative.
    pub fn arm(&mut self, target: f64, duration: f64, ramp_time: f64) {
        self.target = target;
        self.duration = duration.max(0.0);
        self.ramp_time = ramp_time.max(0.0).min(self.duration * 0.5);
        self.phase = OverridePhase::RampingIn;
        self.elapsed = 0.0;
        self.start_value = f64::NAN;
    }

    /// Disarm immediately.
    pub fn clear(&mut self) {
        self.phase = OverridePhase::Idle;
        self.elapsed = 0.0;
    }

    /// Whether the override is currently armed.
    pub fn is_active(&self) -> bool {
        self.phase != OverridePhase::Idle
    }

    /// Tick the machine by `dt` and return the effective value given the
    /// ambient (non-overridden) input value.
    pub fn apply(&mut self, dt: f64, ambient: f64) -> f64 {
        if self.phase == OverridePhase::Idle {
            return ambient;
        }
        if self.start_value.is_nan() {
            self.start_value = ambient;
        }
        self.elapsed += dt;

        if self.elapsed > self.duration {
            self.phase = OverridePhase::Idle;
            return ambient;
        }

        let blend = if self.elapsed < self.ramp_time {
            self.phase = OverridePhase::RampingIn;
            ramp_blend(self.elapsed, self.ramp_time)
        } else if self.elapsed > self.duration - self.ramp_time {
            self.phase = OverridePhase::RampingOut;
            ramp_blend(self.duration - self.elapsed, self.ramp_time)
        } else {
            self.phase = OverridePhase::Holding;
            1.0
        };

        self.start_value + (self.target - self.start_value) * blend
    }
}

/// Sinusoidal blend factor in [0, 1] for `t` into a ramp of length `ramp`.
fn ramp_blend(t: f64, ramp: f64) -> f64 {
    if ramp <= 0.0 {
        return 1.0;
    }
    0.5 * (1.0 - (PI * (t / ramp).clamp(0.0, 1.0)).cos())
}

/// Plain timed override: holds a target value for a duration, then disarms.
/// Used for the exposed-fraction and temperature overrides.
#[derive(Debug, Clone, Default)]
pub struct SteppedOverride {
    target: f64,
    duration: f64,
    elapsed: f64,
    active: bool,
}

impl SteppedOverride {
    /// Arm the override. Use `f64::INFINITY` to hold until cleared.
    pub fn arm(&mut self, target: f64, duration: f64) {
        self.target = target;
        self.duration = duration.max(0.0);
        self.elapsed = 0.0;
        self.active = true;
    }

    /// Disarm immediately.
    pub fn clear(&mut self) {
        self.active = false;
        self.elapsed = 0.0;
    }

    /// Whether the override is currently armed.
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Tick by `dt` and return the effective value.
    pub fn apply(&mut self, dt: f64, ambient: f64) -> f64 {
        if !self.active {
            return ambient;
        }
        self.elapsed += dt;
        if self.elapsed > self.duration {
            self.active = false;
            return ambient;
        }
        self.target
    }
}

/// Latched cell-group failure malfunction. Forces at least `count` bypass
/// groups inactive until cleared; the per-step shading computation may
/// still bypass more.
#[derive(Debug, Clone, Copy, Default)]
pub struct GroupFailure {
    pub active: bool,
    pub count: usize,
}

impl GroupFailure {
    /// Latch `count` failed groups.
    pub fn set(&mut self, count: usize) {
        self.active = true;
        self.count = count;
    }

    /// Clear the malfunction.
    pub fn clear(&mut self) {
        self.active = false;
        self.count = 0;
    }
}

/// Latched power-degrade malfunction: scales the cell source current by
/// `1 - fraction` until cleared.
#[derive(Debug, Clone, Copy, Default)]
pub struct PowerDegrade {
    pub active: bool,
    pub fraction: f64,
}

impl PowerDegrade {
    /// Latch a degrade fraction, clamped to [0, 1].
    pub fn set(&mut self, fraction: f64) {
        self.active = true;
        self.fraction = fraction.clamp(0.0, 1.0);
    }

    /// Clear the malfunction.
    pub fn clear(&mut self) {
        self.active = false;
        self.fraction = 0.0;
    }

    /// Effective degrade fraction (zero when inactive).
    pub fn effective(&self) -> f64 {
        if self.active {
            self.fraction
        } else {
            0.0
        }
    }
}
