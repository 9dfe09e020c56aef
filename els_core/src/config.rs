//! Control-side configuration structs.
//!
//! These are plain (serde-free) types consumed by the builder; the
//! file-facing twins live in `els_config`.

/// Pulse ramp timing.
#[derive(Debug, Clone)]
pub struct TimingCfg {
    /// Slowest (starting) full-pulse delay in microseconds; the ramp's
    /// upper bound and the standstill value.
    pub initial_pulse_delay_us: f64,
    /// Acceleration coefficient: delay change per microsecond elapsed
    /// since the last pulse.
    pub pulse_delay_step_us: f64,
    /// Fixed pulse delay in jog mode (us).
    pub jog_pulse_delay_us: f64,
}

impl Default for TimingCfg {
    fn default() -> Self {
        Self {
            initial_pulse_delay_us: 2_000.0,
            pulse_delay_step_us: 0.02,
            jog_pulse_delay_us: 1_000.0,
        }
    }
}

/// Drive-train geometry relating follower pulses, millimeters of carriage
/// travel, and lead encoder counts.
#[derive(Debug, Clone)]
pub struct KinematicsCfg {
    /// Follower pulses per millimeter of travel.
    pub steps_per_mm: f64,
    /// Follower pulses per motor revolution.
    pub stepper_ppr: u32,
}

impl Default for KinematicsCfg {
    fn default() -> Self {
        Self {
            steps_per_mm: 200.0,
            stepper_ppr: 1_600,
        }
    }
}

/// Soft travel bounds. `None` means the side is unset.
#[derive(Debug, Clone)]
pub struct StopCfg {
    /// When true, a set bound participates in deceleration planning.
    pub enforce: bool,
    pub left: Option<i64>,
    pub right: Option<i64>,
}

impl Default for StopCfg {
    fn default() -> Self {
        Self {
            enforce: true,
            left: None,
            right: None,
        }
    }
}
