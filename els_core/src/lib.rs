#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
//! Core electronic-leadscrew motion logic (hardware-agnostic).
//!
//! This crate provides the hardware-independent follower engine: a stepper
//! axis tracks a lead axis (spindle encoder) at an operator-settable ratio.
//! All hardware interactions go through `els_traits::Axis` and
//! `els_traits::StepperIo`.
//!
//! ## Architecture
//!
//! - **Position model**: expected vs. current follower position, fractional
//!   pulse accumulator (`Leadscrew`)
//! - **Pulse ramp**: time-proportional acceleration between a standstill
//!   delay and full speed, deceleration by neglect
//! - **Stops**: optional soft travel bounds folded into deceleration planning
//! - **Modes**: Disabled / Jog / Enabled via a shared `MotionContext`
//!   (`motion` module)
//! - **Driver**: paced tick loop with an operator command channel
//!   (`runner` module)
//!
//! ## Tick discipline
//!
//! `update()` performs at most one half pulse per call and never sleeps;
//! pacing belongs to the driver. A full logical step is two half
//! transitions of the step pin, so peak speed is bounded by the tick rate.

pub mod config;
pub mod error;
pub mod motion;
pub mod runner;
pub mod sampler;
pub mod status;
pub mod util;

use std::sync::Arc;
use std::time::Instant;

use eyre::WrapErr;

pub use crate::config::{KinematicsCfg, StopCfg, TimingCfg};
pub use crate::error::{BuildError, LeadscrewError, Result};
pub use crate::motion::{MotionContext, MotionMode, ThreadSyncState};
pub use crate::status::MotionStatus;
use els_traits::clock::{Clock, MonotonicClock};

// For typed hardware error mapping
#[cfg(feature = "hardware-errors")]
use els_hardware::error::HwError;

/// Follower motion direction. `Unknown` is the rest value and only ever
/// observed while the position error is zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Unknown,
    Left,
    Right,
}

impl Direction {
    /// Direction that reduces the given position error.
    fn of_error(err: i64) -> Self {
        if err > 0 {
            Direction::Right
        } else if err < 0 {
            Direction::Left
        } else {
            Direction::Unknown
        }
    }

    /// Signed unit step: Right = +1, Left = -1, Unknown = 0.
    fn signum(self) -> i64 {
        match self {
            Direction::Right => 1,
            Direction::Left => -1,
            Direction::Unknown => 0,
        }
    }

    /// Dir-pin level. High drives toward increasing position (RIGHT).
    fn pin_level(self) -> bool {
        matches!(self, Direction::Right)
    }
}

/// Which soft stop bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopSide {
    Left,
    Right,
}

/// Unified core for both dynamic (boxed) and generic (static dispatch) variants.
pub struct LeadscrewCore<A: els_traits::Axis, IO: els_traits::StepperIo> {
    axis: A,
    io: IO,
    timing: TimingCfg,
    kinematics: KinematicsCfg,
    enforce_stops: bool,
    // Stop bounds stay tagged; sentinels appear only at the read boundary.
    left_stop: Option<i64>,
    right_stop: Option<i64>,

    // Follower pulses per lead count; settable at any time.
    ratio: f64,
    // Follower position in pulse units.
    current_position: i64,
    // Full-pulse delay in fractional microseconds, clamped to
    // [0, initial_pulse_delay_us]. At the upper bound the axis is at rest.
    current_pulse_delay: f64,
    current_direction: Direction,
    // Fractional pulses not yet reflected in current_position.
    accumulator: f64,
    // Duration of the most recent full pulse; 0 until one completes.
    last_full_pulse_us: u64,

    // Unified clock for deterministic time in tests
    pub(crate) clock: Arc<dyn Clock + Send + Sync>,
    // Instant of the last pulse-timer reset; elapsed is measured from here
    pulse_epoch: Instant,
}

impl<A: els_traits::Axis, IO: els_traits::StepperIo> core::fmt::Debug for LeadscrewCore<A, IO> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("LeadscrewCore")
            .field("ratio", &self.ratio)
            .field("current_position", &self.current_position)
            .field("current_pulse_delay", &self.current_pulse_delay)
            .field("current_direction", &self.current_direction)
            .finish()
    }
}

impl<A: els_traits::Axis, IO: els_traits::StepperIo> LeadscrewCore<A, IO> {
    /// Follower pulses per lead count.
    pub fn ratio(&self) -> f64 {
        self.ratio
    }

    /// Set the tracking ratio and rebase the follower model so the change
    /// produces no instantaneous position error (and thus no motion
    /// transient).
    pub fn set_ratio(&mut self, ratio: f64) {
        self.ratio = ratio;
        self.current_position = self.expected_position();
    }

    /// Where the follower should be for the lead position right now.
    /// Always computed from the live axis; never cached.
    pub fn expected_position(&self) -> i64 {
        (self.axis.position() as f64 * self.ratio) as i64
    }

    /// Follower position the model believes the motor is at.
    pub fn current_position(&self) -> i64 {
        self.current_position
    }

    /// Signed distance still to travel: expected - current.
    pub fn position_error(&self) -> i64 {
        self.expected_position() - self.current_position
    }

    /// Pin the follower model to the lead axis (used while declutched).
    pub fn reset_current_position(&mut self) {
        self.current_position = self.expected_position();
    }

    pub fn set_current_position(&mut self, position: i64) {
        self.current_position = position;
    }

    /// Offset the follower model; jog drives the physical axis until the
    /// offset is worked off.
    pub fn increment_current_position(&mut self, delta: i64) {
        self.current_position = self.current_position.saturating_add(delta);
    }

    pub fn set_stop_position(&mut self, side: StopSide, position: i64) {
        match side {
            StopSide::Left => self.left_stop = Some(position),
            StopSide::Right => self.right_stop = Some(position),
        }
    }

    pub fn clear_stop_position(&mut self, side: StopSide) {
        match side {
            StopSide::Left => self.left_stop = None,
            StopSide::Right => self.right_stop = None,
        }
    }

    /// Stop bound for a side. Unset sides read as the open-interval
    /// sentinels `i64::MIN` (left) / `i64::MAX` (right).
    pub fn stop_position(&self, side: StopSide) -> i64 {
        match side {
            StopSide::Left => self.left_stop.unwrap_or(i64::MIN),
            StopSide::Right => self.right_stop.unwrap_or(i64::MAX),
        }
    }

    /// Fraction of a follower position unit represented by one pulse.
    pub fn accumulator_unit(&self) -> f64 {
        self.kinematics.steps_per_mm * self.ratio / f64::from(self.kinematics.stepper_ppr)
    }

    /// Fractional pulses pending; stays within (-1, 1] between updates.
    pub fn accumulator(&self) -> f64 {
        self.accumulator
    }

    /// Current full-pulse delay in microseconds.
    pub fn current_pulse_delay_us(&self) -> f64 {
        self.current_pulse_delay
    }

    pub fn direction(&self) -> Direction {
        self.current_direction
    }

    /// Follower speed estimate from the last measured full pulse, in mm/s.
    /// 0.0 until the first full pulse completes.
    pub fn estimated_velocity_mm_s(&self) -> f64 {
        util::pulses_per_sec(self.last_full_pulse_us) / self.kinematics.steps_per_mm
    }

    /// Toggle the step pin by one half transition.
    ///
    /// Returns `true` when the falling edge just completed a full pulse
    /// (the pin was high and is now low). Scheduling between pulses is
    /// `update()`'s job; this primitive only flips the line.
    pub fn send_pulse(&mut self) -> Result<bool> {
        let was_high = self
            .io
            .read_step_pin()
            .map_err(|e| eyre::Report::new(map_hw_error_dyn(&*e)))
            .wrap_err("read step pin")?;
        self.io
            .write_step_pin(!was_high)
            .map_err(|e| eyre::Report::new(map_hw_error_dyn(&*e)))
            .wrap_err("write step pin")?;
        Ok(was_high)
    }

    /// Complete a dangling half pulse by driving the step pin low.
    fn settle_step_pin(&mut self) -> Result<()> {
        let high = self
            .io
            .read_step_pin()
            .map_err(|e| eyre::Report::new(map_hw_error_dyn(&*e)))
            .wrap_err("read step pin")?;
        if high {
            self.io
                .write_step_pin(false)
                .map_err(|e| eyre::Report::new(map_hw_error_dyn(&*e)))
                .wrap_err("settle step pin")?;
        }
        Ok(())
    }

    fn write_dir_pin(&mut self, dir: Direction) -> Result<()> {
        self.io
            .write_dir_pin(dir.pin_level())
            .map_err(|e| eyre::Report::new(map_hw_error_dyn(&*e)))
            .wrap_err("write dir pin")
    }

    /// Park the ramp: rest delay, unknown direction.
    fn enter_rest(&mut self) {
        self.current_direction = Direction::Unknown;
        self.current_pulse_delay = self.timing.initial_pulse_delay_us;
    }

    fn reset_pulse_timer(&mut self) {
        self.pulse_epoch = self.clock.now();
    }

    /// One tick of the motion loop. Reads the mode once, performs at most
    /// one half pulse, never blocks.
    pub fn update(&mut self, ctx: &MotionContext) -> Result<MotionStatus> {
        match ctx.motion_mode() {
            MotionMode::Disabled => self.update_disabled(),
            MotionMode::Jog => self.update_jog(ctx),
            MotionMode::Enabled => self.update_tracking(ctx),
        }
    }

    /// Declutched: keep the model pinned to the lead axis so re-engaging
    /// starts with zero error.
    fn update_disabled(&mut self) -> Result<MotionStatus> {
        self.settle_step_pin()?;
        self.reset_current_position();
        self.enter_rest();
        Ok(MotionStatus::Idle)
    }

    /// Manual motion at fixed cadence until the jog offset is worked off,
    /// then autonomously drop back to Disabled.
    fn update_jog(&mut self, ctx: &MotionContext) -> Result<MotionStatus> {
        let position_error = self.position_error();

        // Latch the new direction first; the pin must be stable for at
        // least one cadence before the first pulse that uses it.
        if position_error != 0 {
            let desired = Direction::of_error(position_error);
            if self.current_direction != desired {
                self.write_dir_pin(desired)?;
                self.current_direction = desired;
                self.reset_pulse_timer();
                tracing::debug!(direction = ?desired, "jog direction latch");
                return Ok(MotionStatus::Jogging);
            }
        }

        let elapsed_us = self.clock.micros_since(self.pulse_epoch);
        if (elapsed_us as f64) < self.timing.jog_pulse_delay_us {
            return Ok(MotionStatus::Jogging);
        }

        if position_error == 0 {
            return self.finish_jog(ctx);
        }

        if self.send_pulse()? {
            let step = self.current_direction.signum();
            self.current_position = self.current_position.saturating_add(step);
            self.last_full_pulse_us = elapsed_us;
            self.reset_pulse_timer();
            if self.position_error() == 0 {
                return self.finish_jog(ctx);
            }
        }
        Ok(MotionStatus::Jogging)
    }

    /// Jog target reached: settle the line, park the ramp, and hand the
    /// mode back to Disabled on this same tick.
    fn finish_jog(&mut self, ctx: &MotionContext) -> Result<MotionStatus> {
        self.settle_step_pin()?;
        self.enter_rest();
        ctx.set_motion_mode(MotionMode::Disabled);
        tracing::debug!(position = self.current_position, "jog complete");
        Ok(MotionStatus::Idle)
    }

    /// Ratio tracking: drive the position error to zero through the
    /// time-proportional acceleration ramp.
    fn update_tracking(&mut self, ctx: &MotionContext) -> Result<MotionStatus> {
        let position_error = self.position_error();

        if position_error == 0 {
            ctx.set_thread_sync_state(ThreadSyncState::Sync);
            self.settle_step_pin()?;
            if self.current_direction != Direction::Unknown {
                tracing::debug!(position = self.current_position, "thread sync");
            }
            self.enter_rest();
            return Ok(MotionStatus::InSync);
        }

        let desired = Direction::of_error(position_error);

        // Transition out of standstill: latch the direction pin and give
        // it a full schedule to settle before the first pulse.
        let at_rest_delay = self.current_pulse_delay >= self.timing.initial_pulse_delay_us;
        if at_rest_delay && self.current_direction != desired {
            self.write_dir_pin(desired)?;
            self.current_direction = desired;
            self.reset_pulse_timer();
            tracing::debug!(direction = ?desired, position_error, "direction latch");
            return Ok(MotionStatus::Tracking);
        }

        let elapsed_us = self.clock.micros_since(self.pulse_epoch);

        // Acceleration grows with time between pulses; never zero, so the
        // ramp cannot wedge and stopping distance stays divisible.
        let mut accel_change = self.timing.pulse_delay_step_us * elapsed_us as f64;
        if accel_change == 0.0 {
            accel_change = self.timing.pulse_delay_step_us;
        }

        // Deceleration by neglect: a badly missed schedule relaxes the
        // delay toward the slow end instead of bursting to catch up.
        if elapsed_us as f64 > self.current_pulse_delay + accel_change
            && self.current_pulse_delay + accel_change < self.timing.initial_pulse_delay_us
        {
            self.current_pulse_delay += accel_change;
        }

        if (elapsed_us as f64) < self.current_pulse_delay {
            return Ok(MotionStatus::Tracking);
        }

        if self.send_pulse()? {
            self.last_full_pulse_us = elapsed_us;
            self.reset_pulse_timer();

            let dir_sign = self.current_direction.signum();
            self.accumulator += dir_sign as f64 * self.accumulator_unit();

            // Pulses needed to ramp back up to the rest delay from here.
            let stopping_distance =
                ((self.timing.initial_pulse_delay_us - self.current_pulse_delay) / accel_change) as i64;

            let mut should_stop = position_error.abs() <= stopping_distance;
            should_stop |= desired != self.current_direction;
            if self.enforce_stops {
                should_stop |= self.current_position.saturating_add(stopping_distance)
                    >= self.stop_position(StopSide::Right);
                should_stop |= self.current_position.saturating_sub(stopping_distance)
                    <= self.stop_position(StopSide::Left);
            }

            if should_stop {
                self.current_pulse_delay += accel_change;
            } else {
                self.current_pulse_delay -= accel_change;
            }
            self.current_pulse_delay = self
                .current_pulse_delay
                .clamp(0.0, self.timing.initial_pulse_delay_us);

            // Fold whole pulses out of the accumulator into the position.
            while self.accumulator.abs() > 1.0 {
                self.accumulator -= dir_sign as f64;
                self.current_position = self.current_position.saturating_add(dir_sign);
            }

            tracing::trace!(
                position_error,
                pulse_delay_us = self.current_pulse_delay,
                stopping_distance,
                "pulse complete"
            );
        }
        Ok(MotionStatus::Tracking)
    }
}

/// Public dynamic (boxed) leadscrew that preserves the core API via composition.
pub struct Leadscrew {
    inner: LeadscrewCore<Box<dyn els_traits::Axis>, Box<dyn els_traits::StepperIo>>,
}

impl core::fmt::Debug for Leadscrew {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Leadscrew")
            .field("ratio", &self.inner.ratio)
            .field("current_position", &self.inner.current_position)
            .field("current_direction", &self.inner.current_direction)
            .finish()
    }
}

impl Leadscrew {
    /// Start building a Leadscrew.
    pub fn builder() -> LeadscrewBuilder<Missing, Missing> {
        LeadscrewBuilder::default()
    }

    /// One tick of the motion loop.
    pub fn update(&mut self, ctx: &MotionContext) -> Result<MotionStatus> {
        self.inner.update(ctx)
    }

    pub fn ratio(&self) -> f64 {
        self.inner.ratio()
    }

    pub fn set_ratio(&mut self, ratio: f64) {
        self.inner.set_ratio(ratio);
    }

    pub fn expected_position(&self) -> i64 {
        self.inner.expected_position()
    }

    pub fn current_position(&self) -> i64 {
        self.inner.current_position()
    }

    pub fn position_error(&self) -> i64 {
        self.inner.position_error()
    }

    pub fn reset_current_position(&mut self) {
        self.inner.reset_current_position();
    }

    pub fn set_current_position(&mut self, position: i64) {
        self.inner.set_current_position(position);
    }

    pub fn increment_current_position(&mut self, delta: i64) {
        self.inner.increment_current_position(delta);
    }

    pub fn set_stop_position(&mut self, side: StopSide, position: i64) {
        self.inner.set_stop_position(side, position);
    }

    pub fn clear_stop_position(&mut self, side: StopSide) {
        self.inner.clear_stop_position(side);
    }

    pub fn stop_position(&self, side: StopSide) -> i64 {
        self.inner.stop_position(side)
    }

    pub fn accumulator_unit(&self) -> f64 {
        self.inner.accumulator_unit()
    }

    pub fn accumulator(&self) -> f64 {
        self.inner.accumulator()
    }

    pub fn current_pulse_delay_us(&self) -> f64 {
        self.inner.current_pulse_delay_us()
    }

    pub fn direction(&self) -> Direction {
        self.inner.direction()
    }

    pub fn estimated_velocity_mm_s(&self) -> f64 {
        self.inner.estimated_velocity_mm_s()
    }

    pub fn send_pulse(&mut self) -> Result<bool> {
        self.inner.send_pulse()
    }
}

// Map any boxed error to a typed LeadscrewError, downcasting hardware
// errors when the hardware-errors feature is enabled.
#[cfg(feature = "hardware-errors")]
fn map_hw_error_dyn(e: &(dyn std::error::Error + 'static)) -> LeadscrewError {
    if let Some(hw) = e.downcast_ref::<HwError>() {
        LeadscrewError::HardwareFault(hw.to_string())
    } else {
        LeadscrewError::Hardware(e.to_string())
    }
}

#[cfg(not(feature = "hardware-errors"))]
fn map_hw_error_dyn(e: &(dyn std::error::Error + 'static)) -> LeadscrewError {
    LeadscrewError::Hardware(e.to_string())
}

// Type-state markers for the builder
pub struct Missing;
pub struct Set;

use std::marker::PhantomData;

/// Builder for `Leadscrew`. All fields are validated on `build()`.
pub struct LeadscrewBuilder<A, I> {
    axis: Option<Box<dyn els_traits::Axis>>,
    io: Option<Box<dyn els_traits::StepperIo>>,
    timing: Option<TimingCfg>,
    kinematics: Option<KinematicsCfg>,
    stops: Option<StopCfg>,
    ratio: Option<f64>,
    // Optional clock for tests (accept Box here)
    clock: Option<Box<dyn Clock + Send + Sync>>,
    // Type-state markers
    _a: PhantomData<A>,
    _i: PhantomData<I>,
}

impl Default for LeadscrewBuilder<Missing, Missing> {
    fn default() -> Self {
        Self {
            axis: None,
            io: None,
            timing: None,
            kinematics: None,
            stops: None,
            ratio: None,
            clock: None,
            _a: PhantomData,
            _i: PhantomData,
        }
    }
}

impl<A, I> LeadscrewBuilder<A, I> {
    /// Fallible build available in any type-state; returns detailed
    /// BuildError for missing pieces.
    pub fn try_build(self) -> Result<Leadscrew> {
        let LeadscrewBuilder {
            axis,
            io,
            timing,
            kinematics,
            stops,
            ratio,
            clock,
            _a: _,
            _i: _,
        } = self;

        let axis = axis.ok_or_else(|| eyre::Report::new(BuildError::MissingAxis))?;
        let io = io.ok_or_else(|| eyre::Report::new(BuildError::MissingStepperIo))?;

        let timing = timing.unwrap_or_default();
        let kinematics = kinematics.unwrap_or_default();
        let stops = stops.unwrap_or_default();
        let ratio = ratio.unwrap_or(1.0);
        let clock: Arc<dyn Clock + Send + Sync> = match clock {
            Some(b) => Arc::from(b),
            None => Arc::new(MonotonicClock::new()),
        };

        validate_cfg(&timing, &kinematics, &stops, ratio)?;

        Ok(Leadscrew {
            inner: init_core(axis, io, timing, kinematics, stops, ratio, clock),
        })
    }
}

/// Chainable setters that do not affect type-state
impl<A, I> LeadscrewBuilder<A, I> {
    pub fn with_timing(mut self, timing: TimingCfg) -> Self {
        self.timing = Some(timing);
        self
    }
    pub fn with_kinematics(mut self, kinematics: KinematicsCfg) -> Self {
        self.kinematics = Some(kinematics);
        self
    }
    pub fn with_stops(mut self, stops: StopCfg) -> Self {
        self.stops = Some(stops);
        self
    }
    /// Tracking ratio; defaults to 1.0 when not provided.
    pub fn with_ratio(mut self, ratio: f64) -> Self {
        self.ratio = Some(ratio);
        self
    }
    /// Provide a custom clock implementation; defaults to MonotonicClock
    /// when not provided.
    pub fn with_clock(mut self, clock: Box<dyn Clock + Send + Sync>) -> Self {
        self.clock = Some(clock);
        self
    }
}

// Setters that advance type-state when providing mandatory components
impl<I> LeadscrewBuilder<Missing, I> {
    pub fn with_axis(self, axis: impl els_traits::Axis + 'static) -> LeadscrewBuilder<Set, I> {
        let LeadscrewBuilder {
            axis: _,
            io,
            timing,
            kinematics,
            stops,
            ratio,
            clock,
            _a: _,
            _i: _,
        } = self;
        LeadscrewBuilder {
            axis: Some(Box::new(axis)),
            io,
            timing,
            kinematics,
            stops,
            ratio,
            clock,
            _a: PhantomData,
            _i: PhantomData,
        }
    }
}

impl<A> LeadscrewBuilder<A, Missing> {
    pub fn with_stepper_io(
        self,
        io: impl els_traits::StepperIo + 'static,
    ) -> LeadscrewBuilder<A, Set> {
        let LeadscrewBuilder {
            axis,
            io: _,
            timing,
            kinematics,
            stops,
            ratio,
            clock,
            _a: _,
            _i: _,
        } = self;
        LeadscrewBuilder {
            axis,
            io: Some(Box::new(io)),
            timing,
            kinematics,
            stops,
            ratio,
            clock,
            _a: PhantomData,
            _i: PhantomData,
        }
    }
}

impl LeadscrewBuilder<Set, Set> {
    /// Validate and build the Leadscrew. Only available when the axis and
    /// stepper IO are set.
    pub fn build(self) -> Result<Leadscrew> {
        self.try_build()
    }
}

fn validate_cfg(
    timing: &TimingCfg,
    kinematics: &KinematicsCfg,
    stops: &StopCfg,
    ratio: f64,
) -> Result<()> {
    if !ratio.is_finite() || ratio == 0.0 {
        return Err(eyre::Report::new(BuildError::InvalidConfig(
            "ratio must be finite and nonzero",
        )));
    }
    if !timing.initial_pulse_delay_us.is_finite() || timing.initial_pulse_delay_us <= 0.0 {
        return Err(eyre::Report::new(BuildError::InvalidConfig(
            "initial_pulse_delay_us must be > 0",
        )));
    }
    if !timing.pulse_delay_step_us.is_finite() || timing.pulse_delay_step_us <= 0.0 {
        return Err(eyre::Report::new(BuildError::InvalidConfig(
            "pulse_delay_step_us must be > 0",
        )));
    }
    if !timing.jog_pulse_delay_us.is_finite() || timing.jog_pulse_delay_us <= 0.0 {
        return Err(eyre::Report::new(BuildError::InvalidConfig(
            "jog_pulse_delay_us must be > 0",
        )));
    }
    if !kinematics.steps_per_mm.is_finite() || kinematics.steps_per_mm <= 0.0 {
        return Err(eyre::Report::new(BuildError::InvalidConfig(
            "steps_per_mm must be > 0",
        )));
    }
    if kinematics.stepper_ppr == 0 {
        return Err(eyre::Report::new(BuildError::InvalidConfig(
            "stepper_ppr must be > 0",
        )));
    }
    if let (Some(l), Some(r)) = (stops.left, stops.right) {
        if l > r {
            return Err(eyre::Report::new(BuildError::InvalidConfig(
                "left stop must not exceed right stop",
            )));
        }
    }
    Ok(())
}

fn init_core<A, IO>(
    axis: A,
    io: IO,
    timing: TimingCfg,
    kinematics: KinematicsCfg,
    stops: StopCfg,
    ratio: f64,
    clock: Arc<dyn Clock + Send + Sync>,
) -> LeadscrewCore<A, IO>
where
    A: els_traits::Axis,
    IO: els_traits::StepperIo,
{
    // Start declutched: the model matches the lead axis, so the rest
    // state (Unknown direction, initial delay) is consistent.
    let current_position = (axis.position() as f64 * ratio) as i64;
    let pulse_epoch = clock.now();
    LeadscrewCore {
        axis,
        io,
        current_pulse_delay: timing.initial_pulse_delay_us,
        timing,
        enforce_stops: stops.enforce,
        left_stop: stops.left,
        right_stop: stops.right,
        kinematics,
        ratio,
        current_position,
        current_direction: Direction::Unknown,
        accumulator: 0.0,
        last_full_pulse_us: 0,
        clock,
        pulse_epoch,
    }
}

/// Build a generic, statically-dispatched core from concrete axis and IO.
pub fn build_leadscrew<A, IO>(
    axis: A,
    io: IO,
    timing: TimingCfg,
    kinematics: KinematicsCfg,
    stops: StopCfg,
    ratio: f64,
    clock: Option<Box<dyn Clock + Send + Sync>>,
) -> Result<LeadscrewCore<A, IO>>
where
    A: els_traits::Axis + 'static,
    IO: els_traits::StepperIo + 'static,
{
    validate_cfg(&timing, &kinematics, &stops, ratio)?;
    let clock: Arc<dyn Clock + Send + Sync> = match clock {
        Some(b) => Arc::from(b),
        None => Arc::new(MonotonicClock::new()),
    };
    Ok(init_core(axis, io, timing, kinematics, stops, ratio, clock))
}

#[cfg(test)]
mod direction_tests {
    use super::{Direction, StopSide};

    #[test]
    fn of_error_signs() {
        assert_eq!(Direction::of_error(42), Direction::Right);
        assert_eq!(Direction::of_error(-1), Direction::Left);
        assert_eq!(Direction::of_error(0), Direction::Unknown);
    }

    #[test]
    fn signum_matches_pin_level() {
        assert_eq!(Direction::Right.signum(), 1);
        assert!(Direction::Right.pin_level());
        assert_eq!(Direction::Left.signum(), -1);
        assert!(!Direction::Left.pin_level());
        assert_eq!(Direction::Unknown.signum(), 0);
    }

    #[test]
    fn stop_side_is_plain_data() {
        assert_ne!(StopSide::Left, StopSide::Right);
    }
}
