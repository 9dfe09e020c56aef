//! Paced driver loop around the motion core.
//!
//! The loop owns the tick cadence; the core itself never sleeps. Operator
//! mutations arrive over a command channel and are drained between ticks,
//! so they can never race an in-flight `update()`.

use crossbeam_channel as xch;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crate::error::Result as CoreResult;
use crate::motion::{MotionContext, MotionMode};
use crate::status::MotionStatus;
use crate::{LeadscrewCore, StopSide};
use els_traits::clock::Clock;

/// Operator commands applied between ticks.
#[derive(Debug, Clone, PartialEq)]
pub enum LeadscrewCommand {
    /// Change the tracking ratio (ignored unless finite and nonzero).
    SetRatio(f64),
    SetStopPosition(StopSide, i64),
    ClearStopPosition(StopSide),
    /// Offset the follower relative to its tracked position and jog there.
    /// Positive offsets move toward RIGHT.
    Jog { offset_pulses: i64 },
}

/// Pacing configuration for the tick loop.
#[derive(Debug, Clone)]
pub struct RunnerCfg {
    /// Update rate; one half pulse maximum per tick.
    pub tick_hz: u32,
    /// Stop after this many ticks (None = run until shutdown).
    pub max_ticks: Option<u64>,
}

impl Default for RunnerCfg {
    fn default() -> Self {
        Self {
            tick_hz: 1_000,
            max_ticks: None,
        }
    }
}

/// Final snapshot when the loop exits.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub ticks: u64,
    pub final_position: i64,
    pub final_error: i64,
    pub velocity_mm_s: f64,
    pub last_status: MotionStatus,
}

/// Run the motion loop until shutdown is signalled or the tick budget is
/// spent. Hardware errors abort the loop and propagate.
pub fn run<A, IO, C>(
    mut leadscrew: LeadscrewCore<A, IO>,
    ctx: &MotionContext,
    commands: Option<&xch::Receiver<LeadscrewCommand>>,
    shutdown: &AtomicBool,
    cfg: &RunnerCfg,
    clock: &C,
) -> CoreResult<RunSummary>
where
    A: els_traits::Axis,
    IO: els_traits::StepperIo,
    C: Clock,
{
    let period = Duration::from_micros(crate::util::period_us(cfg.tick_hz));
    let mut ticks: u64 = 0;
    let mut last_status = MotionStatus::Idle;

    tracing::info!(tick_hz = cfg.tick_hz, "motion loop start");
    loop {
        if shutdown.load(Ordering::Relaxed) {
            // Disable and run one final tick so a pending half pulse
            // settles before the loop exits.
            ctx.set_motion_mode(MotionMode::Disabled);
            last_status = leadscrew.update(ctx)?;
            tracing::info!(ticks, "motion loop shutdown");
            break;
        }

        if let Some(rx) = commands {
            while let Ok(cmd) = rx.try_recv() {
                apply_command(&mut leadscrew, ctx, cmd);
            }
        }

        let status = leadscrew.update(ctx)?;
        if status != last_status {
            tracing::info!(
                status = status.as_str(),
                position = leadscrew.current_position(),
                position_error = leadscrew.position_error(),
                "status change"
            );
            last_status = status;
        }

        ticks += 1;
        if cfg.max_ticks.is_some_and(|max| ticks >= max) {
            tracing::info!(ticks, "tick budget reached");
            break;
        }
        clock.sleep(period);
    }

    Ok(RunSummary {
        ticks,
        final_position: leadscrew.current_position(),
        final_error: leadscrew.position_error(),
        velocity_mm_s: leadscrew.estimated_velocity_mm_s(),
        last_status,
    })
}

fn apply_command<A, IO>(
    leadscrew: &mut LeadscrewCore<A, IO>,
    ctx: &MotionContext,
    cmd: LeadscrewCommand,
) where
    A: els_traits::Axis,
    IO: els_traits::StepperIo,
{
    match cmd {
        LeadscrewCommand::SetRatio(ratio) => {
            if ratio.is_finite() && ratio != 0.0 {
                tracing::debug!(ratio, "set ratio");
                leadscrew.set_ratio(ratio);
            } else {
                tracing::warn!(ratio, "ignoring invalid ratio");
            }
        }
        LeadscrewCommand::SetStopPosition(side, position) => {
            tracing::debug!(?side, position, "set stop");
            leadscrew.set_stop_position(side, position);
        }
        LeadscrewCommand::ClearStopPosition(side) => {
            tracing::debug!(?side, "clear stop");
            leadscrew.clear_stop_position(side);
        }
        LeadscrewCommand::Jog { offset_pulses } => {
            tracing::debug!(offset_pulses, "jog");
            // An offset below the tracked position makes the error point
            // at the requested side; jog mode then works it off.
            leadscrew.increment_current_position(-offset_pulses);
            ctx.set_motion_mode(MotionMode::Jog);
        }
    }
}
