//! Run-command execution: backend assembly, ratio resolution, tick loop.

use std::path::Path;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use crate::cli::{CliLimits, LAST_LIMITS, RunMode};
use els_core::runner::RunnerCfg;
use els_core::status::MotionStatus;
use els_core::{MotionContext, MotionMode, StopCfg, build_leadscrew};
use els_traits::clock::MonotonicClock;

/// Flags of the `run` subcommand, resolved against the loaded config.
pub struct RunOpts {
    pub ratio: Option<f64>,
    pub pitch_mm: Option<f64>,
    pub pitch: Option<String>,
    pub pitch_table: Option<PathBuf>,
    pub mode: Option<RunMode>,
    pub jog: Option<i64>,
    pub left_stop: Option<i64>,
    pub right_stop: Option<i64>,
    pub no_enforce_stops: bool,
    pub duration_ms: Option<u64>,
    pub sim_rpm: f64,
    pub stats: bool,
}

/// Final state of a finished run, for the summary line.
pub struct RunOutcome {
    pub mode: RunMode,
    pub ratio: f64,
    pub pitch: Option<String>,
    pub ticks: u64,
    pub duration_ms: u64,
    pub final_position: i64,
    pub final_error: i64,
    pub velocity_mm_s: f64,
    pub status: MotionStatus,
}

fn core_timing(t: &els_config::TimingCfg) -> els_core::TimingCfg {
    els_core::TimingCfg {
        initial_pulse_delay_us: t.initial_pulse_delay_us,
        pulse_delay_step_us: t.pulse_delay_step_us,
        jog_pulse_delay_us: t.jog_pulse_delay_us,
    }
}

fn core_kinematics(k: &els_config::KinematicsCfg) -> els_core::KinematicsCfg {
    els_core::KinematicsCfg {
        steps_per_mm: k.steps_per_mm,
        stepper_ppr: k.stepper_ppr,
    }
}

/// Stops come from the config; CLI flags override per side.
fn core_stops(stops: &els_config::StopsCfg, opts: &RunOpts) -> StopCfg {
    StopCfg {
        enforce: stops.enforce && !opts.no_enforce_stops,
        left: opts.left_stop.or(stops.left),
        right: opts.right_stop.or(stops.right),
    }
}

/// Simulation backend: a spindle thread drives the encoder count.
#[cfg(not(all(feature = "hardware", target_os = "linux")))]
fn make_backend(
    cfg: &els_config::Config,
    sim_rpm: f64,
) -> eyre::Result<(
    Box<dyn els_traits::Axis>,
    Box<dyn els_traits::StepperIo>,
    Option<els_hardware::SpindleSim>,
)> {
    let axis = els_hardware::SimulatedAxis::new();
    let spindle = (sim_rpm != 0.0).then(|| {
        els_hardware::SpindleSim::spawn(axis.clone(), sim_rpm, cfg.kinematics.encoder_ppr)
    });
    tracing::info!(sim_rpm, "using simulated spindle and stepper");
    Ok((
        Box::new(axis),
        Box::new(els_hardware::SimulatedStepperIo::new()),
        spindle,
    ))
}

/// GPIO backend: quadrature encoder on the spindle, STEP/DIR stepper.
#[cfg(all(feature = "hardware", target_os = "linux"))]
fn make_backend(
    cfg: &els_config::Config,
    sim_rpm: f64,
) -> eyre::Result<(
    Box<dyn els_traits::Axis>,
    Box<dyn els_traits::StepperIo>,
    Option<els_hardware::SpindleSim>,
)> {
    use eyre::WrapErr;

    if sim_rpm != 0.0 {
        tracing::warn!("--sim-rpm is ignored with the hardware backend");
    }
    let encoder =
        els_hardware::gpio::QuadratureEncoder::new(cfg.pins.encoder_a, cfg.pins.encoder_b)
            .wrap_err("open encoder pins")?;
    let stepper = els_hardware::gpio::GpioStepper::new(
        cfg.pins.motor_step,
        cfg.pins.motor_dir,
        cfg.pins.motor_en,
    )
    .wrap_err("open stepper pins")?;
    tracing::info!(
        encoder_a = cfg.pins.encoder_a,
        encoder_b = cfg.pins.encoder_b,
        "using GPIO spindle encoder and stepper"
    );
    Ok((Box::new(encoder), Box::new(stepper), None))
}

fn resolve_mode(opts: &RunOpts) -> RunMode {
    opts.mode.unwrap_or(if opts.jog.is_some() {
        RunMode::Jog
    } else {
        RunMode::Enabled
    })
}

/// Pick the tracking ratio from --ratio, --pitch-mm, or a named pitch.
/// Jog and disabled runs fall back to 1.0 when nothing was selected.
fn resolve_ratio(
    opts: &RunOpts,
    kinematics: &els_config::KinematicsCfg,
    mode: RunMode,
) -> eyre::Result<(f64, Option<String>)> {
    let picked = usize::from(opts.ratio.is_some())
        + usize::from(opts.pitch_mm.is_some())
        + usize::from(opts.pitch.is_some());
    if picked > 1 {
        eyre::bail!("choose exactly one of --ratio, --pitch-mm, or --pitch");
    }

    if let Some(ratio) = opts.ratio {
        return Ok((ratio, None));
    }
    if let Some(pitch_mm) = opts.pitch_mm {
        return Ok((els_config::ratio_for_pitch(pitch_mm, kinematics), None));
    }
    if let Some(name) = &opts.pitch {
        let Some(path) = &opts.pitch_table else {
            eyre::bail!("a named pitch requires --pitch-table <FILE>");
        };
        let table = els_config::load_pitch_table_csv(path)?;
        let Some(pitch_mm) = table.pitch_mm(name) else {
            eyre::bail!("pitch {name:?} not found in the pitch table");
        };
        tracing::info!(pitch = %name, pitch_mm, "resolved pitch");
        return Ok((
            els_config::ratio_for_pitch(pitch_mm, kinematics),
            Some(name.clone()),
        ));
    }

    match mode {
        RunMode::Enabled => eyre::bail!("tracking requires --ratio, --pitch-mm, or --pitch"),
        RunMode::Jog | RunMode::Disabled => Ok((1.0, None)),
    }
}

#[inline]
fn record_sample(
    latencies: &mut Vec<u64>,
    missed_deadlines: &mut usize,
    period_us: u64,
    t_start: Instant,
) {
    let latency = t_start.elapsed().as_micros() as u64;
    latencies.push(latency);
    if latency > period_us {
        *missed_deadlines = missed_deadlines.saturating_add(1);
    }
}

/// Drive the motion loop until shutdown, the tick budget, or an error.
pub fn run_leadscrew(
    cfg: &els_config::Config,
    opts: RunOpts,
    ctx: &MotionContext,
    shutdown: &AtomicBool,
) -> eyre::Result<RunOutcome> {
    let mode = resolve_mode(&opts);
    let jog_offset = match (mode, opts.jog) {
        (RunMode::Jog, Some(pulses)) => pulses,
        (RunMode::Jog, None) => eyre::bail!("--mode jog requires --jog <PULSES>"),
        (_, Some(_)) => eyre::bail!("--jog only applies to jog mode"),
        (_, None) => 0,
    };
    let (ratio, pitch) = resolve_ratio(&opts, &cfg.kinematics, mode)?;

    let tick_hz = cfg.timing.tick_hz;
    let stops = core_stops(&cfg.stops, &opts);
    let _ = LAST_LIMITS.set(CliLimits {
        tick_hz,
        duration_ms: opts.duration_ms,
        enforce_stops: stops.enforce,
    });

    let (axis, io, _spindle) = make_backend(cfg, opts.sim_rpm)?;
    let mut leadscrew = build_leadscrew(
        axis,
        io,
        core_timing(&cfg.timing),
        core_kinematics(&cfg.kinematics),
        stops,
        ratio,
        None,
    )?;

    match mode {
        RunMode::Disabled => ctx.set_motion_mode(MotionMode::Disabled),
        RunMode::Jog => {
            // An offset below the tracked position points the error at the
            // requested side; jog mode works it off and then declutches.
            leadscrew.increment_current_position(-jog_offset);
            ctx.set_motion_mode(MotionMode::Jog);
        }
        RunMode::Enabled => ctx.set_motion_mode(MotionMode::Enabled),
    }
    let max_ticks = opts
        .duration_ms
        .map(|ms| (ms.saturating_mul(u64::from(tick_hz)) / 1_000).max(1));
    tracing::info!(
        mode = mode.as_str(),
        ratio,
        tick_hz,
        jog_offset,
        "run start"
    );

    let started = Instant::now();
    let outcome = if opts.stats {
        // Wrap the tick loop manually so latency can be sampled per tick.
        let period_us = els_core::util::period_us(tick_hz);
        let period = Duration::from_micros(period_us);
        let mut latencies: Vec<u64> = Vec::new();
        let mut missed_deadlines = 0usize;
        let mut ticks: u64 = 0;
        let mut last_status = MotionStatus::Idle;
        loop {
            if shutdown.load(Ordering::Relaxed) {
                ctx.set_motion_mode(MotionMode::Disabled);
                last_status = leadscrew.update(ctx)?;
                tracing::info!(ticks, "tick loop shutdown");
                break;
            }
            let t_start = Instant::now();
            let status = leadscrew.update(ctx)?;
            record_sample(&mut latencies, &mut missed_deadlines, period_us, t_start);
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
            if max_ticks.is_some_and(|max| ticks >= max) {
                break;
            }
            std::thread::sleep(period);
        }
        if !latencies.is_empty() {
            print_stats(&latencies, ticks, missed_deadlines, tick_hz);
        }
        RunOutcome {
            mode,
            ratio,
            pitch,
            ticks,
            duration_ms: started.elapsed().as_millis() as u64,
            final_position: leadscrew.current_position(),
            final_error: leadscrew.position_error(),
            velocity_mm_s: leadscrew.estimated_velocity_mm_s(),
            status: last_status,
        }
    } else {
        let summary = els_core::runner::run(
            leadscrew,
            ctx,
            None,
            shutdown,
            &RunnerCfg { tick_hz, max_ticks },
            &MonotonicClock::new(),
        )?;
        RunOutcome {
            mode,
            ratio,
            pitch,
            ticks: summary.ticks,
            duration_ms: started.elapsed().as_millis() as u64,
            final_position: summary.final_position,
            final_error: summary.final_error,
            velocity_mm_s: summary.velocity_mm_s,
            status: summary.last_status,
        }
    };
    tracing::info!(
        ticks = outcome.ticks,
        position = outcome.final_position,
        status = outcome.status.as_str(),
        "run complete"
    );
    Ok(outcome)
}

/// Print tick latency/jitter stats to stderr.
fn print_stats(latencies: &[u64], tick_count: u64, missed_deadlines: usize, tick_hz: u32) {
    let expected_period_us = els_core::util::period_us(tick_hz);
    let min = *latencies.iter().min().unwrap_or(&0);
    let max = *latencies.iter().max().unwrap_or(&0);
    let avg = latencies.iter().sum::<u64>() as f64 / latencies.len() as f64;
    let stdev = if latencies.len() > 1 {
        let mean = avg;
        let var = latencies
            .iter()
            .map(|&x| (x as f64 - mean).powi(2))
            .sum::<f64>()
            / (latencies.len() as f64 - 1.0);
        var.sqrt()
    } else {
        0.0
    };
    eprintln!("\n--- Leadscrew Stats ---");
    eprintln!("Ticks: {tick_count}");
    eprintln!("Period (us): {expected_period_us}");
    eprintln!("Latency min/avg/max/stdev (us): {min:.0} / {avg:.1} / {max:.0} / {stdev:.1}");
    eprintln!("Missed deadlines (> period): {missed_deadlines}");
    eprintln!("-----------------------\n");
}

fn unix_timestamp() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// One JSONL summary line for a finished run.
pub fn summary_json(out: &RunOutcome) -> String {
    serde_json::json!({
        "timestamp": unix_timestamp(),
        "mode": out.mode.as_str(),
        "ratio": out.ratio,
        "pitch": out.pitch,
        "ticks": out.ticks,
        "duration_ms": out.duration_ms,
        "final_position": out.final_position,
        "final_error": out.final_error,
        "velocity_mm_s": out.velocity_mm_s,
        "status": out.status.as_str(),
        "abort_reason": serde_json::Value::Null,
    })
    .to_string()
}

/// JSONL summary line for a run that never finished.
pub fn summary_json_aborted(err: &eyre::Report, elapsed: Duration) -> String {
    serde_json::json!({
        "timestamp": unix_timestamp(),
        "mode": serde_json::Value::Null,
        "ratio": serde_json::Value::Null,
        "pitch": serde_json::Value::Null,
        "ticks": serde_json::Value::Null,
        "duration_ms": elapsed.as_millis() as u64,
        "final_position": serde_json::Value::Null,
        "final_error": serde_json::Value::Null,
        "velocity_mm_s": serde_json::Value::Null,
        "status": serde_json::Value::Null,
        "abort_reason": crate::error_fmt::error_reason(err),
    })
    .to_string()
}

/// Validate the pitch table (when given) and prove the motion core wiring
/// with one simulated jog pulse.
pub fn self_check(cfg: &els_config::Config, pitch_table: Option<&Path>) -> eyre::Result<()> {
    if let Some(path) = pitch_table {
        let table = els_config::load_pitch_table_csv(path)?;
        tracing::info!(rows = table.rows().len(), "pitch table OK");
    }

    let axis = els_hardware::SimulatedAxis::new();
    let io = els_hardware::SimulatedStepperIo::new();
    let probe = io.probe();
    let mut leadscrew = els_core::Leadscrew::builder()
        .with_axis(axis)
        .with_stepper_io(io)
        .with_timing(core_timing(&cfg.timing))
        .with_kinematics(core_kinematics(&cfg.kinematics))
        .with_ratio(1.0)
        .build()?;

    let ctx = MotionContext::new();
    leadscrew.increment_current_position(-1);
    ctx.set_motion_mode(MotionMode::Jog);

    let pause = Duration::from_micros(cfg.timing.jog_pulse_delay_us.max(1.0) as u64);
    for _ in 0..64 {
        leadscrew.update(&ctx)?;
        if ctx.motion_mode() == MotionMode::Disabled && leadscrew.position_error() == 0 {
            break;
        }
        std::thread::sleep(pause);
    }
    if probe.full_pulses() == 0 {
        eyre::bail!("self-check produced no stepper pulses");
    }
    if leadscrew.position_error() != 0 {
        eyre::bail!("self-check jog did not converge");
    }

    println!("Self-check OK");
    Ok(())
}

/// Print the pitch table with the ratio each entry resolves to.
pub fn list_pitches(cfg: &els_config::Config, path: &Path, json: bool) -> eyre::Result<()> {
    let table = els_config::load_pitch_table_csv(path)?;
    for row in table.rows() {
        let ratio = els_config::ratio_for_pitch(row.pitch_mm, &cfg.kinematics);
        if json {
            println!(
                "{}",
                serde_json::json!({ "name": row.name, "pitch_mm": row.pitch_mm, "ratio": ratio })
            );
        } else {
            println!("{:<16} {:>9.4} mm  ratio {:.6}", row.name, row.pitch_mm, ratio);
        }
    }
    Ok(())
}
