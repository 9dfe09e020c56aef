//! CLI argument definitions and shared statics.

use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::sync::OnceLock;

pub static FILE_GUARD: OnceLock<tracing_appender::non_blocking::WorkerGuard> = OnceLock::new();
/// Whether the user asked for JSON output (controls structured error output).
pub static JSON_MODE: OnceLock<bool> = OnceLock::new();
/// Effective loop limits for the current run (for JSON error details).
pub static LAST_LIMITS: OnceLock<CliLimits> = OnceLock::new();

#[derive(Copy, Clone, Debug)]
pub struct CliLimits {
    pub tick_hz: u32,
    pub duration_ms: Option<u64>,
    pub enforce_stops: bool,
}

#[derive(Parser, Debug)]
#[command(name = "els", version, about = "Electronic leadscrew CLI")]
pub struct Cli {
    /// Path to config TOML (typed)
    #[arg(long, value_name = "FILE", default_value = "etc/els.toml")]
    pub config: PathBuf,

    /// Optional thread-pitch table CSV (strict header)
    #[arg(long = "pitch-table", value_name = "FILE")]
    pub pitch_table: Option<PathBuf>,

    /// Log as JSON lines instead of pretty
    #[arg(long, action = ArgAction::SetTrue)]
    pub json: bool,

    /// Console log level (error|warn|info|debug|trace); falls back to
    /// [logging].level from the config, then "info"
    #[arg(long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Write JSON log lines to this file (overrides [logging].file)
    #[arg(long = "log-file", value_name = "FILE")]
    pub log_file: Option<PathBuf>,

    /// Command to execute
    #[command(subcommand)]
    pub cmd: Commands,
}

/// Memory locking mode for real-time operation.
#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum RtLock {
    /// Do not lock memory
    None,
    /// Lock currently resident pages
    Current,
    /// Lock current and future pages
    All,
}

impl RtLock {
    #[inline]
    pub fn os_default() -> Self {
        #[cfg(target_os = "linux")]
        {
            return RtLock::Current;
        }
        #[cfg(target_os = "macos")]
        {
            return RtLock::None;
        }
        #[allow(unreachable_code)]
        RtLock::None
    }
}

/// Motion mode commanded at startup.
#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum RunMode {
    /// Declutched: no pulses, the follower model pins to the lead axis
    Disabled,
    /// Work off a manual jog offset, then declutch
    Jog,
    /// Track the lead axis at the selected ratio
    Enabled,
}

impl RunMode {
    pub fn as_str(self) -> &'static str {
        match self {
            RunMode::Disabled => "disabled",
            RunMode::Jog => "jog",
            RunMode::Enabled => "enabled",
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Follow the lead spindle at an operator-selected ratio
    Run {
        /// Tracking ratio in follower pulses per encoder count
        #[arg(long, value_name = "RATIO", allow_hyphen_values = true)]
        ratio: Option<f64>,
        /// Thread pitch in millimeters; the ratio is derived from the
        /// configured kinematics
        #[arg(long = "pitch-mm", value_name = "MM")]
        pitch_mm: Option<f64>,
        /// Named pitch from the pitch table (requires --pitch-table)
        #[arg(long, value_name = "NAME")]
        pitch: Option<String>,
        /// Startup motion mode; defaults to jog when --jog is given,
        /// enabled otherwise
        #[arg(long, value_enum, value_name = "MODE")]
        mode: Option<RunMode>,
        /// Jog offset in follower pulses (toward RIGHT when positive)
        #[arg(long, value_name = "PULSES", allow_hyphen_values = true)]
        jog: Option<i64>,
        /// Left travel bound in follower pulses
        #[arg(long = "left-stop", value_name = "PULSES", allow_hyphen_values = true)]
        left_stop: Option<i64>,
        /// Right travel bound in follower pulses
        #[arg(long = "right-stop", value_name = "PULSES", allow_hyphen_values = true)]
        right_stop: Option<i64>,
        /// Keep stop bounds out of deceleration planning
        #[arg(long = "no-enforce-stops", action = ArgAction::SetTrue)]
        no_enforce_stops: bool,
        /// Stop after this long; default is to run until ctrl-c
        #[arg(long = "duration-ms", value_name = "MS")]
        duration_ms: Option<u64>,
        /// Spin the simulated spindle at this RPM (simulation backend;
        /// negative runs in reverse)
        #[arg(long = "sim-rpm", value_name = "RPM", allow_hyphen_values = true, default_value_t = 0.0)]
        sim_rpm: f64,
        /// Enable real-time mode (SCHED_FIFO, affinity, mlockall)
        #[arg(
            long,
            action = ArgAction::SetTrue,
            long_help = "Enable real-time mode on supported OSes.\n\nLinux: Attempts SCHED_FIFO priority, pins to CPU 0, and calls mlockall to lock the process address space into RAM. This reduces page faults and pulse jitter but may require elevated privileges or ulimits (e.g., memlock). Use with care on shared systems.\n\nmacOS: Only mlockall is applied; SCHED_FIFO/affinity are unavailable."
        )]
        rt: bool,
        /// Real-time priority for SCHED_FIFO on Linux (1..=max); ignored on macOS
        #[arg(
            long,
            value_name = "PRIO",
            long_help = "SCHED_FIFO priority when --rt is enabled (Linux only). Higher values run before lower ones. Range is platform-defined (usually 1..=99)."
        )]
        rt_prio: Option<i32>,
        /// Select memory locking mode for --rt: none, current, or all
        #[arg(
            long,
            value_enum,
            value_name = "MODE",
            long_help = "Select memory locking mode when --rt is enabled.\n- none: do not lock memory.\n- current: lock currently resident pages (mlockall(MCL_CURRENT)).\n- all: lock current and future pages (mlockall(MCL_CURRENT|MCL_FUTURE)).\nDefault: current on Linux, none on macOS."
        )]
        rt_lock: Option<RtLock>,
        /// Real-time CPU index to pin the process to (Linux only; defaults to 0)
        #[arg(
            long,
            value_name = "CPU",
            long_help = "Select the CPU index to pin the process to when --rt is enabled (Linux only). Defaults to 0. The value must be allowed by the current affinity mask; otherwise affinity is left unchanged and a warning is printed."
        )]
        rt_cpu: Option<usize>,
        /// Print tick loop latency stats
        #[arg(long, action = ArgAction::SetTrue)]
        stats: bool,
    },
    /// Validate the config and exercise one simulated jog pulse
    SelfCheck,
    /// List the pitch table with derived tracking ratios
    Pitches,
}
