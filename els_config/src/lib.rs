#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
//! Config schemas and pitch-table parsing for the leadscrew system.
//!
//! - `Config` and sub-structs are deserialized from TOML and validated.
//! - The pitch table CSV loader enforces headers and rejects unusable
//!   rows before anything reaches the motion core.
use serde::Deserialize;

/// Pitch table CSV schema.
///
/// Expected headers:
/// name,pitch_mm
///
/// Example:
/// name,pitch_mm
/// M10x1.5,1.5
/// 16tpi,1.5875
#[derive(Debug, Deserialize, Clone)]
pub struct PitchRow {
    pub name: String,
    pub pitch_mm: f64,
}

#[derive(Debug, Deserialize)]
pub struct Pins {
    pub encoder_a: u8,
    pub encoder_b: u8,
    pub motor_step: u8,
    pub motor_dir: u8,
    pub motor_en: Option<u8>,
}

#[derive(Debug, Deserialize, Clone, Copy)]
#[serde(default)]
pub struct TimingCfg {
    /// Full-pulse delay at standstill (slowest speed), microseconds.
    pub initial_pulse_delay_us: f64,
    /// Acceleration coefficient: delay change per elapsed microsecond.
    pub pulse_delay_step_us: f64,
    /// Fixed full-pulse delay used while jogging, microseconds.
    pub jog_pulse_delay_us: f64,
    /// Motion loop tick rate.
    pub tick_hz: u32,
}

impl Default for TimingCfg {
    fn default() -> Self {
        Self {
            initial_pulse_delay_us: 2_000.0,
            pulse_delay_step_us: 0.02,
            jog_pulse_delay_us: 1_000.0,
            tick_hz: 1_000,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy)]
#[serde(default)]
pub struct KinematicsCfg {
    /// Follower motor pulses per millimeter of carriage travel.
    pub steps_per_mm: f64,
    /// Follower motor pulses per revolution (after microstepping).
    pub stepper_ppr: u32,
    /// Lead encoder counts per spindle revolution (after quadrature).
    pub encoder_ppr: u32,
}

impl Default for KinematicsCfg {
    fn default() -> Self {
        Self {
            steps_per_mm: 200.0,
            stepper_ppr: 1_600,
            encoder_ppr: 2_400,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy)]
#[serde(default)]
pub struct StopsCfg {
    /// Fold stop bounds into deceleration planning.
    pub enforce: bool,
    /// Left travel bound in follower pulses.
    pub left: Option<i64>,
    /// Right travel bound in follower pulses.
    pub right: Option<i64>,
}

impl Default for StopsCfg {
    fn default() -> Self {
        Self {
            enforce: true,
            left: None,
            right: None,
        }
    }
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct Logging {
    pub file: Option<String>,  // path to .log (JSON lines)
    pub level: Option<String>, // "info","debug"
    /// Log rotation policy: "never" | "daily" | "hourly" (default: never)
    pub rotation: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Config {
    pub pins: Pins,
    #[serde(default)]
    pub timing: TimingCfg,
    #[serde(default)]
    pub kinematics: KinematicsCfg,
    #[serde(default)]
    pub stops: StopsCfg,
    #[serde(default)]
    pub logging: Logging,
}

pub fn load_toml(s: &str) -> Result<Config, toml::de::Error> {
    toml::from_str::<Config>(s)
}

impl Config {
    pub fn validate(&self) -> eyre::Result<()> {
        // Timing
        if !self.timing.initial_pulse_delay_us.is_finite()
            || self.timing.initial_pulse_delay_us <= 0.0
        {
            eyre::bail!("timing.initial_pulse_delay_us must be > 0");
        }
        if !self.timing.pulse_delay_step_us.is_finite() || self.timing.pulse_delay_step_us <= 0.0 {
            eyre::bail!("timing.pulse_delay_step_us must be > 0");
        }
        if !self.timing.jog_pulse_delay_us.is_finite() || self.timing.jog_pulse_delay_us <= 0.0 {
            eyre::bail!("timing.jog_pulse_delay_us must be > 0");
        }
        if self.timing.tick_hz == 0 {
            eyre::bail!("timing.tick_hz must be > 0");
        }
        if self.timing.tick_hz > 1_000_000 {
            eyre::bail!("timing.tick_hz is unreasonably large (>1MHz)");
        }

        // Kinematics
        if !self.kinematics.steps_per_mm.is_finite() || self.kinematics.steps_per_mm <= 0.0 {
            eyre::bail!("kinematics.steps_per_mm must be > 0");
        }
        if self.kinematics.stepper_ppr == 0 {
            eyre::bail!("kinematics.stepper_ppr must be > 0");
        }
        if self.kinematics.encoder_ppr == 0 {
            eyre::bail!("kinematics.encoder_ppr must be > 0");
        }

        // Stops
        if let (Some(l), Some(r)) = (self.stops.left, self.stops.right)
            && l > r
        {
            eyre::bail!("stops.left must not exceed stops.right");
        }

        // Pins: step and dir must not collide
        if self.pins.motor_step == self.pins.motor_dir {
            eyre::bail!("pins.motor_step and pins.motor_dir must differ");
        }
        if self.pins.encoder_a == self.pins.encoder_b {
            eyre::bail!("pins.encoder_a and pins.encoder_b must differ");
        }

        Ok(())
    }
}

/// Tracking ratio for a thread pitch: follower pulses per encoder count.
///
/// One spindle revolution produces `encoder_ppr` counts and must move the
/// carriage `pitch_mm` millimeters, i.e. `pitch_mm * steps_per_mm` pulses.
pub fn ratio_for_pitch(pitch_mm: f64, kinematics: &KinematicsCfg) -> f64 {
    pitch_mm * kinematics.steps_per_mm / f64::from(kinematics.encoder_ppr)
}

/// Validated, name-addressable pitch table.
#[derive(Debug)]
pub struct PitchTable {
    rows: Vec<PitchRow>,
}

impl PitchTable {
    /// Build a table from parsed rows, rejecting rows the operator could
    /// not safely select.
    pub fn from_rows(rows: Vec<PitchRow>) -> eyre::Result<Self> {
        if rows.is_empty() {
            eyre::bail!("pitch table requires at least one row");
        }
        for (idx, row) in rows.iter().enumerate() {
            if row.name.trim().is_empty() {
                eyre::bail!("pitch table row {} has an empty name", idx + 2);
            }
            if !row.pitch_mm.is_finite() || row.pitch_mm <= 0.0 {
                eyre::bail!(
                    "pitch table row {} ({}) has invalid pitch {}",
                    idx + 2,
                    row.name,
                    row.pitch_mm
                );
            }
        }
        for i in 1..rows.len() {
            if rows[..i].iter().any(|r| r.name == rows[i].name) {
                eyre::bail!("pitch table has duplicate name {:?}", rows[i].name);
            }
        }
        Ok(Self { rows })
    }

    /// Pitch in millimeters for a named entry.
    pub fn pitch_mm(&self, name: &str) -> Option<f64> {
        self.rows
            .iter()
            .find(|r| r.name == name)
            .map(|r| r.pitch_mm)
    }

    pub fn rows(&self) -> &[PitchRow] {
        &self.rows
    }
}

impl TryFrom<Vec<PitchRow>> for PitchTable {
    type Error = eyre::Report;
    fn try_from(rows: Vec<PitchRow>) -> Result<Self, Self::Error> {
        Self::from_rows(rows)
    }
}

pub fn load_pitch_table_csv(path: &std::path::Path) -> eyre::Result<PitchTable> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_path(path)
        .map_err(|e| eyre::eyre!("open pitch table CSV {:?}: {}", path, e))?;

    // Enforce exact headers
    let headers = rdr
        .headers()
        .map_err(|e| eyre::eyre!("read CSV headers {:?}: {}", path, e))?
        .clone();
    let expected = ["name", "pitch_mm"];
    let actual: Vec<String> = headers.iter().map(|s| s.to_string()).collect();
    if actual != expected {
        eyre::bail!(
            "pitch table CSV must have headers 'name,pitch_mm', got: {}",
            actual.join(",")
        );
    }

    let mut rows = Vec::new();
    for (idx, rec) in rdr.deserialize::<PitchRow>().enumerate() {
        match rec {
            Ok(row) => rows.push(row),
            Err(e) => {
                eyre::bail!("invalid CSV row {}: {}", idx + 2, e);
            }
        }
    }

    PitchTable::try_from(rows)
}
