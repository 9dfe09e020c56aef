//! Human-readable error descriptions and structured JSON error formatting.

use crate::cli::LAST_LIMITS;

/// Map an eyre::Report to a human-readable explanation with likely causes and fix hints.
pub fn humanize(err: &eyre::Report) -> String {
    use els_core::error::{BuildError, LeadscrewError};

    // Typed matches first
    if let Some(be) = err.downcast_ref::<BuildError>() {
        return match be {
            BuildError::MissingAxis => {
                "What happened: No lead axis was provided to the motion core.\nLikely causes: The encoder failed to initialize or was not wired into the builder.\nHow to fix: Ensure the encoder opens successfully and is passed via with_axis(...).".to_string()
            }
            BuildError::MissingStepperIo => {
                "What happened: No stepper IO was provided to the motion core.\nLikely causes: The stepper driver failed to initialize or was not wired into the builder.\nHow to fix: Ensure the STEP/DIR pins open successfully and are passed via with_stepper_io(...).".to_string()
            }
            BuildError::InvalidConfig(msg) => format!(
                "What happened: Invalid configuration ({msg}).\nLikely causes: Missing or out-of-range values in the TOML, or an unusable ratio.\nHow to fix: Edit the config file or the run flags, then rerun. See README for a sample."
            ),
        };
    }

    if let Some(le) = err.downcast_ref::<LeadscrewError>() {
        return match le {
            LeadscrewError::Hardware(msg) | LeadscrewError::HardwareFault(msg) => format!(
                "What happened: The stepper IO reported a fault ({msg}).\nLikely causes: Wrong STEP/DIR pin numbers, wiring/power issues, or insufficient GPIO permissions.\nHow to fix: Check [pins] in the config and verify the driver wiring, then rerun."
            ),
            LeadscrewError::Config(msg) => format!(
                "What happened: Invalid configuration ({msg}).\nLikely causes: Missing or out-of-range values in the TOML.\nHow to fix: Edit the config file, then rerun."
            ),
        };
    }

    if let Some(hw) = err.downcast_ref::<els_hardware::error::HwError>() {
        return format!(
            "What happened: Failed to initialize hardware ({hw}).\nLikely causes: Incorrect pin numbers or insufficient GPIO permissions.\nHow to fix: Fix the [pins] values in the config; ensure the process may access GPIO."
        );
    }

    // String-based heuristics for errors coming from init or config
    let msg = err.to_string();
    let lower = msg.to_ascii_lowercase();

    if lower.contains("pitch table csv must have headers") {
        return "Invalid headers in pitch table CSV. Expected 'name,pitch_mm'.".to_string();
    }

    if lower.contains("pitch table") || lower.contains("invalid csv row") {
        return format!(
            "What happened: The pitch table could not be used ({msg}).\nLikely causes: Malformed CSV rows, duplicate names, or a non-positive pitch.\nHow to fix: Fix the CSV (headers 'name,pitch_mm', one named pitch per row) and rerun."
        );
    }

    if lower.contains("read config") || lower.contains("parse config") {
        let detail = err.root_cause().to_string();
        return format!(
            "What happened: The config file could not be loaded ({msg}).\nDetail: {detail}\nLikely causes: Wrong --config path or malformed TOML.\nHow to fix: Point --config at a valid TOML file. See README for a sample."
        );
    }

    if lower.contains("invalid configuration") {
        let detail = err.root_cause().to_string();
        return format!(
            "What happened: Configuration is invalid or incomplete ({detail}).\nLikely causes: Missing [pins] (encoder_a, encoder_b, motor_step, motor_dir, ...) or out-of-range values.\nHow to fix: Edit the TOML config and try again."
        );
    }

    if lower.contains("open encoder pins") || lower.contains("open stepper pins") {
        return "What happened: Failed to initialize hardware pins.\nLikely causes: Incorrect pin numbers or insufficient GPIO permissions.\nHow to fix: Fix the [pins] values in the config; ensure the process may access GPIO.".to_string();
    }

    if lower.contains("requires --") || lower.contains("choose exactly one") {
        return format!("What happened: {msg}.\nHow to fix: Rerun with the named flag(s); see --help for usage.");
    }

    // Generic fallback
    let mut cause = String::new();
    if let Some(src) = err.source() {
        cause = format!(" Cause: {src}");
    }
    format!(
        "Something went wrong.{cause}\nHow to fix: Re-run with --log-level=debug for details. Original: {msg}"
    )
}

/// Short stable reason name used in JSON output: config, hardware, or error.
pub fn error_reason(err: &eyre::Report) -> &'static str {
    match exit_code_for_error(err) {
        2 => "config",
        3 => "hardware",
        _ => "error",
    }
}

/// Stable exit codes: 2 for configuration problems, 3 for hardware faults,
/// 1 otherwise.
pub fn exit_code_for_error(err: &eyre::Report) -> i32 {
    use els_core::error::{BuildError, LeadscrewError};

    if err.downcast_ref::<BuildError>().is_some() {
        return 2;
    }
    if let Some(le) = err.downcast_ref::<LeadscrewError>() {
        return match le {
            LeadscrewError::Hardware(_) | LeadscrewError::HardwareFault(_) => 3,
            LeadscrewError::Config(_) => 2,
        };
    }
    if err.downcast_ref::<els_hardware::error::HwError>().is_some() {
        return 3;
    }

    let lower = err.to_string().to_ascii_lowercase();
    if lower.contains("config") || lower.contains("pitch") || lower.contains("ratio") {
        return 2;
    }
    if lower.contains("encoder pins") || lower.contains("stepper pins") || lower.contains("gpio") {
        return 3;
    }
    1
}

/// Structured JSON for errors when --json is enabled.
pub fn format_error_json(err: &eyre::Report) -> String {
    use serde_json::json;

    let reason = error_reason(err);
    let msg = humanize(err);
    let obj = match LAST_LIMITS.get() {
        Some(l) => json!({
            "reason": reason,
            "message": msg,
            "details": {
                "tick_hz": l.tick_hz,
                "duration_ms": l.duration_ms,
                "enforce_stops": l.enforce_stops,
            },
        }),
        None => json!({ "reason": reason, "message": msg }),
    };
    obj.to_string()
}
