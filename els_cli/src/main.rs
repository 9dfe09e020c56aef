//! Binary entry point: config loading, tracing setup, command dispatch.

mod cli;
mod error_fmt;
mod rt;
mod run;

use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use clap::Parser;
use eyre::WrapErr;

use cli::{Cli, Commands, FILE_GUARD, JSON_MODE, RtLock};
use els_core::{MotionContext, MotionMode};

fn main() {
    let cli = Cli::parse();
    let json = cli.json;
    let _ = JSON_MODE.set(json);

    if let Err(err) = try_main(cli) {
        if json {
            eprintln!("{}", error_fmt::format_error_json(&err));
        } else {
            eprintln!("{}", error_fmt::humanize(&err));
        }
        std::process::exit(error_fmt::exit_code_for_error(&err));
    }
}

fn try_main(cli: Cli) -> eyre::Result<()> {
    color_eyre::install()?;

    let text = fs::read_to_string(&cli.config)
        .wrap_err_with(|| format!("read config {}", cli.config.display()))?;
    let cfg = els_config::load_toml(&text)
        .wrap_err_with(|| format!("parse config {}", cli.config.display()))?;
    cfg.validate()
        .wrap_err_with(|| format!("invalid configuration in {}", cli.config.display()))?;

    init_tracing(&cli, &cfg);

    match cli.cmd {
        Commands::Run {
            ratio,
            pitch_mm,
            pitch,
            mode,
            jog,
            left_stop,
            right_stop,
            no_enforce_stops,
            duration_ms,
            sim_rpm,
            rt,
            rt_prio,
            rt_lock,
            rt_cpu,
            stats,
        } => {
            rt::setup_rt_once(rt, rt_prio, rt_lock.unwrap_or_else(RtLock::os_default), rt_cpu);

            let shutdown = Arc::new(AtomicBool::new(false));
            let ctx = Arc::new(MotionContext::new());
            {
                let shutdown = Arc::clone(&shutdown);
                let ctx = Arc::clone(&ctx);
                ctrlc::set_handler(move || {
                    shutdown.store(true, Ordering::Relaxed);
                    ctx.set_motion_mode(MotionMode::Disabled);
                })
                .wrap_err("install ctrl-c handler")?;
            }

            let opts = run::RunOpts {
                ratio,
                pitch_mm,
                pitch,
                pitch_table: cli.pitch_table.clone(),
                mode,
                jog,
                left_stop,
                right_stop,
                no_enforce_stops,
                duration_ms,
                sim_rpm,
                stats,
            };

            let started = Instant::now();
            match run::run_leadscrew(&cfg, opts, &ctx, &shutdown) {
                Ok(out) => {
                    if cli.json {
                        println!("{}", run::summary_json(&out));
                    } else {
                        println!(
                            "run complete: {} ticks, position {} (error {}), {:.3} mm/s, status {}",
                            out.ticks,
                            out.final_position,
                            out.final_error,
                            out.velocity_mm_s,
                            out.status.as_str()
                        );
                    }
                    Ok(())
                }
                Err(err) => {
                    if cli.json {
                        println!("{}", run::summary_json_aborted(&err, started.elapsed()));
                    }
                    Err(err)
                }
            }
        }
        Commands::SelfCheck => run::self_check(&cfg, cli.pitch_table.as_deref()),
        Commands::Pitches => {
            let Some(path) = cli.pitch_table.as_deref() else {
                eyre::bail!("pitches requires --pitch-table <FILE>");
            };
            run::list_pitches(&cfg, path, cli.json)
        }
    }
}

/// Console logging to stderr (pretty or JSON), optional JSON file sink
/// with rotation from `[logging]`. `RUST_LOG` overrides the level.
fn init_tracing(cli: &Cli, cfg: &els_config::Config) {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;
    use tracing_subscriber::{EnvFilter, fmt};

    let level = cli
        .log_level
        .clone()
        .or_else(|| cfg.logging.level.clone())
        .unwrap_or_else(|| "info".to_string());
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let file_path = cli
        .log_file
        .clone()
        .or_else(|| cfg.logging.file.clone().map(PathBuf::from));
    let file_layer = file_path.map(|path| {
        let dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let name = path
            .file_name()
            .map_or_else(|| OsString::from("els.log"), OsString::from);
        let appender = match cfg.logging.rotation.as_deref() {
            Some("daily") => tracing_appender::rolling::daily(dir, name),
            Some("hourly") => tracing_appender::rolling::hourly(dir, name),
            _ => tracing_appender::rolling::never(dir, name),
        };
        let (writer, guard) = tracing_appender::non_blocking(appender);
        let _ = FILE_GUARD.set(guard);
        fmt::layer().json().with_writer(writer).with_ansi(false)
    });

    let registry = tracing_subscriber::registry().with(filter).with(file_layer);
    if cli.json {
        registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}
