pub mod error;
#[cfg(all(feature = "hardware", target_os = "linux"))]
pub mod gpio;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use els_traits::{Axis, StepperIo};

/// Simulated lead axis: a shared encoder counter the test bench or the
/// spindle simulator moves. Clones observe the same counter.
#[derive(Debug, Clone, Default)]
pub struct SimulatedAxis {
    counts: Arc<AtomicI64>,
}

impl SimulatedAxis {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, counts: i64) {
        self.counts.store(counts, Ordering::Relaxed);
    }

    pub fn add(&self, delta: i64) {
        self.counts.fetch_add(delta, Ordering::Relaxed);
    }
}

impl Axis for SimulatedAxis {
    fn position(&self) -> i64 {
        self.counts.load(Ordering::Relaxed)
    }
}

/// Background spindle: turns a `SimulatedAxis` at a fixed speed.
///
/// The counter is recomputed from the spawn instant on every pass, so the
/// simulated speed does not drift with scheduling jitter. Negative rpm
/// turns the spindle backwards. The thread is joined on drop.
pub struct SpindleSim {
    shutdown: Arc<AtomicBool>,
    join_handle: Option<std::thread::JoinHandle<()>>,
}

impl SpindleSim {
    pub fn spawn(axis: SimulatedAxis, rpm: f64, encoder_ppr: u32) -> Self {
        let shutdown = Arc::new(AtomicBool::new(false));
        let shutdown_clone = shutdown.clone();
        let counts_per_sec = rpm / 60.0 * f64::from(encoder_ppr);
        let base = axis.position();

        let join_handle = std::thread::spawn(move || {
            let epoch = Instant::now();
            tracing::debug!(rpm, encoder_ppr, "spindle simulator running");
            loop {
                if shutdown_clone.load(Ordering::Relaxed) {
                    break;
                }
                let turned = (epoch.elapsed().as_secs_f64() * counts_per_sec) as i64;
                axis.set(base.saturating_add(turned));
                std::thread::sleep(Duration::from_millis(1));
            }
            tracing::trace!("spindle simulator exiting");
        });

        Self {
            shutdown,
            join_handle: Some(join_handle),
        }
    }
}

impl Drop for SpindleSim {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::Relaxed);
        if let Some(handle) = self.join_handle.take()
            && let Err(e) = handle.join()
        {
            tracing::warn!(?e, "spindle simulator thread panicked during shutdown");
        }
    }
}

#[derive(Debug, Default)]
struct SimPins {
    step: AtomicBool,
    dir: AtomicBool,
    full_pulses: AtomicU64,
    net_steps: AtomicI64,
}

/// Simulated STEP/DIR driver that counts what a real drive would do:
/// every falling step edge is one motor step in the latched direction.
#[derive(Debug, Default)]
pub struct SimulatedStepperIo {
    pins: Arc<SimPins>,
}

impl SimulatedStepperIo {
    pub fn new() -> Self {
        Self::default()
    }

    /// Observer handle; stays valid after the driver moves into the core.
    pub fn probe(&self) -> StepperProbe {
        StepperProbe {
            pins: self.pins.clone(),
        }
    }
}

impl StepperIo for SimulatedStepperIo {
    fn read_step_pin(&self) -> Result<bool, Box<dyn std::error::Error + Send + Sync>> {
        Ok(self.pins.step.load(Ordering::Relaxed))
    }

    fn write_step_pin(&mut self, high: bool) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let was_high = self.pins.step.swap(high, Ordering::Relaxed);
        if was_high && !high {
            self.pins.full_pulses.fetch_add(1, Ordering::Relaxed);
            let step = if self.pins.dir.load(Ordering::Relaxed) {
                1
            } else {
                -1
            };
            self.pins.net_steps.fetch_add(step, Ordering::Relaxed);
        }
        Ok(())
    }

    fn write_dir_pin(&mut self, high: bool) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.pins.dir.store(high, Ordering::Relaxed);
        Ok(())
    }
}

/// Read-only view of a `SimulatedStepperIo`.
#[derive(Debug, Clone)]
pub struct StepperProbe {
    pins: Arc<SimPins>,
}

impl StepperProbe {
    pub fn step_level(&self) -> bool {
        self.pins.step.load(Ordering::Relaxed)
    }

    pub fn dir_level(&self) -> bool {
        self.pins.dir.load(Ordering::Relaxed)
    }

    /// Completed full pulses (falling edges) since construction.
    pub fn full_pulses(&self) -> u64 {
        self.pins.full_pulses.load(Ordering::Relaxed)
    }

    /// Signed sum of steps as a drive would count them.
    pub fn net_steps(&self) -> i64 {
        self.pins.net_steps.load(Ordering::Relaxed)
    }
}
