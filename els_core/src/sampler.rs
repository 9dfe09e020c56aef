//! Background lead-axis sampling.
//!
//! Spawns a thread that owns a (possibly slow-to-read) `Axis` source and
//! publishes the latest count into an atomic. The cheap `SampledAxis`
//! handle implements `Axis`, so the tick loop reads a memory cell instead
//! of touching the source directly.
//!
//! Safety: Each `AxisSampler` spawns exactly one thread that is
//! automatically shut down when the sampler is dropped, preventing thread
//! leaks.
use els_traits::Axis;
use els_traits::clock::Clock;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};
use std::time::Instant;

pub struct AxisSampler {
    position: Arc<AtomicI64>,
    last_update: Arc<AtomicU64>,
    epoch: Instant,
    clock: Arc<dyn Clock + Send + Sync>,
    /// Shutdown flag for immediate response (atomic for lock-free check)
    shutdown: Arc<AtomicBool>,
    /// Join handle for graceful thread cleanup
    join_handle: Option<std::thread::JoinHandle<()>>,
}

/// Cheap cloneable handle publishing the sampled count.
#[derive(Debug, Clone)]
pub struct SampledAxis {
    position: Arc<AtomicI64>,
}

impl Axis for SampledAxis {
    fn position(&self) -> i64 {
        self.position.load(Ordering::Relaxed)
    }
}

impl AxisSampler {
    pub fn spawn<A: Axis + Send + 'static, C: Clock + Send + Sync + 'static>(
        source: A,
        hz: u32,
        clock: C,
    ) -> Self {
        let clock: Arc<dyn Clock + Send + Sync> = Arc::new(clock);
        let position = Arc::new(AtomicI64::new(source.position()));
        let position_clone = position.clone();
        let shutdown = Arc::new(AtomicBool::new(false));
        let shutdown_clone = shutdown.clone();
        let last_update = Arc::new(AtomicU64::new(0));
        let last_update_clone = last_update.clone();
        let period = std::time::Duration::from_micros(crate::util::period_us(hz));
        let epoch = clock.now();
        let thread_clock = clock.clone();

        let join_handle = std::thread::spawn(move || {
            loop {
                // Immediate shutdown check (lock-free atomic)
                if shutdown_clone.load(Ordering::Relaxed) {
                    tracing::debug!("axis sampler thread received shutdown signal");
                    break;
                }

                position_clone.store(source.position(), Ordering::Relaxed);
                last_update_clone.store(thread_clock.ms_since(epoch), Ordering::Relaxed);

                // Check shutdown before sleep to avoid unnecessary delay
                if shutdown_clone.load(Ordering::Relaxed) {
                    break;
                }
                thread_clock.sleep(period);
            }
            tracing::trace!("axis sampler thread exiting cleanly");
        });

        Self {
            position,
            last_update,
            epoch,
            clock,
            shutdown,
            join_handle: Some(join_handle),
        }
    }

    /// Handle implementing `Axis` over the published count.
    pub fn handle(&self) -> SampledAxis {
        SampledAxis {
            position: self.position.clone(),
        }
    }

    /// Most recently published count.
    pub fn position(&self) -> i64 {
        self.position.load(Ordering::Relaxed)
    }

    /// Milliseconds since the last publish; staleness telemetry for
    /// drivers that want to notice a wedged source.
    pub fn staleness_ms(&self) -> u64 {
        self.clock
            .ms_since(self.epoch)
            .saturating_sub(self.last_update.load(Ordering::Relaxed))
    }
}

impl Drop for AxisSampler {
    fn drop(&mut self) {
        // Signal shutdown immediately (atomic store is very fast)
        self.shutdown.store(true, Ordering::Relaxed);

        // The thread exits at the next shutdown check; position() is a
        // counter load, so the worst case is one sleep period.
        if let Some(handle) = self.join_handle.take() {
            match handle.join() {
                Ok(()) => {
                    tracing::trace!("axis sampler thread joined successfully");
                }
                Err(e) => {
                    // Thread panicked; log but don't propagate (we're in Drop)
                    tracing::warn!(?e, "axis sampler thread panicked during shutdown");
                }
            }
        }
    }
}
