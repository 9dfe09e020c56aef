use std::cell::Cell;
use std::error::Error;

use criterion::{Criterion, black_box, criterion_group, criterion_main};
use els_core::{
    KinematicsCfg, MotionContext, MotionMode, StopCfg, TimingCfg, build_leadscrew,
};
use els_traits::ManualClock;

struct FixedAxis(i64);
impl els_traits::Axis for FixedAxis {
    fn position(&self) -> i64 {
        self.0
    }
}

#[derive(Default)]
struct SinkPins {
    step: Cell<bool>,
}
impl els_traits::StepperIo for SinkPins {
    fn read_step_pin(&self) -> Result<bool, Box<dyn Error + Send + Sync>> {
        Ok(self.step.get())
    }
    fn write_step_pin(&mut self, high: bool) -> Result<(), Box<dyn Error + Send + Sync>> {
        self.step.set(high);
        Ok(())
    }
    fn write_dir_pin(&mut self, _high: bool) -> Result<(), Box<dyn Error + Send + Sync>> {
        Ok(())
    }
}

pub fn bench_update_tick(c: &mut Criterion) {
    let mut g = c.benchmark_group("update_loop");
    // Allow quick tweaking without CLI flags (Criterion 0.5):
    //   BENCH_SAMPLE_SIZE=20 BENCH_MEAS_MS=200 cargo bench -p els_core --bench update_loop
    if let Ok(ss) = std::env::var("BENCH_SAMPLE_SIZE")
        && let Ok(n) = ss.parse::<usize>()
    {
        g.sample_size(n.max(10));
    }
    if let Ok(ms) = std::env::var("BENCH_MEAS_MS")
        && let Ok(ms_u64) = ms.parse::<u64>()
    {
        g.measurement_time(std::time::Duration::from_millis(ms_u64));
    }

    // Steady-state tracking: the lead sits far away, so every tick runs
    // the full ramp arithmetic and most ticks toggle the step pin.
    {
        let clock = ManualClock::new();
        let ctx = MotionContext::new();
        ctx.set_motion_mode(MotionMode::Enabled);
        let mut ls = build_leadscrew(
            FixedAxis(i64::MAX / 4),
            SinkPins::default(),
            TimingCfg::default(),
            KinematicsCfg::default(),
            StopCfg::default(),
            1.0,
            Some(Box::new(clock.clone())),
        )
        .expect("build leadscrew");
        // Build pins the model to the lead; rebase so the error is huge and
        // the ramp never converges within the measurement window.
        ls.set_current_position(0);
        g.bench_function("tracking_tick", |b| {
            b.iter(|| {
                clock.advance_micros(10);
                black_box(ls.update(&ctx).expect("tick"));
            })
        });
    }

    // Declutched baseline: resync bookkeeping only.
    {
        let clock = ManualClock::new();
        let ctx = MotionContext::new();
        let mut ls = build_leadscrew(
            FixedAxis(0),
            SinkPins::default(),
            TimingCfg::default(),
            KinematicsCfg::default(),
            StopCfg::default(),
            1.0,
            Some(Box::new(clock.clone())),
        )
        .expect("build leadscrew");
        g.bench_function("idle_tick", |b| {
            b.iter(|| {
                clock.advance_micros(10);
                black_box(ls.update(&ctx).expect("tick"));
            })
        });
    }

    g.finish();
}

criterion_group!(update_loop, bench_update_tick);
criterion_main!(update_loop);
