//! Thread lifecycle tests for AxisSampler.
//!
//! The sampler owns a background thread; these tests pin down that the
//! thread starts publishing, follows the source, and is joined on drop
//! without hanging the caller.

use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::{Duration, Instant};

use els_core::sampler::AxisSampler;
use els_traits::{Axis, MonotonicClock};

/// Encoder stand-in the test can move from the outside.
#[derive(Clone)]
struct CounterAxis(Arc<AtomicI64>);

impl Axis for CounterAxis {
    fn position(&self) -> i64 {
        self.0.load(Ordering::Relaxed)
    }
}

#[test]
fn publishes_the_source_position() {
    let counter = Arc::new(AtomicI64::new(42));
    let sampler = AxisSampler::spawn(CounterAxis(counter.clone()), 1_000, MonotonicClock::new());

    // The first sample is taken synchronously in spawn.
    assert_eq!(sampler.position(), 42);

    counter.store(-7, Ordering::Relaxed);
    let deadline = Instant::now() + Duration::from_secs(2);
    while sampler.position() != -7 {
        assert!(Instant::now() < deadline, "sampler never caught up");
        std::thread::sleep(Duration::from_millis(5));
    }
    assert!(sampler.staleness_ms() < 1_000);
}

#[test]
fn handle_implements_axis_over_the_published_count() {
    let counter = Arc::new(AtomicI64::new(5));
    let sampler = AxisSampler::spawn(CounterAxis(counter.clone()), 1_000, MonotonicClock::new());
    let handle = sampler.handle();
    assert_eq!(handle.position(), 5);

    counter.store(99, Ordering::Relaxed);
    let deadline = Instant::now() + Duration::from_secs(2);
    while handle.position() != 99 {
        assert!(Instant::now() < deadline, "handle never saw the update");
        std::thread::sleep(Duration::from_millis(5));
    }
}

#[test]
fn drop_joins_the_thread_promptly() {
    let counter = Arc::new(AtomicI64::new(0));
    let sampler = AxisSampler::spawn(CounterAxis(counter), 10, MonotonicClock::new());
    std::thread::sleep(Duration::from_millis(20));

    let start = Instant::now();
    drop(sampler);
    // Worst case is one sleep period (100ms at 10hz) plus scheduling.
    assert!(
        start.elapsed() < Duration::from_secs(1),
        "drop blocked on the sampler thread"
    );
}

#[test]
fn handle_survives_the_sampler() {
    let counter = Arc::new(AtomicI64::new(1234));
    let sampler = AxisSampler::spawn(CounterAxis(counter), 100, MonotonicClock::new());
    let handle = sampler.handle();
    drop(sampler);

    // The thread is gone; the handle still reads the last published count.
    assert_eq!(handle.position(), 1234);
}

#[test]
fn samplers_do_not_interfere() {
    let a = Arc::new(AtomicI64::new(1));
    let b = Arc::new(AtomicI64::new(2));
    let sampler_a = AxisSampler::spawn(CounterAxis(a), 500, MonotonicClock::new());
    let sampler_b = AxisSampler::spawn(CounterAxis(b), 500, MonotonicClock::new());

    std::thread::sleep(Duration::from_millis(20));
    assert_eq!(sampler_a.position(), 1);
    assert_eq!(sampler_b.position(), 2);
}
