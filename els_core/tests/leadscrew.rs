use std::cell::{Cell, RefCell};
use std::error::Error;
use std::rc::Rc;

use els_core::{
    KinematicsCfg, LeadscrewCore, MotionContext, MotionMode, MotionStatus, StopCfg, StopSide,
    TimingCfg, build_leadscrew,
};
use els_traits::ManualClock;

/// Lead axis the test moves by hand.
struct SharedAxis(Rc<Cell<i64>>);
impl els_traits::Axis for SharedAxis {
    fn position(&self) -> i64 {
        self.0.get()
    }
}

#[derive(Default)]
struct PinState {
    step: bool,
    dir: bool,
    dir_writes: u32,
    step_writes: u32,
}

/// Pin spy; the test keeps a second handle on the shared state.
struct SpyPins(Rc<RefCell<PinState>>);
impl els_traits::StepperIo for SpyPins {
    fn read_step_pin(&self) -> Result<bool, Box<dyn Error + Send + Sync>> {
        Ok(self.0.borrow().step)
    }
    fn write_step_pin(&mut self, high: bool) -> Result<(), Box<dyn Error + Send + Sync>> {
        let mut p = self.0.borrow_mut();
        p.step = high;
        p.step_writes += 1;
        Ok(())
    }
    fn write_dir_pin(&mut self, high: bool) -> Result<(), Box<dyn Error + Send + Sync>> {
        let mut p = self.0.borrow_mut();
        p.dir = high;
        p.dir_writes += 1;
        Ok(())
    }
}

struct Rig {
    lead: Rc<Cell<i64>>,
    pins: Rc<RefCell<PinState>>,
    clock: ManualClock,
    ls: LeadscrewCore<SharedAxis, SpyPins>,
}

fn rig(ratio: f64, timing: TimingCfg, kinematics: KinematicsCfg, stops: StopCfg) -> Rig {
    let lead = Rc::new(Cell::new(0i64));
    let pins = Rc::new(RefCell::new(PinState::default()));
    let clock = ManualClock::new();
    let ls = build_leadscrew(
        SharedAxis(lead.clone()),
        SpyPins(pins.clone()),
        timing,
        kinematics,
        stops,
        ratio,
        Some(Box::new(clock.clone())),
    )
    .expect("build leadscrew");
    Rig {
        lead,
        pins,
        clock,
        ls,
    }
}

fn default_rig() -> Rig {
    rig(
        1.0,
        TimingCfg::default(),
        KinematicsCfg::default(),
        StopCfg::default(),
    )
}

#[test]
fn expected_position_follows_lead_times_ratio() {
    let r = rig(
        0.5,
        TimingCfg::default(),
        KinematicsCfg::default(),
        StopCfg::default(),
    );
    r.lead.set(1000);
    assert_eq!(r.ls.expected_position(), 500);
    r.lead.set(-1000);
    assert_eq!(r.ls.expected_position(), -500);
    // Fractional products truncate toward zero.
    r.lead.set(3);
    assert_eq!(r.ls.expected_position(), 1);
    r.lead.set(-3);
    assert_eq!(r.ls.expected_position(), -1);
    // Never cached: each read reflects the live axis.
    r.lead.set(40);
    assert_eq!(r.ls.expected_position(), 20);
}

#[test]
fn set_ratio_rebases_without_position_error() {
    let mut r = default_rig();
    r.lead.set(4_000);
    r.ls.reset_current_position();
    assert_eq!(r.ls.position_error(), 0);

    for ratio in [2.0, 0.25, -1.5, 1.0] {
        r.ls.set_ratio(ratio);
        assert_eq!(
            r.ls.position_error(),
            0,
            "ratio change to {ratio} must not create a transient"
        );
        assert_eq!(r.ls.current_position(), r.ls.expected_position());
    }
}

#[test]
fn stop_bounds_round_trip_and_read_as_sentinels_when_unset() {
    let mut r = default_rig();
    assert_eq!(r.ls.stop_position(StopSide::Left), i64::MIN);
    assert_eq!(r.ls.stop_position(StopSide::Right), i64::MAX);

    r.ls.set_stop_position(StopSide::Left, -4_000);
    r.ls.set_stop_position(StopSide::Right, 12_345);
    assert_eq!(r.ls.stop_position(StopSide::Left), -4_000);
    assert_eq!(r.ls.stop_position(StopSide::Right), 12_345);

    r.ls.clear_stop_position(StopSide::Right);
    assert_eq!(r.ls.stop_position(StopSide::Right), i64::MAX);
    assert_eq!(r.ls.stop_position(StopSide::Left), -4_000);
}

#[test]
fn send_pulse_alternates_and_reports_completion_on_falling_edge() {
    let mut r = default_rig();
    // Pin starts low: first call raises, second completes.
    assert!(!r.ls.send_pulse().expect("rising"));
    assert!(r.pins.borrow().step);
    assert!(r.ls.send_pulse().expect("falling"));
    assert!(!r.pins.borrow().step);
    assert!(!r.ls.send_pulse().expect("rising again"));
    assert!(r.ls.send_pulse().expect("falling again"));
}

#[test]
fn disabled_repins_model_to_lead_axis() {
    let mut r = default_rig();
    let ctx = MotionContext::new();

    r.lead.set(777);
    let status = r.ls.update(&ctx).expect("tick");
    assert_eq!(status, MotionStatus::Idle);
    assert_eq!(r.ls.current_position(), 777);
    assert_eq!(r.ls.position_error(), 0);

    r.lead.set(-33);
    r.ls.update(&ctx).expect("tick");
    assert_eq!(r.ls.current_position(), -33);
}

#[test]
fn disabling_mid_pulse_settles_step_pin_within_one_tick() {
    let mut r = default_rig();
    let ctx = MotionContext::new();

    // Leave a half pulse dangling.
    r.ls.send_pulse().expect("rising");
    assert!(r.pins.borrow().step);

    ctx.set_motion_mode(MotionMode::Disabled);
    let status = r.ls.update(&ctx).expect("tick");
    assert_eq!(status, MotionStatus::Idle);
    assert!(!r.pins.borrow().step, "pending half pulse must settle low");
}

#[test]
fn jog_pulses_at_fixed_cadence_and_hands_mode_back() {
    let mut r = default_rig();
    let ctx = MotionContext::new();
    ctx.set_motion_mode(MotionMode::Jog);

    // Jog three pulses toward RIGHT.
    r.ls.increment_current_position(-3);
    assert_eq!(r.ls.position_error(), 3);

    let jog_us = 1_000u64; // TimingCfg::default().jog_pulse_delay_us
    let mut levels = Vec::new();
    let mut statuses = Vec::new();
    for _ in 0..7 {
        r.clock.advance_micros(jog_us);
        statuses.push(r.ls.update(&ctx).expect("tick"));
        levels.push(r.pins.borrow().step);
    }

    // Tick 1 latches direction; pulses then alternate at the jog cadence.
    assert_eq!(levels, [false, true, false, true, false, true, false]);
    assert!(r.pins.borrow().dir, "jog toward RIGHT drives the dir pin high");
    assert_eq!(r.pins.borrow().dir_writes, 1);

    // The final falling edge works off the last pulse and the mode drops
    // back to Disabled on that same tick.
    assert_eq!(statuses[6], MotionStatus::Idle);
    assert_eq!(ctx.motion_mode(), MotionMode::Disabled);
    assert_eq!(r.ls.position_error(), 0);
    assert!(
        statuses[..6]
            .iter()
            .all(|s| *s == MotionStatus::Jogging),
        "mode stays jog until the offset is worked off: {statuses:?}"
    );
}

#[test]
fn jog_toward_left_drives_dir_pin_low() {
    let mut r = default_rig();
    let ctx = MotionContext::new();
    ctx.set_motion_mode(MotionMode::Jog);

    r.ls.increment_current_position(2);
    assert_eq!(r.ls.position_error(), -2);

    r.clock.advance_micros(1_000);
    r.ls.update(&ctx).expect("latch tick");
    assert!(!r.pins.borrow().dir);
    assert_eq!(r.pins.borrow().dir_writes, 1);

    // Work the jog off and confirm autonomous completion.
    for _ in 0..10 {
        r.clock.advance_micros(1_000);
        r.ls.update(&ctx).expect("tick");
        if ctx.motion_mode() == MotionMode::Disabled {
            break;
        }
    }
    assert_eq!(ctx.motion_mode(), MotionMode::Disabled);
    assert_eq!(r.ls.position_error(), 0);
    assert_eq!(r.ls.current_position(), r.ls.expected_position());
}

#[test]
fn velocity_reads_zero_until_a_full_pulse_completes() {
    let mut r = default_rig();
    assert_eq!(r.ls.estimated_velocity_mm_s(), 0.0);

    let ctx = MotionContext::new();
    ctx.set_motion_mode(MotionMode::Jog);
    r.ls.increment_current_position(-1);

    for _ in 0..3 {
        r.clock.advance_micros(1_000);
        r.ls.update(&ctx).expect("tick");
    }
    // One full pulse measured at 2000us with 200 steps/mm:
    // 500 pulses/s / 200 = 2.5 mm/s.
    let v = r.ls.estimated_velocity_mm_s();
    assert!((v - 2.5).abs() < 1e-9, "velocity {v}");
}
