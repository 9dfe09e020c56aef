use std::cell::Cell;
use std::error::Error;
use std::rc::Rc;

use els_core::{
    Direction, KinematicsCfg, MotionContext, MotionMode, StopCfg, TimingCfg, build_leadscrew,
};
use els_traits::ManualClock;
use proptest::prelude::*;

struct SharedAxis(Rc<Cell<i64>>);
impl els_traits::Axis for SharedAxis {
    fn position(&self) -> i64 {
        self.0.get()
    }
}

/// Stepper IO that models the step line and swallows direction writes.
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

/// One scripted tick: optional mode flip, lead movement, clock advance.
#[derive(Clone, Debug)]
struct ScriptStep {
    advance_us: u64,
    lead_delta: i64,
    mode: Option<MotionMode>,
}

prop_compose! {
    fn step_strategy()(
        advance_us in 0u64..5_000,
        lead_delta in -3i64..=3,
        mode_sel in 0u8..6,
    ) -> ScriptStep {
        let mode = match mode_sel {
            0 => Some(MotionMode::Disabled),
            1 => Some(MotionMode::Jog),
            2 => Some(MotionMode::Enabled),
            _ => None,
        };
        ScriptStep { advance_us, lead_delta, mode }
    }
}

prop_compose! {
    fn script_strategy()(steps in prop::collection::vec(step_strategy(), 1..80)) -> Vec<ScriptStep> {
        steps
    }
}

prop_compose! {
    fn ratio_strategy()(raw in -2.0f64..2.0) -> f64 {
        if raw.abs() < 0.01 { 0.5 } else { raw }
    }
}

proptest! {
    #[test]
    fn update_holds_ramp_invariants(script in script_strategy(), ratio in ratio_strategy()) {
        let lead = Rc::new(Cell::new(0i64));
        let clock = ManualClock::new();
        let timing = TimingCfg::default();
        let initial = timing.initial_pulse_delay_us;
        let mut ls = build_leadscrew(
            SharedAxis(lead.clone()),
            SinkPins::default(),
            timing,
            KinematicsCfg::default(),
            StopCfg::default(),
            ratio,
            Some(Box::new(clock.clone())),
        )
        .expect("build leadscrew");
        let ctx = MotionContext::new();

        for step in script {
            lead.set(lead.get().saturating_add(step.lead_delta));
            if let Some(mode) = step.mode {
                ctx.set_motion_mode(mode);
            }
            clock.advance_micros(step.advance_us);
            ls.update(&ctx).expect("tick");

            let delay = ls.current_pulse_delay_us();
            prop_assert!(
                (0.0..=initial).contains(&delay),
                "pulse delay escaped its clamp: {delay}"
            );
            prop_assert!(
                ls.accumulator().abs() <= 1.0,
                "accumulator overflowed: {}",
                ls.accumulator()
            );
            if ls.direction() == Direction::Unknown {
                prop_assert_eq!(
                    ls.position_error(), 0,
                    "rest direction with pending error"
                );
            }
        }
    }

    #[test]
    fn disabled_always_repins_and_rests(lead_pos in -1_000_000i64..1_000_000) {
        let lead = Rc::new(Cell::new(0i64));
        let clock = ManualClock::new();
        let mut ls = build_leadscrew(
            SharedAxis(lead.clone()),
            SinkPins::default(),
            TimingCfg::default(),
            KinematicsCfg::default(),
            StopCfg::default(),
            1.25,
            Some(Box::new(clock.clone())),
        )
        .expect("build leadscrew");
        let ctx = MotionContext::new();

        lead.set(lead_pos);
        clock.advance_micros(100);
        ls.update(&ctx).expect("tick");

        prop_assert_eq!(ls.position_error(), 0);
        prop_assert_eq!(ls.direction(), Direction::Unknown);
        prop_assert_eq!(ls.current_position(), ls.expected_position());
    }
}
