//! Raspberry Pi GPIO drivers: quadrature spindle encoder and STEP/DIR
//! stepper lines.
//!
//! The encoder is decoded x4 from async edge interrupts on both channels;
//! the decoded count lands in an atomic the motion loop reads through an
//! `EncoderHandle`.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};

use rppal::gpio::{Gpio, InputPin, Level, OutputPin, Trigger};

use crate::error::{HwError, Result};
use els_traits::{Axis, StepperIo};

fn gpio_err(e: rppal::gpio::Error) -> HwError {
    HwError::Gpio(e.to_string())
}

/// Cheap cloneable view over the decoded encoder count.
#[derive(Debug, Clone)]
pub struct EncoderHandle {
    counts: Arc<AtomicI64>,
}

impl Axis for EncoderHandle {
    fn position(&self) -> i64 {
        self.counts.load(Ordering::Relaxed)
    }
}

/// Quadrature encoder on two GPIO inputs with internal pull-ups.
pub struct QuadratureEncoder {
    counts: Arc<AtomicI64>,
    _pin_a: InputPin,
    _pin_b: InputPin,
}

impl QuadratureEncoder {
    pub fn new(pin_a: u8, pin_b: u8) -> Result<Self> {
        let gpio = Gpio::new().map_err(gpio_err)?;
        let mut a = gpio.get(pin_a).map_err(gpio_err)?.into_input_pullup();
        let mut b = gpio.get(pin_b).map_err(gpio_err)?.into_input_pullup();

        let counts = Arc::new(AtomicI64::new(0));
        let a_level = Arc::new(AtomicBool::new(a.is_high()));
        let b_level = Arc::new(AtomicBool::new(b.is_high()));

        // x4 decode: each edge on one channel is compared against the last
        // known level of the other. A leads B for increasing counts.
        {
            let counts = counts.clone();
            let a_level = a_level.clone();
            let b_level = b_level.clone();
            a.set_async_interrupt(Trigger::Both, None, move |event| {
                let high = event.trigger == Level::High;
                a_level.store(high, Ordering::Relaxed);
                let delta = if high == b_level.load(Ordering::Relaxed) {
                    -1
                } else {
                    1
                };
                counts.fetch_add(delta, Ordering::Relaxed);
            })
            .map_err(gpio_err)?;
        }
        {
            let counts = counts.clone();
            let a_level = a_level.clone();
            let b_level = b_level.clone();
            b.set_async_interrupt(Trigger::Both, None, move |event| {
                let high = event.trigger == Level::High;
                b_level.store(high, Ordering::Relaxed);
                let delta = if high == a_level.load(Ordering::Relaxed) {
                    1
                } else {
                    -1
                };
                counts.fetch_add(delta, Ordering::Relaxed);
            })
            .map_err(gpio_err)?;
        }

        tracing::debug!(pin_a, pin_b, "quadrature encoder armed");
        Ok(Self {
            counts,
            _pin_a: a,
            _pin_b: b,
        })
    }

    /// Handle implementing `Axis` over the decoded count.
    pub fn handle(&self) -> EncoderHandle {
        EncoderHandle {
            counts: self.counts.clone(),
        }
    }

    /// Re-zero the count (operator reference point).
    pub fn zero(&self) {
        self.counts.store(0, Ordering::Relaxed);
    }
}

impl Axis for QuadratureEncoder {
    fn position(&self) -> i64 {
        self.counts.load(Ordering::Relaxed)
    }
}

/// STEP/DIR stepper lines, with an optional active-low enable pin that is
/// asserted on construction and released on drop.
pub struct GpioStepper {
    step: OutputPin,
    dir: OutputPin,
    enable: Option<OutputPin>,
}

impl GpioStepper {
    pub fn new(step_pin: u8, dir_pin: u8, enable_pin: Option<u8>) -> Result<Self> {
        let gpio = Gpio::new().map_err(gpio_err)?;
        let mut step = gpio.get(step_pin).map_err(gpio_err)?.into_output();
        step.set_low();
        let mut dir = gpio.get(dir_pin).map_err(gpio_err)?.into_output();
        dir.set_low();
        let enable = match enable_pin {
            Some(pin) => {
                let mut en = gpio.get(pin).map_err(gpio_err)?.into_output();
                en.set_low();
                Some(en)
            }
            None => None,
        };
        tracing::debug!(step_pin, dir_pin, ?enable_pin, "stepper lines ready");
        Ok(Self { step, dir, enable })
    }
}

impl StepperIo for GpioStepper {
    fn read_step_pin(&self) -> std::result::Result<bool, Box<dyn std::error::Error + Send + Sync>> {
        Ok(self.step.is_set_high())
    }

    fn write_step_pin(
        &mut self,
        high: bool,
    ) -> std::result::Result<(), Box<dyn std::error::Error + Send + Sync>> {
        if high {
            self.step.set_high();
        } else {
            self.step.set_low();
        }
        Ok(())
    }

    fn write_dir_pin(
        &mut self,
        high: bool,
    ) -> std::result::Result<(), Box<dyn std::error::Error + Send + Sync>> {
        if high {
            self.dir.set_high();
        } else {
            self.dir.set_low();
        }
        Ok(())
    }
}

impl Drop for GpioStepper {
    fn drop(&mut self) {
        self.step.set_low();
        if let Some(en) = self.enable.as_mut() {
            en.set_high();
        }
    }
}
