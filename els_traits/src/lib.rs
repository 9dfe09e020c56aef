pub mod clock;

pub use clock::{Clock, ManualClock, MonotonicClock};

/// Lead-axis position source (typically a spindle encoder).
///
/// `position()` is a counter load maintained elsewhere (ISR, polling
/// thread, simulator); it has no side effects and cannot fail.
pub trait Axis {
    /// Current lead position in encoder counts.
    fn position(&self) -> i64;
}

/// Follower STEP/DIR pin interface.
///
/// Direction convention: `true` (high) drives toward increasing position
/// (RIGHT), `false` toward decreasing (LEFT).
pub trait StepperIo {
    /// Current level of the step pin.
    fn read_step_pin(&self) -> Result<bool, Box<dyn std::error::Error + Send + Sync>>;

    fn write_step_pin(
        &mut self,
        high: bool,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;

    fn write_dir_pin(
        &mut self,
        high: bool,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
}

impl<T: Axis + ?Sized> Axis for Box<T> {
    fn position(&self) -> i64 {
        (**self).position()
    }
}

impl<T: Axis + ?Sized> Axis for &T {
    fn position(&self) -> i64 {
        (**self).position()
    }
}

impl<T: Axis + ?Sized> Axis for std::sync::Arc<T> {
    fn position(&self) -> i64 {
        (**self).position()
    }
}

impl<T: StepperIo + ?Sized> StepperIo for Box<T> {
    fn read_step_pin(&self) -> Result<bool, Box<dyn std::error::Error + Send + Sync>> {
        (**self).read_step_pin()
    }

    fn write_step_pin(
        &mut self,
        high: bool,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        (**self).write_step_pin(high)
    }

    fn write_dir_pin(
        &mut self,
        high: bool,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        (**self).write_dir_pin(high)
    }
}
