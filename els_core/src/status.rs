//! Motion status returned from each tick of the update loop.

/// Public status of a single `update()` tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MotionStatus {
    /// Declutched; the follower model is pinned to the lead axis.
    Idle,
    /// Jogging toward the manual target at fixed cadence.
    Jogging,
    /// Following the lead axis through the acceleration ramp.
    Tracking,
    /// Tracking with zero position error; thread sync reported.
    InSync,
}

impl MotionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MotionStatus::Idle => "idle",
            MotionStatus::Jogging => "jogging",
            MotionStatus::Tracking => "tracking",
            MotionStatus::InSync => "in-sync",
        }
    }
}
