//! Shared motion mode and sync state.
//!
//! `MotionContext` is the handshake between the tick loop and whoever
//! operates it (CLI thread, signal handler, UI). Each field is an
//! independent atomic; there are no cross-field transactions and one
//! writer per field: operators write the mode, the core writes the sync
//! state and flips jog completion back to Disabled. Relaxed ordering is
//! enough because the loop only relies on per-field modification order; a
//! store made between ticks is observed by the next tick's single read.

use std::sync::atomic::{AtomicU8, Ordering};

/// Operating mode commanded by the operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MotionMode {
    /// Declutched: no pulses, follower model pinned to the lead axis.
    Disabled,
    /// Manual fixed-cadence motion toward the jog target.
    Jog,
    /// Ratio tracking with the acceleration ramp.
    Enabled,
}

impl MotionMode {
    fn from_u8(v: u8) -> Self {
        match v {
            1 => MotionMode::Jog,
            2 => MotionMode::Enabled,
            _ => MotionMode::Disabled,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            MotionMode::Disabled => 0,
            MotionMode::Jog => 1,
            MotionMode::Enabled => 2,
        }
    }
}

/// Whether the follower is thread-synchronized with the lead axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadSyncState {
    Unsynced,
    Sync,
}

/// Shared flags between the motion loop and its operators.
#[derive(Debug, Default)]
pub struct MotionContext {
    mode: AtomicU8,
    sync: AtomicU8,
}

impl MotionContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn motion_mode(&self) -> MotionMode {
        MotionMode::from_u8(self.mode.load(Ordering::Relaxed))
    }

    pub fn set_motion_mode(&self, mode: MotionMode) {
        self.mode.store(mode.as_u8(), Ordering::Relaxed);
    }

    pub fn thread_sync_state(&self) -> ThreadSyncState {
        if self.sync.load(Ordering::Relaxed) == 1 {
            ThreadSyncState::Sync
        } else {
            ThreadSyncState::Unsynced
        }
    }

    pub fn set_thread_sync_state(&self, state: ThreadSyncState) {
        let v = match state {
            ThreadSyncState::Unsynced => 0,
            ThreadSyncState::Sync => 1,
        };
        self.sync.store(v, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_disabled_and_unsynced() {
        let ctx = MotionContext::new();
        assert_eq!(ctx.motion_mode(), MotionMode::Disabled);
        assert_eq!(ctx.thread_sync_state(), ThreadSyncState::Unsynced);
    }

    #[test]
    fn mode_round_trips() {
        let ctx = MotionContext::new();
        for mode in [MotionMode::Jog, MotionMode::Enabled, MotionMode::Disabled] {
            ctx.set_motion_mode(mode);
            assert_eq!(ctx.motion_mode(), mode);
        }
    }

    #[test]
    fn sync_round_trips() {
        let ctx = MotionContext::new();
        ctx.set_thread_sync_state(ThreadSyncState::Sync);
        assert_eq!(ctx.thread_sync_state(), ThreadSyncState::Sync);
        ctx.set_thread_sync_state(ThreadSyncState::Unsynced);
        assert_eq!(ctx.thread_sync_state(), ThreadSyncState::Unsynced);
    }
}
