//! Downstream Effect Scheduler
//!
//! A one-shot timer armed on the false→true edge of an `enabled` flag. When
//! the timer elapses the effect becomes active for good; later flag changes
//! never re-arm it. The timer belongs to the scheduler's owner and is
//! cancelled when the owner is torn down, so no callback outlives it.

pub mod glitch;

use crate::runtime::{EventLoop, TimerHandle};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

/// Activation inputs and result of a delayed effect
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EffectActivation {
    /// Permission to run, as last seen by the scheduler
    pub enabled: bool,
    /// Delay between the activation edge and the effect starting (ms)
    pub initial_delay_ms: u64,
    /// The effect has started
    pub has_fired: bool,
}

#[derive(Default)]
struct EffectState {
    fired: AtomicBool,
    torn_down: AtomicBool,
    fired_at_ms: Mutex<Option<u64>>,
}

/// One-shot delayed activation
pub struct EffectScheduler {
    event_loop: EventLoop,
    initial_delay_ms: u64,
    enabled: bool,
    pending: Option<TimerHandle>,
    state: Arc<EffectState>,
}

impl EffectScheduler {
    /// Create a disabled scheduler
    pub fn new(event_loop: EventLoop, initial_delay_ms: u64) -> Self {
        EffectScheduler {
            event_loop,
            initial_delay_ms,
            enabled: false,
            pending: None,
            state: Arc::new(EffectState::default()),
        }
    }

    /// Feed the current value of the `enabled` flag
    ///
    /// Only edges matter. Rising arms the timer unless the effect already
    /// fired; falling cancels a timer that has not elapsed yet.
    pub fn set_enabled(&mut self, enabled: bool) {
        if enabled == self.enabled {
            return;
        }
        self.enabled = enabled;

        if enabled {
            self.arm();
        } else {
            self.disarm();
        }
    }

    /// Change the delay used by the next arming
    pub fn set_initial_delay_ms(&mut self, initial_delay_ms: u64) {
        self.initial_delay_ms = initial_delay_ms;
    }

    /// Cancel any pending timer; the scheduler stays inert afterwards
    pub fn teardown(&mut self) {
        if !self.state.torn_down.swap(true, Ordering::AcqRel) {
            debug!("effect scheduler torn down");
        }
        self.disarm();
    }

    /// The effect has started
    pub fn is_active(&self) -> bool {
        self.state.fired.load(Ordering::Acquire)
    }

    /// Alias of [`is_active`](Self::is_active): firing is permanent
    pub fn has_fired(&self) -> bool {
        self.is_active()
    }

    /// A timer is waiting to elapse
    pub fn is_armed(&self) -> bool {
        self.pending.as_ref().is_some_and(TimerHandle::is_pending)
    }

    /// Clock time at which the effect started
    pub fn fired_at_ms(&self) -> Option<u64> {
        *self.state.fired_at_ms.lock()
    }

    /// Clock time at which the pending timer elapses
    pub fn due_ms(&self) -> Option<u64> {
        self.pending
            .as_ref()
            .filter(|handle| handle.is_pending())
            .map(TimerHandle::due_ms)
    }

    /// Current activation snapshot
    pub fn activation(&self) -> EffectActivation {
        EffectActivation {
            enabled: self.enabled,
            initial_delay_ms: self.initial_delay_ms,
            has_fired: self.has_fired(),
        }
    }

    fn arm(&mut self) {
        if self.has_fired() || self.is_armed() || self.state.torn_down.load(Ordering::Acquire) {
            return;
        }

        let state = Arc::clone(&self.state);
        let clock = self.event_loop.clone();
        let handle = self.event_loop.schedule(self.initial_delay_ms, move || {
            if state.torn_down.load(Ordering::Acquire) || state.fired.swap(true, Ordering::AcqRel) {
                return;
            }
            let now_ms = clock.now_ms();
            *state.fired_at_ms.lock() = Some(now_ms);
            info!(at_ms = now_ms, "effect activated");
        });

        debug!(
            delay_ms = self.initial_delay_ms,
            due_ms = handle.due_ms(),
            "effect timer armed"
        );
        self.pending = Some(handle);
    }

    fn disarm(&mut self) {
        if let Some(handle) = self.pending.take() {
            if handle.cancel() {
                debug!("effect timer cancelled");
            }
        }
    }
}

impl Drop for EffectScheduler {
    fn drop(&mut self) {
        self.teardown();
    }
}

impl std::fmt::Debug for EffectScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EffectScheduler")
            .field("activation", &self.activation())
            .field("armed", &self.is_armed())
            .finish()
    }
}
