//! Timer handles for queued event-loop tasks

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

const PENDING: u8 = 0;
const FIRED: u8 = 1;
const CANCELLED: u8 = 2;

/// Shared status of one queued task
#[derive(Debug)]
pub(crate) struct TimerState {
    due_ms: u64,
    status: AtomicU8,
}

impl TimerState {
    pub(crate) fn new(due_ms: u64) -> Self {
        TimerState {
            due_ms,
            status: AtomicU8::new(PENDING),
        }
    }

    /// Claim the task for execution. Returns false if it was cancelled.
    pub(crate) fn begin(&self) -> bool {
        self.status
            .compare_exchange(PENDING, FIRED, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub(crate) fn is_pending(&self) -> bool {
        self.status.load(Ordering::Acquire) == PENDING
    }
}

/// Handle to a task queued on an [`EventLoop`](super::EventLoop)
///
/// Dropping the handle does not cancel the task.
#[derive(Debug, Clone)]
pub struct TimerHandle {
    state: Arc<TimerState>,
}

impl TimerHandle {
    pub(crate) fn new(state: Arc<TimerState>) -> Self {
        TimerHandle { state }
    }

    /// Cancel the task if it has not run yet
    ///
    /// Returns true if this call cancelled it.
    pub fn cancel(&self) -> bool {
        self.state
            .status
            .compare_exchange(PENDING, CANCELLED, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Task is still waiting to run
    pub fn is_pending(&self) -> bool {
        self.state.is_pending()
    }

    /// Task has run
    pub fn has_fired(&self) -> bool {
        self.state.status.load(Ordering::Acquire) == FIRED
    }

    /// Task was cancelled before it ran
    pub fn is_cancelled(&self) -> bool {
        self.state.status.load(Ordering::Acquire) == CANCELLED
    }

    /// Clock time at which the task becomes due
    pub fn due_ms(&self) -> u64 {
        self.state.due_ms
    }
}
