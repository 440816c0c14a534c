//! Cooperative Event Loop
//!
//! A single logical thread of control driven by a virtual millisecond clock.
//! Gesture handlers, audio resume completions and effect timers are all tasks
//! on this loop. A task never runs inside the call that queued it: the earliest
//! it can run is the next [`EventLoop::tick`].

mod timer;

pub use timer::TimerHandle;
use timer::TimerState;

use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Unit of work queued on the loop
pub type Task = Box<dyn FnOnce() + Send + 'static>;

struct QueuedTask {
    task: Task,
    timer: Arc<TimerState>,
}

struct LoopState {
    /// Virtual clock
    now_ms: u64,
    /// Insertion counter, keeps FIFO order among tasks due at the same time
    next_seq: u64,
    /// Tasks keyed by (due time, insertion order)
    queue: BTreeMap<(u64, u64), QueuedTask>,
    /// Number of ticks run so far
    ticks: u64,
}

/// Handle to the cooperative event loop
///
/// Cloning yields another handle to the same loop.
#[derive(Clone)]
pub struct EventLoop {
    state: Arc<Mutex<LoopState>>,
}

impl EventLoop {
    /// Create an idle loop with the clock at 0 ms
    pub fn new() -> Self {
        EventLoop {
            state: Arc::new(Mutex::new(LoopState {
                now_ms: 0,
                next_seq: 0,
                queue: BTreeMap::new(),
                ticks: 0,
            })),
        }
    }

    /// Current clock time in milliseconds
    pub fn now_ms(&self) -> u64 {
        self.state.lock().now_ms
    }

    /// Number of ticks run so far
    pub fn tick_count(&self) -> u64 {
        self.state.lock().ticks
    }

    /// Queue a task for the next tick
    pub fn spawn<F>(&self, task: F) -> TimerHandle
    where
        F: FnOnce() + Send + 'static,
    {
        self.schedule(0, task)
    }

    /// Queue a task due `delay_ms` after the current clock time
    ///
    /// A zero delay behaves like [`spawn`](Self::spawn).
    pub fn schedule<F>(&self, delay_ms: u64, task: F) -> TimerHandle
    where
        F: FnOnce() + Send + 'static,
    {
        let mut state = self.state.lock();
        let due_ms = state.now_ms.saturating_add(delay_ms);
        let seq = state.next_seq;
        state.next_seq += 1;

        let timer = Arc::new(TimerState::new(due_ms));
        state.queue.insert(
            (due_ms, seq),
            QueuedTask {
                task: Box::new(task),
                timer: Arc::clone(&timer),
            },
        );
        TimerHandle::new(timer)
    }

    /// Number of queued tasks that have not been cancelled
    pub fn pending(&self) -> usize {
        self.state
            .lock()
            .queue
            .values()
            .filter(|queued| queued.timer.is_pending())
            .count()
    }

    /// Due time of the earliest live task
    pub fn next_due_ms(&self) -> Option<u64> {
        self.state
            .lock()
            .queue
            .iter()
            .find(|(_, queued)| queued.timer.is_pending())
            .map(|(&(due_ms, _), _)| due_ms)
    }

    /// Run every task that is due at the current clock time
    ///
    /// Only tasks queued before this call are considered; anything they queue
    /// waits for the next tick. Returns the number of tasks executed.
    pub fn tick(&self) -> usize {
        let batch: Vec<QueuedTask> = {
            let mut state = self.state.lock();
            state.ticks += 1;
            let now_ms = state.now_ms;
            let due: Vec<(u64, u64)> = state
                .queue
                .range(..=(now_ms, u64::MAX))
                .map(|(key, _)| *key)
                .collect();
            due.into_iter()
                .filter_map(|key| state.queue.remove(&key))
                .collect()
        };

        // Lock released: tasks are free to queue more work or read the clock
        let mut ran = 0;
        for queued in batch {
            if queued.timer.begin() {
                (queued.task)();
                ran += 1;
            }
        }
        ran
    }

    /// Tick at the current clock time until nothing due remains
    pub fn run_until_idle(&self) -> usize {
        let mut ran = 0;
        while self.has_due(self.now_ms()) {
            ran += self.tick();
        }
        ran
    }

    /// Move the clock forward by `ms`, ticking at every intermediate due time
    ///
    /// Returns the number of tasks executed.
    pub fn advance(&self, ms: u64) -> usize {
        let target_ms = self.now_ms().saturating_add(ms);
        let mut ran = 0;

        while let Some(due_ms) = self.first_due_at_or_before(target_ms) {
            self.set_now(due_ms);
            ran += self.tick();
        }

        self.set_now(target_ms);
        ran
    }

    fn has_due(&self, at_ms: u64) -> bool {
        self.first_due_at_or_before(at_ms).is_some()
    }

    fn first_due_at_or_before(&self, at_ms: u64) -> Option<u64> {
        self.state
            .lock()
            .queue
            .keys()
            .next()
            .map(|&(due_ms, _)| due_ms)
            .filter(|&due_ms| due_ms <= at_ms)
    }

    fn set_now(&self, ms: u64) {
        let mut state = self.state.lock();
        // Clock is monotonic
        state.now_ms = state.now_ms.max(ms);
    }
}

impl Default for EventLoop {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for EventLoop {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("EventLoop")
            .field("now_ms", &state.now_ms)
            .field("queued", &state.queue.len())
            .field("ticks", &state.ticks)
            .finish()
    }
}
