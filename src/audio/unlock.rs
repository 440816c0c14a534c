//! Audio Unlock Manager
//!
//! Owns the one audio engine of the session and runs the unlock sequence
//! required by autoplay policies: create the engine on first use, resume it if
//! it is suspended, then play a silent primer buffer once.
//!
//! The manager is an explicit, cloneable handle passed down from the
//! composition root. A single latch is checked and set before any work starts,
//! so interleaved gesture handlers can neither construct a second engine nor
//! play the primer twice. Failures are logged and swallowed; the latch is then
//! released so a later gesture can retry from scratch.
//!
//! A resume request that the platform never answers is failed after
//! `AudioConfig::resume_timeout_ms`. Each sequence carries a number, and
//! completions belonging to a sequence that has already finished are dropped.

use super::{AudioBackend, AudioBuffer, AudioEngine, EngineState};
use crate::config::AudioConfig;
use crate::runtime::EventLoop;
use crate::Result;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// How an unlock sequence ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnlockOutcome {
    /// This sequence resumed the engine and played the primer
    Unlocked,
    /// Audio was already unlocked; nothing was done
    AlreadyUnlocked,
    /// Construction, resume or primer playback failed; audio stays locked
    Failed,
}

impl UnlockOutcome {
    /// Audio is usable after this outcome
    pub fn is_unlocked(self) -> bool {
        matches!(self, UnlockOutcome::Unlocked | UnlockOutcome::AlreadyUnlocked)
    }
}

type Waiter = Box<dyn FnOnce(UnlockOutcome) + Send + 'static>;

#[derive(Default)]
struct SignalState {
    outcome: Option<UnlockOutcome>,
    waiters: Vec<Waiter>,
}

/// Completion signal of an unlock sequence
///
/// Callers that arrive while a sequence is running receive a clone of the same
/// signal. Nothing ever blocks on it.
#[derive(Clone, Default)]
pub struct UnlockSignal {
    state: Arc<Mutex<SignalState>>,
}

impl UnlockSignal {
    fn pending() -> Self {
        Self::default()
    }

    fn completed(outcome: UnlockOutcome) -> Self {
        let signal = Self::default();
        signal.state.lock().outcome = Some(outcome);
        signal
    }

    fn complete(&self, outcome: UnlockOutcome) {
        let waiters = {
            let mut state = self.state.lock();
            if state.outcome.is_some() {
                return;
            }
            state.outcome = Some(outcome);
            std::mem::take(&mut state.waiters)
        };
        for waiter in waiters {
            waiter(outcome);
        }
    }

    /// The sequence has finished
    pub fn is_complete(&self) -> bool {
        self.state.lock().outcome.is_some()
    }

    /// Outcome, once finished
    pub fn outcome(&self) -> Option<UnlockOutcome> {
        self.state.lock().outcome
    }

    /// Run `callback` when the sequence finishes (immediately if it already has)
    pub fn on_complete<F>(&self, callback: F)
    where
        F: FnOnce(UnlockOutcome) + Send + 'static,
    {
        let outcome = {
            let mut state = self.state.lock();
            match state.outcome {
                Some(outcome) => outcome,
                None => {
                    state.waiters.push(Box::new(callback));
                    return;
                }
            }
        };
        callback(outcome);
    }
}

impl std::fmt::Debug for UnlockSignal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UnlockSignal")
            .field("outcome", &self.outcome())
            .finish()
    }
}

/// Counters describing what the manager has done so far
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UnlockStats {
    /// Engines constructed
    pub engines_created: u32,
    /// Resume requests issued
    pub resume_requests: u32,
    /// Primer buffers played successfully
    pub primers_played: u32,
    /// Sequences that ended in `Failed`
    pub failures: u32,
    /// Calls that joined a sequence already in flight
    pub joined_calls: u32,
}

struct UnlockState {
    backend: Box<dyn AudioBackend>,
    config: AudioConfig,
    event_loop: EventLoop,
    /// Create-once engine slot
    engine: Mutex<Option<Arc<dyn AudioEngine>>>,
    /// Set before any unlock work starts; cleared only when a sequence fails
    latch: AtomicBool,
    unlocked: AtomicBool,
    /// Signal of the running sequence; its lock also orders latch transitions
    in_flight: Mutex<Option<UnlockSignal>>,
    /// Number of the most recently started sequence
    sequence: AtomicU64,
    stats: Mutex<UnlockStats>,
}

/// Idempotent audio unlock entry point
#[derive(Clone)]
pub struct AudioUnlockManager {
    state: Arc<UnlockState>,
}

impl AudioUnlockManager {
    /// Create a manager over `backend`; no engine is constructed yet
    ///
    /// Resume deadlines are scheduled on `event_loop`.
    pub fn new<B>(backend: B, config: AudioConfig, event_loop: EventLoop) -> Self
    where
        B: AudioBackend + 'static,
    {
        AudioUnlockManager {
            state: Arc::new(UnlockState {
                backend: Box::new(backend),
                config,
                event_loop,
                engine: Mutex::new(None),
                latch: AtomicBool::new(false),
                unlocked: AtomicBool::new(false),
                in_flight: Mutex::new(None),
                sequence: AtomicU64::new(0),
                stats: Mutex::new(UnlockStats::default()),
            }),
        }
    }

    /// Create a manager with the default primer settings and resume timeout
    pub fn with_defaults<B>(backend: B, event_loop: EventLoop) -> Self
    where
        B: AudioBackend + 'static,
    {
        Self::new(backend, AudioConfig::default(), event_loop)
    }

    /// Make sure audio output is unlocked
    ///
    /// Safe to call from any gesture handler any number of times. The returned
    /// signal completes once the resume request and primer playback have been
    /// issued; callers are free to ignore it.
    pub fn ensure_unlocked(&self) -> UnlockSignal {
        let (signal, sequence) = {
            let mut in_flight = self.state.in_flight.lock();

            if self.state.unlocked.load(Ordering::Acquire) {
                return UnlockSignal::completed(UnlockOutcome::AlreadyUnlocked);
            }

            if self.state.latch.swap(true, Ordering::AcqRel) {
                debug!("audio unlock already in flight, joining");
                self.state.stats.lock().joined_calls += 1;
                return in_flight
                    .clone()
                    .unwrap_or_else(|| UnlockSignal::completed(UnlockOutcome::AlreadyUnlocked));
            }

            let signal = UnlockSignal::pending();
            *in_flight = Some(signal.clone());
            let sequence = self.state.sequence.fetch_add(1, Ordering::AcqRel) + 1;
            (signal, sequence)
        };

        debug!(backend = self.state.backend.name(), sequence, "audio unlock started");
        self.run_sequence(sequence);
        signal
    }

    /// Audio has been unlocked for this session
    pub fn is_unlocked(&self) -> bool {
        self.state.unlocked.load(Ordering::Acquire)
    }

    /// An unlock sequence is currently running
    pub fn is_unlocking(&self) -> bool {
        self.state.in_flight.lock().is_some()
    }

    /// The shared engine, constructing it on first access
    pub fn audio_engine(&self) -> Result<Arc<dyn AudioEngine>> {
        self.engine_or_create()
    }

    /// The shared engine, if one has been constructed
    pub fn engine(&self) -> Option<Arc<dyn AudioEngine>> {
        self.state.engine.lock().clone()
    }

    /// Current engine state, `None` before construction
    pub fn engine_state(&self) -> Option<EngineState> {
        self.engine().map(|engine| engine.state())
    }

    /// Snapshot of the manager's counters
    pub fn stats(&self) -> UnlockStats {
        *self.state.stats.lock()
    }

    fn engine_or_create(&self) -> Result<Arc<dyn AudioEngine>> {
        let mut slot = self.state.engine.lock();
        if let Some(engine) = slot.as_ref() {
            return Ok(Arc::clone(engine));
        }

        let engine = self.state.backend.create_engine()?;
        self.state.stats.lock().engines_created += 1;
        info!(
            backend = self.state.backend.name(),
            state = ?engine.state(),
            sample_rate = engine.sample_rate(),
            "audio engine created"
        );
        *slot = Some(Arc::clone(&engine));
        Ok(engine)
    }

    fn run_sequence(&self, sequence: u64) {
        let engine = match self.engine_or_create() {
            Ok(engine) => engine,
            Err(err) => {
                warn!(error = %err, "audio engine construction failed");
                self.finish(UnlockOutcome::Failed, sequence);
                return;
            }
        };

        match engine.state() {
            EngineState::Running => self.prime(&engine, sequence),
            EngineState::Suspended => {
                self.state.stats.lock().resume_requests += 1;
                debug!("resuming suspended audio engine");

                let timeout_ms = self.state.config.resume_timeout_ms;
                let manager = self.clone();
                let deadline = self.state.event_loop.schedule(timeout_ms, move || {
                    if manager.is_current(sequence) {
                        warn!(timeout_ms, "audio engine resume timed out");
                        manager.finish(UnlockOutcome::Failed, sequence);
                    }
                });

                let manager = self.clone();
                let resumed = Arc::clone(&engine);
                engine.resume(Box::new(move |result: Result<()>| {
                    deadline.cancel();
                    match result {
                        Ok(()) => manager.prime(&resumed, sequence),
                        Err(err) => {
                            warn!(error = %err, "audio engine resume failed");
                            manager.finish(UnlockOutcome::Failed, sequence);
                        }
                    }
                }));
            }
            EngineState::Closed => {
                warn!("audio engine closed by platform, discarding it");
                self.state.engine.lock().take();
                self.finish(UnlockOutcome::Failed, sequence);
            }
        }
    }

    /// `sequence` is still running and nothing has finished it
    fn is_current(&self, sequence: u64) -> bool {
        let in_flight = self.state.in_flight.lock();
        in_flight.is_some() && self.state.sequence.load(Ordering::Acquire) == sequence
    }

    fn prime(&self, engine: &Arc<dyn AudioEngine>, sequence: u64) {
        if !self.is_current(sequence) {
            debug!(sequence, "late resume completion ignored");
            return;
        }

        let sample_rate = match engine.sample_rate() {
            0 => self.state.config.fallback_sample_rate,
            rate => rate,
        };
        let primer = AudioBuffer::silent(
            self.state.config.primer_channels,
            self.state.config.primer_frames,
            sample_rate,
        );

        match engine.play_buffer(&primer) {
            Ok(()) => {
                self.state.stats.lock().primers_played += 1;
                info!(frames = primer.frames(), sample_rate, "audio unlocked");
                self.finish(UnlockOutcome::Unlocked, sequence);
            }
            Err(err) => {
                warn!(error = %err, "primer playback failed");
                self.finish(UnlockOutcome::Failed, sequence);
            }
        }
    }

    fn finish(&self, outcome: UnlockOutcome, sequence: u64) {
        let signal = {
            let mut in_flight = self.state.in_flight.lock();
            if in_flight.is_none() || self.state.sequence.load(Ordering::Acquire) != sequence {
                return;
            }
            match outcome {
                UnlockOutcome::Failed => {
                    self.state.stats.lock().failures += 1;
                    self.state.latch.store(false, Ordering::Release);
                }
                _ => self.state.unlocked.store(true, Ordering::Release),
            }
            in_flight.take()
        };

        // Waiters may re-enter the manager, so no lock is held here
        if let Some(signal) = signal {
            signal.complete(outcome);
        }
    }
}

impl std::fmt::Debug for AudioUnlockManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AudioUnlockManager")
            .field("backend", &self.state.backend.name())
            .field("unlocked", &self.is_unlocked())
            .field("stats", &self.stats())
            .finish()
    }
}

#[cfg(all(test, feature = "simulated"))]
mod tests {
    use super::*;
    use crate::audio::simulated::SimulatedBackend;
    use crate::config::RESUME_TIMEOUT_MS;

    fn suspended_manager(latency_ms: u64) -> (EventLoop, SimulatedBackend, AudioUnlockManager) {
        let event_loop = EventLoop::new();
        let backend =
            SimulatedBackend::browser(event_loop.clone()).with_resume_latency_ms(latency_ms);
        let manager = AudioUnlockManager::with_defaults(backend.clone(), event_loop.clone());
        (event_loop, backend, manager)
    }

    #[test]
    fn test_no_engine_before_first_call() {
        let (_loop, backend, manager) = suspended_manager(5);
        assert!(manager.engine().is_none());
        assert_eq!(manager.engine_state(), None);
        assert_eq!(backend.counters().engines_created, 0);
    }

    #[test]
    fn test_suspended_engine_is_resumed_then_primed() {
        let (event_loop, backend, manager) = suspended_manager(5);

        let signal = manager.ensure_unlocked();
        assert!(!signal.is_complete(), "resume is asynchronous");
        assert!(manager.is_unlocking());
        assert_eq!(manager.engine_state(), Some(EngineState::Suspended));

        event_loop.advance(5);

        assert_eq!(signal.outcome(), Some(UnlockOutcome::Unlocked));
        assert!(manager.is_unlocked());
        assert!(!manager.is_unlocking());
        assert_eq!(manager.engine_state(), Some(EngineState::Running));

        let counters = backend.counters();
        assert_eq!(counters.engines_created, 1);
        assert_eq!(counters.resume_requests, 1);
        assert_eq!(counters.buffers_played, 1);

        let primer = &backend.played_buffers()[0];
        assert!(primer.is_silent());
        assert_eq!(primer.frames(), 1);
    }

    #[test]
    fn test_running_engine_skips_resume() {
        let event_loop = EventLoop::new();
        let backend = SimulatedBackend::running(event_loop.clone());
        let manager = AudioUnlockManager::with_defaults(backend.clone(), event_loop.clone());

        let signal = manager.ensure_unlocked();

        assert_eq!(signal.outcome(), Some(UnlockOutcome::Unlocked));
        assert_eq!(backend.counters().resume_requests, 0);
        assert_eq!(manager.stats().primers_played, 1);
    }

    #[test]
    fn test_interleaved_calls_share_one_sequence() {
        let (event_loop, backend, manager) = suspended_manager(20);

        let signals: Vec<UnlockSignal> = (0..5).map(|_| manager.ensure_unlocked()).collect();
        event_loop.advance(20);

        for signal in &signals {
            assert_eq!(signal.outcome(), Some(UnlockOutcome::Unlocked));
        }
        let counters = backend.counters();
        assert_eq!(counters.engines_created, 1);
        assert_eq!(counters.resume_requests, 1);
        assert_eq!(counters.buffers_played, 1);
        assert_eq!(manager.stats().joined_calls, 4);
    }

    #[test]
    fn test_calls_after_unlock_are_noops() {
        let (event_loop, backend, manager) = suspended_manager(0);
        manager.ensure_unlocked();
        event_loop.run_until_idle();
        assert!(manager.is_unlocked());

        for _ in 0..3 {
            let signal = manager.ensure_unlocked();
            assert_eq!(signal.outcome(), Some(UnlockOutcome::AlreadyUnlocked));
        }
        event_loop.run_until_idle();
        assert_eq!(backend.counters().buffers_played, 1);
        assert_eq!(backend.counters().resume_requests, 1);
    }

    #[test]
    fn test_denied_construction_allows_retry() {
        let event_loop = EventLoop::new();
        let backend = SimulatedBackend::running(event_loop.clone()).fail_next_creates(1);
        let manager = AudioUnlockManager::with_defaults(backend.clone(), event_loop.clone());

        let first = manager.ensure_unlocked();
        assert_eq!(first.outcome(), Some(UnlockOutcome::Failed));
        assert!(!manager.is_unlocked());
        assert!(manager.engine().is_none());

        let second = manager.ensure_unlocked();
        assert_eq!(second.outcome(), Some(UnlockOutcome::Unlocked));
        assert_eq!(backend.counters().create_attempts, 2);
        assert_eq!(backend.counters().engines_created, 1);
        assert_eq!(manager.stats().failures, 1);
    }

    #[test]
    fn test_failed_resume_keeps_engine_and_allows_retry() {
        let (event_loop, backend, manager) = suspended_manager(5);
        let backend = backend.fail_next_resumes(1);

        let first = manager.ensure_unlocked();
        event_loop.advance(5);
        assert_eq!(first.outcome(), Some(UnlockOutcome::Failed));
        assert!(!manager.is_unlocked());
        assert_eq!(manager.engine_state(), Some(EngineState::Suspended));

        let second = manager.ensure_unlocked();
        event_loop.advance(5);
        assert_eq!(second.outcome(), Some(UnlockOutcome::Unlocked));
        assert_eq!(backend.counters().engines_created, 1);
        assert_eq!(backend.counters().resume_requests, 2);
    }

    #[test]
    fn test_failed_primer_allows_retry_on_same_engine() {
        let event_loop = EventLoop::new();
        let backend = SimulatedBackend::running(event_loop.clone()).fail_next_playbacks(1);
        let manager = AudioUnlockManager::with_defaults(backend.clone(), event_loop.clone());

        let first = manager.ensure_unlocked();
        assert_eq!(first.outcome(), Some(UnlockOutcome::Failed));
        assert!(!manager.is_unlocked());
        assert!(!manager.is_unlocking());

        let second = manager.ensure_unlocked();
        assert_eq!(second.outcome(), Some(UnlockOutcome::Unlocked));
        assert!(manager.is_unlocked());
        assert_eq!(backend.counters().engines_created, 1);
        assert_eq!(backend.counters().buffers_played, 1);
        assert_eq!(manager.stats().primers_played, 1);
        assert_eq!(manager.stats().failures, 1);
    }

    #[test]
    fn test_unanswered_resume_times_out_and_allows_retry() {
        let (event_loop, backend, manager) = suspended_manager(5);
        let backend = backend.stall_next_resumes(1);

        let first = manager.ensure_unlocked();
        event_loop.advance(RESUME_TIMEOUT_MS - 1);
        assert!(!first.is_complete());
        assert!(manager.is_unlocking());

        event_loop.advance(1);
        assert_eq!(first.outcome(), Some(UnlockOutcome::Failed));
        assert!(!manager.is_unlocking());
        assert!(!manager.is_unlocked());

        let second = manager.ensure_unlocked();
        event_loop.advance(5);
        assert_eq!(second.outcome(), Some(UnlockOutcome::Unlocked));
        assert_eq!(manager.stats().joined_calls, 0);

        let counters = backend.counters();
        assert_eq!(counters.engines_created, 1);
        assert_eq!(counters.resume_requests, 2);
        assert_eq!(counters.buffers_played, 1);
    }

    #[test]
    fn test_resume_deadline_cancelled_on_completion() {
        let (event_loop, _backend, manager) = suspended_manager(5);
        let signal = manager.ensure_unlocked();
        assert_eq!(event_loop.pending(), 2);

        event_loop.advance(5);
        assert_eq!(signal.outcome(), Some(UnlockOutcome::Unlocked));
        assert_eq!(event_loop.pending(), 0);

        event_loop.advance(RESUME_TIMEOUT_MS);
        assert!(manager.is_unlocked());
        assert_eq!(manager.stats().failures, 0);
    }

    #[test]
    fn test_late_resume_completion_does_not_prime() {
        let (event_loop, backend, manager) = suspended_manager(RESUME_TIMEOUT_MS + 2_000);

        let first = manager.ensure_unlocked();
        event_loop.advance(RESUME_TIMEOUT_MS);
        assert_eq!(first.outcome(), Some(UnlockOutcome::Failed));

        // Platform finally answers
        event_loop.advance(2_000);
        assert_eq!(manager.engine_state(), Some(EngineState::Running));
        assert_eq!(backend.counters().buffers_played, 0);
        assert!(!manager.is_unlocked());

        let second = manager.ensure_unlocked();
        assert_eq!(second.outcome(), Some(UnlockOutcome::Unlocked));
        assert_eq!(backend.counters().buffers_played, 1);
        assert_eq!(backend.counters().resume_requests, 1);
    }

    #[test]
    fn test_stale_resume_completion_is_ignored() {
        let (event_loop, backend, manager) = suspended_manager(RESUME_TIMEOUT_MS + 1_000);

        let first = manager.ensure_unlocked();
        event_loop.advance(RESUME_TIMEOUT_MS);
        assert_eq!(first.outcome(), Some(UnlockOutcome::Failed));

        let backend = backend.with_resume_latency_ms(2_000);
        let second = manager.ensure_unlocked();

        // First request completes while the second is still waiting
        event_loop.advance(1_000);
        assert_eq!(manager.engine_state(), Some(EngineState::Running));
        assert!(!second.is_complete());
        assert_eq!(backend.counters().buffers_played, 0);

        event_loop.advance(1_000);
        assert_eq!(second.outcome(), Some(UnlockOutcome::Unlocked));
        assert_eq!(backend.counters().buffers_played, 1);
        assert_eq!(manager.stats().primers_played, 1);
        assert_eq!(manager.stats().failures, 1);
    }

    #[test]
    fn test_closed_engine_is_replaced_on_retry() {
        let (event_loop, backend, manager) = suspended_manager(5);
        let engine = manager.audio_engine().expect("engine");
        backend.last_engine().expect("simulated engine").close();
        assert_eq!(engine.state(), EngineState::Closed);

        let first = manager.ensure_unlocked();
        assert_eq!(first.outcome(), Some(UnlockOutcome::Failed));
        assert!(manager.engine().is_none());

        let second = manager.ensure_unlocked();
        event_loop.advance(5);
        assert_eq!(second.outcome(), Some(UnlockOutcome::Unlocked));
        assert_eq!(backend.counters().engines_created, 2);
    }

    #[test]
    fn test_on_complete_runs_once_ready() {
        let (event_loop, _backend, manager) = suspended_manager(10);
        let seen = Arc::new(Mutex::new(Vec::new()));

        let s = Arc::clone(&seen);
        manager
            .ensure_unlocked()
            .on_complete(move |outcome| s.lock().push(outcome));
        assert!(seen.lock().is_empty());

        event_loop.advance(10);
        assert_eq!(*seen.lock(), vec![UnlockOutcome::Unlocked]);

        let s = Arc::clone(&seen);
        manager
            .ensure_unlocked()
            .on_complete(move |outcome| s.lock().push(outcome));
        assert_eq!(
            *seen.lock(),
            vec![UnlockOutcome::Unlocked, UnlockOutcome::AlreadyUnlocked]
        );
    }
}
