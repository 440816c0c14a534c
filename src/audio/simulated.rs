//! In-process audio platform
//!
//! Behaves like a browser audio context under an autoplay policy: engines can
//! start suspended, resume completes asynchronously on the event loop, and
//! construction, resume or playback can be made to fail. Every interaction is
//! counted so callers can check exactly what the unlock sequence did.

use super::{AudioBackend, AudioBuffer, AudioEngine, EngineState, ResumeCallback};
use crate::runtime::EventLoop;
use crate::{GateError, Result};
use parking_lot::Mutex;
use std::sync::{Arc, Weak};

/// Resume latency of the browser preset (ms)
pub const DEFAULT_RESUME_LATENCY_MS: u64 = 5;

/// Interaction counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BackendCounters {
    /// Calls to `create_engine`, successful or not
    pub create_attempts: u32,
    /// Engines handed out
    pub engines_created: u32,
    /// Resume requests received
    pub resume_requests: u32,
    /// Buffers accepted for playback
    pub buffers_played: u32,
}

#[derive(Debug, Clone, Copy)]
struct Settings {
    initial_state: EngineState,
    sample_rate: u32,
    resume_latency_ms: u64,
    create_failures: u32,
    resume_failures: u32,
    resume_stalls: u32,
    playback_failures: u32,
}

struct Shared {
    event_loop: EventLoop,
    settings: Mutex<Settings>,
    counters: Mutex<BackendCounters>,
    played: Mutex<Vec<AudioBuffer>>,
    last_engine: Mutex<Weak<SimulatedEngine>>,
}

/// Simulated audio backend
///
/// Clones share settings and counters, so a test can keep a handle after
/// giving the backend to a manager.
#[derive(Clone)]
pub struct SimulatedBackend {
    shared: Arc<Shared>,
}

impl SimulatedBackend {
    fn with_state(event_loop: EventLoop, initial_state: EngineState) -> Self {
        SimulatedBackend {
            shared: Arc::new(Shared {
                event_loop,
                settings: Mutex::new(Settings {
                    initial_state,
                    sample_rate: super::DEFAULT_SAMPLE_RATE,
                    resume_latency_ms: DEFAULT_RESUME_LATENCY_MS,
                    create_failures: 0,
                    resume_failures: 0,
                    resume_stalls: 0,
                    playback_failures: 0,
                }),
                counters: Mutex::new(BackendCounters::default()),
                played: Mutex::new(Vec::new()),
                last_engine: Mutex::new(Weak::new()),
            }),
        }
    }

    /// Engines start suspended until resumed from a gesture
    pub fn browser(event_loop: EventLoop) -> Self {
        Self::with_state(event_loop, EngineState::Suspended)
    }

    /// Engines start running (no autoplay restriction)
    pub fn running(event_loop: EventLoop) -> Self {
        Self::with_state(event_loop, EngineState::Running)
    }

    /// Set the delay between a resume request and its completion
    pub fn with_resume_latency_ms(self, latency_ms: u64) -> Self {
        self.shared.settings.lock().resume_latency_ms = latency_ms;
        self
    }

    /// Set the sample rate reported by new engines
    pub fn with_sample_rate(self, sample_rate: u32) -> Self {
        self.shared.settings.lock().sample_rate = sample_rate;
        self
    }

    /// Refuse the next `n` engine constructions
    pub fn fail_next_creates(self, n: u32) -> Self {
        self.shared.settings.lock().create_failures = n;
        self
    }

    /// Refuse every engine construction
    pub fn deny_audio(self) -> Self {
        self.fail_next_creates(u32::MAX)
    }

    /// Fail the next `n` resume requests
    pub fn fail_next_resumes(self, n: u32) -> Self {
        self.shared.settings.lock().resume_failures = n;
        self
    }

    /// Never answer the next `n` resume requests
    pub fn stall_next_resumes(self, n: u32) -> Self {
        self.shared.settings.lock().resume_stalls = n;
        self
    }

    /// Reject the next `n` buffers
    pub fn fail_next_playbacks(self, n: u32) -> Self {
        self.shared.settings.lock().playback_failures = n;
        self
    }

    /// Snapshot of the interaction counters
    pub fn counters(&self) -> BackendCounters {
        *self.shared.counters.lock()
    }

    /// Every buffer accepted for playback, in order
    pub fn played_buffers(&self) -> Vec<AudioBuffer> {
        self.shared.played.lock().clone()
    }

    /// Most recently constructed engine, while someone still holds it
    pub fn last_engine(&self) -> Option<Arc<SimulatedEngine>> {
        self.shared.last_engine.lock().upgrade()
    }
}

impl AudioBackend for SimulatedBackend {
    fn create_engine(&self) -> Result<Arc<dyn AudioEngine>> {
        self.shared.counters.lock().create_attempts += 1;

        let settings = {
            let mut settings = self.shared.settings.lock();
            if settings.create_failures > 0 {
                if settings.create_failures != u32::MAX {
                    settings.create_failures -= 1;
                }
                return Err(GateError::AudioUnavailable(
                    "audio context construction denied".into(),
                ));
            }
            *settings
        };

        let engine = Arc::new(SimulatedEngine {
            state: Arc::new(Mutex::new(settings.initial_state)),
            sample_rate: settings.sample_rate,
            shared: Arc::clone(&self.shared),
        });
        self.shared.counters.lock().engines_created += 1;
        *self.shared.last_engine.lock() = Arc::downgrade(&engine);
        Ok(engine as Arc<dyn AudioEngine>)
    }

    fn name(&self) -> &'static str {
        "simulated"
    }
}

/// Engine handed out by [`SimulatedBackend`]
pub struct SimulatedEngine {
    state: Arc<Mutex<EngineState>>,
    sample_rate: u32,
    shared: Arc<Shared>,
}

impl SimulatedEngine {
    /// Shut the engine down, as a platform might after a device loss
    pub fn close(&self) {
        *self.state.lock() = EngineState::Closed;
    }
}

impl AudioEngine for SimulatedEngine {
    fn state(&self) -> EngineState {
        *self.state.lock()
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn resume(&self, on_done: ResumeCallback) {
        self.shared.counters.lock().resume_requests += 1;

        let (latency_ms, fail) = {
            let mut settings = self.shared.settings.lock();
            if settings.resume_stalls > 0 {
                settings.resume_stalls -= 1;
                return;
            }
            let fail = settings.resume_failures > 0;
            if fail {
                settings.resume_failures -= 1;
            }
            (settings.resume_latency_ms, fail)
        };

        let state = Arc::clone(&self.state);
        self.shared.event_loop.schedule(latency_ms, move || {
            if fail {
                on_done(Err(GateError::ResumeFailed(
                    "resume rejected by platform".into(),
                )));
                return;
            }

            let resumed = {
                let mut state = state.lock();
                if *state == EngineState::Closed {
                    false
                } else {
                    *state = EngineState::Running;
                    true
                }
            };
            if resumed {
                on_done(Ok(()));
            } else {
                on_done(Err(GateError::ResumeFailed("engine closed".into())));
            }
        });
    }

    fn play_buffer(&self, buffer: &AudioBuffer) -> Result<()> {
        {
            let mut settings = self.shared.settings.lock();
            if settings.playback_failures > 0 {
                settings.playback_failures -= 1;
                return Err(GateError::PlaybackFailed("buffer source rejected".into()));
            }
        }
        if self.state() == EngineState::Closed {
            return Err(GateError::PlaybackFailed("engine closed".into()));
        }

        self.shared.counters.lock().buffers_played += 1;
        self.shared.played.lock().push(buffer.clone());
        Ok(())
    }
}
