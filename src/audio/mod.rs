//! Platform Audio Contract
//!
//! The audio-output API the unlock sequence drives: construct an engine once,
//! resume it while suspended, and play a silent buffer once so that later
//! playback is permitted on unlock-sensitive platforms.

pub mod unlock;

#[cfg(feature = "streaming")]
pub mod device;
#[cfg(feature = "simulated")]
pub mod simulated;

use crate::Result;
use std::sync::Arc;

/// Default output sample rate when an engine does not report one
pub const DEFAULT_SAMPLE_RATE: u32 = 44_100;

/// Lifecycle state of an audio engine
///
/// An engine that has not been constructed yet is represented by its absence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    /// Constructed but blocked by autoplay policy
    Suspended,
    /// Producing output
    Running,
    /// Shut down by the platform; must not be reused
    Closed,
}

/// Completion callback for an asynchronous resume request
pub type ResumeCallback = Box<dyn FnOnce(Result<()>) + Send + 'static>;

/// A single platform audio-output context
pub trait AudioEngine: Send + Sync {
    /// Current lifecycle state
    fn state(&self) -> EngineState;

    /// Output sample rate in Hz
    fn sample_rate(&self) -> u32;

    /// Request a transition from `Suspended` to `Running`
    ///
    /// Must not block. `on_done` may run inside this call or on a later tick.
    fn resume(&self, on_done: ResumeCallback);

    /// Schedule a buffer for immediate playback
    ///
    /// Must not block until the buffer has been heard.
    fn play_buffer(&self, buffer: &AudioBuffer) -> Result<()>;
}

/// Factory for audio engines
///
/// Construction may be refused by the platform (for example when no output
/// device exists or the user agent denies audio entirely).
pub trait AudioBackend: Send + Sync {
    /// Construct a new engine
    fn create_engine(&self) -> Result<Arc<dyn AudioEngine>>;

    /// Short backend name for logs
    fn name(&self) -> &'static str {
        "audio"
    }
}

impl<B: AudioBackend + ?Sized> AudioBackend for Arc<B> {
    fn create_engine(&self) -> Result<Arc<dyn AudioEngine>> {
        (**self).create_engine()
    }

    fn name(&self) -> &'static str {
        (**self).name()
    }
}

/// Block of f32 samples
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBuffer {
    channels: u16,
    sample_rate: u32,
    /// Samples interleaved by frame
    samples: Vec<f32>,
}

impl AudioBuffer {
    /// Create a buffer of silence
    pub fn silent(channels: u16, frames: usize, sample_rate: u32) -> Self {
        AudioBuffer {
            channels,
            sample_rate,
            samples: vec![0.0; frames * channels as usize],
        }
    }

    /// The primer used to unblock output: one channel, one frame of silence
    pub fn primer(sample_rate: u32) -> Self {
        Self::silent(1, 1, sample_rate)
    }

    /// Number of channels
    pub fn channels(&self) -> u16 {
        self.channels
    }

    /// Sample rate in Hz
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Number of frames
    pub fn frames(&self) -> usize {
        if self.channels == 0 {
            0
        } else {
            self.samples.len() / self.channels as usize
        }
    }

    /// Interleaved samples
    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    /// Playback length in seconds
    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            0.0
        } else {
            self.frames() as f64 / self.sample_rate as f64
        }
    }

    /// All samples are zero
    pub fn is_silent(&self) -> bool {
        self.samples.iter().all(|&s| s == 0.0)
    }
}
