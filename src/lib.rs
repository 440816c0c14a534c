//! Mystery Gate
//!
//! Control core of an animated "mystery" landing experience: a full-screen gate
//! blocks interaction until the visitor performs an explicit entry gesture, which
//! unlocks audio playback under browser-style autoplay restrictions and arms a
//! delayed glitch effect over the background visuals.
//!
//! # Features
//! - Idempotent, create-once / prime-once audio unlock sequence
//! - Two-phase entry gate with an exit transition where overlay and content coexist
//! - One-shot delayed effect scheduler armed on the activation edge, cancelled on teardown
//! - Cooperative event loop with a virtual millisecond clock
//!
//! # Crate feature flags
//! - `simulated` (default): In-process audio platform model (`audio::simulated`)
//! - `streaming` (opt-in): Native audio output through the optional `rodio` dep
//!
//! # Quick start
//! ```no_run
//! # #[cfg(feature = "simulated")]
//! # {
//! use mystery_gate::audio::simulated::SimulatedBackend;
//! use mystery_gate::gate::InputEvent;
//! use mystery_gate::{EventLoop, LandingConfig, LandingPage};
//!
//! let event_loop = EventLoop::new();
//! let backend = SimulatedBackend::browser(event_loop.clone());
//! let mut page = LandingPage::new(LandingConfig::default(), backend, event_loop.clone()).unwrap();
//!
//! page.handle(InputEvent::click_cta());
//! event_loop.advance(2_000);
//! assert!(page.glitch().is_active());
//! # }
//! ```

#![warn(missing_docs)]

pub mod audio; // Platform audio contract + unlock manager
pub mod config; // Landing configuration
pub mod effect; // Delayed one-shot effects
pub mod gate; // Entry gate state machine
pub mod landing; // Composition root
pub mod runtime; // Cooperative event loop
pub mod scene; // Presentational collaborators

/// Error types for gate, audio and configuration operations
#[derive(thiserror::Error, Debug)]
pub enum GateError {
    /// Platform refused to construct an audio engine
    #[error("Audio engine unavailable: {0}")]
    AudioUnavailable(String),

    /// Resuming a suspended audio engine failed
    #[error("Audio resume failed: {0}")]
    ResumeFailed(String),

    /// Scheduling a buffer for playback failed
    #[error("Audio playback failed: {0}")]
    PlaybackFailed(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    ConfigError(String),

    /// IO error from filesystem
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed configuration document
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl From<String> for GateError {
    /// Converts a String into `GateError::Other`.
    ///
    /// Prefer the specific variants where the failure kind is known.
    fn from(msg: String) -> Self {
        GateError::Other(msg)
    }
}

impl From<&str> for GateError {
    fn from(msg: &str) -> Self {
        GateError::Other(msg.to_string())
    }
}

/// Result type for gate operations
pub type Result<T> = std::result::Result<T, GateError>;

// Public API exports
pub use audio::unlock::{AudioUnlockManager, UnlockOutcome, UnlockSignal, UnlockStats};
pub use audio::{AudioBackend, AudioBuffer, AudioEngine, EngineState};
pub use config::{AudioConfig, LandingConfig};
pub use effect::glitch::{GlitchEffect, GlitchProps};
pub use effect::{EffectActivation, EffectScheduler};
pub use gate::{Dispatch, EntryGate, GateCopy, GateLayers, GatePhase, GestureOutcome, InputEvent};
pub use landing::LandingPage;
pub use runtime::{EventLoop, TimerHandle};

#[cfg(feature = "simulated")]
pub use audio::simulated::{BackendCounters, SimulatedBackend};
#[cfg(feature = "streaming")]
pub use audio::device::RodioBackend;
