//! Landing configuration
//!
//! Timing constants and primer settings. Every field has a default, so a
//! configuration document only needs the values it overrides.

use crate::audio::DEFAULT_SAMPLE_RATE;
use crate::gate::GateCopy;
use crate::{GateError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Exit animation length of the gate overlay (ms)
pub const GATE_EXIT_DURATION_MS: u64 = 800;

/// Delay between entry and the first glitch (ms)
pub const GLITCH_INITIAL_DELAY_MS: u64 = 2_000;

/// How long an unanswered resume request holds the unlock sequence (ms)
pub const RESUME_TIMEOUT_MS: u64 = 3_000;

/// Primer buffer settings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Channels of the silent primer buffer
    pub primer_channels: u16,
    /// Frames of the silent primer buffer
    pub primer_frames: usize,
    /// Sample rate used when an engine reports 0 Hz
    pub fallback_sample_rate: u32,
    /// A resume request still unanswered after this long fails the sequence (ms)
    pub resume_timeout_ms: u64,
}

impl Default for AudioConfig {
    fn default() -> Self {
        AudioConfig {
            primer_channels: 1,
            primer_frames: 1,
            fallback_sample_rate: DEFAULT_SAMPLE_RATE,
            resume_timeout_ms: RESUME_TIMEOUT_MS,
        }
    }
}

/// Configuration of the landing experience
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LandingConfig {
    /// Gate overlay exit animation length (ms)
    pub gate_exit_duration_ms: u64,
    /// Delay from entry to glitch activation (ms)
    pub glitch_initial_delay_ms: u64,
    /// Audio unlock settings
    pub audio: AudioConfig,
    /// Gate text
    pub copy: GateCopy,
}

impl Default for LandingConfig {
    fn default() -> Self {
        LandingConfig {
            gate_exit_duration_ms: GATE_EXIT_DURATION_MS,
            glitch_initial_delay_ms: GLITCH_INITIAL_DELAY_MS,
            audio: AudioConfig::default(),
            copy: GateCopy::default(),
        }
    }
}

impl LandingConfig {
    /// No exit animation and no glitch delay
    ///
    /// Effects still start on the next tick, never inside the entry gesture.
    pub fn instant() -> Self {
        LandingConfig {
            gate_exit_duration_ms: 0,
            glitch_initial_delay_ms: 0,
            ..Self::default()
        }
    }

    /// Parse a JSON document
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: LandingConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a JSON document from disk
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)?;
        Self::from_json_str(&text).map_err(|err| match err {
            GateError::Json(e) => {
                GateError::ConfigError(format!("{}: {}", path.display(), e))
            }
            other => other,
        })
    }

    /// Serialize to pretty JSON
    pub fn to_json_string(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Reject values the unlock sequence cannot work with
    pub fn validate(&self) -> Result<()> {
        if self.audio.primer_channels == 0 {
            return Err(GateError::ConfigError(
                "audio.primer_channels must be at least 1".into(),
            ));
        }
        if self.audio.primer_frames == 0 {
            return Err(GateError::ConfigError(
                "audio.primer_frames must be at least 1".into(),
            ));
        }
        if self.audio.fallback_sample_rate == 0 {
            return Err(GateError::ConfigError(
                "audio.fallback_sample_rate must be non-zero".into(),
            ));
        }
        if self.audio.resume_timeout_ms == 0 {
            return Err(GateError::ConfigError(
                "audio.resume_timeout_ms must be non-zero".into(),
            ));
        }
        Ok(())
    }
}
