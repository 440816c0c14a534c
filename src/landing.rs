//! Composition root
//!
//! Wires the landing page together: one audio unlock manager passed
//! explicitly to the gate, the presentational scene mounted unconditionally,
//! and the glitch effect whose `enabled` flag is owned here and raised once,
//! from the gate's `on_enter` callback.

use crate::audio::unlock::AudioUnlockManager;
use crate::audio::AudioBackend;
use crate::config::LandingConfig;
use crate::effect::glitch::{GlitchEffect, GlitchProps};
use crate::gate::{Dispatch, EntryGate, GateLayers, InputEvent};
use crate::runtime::EventLoop;
use crate::scene::{FrameContext, Scene};
use crate::Result;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::debug;

/// The landing page
pub struct LandingPage {
    config: LandingConfig,
    event_loop: EventLoop,
    audio: AudioUnlockManager,
    gate: EntryGate,
    scene: Scene,
    glitch: GlitchEffect,
    glitch_enabled: Arc<AtomicBool>,
}

impl LandingPage {
    /// Build the page in its gated state
    pub fn new<B>(config: LandingConfig, backend: B, event_loop: EventLoop) -> Result<Self>
    where
        B: AudioBackend + 'static,
    {
        config.validate()?;

        let audio = AudioUnlockManager::new(backend, config.audio, event_loop.clone());

        let glitch_enabled = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&glitch_enabled);
        let gate = EntryGate::new(
            audio.clone(),
            event_loop.clone(),
            config.gate_exit_duration_ms,
            move || {
                flag.store(true, Ordering::Release);
                debug!("glitch enabled");
            },
        )
        .with_copy(config.copy.clone());

        let glitch = GlitchEffect::mount(
            event_loop.clone(),
            GlitchProps {
                enabled: false,
                initial_delay_ms: config.glitch_initial_delay_ms,
            },
        );

        Ok(LandingPage {
            config,
            event_loop,
            audio,
            gate,
            scene: Scene::landing(),
            glitch,
            glitch_enabled,
        })
    }

    /// Route input through the gate, then re-render
    pub fn handle(&mut self, event: InputEvent) -> Dispatch {
        let dispatch = self.gate.dispatch(event);
        self.reconcile();
        dispatch
    }

    /// Push current state down to the glitch effect
    ///
    /// The glitch can only be armed here, after `on_enter` has raised the flag.
    pub fn reconcile(&mut self) {
        let props = GlitchProps {
            enabled: self.glitch_enabled.load(Ordering::Acquire),
            initial_delay_ms: self.config.glitch_initial_delay_ms,
        };
        self.glitch.update(props);
    }

    /// Render one frame of the scene under the gate
    pub fn render_frame(&mut self) -> GateLayers {
        let layers = self.gate.layers();
        self.scene.render(FrameContext {
            now_ms: self.event_loop.now_ms(),
            visible: layers.content.visible,
        });
        layers
    }

    /// Current render contract
    pub fn layers(&self) -> GateLayers {
        self.gate.layers()
    }

    /// The entry gate
    pub fn gate(&self) -> &EntryGate {
        &self.gate
    }

    /// The audio unlock manager
    pub fn audio(&self) -> &AudioUnlockManager {
        &self.audio
    }

    /// The glitch effect
    pub fn glitch(&self) -> &GlitchEffect {
        &self.glitch
    }

    /// The presentational scene
    pub fn scene(&self) -> &Scene {
        &self.scene
    }

    /// Configuration in use
    pub fn config(&self) -> &LandingConfig {
        &self.config
    }

    /// Event loop driving the page
    pub fn event_loop(&self) -> &EventLoop {
        &self.event_loop
    }

    /// Unmount: cancels any pending glitch activation
    pub fn teardown(&mut self) {
        self.glitch.teardown();
    }
}

impl std::fmt::Debug for LandingPage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LandingPage")
            .field("gate", &self.gate)
            .field("audio", &self.audio)
            .field("glitch", &self.glitch)
            .finish()
    }
}
