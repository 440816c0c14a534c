//! Entry Gate State Machine
//!
//! `Gated` until the visitor activates the call-to-action, then `Entered` for
//! the rest of the session. Entry is two independent effects of one gesture:
//!
//! 1. a synchronous state transition (latch `has_entered`, notify `on_enter`,
//!    schedule overlay removal after the exit animation), and
//! 2. a fire-and-forget audio unlock with no join point.
//!
//! The transition never waits on audio; a failed unlock costs sound, never
//! access to the content.

mod layers;

pub use layers::{ContentLayer, GateCopy, GateLayers, OverlayLayer};

use crate::audio::unlock::{AudioUnlockManager, UnlockSignal};
use crate::runtime::{EventLoop, TimerHandle};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

/// Observable phase of the gate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatePhase {
    /// Overlay blocks all interaction
    Gated,
    /// Entered; overlay still animating out
    Exiting,
    /// Entered; overlay removed
    Entered,
}

impl GatePhase {
    /// The visitor has passed the gate
    pub fn has_entered(self) -> bool {
        !matches!(self, GatePhase::Gated)
    }
}

/// Result of an activation attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GestureOutcome {
    /// This gesture opened the gate
    Entered,
    /// The gate was already open
    Ignored,
}

/// What an input event is aimed at
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    /// The gate's "enter" button
    CallToAction,
    /// Anything in the content layer
    Content,
}

/// Keys relevant to the gate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    /// Return / Enter
    Enter,
    /// Space bar
    Space,
    /// Escape
    Escape,
    /// Any other key
    Other,
}

/// Pointer or keyboard input
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputEvent {
    /// Pointer click
    Click(Target),
    /// Key press with focus on `target`
    KeyPress {
        /// Focused element
        target: Target,
        /// Key pressed
        key: Key,
    },
}

impl InputEvent {
    /// Click on the call-to-action
    pub fn click_cta() -> Self {
        InputEvent::Click(Target::CallToAction)
    }

    /// Click somewhere in the content
    pub fn click_content() -> Self {
        InputEvent::Click(Target::Content)
    }

    /// Key press with the call-to-action focused
    pub fn key_on_cta(key: Key) -> Self {
        InputEvent::KeyPress {
            target: Target::CallToAction,
            key,
        }
    }

    fn target(&self) -> Target {
        match *self {
            InputEvent::Click(target) => target,
            InputEvent::KeyPress { target, .. } => target,
        }
    }

    /// Would activate a button
    fn activates(&self) -> bool {
        match *self {
            InputEvent::Click(_) => true,
            InputEvent::KeyPress { key, .. } => matches!(key, Key::Enter | Key::Space),
        }
    }
}

/// Where an input event ended up
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    /// Opened the gate
    Entered,
    /// Swallowed by the overlay
    Intercepted,
    /// Reached the content
    Delivered,
    /// Had no effect
    Ignored,
}

type EnterCallback = Box<dyn FnOnce() + Send + 'static>;

/// Per page-load entry state
pub struct GateSession {
    has_entered: AtomicBool,
    overlay_removed: AtomicBool,
    entered_at_ms: Mutex<Option<u64>>,
    activations: AtomicU32,
    on_enter: Mutex<Option<EnterCallback>>,
}

impl GateSession {
    fn new(on_enter: EnterCallback) -> Self {
        GateSession {
            has_entered: AtomicBool::new(false),
            overlay_removed: AtomicBool::new(false),
            entered_at_ms: Mutex::new(None),
            activations: AtomicU32::new(0),
            on_enter: Mutex::new(Some(on_enter)),
        }
    }

    /// Set once, never reset
    pub fn has_entered(&self) -> bool {
        self.has_entered.load(Ordering::Acquire)
    }

    /// Clock time of entry
    pub fn entered_at_ms(&self) -> Option<u64> {
        *self.entered_at_ms.lock()
    }

    /// Activation attempts seen, including ignored ones
    pub fn activations(&self) -> u32 {
        self.activations.load(Ordering::Relaxed)
    }
}

/// The gate in front of the landing content
pub struct EntryGate {
    session: Arc<GateSession>,
    audio: AudioUnlockManager,
    event_loop: EventLoop,
    exit_duration_ms: u64,
    copy: GateCopy,
    exit_timer: Mutex<Option<TimerHandle>>,
    unlock: Mutex<Option<UnlockSignal>>,
}

impl EntryGate {
    /// Create a gate in the `Gated` phase
    ///
    /// `on_enter` runs exactly once, inside the gesture that opens the gate.
    pub fn new<F>(
        audio: AudioUnlockManager,
        event_loop: EventLoop,
        exit_duration_ms: u64,
        on_enter: F,
    ) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        EntryGate {
            session: Arc::new(GateSession::new(Box::new(on_enter))),
            audio,
            event_loop,
            exit_duration_ms,
            copy: GateCopy::default(),
            exit_timer: Mutex::new(None),
            unlock: Mutex::new(None),
        }
    }

    /// Replace the gate text
    pub fn with_copy(mut self, copy: GateCopy) -> Self {
        self.copy = copy;
        self
    }

    /// Call-to-action handler
    ///
    /// Reentrant: only the first activation of the session has any effect.
    pub fn activate(&self) -> GestureOutcome {
        self.session.activations.fetch_add(1, Ordering::Relaxed);

        if self.session.has_entered.swap(true, Ordering::AcqRel) {
            debug!("gate already entered, ignoring activation");
            return GestureOutcome::Ignored;
        }

        // Fire and forget
        let signal = self.audio.ensure_unlocked();
        *self.unlock.lock() = Some(signal);

        let now_ms = self.event_loop.now_ms();
        *self.session.entered_at_ms.lock() = Some(now_ms);
        info!(at_ms = now_ms, "gate entered");

        let on_enter = self.session.on_enter.lock().take();
        if let Some(on_enter) = on_enter {
            on_enter();
        }

        let session = Arc::clone(&self.session);
        let timer = self.event_loop.schedule(self.exit_duration_ms, move || {
            session.overlay_removed.store(true, Ordering::Release);
            debug!("gate overlay removed");
        });
        *self.exit_timer.lock() = Some(timer);

        GestureOutcome::Entered
    }

    /// Route an input event through the gate
    pub fn dispatch(&self, event: InputEvent) -> Dispatch {
        let phase = self.phase();
        match event.target() {
            Target::Content => match phase {
                GatePhase::Entered => Dispatch::Delivered,
                GatePhase::Gated | GatePhase::Exiting => Dispatch::Intercepted,
            },
            Target::CallToAction => {
                if phase != GatePhase::Gated || !event.activates() {
                    return Dispatch::Ignored;
                }
                match self.activate() {
                    GestureOutcome::Entered => Dispatch::Entered,
                    GestureOutcome::Ignored => Dispatch::Ignored,
                }
            }
        }
    }

    /// Current phase
    pub fn phase(&self) -> GatePhase {
        if !self.session.has_entered() {
            GatePhase::Gated
        } else if self.session.overlay_removed.load(Ordering::Acquire) {
            GatePhase::Entered
        } else {
            GatePhase::Exiting
        }
    }

    /// Entry state of this page load
    pub fn session(&self) -> &GateSession {
        &self.session
    }

    /// Gate text
    pub fn copy(&self) -> &GateCopy {
        &self.copy
    }

    /// Exit animation length (ms)
    pub fn exit_duration_ms(&self) -> u64 {
        self.exit_duration_ms
    }

    /// Unlock signal issued on entry
    pub fn unlock_signal(&self) -> Option<UnlockSignal> {
        self.unlock.lock().clone()
    }

    /// Fraction of the exit animation elapsed (0.0 before entry, 1.0 once removed)
    pub fn exit_progress(&self) -> f32 {
        match self.phase() {
            GatePhase::Gated => 0.0,
            GatePhase::Entered => 1.0,
            GatePhase::Exiting => {
                let entered_at = self.session.entered_at_ms().unwrap_or(0);
                if self.exit_duration_ms == 0 {
                    return 1.0;
                }
                let elapsed = self.event_loop.now_ms().saturating_sub(entered_at);
                (elapsed as f32 / self.exit_duration_ms as f32).clamp(0.0, 1.0)
            }
        }
    }

    /// Render contract snapshot
    pub fn layers(&self) -> GateLayers {
        match self.phase() {
            GatePhase::Gated => GateLayers {
                overlay: Some(OverlayLayer {
                    opacity: 1.0,
                    intercepts_input: true,
                    cta_visible: true,
                }),
                content: ContentLayer {
                    mounted: true,
                    visible: false,
                    interactive: false,
                },
            },
            GatePhase::Exiting => GateLayers {
                overlay: Some(OverlayLayer {
                    opacity: 1.0 - self.exit_progress(),
                    intercepts_input: true,
                    cta_visible: false,
                }),
                content: ContentLayer {
                    mounted: true,
                    visible: true,
                    interactive: false,
                },
            },
            GatePhase::Entered => GateLayers {
                overlay: None,
                content: ContentLayer {
                    mounted: true,
                    visible: true,
                    interactive: true,
                },
            },
        }
    }
}

impl std::fmt::Debug for EntryGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntryGate")
            .field("phase", &self.phase())
            .field("entered_at_ms", &self.session.entered_at_ms())
            .field("exit_duration_ms", &self.exit_duration_ms)
            .finish()
    }
}

#[cfg(all(test, feature = "simulated"))]
mod tests {
    use super::*;
    use crate::audio::simulated::SimulatedBackend;
    use crate::audio::unlock::UnlockOutcome;
    use approx::assert_relative_eq;
    use std::sync::atomic::AtomicUsize;

    struct Fixture {
        event_loop: EventLoop,
        backend: SimulatedBackend,
        gate: EntryGate,
        entered: Arc<AtomicUsize>,
    }

    fn fixture(backend: fn(EventLoop) -> SimulatedBackend) -> Fixture {
        let event_loop = EventLoop::new();
        let backend = backend(event_loop.clone());
        let audio = AudioUnlockManager::with_defaults(backend.clone(), event_loop.clone());
        let entered = Arc::new(AtomicUsize::new(0));
        let e = Arc::clone(&entered);
        let gate = EntryGate::new(audio, event_loop.clone(), 800, move || {
            e.fetch_add(1, Ordering::SeqCst);
        });
        Fixture {
            event_loop,
            backend,
            gate,
            entered,
        }
    }

    #[test]
    fn test_starts_gated() {
        let f = fixture(SimulatedBackend::browser);
        assert_eq!(f.gate.phase(), GatePhase::Gated);
        assert!(!f.gate.session().has_entered());

        let layers = f.gate.layers();
        let overlay = layers.overlay.expect("overlay while gated");
        assert!(overlay.intercepts_input && overlay.cta_visible);
        assert!(layers.content.mounted);
        assert!(!layers.content.visible && !layers.content.interactive);
        assert_eq!(f.backend.counters().create_attempts, 0);
    }

    #[test]
    fn test_double_click_enters_once() {
        let f = fixture(SimulatedBackend::browser);

        assert_eq!(f.gate.activate(), GestureOutcome::Entered);
        assert_eq!(f.gate.activate(), GestureOutcome::Ignored);
        assert_eq!(f.gate.dispatch(InputEvent::click_cta()), Dispatch::Ignored);

        f.event_loop.advance(1_000);

        assert_eq!(f.entered.load(Ordering::SeqCst), 1);
        assert_eq!(f.gate.session().activations(), 2);
        let counters = f.backend.counters();
        assert_eq!(counters.engines_created, 1);
        assert_eq!(counters.buffers_played, 1);
    }

    #[test]
    fn test_entry_does_not_wait_for_audio() {
        let f = fixture(SimulatedBackend::browser);

        assert_eq!(f.gate.dispatch(InputEvent::click_cta()), Dispatch::Entered);

        assert!(f.gate.session().has_entered());
        assert_eq!(f.entered.load(Ordering::SeqCst), 1);
        let signal = f.gate.unlock_signal().expect("unlock issued");
        assert!(!signal.is_complete());

        f.event_loop.advance(5);
        assert_eq!(signal.outcome(), Some(UnlockOutcome::Unlocked));
    }

    #[test]
    fn test_denied_audio_still_enters() {
        let f = fixture(|l| SimulatedBackend::browser(l).deny_audio());

        assert_eq!(f.gate.activate(), GestureOutcome::Entered);
        f.event_loop.advance(800);

        assert_eq!(f.gate.phase(), GatePhase::Entered);
        assert_eq!(
            f.gate.unlock_signal().and_then(|s| s.outcome()),
            Some(UnlockOutcome::Failed)
        );
        assert!(f.gate.layers().content.interactive);
    }

    #[test]
    fn test_exit_animation_keeps_both_layers() {
        let f = fixture(SimulatedBackend::browser);
        f.gate.activate();

        assert_eq!(f.gate.phase(), GatePhase::Exiting);
        let layers = f.gate.layers();
        assert!(layers.coexist());
        assert!(layers.content.visible);
        assert!(!layers.content.interactive);
        assert_eq!(
            f.gate.dispatch(InputEvent::click_content()),
            Dispatch::Intercepted
        );

        f.event_loop.advance(400);
        let overlay = f.gate.layers().overlay.expect("still animating");
        assert_relative_eq!(overlay.opacity, 0.5, epsilon = 1e-6);
        assert!(!overlay.cta_visible);

        f.event_loop.advance(399);
        assert_eq!(f.gate.phase(), GatePhase::Exiting);

        f.event_loop.advance(1);
        assert_eq!(f.gate.phase(), GatePhase::Entered);
        assert!(f.gate.layers().overlay.is_none());
        assert_eq!(
            f.gate.dispatch(InputEvent::click_content()),
            Dispatch::Delivered
        );
    }

    #[test]
    fn test_keyboard_activation() {
        let f = fixture(SimulatedBackend::running);

        assert_eq!(
            f.gate.dispatch(InputEvent::key_on_cta(Key::Escape)),
            Dispatch::Ignored
        );
        assert!(!f.gate.session().has_entered());

        assert_eq!(
            f.gate.dispatch(InputEvent::key_on_cta(Key::Space)),
            Dispatch::Entered
        );
        assert_eq!(f.entered.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_content_input_intercepted_while_gated() {
        let f = fixture(SimulatedBackend::browser);
        assert_eq!(
            f.gate.dispatch(InputEvent::click_content()),
            Dispatch::Intercepted
        );
        assert_eq!(
            f.gate.dispatch(InputEvent::KeyPress {
                target: Target::Content,
                key: Key::Enter,
            }),
            Dispatch::Intercepted
        );
        assert!(!f.gate.session().has_entered());
    }

    #[test]
    fn test_entered_is_monotonic() {
        let f = fixture(SimulatedBackend::browser);
        f.gate.activate();
        f.event_loop.advance(5_000);

        for _ in 0..10 {
            f.gate.dispatch(InputEvent::click_cta());
            f.gate.dispatch(InputEvent::key_on_cta(Key::Enter));
            assert!(f.gate.session().has_entered());
            assert_eq!(f.gate.phase(), GatePhase::Entered);
        }
        assert_eq!(f.gate.session().entered_at_ms(), Some(0));
    }
}
