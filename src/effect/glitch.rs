//! TV glitch effect
//!
//! The glitch visual consumes exactly two inputs, `enabled` and
//! `initial_delay_ms`, and leaves all timing to its [`EffectScheduler`].

use super::{EffectActivation, EffectScheduler};
use crate::runtime::EventLoop;

/// Inputs of the glitch effect
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GlitchProps {
    /// Set by the composition root once the gate has been entered
    pub enabled: bool,
    /// Delay between enablement and the first glitch (ms)
    pub initial_delay_ms: u64,
}

/// Mounted glitch effect
#[derive(Debug)]
pub struct GlitchEffect {
    scheduler: EffectScheduler,
    props: GlitchProps,
}

impl GlitchEffect {
    /// Mount with the given props
    pub fn mount(event_loop: EventLoop, props: GlitchProps) -> Self {
        let mut scheduler = EffectScheduler::new(event_loop, props.initial_delay_ms);
        scheduler.set_enabled(props.enabled);
        GlitchEffect { scheduler, props }
    }

    /// Apply new props
    pub fn update(&mut self, props: GlitchProps) {
        if props == self.props {
            return;
        }
        if props.initial_delay_ms != self.props.initial_delay_ms {
            self.scheduler.set_initial_delay_ms(props.initial_delay_ms);
        }
        self.scheduler.set_enabled(props.enabled);
        self.props = props;
    }

    /// Glitching has started
    pub fn is_active(&self) -> bool {
        self.scheduler.is_active()
    }

    /// Props last applied
    pub fn props(&self) -> GlitchProps {
        self.props
    }

    /// Scheduler driving this effect
    pub fn scheduler(&self) -> &EffectScheduler {
        &self.scheduler
    }

    /// Activation snapshot
    pub fn activation(&self) -> EffectActivation {
        self.scheduler.activation()
    }

    /// Unmount: cancels a pending activation
    pub fn teardown(&mut self) {
        self.scheduler.teardown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mounted_disabled_stays_idle() {
        let event_loop = EventLoop::new();
        let glitch = GlitchEffect::mount(
            event_loop.clone(),
            GlitchProps {
                enabled: false,
                initial_delay_ms: 2_000,
            },
        );
        event_loop.advance(5_000);
        assert!(!glitch.is_active());
    }

    #[test]
    fn test_enable_through_props() {
        let event_loop = EventLoop::new();
        let mut glitch = GlitchEffect::mount(
            event_loop.clone(),
            GlitchProps {
                enabled: false,
                initial_delay_ms: 2_000,
            },
        );

        event_loop.advance(300);
        glitch.update(GlitchProps {
            enabled: true,
            initial_delay_ms: 2_000,
        });

        event_loop.advance(1_999);
        assert!(!glitch.is_active());
        event_loop.advance(1);
        assert!(glitch.is_active());
        assert_eq!(glitch.scheduler().fired_at_ms(), Some(2_300));
    }

    #[test]
    fn test_delay_change_after_fire_does_not_rearm() {
        let event_loop = EventLoop::new();
        let mut glitch = GlitchEffect::mount(
            event_loop.clone(),
            GlitchProps {
                enabled: true,
                initial_delay_ms: 10,
            },
        );
        event_loop.advance(10);
        assert!(glitch.is_active());

        glitch.update(GlitchProps {
            enabled: true,
            initial_delay_ms: 50,
        });
        assert!(!glitch.scheduler().is_armed());
        assert_eq!(glitch.activation().initial_delay_ms, 50);
    }

    #[test]
    fn test_teardown_before_delay() {
        let event_loop = EventLoop::new();
        let mut glitch = GlitchEffect::mount(
            event_loop.clone(),
            GlitchProps {
                enabled: true,
                initial_delay_ms: 100,
            },
        );
        glitch.teardown();
        event_loop.advance(200);
        assert!(!glitch.is_active());
    }
}
