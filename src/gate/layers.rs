//! Abstract render contract of the gate
//!
//! Describes what is on screen without any styling: the blocking overlay (if
//! any) and the content layer underneath, which is mounted from the start and
//! never remounted.

use serde::{Deserialize, Serialize};

/// Full-viewport blocking layer
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OverlayLayer {
    /// 1.0 while gated, falling to 0.0 over the exit animation
    pub opacity: f32,
    /// Pointer and keyboard input stops here
    pub intercepts_input: bool,
    /// The call-to-action can be activated
    pub cta_visible: bool,
}

/// Layer holding the landing content
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContentLayer {
    /// Present in the render tree
    pub mounted: bool,
    /// Not visually suppressed
    pub visible: bool,
    /// Receives input
    pub interactive: bool,
}

/// Snapshot of both layers
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GateLayers {
    /// Present while gated and during the exit animation
    pub overlay: Option<OverlayLayer>,
    /// Always mounted
    pub content: ContentLayer,
}

impl GateLayers {
    /// Overlay and content are both in the render tree
    pub fn coexist(&self) -> bool {
        self.overlay.is_some() && self.content.mounted
    }
}

/// Text shown on the gate
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GateCopy {
    /// Decorative glyph above the prompt
    pub symbol: String,
    /// Prompt, one entry per line
    pub prompt: Vec<String>,
    /// Call-to-action label
    pub button_label: String,
    /// Small print under the button
    pub hint: String,
}

impl Default for GateCopy {
    fn default() -> Self {
        GateCopy {
            symbol: "?".into(),
            prompt: vec![
                "¿Estás listo para descubrir".into(),
                "este misterio?".into(),
            ],
            button_label: "Entrar".into(),
            hint: "Se recomienda usar auriculares".into(),
        }
    }
}
