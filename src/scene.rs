//! Presentational collaborators
//!
//! Background noise, particle field and hero text. They hold no gate state:
//! they are mounted once with the page and keep rendering whether or not the
//! content layer is visible. Their drawing lives elsewhere; here they only
//! track the frames they were asked to render.

/// Per-frame inputs handed to every component
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameContext {
    /// Clock time of the frame (ms)
    pub now_ms: u64,
    /// Content layer is visible
    pub visible: bool,
}

/// A presentational component of the landing scene
pub trait SceneComponent: Send {
    /// Component name
    fn name(&self) -> &'static str;

    /// Render one frame
    fn render(&mut self, frame: FrameContext);

    /// Frames rendered since mount
    fn frames_rendered(&self) -> u64;
}

macro_rules! frame_counter_component {
    ($ty:ident, $name:literal, $doc:literal) => {
        #[doc = $doc]
        #[derive(Debug, Default)]
        pub struct $ty {
            frames: u64,
            last_frame_ms: Option<u64>,
        }

        impl $ty {
            /// Clock time of the most recent frame
            pub fn last_frame_ms(&self) -> Option<u64> {
                self.last_frame_ms
            }
        }

        impl SceneComponent for $ty {
            fn name(&self) -> &'static str {
                $name
            }

            fn render(&mut self, frame: FrameContext) {
                self.frames += 1;
                self.last_frame_ms = Some(frame.now_ms);
            }

            fn frames_rendered(&self) -> u64 {
                self.frames
            }
        }
    };
}

frame_counter_component!(NoiseBackground, "noise-background", "Animated film-grain texture");
frame_counter_component!(Particles, "particles", "Drifting particle field");
frame_counter_component!(TeaserHero, "teaser-hero", "Hero text of the teaser");

/// Components mounted under the gate's content layer
pub struct Scene {
    components: Vec<Box<dyn SceneComponent>>,
}

impl Scene {
    /// The landing scene: noise, particles, hero text
    pub fn landing() -> Self {
        Scene {
            components: vec![
                Box::new(NoiseBackground::default()),
                Box::new(Particles::default()),
                Box::new(TeaserHero::default()),
            ],
        }
    }

    /// Render one frame of every component
    pub fn render(&mut self, frame: FrameContext) {
        for component in &mut self.components {
            component.render(frame);
        }
    }

    /// Component names, in paint order
    pub fn names(&self) -> Vec<&'static str> {
        self.components.iter().map(|c| c.name()).collect()
    }

    /// Frames rendered per component, in paint order
    pub fn frames_rendered(&self) -> Vec<u64> {
        self.components.iter().map(|c| c.frames_rendered()).collect()
    }
}

impl std::fmt::Debug for Scene {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scene").field("components", &self.names()).finish()
    }
}
