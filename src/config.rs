//! Startup configuration for the windowed gears.

use crate::gfx::context::ContextParams;

/// Settings applied when the window and context are created.
#[derive(Debug, Clone, PartialEq)]
pub struct GearsConfig {
    pub title: String,
    pub width: u32,
    pub height: u32,
    /// Initial view rotations in degrees.
    pub view_rot: [f32; 3],
    pub animate: bool,
    /// Report the frame rate every five seconds.
    pub verbose: bool,
    /// Report the context info right after attaching.
    pub print_info: bool,
    pub context: ContextParams,
}

impl Default for GearsConfig {
    fn default() -> Self {
        Self {
            title: "Gears".to_string(),
            width: 300,
            height: 300,
            view_rot: [20.0, 30.0, 0.0],
            animate: true,
            verbose: false,
            print_info: false,
            context: ContextParams::default(),
        }
    }
}

impl GearsConfig {
    /// Defaults overridden by `GEARS_VERBOSE`, `GEARS_INFO` and
    /// `GEARS_NO_ANIMATE`.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let flag = |key: &str| {
            lookup(key).is_some_and(|value| {
                matches!(value.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes")
            })
        };

        let mut config = Self::default();
        config.verbose = flag("GEARS_VERBOSE");
        config.print_info = flag("GEARS_INFO");
        config.animate = !flag("GEARS_NO_ANIMATE");
        config
    }

    pub fn with_title(mut self, title: &str) -> Self {
        self.title = title.to_owned();
        self
    }

    pub fn with_size(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    /// Initial view rotations about X, Y and Z in degrees.
    pub fn with_view_rotation(mut self, x: f32, y: f32, z: f32) -> Self {
        self.view_rot = [x, y, z];
        self
    }

    pub fn with_animate(mut self, animate: bool) -> Self {
        self.animate = animate;
        self
    }

    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    pub fn with_print_info(mut self, print_info: bool) -> Self {
        self.print_info = print_info;
        self
    }

    pub fn with_context_params(mut self, params: ContextParams) -> Self {
        self.context = params;
        self
    }
}
