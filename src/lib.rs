// src/lib.rs
//! Gears
//!
//! Procedural gear-wheel meshes and the classic three-gear benchmark scene,
//! rendered through a small graphics-context abstraction with a wgpu/winit
//! backend and a headless one for tests.

pub mod app;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod gears;
pub mod gfx;
pub mod performance;
pub mod prelude;

// Re-export main types for convenience
pub use app::GearsApp;
pub use config::GearsConfig;
pub use error::{AttachError, GearsError, Result};
pub use gears::Gears;

/// Runs the windowed gears with settings taken from the environment.
pub fn run() -> Result<()> {
    GearsApp::new(GearsConfig::from_env())?.run()
}
