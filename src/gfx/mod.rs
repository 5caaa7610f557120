//! # Graphics Module
//!
//! Everything between the gear shapes and the pixels on screen.
//!
//! - **Context** ([`context`]) - the capability set the gears draw through,
//!   with a windowed ([`wgpu_context`]) and a headless ([`headless`])
//!   implementation
//! - **Geometry** ([`geometry`]) - procedural gear meshes on the CPU
//! - **Meshes** ([`mesh`]) - gear geometry uploaded to device buffers
//! - **Shaders** ([`shader`]) - WGSL programs and their uniform handles
//! - **Camera** ([`camera`]) - view rotations and projection
//! - **Scene** ([`scene`]) - the three placed gears and their draw passes
//!
//! ```no_run
//! use gears::gfx::{headless::HeadlessContext, scene::Scene};
//! use gears::diagnostics::Printer;
//!
//! let mut ctx = HeadlessContext::new();
//! let scene = Scene::new(&mut ctx, false, &mut Printer::new())?;
//! scene.release(&mut ctx);
//! # Ok::<(), gears::GearsError>(())
//! ```

pub mod camera;
pub mod context;
pub mod geometry;
pub mod headless;
pub mod mesh;
pub mod resources;
pub mod scene;
pub mod shader;
pub mod wgpu_context;

// Re-export commonly used types
pub use camera::ViewCamera;
pub use context::{RenderContext, Scheduler};
pub use headless::HeadlessContext;
pub use wgpu_context::WgpuContext;
