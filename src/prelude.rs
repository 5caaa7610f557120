//! # Gears Prelude
//!
//! Commonly used types in one import:
//!
//! ```rust
//! use gears::prelude::*;
//!
//! let spec = GearSpec::new(1.0, 4.0, 1.0, 20, 0.7)?;
//! let geometry = generate_gear(&spec);
//! assert_eq!(geometry.flat.indices.len(), 1200);
//! # Ok::<(), GearsError>(())
//! ```

// Re-export core application types
pub use crate::app::GearsApp;
pub use crate::config::GearsConfig;
pub use crate::gears::Gears;

// Re-export graphics types
pub use crate::gfx::camera::ViewCamera;
pub use crate::gfx::context::{ContextInfo, ContextParams, RenderContext, Scheduler};
pub use crate::gfx::geometry::{generate_gear, GearGeometry, GearSpec, SurfaceGroup};
pub use crate::gfx::headless::HeadlessContext;
pub use crate::gfx::mesh::GearMesh;
pub use crate::gfx::scene::Scene;
pub use crate::gfx::shader::ShaderProgram;
pub use crate::gfx::wgpu_context::WgpuContext;

// Re-export diagnostics and errors
pub use crate::diagnostics::{PrintCallback, Printer};
pub use crate::error::{AttachError, GearsError, Result};
pub use crate::performance::FrameRateSampler;
