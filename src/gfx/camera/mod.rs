//! # Camera
//!
//! The fixed-eye camera of the gears scene. The view is a translation away
//! from the gears followed by three user-controlled rotations, the projection
//! is an off-axis frustum that keeps the horizontal extent fixed and adapts the
//! vertical one to the viewport.
//!
//! Matrices use OpenGL clip conventions (depth in `[-w, w]`); the shaders remap
//! depth to wgpu's `[0, w]` range.

pub mod view_camera;

pub use view_camera::{Frustum, ViewCamera, EYE_DISTANCE};

use cgmath::Matrix4;

/// Anything that can produce a combined projection·view matrix.
pub trait Camera {
    fn build_view_projection_matrix(&self) -> Matrix4<f32>;
}
