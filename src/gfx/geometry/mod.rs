//! # Procedural Gear Geometry
//!
//! A gear wheel is generated from five scalars and split into two surface
//! groups that are drawn with different programs:
//!
//! - **flat**: front and back faces, tooth faces and the outward faces of the
//!   teeth. Adjacent faces never share vertices, so every face keeps its own
//!   normal.
//! - **smooth**: the inner bore cylinder. Neighbouring samples share one
//!   vertex pair, which gives a curved look under per-fragment lighting.
//!
//! ## Usage
//!
//! ```rust
//! use gears::gfx::geometry::{generate_gear, GearSpec};
//!
//! let spec = GearSpec::new(1.0, 4.0, 1.0, 20, 0.7).unwrap();
//! let gear = generate_gear(&spec);
//!
//! assert_eq!(gear.flat.vertex_count(), spec.flat_vertex_count());
//! assert_eq!(gear.smooth.indices.len(), 6 * 20);
//! ```

pub mod gear;

pub use gear::*;

use crate::error::{GearsError, Result};

/// Largest tooth count whose flat group still fits 16-bit indices.
pub const MAX_TEETH: u32 = (u16::MAX as u32 + 1 - 6) / 24;

/// Shape parameters of one gear wheel.
///
/// Fields are private so every spec has been checked against [`MAX_TEETH`]
/// before it reaches [`generate_gear`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GearSpec {
    inner_radius: f32,
    outer_radius: f32,
    width: f32,
    teeth: u32,
    tooth_depth: f32,
}

impl GearSpec {
    /// Spec for the built-in gear tables. The tooth count is checked at
    /// compile time when used in a `const`; radii are trusted.
    pub(crate) const fn preset(
        inner_radius: f32,
        outer_radius: f32,
        width: f32,
        teeth: u32,
        tooth_depth: f32,
    ) -> Self {
        assert!(teeth >= 1 && teeth <= MAX_TEETH, "tooth count out of range");
        Self {
            inner_radius,
            outer_radius,
            width,
            teeth,
            tooth_depth,
        }
    }

    pub fn new(
        inner_radius: f32,
        outer_radius: f32,
        width: f32,
        teeth: u32,
        tooth_depth: f32,
    ) -> Result<Self> {
        for (name, value) in [
            ("inner_radius", inner_radius),
            ("outer_radius", outer_radius),
            ("width", width),
            ("tooth_depth", tooth_depth),
        ] {
            if !value.is_finite() || value <= 0.0 {
                return Err(GearsError::InvalidGearSpec(format!(
                    "{name} must be a positive number, got {value}"
                )));
            }
        }
        if teeth == 0 {
            return Err(GearsError::InvalidGearSpec(
                "a gear needs at least one tooth".to_string(),
            ));
        }
        if teeth > MAX_TEETH {
            return Err(GearsError::InvalidGearSpec(format!(
                "{teeth} teeth exceed 16-bit indexing (max {MAX_TEETH})"
            )));
        }

        Ok(Self {
            inner_radius,
            outer_radius,
            width,
            teeth,
            tooth_depth,
        })
    }

    /// Radius of the hole at the centre.
    pub fn inner_radius(&self) -> f32 {
        self.inner_radius
    }

    /// Radius at the centre of the teeth.
    pub fn outer_radius(&self) -> f32 {
        self.outer_radius
    }

    /// Thickness along Z.
    pub fn width(&self) -> f32 {
        self.width
    }

    pub fn teeth(&self) -> u32 {
        self.teeth
    }

    pub fn tooth_depth(&self) -> f32 {
        self.tooth_depth
    }

    /// Front and back strips, both tooth face sets, outward faces and the
    /// closing seam pair.
    pub fn flat_vertex_count(&self) -> usize {
        let t = self.teeth as usize;
        2 * (4 * t + 2) + 2 * (4 * t) + (8 * t + 2)
    }

    pub fn flat_index_count(&self) -> usize {
        let t = self.teeth as usize;
        2 * (12 * t) + 2 * (6 * t) + 24 * t
    }

    pub fn smooth_vertex_count(&self) -> usize {
        (self.teeth as usize + 1) * 2
    }

    pub fn smooth_index_count(&self) -> usize {
        self.teeth as usize * 6
    }
}

/// One independently drawn part of a gear.
#[derive(Debug, Clone, PartialEq)]
pub struct SurfaceGroup {
    pub vertices: Vec<[f32; 3]>,
    /// One normal per vertex.
    pub normals: Vec<[f32; 3]>,
    /// Triangle list, two triangles per quad.
    pub indices: Vec<u16>,
}

impl SurfaceGroup {
    /// Empty group with storage for exactly the given counts.
    pub fn with_capacity(vertices: usize, indices: usize) -> Self {
        Self {
            vertices: Vec::with_capacity(vertices),
            normals: Vec::with_capacity(vertices),
            indices: Vec::with_capacity(indices),
        }
    }

    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    fn push(&mut self, position: [f32; 3], normal: [f32; 3]) {
        self.vertices.push(position);
        self.normals.push(normal);
    }

    /// Index the next vertex pushed will get.
    fn next_index(&self) -> u16 {
        self.vertices.len() as u16
    }
}

/// Both surface groups of one gear.
#[derive(Debug, Clone, PartialEq)]
pub struct GearGeometry {
    pub flat: SurfaceGroup,
    pub smooth: SurfaceGroup,
}
