//! Graphics context capability set
//!
//! Everything the gears need from a graphics API, expressed as a small
//! immediate-mode interface: stages, programs, buffers, uniforms and indexed
//! draws addressed through opaque handles. [`WgpuContext`] implements it on top
//! of a window surface, [`HeadlessContext`] records the calls without a GPU.
//!
//! [`WgpuContext`]: super::wgpu_context::WgpuContext
//! [`HeadlessContext`]: super::headless::HeadlessContext

use std::fmt;

use crate::error::Result;

/// Handle to a compiled shader stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StageId(pub u32);

/// Handle to a program object, linked or not.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProgramId(pub u32);

/// Handle to a device buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StageKind {
    Vertex,
    Fragment,
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StageKind::Vertex => f.write_str("vertex"),
            StageKind::Fragment => f.write_str("fragment"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferKind {
    /// Per-vertex attribute data (positions or normals).
    Vertex,
    /// 16-bit triangle indices.
    Index,
}

impl fmt::Display for BufferKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BufferKind::Vertex => f.write_str("vertex"),
            BufferKind::Index => f.write_str("index"),
        }
    }
}

/// Binds a vertex attribute name to a fixed buffer slot before linking.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttributeBinding<'a> {
    pub slot: u32,
    pub name: &'a str,
}

/// Slot convention shared by every program: 0 = position, 1 = normal.
pub const POSITION_SLOT: u32 = 0;
pub const NORMAL_SLOT: u32 = 1;

pub const GEAR_ATTRIBUTES: [AttributeBinding<'static>; 2] = [
    AttributeBinding {
        slot: POSITION_SLOT,
        name: "a_pos",
    },
    AttributeBinding {
        slot: NORMAL_SLOT,
        name: "a_normal",
    },
];

/// Shape of a uniform as laid out in the uniform block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UniformKind {
    Float,
    Vec3,
    Vec4,
    Mat3,
    Mat4,
}

impl UniformKind {
    /// Bytes occupied in a uniform-address-space block. `mat3x3<f32>` columns
    /// are padded to 16 bytes.
    pub fn size(self) -> usize {
        match self {
            UniformKind::Float => 4,
            UniformKind::Vec3 => 12,
            UniformKind::Vec4 => 16,
            UniformKind::Mat3 => 48,
            UniformKind::Mat4 => 64,
        }
    }
}

/// Resolved uniform: byte offset inside the program's uniform block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UniformLocation {
    pub offset: u32,
    pub kind: UniformKind,
}

/// Value written through a [`UniformLocation`]. Matrices are column-major.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UniformValue {
    Float(f32),
    Vec3([f32; 3]),
    Vec4([f32; 4]),
    Mat3([[f32; 3]; 3]),
    Mat4([[f32; 4]; 4]),
}

impl UniformValue {
    pub fn kind(&self) -> UniformKind {
        match self {
            UniformValue::Float(_) => UniformKind::Float,
            UniformValue::Vec3(_) => UniformKind::Vec3,
            UniformValue::Vec4(_) => UniformKind::Vec4,
            UniformValue::Mat3(_) => UniformKind::Mat3,
            UniformValue::Mat4(_) => UniformKind::Mat4,
        }
    }

    /// Encodes the value with uniform-block layout into `dst`, which must be
    /// at least `self.kind().size()` bytes long.
    pub fn write_to(&self, dst: &mut [u8]) {
        match self {
            UniformValue::Float(v) => dst[..4].copy_from_slice(bytemuck::bytes_of(v)),
            UniformValue::Vec3(v) => dst[..12].copy_from_slice(bytemuck::cast_slice(v)),
            UniformValue::Vec4(v) => dst[..16].copy_from_slice(bytemuck::cast_slice(v)),
            UniformValue::Mat3(columns) => {
                for (i, column) in columns.iter().enumerate() {
                    let start = i * 16;
                    dst[start..start + 12].copy_from_slice(bytemuck::cast_slice(column));
                }
            }
            UniformValue::Mat4(columns) => {
                dst[..64].copy_from_slice(bytemuck::cast_slice(columns));
            }
        }
    }
}

impl From<cgmath::Vector3<f32>> for UniformValue {
    fn from(v: cgmath::Vector3<f32>) -> Self {
        UniformValue::Vec3(v.into())
    }
}

impl From<cgmath::Matrix3<f32>> for UniformValue {
    fn from(m: cgmath::Matrix3<f32>) -> Self {
        UniformValue::Mat3(m.into())
    }
}

impl From<cgmath::Matrix4<f32>> for UniformValue {
    fn from(m: cgmath::Matrix4<f32>) -> Self {
        UniformValue::Mat4(m.into())
    }
}

/// Successful compile or link, with whatever the implementation logged.
#[derive(Debug, Clone)]
pub struct Compiled<H> {
    pub handle: H,
    pub log: String,
}

/// Requested properties of the drawing surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContextParams {
    pub alpha: bool,
    pub depth: bool,
    pub stencil: bool,
    pub antialias: bool,
}

impl Default for ContextParams {
    fn default() -> Self {
        Self {
            alpha: false,
            depth: true,
            stencil: false,
            antialias: false,
        }
    }
}

/// Strings describing the implementation, printed by `info()`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContextInfo {
    pub renderer: String,
    pub version: String,
    pub vendor: String,
    pub extensions: Vec<String>,
}

impl ContextInfo {
    pub fn report(&self) -> String {
        [
            format!("RENDERER   = {}", self.renderer),
            format!("VERSION    = {}", self.version),
            format!("VENDOR     = {}", self.vendor),
            format!("EXTENSIONS = {}", self.extensions.join(" ")),
        ]
        .join("\n")
    }
}

/// Capability set consumed by the gears.
///
/// Uniform values persist per program, as with a classic program object:
/// values written while a program is in use are kept until overwritten, and
/// [`draw_indexed`](RenderContext::draw_indexed) snapshots them.
pub trait RenderContext {
    /// Compiles one stage. `Err` carries the compiler log.
    fn compile_stage(
        &mut self,
        kind: StageKind,
        source: &str,
        label: &str,
    ) -> std::result::Result<Compiled<StageId>, String>;
    fn destroy_stage(&mut self, stage: StageId);

    fn create_program(&mut self, label: &str) -> ProgramId;
    /// Links two stages into `program` using the given attribute slots.
    /// `Ok` carries the (possibly empty) link log, `Err` the failure log.
    fn link_program(
        &mut self,
        program: ProgramId,
        vertex: StageId,
        fragment: StageId,
        attributes: &[AttributeBinding<'_>],
    ) -> std::result::Result<String, String>;
    fn destroy_program(&mut self, program: ProgramId);
    /// `None` when the program does not declare (or no longer uses) `name`.
    fn uniform_location(&self, program: ProgramId, name: &str) -> Option<UniformLocation>;

    fn use_program(&mut self, program: Option<ProgramId>);
    /// Writes into the uniform block of the program currently in use.
    fn set_uniform(&mut self, location: UniformLocation, value: UniformValue);

    fn create_buffer(&mut self, kind: BufferKind, label: &str) -> Result<BufferId>;
    fn upload_buffer(&mut self, buffer: BufferId, data: &[u8]) -> Result<()>;
    fn destroy_buffer(&mut self, buffer: BufferId);

    fn bind_vertex_buffer(&mut self, slot: u32, buffer: BufferId);
    fn bind_index_buffer(&mut self, buffer: BufferId);

    fn set_viewport(&mut self, width: u32, height: u32);
    fn clear(&mut self, color: [f32; 4], depth: f32);
    /// Draws `index_count` 16-bit indexed triangles with the bound state.
    fn draw_indexed(&mut self, index_count: u32);
    /// Submits everything recorded since the last flush.
    fn flush(&mut self);

    fn info(&self) -> ContextInfo;
}

/// Host hook that eventually calls back into `Gears::tick`.
pub trait Scheduler {
    fn request_tick(&mut self);
}

#[cfg(test)]
mod tests {
    use super::*;
    use cgmath::{Matrix3, SquareMatrix};

    #[test]
    fn test_mat3_columns_are_padded() {
        let value = UniformValue::from(Matrix3::<f32>::identity());
        let mut block = vec![0xffu8; UniformKind::Mat3.size()];
        value.write_to(&mut block);

        let floats: Vec<f32> = block
            .chunks_exact(4)
            .map(bytemuck::pod_read_unaligned)
            .collect();
        assert_eq!(&floats[0..3], &[1.0, 0.0, 0.0]);
        assert_eq!(&floats[4..7], &[0.0, 1.0, 0.0]);
        assert_eq!(&floats[8..11], &[0.0, 0.0, 1.0]);
        // padding lanes are left untouched
        assert!(floats[3].is_nan());
    }

    #[test]
    fn test_info_report_lines() {
        let info = ContextInfo {
            renderer: "test".into(),
            version: "1".into(),
            vendor: "nobody".into(),
            extensions: vec!["a".into(), "b".into()],
        };
        let report = info.report();
        assert_eq!(report.lines().count(), 4);
        assert!(report.ends_with("EXTENSIONS = a b"));
    }
}
