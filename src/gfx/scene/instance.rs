use cgmath::{Deg, Matrix, Matrix3, Matrix4, SquareMatrix, Vector3};

use crate::gfx::{context::RenderContext, geometry::GearSpec, mesh::GearMesh};

/// Shape, material and placement of one gear in the scene.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GearDesc {
    pub spec: GearSpec,
    /// Used for both the ambient and the diffuse term.
    pub color: [f32; 3],
    pub translation: [f32; 3],
    /// Rotation in degrees is `speed * angle + phase`.
    pub speed: f32,
    pub phase: f32,
}

impl GearDesc {
    pub fn rotation(&self, angle: f32) -> f32 {
        self.speed * angle + self.phase
    }
}

/// The three meshing gears, in draw order.
pub const SCENE_GEARS: [GearDesc; 3] = [
    GearDesc {
        spec: GearSpec::preset(1.0, 4.0, 1.0, 20, 0.7),
        color: [0.8, 0.1, 0.0],
        translation: [-3.0, -2.0, 0.0],
        speed: 1.0,
        phase: 0.0,
    },
    GearDesc {
        spec: GearSpec::preset(0.5, 2.0, 2.0, 10, 0.7),
        color: [0.0, 0.8, 0.2],
        translation: [3.1, -2.0, 0.0],
        speed: -2.0,
        phase: -9.0,
    },
    GearDesc {
        spec: GearSpec::preset(1.3, 2.0, 0.5, 10, 0.7),
        color: [0.2, 0.2, 1.0],
        translation: [-3.1, 4.2, 0.0],
        speed: -2.0,
        phase: -25.0,
    },
];

/// A gear mesh placed in the scene, with its per-frame matrices.
#[derive(Debug)]
pub struct GearInstance {
    mesh: GearMesh,
    desc: GearDesc,
    rotation: f32,
    rotate: Matrix4<f32>,
    translate: Matrix4<f32>,
    model: Matrix4<f32>,
    normal: Matrix3<f32>,
    transform: Matrix4<f32>,
}

impl GearInstance {
    pub fn new(mesh: GearMesh, desc: GearDesc) -> Self {
        let translate = Matrix4::from_translation(Vector3::from(desc.translation));
        Self {
            mesh,
            desc,
            rotation: 0.0,
            rotate: Matrix4::identity(),
            translate,
            model: translate,
            normal: Matrix3::identity(),
            transform: translate,
        }
    }

    /// Recomputes the matrices for the global `angle` (degrees).
    pub fn update(&mut self, angle: f32, view_projection: Matrix4<f32>) {
        self.rotation = self.desc.rotation(angle);
        self.rotate = Matrix4::from_angle_z(Deg(self.rotation));
        self.model = self.translate * self.rotate;
        self.normal = normal_matrix(self.model);
        self.transform = view_projection * self.model;
    }

    pub fn mesh(&self) -> &GearMesh {
        &self.mesh
    }

    pub fn color(&self) -> Vector3<f32> {
        Vector3::from(self.desc.color)
    }

    /// Rotation about +Z in degrees as of the last update.
    pub fn rotation(&self) -> f32 {
        self.rotation
    }

    pub fn model(&self) -> Matrix4<f32> {
        self.model
    }

    pub fn normal(&self) -> Matrix3<f32> {
        self.normal
    }

    pub fn transform(&self) -> Matrix4<f32> {
        self.transform
    }

    pub fn release<C: RenderContext>(self, ctx: &mut C) {
        self.mesh.release(ctx);
    }
}

/// Upper-left 3×3 of the inverse transpose.
fn normal_matrix(model: Matrix4<f32>) -> Matrix3<f32> {
    let m = model.invert().unwrap_or(model).transpose();
    Matrix3::from_cols(m.x.truncate(), m.y.truncate(), m.z.truncate())
}
