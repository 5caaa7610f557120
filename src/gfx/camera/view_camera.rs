use cgmath::{frustum, Deg, Matrix4, Vector3};

use super::Camera;

/// Distance from the eye to the origin along -Z.
pub const EYE_DISTANCE: f32 = 40.0;

/// Clip volume of an off-axis perspective projection.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Frustum {
    pub left: f32,
    pub right: f32,
    pub bottom: f32,
    pub top: f32,
    pub near: f32,
    pub far: f32,
}

impl Frustum {
    /// Unit horizontal extent, vertical extent following the aspect ratio.
    pub fn for_viewport(width: u32, height: u32) -> Self {
        let h = height as f32 / width as f32;
        Self {
            left: -1.0,
            right: 1.0,
            bottom: -h,
            top: h,
            near: 5.0,
            far: 60.0,
        }
    }

    pub fn matrix(&self) -> Matrix4<f32> {
        frustum(
            self.left,
            self.right,
            self.bottom,
            self.top,
            self.near,
            self.far,
        )
    }
}

impl Default for Frustum {
    fn default() -> Self {
        Self::for_viewport(1, 1)
    }
}

/// View rotations, projection and viewport of the gears scene.
#[derive(Debug, Clone, Copy)]
pub struct ViewCamera {
    rot_x: f32,
    rot_y: f32,
    rot_z: f32,
    frustum: Frustum,
    viewport: (u32, u32),
    view: Matrix4<f32>,
    projection: Matrix4<f32>,
}

impl ViewCamera {
    /// Camera with the given rotations in degrees and a square viewport.
    pub fn new(rot_x: f32, rot_y: f32, rot_z: f32) -> Self {
        let frustum = Frustum::default();
        let mut camera = Self {
            rot_x,
            rot_y,
            rot_z,
            frustum,
            viewport: (1, 1),
            view: Matrix4::from_translation(Vector3::new(0.0, 0.0, -EYE_DISTANCE)),
            projection: frustum.matrix(),
        };
        camera.update_view();
        camera
    }

    pub fn rot_x(&self) -> f32 {
        self.rot_x
    }

    pub fn rot_y(&self) -> f32 {
        self.rot_y
    }

    pub fn rot_z(&self) -> f32 {
        self.rot_z
    }

    pub fn set_rot_x(&mut self, degrees: f32) {
        self.rot_x = degrees;
        self.update_view();
    }

    pub fn set_rot_y(&mut self, degrees: f32) {
        self.rot_y = degrees;
        self.update_view();
    }

    pub fn set_rot_z(&mut self, degrees: f32) {
        self.rot_z = degrees;
        self.update_view();
    }

    /// Adopts a new viewport size and the matching frustum. A zero-sized
    /// viewport (minimized window) keeps the previous projection.
    pub fn resize_projection(&mut self, width: u32, height: u32) {
        if width == 0 || height == 0 {
            log::debug!("ignoring {width}x{height} viewport");
            return;
        }
        self.viewport = (width, height);
        self.frustum = Frustum::for_viewport(width, height);
        self.projection = self.frustum.matrix();
    }

    pub fn viewport(&self) -> (u32, u32) {
        self.viewport
    }

    pub fn frustum(&self) -> Frustum {
        self.frustum
    }

    pub fn view(&self) -> Matrix4<f32> {
        self.view
    }

    pub fn projection(&self) -> Matrix4<f32> {
        self.projection
    }

    fn update_view(&mut self) {
        self.view = Matrix4::from_translation(Vector3::new(0.0, 0.0, -EYE_DISTANCE))
            * Matrix4::from_angle_x(Deg(self.rot_x))
            * Matrix4::from_angle_y(Deg(self.rot_y))
            * Matrix4::from_angle_z(Deg(self.rot_z));
    }
}

impl Default for ViewCamera {
    fn default() -> Self {
        Self::new(20.0, 30.0, 0.0)
    }
}

impl Camera for ViewCamera {
    fn build_view_projection_matrix(&self) -> Matrix4<f32> {
        self.projection * self.view
    }
}
