//! # Scene
//!
//! Three gear instances drawn with two programs. The flat program renders the
//! faces and teeth of every gear, the smooth program renders the bores, so
//! each frame is two passes of three indexed draws.
//!
//! A [`Scene`] owns every device resource the gears use. It is built in one
//! step by [`Scene::new`] and torn down by [`Scene::release`]; a partially
//! built scene never escapes a failed constructor.

pub mod instance;

pub use instance::{GearDesc, GearInstance, SCENE_GEARS};

use cgmath::Vector3;

use crate::{
    diagnostics::Printer,
    error::Result,
    gfx::{
        camera::{Camera, ViewCamera},
        context::{RenderContext, UniformLocation},
        mesh::{GearMesh, SurfaceBuffers},
        shader::{sources, ShaderProgram},
    },
};

/// World-space light position shared by both programs.
pub const LIGHT_POSITION: [f32; 3] = [5.0, 5.0, 10.0];

/// Resolved uniform handles of one gear program.
#[derive(Debug, Clone, Copy)]
struct GearUniforms {
    transform: Option<UniformLocation>,
    model: Option<UniformLocation>,
    normal: Option<UniformLocation>,
    light_pos: Option<UniformLocation>,
    ambient: Option<UniformLocation>,
    diffuse: Option<UniformLocation>,
}

impl GearUniforms {
    fn resolve(program: &ShaderProgram) -> Self {
        Self {
            transform: program.uniform("u_tf"),
            model: program.uniform("u_model"),
            normal: program.uniform("u_nm"),
            light_pos: program.uniform("u_light_pos"),
            ambient: program.uniform("u_ambient"),
            diffuse: program.uniform("u_diffuse"),
        }
    }
}

/// A program with its handles.
#[derive(Debug)]
struct Pass {
    program: ShaderProgram,
    uniforms: GearUniforms,
}

impl Pass {
    fn new(program: ShaderProgram) -> Self {
        let uniforms = GearUniforms::resolve(&program);
        Self { program, uniforms }
    }

    fn draw<C: RenderContext>(
        &self,
        ctx: &mut C,
        gears: &[GearInstance],
        surface: fn(&GearMesh) -> &SurfaceBuffers,
    ) {
        let program = &self.program;
        let u = &self.uniforms;

        program.bind(ctx);
        for gear in gears {
            program.set_uniform(ctx, u.transform, gear.transform());
            program.set_uniform(ctx, u.model, gear.model());
            program.set_uniform(ctx, u.normal, gear.normal());
            program.set_uniform(ctx, u.ambient, gear.color());
            program.set_uniform(ctx, u.diffuse, gear.color());
            surface(gear.mesh()).draw(ctx);
        }
    }
}

/// The three gears and the programs that draw them.
#[derive(Debug)]
pub struct Scene {
    flat: Pass,
    smooth: Pass,
    gears: Vec<GearInstance>,
    angle: f32,
}

impl Scene {
    /// Builds both programs and the meshes of [`SCENE_GEARS`], and writes the
    /// light position into both programs.
    pub fn new<C: RenderContext>(ctx: &mut C, verbose: bool, printer: &mut Printer) -> Result<Self> {
        let flat = ShaderProgram::build(ctx, &sources::FLAT, verbose, printer)?;
        let smooth = match ShaderProgram::build(ctx, &sources::SMOOTH, verbose, printer) {
            Ok(smooth) => smooth,
            Err(err) => {
                flat.release(ctx);
                return Err(err);
            }
        };

        let mut gears: Vec<GearInstance> = Vec::with_capacity(SCENE_GEARS.len());
        for (i, desc) in SCENE_GEARS.iter().enumerate() {
            match GearMesh::build(ctx, &desc.spec, &format!("gear {i}")) {
                Ok(mesh) => gears.push(GearInstance::new(mesh, *desc)),
                Err(err) => {
                    for gear in gears {
                        gear.release(ctx);
                    }
                    flat.release(ctx);
                    smooth.release(ctx);
                    return Err(err);
                }
            }
        }

        let scene = Self {
            flat: Pass::new(flat),
            smooth: Pass::new(smooth),
            gears,
            angle: 0.0,
        };
        for pass in [&scene.flat, &scene.smooth] {
            pass.program.bind(ctx);
            pass.program
                .set_uniform(ctx, pass.uniforms.light_pos, Vector3::from(LIGHT_POSITION));
        }
        ctx.use_program(None);

        Ok(scene)
    }

    /// Global rotation angle in degrees as of the last update.
    pub fn angle(&self) -> f32 {
        self.angle
    }

    pub fn gears(&self) -> &[GearInstance] {
        &self.gears
    }

    pub fn flat_program(&self) -> &ShaderProgram {
        &self.flat.program
    }

    pub fn smooth_program(&self) -> &ShaderProgram {
        &self.smooth.program
    }

    /// Places every gear for the global `angle` as seen through `camera`.
    pub fn update(&mut self, angle: f32, camera: &ViewCamera) {
        self.angle = angle;
        let view_projection = camera.build_view_projection_matrix();
        for gear in &mut self.gears {
            gear.update(angle, view_projection);
        }
    }

    /// Flat pass over all gears, then the smooth pass, then unbinds.
    pub fn draw<C: RenderContext>(&self, ctx: &mut C) {
        self.flat.draw(ctx, &self.gears, |mesh| &mesh.flat);
        self.smooth.draw(ctx, &self.gears, |mesh| &mesh.smooth);
        ctx.use_program(None);
    }

    pub fn release<C: RenderContext>(self, ctx: &mut C) {
        for gear in self.gears {
            gear.release(ctx);
        }
        self.flat.program.release(ctx);
        self.smooth.program.release(ctx);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gfx::headless::HeadlessContext;

    fn scene(ctx: &mut HeadlessContext) -> Scene {
        Scene::new(ctx, false, &mut Printer::silent()).unwrap()
    }

    #[test]
    fn test_new_creates_all_resources() {
        let mut ctx = HeadlessContext::new();
        let ledger = ctx.ledger();
        let scene = scene(&mut ctx);

        assert_eq!(scene.gears().len(), 3);
        assert_eq!(ledger.live_programs(), 2);
        assert_eq!(ledger.live_stages(), 4);
        assert_eq!(ledger.live_buffers(), 18);
        assert_eq!(ctx.current_program(), None);

        scene.release(&mut ctx);
        assert_eq!(ledger.live_total(), 0);
        assert_eq!(ledger.double_releases(), 0);
    }

    #[test]
    fn test_draw_order_and_materials() {
        let mut ctx = HeadlessContext::new();
        let ledger = ctx.ledger();
        let mut scene = scene(&mut ctx);
        scene.update(10.0, &ViewCamera::default());

        scene.draw(&mut ctx);
        ctx.flush();
        let frame = ledger.last_frame().unwrap();
        assert_eq!(frame.draws.len(), 6);

        let flat = scene.flat_program();
        let smooth = scene.smooth_program();
        let counts: Vec<u32> = frame.draws.iter().map(|d| d.index_count).collect();
        assert_eq!(counts, vec![1200, 600, 600, 120, 60, 60]);
        assert!(frame.draws[..3].iter().all(|d| d.program == flat.id()));
        assert!(frame.draws[3..].iter().all(|d| d.program == smooth.id()));

        let diffuse = flat.uniform("u_diffuse").unwrap();
        let light = smooth.uniform("u_light_pos").unwrap();
        for (draw, desc) in frame.draws.iter().zip(SCENE_GEARS.iter().cycle()) {
            assert_eq!(draw.floats(diffuse), desc.color.to_vec());
            assert_eq!(draw.floats(light), LIGHT_POSITION.to_vec());
        }
        assert_eq!(ctx.current_program(), None);

        scene.release(&mut ctx);
    }

    #[test]
    fn test_update_rotates_each_gear() {
        let mut ctx = HeadlessContext::new();
        let mut scene = scene(&mut ctx);
        scene.update(10.0, &ViewCamera::default());

        let rotations: Vec<f32> = scene.gears().iter().map(|g| g.rotation()).collect();
        assert_eq!(rotations, vec![10.0, -29.0, -45.0]);
        assert_eq!(scene.angle(), 10.0);

        scene.release(&mut ctx);
    }

    #[test]
    fn test_mesh_failure_releases_programs_and_earlier_meshes() {
        // first mesh, second mesh, smooth group of the third mesh
        for fail_at in [0, 6, 15] {
            let mut ctx = HeadlessContext::new();
            let ledger = ctx.ledger();
            ctx.fail_buffer_creation_after(fail_at);

            assert!(Scene::new(&mut ctx, false, &mut Printer::silent()).is_err());
            assert_eq!(ledger.live_total(), 0, "failure after {fail_at} buffers");
            assert_eq!(ledger.double_releases(), 0);
        }
    }
}
