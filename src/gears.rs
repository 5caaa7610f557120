//! # Frame Loop
//!
//! [`Gears`] ties a [`RenderContext`], a [`Scheduler`] and the [`Scene`]
//! together. It is either detached (no context, no device resources) or
//! running; [`attach`](Gears::attach) and [`detach`](Gears::detach) move
//! between the two. View settings live outside the session, so they can be
//! changed before attaching and survive a re-attach.
//!
//! ```rust
//! use gears::gfx::headless::{HeadlessContext, TickRecorder};
//! use gears::Gears;
//!
//! let ticks = TickRecorder::default();
//! let mut gears = Gears::new();
//! gears.reshape(300, 300);
//! gears.attach(Box::new(ticks.clone()), HeadlessContext::new())?;
//! assert_eq!(ticks.requests(), 1);
//!
//! gears.tick_at(0.0);
//! gears.tick_at(1.0);
//! assert_eq!(gears.angle(), 70.0);
//!
//! let ctx = gears.detach();
//! assert!(ctx.is_some());
//! assert!(gears.detach().is_none());
//! # Ok::<(), gears::GearsError>(())
//! ```

use std::time::Instant;

use cgmath::Matrix4;

use crate::{
    diagnostics::{PrintCallback, Printer},
    error::AttachError,
    gfx::{
        camera::ViewCamera,
        context::{ContextInfo, ContextParams, RenderContext, Scheduler},
        scene::Scene,
    },
    performance::FrameRateSampler,
};

/// Rotation speed of the first gear in degrees per second.
pub const DEGREES_PER_SECOND: f32 = 70.0;

const CLEAR_COLOR: [f32; 4] = [0.0, 0.0, 0.0, 1.0];

/// Everything that only exists while attached.
struct Session<C> {
    ctx: C,
    scheduler: Box<dyn Scheduler>,
    scene: Scene,
    angle: f32,
    last_tick: Option<f64>,
    sampler: FrameRateSampler,
}

/// The three-gear animation.
pub struct Gears<C: RenderContext> {
    session: Option<Session<C>>,
    camera: ViewCamera,
    animate: bool,
    verbose: bool,
    printer: Printer,
    epoch: Instant,
}

impl<C: RenderContext> Gears<C> {
    /// Detached gears with the default view and the default print callback.
    pub fn new() -> Self {
        Self {
            session: None,
            camera: ViewCamera::default(),
            animate: true,
            verbose: false,
            printer: Printer::new(),
            epoch: Instant::now(),
        }
    }

    /// Surface properties the scene is designed for.
    pub fn optimal_context_params() -> ContextParams {
        ContextParams {
            alpha: false,
            depth: true,
            stencil: false,
            antialias: false,
        }
    }

    /// Detaches from any previous context, then builds programs and meshes on
    /// `ctx` and requests the first tick. On failure everything created so
    /// far is released, the gears stay detached and `ctx` is handed back in
    /// the error.
    pub fn attach(
        &mut self,
        scheduler: Box<dyn Scheduler>,
        mut ctx: C,
    ) -> std::result::Result<(), AttachError<C>> {
        self.detach();

        let scene = match Scene::new(&mut ctx, self.verbose, &mut self.printer) {
            Ok(scene) => scene,
            Err(error) => {
                log::warn!("gears failed to attach: {error}");
                return Err(AttachError {
                    error,
                    context: ctx,
                });
            }
        };
        log::info!("gears attached to {}", ctx.info().renderer);

        let session = self.session.insert(Session {
            ctx,
            scheduler,
            scene,
            angle: 0.0,
            last_tick: None,
            sampler: FrameRateSampler::new(0.0),
        });
        session.scheduler.request_tick();
        Ok(())
    }

    /// Releases every device resource and hands the context back. Returns
    /// `None` when already detached.
    pub fn detach(&mut self) -> Option<C> {
        let Session {
            mut ctx, scene, ..
        } = self.session.take()?;
        scene.release(&mut ctx);
        log::info!("gears detached");
        Some(ctx)
    }

    pub fn is_attached(&self) -> bool {
        self.session.is_some()
    }

    /// Renders one frame at the current wall-clock time.
    pub fn tick(&mut self) {
        let now = self.epoch.elapsed().as_secs_f64();
        self.tick_at(now);
    }

    /// Renders one frame at `now` seconds. Does nothing while detached.
    pub fn tick_at(&mut self, now: f64) {
        let Some(session) = self.session.as_mut() else {
            return;
        };

        let dt = match session.last_tick {
            Some(previous) => now - previous,
            None => {
                session.sampler.reset(now);
                0.0
            }
        };
        session.last_tick = Some(now);

        if self.animate {
            session.angle += DEGREES_PER_SECOND * dt as f32;
            if session.angle > 3600.0 {
                session.angle += 3600.0;
            }
        }

        let (width, height) = self.camera.viewport();
        let ctx = &mut session.ctx;
        session.scene.update(session.angle, &self.camera);
        ctx.set_viewport(width, height);
        ctx.clear(CLEAR_COLOR, 1.0);
        session.scene.draw(ctx);
        ctx.flush();

        if let Some(report) = session.sampler.frame(now) {
            if self.verbose {
                self.printer.print(&report.to_string(), None, None);
            }
        }

        session.scheduler.request_tick();
    }

    /// Adopts a new viewport size and recomputes the projection.
    pub fn reshape(&mut self, width: u32, height: u32) {
        self.camera.resize_projection(width, height);
    }

    pub fn view_rotx(&self) -> f32 {
        self.camera.rot_x()
    }

    pub fn view_roty(&self) -> f32 {
        self.camera.rot_y()
    }

    pub fn view_rotz(&self) -> f32 {
        self.camera.rot_z()
    }

    pub fn set_view_rotx(&mut self, degrees: f32) {
        self.camera.set_rot_x(degrees);
    }

    pub fn set_view_roty(&mut self, degrees: f32) {
        self.camera.set_rot_y(degrees);
    }

    pub fn set_view_rotz(&mut self, degrees: f32) {
        self.camera.set_rot_z(degrees);
    }

    pub fn animate(&self) -> bool {
        self.animate
    }

    pub fn set_animate(&mut self, animate: bool) {
        self.animate = animate;
    }

    pub fn verbose(&self) -> bool {
        self.verbose
    }

    pub fn set_verbose(&mut self, verbose: bool) {
        self.verbose = verbose;
    }

    /// Replaces the print callback. `None` restores the default one.
    pub fn set_print_callback(&mut self, callback: Option<PrintCallback>) {
        self.printer.set_callback(callback);
    }

    /// Reports the context's renderer, version, vendor and extensions through
    /// the print callback. Does nothing while detached.
    pub fn info(&mut self) -> Option<ContextInfo> {
        let info = self.session.as_ref()?.ctx.info();
        self.printer.print("Gears Info", Some(&info.report()), None);
        Some(info)
    }

    /// Global rotation angle in degrees; zero while detached.
    pub fn angle(&self) -> f32 {
        self.session.as_ref().map_or(0.0, |s| s.angle)
    }

    pub fn camera(&self) -> &ViewCamera {
        &self.camera
    }

    pub fn projection(&self) -> Matrix4<f32> {
        self.camera.projection()
    }

    pub fn view(&self) -> Matrix4<f32> {
        self.camera.view()
    }

    pub fn scene(&self) -> Option<&Scene> {
        self.session.as_ref().map(|s| &s.scene)
    }

    pub fn context(&self) -> Option<&C> {
        self.session.as_ref().map(|s| &s.ctx)
    }

    pub fn context_mut(&mut self) -> Option<&mut C> {
        self.session.as_mut().map(|s| &mut s.ctx)
    }
}

impl<C: RenderContext> Default for Gears<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: RenderContext> Drop for Gears<C> {
    fn drop(&mut self) {
        self.detach();
    }
}

#[cfg(test)]
mod tests {
    use std::{cell::RefCell, rc::Rc};

    use super::*;
    use crate::gfx::headless::{HeadlessContext, TickRecorder};

    fn attached() -> (Gears<HeadlessContext>, TickRecorder) {
        let ticks = TickRecorder::default();
        let mut gears = Gears::new();
        gears.set_print_callback(Some(Box::new(|_, _, _| {})));
        gears
            .attach(Box::new(ticks.clone()), HeadlessContext::new())
            .unwrap();
        (gears, ticks)
    }

    #[test]
    fn test_first_tick_is_the_baseline() {
        let (mut gears, _) = attached();
        gears.tick_at(100.0);
        assert_eq!(gears.angle(), 0.0);
        gears.tick_at(100.5);
        assert_eq!(gears.angle(), 35.0);
    }

    #[test]
    fn test_angle_wraps_upwards_past_3600() {
        let (mut gears, _) = attached();
        gears.tick_at(0.0);
        gears.tick_at(52.0);
        assert_eq!(gears.angle(), 3640.0 + 3600.0);
    }

    #[test]
    fn test_every_tick_requests_the_next() {
        let (mut gears, ticks) = attached();
        gears.tick_at(0.0);
        gears.tick_at(0.1);
        assert_eq!(ticks.requests(), 3);

        gears.detach();
        gears.tick_at(0.2);
        assert_eq!(ticks.requests(), 3);
    }

    #[test]
    fn test_fps_report_only_when_verbose() {
        let lines = Rc::new(RefCell::new(Vec::new()));
        let sink = lines.clone();
        let (mut gears, _) = attached();
        gears.set_print_callback(Some(Box::new(move |head, _, _| {
            sink.borrow_mut().push(head.to_string());
        })));

        for i in 0..=10 {
            gears.tick_at(i as f64);
        }
        assert!(lines.borrow().is_empty());

        gears.set_verbose(true);
        for i in 11..=15 {
            gears.tick_at(i as f64);
        }
        assert_eq!(
            lines.borrow().as_slice(),
            ["Gears: 5 frames in 5.0 seconds = 1.000 FPS"]
        );
    }

    #[test]
    fn test_info_is_reported_while_attached() {
        let lines = Rc::new(RefCell::new(Vec::new()));
        let sink = lines.clone();
        let mut gears: Gears<HeadlessContext> = Gears::new();
        gears.set_print_callback(Some(Box::new(move |head, detail, _| {
            sink.borrow_mut()
                .push(format!("{head}\n{}", detail.unwrap_or_default()));
        })));
        assert!(gears.info().is_none());

        gears
            .attach(Box::new(TickRecorder::default()), HeadlessContext::new())
            .unwrap();
        let info = gears.info().unwrap();
        assert_eq!(info.renderer, "headless");
        assert!(lines.borrow()[0].starts_with("Gears Info\nRENDERER   = headless"));
    }

    #[test]
    fn test_drop_releases_resources() {
        let ctx = HeadlessContext::new();
        let ledger = ctx.ledger();
        {
            let mut gears = Gears::new();
            gears.attach(Box::new(TickRecorder::default()), ctx).unwrap();
            assert!(ledger.live_total() > 0);
        }
        assert_eq!(ledger.live_total(), 0);
    }
}
