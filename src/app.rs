use std::sync::Arc;

use winit::{
    application::ApplicationHandler,
    dpi::{LogicalSize, PhysicalSize},
    event::{ElementState, KeyEvent, WindowEvent},
    event_loop::{ActiveEventLoop, ControlFlow, EventLoop},
    keyboard::{KeyCode, PhysicalKey},
    window::{Window, WindowAttributes, WindowId},
};

use crate::{
    config::GearsConfig,
    error::Result,
    gears::Gears,
    gfx::{context::Scheduler, wgpu_context::WgpuContext},
};

/// Degrees added or removed per key press.
const ROTATION_STEP: f32 = 5.0;

/// Schedules ticks by asking winit for a redraw.
struct WindowScheduler {
    window: Arc<Window>,
}

impl Scheduler for WindowScheduler {
    fn request_tick(&mut self) {
        self.window.request_redraw();
    }
}

/// Windowed host for the gears.
pub struct GearsApp {
    event_loop: EventLoop<()>,
    app_state: AppState,
}

struct AppState {
    config: GearsConfig,
    window: Option<Arc<Window>>,
    gears: Gears<WgpuContext>,
    shift_held: bool,
}

impl GearsApp {
    pub fn new(config: GearsConfig) -> Result<Self> {
        let event_loop = EventLoop::new()?;

        let mut gears = Gears::new();
        let [x, y, z] = config.view_rot;
        gears.set_view_rotx(x);
        gears.set_view_roty(y);
        gears.set_view_rotz(z);
        gears.set_animate(config.animate);
        gears.set_verbose(config.verbose);

        Ok(Self {
            event_loop,
            app_state: AppState {
                config,
                window: None,
                gears,
                shift_held: false,
            },
        })
    }

    /// Runs the event loop until the window is closed.
    pub fn run(mut self) -> Result<()> {
        self.event_loop.set_control_flow(ControlFlow::Wait);
        self.event_loop.run_app(&mut self.app_state)?;
        Ok(())
    }
}

impl AppState {
    fn start(&mut self, event_loop: &ActiveEventLoop) -> Result<()> {
        let attributes = WindowAttributes::default()
            .with_title(self.config.title.as_str())
            .with_inner_size(LogicalSize::new(self.config.width, self.config.height));
        let window = match event_loop.create_window(attributes) {
            Ok(window) => Arc::new(window),
            Err(err) => {
                log::error!("failed to create window: {err}");
                event_loop.exit();
                return Ok(());
            }
        };
        self.window = Some(window.clone());

        let PhysicalSize { width, height } = window.inner_size();
        let ctx = pollster::block_on(WgpuContext::new(
            window.clone(),
            width,
            height,
            self.config.context,
        ))?;

        self.gears.reshape(width, height);
        self.gears
            .attach(Box::new(WindowScheduler { window }), ctx)?;
        if self.config.print_info {
            self.gears.info();
        }
        Ok(())
    }

    fn handle_key(&mut self, event_loop: &ActiveEventLoop, key: KeyCode) {
        let gears = &mut self.gears;
        match key {
            KeyCode::ArrowUp => gears.set_view_rotx(gears.view_rotx() + ROTATION_STEP),
            KeyCode::ArrowDown => gears.set_view_rotx(gears.view_rotx() - ROTATION_STEP),
            KeyCode::ArrowLeft => gears.set_view_roty(gears.view_roty() + ROTATION_STEP),
            KeyCode::ArrowRight => gears.set_view_roty(gears.view_roty() - ROTATION_STEP),
            KeyCode::KeyZ => {
                let step = if self.shift_held {
                    -ROTATION_STEP
                } else {
                    ROTATION_STEP
                };
                gears.set_view_rotz(gears.view_rotz() + step);
            }
            KeyCode::KeyA => gears.set_animate(!gears.animate()),
            KeyCode::KeyV => gears.set_verbose(!gears.verbose()),
            KeyCode::KeyI => {
                gears.info();
            }
            KeyCode::Escape => {
                gears.detach();
                event_loop.exit();
            }
            _ => return,
        }

        if let Some(window) = &self.window {
            window.request_redraw();
        }
    }
}

impl ApplicationHandler for AppState {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }
        if let Err(err) = self.start(event_loop) {
            log::error!("failed to start gears: {err}");
            event_loop.exit();
        }
    }

    fn suspended(&mut self, _event_loop: &ActiveEventLoop) {
        self.gears.detach();
        self.window = None;
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _window_id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => {
                self.gears.detach();
                event_loop.exit();
            }
            WindowEvent::Resized(PhysicalSize { width, height }) => {
                if let Some(ctx) = self.gears.context_mut() {
                    ctx.resize(width, height);
                }
                self.gears.reshape(width, height);
            }
            WindowEvent::RedrawRequested => self.gears.tick(),
            WindowEvent::ModifiersChanged(modifiers) => {
                self.shift_held = modifiers.state().shift_key();
            }
            WindowEvent::KeyboardInput {
                event:
                    KeyEvent {
                        physical_key: PhysicalKey::Code(key),
                        state: ElementState::Pressed,
                        ..
                    },
                ..
            } => self.handle_key(event_loop, key),
            _ => (),
        }
    }
}
