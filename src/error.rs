//! Error types for the gears crate.

use std::fmt;

use thiserror::Error;

use crate::gfx::context::{BufferKind, StageKind};

/// Errors that can occur while setting up or running the gears scene.
#[derive(Error, Debug)]
pub enum GearsError {
    /// A shader stage failed to compile. Carries the compiler's log.
    #[error("error compiling {kind} shader '{name}'")]
    ShaderCompile {
        kind: StageKind,
        name: String,
        log: String,
    },

    /// Two compiled stages failed to link into a program. Carries the link log.
    #[error("error linking shader program '{name}'")]
    ProgramLink { name: String, log: String },

    /// The graphics context refused to create or fill a buffer.
    #[error("failed to create {kind} buffer: {reason}")]
    BufferCreation { kind: BufferKind, reason: String },

    /// Gear shape parameters outside the supported range.
    #[error("invalid gear spec: {0}")]
    InvalidGearSpec(String),

    /// No graphics adapter compatible with the surface.
    #[error("failed to create graphics adapter: {0}")]
    AdapterCreationFailed(String),

    /// Failed to create the wgpu device.
    #[error("failed to create graphics device: {0}")]
    DeviceCreationFailed(#[from] wgpu::RequestDeviceError),

    /// Failed to create the window surface.
    #[error("failed to create surface: {0}")]
    SurfaceCreationFailed(#[from] wgpu::CreateSurfaceError),

    /// The windowing event loop could not be created or run.
    #[error("event loop error: {0}")]
    EventLoop(#[from] winit::error::EventLoopError),
}

impl GearsError {
    /// Diagnostic log attached to shader errors, if any.
    pub fn info_log(&self) -> Option<&str> {
        match self {
            GearsError::ShaderCompile { log, .. } | GearsError::ProgramLink { log, .. } => {
                Some(log)
            }
            _ => None,
        }
    }
}

/// A failed attach. Carries the context back so the host can retry with the
/// same surface; converts into the plain [`GearsError`] with `?`.
#[derive(Error)]
#[error("{error}")]
pub struct AttachError<C> {
    pub error: GearsError,
    pub context: C,
}

impl<C> AttachError<C> {
    pub fn into_parts(self) -> (GearsError, C) {
        (self.error, self.context)
    }
}

impl<C> fmt::Debug for AttachError<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AttachError")
            .field("error", &self.error)
            .finish_non_exhaustive()
    }
}

impl<C> From<AttachError<C>> for GearsError {
    fn from(err: AttachError<C>) -> Self {
        err.error
    }
}

/// A specialized Result type for gears operations.
pub type Result<T> = std::result::Result<T, GearsError>;
