// src/gfx/resources/mod.rs
//! GPU resources owned by the windowed context.

pub mod texture_resource;

pub use texture_resource::DepthTexture;
