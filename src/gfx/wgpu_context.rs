//! # Windowed wgpu Context
//!
//! [`RenderContext`] on top of a wgpu surface. The immediate-mode calls of the
//! trait are recorded and replayed in a single render pass at
//! [`flush`](RenderContext::flush):
//!
//! - stages are validated with naga and turned into shader modules,
//! - linking builds the render pipeline for the program,
//! - every draw snapshots the program's uniform block into a per-frame arena
//!   that is uploaded once and addressed with dynamic offsets,
//! - buffers get their storage on first upload, since their size is unknown
//!   at creation time.

use std::{collections::HashMap, num::NonZeroU64};

use wgpu::util::DeviceExt;

use crate::{
    error::{GearsError, Result},
    gfx::{
        context::{
            AttributeBinding, BufferId, BufferKind, Compiled, ContextInfo, ContextParams,
            ProgramId, RenderContext, StageId, StageKind, UniformLocation, UniformValue,
        },
        resources::DepthTexture,
        shader::wgsl::{self, ProgramLayout, StageModule},
    },
};

/// Bytes per position or normal record.
const VERTEX_STRIDE: wgpu::BufferAddress = std::mem::size_of::<[f32; 3]>() as wgpu::BufferAddress;

struct GpuStage {
    module: StageModule,
    shader: wgpu::ShaderModule,
}

struct GpuProgram {
    label: String,
    layout: Option<ProgramLayout>,
    pipeline: Option<wgpu::RenderPipeline>,
    bind_group_layout: Option<wgpu::BindGroupLayout>,
    block: Vec<u8>,
}

struct GpuBuffer {
    kind: BufferKind,
    label: String,
    buffer: Option<wgpu::Buffer>,
}

struct DrawCommand {
    program: ProgramId,
    vertex_buffers: [Option<BufferId>; 2],
    index_buffer: Option<BufferId>,
    index_count: u32,
    uniform_offset: Option<u32>,
}

/// wgpu-backed [`RenderContext`] drawing into a window surface.
pub struct WgpuContext {
    surface: wgpu::Surface<'static>,
    device: wgpu::Device,
    queue: wgpu::Queue,
    config: wgpu::SurfaceConfiguration,
    depth_texture: Option<DepthTexture>,
    adapter_info: wgpu::AdapterInfo,
    params: ContextParams,

    next_id: u32,
    stages: HashMap<u32, GpuStage>,
    programs: HashMap<u32, GpuProgram>,
    buffers: HashMap<u32, GpuBuffer>,

    current_program: Option<ProgramId>,
    vertex_buffers: [Option<BufferId>; 2],
    index_buffer: Option<BufferId>,
    viewport: Option<(u32, u32)>,
    clear: Option<([f32; 4], f32)>,
    commands: Vec<DrawCommand>,

    uniform_arena: Vec<u8>,
    uniform_buffer: wgpu::Buffer,
    uniform_alignment: usize,
    bind_groups: HashMap<u32, wgpu::BindGroup>,
}

impl WgpuContext {
    /// Creates a context for `target` with an initial surface size.
    pub async fn new(
        target: impl Into<wgpu::SurfaceTarget<'static>>,
        width: u32,
        height: u32,
        params: ContextParams,
    ) -> Result<Self> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });
        let surface = instance.create_surface(target)?;

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::default(),
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await
            .map_err(|e| GearsError::AdapterCreationFailed(e.to_string()))?;

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("Gears Device"),
                required_features: wgpu::Features::empty(),
                required_limits: wgpu::Limits {
                    max_texture_dimension_2d: 4096,
                    ..wgpu::Limits::downlevel_defaults()
                },
                memory_hints: wgpu::MemoryHints::default(),
                trace: wgpu::Trace::Off,
            })
            .await?;

        let capabilities = surface.get_capabilities(&adapter);
        let format = capabilities
            .formats
            .iter()
            .copied()
            .find(|f| !f.is_srgb())
            .or_else(|| capabilities.formats.first().copied())
            .ok_or_else(|| {
                GearsError::AdapterCreationFailed("surface reports no formats".to_string())
            })?;
        let alpha_mode = if params.alpha
            && capabilities
                .alpha_modes
                .contains(&wgpu::CompositeAlphaMode::PreMultiplied)
        {
            wgpu::CompositeAlphaMode::PreMultiplied
        } else {
            capabilities
                .alpha_modes
                .first()
                .copied()
                .unwrap_or(wgpu::CompositeAlphaMode::Auto)
        };
        if params.antialias {
            log::warn!("multisampling is not supported, rendering without it");
        }

        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format,
            width: width.max(1),
            height: height.max(1),
            present_mode: wgpu::PresentMode::AutoNoVsync,
            alpha_mode,
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&device, &config);

        let depth_texture = params.depth.then(|| {
            DepthTexture::create(
                &device,
                &config,
                DepthTexture::format_for(params.stencil),
                "Gears Depth",
            )
        });

        let uniform_alignment = device.limits().min_uniform_buffer_offset_alignment as usize;
        let uniform_buffer = Self::create_uniform_buffer(&device, uniform_alignment as u64);
        let adapter_info = adapter.get_info();
        log::info!(
            "using adapter '{}' ({:?}), surface format {format:?}",
            adapter_info.name,
            adapter_info.backend
        );

        Ok(Self {
            surface,
            device,
            queue,
            config,
            depth_texture,
            adapter_info,
            params,
            next_id: 1,
            stages: HashMap::new(),
            programs: HashMap::new(),
            buffers: HashMap::new(),
            current_program: None,
            vertex_buffers: [None; 2],
            index_buffer: None,
            viewport: None,
            clear: None,
            commands: Vec::new(),
            uniform_arena: Vec::new(),
            uniform_buffer,
            uniform_alignment,
            bind_groups: HashMap::new(),
        })
    }

    /// Reconfigures the surface and depth buffer. Zero sizes are ignored.
    pub fn resize(&mut self, width: u32, height: u32) {
        if width == 0 || height == 0 {
            return;
        }
        self.config.width = width;
        self.config.height = height;
        self.surface.configure(&self.device, &self.config);

        if let Some(format) = self.depth_texture.as_ref().map(DepthTexture::format) {
            self.depth_texture = Some(DepthTexture::create(
                &self.device,
                &self.config,
                format,
                "Gears Depth",
            ));
        }
    }

    pub fn surface_size(&self) -> (u32, u32) {
        (self.config.width, self.config.height)
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    pub fn params(&self) -> ContextParams {
        self.params
    }

    fn next_id(&mut self) -> u32 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn create_uniform_buffer(device: &wgpu::Device, size: u64) -> wgpu::Buffer {
        device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Gears Uniform Arena"),
            size,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        })
    }

    fn build_pipeline(
        &self,
        label: &str,
        vertex: &GpuStage,
        fragment: &GpuStage,
        layout: &ProgramLayout,
    ) -> std::result::Result<(wgpu::RenderPipeline, Option<wgpu::BindGroupLayout>), String> {
        let bind_group_layout = layout.block.map(|block| {
            self.device
                .create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                    label: Some(&format!("{label} Uniforms")),
                    entries: &[wgpu::BindGroupLayoutEntry {
                        binding: block.binding,
                        visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
                        ty: wgpu::BindingType::Buffer {
                            ty: wgpu::BufferBindingType::Uniform,
                            has_dynamic_offset: true,
                            min_binding_size: NonZeroU64::new(block.size as u64),
                        },
                        count: None,
                    }],
                })
        });
        let bind_group_layouts: Vec<&wgpu::BindGroupLayout> =
            bind_group_layout.iter().collect();
        let pipeline_layout = self
            .device
            .create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some(&format!("{label} Layout")),
                bind_group_layouts: &bind_group_layouts,
                push_constant_ranges: &[],
            });

        // one tightly packed vec3 buffer per attribute slot
        let attributes: Vec<[wgpu::VertexAttribute; 1]> = layout
            .slots
            .iter()
            .map(|&slot| {
                [wgpu::VertexAttribute {
                    offset: 0,
                    shader_location: slot,
                    format: wgpu::VertexFormat::Float32x3,
                }]
            })
            .collect();
        let vertex_buffers: Vec<wgpu::VertexBufferLayout> = attributes
            .iter()
            .map(|attribute| wgpu::VertexBufferLayout {
                array_stride: VERTEX_STRIDE,
                step_mode: wgpu::VertexStepMode::Vertex,
                attributes: attribute,
            })
            .collect();

        let depth_stencil = self
            .depth_texture
            .as_ref()
            .map(|texture| wgpu::DepthStencilState {
                format: texture.format(),
                depth_write_enabled: true,
                depth_compare: wgpu::CompareFunction::Less,
                stencil: wgpu::StencilState::default(),
                bias: wgpu::DepthBiasState::default(),
            });

        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let pipeline = self
            .device
            .create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some(label),
                layout: Some(&pipeline_layout),
                vertex: wgpu::VertexState {
                    module: &vertex.shader,
                    entry_point: Some(&layout.vertex_entry),
                    buffers: &vertex_buffers,
                    compilation_options: wgpu::PipelineCompilationOptions::default(),
                },
                fragment: Some(wgpu::FragmentState {
                    module: &fragment.shader,
                    entry_point: Some(&layout.fragment_entry),
                    targets: &[Some(wgpu::ColorTargetState {
                        format: self.config.format,
                        blend: Some(wgpu::BlendState::REPLACE),
                        write_mask: wgpu::ColorWrites::ALL,
                    })],
                    compilation_options: wgpu::PipelineCompilationOptions::default(),
                }),
                primitive: wgpu::PrimitiveState {
                    topology: wgpu::PrimitiveTopology::TriangleList,
                    strip_index_format: None,
                    front_face: wgpu::FrontFace::Ccw,
                    cull_mode: None,
                    polygon_mode: wgpu::PolygonMode::Fill,
                    unclipped_depth: false,
                    conservative: false,
                },
                depth_stencil,
                multisample: wgpu::MultisampleState::default(),
                multiview: None,
                cache: None,
            });
        if let Some(err) = pollster::block_on(self.device.pop_error_scope()) {
            return Err(err.to_string());
        }

        Ok((pipeline, bind_group_layout))
    }

    /// Makes sure the arena fits the uniform buffer and every program drawn
    /// this frame has a bind group onto it.
    fn prepare_uniforms(&mut self) {
        let needed = self.uniform_arena.len() as u64;
        if needed > self.uniform_buffer.size() {
            let size = needed.next_power_of_two();
            log::debug!("growing uniform arena to {size} bytes");
            self.uniform_buffer = Self::create_uniform_buffer(&self.device, size);
            self.bind_groups.clear();
        }
        if !self.uniform_arena.is_empty() {
            self.queue
                .write_buffer(&self.uniform_buffer, 0, &self.uniform_arena);
        }

        for command in &self.commands {
            let id = command.program.0;
            if self.bind_groups.contains_key(&id) {
                continue;
            }
            let Some(program) = self.programs.get(&id) else {
                continue;
            };
            let (Some(layout), Some(block)) = (
                &program.bind_group_layout,
                program.layout.as_ref().and_then(|l| l.block),
            ) else {
                continue;
            };
            let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some(&format!("{} Uniforms", program.label)),
                layout,
                entries: &[wgpu::BindGroupEntry {
                    binding: block.binding,
                    resource: wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                        buffer: &self.uniform_buffer,
                        offset: 0,
                        size: NonZeroU64::new(block.size as u64),
                    }),
                }],
            });
            self.bind_groups.insert(id, bind_group);
        }
    }

    fn reset_frame(&mut self) {
        self.commands.clear();
        self.uniform_arena.clear();
        self.clear = None;
    }

    fn encode_draws(&self, pass: &mut wgpu::RenderPass<'_>) {
        for command in &self.commands {
            let Some(program) = self.programs.get(&command.program.0) else {
                continue;
            };
            let (Some(pipeline), Some(layout)) = (&program.pipeline, &program.layout) else {
                continue;
            };
            let Some(index) = command
                .index_buffer
                .and_then(|id| self.buffers.get(&id.0))
                .and_then(|b| b.buffer.as_ref())
            else {
                log::warn!("skipping draw of '{}' without index data", program.label);
                continue;
            };

            pass.set_pipeline(pipeline);
            if let (Some(bind_group), Some(offset)) =
                (self.bind_groups.get(&command.program.0), command.uniform_offset)
            {
                pass.set_bind_group(0, bind_group, &[offset]);
            }

            let mut complete = true;
            for (i, &slot) in layout.slots.iter().enumerate() {
                let buffer = command
                    .vertex_buffers
                    .get(slot as usize)
                    .copied()
                    .flatten()
                    .and_then(|id| self.buffers.get(&id.0))
                    .and_then(|b| b.buffer.as_ref());
                match buffer {
                    Some(buffer) => pass.set_vertex_buffer(i as u32, buffer.slice(..)),
                    None => complete = false,
                }
            }
            if !complete {
                log::warn!("skipping draw of '{}' with unbound attributes", program.label);
                continue;
            }

            pass.set_index_buffer(index.slice(..), wgpu::IndexFormat::Uint16);
            pass.draw_indexed(0..command.index_count, 0, 0..1);
        }
    }
}

impl RenderContext for WgpuContext {
    fn compile_stage(
        &mut self,
        kind: StageKind,
        source: &str,
        label: &str,
    ) -> std::result::Result<Compiled<StageId>, String> {
        let module = wgsl::compile(kind, source)?;

        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let shader = self
            .device
            .create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some(&format!("{label} {kind}")),
                source: wgpu::ShaderSource::Wgsl(source.into()),
            });
        let info = pollster::block_on(shader.get_compilation_info());
        if let Some(err) = pollster::block_on(self.device.pop_error_scope()) {
            return Err(err.to_string());
        }

        let log = info
            .messages
            .iter()
            .map(|message| {
                let level = match message.message_type {
                    wgpu::CompilationMessageType::Error => "error",
                    wgpu::CompilationMessageType::Warning => "warning",
                    _ => "info",
                };
                format!("{level}: {}", message.message)
            })
            .collect::<Vec<_>>()
            .join("\n");

        let id = self.next_id();
        self.stages.insert(id, GpuStage { module, shader });
        log::debug!("created {kind} stage {id} '{label}'");
        Ok(Compiled {
            handle: StageId(id),
            log,
        })
    }

    fn destroy_stage(&mut self, stage: StageId) {
        self.stages.remove(&stage.0);
    }

    fn create_program(&mut self, label: &str) -> ProgramId {
        let id = self.next_id();
        self.programs.insert(
            id,
            GpuProgram {
                label: label.to_string(),
                layout: None,
                pipeline: None,
                bind_group_layout: None,
                block: Vec::new(),
            },
        );
        ProgramId(id)
    }

    fn link_program(
        &mut self,
        program: ProgramId,
        vertex: StageId,
        fragment: StageId,
        attributes: &[AttributeBinding<'_>],
    ) -> std::result::Result<String, String> {
        let (Some(vs), Some(fs)) = (self.stages.get(&vertex.0), self.stages.get(&fragment.0))
        else {
            return Err("error: stage handle is not live".to_string());
        };
        let (layout, log) = wgsl::link(&vs.module, &fs.module, attributes)?;

        let label = self
            .programs
            .get(&program.0)
            .map(|p| p.label.clone())
            .ok_or_else(|| "error: program handle is not live".to_string())?;
        let (pipeline, bind_group_layout) = self.build_pipeline(&label, vs, fs, &layout)?;

        if let Some(entry) = self.programs.get_mut(&program.0) {
            entry.block = vec![0; layout.block_size()];
            entry.layout = Some(layout);
            entry.pipeline = Some(pipeline);
            entry.bind_group_layout = bind_group_layout;
        }
        self.bind_groups.remove(&program.0);
        Ok(log)
    }

    fn destroy_program(&mut self, program: ProgramId) {
        self.programs.remove(&program.0);
        self.bind_groups.remove(&program.0);
        if self.current_program == Some(program) {
            self.current_program = None;
        }
    }

    fn uniform_location(&self, program: ProgramId, name: &str) -> Option<UniformLocation> {
        self.programs
            .get(&program.0)?
            .layout
            .as_ref()?
            .uniform(name)
    }

    fn use_program(&mut self, program: Option<ProgramId>) {
        self.current_program = program;
    }

    fn set_uniform(&mut self, location: UniformLocation, value: UniformValue) {
        let Some(program) = self
            .current_program
            .and_then(|id| self.programs.get_mut(&id.0))
        else {
            log::warn!("uniform written with no program in use");
            return;
        };
        let start = location.offset as usize;
        let end = start + location.kind.size();
        if value.kind() != location.kind || end > program.block.len() {
            log::warn!(
                "uniform write of {:?} does not fit {location:?} in '{}'",
                value.kind(),
                program.label
            );
            return;
        }
        value.write_to(&mut program.block[start..end]);
    }

    fn create_buffer(&mut self, kind: BufferKind, label: &str) -> Result<BufferId> {
        let id = self.next_id();
        self.buffers.insert(
            id,
            GpuBuffer {
                kind,
                label: label.to_string(),
                buffer: None,
            },
        );
        Ok(BufferId(id))
    }

    fn upload_buffer(&mut self, buffer: BufferId, data: &[u8]) -> Result<()> {
        let Some(entry) = self.buffers.get_mut(&buffer.0) else {
            return Err(GearsError::BufferCreation {
                kind: BufferKind::Vertex,
                reason: format!("buffer {} is not live", buffer.0),
            });
        };
        let usage = match entry.kind {
            BufferKind::Vertex => wgpu::BufferUsages::VERTEX,
            BufferKind::Index => wgpu::BufferUsages::INDEX,
        };

        self.device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
        let gpu = self
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(&entry.label),
                contents: data,
                usage,
            });
        if let Some(err) = pollster::block_on(self.device.pop_error_scope()) {
            return Err(GearsError::BufferCreation {
                kind: entry.kind,
                reason: err.to_string(),
            });
        }

        entry.buffer = Some(gpu);
        Ok(())
    }

    fn destroy_buffer(&mut self, buffer: BufferId) {
        if let Some(entry) = self.buffers.remove(&buffer.0) {
            if let Some(gpu) = entry.buffer {
                gpu.destroy();
            }
        }
        for slot in self.vertex_buffers.iter_mut() {
            if *slot == Some(buffer) {
                *slot = None;
            }
        }
        if self.index_buffer == Some(buffer) {
            self.index_buffer = None;
        }
    }

    fn bind_vertex_buffer(&mut self, slot: u32, buffer: BufferId) {
        match self.vertex_buffers.get_mut(slot as usize) {
            Some(bound) => *bound = Some(buffer),
            None => log::warn!("vertex buffer slot {slot} is out of range"),
        }
    }

    fn bind_index_buffer(&mut self, buffer: BufferId) {
        self.index_buffer = Some(buffer);
    }

    fn set_viewport(&mut self, width: u32, height: u32) {
        self.viewport = Some((width, height));
    }

    fn clear(&mut self, color: [f32; 4], depth: f32) {
        self.clear = Some((color, depth));
        self.commands.clear();
        self.uniform_arena.clear();
    }

    fn draw_indexed(&mut self, index_count: u32) {
        let Some(program) = self.current_program else {
            log::warn!("draw with no program in use");
            return;
        };
        let Some(entry) = self.programs.get(&program.0) else {
            return;
        };

        let uniform_offset = if entry.block.is_empty() {
            None
        } else {
            let offset = self.uniform_arena.len().next_multiple_of(self.uniform_alignment);
            self.uniform_arena.resize(offset, 0);
            self.uniform_arena.extend_from_slice(&entry.block);
            Some(offset as u32)
        };

        self.commands.push(DrawCommand {
            program,
            vertex_buffers: self.vertex_buffers,
            index_buffer: self.index_buffer,
            index_count,
            uniform_offset,
        });
    }

    fn flush(&mut self) {
        let frame = match self.surface.get_current_texture() {
            Ok(frame) => frame,
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                log::warn!("surface lost or outdated, reconfiguring");
                self.surface.configure(&self.device, &self.config);
                self.reset_frame();
                return;
            }
            Err(err) => {
                log::warn!("dropping frame: {err}");
                self.reset_frame();
                return;
            }
        };
        self.prepare_uniforms();

        let view = frame
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Gears Encoder"),
            });

        let (color_load, depth_load) = match self.clear {
            Some(([r, g, b, a], depth)) => (
                wgpu::LoadOp::Clear(wgpu::Color {
                    r: r as f64,
                    g: g as f64,
                    b: b as f64,
                    a: a as f64,
                }),
                wgpu::LoadOp::Clear(depth),
            ),
            None => (wgpu::LoadOp::Load, wgpu::LoadOp::Load),
        };

        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Gears Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: color_load,
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: self.depth_texture.as_ref().map(|depth| {
                    wgpu::RenderPassDepthStencilAttachment {
                        view: &depth.view,
                        depth_ops: Some(wgpu::Operations {
                            load: depth_load,
                            store: wgpu::StoreOp::Store,
                        }),
                        stencil_ops: None,
                    }
                }),
                occlusion_query_set: None,
                timestamp_writes: None,
            });

            let (width, height) = self.viewport.unwrap_or(self.surface_size());
            let width = width.min(self.config.width) as f32;
            let height = height.min(self.config.height) as f32;
            pass.set_viewport(0.0, 0.0, width, height, 0.0, 1.0);

            self.encode_draws(&mut pass);
        }

        self.queue.submit(std::iter::once(encoder.finish()));
        frame.present();
        self.reset_frame();
    }

    fn info(&self) -> ContextInfo {
        let info = &self.adapter_info;
        let extensions = feature_names(self.device.features());

        ContextInfo {
            renderer: info.name.clone(),
            version: format!("{:?} {} {}", info.backend, info.driver, info.driver_info)
                .trim()
                .to_string(),
            vendor: format!("0x{:04X}", info.vendor),
            extensions,
        }
    }
}

/// Names of the enabled device features, in declaration order.
fn feature_names(features: wgpu::Features) -> Vec<String> {
    features
        .iter_names()
        .map(|(name, _)| name.to_string())
        .collect()
}
