//! # Headless Context
//!
//! A [`RenderContext`] that needs no GPU. Stages are compiled and linked with
//! the same WGSL front end the windowed context uses, so shader errors and
//! uniform layouts are real; buffers, uniform writes and draws are recorded.
//!
//! Every resource goes through a [`ResourceLedger`], a cheap shared handle
//! that stays readable after the context itself has been moved or dropped:
//!
//! ```rust
//! use gears::gfx::headless::{HeadlessContext, TickRecorder};
//! use gears::Gears;
//!
//! let ctx = HeadlessContext::new();
//! let ledger = ctx.ledger();
//!
//! let mut gears = Gears::new();
//! gears.attach(Box::new(TickRecorder::default()), ctx).unwrap();
//! gears.tick_at(0.0);
//! assert_eq!(ledger.frames().len(), 1);
//!
//! drop(gears.detach());
//! assert_eq!(ledger.live_total(), 0);
//! ```

use std::{
    cell::{Cell, RefCell},
    collections::{HashMap, HashSet, VecDeque},
    rc::Rc,
};

use crate::{
    error::{GearsError, Result},
    gfx::{
        context::{
            AttributeBinding, BufferId, BufferKind, Compiled, ContextInfo, ProgramId,
            RenderContext, Scheduler, StageId, StageKind, UniformKind, UniformLocation,
            UniformValue,
        },
        shader::wgsl::{self, ProgramLayout, StageModule},
    },
};

/// [`Scheduler`] that only counts tick requests. Clones share the count.
#[derive(Debug, Clone, Default)]
pub struct TickRecorder {
    requests: Rc<Cell<usize>>,
}

impl TickRecorder {
    pub fn requests(&self) -> usize {
        self.requests.get()
    }
}

impl Scheduler for TickRecorder {
    fn request_tick(&mut self) {
        self.requests.set(self.requests.get() + 1);
    }
}

/// One recorded indexed draw.
#[derive(Debug, Clone, PartialEq)]
pub struct DrawCall {
    pub program: ProgramId,
    pub index_count: u32,
    pub vertex_buffers: [Option<BufferId>; 2],
    pub index_buffer: Option<BufferId>,
    /// Uniform block of `program` at the time of the draw.
    pub uniforms: Vec<u8>,
}

impl DrawCall {
    /// Floats stored at `location` in the snapshot, without mat3 padding.
    pub fn floats(&self, location: UniformLocation) -> Vec<f32> {
        let start = location.offset as usize;
        let block: Vec<f32> = self.uniforms[start..start + location.kind.size()]
            .chunks_exact(4)
            .map(bytemuck::pod_read_unaligned)
            .collect();
        match location.kind {
            UniformKind::Mat3 => block
                .chunks(4)
                .flat_map(|column| column[..3].iter().copied())
                .collect(),
            _ => block,
        }
    }
}

/// Everything submitted between two flushes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Frame {
    pub clear_color: Option<[f32; 4]>,
    pub viewport: Option<(u32, u32)>,
    pub draws: Vec<DrawCall>,
}

/// Flushed frames kept by a ledger; older ones are dropped.
pub const MAX_RECORDED_FRAMES: usize = 256;

#[derive(Debug, Clone, Copy)]
enum Resource {
    Stage,
    Program,
    Buffer,
}

#[derive(Debug, Default)]
struct LedgerState {
    live_stages: HashSet<u32>,
    live_programs: HashSet<u32>,
    live_buffers: HashSet<u32>,
    programs_created: usize,
    buffers_created: usize,
    double_releases: usize,
    upload_sizes: Vec<usize>,
    frames: VecDeque<Frame>,
}

/// Shared record of what a [`HeadlessContext`] created, destroyed and drew.
#[derive(Debug, Clone, Default)]
pub struct ResourceLedger {
    state: Rc<RefCell<LedgerState>>,
}

impl ResourceLedger {
    pub fn live_stages(&self) -> usize {
        self.state.borrow().live_stages.len()
    }

    pub fn live_programs(&self) -> usize {
        self.state.borrow().live_programs.len()
    }

    pub fn live_buffers(&self) -> usize {
        self.state.borrow().live_buffers.len()
    }

    /// Stages, programs and buffers that have not been destroyed.
    pub fn live_total(&self) -> usize {
        let state = self.state.borrow();
        state.live_stages.len() + state.live_programs.len() + state.live_buffers.len()
    }

    pub fn programs_created(&self) -> usize {
        self.state.borrow().programs_created
    }

    pub fn buffers_created(&self) -> usize {
        self.state.borrow().buffers_created
    }

    /// Destroy calls on handles that were not live.
    pub fn double_releases(&self) -> usize {
        self.state.borrow().double_releases
    }

    /// Byte sizes of every buffer upload, in order.
    pub fn upload_sizes(&self) -> Vec<usize> {
        self.state.borrow().upload_sizes.clone()
    }

    /// Recorded frames, oldest first. At most [`MAX_RECORDED_FRAMES`].
    pub fn frames(&self) -> Vec<Frame> {
        self.state.borrow().frames.iter().cloned().collect()
    }

    /// Removes and returns the recorded frames.
    pub fn take_frames(&self) -> Vec<Frame> {
        self.state.borrow_mut().frames.drain(..).collect()
    }

    pub fn last_frame(&self) -> Option<Frame> {
        self.state.borrow().frames.back().cloned()
    }

    fn record_frame(&self, frame: Frame) {
        let mut state = self.state.borrow_mut();
        if state.frames.len() == MAX_RECORDED_FRAMES {
            state.frames.pop_front();
        }
        state.frames.push_back(frame);
    }

    fn release(&self, kind: Resource, id: u32) {
        let mut state = self.state.borrow_mut();
        let live = match kind {
            Resource::Stage => &mut state.live_stages,
            Resource::Program => &mut state.live_programs,
            Resource::Buffer => &mut state.live_buffers,
        };
        if !live.remove(&id) {
            log::warn!("{kind:?} {id} destroyed while not live");
            state.double_releases += 1;
        }
    }
}

struct HeadlessProgram {
    layout: Option<ProgramLayout>,
    block: Vec<u8>,
}

/// GPU-free [`RenderContext`] backed by naga and a [`ResourceLedger`].
pub struct HeadlessContext {
    ledger: ResourceLedger,
    next_id: u32,
    stages: HashMap<u32, StageModule>,
    programs: HashMap<u32, HeadlessProgram>,
    current_program: Option<ProgramId>,
    vertex_buffers: [Option<BufferId>; 2],
    index_buffer: Option<BufferId>,
    pending: Frame,
    buffer_budget: Option<usize>,
    compile_budget: Option<usize>,
    link_budget: Option<usize>,
    compile_log: String,
}

impl HeadlessContext {
    pub fn new() -> Self {
        Self {
            ledger: ResourceLedger::default(),
            next_id: 1,
            stages: HashMap::new(),
            programs: HashMap::new(),
            current_program: None,
            vertex_buffers: [None; 2],
            index_buffer: None,
            pending: Frame::default(),
            buffer_budget: None,
            compile_budget: None,
            link_budget: None,
            compile_log: String::new(),
        }
    }

    /// A handle to this context's ledger.
    pub fn ledger(&self) -> ResourceLedger {
        self.ledger.clone()
    }

    /// Lets the next `count` buffer creations succeed and fails every one
    /// after that.
    pub fn fail_buffer_creation_after(&mut self, count: usize) {
        self.buffer_budget = Some(count);
    }

    /// Lets the next `count` stage compilations succeed and rejects every one
    /// after that, as a driver would.
    pub fn fail_compile_after(&mut self, count: usize) {
        self.compile_budget = Some(count);
    }

    /// Lets the next `count` program links succeed and rejects every one
    /// after that.
    pub fn fail_link_after(&mut self, count: usize) {
        self.link_budget = Some(count);
    }

    /// Removes every injected failure.
    pub fn clear_failures(&mut self) {
        self.buffer_budget = None;
        self.compile_budget = None;
        self.link_budget = None;
    }

    /// Log returned with every successful compilation. Empty by default.
    pub fn set_compile_log(&mut self, log: impl Into<String>) {
        self.compile_log = log.into();
    }

    pub fn current_program(&self) -> Option<ProgramId> {
        self.current_program
    }

    fn next_id(&mut self) -> u32 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }
}

/// Spends one unit of `budget`. `false` once it is exhausted.
fn spend(budget: &mut Option<usize>) -> bool {
    match budget {
        Some(0) => false,
        Some(left) => {
            *left -= 1;
            true
        }
        None => true,
    }
}

impl Default for HeadlessContext {
    fn default() -> Self {
        Self::new()
    }
}

impl RenderContext for HeadlessContext {
    fn compile_stage(
        &mut self,
        kind: StageKind,
        source: &str,
        label: &str,
    ) -> std::result::Result<Compiled<StageId>, String> {
        if !spend(&mut self.compile_budget) {
            return Err(format!("error: {kind} stage '{label}' rejected by the driver"));
        }
        let module = wgsl::compile(kind, source)?;
        let id = self.next_id();
        self.stages.insert(id, module);
        self.ledger.state.borrow_mut().live_stages.insert(id);
        Ok(Compiled {
            handle: StageId(id),
            log: self.compile_log.clone(),
        })
    }

    fn destroy_stage(&mut self, stage: StageId) {
        self.stages.remove(&stage.0);
        self.ledger.release(Resource::Stage, stage.0);
    }

    fn create_program(&mut self, _label: &str) -> ProgramId {
        let id = self.next_id();
        self.programs.insert(
            id,
            HeadlessProgram {
                layout: None,
                block: Vec::new(),
            },
        );
        let mut state = self.ledger.state.borrow_mut();
        state.live_programs.insert(id);
        state.programs_created += 1;
        ProgramId(id)
    }

    fn link_program(
        &mut self,
        program: ProgramId,
        vertex: StageId,
        fragment: StageId,
        attributes: &[AttributeBinding<'_>],
    ) -> std::result::Result<String, String> {
        if !spend(&mut self.link_budget) {
            return Err(format!("error: program {} rejected by the driver", program.0));
        }
        let (Some(vs), Some(fs)) = (self.stages.get(&vertex.0), self.stages.get(&fragment.0))
        else {
            return Err("error: stage handle is not live".to_string());
        };
        let (layout, log) = wgsl::link(vs, fs, attributes)?;

        let entry = self
            .programs
            .get_mut(&program.0)
            .ok_or_else(|| "error: program handle is not live".to_string())?;
        entry.block = vec![0; layout.block_size()];
        entry.layout = Some(layout);
        Ok(log)
    }

    fn destroy_program(&mut self, program: ProgramId) {
        self.programs.remove(&program.0);
        if self.current_program == Some(program) {
            self.current_program = None;
        }
        self.ledger.release(Resource::Program, program.0);
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
            log::warn!("uniform write of {:?} does not fit {location:?}", value.kind());
            return;
        }
        value.write_to(&mut program.block[start..end]);
    }

    fn create_buffer(&mut self, kind: BufferKind, label: &str) -> Result<BufferId> {
        if !spend(&mut self.buffer_budget) {
            return Err(GearsError::BufferCreation {
                kind,
                reason: format!("out of memory creating '{label}'"),
            });
        }
        let id = self.next_id();
        let mut state = self.ledger.state.borrow_mut();
        state.live_buffers.insert(id);
        state.buffers_created += 1;
        Ok(BufferId(id))
    }

    fn upload_buffer(&mut self, buffer: BufferId, data: &[u8]) -> Result<()> {
        let mut state = self.ledger.state.borrow_mut();
        if !state.live_buffers.contains(&buffer.0) {
            return Err(GearsError::BufferCreation {
                kind: BufferKind::Vertex,
                reason: format!("buffer {} is not live", buffer.0),
            });
        }
        state.upload_sizes.push(data.len());
        Ok(())
    }

    fn destroy_buffer(&mut self, buffer: BufferId) {
        for slot in self.vertex_buffers.iter_mut() {
            if *slot == Some(buffer) {
                *slot = None;
            }
        }
        if self.index_buffer == Some(buffer) {
            self.index_buffer = None;
        }
        self.ledger.release(Resource::Buffer, buffer.0);
    }

    fn bind_vertex_buffer(&mut self, slot: u32, buffer: BufferId) {
        if let Some(bound) = self.vertex_buffers.get_mut(slot as usize) {
            *bound = Some(buffer);
        }
    }

    fn bind_index_buffer(&mut self, buffer: BufferId) {
        self.index_buffer = Some(buffer);
    }

    fn set_viewport(&mut self, width: u32, height: u32) {
        self.pending.viewport = Some((width, height));
    }

    fn clear(&mut self, color: [f32; 4], _depth: f32) {
        self.pending.clear_color = Some(color);
        self.pending.draws.clear();
    }

    fn draw_indexed(&mut self, index_count: u32) {
        let Some(program) = self.current_program else {
            log::warn!("draw with no program in use");
            return;
        };
        let uniforms = self
            .programs
            .get(&program.0)
            .map(|p| p.block.clone())
            .unwrap_or_default();
        self.pending.draws.push(DrawCall {
            program,
            index_count,
            vertex_buffers: self.vertex_buffers,
            index_buffer: self.index_buffer,
            uniforms,
        });
    }

    fn flush(&mut self) {
        let viewport = self.pending.viewport;
        let frame = std::mem::replace(
            &mut self.pending,
            Frame {
                viewport,
                ..Frame::default()
            },
        );
        self.ledger.record_frame(frame);
    }

    fn info(&self) -> ContextInfo {
        ContextInfo {
            renderer: "headless".to_string(),
            version: "WGSL (naga)".to_string(),
            vendor: env!("CARGO_PKG_NAME").to_string(),
            extensions: Vec::new(),
        }
    }
}
