/// Mock render system for tests (no GPU required)
///
/// Records every call as a [`RecordedCommand`], keeps buffer and texture bytes
/// in memory and counts program compilations. The shared state is reachable
/// through a [`MockRecorder`] obtained before the render system is handed to
/// a `Root`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use glam::{Mat4, Vec4};
use rustc_hash::FxHashSet;

use crate::engine_bail;
use crate::error::{Error, Result};
use crate::gpu_program::{GpuParamVariability, GpuProgramParameters, GpuProgramType};
use crate::hardware::{HardwareBufferKind, HardwareBufferUsage, PixelUtil};
use crate::render_system::{
    Capabilities, ColourWriteMask, CompareFunction, ConfigOption, CullingMode, FrameBufferType,
    GpuBuffer, GpuProgramDesc, GpuProgramObject, GpuTexture, HardwareBufferFactory,
    OperationType, PolygonMode, Rect2D, RenderOperation, RenderSystem,
    RenderSystemCapabilities, SamplerState, SceneBlend, StencilState, TextureDesc,
};
use crate::target::RenderTarget;

/// Name under which the mock registers in `ogre.cfg`
pub const MOCK_RENDER_SYSTEM_NAME: &str = "Mock Rendering Subsystem";

const MICROCODE_PREFIX: &str = "MOCKBIN:";

static NEXT_OBJECT_ID: AtomicU64 = AtomicU64::new(1);

fn next_id() -> u64 {
    NEXT_OBJECT_ID.fetch_add(1, Ordering::Relaxed)
}

// ============================================================================
// Recorded commands
// ============================================================================

/// One recorded draw call
#[derive(Debug, Clone, PartialEq)]
pub struct DrawCall {
    pub operation_type: OperationType,
    pub use_indexes: bool,
    pub vertex_start: usize,
    pub vertex_count: usize,
    pub index_start: usize,
    pub index_count: usize,
    /// First world matrix set before the draw
    pub world: Mat4,
    pub render_target: String,
}

/// Every call made on the mock, in order
#[derive(Debug, Clone, PartialEq)]
pub enum RecordedCommand {
    BeginFrame,
    EndFrame,
    SwapBuffers(String),
    SetRenderTarget(String),
    SetViewport(Rect2D),
    SetScissor(bool, Rect2D),
    Clear { buffers: FrameBufferType, colour: Vec4, depth: f32, stencil: u32 },
    SetWorldMatrices(Vec<Mat4>),
    SetViewMatrix(Mat4),
    SetProjectionMatrix(Mat4),
    SetDepthParams { check: bool, write: bool, function: CompareFunction },
    SetCullingMode(CullingMode),
    SetSceneBlending(SceneBlend),
    SetPolygonMode(PolygonMode),
    SetColourWrite(ColourWriteMask),
    SetStencil(StencilState),
    BindProgram { program_type: GpuProgramType, id: u64 },
    UnbindProgram(GpuProgramType),
    BindParameters { program_type: GpuProgramType, mask: GpuParamVariability, values: Vec<f32> },
    SetTexture { unit: usize, texture: Option<u64> },
    SetSampler { unit: usize, sampler: SamplerState },
    DisableTextureUnitsFrom(usize),
    Draw(DrawCall),
}

// ============================================================================
// Shared state
// ============================================================================

#[derive(Default)]
struct MockState {
    commands: Vec<RecordedCommand>,
    source_compiles: usize,
    microcode_loads: usize,
    buffer_reads: usize,
    fail_program_compilation: bool,
    failing_programs: FxHashSet<String>,
    memory_limit: Option<usize>,
    allocated_bytes: usize,
    textures: Vec<Weak<MockGpuTexture>>,
}

fn lock_state(state: &Mutex<MockState>) -> Result<MutexGuard<'_, MockState>> {
    state
        .lock()
        .map_err(|_| Error::InternalError("mock render system state poisoned".to_string()))
}

/// Test-side view of the mock's shared state
#[derive(Clone)]
pub struct MockRecorder {
    state: Arc<Mutex<MockState>>,
}

impl MockRecorder {
    fn with<R>(&self, f: impl FnOnce(&mut MockState) -> R) -> R {
        let mut state = match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        f(&mut state)
    }

    pub fn commands(&self) -> Vec<RecordedCommand> {
        self.with(|s| s.commands.clone())
    }

    pub fn clear_commands(&self) {
        self.with(|s| s.commands.clear())
    }

    /// Draw calls only, in submission order
    pub fn draws(&self) -> Vec<DrawCall> {
        self.with(|s| {
            s.commands
                .iter()
                .filter_map(|c| match c {
                    RecordedCommand::Draw(draw) => Some(draw.clone()),
                    _ => None,
                })
                .collect()
        })
    }

    /// Number of programs compiled from source
    pub fn source_compile_count(&self) -> usize {
        self.with(|s| s.source_compiles)
    }

    /// Number of programs created from microcode
    pub fn microcode_load_count(&self) -> usize {
        self.with(|s| s.microcode_loads)
    }

    /// Number of reads that went to GPU memory
    pub fn buffer_read_count(&self) -> usize {
        self.with(|s| s.buffer_reads)
    }

    pub fn set_fail_program_compilation(&self, fail: bool) {
        self.with(|s| s.fail_program_compilation = fail)
    }

    /// Make compilation of the named program fail
    pub fn fail_program(&self, name: &str) {
        self.with(|s| {
            s.failing_programs.insert(name.to_string());
        })
    }

    /// Cap on bytes allocated by buffers and textures (`None` = unlimited)
    pub fn set_memory_limit(&self, limit: Option<usize>) {
        self.with(|s| s.memory_limit = limit)
    }

    pub fn allocated_bytes(&self) -> usize {
        self.with(|s| s.allocated_bytes)
    }

    /// (name, width, height) of every texture still alive
    pub fn live_textures(&self) -> Vec<(String, u32, u32)> {
        self.with(|s| {
            s.textures.retain(|t| t.strong_count() > 0);
            s.textures
                .iter()
                .filter_map(|t| t.upgrade())
                .map(|t| (t.desc.name.clone(), t.desc.width, t.desc.height))
                .collect()
        })
    }
}

fn reserve_memory(state: &Mutex<MockState>, size: usize) -> Result<()> {
    let mut state = lock_state(state)?;
    if let Some(limit) = state.memory_limit {
        if state.allocated_bytes + size > limit {
            crate::engine_error!(
                "ogre::MockRenderSystem",
                "Allocation of {} bytes exceeds mock limit of {} bytes",
                size,
                limit
            );
            return Err(Error::OutOfGpuMemory);
        }
    }
    state.allocated_bytes += size;
    Ok(())
}

// ============================================================================
// Mock GPU objects
// ============================================================================

/// In-memory buffer
pub struct MockGpuBuffer {
    id: u64,
    data: Mutex<Vec<u8>>,
    state: Arc<Mutex<MockState>>,
}

impl MockGpuBuffer {
    fn new(size: usize, state: Arc<Mutex<MockState>>) -> Result<Self> {
        reserve_memory(&state, size)?;
        Ok(Self {
            id: next_id(),
            data: Mutex::new(vec![0; size]),
            state,
        })
    }

    fn data(&self) -> Result<MutexGuard<'_, Vec<u8>>> {
        self.data
            .lock()
            .map_err(|_| Error::InternalError("mock buffer poisoned".to_string()))
    }
}

impl GpuBuffer for MockGpuBuffer {
    fn id(&self) -> u64 {
        self.id
    }

    fn size(&self) -> usize {
        self.data().map(|d| d.len()).unwrap_or(0)
    }

    fn read(&self, offset: usize, dst: &mut [u8]) -> Result<()> {
        let data = self.data()?;
        if offset + dst.len() > data.len() {
            engine_bail!("ogre::MockGpuBuffer", InvalidParams,
                "read of {} bytes at {} exceeds buffer size {}", dst.len(), offset, data.len());
        }
        dst.copy_from_slice(&data[offset..offset + dst.len()]);
        drop(data);
        lock_state(&self.state)?.buffer_reads += 1;
        Ok(())
    }

    fn write(&self, offset: usize, src: &[u8], discard: bool) -> Result<()> {
        let mut data = self.data()?;
        if offset + src.len() > data.len() {
            engine_bail!("ogre::MockGpuBuffer", InvalidParams,
                "write of {} bytes at {} exceeds buffer size {}", src.len(), offset, data.len());
        }
        if discard {
            data.iter_mut().for_each(|b| *b = 0);
        }
        data[offset..offset + src.len()].copy_from_slice(src);
        Ok(())
    }
}

impl Drop for MockGpuBuffer {
    fn drop(&mut self) {
        let size = self.data.get_mut().map(|d| d.len()).unwrap_or(0);
        if let Ok(mut state) = self.state.lock() {
            state.allocated_bytes = state.allocated_bytes.saturating_sub(size);
        }
    }
}

/// Buffer factory sharing the mock's state
pub struct MockBufferFactory {
    state: Arc<Mutex<MockState>>,
}

impl HardwareBufferFactory for MockBufferFactory {
    fn create_buffer(
        &self,
        _kind: HardwareBufferKind,
        size: usize,
        _usage: HardwareBufferUsage,
    ) -> Result<Arc<dyn GpuBuffer>> {
        Ok(Arc::new(MockGpuBuffer::new(size, self.state.clone())?))
    }
}

/// In-memory texture: one buffer per (face, mip)
pub struct MockGpuTexture {
    id: u64,
    desc: TextureDesc,
    surfaces: Vec<Arc<MockGpuBuffer>>,
}

impl GpuTexture for MockGpuTexture {
    fn id(&self) -> u64 {
        self.id
    }

    fn desc(&self) -> &TextureDesc {
        &self.desc
    }

    fn surface(&self, face: u32, mip: u32) -> Result<Arc<dyn GpuBuffer>> {
        let mips = self.desc.num_mipmaps + 1;
        if face >= self.desc.texture_type.face_count() || mip >= mips {
            engine_bail!("ogre::MockGpuTexture", InvalidParams,
                "surface (face {}, mip {}) out of range for '{}'", face, mip, self.desc.name);
        }
        let buffer: Arc<dyn GpuBuffer> = self.surfaces[(face * mips + mip) as usize].clone();
        Ok(buffer)
    }
}

/// Compiled program (source kept as microcode)
pub struct MockGpuProgram {
    id: u64,
    program_type: GpuProgramType,
    microcode: Vec<u8>,
}

impl GpuProgramObject for MockGpuProgram {
    fn id(&self) -> u64 {
        self.id
    }

    fn program_type(&self) -> GpuProgramType {
        self.program_type
    }

    fn microcode(&self) -> Option<Vec<u8>> {
        Some(self.microcode.clone())
    }
}

// ============================================================================
// Mock render system
// ============================================================================

/// Render system that records instead of rendering
pub struct MockRenderSystem {
    state: Arc<Mutex<MockState>>,
    capabilities: RenderSystemCapabilities,
    options: Vec<ConfigOption>,
    initialised: bool,
    in_frame: bool,
    current_target: String,
    current_world: Mat4,
}

impl MockRenderSystem {
    /// Create a mock with a broad capability set
    pub fn new() -> Self {
        let mut capabilities = RenderSystemCapabilities {
            capabilities: Capabilities::AUTOMIPMAP
                | Capabilities::NON_POWER_OF_2_TEXTURES
                | Capabilities::CAN_GET_COMPILED_SHADER_BUFFER
                | Capabilities::HWSTENCIL
                | Capabilities::VERTEX_PROGRAM
                | Capabilities::FRAGMENT_PROGRAM
                | Capabilities::GEOMETRY_PROGRAM
                | Capabilities::ANISOTROPY
                | Capabilities::SCISSOR_TEST
                | Capabilities::HWRENDER_TO_TEXTURE
                | Capabilities::FSAA,
            shader_model: "4.1".to_string(),
            num_texture_units: 16,
            num_multi_render_targets: 4,
            max_anisotropy: 16,
            fsaa_levels: vec![0, 2, 4, 8],
            ..Default::default()
        };
        for syntax in ["glsl", "glsl330", "spirv"] {
            capabilities.add_syntax(syntax);
        }

        Self {
            state: Arc::new(Mutex::new(MockState::default())),
            capabilities,
            options: vec![
                ConfigOption::new("Full Screen", "No", &["Yes", "No"]),
                ConfigOption::new("Video Mode", "1280 x 720", &["800 x 600", "1280 x 720", "1920 x 1080"]),
                ConfigOption::new("VSync", "Yes", &["Yes", "No"]),
            ],
            initialised: false,
            in_frame: false,
            current_target: String::new(),
            current_world: Mat4::IDENTITY,
        }
    }

    /// Replace the capability set (builder style)
    pub fn with_capabilities(mut self, capabilities: RenderSystemCapabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    pub fn capabilities_mut(&mut self) -> &mut RenderSystemCapabilities {
        &mut self.capabilities
    }

    /// Handle on the recorded state
    pub fn recorder(&self) -> MockRecorder {
        MockRecorder { state: self.state.clone() }
    }

    pub fn is_initialised(&self) -> bool {
        self.initialised
    }

    fn record(&self, command: RecordedCommand) {
        if let Ok(mut state) = self.state.lock() {
            state.commands.push(command);
        }
    }
}

impl Default for MockRenderSystem {
    fn default() -> Self {
        Self::new()
    }
}

impl RenderSystem for MockRenderSystem {
    fn name(&self) -> &str {
        MOCK_RENDER_SYSTEM_NAME
    }

    fn config_options(&self) -> Vec<ConfigOption> {
        self.options.clone()
    }

    fn set_config_option(&mut self, name: &str, value: &str) -> Result<()> {
        let Some(option) = self.options.iter_mut().find(|o| o.name == name) else {
            engine_bail!("ogre::MockRenderSystem", InvalidParams, "Unknown option '{}'", name);
        };
        if !option.possible_values.iter().any(|v| v == value) {
            engine_bail!("ogre::MockRenderSystem", InvalidParams,
                "Invalid value '{}' for option '{}'", value, name);
        }
        option.current_value = value.to_string();
        Ok(())
    }

    fn capabilities(&self) -> &RenderSystemCapabilities {
        &self.capabilities
    }

    fn initialise(&mut self) -> Result<()> {
        self.initialised = true;
        Ok(())
    }

    fn shutdown(&mut self) {
        self.initialised = false;
    }

    fn begin_frame(&mut self) -> Result<()> {
        if self.in_frame {
            engine_bail!("ogre::MockRenderSystem", InvalidState, "begin_frame called twice");
        }
        self.in_frame = true;
        self.record(RecordedCommand::BeginFrame);
        Ok(())
    }

    fn end_frame(&mut self) -> Result<()> {
        if !self.in_frame {
            engine_bail!("ogre::MockRenderSystem", InvalidState, "end_frame without begin_frame");
        }
        self.in_frame = false;
        self.record(RecordedCommand::EndFrame);
        Ok(())
    }

    fn swap_buffers(&mut self, target: &str) -> Result<()> {
        self.record(RecordedCommand::SwapBuffers(target.to_string()));
        Ok(())
    }

    fn set_world_matrices(&mut self, matrices: &[Mat4]) {
        self.current_world = matrices.first().copied().unwrap_or(Mat4::IDENTITY);
        self.record(RecordedCommand::SetWorldMatrices(matrices.to_vec()));
    }

    fn set_view_matrix(&mut self, view: Mat4) {
        self.record(RecordedCommand::SetViewMatrix(view));
    }

    fn set_projection_matrix(&mut self, projection: Mat4) {
        self.record(RecordedCommand::SetProjectionMatrix(projection));
    }

    fn set_render_target(&mut self, target: &RenderTarget) -> Result<()> {
        self.current_target = target.name().to_string();
        self.record(RecordedCommand::SetRenderTarget(self.current_target.clone()));
        Ok(())
    }

    fn set_viewport(&mut self, rect: Rect2D) {
        self.record(RecordedCommand::SetViewport(rect));
    }

    fn set_scissor(&mut self, enabled: bool, rect: Rect2D) {
        self.record(RecordedCommand::SetScissor(enabled, rect));
    }

    fn set_depth_buffer_params(&mut self, check: bool, write: bool, function: CompareFunction) {
        self.record(RecordedCommand::SetDepthParams { check, write, function });
    }

    fn set_culling_mode(&mut self, mode: CullingMode) {
        self.record(RecordedCommand::SetCullingMode(mode));
    }

    fn set_scene_blending(&mut self, blend: SceneBlend) {
        self.record(RecordedCommand::SetSceneBlending(blend));
    }

    fn set_polygon_mode(&mut self, mode: PolygonMode) {
        self.record(RecordedCommand::SetPolygonMode(mode));
    }

    fn set_colour_write(&mut self, mask: ColourWriteMask) {
        self.record(RecordedCommand::SetColourWrite(mask));
    }

    fn set_stencil_state(&mut self, state: &StencilState) {
        self.record(RecordedCommand::SetStencil(*state));
    }

    fn clear_frame_buffer(&mut self, buffers: FrameBufferType, colour: Vec4, depth: f32, stencil: u32) {
        self.record(RecordedCommand::Clear { buffers, colour, depth, stencil });
    }

    fn hardware_buffer_factory(&self) -> Arc<dyn HardwareBufferFactory> {
        Arc::new(MockBufferFactory { state: self.state.clone() })
    }

    fn create_texture(&mut self, desc: &TextureDesc) -> Result<Arc<dyn GpuTexture>> {
        if desc.width == 0 || desc.height == 0 {
            engine_bail!("ogre::MockRenderSystem", InvalidParams,
                "Texture '{}' has a zero extent", desc.name);
        }
        let mut surfaces = Vec::new();
        for _face in 0..desc.texture_type.face_count() {
            for mip in 0..=desc.num_mipmaps {
                let (w, h, d) = desc.mip_extent(mip);
                let size = PixelUtil::memory_size(w, h, d, desc.format);
                surfaces.push(Arc::new(MockGpuBuffer::new(size, self.state.clone())?));
            }
        }
        let texture = Arc::new(MockGpuTexture {
            id: next_id(),
            desc: desc.clone(),
            surfaces,
        });
        lock_state(&self.state)?.textures.push(Arc::downgrade(&texture));
        Ok(texture)
    }

    fn create_gpu_program(&mut self, desc: &GpuProgramDesc) -> Result<Arc<dyn GpuProgramObject>> {
        let fail = {
            let mut state = lock_state(&self.state)?;
            state.source_compiles += 1;
            state.fail_program_compilation || state.failing_programs.contains(&desc.name)
        };
        if fail || desc.source.contains("#error") {
            engine_bail!("ogre::MockRenderSystem", RenderingApiError,
                "Compilation of program '{}' failed", desc.name);
        }
        if !self.capabilities.is_syntax_supported(&desc.syntax) {
            engine_bail!("ogre::MockRenderSystem", RenderingApiError,
                "Syntax '{}' of program '{}' is not supported", desc.syntax, desc.name);
        }
        let microcode = format!(
            "{}{:?}:{}:{}:{}",
            MICROCODE_PREFIX,
            desc.program_type,
            desc.syntax,
            desc.defines.join(";"),
            desc.source
        )
        .into_bytes();
        Ok(Arc::new(MockGpuProgram {
            id: next_id(),
            program_type: desc.program_type,
            microcode,
        }))
    }

    fn create_gpu_program_from_microcode(
        &mut self,
        program_type: GpuProgramType,
        microcode: &[u8],
    ) -> Result<Arc<dyn GpuProgramObject>> {
        if !microcode.starts_with(MICROCODE_PREFIX.as_bytes()) {
            engine_bail!("ogre::MockRenderSystem", InvalidAsset,
                "Microcode of {} bytes is not mock microcode", microcode.len());
        }
        lock_state(&self.state)?.microcode_loads += 1;
        Ok(Arc::new(MockGpuProgram {
            id: next_id(),
            program_type,
            microcode: microcode.to_vec(),
        }))
    }

    fn bind_gpu_program(&mut self, program: &Arc<dyn GpuProgramObject>) {
        self.record(RecordedCommand::BindProgram {
            program_type: program.program_type(),
            id: program.id(),
        });
    }

    fn unbind_gpu_program(&mut self, program_type: GpuProgramType) {
        self.record(RecordedCommand::UnbindProgram(program_type));
    }

    fn bind_gpu_program_parameters(
        &mut self,
        program_type: GpuProgramType,
        params: &GpuProgramParameters,
        mask: GpuParamVariability,
    ) {
        self.record(RecordedCommand::BindParameters {
            program_type,
            mask,
            values: params.float_constants().to_vec(),
        });
    }

    fn set_texture(&mut self, unit: usize, texture: Option<&Arc<dyn GpuTexture>>) {
        self.record(RecordedCommand::SetTexture {
            unit,
            texture: texture.map(|t| t.id()),
        });
    }

    fn set_sampler_state(&mut self, unit: usize, sampler: &SamplerState) {
        self.record(RecordedCommand::SetSampler { unit, sampler: *sampler });
    }

    fn disable_texture_units_from(&mut self, first_unit: usize) {
        self.record(RecordedCommand::DisableTextureUnitsFrom(first_unit));
    }

    fn render(&mut self, operation: &RenderOperation) -> Result<()> {
        if !self.in_frame {
            engine_bail!("ogre::MockRenderSystem", InvalidState, "render outside begin/end frame");
        }
        let vertex_data = &operation.vertex_data;
        vertex_data.binding.validate(&vertex_data.declaration)?;

        let (index_start, index_count) = match (&operation.index_data, operation.use_indexes) {
            (Some(index), true) => (index.index_start, index.index_count),
            (None, true) => {
                engine_bail!("ogre::MockRenderSystem", InvalidParams,
                    "Indexed render operation without index data");
            }
            _ => (0, 0),
        };

        self.record(RecordedCommand::Draw(DrawCall {
            operation_type: operation.operation_type,
            use_indexes: operation.use_indexes,
            vertex_start: vertex_data.vertex_start,
            vertex_count: vertex_data.vertex_count,
            index_start,
            index_count,
            world: self.current_world,
            render_target: self.current_target.clone(),
        }));
        Ok(())
    }
}

#[cfg(test)]
#[path = "mock_tests.rs"]
mod tests;
