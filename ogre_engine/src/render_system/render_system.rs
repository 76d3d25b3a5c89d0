/// RenderSystem trait - the rendering backend contract

use std::sync::{Arc, Mutex, MutexGuard};
use glam::{Mat4, Vec4};

use crate::error::{Error, Result};
use crate::gpu_program::{GpuParamVariability, GpuProgramParameters, GpuProgramType};
use crate::render_system::{
    ColourWriteMask, CompareFunction, CullingMode, FrameBufferType, GpuProgramDesc,
    GpuProgramObject, GpuTexture, HardwareBufferFactory, PolygonMode, Rect2D,
    RenderOperation, RenderSystemCapabilities, SamplerState, SceneBlend, StencilState,
    TextureDesc,
};
use crate::target::RenderTarget;

/// One user-configurable backend option (persisted in `ogre.cfg`)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigOption {
    pub name: String,
    pub current_value: String,
    pub possible_values: Vec<String>,
}

impl ConfigOption {
    pub fn new(name: &str, current_value: &str, possible_values: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            current_value: current_value.to_string(),
            possible_values: possible_values.iter().map(|v| v.to_string()).collect(),
        }
    }
}

/// Rendering backend
///
/// Implemented by backend plugins (GL, Vulkan, ...) and by
/// [`MockRenderSystem`](crate::render_system::mock::MockRenderSystem).
/// All calls happen on the render thread.
pub trait RenderSystem: Send {
    // ===== IDENTITY / CONFIGURATION =====

    /// Unique name, used as the `[Render System]` value in `ogre.cfg`
    fn name(&self) -> &str;

    fn config_options(&self) -> Vec<ConfigOption>;

    /// Change an option; unknown names or values are `InvalidParams`
    fn set_config_option(&mut self, name: &str, value: &str) -> Result<()>;

    // ===== LIFECYCLE =====

    fn capabilities(&self) -> &RenderSystemCapabilities;

    fn initialise(&mut self) -> Result<()>;

    fn shutdown(&mut self);

    fn begin_frame(&mut self) -> Result<()>;

    fn end_frame(&mut self) -> Result<()>;

    /// Present a window target
    fn swap_buffers(&mut self, target: &str) -> Result<()>;

    // ===== STATE =====

    /// World matrices of the next draw (bone palette or a single matrix)
    fn set_world_matrices(&mut self, matrices: &[Mat4]);

    fn set_view_matrix(&mut self, view: Mat4);

    fn set_projection_matrix(&mut self, projection: Mat4);

    fn set_render_target(&mut self, target: &RenderTarget) -> Result<()>;

    fn set_viewport(&mut self, rect: Rect2D);

    fn set_scissor(&mut self, enabled: bool, rect: Rect2D);

    fn set_depth_buffer_params(&mut self, check: bool, write: bool, function: CompareFunction);

    fn set_culling_mode(&mut self, mode: CullingMode);

    fn set_scene_blending(&mut self, blend: SceneBlend);

    fn set_polygon_mode(&mut self, mode: PolygonMode);

    fn set_colour_write(&mut self, mask: ColourWriteMask);

    fn set_stencil_state(&mut self, state: &StencilState);

    fn clear_frame_buffer(&mut self, buffers: FrameBufferType, colour: Vec4, depth: f32, stencil: u32);

    // ===== RESOURCES =====

    /// Factory used by the hardware buffer manager
    fn hardware_buffer_factory(&self) -> Arc<dyn HardwareBufferFactory>;

    fn create_texture(&mut self, desc: &TextureDesc) -> Result<Arc<dyn GpuTexture>>;

    /// Compile a program from source
    fn create_gpu_program(&mut self, desc: &GpuProgramDesc) -> Result<Arc<dyn GpuProgramObject>>;

    /// Create a program from previously compiled microcode
    fn create_gpu_program_from_microcode(
        &mut self,
        program_type: GpuProgramType,
        microcode: &[u8],
    ) -> Result<Arc<dyn GpuProgramObject>>;

    // ===== DRAW =====

    fn bind_gpu_program(&mut self, program: &Arc<dyn GpuProgramObject>);

    fn unbind_gpu_program(&mut self, program_type: GpuProgramType);

    /// Upload the slice of `params` whose variability intersects `mask`
    fn bind_gpu_program_parameters(
        &mut self,
        program_type: GpuProgramType,
        params: &GpuProgramParameters,
        mask: GpuParamVariability,
    );

    /// Bind (or unbind with `None`) a texture unit
    fn set_texture(&mut self, unit: usize, texture: Option<&Arc<dyn GpuTexture>>);

    fn set_sampler_state(&mut self, unit: usize, sampler: &SamplerState);

    /// Disable every texture unit from `first_unit` upward
    fn disable_texture_units_from(&mut self, first_unit: usize);

    fn render(&mut self, operation: &RenderOperation) -> Result<()>;
}

/// Render system shared between the root and the managers that create GPU
/// objects
pub type SharedRenderSystem = Arc<Mutex<dyn RenderSystem>>;

/// Lock a shared render system
pub fn lock_render_system(render_system: &SharedRenderSystem) -> Result<MutexGuard<'_, dyn RenderSystem + 'static>> {
    render_system
        .lock()
        .map_err(|_| Error::InternalError("render system mutex poisoned".to_string()))
}
