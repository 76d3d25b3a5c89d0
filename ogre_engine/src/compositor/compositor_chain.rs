/// Compositor chain: the compositors applied to one viewport, in order.
///
/// Compiling flattens the enabled instances into target operations. A
/// target pass whose input is the previous compositor renders that
/// compositor's output passes straight into its own texture; the first
/// enabled instance receives the original scene instead (viewport clear
/// plus scene render). The last enabled instance's output passes render
/// into the viewport.
///
/// Local pooled textures are shared between instances, except that an
/// instance never receives a texture the previous instance's output passes
/// read: those passes run while the instance's own targets are bound, so
/// the texture would be read and written by the same pass.

use std::sync::Arc;
use glam::Mat4;
use rustc_hash::{FxHashMap, FxHashSet};
use crate::error::Result;
use crate::gpu_program::AutoParamDataSource;
use crate::material::{Material, MaterialManager};
use crate::render_queue::{QueuedRenderable, RenderQueueVisitor, RENDER_QUEUE_MAX};
use crate::render_system::{
    lock_render_system, FrameBufferType, GpuTexture, Rect2D, RenderSystem,
    RenderSystemCapabilities, SharedRenderSystem, StencilState, TextureDesc, TextureUsage,
};
use crate::resource::{ResourceRef, AUTODETECT_RESOURCE_GROUP_NAME};
use crate::scene::{
    compositor_texture_key, CompositorTextureMap, PassRenderer, Rectangle2D, RenderSceneOptions,
    SceneManager,
};
use crate::target::{RenderTarget, Viewport};
use crate::{engine_bail, engine_info, engine_trivial, engine_warn};
use super::compositor::{
    CompositionPass, CompositionTargetPass, Compositor, InputMode, TextureReference, TextureScope,
};
use super::compositor_instance::{CompositorInstance, InstanceState};
use super::custom_pass::{CompositorOperation, CustomCompositionPass};
use super::texture_pool::TexturePool;

const SOURCE: &str = "ogre::CompositorChain";

// ============================================================================
// Compiled operations
// ============================================================================

pub(crate) enum CompiledPass {
    /// Clear with the viewport's settings, read when the pass runs
    ViewportClear,
    Clear { buffers: FrameBufferType, colour: glam::Vec4, depth: f32, stencil: u32 },
    Stencil(StencilState),
    RenderScene { first: u8, last: u8, material_scheme: Option<String> },
    /// `textures[unit]` replaces the material's texture on that unit
    RenderQuad { material: ResourceRef<Material>, textures: Vec<Option<Arc<dyn GpuTexture>>> },
    Custom(Box<dyn CompositorOperation>),
}

/// Everything rendered into one target during a chain update
pub struct TargetOperation {
    /// `None` renders into the viewport's own target
    target: Option<RenderTarget>,
    only_initial: bool,
    rendered: bool,
    visibility_mask: u32,
    material_scheme: Option<String>,
    passes: Vec<CompiledPass>,
}

impl TargetOperation {
    /// Texture written, `None` for the chain output
    pub fn output_texture(&self) -> Option<&Arc<dyn GpuTexture>> {
        self.target.as_ref().and_then(RenderTarget::texture)
    }

    pub fn is_output(&self) -> bool {
        self.target.is_none()
    }

    pub fn is_only_initial(&self) -> bool {
        self.only_initial
    }

    pub fn pass_count(&self) -> usize {
        self.passes.len()
    }

    /// Whether the original scene (or a scene pass) is rendered
    pub fn renders_scene(&self) -> bool {
        self.passes.iter().any(|p| matches!(p, CompiledPass::RenderScene { .. }))
    }

    /// Ids of the textures bound as quad inputs
    pub fn input_texture_ids(&self) -> Vec<u64> {
        self.passes
            .iter()
            .flat_map(|pass| match pass {
                CompiledPass::RenderQuad { textures, .. } => textures.iter().flatten().map(|t| t.id()).collect(),
                _ => Vec::new(),
            })
            .collect()
    }
}

/// What a chain compiles against
pub(crate) struct ChainCompileContext<'a> {
    pub render_system: &'a mut dyn RenderSystem,
    pub materials: &'a MaterialManager,
    pub pool: &'a mut TexturePool,
    pub global_textures: &'a mut FxHashMap<String, Arc<dyn GpuTexture>>,
    pub custom_passes: &'a FxHashMap<String, Arc<dyn CustomCompositionPass>>,
    pub target_width: u32,
    pub target_height: u32,
}

/// What a chain renders with
pub(crate) struct ChainRenderContext<'a> {
    pub render_system: &'a SharedRenderSystem,
    pub target: &'a RenderTarget,
    pub viewport: &'a Viewport,
    pub scene: &'a mut SceneManager,
    pub materials: &'a MaterialManager,
    pub quad: &'a Rectangle2D,
    pub auto_params: &'a mut AutoParamDataSource,
}

// ============================================================================
// Chain
// ============================================================================

pub struct CompositorChain {
    target: String,
    z_order: i32,
    instances: Vec<CompositorInstance>,
    dirty: bool,
    operations: Vec<TargetOperation>,
    textures: CompositorTextureMap,
}

impl CompositorChain {
    pub fn new(target: &str, z_order: i32) -> Self {
        Self {
            target: target.to_string(),
            z_order,
            instances: Vec::new(),
            dirty: true,
            operations: Vec::new(),
            textures: CompositorTextureMap::default(),
        }
    }

    pub fn target_name(&self) -> &str {
        &self.target
    }

    pub fn z_order(&self) -> i32 {
        self.z_order
    }

    // ===== INSTANCES =====

    /// Insert `compositor` at `position` (appended when `None`), disabled
    ///
    /// # Errors
    ///
    /// `InvalidParams` when no technique runs on this backend for `scheme`
    /// or the position is past the end.
    pub fn add_compositor(
        &mut self,
        compositor: Arc<Compositor>,
        capabilities: &RenderSystemCapabilities,
        scheme: &str,
        position: Option<usize>,
    ) -> Result<usize> {
        let Some(technique) = compositor.supported_technique(capabilities, scheme) else {
            engine_bail!(SOURCE, InvalidParams,
                "Compositor '{}' has no technique supported by the render system", compositor.name());
        };
        let index = position.unwrap_or(self.instances.len());
        if index > self.instances.len() {
            engine_bail!(SOURCE, InvalidParams,
                "Position {} is past the end of a chain of {} compositors", index, self.instances.len());
        }
        engine_trivial!(SOURCE, "Chain '{}'/{}: added compositor '{}' (technique {})",
            self.target, self.z_order, compositor.name(), technique);
        self.instances.insert(index, CompositorInstance::new(compositor, technique));
        self.invalidate();
        Ok(index)
    }

    /// # Errors
    ///
    /// `InvalidParams` for an index out of range.
    pub fn remove_compositor(&mut self, index: usize) -> Result<()> {
        if index >= self.instances.len() {
            engine_bail!(SOURCE, InvalidParams,
                "No compositor at position {} of chain '{}'", index, self.target);
        }
        self.instances.remove(index);
        self.invalidate();
        Ok(())
    }

    pub fn remove_all_compositors(&mut self) {
        self.instances.clear();
        self.invalidate();
    }

    /// Enable or disable the instance at `index`; the chain recompiles
    /// before its next render
    ///
    /// # Errors
    ///
    /// `InvalidParams` for an index out of range.
    pub fn set_compositor_enabled(&mut self, index: usize, enabled: bool) -> Result<()> {
        let Some(instance) = self.instances.get_mut(index) else {
            engine_bail!(SOURCE, InvalidParams,
                "No compositor at position {} of chain '{}'", index, self.target);
        };
        if instance.is_enabled() == enabled {
            return Ok(());
        }
        instance.set_state(if enabled { InstanceState::Enabled } else { InstanceState::Disabled });
        self.invalidate();
        Ok(())
    }

    /// [`set_compositor_enabled`](Self::set_compositor_enabled) by name
    ///
    /// # Errors
    ///
    /// `ItemNotFound` when the compositor is not in the chain.
    pub fn set_compositor_enabled_by_name(&mut self, name: &str, enabled: bool) -> Result<()> {
        let Some(index) = self.find_compositor(name) else {
            engine_bail!(SOURCE, ItemNotFound,
                "Compositor '{}' is not in chain '{}'/{}", name, self.target, self.z_order);
        };
        self.set_compositor_enabled(index, enabled)
    }

    pub fn find_compositor(&self, name: &str) -> Option<usize> {
        self.instances.iter().position(|i| i.name() == name)
    }

    pub fn instance(&self, index: usize) -> Option<&CompositorInstance> {
        self.instances.get(index)
    }

    pub fn instances(&self) -> &[CompositorInstance] {
        &self.instances
    }

    pub fn num_compositors(&self) -> usize {
        self.instances.len()
    }

    /// At least one instance is enabled
    pub fn is_active(&self) -> bool {
        self.instances.iter().any(CompositorInstance::is_enabled)
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Drop compiled state; the next render recompiles
    pub fn mark_dirty(&mut self) {
        self.invalidate();
    }

    /// Target operations of the last compile, in execution order
    pub fn operations(&self) -> &[TargetOperation] {
        &self.operations
    }

    /// Textures of the enabled instances, as seen by materials
    pub fn compositor_textures(&self) -> &CompositorTextureMap {
        &self.textures
    }

    fn invalidate(&mut self) {
        self.operations.clear();
        self.textures.clear();
        for instance in &mut self.instances {
            instance.release();
        }
        self.dirty = true;
    }

    // ===== COMPILE =====

    pub(crate) fn compile(&mut self, ctx: &mut ChainCompileContext) -> Result<()> {
        self.invalidate();
        let result = self.compile_operations(ctx);
        match &result {
            Ok(()) => {
                self.dirty = false;
                engine_info!(SOURCE, "Chain '{}'/{} compiled: {} target operations",
                    self.target, self.z_order, self.operations.len());
            }
            Err(_) => self.invalidate(),
        }
        result
    }

    fn compile_operations(&mut self, ctx: &mut ChainCompileContext) -> Result<()> {
        let enabled: Vec<usize> = (0..self.instances.len())
            .filter(|&i| self.instances[i].is_enabled())
            .collect();

        let mut previous_reads = FxHashSet::default();
        for &index in &enabled {
            let textures = self.allocate_textures(index, &enabled, &previous_reads, ctx)?;
            let output_pass = self.instances[index].technique().output_pass();
            let mut reads = if output_pass.input_mode == InputMode::Previous {
                previous_reads
            } else {
                FxHashSet::default()
            };
            reads.extend(output_pass.quad_inputs().filter_map(|name| textures.get(name)).map(|t| t.id()));
            previous_reads = reads;
            self.instances[index].set_textures(textures);
        }

        let mut operations = Vec::new();
        for (position, &index) in enabled.iter().enumerate() {
            let instance = &self.instances[index];
            for target_pass in instance.technique().target_passes() {
                let mut passes = Vec::new();
                if target_pass.input_mode == InputMode::Previous {
                    passes.extend(self.output_passes(&enabled[..position], ctx)?);
                }
                passes.extend(self.collect_passes(instance, target_pass, ctx)?);
                let Some(texture) = instance.texture(target_pass.output_name()) else {
                    engine_bail!(SOURCE, InternalError,
                        "Compositor '{}': target '{}' has no texture", instance.name(), target_pass.output_name());
                };
                operations.push(TargetOperation {
                    target: Some(RenderTarget::for_texture(texture.clone())),
                    only_initial: target_pass.only_initial,
                    rendered: false,
                    visibility_mask: target_pass.visibility_mask,
                    material_scheme: target_pass.material_scheme.clone(),
                    passes,
                });
            }
        }
        if let Some(&last) = enabled.last() {
            let output_pass = self.instances[last].technique().output_pass();
            operations.push(TargetOperation {
                target: None,
                only_initial: false,
                rendered: false,
                visibility_mask: output_pass.visibility_mask,
                material_scheme: output_pass.material_scheme.clone(),
                passes: self.output_passes(&enabled, ctx)?,
            });
        }

        let mut textures = CompositorTextureMap::default();
        for &index in &enabled {
            let instance = &self.instances[index];
            for (name, texture) in instance.textures() {
                textures.insert(compositor_texture_key(instance.name(), name, 0), texture.clone());
            }
        }
        self.operations = operations;
        self.textures = textures;
        Ok(())
    }

    /// Resolve every texture definition of instance `index`
    ///
    /// `exclude` holds the textures the previous instance's output passes
    /// read; the pool never hands those out.
    fn allocate_textures(
        &self,
        index: usize,
        enabled: &[usize],
        exclude: &FxHashSet<u64>,
        ctx: &mut ChainCompileContext,
    ) -> Result<FxHashMap<String, Arc<dyn GpuTexture>>> {
        let instance = &self.instances[index];
        let technique = instance.technique();
        let kept: FxHashSet<&str> = technique
            .target_passes()
            .iter()
            .filter(|tp| tp.only_initial)
            .map(CompositionTargetPass::output_name)
            .collect();

        let mut assigned = exclude.clone();
        let mut textures = FxHashMap::default();
        for definition in technique.texture_definitions() {
            let texture = match &definition.reference {
                Some(reference) => self.resolve_reference(index, enabled, reference, ctx)?,
                None => {
                    let (width, height) = definition.resolve_size(ctx.target_width, ctx.target_height);
                    let name = format!("{}/{}/{}/{}", self.target, self.z_order, instance.name(), definition.name);
                    let mut desc = TextureDesc::new_2d(&name, width, height, definition.format);
                    desc.fsaa = definition.fsaa;
                    desc.hw_gamma = definition.hw_gamma;
                    desc.usage |= TextureUsage::RENDER_TARGET;
                    match definition.scope {
                        TextureScope::Global => match ctx.global_textures.get(&definition.name) {
                            Some(texture) => texture.clone(),
                            None => {
                                desc.name = definition.name.clone();
                                let texture = ctx.render_system.create_texture(&desc)?;
                                ctx.global_textures.insert(definition.name.clone(), texture.clone());
                                texture
                            }
                        },
                        _ if definition.is_pooled() && !kept.contains(definition.name.as_str()) => {
                            ctx.pool.acquire(&desc, &assigned, ctx.render_system)?
                        }
                        _ => ctx.render_system.create_texture(&desc)?,
                    }
                }
            };
            assigned.insert(texture.id());
            textures.insert(definition.name.clone(), texture);
        }
        Ok(textures)
    }

    /// Chain texture of an earlier instance, else a global texture
    fn resolve_reference(
        &self,
        index: usize,
        enabled: &[usize],
        reference: &TextureReference,
        ctx: &ChainCompileContext,
    ) -> Result<Arc<dyn GpuTexture>> {
        for &earlier in enabled.iter().take_while(|&&i| i != index) {
            let other = &self.instances[earlier];
            if other.name() != reference.compositor {
                continue;
            }
            let scope = other.technique().texture_definition(&reference.texture).map(|d| d.scope);
            if scope == Some(TextureScope::Chain) {
                if let Some(texture) = other.texture(&reference.texture) {
                    return Ok(texture.clone());
                }
            }
        }
        if let Some(texture) = ctx.global_textures.get(&reference.texture) {
            return Ok(texture.clone());
        }
        engine_bail!(SOURCE, ItemNotFound,
            "Texture '{}' of compositor '{}' is neither a chain texture of an earlier compositor nor a global texture",
            reference.texture, reference.compositor);
    }

    /// Output passes of the last of `instances`, preceded by what their
    /// `Previous` inputs pull in (ultimately the original scene)
    fn output_passes(&self, instances: &[usize], ctx: &ChainCompileContext) -> Result<Vec<CompiledPass>> {
        let mut contributing = Vec::new();
        let mut include_scene = true;
        for &index in instances.iter().rev() {
            contributing.push(index);
            if self.instances[index].technique().output_pass().input_mode != InputMode::Previous {
                include_scene = false;
                break;
            }
        }

        let mut passes = if include_scene {
            vec![
                CompiledPass::ViewportClear,
                CompiledPass::RenderScene { first: 0, last: RENDER_QUEUE_MAX, material_scheme: None },
            ]
        } else {
            Vec::new()
        };
        for &index in contributing.iter().rev() {
            let instance = &self.instances[index];
            passes.extend(self.collect_passes(instance, instance.technique().output_pass(), ctx)?);
        }
        Ok(passes)
    }

    fn collect_passes(
        &self,
        instance: &CompositorInstance,
        target_pass: &CompositionTargetPass,
        ctx: &ChainCompileContext,
    ) -> Result<Vec<CompiledPass>> {
        let mut passes = Vec::new();
        for pass in &target_pass.passes {
            match pass {
                CompositionPass::Clear { buffers, colour, depth, stencil } => passes.push(CompiledPass::Clear {
                    buffers: *buffers,
                    colour: *colour,
                    depth: *depth,
                    stencil: *stencil,
                }),
                CompositionPass::Stencil(state) => passes.push(CompiledPass::Stencil(*state)),
                CompositionPass::RenderScene { first_render_queue, last_render_queue, material_scheme } => {
                    passes.push(CompiledPass::RenderScene {
                        first: *first_render_queue,
                        last: *last_render_queue,
                        material_scheme: material_scheme.clone().or_else(|| target_pass.material_scheme.clone()),
                    })
                }
                CompositionPass::RenderQuad { material, inputs } => {
                    let Some(material_ref) = ctx.materials.get_by_name(material, AUTODETECT_RESOURCE_GROUP_NAME) else {
                        engine_warn!(SOURCE, "Compositor '{}': quad material '{}' not found, pass skipped",
                            instance.name(), material);
                        continue;
                    };
                    let units = inputs.iter().map(|i| i.unit + 1).max().unwrap_or(0);
                    let mut textures = vec![None; units];
                    for input in inputs {
                        let Some(texture) = instance.texture(&input.texture) else {
                            engine_bail!(SOURCE, ItemNotFound,
                                "Compositor '{}': quad input '{}' has no texture", instance.name(), input.texture);
                        };
                        textures[input.unit] = Some(texture.clone());
                    }
                    passes.push(CompiledPass::RenderQuad { material: material_ref, textures });
                }
                CompositionPass::RenderCustom { custom_type, params } => {
                    let Some(factory) = ctx.custom_passes.get(custom_type) else {
                        engine_bail!(SOURCE, ItemNotFound,
                            "Compositor '{}': custom pass type '{}' is not registered", instance.name(), custom_type);
                    };
                    passes.push(CompiledPass::Custom(factory.create_operation(instance.name(), params)?));
                }
            }
        }
        Ok(passes)
    }

    // ===== RENDER =====

    /// Run the compiled operations; returns the draw count
    pub(crate) fn render(&mut self, ctx: &mut ChainRenderContext) -> Result<usize> {
        let mut draws = 0;
        for operation in &mut self.operations {
            if operation.only_initial && operation.rendered {
                continue;
            }
            draws += render_operation(operation, &self.textures, ctx)?;
            operation.rendered = true;
        }
        Ok(draws)
    }
}

fn render_operation(
    operation: &mut TargetOperation,
    textures: &CompositorTextureMap,
    ctx: &mut ChainRenderContext,
) -> Result<usize> {
    let rect = match &operation.target {
        Some(target) => target.rect(),
        None => ctx.viewport.actual_rect(),
    };
    {
        let mut rs = lock_render_system(ctx.render_system)?;
        rs.set_render_target(operation.target.as_ref().unwrap_or(ctx.target))?;
        rs.set_viewport(rect);
    }
    let scheme = operation.material_scheme.clone().or_else(|| ctx.viewport.material_scheme.clone());

    let mut draws = 0;
    let mut stencil_used = false;
    for pass in &mut operation.passes {
        match pass {
            CompiledPass::ViewportClear => {
                let viewport = ctx.viewport;
                if viewport.clear_every_frame {
                    lock_render_system(ctx.render_system)?.clear_frame_buffer(
                        viewport.clear_buffers,
                        viewport.background_colour,
                        viewport.depth_clear,
                        viewport.stencil_clear,
                    );
                }
            }
            CompiledPass::Clear { buffers, colour, depth, stencil } => {
                lock_render_system(ctx.render_system)?.clear_frame_buffer(*buffers, *colour, *depth, *stencil);
            }
            CompiledPass::Stencil(state) => {
                lock_render_system(ctx.render_system)?.set_stencil_state(state);
                stencil_used = true;
            }
            CompiledPass::RenderScene { first, last, material_scheme } => {
                let mut options = RenderSceneOptions::new(rect);
                options.first_render_queue = *first;
                options.last_render_queue = *last;
                options.material_scheme = material_scheme.clone().or_else(|| scheme.clone());
                options.visibility_mask = ctx.viewport.visibility_mask & operation.visibility_mask;
                draws += ctx.scene.render_scene_with_textures(
                    ctx.viewport.camera(),
                    ctx.render_system,
                    &options,
                    Some(textures),
                )?;
            }
            CompiledPass::RenderQuad { material, textures: inputs } => {
                draws += render_quad(material, inputs, scheme.as_deref(), rect, textures, ctx)?;
            }
            CompiledPass::Custom(custom) => custom.execute(ctx.scene, ctx.render_system)?,
        }
    }
    if stencil_used {
        lock_render_system(ctx.render_system)?.set_stencil_state(&StencilState::default());
    }
    Ok(draws)
}

fn render_quad(
    material: &ResourceRef<Material>,
    inputs: &[Option<Arc<dyn GpuTexture>>],
    scheme: Option<&str>,
    rect: Rect2D,
    textures: &CompositorTextureMap,
    ctx: &mut ChainRenderContext,
) -> Result<usize> {
    let scheme_index = match scheme {
        Some(scheme) => ctx.materials.scheme_index(scheme),
        None => ctx.materials.schemes().active_scheme_index(),
    };
    let Some(technique) = ctx.materials.best_technique(material, scheme_index, 0) else {
        engine_trivial!(SOURCE, "Quad material {:?} has no supported technique", material.name());
        return Ok(0);
    };
    let queued = QueuedRenderable { renderable: ctx.quad.renderable(material), technique };
    ctx.auto_params.set_viewport_size(rect.width as f32, rect.height as f32);

    let mut rs = lock_render_system(ctx.render_system)?;
    let mut renderer = PassRenderer::new(&mut *rs, ctx.auto_params, Mat4::IDENTITY, Mat4::IDENTITY)
        .with_compositor_textures(textures)
        .with_texture_overrides(inputs);
    for pass_index in 0..queued.technique.num_passes() {
        renderer.visit(&queued, pass_index);
    }
    renderer.finish()
}

#[cfg(test)]
#[path = "compositor_chain_tests.rs"]
mod tests;
