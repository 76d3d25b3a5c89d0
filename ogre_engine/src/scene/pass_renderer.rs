/// Render queue visitor that issues backend calls.
///
/// Pass state is only re-applied when the (technique, pass) pair changes
/// between two visits, and texture units are only rebound when the texture
/// they hold changes. Auto-constants are refreshed per draw: every
/// variability on a pass change, only per-object and per-light values
/// otherwise.

use std::sync::Arc;
use glam::Mat4;
use rustc_hash::FxHashMap;

use crate::engine_error;
use crate::error::{Error, Result};
use crate::gpu_program::{AutoParamDataSource, GpuParamVariability, GpuProgramType};
use crate::material::{Pass, Technique, TextureContentType};
use crate::render_queue::{QueuedRenderable, RenderQueueVisitor};
use crate::render_system::{GpuTexture, RenderSystem};

const SOURCE: &str = "ogre::PassRenderer";

/// Textures produced by a compositor chain, keyed by
/// [`compositor_texture_key`]
pub type CompositorTextureMap = FxHashMap<String, Arc<dyn GpuTexture>>;

/// Lookup key of a compositor texture as referenced by a texture unit
pub fn compositor_texture_key(compositor: &str, texture: &str, mrt_index: usize) -> String {
    format!("{}/{}/{}", compositor, texture, mrt_index)
}

pub struct PassRenderer<'a> {
    render_system: &'a mut dyn RenderSystem,
    source: &'a mut AutoParamDataSource,
    compositor_textures: Option<&'a CompositorTextureMap>,
    /// Per-unit textures replacing the pass's own (compositor quad inputs)
    texture_overrides: &'a [Option<Arc<dyn GpuTexture>>],
    view: Mat4,
    projection: Mat4,
    /// (technique address, pass index) of the applied pass
    current_pass: Option<(usize, usize)>,
    /// (identity view, identity projection) currently set on the backend
    identity_state: Option<(bool, bool)>,
    bound_programs: Vec<GpuProgramType>,
    bound_textures: Vec<Option<u64>>,
    draw_count: usize,
    error: Option<Error>,
}

impl<'a> PassRenderer<'a> {
    /// `source` must already hold the frame values (camera, lights, time,
    /// viewport size)
    pub fn new(
        render_system: &'a mut dyn RenderSystem,
        source: &'a mut AutoParamDataSource,
        view: Mat4,
        projection: Mat4,
    ) -> Self {
        Self {
            render_system,
            source,
            compositor_textures: None,
            texture_overrides: &[],
            view,
            projection,
            current_pass: None,
            identity_state: None,
            bound_programs: Vec::new(),
            bound_textures: Vec::new(),
            draw_count: 0,
            error: None,
        }
    }

    /// Resolve compositor texture units from `textures`
    pub fn with_compositor_textures(mut self, textures: &'a CompositorTextureMap) -> Self {
        self.compositor_textures = Some(textures);
        self
    }

    /// Bind `textures[unit]` instead of the unit's own texture where set
    pub fn with_texture_overrides(mut self, textures: &'a [Option<Arc<dyn GpuTexture>>]) -> Self {
        self.texture_overrides = textures;
        self
    }

    pub fn draw_count(&self) -> usize {
        self.draw_count
    }

    /// First backend error met while drawing
    pub fn finish(self) -> Result<usize> {
        match self.error {
            Some(e) => Err(e),
            None => Ok(self.draw_count),
        }
    }

    fn apply_pass(&mut self, pass: &Pass) {
        let rs = &mut *self.render_system;
        rs.set_depth_buffer_params(pass.depth_check, pass.depth_write, pass.depth_function);
        rs.set_culling_mode(pass.culling_mode);
        rs.set_scene_blending(pass.scene_blend);
        rs.set_polygon_mode(pass.polygon_mode);
        rs.set_colour_write(pass.colour_write);

        let mut bound = Vec::new();
        for (program_type, usage) in pass.programs() {
            if let Some(program) = usage.gpu_object() {
                rs.bind_gpu_program(program);
                bound.push(program_type);
            }
        }
        for program_type in self.bound_programs.drain(..) {
            if !bound.contains(&program_type) {
                rs.unbind_gpu_program(program_type);
            }
        }
        self.bound_programs = bound;

        let units = pass.texture_unit_states();
        for (unit, state) in units.iter().enumerate() {
            let overridden = self.texture_overrides.get(unit).cloned().flatten();
            let texture = match (overridden, state.content_type()) {
                (Some(texture), _) => Some(texture),
                (None, TextureContentType::Named) => state.gpu_texture().cloned(),
                (None, TextureContentType::Compositor { compositor, texture, mrt_index }) => self
                    .compositor_textures
                    .and_then(|map| map.get(&compositor_texture_key(compositor, texture, *mrt_index)))
                    .cloned(),
            };
            let id = texture.as_ref().map(|t| t.id());
            if self.bound_textures.len() <= unit {
                self.bound_textures.resize(unit + 1, None);
            }
            if self.bound_textures[unit] != id {
                rs.set_texture(unit, texture.as_ref());
                self.bound_textures[unit] = id;
            }
            rs.set_sampler_state(unit, &state.sampler);
        }
        if self.bound_textures.len() > units.len() {
            rs.disable_texture_units_from(units.len());
            self.bound_textures.truncate(units.len());
        }
    }

    fn apply_view_projection(&mut self, identity_view: bool, identity_projection: bool) {
        if self.identity_state == Some((identity_view, identity_projection)) {
            return;
        }
        let view = if identity_view { Mat4::IDENTITY } else { self.view };
        let projection = if identity_projection { Mat4::IDENTITY } else { self.projection };
        self.render_system.set_view_matrix(view);
        self.render_system.set_projection_matrix(projection);
        self.source.set_view_matrix(view);
        self.source.set_projection_matrix(projection);
        self.identity_state = Some((identity_view, identity_projection));
    }
}

impl RenderQueueVisitor for PassRenderer<'_> {
    fn visit(&mut self, queued: &QueuedRenderable, pass_index: usize) {
        let technique: &Arc<Technique> = &queued.technique;
        let Some(pass) = technique.pass(pass_index) else { return };
        let renderable = &queued.renderable;

        let pass_id = (Arc::as_ptr(technique) as usize, pass_index);
        let pass_changed = self.current_pass != Some(pass_id);
        if pass_changed {
            self.apply_pass(pass);
            self.source.set_pass_number(pass_index as u32);
            self.current_pass = Some(pass_id);
        }

        self.apply_view_projection(renderable.use_identity_view, renderable.use_identity_projection);
        self.render_system.set_world_matrices(&renderable.world_transforms);
        self.source.set_world_matrices(&renderable.world_transforms);
        self.source.set_custom_params(&renderable.custom_params);

        let mask = if pass_changed {
            GpuParamVariability::all()
        } else {
            GpuParamVariability::PER_OBJECT | GpuParamVariability::PER_LIGHT
        };
        for (program_type, usage) in pass.programs() {
            let (Some(_), Some(parameters)) = (usage.gpu_object(), usage.parameters()) else {
                continue;
            };
            let mut parameters = parameters.clone();
            parameters.update_auto_params(self.source, mask);
            self.render_system.bind_gpu_program_parameters(program_type, &parameters, mask);
        }

        match self.render_system.render(&renderable.operation) {
            Ok(()) => self.draw_count += 1,
            Err(e) => {
                engine_error!(SOURCE, "Draw of material {:?} failed: {}", renderable.material.name(), e);
                if self.error.is_none() {
                    self.error = Some(e);
                }
            }
        }
    }
}
