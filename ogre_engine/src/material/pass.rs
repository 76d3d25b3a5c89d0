/// Pass: one draw-state configuration of a technique.
///
/// A pass carries fixed-function state (blending, depth, culling, colour
/// write, polygon mode, lighting colours), optional programs with their
/// parameters, and its texture units. Its hash groups equivalent passes
/// in the render queue: the pass index occupies the top 4 bits so that
/// first passes sort before second passes, and the programs and first two
/// textures are hashed into the remaining 28 bits.

use std::hash::Hasher;
use std::sync::Arc;
use glam::Vec4;
use rustc_hash::FxHasher;

use crate::gpu_program::{
    AutoConstantType, GpuProgram, GpuProgramParameters, GpuProgramType,
};
use crate::render_system::{
    Capabilities, ColourWriteMask, CompareFunction, CullingMode, GpuProgramObject, PolygonMode,
    RenderSystemCapabilities, SceneBlend, SceneBlendFactor, SceneBlendType,
};
use crate::resource::{ResourceManager, ResourceRef, AUTODETECT_RESOURCE_GROUP_NAME};
use crate::resource::texture::TextureManager;
use super::technique::CompileFailure;
use super::texture_unit_state::TextureUnitState;

const HASH_INDEX_SHIFT: u32 = 28;
const HASH_BODY_MASK: u32 = (1 << HASH_INDEX_SHIFT) - 1;

// ============================================================================
// Program usage
// ============================================================================

/// A program referenced by a pass, with the pass's parameter values
#[derive(Clone)]
pub struct PassProgramUsage {
    program_name: String,
    program: Option<ResourceRef<GpuProgram>>,
    gpu_object: Option<Arc<dyn GpuProgramObject>>,
    parameters: Option<GpuProgramParameters>,
    constants: Vec<(String, Vec<f32>)>,
    auto_constants: Vec<(String, AutoConstantType)>,
}

impl PassProgramUsage {
    fn new(program_name: &str) -> Self {
        Self {
            program_name: program_name.to_string(),
            program: None,
            gpu_object: None,
            parameters: None,
            constants: Vec::new(),
            auto_constants: Vec::new(),
        }
    }

    pub fn program_name(&self) -> &str {
        &self.program_name
    }

    pub fn program(&self) -> Option<&ResourceRef<GpuProgram>> {
        self.program.as_ref()
    }

    pub fn gpu_object(&self) -> Option<&Arc<dyn GpuProgramObject>> {
        self.gpu_object.as_ref()
    }

    /// Parameters built at compile time: program defaults plus this
    /// pass's values
    pub fn parameters(&self) -> Option<&GpuProgramParameters> {
        self.parameters.as_ref()
    }

    /// Named value applied over the program defaults when the pass compiles
    ///
    /// Once compiled, the value is checked against the live parameters and
    /// is not stored when they reject it.
    pub fn set_named_constant(&mut self, name: &str, values: &[f32]) -> crate::error::Result<()> {
        if let Some(params) = &mut self.parameters {
            params.set_named_constant(name, values)?;
        }
        self.constants.retain(|(n, _)| n != name);
        self.constants.push((name.to_string(), values.to_vec()));
        Ok(())
    }

    pub fn set_named_auto_constant(&mut self, name: &str, constant: AutoConstantType) -> crate::error::Result<()> {
        if let Some(params) = &mut self.parameters {
            params.set_named_auto_constant(name, constant)?;
        }
        self.auto_constants.retain(|(n, _)| n != name);
        self.auto_constants.push((name.to_string(), constant));
        Ok(())
    }

    fn compile(
        &mut self,
        pass: usize,
        program_type: GpuProgramType,
        programs: &ResourceManager<GpuProgram>,
    ) -> Result<(), CompileFailure> {
        let failure = |error: String| CompileFailure::ProgramLoadFailed {
            pass,
            program: self.program_name.clone(),
            error,
        };
        let Some(program) = programs.get_by_name(&self.program_name, AUTODETECT_RESOURCE_GROUP_NAME) else {
            return Err(CompileFailure::ProgramNotFound { pass, program: self.program_name.clone() });
        };
        programs.load(&program).map_err(|e| failure(e.to_string()))?;
        let resource = program.upgrade().ok_or_else(|| failure("program was removed".to_string()))?;
        let data = resource.data().map_err(|e| failure(e.to_string()))?;
        if data.program_type() != program_type {
            return Err(failure(format!(
                "is a {} program, used as {}",
                data.program_type().name(),
                program_type.name()
            )));
        }
        let mut params = data.create_parameters().map_err(|e| failure(e.to_string()))?;
        for (name, values) in &self.constants {
            params.set_named_constant(name, values).map_err(|e| failure(e.to_string()))?;
        }
        for (name, constant) in &self.auto_constants {
            params.set_named_auto_constant(name, *constant).map_err(|e| failure(e.to_string()))?;
        }
        self.gpu_object = data.gpu_object().cloned();
        drop(data);
        self.parameters = Some(params);
        self.program = Some(program);
        Ok(())
    }

    fn release(&mut self) {
        self.program = None;
        self.gpu_object = None;
        self.parameters = None;
    }
}

// ============================================================================
// Pass
// ============================================================================

#[derive(Clone)]
pub struct Pass {
    index: usize,
    name: String,
    pub scene_blend: SceneBlend,
    /// Separate blending of the alpha channel
    pub scene_blend_alpha: Option<SceneBlend>,
    pub depth_check: bool,
    pub depth_write: bool,
    pub depth_function: CompareFunction,
    pub culling_mode: CullingMode,
    pub colour_write: ColourWriteMask,
    pub polygon_mode: PolygonMode,
    pub polygon_mode_overrideable: bool,
    pub lighting: bool,
    pub ambient: Vec4,
    pub diffuse: Vec4,
    /// Sort transparent renderables of this pass back to front
    pub transparent_sorting: bool,
    vertex_program: Option<PassProgramUsage>,
    fragment_program: Option<PassProgramUsage>,
    geometry_program: Option<PassProgramUsage>,
    texture_units: Vec<TextureUnitState>,
    hash: u32,
}

impl Pass {
    pub fn new(index: usize) -> Self {
        let mut pass = Self {
            index,
            name: String::new(),
            scene_blend: SceneBlend::REPLACE,
            scene_blend_alpha: None,
            depth_check: true,
            depth_write: true,
            depth_function: CompareFunction::LessEqual,
            culling_mode: CullingMode::Clockwise,
            colour_write: ColourWriteMask::all(),
            polygon_mode: PolygonMode::Solid,
            polygon_mode_overrideable: true,
            lighting: true,
            ambient: Vec4::ONE,
            diffuse: Vec4::ONE,
            transparent_sorting: true,
            vertex_program: None,
            fragment_program: None,
            geometry_program: None,
            texture_units: Vec::new(),
            hash: 0,
        };
        pass.recalculate_hash();
        pass
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub(crate) fn set_index(&mut self, index: usize) {
        self.index = index;
        self.recalculate_hash();
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name(&mut self, name: &str) {
        self.name = name.to_string();
    }

    pub fn set_scene_blending(&mut self, blend_type: SceneBlendType) {
        self.scene_blend = SceneBlend::from_type(blend_type);
    }

    pub fn set_scene_blending_factors(&mut self, source: SceneBlendFactor, dest: SceneBlendFactor) {
        self.scene_blend = SceneBlend::new(source, dest);
    }

    /// Blends with what is already in the frame buffer
    ///
    /// Transparent passes usually disable depth writes; sorting them back
    /// to front is what keeps them correct.
    pub fn is_transparent(&self) -> bool {
        self.scene_blend.is_blending()
            || self.scene_blend_alpha.map(|b| b.is_blending()).unwrap_or(false)
    }

    pub fn is_transparent_sorted(&self) -> bool {
        self.is_transparent() && self.transparent_sorting
    }

    // ===== PROGRAMS =====

    pub fn set_program(&mut self, program_type: GpuProgramType, name: Option<&str>) {
        let usage = name.map(PassProgramUsage::new);
        match program_type {
            GpuProgramType::Vertex => self.vertex_program = usage,
            GpuProgramType::Fragment => self.fragment_program = usage,
            GpuProgramType::Geometry => self.geometry_program = usage,
            GpuProgramType::Compute => {}
        }
        self.recalculate_hash();
    }

    pub fn set_vertex_program(&mut self, name: &str) {
        self.set_program(GpuProgramType::Vertex, Some(name));
    }

    pub fn set_fragment_program(&mut self, name: &str) {
        self.set_program(GpuProgramType::Fragment, Some(name));
    }

    pub fn set_geometry_program(&mut self, name: &str) {
        self.set_program(GpuProgramType::Geometry, Some(name));
    }

    pub fn program(&self, program_type: GpuProgramType) -> Option<&PassProgramUsage> {
        match program_type {
            GpuProgramType::Vertex => self.vertex_program.as_ref(),
            GpuProgramType::Fragment => self.fragment_program.as_ref(),
            GpuProgramType::Geometry => self.geometry_program.as_ref(),
            GpuProgramType::Compute => None,
        }
    }

    pub fn program_mut(&mut self, program_type: GpuProgramType) -> Option<&mut PassProgramUsage> {
        match program_type {
            GpuProgramType::Vertex => self.vertex_program.as_mut(),
            GpuProgramType::Fragment => self.fragment_program.as_mut(),
            GpuProgramType::Geometry => self.geometry_program.as_mut(),
            GpuProgramType::Compute => None,
        }
    }

    /// Programs in binding order
    pub fn programs(&self) -> impl Iterator<Item = (GpuProgramType, &PassProgramUsage)> {
        [
            (GpuProgramType::Vertex, self.vertex_program.as_ref()),
            (GpuProgramType::Geometry, self.geometry_program.as_ref()),
            (GpuProgramType::Fragment, self.fragment_program.as_ref()),
        ]
        .into_iter()
        .filter_map(|(t, usage)| usage.map(|u| (t, u)))
    }

    pub fn is_programmable(&self) -> bool {
        self.programs().next().is_some()
    }

    // ===== TEXTURE UNITS =====

    pub fn create_texture_unit_state(&mut self, texture_name: &str) -> &mut TextureUnitState {
        self.add_texture_unit_state(TextureUnitState::new(texture_name))
    }

    pub fn add_texture_unit_state(&mut self, unit: TextureUnitState) -> &mut TextureUnitState {
        self.texture_units.push(unit);
        self.recalculate_hash();
        let last = self.texture_units.len() - 1;
        &mut self.texture_units[last]
    }

    pub fn remove_texture_unit_state(&mut self, index: usize) -> bool {
        if index >= self.texture_units.len() {
            return false;
        }
        self.texture_units.remove(index);
        self.recalculate_hash();
        true
    }

    pub fn texture_unit_states(&self) -> &[TextureUnitState] {
        &self.texture_units
    }

    pub fn texture_unit_state_mut(&mut self, index: usize) -> Option<&mut TextureUnitState> {
        self.texture_units.get_mut(index)
    }

    pub fn num_texture_unit_states(&self) -> usize {
        self.texture_units.len()
    }

    // ===== HASH =====

    pub fn hash(&self) -> u32 {
        self.hash
    }

    /// Recompute after changing programs or textures
    pub fn recalculate_hash(&mut self) {
        let mut hasher = FxHasher::default();
        for (program_type, usage) in self.programs() {
            hasher.write(program_type.name().as_bytes());
            hasher.write(usage.program_name.as_bytes());
            hasher.write_u8(0);
        }
        for unit in self.texture_units.iter().take(2) {
            hasher.write(unit.texture_name().as_bytes());
            hasher.write_u8(0);
        }
        let body = hasher.finish();
        let body = ((body ^ (body >> 32)) as u32) & HASH_BODY_MASK;
        let index = (self.index.min(15) as u32) << HASH_INDEX_SHIFT;
        self.hash = index | body;
    }

    // ===== COMPILATION =====

    /// Check support on the backend and resolve programs and textures
    ///
    /// Returns every reason the pass cannot run; empty means supported.
    pub(crate) fn compile(
        &mut self,
        caps: &RenderSystemCapabilities,
        programs: &ResourceManager<GpuProgram>,
        textures: &TextureManager,
    ) -> Vec<CompileFailure> {
        let mut failures = Vec::new();
        let index = self.index;

        if self.texture_units.len() > caps.num_texture_units as usize {
            failures.push(CompileFailure::TooManyTextureUnits {
                pass: index,
                requested: self.texture_units.len(),
                limit: caps.num_texture_units as usize,
            });
        }
        if self.scene_blend_alpha.is_some() && !caps.has(Capabilities::SEPARATE_SCENE_BLENDING) {
            failures.push(CompileFailure::BlendingNotRepresentable { pass: index });
        }
        for (program_type, usage) in [
            (GpuProgramType::Vertex, self.vertex_program.as_mut()),
            (GpuProgramType::Fragment, self.fragment_program.as_mut()),
            (GpuProgramType::Geometry, self.geometry_program.as_mut()),
        ] {
            if let Some(usage) = usage {
                if let Err(failure) = usage.compile(index, program_type, programs) {
                    failures.push(failure);
                }
            }
        }
        for unit in &mut self.texture_units {
            if let Err(failure) = unit.resolve(index, textures) {
                failures.push(failure);
            }
        }
        failures
    }

    /// Drop resolved programs and textures
    pub(crate) fn release(&mut self) {
        for usage in [&mut self.vertex_program, &mut self.fragment_program, &mut self.geometry_program]
            .into_iter()
            .flatten()
        {
            usage.release();
        }
        for unit in &mut self.texture_units {
            unit.release();
        }
    }
}

#[cfg(test)]
#[path = "pass_tests.rs"]
mod tests;
