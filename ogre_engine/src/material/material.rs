/// Material resource
///
/// A material owns techniques; compiling it checks every technique on the
/// backend and records, for each (scheme, LOD) pair, the first supported
/// technique. Techniques are shared with the render queue through `Arc`,
/// so editing one after it was queued copies it first.

use std::collections::BTreeMap;
use std::sync::Arc;
use glam::Vec4;

use crate::engine_bail;
use crate::error::Result;
use crate::gpu_program::GpuProgram;
use crate::lod::{DistanceLodStrategy, LodStrategy};
use crate::render_system::{lock_render_system, CullingMode, SceneBlendType, SharedRenderSystem};
use crate::resource::{NameValuePairList, ResourceData, ResourceInfo, ResourceManager};
use crate::resource::texture::TextureManager;
use super::material_manager::{MaterialSchemes, DEFAULT_SCHEME_INDEX};
use super::technique::Technique;

const SOURCE: &str = "ogre::Material";

/// What materials need to compile
pub struct MaterialContext {
    render_system: SharedRenderSystem,
    programs: Arc<ResourceManager<GpuProgram>>,
    textures: Arc<TextureManager>,
    schemes: Arc<MaterialSchemes>,
}

impl MaterialContext {
    pub fn new(
        render_system: SharedRenderSystem,
        programs: Arc<ResourceManager<GpuProgram>>,
        textures: Arc<TextureManager>,
        schemes: Arc<MaterialSchemes>,
    ) -> Self {
        Self { render_system, programs, textures, schemes }
    }

    pub fn schemes(&self) -> &Arc<MaterialSchemes> {
        &self.schemes
    }
}

#[derive(Clone)]
pub struct Material {
    techniques: Vec<Arc<Technique>>,
    receive_shadows: bool,
    lod_strategy: &'static str,
    lod_user_values: Vec<f32>,
    lod_values: Vec<f32>,
    /// scheme index -> LOD index -> technique index
    best: BTreeMap<u16, BTreeMap<u16, usize>>,
    compiled: bool,
    needs_recompile: bool,
    warned_unsupported: bool,
    source_file: Option<String>,
}

impl Material {
    /// One technique with one default pass
    pub fn with_default_technique() -> Self {
        let mut material = Self {
            techniques: Vec::new(),
            receive_shadows: true,
            lod_strategy: DistanceLodStrategy::NAME,
            lod_user_values: Vec::new(),
            lod_values: vec![DistanceLodStrategy.base_value()],
            best: BTreeMap::new(),
            compiled: false,
            needs_recompile: true,
            warned_unsupported: false,
            source_file: None,
        };
        material.create_technique().create_pass();
        material
    }

    // ===== TECHNIQUES =====

    pub fn create_technique(&mut self) -> &mut Technique {
        self.add_technique(Technique::new())
    }

    pub fn add_technique(&mut self, technique: Technique) -> &mut Technique {
        self.techniques.push(Arc::new(technique));
        self.needs_recompile = true;
        let last = self.techniques.len() - 1;
        Arc::make_mut(&mut self.techniques[last])
    }

    pub fn technique(&self, index: usize) -> Option<&Arc<Technique>> {
        self.techniques.get(index)
    }

    /// Editable technique; the material recompiles before its next use
    pub fn technique_mut(&mut self, index: usize) -> Option<&mut Technique> {
        let technique = self.techniques.get_mut(index)?;
        self.needs_recompile = true;
        Some(Arc::make_mut(technique))
    }

    pub fn techniques(&self) -> &[Arc<Technique>] {
        &self.techniques
    }

    pub fn num_techniques(&self) -> usize {
        self.techniques.len()
    }

    pub fn remove_technique(&mut self, index: usize) -> bool {
        if index >= self.techniques.len() {
            return false;
        }
        self.techniques.remove(index);
        self.needs_recompile = true;
        true
    }

    pub fn remove_all_techniques(&mut self) {
        self.techniques.clear();
        self.needs_recompile = true;
    }

    /// Techniques that passed the last compile
    pub fn supported_techniques(&self) -> Vec<Arc<Technique>> {
        self.techniques.iter().filter(|t| t.is_supported()).cloned().collect()
    }

    pub fn is_transparent(&self) -> bool {
        self.techniques.iter().any(|t| t.is_transparent())
    }

    // ===== PASS-WIDE SETTERS =====

    fn for_each_pass(&mut self, mut apply: impl FnMut(&mut super::Pass)) {
        for technique in &mut self.techniques {
            let technique = Arc::make_mut(technique);
            for index in 0..technique.num_passes() {
                if let Some(pass) = technique.pass_mut(index) {
                    apply(pass);
                }
            }
        }
        self.needs_recompile = true;
    }

    pub fn set_scene_blending(&mut self, blend_type: SceneBlendType) {
        self.for_each_pass(|p| p.set_scene_blending(blend_type));
    }

    pub fn set_depth_write_enabled(&mut self, enabled: bool) {
        self.for_each_pass(|p| p.depth_write = enabled);
    }

    pub fn set_depth_check_enabled(&mut self, enabled: bool) {
        self.for_each_pass(|p| p.depth_check = enabled);
    }

    pub fn set_culling_mode(&mut self, mode: CullingMode) {
        self.for_each_pass(|p| p.culling_mode = mode);
    }

    pub fn set_lighting_enabled(&mut self, enabled: bool) {
        self.for_each_pass(|p| p.lighting = enabled);
    }

    pub fn set_diffuse(&mut self, colour: Vec4) {
        self.for_each_pass(|p| p.diffuse = colour);
    }

    pub fn set_ambient(&mut self, colour: Vec4) {
        self.for_each_pass(|p| p.ambient = colour);
    }

    pub fn receive_shadows(&self) -> bool {
        self.receive_shadows
    }

    pub fn set_receive_shadows(&mut self, enabled: bool) {
        self.receive_shadows = enabled;
    }

    // ===== LOD =====

    pub fn lod_strategy(&self) -> &'static str {
        self.lod_strategy
    }

    /// Set the LOD thresholds; index 0 is implicit at the strategy's base
    /// value, `user_values` give the start of LOD 1, 2, ...
    pub fn set_lod_levels(&mut self, strategy: &dyn LodStrategy, user_values: &[f32]) -> Result<()> {
        let values: Vec<f32> = std::iter::once(strategy.base_value())
            .chain(user_values.iter().map(|v| strategy.transform_user_value(*v)))
            .collect();
        if !strategy.is_sorted(&values) {
            engine_bail!(SOURCE, InvalidParams,
                "Material LOD values {:?} are not ordered for strategy '{}'", user_values, strategy.name());
        }
        self.lod_strategy = strategy.name();
        self.lod_user_values = user_values.to_vec();
        self.lod_values = values;
        Ok(())
    }

    pub fn lod_values(&self) -> &[f32] {
        &self.lod_values
    }

    pub fn lod_user_values(&self) -> &[f32] {
        &self.lod_user_values
    }

    pub fn num_lod_levels(&self) -> usize {
        self.lod_values.len()
    }

    /// Material LOD for a strategy value; ties go to the coarser level
    pub fn lod_index(&self, strategy: &dyn LodStrategy, value: f32) -> u16 {
        strategy.lod_index(value, &self.lod_values) as u16
    }

    // ===== COMPILATION =====

    pub fn is_compiled(&self) -> bool {
        self.compiled
    }

    pub fn needs_recompile(&self) -> bool {
        self.needs_recompile || !self.compiled
    }

    /// A pass became (un)supported; recompile before the next use
    pub fn notify_needs_recompile(&mut self) {
        self.needs_recompile = true;
    }

    /// Compile every technique and rebuild the (scheme, LOD) table
    ///
    /// Returns the number of supported techniques. Unsupported techniques
    /// are logged, never fatal; a material left without any supported
    /// technique is reported once.
    pub fn compile(&mut self, name: &str, ctx: &MaterialContext) -> Result<usize> {
        let caps = lock_render_system(&ctx.render_system)?.capabilities().clone();
        self.best.clear();
        let mut supported = 0;
        for (index, technique) in self.techniques.iter_mut().enumerate() {
            let technique = Arc::make_mut(technique);
            let result = technique.compile(&caps, &ctx.programs, &ctx.textures);
            if !result.supported {
                let reasons: Vec<String> = result.failures.iter().map(|f| f.to_string()).collect();
                crate::engine_info!(SOURCE, "Material '{}' technique {} is not supported: {}",
                    name, index, if reasons.is_empty() { "no passes".to_string() } else { reasons.join("; ") });
                continue;
            }
            supported += 1;
            let scheme = ctx.schemes.index(technique.scheme());
            self.best
                .entry(scheme)
                .or_default()
                .entry(technique.lod_index())
                .or_insert(index);
        }
        self.compiled = true;
        self.needs_recompile = false;
        if supported == 0 && !self.warned_unsupported {
            self.warned_unsupported = true;
            crate::engine_warn!(SOURCE,
                "Material '{}' has no supported technique and will not be rendered", name);
        }
        Ok(supported)
    }

    /// Has a supported technique registered under `scheme_index`
    pub fn has_scheme(&self, scheme_index: u16) -> bool {
        self.best.contains_key(&scheme_index)
    }

    /// Best supported technique for a scheme and LOD
    ///
    /// Unknown schemes fall back to the default scheme. Without a
    /// technique for `lod_index`, the closest finer LOD is used, then the
    /// finest available.
    pub fn best_technique(&self, scheme_index: u16, lod_index: u16) -> Option<Arc<Technique>> {
        let lods = self
            .best
            .get(&scheme_index)
            .or_else(|| self.best.get(&DEFAULT_SCHEME_INDEX))?;
        let (_, &index) = lods
            .range(..=lod_index)
            .next_back()
            .or_else(|| lods.iter().next())?;
        self.techniques.get(index).cloned()
    }

    fn release(&mut self) {
        for technique in &mut self.techniques {
            Arc::make_mut(technique).release();
        }
        self.best.clear();
        self.compiled = false;
    }
}

impl ResourceData for Material {
    type Context = MaterialContext;
    const RESOURCE_TYPE: &'static str = "Material";
    const LOAD_ORDER: u32 = 100;

    /// Recognised parameters: `source_file` (script read by a registered
    /// asset loader) and `receive_shadows`
    fn create(info: &ResourceInfo, params: &NameValuePairList) -> Result<Self> {
        let mut material = Self::with_default_technique();
        material.source_file = params.get("source_file").cloned();
        if let Some(value) = params.get("receive_shadows") {
            match value.trim().parse() {
                Ok(enabled) => material.receive_shadows = enabled,
                Err(_) => {
                    engine_bail!(SOURCE, InvalidParams,
                        "Material '{}': invalid receive_shadows '{}'", info.name, value);
                }
            }
        }
        Ok(material)
    }

    /// Materials are built in code unless a script file was given
    fn source_file(&self, _info: &ResourceInfo) -> Option<String> {
        self.source_file.clone()
    }

    fn load(&mut self, info: &ResourceInfo, ctx: &MaterialContext) -> Result<()> {
        self.compile(&info.name, ctx).map(|_| ())
    }

    fn unload(&mut self, _info: &ResourceInfo, _ctx: &MaterialContext) {
        self.release();
        if self.source_file.is_some() {
            self.techniques.clear();
        }
    }

    fn calculate_size(&self) -> usize {
        let passes: usize = self.techniques.iter().map(|t| t.num_passes()).sum();
        std::mem::size_of::<Self>()
            + self.techniques.len() * std::mem::size_of::<Technique>()
            + passes * std::mem::size_of::<super::Pass>()
    }
}
