/// Material manager: material resources plus the scheme registry.
///
/// Schemes name alternative rendering recipes ("Default", "LowQuality",
/// "Shadow"). Each scheme name maps to a small index used for fast
/// technique lookup; index 0 is the default scheme.

use std::sync::{Arc, Mutex, MutexGuard, RwLock};

use rustc_hash::FxHashMap;

use crate::error::{Error, Result};
use crate::gpu_program::GpuProgram;
use crate::render_system::SharedRenderSystem;
use crate::resource::{
    ResourceGroupRegistry, ResourceManager, ResourceRef, INTERNAL_RESOURCE_GROUP_NAME,
};
use crate::resource::texture::TextureManager;
use crate::{engine_error, engine_trivial};
use super::material::{Material, MaterialContext};
use super::technique::{Technique, DEFAULT_SCHEME_NAME};

const SOURCE: &str = "ogre::MaterialManager";

pub const DEFAULT_SCHEME_INDEX: u16 = 0;

// ============================================================================
// Schemes
// ============================================================================

/// Scheme name <-> index registry and the active scheme
pub struct MaterialSchemes {
    names: RwLock<(Vec<String>, FxHashMap<String, u16>)>,
    active: RwLock<String>,
}

impl MaterialSchemes {
    pub fn new() -> Self {
        let mut indices = FxHashMap::default();
        indices.insert(DEFAULT_SCHEME_NAME.to_string(), DEFAULT_SCHEME_INDEX);
        Self {
            names: RwLock::new((vec![DEFAULT_SCHEME_NAME.to_string()], indices)),
            active: RwLock::new(DEFAULT_SCHEME_NAME.to_string()),
        }
    }

    /// Index of a scheme, registering it on first use
    pub fn index(&self, name: &str) -> u16 {
        if let Some(index) = self.names.read().ok().and_then(|n| n.1.get(name).copied()) {
            return index;
        }
        let Ok(mut names) = self.names.write() else {
            return DEFAULT_SCHEME_INDEX;
        };
        if let Some(index) = names.1.get(name) {
            return *index;
        }
        let index = names.0.len() as u16;
        names.0.push(name.to_string());
        names.1.insert(name.to_string(), index);
        index
    }

    pub fn name(&self, index: u16) -> Option<String> {
        self.names.read().ok()?.0.get(index as usize).cloned()
    }

    pub fn active_scheme(&self) -> String {
        self.active
            .read()
            .map(|s| s.clone())
            .unwrap_or_else(|_| DEFAULT_SCHEME_NAME.to_string())
    }

    pub fn active_scheme_index(&self) -> u16 {
        self.index(&self.active_scheme())
    }

    pub fn set_active_scheme(&self, name: &str) {
        self.index(name);
        if let Ok(mut active) = self.active.write() {
            *active = name.to_string();
        }
    }
}

impl Default for MaterialSchemes {
    fn default() -> Self {
        Self::new()
    }
}

/// Supplies a technique when a material has none for the requested scheme
pub trait SchemeNotFoundListener: Send + Sync {
    /// Return a technique to add to `material`, or `None` to fall back to
    /// the default scheme
    fn handle_scheme_not_found(
        &self,
        scheme_index: u16,
        scheme_name: &str,
        material_name: &str,
        lod_index: u16,
        material: &Material,
    ) -> Option<Technique>;
}

// ============================================================================
// Manager
// ============================================================================

pub struct MaterialManager {
    materials: Arc<ResourceManager<Material>>,
    listeners: RwLock<Vec<Arc<dyn SchemeNotFoundListener>>>,
    default_settings: Mutex<Material>,
}

impl MaterialManager {
    pub const BASE_WHITE: &'static str = "BaseWhite";
    pub const BASE_WHITE_NO_LIGHTING: &'static str = "BaseWhiteNoLighting";

    /// Create the manager and its built-in materials
    pub fn new(
        groups: Arc<ResourceGroupRegistry>,
        render_system: SharedRenderSystem,
        programs: Arc<ResourceManager<GpuProgram>>,
        textures: Arc<TextureManager>,
    ) -> Result<Self> {
        let schemes = Arc::new(MaterialSchemes::new());
        let context = Arc::new(MaterialContext::new(render_system, programs, textures, schemes));
        let manager = Self {
            materials: Arc::new(ResourceManager::new(groups, context)),
            listeners: RwLock::new(Vec::new()),
            default_settings: Mutex::new(Material::with_default_technique()),
        };
        manager.create_material(Self::BASE_WHITE, INTERNAL_RESOURCE_GROUP_NAME)?;
        let no_lighting = manager.create_material(Self::BASE_WHITE_NO_LIGHTING, INTERNAL_RESOURCE_GROUP_NAME)?;
        if let Some(resource) = no_lighting.upgrade() {
            resource.data()?.set_lighting_enabled(false);
        }
        Ok(manager)
    }

    /// Underlying resource manager (lookup, load, unload, budget)
    pub fn materials(&self) -> &Arc<ResourceManager<Material>> {
        &self.materials
    }

    pub fn schemes(&self) -> &Arc<MaterialSchemes> {
        self.materials.context().schemes()
    }

    fn context(&self) -> &Arc<MaterialContext> {
        self.materials.context()
    }

    // ===== MATERIALS =====

    /// New material initialised from the default settings
    pub fn create_material(&self, name: &str, group: &str) -> Result<ResourceRef<Material>> {
        let material = self.materials.create(name, group, false, None, None)?;
        if let Some(resource) = material.upgrade() {
            *resource.data()? = self.default_settings()?.clone();
        }
        Ok(material)
    }

    pub fn get_by_name(&self, name: &str, group: &str) -> Option<ResourceRef<Material>> {
        self.materials.get_by_name(name, group)
    }

    /// Template copied into every material created by this manager
    pub fn default_settings(&self) -> Result<MutexGuard<'_, Material>> {
        self.default_settings
            .lock()
            .map_err(|_| Error::InternalError("default material settings poisoned".to_string()))
    }

    // ===== SCHEMES =====

    pub fn scheme_index(&self, name: &str) -> u16 {
        self.schemes().index(name)
    }

    pub fn active_scheme(&self) -> String {
        self.schemes().active_scheme()
    }

    pub fn set_active_scheme(&self, name: &str) {
        self.schemes().set_active_scheme(name);
    }

    pub fn add_scheme_not_found_listener(&self, listener: Arc<dyn SchemeNotFoundListener>) {
        if let Ok(mut listeners) = self.listeners.write() {
            listeners.push(listener);
        }
    }

    pub fn remove_scheme_not_found_listener(&self, listener: &Arc<dyn SchemeNotFoundListener>) {
        if let Ok(mut listeners) = self.listeners.write() {
            listeners.retain(|l| !Arc::ptr_eq(l, listener));
        }
    }

    // ===== RESOLUTION =====

    /// Best supported technique of `material` for a scheme and LOD
    ///
    /// Loads (compiles) the material on first use and recompiles it when
    /// flagged. A scheme the material does not know is offered to the
    /// scheme-not-found listeners before falling back to the default
    /// scheme. `None` means the material cannot be rendered.
    pub fn best_technique(
        &self,
        material: &ResourceRef<Material>,
        scheme_index: u16,
        lod_index: u16,
    ) -> Option<Arc<Technique>> {
        let resource = material.upgrade()?;
        if let Err(e) = self.materials.load(material) {
            engine_error!(SOURCE, "Material '{}' failed to load: {}", resource.name(), e);
            return None;
        }
        let mut data = resource.data().ok()?;
        if data.needs_recompile() {
            if let Err(e) = data.compile(resource.name(), self.context()) {
                engine_error!(SOURCE, "Material '{}' failed to compile: {}", resource.name(), e);
                return None;
            }
        }

        if scheme_index != DEFAULT_SCHEME_INDEX && !data.has_scheme(scheme_index) {
            let listeners = self.listeners.read().map(|l| l.clone()).unwrap_or_default();
            let scheme_name = self.schemes().name(scheme_index).unwrap_or_default();
            for listener in listeners {
                let Some(mut technique) = listener.handle_scheme_not_found(
                    scheme_index, &scheme_name, resource.name(), lod_index, &data,
                ) else {
                    continue;
                };
                technique.set_scheme(&scheme_name);
                engine_trivial!(SOURCE, "Synthesised '{}' technique for material '{}'",
                    scheme_name, resource.name());
                data.add_technique(technique);
                if let Err(e) = data.compile(resource.name(), self.context()) {
                    engine_error!(SOURCE, "Material '{}' failed to compile: {}", resource.name(), e);
                    return None;
                }
                break;
            }
        }
        data.best_technique(scheme_index, lod_index)
    }

    /// Flag every material for recompilation
    ///
    /// Used after programs or textures were reloaded or the backend changed.
    pub fn notify_all_need_recompile(&self) {
        for material in self.materials.resources() {
            if let Some(resource) = material.upgrade() {
                if let Ok(mut data) = resource.data() {
                    data.notify_needs_recompile();
                }
            }
        }
    }
}

#[cfg(test)]
#[path = "material_tests.rs"]
mod tests;
