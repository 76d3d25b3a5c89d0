/// GPU program manager
///
/// Wraps the program resource manager with syntax queries and the
/// microcode cache. Programs are created here and loaded through the
/// render system; when microcode saving is enabled and the backend can
/// return compiled buffers, every fresh compilation is added to the cache.

use std::io::{Read, Write};
use std::path::Path;
use std::sync::Arc;

use crate::engine_info;
use crate::error::Result;
use crate::render_system::{lock_render_system, Capabilities, SharedRenderSystem};
use crate::resource::{NameValuePairList, ResourceGroupRegistry, ResourceManager, ResourceRef};
use super::gpu_program::{GpuProgram, GpuProgramContext, GpuProgramType};
use super::parameters::GpuProgramParameters;

const SOURCE: &str = "ogre::GpuProgramManager";

pub struct GpuProgramManager {
    programs: Arc<ResourceManager<GpuProgram>>,
}

impl GpuProgramManager {
    pub fn new(groups: Arc<ResourceGroupRegistry>, render_system: SharedRenderSystem) -> Self {
        let context = Arc::new(GpuProgramContext::new(render_system));
        Self { programs: Arc::new(ResourceManager::new(groups, context)) }
    }

    /// Underlying resource manager (lookup, load, unload, budget)
    pub fn programs(&self) -> &Arc<ResourceManager<GpuProgram>> {
        &self.programs
    }

    fn context(&self) -> &Arc<GpuProgramContext> {
        self.programs.context()
    }

    // ===== CREATION =====

    /// Program with inline source
    pub fn create_program(
        &self,
        name: &str,
        group: &str,
        program_type: GpuProgramType,
        syntax: &str,
        source: &str,
    ) -> Result<ResourceRef<GpuProgram>> {
        let params = NameValuePairList::from([
            ("type".to_string(), program_type.name().to_string()),
            ("syntax".to_string(), syntax.to_string()),
        ]);
        let program = self.programs.create(name, group, false, None, Some(&params))?;
        if let Some(resource) = program.upgrade() {
            resource.data()?.set_source(source);
        }
        Ok(program)
    }

    /// Program whose source is read from `file` in the group's archives
    pub fn create_program_from_file(
        &self,
        name: &str,
        group: &str,
        file: &str,
        program_type: GpuProgramType,
        syntax: &str,
    ) -> Result<ResourceRef<GpuProgram>> {
        let params = NameValuePairList::from([
            ("type".to_string(), program_type.name().to_string()),
            ("syntax".to_string(), syntax.to_string()),
            ("source_file".to_string(), file.to_string()),
        ]);
        self.programs.create(name, group, false, None, Some(&params))
    }

    /// Load (if needed) and return the program's fresh parameters
    pub fn create_parameters(&self, program: &ResourceRef<GpuProgram>) -> Result<GpuProgramParameters> {
        self.programs.load(program)?;
        match program.upgrade() {
            Some(resource) => resource.data()?.create_parameters(),
            None => {
                crate::engine_bail!(SOURCE, ItemNotFound, "Program {:?} was removed", program.handle());
            }
        }
    }

    // ===== SYNTAX =====

    pub fn is_syntax_supported(&self, syntax: &str) -> bool {
        lock_render_system(self.context().render_system())
            .map(|rs| rs.capabilities().is_syntax_supported(syntax))
            .unwrap_or(false)
    }

    /// Sorted list of the backend's syntaxes
    pub fn supported_syntaxes(&self) -> Vec<String> {
        let mut syntaxes: Vec<String> = lock_render_system(self.context().render_system())
            .map(|rs| rs.capabilities().supported_syntaxes.iter().cloned().collect())
            .unwrap_or_default();
        syntaxes.sort();
        syntaxes
    }

    // ===== MICROCODE CACHE =====

    pub fn set_save_microcodes_to_cache(&mut self, enabled: bool) {
        self.context().set_save_microcodes(enabled);
    }

    pub fn save_microcodes_to_cache(&self) -> bool {
        self.context().save_microcodes()
    }

    /// Backend can return compiled programs for caching
    pub fn can_get_compiled_shader_buffer(&self) -> bool {
        lock_render_system(self.context().render_system())
            .map(|rs| rs.capabilities().has(Capabilities::CAN_GET_COMPILED_SHADER_BUFFER))
            .unwrap_or(false)
    }

    pub fn is_microcode_available_in_cache(&self, fingerprint: u32) -> bool {
        self.context().cache().map(|c| c.is_available(fingerprint)).unwrap_or(false)
    }

    pub fn microcode_from_cache(&self, fingerprint: u32) -> Option<Vec<u8>> {
        self.context().cache().ok()?.get(fingerprint).map(<[u8]>::to_vec)
    }

    pub fn add_microcode_to_cache(&self, fingerprint: u32, microcode: Vec<u8>) -> Result<()> {
        self.context().cache()?.add(fingerprint, microcode);
        Ok(())
    }

    pub fn remove_microcode_from_cache(&self, fingerprint: u32) -> Result<bool> {
        Ok(self.context().cache()?.remove(fingerprint))
    }

    pub fn is_cache_dirty(&self) -> bool {
        self.context().cache().map(|c| c.is_dirty()).unwrap_or(false)
    }

    pub fn cache_entry_count(&self) -> usize {
        self.context().cache().map(|c| c.len()).unwrap_or(0)
    }

    /// Write the cache; `Ok(false)` when the backend cannot return
    /// compiled buffers and nothing was written
    pub fn save_microcode_cache(&self, writer: &mut dyn Write) -> Result<bool> {
        if !self.can_get_compiled_shader_buffer() {
            return Ok(false);
        }
        self.context().cache()?.save(writer)?;
        Ok(true)
    }

    pub fn save_microcode_cache_to_file(&self, path: &Path) -> Result<bool> {
        if !self.can_get_compiled_shader_buffer() {
            return Ok(false);
        }
        self.context().cache()?.save_to_file(path)?;
        engine_info!(SOURCE, "Saved microcode cache to '{}'", path.display());
        Ok(true)
    }

    /// Merge a saved cache, returning the number of entries read
    pub fn load_microcode_cache(&self, reader: &mut dyn Read) -> Result<usize> {
        self.context().cache()?.load(reader)
    }

    pub fn load_microcode_cache_from_file(&self, path: &Path) -> Result<usize> {
        let count = self.context().cache()?.load_from_file(path)?;
        engine_info!(SOURCE, "Loaded {} microcode entries from '{}'", count, path.display());
        Ok(count)
    }
}

#[cfg(test)]
#[path = "gpu_program_tests.rs"]
mod tests;
