/// Central render target manager for the engine.
///
/// Owns named render targets (windows and render textures) and decides the
/// order in which they are updated each frame.

use rustc_hash::FxHashMap;

use crate::error::Result;
use crate::hardware::PixelFormat;
use crate::render_system::{RenderSystem, TextureDesc, TextureUsage};
use crate::{engine_bail, engine_info};
use super::render_target::RenderTarget;

const SOURCE: &str = "ogre::TargetManager";

/// Target manager (owned by Root)
///
/// Multiple render targets exist side by side: windows, shadow maps,
/// reflection textures and so on.
pub struct TargetManager {
    render_targets: FxHashMap<String, RenderTarget>,
}

impl TargetManager {
    pub fn new() -> Self {
        Self {
            render_targets: FxHashMap::default(),
        }
    }

    fn check_new(&self, name: &str, width: u32, height: u32) -> Result<()> {
        if self.render_targets.contains_key(name) {
            engine_bail!(SOURCE, DuplicateItem, "RenderTarget '{}' already exists", name);
        }
        if width == 0 || height == 0 {
            engine_bail!(SOURCE, InvalidParams,
                "RenderTarget '{}' has a zero size ({}x{})", name, width, height);
        }
        Ok(())
    }

    /// Create a window target
    ///
    /// The native window itself belongs to the windowing layer; the target
    /// only tracks its size and viewports.
    ///
    /// # Errors
    ///
    /// `DuplicateItem` when the name is taken, `InvalidParams` for a zero size.
    pub fn create_render_window(&mut self, name: &str, width: u32, height: u32) -> Result<&mut RenderTarget> {
        self.check_new(name, width, height)?;
        engine_info!(SOURCE, "Created render window '{}' ({}x{})", name, width, height);
        let target = RenderTarget::window(name, width, height, PixelFormat::R8G8B8A8_UNORM);
        Ok(self.render_targets.entry(name.to_string()).or_insert(target))
    }

    /// Create a render texture named after `desc.name`
    ///
    /// # Errors
    ///
    /// As for windows, plus any backend texture creation error.
    pub fn create_render_texture(
        &mut self,
        desc: &TextureDesc,
        render_system: &mut dyn RenderSystem,
    ) -> Result<&mut RenderTarget> {
        self.check_new(&desc.name, desc.width, desc.height)?;
        let mut desc = desc.clone();
        desc.usage |= TextureUsage::RENDER_TARGET;
        let texture = render_system.create_texture(&desc)?;
        engine_info!(SOURCE, "Created render texture '{}' ({}x{})", desc.name, desc.width, desc.height);
        let target = RenderTarget::for_texture(texture);
        Ok(self.render_targets.entry(desc.name).or_insert(target))
    }

    pub fn render_target(&self, name: &str) -> Option<&RenderTarget> {
        self.render_targets.get(name)
    }

    pub fn render_target_mut(&mut self, name: &str) -> Option<&mut RenderTarget> {
        self.render_targets.get_mut(name)
    }

    /// Returns the removed render target, or None if not found.
    pub fn remove_render_target(&mut self, name: &str) -> Option<RenderTarget> {
        self.render_targets.remove(name)
    }

    pub fn render_target_count(&self) -> usize {
        self.render_targets.len()
    }

    /// Every target name, sorted
    pub fn render_target_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.render_targets.keys().map(|k| k.as_str()).collect();
        names.sort_unstable();
        names
    }

    pub fn clear(&mut self) {
        self.render_targets.clear();
    }

    /// Resize a target
    ///
    /// Windows only record the new size. Render textures are recreated at
    /// the new size with the same description; the old texture is released
    /// once nothing else holds it.
    ///
    /// # Errors
    ///
    /// `ItemNotFound` for an unknown target, `InvalidParams` for a zero size.
    pub fn resize_target(
        &mut self,
        name: &str,
        width: u32,
        height: u32,
        render_system: &mut dyn RenderSystem,
    ) -> Result<()> {
        let Some(target) = self.render_targets.get_mut(name) else {
            engine_bail!(SOURCE, ItemNotFound, "RenderTarget '{}' not found", name);
        };
        if width == 0 || height == 0 {
            engine_bail!(SOURCE, InvalidParams,
                "Cannot resize RenderTarget '{}' to {}x{}", name, width, height);
        }
        match target.texture() {
            Some(texture) => {
                let mut desc = texture.desc().clone();
                desc.width = width;
                desc.height = height;
                let texture = render_system.create_texture(&desc)?;
                target.set_texture(texture);
            }
            None => target.set_size(width, height),
        }
        engine_info!(SOURCE, "Resized render target '{}' to {}x{}", name, width, height);
        Ok(())
    }

    /// Names of the targets a frame update renders, in update order
    ///
    /// Active, auto-updated targets sorted by (priority, name).
    pub fn update_order(&self) -> Vec<String> {
        let mut targets: Vec<&RenderTarget> = self
            .render_targets
            .values()
            .filter(|t| t.is_active() && t.is_auto_updated())
            .collect();
        targets.sort_by(|a, b| a.priority().cmp(&b.priority()).then_with(|| a.name().cmp(b.name())));
        targets.iter().map(|t| t.name().to_string()).collect()
    }
}

impl Default for TargetManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[path = "target_manager_tests.rs"]
mod tests;
