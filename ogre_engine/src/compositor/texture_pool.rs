/// Shared pool of local compositor textures.
///
/// Instances asking for a texture with the same size, format, FSAA, gamma
/// and type get an existing pooled texture unless the caller excludes it.
/// The pool keeps every texture it created alive until `free_unused` finds
/// nothing else referencing it.

use std::sync::Arc;
use rustc_hash::FxHashSet;

use crate::engine_trivial;
use crate::error::Result;
use crate::hardware::PixelFormat;
use crate::render_system::{GpuTexture, RenderSystem, TextureDesc, TextureType, TextureUsage};

const SOURCE: &str = "ogre::TexturePool";

/// Properties two textures must share to be interchangeable
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PoolKey {
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    pub fsaa: u32,
    pub hw_gamma: bool,
    pub texture_type: TextureType,
}

impl PoolKey {
    pub fn from_desc(desc: &TextureDesc) -> Self {
        Self {
            width: desc.width,
            height: desc.height,
            format: desc.format,
            fsaa: desc.fsaa,
            hw_gamma: desc.hw_gamma,
            texture_type: desc.texture_type,
        }
    }
}

#[derive(Default)]
pub struct TexturePool {
    textures: Vec<(PoolKey, Arc<dyn GpuTexture>)>,
}

impl TexturePool {
    pub fn new() -> Self {
        Self::default()
    }

    /// A pooled texture matching `desc` whose id is not in `exclude`
    ///
    /// Creates (and pools) a new render texture named `desc.name` when
    /// none is available.
    pub fn acquire(
        &mut self,
        desc: &TextureDesc,
        exclude: &FxHashSet<u64>,
        render_system: &mut dyn RenderSystem,
    ) -> Result<Arc<dyn GpuTexture>> {
        let key = PoolKey::from_desc(desc);
        if let Some((_, texture)) = self
            .textures
            .iter()
            .find(|(k, t)| *k == key && !exclude.contains(&t.id()))
        {
            return Ok(texture.clone());
        }
        let mut desc = desc.clone();
        desc.usage |= TextureUsage::RENDER_TARGET;
        let texture = render_system.create_texture(&desc)?;
        engine_trivial!(SOURCE, "Pooled texture '{}' created ({}x{})", desc.name, desc.width, desc.height);
        self.textures.push((key, texture.clone()));
        Ok(texture)
    }

    pub fn len(&self) -> usize {
        self.textures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.textures.is_empty()
    }

    /// Release the textures only the pool still holds
    ///
    /// Returns how many were released.
    pub fn free_unused(&mut self) -> usize {
        let before = self.textures.len();
        self.textures.retain(|(_, texture)| Arc::strong_count(texture) > 1);
        before - self.textures.len()
    }

    /// Release every pooled texture
    pub fn clear(&mut self) {
        self.textures.clear();
    }
}

#[cfg(test)]
#[path = "texture_pool_tests.rs"]
mod tests;
