/// Texture unit state: one texture binding of a pass.

use std::sync::Arc;

use crate::render_system::{FilterOptions, GpuTexture, SamplerState, TextureAddressingMode};
use crate::resource::{ResourceHandle, ResourceRef, AUTODETECT_RESOURCE_GROUP_NAME};
use crate::resource::texture::{Texture, TextureManager};
use super::technique::CompileFailure;

/// How a texture layer combines with the result of the previous layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum LayerBlendOperation {
    /// Texture replaces the previous result
    Replace,
    Add,
    #[default]
    Modulate,
    /// Blend by the texture's alpha
    AlphaBlend,
}

/// Automatic texture coordinate generation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TexCoordGeneration {
    #[default]
    None,
    EnvironmentMapSphere,
    EnvironmentMapReflection,
    EnvironmentMapNormal,
    ProjectiveTexturing,
}

/// Where the unit's texture comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TextureContentType {
    /// A texture resource looked up by name
    Named,
    /// A texture of the compositor chain, bound while the chain renders
    Compositor { compositor: String, texture: String, mrt_index: usize },
}

#[derive(Clone)]
pub struct TextureUnitState {
    name: String,
    texture_name: String,
    content_type: TextureContentType,
    pub sampler: SamplerState,
    pub tex_coord_set: u32,
    pub tex_coord_generation: TexCoordGeneration,
    pub colour_op: LayerBlendOperation,
    pub alpha_op: LayerBlendOperation,
    texture: Option<ResourceRef<Texture>>,
    gpu_texture: Option<Arc<dyn GpuTexture>>,
}

impl TextureUnitState {
    pub fn new(texture_name: &str) -> Self {
        Self {
            name: String::new(),
            texture_name: texture_name.to_string(),
            content_type: TextureContentType::Named,
            sampler: SamplerState::default(),
            tex_coord_set: 0,
            tex_coord_generation: TexCoordGeneration::None,
            colour_op: LayerBlendOperation::Modulate,
            alpha_op: LayerBlendOperation::Modulate,
            texture: None,
            gpu_texture: None,
        }
    }

    /// Unit bound to a texture of a compositor instance
    pub fn compositor_input(compositor: &str, texture: &str, mrt_index: usize) -> Self {
        let mut unit = Self::new("");
        unit.content_type = TextureContentType::Compositor {
            compositor: compositor.to_string(),
            texture: texture.to_string(),
            mrt_index,
        };
        unit
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name(&mut self, name: &str) {
        self.name = name.to_string();
    }

    pub fn texture_name(&self) -> &str {
        &self.texture_name
    }

    /// Change the texture; takes effect at the next material compile
    pub fn set_texture_name(&mut self, name: &str) {
        self.texture_name = name.to_string();
        self.content_type = TextureContentType::Named;
        self.texture = None;
        self.gpu_texture = None;
    }

    pub fn content_type(&self) -> &TextureContentType {
        &self.content_type
    }

    pub fn is_compositor_input(&self) -> bool {
        matches!(self.content_type, TextureContentType::Compositor { .. })
    }

    /// Texture resource resolved at compile time
    pub fn texture(&self) -> Option<&ResourceRef<Texture>> {
        self.texture.as_ref()
    }

    pub fn texture_handle(&self) -> Option<ResourceHandle> {
        self.texture.as_ref().map(ResourceRef::handle)
    }

    /// Backend texture bound when the pass draws
    pub fn gpu_texture(&self) -> Option<&Arc<dyn GpuTexture>> {
        self.gpu_texture.as_ref()
    }

    /// Bind a texture directly (compositor inputs, render textures)
    pub fn set_gpu_texture(&mut self, texture: Option<Arc<dyn GpuTexture>>) {
        self.gpu_texture = texture;
    }

    pub fn set_filtering(&mut self, min: FilterOptions, mag: FilterOptions, mip: FilterOptions) {
        self.sampler.min_filter = min;
        self.sampler.mag_filter = mag;
        self.sampler.mip_filter = mip;
    }

    pub fn set_addressing_mode(&mut self, mode: TextureAddressingMode) {
        self.sampler.address_u = mode;
        self.sampler.address_v = mode;
        self.sampler.address_w = mode;
    }

    /// Look up and load the named texture
    ///
    /// Compositor inputs resolve when their chain compiles.
    pub(crate) fn resolve(&mut self, pass: usize, textures: &TextureManager) -> Result<(), CompileFailure> {
        if self.is_compositor_input() {
            return Ok(());
        }
        let Some(texture) = textures.get_by_name(&self.texture_name, AUTODETECT_RESOURCE_GROUP_NAME) else {
            return Err(CompileFailure::TextureNotFound { pass, texture: self.texture_name.clone() });
        };
        if let Err(e) = textures.load(&texture) {
            return Err(CompileFailure::TextureLoadFailed {
                pass,
                texture: self.texture_name.clone(),
                error: e.to_string(),
            });
        }
        self.gpu_texture = texture
            .upgrade()
            .and_then(|r| r.data().ok().and_then(|t| t.gpu_texture().cloned()));
        self.texture = Some(texture);
        Ok(())
    }

    pub(crate) fn release(&mut self) {
        if !self.is_compositor_input() {
            self.gpu_texture = None;
        }
        self.texture = None;
    }
}
