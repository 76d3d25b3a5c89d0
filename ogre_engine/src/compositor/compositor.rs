/// Compositor definitions.
///
/// A `Compositor` is a named post-processing recipe. Each of its techniques
/// declares intermediate textures and the target passes that fill them; the
/// output target pass writes what the next compositor in the chain (or the
/// viewport) receives. Definitions are immutable once registered and
/// shared between chains through `Arc`.

use std::collections::BTreeMap;
use glam::Vec4;

use crate::engine_bail;
use crate::error::Result;
use crate::hardware::{PixelFormat, PixelUtil};
use crate::render_queue::RENDER_QUEUE_MAX;
use crate::render_system::{
    Capabilities, FrameBufferType, RenderSystemCapabilities, StencilState,
};
use crate::scene::ALL_VISIBILITY_FLAGS;

const SOURCE: &str = "ogre::Compositor";

// ============================================================================
// Textures
// ============================================================================

/// Lifetime and sharing of a compositor texture
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TextureScope {
    /// Private to one compositor instance; may come from the shared pool
    #[default]
    Local,
    /// Visible to the later instances of the same chain
    Chain,
    /// One texture per name, shared by every chain
    Global,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TextureSize {
    Absolute { width: u32, height: u32 },
    /// Factors of the size of the target the chain renders to
    TargetRelative { width_factor: f32, height_factor: f32 },
}

/// Chain- or global-scoped texture of another compositor used under a local
/// name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextureReference {
    pub compositor: String,
    pub texture: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TextureDefinition {
    pub name: String,
    pub size: TextureSize,
    pub format: PixelFormat,
    pub fsaa: u32,
    pub hw_gamma: bool,
    pub scope: TextureScope,
    /// Local textures only: share with other instances through the pool
    pub pooled: bool,
    pub reference: Option<TextureReference>,
}

impl TextureDefinition {
    /// Local, unpooled RGBA8 texture the size of the target
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            size: TextureSize::TargetRelative { width_factor: 1.0, height_factor: 1.0 },
            format: PixelFormat::R8G8B8A8_UNORM,
            fsaa: 0,
            hw_gamma: false,
            scope: TextureScope::Local,
            pooled: false,
            reference: None,
        }
    }

    /// Local pooled texture scaled from the target size
    pub fn pooled(name: &str, width_factor: f32, height_factor: f32) -> Self {
        Self {
            size: TextureSize::TargetRelative { width_factor, height_factor },
            pooled: true,
            ..Self::new(name)
        }
    }

    /// `name` stands for `texture` of `compositor`
    pub fn reference(name: &str, compositor: &str, texture: &str) -> Self {
        Self {
            reference: Some(TextureReference {
                compositor: compositor.to_string(),
                texture: texture.to_string(),
            }),
            ..Self::new(name)
        }
    }

    /// Pixel size for a target of `target_width` x `target_height`
    pub fn resolve_size(&self, target_width: u32, target_height: u32) -> (u32, u32) {
        match self.size {
            TextureSize::Absolute { width, height } => (width.max(1), height.max(1)),
            TextureSize::TargetRelative { width_factor, height_factor } => (
                ((target_width as f32 * width_factor) as u32).max(1),
                ((target_height as f32 * height_factor) as u32).max(1),
            ),
        }
    }

    /// Only local definitions are shared through the pool
    pub fn is_pooled(&self) -> bool {
        self.pooled && self.scope == TextureScope::Local && self.reference.is_none()
    }
}

// ============================================================================
// Passes
// ============================================================================

/// Texture bound to a unit of every pass of a quad material
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuadInput {
    pub unit: usize,
    pub texture: String,
}

/// One step of a target pass
#[derive(Debug, Clone, PartialEq)]
pub enum CompositionPass {
    Clear { buffers: FrameBufferType, colour: Vec4, depth: f32, stencil: u32 },
    Stencil(StencilState),
    /// Render the viewport's scene, restricted to a queue range
    RenderScene { first_render_queue: u8, last_render_queue: u8, material_scheme: Option<String> },
    /// Full-screen quad drawn with `material`
    RenderQuad { material: String, inputs: Vec<QuadInput> },
    /// Operation built by a registered custom pass
    RenderCustom { custom_type: String, params: BTreeMap<String, String> },
}

impl CompositionPass {
    /// Clear colour and depth to black and far
    pub fn clear() -> Self {
        Self::Clear {
            buffers: FrameBufferType::COLOUR | FrameBufferType::DEPTH,
            colour: Vec4::new(0.0, 0.0, 0.0, 0.0),
            depth: 1.0,
            stencil: 0,
        }
    }

    /// Every render queue group
    pub fn render_scene() -> Self {
        Self::RenderScene {
            first_render_queue: 0,
            last_render_queue: RENDER_QUEUE_MAX,
            material_scheme: None,
        }
    }

    /// `inputs` are (unit, texture name) pairs
    pub fn render_quad(material: &str, inputs: &[(usize, &str)]) -> Self {
        Self::RenderQuad {
            material: material.to_string(),
            inputs: inputs
                .iter()
                .map(|(unit, texture)| QuadInput { unit: *unit, texture: texture.to_string() })
                .collect(),
        }
    }

    pub fn render_custom(custom_type: &str) -> Self {
        Self::RenderCustom { custom_type: custom_type.to_string(), params: BTreeMap::new() }
    }
}

/// Input of a target pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InputMode {
    /// Start from whatever the target holds
    #[default]
    None,
    /// Start from the output of the previous compositor in the chain
    Previous,
}

/// Passes rendering into one texture (or into the chain output)
#[derive(Debug, Clone, PartialEq)]
pub struct CompositionTargetPass {
    output: String,
    pub input_mode: InputMode,
    /// Render once after each compile, then keep the contents
    pub only_initial: bool,
    /// Combined with the viewport mask for scene passes
    pub visibility_mask: u32,
    pub material_scheme: Option<String>,
    pub passes: Vec<CompositionPass>,
}

impl CompositionTargetPass {
    fn new(output: &str) -> Self {
        Self {
            output: output.to_string(),
            input_mode: InputMode::None,
            only_initial: false,
            visibility_mask: ALL_VISIBILITY_FLAGS,
            material_scheme: None,
            passes: Vec::new(),
        }
    }

    /// Texture written; empty for the output pass
    pub fn output_name(&self) -> &str {
        &self.output
    }

    pub fn add_pass(&mut self, pass: CompositionPass) -> &mut Self {
        self.passes.push(pass);
        self
    }

    /// Names of the textures read by quad passes
    pub fn quad_inputs(&self) -> impl Iterator<Item = &str> {
        self.passes.iter().flat_map(|pass| match pass {
            CompositionPass::RenderQuad { inputs, .. } => inputs.iter().map(|i| i.texture.as_str()).collect(),
            _ => Vec::new(),
        })
    }
}

// ============================================================================
// Technique / Compositor
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct CompositionTechnique {
    /// Material scheme this technique is meant for; empty for any
    pub scheme: String,
    texture_definitions: Vec<TextureDefinition>,
    target_passes: Vec<CompositionTargetPass>,
    output_pass: CompositionTargetPass,
}

impl CompositionTechnique {
    pub fn new() -> Self {
        Self {
            scheme: String::new(),
            texture_definitions: Vec::new(),
            target_passes: Vec::new(),
            output_pass: CompositionTargetPass::new(""),
        }
    }

    /// # Errors
    ///
    /// `DuplicateItem` when the name is taken.
    pub fn add_texture_definition(&mut self, definition: TextureDefinition) -> Result<&mut TextureDefinition> {
        if self.texture_definition(&definition.name).is_some() {
            engine_bail!(SOURCE, DuplicateItem, "Texture definition '{}' already exists", definition.name);
        }
        self.texture_definitions.push(definition);
        let last = self.texture_definitions.len() - 1;
        Ok(&mut self.texture_definitions[last])
    }

    pub fn texture_definition(&self, name: &str) -> Option<&TextureDefinition> {
        self.texture_definitions.iter().find(|d| d.name == name)
    }

    pub fn texture_definitions(&self) -> &[TextureDefinition] {
        &self.texture_definitions
    }

    /// Target pass writing the texture `output`
    ///
    /// # Errors
    ///
    /// `ItemNotFound` when no texture of that name is defined.
    pub fn create_target_pass(&mut self, output: &str) -> Result<&mut CompositionTargetPass> {
        if self.texture_definition(output).is_none() {
            engine_bail!(SOURCE, ItemNotFound, "Target pass output '{}' is not a defined texture", output);
        }
        self.target_passes.push(CompositionTargetPass::new(output));
        let last = self.target_passes.len() - 1;
        Ok(&mut self.target_passes[last])
    }

    pub fn target_passes(&self) -> &[CompositionTargetPass] {
        &self.target_passes
    }

    pub fn output_pass(&self) -> &CompositionTargetPass {
        &self.output_pass
    }

    pub fn output_pass_mut(&mut self) -> &mut CompositionTargetPass {
        &mut self.output_pass
    }

    /// Whether the backend can run this technique
    ///
    /// Intermediate textures need render-to-texture, a renderable format
    /// and a supported FSAA level.
    pub fn is_supported(&self, capabilities: &RenderSystemCapabilities) -> bool {
        let owned = self.texture_definitions.iter().filter(|d| d.reference.is_none());
        for definition in owned {
            if !capabilities.has(Capabilities::HWRENDER_TO_TEXTURE)
                || PixelUtil::is_compressed(definition.format)
                || !capabilities.fsaa_levels.contains(&definition.fsaa)
            {
                return false;
            }
        }
        true
    }
}

impl Default for CompositionTechnique {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug)]
pub struct Compositor {
    name: String,
    techniques: Vec<CompositionTechnique>,
}

impl Compositor {
    pub fn new(name: &str) -> Self {
        Self { name: name.to_string(), techniques: Vec::new() }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn create_technique(&mut self) -> &mut CompositionTechnique {
        self.techniques.push(CompositionTechnique::new());
        let last = self.techniques.len() - 1;
        &mut self.techniques[last]
    }

    pub fn techniques(&self) -> &[CompositionTechnique] {
        &self.techniques
    }

    pub fn technique(&self, index: usize) -> Option<&CompositionTechnique> {
        self.techniques.get(index)
    }

    /// Index of the technique to run for `scheme`
    ///
    /// The first supported technique of that scheme, else the first
    /// supported technique without a scheme.
    pub fn supported_technique(&self, capabilities: &RenderSystemCapabilities, scheme: &str) -> Option<usize> {
        let supported = |t: &CompositionTechnique| t.is_supported(capabilities);
        self.techniques
            .iter()
            .position(|t| !scheme.is_empty() && t.scheme == scheme && supported(t))
            .or_else(|| self.techniques.iter().position(|t| t.scheme.is_empty() && supported(t)))
    }

    /// Check every technique's texture references
    ///
    /// # Errors
    ///
    /// `InvalidParams` when there is no technique or a quad reads an
    /// undefined texture.
    pub fn validate(&self) -> Result<()> {
        if self.techniques.is_empty() {
            engine_bail!(SOURCE, InvalidParams, "Compositor '{}' has no technique", self.name);
        }
        for (index, technique) in self.techniques.iter().enumerate() {
            let passes = technique.target_passes.iter().chain(std::iter::once(&technique.output_pass));
            for target_pass in passes {
                for input in target_pass.quad_inputs() {
                    if technique.texture_definition(input).is_none() {
                        engine_bail!(SOURCE, InvalidParams,
                            "Compositor '{}' technique {}: quad input '{}' is not a defined texture",
                            self.name, index, input);
                    }
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "compositor_tests.rs"]
mod tests;
