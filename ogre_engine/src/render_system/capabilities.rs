/// Capabilities advertised by a render system

use bitflags::bitflags;
use rustc_hash::FxHashSet;
use crate::hardware::PixelFormat;

bitflags! {
    /// Optional backend features
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Capabilities: u32 {
        /// Mipmaps can be generated by the hardware
        const AUTOMIPMAP = 1 << 0;
        /// Non power-of-two texture sizes are supported
        const NON_POWER_OF_2_TEXTURES = 1 << 1;
        /// Compiled programs can be read back for the microcode cache
        const CAN_GET_COMPILED_SHADER_BUFFER = 1 << 2;
        /// Depth range is reversed (1 = near)
        const REVERSE_Z = 1 << 3;
        /// Hardware stencil buffer
        const HWSTENCIL = 1 << 4;
        /// Block-compressed texture formats
        const TEXTURE_COMPRESSION = 1 << 5;
        const VERTEX_PROGRAM = 1 << 6;
        const FRAGMENT_PROGRAM = 1 << 7;
        const GEOMETRY_PROGRAM = 1 << 8;
        const COMPUTE_PROGRAM = 1 << 9;
        /// Anisotropic texture filtering
        const ANISOTROPY = 1 << 10;
        /// Separate blend factors for alpha
        const SEPARATE_SCENE_BLENDING = 1 << 11;
        const SCISSOR_TEST = 1 << 12;
        /// Rendering into textures
        const HWRENDER_TO_TEXTURE = 1 << 13;
        /// Full-scene anti-aliasing on render textures
        const FSAA = 1 << 14;
    }
}

/// Capabilities and limits of the active backend
#[derive(Debug, Clone)]
pub struct RenderSystemCapabilities {
    pub capabilities: Capabilities,
    /// Human-readable shader model, e.g. "4.1"
    pub shader_model: String,
    /// Maximum number of simultaneously bound texture units
    pub num_texture_units: u16,
    pub num_multi_render_targets: u16,
    pub max_anisotropy: u32,
    /// FSAA sample counts accepted for render textures
    pub fsaa_levels: Vec<u32>,
    pub depth_formats: Vec<PixelFormat>,
    /// Program syntaxes / profiles the backend compiles
    pub supported_syntaxes: FxHashSet<String>,
}

impl RenderSystemCapabilities {
    pub fn has(&self, capability: Capabilities) -> bool {
        self.capabilities.contains(capability)
    }

    pub fn is_syntax_supported(&self, syntax: &str) -> bool {
        self.supported_syntaxes.contains(syntax)
    }

    pub fn add_syntax(&mut self, syntax: &str) {
        self.supported_syntaxes.insert(syntax.to_string());
    }
}

impl Default for RenderSystemCapabilities {
    fn default() -> Self {
        Self {
            capabilities: Capabilities::empty(),
            shader_model: String::new(),
            num_texture_units: 1,
            num_multi_render_targets: 1,
            max_anisotropy: 1,
            fsaa_levels: vec![0],
            depth_formats: Vec::new(),
            supported_syntaxes: FxHashSet::default(),
        }
    }
}
