/// Fixed-function render state shared by passes and render systems

use bitflags::bitflags;

/// Comparison function for depth, stencil and alpha tests
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CompareFunction {
    AlwaysFail,
    AlwaysPass,
    Less,
    #[default]
    LessEqual,
    Equal,
    NotEqual,
    GreaterEqual,
    Greater,
}

impl CompareFunction {
    /// Evaluate `value <op> reference`
    pub fn compare<T: PartialOrd>(self, value: T, reference: T) -> bool {
        match self {
            CompareFunction::AlwaysFail => false,
            CompareFunction::AlwaysPass => true,
            CompareFunction::Less => value < reference,
            CompareFunction::LessEqual => value <= reference,
            CompareFunction::Equal => value == reference,
            CompareFunction::NotEqual => value != reference,
            CompareFunction::GreaterEqual => value >= reference,
            CompareFunction::Greater => value > reference,
        }
    }
}

/// Hardware culling mode (winding considered back-facing)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CullingMode {
    None,
    #[default]
    Clockwise,
    Anticlockwise,
}

/// How polygons are rasterised
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PolygonMode {
    Points,
    Wireframe,
    #[default]
    Solid,
}

/// Blending factor applied to source or destination colour
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SceneBlendFactor {
    One,
    Zero,
    DestColour,
    SourceColour,
    OneMinusDestColour,
    OneMinusSourceColour,
    DestAlpha,
    SourceAlpha,
    OneMinusDestAlpha,
    OneMinusSourceAlpha,
}

/// Operation combining the weighted source and destination
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SceneBlendOperation {
    #[default]
    Add,
    Subtract,
    ReverseSubtract,
    Min,
    Max,
}

/// Common blend presets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SceneBlendType {
    /// Colour and alpha blended by source alpha
    TransparentAlpha,
    /// Colour blended by source colour
    TransparentColour,
    /// Source added to destination
    Add,
    /// Source multiplied with destination
    Modulate,
    /// Source replaces destination
    Replace,
}

/// Full scene blending state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SceneBlend {
    pub source_factor: SceneBlendFactor,
    pub dest_factor: SceneBlendFactor,
    pub operation: SceneBlendOperation,
}

impl SceneBlend {
    /// Opaque: source replaces destination
    pub const REPLACE: SceneBlend = SceneBlend {
        source_factor: SceneBlendFactor::One,
        dest_factor: SceneBlendFactor::Zero,
        operation: SceneBlendOperation::Add,
    };

    pub fn new(source_factor: SceneBlendFactor, dest_factor: SceneBlendFactor) -> Self {
        Self {
            source_factor,
            dest_factor,
            operation: SceneBlendOperation::Add,
        }
    }

    pub fn from_type(blend_type: SceneBlendType) -> Self {
        use SceneBlendFactor::*;
        match blend_type {
            SceneBlendType::TransparentAlpha => Self::new(SourceAlpha, OneMinusSourceAlpha),
            SceneBlendType::TransparentColour => Self::new(SourceColour, OneMinusSourceColour),
            SceneBlendType::Add => Self::new(One, One),
            SceneBlendType::Modulate => Self::new(DestColour, Zero),
            SceneBlendType::Replace => Self::REPLACE,
        }
    }

    /// Anything other than One/Zero blends with the destination
    pub fn is_blending(&self) -> bool {
        self.source_factor != SceneBlendFactor::One || self.dest_factor != SceneBlendFactor::Zero
    }
}

impl Default for SceneBlend {
    fn default() -> Self {
        Self::REPLACE
    }
}

/// Stencil operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum StencilOperation {
    #[default]
    Keep,
    Zero,
    Replace,
    Increment,
    Decrement,
    IncrementWrap,
    DecrementWrap,
    Invert,
}

/// Stencil test configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StencilState {
    pub enabled: bool,
    pub compare: CompareFunction,
    pub reference: u32,
    pub compare_mask: u32,
    pub write_mask: u32,
    pub stencil_fail_op: StencilOperation,
    pub depth_fail_op: StencilOperation,
    pub pass_op: StencilOperation,
    pub two_sided: bool,
}

impl Default for StencilState {
    fn default() -> Self {
        Self {
            enabled: false,
            compare: CompareFunction::AlwaysPass,
            reference: 0,
            compare_mask: 0xFFFF_FFFF,
            write_mask: 0xFFFF_FFFF,
            stencil_fail_op: StencilOperation::Keep,
            depth_fail_op: StencilOperation::Keep,
            pass_op: StencilOperation::Keep,
            two_sided: false,
        }
    }
}

bitflags! {
    /// Colour channels written by a pass
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ColourWriteMask: u8 {
        const RED = 1 << 0;
        const GREEN = 1 << 1;
        const BLUE = 1 << 2;
        const ALPHA = 1 << 3;
    }
}

impl Default for ColourWriteMask {
    fn default() -> Self {
        Self::all()
    }
}

bitflags! {
    /// Frame buffer planes affected by a clear
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct FrameBufferType: u8 {
        const COLOUR = 1 << 0;
        const DEPTH = 1 << 1;
        const STENCIL = 1 << 2;
    }
}

impl Default for FrameBufferType {
    fn default() -> Self {
        Self::COLOUR | Self::DEPTH
    }
}

/// Texture filtering
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FilterOptions {
    None,
    Point,
    Linear,
    Anisotropic,
}

/// Texture addressing outside [0, 1]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TextureAddressingMode {
    #[default]
    Wrap,
    Mirror,
    Clamp,
    Border,
}

/// Sampler configuration of a texture unit
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SamplerState {
    pub min_filter: FilterOptions,
    pub mag_filter: FilterOptions,
    pub mip_filter: FilterOptions,
    pub address_u: TextureAddressingMode,
    pub address_v: TextureAddressingMode,
    pub address_w: TextureAddressingMode,
    pub max_anisotropy: u32,
    pub mipmap_bias: f32,
}

impl Default for SamplerState {
    fn default() -> Self {
        Self {
            min_filter: FilterOptions::Linear,
            mag_filter: FilterOptions::Linear,
            mip_filter: FilterOptions::Point,
            address_u: TextureAddressingMode::Wrap,
            address_v: TextureAddressingMode::Wrap,
            address_w: TextureAddressingMode::Wrap,
            max_anisotropy: 1,
            mipmap_bias: 0.0,
        }
    }
}

/// Integer rectangle in pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Rect2D {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl Rect2D {
    pub fn new(x: i32, y: i32, width: u32, height: u32) -> Self {
        Self { x, y, width, height }
    }
}
