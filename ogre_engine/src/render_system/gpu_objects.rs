/// Backend-owned GPU objects and their creation descriptors
///
/// The core never sees API handles: buffers, textures and compiled programs
/// are trait objects created by the render system (or its buffer factory).
/// Objects are destroyed when the last `Arc` is dropped.

use std::sync::Arc;
use bitflags::bitflags;
use crate::error::Result;
use crate::gpu_program::GpuProgramType;
use crate::hardware::{HardwareBufferKind, HardwareBufferUsage, PixelFormat};

// ===== BUFFERS =====

/// Linear GPU memory
pub trait GpuBuffer: Send + Sync {
    /// Backend-unique id
    fn id(&self) -> u64;

    /// Size in bytes
    fn size(&self) -> usize;

    /// Read `dst.len()` bytes starting at `offset` (GPU round trip)
    fn read(&self, offset: usize, dst: &mut [u8]) -> Result<()>;

    /// Write `src` at `offset`. With `discard` the previous contents of the
    /// whole buffer may be thrown away.
    fn write(&self, offset: usize, src: &[u8], discard: bool) -> Result<()>;
}

/// Creates GPU buffers
///
/// Kept apart from the render system so that buffers can be created from
/// any thread without locking the render system.
pub trait HardwareBufferFactory: Send + Sync {
    fn create_buffer(
        &self,
        kind: HardwareBufferKind,
        size: usize,
        usage: HardwareBufferUsage,
    ) -> Result<Arc<dyn GpuBuffer>>;
}

// ===== TEXTURES =====

/// Texture dimensionality
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TextureType {
    Tex1D,
    #[default]
    Tex2D,
    Tex3D,
    CubeMap,
    Tex2DArray,
}

impl TextureType {
    pub fn face_count(self) -> u32 {
        match self {
            TextureType::CubeMap => 6,
            _ => 1,
        }
    }
}

bitflags! {
    /// Texture usage flags
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct TextureUsage: u32 {
        const STATIC = 1 << 0;
        const DYNAMIC = 1 << 1;
        const WRITE_ONLY = 1 << 2;
        /// Mipmaps generated by the hardware
        const AUTOMIPMAP = 1 << 3;
        /// Texture is a render target
        const RENDER_TARGET = 1 << 4;
    }
}

impl Default for TextureUsage {
    fn default() -> Self {
        Self::STATIC | Self::WRITE_ONLY
    }
}

/// Descriptor for creating a texture
#[derive(Debug, Clone, PartialEq)]
pub struct TextureDesc {
    pub name: String,
    pub texture_type: TextureType,
    pub width: u32,
    pub height: u32,
    /// Depth for 3D textures, layer count for arrays, 1 otherwise
    pub depth: u32,
    /// Mip levels below the top level
    pub num_mipmaps: u32,
    pub format: PixelFormat,
    pub usage: TextureUsage,
    pub fsaa: u32,
    /// sRGB read/write conversion
    pub hw_gamma: bool,
}

impl TextureDesc {
    /// A plain 2D texture without mipmaps
    pub fn new_2d(name: &str, width: u32, height: u32, format: PixelFormat) -> Self {
        Self {
            name: name.to_string(),
            texture_type: TextureType::Tex2D,
            width,
            height,
            depth: 1,
            num_mipmaps: 0,
            format,
            usage: TextureUsage::default(),
            fsaa: 0,
            hw_gamma: false,
        }
    }

    /// Extent of mip level `mip` (never below 1)
    pub fn mip_extent(&self, mip: u32) -> (u32, u32, u32) {
        let depth = match self.texture_type {
            TextureType::Tex3D => (self.depth >> mip).max(1),
            _ => self.depth.max(1),
        };
        ((self.width >> mip).max(1), (self.height >> mip).max(1), depth)
    }
}

/// Backend texture
pub trait GpuTexture: Send + Sync {
    fn id(&self) -> u64;

    fn desc(&self) -> &TextureDesc;

    /// Linear storage of one face / mip level, in the texture's pixel format
    fn surface(&self, face: u32, mip: u32) -> Result<Arc<dyn GpuBuffer>>;
}

impl std::fmt::Debug for dyn GpuTexture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GpuTexture")
            .field("id", &self.id())
            .field("name", &self.desc().name)
            .finish()
    }
}

// ===== PROGRAMS =====

/// Descriptor for compiling a GPU program from source
#[derive(Debug, Clone, PartialEq)]
pub struct GpuProgramDesc {
    pub name: String,
    pub program_type: GpuProgramType,
    pub language: String,
    pub syntax: String,
    pub source: String,
    /// `NAME` or `NAME=VALUE` entries
    pub defines: Vec<String>,
    pub entry_point: String,
}

/// A compiled, bindable GPU program
pub trait GpuProgramObject: Send + Sync {
    fn id(&self) -> u64;

    fn program_type(&self) -> GpuProgramType;

    /// Driver-compiled binary, when the backend can return it
    fn microcode(&self) -> Option<Vec<u8>>;
}

impl std::fmt::Debug for dyn GpuProgramObject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GpuProgramObject")
            .field("id", &self.id())
            .field("program_type", &self.program_type())
            .finish()
    }
}
