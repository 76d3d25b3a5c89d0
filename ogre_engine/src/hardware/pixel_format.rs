//! Pixel formats, pixel boxes and format conversion
//!
//! Every uncompressed, non-packed-depth format converts through an RGBA
//! `f32` intermediate (`unpack_colour` then `pack_colour`). Compressed
//! formats can only be copied to the same format.

use glam::Vec4;
use bitflags::bitflags;

use crate::engine_bail;
use crate::error::Result;

/// Pixel formats understood by the core
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[allow(non_camel_case_types)]
pub enum PixelFormat {
    #[default]
    Unknown,
    L8_UNORM,
    A8_UNORM,
    R8_UNORM,
    R8G8_UNORM,
    R8G8B8_UNORM,
    B8G8R8_UNORM,
    R8G8B8A8_UNORM,
    B8G8R8A8_UNORM,
    R16G16B16A16_UNORM,
    R32_SFLOAT,
    R32G32_SFLOAT,
    R32G32B32_SFLOAT,
    R32G32B32A32_SFLOAT,
    D16_UNORM,
    D32_FLOAT,
    D24_UNORM_S8_UINT,
    BC1_UNORM,
    BC3_UNORM,
}

bitflags! {
    /// Format properties
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct PixelFormatFlags: u32 {
        const HAS_ALPHA = 1 << 0;
        const COMPRESSED = 1 << 1;
        const FLOAT = 1 << 2;
        const DEPTH = 1 << 3;
        const STENCIL = 1 << 4;
        const LUMINANCE = 1 << 5;
        const NORMALIZED = 1 << 6;
    }
}

/// Storage of one component
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ComponentType {
    Byte,
    Short,
    Float32,
    /// Opaque packed or block data
    Packed,
}

impl ComponentType {
    fn size(self) -> usize {
        match self {
            ComponentType::Byte => 1,
            ComponentType::Short => 2,
            ComponentType::Float32 => 4,
            ComponentType::Packed => 0,
        }
    }
}

/// Row of the format table
#[derive(Debug, Clone, Copy)]
pub struct PixelFormatDescription {
    pub name: &'static str,
    /// Bytes per pixel (0 for block-compressed formats)
    pub bytes_per_pixel: usize,
    pub flags: PixelFormatFlags,
    pub component_type: ComponentType,
    pub component_count: usize,
    /// Component slot holding R, G, B, A (-1 when absent)
    pub channels: [i8; 4],
    /// Bytes per 4x4 block for compressed formats
    pub block_size: usize,
}

const NONE: i8 = -1;

const fn desc(
    name: &'static str,
    bytes_per_pixel: usize,
    flags: PixelFormatFlags,
    component_type: ComponentType,
    component_count: usize,
    channels: [i8; 4],
    block_size: usize,
) -> PixelFormatDescription {
    PixelFormatDescription {
        name,
        bytes_per_pixel,
        flags,
        component_type,
        component_count,
        channels,
        block_size,
    }
}

const NORM: PixelFormatFlags = PixelFormatFlags::NORMALIZED;
const NORM_ALPHA: PixelFormatFlags = PixelFormatFlags::NORMALIZED.union(PixelFormatFlags::HAS_ALPHA);
const FLOAT: PixelFormatFlags = PixelFormatFlags::FLOAT;

impl PixelFormat {
    /// Table entry for this format
    pub fn description(self) -> PixelFormatDescription {
        use ComponentType::*;
        use PixelFormat::*;
        match self {
            Unknown => desc("UNKNOWN", 0, PixelFormatFlags::empty(), Packed, 0, [NONE; 4], 0),
            L8_UNORM => desc("L8", 1, NORM.union(PixelFormatFlags::LUMINANCE), Byte, 1, [0, 0, 0, NONE], 0),
            A8_UNORM => desc("A8", 1, NORM_ALPHA, Byte, 1, [NONE, NONE, NONE, 0], 0),
            R8_UNORM => desc("R8", 1, NORM, Byte, 1, [0, NONE, NONE, NONE], 0),
            R8G8_UNORM => desc("RG8", 2, NORM, Byte, 2, [0, 1, NONE, NONE], 0),
            R8G8B8_UNORM => desc("RGB8", 3, NORM, Byte, 3, [0, 1, 2, NONE], 0),
            B8G8R8_UNORM => desc("BGR8", 3, NORM, Byte, 3, [2, 1, 0, NONE], 0),
            R8G8B8A8_UNORM => desc("RGBA8", 4, NORM_ALPHA, Byte, 4, [0, 1, 2, 3], 0),
            B8G8R8A8_UNORM => desc("BGRA8", 4, NORM_ALPHA, Byte, 4, [2, 1, 0, 3], 0),
            R16G16B16A16_UNORM => desc("RGBA16", 8, NORM_ALPHA, Short, 4, [0, 1, 2, 3], 0),
            R32_SFLOAT => desc("R32F", 4, FLOAT, Float32, 1, [0, NONE, NONE, NONE], 0),
            R32G32_SFLOAT => desc("RG32F", 8, FLOAT, Float32, 2, [0, 1, NONE, NONE], 0),
            R32G32B32_SFLOAT => desc("RGB32F", 12, FLOAT, Float32, 3, [0, 1, 2, NONE], 0),
            R32G32B32A32_SFLOAT => desc(
                "RGBA32F", 16, FLOAT.union(PixelFormatFlags::HAS_ALPHA), Float32, 4, [0, 1, 2, 3], 0,
            ),
            D16_UNORM => desc("D16", 2, PixelFormatFlags::DEPTH.union(NORM), Short, 1, [0, NONE, NONE, NONE], 0),
            D32_FLOAT => desc("D32F", 4, PixelFormatFlags::DEPTH.union(FLOAT), Float32, 1, [0, NONE, NONE, NONE], 0),
            D24_UNORM_S8_UINT => desc(
                "D24S8", 4, PixelFormatFlags::DEPTH.union(PixelFormatFlags::STENCIL), Packed, 2, [NONE; 4], 0,
            ),
            BC1_UNORM => desc("BC1", 0, PixelFormatFlags::COMPRESSED, Packed, 4, [NONE; 4], 8),
            BC3_UNORM => desc(
                "BC3", 0, PixelFormatFlags::COMPRESSED.union(PixelFormatFlags::HAS_ALPHA), Packed, 4, [NONE; 4], 16,
            ),
        }
    }
}

impl PixelFormat {
    pub const ALL: [PixelFormat; 19] = {
        use PixelFormat::*;
        [
            Unknown, L8_UNORM, A8_UNORM, R8_UNORM, R8G8_UNORM, R8G8B8_UNORM, B8G8R8_UNORM,
            R8G8B8A8_UNORM, B8G8R8A8_UNORM, R16G16B16A16_UNORM, R32_SFLOAT, R32G32_SFLOAT,
            R32G32B32_SFLOAT, R32G32B32A32_SFLOAT, D16_UNORM, D32_FLOAT, D24_UNORM_S8_UINT,
            BC1_UNORM, BC3_UNORM,
        ]
    };

    /// Format whose table name is `name` (case-insensitive, e.g. `RGBA8`)
    pub fn from_name(name: &str) -> Option<PixelFormat> {
        Self::ALL
            .iter()
            .copied()
            .find(|f| f.description().name.eq_ignore_ascii_case(name.trim()))
    }
}

/// Helpers over the format table
pub struct PixelUtil;

impl PixelUtil {
    pub fn num_elem_bytes(format: PixelFormat) -> usize {
        format.description().bytes_per_pixel
    }

    pub fn is_compressed(format: PixelFormat) -> bool {
        format.description().flags.contains(PixelFormatFlags::COMPRESSED)
    }

    pub fn is_depth(format: PixelFormat) -> bool {
        format.description().flags.contains(PixelFormatFlags::DEPTH)
    }

    pub fn is_float(format: PixelFormat) -> bool {
        format.description().flags.contains(PixelFormatFlags::FLOAT)
    }

    pub fn has_alpha(format: PixelFormat) -> bool {
        format.description().flags.contains(PixelFormatFlags::HAS_ALPHA)
    }

    /// Whether colours can be unpacked from / packed into this format
    pub fn is_accessible(format: PixelFormat) -> bool {
        let d = format.description();
        d.component_type != ComponentType::Packed && d.bytes_per_pixel > 0
    }

    /// Bytes needed to store an image of the given extent
    pub fn memory_size(width: u32, height: u32, depth: u32, format: PixelFormat) -> usize {
        let d = format.description();
        let (w, h, depth) = (width as usize, height as usize, depth.max(1) as usize);
        if d.flags.contains(PixelFormatFlags::COMPRESSED) {
            w.div_ceil(4) * h.div_ceil(4) * d.block_size * depth
        } else {
            w * h * depth * d.bytes_per_pixel
        }
    }

    /// Encode `colour` into `dst` (at least `num_elem_bytes` long)
    pub fn pack_colour(colour: Vec4, format: PixelFormat, dst: &mut [u8]) -> Result<()> {
        let d = format.description();
        if !Self::is_accessible(format) || dst.len() < d.bytes_per_pixel {
            engine_bail!("ogre::PixelUtil", NotImplemented,
                "Cannot pack a colour into format {}", d.name);
        }

        let rgba = colour.to_array();
        let mut components = [0.0f32; 4];
        if d.flags.contains(PixelFormatFlags::LUMINANCE) {
            components[0] = rgba[0];
        } else {
            for (channel, slot) in d.channels.iter().enumerate() {
                if *slot >= 0 {
                    components[*slot as usize] = rgba[channel];
                }
            }
        }

        let size = d.component_type.size();
        for (i, value) in components.iter().take(d.component_count).enumerate() {
            let out = &mut dst[i * size..(i + 1) * size];
            match d.component_type {
                ComponentType::Byte => out[0] = (value.clamp(0.0, 1.0) * 255.0).round() as u8,
                ComponentType::Short => out.copy_from_slice(
                    &((value.clamp(0.0, 1.0) * 65535.0).round() as u16).to_le_bytes(),
                ),
                ComponentType::Float32 => out.copy_from_slice(&value.to_le_bytes()),
                ComponentType::Packed => {}
            }
        }
        Ok(())
    }

    /// Decode one pixel of `format` from `src`
    ///
    /// Missing colour channels read as 0, missing alpha as 1.
    pub fn unpack_colour(format: PixelFormat, src: &[u8]) -> Result<Vec4> {
        let d = format.description();
        if !Self::is_accessible(format) || src.len() < d.bytes_per_pixel {
            engine_bail!("ogre::PixelUtil", NotImplemented,
                "Cannot unpack a colour from format {}", d.name);
        }

        let size = d.component_type.size();
        let mut components = [0.0f32; 4];
        for (i, component) in components.iter_mut().take(d.component_count).enumerate() {
            let bytes = &src[i * size..(i + 1) * size];
            *component = match d.component_type {
                ComponentType::Byte => bytes[0] as f32 / 255.0,
                ComponentType::Short => u16::from_le_bytes([bytes[0], bytes[1]]) as f32 / 65535.0,
                ComponentType::Float32 => f32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
                ComponentType::Packed => 0.0,
            };
        }

        let mut rgba = [0.0, 0.0, 0.0, 1.0];
        for (channel, slot) in d.channels.iter().enumerate() {
            if *slot >= 0 {
                rgba[channel] = components[*slot as usize];
            }
        }
        Ok(Vec4::from_array(rgba))
    }

    /// Convert `src` into `dst`'s format; extents must match
    pub fn bulk_convert(src: &PixelBox, dst: &mut PixelBox) -> Result<()> {
        if src.extent() != dst.extent() {
            engine_bail!("ogre::PixelUtil", InvalidParams,
                "Extent {:?} does not match {:?}; scaling is not supported",
                src.extent(), dst.extent());
        }
        if src.format == dst.format {
            dst.data.copy_from_slice(&src.data);
            return Ok(());
        }
        if !Self::is_accessible(src.format) || !Self::is_accessible(dst.format) {
            engine_bail!("ogre::PixelUtil", NotImplemented,
                "Conversion from {} to {} is not supported",
                src.format.description().name, dst.format.description().name);
        }

        let src_bpp = Self::num_elem_bytes(src.format);
        let dst_bpp = Self::num_elem_bytes(dst.format);
        for (s, d) in src.data.chunks_exact(src_bpp).zip(dst.data.chunks_exact_mut(dst_bpp)) {
            let colour = Self::unpack_colour(src.format, s)?;
            Self::pack_colour(colour, dst.format, d)?;
        }
        Ok(())
    }
}

/// Owned image block of one format
#[derive(Debug, Clone, PartialEq)]
pub struct PixelBox {
    pub width: u32,
    pub height: u32,
    pub depth: u32,
    pub format: PixelFormat,
    pub data: Vec<u8>,
}

impl PixelBox {
    /// Zero-filled box
    pub fn new(width: u32, height: u32, depth: u32, format: PixelFormat) -> Self {
        let size = PixelUtil::memory_size(width, height, depth, format);
        Self { width, height, depth: depth.max(1), format, data: vec![0; size] }
    }

    /// Box over existing bytes; the length must match the extent
    pub fn from_data(width: u32, height: u32, depth: u32, format: PixelFormat, data: Vec<u8>) -> Result<Self> {
        let expected = PixelUtil::memory_size(width, height, depth, format);
        if data.len() != expected {
            engine_bail!("ogre::PixelBox", InvalidParams,
                "{} bytes given for a {}x{}x{} {} box needing {}",
                data.len(), width, height, depth, format.description().name, expected);
        }
        Ok(Self { width, height, depth: depth.max(1), format, data })
    }

    pub fn extent(&self) -> (u32, u32, u32) {
        (self.width, self.height, self.depth)
    }

    fn pixel_offset(&self, x: u32, y: u32, z: u32) -> Result<usize> {
        if x >= self.width || y >= self.height || z >= self.depth {
            engine_bail!("ogre::PixelBox", InvalidParams,
                "Pixel ({}, {}, {}) outside {:?}", x, y, z, self.extent());
        }
        let bpp = PixelUtil::num_elem_bytes(self.format);
        let index = (z as usize * self.height as usize + y as usize) * self.width as usize + x as usize;
        Ok(index * bpp)
    }

    pub fn colour_at(&self, x: u32, y: u32, z: u32) -> Result<Vec4> {
        let offset = self.pixel_offset(x, y, z)?;
        PixelUtil::unpack_colour(self.format, &self.data[offset..])
    }

    pub fn set_colour_at(&mut self, colour: Vec4, x: u32, y: u32, z: u32) -> Result<()> {
        let offset = self.pixel_offset(x, y, z)?;
        PixelUtil::pack_colour(colour, self.format, &mut self.data[offset..])
    }

    /// Copy converted to `format`
    pub fn converted(&self, format: PixelFormat) -> Result<PixelBox> {
        let mut dst = PixelBox::new(self.width, self.height, self.depth, format);
        PixelUtil::bulk_convert(self, &mut dst)?;
        Ok(dst)
    }
}

#[cfg(test)]
#[path = "pixel_format_tests.rs"]
mod tests;
