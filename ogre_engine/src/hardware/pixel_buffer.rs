/// Hardware pixel buffer: one surface of a texture (or a standalone image)

use std::sync::Arc;

use crate::engine_bail;
use crate::error::Result;
use crate::hardware::{HardwareBuffer, HardwareBufferKind, HardwareBufferUsage, PixelBox, PixelFormat, PixelUtil};
use crate::render_system::{GpuBuffer, HardwareBufferFactory};

/// Pixel storage with a fixed extent and format
#[derive(Debug)]
pub struct HardwarePixelBuffer {
    buffer: HardwareBuffer,
    width: u32,
    height: u32,
    depth: u32,
    format: PixelFormat,
}

impl HardwarePixelBuffer {
    /// Allocate a standalone pixel buffer
    pub fn new(
        factory: &dyn HardwareBufferFactory,
        width: u32,
        height: u32,
        depth: u32,
        format: PixelFormat,
        usage: HardwareBufferUsage,
    ) -> Result<Self> {
        let size = Self::checked_size(width, height, depth, format)?;
        let buffer = HardwareBuffer::new(factory, HardwareBufferKind::Pixel, 1, size, usage, false)?;
        Ok(Self { buffer, width, height, depth: depth.max(1), format })
    }

    /// Wrap a texture surface
    pub fn from_surface(
        surface: Arc<dyn GpuBuffer>,
        width: u32,
        height: u32,
        depth: u32,
        format: PixelFormat,
        usage: HardwareBufferUsage,
    ) -> Result<Self> {
        let size = Self::checked_size(width, height, depth, format)?;
        let buffer = HardwareBuffer::from_gpu_buffer(surface, HardwareBufferKind::Pixel, 1, size, usage, false)?;
        Ok(Self { buffer, width, height, depth: depth.max(1), format })
    }

    fn checked_size(width: u32, height: u32, depth: u32, format: PixelFormat) -> Result<usize> {
        if width == 0 || height == 0 || format == PixelFormat::Unknown {
            engine_bail!("ogre::HardwarePixelBuffer", InvalidParams,
                "Invalid pixel buffer {}x{}x{} of format {:?}", width, height, depth, format);
        }
        Ok(PixelUtil::memory_size(width, height, depth, format))
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn depth(&self) -> u32 {
        self.depth
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }

    /// Underlying byte buffer
    pub fn buffer(&self) -> &HardwareBuffer {
        &self.buffer
    }

    /// Upload `src`, converting to the buffer's format
    pub fn blit_from_memory(&self, src: &PixelBox) -> Result<()> {
        let mut staging = PixelBox::new(self.width, self.height, self.depth, self.format);
        PixelUtil::bulk_convert(src, &mut staging)?;
        self.buffer.write_data(0, &staging.data, true)
    }

    /// Download into `dst`, converting to `dst.format`
    pub fn blit_to_memory(&self, dst: &mut PixelBox) -> Result<()> {
        let mut staging = PixelBox::new(self.width, self.height, self.depth, self.format);
        // Surfaces are read back by the GPU, so bypass the write-only guard
        self.buffer.read_raw(0, &mut staging.data)?;
        PixelUtil::bulk_convert(&staging, dst)
    }

    /// Download in the buffer's own format
    pub fn read_image(&self) -> Result<PixelBox> {
        let mut image = PixelBox::new(self.width, self.height, self.depth, self.format);
        self.blit_to_memory(&mut image)?;
        Ok(image)
    }
}
