/// Texture resource
///
/// A texture keeps its creation descriptor and, until it is loaded, the
/// source images (one per face). Loading asks the render system for the
/// GPU texture, uploads the images and fills missing mip levels with a
/// box filter unless the hardware generates them.

use std::str::FromStr;
use std::sync::Arc;

use crate::engine_bail;
use crate::error::Result;
use crate::hardware::{HardwareBufferUsage, HardwarePixelBuffer, PixelBox, PixelFormat, PixelUtil};
use crate::render_system::{
    lock_render_system, Capabilities, GpuTexture, SharedRenderSystem, TextureDesc, TextureType,
    TextureUsage,
};
use crate::resource::{
    ManualResourceLoader, NameValuePairList, ResourceData, ResourceInfo, ResourceManager,
    ResourceRef,
};

const SOURCE: &str = "ogre::Texture";

/// What textures need to reach the GPU
pub struct TextureContext {
    render_system: SharedRenderSystem,
}

impl TextureContext {
    pub fn new(render_system: SharedRenderSystem) -> Self {
        Self { render_system }
    }

    pub fn render_system(&self) -> &SharedRenderSystem {
        &self.render_system
    }
}

pub struct Texture {
    desc: TextureDesc,
    /// Top-level image per face, kept until unload
    images: Vec<PixelBox>,
    gpu: Option<Arc<dyn GpuTexture>>,
}

// ============================================================================
// Creation parameters
// ============================================================================

fn parse_param<T: FromStr>(params: &NameValuePairList, key: &str, name: &str) -> Result<Option<T>> {
    match params.get(key) {
        None => Ok(None),
        Some(value) => match value.trim().parse() {
            Ok(parsed) => Ok(Some(parsed)),
            Err(_) => {
                engine_bail!(SOURCE, InvalidParams,
                    "Texture '{}': invalid value '{}' for '{}'", name, value, key);
            }
        },
    }
}

fn parse_texture_type(value: &str) -> Option<TextureType> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1d" => Some(TextureType::Tex1D),
        "2d" => Some(TextureType::Tex2D),
        "3d" => Some(TextureType::Tex3D),
        "cubic" | "cube" => Some(TextureType::CubeMap),
        "2darray" => Some(TextureType::Tex2DArray),
        _ => None,
    }
}

impl Texture {
    /// Descriptor the GPU texture is (or will be) created with
    pub fn desc(&self) -> &TextureDesc {
        &self.desc
    }

    /// Change the descriptor; takes effect at the next load
    pub fn set_desc(&mut self, desc: TextureDesc) {
        self.desc = desc;
    }

    pub fn width(&self) -> u32 {
        self.desc.width
    }

    pub fn height(&self) -> u32 {
        self.desc.height
    }

    pub fn format(&self) -> PixelFormat {
        self.desc.format
    }

    pub fn num_mipmaps(&self) -> u32 {
        self.desc.num_mipmaps
    }

    pub fn face_count(&self) -> u32 {
        self.desc.texture_type.face_count()
    }

    /// Backend texture while loaded
    pub fn gpu_texture(&self) -> Option<&Arc<dyn GpuTexture>> {
        self.gpu.as_ref()
    }

    /// Provide the top-level image of every face; extent and format are
    /// taken from the images where the descriptor leaves them open
    pub fn set_images(&mut self, images: Vec<PixelBox>) -> Result<()> {
        let Some(first) = images.first() else {
            engine_bail!(SOURCE, InvalidParams, "Texture '{}': no images given", self.desc.name);
        };
        if images.iter().any(|i| i.extent() != first.extent()) {
            engine_bail!(SOURCE, InvalidParams,
                "Texture '{}': face images differ in extent", self.desc.name);
        }
        if images.len() as u32 != self.face_count() {
            engine_bail!(SOURCE, InvalidParams,
                "Texture '{}' needs {} face images, {} given",
                self.desc.name, self.face_count(), images.len());
        }
        if self.desc.width == 0 || self.desc.height == 0 {
            self.desc.width = first.width;
            self.desc.height = first.height;
            self.desc.depth = first.depth;
        }
        if self.desc.format == PixelFormat::Unknown {
            self.desc.format = first.format;
        }
        self.images = images;
        Ok(())
    }

    /// Single-face convenience for [`set_images`](Self::set_images)
    pub fn set_image(&mut self, image: PixelBox) -> Result<()> {
        self.set_images(vec![image])
    }

    /// Pixel storage of one face / mip level
    pub fn buffer(&self, face: u32, mip: u32) -> Result<HardwarePixelBuffer> {
        let Some(gpu) = &self.gpu else {
            engine_bail!(SOURCE, InvalidState, "Texture '{}' is not loaded", self.desc.name);
        };
        if face >= self.face_count() || mip > self.desc.num_mipmaps {
            engine_bail!(SOURCE, InvalidParams,
                "Texture '{}' has no face {} / mip {}", self.desc.name, face, mip);
        }
        let (w, h, d) = self.desc.mip_extent(mip);
        let usage = if self.desc.usage.contains(TextureUsage::DYNAMIC) {
            HardwareBufferUsage::DYNAMIC
        } else {
            HardwareBufferUsage::STATIC
        };
        HardwarePixelBuffer::from_surface(gpu.surface(face, mip)?, w, h, d, self.desc.format, usage)
    }

    /// Upload an image into one face / mip level, converting its format
    pub fn write_image(&self, face: u32, mip: u32, image: &PixelBox) -> Result<()> {
        self.buffer(face, mip)?.blit_from_memory(image)
    }

    /// Download one face / mip level in the texture's format
    pub fn read_image(&self, face: u32, mip: u32) -> Result<PixelBox> {
        self.buffer(face, mip)?.read_image()
    }

    fn validate_desc(&self) -> Result<()> {
        if self.desc.width == 0 || self.desc.height == 0 {
            engine_bail!(SOURCE, InvalidParams, "Texture '{}' has a zero extent", self.desc.name);
        }
        if self.desc.format == PixelFormat::Unknown {
            engine_bail!(SOURCE, InvalidParams, "Texture '{}' has no pixel format", self.desc.name);
        }
        Ok(())
    }

    /// Upload source images and fill the mip chain
    fn upload(&self, hardware_mipmaps: bool) -> Result<()> {
        for (face, image) in self.images.iter().enumerate() {
            let face = face as u32;
            self.write_image(face, 0, image)?;
            if hardware_mipmaps || self.desc.num_mipmaps == 0 {
                continue;
            }
            if !PixelUtil::is_accessible(image.format) {
                crate::engine_warn!(SOURCE,
                    "Texture '{}': cannot build mipmaps from {} data",
                    self.desc.name, image.format.description().name);
                continue;
            }
            let mut level = image.clone();
            for mip in 1..=self.desc.num_mipmaps {
                level = downsample(&level)?;
                self.write_image(face, mip, &level)?;
            }
        }
        Ok(())
    }
}

/// Half-size copy, each texel the average of its 2x2 (x2) source block
fn downsample(src: &PixelBox) -> Result<PixelBox> {
    let (w, h, d) = ((src.width / 2).max(1), (src.height / 2).max(1), (src.depth / 2).max(1));
    let mut dst = PixelBox::new(w, h, d, src.format);
    for z in 0..d {
        for y in 0..h {
            for x in 0..w {
                let mut sum = glam::Vec4::ZERO;
                let mut count = 0.0;
                for (dx, dy, dz) in [(0, 0, 0), (1, 0, 0), (0, 1, 0), (1, 1, 0), (0, 0, 1), (1, 0, 1), (0, 1, 1), (1, 1, 1)] {
                    let (sx, sy, sz) = (x * 2 + dx, y * 2 + dy, z * 2 + dz);
                    if sx < src.width && sy < src.height && sz < src.depth {
                        sum += src.colour_at(sx, sy, sz)?;
                        count += 1.0;
                    }
                }
                dst.set_colour_at(sum / count, x, y, z)?;
            }
        }
    }
    Ok(dst)
}

impl ResourceData for Texture {
    type Context = TextureContext;
    const RESOURCE_TYPE: &'static str = "Texture";
    const LOAD_ORDER: u32 = 75;

    /// Recognised parameters: `width`, `height`, `depth`, `num_mipmaps`,
    /// `format` (table name such as `RGBA8`), `type` (`1d`, `2d`, `3d`,
    /// `cubic`, `2darray`), `gamma` and `fsaa`
    fn create(info: &ResourceInfo, params: &NameValuePairList) -> Result<Self> {
        let name = info.name.as_str();
        let mut desc = TextureDesc::new_2d(name, 0, 0, PixelFormat::Unknown);
        if let Some(kind) = params.get("type") {
            let Some(texture_type) = parse_texture_type(kind) else {
                engine_bail!(SOURCE, InvalidParams, "Texture '{}': unknown type '{}'", name, kind);
            };
            desc.texture_type = texture_type;
        }
        if let Some(format) = params.get("format") {
            let Some(format) = PixelFormat::from_name(format) else {
                engine_bail!(SOURCE, InvalidParams, "Texture '{}': unknown format '{}'", name, format);
            };
            desc.format = format;
        }
        desc.width = parse_param(params, "width", name)?.unwrap_or(0);
        desc.height = parse_param(params, "height", name)?.unwrap_or(0);
        desc.depth = parse_param(params, "depth", name)?.unwrap_or(1);
        desc.num_mipmaps = parse_param(params, "num_mipmaps", name)?.unwrap_or(0);
        desc.hw_gamma = parse_param(params, "gamma", name)?.unwrap_or(false);
        desc.fsaa = parse_param(params, "fsaa", name)?.unwrap_or(0);
        Ok(Self { desc, images: Vec::new(), gpu: None })
    }

    fn load(&mut self, info: &ResourceInfo, ctx: &TextureContext) -> Result<()> {
        self.desc.name = info.name.clone();
        self.validate_desc()?;

        let (gpu, hardware_mipmaps) = {
            let mut rs = lock_render_system(&ctx.render_system)?;
            let caps = rs.capabilities();
            if !caps.has(Capabilities::NON_POWER_OF_2_TEXTURES)
                && !(self.desc.width.is_power_of_two() && self.desc.height.is_power_of_two())
            {
                crate::engine_warn!(SOURCE, "Texture '{}' is {}x{}; the render system prefers powers of two",
                    info.name, self.desc.width, self.desc.height);
            }
            let hardware_mipmaps = self.desc.usage.contains(TextureUsage::AUTOMIPMAP)
                && caps.has(Capabilities::AUTOMIPMAP);
            (rs.create_texture(&self.desc)?, hardware_mipmaps)
        };
        self.gpu = Some(gpu);

        if let Err(e) = self.upload(hardware_mipmaps) {
            self.gpu = None;
            return Err(e);
        }
        Ok(())
    }

    fn unload(&mut self, info: &ResourceInfo, _ctx: &TextureContext) {
        self.gpu = None;
        // Manual textures keep their images; file textures read them again
        if !info.is_manual {
            self.images.clear();
        }
    }

    fn calculate_size(&self) -> usize {
        let faces = self.face_count() as usize;
        let gpu = match self.gpu {
            Some(_) => (0..=self.desc.num_mipmaps)
                .map(|mip| {
                    let (w, h, d) = self.desc.mip_extent(mip);
                    PixelUtil::memory_size(w, h, d, self.desc.format)
                })
                .sum::<usize>() * faces,
            None => 0,
        };
        gpu + self.images.iter().map(|i| i.data.len()).sum::<usize>()
    }
}

// ============================================================================
// Manager
// ============================================================================

pub type TextureManager = ResourceManager<Texture>;

impl ResourceManager<Texture> {
    /// Create a texture built in code (render targets, procedural content)
    ///
    /// Without a loader the texture is loaded immediately, empty.
    pub fn create_manual(
        &self,
        group: &str,
        desc: TextureDesc,
        loader: Option<Arc<dyn ManualResourceLoader<Texture>>>,
    ) -> Result<ResourceRef<Texture>> {
        let has_loader = loader.is_some();
        let name = desc.name.clone();
        let texture = self.create(&name, group, true, loader, None)?;
        if let Some(resource) = texture.upgrade() {
            resource.data()?.set_desc(desc);
        }
        if !has_loader {
            self.load(&texture)?;
        }
        Ok(texture)
    }
}

#[cfg(test)]
#[path = "texture_tests.rs"]
mod tests;
