/// Render target: a surface the pipeline draws into.
///
/// Windows are presented with `swap_buffers` at the end of the frame;
/// texture targets own the GPU texture they render into. Viewports are kept
/// ordered by z-order and rendered lowest first.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::engine_bail;
use crate::error::Result;
use crate::hardware::PixelFormat;
use crate::render_system::{GpuTexture, Rect2D};
use super::viewport::Viewport;

const SOURCE: &str = "ogre::RenderTarget";

/// Default update priority of render textures (rendered before windows)
pub const RENDER_TEXTURE_PRIORITY: u8 = 2;

/// Default update priority of windows
pub const RENDER_WINDOW_PRIORITY: u8 = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderTargetKind {
    Window,
    Texture,
}

/// Counters of the last rendered frame
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameStats {
    /// Frames rendered since creation
    pub frame_count: u64,
    /// Draw calls issued during the last frame
    pub batch_count: usize,
}

#[derive(Debug)]
pub struct RenderTarget {
    name: String,
    kind: RenderTargetKind,
    width: u32,
    height: u32,
    format: PixelFormat,
    fsaa: u32,
    hw_gamma: bool,
    active: bool,
    auto_updated: bool,
    priority: u8,
    viewports: BTreeMap<i32, Viewport>,
    texture: Option<Arc<dyn GpuTexture>>,
    stats: FrameStats,
}

impl RenderTarget {
    pub(crate) fn window(name: &str, width: u32, height: u32, format: PixelFormat) -> Self {
        Self {
            name: name.to_string(),
            kind: RenderTargetKind::Window,
            width,
            height,
            format,
            fsaa: 0,
            hw_gamma: false,
            active: true,
            auto_updated: true,
            priority: RENDER_WINDOW_PRIORITY,
            viewports: BTreeMap::new(),
            texture: None,
            stats: FrameStats::default(),
        }
    }

    /// Target drawing into `texture`; named after the texture
    pub(crate) fn for_texture(texture: Arc<dyn GpuTexture>) -> Self {
        let desc = texture.desc();
        Self {
            name: desc.name.clone(),
            kind: RenderTargetKind::Texture,
            width: desc.width,
            height: desc.height,
            format: desc.format,
            fsaa: desc.fsaa,
            hw_gamma: desc.hw_gamma,
            active: true,
            auto_updated: true,
            priority: RENDER_TEXTURE_PRIORITY,
            viewports: BTreeMap::new(),
            texture: Some(texture),
            stats: FrameStats::default(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> RenderTargetKind {
        self.kind
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Whole-target rectangle in pixels
    pub fn rect(&self) -> Rect2D {
        Rect2D::new(0, 0, self.width, self.height)
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }

    pub fn fsaa(&self) -> u32 {
        self.fsaa
    }

    pub fn is_hardware_gamma_enabled(&self) -> bool {
        self.hw_gamma
    }

    /// Texture rendered into, for texture targets
    pub fn texture(&self) -> Option<&Arc<dyn GpuTexture>> {
        self.texture.as_ref()
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Inactive targets are skipped by frame updates
    pub fn set_active(&mut self, active: bool) {
        self.active = active;
    }

    pub fn is_auto_updated(&self) -> bool {
        self.auto_updated
    }

    /// Targets that are not auto-updated are only rendered on request
    pub fn set_auto_updated(&mut self, auto_updated: bool) {
        self.auto_updated = auto_updated;
    }

    pub fn priority(&self) -> u8 {
        self.priority
    }

    /// Lower priorities are rendered first within a frame
    pub fn set_priority(&mut self, priority: u8) {
        self.priority = priority;
    }

    pub fn stats(&self) -> FrameStats {
        self.stats
    }

    // ===== VIEWPORTS =====

    /// Add a viewport at `z_order`
    ///
    /// # Errors
    ///
    /// `DuplicateItem` when the z-order is taken.
    pub fn add_viewport(&mut self, z_order: i32, mut viewport: Viewport) -> Result<&mut Viewport> {
        if self.viewports.contains_key(&z_order) {
            engine_bail!(SOURCE, DuplicateItem,
                "Render target '{}' already has a viewport at z-order {}", self.name, z_order);
        }
        viewport.set_z_order(z_order);
        viewport.update_dimensions(self.width, self.height);
        Ok(self.viewports.entry(z_order).or_insert(viewport))
    }

    pub fn viewport(&self, z_order: i32) -> Option<&Viewport> {
        self.viewports.get(&z_order)
    }

    pub fn viewport_mut(&mut self, z_order: i32) -> Option<&mut Viewport> {
        self.viewports.get_mut(&z_order)
    }

    pub fn remove_viewport(&mut self, z_order: i32) -> Option<Viewport> {
        self.viewports.remove(&z_order)
    }

    /// Viewports, lowest z-order first
    pub fn viewports(&self) -> impl Iterator<Item = &Viewport> {
        self.viewports.values()
    }

    pub fn num_viewports(&self) -> usize {
        self.viewports.len()
    }

    // ===== INTERNAL =====

    pub(crate) fn set_size(&mut self, width: u32, height: u32) {
        self.width = width;
        self.height = height;
        for viewport in self.viewports.values_mut() {
            viewport.update_dimensions(width, height);
        }
    }

    pub(crate) fn set_texture(&mut self, texture: Arc<dyn GpuTexture>) {
        self.set_size(texture.desc().width, texture.desc().height);
        self.texture = Some(texture);
    }

    pub(crate) fn notify_frame_rendered(&mut self, batch_count: usize) {
        self.stats.frame_count += 1;
        self.stats.batch_count = batch_count;
    }
}
