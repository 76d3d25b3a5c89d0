/// Viewport: a camera's view into a rectangle of a render target.
///
/// The rectangle is given relative to the target (`0..1` on both axes) and
/// turned into pixels whenever the target size changes.

use glam::Vec4;

use crate::engine_bail;
use crate::error::Result;
use crate::render_system::{FrameBufferType, Rect2D, RenderSystem};
use crate::scene::{RenderSceneOptions, ALL_VISIBILITY_FLAGS};

const SOURCE: &str = "ogre::Viewport";

#[derive(Debug)]
pub struct Viewport {
    scene_manager: String,
    camera: String,
    z_order: i32,
    relative: [f32; 4],
    actual: Rect2D,
    pub clear_every_frame: bool,
    pub clear_buffers: FrameBufferType,
    pub background_colour: Vec4,
    pub depth_clear: f32,
    pub stencil_clear: u32,
    /// Material scheme, `None` for the active scheme
    pub material_scheme: Option<String>,
    pub visibility_mask: u32,
    pub overlays_enabled: bool,
}

impl Viewport {
    /// Viewport of `camera` in `scene_manager` covering
    /// (`left`, `top`, `width`, `height`) of its target
    ///
    /// # Errors
    ///
    /// `InvalidParams` when the rectangle leaves `0..1`.
    pub fn new(
        scene_manager: &str,
        camera: &str,
        left: f32,
        top: f32,
        width: f32,
        height: f32,
    ) -> Result<Self> {
        let in_range = |v: f32| (0.0..=1.0).contains(&v);
        if !(in_range(left) && in_range(top) && in_range(width) && in_range(height))
            || left + width > 1.0 + f32::EPSILON
            || top + height > 1.0 + f32::EPSILON
        {
            engine_bail!(SOURCE, InvalidParams,
                "Viewport of camera '{}' has rectangle ({}, {}, {}, {}) outside its target",
                camera, left, top, width, height);
        }
        Ok(Self::with_relative(scene_manager, camera, [left, top, width, height]))
    }

    /// Viewport covering its whole target
    pub fn full(scene_manager: &str, camera: &str) -> Self {
        Self::with_relative(scene_manager, camera, [0.0, 0.0, 1.0, 1.0])
    }

    fn with_relative(scene_manager: &str, camera: &str, relative: [f32; 4]) -> Self {
        Self {
            scene_manager: scene_manager.to_string(),
            camera: camera.to_string(),
            z_order: 0,
            relative,
            actual: Rect2D::new(0, 0, 0, 0),
            clear_every_frame: true,
            clear_buffers: FrameBufferType::default(),
            background_colour: Vec4::new(0.0, 0.0, 0.0, 1.0),
            depth_clear: 1.0,
            stencil_clear: 0,
            material_scheme: None,
            visibility_mask: ALL_VISIBILITY_FLAGS,
            overlays_enabled: true,
        }
    }

    pub fn scene_manager(&self) -> &str {
        &self.scene_manager
    }

    pub fn camera(&self) -> &str {
        &self.camera
    }

    pub fn set_camera(&mut self, scene_manager: &str, camera: &str) {
        self.scene_manager = scene_manager.to_string();
        self.camera = camera.to_string();
    }

    pub fn z_order(&self) -> i32 {
        self.z_order
    }

    /// (left, top, width, height) relative to the target
    pub fn relative_rect(&self) -> [f32; 4] {
        self.relative
    }

    /// Rectangle in pixels
    pub fn actual_rect(&self) -> Rect2D {
        self.actual
    }

    pub(crate) fn set_z_order(&mut self, z_order: i32) {
        self.z_order = z_order;
    }

    /// Recompute the pixel rectangle for a target of `width` x `height`
    pub(crate) fn update_dimensions(&mut self, width: u32, height: u32) {
        let [left, top, rel_width, rel_height] = self.relative;
        self.actual = Rect2D::new(
            (left * width as f32) as i32,
            (top * height as f32) as i32,
            (rel_width * width as f32) as u32,
            (rel_height * height as f32) as u32,
        );
    }

    /// Clear the viewport area with its own clear settings
    pub fn clear(&self, render_system: &mut dyn RenderSystem) {
        render_system.set_viewport(self.actual);
        render_system.clear_frame_buffer(
            self.clear_buffers,
            self.background_colour,
            self.depth_clear,
            self.stencil_clear,
        );
    }

    /// Options to render this viewport's scene with
    pub fn render_options(&self) -> RenderSceneOptions {
        let mut options = RenderSceneOptions::new(self.actual);
        options.material_scheme = self.material_scheme.clone();
        options.visibility_mask = self.visibility_mask;
        options
    }
}

#[cfg(test)]
#[path = "viewport_tests.rs"]
mod tests;
