/// Camera: a viewpoint with a projection, LOD bias and visibility mask.
///
/// Matrices and the frustum are derived on demand from the position,
/// orientation and projection parameters. Cameras are owned by a
/// `SceneManager`; viewports refer to them by name.

use glam::{Mat4, Quat, Vec3};
use crate::engine_bail;
use crate::error::Result;
use super::frustum::Frustum;

const SOURCE: &str = "ogre::Camera";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProjectionType {
    #[default]
    Perspective,
    Orthographic,
}

/// How transparent renderables are ordered back-to-front
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortMode {
    /// Squared distance to the camera position
    #[default]
    Distance,
    /// Depth along the view direction
    ViewDepth,
}

#[derive(Debug, Clone)]
pub struct Camera {
    name: String,
    position: Vec3,
    orientation: Quat,
    projection_type: ProjectionType,
    /// Vertical field of view, radians
    fov_y: f32,
    near: f32,
    far: f32,
    aspect_ratio: f32,
    auto_aspect_ratio: bool,
    /// Height of the orthographic window in world units
    ortho_height: f32,
    lod_bias: f32,
    visibility_mask: u32,
    sort_mode: SortMode,
    lod_camera: Option<String>,
}

impl Camera {
    /// Camera at the origin looking down -Z, 45° FOV, near 0.1, far 1000
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            position: Vec3::ZERO,
            orientation: Quat::IDENTITY,
            projection_type: ProjectionType::Perspective,
            fov_y: std::f32::consts::FRAC_PI_4,
            near: 0.1,
            far: 1000.0,
            aspect_ratio: 4.0 / 3.0,
            auto_aspect_ratio: true,
            ortho_height: 10.0,
            lod_bias: 1.0,
            visibility_mask: 0xFFFF_FFFF,
            sort_mode: SortMode::Distance,
            lod_camera: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    // ===== PLACEMENT =====

    pub fn position(&self) -> Vec3 {
        self.position
    }

    pub fn set_position(&mut self, position: Vec3) {
        self.position = position;
    }

    /// Move in world space
    pub fn translate(&mut self, delta: Vec3) {
        self.position += delta;
    }

    /// Move along the camera's own axes
    pub fn move_relative(&mut self, delta: Vec3) {
        self.position += self.orientation * delta;
    }

    pub fn orientation(&self) -> Quat {
        self.orientation
    }

    pub fn set_orientation(&mut self, orientation: Quat) {
        self.orientation = orientation.normalize();
    }

    pub fn direction(&self) -> Vec3 {
        self.orientation * Vec3::NEG_Z
    }

    pub fn up(&self) -> Vec3 {
        self.orientation * Vec3::Y
    }

    pub fn right(&self) -> Vec3 {
        self.orientation * Vec3::X
    }

    /// Point the camera along `direction`, keeping +Y up
    pub fn set_direction(&mut self, direction: Vec3) {
        let direction = direction.normalize_or_zero();
        if direction == Vec3::ZERO {
            return;
        }
        let up = if direction.cross(Vec3::Y).length_squared() < 1e-8 { Vec3::Z } else { Vec3::Y };
        let view = Mat4::look_to_rh(Vec3::ZERO, direction, up);
        self.orientation = Quat::from_mat4(&view.inverse()).normalize();
    }

    pub fn look_at(&mut self, target: Vec3) {
        self.set_direction(target - self.position);
    }

    pub fn yaw(&mut self, angle: f32) {
        self.orientation = (Quat::from_rotation_y(angle) * self.orientation).normalize();
    }

    pub fn pitch(&mut self, angle: f32) {
        self.orientation = (self.orientation * Quat::from_rotation_x(angle)).normalize();
    }

    pub fn roll(&mut self, angle: f32) {
        self.orientation = (self.orientation * Quat::from_rotation_z(angle)).normalize();
    }

    // ===== PROJECTION =====

    pub fn projection_type(&self) -> ProjectionType {
        self.projection_type
    }

    pub fn set_projection_type(&mut self, projection_type: ProjectionType) {
        self.projection_type = projection_type;
    }

    pub fn fov_y(&self) -> f32 {
        self.fov_y
    }

    pub fn set_fov_y(&mut self, radians: f32) -> Result<()> {
        if !(radians > 0.0 && radians < std::f32::consts::PI) {
            engine_bail!(SOURCE, InvalidParams, "Camera '{}': field of view {} out of (0, pi)", self.name, radians);
        }
        self.fov_y = radians;
        Ok(())
    }

    pub fn near_clip_distance(&self) -> f32 {
        self.near
    }

    pub fn set_near_clip_distance(&mut self, near: f32) -> Result<()> {
        if near <= 0.0 || near >= self.far {
            engine_bail!(SOURCE, InvalidParams,
                "Camera '{}': near clip distance {} must be in (0, far)", self.name, near);
        }
        self.near = near;
        Ok(())
    }

    pub fn far_clip_distance(&self) -> f32 {
        self.far
    }

    pub fn set_far_clip_distance(&mut self, far: f32) -> Result<()> {
        if far <= self.near {
            engine_bail!(SOURCE, InvalidParams,
                "Camera '{}': far clip distance {} must exceed near {}", self.name, far, self.near);
        }
        self.far = far;
        Ok(())
    }

    pub fn aspect_ratio(&self) -> f32 {
        self.aspect_ratio
    }

    pub fn set_aspect_ratio(&mut self, aspect_ratio: f32) {
        if aspect_ratio > 0.0 {
            self.aspect_ratio = aspect_ratio;
        }
    }

    /// Viewports update the aspect ratio on resize when enabled
    pub fn auto_aspect_ratio(&self) -> bool {
        self.auto_aspect_ratio
    }

    pub fn set_auto_aspect_ratio(&mut self, auto: bool) {
        self.auto_aspect_ratio = auto;
    }

    pub fn ortho_window_height(&self) -> f32 {
        self.ortho_height
    }

    pub fn set_ortho_window_height(&mut self, height: f32) {
        if height > 0.0 {
            self.ortho_height = height;
        }
    }

    // ===== DERIVED =====

    pub fn view_matrix(&self) -> Mat4 {
        Mat4::from_rotation_translation(self.orientation, self.position).inverse()
    }

    pub fn projection_matrix(&self) -> Mat4 {
        match self.projection_type {
            ProjectionType::Perspective => {
                Mat4::perspective_rh_gl(self.fov_y, self.aspect_ratio, self.near, self.far)
            }
            ProjectionType::Orthographic => {
                let half_h = self.ortho_height * 0.5;
                let half_w = half_h * self.aspect_ratio;
                Mat4::orthographic_rh_gl(-half_w, half_w, -half_h, half_h, self.near, self.far)
            }
        }
    }

    pub fn view_projection_matrix(&self) -> Mat4 {
        self.projection_matrix() * self.view_matrix()
    }

    pub fn frustum(&self) -> Frustum {
        Frustum::from_view_projection(&self.view_projection_matrix())
    }

    /// Depth of `point` along the view direction
    pub fn view_depth(&self, point: Vec3) -> f32 {
        (point - self.position).dot(self.direction())
    }

    pub fn squared_distance(&self, point: Vec3) -> f32 {
        self.position.distance_squared(point)
    }

    /// Sort key of `point` under the camera's sort mode (larger = further)
    pub fn sort_distance(&self, point: Vec3) -> f32 {
        match self.sort_mode {
            SortMode::Distance => self.squared_distance(point),
            SortMode::ViewDepth => self.view_depth(point),
        }
    }

    /// Approximate screen area in pixels covered by a sphere
    pub fn projected_pixel_count(&self, center: Vec3, radius: f32, viewport_height: f32) -> f32 {
        let pixel_radius = match self.projection_type {
            ProjectionType::Perspective => {
                let depth = self.view_depth(center).max(self.near);
                let focal = 1.0 / (self.fov_y * 0.5).tan();
                radius * focal / depth * viewport_height * 0.5
            }
            ProjectionType::Orthographic => radius / self.ortho_height * viewport_height,
        };
        std::f32::consts::PI * pixel_radius * pixel_radius
    }

    // ===== LOD / VISIBILITY =====

    pub fn lod_bias(&self) -> f32 {
        self.lod_bias
    }

    /// Values above 1 raise detail, below 1 lower it
    pub fn set_lod_bias(&mut self, bias: f32) -> Result<()> {
        if bias <= 0.0 {
            engine_bail!(SOURCE, InvalidParams, "Camera '{}': LOD bias must be positive, got {}", self.name, bias);
        }
        self.lod_bias = bias;
        Ok(())
    }

    pub fn lod_bias_inverse(&self) -> f32 {
        1.0 / self.lod_bias
    }

    pub fn visibility_mask(&self) -> u32 {
        self.visibility_mask
    }

    pub fn set_visibility_mask(&mut self, mask: u32) {
        self.visibility_mask = mask;
    }

    pub fn sort_mode(&self) -> SortMode {
        self.sort_mode
    }

    pub fn set_sort_mode(&mut self, mode: SortMode) {
        self.sort_mode = mode;
    }

    /// Camera whose position drives LOD selection instead of this one
    pub fn lod_camera(&self) -> Option<&str> {
        self.lod_camera.as_deref()
    }

    pub fn set_lod_camera(&mut self, camera: Option<&str>) {
        self.lod_camera = camera.map(str::to_string);
    }
}

#[cfg(test)]
#[path = "camera_tests.rs"]
mod tests;
