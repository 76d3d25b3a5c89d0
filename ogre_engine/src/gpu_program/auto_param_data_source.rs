/// Values the engine knows while drawing, read by auto-constants.
///
/// The scene manager updates the source as it walks the render queue:
/// camera and viewport per frame, lights per light list change, world
/// matrices and custom parameters per renderable. Derived matrices
/// (inverse world, world-view, world-view-projection, view-projection)
/// are computed on first read and cached until one of their inputs
/// changes.

use std::cell::Cell;
use std::collections::BTreeMap;
use glam::{Mat4, Vec2, Vec3, Vec4};

/// Light data seen by programs
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LightParams {
    /// World position, `w = 0` for directional lights (then xyz is the
    /// direction towards the light)
    pub position: Vec4,
    pub diffuse: Vec4,
}

impl Default for LightParams {
    /// Unlit placeholder used for missing light slots
    fn default() -> Self {
        Self { position: Vec4::new(0.0, 0.0, 1.0, 0.0), diffuse: Vec4::ZERO }
    }
}

#[derive(Debug, Default)]
pub struct AutoParamDataSource {
    world_matrices: Vec<Mat4>,
    view: Mat4,
    projection: Mat4,
    camera_position: Vec3,
    lights: Vec<LightParams>,
    ambient: Vec4,
    time: f32,
    viewport_size: Vec2,
    texel_offsets: Vec2,
    pass_number: u32,
    custom_params: BTreeMap<usize, Vec4>,

    inverse_world: Cell<Option<Mat4>>,
    world_view: Cell<Option<Mat4>>,
    world_view_proj: Cell<Option<Mat4>>,
    view_proj: Cell<Option<Mat4>>,
}

impl AutoParamDataSource {
    pub fn new() -> Self {
        Self {
            world_matrices: vec![Mat4::IDENTITY],
            view: Mat4::IDENTITY,
            projection: Mat4::IDENTITY,
            ..Default::default()
        }
    }

    // ===== SETTERS =====

    /// World matrix, or bone palette when more than one
    pub fn set_world_matrices(&mut self, matrices: &[Mat4]) {
        self.world_matrices.clear();
        if matrices.is_empty() {
            self.world_matrices.push(Mat4::IDENTITY);
        } else {
            self.world_matrices.extend_from_slice(matrices);
        }
        self.inverse_world.set(None);
        self.world_view.set(None);
        self.world_view_proj.set(None);
    }

    pub fn set_view_matrix(&mut self, view: Mat4) {
        self.view = view;
        self.world_view.set(None);
        self.world_view_proj.set(None);
        self.view_proj.set(None);
    }

    pub fn set_projection_matrix(&mut self, projection: Mat4) {
        self.projection = projection;
        self.world_view_proj.set(None);
        self.view_proj.set(None);
    }

    pub fn set_camera_position(&mut self, position: Vec3) {
        self.camera_position = position;
    }

    pub fn set_lights(&mut self, lights: Vec<LightParams>) {
        self.lights = lights;
    }

    pub fn set_ambient_light(&mut self, colour: Vec4) {
        self.ambient = colour;
    }

    pub fn set_time(&mut self, seconds: f32) {
        self.time = seconds;
    }

    pub fn set_viewport_size(&mut self, width: f32, height: f32) {
        self.viewport_size = Vec2::new(width, height);
    }

    pub fn set_texel_offsets(&mut self, horizontal: f32, vertical: f32) {
        self.texel_offsets = Vec2::new(horizontal, vertical);
    }

    pub fn set_pass_number(&mut self, pass: u32) {
        self.pass_number = pass;
    }

    pub fn set_custom_params(&mut self, params: &BTreeMap<usize, Vec4>) {
        self.custom_params.clone_from(params);
    }

    // ===== GETTERS =====

    pub fn world_matrix(&self) -> Mat4 {
        self.world_matrices[0]
    }

    pub fn world_matrix_array(&self) -> &[Mat4] {
        &self.world_matrices
    }

    pub fn view_matrix(&self) -> Mat4 {
        self.view
    }

    pub fn projection_matrix(&self) -> Mat4 {
        self.projection
    }

    pub fn inverse_world_matrix(&self) -> Mat4 {
        cached(&self.inverse_world, || self.world_matrix().inverse())
    }

    pub fn world_view_matrix(&self) -> Mat4 {
        cached(&self.world_view, || self.view * self.world_matrix())
    }

    pub fn view_proj_matrix(&self) -> Mat4 {
        cached(&self.view_proj, || self.projection * self.view)
    }

    pub fn world_view_proj_matrix(&self) -> Mat4 {
        cached(&self.world_view_proj, || self.view_proj_matrix() * self.world_matrix())
    }

    pub fn camera_position(&self) -> Vec3 {
        self.camera_position
    }

    /// Light `index`, or an unlit placeholder past the end of the list
    pub fn light(&self, index: usize) -> LightParams {
        self.lights.get(index).copied().unwrap_or_default()
    }

    pub fn light_count(&self) -> usize {
        self.lights.len()
    }

    pub fn ambient_light(&self) -> Vec4 {
        self.ambient
    }

    pub fn time(&self) -> f32 {
        self.time
    }

    pub fn viewport_size(&self) -> Vec2 {
        self.viewport_size
    }

    pub fn texel_offsets(&self) -> Vec2 {
        self.texel_offsets
    }

    pub fn pass_number(&self) -> u32 {
        self.pass_number
    }

    pub fn custom_param(&self, index: usize) -> Option<Vec4> {
        self.custom_params.get(&index).copied()
    }
}

fn cached(cell: &Cell<Option<Mat4>>, compute: impl FnOnce() -> Mat4) -> Mat4 {
    if let Some(value) = cell.get() {
        return value;
    }
    let value = compute();
    cell.set(Some(value));
    value
}
