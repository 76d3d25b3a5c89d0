/// Movables with explicit geometry: `SimpleRenderable` and the
/// screen-space `Rectangle2D` used by compositor quad passes.

use std::collections::BTreeMap;
use std::sync::Arc;
use glam::Vec4;

use crate::error::Result;
use crate::hardware::{
    HardwareBuffer, HardwareBufferManager, HardwareBufferUsage, VertexBufferBinding, VertexData,
    VertexDeclaration, VertexElementSemantic, VertexElementType,
};
use crate::material::Material;
use crate::render_queue::{RenderQueue, Renderable};
use crate::render_system::{OperationType, RenderOperation};
use crate::resource::ResourceRef;
use super::aabb::AABB;
use super::movable_object::{MovableObject, MovableObjectBase, MovableRenderContext};

// ============================================================================
// SimpleRenderable
// ============================================================================

/// One render operation with one material
pub struct SimpleRenderable {
    base: MovableObjectBase,
    operation: RenderOperation,
    material: ResourceRef<Material>,
    bounds: AABB,
    custom_params: BTreeMap<usize, Vec4>,
}

impl SimpleRenderable {
    pub fn new(
        name: &str,
        operation: RenderOperation,
        material: ResourceRef<Material>,
        bounds: AABB,
    ) -> Self {
        Self {
            base: MovableObjectBase::new(name),
            operation,
            material,
            bounds,
            custom_params: BTreeMap::new(),
        }
    }

    pub fn operation(&self) -> &RenderOperation {
        &self.operation
    }

    pub fn set_operation(&mut self, operation: RenderOperation) {
        self.operation = operation;
    }

    pub fn material(&self) -> &ResourceRef<Material> {
        &self.material
    }

    pub fn set_material(&mut self, material: ResourceRef<Material>) {
        self.material = material;
    }

    pub fn set_bounding_box(&mut self, bounds: AABB) {
        self.bounds = bounds;
    }

    pub fn set_custom_parameter(&mut self, index: usize, value: Vec4) {
        self.custom_params.insert(index, value);
    }
}

impl MovableObject for SimpleRenderable {
    fn base(&self) -> &MovableObjectBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut MovableObjectBase {
        &mut self.base
    }

    fn movable_type(&self) -> &'static str {
        "SimpleRenderable"
    }

    fn bounding_box(&self) -> AABB {
        self.bounds
    }

    fn bounding_radius(&self) -> f32 {
        if self.bounds.is_finite() { self.bounds.radius() } else { 0.0 }
    }

    fn update_render_queue(&mut self, ctx: &MovableRenderContext, queue: &mut RenderQueue) {
        let mut renderable = Renderable::new(self.operation.clone(), self.material.clone(), ctx.world_transform);
        renderable.custom_params = self.custom_params.clone();
        queue.add_renderable(renderable, self.base.render_queue_group, self.base.render_queue_priority);
    }
}

// ============================================================================
// Rectangle2D
// ============================================================================

const RECT_VERTEX_FLOATS: usize = 5;

/// Screen-space quad drawn with identity view and projection
///
/// Corners are in normalised device coordinates (`-1..1`, y up).
pub struct Rectangle2D {
    base: MovableObjectBase,
    buffer: Arc<HardwareBuffer>,
    operation: RenderOperation,
    material: Option<ResourceRef<Material>>,
}

impl Rectangle2D {
    /// Full-screen quad
    pub fn new(name: &str, buffers: &HardwareBufferManager) -> Result<Self> {
        let mut declaration = VertexDeclaration::new();
        declaration.add_element(0, 0, VertexElementType::Float3, VertexElementSemantic::Position, 0)?;
        declaration.add_element(0, 12, VertexElementType::Float2, VertexElementSemantic::TexCoords, 0)?;
        let buffer = buffers.create_vertex_buffer(
            RECT_VERTEX_FLOATS * 4,
            4,
            HardwareBufferUsage::STATIC_WRITE_ONLY,
            true,
        )?;
        let mut binding = VertexBufferBinding::new();
        binding.set_binding(0, buffer.clone());
        let vertex_data = Arc::new(VertexData::new(declaration, binding, 4));
        let mut rectangle = Self {
            base: MovableObjectBase::new(name),
            buffer,
            operation: RenderOperation::new(vertex_data, OperationType::TriangleStrip),
            material: None,
        };
        rectangle.set_corners(-1.0, 1.0, 1.0, -1.0)?;
        Ok(rectangle)
    }

    /// Place the quad; texture coordinates always span `0..1`
    pub fn set_corners(&mut self, left: f32, top: f32, right: f32, bottom: f32) -> Result<()> {
        #[rustfmt::skip]
        let vertices: [f32; RECT_VERTEX_FLOATS * 4] = [
            left,  top,    -1.0,  0.0, 0.0,
            left,  bottom, -1.0,  0.0, 1.0,
            right, top,    -1.0,  1.0, 0.0,
            right, bottom, -1.0,  1.0, 1.0,
        ];
        self.buffer.write_data(0, bytemuck::cast_slice(&vertices), false)
    }

    pub fn operation(&self) -> &RenderOperation {
        &self.operation
    }

    pub fn set_material(&mut self, material: ResourceRef<Material>) {
        self.material = Some(material);
    }

    /// Renderable for `material` covering the quad
    pub fn renderable(&self, material: &ResourceRef<Material>) -> Renderable {
        let mut renderable = Renderable::new(self.operation.clone(), material.clone(), glam::Mat4::IDENTITY);
        renderable.use_identity_view = true;
        renderable.use_identity_projection = true;
        renderable.polygon_mode_overridable = false;
        renderable
    }
}

impl MovableObject for Rectangle2D {
    fn base(&self) -> &MovableObjectBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut MovableObjectBase {
        &mut self.base
    }

    fn movable_type(&self) -> &'static str {
        "Rectangle2D"
    }

    /// Always on screen
    fn bounding_box(&self) -> AABB {
        AABB::INFINITE
    }

    fn bounding_radius(&self) -> f32 {
        0.0
    }

    fn update_render_queue(&mut self, _ctx: &MovableRenderContext, queue: &mut RenderQueue) {
        let Some(material) = &self.material else { return };
        let renderable = self.renderable(material);
        queue.add_renderable(renderable, self.base.render_queue_group, self.base.render_queue_priority);
    }
}
