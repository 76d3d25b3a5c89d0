/// Renderable: the unit submitted to the render queue.

use std::collections::BTreeMap;
use glam::{Mat4, Vec3, Vec4};

use crate::material::Material;
use crate::render_system::RenderOperation;
use crate::resource::ResourceRef;

/// Geometry, material and transforms of one draw
#[derive(Clone)]
pub struct Renderable {
    pub operation: RenderOperation,
    pub material: ResourceRef<Material>,
    /// One matrix, or a bone palette for skinned geometry
    pub world_transforms: Vec<Mat4>,
    /// Material LOD used to pick the technique
    pub lod_index: u16,
    /// Values read by `Custom(n)` auto-constants
    pub custom_params: BTreeMap<usize, Vec4>,
    /// A camera polygon mode may replace the pass polygon mode
    pub polygon_mode_overridable: bool,
    /// World-space points used for transparent sorting; empty means the
    /// world translation
    pub extremity_points: Vec<Vec3>,
    /// Draw with an identity view matrix (screen-space geometry)
    pub use_identity_view: bool,
    /// Draw with an identity projection matrix
    pub use_identity_projection: bool,
}

impl Renderable {
    pub fn new(operation: RenderOperation, material: ResourceRef<Material>, world: Mat4) -> Self {
        Self {
            operation,
            material,
            world_transforms: vec![world],
            lod_index: 0,
            custom_params: BTreeMap::new(),
            polygon_mode_overridable: true,
            extremity_points: Vec::new(),
            use_identity_view: false,
            use_identity_projection: false,
        }
    }

    pub fn world_transform(&self) -> Mat4 {
        self.world_transforms.first().copied().unwrap_or(Mat4::IDENTITY)
    }

    /// Nothing to draw: no vertices, or indexed without indices
    pub fn is_empty(&self) -> bool {
        self.operation.is_empty() || self.world_transforms.is_empty()
    }

    /// Sort distance: the smallest `metric` over the extremity points
    ///
    /// A large object sorts as its nearest point.
    pub fn sort_distance(&self, metric: impl Fn(Vec3) -> f32) -> f32 {
        if self.extremity_points.is_empty() {
            return metric(self.world_transform().w_axis.truncate());
        }
        self.extremity_points
            .iter()
            .map(|p| metric(*p))
            .fold(f32::INFINITY, f32::min)
    }
}
