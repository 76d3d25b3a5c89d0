//! Camera module: viewpoints and frustum culling primitives.

mod camera;
mod frustum;

pub use camera::{Camera, ProjectionType, SortMode};
pub use frustum::{
    Frustum, FrustumTest,
    PLANE_LEFT, PLANE_RIGHT, PLANE_BOTTOM, PLANE_TOP, PLANE_NEAR, PLANE_FAR,
};
