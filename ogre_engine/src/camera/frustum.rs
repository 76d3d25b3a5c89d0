/// Frustum: six clipping planes for visibility culling.
///
/// Each plane is a Vec4 (A, B, C, D) with an inward-pointing unit normal
/// (A, B, C). A point P is inside when `dot(plane, P_homogeneous) >= 0`
/// for all six planes.

use glam::{Mat4, Vec3, Vec4};
use crate::scene::AABB;

/// Result of a 3-way frustum/box classification
///
/// Drives hierarchical culling:
/// - `Outside`: prune the whole subtree
/// - `Inside`: emit every descendant without further tests
/// - `Partial`: test children individually
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrustumTest {
    Outside,
    Inside,
    Partial,
}

/// Frustum plane indices
pub const PLANE_LEFT: usize = 0;
pub const PLANE_RIGHT: usize = 1;
pub const PLANE_BOTTOM: usize = 2;
pub const PLANE_TOP: usize = 3;
pub const PLANE_NEAR: usize = 4;
pub const PLANE_FAR: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Frustum {
    /// Left, right, bottom, top, near, far
    pub planes: [Vec4; 6],
}

impl Frustum {
    /// Extract the planes of a view-projection matrix (Gribb & Hartmann)
    ///
    /// Expects the OpenGL clip convention (-w <= z <= w), which is what
    /// [`Camera`](super::Camera) builds.
    pub fn from_view_projection(vp: &Mat4) -> Self {
        let r0 = vp.row(0);
        let r1 = vp.row(1);
        let r2 = vp.row(2);
        let r3 = vp.row(3);

        let mut planes = [r3 + r0, r3 - r0, r3 + r1, r3 - r1, r3 + r2, r3 - r2];
        for plane in &mut planes {
            let normal_len = plane.truncate().length();
            if normal_len > 0.0 {
                *plane /= normal_len;
            }
        }

        Self { planes }
    }

    /// Signed distance of `point` to plane `index` (positive inside)
    pub fn plane_distance(&self, index: usize, point: Vec3) -> f32 {
        let plane = self.planes[index];
        plane.truncate().dot(point) + plane.w
    }

    pub fn contains_point(&self, point: Vec3) -> bool {
        (0..6).all(|i| self.plane_distance(i, point) >= 0.0)
    }

    /// Conservative sphere test (never a false negative)
    pub fn intersects_sphere(&self, center: Vec3, radius: f32) -> bool {
        (0..6).all(|i| self.plane_distance(i, center) >= -radius)
    }

    /// Conservative box test (never a false negative)
    pub fn intersects_aabb(&self, aabb: &AABB) -> bool {
        self.classify_aabb(aabb) != FrustumTest::Outside
    }

    /// Classify a box against the frustum
    ///
    /// The positive vertex (corner furthest along the normal) outside any
    /// plane means `Outside`; the negative vertex outside any plane means
    /// the box straddles it. Null boxes are `Outside`, infinite boxes
    /// `Partial`.
    pub fn classify_aabb(&self, aabb: &AABB) -> FrustumTest {
        if aabb.is_null() {
            return FrustumTest::Outside;
        }
        if aabb.is_infinite() {
            return FrustumTest::Partial;
        }

        let mut all_inside = true;
        for plane in &self.planes {
            let normal = plane.truncate();
            let positive = Vec3::select(normal.cmpge(Vec3::ZERO), aabb.max, aabb.min);
            if normal.dot(positive) + plane.w < 0.0 {
                return FrustumTest::Outside;
            }

            let negative = Vec3::select(normal.cmpge(Vec3::ZERO), aabb.min, aabb.max);
            if normal.dot(negative) + plane.w < 0.0 {
                all_inside = false;
            }
        }

        if all_inside { FrustumTest::Inside } else { FrustumTest::Partial }
    }
}

#[cfg(test)]
#[path = "frustum_tests.rs"]
mod tests;
