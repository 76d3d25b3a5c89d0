/// Axis-aligned bounding box
///
/// A box is either null (encloses nothing), finite, or infinite. Merging
/// with a null box is a no-op, merging with an infinite box yields an
/// infinite box, and transforming keeps null and infinite boxes as they are.

use glam::{Mat4, Vec3};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AABB {
    /// Minimum corner (x, y, z)
    pub min: Vec3,
    /// Maximum corner (x, y, z)
    pub max: Vec3,
}

impl AABB {
    /// Encloses nothing
    pub const NULL: AABB = AABB {
        min: Vec3::splat(f32::INFINITY),
        max: Vec3::splat(f32::NEG_INFINITY),
    };

    /// Encloses everything
    pub const INFINITE: AABB = AABB {
        min: Vec3::splat(f32::NEG_INFINITY),
        max: Vec3::splat(f32::INFINITY),
    };

    pub fn new(min: Vec3, max: Vec3) -> Self {
        Self { min: min.min(max), max: min.max(max) }
    }

    /// Box centered on `center` with the given half extents
    pub fn from_center_half_size(center: Vec3, half_size: Vec3) -> Self {
        let half_size = half_size.abs();
        Self { min: center - half_size, max: center + half_size }
    }

    /// Smallest box enclosing every point (null for no points)
    pub fn from_points<I: IntoIterator<Item = Vec3>>(points: I) -> Self {
        points.into_iter().fold(AABB::NULL, |mut aabb, p| {
            aabb.merge_point(p);
            aabb
        })
    }

    pub fn is_null(&self) -> bool {
        self.min.x > self.max.x || self.min.y > self.max.y || self.min.z > self.max.z
    }

    pub fn is_infinite(&self) -> bool {
        !self.is_null() && (!self.min.is_finite() || !self.max.is_finite())
    }

    pub fn is_finite(&self) -> bool {
        !self.is_null() && self.min.is_finite() && self.max.is_finite()
    }

    /// Grow to enclose `other`
    pub fn merge(&mut self, other: &AABB) {
        if other.is_null() {
            return;
        }
        self.min = self.min.min(other.min);
        self.max = self.max.max(other.max);
    }

    pub fn merge_point(&mut self, point: Vec3) {
        self.min = self.min.min(point);
        self.max = self.max.max(point);
    }

    /// Transform by a matrix, returning the enclosing world box
    ///
    /// Uses the Arvo method: projects each matrix axis onto the box extents
    /// for a tight result without transforming all 8 corners.
    pub fn transformed(&self, matrix: &Mat4) -> AABB {
        if !self.is_finite() {
            return *self;
        }
        let translation = matrix.col(3).truncate();
        let mut new_min = translation;
        let mut new_max = translation;

        for i in 0..3 {
            let axis = matrix.col(i).truncate();
            let a = axis * self.min[i];
            let b = axis * self.max[i];
            new_min += a.min(b);
            new_max += a.max(b);
        }

        AABB { min: new_min, max: new_max }
    }

    /// `other` lies entirely within `self`
    pub fn contains(&self, other: &AABB) -> bool {
        if other.is_null() || self.is_infinite() {
            return !self.is_null();
        }
        self.min.x <= other.min.x && self.max.x >= other.max.x
        && self.min.y <= other.min.y && self.max.y >= other.max.y
        && self.min.z <= other.min.z && self.max.z >= other.max.z
    }

    pub fn contains_point(&self, point: Vec3) -> bool {
        point.cmpge(self.min).all() && point.cmple(self.max).all()
    }

    /// Boxes overlap or touch
    pub fn intersects(&self, other: &AABB) -> bool {
        if self.is_null() || other.is_null() {
            return false;
        }
        self.min.x <= other.max.x && self.max.x >= other.min.x
        && self.min.y <= other.max.y && self.max.y >= other.min.y
        && self.min.z <= other.max.z && self.max.z >= other.min.z
    }

    pub fn center(&self) -> Vec3 {
        if self.is_finite() { (self.min + self.max) * 0.5 } else { Vec3::ZERO }
    }

    pub fn half_size(&self) -> Vec3 {
        if self.is_null() {
            Vec3::ZERO
        } else {
            (self.max - self.min) * 0.5
        }
    }

    /// Radius of the enclosing sphere around the center
    pub fn radius(&self) -> f32 {
        self.half_size().length()
    }

    /// The eight corners (min/max selected per axis by the index bits)
    pub fn corners(&self) -> [Vec3; 8] {
        std::array::from_fn(|i| {
            Vec3::new(
                if i & 1 == 0 { self.min.x } else { self.max.x },
                if i & 2 == 0 { self.min.y } else { self.max.y },
                if i & 4 == 0 { self.min.z } else { self.max.z },
            )
        })
    }

    /// Squared distance from `point` to the box (0 inside)
    pub fn squared_distance(&self, point: Vec3) -> f32 {
        if self.is_null() {
            return f32::INFINITY;
        }
        let clamped = point.clamp(self.min, self.max);
        point.distance_squared(clamped)
    }
}

impl Default for AABB {
    fn default() -> Self {
        Self::NULL
    }
}

#[cfg(test)]
#[path = "aabb_tests.rs"]
mod tests;
