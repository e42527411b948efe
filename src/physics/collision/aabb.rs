use crate::math as m;

/// An axis-aligned bounding box.
///
/// `min` is expected to be less than or equal to `max` on every axis.
/// Boxes with zero extent on some axis are valid and have zero volume.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AABB {
    pub min: m::Vec3,
    pub max: m::Vec3,
}

impl AABB {
    #[inline]
    pub fn new(min: m::Vec3, max: m::Vec3) -> Self {
        debug_assert!(
            min.x <= max.x && min.y <= max.y && min.z <= max.z,
            "AABB min was greater than max"
        );
        Self { min, max }
    }

    #[inline]
    pub fn from_center_half_extents(center: m::Vec3, half_extents: m::Vec3) -> Self {
        Self {
            min: center - half_extents,
            max: center + half_extents,
        }
    }

    /// Smallest box containing both boxes.
    #[inline]
    pub fn union(&self, other: &AABB) -> AABB {
        AABB {
            min: self.min.min_by_component(other.min),
            max: self.max.max_by_component(other.max),
        }
    }

    /// The overlapping region of two boxes, if they overlap.
    ///
    /// Boxes that only touch on a face, edge or corner are considered overlapping.
    pub fn intersection(&self, other: &AABB) -> Option<AABB> {
        if self.intersects(other) {
            Some(AABB {
                min: self.min.max_by_component(other.min),
                max: self.max.min_by_component(other.max),
            })
        } else {
            None
        }
    }

    #[inline]
    pub fn intersects(&self, other: &AABB) -> bool {
        self.min.x <= other.max.x
            && self.max.x >= other.min.x
            && self.min.y <= other.max.y
            && self.max.y >= other.min.y
            && self.min.z <= other.max.z
            && self.max.z >= other.min.z
    }

    /// Check whether this box touches a sphere.
    pub fn intersects_sphere(&self, sphere: &Sphere) -> bool {
        let closest = sphere
            .center
            .max_by_component(self.min)
            .min_by_component(self.max);
        (closest - sphere.center).mag_sq() <= sphere.radius * sphere.radius
    }

    #[inline]
    pub fn contains_point(&self, p: m::Vec3) -> bool {
        p.x >= self.min.x
            && p.x <= self.max.x
            && p.y >= self.min.y
            && p.y <= self.max.y
            && p.z >= self.min.z
            && p.z <= self.max.z
    }

    /// Check whether the other box is completely inside this one.
    #[inline]
    pub fn contains(&self, other: &AABB) -> bool {
        self.contains_point(other.min) && self.contains_point(other.max)
    }

    #[inline]
    pub fn extents(&self) -> m::Vec3 {
        self.max - self.min
    }

    #[inline]
    pub fn center(&self) -> m::Vec3 {
        (self.min + self.max) * 0.5
    }

    #[inline]
    pub fn volume(&self) -> f64 {
        let e = self.extents();
        e.x * e.y * e.z
    }

    /// Grow the box by the given amount in every direction.
    #[inline]
    pub fn padded(&self, padding: f64) -> AABB {
        let pad = m::Vec3::broadcast(padding);
        AABB {
            min: self.min - pad,
            max: self.max + pad,
        }
    }
}

/// A sphere for region queries.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Sphere {
    pub center: m::Vec3,
    pub radius: f64,
}

/// A ray for ray queries.
#[derive(Clone, Copy, Debug)]
pub struct Ray {
    pub start: m::Vec3,
    pub dir: m::Unit<m::Vec3>,
}

impl Ray {
    #[inline]
    pub fn point_at_t(&self, t: f64) -> m::Vec3 {
        self.start + t * *self.dir
    }
}
