//! Intersection queries for rays vs. bounding volumes.

use super::{Ray, AABB};

/// Find the distance along the ray where it enters the box, if it hits.
///
/// A ray starting inside the box hits at `t = 0`.
pub fn ray_aabb(ray: Ray, aabb: AABB) -> Option<f64> {
    let start = [ray.start.x, ray.start.y, ray.start.z];
    let dir = [ray.dir.x, ray.dir.y, ray.dir.z];
    let min = [aabb.min.x, aabb.min.y, aabb.min.z];
    let max = [aabb.max.x, aabb.max.y, aabb.max.z];

    let mut t_enter: f64 = 0.0;
    let mut t_exit = f64::INFINITY;
    for axis in 0..3 {
        if dir[axis] == 0.0 {
            // parallel to the slab, either always inside it or never
            if start[axis] < min[axis] || start[axis] > max[axis] {
                return None;
            }
            continue;
        }
        let inv_d = 1.0 / dir[axis];
        let t0 = (min[axis] - start[axis]) * inv_d;
        let t1 = (max[axis] - start[axis]) * inv_d;
        let (near, far) = if t0 <= t1 { (t0, t1) } else { (t1, t0) };
        t_enter = t_enter.max(near);
        t_exit = t_exit.min(far);
        if t_enter > t_exit {
            return None;
        }
    }
    Some(t_enter)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math as m;

    #[test]
    fn ray_hits_and_misses() {
        let aabb = AABB::new(m::Vec3::zero(), m::Vec3::broadcast(1.0));
        let hit = Ray {
            start: m::Vec3::new(-1.0, 0.5, 0.5),
            dir: m::Unit::unit_x(),
        };
        assert_eq!(ray_aabb(hit, aabb), Some(1.0));

        let miss = Ray {
            start: m::Vec3::new(-1.0, 2.0, 0.5),
            dir: m::Unit::unit_x(),
        };
        assert_eq!(ray_aabb(miss, aabb), None);

        let backwards = Ray {
            start: m::Vec3::new(-1.0, 0.5, 0.5),
            dir: -m::Unit::unit_x(),
        };
        assert_eq!(ray_aabb(backwards, aabb), None);

        let inside = Ray {
            start: m::Vec3::broadcast(0.5),
            dir: m::Unit::new_normalize(m::Vec3::new(1.0, 1.0, 0.0)),
        };
        assert_eq!(ray_aabb(inside, aabb), Some(0.0));
    }
}
