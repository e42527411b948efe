use super::{collision::AABB, Material, Velocity};
use crate::math as m;

use parking_lot::{Mutex, MutexGuard};
use thunderdome as td;

/// Stable identifier of a body, unique for the lifetime of a [`BodySet`][self::BodySet].
///
/// Unlike keys, ids are never reused, and they're what determines
/// the order in which the solver locks bodies.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BodyId(u64);

/// Key type to look up a body stored in a [`BodySet`][self::BodySet].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct BodyKey(pub(crate) td::Index);

impl BodyKey {
    /// Get the underlying [`thunderdome::Index`][thunderdome::Index] of this key.
    /// Useful for creating your own mappings from bodies to other things.
    #[inline]
    pub fn index(&self) -> td::Index {
        self.0
    }
}

/// A body is something that moves, typically a physics-enabled rigid body.
///
/// The shape of the body is not known to the physics core.
/// Its extent is described with a bounding box around the center of mass,
/// and contacts come from a user-supplied narrow phase.
#[derive(Debug)]
pub struct Body {
    id: BodyId,
    pub pose: m::Pose,
    pub mass: Mass,
    /// Inverse moment of inertia around the principal axes in body space.
    pub inv_inertia_local: m::Vec3,
    /// Half extents of the world-space bounding box around `pose.position`.
    pub half_extents: m::Vec3,
    pub material: Material,
    // locked by the solver while a constraint touching this body is being processed
    velocity: Mutex<Velocity>,
}

impl Body {
    /// A dynamic body with the given mass and the inertia of a solid box
    /// filling its bounding box.
    pub fn new_dynamic_box(half_extents: m::Vec3, mass: f64) -> Self {
        let size = half_extents * 2.0;
        let sq = size * size;
        let k = mass / 12.0;
        let inertia = m::Vec3::new(k * (sq.y + sq.z), k * (sq.x + sq.z), k * (sq.x + sq.y));
        Self::new_dynamic(half_extents, mass, inertia)
    }

    /// A dynamic body with explicit mass and principal moments of inertia.
    pub fn new_dynamic(half_extents: m::Vec3, mass: f64, inertia: m::Vec3) -> Self {
        let inv = |i: f64| if i > 0.0 { 1.0 / i } else { 0.0 };
        Self {
            id: BodyId(0),
            pose: m::Pose::default(),
            mass: Mass::from(mass),
            inv_inertia_local: m::Vec3::new(inv(inertia.x), inv(inertia.y), inv(inertia.z)),
            half_extents,
            material: Material::default(),
            velocity: Mutex::new(Velocity::default()),
        }
    }

    /// Kinematic bodies are not affected by collision forces.
    /// With zero velocity they act as static geometry.
    pub fn new_kinematic(half_extents: m::Vec3) -> Self {
        Self {
            id: BodyId(0),
            pose: m::Pose::default(),
            mass: Mass::Infinite,
            inv_inertia_local: m::Vec3::zero(),
            half_extents,
            material: Material::default(),
            velocity: Mutex::new(Velocity::default()),
        }
    }

    pub fn with_pose(mut self, pose: m::Pose) -> Self {
        self.pose = pose;
        self
    }

    pub fn with_position(mut self, position: m::Vec3) -> Self {
        self.pose.position = position;
        self
    }

    /// Set the velocity of the body in a builder-like chain.
    pub fn with_velocity(mut self, vel: Velocity) -> Self {
        *self.velocity.get_mut() = vel;
        self
    }

    pub fn with_material(mut self, material: Material) -> Self {
        self.material = material;
        self
    }

    #[inline]
    pub fn id(&self) -> BodyId {
        self.id
    }

    #[inline]
    pub fn is_kinematic(&self) -> bool {
        matches!(self.mass, Mass::Infinite)
    }

    /// Read the current velocity.
    ///
    /// This briefly takes the body's lock, so it blocks while the solver
    /// is processing a constraint involving this body.
    #[inline]
    pub fn velocity(&self) -> Velocity {
        *self.velocity.lock()
    }

    /// Access the velocity without locking, which exclusive access makes unnecessary.
    #[inline]
    pub fn velocity_mut(&mut self) -> &mut Velocity {
        self.velocity.get_mut()
    }

    /// Inverse inertia tensor in world space at the current orientation.
    pub fn inv_inertia_world(&self) -> m::Mat3 {
        m::rotate_tensor(self.pose.rotation, m::diagonal(self.inv_inertia_local))
    }

    /// World-space bounding box of the body.
    #[inline]
    pub fn aabb(&self) -> AABB {
        AABB::from_center_half_extents(self.pose.position, self.half_extents)
    }
}

/// Mass of a body, which can be infinite.
///
/// This stores both a mass value and its inverse, because calculating inverse mass
/// is expensive and needed a lot in physics calculations.
#[derive(Clone, Copy, Debug)]
pub enum Mass {
    Finite { mass: f64, inverse: f64 },
    Infinite,
}

impl From<f64> for Mass {
    #[inline]
    fn from(mass: f64) -> Self {
        Mass::Finite {
            mass,
            inverse: 1.0 / mass,
        }
    }
}

impl Mass {
    /// Get the inverse of the mass, which is zero if the mass is infinite.
    #[inline]
    pub fn inv(&self) -> f64 {
        match self {
            Mass::Finite { inverse, .. } => *inverse,
            Mass::Infinite => 0.0,
        }
    }
}

//
// Body storage
//

/// Storage for the bodies in a physics world.
#[derive(Debug, Default)]
pub struct BodySet {
    bodies: td::Arena<Body>,
    next_id: u64,
}

impl BodySet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a body, assigning it a fresh id.
    pub fn insert(&mut self, mut body: Body) -> BodyKey {
        body.id = BodyId(self.next_id);
        self.next_id += 1;
        BodyKey(self.bodies.insert(body))
    }

    /// Remove a body from the set, returning it if it still existed.
    #[inline]
    pub fn remove(&mut self, key: BodyKey) -> Option<Body> {
        self.bodies.remove(key.0)
    }

    /// Access a body, if it still exists.
    #[inline]
    pub fn get(&self, key: BodyKey) -> Option<&Body> {
        self.bodies.get(key.0)
    }

    /// Mutably access a body, if it still exists.
    #[inline]
    pub fn get_mut(&mut self, key: BodyKey) -> Option<&mut Body> {
        self.bodies.get_mut(key.0)
    }

    #[inline]
    pub fn contains(&self, key: BodyKey) -> bool {
        self.bodies.contains(key.0)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.bodies.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.bodies.is_empty()
    }

    pub fn iter(&self) -> impl '_ + Iterator<Item = (BodyKey, &Body)> {
        self.bodies.iter().map(|(k, b)| (BodyKey(k), b))
    }

    pub fn iter_mut(&mut self) -> impl '_ + Iterator<Item = (BodyKey, &mut Body)> {
        self.bodies.iter_mut().map(|(k, b)| (BodyKey(k), b))
    }

    pub fn clear(&mut self) {
        self.bodies.clear();
    }

    /// Sort keys into locking order (ascending body id) and remove duplicates.
    /// Keys to bodies that don't exist are dropped.
    pub fn sort_for_locking(&self, keys: &mut Vec<BodyKey>) {
        keys.retain(|k| self.contains(*k));
        keys.sort_by_key(|k| self.bodies[k.0].id);
        keys.dedup();
    }

    /// Lock the velocities of every non-kinematic body in `keys`, blocking until all are acquired.
    ///
    /// `keys` must be in the order given by [`sort_for_locking`][Self::sort_for_locking].
    /// Every caller locking in the same global order is what prevents deadlocks.
    pub fn lock_bodies(&self, keys: &[BodyKey]) -> BodyLocks<'_> {
        debug_assert!(self.is_lock_ordered(keys), "Bodies were locked out of order");
        let mut locks = BodyLocks {
            entries: Vec::with_capacity(keys.len()),
        };
        for &key in keys {
            if let Some(body) = self.bodies.get(key.0) {
                if !body.is_kinematic() {
                    locks.entries.push((key, body.velocity.lock()));
                }
            }
        }
        locks
    }

    /// Like [`lock_bodies`][Self::lock_bodies], but gives up instead of blocking
    /// if any of the bodies is already locked. Nothing stays locked on failure.
    pub fn try_lock_bodies(&self, keys: &[BodyKey]) -> Option<BodyLocks<'_>> {
        debug_assert!(self.is_lock_ordered(keys), "Bodies were locked out of order");
        let mut locks = BodyLocks {
            entries: Vec::with_capacity(keys.len()),
        };
        for &key in keys {
            if let Some(body) = self.bodies.get(key.0) {
                if !body.is_kinematic() {
                    // on failure `locks` drops here, releasing what we got so far
                    locks.entries.push((key, body.velocity.try_lock()?));
                }
            }
        }
        Some(locks)
    }

    fn is_lock_ordered(&self, keys: &[BodyKey]) -> bool {
        keys.windows(2).all(|w| match (self.get(w[0]), self.get(w[1])) {
            (Some(a), Some(b)) => a.id < b.id,
            _ => true,
        })
    }
}

/// Exclusive access to the velocities of a set of bodies,
/// held while a single constraint is being processed.
///
/// Locks are released in reverse acquisition order when this is dropped.
/// Kinematic bodies are never locked and don't appear here.
pub struct BodyLocks<'a> {
    entries: Vec<(BodyKey, MutexGuard<'a, Velocity>)>,
}

impl<'a> BodyLocks<'a> {
    /// The velocity of a locked body, or `None` if it's kinematic or wasn't locked.
    #[inline]
    pub fn velocity_mut(&mut self, key: BodyKey) -> Option<&mut Velocity> {
        self.entries
            .iter_mut()
            .find(|(k, _)| *k == key)
            .map(|(_, guard)| &mut **guard)
    }

    /// Number of bodies actually locked.
    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<'a> Drop for BodyLocks<'a> {
    fn drop(&mut self) {
        while let Some(entry) = self.entries.pop() {
            drop(entry);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit_box() -> Body {
        Body::new_dynamic_box(m::Vec3::broadcast(0.5), 1.0)
    }

    #[test]
    fn ids_are_unique_and_ordered() {
        let mut set = BodySet::new();
        let a = set.insert(unit_box());
        let b = set.insert(unit_box());
        set.remove(a);
        let c = set.insert(unit_box());
        let ids: Vec<BodyId> = [b, c].iter().map(|k| set.get(*k).unwrap().id()).collect();
        assert!(ids[0] < ids[1]);
        // the freed slot may be reused but the old key stays dead
        assert!(set.get(a).is_none());
    }

    #[test]
    fn locking_order() {
        let mut set = BodySet::new();
        let keys: Vec<BodyKey> = (0..5).map(|_| set.insert(unit_box())).collect();
        let ground = set.insert(Body::new_kinematic(m::Vec3::broadcast(10.0)));

        let mut involved = vec![keys[3], ground, keys[1], keys[3], keys[0]];
        set.sort_for_locking(&mut involved);
        assert_eq!(involved, vec![keys[0], keys[1], keys[3], ground]);

        let mut locks = set.lock_bodies(&involved);
        // kinematic bodies are never locked
        assert_eq!(locks.len(), 3);
        assert!(locks.velocity_mut(ground).is_none());
        locks
            .velocity_mut(keys[1])
            .expect("body wasn't locked")
            .linear = m::Vec3::unit_x();

        // already held, so trying fails without keeping anything locked
        assert!(set.try_lock_bodies(&[keys[1], keys[2]]).is_none());
        assert!(set.try_lock_bodies(&[keys[2]]).is_some());
        drop(locks);

        assert!(set.try_lock_bodies(&involved).is_some());
        assert_eq!(set.get(keys[1]).unwrap().velocity().linear, m::Vec3::unit_x());
    }

    #[test]
    fn box_inertia() {
        let body = Body::new_dynamic_box(m::Vec3::new(1.0, 0.5, 0.5), 12.0);
        // I_x = m/12 * (h^2 + d^2) = 1 * (1 + 1)
        assert!((body.inv_inertia_local.x - 0.5).abs() < 1e-12);
        assert!((body.inv_inertia_local.y - 0.2).abs() < 1e-12);
        assert_eq!(body.mass.inv(), 1.0 / 12.0);
        assert_eq!(Body::new_kinematic(m::Vec3::one()).mass.inv(), 0.0);
    }
}
