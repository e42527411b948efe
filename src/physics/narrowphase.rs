//! Turning broad phase pairs into contact constraints.

use super::{
    collision::PairHandler,
    constraint::{contact::Contact, ContactManifoldConstraint, ContactParams},
    pool::Pool,
    Body, BodyKey, BodySet, ConstraintKey, Solver, Velocity,
};
use crate::math as m;

use std::collections::HashMap;

/// Computes contact points between two bodies.
///
/// Implemented for any `FnMut(&Body, &Body, &mut Vec<Contact>)` closure.
pub trait ContactGenerator {
    /// Append the contacts between `a` and `b` to `out`, if any.
    /// Normals must point from `a` towards `b`.
    fn generate(&mut self, a: &Body, b: &Body, out: &mut Vec<Contact>);
}

impl<F> ContactGenerator for F
where
    F: FnMut(&Body, &Body, &mut Vec<Contact>),
{
    #[inline]
    fn generate(&mut self, a: &Body, b: &Body, out: &mut Vec<Contact>) {
        self(a, b, out)
    }
}

/// A simple contact generator treating dynamic bodies as the sphere
/// inscribed in their bounding box and kinematic bodies as their bounding box.
///
/// Good enough for balls bouncing around in a box-shaped level.
#[derive(Clone, Copy, Debug, Default)]
pub struct BoundingSphereContacts;

impl BoundingSphereContacts {
    fn radius(body: &Body) -> f64 {
        let h = body.half_extents;
        h.x.min(h.y).min(h.z)
    }

    fn sphere_sphere(a: &Body, b: &Body, out: &mut Vec<Contact>) {
        let (ra, rb) = (Self::radius(a), Self::radius(b));
        let diff = b.pose.position - a.pose.position;
        let dist = diff.mag();
        let depth = ra + rb - dist;
        if depth < 0.0 {
            return;
        }
        let normal = *m::Unit::try_new_normalize(diff, m::Unit::unit_y());
        out.push(Contact {
            point: a.pose.position + normal * (ra - 0.5 * depth),
            normal,
            depth,
            feature_id: 0,
        });
    }

    /// Contact with the normal pointing from the box to the sphere.
    fn box_sphere(boxed: &Body, sphere: &Body) -> Option<Contact> {
        let r = Self::radius(sphere);
        let aabb = boxed.aabb();
        let center = sphere.pose.position;
        let closest = center.clamped(aabb.min, aabb.max);
        let diff = center - closest;
        let dist = diff.mag();
        if dist > r {
            return None;
        }
        if dist > m::DIRECTION_EPSILON {
            return Some(Contact {
                point: closest,
                normal: diff / dist,
                depth: r - dist,
                feature_id: 0,
            });
        }
        // center inside the box, push out through the nearest face
        let to_min = center - aabb.min;
        let to_max = aabb.max - center;
        let faces = [
            (to_min.x, -m::Vec3::unit_x()),
            (to_max.x, m::Vec3::unit_x()),
            (to_min.y, -m::Vec3::unit_y()),
            (to_max.y, m::Vec3::unit_y()),
            (to_min.z, -m::Vec3::unit_z()),
            (to_max.z, m::Vec3::unit_z()),
        ];
        let (face_dist, normal) = faces
            .iter()
            .copied()
            .fold((f64::MAX, m::Vec3::unit_y()), |best, face| {
                if face.0 < best.0 {
                    face
                } else {
                    best
                }
            });
        Some(Contact {
            point: center + normal * face_dist,
            normal,
            depth: r + face_dist,
            feature_id: 1,
        })
    }
}

impl ContactGenerator for BoundingSphereContacts {
    fn generate(&mut self, a: &Body, b: &Body, out: &mut Vec<Contact>) {
        match (a.is_kinematic(), b.is_kinematic()) {
            (false, false) => Self::sphere_sphere(a, b, out),
            (true, false) => out.extend(Self::box_sphere(a, b)),
            (false, true) => out.extend(Self::box_sphere(b, a).map(|c| Contact {
                normal: -c.normal,
                ..c
            })),
            (true, true) => {}
        }
    }
}

#[derive(Debug)]
struct PairState {
    constraint: Option<ConstraintKey>,
    last_seen: u64,
}

/// Keeps track of body pairs reported by the broad phase,
/// creating, updating and removing contact manifold constraints in the solver
/// as the pairs start and stop touching.
///
/// Pairs are stored with the lower [`BodyId`][super::BodyId] first,
/// and contact normals point from that body to the other.
#[derive(Debug)]
pub struct ContactManager {
    pairs: HashMap<(BodyKey, BodyKey), PairState>,
    candidates: Vec<(BodyKey, BodyKey)>,
    pool: Pool<ContactManifoldConstraint>,
    scratch: Vec<Contact>,
    step: u64,
    pub params: ContactParams,
}

impl Default for ContactManager {
    fn default() -> Self {
        Self::new(ContactParams::default())
    }
}

impl PairHandler<BodyKey> for ContactManager {
    #[inline]
    fn try_add_overlap(&mut self, a: BodyKey, b: BodyKey) {
        self.candidates.push((a, b));
    }
}

impl ContactManager {
    pub fn new(params: ContactParams) -> Self {
        Self {
            pairs: HashMap::new(),
            candidates: Vec::new(),
            pool: Pool::new(ContactManifoldConstraint::default),
            scratch: Vec::new(),
            step: 0,
            params,
        }
    }

    /// Number of pairs currently tracked, touching or not.
    #[inline]
    pub fn pair_count(&self) -> usize {
        self.pairs.len()
    }

    /// The manifold constraint of a touching pair, in either order.
    pub fn constraint_of(&self, a: BodyKey, b: BodyKey) -> Option<ConstraintKey> {
        self.pairs
            .get(&(a, b))
            .or_else(|| self.pairs.get(&(b, a)))
            .and_then(|p| p.constraint)
    }

    /// Run the narrow phase on every pair reported since the last call
    /// and sync the contact constraints in the solver with the results.
    pub fn process(
        &mut self,
        bodies: &BodySet,
        solver: &mut Solver,
        generator: &mut impl ContactGenerator,
    ) {
        let _span = tracy_span!("narrow phase", "process");

        self.step += 1;
        let candidates = std::mem::take(&mut self.candidates);
        let mut created = 0;
        let mut woken = 0;
        for &(a, b) in &candidates {
            let (body_a, body_b) = match (bodies.get(a), bodies.get(b)) {
                (Some(ba), Some(bb)) => (ba, bb),
                _ => continue,
            };
            if body_a.is_kinematic() && body_b.is_kinematic() {
                continue;
            }
            let (a, b, body_a, body_b) = if body_a.id() < body_b.id() {
                (a, b, body_a, body_b)
            } else {
                (b, a, body_b, body_a)
            };

            let state = self.pairs.entry((a, b)).or_insert(PairState {
                constraint: None,
                last_seen: 0,
            });
            state.last_seen = self.step;
            // sleeping pairs keep their contacts as they were,
            // unless a moving kinematic body is involved
            let islands = solver.islands();
            let awake = |key: BodyKey, body: &Body| {
                if body.is_kinematic() {
                    body.velocity() != Velocity::default()
                } else {
                    islands.is_body_active(key)
                }
            };
            let (awake_a, awake_b) = (awake(a, body_a), awake(b, body_b));
            if !awake_a && !awake_b {
                continue;
            }

            self.scratch.clear();
            generator.generate(body_a, body_b, &mut self.scratch);

            // something awake touching a sleeping body wakes its island
            if !self.scratch.is_empty() {
                for (key, body, is_awake) in [(a, body_a, awake_a), (b, body_b, awake_b)] {
                    if !is_awake && !body.is_kinematic() {
                        solver.islands_mut().activate(key);
                        woken += 1;
                    }
                }
            }

            match (state.constraint, self.scratch.is_empty()) {
                (Some(key), false) => match solver.get_as::<ContactManifoldConstraint>(key) {
                    Ok(Some(manifold)) => manifold.update_contacts(&self.scratch),
                    _ => state.constraint = None,
                },
                (Some(key), true) => {
                    state.constraint = None;
                    Self::release(&mut self.pool, solver, key);
                }
                (None, false) => {
                    let mut manifold = self.pool.acquire();
                    manifold.set_bodies(a, b, self.params);
                    manifold.update_contacts(&self.scratch);
                    match solver.add(Box::new(manifold), bodies) {
                        Ok(key) => {
                            state.constraint = Some(key);
                            created += 1;
                        }
                        Err(err) => log::warn!("Failed to add a contact constraint: {}", err),
                    }
                }
                (None, true) => {}
            }
        }
        self.candidates = candidates;
        self.candidates.clear();

        // pairs the broad phase didn't report anymore
        let step = self.step;
        let pool = &mut self.pool;
        let before = self.pairs.len();
        self.pairs.retain(|_, state| {
            if state.last_seen == step {
                return true;
            }
            if let Some(key) = state.constraint {
                Self::release(pool, solver, key);
            }
            false
        });
        log::trace!(
            "{} contact pairs, {} new manifolds, {} bodies woken, {} pairs separated",
            self.pairs.len(),
            created,
            woken,
            before - self.pairs.len()
        );
    }

    /// Drop every pair involving a body, removing their constraints from the solver.
    pub fn remove_body(&mut self, body: BodyKey, solver: &mut Solver) {
        let pool = &mut self.pool;
        self.pairs.retain(|(a, b), state| {
            if *a != body && *b != body {
                return true;
            }
            if let Some(key) = state.constraint {
                Self::release(pool, solver, key);
            }
            false
        });
    }

    pub fn clear(&mut self, solver: &mut Solver) {
        for (_, state) in self.pairs.drain() {
            if let Some(key) = state.constraint {
                Self::release(&mut self.pool, solver, key);
            }
        }
        self.candidates.clear();
    }

    fn release(pool: &mut Pool<ContactManifoldConstraint>, solver: &mut Solver, key: ConstraintKey) {
        if let Ok(mut removed) = solver.remove(key) {
            if let Some(manifold) = removed.as_any_mut().downcast_mut::<ContactManifoldConstraint>() {
                pool.release(std::mem::take(manifold));
            }
        }
    }
}
