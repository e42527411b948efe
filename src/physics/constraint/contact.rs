//! Constraints keeping touching bodies from moving into each other.

use super::{with_pair_velocities, BodyTerms, Jacobian, SolverSettings, SolverUpdateable};
use crate::{
    math as m,
    physics::{pool::Recycle, BodyKey, BodyLocks, BodySet, MaterialBlending, Velocity},
};

/// Maximum number of contact points kept between one pair of bodies.
pub const MAX_MANIFOLD_POINTS: usize = 4;

/// A point of contact between two bodies, produced by a narrow phase.
#[derive(Clone, Copy, Debug)]
pub struct Contact {
    /// World-space contact point.
    pub point: m::Vec3,
    /// Direction from the first body to the second.
    /// Needn't be normalized. A zero vector is replaced with +Y.
    pub normal: m::Vec3,
    /// How far the bodies overlap along the normal, positive when penetrating.
    pub depth: f64,
    /// Identifies which features of the shapes generated this point,
    /// used to carry impulses over between steps.
    pub feature_id: u32,
}

impl Default for Contact {
    fn default() -> Self {
        Self {
            point: m::Vec3::zero(),
            normal: m::Vec3::unit_y(),
            depth: 0.0,
            feature_id: 0,
        }
    }
}

/// Tuning for how contacts resolve penetration and bounce.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde-types", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde-types", serde(default))]
pub struct ContactParams {
    /// Penetration depth that is left alone, to keep resting contacts from jittering.
    pub allowed_penetration: f64,
    /// Fraction of the remaining penetration corrected per second, scaled by 1 / dt.
    pub correction_factor: f64,
    /// Upper limit of the separating speed used to correct penetration.
    pub max_correction_speed: f64,
    /// Closing speed needed before restitution does anything.
    pub bounce_velocity_threshold: f64,
    pub blending: MaterialBlending,
}

impl Default for ContactParams {
    fn default() -> Self {
        Self {
            allowed_penetration: 0.01,
            correction_factor: 0.2,
            max_correction_speed: 2.0,
            bounce_velocity_threshold: 1.0,
            blending: MaterialBlending::default(),
        }
    }
}

impl ContactParams {
    pub fn with_allowed_penetration(mut self, depth: f64) -> Self {
        self.allowed_penetration = depth;
        self
    }

    pub fn with_correction_factor(mut self, factor: f64) -> Self {
        self.correction_factor = factor;
        self
    }

    pub fn with_max_correction_speed(mut self, speed: f64) -> Self {
        self.max_correction_speed = speed;
        self
    }

    pub fn with_bounce_velocity_threshold(mut self, speed: f64) -> Self {
        self.bounce_velocity_threshold = speed;
        self
    }

    pub fn with_blending(mut self, blending: MaterialBlending) -> Self {
        self.blending = blending;
        self
    }

    /// Target separating velocity given the depth and the closing velocity at prestep.
    fn bias(&self, depth: f64, normal_vel: f64, restitution: f64, dt: f64) -> f64 {
        let correction = if dt > 0.0 {
            ((depth - self.allowed_penetration).max(0.0) * self.correction_factor / dt)
                .min(self.max_correction_speed)
        } else {
            0.0
        };
        let closing_speed = -normal_vel;
        let bounce = if closing_speed > self.bounce_velocity_threshold {
            restitution * closing_speed
        } else {
            0.0
        };
        correction.max(bounce)
    }
}

//
// Penetration
//

#[derive(Clone, Copy, Debug)]
struct Prestep {
    a: BodyTerms,
    b: BodyTerms,
    jacobian: Jacobian,
    bias: f64,
}

/// Pushes two bodies apart along the contact normal.
/// The accumulated impulse never goes negative, so contacts only push.
#[derive(Clone, Debug)]
pub struct PenetrationConstraint {
    bodies: Vec<BodyKey>,
    pub contact: Contact,
    pub params: ContactParams,
    /// Overrides the blended restitution of the bodies' materials if set.
    pub restitution: Option<f64>,
    accumulated_impulse: f64,
    prestep: Option<Prestep>,
    settings: SolverSettings,
}

impl Default for PenetrationConstraint {
    fn default() -> Self {
        Self {
            bodies: Vec::with_capacity(2),
            contact: Contact::default(),
            params: ContactParams::default(),
            restitution: None,
            accumulated_impulse: 0.0,
            prestep: None,
            settings: SolverSettings::default(),
        }
    }
}

impl PenetrationConstraint {
    pub fn new(a: BodyKey, b: BodyKey, contact: Contact, params: ContactParams) -> Self {
        let mut c = Self::default();
        c.bodies.extend([a, b]);
        c.contact = contact;
        c.params = params;
        c
    }

    #[inline]
    pub fn accumulated_impulse(&self) -> f64 {
        self.accumulated_impulse
    }

    /// The normal actually used by the solver.
    #[inline]
    fn normal(&self) -> m::Unit<m::Vec3> {
        m::Unit::try_new_normalize(self.contact.normal, m::Unit::unit_y())
    }

    fn prestep_with(&mut self, dt: f64, a: BodyTerms, b: BodyTerms, restitution: f64) {
        let normal = *self.normal();
        let jacobian = Jacobian::new(
            normal,
            self.contact.point - a.position,
            self.contact.point - b.position,
            &a,
            &b,
        );
        let normal_vel = jacobian.relative_velocity(&a.velocity, &b.velocity);
        let bias = self
            .params
            .bias(self.contact.depth, normal_vel, restitution, dt);
        self.prestep = Some(Prestep {
            a,
            b,
            jacobian,
            bias,
        });
    }

    fn warm_start_velocities(&self, va: &mut Velocity, vb: &mut Velocity) {
        if let Some(pre) = &self.prestep {
            pre.jacobian.apply(self.accumulated_impulse, va, vb);
        }
    }

    fn solve_velocities(&mut self, va: &mut Velocity, vb: &mut Velocity) -> f64 {
        let pre = match &self.prestep {
            Some(pre) if pre.jacobian.effective_mass > 0.0 => pre,
            _ => return 0.0,
        };
        let normal_vel = pre.jacobian.relative_velocity(va, vb);
        let delta = (pre.bias - normal_vel) * pre.jacobian.effective_mass;
        let new_total = (self.accumulated_impulse + delta).max(0.0);
        let applied = new_total - self.accumulated_impulse;
        self.accumulated_impulse = new_total;
        pre.jacobian.apply(applied, va, vb);
        applied.abs()
    }

    fn terms(&self) -> Option<(BodyTerms, BodyTerms)> {
        self.prestep.as_ref().map(|pre| (pre.a, pre.b))
    }
}

impl SolverUpdateable for PenetrationConstraint {
    fn involved_bodies(&self) -> &[BodyKey] {
        &self.bodies
    }

    fn settings(&self) -> &SolverSettings {
        &self.settings
    }

    fn settings_mut(&mut self) -> &mut SolverSettings {
        &mut self.settings
    }

    fn update(&mut self, dt: f64, bodies: &BodySet) {
        let (a, b) = match read_pair(&self.bodies, bodies) {
            Some(pair) => pair,
            None => {
                self.prestep = None;
                return;
            }
        };
        let restitution = self.restitution.unwrap_or_else(|| {
            blended(bodies, &self.bodies, |ma, mb| self.params.blending.restitution(ma, mb))
        });
        self.prestep_with(dt, a, b, restitution);
    }

    fn exclusive_update(&mut self, locks: &mut BodyLocks<'_>) {
        if let Some((a, b)) = self.terms() {
            with_pair_velocities(locks, &a, &b, |va, vb| self.warm_start_velocities(va, vb));
        }
    }

    fn solve_iteration(&mut self, locks: &mut BodyLocks<'_>) -> f64 {
        match self.terms() {
            Some((a, b)) => with_pair_velocities(locks, &a, &b, |va, vb| self.solve_velocities(va, vb)),
            None => 0.0,
        }
    }

    fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
        self
    }
}

impl Recycle for PenetrationConstraint {
    fn reset(&mut self) {
        self.bodies.clear();
        self.contact = Contact::default();
        self.params = ContactParams::default();
        self.restitution = None;
        self.accumulated_impulse = 0.0;
        self.prestep = None;
        self.settings = SolverSettings::default();
    }
}

//
// Friction
//

/// Resists sliding along the contact surface in two tangent directions,
/// limited by the normal impulse of the same contact point.
#[derive(Clone, Copy, Debug, Default)]
pub struct FrictionConstraint {
    accumulated_impulse: [f64; 2],
    tangents: Option<[Jacobian; 2]>,
}

impl FrictionConstraint {
    #[inline]
    pub fn accumulated_impulse(&self) -> [f64; 2] {
        self.accumulated_impulse
    }

    fn prestep_with(&mut self, normal: m::Unit<m::Vec3>, point: m::Vec3, a: &BodyTerms, b: &BodyTerms) {
        let t1 = m::any_perpendicular(normal);
        let t2 = normal.cross(*t1);
        let (offset_a, offset_b) = (point - a.position, point - b.position);
        self.tangents = Some([
            Jacobian::new(*t1, offset_a, offset_b, a, b),
            Jacobian::new(t2, offset_a, offset_b, a, b),
        ]);
    }

    fn warm_start_velocities(&self, va: &mut Velocity, vb: &mut Velocity) {
        if let Some(tangents) = &self.tangents {
            for (jac, impulse) in tangents.iter().zip(self.accumulated_impulse) {
                jac.apply(impulse, va, vb);
            }
        }
    }

    fn solve_velocities(&mut self, max_impulse: f64, va: &mut Velocity, vb: &mut Velocity) -> f64 {
        let tangents = match &self.tangents {
            Some(t) => t,
            None => return 0.0,
        };
        let mut total = 0.0;
        for (jac, accumulated) in tangents.iter().zip(&mut self.accumulated_impulse) {
            if jac.effective_mass <= 0.0 {
                continue;
            }
            let delta = -jac.relative_velocity(va, vb) * jac.effective_mass;
            let new_total = (*accumulated + delta).clamp(-max_impulse, max_impulse);
            let applied = new_total - *accumulated;
            *accumulated = new_total;
            jac.apply(applied, va, vb);
            total += applied.abs();
        }
        total
    }
}

//
// Manifold
//

/// One contact point of a manifold.
#[derive(Clone, Debug, Default)]
pub struct ContactPoint {
    pub penetration: PenetrationConstraint,
    pub friction: FrictionConstraint,
}

/// All contacts between one pair of bodies, solved together.
///
/// Kept alive for as long as the pair keeps touching and updated in place
/// with [`update_contacts`][Self::update_contacts], so impulses from the
/// previous step are available for warm starting.
#[derive(Clone, Debug, Default)]
pub struct ContactManifoldConstraint {
    bodies: Vec<BodyKey>,
    points: Vec<ContactPoint>,
    pub params: ContactParams,
    friction: f64,
    settings: SolverSettings,
}

impl ContactManifoldConstraint {
    pub fn new(a: BodyKey, b: BodyKey, params: ContactParams) -> Self {
        let mut c = Self::default();
        c.set_bodies(a, b, params);
        c
    }

    /// Set up a fresh (or recycled) manifold for a body pair.
    pub fn set_bodies(&mut self, a: BodyKey, b: BodyKey, params: ContactParams) {
        self.bodies.clear();
        self.bodies.extend([a, b]);
        self.params = params;
    }

    /// Replace the contact points, keeping the accumulated impulses
    /// of points whose feature id matches a previous point.
    /// Only the deepest [`MAX_MANIFOLD_POINTS`] contacts are kept.
    pub fn update_contacts(&mut self, contacts: &[Contact]) {
        let mut incoming: Vec<Contact> = contacts.to_vec();
        if incoming.len() > MAX_MANIFOLD_POINTS {
            incoming.sort_by(|c1, c2| c2.depth.total_cmp(&c1.depth));
            incoming.truncate(MAX_MANIFOLD_POINTS);
        }

        let mut old = std::mem::take(&mut self.points);
        for contact in incoming {
            let point = match old
                .iter()
                .position(|p| p.penetration.contact.feature_id == contact.feature_id)
            {
                Some(idx) => {
                    let mut p = old.swap_remove(idx);
                    p.penetration.contact = contact;
                    p
                }
                None => {
                    let mut p = ContactPoint::default();
                    p.penetration.bodies.extend(self.bodies.iter().copied());
                    p.penetration.contact = contact;
                    p
                }
            };
            self.points.push(point);
        }
        for p in &mut self.points {
            p.penetration.params = self.params;
        }
    }

    #[inline]
    pub fn points(&self) -> &[ContactPoint] {
        &self.points
    }

    /// Sum of the normal impulses of every point.
    pub fn total_normal_impulse(&self) -> f64 {
        self.points
            .iter()
            .map(|p| p.penetration.accumulated_impulse)
            .sum()
    }

    fn terms(&self) -> Option<(BodyTerms, BodyTerms)> {
        self.points.first().and_then(|p| p.penetration.terms())
    }
}

impl SolverUpdateable for ContactManifoldConstraint {
    fn involved_bodies(&self) -> &[BodyKey] {
        &self.bodies
    }

    fn settings(&self) -> &SolverSettings {
        &self.settings
    }

    fn settings_mut(&mut self) -> &mut SolverSettings {
        &mut self.settings
    }

    fn update(&mut self, dt: f64, bodies: &BodySet) {
        let (a, b) = match read_pair(&self.bodies, bodies) {
            Some(pair) => pair,
            None => {
                for p in &mut self.points {
                    p.penetration.prestep = None;
                }
                return;
            }
        };
        let blending = self.params.blending;
        self.friction = blended(bodies, &self.bodies, |ma, mb| blending.friction(ma, mb));
        let restitution = blended(bodies, &self.bodies, |ma, mb| blending.restitution(ma, mb));
        for p in &mut self.points {
            let r = p.penetration.restitution.unwrap_or(restitution);
            p.penetration.prestep_with(dt, a, b, r);
            p.friction
                .prestep_with(p.penetration.normal(), p.penetration.contact.point, &a, &b);
        }
    }

    fn exclusive_update(&mut self, locks: &mut BodyLocks<'_>) {
        let (a, b) = match self.terms() {
            Some(t) => t,
            None => return,
        };
        let points = &self.points;
        with_pair_velocities(locks, &a, &b, |va, vb| {
            for p in points {
                p.penetration.warm_start_velocities(va, vb);
                p.friction.warm_start_velocities(va, vb);
            }
        });
    }

    fn solve_iteration(&mut self, locks: &mut BodyLocks<'_>) -> f64 {
        let (a, b) = match self.terms() {
            Some(t) => t,
            None => return 0.0,
        };
        let friction = self.friction;
        let points = &mut self.points;
        with_pair_velocities(locks, &a, &b, |va, vb| {
            let mut total = 0.0;
            for p in points.iter_mut() {
                total += p.penetration.solve_velocities(va, vb);
                let max_friction = friction * p.penetration.accumulated_impulse;
                total += p.friction.solve_velocities(max_friction, va, vb);
            }
            total
        })
    }

    fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
        self
    }
}

impl Recycle for ContactManifoldConstraint {
    fn reset(&mut self) {
        self.bodies.clear();
        self.points.clear();
        self.params = ContactParams::default();
        self.friction = 0.0;
        self.settings = SolverSettings::default();
    }
}

fn read_pair(keys: &[BodyKey], bodies: &BodySet) -> Option<(BodyTerms, BodyTerms)> {
    match keys {
        [a, b] => Some((
            BodyTerms::read(bodies, *a).unwrap_or_else(|| BodyTerms::fixed(*a)),
            BodyTerms::read(bodies, *b).unwrap_or_else(|| BodyTerms::fixed(*b)),
        )),
        _ => None,
    }
}

fn blended(
    bodies: &BodySet,
    keys: &[BodyKey],
    blend: impl Fn(&crate::physics::Material, &crate::physics::Material) -> f64,
) -> f64 {
    match keys {
        [a, b] => match (bodies.get(*a), bodies.get(*b)) {
            (Some(a), Some(b)) => blend(&a.material, &b.material),
            _ => 0.0,
        },
        _ => 0.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::physics::Body;

    fn resting_pair(penetration: f64) -> (BodySet, BodyKey, BodyKey, Contact) {
        let mut bodies = BodySet::new();
        let ground = bodies.insert(
            Body::new_kinematic(m::Vec3::new(10.0, 0.5, 10.0)).with_position(m::Vec3::new(0.0, -0.5, 0.0)),
        );
        let ball = bodies.insert(
            Body::new_dynamic_box(m::Vec3::broadcast(0.5), 1.0)
                .with_position(m::Vec3::new(0.0, 0.5 - penetration, 0.0)),
        );
        let contact = Contact {
            point: m::Vec3::new(0.0, -penetration, 0.0),
            normal: m::Vec3::unit_y(),
            depth: penetration,
            feature_id: 0,
        };
        (bodies, ground, ball, contact)
    }

    fn apply_gravity(bodies: &mut BodySet, key: BodyKey, dt: f64) {
        bodies.get_mut(key).unwrap().velocity_mut().linear.y -= 9.81 * dt;
    }

    #[test]
    fn resting_contact_converges() {
        let dt = 1.0 / 60.0;
        // within the allowed depth so the target separating velocity is zero
        let (mut bodies, ground, ball, contact) = resting_pair(0.005);
        let mut constraint = PenetrationConstraint::new(ground, ball, contact, ContactParams::default());
        let keys = {
            let mut k = constraint.involved_bodies().to_vec();
            bodies.sort_for_locking(&mut k);
            k
        };

        for _ in 0..10 {
            apply_gravity(&mut bodies, ball, dt);
            constraint.update(dt, &bodies);
            let mut locks = bodies.lock_bodies(&keys);
            constraint.exclusive_update(&mut locks);
            for _ in 0..8 {
                constraint.solve_iteration(&mut locks);
                assert!(constraint.accumulated_impulse() >= 0.0);
            }
        }
        let vel = bodies.get(ball).unwrap().velocity();
        assert!(vel.linear.y.abs() < 1e-9, "ball still moving: {:?}", vel.linear);
        // the impulse holds up the weight of the ball over one step
        assert!((constraint.accumulated_impulse() - 9.81 * dt).abs() < 1e-6);
        // kinematic ground is never touched
        assert_eq!(bodies.get(ground).unwrap().velocity().linear, m::Vec3::zero());
    }

    #[test]
    fn contacts_never_pull() {
        let dt = 1.0 / 60.0;
        let (mut bodies, ground, ball, contact) = resting_pair(0.0);
        bodies.get_mut(ball).unwrap().velocity_mut().linear = m::Vec3::unit_y() * 3.0;
        let mut constraint = PenetrationConstraint::new(ground, ball, contact, ContactParams::default());
        let keys = [ground, ball];
        constraint.update(dt, &bodies);
        let mut locks = bodies.lock_bodies(&keys);
        constraint.exclusive_update(&mut locks);
        assert_eq!(constraint.solve_iteration(&mut locks), 0.0);
        assert_eq!(constraint.accumulated_impulse(), 0.0);
        drop(locks);
        assert_eq!(bodies.get(ball).unwrap().velocity().linear.y, 3.0);
    }

    #[test]
    fn penetration_correction_is_clamped() {
        let params = ContactParams::default();
        let dt = 1.0 / 60.0;
        assert_eq!(params.bias(0.005, 0.0, 0.0, dt), 0.0);
        let small = params.bias(0.02, 0.0, 0.0, dt);
        assert!((small - 0.01 * 0.2 / dt).abs() < 1e-12);
        assert_eq!(params.bias(5.0, 0.0, 0.0, dt), params.max_correction_speed);
        // bounce wins once the closing speed is past the threshold
        assert_eq!(params.bias(0.0, -4.0, 0.5, dt), 2.0);
        assert_eq!(params.bias(0.0, -0.5, 0.5, dt), 0.0);
    }

    #[test]
    fn degenerate_normal_falls_back_to_up() {
        let (bodies, ground, ball, mut contact) = resting_pair(0.0);
        contact.normal = m::Vec3::zero();
        let mut constraint = PenetrationConstraint::new(ground, ball, contact, ContactParams::default());
        constraint.update(1.0 / 60.0, &bodies);
        let pre = constraint.prestep.as_ref().unwrap();
        assert_eq!(pre.jacobian.dir, m::Vec3::unit_y());
        assert!(pre.jacobian.effective_mass.is_finite());
    }

    #[test]
    fn friction_stops_sliding() {
        let dt = 1.0 / 60.0;
        let (mut bodies, ground, ball, contact) = resting_pair(0.005);
        {
            let body = bodies.get_mut(ball).unwrap();
            body.velocity_mut().linear = m::Vec3::new(0.05, 0.0, 0.0);
            // no rotation, so stopping the contact point stops the whole body
            body.inv_inertia_local = m::Vec3::zero();
        }
        let mut manifold = ContactManifoldConstraint::new(ground, ball, ContactParams::default());
        manifold.update_contacts(&[Contact {
            point: m::Vec3::new(0.0, -0.005, 0.0),
            ..contact
        }]);
        let keys = [ground, ball];
        for _ in 0..5 {
            apply_gravity(&mut bodies, ball, dt);
            manifold.update(dt, &bodies);
            let mut locks = bodies.lock_bodies(&keys);
            manifold.exclusive_update(&mut locks);
            for _ in 0..10 {
                manifold.solve_iteration(&mut locks);
            }
        }
        let vel = bodies.get(ball).unwrap().velocity();
        assert!(vel.linear.mag() < 1e-6, "{:?}", vel.linear);
        let [t1, t2] = manifold.points()[0].friction.accumulated_impulse();
        let max = 0.6 * manifold.points()[0].penetration.accumulated_impulse();
        assert!(t1.abs() <= max + 1e-12 && t2.abs() <= max + 1e-12);
    }

    #[test]
    fn manifold_matches_features() {
        let (_bodies, ground, ball, contact) = resting_pair(0.0);
        let mut manifold = ContactManifoldConstraint::new(ground, ball, ContactParams::default());
        let with_id = |id: u32, depth: f64| Contact {
            feature_id: id,
            depth,
            ..contact
        };
        manifold.update_contacts(&[with_id(1, 0.0), with_id(2, 0.0)]);
        manifold.points[0].penetration.accumulated_impulse = 5.0;
        manifold.points[1].penetration.accumulated_impulse = 7.0;

        manifold.update_contacts(&[with_id(2, 0.1), with_id(3, 0.0)]);
        assert_eq!(manifold.points().len(), 2);
        assert_eq!(manifold.points[0].penetration.contact.feature_id, 2);
        assert_eq!(manifold.points[0].penetration.accumulated_impulse(), 7.0);
        assert_eq!(manifold.points[1].penetration.accumulated_impulse(), 0.0);
        assert_eq!(manifold.points[1].penetration.involved_bodies(), &[ground, ball]);

        let many: Vec<Contact> = (0..6).map(|i| with_id(i, i as f64)).collect();
        manifold.update_contacts(&many);
        assert_eq!(manifold.points().len(), MAX_MANIFOLD_POINTS);
        assert!(manifold.points().iter().all(|p| p.penetration.contact.depth >= 2.0));
    }

    #[test]
    fn recycled_penetration_is_fresh() {
        let dt = 1.0 / 60.0;
        let (bodies, ground, ball, contact) = resting_pair(0.3);
        let params = ContactParams::default().with_allowed_penetration(0.5);
        let mut used = PenetrationConstraint::new(
            ground,
            ball,
            Contact {
                feature_id: 9,
                ..contact
            },
            params,
        );
        used.restitution = Some(0.9);
        used.update(dt, &bodies);
        {
            let mut locks = bodies.lock_bodies(&[ground, ball]);
            used.solve_iteration(&mut locks);
        }
        used.settings_mut().owner = Some(super::super::Owner::Solver);

        used.reset();
        let fresh = PenetrationConstraint::default();
        assert!(used.involved_bodies().is_empty());
        assert_eq!(used.contact.depth, fresh.contact.depth);
        assert_eq!(used.contact.feature_id, fresh.contact.feature_id);
        assert_eq!(used.contact.normal, fresh.contact.normal);
        assert_eq!(used.contact.point, fresh.contact.point);
        assert_eq!(used.params, fresh.params);
        assert_eq!(used.restitution, None);
        assert_eq!(used.accumulated_impulse(), 0.0);
        assert!(used.prestep.is_none());
        assert_eq!(used.settings().owner(), None);
    }

    #[test]
    fn recycled_manifold_is_fresh() {
        let (_bodies, ground, ball, contact) = resting_pair(0.0);
        let mut manifold = ContactManifoldConstraint::new(ground, ball, ContactParams::default());
        manifold.update_contacts(&[contact]);
        manifold.points[0].penetration.accumulated_impulse = 1.0;
        manifold.settings_mut().owner = Some(super::super::Owner::Solver);

        manifold.reset();
        assert!(manifold.involved_bodies().is_empty());
        assert!(manifold.points().is_empty());
        assert_eq!(manifold.total_normal_impulse(), 0.0);
        assert_eq!(manifold.settings().owner(), None);
    }
}
