use crate::math as m;

use std::collections::HashMap;

//

pub mod body;
pub use body::{Body, BodyId, BodyKey, BodyLocks, BodySet, Mass};

pub mod collision;
use collision::{BroadPhase, Bvh, BvhParams, NodeInfo, ProxyKey, Ray, Sphere, AABB};

pub mod constraint;
pub use constraint::{
    contact::Contact, ContactManifoldConstraint, ContactParams, Owner, SolverGroup,
    SolverSettings, SolverUpdateable,
};

pub mod forcefield;
pub use forcefield::ForceField;

pub mod island;
pub use island::{IslandManager, SleepParams};

pub mod material;
pub use material::{BlendMethod, Material, MaterialBlending};

pub mod narrowphase;
pub use narrowphase::{BoundingSphereContacts, ContactGenerator, ContactManager};

pub mod pool;
pub use pool::{LockingPool, Pool, Recycle};

pub mod solver;
pub use solver::{ConstraintKey, Solver, SolverError, SolverParams};

//

/// Velocity of an object.
///
// Equivalent to a 6D vector but with names for the translational and rotational part.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct Velocity {
    /// Linear velocity in metres per second.
    pub linear: m::Vec3,
    /// Angular velocity in radians per second, around the axis it points along.
    pub angular: m::Vec3,
}

impl Velocity {
    /// Get the linear velocity of a point offset from the center of mass.
    #[inline]
    pub fn point_velocity(&self, offset: m::Vec3) -> m::Vec3 {
        self.linear + self.angular.cross(offset)
    }

    pub fn apply_to_pose(&self, dt: f64, mut pose: m::Pose) -> m::Pose {
        pose.integrate(self.linear, self.angular, dt);
        pose
    }
}

impl std::ops::Add for Velocity {
    type Output = Self;
    fn add(self, other: Self) -> Self {
        Self {
            linear: self.linear + other.linear,
            angular: self.angular + other.angular,
        }
    }
}
impl std::ops::AddAssign for Velocity {
    fn add_assign(&mut self, other: Self) {
        *self = *self + other;
    }
}
impl std::ops::Mul<f64> for Velocity {
    type Output = Velocity;

    fn mul(self, rhs: f64) -> Self::Output {
        Velocity {
            linear: self.linear * rhs,
            angular: self.angular * rhs,
        }
    }
}

//

/// Parameters of a [`PhysicsWorld`][self::PhysicsWorld].
#[derive(Clone, Copy, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde-types", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde-types", serde(default))]
pub struct PhysicsParams {
    pub solver: SolverParams,
    pub contacts: ContactParams,
    pub bvh: BvhParams,
    /// Run the solver on the rayon thread pool.
    /// Ignored without the `parallel` feature.
    pub multithreaded: bool,
}

impl PhysicsParams {
    pub fn with_solver(mut self, solver: SolverParams) -> Self {
        self.solver = solver;
        self
    }

    pub fn with_contacts(mut self, contacts: ContactParams) -> Self {
        self.contacts = contacts;
        self
    }

    pub fn with_bvh(mut self, bvh: BvhParams) -> Self {
        self.bvh = bvh;
        self
    }

    pub fn with_multithreading(mut self, multithreaded: bool) -> Self {
        self.multithreaded = multithreaded;
        self
    }
}

/// Everything needed to simulate a set of rigid bodies.
///
/// Each [`tick`][Self::tick]:
/// 1. applies external accelerations to awake dynamic bodies,
/// 2. refits the bounding volume hierarchy,
/// 3. finds overlapping pairs and runs the narrow phase on them,
/// 4. solves constraints,
/// 5. puts still islands to sleep,
/// 6. moves awake dynamic bodies.
pub struct PhysicsWorld {
    bodies: BodySet,
    solver: Solver,
    contacts: ContactManager,
    bvh: Bvh<BodyKey>,
    proxies: HashMap<BodyKey, ProxyKey>,
    multithreaded: bool,
}

impl Default for PhysicsWorld {
    fn default() -> Self {
        Self::new(PhysicsParams::default())
    }
}

impl PhysicsWorld {
    pub fn new(params: PhysicsParams) -> Self {
        Self {
            bodies: BodySet::new(),
            solver: Solver::new(params.solver),
            contacts: ContactManager::new(params.contacts),
            bvh: Bvh::new(params.bvh),
            proxies: HashMap::new(),
            multithreaded: params.multithreaded,
        }
    }

    pub fn insert_body(&mut self, body: Body) -> BodyKey {
        let aabb = body.aabb();
        let is_kinematic = body.is_kinematic();
        let key = self.bodies.insert(body);
        self.proxies.insert(key, self.bvh.insert(key, aabb));
        if !is_kinematic {
            self.solver.islands_mut().add_body(key);
        }
        key
    }

    /// Remove a body along with every constraint involving it.
    pub fn remove_body(&mut self, key: BodyKey) -> Option<Body> {
        let body = self.bodies.remove(key)?;
        self.contacts.remove_body(key, &mut self.solver);
        let orphaned = self.solver.remove_involving(key);
        if !orphaned.is_empty() {
            log::debug!("Removed {} constraints along with a body", orphaned.len());
        }
        self.solver.islands_mut().remove_body(key);
        if let Some(proxy) = self.proxies.remove(&key) {
            self.bvh.remove(proxy);
        }
        Some(body)
    }

    #[inline]
    pub fn bodies(&self) -> &BodySet {
        &self.bodies
    }

    #[inline]
    pub fn body(&self, key: BodyKey) -> Option<&Body> {
        self.bodies.get(key)
    }

    /// Mutable access to a body. This doesn't wake it up,
    /// call [`activate`][Self::activate] after changing a sleeping body.
    #[inline]
    pub fn body_mut(&mut self, key: BodyKey) -> Option<&mut Body> {
        self.bodies.get_mut(key)
    }

    /// Wake up a body and everything in its island.
    pub fn activate(&mut self, key: BodyKey) {
        self.solver.islands_mut().activate(key);
    }

    #[inline]
    pub fn is_awake(&self, key: BodyKey) -> bool {
        self.solver.islands().is_body_active(key)
    }

    /// Add a constraint, for example a [`SolverGroup`] of joints.
    pub fn add_constraint(
        &mut self,
        constraint: Box<dyn SolverUpdateable>,
    ) -> Result<ConstraintKey, SolverError> {
        self.solver.add(constraint, &self.bodies)
    }

    pub fn remove_constraint(
        &mut self,
        key: ConstraintKey,
    ) -> Result<Box<dyn SolverUpdateable>, SolverError> {
        self.solver.remove(key)
    }

    #[inline]
    pub fn solver(&self) -> &Solver {
        &self.solver
    }

    #[inline]
    pub fn solver_mut(&mut self) -> &mut Solver {
        &mut self.solver
    }

    #[inline]
    pub fn contacts(&self) -> &ContactManager {
        &self.contacts
    }

    /// Step the simulation forward by `dt` seconds.
    pub fn tick(
        &mut self,
        dt: f64,
        forcefield: &impl ForceField,
        generator: &mut impl ContactGenerator,
    ) {
        let _span = tracy_span!("physics tick", "tick");

        for (key, body) in self.bodies.iter_mut() {
            if body.is_kinematic() || !self.solver.islands().is_body_active(key) {
                continue;
            }
            let accel = forcefield.value_at(body.pose.position);
            body.velocity_mut().linear += accel * dt;
        }

        {
            let _span = tracy_span!("broad phase", "tick");
            let bodies = &self.bodies;
            self.bvh.refit(|key| {
                bodies
                    .get(key)
                    .map(Body::aabb)
                    .unwrap_or_else(|| AABB::new(m::Vec3::zero(), m::Vec3::zero()))
            });
            self.bvh.find_pairs(&mut self.contacts);
        }

        self.contacts
            .process(&self.bodies, &mut self.solver, generator);

        if self.multithreaded {
            self.update_solver_multithreaded(dt);
        } else {
            self.solver.update(dt, &self.bodies);
        }

        self.solver.islands_mut().update(dt, &mut self.bodies);

        for (key, body) in self.bodies.iter_mut() {
            if body.is_kinematic() && body.velocity() == Velocity::default() {
                continue;
            }
            if !body.is_kinematic() && !self.solver.islands().is_body_active(key) {
                continue;
            }
            let vel = *body.velocity_mut();
            body.pose = vel.apply_to_pose(dt, body.pose);
        }
    }

    #[cfg(feature = "parallel")]
    fn update_solver_multithreaded(&mut self, dt: f64) {
        self.solver.update_multithreaded(dt, &self.bodies);
    }

    #[cfg(not(feature = "parallel"))]
    fn update_solver_multithreaded(&mut self, dt: f64) {
        self.solver.update(dt, &self.bodies);
    }

    //
    // queries
    //

    /// Bodies whose bounding box intersects the given box.
    pub fn query_aabb(&mut self, aabb: AABB) -> Vec<BodyKey> {
        let mut out = Vec::new();
        self.bvh.query_aabb(aabb, &mut out);
        out
    }

    /// Bodies whose bounding box intersects the given sphere.
    pub fn query_sphere(&mut self, sphere: Sphere) -> Vec<BodyKey> {
        let mut out = Vec::new();
        self.bvh.query_sphere(sphere, &mut out);
        out
    }

    /// Bodies whose bounding box is hit by the ray within `max_t`,
    /// closest hit first.
    pub fn query_ray(&mut self, ray: Ray, max_t: f64) -> Vec<(BodyKey, f64)> {
        let mut candidates = Vec::new();
        self.bvh.query_ray(ray, max_t, &mut candidates);
        let mut hits: Vec<(BodyKey, f64)> = candidates
            .into_iter()
            .filter_map(|key| {
                let body = self.bodies.get(key)?;
                let t = collision::query::ray_aabb(ray, body.aabb())?;
                Some((key, t))
            })
            .collect();
        hits.sort_by(|(_, t1), (_, t2)| t1.total_cmp(t2));
        hits
    }

    /// Bounding boxes of the broad phase tree, for debug drawing.
    pub fn debug_boxes(&self) -> Vec<NodeInfo> {
        self.bvh.branch_aabbs()
    }

    /// Remove every body and constraint.
    pub fn clear(&mut self) {
        self.contacts.clear(&mut self.solver);
        let keys: Vec<ConstraintKey> = self.solver.iter().map(|(k, _)| k).collect();
        for key in keys {
            let _ = self.solver.remove(key);
        }
        self.solver.islands_mut().clear();
        self.bvh.clear();
        self.proxies.clear();
        self.bodies.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DT: f64 = 1.0 / 60.0;
    fn gravity() -> forcefield::Gravity {
        forcefield::Gravity(m::Vec3::new(0.0, -9.81, 0.0))
    }

    fn ground() -> Body {
        Body::new_kinematic(m::Vec3::new(20.0, 0.5, 20.0)).with_position(m::Vec3::new(0.0, -0.5, 0.0))
    }

    fn ball(pos: m::Vec3) -> Body {
        Body::new_dynamic_box(m::Vec3::broadcast(0.5), 1.0).with_position(pos)
    }

    #[test]
    fn velocity_math() {
        let vel = Velocity {
            linear: m::Vec3::unit_x(),
            angular: m::Vec3::new(0.0, 0.0, 2.0),
        };
        // spinning around z, a point at +x moves towards +y
        assert_eq!(
            vel.point_velocity(m::Vec3::unit_x()),
            m::Vec3::new(1.0, 2.0, 0.0)
        );
        let doubled = vel + vel;
        assert_eq!(doubled, vel * 2.0);
    }

    #[test]
    fn falling_ball_comes_to_rest_and_sleeps() {
        let mut world = PhysicsWorld::new(PhysicsParams::default().with_solver(
            SolverParams::default().with_sleep(SleepParams {
                enabled: true,
                velocity_threshold: 0.05,
                time_to_sleep: 0.5,
            }),
        ));
        world.insert_body(ground());
        let ball = world.insert_body(ball(m::Vec3::new(0.0, 2.0, 0.0)));

        let mut generator = BoundingSphereContacts;
        for _ in 0..300 {
            world.tick(DT, &gravity(), &mut generator);
        }
        let body = world.body(ball).unwrap();
        // resting on the ground within the allowed penetration and a bit of slack
        assert!((body.pose.position.y - 0.5).abs() < 0.02, "{}", body.pose.position.y);
        assert!(body.velocity().linear.mag() < 0.05);
        assert!(!world.is_awake(ball));

        // waking it up lets gravity act again
        world.activate(ball);
        assert!(world.is_awake(ball));
    }

    #[test]
    fn moving_kinematic_body_pushes_a_sleeping_ball() {
        let mut world = PhysicsWorld::new(PhysicsParams::default().with_solver(
            SolverParams::default().with_sleep(SleepParams {
                enabled: true,
                velocity_threshold: 0.05,
                time_to_sleep: 0.5,
            }),
        ));
        world.insert_body(ground());
        let ball = world.insert_body(ball(m::Vec3::new(0.0, 0.5, 0.0)));
        let mut generator = BoundingSphereContacts;
        for _ in 0..120 {
            world.tick(DT, &gravity(), &mut generator);
        }
        assert!(!world.is_awake(ball));

        let pusher = world.insert_body(
            Body::new_kinematic(m::Vec3::broadcast(0.5))
                .with_position(m::Vec3::new(-3.0, 0.5, 0.0))
                .with_velocity(Velocity {
                    linear: m::Vec3::new(3.0, 0.0, 0.0),
                    angular: m::Vec3::zero(),
                }),
        );
        for _ in 0..120 {
            world.tick(DT, &gravity(), &mut generator);
        }
        let pusher_x = world.body(pusher).unwrap().pose.position.x;
        assert!((pusher_x - 3.0).abs() < 1e-9, "{}", pusher_x);
        let ball_x = world.body(ball).unwrap().pose.position.x;
        // pushed along ahead of the pusher instead of being passed through
        assert!(ball_x > pusher_x + 0.5, "ball at {}, pusher at {}", ball_x, pusher_x);
        assert!(world.is_awake(ball));
    }

    #[test]
    fn balls_separate() {
        let mut world = PhysicsWorld::default();
        // overlapping, no gravity
        let a = world.insert_body(ball(m::Vec3::zero()));
        let b = world.insert_body(ball(m::Vec3::new(0.8, 0.0, 0.0)));
        let mut generator = BoundingSphereContacts;
        for _ in 0..120 {
            world.tick(DT, &forcefield::NoneField, &mut generator);
        }
        let dist = (world.body(b).unwrap().pose.position - world.body(a).unwrap().pose.position).mag();
        assert!(dist > 0.98, "{}", dist);
        // pushed apart symmetrically along x
        assert!(world.body(a).unwrap().pose.position.x < 0.0);
        assert!(world.body(b).unwrap().pose.position.x > 0.8);
    }

    #[test]
    fn removal_cleans_up() {
        let mut world = PhysicsWorld::default();
        world.insert_body(ground());
        let ball = world.insert_body(ball(m::Vec3::new(0.0, 0.45, 0.0)));
        let mut generator = BoundingSphereContacts;
        world.tick(DT, &gravity(), &mut generator);
        assert_eq!(world.solver().len(), 1);

        assert!(world.remove_body(ball).is_some());
        assert!(world.solver().is_empty());
        assert_eq!(world.contacts().pair_count(), 0);
        assert!(world.remove_body(ball).is_none());
        world.tick(DT, &gravity(), &mut generator);
        assert_eq!(world.bodies().len(), 1);
    }

    #[test]
    fn queries() {
        let mut world = PhysicsWorld::default();
        let near = world.insert_body(ball(m::Vec3::new(3.0, 0.0, 0.0)));
        let far = world.insert_body(ball(m::Vec3::new(8.0, 0.0, 0.0)));
        let off = world.insert_body(ball(m::Vec3::new(3.0, 5.0, 0.0)));

        let ray = Ray {
            start: m::Vec3::zero(),
            dir: m::Unit::unit_x(),
        };
        let hits = world.query_ray(ray, 100.0);
        assert_eq!(hits.iter().map(|(k, _)| *k).collect::<Vec<_>>(), vec![near, far]);
        assert!((hits[0].1 - 2.5).abs() < 1e-12);
        assert_eq!(world.query_ray(ray, 5.0).len(), 1);

        let mut in_box = world.query_aabb(AABB::new(m::Vec3::new(2.0, -1.0, -1.0), m::Vec3::new(4.0, 6.0, 1.0)));
        in_box.sort_by_key(|k| world.body(*k).unwrap().id());
        assert_eq!(in_box, vec![near, off]);

        let around = world.query_sphere(Sphere {
            center: m::Vec3::new(8.0, 0.0, 0.0),
            radius: 1.0,
        });
        assert_eq!(around, vec![far]);
        assert_eq!(world.debug_boxes().len(), 2);
    }

    #[cfg(feature = "serde-types")]
    #[test]
    fn params_round_trip_through_ron() {
        let params = PhysicsParams::default()
            .with_multithreading(true)
            .with_solver(SolverParams::default().with_iteration_limit(4))
            .with_contacts(ContactParams::default().with_allowed_penetration(0.005));
        let text = ron::to_string(&params).unwrap();
        let back: PhysicsParams = ron::from_str(&text).unwrap();
        assert_eq!(params, back);

        // missing fields fall back to defaults
        let partial: PhysicsParams = ron::from_str("(multithreaded: true)").unwrap();
        assert_eq!(partial, PhysicsParams::default().with_multithreading(true));
    }

    #[cfg(feature = "parallel")]
    #[test]
    fn multithreaded_pile() {
        let mut world = PhysicsWorld::new(PhysicsParams::default().with_multithreading(true));
        world.insert_body(ground());
        let balls: Vec<BodyKey> = (0..50)
            .map(|i| {
                let x = (i % 5) as f64 * 1.1 - 2.2;
                let z = ((i / 5) % 5) as f64 * 1.1 - 2.2;
                let y = 0.6 + (i / 25) as f64 * 1.1;
                world.insert_body(ball(m::Vec3::new(x, y, z)))
            })
            .collect();
        let mut generator = BoundingSphereContacts;
        for _ in 0..120 {
            world.tick(DT, &gravity(), &mut generator);
        }
        for key in balls {
            let pos = world.body(key).unwrap().pose.position;
            assert!(pos.y > 0.3, "ball fell through the ground: {:?}", pos);
        }
    }
}
