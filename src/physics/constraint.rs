//! The interface between the solver and the things it solves,
//! plus building blocks shared by constraint implementations.

use super::{BodyKey, BodyLocks, BodySet, SolverError, Velocity};
use crate::math as m;

pub mod contact;
pub use contact::{
    ContactManifoldConstraint, ContactParams, ContactPoint, FrictionConstraint,
    PenetrationConstraint,
};

/// Something the solver iterates on to correct the velocities of a set of bodies.
///
/// The solver calls these in phases every step:
/// 1. [`update`][Self::update] (prestep) without any locks,
///    which may only touch the updateable's own state,
/// 2. [`exclusive_update`][Self::exclusive_update] (warm start)
///    with the velocities of every involved body locked,
/// 3. [`solve_iteration`][Self::solve_iteration] repeatedly, also under the locks.
///
/// Kinematic bodies never appear in the locks;
/// their velocity should be read during the prestep and treated as constant.
pub trait SolverUpdateable: Send + Sync {
    /// Every body whose velocity this may change or read.
    /// Order doesn't matter, the solver sorts these into locking order.
    fn involved_bodies(&self) -> &[BodyKey];

    fn settings(&self) -> &SolverSettings;
    fn settings_mut(&mut self) -> &mut SolverSettings;

    /// Compute everything that only depends on body positions for this step.
    fn update(&mut self, dt: f64, bodies: &BodySet);

    /// Apply the accumulated impulse from the previous step.
    fn exclusive_update(&mut self, locks: &mut BodyLocks<'_>);

    /// Compute and apply one impulse correction,
    /// returning the magnitude of the impulse applied.
    fn solve_iteration(&mut self, locks: &mut BodyLocks<'_>) -> f64;

    /// Access the concrete type, for editing an updateable owned by the solver.
    fn as_any_mut(&mut self) -> &mut dyn std::any::Any;
}

/// Who is responsible for iterating on an updateable.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Owner {
    Solver,
    Group,
}

/// Per-updateable iteration controls and state.
#[derive(Clone, Debug)]
pub struct SolverSettings {
    /// Number of consecutive iterations with an impulse below `min_impulse`
    /// that must be exceeded before the updateable stops for the step.
    pub min_iterations: u32,
    /// Most iterations done on this updateable in one step.
    pub max_iterations: u32,
    /// Impulses smaller than this count as zero.
    pub min_impulse: f64,
    /// Whether this should be solved at all.
    pub is_active: bool,
    pub(crate) current_iterations: u32,
    pub(crate) iterations_at_zero_impulse: u32,
    pub(crate) is_active_in_solver: bool,
    pub(crate) owner: Option<Owner>,
}

impl Default for SolverSettings {
    fn default() -> Self {
        Self {
            min_iterations: 1,
            max_iterations: 50,
            min_impulse: 1e-3,
            is_active: true,
            current_iterations: 0,
            iterations_at_zero_impulse: 0,
            is_active_in_solver: false,
            owner: None,
        }
    }
}

impl SolverSettings {
    pub fn with_min_iterations(mut self, iters: u32) -> Self {
        self.min_iterations = iters;
        self
    }

    pub fn with_max_iterations(mut self, iters: u32) -> Self {
        self.max_iterations = iters;
        self
    }

    pub fn with_min_impulse(mut self, impulse: f64) -> Self {
        self.min_impulse = impulse;
        self
    }

    #[inline]
    pub fn current_iterations(&self) -> u32 {
        self.current_iterations
    }

    #[inline]
    pub fn iterations_at_zero_impulse(&self) -> u32 {
        self.iterations_at_zero_impulse
    }

    /// Whether the solver is still iterating on this during the current step.
    #[inline]
    pub fn is_active_in_solver(&self) -> bool {
        self.is_active_in_solver
    }

    #[inline]
    pub fn owner(&self) -> Option<Owner> {
        self.owner
    }

    /// Start of a step.
    pub(crate) fn reset_counters(&mut self) {
        self.current_iterations = 0;
        self.iterations_at_zero_impulse = 0;
    }

    /// Claim one iteration from the step's budget.
    /// Returns false, taking the updateable out of the rest of the step,
    /// if the global limit or `max_iterations` has already been reached.
    pub(crate) fn begin_iteration(&mut self, iteration_limit: u32) -> bool {
        if !self.is_active_in_solver {
            return false;
        }
        if self.current_iterations >= iteration_limit
            || self.current_iterations >= self.max_iterations
        {
            self.is_active_in_solver = false;
            return false;
        }
        self.current_iterations += 1;
        true
    }

    /// Record the impulse applied by the iteration just finished,
    /// taking the updateable out of the rest of the step if it has converged.
    pub(crate) fn record_impulse(&mut self, impulse: f64) {
        if impulse < self.min_impulse {
            self.iterations_at_zero_impulse += 1;
            if self.iterations_at_zero_impulse > self.min_iterations {
                self.is_active_in_solver = false;
            }
        } else {
            self.iterations_at_zero_impulse = 0;
        }
    }
}

//
// groups
//

/// A composite of updateables that the solver treats as one,
/// iterating all children under the same locks.
pub struct SolverGroup {
    children: Vec<Box<dyn SolverUpdateable>>,
    bodies: Vec<BodyKey>,
    settings: SolverSettings,
}

impl Default for SolverGroup {
    fn default() -> Self {
        Self::new()
    }
}

impl SolverGroup {
    pub fn new() -> Self {
        Self {
            children: Vec::new(),
            bodies: Vec::new(),
            settings: SolverSettings::default(),
        }
    }

    /// Add a child to the group, returning its index.
    ///
    /// Fails with [`SolverError::AlreadyOwned`] if the child is already owned
    /// by a solver or another group, handing the child back.
    pub fn add(
        &mut self,
        mut child: Box<dyn SolverUpdateable>,
    ) -> Result<usize, (SolverError, Box<dyn SolverUpdateable>)> {
        if child.settings().owner.is_some() {
            return Err((SolverError::AlreadyOwned, child));
        }
        child.settings_mut().owner = Some(Owner::Group);
        for body in child.involved_bodies() {
            if !self.bodies.contains(body) {
                self.bodies.push(*body);
            }
        }
        self.children.push(child);
        Ok(self.children.len() - 1)
    }

    /// Take a child out of the group, releasing its ownership.
    ///
    /// If the group is owned by a solver, call
    /// [`Solver::refresh_connections`][super::Solver::refresh_connections]
    /// afterwards, since the set of involved bodies may have changed.
    pub fn remove(&mut self, idx: usize) -> Option<Box<dyn SolverUpdateable>> {
        if idx >= self.children.len() {
            return None;
        }
        let mut child = self.children.remove(idx);
        child.settings_mut().owner = None;
        self.bodies.clear();
        for c in &self.children {
            for body in c.involved_bodies() {
                if !self.bodies.contains(body) {
                    self.bodies.push(*body);
                }
            }
        }
        Some(child)
    }

    pub fn children(&self) -> impl '_ + Iterator<Item = &dyn SolverUpdateable> {
        self.children.iter().map(|c| c.as_ref())
    }

    /// Mutable access to a child, for example to downcast it with
    /// [`as_any_mut`][SolverUpdateable::as_any_mut].
    pub fn child_mut(&mut self, idx: usize) -> Option<&mut (dyn SolverUpdateable + 'static)> {
        self.children.get_mut(idx).map(|c| c.as_mut())
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.children.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }
}

impl SolverUpdateable for SolverGroup {
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
        for child in self.children.iter_mut().filter(|c| c.settings().is_active) {
            child.update(dt, bodies);
        }
    }

    fn exclusive_update(&mut self, locks: &mut BodyLocks<'_>) {
        for child in self.children.iter_mut().filter(|c| c.settings().is_active) {
            child.exclusive_update(locks);
        }
    }

    fn solve_iteration(&mut self, locks: &mut BodyLocks<'_>) -> f64 {
        self.children
            .iter_mut()
            .filter(|c| c.settings().is_active)
            .map(|c| c.solve_iteration(locks))
            .sum()
    }

    fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
        self
    }
}

//
// building blocks
//

/// Prestep data of one body involved in a constraint.
#[derive(Clone, Copy, Debug)]
pub struct BodyTerms {
    pub key: BodyKey,
    pub position: m::Vec3,
    pub inv_mass: f64,
    pub inv_inertia: m::Mat3,
    /// Velocity at prestep, used for kinematic bodies which never get locked.
    pub velocity: Velocity,
}

impl BodyTerms {
    /// Read the terms of a body from the set, if it exists.
    pub fn read(bodies: &BodySet, key: BodyKey) -> Option<Self> {
        let body = bodies.get(key)?;
        Some(Self {
            key,
            position: body.pose.position,
            inv_mass: body.mass.inv(),
            inv_inertia: body.inv_inertia_world(),
            velocity: body.velocity(),
        })
    }

    /// Terms of an immovable body, used when a body has disappeared.
    pub fn fixed(key: BodyKey) -> Self {
        Self {
            key,
            position: m::Vec3::zero(),
            inv_mass: 0.0,
            inv_inertia: m::diagonal(m::Vec3::zero()),
            velocity: Velocity::default(),
        }
    }
}

/// One row of a velocity constraint between two bodies along a direction,
/// precomputed at prestep.
///
/// The constrained quantity is the velocity of B's anchor point
/// relative to A's along `dir`.
#[derive(Clone, Copy, Debug)]
pub struct Jacobian {
    pub dir: m::Vec3,
    ang_a: m::Vec3,
    ang_b: m::Vec3,
    // jacobian premultiplied with inverse masses
    lin_a_response: m::Vec3,
    ang_a_response: m::Vec3,
    lin_b_response: m::Vec3,
    ang_b_response: m::Vec3,
    /// Zero if neither body can move along this row.
    pub effective_mass: f64,
}

impl Jacobian {
    pub fn new(dir: m::Vec3, offset_a: m::Vec3, offset_b: m::Vec3, a: &BodyTerms, b: &BodyTerms) -> Self {
        let ang_a = offset_a.cross(dir);
        let ang_b = offset_b.cross(dir);
        let ang_a_response = a.inv_inertia * ang_a;
        let ang_b_response = b.inv_inertia * ang_b;
        let inv_eff_mass = a.inv_mass
            + b.inv_mass
            + ang_a.dot(ang_a_response)
            + ang_b.dot(ang_b_response);
        let effective_mass = if inv_eff_mass > 1e-12 {
            1.0 / inv_eff_mass
        } else {
            0.0
        };
        Self {
            dir,
            ang_a,
            ang_b,
            lin_a_response: dir * a.inv_mass,
            ang_a_response,
            lin_b_response: dir * b.inv_mass,
            ang_b_response,
            effective_mass,
        }
    }

    /// Relative velocity along the row, positive when the anchors separate.
    #[inline]
    pub fn relative_velocity(&self, va: &Velocity, vb: &Velocity) -> f64 {
        self.dir.dot(vb.linear - va.linear) + self.ang_b.dot(vb.angular) - self.ang_a.dot(va.angular)
    }

    /// Apply an impulse along the row, pushing B along `dir` and A the opposite way.
    #[inline]
    pub fn apply(&self, impulse: f64, va: &mut Velocity, vb: &mut Velocity) {
        va.linear -= self.lin_a_response * impulse;
        va.angular -= self.ang_a_response * impulse;
        vb.linear += self.lin_b_response * impulse;
        vb.angular += self.ang_b_response * impulse;
    }
}

/// Run `f` on the current velocities of a body pair and write back the ones that are locked.
///
/// Bodies missing from the locks (kinematic ones) use their prestep velocity
/// and are not written to.
pub(crate) fn with_pair_velocities<R>(
    locks: &mut BodyLocks<'_>,
    a: &BodyTerms,
    b: &BodyTerms,
    f: impl FnOnce(&mut Velocity, &mut Velocity) -> R,
) -> R {
    let mut va = locks.velocity_mut(a.key).map_or(a.velocity, |v| *v);
    let mut vb = locks.velocity_mut(b.key).map_or(b.velocity, |v| *v);
    let ret = f(&mut va, &mut vb);
    if let Some(v) = locks.velocity_mut(a.key) {
        *v = va;
    }
    if let Some(v) = locks.velocity_mut(b.key) {
        *v = vb;
    }
    ret
}
