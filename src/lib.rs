/// Open a profiling span that closes when the returned value is dropped.
/// Does nothing unless the `tracy` feature is enabled and a profiler is connected.
macro_rules! tracy_span {
    ($name:expr, $fn_name:expr) => {
        tracy_client::Client::running()
            .map(|client| client.span_alloc(Some($name), $fn_name, file!(), line!(), 0))
    };
}

pub mod math;
pub use math::{uv, Pose, Unit};

pub mod physics;
pub use physics::{
    collision::{self, Bvh, BvhParams, Ray, Sphere, AABB},
    forcefield, Body, BodyId, BodyKey, BodySet, Contact, ContactGenerator, ContactParams,
    ConstraintKey, Mass, Material, PhysicsParams, PhysicsWorld, Solver, SolverError,
    SolverParams, SolverUpdateable, Velocity,
};
