pub mod aabb;
pub use aabb::{Ray, Sphere, AABB};

pub mod broadphase;
pub use broadphase::{BroadPhase, BruteForce, PairHandler};

pub mod bvh;
pub use bvh::{Bvh, BvhParams, NodeInfo, ProxyKey};

pub mod query;
