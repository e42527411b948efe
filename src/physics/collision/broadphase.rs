//! Broad phase collision detection algorithms
//! are responsible for detecting pairs of possibly intersecting objects
//! for further, more accurate narrow phase inspection.

use super::{Bvh, AABB};

use itertools::Itertools;

/// Receiver for pairs of objects whose bounding boxes overlap.
///
/// Implemented for any `FnMut(T, T)` closure,
/// so simple cases can just pass a closure collecting the pairs.
pub trait PairHandler<T> {
    /// Called once per overlapping pair found.
    /// The handler decides whether the pair is new and what to do with it.
    fn try_add_overlap(&mut self, a: T, b: T);
}

impl<T, F> PairHandler<T> for F
where
    F: FnMut(T, T),
{
    #[inline]
    fn try_add_overlap(&mut self, a: T, b: T) {
        self(a, b)
    }
}

/// A broad phase algorithm.
pub trait BroadPhase<T> {
    /// Report every pair of potentially intersecting objects to the handler,
    /// each unordered pair exactly once.
    fn find_pairs(&mut self, handler: &mut impl PairHandler<T>);
}

impl<T: Copy> BroadPhase<T> for Bvh<T> {
    #[inline]
    fn find_pairs(&mut self, handler: &mut impl PairHandler<T>) {
        self.self_overlaps(handler);
    }
}

/// The simplest possible broad phase algorithm,
/// which tests every object against every other object.
/// Very inefficient, but can work for small systems and is useful as a reference.
#[derive(Clone, Debug, Default)]
pub struct BruteForce<T> {
    pub items: Vec<(T, AABB)>,
}

impl<T: Copy> BroadPhase<T> for BruteForce<T> {
    fn find_pairs(&mut self, handler: &mut impl PairHandler<T>) {
        for ((item_a, aabb_a), (item_b, aabb_b)) in self.items.iter().tuple_combinations() {
            if aabb_a.intersects(aabb_b) {
                handler.try_add_overlap(*item_a, *item_b);
            }
        }
    }
}
