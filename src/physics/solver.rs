//! The iterative impulse solver driving every [`SolverUpdateable`][super::SolverUpdateable].

use super::{
    constraint::{Owner, SolverUpdateable},
    island::{ConnectionKey, IslandManager, SleepParams},
    BodyKey, BodySet,
};

use thunderdome as td;

/// Primes used as strides for the iteration order.
/// Any prime that doesn't divide the number of updateables
/// makes the order a permutation.
const PERMUTATION_PRIMES: [usize; 8] = [7919, 7927, 7933, 7937, 7949, 7951, 7963, 7993];

/// Key to an updateable owned by a [`Solver`][self::Solver].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ConstraintKey(td::Index);

/// Errors from misusing the solver's ownership API.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SolverError {
    #[error("The updateable is already owned by a solver or a solver group")]
    AlreadyOwned,
    #[error("The key doesn't refer to an updateable owned by this solver")]
    NotOwned,
    #[error("The updateable doesn't involve any bodies")]
    NoBodies,
    #[error("The updateable involves a body that doesn't exist")]
    UnknownBody,
}

/// Parameters for the solver and the islands it manages.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde-types", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde-types", serde(default))]
pub struct SolverParams {
    /// Number of passes over all updateables per step.
    pub iteration_limit: u32,
    pub sleep: SleepParams,
}

impl Default for SolverParams {
    fn default() -> Self {
        Self {
            iteration_limit: 10,
            sleep: SleepParams::default(),
        }
    }
}

impl SolverParams {
    pub fn with_iteration_limit(mut self, limit: u32) -> Self {
        self.iteration_limit = limit;
        self
    }

    pub fn with_sleep(mut self, sleep: SleepParams) -> Self {
        self.sleep = sleep;
        self
    }
}

struct Entry {
    key: td::Index,
    /// involved bodies in locking order
    bodies: Vec<BodyKey>,
    connection: ConnectionKey,
    updateable: Box<dyn SolverUpdateable>,
}

impl Entry {
    #[inline]
    fn is_active_in_solver(&self) -> bool {
        self.updateable.settings().is_active_in_solver
    }

    fn prestep(&mut self, dt: f64, bodies: &BodySet) {
        self.updateable.update(dt, bodies);
        let mut locks = bodies.lock_bodies(&self.bodies);
        self.updateable.exclusive_update(&mut locks);
    }

    /// Returns false if the entry was already done for this step.
    fn iterate(&mut self, bodies: &BodySet, iteration_limit: u32) -> bool {
        if !self.updateable.settings_mut().begin_iteration(iteration_limit) {
            return false;
        }
        let impulse = {
            let mut locks = bodies.lock_bodies(&self.bodies);
            self.updateable.solve_iteration(&mut locks)
        };
        self.updateable.settings_mut().record_impulse(impulse);
        true
    }
}

/// Owns solver updateables and iterates on them to resolve constraints.
///
/// Every updateable also becomes a connection in the solver's [`IslandManager`],
/// and updateables whose bodies are all asleep are skipped.
pub struct Solver {
    entries: Vec<Entry>,
    indices: td::Arena<usize>,
    islands: IslandManager,
    /// Number of passes over all updateables per step.
    pub iteration_limit: u32,
    permutation_counter: usize,
}

impl Default for Solver {
    fn default() -> Self {
        Self::new(SolverParams::default())
    }
}

impl Solver {
    pub fn new(params: SolverParams) -> Self {
        Self {
            entries: Vec::new(),
            indices: td::Arena::new(),
            islands: IslandManager::new(params.sleep),
            iteration_limit: params.iteration_limit,
            permutation_counter: 0,
        }
    }

    /// Take ownership of an updateable.
    pub fn add(
        &mut self,
        mut updateable: Box<dyn SolverUpdateable>,
        bodies: &BodySet,
    ) -> Result<ConstraintKey, SolverError> {
        if updateable.settings().owner.is_some() {
            return Err(SolverError::AlreadyOwned);
        }
        let sorted = Self::collect_bodies(updateable.as_ref(), bodies)?;
        let connection = self.islands.add_connection(&dynamic_only(&sorted, bodies));
        updateable.settings_mut().owner = Some(Owner::Solver);

        let key = self.indices.insert(self.entries.len());
        self.entries.push(Entry {
            key,
            bodies: sorted,
            connection,
            updateable,
        });
        Ok(ConstraintKey(key))
    }

    /// Give up ownership of an updateable, returning it.
    pub fn remove(&mut self, key: ConstraintKey) -> Result<Box<dyn SolverUpdateable>, SolverError> {
        let idx = self.indices.remove(key.0).ok_or(SolverError::NotOwned)?;
        let mut entry = self.entries.swap_remove(idx);
        if let Some(moved) = self.entries.get(idx) {
            self.indices[moved.key] = idx;
        }
        self.islands.remove_connection(entry.connection);
        entry.updateable.settings_mut().owner = None;
        Ok(entry.updateable)
    }

    /// Remove every updateable involving the given body.
    pub fn remove_involving(&mut self, body: BodyKey) -> Vec<Box<dyn SolverUpdateable>> {
        let keys: Vec<ConstraintKey> = self
            .entries
            .iter()
            .filter(|e| e.bodies.contains(&body))
            .map(|e| ConstraintKey(e.key))
            .collect();
        keys.into_iter().filter_map(|k| self.remove(k).ok()).collect()
    }

    pub fn get(&self, key: ConstraintKey) -> Result<&dyn SolverUpdateable, SolverError> {
        let idx = *self.indices.get(key.0).ok_or(SolverError::NotOwned)?;
        Ok(self.entries[idx].updateable.as_ref())
    }

    pub fn get_mut(&mut self, key: ConstraintKey) -> Result<&mut dyn SolverUpdateable, SolverError> {
        let idx = *self.indices.get(key.0).ok_or(SolverError::NotOwned)?;
        Ok(self.entries[idx].updateable.as_mut())
    }

    /// Access an updateable as its concrete type.
    /// `Ok(None)` means the updateable exists but is of a different type.
    pub fn get_as<T: 'static>(&mut self, key: ConstraintKey) -> Result<Option<&mut T>, SolverError> {
        Ok(self.get_mut(key)?.as_any_mut().downcast_mut::<T>())
    }

    /// Re-read the involved bodies of an updateable after they've changed,
    /// updating locking order and island connectivity.
    pub fn refresh_connections(&mut self, key: ConstraintKey, bodies: &BodySet) -> Result<(), SolverError> {
        let idx = *self.indices.get(key.0).ok_or(SolverError::NotOwned)?;
        let entry = &mut self.entries[idx];
        let sorted = Self::collect_bodies(entry.updateable.as_ref(), bodies)?;
        entry.connection = self
            .islands
            .replace_connection(entry.connection, &dynamic_only(&sorted, bodies));
        entry.bodies = sorted;
        Ok(())
    }

    pub fn iter(&self) -> impl '_ + Iterator<Item = (ConstraintKey, &dyn SolverUpdateable)> {
        self.entries
            .iter()
            .map(|e| (ConstraintKey(e.key), e.updateable.as_ref()))
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[inline]
    pub fn islands(&self) -> &IslandManager {
        &self.islands
    }

    #[inline]
    pub fn islands_mut(&mut self) -> &mut IslandManager {
        &mut self.islands
    }

    /// Run one step of the solver on the current thread.
    pub fn update(&mut self, dt: f64, bodies: &BodySet) {
        let _span = tracy_span!("solver update", "update");

        let active_count = self.begin_step(bodies);
        for entry in self.entries.iter_mut().filter(|e| e.is_active_in_solver()) {
            entry.prestep(dt, bodies);
        }

        let n = self.entries.len();
        let mut passes = 0;
        for _ in 0..self.iteration_limit {
            let (stride, offset) = self.next_permutation();
            let mut any_iterated = false;
            for i in 0..n {
                let idx = (stride * i + offset) % n;
                any_iterated |= self.entries[idx].iterate(bodies, self.iteration_limit);
            }
            if !any_iterated {
                break;
            }
            passes += 1;
        }
        log::trace!(
            "Solved {} of {} updateables in {} passes",
            active_count,
            n,
            passes
        );
    }

    /// Run one step of the solver, spreading the work over the rayon thread pool.
    ///
    /// Each pass is a parallel loop over all updateables.
    /// Updateables sharing bodies are kept apart by the bodies' locks,
    /// which are always taken in the same order, so this can't deadlock.
    #[cfg(feature = "parallel")]
    pub fn update_multithreaded(&mut self, dt: f64, bodies: &BodySet) {
        use rayon::prelude::*;
        let _span = tracy_span!("solver update multithreaded", "update_multithreaded");

        let active_count = self.begin_step(bodies);
        self.entries
            .par_iter_mut()
            .filter(|e| e.is_active_in_solver())
            .for_each(|e| e.prestep(dt, bodies));

        let iteration_limit = self.iteration_limit;
        let mut passes = 0;
        for _ in 0..iteration_limit {
            let iterated: usize = self
                .entries
                .par_iter_mut()
                .map(|e| e.iterate(bodies, iteration_limit) as usize)
                .sum();
            if iterated == 0 {
                break;
            }
            passes += 1;
        }
        log::trace!(
            "Solved {} of {} updateables in {} passes on {} threads",
            active_count,
            self.entries.len(),
            passes,
            rayon::current_num_threads()
        );
    }

    /// Apply pending island splits and decide which updateables get solved this step.
    fn begin_step(&mut self, bodies: &BodySet) -> usize {
        self.islands.flush_splits();
        let mut active_count = 0;
        for entry in &mut self.entries {
            let mut all_kinematic = true;
            let mut any_awake = false;
            for key in &entry.bodies {
                match bodies.get(*key) {
                    Some(body) if body.is_kinematic() => {}
                    Some(_) => {
                        all_kinematic = false;
                        any_awake |= self.islands.is_body_active(*key);
                    }
                    None => all_kinematic = false,
                }
            }
            let settings = entry.updateable.settings_mut();
            settings.reset_counters();
            settings.is_active_in_solver = settings.is_active && (all_kinematic || any_awake);
            if settings.is_active_in_solver {
                active_count += 1;
            }
        }
        active_count
    }

    /// Stride and offset for the next pass, `(stride * i + offset) % n`.
    fn next_permutation(&mut self) -> (usize, usize) {
        let n = self.entries.len();
        let counter = self.permutation_counter;
        self.permutation_counter = self.permutation_counter.wrapping_add(1);
        if n == 0 {
            return (1, 0);
        }
        let stride = (0..PERMUTATION_PRIMES.len())
            .map(|i| PERMUTATION_PRIMES[(counter + i) % PERMUTATION_PRIMES.len()])
            .find(|p| n % p != 0)
            .unwrap_or(1);
        (stride, counter % n)
    }

    fn collect_bodies(
        updateable: &dyn SolverUpdateable,
        bodies: &BodySet,
    ) -> Result<Vec<BodyKey>, SolverError> {
        let involved = updateable.involved_bodies();
        if involved.is_empty() {
            return Err(SolverError::NoBodies);
        }
        if involved.iter().any(|k| !bodies.contains(*k)) {
            return Err(SolverError::UnknownBody);
        }
        let mut sorted = involved.to_vec();
        bodies.sort_for_locking(&mut sorted);
        Ok(sorted)
    }
}

fn dynamic_only(keys: &[BodyKey], bodies: &BodySet) -> Vec<BodyKey> {
    keys.iter()
        .copied()
        .filter(|k| bodies.get(*k).map_or(false, |b| !b.is_kinematic()))
        .collect()
}
