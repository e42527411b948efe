//! Simulation islands, groups of dynamic bodies connected by constraints
//! that fall asleep and wake up together.

use super::{BodyKey, BodySet};

use std::collections::{HashMap, HashSet, VecDeque};
use thunderdome as td;

/// Key of an island in an [`IslandManager`][self::IslandManager].
///
/// Islands get created and destroyed all the time as bodies touch and separate,
/// so keys to them only stay valid until the next merge or split.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct IslandKey(td::Index);

/// Key of a connection between bodies, typically one per solver updateable.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ConnectionKey(td::Index);

/// Parameters controlling when islands go to sleep.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde-types", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde-types", serde(default))]
pub struct SleepParams {
    /// If false, islands never sleep.
    pub enabled: bool,
    /// Linear and angular speed under which a body counts as still.
    pub velocity_threshold: f64,
    /// How long every body of an island needs to stay still before it sleeps.
    pub time_to_sleep: f64,
}

impl Default for SleepParams {
    fn default() -> Self {
        Self {
            enabled: true,
            velocity_threshold: 0.05,
            time_to_sleep: 1.0,
        }
    }
}

#[derive(Debug)]
struct Member {
    island: td::Index,
    connections: Vec<ConnectionKey>,
    idle_time: f64,
}

#[derive(Debug)]
struct Island {
    members: Vec<BodyKey>,
    is_active: bool,
}

impl Island {
    fn new(members: Vec<BodyKey>, is_active: bool) -> Self {
        Self { members, is_active }
    }
}

/// Tracks the connected components of the graph of dynamic bodies
/// and the constraints between them.
///
/// Adding connections merges islands immediately.
/// Removing them only queues a split check, which happens in
/// [`flush_splits`][Self::flush_splits], since removals tend to come in bunches
/// and splitting is comparatively expensive.
#[derive(Debug, Default)]
pub struct IslandManager {
    members: HashMap<BodyKey, Member>,
    islands: td::Arena<Island>,
    connections: td::Arena<Vec<BodyKey>>,
    pending_splits: Vec<td::Index>,
    pub params: SleepParams,
}

impl IslandManager {
    pub fn new(params: SleepParams) -> Self {
        Self {
            params,
            ..Default::default()
        }
    }

    /// Register a dynamic body as its own island.
    /// Does nothing if the body is already known.
    pub fn add_body(&mut self, body: BodyKey) {
        if self.members.contains_key(&body) {
            return;
        }
        let island = self.islands.insert(Island::new(vec![body], true));
        self.members.insert(
            body,
            Member {
                island,
                connections: Vec::new(),
                idle_time: 0.0,
            },
        );
    }

    /// Forget a body and every connection it was part of.
    /// The rest of its island gets checked for a split.
    pub fn remove_body(&mut self, body: BodyKey) {
        let member = match self.members.remove(&body) {
            Some(m) => m,
            None => return,
        };
        for conn in &member.connections {
            if let Some(conn_bodies) = self.connections.get_mut(conn.0) {
                conn_bodies.retain(|b| *b != body);
            }
        }
        let island_empty = match self.islands.get_mut(member.island) {
            Some(island) => {
                island.members.retain(|b| *b != body);
                island.members.is_empty()
            }
            None => false,
        };
        if island_empty {
            self.islands.remove(member.island);
            self.pending_splits.retain(|i| *i != member.island);
        } else if !member.connections.is_empty() {
            self.queue_split(member.island);
        }
    }

    /// Connect a set of dynamic bodies, merging their islands into one active island.
    /// Bodies not yet known are added.
    pub fn add_connection(&mut self, bodies: &[BodyKey]) -> ConnectionKey {
        let key = ConnectionKey(self.connections.insert(bodies.to_vec()));
        for &body in bodies {
            self.add_body(body);
            if let Some(member) = self.members.get_mut(&body) {
                member.connections.push(key);
            }
        }

        let mut islands: Vec<td::Index> = bodies
            .iter()
            .filter_map(|b| self.members.get(b))
            .map(|m| m.island)
            .collect();
        islands.sort_unstable_by_key(|i| i.to_bits());
        islands.dedup();
        if let Some(target) = self.merge_islands(&islands) {
            self.wake_island(target);
        }
        key
    }

    /// Remove a connection and queue a split check for its island.
    pub fn remove_connection(&mut self, key: ConnectionKey) {
        let bodies = match self.connections.remove(key.0) {
            Some(b) => b,
            None => return,
        };
        for body in &bodies {
            if let Some(member) = self.members.get_mut(body) {
                member.connections.retain(|c| *c != key);
            }
        }
        // a connection between fewer than two bodies never holds an island together
        if bodies.len() >= 2 {
            if let Some(member) = self.members.get(&bodies[0]) {
                self.queue_split(member.island);
            }
        }
    }

    /// Replace the bodies of a connection, as if it was removed and added again.
    pub fn replace_connection(&mut self, key: ConnectionKey, bodies: &[BodyKey]) -> ConnectionKey {
        self.remove_connection(key);
        self.add_connection(bodies)
    }

    /// Split every island queued by connection removals
    /// into its actual connected components.
    pub fn flush_splits(&mut self) {
        let _span = tracy_span!("flush island splits", "flush_splits");

        let pending = std::mem::take(&mut self.pending_splits);
        let mut visited: HashSet<BodyKey> = HashSet::new();
        let mut queue: VecDeque<BodyKey> = VecDeque::new();
        for island_idx in pending {
            let (members, is_active) = match self.islands.get(island_idx) {
                Some(island) => (island.members.clone(), island.is_active),
                None => continue,
            };
            visited.clear();
            let mut components: Vec<Vec<BodyKey>> = Vec::new();
            for &start in &members {
                if visited.contains(&start) {
                    continue;
                }
                let mut component = Vec::new();
                visited.insert(start);
                queue.push_back(start);
                while let Some(body) = queue.pop_front() {
                    component.push(body);
                    let member = match self.members.get(&body) {
                        Some(m) => m,
                        None => continue,
                    };
                    for conn in &member.connections {
                        for &other in self.connections.get(conn.0).into_iter().flatten() {
                            if visited.insert(other) {
                                queue.push_back(other);
                            }
                        }
                    }
                }
                components.push(component);
            }

            if components.len() <= 1 {
                continue;
            }
            log::debug!("Splitting island into {} parts", components.len());
            let mut components = components.into_iter();
            if let (Some(first), Some(island)) = (components.next(), self.islands.get_mut(island_idx)) {
                island.members = first;
            }
            for component in components {
                let new_island = self.islands.insert(Island::new(component, is_active));
                for body in &self.islands[new_island].members {
                    if let Some(member) = self.members.get_mut(body) {
                        member.island = new_island;
                    }
                }
            }
        }
    }

    /// Advance sleep timers and put islands that have been still long enough to sleep.
    /// Sleeping bodies get their velocities zeroed.
    pub fn update(&mut self, dt: f64, bodies: &mut BodySet) {
        let _span = tracy_span!("update islands", "update");

        if !self.params.enabled {
            return;
        }
        let threshold = self.params.velocity_threshold;
        let mut fell_asleep = 0;
        for (_, island) in self.islands.iter_mut().filter(|(_, i)| i.is_active) {
            let mut all_idle = true;
            for key in &island.members {
                let still = match bodies.get(*key) {
                    Some(body) => {
                        let vel = body.velocity();
                        vel.linear.mag() < threshold && vel.angular.mag() < threshold
                    }
                    None => true,
                };
                if let Some(member) = self.members.get_mut(key) {
                    member.idle_time = if still { member.idle_time + dt } else { 0.0 };
                    all_idle &= member.idle_time >= self.params.time_to_sleep;
                }
            }
            if all_idle {
                island.is_active = false;
                fell_asleep += 1;
                for key in &island.members {
                    if let Some(body) = bodies.get_mut(*key) {
                        *body.velocity_mut() = Default::default();
                    }
                }
            }
        }
        if fell_asleep > 0 {
            log::debug!("{} islands fell asleep", fell_asleep);
        }
    }

    /// Wake up the island a body belongs to.
    pub fn activate(&mut self, body: BodyKey) {
        match self.members.get(&body) {
            Some(member) => {
                let island = member.island;
                self.wake_island(island);
            }
            None => log::warn!("Tried to activate a body unknown to the island manager"),
        }
    }

    /// Whether the body is awake. Bodies not managed by islands are always awake.
    #[inline]
    pub fn is_body_active(&self, body: BodyKey) -> bool {
        match self.members.get(&body) {
            Some(member) => self
                .islands
                .get(member.island)
                .map_or(true, |island| island.is_active),
            None => true,
        }
    }

    pub fn island_of(&self, body: BodyKey) -> Option<IslandKey> {
        self.members.get(&body).map(|m| IslandKey(m.island))
    }

    pub fn island_members(&self, island: IslandKey) -> Option<&[BodyKey]> {
        self.islands.get(island.0).map(|i| i.members.as_slice())
    }

    pub fn is_island_active(&self, island: IslandKey) -> Option<bool> {
        self.islands.get(island.0).map(|i| i.is_active)
    }

    #[inline]
    pub fn island_count(&self) -> usize {
        self.islands.len()
    }

    pub fn clear(&mut self) {
        self.members.clear();
        self.islands.clear();
        self.connections.clear();
        self.pending_splits.clear();
    }

    fn queue_split(&mut self, island: td::Index) {
        if !self.pending_splits.contains(&island) {
            self.pending_splits.push(island);
        }
    }

    fn wake_island(&mut self, island_idx: td::Index) {
        if let Some(island) = self.islands.get_mut(island_idx) {
            island.is_active = true;
            for body in &island.members {
                if let Some(member) = self.members.get_mut(body) {
                    member.idle_time = 0.0;
                }
            }
        }
    }

    /// Merge islands into the largest one, returning it.
    fn merge_islands(&mut self, islands: &[td::Index]) -> Option<td::Index> {
        let target = *islands
            .iter()
            .max_by_key(|i| self.islands.get(**i).map_or(0, |isl| isl.members.len()))?;
        let mut pending = false;
        for &other in islands.iter().filter(|i| **i != target) {
            let removed = match self.islands.remove(other) {
                Some(isl) => isl,
                None => continue,
            };
            for body in &removed.members {
                if let Some(member) = self.members.get_mut(body) {
                    member.island = target;
                }
            }
            if let Some(target_island) = self.islands.get_mut(target) {
                target_island.members.extend(removed.members);
            }
            if let Some(pos) = self.pending_splits.iter().position(|i| *i == other) {
                self.pending_splits.swap_remove(pos);
                pending = true;
            }
        }
        if pending {
            self.queue_split(target);
        }
        Some(target)
    }
}
