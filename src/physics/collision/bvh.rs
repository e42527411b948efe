//! A dynamic Bounding Volume Hierarchy
//! for finding overlapping pairs of moving objects and other spatial queries.

use super::{query::ray_aabb, PairHandler, Ray, Sphere, AABB};

use thunderdome as td;

//
// Internal types
//

#[derive(Clone, Copy, Debug)]
struct Node<T> {
    aabb: AABB,
    parent: Option<td::Index>,
    kind: NodeKind<T>,
}

#[derive(Clone, Copy, Debug)]
enum NodeKind<T> {
    Branch {
        children: [td::Index; 2],
        /// Volume of `aabb` as of the last refit.
        volume: f64,
        /// Volume above which the subtree gets rebuilt.
        max_volume: f64,
    },
    Leaf {
        item: T,
    },
}

/// Key to a leaf of a [`Bvh`][self::Bvh], returned on insertion.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ProxyKey(td::Index);

/// Parameters for a [`Bvh`][self::Bvh].
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde-types", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde-types", serde(default))]
pub struct BvhParams {
    /// How much a branch's volume is allowed to grow from the last time
    /// its subtree was built before the subtree is rebuilt from scratch.
    ///
    /// Smaller values keep the tree tighter at the cost of more frequent rebuilds.
    pub max_volume_scale: f64,
}

impl Default for BvhParams {
    fn default() -> Self {
        Self {
            max_volume_scale: 1.4,
        }
    }
}

//
// BVH itself
//

/// A Bounding Volume Hierarchy implemented as an
/// incrementally constructed binary AABB tree.
///
/// Every leaf holds one object of type `T` (typically a key to something
/// stored elsewhere) along with its bounding box.
/// Branch nodes always have exactly two children, so a tree with N >= 2 leaves
/// has N - 1 branches.
#[derive(Clone, Debug)]
pub struct Bvh<T> {
    // leaves and branches live in the same arena,
    // freed slots are reused by later insertions
    nodes: td::Arena<Node<T>>,
    root: Option<td::Index>,
    leaf_count: usize,
    params: BvhParams,
    /// Stacks kept around so that we don't need to
    /// allocate separate ones for every traversal.
    shared_stack: Vec<td::Index>,
    shared_pair_stack: Vec<(td::Index, td::Index)>,
    refit_stack: Vec<(td::Index, bool)>,
    revalidate_leaves: Vec<td::Index>,
}

impl<T: Copy> Default for Bvh<T> {
    fn default() -> Self {
        Self::new(BvhParams::default())
    }
}

impl<T: Copy> Bvh<T> {
    pub fn new(params: BvhParams) -> Self {
        Self {
            nodes: td::Arena::new(),
            root: None,
            leaf_count: 0,
            params,
            shared_stack: Vec::new(),
            shared_pair_stack: Vec::new(),
            refit_stack: Vec::new(),
            revalidate_leaves: Vec::new(),
        }
    }

    pub fn clear(&mut self) {
        self.nodes.clear();
        self.root = None;
        self.leaf_count = 0;
    }

    #[inline]
    pub fn leaf_count(&self) -> usize {
        self.leaf_count
    }

    #[inline]
    pub fn branch_count(&self) -> usize {
        self.nodes.len() - self.leaf_count
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.root.is_none()
    }

    /// Get the object stored in a leaf and its current bounding box.
    pub fn get(&self, key: ProxyKey) -> Option<(T, AABB)> {
        let node = self.nodes.get(key.0)?;
        match node.kind {
            NodeKind::Leaf { item } => Some((item, node.aabb)),
            NodeKind::Branch { .. } => None,
        }
    }

    /// Bounding box of the whole tree.
    pub fn root_aabb(&self) -> Option<AABB> {
        self.root.map(|r| self.nodes[r].aabb)
    }

    //
    // Insertion and removal
    //

    pub fn insert(&mut self, item: T, aabb: AABB) -> ProxyKey {
        let leaf = self.nodes.insert(Node {
            aabb,
            parent: None,
            kind: NodeKind::Leaf { item },
        });
        self.leaf_count += 1;

        match self.root {
            None => self.root = Some(leaf),
            Some(root) => self.insert_leaf_under(root, leaf),
        }

        ProxyKey(leaf)
    }

    /// Remove a leaf from the tree, returning its object if the key was valid.
    pub fn remove(&mut self, key: ProxyKey) -> Option<T> {
        let item = match self.nodes.get(key.0)?.kind {
            NodeKind::Leaf { item } => item,
            NodeKind::Branch { .. } => return None,
        };
        let leaf = self.nodes.remove(key.0)?;
        self.leaf_count -= 1;

        let parent = match leaf.parent {
            Some(p) => p,
            None => {
                self.root = None;
                return Some(item);
            }
        };

        // the sibling takes the parent's place and the parent branch is released
        let sibling = match self.nodes[parent].kind {
            NodeKind::Branch { children, .. } => {
                if children[0] == key.0 {
                    children[1]
                } else {
                    children[0]
                }
            }
            NodeKind::Leaf { .. } => unreachable!("Leaf node was the parent of another node"),
        };
        let grandparent = self.nodes[parent].parent;
        self.nodes.remove(parent);
        self.nodes[sibling].parent = grandparent;
        self.replace_child(grandparent, parent, sibling);
        self.refit_path(grandparent, None);

        Some(item)
    }

    /// Insert an already allocated leaf into the subtree starting at `subtree_root`,
    /// updating every branch on the way down to the leaf's final position.
    fn insert_leaf_under(&mut self, subtree_root: td::Index, leaf: td::Index) {
        let leaf_aabb = self.nodes[leaf].aabb;
        let mut curr = subtree_root;
        loop {
            match self.nodes[curr].kind {
                NodeKind::Branch { children, .. } => {
                    // descend toward whichever child grows the least in volume
                    let growth = children.map(|c| {
                        let child_aabb = self.nodes[c].aabb;
                        child_aabb.union(&leaf_aabb).volume() - child_aabb.volume()
                    });
                    curr = if growth[0] < growth[1] {
                        children[0]
                    } else {
                        children[1]
                    };
                }
                NodeKind::Leaf { .. } => {
                    // put a branch where this leaf was, pairing it with the new leaf
                    let parent = self.nodes[curr].parent;
                    let branch = self.make_branch([curr, leaf], parent);
                    self.replace_child(parent, curr, branch);
                    if curr != subtree_root {
                        self.refit_path(parent, Some(subtree_root));
                    }
                    return;
                }
            }
        }
    }

    /// Allocate a branch node with the given children and set their parent links.
    fn make_branch(&mut self, children: [td::Index; 2], parent: Option<td::Index>) -> td::Index {
        let aabb = self.nodes[children[0]]
            .aabb
            .union(&self.nodes[children[1]].aabb);
        let volume = aabb.volume();
        let branch = self.nodes.insert(Node {
            aabb,
            parent,
            kind: NodeKind::Branch {
                children,
                volume,
                max_volume: volume * self.params.max_volume_scale,
            },
        });
        for c in children {
            self.nodes[c].parent = Some(branch);
        }
        branch
    }

    /// Point `parent`'s link to `old` at `new` instead.
    /// A `None` parent means the root.
    fn replace_child(&mut self, parent: Option<td::Index>, old: td::Index, new: td::Index) {
        match parent {
            None => self.root = Some(new),
            Some(p) => {
                if let NodeKind::Branch { children, .. } = &mut self.nodes[p].kind {
                    for c in children.iter_mut() {
                        if *c == old {
                            *c = new;
                        }
                    }
                }
            }
        }
    }

    /// Recompute a branch's box, volume and volume threshold from its children.
    fn update_branch(&mut self, branch: td::Index) {
        let children = match self.nodes[branch].kind {
            NodeKind::Branch { children, .. } => children,
            NodeKind::Leaf { .. } => return,
        };
        let aabb = self.nodes[children[0]]
            .aabb
            .union(&self.nodes[children[1]].aabb);
        let new_volume = aabb.volume();
        let scale = self.params.max_volume_scale;
        let node = &mut self.nodes[branch];
        node.aabb = aabb;
        if let NodeKind::Branch {
            volume, max_volume, ..
        } = &mut node.kind
        {
            *volume = new_volume;
            *max_volume = new_volume * scale;
        }
    }

    /// Update branches from `from` upwards, stopping after `stop_at` (or at the root).
    fn refit_path(&mut self, from: Option<td::Index>, stop_at: Option<td::Index>) {
        let mut curr = from;
        while let Some(idx) = curr {
            self.update_branch(idx);
            if Some(idx) == stop_at {
                return;
            }
            curr = self.nodes[idx].parent;
        }
    }

    //
    // Refit and revalidation
    //

    /// Recompute every bounding box in the tree.
    ///
    /// Leaf boxes are fetched with `get_aabb` and branches are recomputed
    /// from their children. Branches whose volume has grown past the threshold
    /// set when their subtree was last built are rebuilt from scratch.
    pub fn refit(&mut self, mut get_aabb: impl FnMut(T) -> AABB) {
        let root = match self.root {
            Some(r) => r,
            None => return,
        };

        let mut stack = std::mem::take(&mut self.refit_stack);
        stack.push((root, false));
        while let Some((idx, children_done)) = stack.pop() {
            match self.nodes[idx].kind {
                NodeKind::Leaf { item } => {
                    self.nodes[idx].aabb = get_aabb(item);
                }
                NodeKind::Branch { children, .. } if !children_done => {
                    // come back to this after both children are done
                    stack.push((idx, true));
                    stack.push((children[1], false));
                    stack.push((children[0], false));
                }
                NodeKind::Branch {
                    children,
                    max_volume,
                    ..
                } => {
                    let aabb = self.nodes[children[0]]
                        .aabb
                        .union(&self.nodes[children[1]].aabb);
                    let new_volume = aabb.volume();
                    if new_volume > max_volume {
                        self.revalidate(idx);
                    } else {
                        let node = &mut self.nodes[idx];
                        node.aabb = aabb;
                        if let NodeKind::Branch { volume, .. } = &mut node.kind {
                            *volume = new_volume;
                        }
                    }
                }
            }
        }
        self.refit_stack = stack;
    }

    /// Rebuild the subtree under a branch by collecting all its leaves
    /// and inserting them again from scratch.
    fn revalidate(&mut self, branch: td::Index) {
        let children = match self.nodes[branch].kind {
            NodeKind::Branch { children, .. } => children,
            NodeKind::Leaf { .. } => return,
        };

        // collect leaves, releasing every branch below this one on the way
        let mut leaves = std::mem::take(&mut self.revalidate_leaves);
        leaves.clear();
        let mut stack = std::mem::take(&mut self.shared_stack);
        stack.clear();
        stack.extend(children);
        while let Some(idx) = stack.pop() {
            match self.nodes[idx].kind {
                NodeKind::Leaf { .. } => leaves.push(idx),
                NodeKind::Branch { children, .. } => {
                    stack.extend(children);
                    self.nodes.remove(idx);
                }
            }
        }
        self.shared_stack = stack;

        debug_assert!(leaves.len() >= 2, "Branch had fewer than two leaves below it");
        log::debug!("Rebuilding BVH subtree with {} leaves", leaves.len());

        // the first two leaves fill the branch's slots directly,
        // the rest go through the normal insertion path
        let first = [leaves[0], leaves[1]];
        if let NodeKind::Branch { children, .. } = &mut self.nodes[branch].kind {
            *children = first;
        }
        for c in first {
            self.nodes[c].parent = Some(branch);
        }
        self.update_branch(branch);
        for &leaf in &leaves[2..] {
            self.insert_leaf_under(branch, leaf);
        }

        self.revalidate_leaves = leaves;
    }

    //
    // Pair queries
    //

    /// Find every pair of leaves in this tree whose boxes overlap.
    ///
    /// Each unordered pair is reported exactly once and no leaf is paired with itself.
    pub fn self_overlaps(&mut self, handler: &mut impl PairHandler<T>) {
        let root = match self.root {
            Some(r) => r,
            None => return,
        };
        if matches!(self.nodes[root].kind, NodeKind::Leaf { .. }) {
            return;
        }

        let nodes = &self.nodes;
        let stack = &mut self.shared_pair_stack;
        stack.clear();
        stack.push((root, root));
        while let Some((a, b)) = stack.pop() {
            let (node_a, node_b) = (&nodes[a], &nodes[b]);
            match (node_a.kind, node_b.kind) {
                (NodeKind::Branch { children, .. }, _) if a == b => {
                    // pairs within each child, then pairs between the two children
                    for c in children {
                        if matches!(nodes[c].kind, NodeKind::Branch { .. }) {
                            stack.push((c, c));
                        }
                    }
                    if nodes[children[0]]
                        .aabb
                        .intersects(&nodes[children[1]].aabb)
                    {
                        stack.push((children[0], children[1]));
                    }
                }
                (NodeKind::Leaf { item: item_a }, NodeKind::Leaf { item: item_b }) => {
                    debug_assert!(a != b, "Paired a leaf with itself");
                    handler.try_add_overlap(item_a, item_b);
                }
                (NodeKind::Branch { children: ca, .. }, NodeKind::Branch { children: cb, .. }) => {
                    for x in ca {
                        for y in cb {
                            if nodes[x].aabb.intersects(&nodes[y].aabb) {
                                stack.push((x, y));
                            }
                        }
                    }
                }
                (NodeKind::Branch { children, .. }, NodeKind::Leaf { .. }) => {
                    for x in children {
                        if nodes[x].aabb.intersects(&node_b.aabb) {
                            stack.push((x, b));
                        }
                    }
                }
                (NodeKind::Leaf { .. }, NodeKind::Branch { children, .. }) => {
                    for y in children {
                        if node_a.aabb.intersects(&nodes[y].aabb) {
                            stack.push((a, y));
                        }
                    }
                }
            }
        }
    }

    /// Find every pair of a leaf in this tree and a leaf in another tree
    /// whose boxes overlap.
    pub fn overlaps_with<U: Copy>(&mut self, other: &Bvh<U>, handler: &mut impl FnMut(T, U)) {
        let (root_a, root_b) = match (self.root, other.root) {
            (Some(a), Some(b)) => (a, b),
            _ => return,
        };
        let (nodes_a, nodes_b) = (&self.nodes, &other.nodes);
        if !nodes_a[root_a].aabb.intersects(&nodes_b[root_b].aabb) {
            return;
        }

        let stack = &mut self.shared_pair_stack;
        stack.clear();
        stack.push((root_a, root_b));
        while let Some((a, b)) = stack.pop() {
            let (node_a, node_b) = (&nodes_a[a], &nodes_b[b]);
            match (node_a.kind, node_b.kind) {
                (NodeKind::Leaf { item: item_a }, NodeKind::Leaf { item: item_b }) => {
                    handler(item_a, item_b);
                }
                (NodeKind::Branch { children: ca, .. }, NodeKind::Branch { children: cb, .. }) => {
                    for x in ca {
                        for y in cb {
                            if nodes_a[x].aabb.intersects(&nodes_b[y].aabb) {
                                stack.push((x, y));
                            }
                        }
                    }
                }
                (NodeKind::Branch { children, .. }, NodeKind::Leaf { .. }) => {
                    for x in children {
                        if nodes_a[x].aabb.intersects(&node_b.aabb) {
                            stack.push((x, b));
                        }
                    }
                }
                (NodeKind::Leaf { .. }, NodeKind::Branch { children, .. }) => {
                    for y in children {
                        if node_a.aabb.intersects(&nodes_b[y].aabb) {
                            stack.push((a, y));
                        }
                    }
                }
            }
        }
    }

    //
    // Region queries
    //

    /// Collect every object whose box intersects the given box.
    pub fn query_aabb(&mut self, aabb: AABB, out: &mut Vec<T>) {
        self.query_with(|node_aabb| node_aabb.intersects(&aabb), out);
    }

    /// Collect every object whose box intersects the given sphere.
    pub fn query_sphere(&mut self, sphere: Sphere, out: &mut Vec<T>) {
        self.query_with(|node_aabb| node_aabb.intersects_sphere(&sphere), out);
    }

    /// Collect every object whose box is hit by the ray before distance `max_t`.
    ///
    /// Results are in traversal order, not sorted by distance.
    pub fn query_ray(&mut self, ray: Ray, max_t: f64, out: &mut Vec<T>) {
        self.query_with(
            |node_aabb| matches!(ray_aabb(ray, *node_aabb), Some(t) if t <= max_t),
            out,
        );
    }

    fn query_with(&mut self, mut hits: impl FnMut(&AABB) -> bool, out: &mut Vec<T>) {
        let root = match self.root {
            Some(r) => r,
            None => return,
        };
        let stack = &mut self.shared_stack;
        stack.clear();
        if hits(&self.nodes[root].aabb) {
            stack.push(root);
        }
        while let Some(idx) = stack.pop() {
            match self.nodes[idx].kind {
                NodeKind::Branch { children, .. } => {
                    for c in children {
                        if hits(&self.nodes[c].aabb) {
                            stack.push(c);
                        }
                    }
                }
                NodeKind::Leaf { item } => out.push(item),
            }
        }
    }

    //
    // Debug info
    //

    /// Generate a list of branch AABBs for debug drawing.
    pub fn branch_aabbs(&self) -> Vec<NodeInfo> {
        let mut nodes = Vec::new();
        let mut stack: Vec<(td::Index, usize)> = self.root.into_iter().map(|r| (r, 0)).collect();
        while let Some((idx, depth)) = stack.pop() {
            if let NodeKind::Branch { children, .. } = self.nodes[idx].kind {
                nodes.push(NodeInfo {
                    aabb: self.nodes[idx].aabb,
                    depth,
                });
                for c in children {
                    stack.push((c, depth + 1));
                }
            }
        }
        nodes
    }
}

/// Bounding box and depth of a branch in the tree.
#[derive(Clone, Copy, Debug)]
pub struct NodeInfo {
    pub aabb: AABB,
    pub depth: usize,
}

//
// tests
//

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math as m;
    use crate::physics::collision::{BroadPhase, BruteForce};
    use rand::{Rng, SeedableRng};
    use std::collections::HashSet;

    fn cube(min: f64, size: f64) -> AABB {
        AABB::new(m::Vec3::broadcast(min), m::Vec3::broadcast(min + size))
    }

    fn random_box(rng: &mut impl Rng, world_size: f64) -> AABB {
        let min = m::Vec3::new(
            rng.gen_range(0.0..world_size),
            rng.gen_range(0.0..world_size),
            rng.gen_range(0.0..world_size),
        );
        let size = m::Vec3::new(
            rng.gen_range(0.1..2.0),
            rng.gen_range(0.1..2.0),
            rng.gen_range(0.1..2.0),
        );
        AABB::new(min, min + size)
    }

    fn sorted_pair(a: usize, b: usize) -> (usize, usize) {
        (a.min(b), a.max(b))
    }

    fn self_pairs(bvh: &mut Bvh<usize>) -> Vec<(usize, usize)> {
        let mut pairs = Vec::new();
        bvh.self_overlaps(&mut |a: usize, b: usize| pairs.push(sorted_pair(a, b)));
        pairs.sort_unstable();
        pairs
    }

    fn brute_force_pairs(boxes: &[AABB]) -> Vec<(usize, usize)> {
        let mut bf = BruteForce {
            items: boxes.iter().copied().enumerate().collect(),
        };
        let mut pairs = Vec::new();
        bf.find_pairs(&mut |a: usize, b: usize| pairs.push(sorted_pair(a, b)));
        pairs.sort_unstable();
        pairs
    }

    /// Walk the whole tree checking parent links, branch shapes and box containment.
    /// Returns the set of items found in leaves.
    fn check_structure(bvh: &Bvh<usize>) -> HashSet<usize> {
        let mut items = HashSet::new();
        let root = match bvh.root {
            Some(r) => r,
            None => {
                assert_eq!(bvh.leaf_count(), 0);
                return items;
            }
        };
        assert!(bvh.nodes[root].parent.is_none());
        let mut stack = vec![root];
        while let Some(idx) = stack.pop() {
            let node = &bvh.nodes[idx];
            match node.kind {
                NodeKind::Leaf { item } => {
                    assert!(items.insert(item), "item {item} was in the tree twice");
                }
                NodeKind::Branch {
                    children, volume, ..
                } => {
                    let merged = bvh.nodes[children[0]]
                        .aabb
                        .union(&bvh.nodes[children[1]].aabb);
                    assert!(node.aabb.contains(&merged));
                    assert!((volume - merged.volume()).abs() < 1e-9);
                    for c in children {
                        assert_eq!(bvh.nodes[c].parent, Some(idx));
                        stack.push(c);
                    }
                }
            }
        }
        assert_eq!(items.len(), bvh.leaf_count());
        if bvh.leaf_count() >= 2 {
            assert_eq!(bvh.branch_count(), bvh.leaf_count() - 1);
        }
        items
    }

    #[test]
    fn three_box_scenario() {
        let mut boxes = vec![cube(0.0, 1.0), cube(0.5, 1.0), cube(10.0, 1.0)];
        let mut bvh = Bvh::default();
        for (i, aabb) in boxes.iter().enumerate() {
            bvh.insert(i, *aabb);
        }
        assert_eq!(self_pairs(&mut bvh), vec![(0, 1)]);

        boxes[2] = cube(0.4, 1.0);
        bvh.refit(|i| boxes[i]);
        check_structure(&bvh);
        assert_eq!(self_pairs(&mut bvh), vec![(0, 1), (0, 2), (1, 2)]);
    }

    #[test]
    fn node_counts() {
        let mut bvh = Bvh::default();
        assert!(bvh.is_empty());
        bvh.insert(0, cube(0.0, 1.0));
        assert_eq!((bvh.leaf_count(), bvh.branch_count()), (1, 0));
        for i in 1..50 {
            bvh.insert(i, cube(i as f64 * 0.7, 1.0));
            assert_eq!(bvh.leaf_count(), i + 1);
            assert_eq!(bvh.branch_count(), i);
        }
        check_structure(&bvh);
    }

    #[test]
    fn single_leaf_has_no_pairs() {
        let mut bvh = Bvh::default();
        bvh.insert(0, cube(0.0, 1.0));
        assert!(self_pairs(&mut bvh).is_empty());
        let mut hits = Vec::new();
        bvh.query_aabb(cube(0.5, 1.0), &mut hits);
        assert_eq!(hits, vec![0]);
    }

    #[test]
    fn pairs_match_brute_force_under_motion() {
        let mut rng = rand::rngs::StdRng::seed_from_u64(7);
        let mut boxes: Vec<AABB> = (0..200).map(|_| random_box(&mut rng, 20.0)).collect();
        let mut bvh = Bvh::default();
        for (i, aabb) in boxes.iter().enumerate() {
            bvh.insert(i, *aabb);
        }

        for _step in 0..20 {
            let pairs = self_pairs(&mut bvh);
            // no duplicates, no self pairs, nothing missing
            let dedup: HashSet<_> = pairs.iter().copied().collect();
            assert_eq!(dedup.len(), pairs.len());
            assert!(pairs.iter().all(|(a, b)| a != b));
            assert_eq!(pairs, brute_force_pairs(&boxes));

            for aabb in &mut boxes {
                let offset = m::Vec3::new(
                    rng.gen_range(-1.0..1.0),
                    rng.gen_range(-1.0..1.0),
                    rng.gen_range(-1.0..1.0),
                );
                *aabb = AABB::new(aabb.min + offset, aabb.max + offset);
            }
            bvh.refit(|i| boxes[i]);
            let items = check_structure(&bvh);
            assert_eq!(items.len(), boxes.len());
        }
    }

    #[test]
    fn revalidation_keeps_all_leaves() {
        let mut boxes: Vec<AABB> = (0..16).map(|i| cube(i as f64 * 2.0, 1.0)).collect();
        let mut bvh = Bvh::new(BvhParams {
            max_volume_scale: 1.01,
        });
        for (i, aabb) in boxes.iter().enumerate() {
            bvh.insert(i, *aabb);
        }
        let branches_before = bvh.branch_count();

        // scatter everything far enough to blow every volume threshold
        for (i, aabb) in boxes.iter_mut().enumerate() {
            *aabb = cube(-(i as f64) * 5.0, 1.0 + i as f64 * 0.1);
        }
        bvh.refit(|i| boxes[i]);

        let items = check_structure(&bvh);
        assert_eq!(items, (0..16).collect::<HashSet<_>>());
        assert_eq!(bvh.branch_count(), branches_before);
        let root = bvh.root_aabb().expect("tree was empty");
        for aabb in &boxes {
            assert!(root.contains(aabb));
        }
        assert_eq!(self_pairs(&mut bvh), brute_force_pairs(&boxes));
    }

    #[test]
    fn removal() {
        let mut rng = rand::rngs::StdRng::seed_from_u64(3);
        let boxes: Vec<AABB> = (0..64).map(|_| random_box(&mut rng, 10.0)).collect();
        let mut bvh = Bvh::default();
        let keys: Vec<ProxyKey> = boxes
            .iter()
            .enumerate()
            .map(|(i, aabb)| bvh.insert(i, *aabb))
            .collect();

        // remove every other object
        for (i, key) in keys.iter().enumerate().filter(|(i, _)| i % 2 == 0) {
            assert_eq!(bvh.remove(*key), Some(i));
        }
        // stale keys do nothing
        assert_eq!(bvh.remove(keys[0]), None);
        assert!(bvh.get(keys[0]).is_none());
        assert_eq!(bvh.get(keys[1]).map(|(item, _)| item), Some(1));

        let items = check_structure(&bvh);
        assert_eq!(items, (0..64).filter(|i| i % 2 == 1).collect::<HashSet<_>>());

        let remaining: Vec<AABB> = boxes
            .iter()
            .enumerate()
            .map(|(i, aabb)| {
                if i % 2 == 1 {
                    *aabb
                } else {
                    // removed objects moved far away so brute force ignores them
                    cube(1000.0 + i as f64 * 10.0, 1.0)
                }
            })
            .collect();
        assert_eq!(self_pairs(&mut bvh), brute_force_pairs(&remaining));

        for (i, key) in keys.iter().enumerate().filter(|(i, _)| i % 2 == 1) {
            assert_eq!(bvh.remove(*key), Some(i));
        }
        assert!(bvh.is_empty());
        assert_eq!(bvh.branch_count(), 0);
    }

    #[test]
    fn region_and_ray_queries() {
        let boxes = [cube(0.0, 1.0), cube(0.5, 1.0), cube(10.0, 1.0), cube(20.0, 1.0)];
        let mut bvh = Bvh::default();
        for (i, aabb) in boxes.iter().enumerate() {
            bvh.insert(i, *aabb);
        }

        let mut out = Vec::new();
        bvh.query_aabb(cube(9.0, 2.0), &mut out);
        assert_eq!(out, vec![2]);

        out.clear();
        bvh.query_sphere(
            Sphere {
                center: m::Vec3::broadcast(0.75),
                radius: 0.1,
            },
            &mut out,
        );
        out.sort_unstable();
        assert_eq!(out, vec![0, 1]);

        let ray = Ray {
            start: m::Vec3::broadcast(-5.0),
            dir: m::Unit::new_normalize(m::Vec3::broadcast(1.0)),
        };
        out.clear();
        bvh.query_ray(ray, f64::INFINITY, &mut out);
        out.sort_unstable();
        assert_eq!(out, vec![0, 1, 2, 3]);

        // only long enough to reach the first two boxes
        out.clear();
        bvh.query_ray(ray, 12.0, &mut out);
        out.sort_unstable();
        assert_eq!(out, vec![0, 1]);
    }

    #[test]
    fn cross_tree_pairs() {
        let mut a = Bvh::default();
        let mut b = Bvh::default();
        for i in 0..10 {
            a.insert(i, cube(i as f64 * 3.0, 1.0));
            b.insert(i, cube(i as f64 * 3.0 + 0.5, 1.0));
        }
        b.insert(100, cube(-50.0, 1.0));

        let mut pairs = Vec::new();
        a.overlaps_with(&b, &mut |x: usize, y: usize| pairs.push((x, y)));
        pairs.sort_unstable();
        assert_eq!(pairs, (0..10).map(|i| (i, i)).collect::<Vec<_>>());
    }

    #[test]
    fn debug_boxes_contain_children() {
        let mut bvh = Bvh::default();
        for i in 0..8 {
            bvh.insert(i, cube(i as f64, 0.5));
        }
        let infos = bvh.branch_aabbs();
        assert_eq!(infos.len(), 7);
        let root = infos.iter().find(|info| info.depth == 0).expect("no root");
        for info in &infos {
            assert!(root.aabb.contains(&info.aabb));
        }
    }
}
