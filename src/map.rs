use std::borrow::Borrow;
use std::cmp::{self, Ordering};
use std::fmt;

use log::{debug, trace};

use crate::arena::{Arena, Handle, Link, NodeIdx};
use crate::Error;

/// An ordered map implemented with an AVL tree.
///
/// ```
/// use avl_index::AvlTreeMap;
/// let mut map = AvlTreeMap::new();
/// map.insert(0, "zero");
/// map.insert(1, "one");
/// map.insert(2, "two");
/// assert_eq!(map.get(&1), Some(&"one"));
/// map.erase(&1);
/// assert!(map.get(&1).is_none());
/// ```
#[derive(Clone)]
pub struct AvlTreeMap<K, V> {
    root: Link,
    arena: Arena<K, V>,
}

/// Position at which a new leaf gets linked.
#[derive(Clone, Copy)]
enum InsertPos {
    Root,
    LeftOf(NodeIdx),
    RightOf(NodeIdx),
}

#[cfg(any(test, feature = "consistency_check"))]
#[allow(clippy::enum_variant_names)]
enum Direction {
    FromParent,
    FromLeft,
    FromRight,
}

impl<K, V> AvlTreeMap<K, V> {
    /// Creates an empty map.
    /// No memory is allocated until the first item is inserted.
    pub fn new() -> Self {
        Self {
            root: None,
            arena: Arena::new(),
        }
    }

    /// Returns true if the map contains no elements.
    pub fn is_empty(&self) -> bool {
        self.root.is_none()
    }

    /// Returns the height of the tree, or `None` if the map is empty.
    /// A map with a single entry has height 0.
    pub fn height(&self) -> Option<usize> {
        self.root.map(|root_idx| self.arena.node(root_idx).height)
    }

    /// Clears the map, deallocating all entries.
    /// Handles taken before the call are invalidated.
    pub fn clear(&mut self) {
        // Post order: detach and release leaves bottom up
        let mut num_released = 0usize;
        let mut current = self.root.take();
        while let Some(node_idx) = current {
            let node = self.arena.node(node_idx);
            if let Some(child_idx) = node.left.or(node.right) {
                current = Some(child_idx);
                continue;
            }
            let parent = node.parent;
            if let Some(parent_idx) = parent {
                let parent_node = self.arena.node_mut(parent_idx);
                if parent_node.left == Some(node_idx) {
                    parent_node.left = None;
                } else {
                    parent_node.right = None;
                }
            }
            self.arena.destroy(node_idx);
            num_released += 1;
            current = parent;
        }
        debug!("cleared map, released {num_released} nodes");
    }

    /// Returns the key of the entry denoted by `handle`, or `None` if the handle is stale.
    pub fn key(&self, handle: Handle) -> Option<&K> {
        self.arena.resolve(handle).map(|node| &node.key)
    }

    /// Returns the value of the entry denoted by `handle`, or `None` if the handle is stale.
    pub fn value(&self, handle: Handle) -> Option<&V> {
        self.arena.resolve(handle).map(|node| &node.value)
    }

    /// Returns a mutable reference to the value of the entry denoted by `handle`,
    /// or `None` if the handle is stale.
    pub fn value_mut(&mut self, handle: Handle) -> Option<&mut V> {
        self.arena.resolve_mut(handle).map(|node| &mut node.value)
    }

    /// Returns the key-value pair denoted by `handle`, or `None` if the handle is stale.
    pub fn entry(&self, handle: Handle) -> Option<(&K, &V)> {
        self.arena.resolve(handle).map(|node| (&node.key, &node.value))
    }

    fn left_height(&self, node_idx: NodeIdx) -> usize {
        self.link_height(self.arena.node(node_idx).left)
    }

    fn right_height(&self, node_idx: NodeIdx) -> usize {
        self.link_height(self.arena.node(node_idx).right)
    }

    // Height of the subtree behind `link`, shifted by one so that an empty subtree counts 0.
    fn link_height(&self, link: Link) -> usize {
        match link {
            None => 0,
            Some(node_idx) => self.arena.node(node_idx).height + 1,
        }
    }

    fn balance_factor(&self, node_idx: NodeIdx) -> isize {
        self.left_height(node_idx) as isize - self.right_height(node_idx) as isize
    }

    fn adjust_height(&mut self, node_idx: NodeIdx) {
        let height = cmp::max(self.left_height(node_idx), self.right_height(node_idx));
        self.arena.node_mut(node_idx).height = height;
    }

    /// Points the link that referred to `old` (a child of `parent`, or the root) at `new`.
    fn replace_child(&mut self, parent: Link, old: NodeIdx, new: Link) {
        match parent {
            None => self.root = new,
            Some(parent_idx) => {
                let parent_node = self.arena.node_mut(parent_idx);
                if parent_node.left == Some(old) {
                    parent_node.left = new;
                } else {
                    debug_assert_eq!(parent_node.right, Some(old));
                    parent_node.right = new;
                }
            }
        }
    }

    fn rotate_left(&mut self, node_idx: NodeIdx) {
        if let Some(right_idx) = self.arena.node(node_idx).right {
            trace!("rotate left at node {node_idx}");
            let right_left = self.arena.node(right_idx).left;
            self.arena.node_mut(node_idx).right = right_left;
            if let Some(right_left_idx) = right_left {
                self.arena.node_mut(right_left_idx).parent = Some(node_idx);
            }

            let parent = self.arena.node(node_idx).parent;
            self.arena.node_mut(right_idx).parent = parent;
            self.replace_child(parent, node_idx, Some(right_idx));

            self.arena.node_mut(right_idx).left = Some(node_idx);
            self.arena.node_mut(node_idx).parent = Some(right_idx);

            self.adjust_height(node_idx);
            self.adjust_height(right_idx);
        }
    }

    fn rotate_right(&mut self, node_idx: NodeIdx) {
        if let Some(left_idx) = self.arena.node(node_idx).left {
            trace!("rotate right at node {node_idx}");
            let left_right = self.arena.node(left_idx).right;
            self.arena.node_mut(node_idx).left = left_right;
            if let Some(left_right_idx) = left_right {
                self.arena.node_mut(left_right_idx).parent = Some(node_idx);
            }

            let parent = self.arena.node(node_idx).parent;
            self.arena.node_mut(left_idx).parent = parent;
            self.replace_child(parent, node_idx, Some(left_idx));

            self.arena.node_mut(left_idx).right = Some(node_idx);
            self.arena.node_mut(node_idx).parent = Some(left_idx);

            self.adjust_height(node_idx);
            self.adjust_height(left_idx);
        }
    }

    /// Rebalances nodes starting from given position up to the root node.
    /// Every ancestor is visited, since a removal may need a rotation on each level.
    fn rebalance(&mut self, start_from: Link) {
        let mut current = start_from;
        while let Some(node_idx) = current {
            let parent = self.arena.node(node_idx).parent;
            self.rebalance_node(node_idx);
            current = parent;
        }
    }

    /// Rebalances nodes starting from given position up to the root node.
    /// Stops after the first rotation, or once a node's height is unchanged.
    /// This is enough to restore balance after a single insert operation.
    fn rebalance_after_insert(&mut self, start_from: Link) {
        let mut current = start_from;
        while let Some(node_idx) = current {
            let parent = self.arena.node(node_idx).parent;
            let previous_height = self.arena.node(node_idx).height;
            if self.rebalance_node(node_idx) {
                break;
            }
            if self.arena.node(node_idx).height == previous_height {
                break;
            }
            current = parent;
        }
    }

    /// Restores AVL condition (balance) at given node if necessary and adjusts height.
    /// Resulting balance will be +1, 0 or -1 height difference between left and right subtree.
    /// Initial balance must not exceed +2 or -2, which always holds after a single update.
    /// Returns whether rebalancing had been necessary.
    fn rebalance_node(&mut self, node_idx: NodeIdx) -> bool {
        let balance = self.balance_factor(node_idx);
        debug_assert!((-2..=2).contains(&balance));
        if balance > 1 {
            // Left heavy, left-right case first straightens the left child
            if let Some(left_idx) = self.arena.node(node_idx).left {
                if self.balance_factor(left_idx) < 0 {
                    self.rotate_left(left_idx);
                }
            }
            self.rotate_right(node_idx);
            true
        } else if balance < -1 {
            // Right heavy, mirror image
            if let Some(right_idx) = self.arena.node(node_idx).right {
                if self.balance_factor(right_idx) > 0 {
                    self.rotate_right(right_idx);
                }
            }
            self.rotate_left(node_idx);
            true
        } else {
            self.adjust_height(node_idx);
            false
        }
    }

    fn leftmost(&self, mut node_idx: NodeIdx) -> NodeIdx {
        while let Some(left_idx) = self.arena.node(node_idx).left {
            node_idx = left_idx;
        }
        node_idx
    }

    /// Takes the node at `node_idx` out of the tree structure and rebalances.
    /// Returns the index of the slot to release, which holds the entry that was at `node_idx`.
    fn unlink_node(&mut self, node_idx: NodeIdx) -> NodeIdx {
        let node = self.arena.node(node_idx);
        let target_idx = match (node.left, node.right) {
            (Some(_), Some(right_idx)) => {
                // Trade entries with the in-order successor, which has no left child,
                // and take the successor's slot out instead
                let successor_idx = self.leftmost(right_idx);
                self.arena.swap_entries(node_idx, successor_idx);
                self.arena.invalidate(node_idx);
                successor_idx
            }
            _ => node_idx,
        };

        // Target node is stem or leaf, splice its child into its place
        let target = self.arena.node(target_idx);
        debug_assert!(target.left.is_none() || target.right.is_none());
        let child = target.left.or(target.right);
        let parent = target.parent;
        if let Some(child_idx) = child {
            self.arena.node_mut(child_idx).parent = parent;
        }
        self.replace_child(parent, target_idx, child);

        // Any ancestor might be out of balance now
        self.rebalance(parent);
        target_idx
    }
}

impl<K: Ord, V> AvlTreeMap<K, V> {
    /// Returns a handle to the entry corresponding to the key.
    pub fn find<Q>(&self, key: &Q) -> Option<Handle>
    where
        K: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        self.find_node(key).map(|node_idx| self.arena.handle(node_idx))
    }

    /// Returns a reference to the value corresponding to the key.
    pub fn get<Q>(&self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        self.find_node(key).map(|node_idx| &self.arena.node(node_idx).value)
    }

    /// Returns a mutable reference to the value corresponding to the key.
    pub fn get_mut<Q>(&mut self, key: &Q) -> Option<&mut V>
    where
        K: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        let node_idx = self.find_node(key)?;
        Some(&mut self.arena.node_mut(node_idx).value)
    }

    /// Returns references to the key-value pair corresponding to the key.
    pub fn get_key_value<Q>(&self, key: &Q) -> Option<(&K, &V)>
    where
        K: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        self.find_node(key).map(|node_idx| {
            let node = self.arena.node(node_idx);
            (&node.key, &node.value)
        })
    }

    /// Returns true if the map contains a value for the key.
    pub fn contains_key<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        self.find_node(key).is_some()
    }

    /// Inserts a key-value pair into the map.
    /// Returns false and leaves the map untouched if the key is already present.
    pub fn insert(&mut self, key: K, value: V) -> bool {
        match self.find_insert_pos(&key) {
            Some(pos) => {
                self.attach(pos, key, value);
                true
            }
            None => false,
        }
    }

    /// Inserts a key-value pair into the map, reporting allocation failure as an error.
    /// On error the map is left untouched.
    pub fn try_insert(&mut self, key: K, value: V) -> Result<bool, Error> {
        let Some(pos) = self.find_insert_pos(&key) else {
            return Ok(false);
        };
        self.arena.try_reserve_one()?;
        self.attach(pos, key, value);
        Ok(true)
    }

    /// Removes a key from the map.
    /// Returns whether the key was previously in the map.
    pub fn erase<Q>(&mut self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        self.remove_entry(key).is_some()
    }

    /// Removes a key from the map.
    /// Returns the value at the key if the key was previously in the map.
    pub fn remove<Q>(&mut self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        self.remove_entry(key).map(|(_, value)| value)
    }

    /// Removes a key from the map.
    /// Returns the stored key and value if the key was previously in the map.
    pub fn remove_entry<Q>(&mut self, key: &Q) -> Option<(K, V)>
    where
        K: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        let node_idx = self.find_node(key)?;
        let released_idx = self.unlink_node(node_idx);
        debug!("erased node {released_idx}");
        Some(self.arena.destroy(released_idx))
    }

    /// Asserts that all tree and storage invariants hold.
    /// Panics on the first violation.
    #[cfg(any(test, feature = "consistency_check"))]
    pub fn check_consistency(&self) {
        // Check root link
        if let Some(root_idx) = self.root {
            assert!(self.arena.node(root_idx).parent.is_none());
        }

        // Check tree nodes
        let mut num_nodes = 0;
        self.preorder(|node_idx| {
            let node = self.arena.node(node_idx);
            let mut height = 0;
            let mut left_height = 0;
            let mut right_height = 0;

            // Check link for left child node
            if let Some(left_idx) = node.left {
                let left = self.arena.node(left_idx);
                assert!(left.parent == Some(node_idx));
                assert!(left.key < node.key);
                left_height = left.height + 1;
                height = cmp::max(height, left_height);
            }

            // Check link for right child node
            if let Some(right_idx) = node.right {
                let right = self.arena.node(right_idx);
                assert!(right.parent == Some(node_idx));
                assert!(right.key > node.key);
                right_height = right.height + 1;
                height = cmp::max(height, right_height);
            }

            // Check height
            assert_eq!(node.height, height);

            // Check AVL condition (nearly balance)
            assert!(left_height <= right_height + 1);
            assert!(right_height <= left_height + 1);

            num_nodes += 1;
        });

        // Check number of nodes against storage
        assert_eq!(num_nodes, self.arena.len());
        self.arena.check_consistency();
    }

    fn find_node<Q>(&self, key: &Q) -> Link
    where
        K: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        let mut current = self.root;
        while let Some(node_idx) = current {
            let node = self.arena.node(node_idx);
            current = match key.cmp(node.key.borrow()) {
                Ordering::Equal => break,
                Ordering::Less => node.left,
                Ordering::Greater => node.right,
            }
        }
        current
    }

    fn find_insert_pos(&self, key: &K) -> Option<InsertPos> {
        let mut pos = InsertPos::Root;
        let mut current = self.root;
        while let Some(node_idx) = current {
            let node = self.arena.node(node_idx);
            match key.cmp(&node.key) {
                Ordering::Equal => return None,
                Ordering::Less => {
                    pos = InsertPos::LeftOf(node_idx);
                    current = node.left;
                }
                Ordering::Greater => {
                    pos = InsertPos::RightOf(node_idx);
                    current = node.right;
                }
            }
        }
        Some(pos)
    }

    fn attach(&mut self, pos: InsertPos, key: K, value: V) {
        let parent = match pos {
            InsertPos::Root => None,
            InsertPos::LeftOf(parent_idx) | InsertPos::RightOf(parent_idx) => Some(parent_idx),
        };
        let node_idx = self.arena.create(parent, key, value);
        match pos {
            InsertPos::Root => self.root = Some(node_idx),
            InsertPos::LeftOf(parent_idx) => self.arena.node_mut(parent_idx).left = Some(node_idx),
            InsertPos::RightOf(parent_idx) => self.arena.node_mut(parent_idx).right = Some(node_idx),
        }
        debug!("inserted node {node_idx}");
        self.rebalance_after_insert(parent);
    }

    #[cfg(any(test, feature = "consistency_check"))]
    fn preorder<F: FnMut(NodeIdx)>(&self, mut f: F) {
        if let Some(mut node_idx) = self.root {
            let mut dir = Direction::FromParent;
            loop {
                match dir {
                    Direction::FromParent => {
                        f(node_idx);
                        if let Some(left_idx) = self.arena.node(node_idx).left {
                            node_idx = left_idx;
                        } else {
                            dir = Direction::FromLeft;
                        }
                    }
                    Direction::FromLeft => {
                        if let Some(right_idx) = self.arena.node(node_idx).right {
                            node_idx = right_idx;
                            dir = Direction::FromParent;
                        } else {
                            dir = Direction::FromRight;
                        }
                    }
                    Direction::FromRight => {
                        if let Some(parent_idx) = self.arena.node(node_idx).parent {
                            if self.arena.node(parent_idx).left == Some(node_idx) {
                                dir = Direction::FromLeft;
                            } else {
                                dir = Direction::FromRight;
                            }
                            node_idx = parent_idx;
                        } else {
                            break;
                        }
                    }
                }
            }
        }
    }

    /// Keys and heights in preorder, which pins down the shape of the tree.
    #[cfg(test)]
    pub(crate) fn snapshot(&self) -> Vec<(&K, usize)> {
        let mut order = Vec::new();
        self.preorder(|node_idx| order.push(node_idx));
        order
            .into_iter()
            .map(|node_idx| {
                let node = self.arena.node(node_idx);
                (&node.key, node.height)
            })
            .collect()
    }

    #[cfg(test)]
    pub(crate) fn root_key(&self) -> Option<&K> {
        self.root.map(|root_idx| &self.arena.node(root_idx).key)
    }

    /// Height, parent key, left child key and right child key of the node holding `key`.
    #[cfg(test)]
    #[allow(clippy::type_complexity)]
    pub(crate) fn node_links(&self, key: &K) -> Option<(usize, Option<&K>, Option<&K>, Option<&K>)> {
        let node = self.arena.node(self.find_node(key)?);
        Some((
            node.height,
            self.link_key(node.parent),
            self.link_key(node.left),
            self.link_key(node.right),
        ))
    }

    #[cfg(test)]
    fn link_key(&self, link: Link) -> Option<&K> {
        link.map(|node_idx| &self.arena.node(node_idx).key)
    }
}

impl<K, V> Default for AvlTreeMap<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> fmt::Debug for AvlTreeMap<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AvlTreeMap")
            .field("height", &self.height())
            .field("entries", &self.arena.len())
            .finish()
    }
}
