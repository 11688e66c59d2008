//! Node storage for the tree.
//!
//! Nodes live in a dense vector of slots and link to each other by slot index.
//! Every slot carries a generation counter that is bumped whenever the entry
//! stored in it goes away, so a [`Handle`] taken before an erase can be told
//! apart from one taken after.

use std::collections::TryReserveError;
use std::mem;

use log::trace;

pub(crate) type NodeIdx = usize;
pub(crate) type Link = Option<NodeIdx>;

#[derive(Clone)]
pub(crate) struct Node<K, V> {
    pub(crate) key: K,
    pub(crate) value: V,
    pub(crate) left: Link,
    pub(crate) right: Link,
    pub(crate) parent: Link,
    pub(crate) height: usize,
}

/// Opaque reference to an entry of an [`AvlTreeMap`](crate::AvlTreeMap).
///
/// A handle stays valid until its entry is erased or the map is cleared.
/// Erasing a key that has two children moves the in-order successor's entry
/// into the erased slot, which invalidates the successor's handle as well;
/// look it up again with [`find`](crate::AvlTreeMap::find).
/// Resolving an invalid handle yields `None`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Handle {
    index: NodeIdx,
    generation: u32,
}

#[derive(Clone)]
enum Entry<K, V> {
    Occupied(Node<K, V>),
    Vacant { next_free: Link },
}

#[derive(Clone)]
struct Slot<K, V> {
    generation: u32,
    entry: Entry<K, V>,
}

#[derive(Clone)]
pub(crate) struct Arena<K, V> {
    slots: Vec<Slot<K, V>>,
    free_head: Link,
    num_occupied: usize,
}

impl<K, V> Arena<K, V> {
    pub(crate) fn new() -> Self {
        Self {
            slots: Vec::new(),
            free_head: None,
            num_occupied: 0,
        }
    }

    /// Number of slots currently holding a node.
    pub(crate) fn len(&self) -> usize {
        self.num_occupied
    }

    /// Makes sure the next call to `create` does not have to grow the slot vector.
    pub(crate) fn try_reserve_one(&mut self) -> Result<(), TryReserveError> {
        if self.free_head.is_none() {
            self.slots.try_reserve(1)?;
        }
        Ok(())
    }

    /// Stores a new leaf node and returns its index.
    /// Vacant slots are reused before the vector grows.
    pub(crate) fn create(&mut self, parent: Link, key: K, value: V) -> NodeIdx {
        let node = Node {
            key,
            value,
            parent,
            left: None,
            right: None,
            height: 0,
        };
        self.num_occupied += 1;
        match self.free_head {
            Some(node_idx) => {
                let previous = mem::replace(&mut self.slots[node_idx].entry, Entry::Occupied(node));
                debug_assert!(matches!(previous, Entry::Vacant { .. }));
                if let Entry::Vacant { next_free } = previous {
                    self.free_head = next_free;
                }
                trace!("reused slot {node_idx}");
                node_idx
            }
            None => {
                self.slots.push(Slot {
                    generation: 0,
                    entry: Entry::Occupied(node),
                });
                let node_idx = self.slots.len() - 1;
                trace!("allocated slot {node_idx}");
                node_idx
            }
        }
    }

    /// Releases the node at `node_idx` and returns its key-value pair.
    /// The slot goes onto the free list; no allocation takes place.
    pub(crate) fn destroy(&mut self, node_idx: NodeIdx) -> (K, V) {
        let slot = &mut self.slots[node_idx];
        let previous = mem::replace(
            &mut slot.entry,
            Entry::Vacant {
                next_free: self.free_head,
            },
        );
        slot.generation = slot.generation.wrapping_add(1);
        self.free_head = Some(node_idx);
        self.num_occupied -= 1;
        trace!("released slot {node_idx}");
        match previous {
            Entry::Occupied(node) => (node.key, node.value),
            Entry::Vacant { .. } => unreachable!("slot {node_idx} released twice"),
        }
    }

    /// Marks every outstanding handle to `node_idx` as stale without releasing the node.
    pub(crate) fn invalidate(&mut self, node_idx: NodeIdx) {
        let slot = &mut self.slots[node_idx];
        slot.generation = slot.generation.wrapping_add(1);
    }

    /// Exchanges the key-value pairs of two distinct nodes, leaving their links alone.
    pub(crate) fn swap_entries(&mut self, a: NodeIdx, b: NodeIdx) {
        debug_assert_ne!(a, b);
        let (low, high) = if a < b { (a, b) } else { (b, a) };
        let (head, tail) = self.slots.split_at_mut(high);
        if let (Entry::Occupied(x), Entry::Occupied(y)) = (&mut head[low].entry, &mut tail[0].entry) {
            mem::swap(&mut x.key, &mut y.key);
            mem::swap(&mut x.value, &mut y.value);
        }
    }

    pub(crate) fn node(&self, node_idx: NodeIdx) -> &Node<K, V> {
        match &self.slots[node_idx].entry {
            Entry::Occupied(node) => node,
            Entry::Vacant { .. } => unreachable!("link to vacant slot {node_idx}"),
        }
    }

    pub(crate) fn node_mut(&mut self, node_idx: NodeIdx) -> &mut Node<K, V> {
        match &mut self.slots[node_idx].entry {
            Entry::Occupied(node) => node,
            Entry::Vacant { .. } => unreachable!("link to vacant slot {node_idx}"),
        }
    }

    pub(crate) fn handle(&self, node_idx: NodeIdx) -> Handle {
        Handle {
            index: node_idx,
            generation: self.slots[node_idx].generation,
        }
    }

    pub(crate) fn resolve(&self, handle: Handle) -> Option<&Node<K, V>> {
        match self.slots.get(handle.index) {
            Some(Slot {
                generation,
                entry: Entry::Occupied(node),
            }) if *generation == handle.generation => Some(node),
            _ => None,
        }
    }

    pub(crate) fn resolve_mut(&mut self, handle: Handle) -> Option<&mut Node<K, V>> {
        match self.slots.get_mut(handle.index) {
            Some(Slot {
                generation,
                entry: Entry::Occupied(node),
            }) if *generation == handle.generation => Some(node),
            _ => None,
        }
    }

    #[cfg(any(test, feature = "consistency_check"))]
    pub(crate) fn check_consistency(&self) {
        // Walk free list
        let mut num_free = 0;
        let mut current = self.free_head;
        while let Some(node_idx) = current {
            match self.slots[node_idx].entry {
                Entry::Vacant { next_free } => current = next_free,
                Entry::Occupied(_) => panic!("occupied slot {node_idx} on free list"),
            }
            num_free += 1;
            assert!(num_free <= self.slots.len());
        }

        // Every slot is either occupied or free
        let num_occupied = self
            .slots
            .iter()
            .filter(|slot| matches!(slot.entry, Entry::Occupied(_)))
            .count();
        assert_eq!(num_occupied, self.num_occupied);
        assert_eq!(num_occupied + num_free, self.slots.len());
    }
}
