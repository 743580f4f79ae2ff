//! Fixed-capacity pools that keep the best items seen so far.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

struct Slot<K, T> {
    key: K,
    seq: u64,
    item: T,
}

// The heap top is the worst slot: the smallest key, and among equal keys the
// most recently inserted.
impl<K: Ord, T> Ord for Slot<K, T> {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .key
            .cmp(&self.key)
            .then_with(|| self.seq.cmp(&other.seq))
    }
}

impl<K: Ord, T> PartialOrd for Slot<K, T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<K: Ord, T> PartialEq for Slot<K, T> {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl<K: Ord, T> Eq for Slot<K, T> {}

/// Keeps at most `capacity` items with the greatest keys.
///
/// Inserting into a full pool evicts the item with the smallest key; when
/// keys tie, the item inserted last goes first.
pub struct BoundedPriorityPool<K, T> {
    capacity: usize,
    heap: BinaryHeap<Slot<K, T>>,
    next_seq: u64,
}

impl<K: Ord, T> BoundedPriorityPool<K, T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            heap: BinaryHeap::with_capacity(capacity.saturating_add(1).min(1024)),
            next_seq: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.heap.len() >= self.capacity
    }

    /// Key of the item that would be evicted next.
    pub fn worst(&self) -> Option<&K> {
        self.heap.peek().map(|slot| &slot.key)
    }

    /// Whether an item with `key` would survive insertion.
    pub fn admits(&self, key: &K) -> bool {
        if self.capacity == 0 {
            return false;
        }
        match self.worst() {
            Some(worst) if self.is_full() => key > worst,
            _ => true,
        }
    }

    /// Insert an item, returning whatever falls out of the pool.
    pub fn push(&mut self, key: K, item: T) -> Option<(K, T)> {
        if self.capacity == 0 {
            return Some((key, item));
        }
        self.heap.push(Slot {
            key,
            seq: self.next_seq,
            item,
        });
        self.next_seq += 1;
        if self.heap.len() > self.capacity {
            return self.heap.pop().map(|slot| (slot.key, slot.item));
        }
        None
    }

    pub fn iter(&self) -> impl Iterator<Item = (&K, &T)> {
        self.heap.iter().map(|slot| (&slot.key, &slot.item))
    }

    /// Items best first.
    pub fn into_sorted_vec(self) -> Vec<(K, T)> {
        // ascending by Slot order is best first
        self.heap
            .into_sorted_vec()
            .into_iter()
            .map(|slot| (slot.key, slot.item))
            .collect()
    }
}
