// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Bounded in-memory memory of recently seen items

use std::collections::HashSet;
use std::hash::Hash;
use tracing::debug;

/// Default number of entries kept before the set is cleared
pub const DEFAULT_CAPACITY: usize = 1000;

/// A set that is cleared wholesale once it reaches its capacity.
///
/// This only suppresses repeats inside its retention window; it is not a
/// durable record of what has been processed.
#[derive(Debug)]
pub struct BoundedSet<T> {
    items: HashSet<T>,
    capacity: usize,
}

impl<T: Hash + Eq> BoundedSet<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            items: HashSet::new(),
            capacity: capacity.max(1),
        }
    }

    /// Insert an item, returning `true` if it was not already present
    pub fn insert(&mut self, item: T) -> bool {
        if self.items.contains(&item) {
            return false;
        }
        if self.items.len() >= self.capacity {
            debug!("Dedup set reached {} entries, clearing", self.capacity);
            self.items.clear();
        }
        self.items.insert(item)
    }

    pub fn contains(&self, item: &T) -> bool {
        self.items.contains(item)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl<T: Hash + Eq> Default for BoundedSet<T> {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}
