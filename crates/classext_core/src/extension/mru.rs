//! Fixed-size most-recently-used ring in front of a registry map.
//!
//! # Invariants
//! - The ring never owns the only copy of an entry; it caches map values.
//! - `head` always points at the most recently pushed or hit slot.
//! - A key occupies at most one slot.

use crate::types::graph::TypeKey;
use std::sync::Arc;

pub(crate) struct MruRing<V> {
    slots: Vec<Option<(TypeKey, Arc<V>)>>,
    head: usize,
}

impl<V> MruRing<V> {
    /// Creates a ring with `capacity` slots (at least one).
    pub(crate) fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            slots: (0..capacity).map(|_| None).collect(),
            head: 0,
        }
    }

    pub(crate) fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Scans from the head forward, wrapping. A hit becomes the new head.
    pub(crate) fn probe(&mut self, key: TypeKey) -> Option<Arc<V>> {
        let index = self.position(key)?;
        self.head = index;
        self.slots[index].as_ref().map(|(_, value)| Arc::clone(value))
    }

    /// Installs `value` just before the current head and makes it the head.
    ///
    /// The slot taken is the least recently used one once the ring is full.
    /// A key already cached is refreshed in place.
    pub(crate) fn push(&mut self, key: TypeKey, value: Arc<V>) {
        if let Some(index) = self.position(key) {
            self.slots[index] = Some((key, value));
            self.head = index;
            return;
        }
        let capacity = self.capacity();
        self.head = (self.head + capacity - 1) % capacity;
        self.slots[self.head] = Some((key, value));
    }

    /// Drops the slot cached for `key`, if any.
    pub(crate) fn evict(&mut self, key: TypeKey) {
        if let Some(index) = self.position(key) {
            self.slots[index] = None;
        }
    }

    fn position(&self, key: TypeKey) -> Option<usize> {
        let capacity = self.capacity();
        (0..capacity)
            .map(|step| (self.head + step) % capacity)
            .find(|index| matches!(&self.slots[*index], Some((cached, _)) if *cached == key))
    }

    #[cfg(test)]
    fn keys_from_head(&self) -> Vec<TypeKey> {
        let capacity = self.capacity();
        (0..capacity)
            .filter_map(|step| {
                self.slots[(self.head + step) % capacity]
                    .as_ref()
                    .map(|(key, _)| *key)
            })
            .collect()
    }
}
