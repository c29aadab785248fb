// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! Small fixed-capacity associative table behind a [`SpinLock`].
//!
//! Lookups are a linear scan over at most `MAX` entries, so `MAX` is expected to stay
//! in the range of concurrently live threads. Every operation takes the lock for
//! O(MAX) time and never allocates, which keeps it usable from a context-switch hook.

use crate::SpinLock;

#[derive(Clone, Copy)]
struct Entry<K, V> {
    key: K,
    value: V,
}

struct Entries<K, V, const MAX: usize> {
    data: [Option<Entry<K, V>>; MAX],
    count: usize,
}

impl<K: PartialEq, V, const MAX: usize> Entries<K, V, MAX> {
    fn position(&self, key: &K) -> Option<usize> {
        self.data[..self.count]
            .iter()
            .position(|entry| matches!(entry, Some(e) if e.key == *key))
    }
}

/// Bounded upsert map; insertion of a new key fails once `MAX` entries exist.
pub struct BoundedMap<K, V, const MAX: usize> {
    inner: SpinLock<Entries<K, V, MAX>>,
}

impl<K, V, const MAX: usize> BoundedMap<K, V, MAX> {
    pub const fn new() -> Self {
        Self {
            inner: SpinLock::new(Entries {
                data: [const { None }; MAX],
                count: 0,
            }),
        }
    }

    pub const fn capacity(&self) -> usize {
        MAX
    }
}

impl<K, V, const MAX: usize> Default for BoundedMap<K, V, MAX> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: PartialEq + Copy, V: Copy, const MAX: usize> BoundedMap<K, V, MAX> {
    /// Replaces the value of an existing key or appends a new entry.
    ///
    /// Returns `false` only when `key` is new and the table is full; existing entries
    /// are left untouched in that case.
    pub fn insert(&self, key: K, value: V) -> bool {
        let mut entries = self.inner.lock();
        if let Some(idx) = entries.position(&key) {
            entries.data[idx] = Some(Entry { key, value });
            return true;
        }
        if entries.count >= MAX {
            return false;
        }
        let idx = entries.count;
        entries.data[idx] = Some(Entry { key, value });
        entries.count += 1;
        true
    }

    pub fn exist(&self, key: &K) -> bool {
        self.inner.lock().position(key).is_some()
    }

    pub fn try_get(&self, key: &K) -> Option<V> {
        let entries = self.inner.lock();
        let idx = entries.position(key)?;
        entries.data[idx].map(|entry| entry.value)
    }

    /// Removes `key` by moving the last entry into its place.
    pub fn erase(&self, key: &K) -> bool {
        let mut entries = self.inner.lock();
        let Some(idx) = entries.position(key) else {
            return false;
        };
        let last = entries.count - 1;
        entries.data[idx] = entries.data[last].take();
        entries.count = last;
        true
    }

    pub fn size(&self) -> usize {
        self.inner.lock().count
    }

    pub fn clear(&self) {
        let mut entries = self.inner.lock();
        let count = entries.count;
        for slot in &mut entries.data[..count] {
            *slot = None;
        }
        entries.count = 0;
    }
}
