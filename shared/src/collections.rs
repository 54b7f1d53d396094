//! Capacity-bounded collections shared by the action pipeline and the
//! connection layer.
//!
//! Histories, result registries, queues and event logs all need to keep
//! memory bounded without rejecting new entries. [`BoundedLog`] is an
//! ordered sequence that evicts from the front on overflow, and
//! [`BoundedMap`] is an insertion-ordered map that evicts its oldest key.

use std::collections::{HashMap, VecDeque};
use std::hash::Hash;

/// What a [`BoundedLog`] does when a push would exceed its capacity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Overflow {
    /// Evict exactly one entry, the oldest
    DropOldest,
    /// Keep only the newest `capacity / 2` entries
    Halve,
}

/// Ordered sequence with a fixed capacity
#[derive(Debug, Clone)]
pub struct BoundedLog<T> {
    items: VecDeque<T>,
    capacity: usize,
    overflow: Overflow,
}

impl<T> BoundedLog<T> {
    pub fn new(capacity: usize, overflow: Overflow) -> Self {
        Self {
            items: VecDeque::with_capacity(capacity.min(1024)),
            capacity: capacity.max(1),
            overflow,
        }
    }

    /// Appends an item, returning how many old entries were evicted
    pub fn push(&mut self, item: T) -> usize {
        let mut evicted = 0;
        match self.overflow {
            Overflow::DropOldest => {
                while self.items.len() >= self.capacity {
                    self.items.pop_front();
                    evicted += 1;
                }
                self.items.push_back(item);
            }
            Overflow::Halve => {
                self.items.push_back(item);
                if self.items.len() > self.capacity {
                    let keep = (self.capacity / 2).max(1);
                    evicted = self.items.len() - keep;
                    self.items.drain(..evicted);
                }
            }
        }
        evicted
    }

    pub fn pop_front(&mut self) -> Option<T> {
        self.items.pop_front()
    }

    pub fn front(&self) -> Option<&T> {
        self.items.front()
    }

    pub fn back(&self) -> Option<&T> {
        self.items.back()
    }

    /// Returns up to `limit` of the newest entries, oldest first
    pub fn recent(&self, limit: usize) -> impl Iterator<Item = &T> {
        let skip = self.items.len().saturating_sub(limit);
        self.items.iter().skip(skip)
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.items.iter()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }
}

/// Map that remembers insertion order and evicts the oldest key when full
#[derive(Debug, Clone)]
pub struct BoundedMap<K, V> {
    entries: HashMap<K, V>,
    order: VecDeque<K>,
    capacity: usize,
}

impl<K, V> BoundedMap<K, V>
where
    K: Eq + Hash + Clone,
{
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: HashMap::new(),
            order: VecDeque::new(),
            capacity: capacity.max(1),
        }
    }

    /// Inserts or replaces a value. Returns the evicted `(key, value)` if the
    /// insert pushed the map past capacity. Replacing an existing key keeps
    /// its original position.
    pub fn insert(&mut self, key: K, value: V) -> Option<(K, V)> {
        if self.entries.insert(key.clone(), value).is_some() {
            return None;
        }
        self.order.push_back(key);

        if self.order.len() > self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                return self.entries.remove(&oldest).map(|v| (oldest, v));
            }
        }
        None
    }

    pub fn get(&self, key: &K) -> Option<&V> {
        self.entries.get(key)
    }

    pub fn contains_key(&self, key: &K) -> bool {
        self.entries.contains_key(key)
    }

    pub fn remove(&mut self, key: &K) -> Option<V> {
        let value = self.entries.remove(key)?;
        self.order.retain(|k| k != key);
        Some(value)
    }

    /// Keys from oldest to newest
    pub fn keys(&self) -> impl Iterator<Item = &K> {
        self.order.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
