//! Generational storage for exclusively owned engine objects.
//!
//! A [`Key`] is the engine's stand-in for a raw pointer: it addresses one slot
//! and carries the slot's generation at insertion time. Removing an object
//! bumps the generation, so every later lookup through the old key misses
//! instead of reaching a reused slot.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;

/// Typed handle into a [`Registry<T>`].
pub struct Key<T> {
    index: u32,
    generation: u32,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Key<T> {
    fn from_parts(index: u32, generation: u32) -> Self {
        Self {
            index,
            generation,
            _marker: PhantomData,
        }
    }

    /// Slot index of this key.
    pub fn index(&self) -> u32 {
        self.index
    }

    /// Generation of the slot when this key was issued.
    pub fn generation(&self) -> u32 {
        self.generation
    }
}

impl<T> Clone for Key<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Key<T> {}

impl<T> PartialEq for Key<T> {
    fn eq(&self, other: &Self) -> bool {
        self.index == other.index && self.generation == other.generation
    }
}

impl<T> Eq for Key<T> {}

impl<T> Hash for Key<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.index.hash(state);
        self.generation.hash(state);
    }
}

impl<T> fmt::Debug for Key<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Key({}v{})", self.index, self.generation)
    }
}

/// Slot storage with generation checks and O(1) slot reuse.
pub struct Registry<T> {
    slots: Vec<Option<T>>,
    generations: Vec<u32>,
    free_indices: Vec<usize>,
}

impl<T> Registry<T> {
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            generations: Vec::new(),
            free_indices: Vec::new(),
        }
    }

    /// Stores `value` and returns the key that addresses it.
    pub fn insert(&mut self, value: T) -> Key<T> {
        if let Some(index) = self.free_indices.pop() {
            self.slots[index] = Some(value);
            return Key::from_parts(index as u32, self.generations[index]);
        }

        let index = self.slots.len();
        self.slots.push(Some(value));
        self.generations.push(0);
        Key::from_parts(index as u32, 0)
    }

    fn live_index(&self, key: Key<T>) -> Option<usize> {
        let index = key.index as usize;
        (index < self.slots.len() && self.generations[index] == key.generation).then_some(index)
    }

    /// Returns the object for `key`, or `None` if it was removed.
    pub fn get(&self, key: Key<T>) -> Option<&T> {
        self.live_index(key).and_then(|i| self.slots[i].as_ref())
    }

    pub fn get_mut(&mut self, key: Key<T>) -> Option<&mut T> {
        self.live_index(key).and_then(|i| self.slots[i].as_mut())
    }

    /// Removes the object and invalidates every copy of `key`.
    pub fn remove(&mut self, key: Key<T>) -> Option<T> {
        let index = self.live_index(key)?;
        let removed = self.slots[index].take();
        if removed.is_some() {
            self.generations[index] = self.generations[index].wrapping_add(1);
            self.free_indices.push(index);
        }
        removed
    }

    pub fn contains(&self, key: Key<T>) -> bool {
        self.get(key).is_some()
    }

    /// Number of live objects.
    pub fn len(&self) -> usize {
        self.slots.len() - self.free_indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T> Default for Registry<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_then_get_returns_value() {
        let mut reg = Registry::new();
        let key = reg.insert("node");
        assert_eq!(reg.get(key), Some(&"node"));
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn removed_key_is_stale() {
        let mut reg = Registry::new();
        let key = reg.insert(7);
        assert_eq!(reg.remove(key), Some(7));
        assert!(reg.get(key).is_none());
        assert!(reg.remove(key).is_none(), "second removal must miss");
        assert!(reg.is_empty());
    }

    #[test]
    fn reused_slot_does_not_resurrect_old_key() {
        let mut reg = Registry::new();
        let old = reg.insert(1);
        reg.remove(old);
        let new = reg.insert(2);
        assert_eq!(old.index(), new.index(), "slot should be reused");
        assert_ne!(old, new);
        assert!(reg.get(old).is_none());
        assert_eq!(reg.get(new), Some(&2));
    }

    #[test]
    fn get_mut_updates_value() {
        let mut reg = Registry::new();
        let key = reg.insert(1);
        *reg.get_mut(key).unwrap() += 41;
        assert_eq!(reg.get(key), Some(&42));
    }

    #[test]
    fn key_is_copy_without_value_bounds() {
        struct NotCopy;
        let mut reg = Registry::new();
        let key = reg.insert(NotCopy);
        let copy = key;
        assert_eq!(key, copy);
        assert!(reg.contains(copy));
    }
}
