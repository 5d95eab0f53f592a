// Copyright 2024 Saptak Santra
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Component identity, type sets and type sequences.
//!
//! Components are plain values attached to entities. Presence of a type on
//! an entity is a set-membership fact; the [`TypeSet`] of an entity decides
//! which archetype stores it.

use std::any::TypeId;

use smallvec::SmallVec;

/// Marker trait for components.
///
/// Components must be `'static` (no borrowed data) and `Clone`: whole-world
/// snapshots and blueprint instantiation deep-copy every column.
pub trait Component: Clone + 'static {}

/// Automatically implement Component for all valid types
impl<T: Clone + 'static> Component for T {}

/// Stable identity of a component type.
///
/// One id per type, process-wide; comparable, hashable and ordered.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct ComponentId(TypeId);

impl ComponentId {
    /// Identity of component type `T`. Pure and deterministic.
    pub fn of<T: Component>() -> Self {
        ComponentId(TypeId::of::<T>())
    }
}

/// Ordered set of component ids.
///
/// Two sets over the same ids compare equal regardless of insertion order.
#[derive(Clone, PartialEq, Eq, Hash, Debug, Default)]
pub struct TypeSet {
    // Sorted ascending, no duplicates.
    ids: SmallVec<[ComponentId; 8]>,
}

impl TypeSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_ids(ids: impl IntoIterator<Item = ComponentId>) -> Self {
        let mut set = Self::new();
        for id in ids {
            set.insert(id);
        }
        set
    }

    /// Insert an id; returns false if it was already present.
    pub fn insert(&mut self, id: ComponentId) -> bool {
        match self.ids.binary_search(&id) {
            Ok(_) => false,
            Err(position) => {
                self.ids.insert(position, id);
                true
            }
        }
    }

    /// Remove an id; returns false if it was absent.
    pub fn remove(&mut self, id: ComponentId) -> bool {
        match self.ids.binary_search(&id) {
            Ok(position) => {
                self.ids.remove(position);
                true
            }
            Err(_) => false,
        }
    }

    pub fn contains(&self, id: ComponentId) -> bool {
        self.ids.binary_search(&id).is_ok()
    }

    /// Position of `id` in the sorted order, when present.
    pub fn position(&self, id: ComponentId) -> Option<usize> {
        self.ids.binary_search(&id).ok()
    }

    /// True when every id of `other` is contained in `self`.
    pub fn is_superset(&self, other: &TypeSet) -> bool {
        other.ids.iter().all(|id| self.contains(*id))
    }

    /// Copy of this set with `id` added.
    pub fn with(&self, id: ComponentId) -> TypeSet {
        let mut extended = self.clone();
        extended.insert(id);
        extended
    }

    /// Copy of this set with `id` removed.
    pub fn without(&self, id: ComponentId) -> TypeSet {
        let mut restricted = self.clone();
        restricted.remove(id);
        restricted
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = ComponentId> + '_ {
        self.ids.iter().copied()
    }
}

/// Ordered list of component ids, preserving declaration order.
///
/// Used only as the cache key for query backends, so that callbacks can
/// receive components in the order the query declared them.
#[derive(Clone, PartialEq, Eq, Hash, Debug, Default)]
pub struct TypeSequence {
    ids: SmallVec<[ComponentId; 8]>,
}

impl TypeSequence {
    pub fn from_ids(ids: impl IntoIterator<Item = ComponentId>) -> Self {
        Self {
            ids: ids.into_iter().collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = ComponentId> + '_ {
        self.ids.iter().copied()
    }

    /// The unordered set over the same ids.
    pub fn to_set(&self) -> TypeSet {
        TypeSet::from_ids(self.iter())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone)]
    struct Position;
    #[derive(Clone)]
    struct Velocity;
    #[derive(Clone)]
    struct Health;

    #[test]
    fn test_component_id_is_stable() {
        assert_eq!(ComponentId::of::<Position>(), ComponentId::of::<Position>());
        assert_ne!(ComponentId::of::<Position>(), ComponentId::of::<Velocity>());
    }

    #[test]
    fn test_type_set_order_insensitive() {
        let forward = TypeSet::from_ids([
            ComponentId::of::<Position>(),
            ComponentId::of::<Velocity>(),
        ]);
        let backward = TypeSet::from_ids([
            ComponentId::of::<Velocity>(),
            ComponentId::of::<Position>(),
        ]);
        assert_eq!(forward, backward);
    }

    #[test]
    fn test_type_set_insert_remove() {
        let mut set = TypeSet::new();
        assert!(set.insert(ComponentId::of::<Position>()));
        assert!(!set.insert(ComponentId::of::<Position>()));
        assert!(set.contains(ComponentId::of::<Position>()));
        assert!(set.remove(ComponentId::of::<Position>()));
        assert!(!set.remove(ComponentId::of::<Position>()));
        assert!(set.is_empty());
    }

    #[test]
    fn test_superset() {
        let small = TypeSet::from_ids([ComponentId::of::<Position>()]);
        let large = small.with(ComponentId::of::<Velocity>());
        assert!(large.is_superset(&small));
        assert!(!small.is_superset(&large));
        assert!(large.is_superset(&TypeSet::new()));
        assert!(!large.is_superset(&large.with(ComponentId::of::<Health>())));
    }

    #[test]
    fn test_sequence_keeps_declaration_order() {
        let sequence = TypeSequence::from_ids([
            ComponentId::of::<Velocity>(),
            ComponentId::of::<Position>(),
        ]);
        let ids: Vec<_> = sequence.iter().collect();
        assert_eq!(ids[0], ComponentId::of::<Velocity>());
        assert_eq!(ids[1], ComponentId::of::<Position>());
        assert_eq!(sequence.to_set(), TypeSet::from_ids(ids));
    }
}
