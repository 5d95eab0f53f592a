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

//! Archetype storage with row allocation and removal.
//!
//! An archetype is the group of entities sharing exactly one [`TypeSet`]:
//! one contiguous column per component type, plus a parallel vector of
//! entity keys. Row removal is swap-based, so records of relocated entities
//! are repointed on the spot and the `record.row == physical row` invariant
//! stays cheap to maintain.

#[cfg(feature = "sanitize")]
use std::sync::atomic::{AtomicU32, Ordering};

use ahash::AHashMap;

use crate::component::{Component, ComponentId, TypeSet};
use crate::entity::{EntityKey, HandleMap};
use crate::error::{EcsError, Result};
use crate::key::HandleKey;
use crate::storage::{DataStore, Storage};

/// Key addressing an archetype inside the [`ArchetypeStore`]. Archetypes
/// are never removed, so the generation bits stay at zero.
pub type ArchetypeKey = HandleKey<Archetype>;

/// Structure-of-arrays storage for one set of component types.
pub struct Archetype {
    type_ids: TypeSet,
    // Columns parallel `type_ids`: stores[i] holds the type at position i of
    // the sorted set.
    stores: DataStore,
    rows: Vec<EntityKey>,
    #[cfg(feature = "sanitize")]
    open_iterations: AtomicU32,
}

impl Archetype {
    /// The archetype of component-less entities.
    pub fn new_empty() -> Self {
        Self::with_columns(TypeSet::new(), DataStore::new())
    }

    fn with_columns(type_ids: TypeSet, stores: DataStore) -> Self {
        debug_assert_eq!(type_ids.len(), stores.len());
        Self {
            type_ids,
            stores,
            rows: Vec::new(),
            #[cfg(feature = "sanitize")]
            open_iterations: AtomicU32::new(0),
        }
    }

    pub fn type_ids(&self) -> &TypeSet {
        &self.type_ids
    }

    /// Common column length; debug builds assert every column agrees.
    pub fn count_entities(&self) -> usize {
        debug_assert!(self.stores_have_common_length());
        self.rows.len()
    }

    fn stores_have_common_length(&self) -> bool {
        self.stores.iter().all(|column| column.len() == self.rows.len())
    }

    pub fn has<T: Component>(&self) -> bool {
        self.type_ids.contains(ComponentId::of::<T>())
    }

    /// Column position of `id` inside this archetype.
    pub fn column_index(&self, id: ComponentId) -> Option<usize> {
        self.type_ids.position(id)
    }

    pub fn storage<T: Component>(&self) -> Option<&Storage<T>> {
        let index = self.column_index(ComponentId::of::<T>())?;
        Some(self.stores.column(index).as_storage::<T>())
    }

    pub fn storage_mut<T: Component>(&mut self) -> Option<&mut Storage<T>> {
        let index = self.column_index(ComponentId::of::<T>())?;
        Some(self.stores.column_mut(index).as_storage_mut::<T>())
    }

    /// Typed element access. The row must be in bounds; an absent column
    /// reports [`EcsError::MissingComponent`].
    pub fn get<T: Component>(&self, row: usize) -> Result<&T> {
        let storage = self.storage::<T>().ok_or(EcsError::MissingComponent)?;
        Ok(&storage.as_slice()[row])
    }

    pub fn get_mut<T: Component>(&mut self, row: usize) -> Result<&mut T> {
        let storage = self.storage_mut::<T>().ok_or(EcsError::MissingComponent)?;
        Ok(&mut storage.items[row])
    }

    /// Append `component` to its column; returns the new row index.
    /// Panics when `T` is not part of this archetype.
    pub fn push<T: Component>(&mut self, component: T) -> usize {
        let Some(storage) = self.storage_mut::<T>() else {
            panic!(
                "BUG: archetype does not store {}",
                std::any::type_name::<T>()
            );
        };
        storage.items.push(component);
        storage.items.len() - 1
    }

    /// Append an entity key to the row list. Only meaningful when the
    /// archetype has no columns (entities enter the store component-less).
    pub fn push_key(&mut self, key: EntityKey) {
        self.assert_not_iterated();
        self.rows.push(key);
    }

    pub fn row_key(&self, row: usize) -> EntityKey {
        self.rows[row]
    }

    pub fn rows(&self) -> &[EntityKey] {
        &self.rows
    }

    /// New archetype for `type_ids ∪ {T}`: same column shapes, no contents.
    pub fn make_extended<T: Component>(&self) -> Archetype {
        let extended = self.type_ids.with(ComponentId::of::<T>());
        self.make_with_types::<T>(extended)
    }

    /// New archetype for `type_ids \ {T}`: same column shapes, no contents.
    pub fn make_restricted<T: Component>(&self) -> Archetype {
        let restricted = self.type_ids.without(ComponentId::of::<T>());
        self.make_with_types::<T>(restricted)
    }

    fn make_with_types<T: Component>(&self, type_ids: TypeSet) -> Archetype {
        let mut stores = DataStore::new();
        for id in type_ids.iter() {
            if let Some(index) = self.column_index(id) {
                stores.push(self.stores.column(index).clone_empty());
            } else {
                debug_assert_eq!(id, ComponentId::of::<T>());
                stores.push(Box::new(Storage::<T>::new()));
            }
        }
        Archetype::with_columns(type_ids, stores)
    }

    /// Move the entity at `row` into `destination`: every component type
    /// present in both archetypes is moved to the back of the destination
    /// column, the row key follows, then the source row is removed. Callers
    /// never invoke this with source == destination (that case is a no-op
    /// handled upstream).
    pub(crate) fn move_row(
        &mut self,
        row: usize,
        destination: &mut Archetype,
        handles: &mut HandleMap,
    ) {
        self.assert_not_iterated();
        destination.assert_not_iterated();
        for (index, id) in self.type_ids.clone().iter().enumerate() {
            if let Some(destination_index) = destination.column_index(id) {
                destination
                    .stores
                    .column_mut(destination_index)
                    .push_moved_from(self.stores.column_mut(index), row);
            }
        }
        destination.rows.push(self.rows[row]);
        self.remove_row(row, handles);
    }

    /// Same-archetype deep copy of a whole row, owned by a different entity
    /// `key`. Returns the new row index. Used by blueprint instantiation.
    pub(crate) fn clone_row(&mut self, source_row: usize, key: EntityKey) -> usize {
        self.assert_not_iterated();
        for column in self.stores.iter_mut() {
            column.push_cloned_within(source_row);
        }
        self.rows.push(key);
        self.rows.len() - 1
    }

    /// Swap-remove `row` from every column and the row list, repointing the
    /// record of the entity that lands on `row` (a no-op when `row` was the
    /// last one).
    pub(crate) fn remove_row(&mut self, row: usize, handles: &mut HandleMap) {
        self.assert_not_iterated();
        assert!(
            row < self.rows.len(),
            "BUG: remove_row called with invalid row {} (len={})",
            row,
            self.rows.len()
        );

        // The entity that will take the removed entity's place. When `row`
        // is the last one this overwrites the record with its own row.
        let replacement = self.rows[self.rows.len() - 1];
        if let Some(record) = handles.get_mut(&replacement.index()) {
            record.row = row;
        } else {
            debug_assert!(false, "row key without a record");
        }

        self.rows.swap_remove(row);
        for column in self.stores.iter_mut() {
            column.erase_by_swap(row);
        }
    }

    /// Column-level invariant check, intended for tests and sanitize mode.
    pub fn verify_stores_consistency(&self) -> bool {
        if self.type_ids.len() != self.stores.len() {
            return false;
        }
        for (index, id) in self.type_ids.iter().enumerate() {
            let column = self.stores.column(index);
            if column.component_id() != id || column.len() != self.rows.len() {
                return false;
            }
        }
        true
    }

    /// Record-level invariant check: every stored row key resolves to a
    /// record pointing back at this archetype and row.
    pub fn verify_handles_consistency(&self, self_key: ArchetypeKey, handles: &HandleMap) -> bool {
        self.rows.iter().enumerate().all(|(row, key)| {
            handles
                .get(&key.index())
                .is_some_and(|record| record.archetype == self_key && record.row == row)
        })
    }

    /// Raw pointer to the cell of component `T` at (`column`, `row`).
    ///
    /// # Safety
    /// `this` must point to a live archetype whose structure is not mutated
    /// while the returned pointer is in use; `column` must be the index of a
    /// `T` column and `row` within bounds.
    pub(crate) unsafe fn cell_ptr<T: Component>(
        this: *mut Archetype,
        column: usize,
        row: usize,
    ) -> *mut T {
        let storage = (*this).stores.column_mut(column).as_storage_mut::<T>();
        debug_assert!(row < storage.items.len());
        storage.items.as_mut_ptr().add(row)
    }

    #[cfg(feature = "sanitize")]
    pub(crate) fn begin_iteration(&self) {
        self.open_iterations.fetch_add(1, Ordering::Relaxed);
    }

    #[cfg(feature = "sanitize")]
    pub(crate) fn end_iteration(&self) {
        let previous = self.open_iterations.fetch_sub(1, Ordering::Relaxed);
        debug_assert!(previous > 0, "iteration counter underflow");
    }

    fn assert_not_iterated(&self) {
        #[cfg(feature = "sanitize")]
        assert_eq!(
            self.open_iterations.load(Ordering::Relaxed),
            0,
            "BUG: structural change on an archetype while a query iterates it"
        );
    }
}

impl Clone for Archetype {
    fn clone(&self) -> Self {
        Self {
            type_ids: self.type_ids.clone(),
            stores: self.stores.clone(),
            rows: self.rows.clone(),
            // A deep copy is never under iteration.
            #[cfg(feature = "sanitize")]
            open_iterations: AtomicU32::new(0),
        }
    }
}

/// Store of all archetypes: keyed by insertion index and by TypeSet.
///
/// Archetypes are boxed so their addresses survive store growth while a
/// query holds references into them. The empty archetype always exists at
/// key 0; archetypes are never removed.
#[derive(Clone)]
pub struct ArchetypeStore {
    by_key: Vec<Box<Archetype>>,
    by_type: AHashMap<TypeSet, ArchetypeKey>,
}

impl Default for ArchetypeStore {
    fn default() -> Self {
        let mut by_type = AHashMap::with_capacity(32);
        by_type.insert(TypeSet::new(), Self::empty_key());
        Self {
            by_key: vec![Box::new(Archetype::new_empty())],
            by_type,
        }
    }
}

impl ArchetypeStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Key of the always-present empty archetype.
    pub fn empty_key() -> ArchetypeKey {
        ArchetypeKey::first()
    }

    pub fn get(&self, key: ArchetypeKey) -> &Archetype {
        &self.by_key[key.index() as usize]
    }

    pub fn get_mut(&mut self, key: ArchetypeKey) -> &mut Archetype {
        &mut self.by_key[key.index() as usize]
    }

    /// Mutable access to two distinct archetypes at once (row moves).
    pub(crate) fn pair_mut(
        &mut self,
        first: ArchetypeKey,
        second: ArchetypeKey,
    ) -> (&mut Archetype, &mut Archetype) {
        assert_ne!(first, second, "BUG: pair_mut with identical keys");
        let first_ptr = self.archetype_ptr(first);
        let second_ptr = self.archetype_ptr(second);
        // SAFETY: both pointers come out of distinct boxes (keys differ),
        // so the two &mut do not alias.
        unsafe { (&mut *first_ptr, &mut *second_ptr) }
    }

    /// Raw pointer to an archetype, for query iteration plans. The pointee
    /// stays put across store growth because archetypes are boxed.
    pub(crate) fn archetype_ptr(&mut self, key: ArchetypeKey) -> *mut Archetype {
        let archetype: &mut Archetype = &mut self.by_key[key.index() as usize];
        archetype as *mut Archetype
    }

    pub fn key_of(&self, type_ids: &TypeSet) -> Option<ArchetypeKey> {
        self.by_type.get(type_ids).copied()
    }

    /// Existing key for `type_ids`, or the key of a freshly inserted
    /// archetype built by `make`. The bool reports whether an insertion
    /// happened, so the caller can offer the new archetype to the query
    /// backends.
    pub fn make_if_absent(
        &mut self,
        type_ids: &TypeSet,
        make: impl FnOnce(&ArchetypeStore) -> Archetype,
    ) -> (ArchetypeKey, bool) {
        if let Some(key) = self.key_of(type_ids) {
            return (key, false);
        }
        let archetype = make(&*self);
        debug_assert_eq!(archetype.type_ids(), type_ids);
        let key = ArchetypeKey::from_index(self.by_key.len() as u64);
        self.by_key.push(Box::new(archetype));
        self.by_type.insert(type_ids.clone(), key);
        (key, true)
    }

    pub fn len(&self) -> usize {
        self.by_key.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_key.is_empty()
    }

    /// Archetypes in insertion order — the order queries iterate matches in.
    pub fn iter(&self) -> impl Iterator<Item = (ArchetypeKey, &Archetype)> + '_ {
        self.by_key
            .iter()
            .enumerate()
            .map(|(index, archetype)| (ArchetypeKey::from_index(index as u64), &**archetype))
    }
}
