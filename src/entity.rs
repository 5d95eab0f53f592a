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

//! Entity handles, records and views.
//!
//! An entity has no storage of its own: it is defined by the union of its
//! components, physically located by its [`EntityRecord`]. The public
//! reference is [`Handle`], a plain generational key; it resolves through
//! the manager that minted it.

use std::cell::{Ref, RefMut};
use std::sync::Arc;

use rustc_hash::FxHashMap;

use crate::archetype::ArchetypeKey;
use crate::component::Component;
use crate::error::Result;
use crate::key::HandleKey;
use crate::manager::EntityManager;
use crate::name::StringId;
use crate::phase::Phase;

/// Keyspace marker for entity handle keys.
pub enum EntityTag {}

/// Generational key addressing one entity record.
pub type EntityKey = HandleKey<EntityTag>;

/// Row value marking a freed record.
pub(crate) const INVALID_ROW: usize = usize::MAX;

/// Handle map: records keyed on the index portion of the entity key, so a
/// generation advance invalidates stale handles without moving the entry.
pub(crate) type HandleMap = FxHashMap<u64, EntityRecord>;

/// Where an entity physically lives.
#[derive(Debug, Clone, Copy)]
pub struct EntityRecord {
    /// Archetype currently storing the entity.
    pub archetype: ArchetypeKey,
    /// Row of this entity in every column of the archetype.
    pub row: usize,
    /// Full key (current generation) for this record's index.
    pub key: EntityKey,
    /// Optional debug name.
    pub name: Option<StringId>,
}

impl EntityRecord {
    pub(crate) fn is_live(&self) -> bool {
        self.row != INVALID_ROW
    }
}

/// The public entity reference.
///
/// A handle is a bare `Copy` key: it is only meaningful against the manager
/// that minted it, and all operations resolve through that manager. The
/// default handle is invalid against every manager.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct Handle {
    pub(crate) key: EntityKey,
}

impl Handle {
    pub(crate) fn new(key: EntityKey) -> Self {
        Self { key }
    }

    /// The index portion of the key only; the generation is discarded.
    pub fn id(self) -> u64 {
        self.key.index()
    }
}

impl Default for Handle {
    fn default() -> Self {
        Self {
            key: EntityKey::latest(),
        }
    }
}

/// Immediate, read/write view of a live entity. Cannot change the entity's
/// component set; structural changes go through [`Entity`] and a [`Phase`].
#[derive(Clone, Copy)]
pub struct EntityView<'w> {
    manager: &'w EntityManager,
    handle: Handle,
}

impl<'w> EntityView<'w> {
    pub(crate) fn new(manager: &'w EntityManager, handle: Handle) -> Self {
        Self { manager, handle }
    }

    pub fn handle(&self) -> Handle {
        self.handle
    }

    pub fn has<T: Component>(&self) -> bool {
        self.manager.has_component::<T>(self.handle)
    }

    pub fn get<T: Component>(&self) -> Result<Ref<'w, T>> {
        self.manager.component::<T>(self.handle)
    }

    pub fn get_mut<T: Component>(&self) -> Result<RefMut<'w, T>> {
        self.manager.component_mut::<T>(self.handle)
    }

    pub fn name(&self) -> Option<Arc<str>> {
        self.manager.entity_name(self.handle)
    }
}

/// Phase-bound view of an entity.
///
/// Value reads and writes are immediate; structural mutations (`add`,
/// `remove`, `erase`, `copy_from`) are appended to the phase and replayed
/// when the phase drops, so callers can keep iterating with live references
/// in the meantime.
pub struct Entity<'w, 'p> {
    manager: &'w EntityManager,
    phase: &'p Phase<'w>,
    handle: Handle,
}

impl<'w, 'p> Entity<'w, 'p> {
    pub(crate) fn new(manager: &'w EntityManager, phase: &'p Phase<'w>, handle: Handle) -> Self {
        Self {
            manager,
            phase,
            handle,
        }
    }

    pub fn handle(&self) -> Handle {
        self.handle
    }

    /// Defer adding `component` to this entity. Adding a type that is
    /// already present overwrites the stored value in place.
    pub fn add<T: Component>(&self, component: T) -> &Self {
        let manager = self.manager;
        let handle = self.handle;
        self.phase
            .append(move || manager.apply_add(handle, component));
        self
    }

    /// Defer removing component `T`. Removing an absent type is a no-op.
    pub fn remove<T: Component>(&self) -> &Self {
        let manager = self.manager;
        let handle = self.handle;
        self.phase
            .append(move || manager.apply_remove::<T>(handle));
        self
    }

    /// Defer erasing the entity itself from the manager.
    pub fn erase(&self) {
        let manager = self.manager;
        let handle = self.handle;
        self.phase.append(move || manager.apply_erase(handle));
    }

    /// Defer deep-copying every component of `source` onto this entity.
    /// The destination must not carry components yet.
    pub fn copy_from(&self, source: Handle) -> &Self {
        let manager = self.manager;
        let handle = self.handle;
        self.phase
            .append(move || manager.apply_copy_from(handle, source));
        self
    }

    pub fn has<T: Component>(&self) -> bool {
        self.manager.has_component::<T>(self.handle)
    }

    pub fn get<T: Component>(&self) -> Result<Ref<'w, T>> {
        self.manager.component::<T>(self.handle)
    }

    pub fn get_mut<T: Component>(&self) -> Result<RefMut<'w, T>> {
        self.manager.component_mut::<T>(self.handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_handle_is_latest() {
        let handle = Handle::default();
        assert_eq!(handle.key, EntityKey::latest());
    }

    #[test]
    fn test_id_discards_generation() {
        let key = EntityKey::from_index(12).advance_generation();
        let handle = Handle::new(key);
        assert_eq!(handle.id(), 12);
    }

    #[test]
    fn test_record_liveness() {
        let record = EntityRecord {
            archetype: ArchetypeKey::first(),
            row: INVALID_ROW,
            key: EntityKey::first(),
            name: None,
        };
        assert!(!record.is_live());
    }
}
