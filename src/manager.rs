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

//! Central owner of entities, archetypes and query backends.
//!
//! The [`EntityManager`] holds one [`InternalState`] behind interior
//! mutability, so handles and queries address it through shared references.
//! Snapshots ([`State`]) are owning deep copies of the whole state; queries
//! stay wired across save/restore because backends are looked up by their
//! component sequence, not by address.

use std::cell::{Ref, RefCell, RefMut};
use std::collections::VecDeque;
use std::sync::Arc;

use rustc_hash::FxHashMap;

#[cfg(feature = "profiling")]
use tracing::info_span;

use crate::archetype::ArchetypeStore;
use crate::backend::{backend_matches, QueryBackendErased, QueryStore};
use crate::component::{Component, ComponentId, TypeSet};
use crate::entity::{Entity, EntityKey, EntityRecord, EntityView, Handle, INVALID_ROW};
use crate::error::{EcsError, Result};
use crate::name::{self, StringId};
use crate::phase::Phase;
use crate::query::ComponentTuple;

/// Marker component tagging template entities.
///
/// An entity carrying `Blueprint` is invisible to queries that do not list
/// the marker; [`EntityManager::create_from_blueprint`] clones it into an
/// ordinary entity.
#[derive(Clone, Copy, Debug, Default)]
pub struct Blueprint;

/// Everything one world owns. Deep-copyable as a whole, which is what the
/// snapshot API trades in.
#[derive(Clone)]
pub(crate) struct InternalState {
    next_key: EntityKey,
    pub(crate) handle_map: FxHashMap<u64, EntityRecord>,
    free_list: VecDeque<EntityKey>,
    name_map: FxHashMap<StringId, EntityKey>,
    pub(crate) archetypes: ArchetypeStore,
    pub(crate) query_backends: QueryStore,
}

impl Default for InternalState {
    fn default() -> Self {
        Self {
            next_key: EntityKey::first(),
            handle_map: FxHashMap::default(),
            free_list: VecDeque::new(),
            name_map: FxHashMap::default(),
            archetypes: ArchetypeStore::new(),
            query_backends: QueryStore::default(),
        }
    }
}

impl InternalState {
    /// Reuse a freed key (already generation-advanced at erase time) or
    /// mint a fresh one.
    fn allocate_handle(&mut self) -> EntityKey {
        if let Some(key) = self.free_list.pop_front() {
            return key;
        }
        assert!(
            self.next_key.index() + 1 < EntityKey::latest().index(),
            "BUG: entity index space exhausted"
        );
        self.next_key.post_increment_index()
    }

    /// The record for `key`, provided the stored generation matches and the
    /// record was not freed.
    pub(crate) fn live_record(&self, key: EntityKey) -> Option<&EntityRecord> {
        self.handle_map
            .get(&key.index())
            .filter(|record| record.key == key && record.is_live())
    }

    /// Create the backend for `C` when absent.
    pub(crate) fn ensure_backend<C: ComponentTuple>(&mut self) {
        let Self {
            query_backends,
            archetypes,
            ..
        } = self;
        query_backends.ensure::<C>(archetypes);
    }
}

/// Owning snapshot of a manager's whole state.
#[derive(Clone)]
pub struct State {
    inner: InternalState,
}

/// Backends whose match set an archetype transition leaves or enters.
struct TransitionEvents {
    lost: Vec<*const dyn QueryBackendErased>,
    gained: Vec<*const dyn QueryBackendErased>,
}

/// Erase the borrow lifetime tying a backend reference to the `RefCell`
/// guard it came from.
///
/// # Safety
/// Callers must only dereference the returned pointer while the backend
/// it points at is still alive. Backends live in stable `Box` allocations
/// for the lifetime of the manager, so the address stays valid across a
/// `RefCell` borrow release even though the borrow checker cannot see
/// that (see the SAFETY comments at each call site).
unsafe fn erase_backend_lifetime(backend: &dyn QueryBackendErased) -> *const dyn QueryBackendErased {
    std::mem::transmute::<&dyn QueryBackendErased, &'static dyn QueryBackendErased>(backend)
        as *const dyn QueryBackendErased
}

impl InternalState {
    /// Backend pointers for a `source_set → target_set` transition. The
    /// boxes owning the backends are stable, so the raw pointers survive
    /// until the borrow on the state is re-taken.
    fn transition_events(&self, source_set: &TypeSet, target_set: &TypeSet) -> TransitionEvents {
        let mut events = TransitionEvents {
            lost: Vec::new(),
            gained: Vec::new(),
        };
        for backend in self.query_backends.iter() {
            let required = backend.required();
            let in_source = backend_matches(required, source_set);
            let in_target = backend_matches(required, target_set);
            if in_source && !in_target {
                // SAFETY: see `erase_backend_lifetime`; the pointer is only
                // used while `self` (and the backends it owns) is alive.
                events.lost.push(unsafe { erase_backend_lifetime(backend) });
            } else if in_target && !in_source {
                // SAFETY: see `erase_backend_lifetime`.
                events.gained.push(unsafe { erase_backend_lifetime(backend) });
            }
        }
        events
    }
}

/// Central entity store.
///
/// All operations take `&self`; the state lives behind a `RefCell`, so the
/// manager is strictly single-threaded (deferral through [`Phase`] is the
/// one thread-safe surface).
#[derive(Default)]
pub struct EntityManager {
    state: RefCell<InternalState>,
}

impl EntityManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `f` on the exclusively borrowed state.
    pub(crate) fn with_state_mut<R>(&self, f: impl FnOnce(&mut InternalState) -> R) -> R {
        f(&mut self.state.borrow_mut())
    }

    fn state_ptr(&self) -> *mut InternalState {
        self.state.as_ptr()
    }

    /// Add a fresh, component-less entity.
    ///
    /// # Warning
    /// Thread unsafe, like every manager operation.
    pub fn add_entity(&self) -> Handle {
        self.add_entity_impl(None)
    }

    /// Add a fresh entity carrying a debug name. Duplicate names are
    /// asserted against in debug builds; release builds let the newest
    /// entity win the name lookup.
    pub fn add_entity_named(&self, name: &str) -> Handle {
        self.add_entity_impl(Some(name))
    }

    fn add_entity_impl(&self, name: Option<&str>) -> Handle {
        #[cfg(feature = "profiling")]
        let span = info_span!("manager.add_entity");
        #[cfg(feature = "profiling")]
        let _span_guard = span.enter();

        let mut state = self.state.borrow_mut();
        let key = state.allocate_handle();
        let state = &mut *state;
        let empty_key = ArchetypeStore::empty_key();
        let empty = state.archetypes.get_mut(empty_key);
        let row = empty.count_entities();
        empty.push_key(key);
        let name_id = name.map(name::intern);
        state.handle_map.insert(
            key.index(),
            EntityRecord {
                archetype: empty_key,
                row,
                key,
                name: name_id,
            },
        );
        if let Some(id) = name_id {
            let previous = state.name_map.insert(id, key);
            debug_assert!(previous.is_none(), "duplicate entity name");
        }
        Handle::new(key)
    }

    /// Add a template entity: a fresh entity immediately tagged with
    /// [`Blueprint`], keeping it out of ordinary queries.
    pub fn add_blueprint(&self) -> Handle {
        let handle = self.add_entity();
        self.apply_add(handle, Blueprint);
        handle
    }

    /// Named variant of [`Self::add_blueprint`].
    pub fn add_blueprint_named(&self, name: &str) -> Handle {
        let handle = self.add_entity_named(name);
        self.apply_add(handle, Blueprint);
        handle
    }

    /// Instantiate `source`: add a new entity, deep-copy every component of
    /// the blueprint into it, then strip the [`Blueprint`] marker from the
    /// copy. The blueprint itself is untouched.
    pub fn create_from_blueprint(&self, source: Handle, name: &str) -> Result<Handle> {
        if !self.is_valid(source) {
            return Err(EcsError::EntityNotFound);
        }
        let handle = self.add_entity_named(name);
        self.apply_copy_from(handle, source);
        self.apply_remove::<Blueprint>(handle);
        Ok(handle)
    }

    /// Number of live entities: records minus freed slots.
    pub fn count_live_entities(&self) -> usize {
        let state = self.state.borrow();
        debug_assert!(state.handle_map.len() >= state.free_list.len());
        state.handle_map.len() - state.free_list.len()
    }

    /// Number of archetypes, the always-present empty one included.
    pub fn archetype_count(&self) -> usize {
        self.state.borrow().archetypes.len()
    }

    /// True when `handle` still points at a live entity: the stored
    /// generation for its index equals the handle's own.
    pub fn is_valid(&self, handle: Handle) -> bool {
        self.state.borrow().live_record(handle.key).is_some()
    }

    /// Immediate-only view of the entity; absent for invalid handles.
    pub fn view(&self, handle: Handle) -> Option<EntityView<'_>> {
        self.is_valid(handle).then(|| EntityView::new(self, handle))
    }

    /// Phase-bound view of the entity; absent for invalid handles.
    /// Structural mutations through it are deferred onto `phase`.
    pub fn entity<'w, 'p>(&'w self, handle: Handle, phase: &'p Phase<'w>) -> Option<Entity<'w, 'p>> {
        self.is_valid(handle)
            .then(|| Entity::new(self, phase, handle))
    }

    pub fn has_component<T: Component>(&self, handle: Handle) -> bool {
        let state = self.state.borrow();
        state
            .live_record(handle.key)
            .map(|record| state.archetypes.get(record.archetype).has::<T>())
            .unwrap_or(false)
    }

    /// Shared guard over the component cell of `handle`.
    pub fn component<T: Component>(&self, handle: Handle) -> Result<Ref<'_, T>> {
        let state = self.state.borrow();
        let record = *state.live_record(handle.key).ok_or(EcsError::InvalidHandle)?;
        Ref::filter_map(state, |state| {
            state
                .archetypes
                .get(record.archetype)
                .storage::<T>()
                .and_then(|storage| storage.get(record.row))
        })
        .map_err(|_| EcsError::MissingComponent)
    }

    /// Exclusive guard over the component cell of `handle`. Value mutation
    /// is immediate; only structural changes require a [`Phase`].
    pub fn component_mut<T: Component>(&self, handle: Handle) -> Result<RefMut<'_, T>> {
        let state = self.state.borrow_mut();
        let record = *state.live_record(handle.key).ok_or(EcsError::InvalidHandle)?;
        RefMut::filter_map(state, |state| {
            state
                .archetypes
                .get_mut(record.archetype)
                .storage_mut::<T>()
                .and_then(|storage| storage.get_mut(record.row))
        })
        .map_err(|_| EcsError::MissingComponent)
    }

    /// Debug name of the entity, when it has one.
    pub fn entity_name(&self, handle: Handle) -> Option<Arc<str>> {
        self.state
            .borrow()
            .live_record(handle.key)
            .and_then(|record| record.name)
            .map(name::resolve)
    }

    /// Name registry lookup. Debug helper; uniqueness of names is only
    /// asserted in debug builds.
    pub fn handle_from_name(&self, entity_name: &str) -> Option<Handle> {
        let id = name::find(entity_name)?;
        let state = self.state.borrow();
        let key = *state.name_map.get(&id)?;
        state.live_record(key).map(|record| Handle::new(record.key))
    }

    /// Enumerate every live handle. The handle list is captured up front,
    /// so the callback may freely call back into the manager.
    pub fn for_each_handle(&self, mut callback: impl FnMut(Handle)) {
        let handles: Vec<Handle> = self
            .state
            .borrow()
            .handle_map
            .values()
            .filter(|record| record.is_live())
            .map(|record| Handle::new(record.key))
            .collect();
        for handle in handles {
            callback(handle);
        }
    }

    /// Move the active state into a snapshot and keep working on a deep
    /// copy of it. Costs a full logical copy of the world.
    pub fn save_state(&self) -> State {
        #[cfg(feature = "profiling")]
        let span = info_span!("manager.save_state");
        #[cfg(feature = "profiling")]
        let _span_guard = span.enter();

        let mut state = self.state.borrow_mut();
        let backup = std::mem::take(&mut *state);
        *state = backup.clone();
        State { inner: backup }
    }

    /// Replace the active state with a fresh deep copy of `snapshot`.
    /// Listeners live at snapshot time come back with it; handles resolve
    /// iff their index/generation resolve in the restored map.
    pub fn restore_state(&self, snapshot: &State) {
        #[cfg(feature = "profiling")]
        let span = info_span!("manager.restore_state");
        #[cfg(feature = "profiling")]
        let _span_guard = span.enter();

        *self.state.borrow_mut() = snapshot.inner.clone();
    }

    /// Commit a deferred component addition.
    ///
    /// Re-adding a present component overwrites the cell in place and emits
    /// no event. Otherwise the row moves to the extended archetype, the new
    /// value lands in its column, and backends gaining the entity are
    /// notified at the new location (backends losing it — possible when the
    /// added component is [`Blueprint`] — are notified beforehand).
    pub(crate) fn apply_add<T: Component>(&self, handle: Handle, component: T) {
        #[cfg(feature = "profiling")]
        let span = info_span!("manager.add_component", entity = handle.id());
        #[cfg(feature = "profiling")]
        let _span_guard = span.enter();

        let state_ptr = self.state_ptr();
        let (source_key, source_row, target_key, events) = {
            let mut state = self.state.borrow_mut();
            let state = &mut *state;
            let Some(record) = state.live_record(handle.key) else {
                debug_assert!(false, "component added through an invalid handle");
                return;
            };
            let source_key = record.archetype;
            let source_row = record.row;
            let source_set = state.archetypes.get(source_key).type_ids().clone();
            if source_set.contains(ComponentId::of::<T>()) {
                match state.archetypes.get_mut(source_key).get_mut::<T>(source_row) {
                    Ok(cell) => *cell = component,
                    Err(_) => unreachable!("column presence checked through the type set"),
                }
                return;
            }
            let target_set = source_set.with(ComponentId::of::<T>());
            let (target_key, inserted) = state
                .archetypes
                .make_if_absent(&target_set, |store| store.get(source_key).make_extended::<T>());
            if inserted {
                for backend in state.query_backends.iter_mut() {
                    backend.push_if_matches(&target_set, target_key, &state.archetypes);
                }
            }
            let events = state.transition_events(&source_set, &target_set);
            (source_key, source_row, target_key, events)
        };

        for backend in &events.lost {
            // SAFETY: the state borrow is released; backend boxes and the
            // state cell are stable for the manager's lifetime.
            unsafe { (**backend).signal_removed(handle, source_key, source_row, state_ptr) };
        }

        let new_row = {
            let mut state = self.state.borrow_mut();
            let state = &mut *state;
            let Some(record) = state.live_record(handle.key) else {
                debug_assert!(false, "entity vanished while committing an add");
                return;
            };
            let source_row = record.row;
            let InternalState {
                archetypes,
                handle_map,
                ..
            } = state;
            let (source, target) = archetypes.pair_mut(source_key, target_key);
            source.move_row(source_row, target, handle_map);
            let new_row = target.push(component);
            let Some(record) = handle_map.get_mut(&handle.key.index()) else {
                unreachable!("record resolved above")
            };
            record.archetype = target_key;
            record.row = new_row;
            new_row
        };

        for backend in &events.gained {
            // SAFETY: as above; the record now points at the new location.
            unsafe { (**backend).signal_added(handle, target_key, new_row, state_ptr) };
        }

        #[cfg(feature = "sanitize")]
        self.verify_entity_consistency(handle);
    }

    /// Commit a deferred component removal.
    ///
    /// Removing an absent component is a no-op without events. Otherwise
    /// backends losing the entity are notified first — the component is
    /// still present at the old location — then the row moves to the
    /// restricted archetype, and backends gaining the entity (possible when
    /// the removed component is [`Blueprint`]) are notified last.
    pub(crate) fn apply_remove<T: Component>(&self, handle: Handle) {
        #[cfg(feature = "profiling")]
        let span = info_span!("manager.remove_component", entity = handle.id());
        #[cfg(feature = "profiling")]
        let _span_guard = span.enter();

        let state_ptr = self.state_ptr();
        let (source_key, source_row, target_key, events) = {
            let mut state = self.state.borrow_mut();
            let state = &mut *state;
            let Some(record) = state.live_record(handle.key) else {
                debug_assert!(false, "component removed through an invalid handle");
                return;
            };
            let source_key = record.archetype;
            let source_row = record.row;
            let source_set = state.archetypes.get(source_key).type_ids().clone();
            if !source_set.contains(ComponentId::of::<T>()) {
                return;
            }
            let target_set = source_set.without(ComponentId::of::<T>());
            let (target_key, inserted) = state
                .archetypes
                .make_if_absent(&target_set, |store| {
                    store.get(source_key).make_restricted::<T>()
                });
            if inserted {
                for backend in state.query_backends.iter_mut() {
                    backend.push_if_matches(&target_set, target_key, &state.archetypes);
                }
            }
            let events = state.transition_events(&source_set, &target_set);
            (source_key, source_row, target_key, events)
        };

        for backend in &events.lost {
            // SAFETY: state borrow released; listeners still see the
            // component at its old location.
            unsafe { (**backend).signal_removed(handle, source_key, source_row, state_ptr) };
        }

        let new_row = {
            let mut state = self.state.borrow_mut();
            let state = &mut *state;
            let Some(record) = state.live_record(handle.key) else {
                debug_assert!(false, "entity vanished while committing a remove");
                return;
            };
            let source_row = record.row;
            let InternalState {
                archetypes,
                handle_map,
                ..
            } = state;
            let (source, target) = archetypes.pair_mut(source_key, target_key);
            source.move_row(source_row, target, handle_map);
            let new_row = target.count_entities() - 1;
            let Some(record) = handle_map.get_mut(&handle.key.index()) else {
                unreachable!("record resolved above")
            };
            record.archetype = target_key;
            record.row = new_row;
            new_row
        };

        for backend in &events.gained {
            // SAFETY: as above.
            unsafe { (**backend).signal_added(handle, target_key, new_row, state_ptr) };
        }

        #[cfg(feature = "sanitize")]
        self.verify_entity_consistency(handle);
    }

    /// Commit a deferred entity erase: notify every backend matching the
    /// current archetype, drop the row, advance the generation and feed the
    /// key to the free list. Erasing an already-invalid handle is a no-op
    /// (a hard error under `sanitize`).
    pub(crate) fn apply_erase(&self, handle: Handle) {
        #[cfg(feature = "profiling")]
        let span = info_span!("manager.erase_entity", entity = handle.id());
        #[cfg(feature = "profiling")]
        let _span_guard = span.enter();

        let state_ptr = self.state_ptr();
        let (source_key, source_row, lost) = {
            let state = self.state.borrow();
            let Some(record) = state.live_record(handle.key) else {
                if cfg!(feature = "sanitize") {
                    panic!("BUG: erase of an already-invalid handle");
                }
                return;
            };
            let source_set = state.archetypes.get(record.archetype).type_ids().clone();
            // SAFETY: see `erase_backend_lifetime`; the pointers are only
            // dereferenced below, after the borrow on `state` ends but
            // while the backends themselves (owned by `self`) are alive.
            let lost: Vec<*const dyn QueryBackendErased> = state
                .query_backends
                .iter()
                .filter(|backend| backend_matches(backend.required(), &source_set))
                .map(|backend| unsafe { erase_backend_lifetime(backend) })
                .collect();
            (record.archetype, record.row, lost)
        };

        for backend in &lost {
            // SAFETY: state borrow released; the entity is still in place.
            unsafe { (**backend).signal_removed(handle, source_key, source_row, state_ptr) };
        }

        let mut state = self.state.borrow_mut();
        let state = &mut *state;
        let Some(record) = state.live_record(handle.key) else {
            debug_assert!(false, "entity vanished while committing an erase");
            return;
        };
        let row = record.row;
        let archetype_key = record.archetype;
        let InternalState {
            archetypes,
            handle_map,
            name_map,
            free_list,
            ..
        } = state;
        archetypes.get_mut(archetype_key).remove_row(row, handle_map);
        let Some(record) = handle_map.get_mut(&handle.key.index()) else {
            unreachable!("record resolved above")
        };
        debug_assert!(record.key != EntityKey::latest());
        let advanced = record.key.advance_generation();
        record.key = advanced;
        record.row = INVALID_ROW;
        if let Some(name_id) = record.name.take() {
            name_map.remove(&name_id);
        }
        free_list.push_back(advanced);
    }

    /// Commit a deferred whole-entity copy: `destination` (which must not
    /// carry components yet) joins the archetype of `source` with a deep
    /// copy of every component.
    pub(crate) fn apply_copy_from(&self, destination: Handle, source: Handle) {
        let state_ptr = self.state_ptr();
        let (target_key, new_row, gained) = {
            let mut state = self.state.borrow_mut();
            let state = &mut *state;
            let Some(destination_record) = state.live_record(destination.key).copied() else {
                debug_assert!(false, "copy onto an invalid handle");
                return;
            };
            if state.live_record(source.key).is_none() {
                debug_assert!(false, "copy from an invalid handle");
                return;
            }
            debug_assert!(
                state
                    .archetypes
                    .get(destination_record.archetype)
                    .type_ids()
                    .is_empty(),
                "copy_from onto an entity that already has components"
            );
            {
                let InternalState {
                    archetypes,
                    handle_map,
                    ..
                } = state;
                archetypes
                    .get_mut(destination_record.archetype)
                    .remove_row(destination_record.row, handle_map);
            }
            // Resolve the source afresh: the removal above may have
            // relocated it when both lived in the same archetype.
            let Some(source_record) = state.live_record(source.key).copied() else {
                unreachable!("source record checked above")
            };
            let source_set = state.archetypes.get(source_record.archetype).type_ids().clone();
            let new_row = state
                .archetypes
                .get_mut(source_record.archetype)
                .clone_row(source_record.row, destination.key);
            let Some(record) = state.handle_map.get_mut(&destination.key.index()) else {
                unreachable!("record resolved above")
            };
            record.archetype = source_record.archetype;
            record.row = new_row;
            // SAFETY: see `erase_backend_lifetime`; the pointers are only
            // dereferenced below, after the borrow on `state` ends but
            // while the backends themselves (owned by `self`) are alive.
            let gained: Vec<*const dyn QueryBackendErased> = state
                .query_backends
                .iter()
                .filter(|backend| backend_matches(backend.required(), &source_set))
                .map(|backend| unsafe { erase_backend_lifetime(backend) })
                .collect();
            (source_record.archetype, new_row, gained)
        };

        for backend in &gained {
            // SAFETY: state borrow released; the copy is in place.
            unsafe { (**backend).signal_added(destination, target_key, new_row, state_ptr) };
        }

        #[cfg(feature = "sanitize")]
        self.verify_entity_consistency(destination);
    }

    #[cfg(feature = "sanitize")]
    fn verify_entity_consistency(&self, handle: Handle) {
        let state = self.state.borrow();
        if let Some(record) = state.live_record(handle.key) {
            let archetype = state.archetypes.get(record.archetype);
            assert!(
                archetype.verify_stores_consistency(),
                "BUG: inconsistent stores after a structural change"
            );
            assert!(
                archetype.verify_handles_consistency(record.archetype, &state.handle_map),
                "BUG: inconsistent handles after a structural change"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone, Debug, PartialEq)]
    struct Fuel {
        liters: f64,
    }

    #[test]
    fn test_add_entity_counts() {
        let world = EntityManager::new();
        assert_eq!(world.count_live_entities(), 0);
        let first = world.add_entity();
        let second = world.add_entity();
        assert_eq!(world.count_live_entities(), 2);
        assert!(world.is_valid(first));
        assert!(world.is_valid(second));
        assert_ne!(first, second);
    }

    #[test]
    fn test_default_handle_is_invalid() {
        let world = EntityManager::new();
        assert!(!world.is_valid(Handle::default()));
        assert!(world.view(Handle::default()).is_none());
    }

    #[test]
    fn test_add_component_moves_archetype() {
        let world = EntityManager::new();
        let handle = world.add_entity();
        assert_eq!(world.archetype_count(), 1);
        world.apply_add(handle, Fuel { liters: 10.0 });
        assert_eq!(world.archetype_count(), 2);
        assert!(world.has_component::<Fuel>(handle));
        assert_eq!(world.component::<Fuel>(handle).unwrap().liters, 10.0);
    }

    #[test]
    fn test_readd_overwrites_in_place() {
        let world = EntityManager::new();
        let handle = world.add_entity();
        world.apply_add(handle, Fuel { liters: 1.0 });
        let archetypes = world.archetype_count();
        world.apply_add(handle, Fuel { liters: 2.0 });
        assert_eq!(world.archetype_count(), archetypes);
        assert_eq!(world.component::<Fuel>(handle).unwrap().liters, 2.0);
    }

    #[test]
    fn test_erase_advances_generation_and_reuses_index() {
        let world = EntityManager::new();
        let first = world.add_entity();
        world.apply_erase(first);
        assert!(!world.is_valid(first));
        assert_eq!(world.count_live_entities(), 0);

        let second = world.add_entity();
        assert_eq!(second.id(), first.id());
        assert!(world.is_valid(second));
        assert!(!world.is_valid(first));
    }

    #[test]
    fn test_component_errors() {
        let world = EntityManager::new();
        let handle = world.add_entity();
        assert_eq!(
            world.component::<Fuel>(handle).err(),
            Some(EcsError::MissingComponent)
        );
        world.apply_erase(handle);
        assert_eq!(
            world.component::<Fuel>(handle).err(),
            Some(EcsError::InvalidHandle)
        );
    }

    #[test]
    fn test_names_resolve_to_handles() {
        let world = EntityManager::new();
        let named = world.add_entity_named("manager-test-hero");
        assert_eq!(world.handle_from_name("manager-test-hero"), Some(named));
        assert_eq!(world.entity_name(named).as_deref(), Some("manager-test-hero"));
        world.apply_erase(named);
        assert_eq!(world.handle_from_name("manager-test-hero"), None);
    }
}
