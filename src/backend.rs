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

//! Query backends: cached per-sequence match sets and event listeners.
//!
//! There is at most one backend per [`TypeSequence`] and manager state; all
//! identical queries share it, and the manager keeps every backend up to
//! date as archetypes appear and entities move. Backends are owned by the
//! state, so snapshots deep-copy them — listeners included.

use std::any::Any;
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::marker::PhantomData;
use std::rc::Rc;

use ahash::AHashMap;
use smallvec::SmallVec;

use crate::archetype::{Archetype, ArchetypeKey, ArchetypeStore};
use crate::component::{ComponentId, TypeSequence, TypeSet};
use crate::entity::Handle;
use crate::manager::{Blueprint, EntityManager, InternalState};
use crate::query::ComponentTuple;

/// Match rule shared by backend prepopulation and event routing.
///
/// An archetype matches a required set iff it carries every required type,
/// with one carve-out: template entities (carrying [`Blueprint`]) are only
/// visible to queries that ask for the marker explicitly.
pub(crate) fn backend_matches(required: &TypeSet, candidate: &TypeSet) -> bool {
    let blueprint = ComponentId::of::<Blueprint>();
    candidate.is_superset(required)
        && (required.contains(blueprint) || !candidate.contains(blueprint))
}

/// Store handing out stable u64 handles for inserted values, so listener
/// deregistration survives unrelated insertions and removals.
#[derive(Clone)]
pub(crate) struct HandledStore<T> {
    next_handle: u64,
    store: BTreeMap<u64, T>,
}

impl<T> Default for HandledStore<T> {
    fn default() -> Self {
        Self {
            next_handle: 0,
            store: BTreeMap::new(),
        }
    }
}

impl<T> HandledStore<T> {
    pub fn insert(&mut self, value: T) -> u64 {
        let handle = self.next_handle;
        self.next_handle += 1;
        self.store.insert(handle, value);
        handle
    }

    pub fn erase(&mut self, handle: u64) -> Option<T> {
        self.store.remove(&handle)
    }

    pub fn values(&self) -> impl Iterator<Item = &T> + '_ {
        self.store.values()
    }

    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }
}

/// Listener callbacks are erased to one uniform signature: the entity
/// handle, the archetype holding it, and its row. Shape resolution happens
/// in the wrapper the query installs. Shared (`Rc`) so snapshot copies keep
/// firing into the same captured state, the way by-reference captures did
/// in the source design.
pub(crate) type SharedListener = Rc<RefCell<dyn FnMut(Handle, *mut Archetype, usize)>>;

/// One archetype matched by a backend, with the column index of each
/// requested component cached in declaration order.
#[derive(Clone, Debug)]
pub(crate) struct MatchedArchetype {
    pub archetype: ArchetypeKey,
    pub columns: SmallVec<[usize; 8]>,
}

/// Object-safe face of [`QueryBackend`], stored type-erased in the state.
pub(crate) trait QueryBackendErased {
    fn clone_boxed(&self) -> Box<dyn QueryBackendErased>;

    /// Required set of the backing sequence.
    fn required(&self) -> &TypeSet;

    /// Offer a freshly inserted archetype; the backend caches a match entry
    /// when the archetype qualifies.
    fn push_if_matches(&mut self, type_ids: &TypeSet, candidate: ArchetypeKey, store: &ArchetypeStore);

    /// Notify add-listeners that `handle` entered the match set, located at
    /// (`archetype`, `row`).
    ///
    /// # Safety
    /// `state` must point at the live state owning this backend, with no
    /// outstanding borrow; the location must be current.
    unsafe fn signal_added(&self, handle: Handle, archetype: ArchetypeKey, row: usize, state: *mut InternalState);

    /// Notify remove-listeners that `handle` is about to leave the match
    /// set; the components are still present at (`archetype`, `row`).
    ///
    /// # Safety
    /// Same contract as [`Self::signal_added`].
    unsafe fn signal_removed(&self, handle: Handle, archetype: ArchetypeKey, row: usize, state: *mut InternalState);

    fn erase_add_listener(&mut self, id: u64);

    fn erase_remove_listener(&mut self, id: u64);

    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// Cached match set plus listener registries for one component sequence.
pub(crate) struct QueryBackend<C: ComponentTuple> {
    required: TypeSet,
    pub(crate) matches: Vec<MatchedArchetype>,
    pub(crate) add_listeners: HandledStore<SharedListener>,
    pub(crate) remove_listeners: HandledStore<SharedListener>,
    _marker: PhantomData<fn() -> C>,
}

impl<C: ComponentTuple> QueryBackend<C> {
    /// Backend prepopulated from every archetype currently in the store,
    /// in insertion order.
    pub fn new(store: &ArchetypeStore) -> Self {
        let mut backend = Self {
            required: C::type_set(),
            matches: Vec::new(),
            add_listeners: HandledStore::default(),
            remove_listeners: HandledStore::default(),
            _marker: PhantomData,
        };
        for (key, archetype) in store.iter() {
            backend.push_if_matches(archetype.type_ids(), key, store);
        }
        backend
    }

    unsafe fn signal(
        &self,
        listeners: &HandledStore<SharedListener>,
        handle: Handle,
        archetype: ArchetypeKey,
        row: usize,
        state: *mut InternalState,
    ) {
        debug_assert!(
            self.matches.iter().any(|matched| matched.archetype == archetype),
            "signal for an archetype this backend does not match"
        );
        if listeners.is_empty() {
            return;
        }
        // Clone the shared callbacks first: a listener may register or
        // deregister listeners on this very backend while it runs.
        let listeners: Vec<SharedListener> = listeners.values().cloned().collect();
        let archetype_ptr = (*state).archetypes.archetype_ptr(archetype);
        for listener in listeners {
            (listener.borrow_mut())(handle, archetype_ptr, row);
        }
    }
}

impl<C: ComponentTuple> Clone for QueryBackend<C> {
    fn clone(&self) -> Self {
        Self {
            required: self.required.clone(),
            matches: self.matches.clone(),
            add_listeners: self.add_listeners.clone(),
            remove_listeners: self.remove_listeners.clone(),
            _marker: PhantomData,
        }
    }
}

impl<C: ComponentTuple> QueryBackendErased for QueryBackend<C> {
    fn clone_boxed(&self) -> Box<dyn QueryBackendErased> {
        Box::new(self.clone())
    }

    fn required(&self) -> &TypeSet {
        &self.required
    }

    fn push_if_matches(&mut self, type_ids: &TypeSet, candidate: ArchetypeKey, store: &ArchetypeStore) {
        if !backend_matches(&self.required, type_ids) {
            return;
        }
        let Some(columns) = C::locate(store.get(candidate)) else {
            panic!("BUG: matched archetype misses a required column");
        };
        self.matches.push(MatchedArchetype {
            archetype: candidate,
            columns,
        });
    }

    unsafe fn signal_added(&self, handle: Handle, archetype: ArchetypeKey, row: usize, state: *mut InternalState) {
        self.signal(&self.add_listeners, handle, archetype, row, state);
    }

    unsafe fn signal_removed(&self, handle: Handle, archetype: ArchetypeKey, row: usize, state: *mut InternalState) {
        self.signal(&self.remove_listeners, handle, archetype, row, state);
    }

    fn erase_add_listener(&mut self, id: u64) {
        self.add_listeners.erase(id);
    }

    fn erase_remove_listener(&mut self, id: u64) {
        self.remove_listeners.erase(id);
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// All backends of one state, keyed by declaration sequence.
pub(crate) struct QueryStore {
    backends: AHashMap<TypeSequence, Box<dyn QueryBackendErased>>,
}

impl Default for QueryStore {
    fn default() -> Self {
        Self {
            backends: AHashMap::new(),
        }
    }
}

impl Clone for QueryStore {
    fn clone(&self) -> Self {
        Self {
            backends: self
                .backends
                .iter()
                .map(|(sequence, backend)| (sequence.clone(), backend.clone_boxed()))
                .collect(),
        }
    }
}

impl QueryStore {
    /// Create the backend for `C` when absent, prepopulating its matches.
    pub fn ensure<C: ComponentTuple>(&mut self, archetypes: &ArchetypeStore) {
        self.backends
            .entry(C::type_sequence())
            .or_insert_with(|| Box::new(QueryBackend::<C>::new(archetypes)));
    }

    pub fn get<C: ComponentTuple>(&self) -> Option<&QueryBackend<C>> {
        self.backends
            .get(&C::type_sequence())
            .and_then(|backend| backend.as_any().downcast_ref())
    }

    pub fn get_mut<C: ComponentTuple>(&mut self) -> Option<&mut QueryBackend<C>> {
        self.backends
            .get_mut(&C::type_sequence())
            .and_then(|backend| backend.as_any_mut().downcast_mut())
    }

    pub fn get_dyn_mut(&mut self, sequence: &TypeSequence) -> Option<&mut (dyn QueryBackendErased + 'static)> {
        self.backends.get_mut(sequence).map(|backend| &mut **backend)
    }

    pub fn iter(&self) -> impl Iterator<Item = &dyn QueryBackendErased> + '_ {
        self.backends.values().map(|backend| &**backend)
    }

    pub fn iter_mut(
        &mut self,
    ) -> impl Iterator<Item = &mut (dyn QueryBackendErased + 'static)> + '_ {
        self.backends.values_mut().map(|backend| &mut **backend)
    }

    pub fn len(&self) -> usize {
        self.backends.len()
    }
}

/// Which listener registry a [`Listening`] token points into.
#[derive(Clone, Copy, Debug)]
pub(crate) enum ListenerKind {
    Added,
    Removed,
}

/// RAII listener registration.
///
/// Dropping the token removes exactly the listener it installed from the
/// backend of its sequence in the manager's *current* state. The lookup by
/// (sequence, id) rather than by pointer is what keeps tokens correct
/// across snapshot-induced backend replacements: destroying a snapshot
/// never cancels active listeners, and restoring one revives the listeners
/// that were live at snapshot time.
pub struct Listening<'w> {
    manager: &'w EntityManager,
    sequence: TypeSequence,
    kind: ListenerKind,
    id: u64,
}

impl<'w> Listening<'w> {
    pub(crate) fn new(
        manager: &'w EntityManager,
        sequence: TypeSequence,
        kind: ListenerKind,
        id: u64,
    ) -> Self {
        Self {
            manager,
            sequence,
            kind,
            id,
        }
    }
}

impl Drop for Listening<'_> {
    fn drop(&mut self) {
        self.manager.with_state_mut(|state| {
            if let Some(backend) = state.query_backends.get_dyn_mut(&self.sequence) {
                match self.kind {
                    ListenerKind::Added => backend.erase_add_listener(self.id),
                    ListenerKind::Removed => backend.erase_remove_listener(self.id),
                }
            }
        });
    }
}
