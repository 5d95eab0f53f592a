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

//! Query system with archetype matching and polymorphic iteration.
//!
//! A [`Query`] iterates every entity carrying the queried component types.
//! Callbacks choose their own shape: all components in declaration order,
//! any subset in any order, an optional [`Handle`] prefix, or the handle
//! alone. The shape is resolved at monomorphization through a marker type
//! parameter; per archetype the query computes the column-index vector for
//! the callback's parameter list once, then gathers by those indices at
//! each row.
//!
//! Iteration snapshots raw archetype pointers under a short state borrow
//! and releases it before invoking callbacks, so callbacks may read other
//! entities, append to phases, or run nested queries. Structural changes
//! stay forbidden for the duration; sanitize builds enforce that with the
//! archetypes' iteration counters.

use std::marker::PhantomData;
use std::rc::Rc;

use smallvec::SmallVec;

use crate::archetype::Archetype;
use crate::backend::{ListenerKind, Listening, SharedListener};
use crate::component::{Component, ComponentId, TypeSequence, TypeSet};
use crate::entity::Handle;
use crate::manager::EntityManager;
#[cfg(feature = "sanitize")]
use crate::manager::InternalState;

/// Column indices of a callback's parameters within one archetype.
pub(crate) type ColumnIndices = SmallVec<[usize; 8]>;

/// Tuple of component types a query iterates, in declaration order.
pub trait ComponentTuple: 'static {
    /// Ids in declaration order (the backend cache key).
    fn type_sequence() -> TypeSequence;

    /// Ids as an unordered set (the match requirement).
    fn type_set() -> TypeSet;

    /// Column index of every listed component inside `archetype`, in
    /// declaration order; `None` when one is absent.
    fn locate(archetype: &Archetype) -> Option<ColumnIndices>;
}

fn locate_ids(archetype: &Archetype, ids: &[ComponentId]) -> Option<ColumnIndices> {
    ids.iter().map(|id| archetype.column_index(*id)).collect()
}

macro_rules! impl_component_tuple {
    ($($T:ident),+) => {
        impl<$($T: Component),+> ComponentTuple for ($($T,)+) {
            fn type_sequence() -> TypeSequence {
                TypeSequence::from_ids([$(ComponentId::of::<$T>()),+])
            }

            fn type_set() -> TypeSet {
                TypeSet::from_ids([$(ComponentId::of::<$T>()),+])
            }

            fn locate(archetype: &Archetype) -> Option<ColumnIndices> {
                locate_ids(archetype, &[$(ComponentId::of::<$T>()),+])
            }
        }
    };
}

impl_component_tuple!(A);
impl_component_tuple!(A, B);
impl_component_tuple!(A, B, C);
impl_component_tuple!(A, B, C, D);
impl_component_tuple!(A, B, C, D, E);
impl_component_tuple!(A, B, C, D, E, F);
impl_component_tuple!(A, B, C, D, E, F, G);
impl_component_tuple!(A, B, C, D, E, F, G, H);

/// Marker for callbacks receiving component references.
pub struct Components<T>(PhantomData<T>);

/// Marker for callbacks receiving the entity handle.
pub struct WithHandle;

/// A callback invocable once per matched row.
///
/// Implemented for closures over any subset of the queried components in
/// any order, optionally prefixed with the entity [`Handle`], or taking the
/// handle alone. The marker parameter disambiguates the shapes.
pub trait RowCallback<Marker> {
    /// Component types the callback parameters name.
    fn required() -> TypeSet;

    /// Column index of every parameter inside `archetype`, in parameter
    /// order.
    fn locate(archetype: &Archetype) -> Option<ColumnIndices>;

    /// Invoke for one row.
    ///
    /// # Safety
    /// `archetype` must stay alive and structurally unchanged for the call;
    /// `columns` must come from [`Self::locate`] on the same archetype and
    /// `row` must be within bounds.
    unsafe fn invoke(
        &mut self,
        handle: Handle,
        archetype: *mut Archetype,
        columns: &[usize],
        row: usize,
    );
}

macro_rules! impl_row_callback {
    ($($T:ident),+) => {
        impl<Func, $($T: Component),+> RowCallback<Components<($($T,)+)>> for Func
        where
            Func: FnMut($(&mut $T),+),
        {
            fn required() -> TypeSet {
                TypeSet::from_ids([$(ComponentId::of::<$T>()),+])
            }

            fn locate(archetype: &Archetype) -> Option<ColumnIndices> {
                locate_ids(archetype, &[$(ComponentId::of::<$T>()),+])
            }

            #[allow(non_snake_case)]
            unsafe fn invoke(
                &mut self,
                _handle: Handle,
                archetype: *mut Archetype,
                columns: &[usize],
                row: usize,
            ) {
                let mut i = 0;
                $(
                    let $T: *mut $T = Archetype::cell_ptr::<$T>(archetype, columns[i], row);
                    i += 1;
                )+
                let _ = i;
                self($(&mut *$T),+);
            }
        }

        impl<Func, $($T: Component),+> RowCallback<(WithHandle, Components<($($T,)+)>)> for Func
        where
            Func: FnMut(Handle, $(&mut $T),+),
        {
            fn required() -> TypeSet {
                TypeSet::from_ids([$(ComponentId::of::<$T>()),+])
            }

            fn locate(archetype: &Archetype) -> Option<ColumnIndices> {
                locate_ids(archetype, &[$(ComponentId::of::<$T>()),+])
            }

            #[allow(non_snake_case)]
            unsafe fn invoke(
                &mut self,
                handle: Handle,
                archetype: *mut Archetype,
                columns: &[usize],
                row: usize,
            ) {
                let mut i = 0;
                $(
                    let $T: *mut $T = Archetype::cell_ptr::<$T>(archetype, columns[i], row);
                    i += 1;
                )+
                let _ = i;
                self(handle, $(&mut *$T),+);
            }
        }
    };
}

impl_row_callback!(A);
impl_row_callback!(A, B);
impl_row_callback!(A, B, C);
impl_row_callback!(A, B, C, D);
impl_row_callback!(A, B, C, D, E);
impl_row_callback!(A, B, C, D, E, F);
impl_row_callback!(A, B, C, D, E, F, G);
impl_row_callback!(A, B, C, D, E, F, G, H);

impl<F> RowCallback<WithHandle> for F
where
    F: FnMut(Handle),
{
    fn required() -> TypeSet {
        TypeSet::new()
    }

    fn locate(_archetype: &Archetype) -> Option<ColumnIndices> {
        Some(ColumnIndices::new())
    }

    unsafe fn invoke(
        &mut self,
        handle: Handle,
        _archetype: *mut Archetype,
        _columns: &[usize],
        _row: usize,
    ) {
        self(handle)
    }
}

/// A callback invocable once per ordered pair of matched rows.
///
/// The left and right components arrive as one tuple each (possibly
/// different subsets), optionally preceded by the pair's handles.
pub trait PairCallback<Marker> {
    /// Component types named by the left and right parameter tuples.
    fn required() -> (TypeSet, TypeSet);

    fn locate_left(archetype: &Archetype) -> Option<ColumnIndices>;

    fn locate_right(archetype: &Archetype) -> Option<ColumnIndices>;

    /// Invoke for one pair of rows.
    ///
    /// # Safety
    /// Same contract as [`RowCallback::invoke`] for both sides; the two
    /// (archetype, row) locations are never identical.
    #[allow(clippy::too_many_arguments)]
    unsafe fn invoke(
        &mut self,
        left_handle: Handle,
        left_archetype: *mut Archetype,
        left_columns: &[usize],
        left_row: usize,
        right_handle: Handle,
        right_archetype: *mut Archetype,
        right_columns: &[usize],
        right_row: usize,
    );
}

macro_rules! impl_pair_callback {
    (($($L:ident),+) | ($($R:ident),+)) => {
        impl<Func, $($L: Component,)+ $($R: Component),+>
            PairCallback<(Components<($($L,)+)>, Components<($($R,)+)>)> for Func
        where
            Func: FnMut(($(&mut $L,)+), ($(&mut $R,)+)),
        {
            fn required() -> (TypeSet, TypeSet) {
                (
                    TypeSet::from_ids([$(ComponentId::of::<$L>()),+]),
                    TypeSet::from_ids([$(ComponentId::of::<$R>()),+]),
                )
            }

            fn locate_left(archetype: &Archetype) -> Option<ColumnIndices> {
                locate_ids(archetype, &[$(ComponentId::of::<$L>()),+])
            }

            fn locate_right(archetype: &Archetype) -> Option<ColumnIndices> {
                locate_ids(archetype, &[$(ComponentId::of::<$R>()),+])
            }

            #[allow(non_snake_case)]
            unsafe fn invoke(
                &mut self,
                _left_handle: Handle,
                left_archetype: *mut Archetype,
                left_columns: &[usize],
                left_row: usize,
                _right_handle: Handle,
                right_archetype: *mut Archetype,
                right_columns: &[usize],
                right_row: usize,
            ) {
                let mut i = 0;
                $(
                    let $L: *mut $L =
                        Archetype::cell_ptr::<$L>(left_archetype, left_columns[i], left_row);
                    i += 1;
                )+
                let _ = i;
                let mut i = 0;
                $(
                    let $R: *mut $R =
                        Archetype::cell_ptr::<$R>(right_archetype, right_columns[i], right_row);
                    i += 1;
                )+
                let _ = i;
                self(($(&mut *$L,)+), ($(&mut *$R,)+));
            }
        }

        impl<Func, $($L: Component,)+ $($R: Component),+>
            PairCallback<(WithHandle, Components<($($L,)+)>, Components<($($R,)+)>)> for Func
        where
            Func: FnMut(Handle, ($(&mut $L,)+), Handle, ($(&mut $R,)+)),
        {
            fn required() -> (TypeSet, TypeSet) {
                (
                    TypeSet::from_ids([$(ComponentId::of::<$L>()),+]),
                    TypeSet::from_ids([$(ComponentId::of::<$R>()),+]),
                )
            }

            fn locate_left(archetype: &Archetype) -> Option<ColumnIndices> {
                locate_ids(archetype, &[$(ComponentId::of::<$L>()),+])
            }

            fn locate_right(archetype: &Archetype) -> Option<ColumnIndices> {
                locate_ids(archetype, &[$(ComponentId::of::<$R>()),+])
            }

            #[allow(non_snake_case)]
            unsafe fn invoke(
                &mut self,
                left_handle: Handle,
                left_archetype: *mut Archetype,
                left_columns: &[usize],
                left_row: usize,
                right_handle: Handle,
                right_archetype: *mut Archetype,
                right_columns: &[usize],
                right_row: usize,
            ) {
                let mut i = 0;
                $(
                    let $L: *mut $L =
                        Archetype::cell_ptr::<$L>(left_archetype, left_columns[i], left_row);
                    i += 1;
                )+
                let _ = i;
                let mut i = 0;
                $(
                    let $R: *mut $R =
                        Archetype::cell_ptr::<$R>(right_archetype, right_columns[i], right_row);
                    i += 1;
                )+
                let _ = i;
                self(left_handle, ($(&mut *$L,)+), right_handle, ($(&mut *$R,)+));
            }
        }
    };
}

macro_rules! impl_pair_callbacks_for_left {
    ($($L:ident),+) => {
        impl_pair_callback!(($($L),+) | (R1));
        impl_pair_callback!(($($L),+) | (R1, R2));
        impl_pair_callback!(($($L),+) | (R1, R2, R3));
        impl_pair_callback!(($($L),+) | (R1, R2, R3, R4));
    };
}

impl_pair_callbacks_for_left!(L1);
impl_pair_callbacks_for_left!(L1, L2);
impl_pair_callbacks_for_left!(L1, L2, L3);
impl_pair_callbacks_for_left!(L1, L2, L3, L4);

/// One matched archetype inside an iteration plan: stable pointer, column
/// indices for the callback's parameters, and the row count captured before
/// callbacks run.
struct PlanEntry {
    archetype: *mut Archetype,
    columns: ColumnIndices,
    count: usize,
}

struct PairPlanEntry {
    archetype: *mut Archetype,
    left_columns: ColumnIndices,
    right_columns: ColumnIndices,
    count: usize,
}

#[cfg(feature = "sanitize")]
struct IterationGuard {
    archetypes: SmallVec<[*mut Archetype; 8]>,
}

#[cfg(feature = "sanitize")]
impl Drop for IterationGuard {
    fn drop(&mut self) {
        for archetype in &self.archetypes {
            // SAFETY: archetypes are never removed from the store, so the
            // pointers outlive the iteration they guard.
            unsafe { (**archetype).end_iteration() };
        }
    }
}

/// User-facing view over a query backend.
///
/// Construction ensures the backend exists, prepopulated from all current
/// archetypes. Queries are clonable; listener registrations are shared RAII
/// tokens, deregistered when the last clone drops.
pub struct Query<'w, C: ComponentTuple> {
    manager: &'w EntityManager,
    active_listenings: Vec<Rc<Listening<'w>>>,
    _marker: PhantomData<fn() -> C>,
}

impl<'w, C: ComponentTuple> Query<'w, C> {
    pub fn new(manager: &'w EntityManager) -> Self {
        manager.with_state_mut(|state| state.ensure_backend::<C>());
        Self {
            manager,
            active_listenings: Vec::new(),
            _marker: PhantomData,
        }
    }

    /// Number of distinct entities matching the query.
    pub fn count_matches(&self) -> usize {
        self.manager.with_state_mut(|state| {
            state.ensure_backend::<C>();
            let backend = state.query_backends.get::<C>();
            let Some(backend) = backend else { return 0 };
            backend
                .matches
                .iter()
                .map(|matched| state.archetypes.get(matched.archetype).count_entities())
                .sum()
        })
    }

    /// Structural checks over all matched archetypes, including the cached
    /// column indices. Test-grade.
    pub fn verify_archetypes(&self) -> bool {
        self.manager.with_state_mut(|state| {
            state.ensure_backend::<C>();
            let Some(backend) = state.query_backends.get::<C>() else {
                return false;
            };
            backend.matches.iter().all(|matched| {
                let archetype = state.archetypes.get(matched.archetype);
                archetype.verify_stores_consistency()
                    && archetype.verify_handles_consistency(matched.archetype, &state.handle_map)
                    && C::locate(archetype)
                        .map(|columns| columns == matched.columns)
                        .unwrap_or(false)
            })
        })
    }

    /// Iterate every matched entity.
    ///
    /// The callback shape is free: all queried components in declaration
    /// order, a subset in any order, a [`Handle`] prefix, or the handle
    /// alone. Structural mutations must go through a [`crate::Phase`].
    pub fn each<M, F: RowCallback<M>>(&self, mut callback: F) {
        debug_assert!(
            C::type_set().is_superset(&F::required()),
            "callback names components outside the query"
        );
        let plan = self.build_plan(F::locate);
        #[cfg(feature = "sanitize")]
        let _guard = IterationGuard {
            archetypes: plan.iter().map(|entry| entry.archetype).collect(),
        };
        for entry in &plan {
            for row in 0..entry.count {
                // SAFETY: the plan pointers stay valid because structural
                // changes are deferred for the span of the iteration.
                unsafe {
                    let handle = Handle::new((*entry.archetype).row_key(row));
                    callback.invoke(handle, entry.archetype, &entry.columns, row);
                }
            }
        }
    }

    /// Iterate every ordered pair `(a, b)` with `a` strictly before `b` in
    /// the flattened matched order, without repetition.
    pub fn each_pair<M, F: PairCallback<M>>(&self, mut callback: F) {
        #[cfg(debug_assertions)]
        {
            let (left, right) = F::required();
            debug_assert!(
                C::type_set().is_superset(&left) && C::type_set().is_superset(&right),
                "callback names components outside the query"
            );
        }
        let plan = self.build_pair_plan(F::locate_left, F::locate_right);
        #[cfg(feature = "sanitize")]
        let _guard = IterationGuard {
            archetypes: plan.iter().map(|entry| entry.archetype).collect(),
        };
        for (index, left) in plan.iter().enumerate() {
            for left_row in 0..left.count {
                // SAFETY: see each(); additionally the strict
                // lower-triangular order guarantees the two rows of a pair
                // are never the same cell.
                unsafe {
                    let left_handle = Handle::new((*left.archetype).row_key(left_row));
                    for right_row in left_row + 1..left.count {
                        let right_handle = Handle::new((*left.archetype).row_key(right_row));
                        callback.invoke(
                            left_handle,
                            left.archetype,
                            &left.left_columns,
                            left_row,
                            right_handle,
                            left.archetype,
                            &left.right_columns,
                            right_row,
                        );
                    }
                    for right in &plan[index + 1..] {
                        for right_row in 0..right.count {
                            let right_handle = Handle::new((*right.archetype).row_key(right_row));
                            callback.invoke(
                                left_handle,
                                left.archetype,
                                &left.left_columns,
                                left_row,
                                right_handle,
                                right.archetype,
                                &right.right_columns,
                                right_row,
                            );
                        }
                    }
                }
            }
        }
    }

    /// Register a listener fired when an entity enters the match set
    /// (component added, blueprint instantiated, ...). Not notified
    /// retroactively for pre-existing matches. The registration lives as
    /// long as this query (and its clones).
    pub fn on_add_entity<M, F>(&mut self, callback: F)
    where
        F: RowCallback<M> + 'static,
    {
        self.listen(callback, ListenerKind::Added);
    }

    /// Register a listener fired when an entity is about to leave the match
    /// set; the listed components are still present when it runs.
    pub fn on_remove_entity<M, F>(&mut self, callback: F)
    where
        F: RowCallback<M> + 'static,
    {
        self.listen(callback, ListenerKind::Removed);
    }

    fn listen<M, F>(&mut self, mut callback: F, kind: ListenerKind)
    where
        F: RowCallback<M> + 'static,
    {
        debug_assert!(
            C::type_set().is_superset(&F::required()),
            "listener names components outside the query"
        );
        let wrapper = move |handle: Handle, archetype: *mut Archetype, row: usize| {
            // SAFETY: the backend signals with a live archetype pointer and
            // a current row; the callback's components are a subset of the
            // backend's, so locate succeeds on any matched archetype.
            unsafe {
                let Some(columns) = F::locate(&*archetype) else {
                    panic!("BUG: listener components not present in signalled archetype");
                };
                callback.invoke(handle, archetype, &columns, row);
            }
        };
        let shared: SharedListener = Rc::new(std::cell::RefCell::new(wrapper));
        let id = self.manager.with_state_mut(|state| {
            state.ensure_backend::<C>();
            let backend = state
                .query_backends
                .get_mut::<C>()
                .unwrap_or_else(|| unreachable!("backend just ensured"));
            match kind {
                ListenerKind::Added => backend.add_listeners.insert(shared),
                ListenerKind::Removed => backend.remove_listeners.insert(shared),
            }
        });
        self.active_listenings.push(Rc::new(Listening::new(
            self.manager,
            C::type_sequence(),
            kind,
            id,
        )));
    }

    fn build_plan(
        &self,
        locate: impl Fn(&Archetype) -> Option<ColumnIndices>,
    ) -> Vec<PlanEntry> {
        self.manager.with_state_mut(|state| {
            state.ensure_backend::<C>();
            #[cfg(feature = "sanitize")]
            Self::verify_matches(state);
            let keyed: Vec<_> = {
                let Some(backend) = state.query_backends.get::<C>() else {
                    return Vec::new();
                };
                backend
                    .matches
                    .iter()
                    .map(|matched| {
                        let archetype = state.archetypes.get(matched.archetype);
                        let Some(columns) = locate(archetype) else {
                            panic!("BUG: callback component missing from matched archetype");
                        };
                        #[cfg(feature = "sanitize")]
                        archetype.begin_iteration();
                        (matched.archetype, columns, archetype.count_entities())
                    })
                    .collect()
            };
            keyed
                .into_iter()
                .map(|(key, columns, count)| PlanEntry {
                    archetype: state.archetypes.archetype_ptr(key),
                    columns,
                    count,
                })
                .collect()
        })
    }

    fn build_pair_plan(
        &self,
        locate_left: impl Fn(&Archetype) -> Option<ColumnIndices>,
        locate_right: impl Fn(&Archetype) -> Option<ColumnIndices>,
    ) -> Vec<PairPlanEntry> {
        self.manager.with_state_mut(|state| {
            state.ensure_backend::<C>();
            #[cfg(feature = "sanitize")]
            Self::verify_matches(state);
            let keyed: Vec<_> = {
                let Some(backend) = state.query_backends.get::<C>() else {
                    return Vec::new();
                };
                backend
                    .matches
                    .iter()
                    .map(|matched| {
                        let archetype = state.archetypes.get(matched.archetype);
                        let (Some(left_columns), Some(right_columns)) =
                            (locate_left(archetype), locate_right(archetype))
                        else {
                            panic!("BUG: callback component missing from matched archetype");
                        };
                        #[cfg(feature = "sanitize")]
                        archetype.begin_iteration();
                        (
                            matched.archetype,
                            left_columns,
                            right_columns,
                            archetype.count_entities(),
                        )
                    })
                    .collect()
            };
            keyed
                .into_iter()
                .map(|(key, left_columns, right_columns, count)| PairPlanEntry {
                    archetype: state.archetypes.archetype_ptr(key),
                    left_columns,
                    right_columns,
                    count,
                })
                .collect()
        })
    }

    #[cfg(feature = "sanitize")]
    fn verify_matches(state: &InternalState) {
        if let Some(backend) = state.query_backends.get::<C>() {
            for matched in &backend.matches {
                let archetype = state.archetypes.get(matched.archetype);
                assert!(
                    archetype.verify_stores_consistency(),
                    "BUG: matched archetype stores are inconsistent"
                );
                assert!(
                    archetype.verify_handles_consistency(matched.archetype, &state.handle_map),
                    "BUG: matched archetype handles are inconsistent"
                );
            }
        }
    }
}

impl<'w, C: ComponentTuple> Clone for Query<'w, C> {
    fn clone(&self) -> Self {
        Self {
            manager: self.manager,
            active_listenings: self.active_listenings.clone(),
            _marker: PhantomData,
        }
    }
}
