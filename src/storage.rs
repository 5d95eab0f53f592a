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

//! Type-erased component columns.
//!
//! Each column stores one component type contiguously. Columns are handled
//! through [`AnyColumn`] trait objects so an archetype can own a
//! heterogeneous list of them; the typed view is recovered with a checked
//! downcast keyed on the component id tag.

use std::any::Any;

use crate::component::{Component, ComponentId};

/// Type-erased dense column of one component type.
pub trait AnyColumn: Any {
    /// Number of stored elements.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Id tag of the stored component type.
    fn component_id(&self) -> ComponentId;

    /// Universal row removal: move the last element onto `row`, then pop.
    /// O(1), relocates at most one row.
    fn erase_by_swap(&mut self, row: usize);

    /// Take the element at `source[source_row]` and push it at the back of
    /// this column. The source cell is left in place for the caller's
    /// subsequent [`AnyColumn::erase_by_swap`].
    fn push_moved_from(&mut self, source: &mut dyn AnyColumn, source_row: usize);

    /// Push a deep copy of `source[source_row]` at the back of this column.
    fn push_copied_from(&mut self, source: &dyn AnyColumn, source_row: usize);

    /// Push a deep copy of this column's own `row` at its back.
    fn push_cloned_within(&mut self, row: usize);

    /// Deep copy of the column.
    fn clone_column(&self) -> Box<dyn AnyColumn>;

    /// Fresh empty column for the same component type.
    fn clone_empty(&self) -> Box<dyn AnyColumn>;

    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl dyn AnyColumn {
    /// Typed view of the column. Panics when the requested type does not
    /// match the column's id tag: that mismatch is a bug in the caller, not
    /// a recoverable condition.
    pub fn as_storage<T: Component>(&self) -> &Storage<T> {
        match self.as_any().downcast_ref::<Storage<T>>() {
            Some(storage) => storage,
            None => panic!(
                "BUG: column type tag mismatch, requested {}",
                std::any::type_name::<T>()
            ),
        }
    }

    /// Typed mutable view of the column; same contract as
    /// [`Self::as_storage`].
    pub fn as_storage_mut<T: Component>(&mut self) -> &mut Storage<T> {
        match self.as_any_mut().downcast_mut::<Storage<T>>() {
            Some(storage) => storage,
            None => panic!(
                "BUG: column type tag mismatch, requested {}",
                std::any::type_name::<T>()
            ),
        }
    }
}

/// Typed column backing one component type of one archetype.
pub struct Storage<T: Component> {
    pub(crate) items: Vec<T>,
}

impl<T: Component> Storage<T> {
    pub fn new() -> Self {
        Self { items: Vec::new() }
    }

    pub fn get(&self, row: usize) -> Option<&T> {
        self.items.get(row)
    }

    pub fn get_mut(&mut self, row: usize) -> Option<&mut T> {
        self.items.get_mut(row)
    }

    pub fn as_slice(&self) -> &[T] {
        &self.items
    }
}

impl<T: Component> Default for Storage<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Component> AnyColumn for Storage<T> {
    fn len(&self) -> usize {
        self.items.len()
    }

    fn component_id(&self) -> ComponentId {
        ComponentId::of::<T>()
    }

    fn erase_by_swap(&mut self, row: usize) {
        // Removing from an empty column or past the end is a bug upstream.
        assert!(
            row < self.items.len(),
            "BUG: erase_by_swap called with invalid row {} (len={})",
            row,
            self.items.len()
        );
        self.items.swap_remove(row);
    }

    fn push_moved_from(&mut self, source: &mut dyn AnyColumn, source_row: usize) {
        let source = source.as_storage_mut::<T>();
        let taken = source.items[source_row].clone();
        self.items.push(taken);
    }

    fn push_copied_from(&mut self, source: &dyn AnyColumn, source_row: usize) {
        let source = source.as_storage::<T>();
        self.items.push(source.items[source_row].clone());
    }

    fn push_cloned_within(&mut self, row: usize) {
        let copy = self.items[row].clone();
        self.items.push(copy);
    }

    fn clone_column(&self) -> Box<dyn AnyColumn> {
        Box::new(Storage::<T> {
            items: self.items.clone(),
        })
    }

    fn clone_empty(&self) -> Box<dyn AnyColumn> {
        Box::new(Storage::<T>::new())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Owning list of columns with value semantics: copying a DataStore
/// deep-clones every column.
#[derive(Default)]
pub struct DataStore {
    columns: Vec<Box<dyn AnyColumn>>,
}

impl DataStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, column: Box<dyn AnyColumn>) {
        self.columns.push(column);
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn column(&self, index: usize) -> &dyn AnyColumn {
        &*self.columns[index]
    }

    pub fn column_mut(&mut self, index: usize) -> &mut dyn AnyColumn {
        &mut *self.columns[index]
    }

    pub fn iter(&self) -> impl Iterator<Item = &dyn AnyColumn> + '_ {
        self.columns.iter().map(|column| &**column)
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut (dyn AnyColumn + 'static)> + '_ {
        self.columns.iter_mut().map(|column| &mut **column)
    }
}

impl Clone for DataStore {
    fn clone(&self) -> Self {
        Self {
            columns: self.columns.iter().map(|column| column.clone_column()).collect(),
        }
    }
}
