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

//! Archetypal - archetype-based entity-component store
//!
//! Entities are grouped by the exact set of component types they carry;
//! every component type lives in a contiguous column per group. On top of
//! the columnar core: generational handles that stay safe across row
//! relocations, scoped [`Phase`]s batching structural mutations, live
//! [`Query`]s with add/remove listeners, whole-world snapshot/restore, and
//! [`Blueprint`] entities cloneable into ordinary ones.

pub mod archetype;
pub mod backend;
pub mod component;
pub mod entity;
pub mod error;
pub mod key;
pub mod manager;
pub mod name;
pub mod phase;
pub mod query;
pub mod storage;
pub mod wrap;

// Re-exports for convenience
pub use archetype::{Archetype, ArchetypeKey, ArchetypeStore};
pub use backend::Listening;
pub use component::{Component, ComponentId, TypeSequence, TypeSet};
pub use entity::{Entity, EntityKey, EntityView, Handle};
pub use error::{EcsError, Result};
pub use key::{HandleKey, GENERATION_BITS, INDEX_BITS};
pub use manager::{Blueprint, EntityManager, State};
pub use name::StringId;
pub use phase::Phase;
pub use query::Query;
pub use storage::{AnyColumn, DataStore, Storage};
pub use wrap::Wrap;

#[cfg(test)]
mod tests;
