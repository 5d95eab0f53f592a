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

//! Error types

use std::fmt;

/// ECS error type
///
/// Programming errors (mutation of an iterated archetype, column type-tag
/// mismatches, broken structural invariants) are not represented here: they
/// are fatal and panic instead of propagating.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EcsError {
    /// Typed access for a component absent from the entity's archetype
    MissingComponent,

    /// Handle generation does not match the live record
    InvalidHandle,

    /// Erase through a handle that was already invalidated
    DoubleErase,

    /// Entity not found (e.g. blueprint source no longer live)
    EntityNotFound,
}

impl fmt::Display for EcsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EcsError::MissingComponent => write!(f, "Component not present on entity"),
            EcsError::InvalidHandle => write!(f, "Handle generation mismatch"),
            EcsError::DoubleErase => write!(f, "Entity erased twice"),
            EcsError::EntityNotFound => write!(f, "Entity not found"),
        }
    }
}

impl std::error::Error for EcsError {}

/// Result type alias
pub type Result<T> = std::result::Result<T, EcsError>;
