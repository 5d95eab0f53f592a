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

//! Scoped deferral of structural mutations.
//!
//! Structural changes (adding/removing components, erasing entities) can
//! relocate rows and would invalidate references a caller still holds.
//! A [`Phase`] batches them: operations stack up while the phase is alive
//! and replay in insertion order when it drops, so callers iterate with
//! live references in the meantime.

use parking_lot::Mutex;

type Operation<'w> = Box<dyn FnOnce() + 'w>;

/// Scope object accumulating deferred operations.
///
/// Construction is cheap. [`Phase::append`] is thread-safe so a job system
/// may enqueue operations from several workers; everything else about the
/// store is single-threaded. The borrowed lifetime ties the phase to the
/// manager its operations capture, so a phase can never outlive it.
#[derive(Default)]
pub struct Phase<'w> {
    operations: Mutex<Vec<Operation<'w>>>,
}

impl<'w> Phase<'w> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue `operation` for replay at scope exit.
    pub fn append(&self, operation: impl FnOnce() + 'w) {
        self.operations.lock().push(Box::new(operation));
    }

    /// Number of queued operations.
    pub fn len(&self) -> usize {
        self.operations.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.lock().is_empty()
    }
}

impl Drop for Phase<'_> {
    fn drop(&mut self) {
        let operations = std::mem::take(self.operations.get_mut());
        for operation in operations {
            operation();
        }
    }
}
