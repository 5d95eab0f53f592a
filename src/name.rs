//! String interning for entity names.
//!
//! Debug collaborator: entity names exist so tools and tests can find
//! entities without threading handles around. Interning is process-wide and
//! O(1) amortized; two [`StringId`]s are equal iff the strings are equal.

use std::sync::{Arc, OnceLock};

use parking_lot::Mutex;
use rustc_hash::FxHashMap;

/// Interned string identity.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct StringId(u32);

#[derive(Default)]
struct Interner {
    lookup: FxHashMap<Arc<str>, StringId>,
    strings: Vec<Arc<str>>,
}

fn interner() -> &'static Mutex<Interner> {
    static INTERNER: OnceLock<Mutex<Interner>> = OnceLock::new();
    INTERNER.get_or_init(|| Mutex::new(Interner::default()))
}

/// Intern `name`, minting a new id on first sight.
pub fn intern(name: &str) -> StringId {
    let mut interner = interner().lock();
    if let Some(id) = interner.lookup.get(name) {
        return *id;
    }
    let id = StringId(interner.strings.len() as u32);
    let shared: Arc<str> = Arc::from(name);
    interner.strings.push(shared.clone());
    interner.lookup.insert(shared, id);
    id
}

/// Look `name` up without interning it.
pub fn find(name: &str) -> Option<StringId> {
    interner().lock().lookup.get(name).copied()
}

/// The string behind `id`.
///
/// Panics on an id that was never minted by [`intern`].
pub fn resolve(id: StringId) -> Arc<str> {
    interner().lock().strings[id.0 as usize].clone()
}
