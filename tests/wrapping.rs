//! Wrapped values riding the snapshot machinery.

mod common;

use archetypal::{EntityManager, Query, Wrap};
use common::{ComponentA, ComponentC};

#[test]
fn test_wrap_round_trip() {
    let world = EntityManager::new();
    let wrap = Wrap::new(
        &world,
        ComponentC {
            values: vec![1, 2],
        },
    );
    assert_eq!(wrap.get().values, vec![1, 2]);
    wrap.get_mut().values.push(3);
    assert_eq!(wrap.get().values, vec![1, 2, 3]);
}

#[test]
fn test_wrap_is_snapshot_aware() {
    let world = EntityManager::new();
    let wrap = Wrap::new(&world, ComponentA { d: 1.0 });

    let snapshot = world.save_state();
    wrap.get_mut().d = 99.0;
    assert_eq!(wrap.get().d, 99.0);

    world.restore_state(&snapshot);
    // The wrapped value was part of the world: restoring rolled it back.
    assert_eq!(wrap.get().d, 1.0);
}

#[test]
fn test_wrapped_entity_is_an_ordinary_entity() {
    let world = EntityManager::new();
    let wrap = Wrap::new(&world, ComponentA { d: 7.0 });

    // Visible to queries over its component type.
    let query = Query::<(ComponentA,)>::new(&world);
    assert_eq!(query.count_matches(), 1);
    let mut seen = Vec::new();
    query.each(|a: &mut ComponentA| seen.push(a.d));
    assert_eq!(seen, vec![7.0]);

    drop(wrap);
    assert_eq!(query.count_matches(), 0);
}
