//! Handle validity, generations and slot reuse.

mod common;

use archetypal::{EntityManager, Handle, Phase};
use common::ComponentA;

#[test]
fn test_default_handle_is_always_invalid() {
    let world = EntityManager::new();
    let handle = Handle::default();
    assert!(!world.is_valid(handle));
    assert!(world.view(handle).is_none());
    let phase = Phase::new();
    assert!(world.entity(handle, &phase).is_none());
}

#[test]
fn test_erase_invalidates_outstanding_handles() {
    let world = EntityManager::new();
    let h1 = world.add_entity();
    let copy = h1;
    {
        let phase = Phase::new();
        world.entity(h1, &phase).unwrap().erase();
    }
    assert!(!world.is_valid(h1));
    assert!(!world.is_valid(copy));
    assert_eq!(world.count_live_entities(), 0);
}

#[test]
fn test_reused_slot_gets_a_new_generation() {
    let world = EntityManager::new();
    let h1 = world.add_entity();
    {
        let phase = Phase::new();
        world.entity(h1, &phase).unwrap().erase();
    }

    let h2 = world.add_entity();
    // The slot may be reused...
    assert_eq!(h2.id(), h1.id());
    // ...but only the new handle resolves.
    assert!(world.is_valid(h2));
    assert!(!world.is_valid(h1));
    assert_ne!(h1, h2);
}

#[test]
fn test_stale_handle_reads_fail_after_reuse() {
    let world = EntityManager::new();
    let h1 = world.add_entity();
    {
        let phase = Phase::new();
        world
            .entity(h1, &phase)
            .unwrap()
            .add(ComponentA { d: 1.0 });
    }
    {
        let phase = Phase::new();
        world.entity(h1, &phase).unwrap().erase();
    }
    let h2 = world.add_entity();
    {
        let phase = Phase::new();
        world
            .entity(h2, &phase)
            .unwrap()
            .add(ComponentA { d: 2.0 });
    }

    assert!(world.component::<ComponentA>(h1).is_err());
    assert_eq!(world.component::<ComponentA>(h2).unwrap().d, 2.0);
}

#[test]
fn test_freed_slots_are_reused_in_order() {
    let world = EntityManager::new();
    let first = world.add_entity();
    let second = world.add_entity();
    {
        let phase = Phase::new();
        world.entity(first, &phase).unwrap().erase();
        world.entity(second, &phase).unwrap().erase();
    }
    let reused_first = world.add_entity();
    let reused_second = world.add_entity();
    assert_eq!(reused_first.id(), first.id());
    assert_eq!(reused_second.id(), second.id());
    let fresh = world.add_entity();
    assert_ne!(fresh.id(), first.id());
    assert_ne!(fresh.id(), second.id());
}

#[test]
fn test_handles_keep_resolving_across_relocations() {
    let world = EntityManager::new();
    let handles: Vec<Handle> = (0..4)
        .map(|index| {
            let handle = world.add_entity();
            let phase = Phase::new();
            world.entity(handle, &phase).unwrap().add(ComponentA {
                d: index as f64,
            });
            drop(phase);
            handle
        })
        .collect();

    // Erasing the first entity swap-relocates the last row of the
    // archetype; every surviving handle must still resolve to its value.
    {
        let phase = Phase::new();
        world.entity(handles[0], &phase).unwrap().erase();
    }
    for (index, handle) in handles.iter().enumerate().skip(1) {
        assert_eq!(
            world.component::<ComponentA>(*handle).unwrap().d,
            index as f64
        );
    }
}

#[test]
fn test_named_lookup() {
    let world = EntityManager::new();
    let hero = world.add_entity_named("handles-test-hero");
    assert_eq!(world.handle_from_name("handles-test-hero"), Some(hero));
    assert_eq!(world.handle_from_name("handles-test-unknown"), None);
}
