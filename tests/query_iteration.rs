//! Iteration over matched archetypes: callback shapes and pair iteration.

mod common;

use archetypal::{EntityManager, Handle, Phase, Query};
use common::{ComponentA, ComponentB};

fn spawn_a(world: &EntityManager, d: f64) -> Handle {
    let handle = world.add_entity();
    let phase = Phase::new();
    world.entity(handle, &phase).unwrap().add(ComponentA { d });
    drop(phase);
    handle
}

fn spawn_ab(world: &EntityManager, d: f64, text: &str) -> Handle {
    let handle = world.add_entity();
    let phase = Phase::new();
    let entity = world.entity(handle, &phase).unwrap();
    entity.add(ComponentA { d });
    entity.add(ComponentB {
        text: text.to_owned(),
    });
    drop(phase);
    handle
}

#[test]
fn test_each_visits_every_match_across_archetypes() {
    let world = EntityManager::new();
    spawn_a(&world, 1.0);
    spawn_ab(&world, 2.0, "two");

    let query = Query::<(ComponentA,)>::new(&world);
    assert_eq!(query.count_matches(), 2);

    let mut visited = 0;
    let mut sum = 0.0;
    query.each(|a: &mut ComponentA| {
        visited += 1;
        sum += a.d;
    });
    assert_eq!(visited, query.count_matches());
    assert_eq!(sum, 3.0);
}

#[test]
fn test_each_mutates_in_place() {
    let world = EntityManager::new();
    let handle = spawn_a(&world, 10.0);

    let query = Query::<(ComponentA,)>::new(&world);
    query.each(|a: &mut ComponentA| a.d *= 2.0);
    assert_eq!(world.component::<ComponentA>(handle).unwrap().d, 20.0);
}

#[test]
fn test_each_with_handle_prefix() {
    let world = EntityManager::new();
    let first = spawn_a(&world, 1.0);
    let second = spawn_a(&world, 2.0);

    let query = Query::<(ComponentA,)>::new(&world);
    let mut seen = Vec::new();
    query.each(|handle: Handle, a: &mut ComponentA| {
        seen.push((handle, a.d));
    });
    assert_eq!(seen, vec![(first, 1.0), (second, 2.0)]);
}

#[test]
fn test_each_handle_only() {
    let world = EntityManager::new();
    let handle = spawn_ab(&world, 1.0, "x");

    let query = Query::<(ComponentA, ComponentB)>::new(&world);
    let mut seen = Vec::new();
    query.each(|h: Handle| seen.push(h));
    assert_eq!(seen, vec![handle]);
}

#[test]
fn test_each_subset_in_any_order() {
    let world = EntityManager::new();
    spawn_ab(&world, 4.0, "subset");

    let query = Query::<(ComponentA, ComponentB)>::new(&world);

    let mut texts = Vec::new();
    query.each(|b: &mut ComponentB| texts.push(b.text.clone()));
    assert_eq!(texts, vec!["subset".to_owned()]);

    // Reordered relative to the declaration.
    let mut pairs = Vec::new();
    query.each(|b: &mut ComponentB, a: &mut ComponentA| {
        pairs.push((b.text.clone(), a.d));
    });
    assert_eq!(pairs, vec![("subset".to_owned(), 4.0)]);
}

#[test]
fn test_queries_only_match_supersets() {
    let world = EntityManager::new();
    spawn_a(&world, 1.0);
    spawn_ab(&world, 2.0, "both");

    assert_eq!(Query::<(ComponentA,)>::new(&world).count_matches(), 2);
    assert_eq!(Query::<(ComponentB,)>::new(&world).count_matches(), 1);
    assert_eq!(
        Query::<(ComponentA, ComponentB)>::new(&world).count_matches(),
        1
    );
}

#[test]
fn test_declaration_order_yields_distinct_backends() {
    let world = EntityManager::new();
    spawn_ab(&world, 3.0, "order");

    // Same match set, different declaration order: both see the entity.
    let forward = Query::<(ComponentA, ComponentB)>::new(&world);
    let backward = Query::<(ComponentB, ComponentA)>::new(&world);
    assert_eq!(forward.count_matches(), 1);
    assert_eq!(backward.count_matches(), 1);

    let mut seen = Vec::new();
    backward.each(|b: &mut ComponentB, a: &mut ComponentA| {
        seen.push((b.text.clone(), a.d));
    });
    assert_eq!(seen, vec![("order".to_owned(), 3.0)]);
}

#[test]
fn test_each_pair_visits_unordered_pairs_once() {
    let world = EntityManager::new();
    for d in [10.0, 100.0, 1000.0] {
        spawn_a(&world, d);
    }

    let query = Query::<(ComponentA,)>::new(&world);
    assert_eq!(query.count_matches(), 3);

    let mut pairs = Vec::new();
    query.each_pair(|(left,): (&mut ComponentA,), (right,): (&mut ComponentA,)| {
        pairs.push((left.d, right.d));
    });
    assert_eq!(
        pairs,
        vec![(10.0, 100.0), (10.0, 1000.0), (100.0, 1000.0)]
    );
}

#[test]
fn test_each_pair_spans_archetypes() {
    let world = EntityManager::new();
    spawn_a(&world, 1.0);
    spawn_ab(&world, 2.0, "ab");
    spawn_a(&world, 3.0);

    let query = Query::<(ComponentA,)>::new(&world);
    let mut count = 0;
    query.each_pair(|(_,): (&mut ComponentA,), (_,): (&mut ComponentA,)| count += 1);
    // Three entities, three unordered pairs, regardless of archetype.
    assert_eq!(count, 3);
}

#[test]
fn test_each_pair_with_handles_and_subsets() {
    let world = EntityManager::new();
    let first = spawn_ab(&world, 1.0, "one");
    let second = spawn_ab(&world, 2.0, "two");

    let query = Query::<(ComponentA, ComponentB)>::new(&world);
    let mut seen = Vec::new();
    query.each_pair(
        |left_handle: Handle,
         (left,): (&mut ComponentA,),
         right_handle: Handle,
         (right,): (&mut ComponentA,)| {
            seen.push((left_handle, left.d, right_handle, right.d));
        },
    );
    assert_eq!(seen, vec![(first, 1.0, second, 2.0)]);
}

#[test]
fn test_zero_sized_components_match() {
    let world = EntityManager::new();
    let handle = world.add_entity();
    {
        let phase = Phase::new();
        let entity = world.entity(handle, &phase).unwrap();
        entity.add(common::ComponentEmpty);
        entity.add(ComponentA { d: 1.0 });
    }

    let query = Query::<(common::ComponentEmpty,)>::new(&world);
    assert_eq!(query.count_matches(), 1);
    let mut seen = Vec::new();
    query.each(|h: Handle, _: &mut common::ComponentEmpty| seen.push(h));
    assert_eq!(seen, vec![handle]);
}

#[test]
fn test_nested_iteration() {
    let world = EntityManager::new();
    spawn_a(&world, 1.0);
    spawn_a(&world, 2.0);

    let query = Query::<(ComponentA,)>::new(&world);
    let inner = query.clone();
    let mut visits = 0;
    query.each(|_: &mut ComponentA| {
        inner.each(|h: Handle| {
            let _ = h;
            visits += 1;
        });
    });
    assert_eq!(visits, 4);
}

#[test]
fn test_verify_archetypes() {
    let world = EntityManager::new();
    spawn_ab(&world, 1.0, "ok");
    let query = Query::<(ComponentA, ComponentB)>::new(&world);
    assert!(query.verify_archetypes());
}
