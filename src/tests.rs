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

//! Cross-module integration tests.

use crate::{EntityManager, Handle, Phase, Query};

#[derive(Clone, Debug, PartialEq)]
struct Speed {
    value: f64,
}

#[derive(Clone, Debug, PartialEq)]
struct Tag {
    text: String,
}

#[test]
fn test_deferred_add_applies_at_phase_end() {
    let world = EntityManager::new();
    let handle = world.add_entity();
    let query = Query::<(Speed,)>::new(&world);
    {
        let phase = Phase::new();
        world
            .entity(handle, &phase)
            .unwrap()
            .add(Speed { value: 5.8 });
        // Still deferred.
        assert_eq!(query.count_matches(), 0);
        assert!(!world.has_component::<Speed>(handle));
    }
    assert_eq!(query.count_matches(), 1);
    assert_eq!(world.component::<Speed>(handle).unwrap().value, 5.8);
}

#[test]
fn test_phase_ops_replay_in_order() {
    let world = EntityManager::new();
    let handle = world.add_entity();
    {
        let phase = Phase::new();
        let entity = world.entity(handle, &phase).unwrap();
        entity.add(Speed { value: 1.0 });
        entity.remove::<Speed>();
        entity.add(Speed { value: 2.0 });
    }
    assert_eq!(world.component::<Speed>(handle).unwrap().value, 2.0);
}

#[test]
fn test_deferred_erase() {
    let world = EntityManager::new();
    let handle = world.add_entity();
    {
        let phase = Phase::new();
        world.entity(handle, &phase).unwrap().erase();
        assert!(world.is_valid(handle));
    }
    assert!(!world.is_valid(handle));
    assert_eq!(world.count_live_entities(), 0);
}

#[test]
fn test_iteration_with_deferred_mutation() {
    let world = EntityManager::new();
    for value in [1.0, 2.0, 3.0] {
        let handle = world.add_entity();
        let phase = Phase::new();
        world.entity(handle, &phase).unwrap().add(Speed { value });
    }
    let query = Query::<(Speed,)>::new(&world);
    {
        let phase = Phase::new();
        query.each(|handle: Handle, speed: &mut Speed| {
            if speed.value > 2.5 {
                world.entity(handle, &phase).unwrap().erase();
            }
        });
        // Erases are deferred past the iteration.
        assert_eq!(query.count_matches(), 3);
    }
    assert_eq!(query.count_matches(), 2);
    assert_eq!(world.count_live_entities(), 2);
}

#[test]
fn test_entity_views_read_and_write() {
    let world = EntityManager::new();
    let handle = world.add_entity();
    {
        let phase = Phase::new();
        world.entity(handle, &phase).unwrap().add(Tag {
            text: "before".to_owned(),
        });
    }
    let view = world.view(handle).unwrap();
    assert!(view.has::<Tag>());
    view.get_mut::<Tag>().unwrap().text = "after".to_owned();
    assert_eq!(view.get::<Tag>().unwrap().text, "after");
    assert!(!view.has::<Speed>());
}

#[test]
fn test_for_each_handle_enumerates_live_entities() {
    let world = EntityManager::new();
    let first = world.add_entity();
    let second = world.add_entity();
    world.apply_erase(first);

    let mut seen = Vec::new();
    world.for_each_handle(|handle| seen.push(handle));
    assert_eq!(seen, vec![second]);
}

#[test]
fn test_queries_share_one_backend_per_sequence() {
    let world = EntityManager::new();
    let handle = world.add_entity();
    let first = Query::<(Speed,)>::new(&world);
    let second = Query::<(Speed,)>::new(&world);
    {
        let phase = Phase::new();
        world
            .entity(handle, &phase)
            .unwrap()
            .add(Speed { value: 9.0 });
    }
    assert_eq!(first.count_matches(), 1);
    assert_eq!(second.count_matches(), 1);
    assert!(first.verify_archetypes());
}
