//! Property tests for live queries.
//!
//! These tests use `proptest` to generate random sequences of store and query
//! operations, replay them against a plain model of which entity holds which
//! component, and check after every step that each live query's membership
//! and event history agree with the model.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use bigby_ecs::prelude::*;
use proptest::prelude::*;

#[derive(Debug, Clone, PartialEq)]
struct Pos(u32);

#[derive(Debug, Clone, PartialEq)]
struct Vel(u32);

#[derive(Debug, Clone, PartialEq)]
struct Tag(u32);

const TYPES: usize = 3;

/// Operations we can perform on the world.
#[derive(Debug, Clone)]
enum QueryOp {
    Add(u8),
    Remove(usize),
    Attach(usize, usize),
    Detach(usize, usize),
    CreateQuery(u8),
    Derive(usize, usize),
    Dispose(usize),
}

fn query_op_strategy() -> impl Strategy<Value = QueryOp> {
    prop_oneof![
        3 => (0..8u8).prop_map(QueryOp::Add),
        1 => (0..100usize).prop_map(QueryOp::Remove),
        3 => (0..100usize, 0..TYPES).prop_map(|(i, t)| QueryOp::Attach(i, t)),
        3 => (0..100usize, 0..TYPES).prop_map(|(i, t)| QueryOp::Detach(i, t)),
        1 => (0..8u8).prop_map(QueryOp::CreateQuery),
        1 => (0..100usize, 0..TYPES).prop_map(|(i, t)| QueryOp::Derive(i, t)),
        1 => (0..100usize).prop_map(QueryOp::Dispose),
    ]
}

/// Per-query net event count: `Added` minus `Removed`, plus the seeded size.
type EventTally = Rc<RefCell<HashMap<Query, i64>>>;

struct Tracked {
    query: Query,
    mask: u8,
    active: bool,
}

fn component_ids(world: &mut World) -> [ComponentTypeId; TYPES] {
    [
        world.component_id::<Pos>(),
        world.component_id::<Vel>(),
        world.component_id::<Tag>(),
    ]
}

fn bundle_for(mask: u8, value: u32) -> ComponentBundle {
    let mut bundle = ComponentBundle::new();
    if mask & 1 != 0 {
        bundle.add(Pos(value));
    }
    if mask & 2 != 0 {
        bundle.add(Vel(value));
    }
    if mask & 4 != 0 {
        bundle.add(Tag(value));
    }
    bundle
}

fn attach_type(world: &mut World, entity: EntityId, t: usize) -> Result<(), EcsError> {
    match t {
        0 => world.attach(entity, Pos(0)),
        1 => world.attach(entity, Vel(0)),
        _ => world.attach(entity, Tag(0)),
    }
}

fn track(world: &mut World, tally: &EventTally, query: Query, mask: u8) -> Tracked {
    let seeded = query.len(world).unwrap() as i64;
    tally.borrow_mut().insert(query, seeded);

    let added = Rc::clone(tally);
    query
        .on_added(world, move |_, _| *added.borrow_mut().entry(query).or_default() += 1)
        .unwrap();
    let removed = Rc::clone(tally);
    query
        .on_removed(world, move |_, _| *removed.borrow_mut().entry(query).or_default() -= 1)
        .unwrap();

    Tracked {
        query,
        mask,
        active: true,
    }
}

fn query_for_mask(world: &mut World, ids: &[ComponentTypeId; TYPES], mask: u8) -> Query {
    world.create_query((0..TYPES).filter(|&b| mask & (1 << b) != 0).map(|b| ids[b]))
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(2_000))]

    #[test]
    fn random_ops_keep_queries_consistent(ops in prop::collection::vec(query_op_strategy(), 1..60)) {
        let mut world = World::new();
        let ids = component_ids(&mut world);
        let tally: EventTally = Rc::default();

        // Model: each live entity with a bitmask of the types it holds.
        let mut alive: Vec<(EntityId, u8)> = Vec::new();
        let mut queries: Vec<Tracked> = Vec::new();

        for (step, op) in ops.into_iter().enumerate() {
            match op {
                QueryOp::Add(mask) => {
                    let e = world.add(bundle_for(mask, step as u32)).unwrap();
                    alive.push((e, mask));
                }
                QueryOp::Remove(idx) => {
                    if !alive.is_empty() {
                        let (e, _) = alive.remove(idx % alive.len());
                        world.remove(e).unwrap();
                        prop_assert!(world.remove(e).is_err());
                    }
                }
                QueryOp::Attach(idx, t) => {
                    if !alive.is_empty() {
                        let slot = idx % alive.len();
                        let (e, mask) = alive[slot];
                        let result = attach_type(&mut world, e, t);
                        if mask & (1 << t) != 0 {
                            let already_present = matches!(result, Err(EcsError::ComponentAlreadyPresent { .. }));
                            prop_assert!(already_present);
                        } else {
                            prop_assert!(result.is_ok());
                            alive[slot].1 |= 1 << t;
                        }
                    }
                }
                QueryOp::Detach(idx, t) => {
                    if !alive.is_empty() {
                        let slot = idx % alive.len();
                        let (e, mask) = alive[slot];
                        let result = world.detach_id(e, ids[t]);
                        if mask & (1 << t) != 0 {
                            prop_assert!(result.is_ok());
                            alive[slot].1 &= !(1 << t);
                        } else {
                            let not_present = matches!(result, Err(EcsError::ComponentNotPresent { .. }));
                            prop_assert!(not_present);
                        }
                    }
                }
                QueryOp::CreateQuery(mask) => {
                    let q = query_for_mask(&mut world, &ids, mask);
                    queries.push(track(&mut world, &tally, q, mask));
                }
                QueryOp::Derive(idx, t) => {
                    if !queries.is_empty() {
                        let parent = &queries[idx % queries.len()];
                        let (parent_query, parent_mask, parent_active) =
                            (parent.query, parent.mask, parent.active);
                        let derived = parent_query.with_id(&mut world, ids[t]);
                        if parent_active {
                            let q = derived.unwrap();
                            queries.push(track(&mut world, &tally, q, parent_mask | (1 << t)));
                        } else {
                            let disposed = matches!(derived, Err(EcsError::QueryAlreadyDisposed { .. }));
                            prop_assert!(disposed);
                        }
                    }
                }
                QueryOp::Dispose(idx) => {
                    if !queries.is_empty() {
                        let slot = idx % queries.len();
                        let result = queries[slot].query.dispose(&mut world);
                        prop_assert_eq!(result.is_ok(), queries[slot].active);
                        queries[slot].active = false;
                    }
                }
            }

            // Invariant: entity_count matches our tracking.
            prop_assert_eq!(world.entity_count(), alive.len());

            // Invariant: every live query holds exactly the qualifying entities.
            for tracked in queries.iter().filter(|t| t.active) {
                let mut actual = tracked.query.entities(&world).unwrap().to_vec();
                actual.sort();
                let mut expected: Vec<EntityId> = alive
                    .iter()
                    .filter(|(_, mask)| mask & tracked.mask == tracked.mask)
                    .map(|(e, _)| *e)
                    .collect();
                expected.sort();
                prop_assert_eq!(actual, expected);

                // Invariant: one event per membership flip, no more.
                let net = tally.borrow().get(&tracked.query).copied().unwrap_or(0);
                prop_assert_eq!(net, tracked.query.len(&world).unwrap() as i64);
            }

            prop_assert_eq!(world.query_count(), queries.iter().filter(|t| t.active).count());
        }
    }

    /// Verify that generational IDs catch stale references immediately.
    ///
    /// After removing an entity, any access using the old EntityId must
    /// return an error, even once its slot has been reused.
    #[test]
    fn stale_ids_detected_after_remove_and_recycle(
        spawn_count in 1..20usize,
        remove_indices in prop::collection::vec(0..20usize, 1..10),
    ) {
        let mut world = World::new();
        let everything = world.create_query([]);

        let mut entities: Vec<EntityId> = Vec::new();
        for i in 0..spawn_count {
            entities.push(world.add((Pos(i as u32),)).unwrap());
        }

        let mut stale_ids: Vec<EntityId> = Vec::new();
        for &idx in &remove_indices {
            if !entities.is_empty() {
                let e = entities.remove(idx % entities.len());
                world.remove(e).unwrap();
                stale_ids.push(e);
            }
        }

        for _ in 0..stale_ids.len() {
            entities.push(world.add((Pos(999),)).unwrap());
        }

        for &stale in &stale_ids {
            prop_assert!(!world.is_alive(stale));
            let unknown = matches!(world.get::<Pos>(stale), Err(EcsError::UnknownEntity { .. }));
            prop_assert!(unknown);
            prop_assert!(!everything.contains(&world, stale).unwrap());
        }

        for &e in &entities {
            prop_assert!(world.is_alive(e));
            prop_assert!(world.get::<Pos>(e).is_ok());
        }
        prop_assert_eq!(everything.len(&world).unwrap(), entities.len());
    }

    /// Removing members while iterating never revisits or skips a survivor.
    #[test]
    fn iterate_visits_each_surviving_member_once(
        count in 1..60usize,
        doomed in prop::collection::vec(proptest::bool::ANY, 60),
    ) {
        let mut world = World::new();
        let q = world.query::<(Pos,)>();
        let entities: Vec<EntityId> = (0..count)
            .map(|i| world.add((Pos(i as u32),)).unwrap())
            .collect();

        let mut visited = Vec::new();
        q.iterate(&mut world, |world, e| {
            visited.push(e);
            let i = world.get::<Pos>(e)?.0 as usize;
            if doomed[i] {
                world.remove(e)?;
            }
            Ok(())
        })
        .unwrap();

        visited.sort();
        prop_assert_eq!(visited, entities);
        let survivors = (0..count).filter(|&i| !doomed[i]).count();
        prop_assert_eq!(q.len(&world).unwrap(), survivors);
    }
}
