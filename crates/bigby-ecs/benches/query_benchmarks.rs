//! Live query maintenance benchmarks.
//!
//! Measures the cost the store pays to keep queries current: attach/detach
//! churn with many unrelated queries registered, entity add/remove with
//! listeners attached, and a full `for_each` pass over a populated query.
//!
//! Entity choice is driven by a fixed-seed PCG so runs are comparable.
//!
//! Run with: `cargo bench --bench query_benchmarks`

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use rand::Rng;
use rand::SeedableRng;
use rand_pcg::Pcg64;

use bigby_ecs::prelude::*;

// ---------------------------------------------------------------------------
// Benchmark component types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
struct Position {
    x: f64,
    y: f64,
}

#[derive(Debug, Clone, PartialEq)]
struct Velocity {
    dx: f64,
    dy: f64,
}

#[derive(Debug, Clone, PartialEq)]
struct Health(u32);

/// Marker types used to register queries that a mutation must *not* touch.
struct Unrelated<const N: usize>;

const SEED: u64 = 0x5eed_b16b;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn populate(world: &mut World, entity_count: usize) -> Vec<EntityId> {
    (0..entity_count)
        .map(|i| {
            world
                .add((
                    Position { x: i as f64, y: 0.0 },
                    Velocity { dx: 1.0, dy: 0.5 },
                ))
                .unwrap()
        })
        .collect()
}

fn register_unrelated_queries(world: &mut World) {
    world.query::<(Unrelated<0>,)>();
    world.query::<(Unrelated<1>, Position)>();
    world.query::<(Unrelated<2>, Velocity)>();
    world.query::<(Unrelated<3>,)>();
    world.query::<(Unrelated<4>, Unrelated<5>)>();
}

// ---------------------------------------------------------------------------
// Benchmark 1: attach/detach churn on one component type
// ---------------------------------------------------------------------------

fn bench_attach_detach(c: &mut Criterion) {
    let mut group = c.benchmark_group("attach_detach_health");
    for entity_count in [1_000usize, 10_000] {
        let mut world = World::new();
        let entities = populate(&mut world, entity_count);
        register_unrelated_queries(&mut world);
        let living = world.query::<(Position, Health)>();
        living.on_added(&mut world, |_, e| {
            black_box(e);
        })
        .unwrap();

        let mut rng = Pcg64::seed_from_u64(SEED);
        group.bench_with_input(
            BenchmarkId::from_parameter(entity_count),
            &entity_count,
            |b, _| {
                b.iter(|| {
                    let e = entities[rng.gen_range(0..entities.len())];
                    world.attach(e, Health(100)).unwrap();
                    world.detach::<Health>(e).unwrap();
                });
            },
        );
    }
    group.finish();
}

// ---------------------------------------------------------------------------
// Benchmark 2: add and remove whole entities
// ---------------------------------------------------------------------------

fn bench_add_remove(c: &mut Criterion) {
    let mut world = World::new();
    populate(&mut world, 10_000);
    register_unrelated_queries(&mut world);
    let moving = world.query::<(Position, Velocity)>();
    let _healthy = moving.with::<Health>(&mut world).unwrap();
    moving
        .on_removed(&mut world, |_, e| {
            black_box(e);
        })
        .unwrap();

    c.bench_function("add_remove_10k_live", |b| {
        b.iter(|| {
            let e = world
                .add((
                    Position { x: 0.0, y: 0.0 },
                    Velocity { dx: 0.0, dy: 0.0 },
                    Health(1),
                ))
                .unwrap();
            world.remove(black_box(e)).unwrap();
        });
    });
}

// ---------------------------------------------------------------------------
// Benchmark 3: query creation over a populated store
// ---------------------------------------------------------------------------

fn bench_query_seeding(c: &mut Criterion) {
    let mut world = World::new();
    let entities = populate(&mut world, 10_000);
    let mut rng = Pcg64::seed_from_u64(SEED);
    for &e in &entities {
        if rng.gen_bool(0.05) {
            world.attach(e, Health(1)).unwrap();
        }
    }

    c.bench_function("seed_query_rare_column_10k", |b| {
        b.iter(|| {
            let q = world.query::<(Position, Velocity, Health)>();
            black_box(q.len(&world).unwrap());
            q.dispose(&mut world).unwrap();
        });
    });
}

// ---------------------------------------------------------------------------
// Benchmark 4: typed mutable pass over every member
// ---------------------------------------------------------------------------

fn bench_for_each(c: &mut Criterion) {
    let mut world = World::new();
    populate(&mut world, 10_000);
    let moving = world.query::<(Position, Velocity)>();

    c.bench_function("for_each_position_velocity_10k", |b| {
        b.iter(|| {
            moving
                .for_each::<(Position, Velocity)>(&mut world, |_, (pos, vel)| {
                    pos.x += vel.dx;
                    pos.y += vel.dy;
                })
                .unwrap();
        });
    });
}

criterion_group!(
    benches,
    bench_attach_detach,
    bench_add_remove,
    bench_query_seeding,
    bench_for_each
);
criterion_main!(benches);
