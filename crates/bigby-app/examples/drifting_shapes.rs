//! Headless demo: shapes that drift at constant velocity, spin, and despawn
//! once they leave the play area.
//!
//! Physics bodies are created by an `on_added` listener the moment an entity
//! becomes simulated, and released by the matching `on_removed` listener, so
//! no system has to scan for new or dead entities.
//!
//! Run with: `RUST_LOG=debug cargo run -p bigby-app --example drifting_shapes`

use std::cell::RefCell;
use std::rc::Rc;

use bigby_app::prelude::*;
use rand::Rng;
use rand::SeedableRng;
use rand_pcg::Pcg64;
use tracing::info;

// ---------------------------------------------------------------------------
// Components
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
struct Transform {
    x: f64,
    y: f64,
    angle: f64,
}

#[derive(Debug, Clone, PartialEq)]
struct ConstantVelocity {
    dx: f64,
    dy: f64,
}

/// Radians per second.
#[derive(Debug, Clone, PartialEq)]
struct AutoRotate(f64);

/// Marks an entity as simulated.
#[derive(Debug, Clone, PartialEq)]
struct RigidBody;

/// Slot in the body table, attached by the listener.
#[derive(Debug, Clone, Copy, PartialEq)]
struct BodyHandle(usize);

const HALF_EXTENT: f64 = 10.0;
const SHAPES: usize = 64;

/// Minimal body table standing in for a physics backend.
#[derive(Debug, Default)]
struct Bodies {
    slots: Vec<Option<EntityId>>,
    created: usize,
    released: usize,
}

// ---------------------------------------------------------------------------
// Scene setup
// ---------------------------------------------------------------------------

fn spawn_shapes(world: &mut World, rng: &mut Pcg64) -> Result<(), EcsError> {
    for i in 0..SHAPES {
        let transform = Transform {
            x: rng.gen_range(-HALF_EXTENT..HALF_EXTENT),
            y: rng.gen_range(-HALF_EXTENT..HALF_EXTENT),
            angle: 0.0,
        };
        let velocity = ConstantVelocity {
            dx: rng.gen_range(-4.0..4.0),
            dy: rng.gen_range(-4.0..4.0),
        };
        let mut bundle = ComponentBundle::new().with(transform).with(velocity);
        if i % 2 == 0 {
            bundle.add(AutoRotate(rng.gen_range(-3.0..3.0)));
        }
        if i % 4 != 3 {
            bundle.add(RigidBody);
        }
        world.add(bundle)?;
    }
    Ok(())
}

fn install_body_listeners(world: &mut World, bodies: &Rc<RefCell<Bodies>>) -> Result<(), EcsError> {
    let simulated = world.query::<(Transform, RigidBody)>();

    let table = Rc::clone(bodies);
    simulated.on_added(world, move |world, e| {
        let handle = {
            let mut table = table.borrow_mut();
            table.slots.push(Some(e));
            table.created += 1;
            BodyHandle(table.slots.len() - 1)
        };
        if let Err(err) = world.attach(e, handle) {
            tracing::warn!(entity = %e, error = %err, "could not attach body handle");
        }
    })?;

    let table = Rc::clone(bodies);
    simulated.on_removed(world, move |_, e| {
        // The handle component may already be detached; look the slot up by entity.
        let mut table = table.borrow_mut();
        if let Some(slot) = table.slots.iter().position(|s| *s == Some(e)) {
            table.slots[slot] = None;
            table.released += 1;
        }
    })?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Systems
// ---------------------------------------------------------------------------

fn constant_velocity(moving: Query) -> impl FnMut(&mut World, f64) -> Result<(), EcsError> {
    move |world, dt| {
        moving.for_each::<(Transform, ConstantVelocity)>(world, |_, (t, v)| {
            t.x += v.dx * dt;
            t.y += v.dy * dt;
        })
    }
}

fn auto_rotate(spinning: Query) -> impl FnMut(&mut World, f64) -> Result<(), EcsError> {
    move |world, dt| {
        spinning.for_each::<(Transform, AutoRotate)>(world, |_, (t, spin)| {
            t.angle = (t.angle + spin.0 * dt).rem_euclid(std::f64::consts::TAU);
        })
    }
}

fn despawn_out_of_bounds(placed: Query) -> impl FnMut(&mut World, f64) -> Result<(), EcsError> {
    move |world, _| {
        placed.iterate(world, |world, e| {
            let t = world.get::<Transform>(e)?;
            if t.x.abs() > HALF_EXTENT || t.y.abs() > HALF_EXTENT {
                world.remove(e)?;
            }
            Ok(())
        })
    }
}

fn main() -> Result<(), anyhow::Error> {
    init_tracing();

    let config = TickConfig::from_json(r#"{ "fixed_dt": 0.016666666666666666, "max_dt": 0.2 }"#)?;
    let mut world = World::new();
    world.register_component::<Transform>("transform");
    world.register_component::<ConstantVelocity>("constant_velocity");
    world.register_component::<AutoRotate>("auto_rotate");
    world.register_component::<RigidBody>("rigid_body");
    world.register_component::<BodyHandle>("body_handle");

    let bodies = Rc::new(RefCell::new(Bodies::default()));
    install_body_listeners(&mut world, &bodies)?;

    let mut rng = Pcg64::seed_from_u64(42);
    spawn_shapes(&mut world, &mut rng)?;

    let moving = world.query::<(Transform, ConstantVelocity)>();
    let spinning = world.query::<(Transform, AutoRotate)>();
    let placed = world.query::<(Transform,)>();
    let handled = world.query::<(BodyHandle,)>();

    let mut app = App::new(world, config)?;
    app.add_system(Stage::FixedUpdate, "constant_velocity", constant_velocity(moving))?;
    app.add_system(Stage::Update, "auto_rotate", auto_rotate(spinning))?;
    app.add_system(Stage::LateUpdate, "despawn_out_of_bounds", despawn_out_of_bounds(placed))?;
    app.add_system(Stage::Render, "report", move |world, _| {
        let shapes = placed.len(world)?;
        let bodies = handled.len(world)?;
        info!(shapes, bodies, "frame");
        Ok(())
    })?;

    // Frame times with jitter and one long stall that the clamp absorbs.
    for frame in 0..600 {
        let dt = if frame == 300 { 1.5 } else { rng.gen_range(0.012..0.022) };
        app.tick(dt);
    }

    let world = app.world();
    let table = bodies.borrow();
    println!(
        "ticks: {}  fixed steps: {}  sim time: {:.2}s",
        app.tick_count(),
        app.fixed_steps(),
        app.sim_time()
    );
    println!(
        "shapes left: {}  bodies created: {}  released: {}  live: {}",
        placed.len(world)?,
        table.created,
        table.released,
        table.slots.iter().flatten().count()
    );
    for e in handled.entities(world)?.iter().take(4) {
        let t = world.get::<Transform>(*e)?;
        let BodyHandle(slot) = *world.get::<BodyHandle>(*e)?;
        println!(
            "  {e} body {slot}: ({:+.2}, {:+.2}) angle {:.2}",
            t.x, t.y, t.angle
        );
    }
    Ok(())
}
