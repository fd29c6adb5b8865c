//! Staged frame driver for a reactive [`World`].
//!
//! The [`App`] owns the world and a list of named systems, each bound to a
//! [`Stage`]. Each call to [`App::tick`] with the frame's elapsed time:
//!
//! 1. clamps the delta to `[0, max_dt]`;
//! 2. runs `EarlyUpdate` systems;
//! 3. runs `FixedUpdate` systems once per whole `fixed_dt` in the accumulator;
//! 4. runs `Update`, `LateUpdate` and `Render` systems.
//!
//! Within a stage, systems run in registration order. Wall-clock pacing is
//! left to the host: the driver only orders work and hands out time steps.
//!
//! # Example
//!
//! ```
//! use bigby_app::prelude::*;
//!
//! let config = TickConfig { fixed_dt: 1.0 / 16.0, ..Default::default() };
//! let mut app = App::new(World::new(), config).unwrap();
//! app.add_system(Stage::FixedUpdate, "physics", |_world, _dt| {
//!     // physics logic here
//!     Ok(())
//! })
//! .unwrap();
//!
//! // A 125 ms frame at 16 Hz yields two fixed steps.
//! app.tick(0.125);
//! assert_eq!(app.tick_count(), 1);
//! assert_eq!(app.fixed_steps(), 2);
//! ```

use std::fmt;
use std::time::{Duration, Instant};

use bigby_ecs::world::World;
use bigby_ecs::EcsError;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::AppError;

// ---------------------------------------------------------------------------
// Stage
// ---------------------------------------------------------------------------

/// A fixed slot in the per-tick system order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Stage {
    EarlyUpdate,
    FixedUpdate,
    Update,
    LateUpdate,
    Render,
}

impl Stage {
    /// Every stage, in execution order.
    pub const ALL: [Stage; 5] = [
        Stage::EarlyUpdate,
        Stage::FixedUpdate,
        Stage::Update,
        Stage::LateUpdate,
        Stage::Render,
    ];
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::EarlyUpdate => "early_update",
            Stage::FixedUpdate => "fixed_update",
            Stage::Update => "update",
            Stage::LateUpdate => "late_update",
            Stage::Render => "render",
        };
        f.write_str(name)
    }
}

// ---------------------------------------------------------------------------
// TickConfig
// ---------------------------------------------------------------------------

/// Time-step configuration for the driver.
///
/// Missing fields take their default when deserialized.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TickConfig {
    /// Fixed time step in seconds for `FixedUpdate`. Must be positive and finite.
    pub fixed_dt: f64,
    /// Upper bound on one frame's delta, in seconds. Must be positive and finite.
    pub max_dt: f64,
}

impl Default for TickConfig {
    /// 60 Hz fixed step, frame deltas capped at 200 ms.
    fn default() -> Self {
        Self {
            fixed_dt: 1.0 / 60.0,
            max_dt: 0.2,
        }
    }
}

impl TickConfig {
    /// Parse and validate a JSON config.
    pub fn from_json(json: &str) -> Result<Self, AppError> {
        let config: TickConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), AppError> {
        if !(self.fixed_dt > 0.0 && self.fixed_dt.is_finite()) {
            return Err(AppError::InvalidConfig {
                reason: format!("fixed_dt must be positive and finite, got {}", self.fixed_dt),
            });
        }
        if !(self.max_dt > 0.0 && self.max_dt.is_finite()) {
            return Err(AppError::InvalidConfig {
                reason: format!("max_dt must be positive and finite, got {}", self.max_dt),
            });
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// TickDiagnostics
// ---------------------------------------------------------------------------

/// Timing diagnostics for the last tick.
#[derive(Debug, Clone, Default)]
pub struct TickDiagnostics {
    /// Wall-clock time per system run, in execution order. A `FixedUpdate`
    /// system appears once per fixed step.
    pub system_times: Vec<(String, Duration)>,
    /// Total time for the tick.
    pub total_time: Duration,
    /// The clamped frame delta.
    pub dt: f64,
    /// Fixed steps run this tick.
    pub fixed_steps: u32,
    /// Systems that returned an error this tick.
    pub failed_systems: Vec<String>,
}

// ---------------------------------------------------------------------------
// Systems
// ---------------------------------------------------------------------------

/// A system: called with the world and its time step in seconds.
pub type SystemFn = Box<dyn FnMut(&mut World, f64) -> Result<(), EcsError>>;

struct RegisteredSystem {
    name: String,
    stage: Stage,
    func: SystemFn,
}

impl fmt::Debug for RegisteredSystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegisteredSystem")
            .field("name", &self.name)
            .field("stage", &self.stage)
            .finish_non_exhaustive()
    }
}

/// Run every system of `stage` once with time step `dt`.
fn run_stage(
    systems: &mut [RegisteredSystem],
    world: &mut World,
    stage: Stage,
    dt: f64,
    diagnostics: &mut TickDiagnostics,
) {
    for system in systems.iter_mut().filter(|s| s.stage == stage) {
        let start = Instant::now();
        let result = (system.func)(world, dt);
        diagnostics
            .system_times
            .push((system.name.clone(), start.elapsed()));
        if let Err(err) = result {
            warn!(system = %system.name, stage = %stage, error = %err, "system failed");
            diagnostics.failed_systems.push(system.name.clone());
        }
    }
}

// ---------------------------------------------------------------------------
// App
// ---------------------------------------------------------------------------

/// The staged frame driver.
pub struct App {
    world: World,
    systems: Vec<RegisteredSystem>,
    config: TickConfig,
    /// Unconsumed time towards the next fixed step.
    accumulator: f64,
    tick_counter: u64,
    fixed_step_counter: u64,
    last_diagnostics: TickDiagnostics,
}

impl fmt::Debug for App {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("App")
            .field("world", &self.world)
            .field("systems", &self.systems)
            .field("config", &self.config)
            .field("tick_count", &self.tick_counter)
            .finish_non_exhaustive()
    }
}

impl App {
    /// Create a driver around `world`.
    ///
    /// # Errors
    ///
    /// [`AppError::InvalidConfig`] if `config` fails [`TickConfig::validate`].
    pub fn new(world: World, config: TickConfig) -> Result<Self, AppError> {
        config.validate()?;
        Ok(Self {
            world,
            systems: Vec::new(),
            config,
            accumulator: 0.0,
            tick_counter: 0,
            fixed_step_counter: 0,
            last_diagnostics: TickDiagnostics::default(),
        })
    }

    /// Register a system to run in `stage`.
    ///
    /// An error returned by the system is logged and does not stop the tick.
    ///
    /// # Errors
    ///
    /// [`AppError::DuplicateSystem`] if `name` is already registered in any
    /// stage.
    pub fn add_system<F>(&mut self, stage: Stage, name: &str, func: F) -> Result<(), AppError>
    where
        F: FnMut(&mut World, f64) -> Result<(), EcsError> + 'static,
    {
        if self.systems.iter().any(|s| s.name == name) {
            return Err(AppError::DuplicateSystem {
                name: name.to_owned(),
            });
        }
        self.systems.push(RegisteredSystem {
            name: name.to_owned(),
            stage,
            func: Box::new(func),
        });
        Ok(())
    }

    /// Advance one frame by `dt` seconds. Returns the number of fixed steps run.
    ///
    /// `dt` is clamped to `[0, max_dt]`; a NaN delta counts as zero.
    pub fn tick(&mut self, dt: f64) -> u32 {
        let tick_start = Instant::now();
        let dt = if dt.is_nan() {
            0.0
        } else {
            dt.clamp(0.0, self.config.max_dt)
        };
        let mut diagnostics = TickDiagnostics {
            dt,
            ..Default::default()
        };

        run_stage(
            &mut self.systems,
            &mut self.world,
            Stage::EarlyUpdate,
            dt,
            &mut diagnostics,
        );

        self.accumulator += dt;
        while self.accumulator >= self.config.fixed_dt {
            run_stage(
                &mut self.systems,
                &mut self.world,
                Stage::FixedUpdate,
                self.config.fixed_dt,
                &mut diagnostics,
            );
            self.accumulator -= self.config.fixed_dt;
            self.fixed_step_counter += 1;
            diagnostics.fixed_steps += 1;
        }

        for stage in [Stage::Update, Stage::LateUpdate, Stage::Render] {
            run_stage(&mut self.systems, &mut self.world, stage, dt, &mut diagnostics);
        }

        self.tick_counter += 1;
        diagnostics.total_time = tick_start.elapsed();
        debug!(
            tick = self.tick_counter,
            dt,
            fixed_steps = diagnostics.fixed_steps,
            failed = diagnostics.failed_systems.len(),
            entities = self.world.entity_count(),
            "tick complete"
        );

        let steps = diagnostics.fixed_steps;
        self.last_diagnostics = diagnostics;
        steps
    }

    /// Run `count` ticks of `dt` each. Returns the total fixed steps run.
    pub fn run_ticks(&mut self, count: u64, dt: f64) -> u64 {
        (0..count).map(|_| u64::from(self.tick(dt))).sum()
    }

    // -- accessors ----------------------------------------------------------

    /// The number of ticks executed so far.
    pub fn tick_count(&self) -> u64 {
        self.tick_counter
    }

    /// The number of fixed steps executed so far.
    pub fn fixed_steps(&self) -> u64 {
        self.fixed_step_counter
    }

    /// Simulated time in seconds.
    ///
    /// Computed as `fixed_steps * fixed_dt` to avoid drift from repeated
    /// addition.
    pub fn sim_time(&self) -> f64 {
        self.fixed_step_counter as f64 * self.config.fixed_dt
    }

    pub fn config(&self) -> &TickConfig {
        &self.config
    }

    /// Read-only access to the world.
    pub fn world(&self) -> &World {
        &self.world
    }

    /// Mutable access to the world, for setup and tests.
    pub fn world_mut(&mut self) -> &mut World {
        &mut self.world
    }

    /// Consume the driver and return its world.
    pub fn into_world(self) -> World {
        self.world
    }

    /// The names of all registered systems, in stage then registration order.
    pub fn system_names(&self) -> Vec<&str> {
        Stage::ALL
            .iter()
            .flat_map(|&stage| {
                self.systems
                    .iter()
                    .filter(move |s| s.stage == stage)
                    .map(|s| s.name.as_str())
            })
            .collect()
    }

    /// Diagnostics from the last tick.
    pub fn last_diagnostics(&self) -> &TickDiagnostics {
        &self.last_diagnostics
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
