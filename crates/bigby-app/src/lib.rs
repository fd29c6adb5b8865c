//! Bigby App -- staged frame driver on top of [`bigby_ecs`].
//!
//! This crate provides the host-facing loop: named systems bound to fixed
//! stages (`EarlyUpdate`, `FixedUpdate`, `Update`, `LateUpdate`, `Render`),
//! a clamped frame delta, and an accumulator that turns frame time into
//! fixed simulation steps.
//!
//! # Quick Start
//!
//! ```
//! use bigby_app::prelude::*;
//!
//! struct Spin(f64);
//!
//! let mut world = World::new();
//! let wheel = world.add((Spin(0.0),)).unwrap();
//!
//! let mut app = App::new(world, TickConfig::default()).unwrap();
//! app.add_system(Stage::Update, "spin", move |world, dt| {
//!     world.get_mut::<Spin>(wheel)?.0 += dt;
//!     Ok(())
//! })
//! .unwrap();
//!
//! app.run_ticks(4, 0.125);
//! assert_eq!(app.world().get::<Spin>(wheel).unwrap().0, 0.5);
//! ```

#![deny(unsafe_code)]

pub mod tick;

/// Re-export the ECS crate for convenience.
pub use bigby_ecs;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors produced while configuring the driver.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("invalid tick configuration: {reason}")]
    InvalidConfig { reason: String },

    #[error("a system named '{name}' is already registered")]
    DuplicateSystem { name: String },

    #[error("failed to parse tick configuration: {0}")]
    Config(#[from] serde_json::Error),
}

// ---------------------------------------------------------------------------
// Logging
// ---------------------------------------------------------------------------

/// Install a `fmt` subscriber filtered by `RUST_LOG`, defaulting to `warn`.
///
/// Does nothing if a global subscriber is already set.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .try_init();
}

// ---------------------------------------------------------------------------
// Prelude
// ---------------------------------------------------------------------------

/// Convenience re-exports for common driver usage.
pub mod prelude {
    // Re-export everything from the ECS prelude.
    pub use bigby_ecs::prelude::*;

    pub use crate::tick::{App, Stage, SystemFn, TickConfig, TickDiagnostics};
    pub use crate::{init_tracing, AppError};
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_tracing_is_idempotent() {
        init_tracing();
        init_tracing();
    }

    #[test]
    fn errors_render_readably() {
        let err = AppError::DuplicateSystem {
            name: "physics".to_owned(),
        };
        assert_eq!(err.to_string(), "a system named 'physics' is already registered");
    }
}
