// multiphy_sandbox — a deterministic physics sandbox for the rollback core.
//
// Two carts (one per peer) drive over generated terrain, pushing loose
// debris around. The crate exists to give `multiphy_rollback` a real world
// to reconcile: it implements `SimWorld` for `SandboxWorld` and `Stepper`
// for `CartStepper`, and bundles a seeded input script for headless runs.
//
// Module overview:
// - `config.rs`:   `SandboxConfig` — all physics constants, JSON-loadable,
//                  hashed for the peer handshake.
// - `world.rs`:    `SandboxWorld` — terrain, carts, debris, integration,
//                  bincode snapshots and checksums.
// - `stepper.rs`:  `CartStepper` — reads `p{slot}.speed` / `p{slot}.rocket`.
// - `script.rs`:   `ScriptedInput` — reproducible stand-in for a keyboard.

pub mod config;
pub mod script;
pub mod stepper;
pub mod world;

use multiphy_rollback::{RollbackCoordinator, WorldHandle};

pub use config::{CartParams, ConfigError, DebrisParams, SandboxConfig, TerrainParams};
pub use script::ScriptedInput;
pub use stepper::{CartStepper, control_key};
pub use world::{Body, Cart, SandboxSnapshot, SandboxWorld, Terrain, Vec2};

pub type SandboxHandle = WorldHandle<SandboxWorld, CartStepper>;
pub type SandboxCoordinator = RollbackCoordinator<SandboxWorld, CartStepper>;

/// A fresh world at frame 0 with a stepper sized to its carts.
pub fn sandbox_handle(config: SandboxConfig) -> Result<SandboxHandle, ConfigError> {
    let world = SandboxWorld::new(config)?;
    let stepper = CartStepper::for_world(&world);
    Ok(WorldHandle::new(world, stepper))
}
