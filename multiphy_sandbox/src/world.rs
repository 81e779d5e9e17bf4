// The sandbox world: carts and loose debris on a generated heightfield.
//
// A small deterministic rigid-body model, enough to make mispredictions
// visible and rollbacks meaningful:
// - Terrain is a piecewise-linear heightfield generated once from the config
//   seed. Walls bound the map at x = 0 and x = width.
// - Each cart is a point body with a wheel motor (horizontal velocity target,
//   effective only while grounded) and a rocket (vertical acceleration).
// - Debris are point bodies with ground friction. A cart that overlaps a
//   piece of debris shoves it along, transferring part of its velocity.
// - Everything falls under gravity and rests on the terrain surface.
//
// The world splits into an immutable part (`Fixed`: config + terrain),
// shared between copies through an `Arc`, and the mutable `Dynamics`, which
// is what a snapshot actually serializes (bincode). The checksum hashes the
// same bytes, so two peers agree on a checksum exactly when their dynamic
// state is bit-identical.
//
// Controls never reach this file directly. `stepper.rs` writes each cart's
// `wheel_target` and `rocket`; `advance()` only integrates.
//
// **Critical constraint: determinism.** Bodies are processed in index order,
// no hash maps, no clocks, no thread-dependent ordering.

use std::hash::Hasher;
use std::sync::Arc;

use multiphy_rollback::{RollbackError, SimWorld};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rustc_hash::FxHasher;
use serde::{Deserialize, Serialize};

use crate::config::{ConfigError, SandboxConfig, TerrainParams};

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Vec2 {
    pub x: f64,
    pub y: f64,
}

impl Vec2 {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// A point body.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Body {
    pub pos: Vec2,
    pub vel: Vec2,
    /// Resting on the terrain after the last integration.
    pub grounded: bool,
}

/// A player vehicle. `wheel_target` and `rocket` are written by the stepper.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Cart {
    pub body: Body,
    /// Horizontal velocity the wheels drive toward.
    pub wheel_target: f64,
    /// Rocket power in [-1, 1].
    pub rocket: f64,
}

/// Piecewise-linear heightfield.
#[derive(Clone, Debug, PartialEq)]
pub struct Terrain {
    heights: Vec<f64>,
    width: f64,
}

impl Terrain {
    /// Random samples smoothed by a single-pole IIR filter whose smoothing
    /// decays across the map.
    fn generate(params: &TerrainParams, rng: &mut ChaCha8Rng) -> Self {
        let n = params.samples;
        let mut heights: Vec<f64> = (0..n).map(|_| rng.r#gen::<f64>()).collect();

        let decay = 0.8 / n as f64;
        let mut alpha = params.smoothing;
        let mut t = heights[0];
        for h in &mut heights {
            alpha = (alpha - decay).max(0.0);
            t = t * alpha + *h * (1.0 - alpha);
            *h = t * params.amplitude;
        }

        Self {
            heights,
            width: params.width,
        }
    }

    pub fn width(&self) -> f64 {
        self.width
    }

    pub fn heights(&self) -> &[f64] {
        &self.heights
    }

    /// Surface height at `x`, clamped to the map.
    pub fn height_at(&self, x: f64) -> f64 {
        let last = self.heights.len() - 1;
        let spacing = self.width / last as f64;
        let u = (x / spacing).clamp(0.0, last as f64);
        let i = (u.floor() as usize).min(last - 1);
        let frac = u - i as f64;
        self.heights[i] * (1.0 - frac) + self.heights[i + 1] * frac
    }
}

/// Immutable world data, shared between a world and its copies.
#[derive(Debug)]
struct Fixed {
    config: SandboxConfig,
    terrain: Terrain,
}

/// Mutable world data. This is what snapshots carry.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
struct Dynamics {
    advances: u64,
    carts: Vec<Cart>,
    debris: Vec<Body>,
}

/// Serialized dynamics plus a handle on the shared immutable part.
#[derive(Clone, Debug)]
pub struct SandboxSnapshot {
    fixed: Arc<Fixed>,
    bytes: Vec<u8>,
}

impl SandboxSnapshot {
    pub fn len_bytes(&self) -> usize {
        self.bytes.len()
    }
}

#[derive(Debug)]
pub struct SandboxWorld {
    fixed: Arc<Fixed>,
    dynamics: Dynamics,
}

impl SandboxWorld {
    /// Build the initial world: terrain, one cart per `cart.spawn_x` entry
    /// resting on the ground, and debris dropped at a fixed height. The
    /// config is validated first; terrain generation relies on it.
    pub fn new(config: SandboxConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let mut rng = ChaCha8Rng::seed_from_u64(config.terrain.seed);
        let terrain = Terrain::generate(&config.terrain, &mut rng);

        let carts = config
            .cart
            .spawn_x
            .iter()
            .map(|&x| Cart {
                body: Body {
                    pos: Vec2::new(x, terrain.height_at(x)),
                    vel: Vec2::default(),
                    grounded: true,
                },
                ..Cart::default()
            })
            .collect();

        let span = terrain.width() - config.debris.min_x;
        let drop_height = config.terrain.amplitude + 2.0;
        let debris = (0..config.debris.count)
            .map(|_| Body {
                pos: Vec2::new(config.debris.min_x + rng.r#gen::<f64>() * span, drop_height),
                vel: Vec2::default(),
                grounded: false,
            })
            .collect();

        Ok(Self {
            fixed: Arc::new(Fixed { config, terrain }),
            dynamics: Dynamics {
                advances: 0,
                carts,
                debris,
            },
        })
    }

    pub fn config(&self) -> &SandboxConfig {
        &self.fixed.config
    }

    pub fn terrain(&self) -> &Terrain {
        &self.fixed.terrain
    }

    pub fn carts(&self) -> &[Cart] {
        &self.dynamics.carts
    }

    pub fn carts_mut(&mut self) -> &mut [Cart] {
        &mut self.dynamics.carts
    }

    pub fn debris(&self) -> &[Body] {
        &self.dynamics.debris
    }

    /// Number of `advance` calls since the world was built.
    pub fn advances(&self) -> u64 {
        self.dynamics.advances
    }

    fn state_bytes(&self) -> bincode::Result<Vec<u8>> {
        bincode::serialize(&self.dynamics)
    }
}

/// Move a body by its velocity, then resolve walls and ground contact.
fn integrate(body: &mut Body, terrain: &Terrain, dt: f64) {
    body.pos.x += body.vel.x * dt;
    body.pos.y += body.vel.y * dt;

    if body.pos.x <= 0.0 || body.pos.x >= terrain.width() {
        body.pos.x = body.pos.x.clamp(0.0, terrain.width());
        body.vel.x = 0.0;
    }

    let ground = terrain.height_at(body.pos.x);
    if body.pos.y <= ground {
        body.pos.y = ground;
        body.vel.y = body.vel.y.max(0.0);
        body.grounded = true;
    } else {
        body.grounded = false;
    }
}

impl SimWorld for SandboxWorld {
    type Snapshot = SandboxSnapshot;

    fn take_snapshot(&self) -> Result<SandboxSnapshot, RollbackError> {
        Ok(SandboxSnapshot {
            fixed: Arc::clone(&self.fixed),
            bytes: self.state_bytes().map_err(RollbackError::snapshot)?,
        })
    }

    fn restore_snapshot(snapshot: &SandboxSnapshot) -> Result<Self, RollbackError> {
        let dynamics = bincode::deserialize(&snapshot.bytes).map_err(RollbackError::snapshot)?;
        Ok(Self {
            fixed: Arc::clone(&snapshot.fixed),
            dynamics,
        })
    }

    fn advance(&mut self) {
        let config = &self.fixed.config;
        let terrain = &self.fixed.terrain;
        let dt = config.dt;
        let damping = (1.0 - config.damping * dt).max(0.0);
        let traction = config.cart.traction.clamp(0.0, 1.0);
        let friction = (1.0 - config.debris.ground_friction * dt).max(0.0);

        for cart in &mut self.dynamics.carts {
            let body = &mut cart.body;
            if body.grounded {
                body.vel.x += (cart.wheel_target - body.vel.x) * traction;
            }
            body.vel.y += (cart.rocket * config.cart.rocket_accel - config.gravity) * dt;
            body.vel.x *= damping;
            body.vel.y *= damping;
            integrate(body, terrain, dt);
        }

        for body in &mut self.dynamics.debris {
            if body.grounded {
                body.vel.x *= friction;
            }
            body.vel.y -= config.gravity * dt;
            body.vel.x *= damping;
            body.vel.y *= damping;
            integrate(body, terrain, dt);
        }

        // Cart-debris contacts, resolved in index order.
        let reach = config.cart.radius + config.debris.radius;
        for cart in &self.dynamics.carts {
            let c = cart.body;
            for d in &mut self.dynamics.debris {
                let dx = d.pos.x - c.pos.x;
                let dy = d.pos.y - c.pos.y;
                if dx.abs() >= reach || dy.abs() >= reach {
                    continue;
                }
                let side = if dx != 0.0 { dx.signum() } else { c.vel.x.signum() };
                d.pos.x = (c.pos.x + side * reach).clamp(0.0, terrain.width());
                d.vel.x += (c.vel.x - d.vel.x) * config.debris.push;
            }
        }

        self.dynamics.advances += 1;
    }

    fn release(&mut self) {
        tracing::trace!(advances = self.dynamics.advances, "releasing sandbox world");
    }

    fn checksum(&self) -> Option<u64> {
        let bytes = self.state_bytes().ok()?;
        let mut hasher = FxHasher::default();
        hasher.write(&bytes);
        Some(hasher.finish())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DebrisParams;

    fn quiet_config() -> SandboxConfig {
        SandboxConfig {
            debris: DebrisParams {
                count: 0,
                ..DebrisParams::default()
            },
            ..SandboxConfig::default()
        }
    }

    fn run(world: &mut SandboxWorld, ticks: usize) {
        for _ in 0..ticks {
            world.advance();
        }
    }

    #[test]
    fn terrain_stays_within_amplitude() {
        let world = SandboxWorld::new(SandboxConfig::default()).unwrap();
        let amplitude = world.config().terrain.amplitude;
        assert_eq!(world.terrain().heights().len(), 150);
        assert!(world
            .terrain()
            .heights()
            .iter()
            .all(|&h| (0.0..=amplitude).contains(&h)));
    }

    #[test]
    fn height_at_interpolates_and_clamps() {
        let world = SandboxWorld::new(SandboxConfig::default()).unwrap();
        let t = world.terrain();
        let spacing = t.width() / (t.heights().len() - 1) as f64;

        assert_eq!(t.height_at(0.0), t.heights()[0]);
        assert_eq!(t.height_at(-5.0), t.heights()[0]);
        assert_eq!(t.height_at(t.width() + 5.0), *t.heights().last().unwrap());

        let mid = t.height_at(spacing * 2.5);
        let expected = (t.heights()[2] + t.heights()[3]) / 2.0;
        assert!((mid - expected).abs() < 1e-12);
    }

    #[test]
    fn unbuildable_terrain_is_rejected() {
        let mut config = SandboxConfig::default();
        config.terrain.samples = 1;
        let err = SandboxWorld::new(config).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));

        let mut config = SandboxConfig::default();
        config.cart.spawn_x = vec![config.terrain.width + 1.0];
        assert!(SandboxWorld::new(config).is_err());
    }

    #[test]
    fn carts_spawn_on_the_ground() {
        let world = SandboxWorld::new(quiet_config()).unwrap();
        assert_eq!(world.carts().len(), 2);
        for cart in world.carts() {
            assert_eq!(cart.body.pos.y, world.terrain().height_at(cart.body.pos.x));
            assert!(cart.body.grounded);
        }
    }

    #[test]
    fn idle_cart_stays_put() {
        let mut world = SandboxWorld::new(quiet_config()).unwrap();
        let start = world.carts()[0].body;
        run(&mut world, 60);
        let end = world.carts()[0].body;
        assert_eq!(end.pos.x, start.pos.x);
        assert_eq!(end.pos.y, start.pos.y);
    }

    #[test]
    fn throttle_drives_cart_right() {
        let mut world = SandboxWorld::new(quiet_config()).unwrap();
        world.carts_mut()[0].wheel_target = 10.0;
        run(&mut world, 120);
        assert!(world.carts()[0].body.pos.x > 15.0);
        // The other cart had no throttle.
        assert_eq!(world.carts()[1].body.pos.x, 20.0);
    }

    #[test]
    fn rocket_lifts_cart_off_the_ground() {
        let mut world = SandboxWorld::new(quiet_config()).unwrap();
        let start_y = world.carts()[0].body.pos.y;
        world.carts_mut()[0].rocket = 1.0;
        run(&mut world, 30);
        let body = world.carts()[0].body;
        assert!(body.pos.y > start_y + 1.0);
        assert!(!body.grounded);
    }

    #[test]
    fn wall_stops_cart() {
        let mut world = SandboxWorld::new(quiet_config()).unwrap();
        world.carts_mut()[0].wheel_target = -10.0;
        run(&mut world, 600);
        let body = world.carts()[0].body;
        assert_eq!(body.pos.x, 0.0);
        assert_eq!(body.vel.x, 0.0);
    }

    #[test]
    fn cart_shoves_debris() {
        let mut config = SandboxConfig::default();
        config.terrain.width = 15.0;
        config.terrain.amplitude = 0.0;
        config.cart.spawn_x = vec![10.0];
        config.debris.count = 1;
        config.debris.min_x = 14.0;
        let mut world = SandboxWorld::new(config).unwrap();

        // Let the debris settle before driving into it.
        run(&mut world, 120);
        let settled_x = world.debris()[0].pos.x;
        assert!(world.debris()[0].grounded);

        world.carts_mut()[0].wheel_target = 10.0;
        run(&mut world, 120);
        assert!(world.debris()[0].pos.x > settled_x);
    }

    #[test]
    fn identical_worlds_stay_identical() {
        let mut a = SandboxWorld::new(SandboxConfig::default()).unwrap();
        let mut b = SandboxWorld::new(SandboxConfig::default()).unwrap();
        for i in 0..200 {
            let target = if i % 50 < 25 { 10.0 } else { -4.0 };
            a.carts_mut()[1].wheel_target = target;
            b.carts_mut()[1].wheel_target = target;
            a.advance();
            b.advance();
            assert_eq!(a.checksum(), b.checksum());
        }
        assert_eq!(a.advances(), 200);
    }

    #[test]
    fn seed_changes_the_world() {
        let a = SandboxWorld::new(SandboxConfig::default()).unwrap();
        let mut config = SandboxConfig::default();
        config.terrain.seed ^= 1;
        let b = SandboxWorld::new(config).unwrap();
        assert_ne!(a.checksum(), b.checksum());
        assert_ne!(a.terrain(), b.terrain());
    }

    #[test]
    fn snapshot_restores_an_independent_copy() {
        let mut world = SandboxWorld::new(SandboxConfig::default()).unwrap();
        world.carts_mut()[0].wheel_target = 10.0;
        run(&mut world, 90);

        let snapshot = world.take_snapshot().unwrap();
        assert!(snapshot.len_bytes() > 0);
        let mut copy = SandboxWorld::restore_snapshot(&snapshot).unwrap();
        assert_eq!(copy.checksum(), world.checksum());
        assert!(Arc::ptr_eq(&copy.fixed, &world.fixed));

        // Same inputs keep them in lockstep; diverging inputs split them.
        run(&mut world, 10);
        run(&mut copy, 10);
        assert_eq!(copy.checksum(), world.checksum());

        copy.carts_mut()[0].rocket = 1.0;
        run(&mut copy, 1);
        run(&mut world, 1);
        assert_ne!(copy.checksum(), world.checksum());
    }

    #[test]
    fn corrupt_snapshot_is_an_error() {
        let world = SandboxWorld::new(quiet_config()).unwrap();
        let mut snapshot = world.take_snapshot().unwrap();
        snapshot.bytes.truncate(3);
        let err = SandboxWorld::restore_snapshot(&snapshot).unwrap_err();
        assert!(matches!(err, RollbackError::Snapshot(_)));
    }
}
