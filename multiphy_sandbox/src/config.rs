// Data-driven sandbox configuration.
//
// Every tunable physics constant lives in `SandboxConfig`, loaded from JSON.
// Missing fields fall back to the defaults below, so a config file only
// needs to name what it changes. Both peers must run identical configs; the
// handshake compares `config_hash()` and refuses a mismatch.
//
// Parameters are grouped into sub-structs: `TerrainParams` (heightfield
// generation), `CartParams` (per-player vehicle), `DebrisParams` (loose
// bodies scattered over the terrain).
//
// See also: `world.rs`, which reads every field here, and `stepper.rs` for
// how controls map onto cart parameters.
//
// **Critical constraint: determinism.** Config values feed directly into
// simulation logic. Identical configs are required for identical worlds.

use std::hash::Hasher;
use std::path::Path;

use rustc_hash::FxHasher;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("reading config {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("parsing config: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Heightfield generation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TerrainParams {
    /// Seed for the heightfield and debris placement.
    pub seed: u64,
    /// Number of height samples across the map.
    pub samples: usize,
    /// Map width in world units. Walls sit at x = 0 and x = width.
    pub width: f64,
    /// Peak-to-trough scale of the heightfield.
    pub amplitude: f64,
    /// Initial smoothing factor of the IIR pass, decaying to zero across the
    /// map so terrain gets rougher to the right.
    pub smoothing: f64,
}

impl Default for TerrainParams {
    fn default() -> Self {
        Self {
            seed: 0x2c6d_e981_6fa2_4b0f,
            samples: 150,
            width: 150.0,
            amplitude: 1.0,
            smoothing: 0.5,
        }
    }
}

/// Per-player vehicle.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CartParams {
    /// Wheel speed at full throttle, in units per second.
    pub max_speed: f64,
    /// Fraction of the gap to target wheel speed closed per tick while
    /// grounded.
    pub traction: f64,
    /// Upward acceleration at full rocket power.
    pub rocket_accel: f64,
    /// Collision half-extent used against debris.
    pub radius: f64,
    /// Starting x position for each slot, in slot order.
    pub spawn_x: Vec<f64>,
}

impl Default for CartParams {
    fn default() -> Self {
        Self {
            max_speed: 10.0,
            traction: 0.2,
            rocket_accel: 25.0,
            radius: 1.0,
            spawn_x: vec![10.0, 20.0],
        }
    }
}

/// Loose bodies the carts can shove around.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DebrisParams {
    pub count: usize,
    pub radius: f64,
    /// Debris spawns uniformly in `[min_x, width)`.
    pub min_x: f64,
    /// Horizontal velocity lost per second while resting on the ground.
    pub ground_friction: f64,
    /// Fraction of the relative velocity transferred on cart contact.
    pub push: f64,
}

impl Default for DebrisParams {
    fn default() -> Self {
        Self {
            count: 100,
            radius: 0.2,
            min_x: 30.0,
            ground_friction: 2.0,
            push: 0.5,
        }
    }
}

/// Complete sandbox configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SandboxConfig {
    /// Seconds of simulated time per tick.
    pub dt: f64,
    /// Downward acceleration.
    pub gravity: f64,
    /// Linear velocity damping per second, applied to every body.
    pub damping: f64,
    pub terrain: TerrainParams,
    pub cart: CartParams,
    pub debris: DebrisParams,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            dt: 1.0 / 60.0,
            gravity: 9.81,
            damping: 0.05,
            terrain: TerrainParams::default(),
            cart: CartParams::default(),
            debris: DebrisParams::default(),
        }
    }
}

impl SandboxConfig {
    /// Parse and validate a JSON config. Absent fields take defaults.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: SandboxConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json(&json)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.dt <= 0.0 || !self.dt.is_finite() {
            return Err(ConfigError::Invalid(format!("dt must be positive, got {}", self.dt)));
        }
        if self.terrain.samples < 2 {
            return Err(ConfigError::Invalid(format!(
                "terrain.samples must be at least 2, got {}",
                self.terrain.samples
            )));
        }
        if self.terrain.width <= 0.0 || !self.terrain.width.is_finite() {
            return Err(ConfigError::Invalid(format!(
                "terrain.width must be positive, got {}",
                self.terrain.width
            )));
        }
        if self.debris.count > 0 && !(0.0..self.terrain.width).contains(&self.debris.min_x) {
            return Err(ConfigError::Invalid(format!(
                "debris.min_x {} lies outside the map",
                self.debris.min_x
            )));
        }
        if let Some(x) = self
            .cart
            .spawn_x
            .iter()
            .find(|&&x| !(0.0..=self.terrain.width).contains(&x))
        {
            return Err(ConfigError::Invalid(format!(
                "cart spawn x {x} lies outside the map"
            )));
        }
        Ok(())
    }

    /// Digest of the canonical JSON form, exchanged at handshake.
    pub fn config_hash(&self) -> u64 {
        let mut hasher = FxHasher::default();
        // Plain numeric structs always serialize.
        let json = serde_json::to_string(self).unwrap_or_default();
        hasher.write(json.as_bytes());
        hasher.finish()
    }
}
