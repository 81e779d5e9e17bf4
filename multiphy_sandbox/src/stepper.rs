// Cart stepper — maps namespaced control values onto carts.
//
// Cart `i` reads `p{i}.speed` (wheel throttle) and `p{i}.rocket` (rocket
// power). Both are clamped to [-1, 1]; anything non-finite counts as 0.
// Throttle is scaled by `cart.max_speed` into a wheel velocity target.
//
// The stepper caches two things between ticks: the formatted key names, so
// no string is built per tick, and the last control pair it wrote to each
// cart, so an unchanged input skips the write. Both travel with `clone()`,
// which is what keeps a cloned handle's stepper consistent with its world.

use multiphy_rollback::{ControlState, Frame, Stepper};

use crate::world::SandboxWorld;

/// Key for `control` on the cart owned by `slot`, e.g. `p1.speed`.
pub fn control_key(slot: usize, control: &str) -> String {
    format!("p{slot}.{control}")
}

#[derive(Clone, Debug)]
struct CartControls {
    speed_key: String,
    rocket_key: String,
    /// Last (speed, rocket) written to the cart.
    applied: (f64, f64),
}

#[derive(Clone, Debug)]
pub struct CartStepper {
    carts: Vec<CartControls>,
    writes: u64,
}

impl CartStepper {
    pub fn new(cart_count: usize) -> Self {
        Self {
            carts: (0..cart_count)
                .map(|slot| CartControls {
                    speed_key: control_key(slot, "speed"),
                    rocket_key: control_key(slot, "rocket"),
                    applied: (0.0, 0.0),
                })
                .collect(),
            writes: 0,
        }
    }

    /// A stepper sized for every cart in `world`.
    pub fn for_world(world: &SandboxWorld) -> Self {
        Self::new(world.carts().len())
    }

    /// Number of ticks on which some cart's controls actually changed.
    pub fn writes(&self) -> u64 {
        self.writes
    }
}

fn sanitize(value: f64) -> f64 {
    if value.is_finite() { value.clamp(-1.0, 1.0) } else { 0.0 }
}

impl Stepper<SandboxWorld> for CartStepper {
    fn step(&mut self, _frame: Frame, world: &mut SandboxWorld, controls: &ControlState) {
        let max_speed = world.config().cart.max_speed;
        let mut wrote = false;
        for (slot, cart) in self.carts.iter_mut().zip(world.carts_mut()) {
            let wanted = (
                sanitize(controls.get(&slot.speed_key)),
                sanitize(controls.get(&slot.rocket_key)),
            );
            if wanted == slot.applied {
                continue;
            }
            cart.wheel_target = wanted.0 * max_speed;
            cart.rocket = wanted.1;
            slot.applied = wanted;
            wrote = true;
        }
        if wrote {
            self.writes += 1;
        }
    }
}
