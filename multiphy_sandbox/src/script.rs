// Seeded scripted input for headless peers.
//
// Stands in for a keyboard: holds a random throttle and rocket setting for a
// random number of ticks, then picks new ones. Axis values are -1, 0 or 1,
// matching what a pair of keys per axis would produce. The same seed always
// yields the same input sequence.

use multiphy_rollback::ControlState;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

#[derive(Clone, Debug)]
pub struct ScriptedInput {
    rng: ChaCha8Rng,
    current: ControlState,
    hold: u32,
    min_hold: u32,
    max_hold: u32,
}

impl ScriptedInput {
    /// Input that changes every `min_hold..=max_hold` ticks.
    pub fn new(seed: u64, min_hold: u32, max_hold: u32) -> Self {
        Self {
            rng: ChaCha8Rng::seed_from_u64(seed),
            current: ControlState::new(),
            hold: 0,
            min_hold: min_hold.max(1),
            max_hold: max_hold.max(min_hold.max(1)),
        }
    }

    fn axis(&mut self) -> f64 {
        f64::from(self.rng.gen_range(-1i32..=1))
    }

    /// The un-namespaced input for the next tick.
    pub fn next_input(&mut self) -> ControlState {
        if self.hold == 0 {
            let speed = self.axis();
            let rocket = self.axis();
            self.current = ControlState::new()
                .with("speed", speed)
                .with("rocket", rocket);
            self.hold = self.rng.gen_range(self.min_hold..=self.max_hold);
        }
        self.hold -= 1;
        self.current.clone()
    }
}
