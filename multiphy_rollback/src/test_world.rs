// Test-only world that records every control snapshot it was stepped with.
//
// `TraceWorld` integrates a single 1D body (`position += velocity` per
// advance) and appends `(frame, controls)` to a log each time its stepper
// runs. Comparing logs makes timing assertions exact: a diff applied at the
// wrong frame shows up as the wrong control value at a specific log index.
//
// Live-world and release counts are thread-local, so parallel tests do not
// interfere with each other.

use std::cell::Cell;

use crate::control::{ControlState, Frame};
use crate::error::RollbackError;
use crate::handle::{SimWorld, Stepper};

thread_local! {
    static LIVE: Cell<i64> = const { Cell::new(0) };
    static RELEASES: Cell<u64> = const { Cell::new(0) };
}

/// Worlds currently alive on this thread.
pub fn live_worlds() -> i64 {
    LIVE.with(Cell::get)
}

/// `release` calls observed on this thread.
pub fn releases() -> u64 {
    RELEASES.with(Cell::get)
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct TraceData {
    pub position: f64,
    pub velocity: f64,
    pub advances: u64,
    pub log: Vec<(Frame, ControlState)>,
}

#[derive(Debug)]
pub struct TraceWorld {
    data: TraceData,
}

impl TraceWorld {
    pub fn new() -> Self {
        Self::from_data(TraceData::default())
    }

    fn from_data(data: TraceData) -> Self {
        LIVE.with(|c| c.set(c.get() + 1));
        Self { data }
    }

    pub fn data(&self) -> &TraceData {
        &self.data
    }
}

impl Default for TraceWorld {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for TraceWorld {
    fn drop(&mut self) {
        LIVE.with(|c| c.set(c.get() - 1));
    }
}

impl SimWorld for TraceWorld {
    type Snapshot = TraceData;

    fn take_snapshot(&self) -> Result<TraceData, RollbackError> {
        Ok(self.data.clone())
    }

    fn restore_snapshot(snapshot: &TraceData) -> Result<Self, RollbackError> {
        Ok(Self::from_data(snapshot.clone()))
    }

    fn advance(&mut self) {
        self.data.position += self.data.velocity;
        self.data.advances += 1;
    }

    fn release(&mut self) {
        RELEASES.with(|c| c.set(c.get() + 1));
    }
}

/// Sets velocity from the `speed` control and logs what it saw.
#[derive(Clone, Debug, Default)]
pub struct TraceStepper {
    pub steps_run: u64,
}

impl Stepper<TraceWorld> for TraceStepper {
    fn step(&mut self, frame: Frame, world: &mut TraceWorld, controls: &ControlState) {
        world.data.velocity = controls.get("speed");
        world.data.log.push((frame, controls.clone()));
        self.steps_run += 1;
    }
}
