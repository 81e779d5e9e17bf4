// World handle — owned, resource-backed simulation world plus its stepper.
//
// The simulation world is opaque to the rollback core. It is only ever asked
// to do four things, captured by the `SimWorld` trait:
// - take a snapshot of itself,
// - build an independent world from such a snapshot,
// - advance one physics tick,
// - release any non-memory resources when it goes away.
//
// Domain logic (reading controls and pushing forces into the world) lives in
// a separate `Stepper`. A stepper may cache derived data between ticks; it
// must be `Clone` so that a cloned handle carries an identical copy, and it
// must not keep any state that a clone would lose.
//
// `WorldHandle` couples the two with a frame counter. Every tick runs the
// stepper for the current frame, advances the world, then bumps the counter,
// so `frame` always equals the number of ticks executed since the handle's
// lineage began.
//
// Ownership: a handle exclusively owns its world. `try_clone` performs the
// expensive snapshot/restore round trip and yields a causally independent
// world. Dropping (or `free`-ing) a handle releases the world and stepper
// exactly once; there is no way to touch a released handle.
//
// The world is passed explicitly into every stepper call. There is no
// ambient "current world" for simulation content to reach for.

use crate::control::{ControlState, Frame};
use crate::error::RollbackError;

/// The opaque simulation resource.
pub trait SimWorld: Sized {
    /// Self-contained copy of the world's state.
    type Snapshot;

    fn take_snapshot(&self) -> Result<Self::Snapshot, RollbackError>;

    /// Build a fresh, independent world from a snapshot.
    fn restore_snapshot(snapshot: &Self::Snapshot) -> Result<Self, RollbackError>;

    /// Advance the world by one physics tick.
    fn advance(&mut self);

    /// Release non-memory resources. Called exactly once, when the owning
    /// handle is dropped.
    fn release(&mut self) {}

    /// Stable digest of the world's observable state, if the world can
    /// produce one. Used to compare peers.
    fn checksum(&self) -> Option<u64> {
        None
    }
}

/// Per-tick domain logic driven by control values.
///
/// Must be a pure function of `(frame, world, controls)` plus whatever the
/// stepper itself carries (and duplicates on `clone`).
pub trait Stepper<W>: Clone {
    fn step(&mut self, frame: Frame, world: &mut W, controls: &ControlState);

    /// Release stepper-held resources. Called once, before the world's own
    /// `release`.
    fn release(&mut self) {}
}

/// A world, the stepper that drives it, and the number of ticks run so far.
pub struct WorldHandle<W: SimWorld, S: Stepper<W>> {
    world: W,
    stepper: S,
    frame: Frame,
}

impl<W: SimWorld, S: Stepper<W>> WorldHandle<W, S> {
    /// Wrap a freshly built world at frame 0.
    pub fn new(world: W, stepper: S) -> Self {
        Self::at_frame(world, stepper, 0)
    }

    /// Wrap a world that has already been stepped `frame` times.
    pub fn at_frame(world: W, stepper: S, frame: Frame) -> Self {
        Self {
            world,
            stepper,
            frame,
        }
    }

    pub fn frame(&self) -> Frame {
        self.frame
    }

    pub fn world(&self) -> &W {
        &self.world
    }

    pub fn stepper(&self) -> &S {
        &self.stepper
    }

    /// Run one tick: stepper logic for the current frame, then the world's
    /// own advance, then the frame counter.
    pub fn step(&mut self, controls: &ControlState) {
        self.stepper.step(self.frame, &mut self.world, controls);
        self.world.advance();
        self.frame += 1;
    }

    /// Deep copy through a snapshot/restore round trip. The clone shares
    /// nothing mutable with `self`.
    pub fn try_clone(&self) -> Result<Self, RollbackError> {
        let snapshot = self.world.take_snapshot()?;
        let world = W::restore_snapshot(&snapshot)?;
        Ok(Self {
            world,
            stepper: self.stepper.clone(),
            frame: self.frame,
        })
    }

    /// Release the world and stepper now. Equivalent to dropping the handle.
    pub fn free(self) {
        drop(self);
    }
}

impl<W: SimWorld, S: Stepper<W>> Drop for WorldHandle<W, S> {
    fn drop(&mut self) {
        self.stepper.release();
        self.world.release();
    }
}

impl<W: SimWorld + std::fmt::Debug, S: Stepper<W>> std::fmt::Debug for WorldHandle<W, S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorldHandle")
            .field("frame", &self.frame)
            .field("world", &self.world)
            .finish_non_exhaustive()
    }
}
