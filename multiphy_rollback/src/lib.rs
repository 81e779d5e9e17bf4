// multiphy_rollback — rollback reconciliation core for two-peer simulations.
//
// Two peers run the same frame-stepped simulation and exchange only sparse
// control diffs. This crate keeps a local prediction running ahead of remote
// confirmation and, when a confirmed diff disagrees with what was predicted,
// rebuilds the prediction from the confirmed timeline and resimulates it
// deterministically. It knows nothing about transports, rendering, or what
// the simulation actually contains.
//
// Module overview:
// - `control.rs`:      `ControlState` (sparse key → f64 input), diffing, and the
//                      `Event` / `RemoteEvent` shapes.
// - `queue.rs`:        `SortedEventQueue` — pending events ordered by frame.
// - `handle.rs`:       `SimWorld` / `Stepper` traits and `WorldHandle`, the
//                      owned world + stepper + frame counter.
// - `frame_state.rs`:  `FrameState` — one timeline and its replay loop.
// - `coordinator.rs`:  `RollbackCoordinator` — predicted vs confirmed timelines.
// - `error.rs`:        `RollbackError`.
//
// The embedding application supplies the simulation by implementing
// `SimWorld` (snapshot/restore/advance) and `Stepper` (apply controls). See
// the `multiphy_sandbox` crate for a complete example and `multiphy_session`
// for the tick loop that feeds this crate from a transport.
//
// **Critical constraint: determinism.** Both peers must produce bit-identical
// worlds from identical `(frame, world, controls)` sequences. Nothing here
// reads clocks, hashes with random seeds, or iterates unordered maps.

pub mod control;
pub mod coordinator;
pub mod error;
pub mod frame_state;
pub mod handle;
pub mod queue;

#[cfg(test)]
mod test_world;

pub use control::{ControlState, Event, Frame, RemoteEvent};
pub use coordinator::{RemoteOutcome, RollbackCoordinator};
pub use error::RollbackError;
pub use frame_state::FrameState;
pub use handle::{SimWorld, Stepper, WorldHandle};
pub use queue::{Framed, SortedEventQueue};
