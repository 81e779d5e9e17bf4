// Rollback coordinator — reconciles local prediction with remote truth.
//
// The coordinator owns exactly two timelines:
// - `current`: the predicted timeline. It steps every local tick, applies
//   local input immediately, and is thrown away and rebuilt whenever a
//   correction arrives.
// - `sure`: the confirmed timeline. It only moves forward, and only as far
//   as the remote peer has confirmed (by diff or heartbeat). Local events
//   sit in its queue until confirmation reaches their frame.
//
// ## Local tick (`step_local`)
//
//   1. Diff the new full input against `current`'s persistent controls.
//   2. If anything changed, build an event at `current.frame()`, merge it
//      straight into `current` (the predicted timeline never replays its own
//      fresh input) and queue it into `sure`.
//   3. Step `current` once with its full controls, changed or not.
//
// Step 2 guards the ordering invariant `sure.frame() <= current.frame()`.
// If confirmation has run ahead of prediction (the remote peer is ahead and
// only heartbeats have arrived), `current` is forwarded to the confirmed
// frame first and the event is retargeted there, so it is never queued
// behind `sure`.
//
// ## Remote update (`got_remote_diff`)
//
//   1. A diff is queued into `sure`; a heartbeat adds nothing.
//   2. `sure` forwards to the confirmed frame.
//   3. A heartbeat stops here: nothing the prediction assumed has changed.
//   4. A diff rebuilds `current` as a copy of `sure` and, if prediction was
//      further ahead, forwards it back to where it was. The copy inherits
//      `sure`'s queue, so every still-unconfirmed local event is replayed at
//      its original frame.
//
// The world clone in step 4 is the dominant cost of the whole scheme. It
// happens once per remote diff, never per heartbeat, which is why peers send
// diffs only on input change.
//
// **Critical constraint: serialization.** Both operations mutate both
// timelines. The owner must call them from one logical thread, one at a time.

use tracing::{debug, trace, warn};

use crate::control::{ControlState, Event, Frame, RemoteEvent};
use crate::error::RollbackError;
use crate::frame_state::FrameState;
use crate::handle::{SimWorld, Stepper, WorldHandle};

/// What a remote update did to the timelines.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RemoteOutcome {
    /// Confirmation advanced (or was already past `frame`); prediction
    /// untouched.
    Heartbeat { confirmed: Frame },
    /// A diff was folded in and prediction was rebuilt.
    RolledBack {
        /// Frame the diff applied at.
        at: Frame,
        /// Frame prediction was resimulated back to.
        resumed: Frame,
        /// Frames resimulated beyond the confirmed point.
        depth: Frame,
    },
}

/// Two-timeline reconciliation state for one session.
pub struct RollbackCoordinator<W: SimWorld, S: Stepper<W>> {
    current: FrameState<W, S>,
    sure: FrameState<W, S>,
}

impl<W: SimWorld, S: Stepper<W>> RollbackCoordinator<W, S> {
    /// Start both timelines from the same world. The handle becomes the
    /// predicted timeline; the confirmed one is a clone of it.
    pub fn new(handle: WorldHandle<W, S>) -> Result<Self, RollbackError> {
        let current = FrameState::new(handle);
        let sure = current.try_clone()?;
        Ok(Self { current, sure })
    }

    /// Advance prediction by one tick with the latest full local input.
    /// Returns the event to transmit, or `None` when the input is unchanged.
    pub fn step_local(&mut self, input: &ControlState) -> Option<Event> {
        let mut produced = None;
        if let Some(diff) = self.current.state().diff(input) {
            let mut event = Event {
                frame: self.current.frame(),
                diff,
            };

            let sure_frame = self.sure.frame();
            if sure_frame > event.frame {
                warn!(
                    current = event.frame,
                    sure = sure_frame,
                    "confirmed timeline ahead of prediction; catching up before queueing input"
                );
                self.current.forward(sure_frame);
                event.frame = sure_frame;
            }

            self.current.apply_diff(&event.diff);
            self.sure.queue_unchecked(event.clone());
            produced = Some(event);
        }

        self.current.step();
        produced
    }

    /// Fold a remote confirmation into the confirmed timeline.
    ///
    /// `diff: None` is a heartbeat: it advances confirmation to `frame` (or
    /// does nothing if already there) and never touches prediction. A diff
    /// additionally rebuilds prediction from the confirmed timeline.
    ///
    /// A diff addressed to a frame the confirmed timeline already passed is
    /// refused with `RollbackError::EventInPast`.
    pub fn got_remote_diff(
        &mut self,
        frame: Frame,
        diff: Option<ControlState>,
    ) -> Result<RemoteOutcome, RollbackError> {
        let Some(diff) = diff else {
            if frame > self.sure.frame() {
                self.sure.forward(frame);
            }
            trace!(confirmed = self.sure.frame(), "heartbeat");
            return Ok(RemoteOutcome::Heartbeat {
                confirmed: self.sure.frame(),
            });
        };

        self.sure.add_event(Event { frame, diff })?;
        self.sure.forward(frame);

        let saved = self.current.frame();
        self.current.make_copy_from(&self.sure)?;
        if saved > self.current.frame() {
            self.current.forward(saved);
        }

        let depth = saved.saturating_sub(frame);
        debug!(at = frame, resumed = self.current.frame(), depth, "rolled back");
        Ok(RemoteOutcome::RolledBack {
            at: frame,
            resumed: self.current.frame(),
            depth,
        })
    }

    /// `got_remote_diff` for a decoded wire event.
    pub fn got_remote_event(&mut self, event: RemoteEvent) -> Result<RemoteOutcome, RollbackError> {
        self.got_remote_diff(event.frame, event.diff)
    }

    pub fn current_world(&self) -> &W {
        self.current.world()
    }

    pub fn sure_world(&self) -> &W {
        self.sure.world()
    }

    pub fn current_frame(&self) -> Frame {
        self.current.frame()
    }

    pub fn sure_frame(&self) -> Frame {
        self.sure.frame()
    }

    pub fn current_state(&self) -> &ControlState {
        self.current.state()
    }

    pub fn sure_state(&self) -> &ControlState {
        self.sure.state()
    }

    /// Events queued on the confirmed timeline, i.e. local input the remote
    /// peer has not confirmed yet.
    pub fn pending_events(&self) -> usize {
        self.sure.queue().len()
    }

    pub fn current(&self) -> &FrameState<W, S> {
        &self.current
    }

    pub fn sure(&self) -> &FrameState<W, S> {
        &self.sure
    }
}
