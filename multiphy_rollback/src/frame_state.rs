// Frame state — one timeline: a world, its persistent controls, and the
// diffs still pending against it.
//
// The persistent `state` is the full control snapshot fed to the stepper on
// every tick. It only changes when an event is applied, so between events
// controls simply hold their last value.
//
// ## Replay (`forward`)
//
// `forward(target)` brings the timeline to exactly `target`:
//
//   1. Take every pending event with `frame <= target`, oldest first.
//   2. For each one, tick with the unchanged state until the world reaches
//      `event.frame` (zero ticks when already there, e.g. two events on one
//      frame), then merge the diff into `state` without ticking. The diff is
//      in effect for the step *at* `event.frame`, never retroactively.
//   3. The consumed prefix is gone from the queue.
//   4. Tick with the (now final) state until the world reaches `target`.
//
// Invariant: every queued event has `frame >= self.frame()`. `add_event`
// refuses anything older, and `forward` only ever consumes events at or
// below its target, so the invariant holds across calls.
//
// ## Copying
//
// `make_copy_from` replaces this timeline wholesale with a deep copy of
// another. The new world is built first; the old one is released when it is
// overwritten, so a failed restore leaves `self` untouched.
//
// See also: `coordinator.rs`, which owns two of these (predicted and
// confirmed) and decides when to copy one into the other.

use crate::control::{ControlState, Event, Frame};
use crate::error::RollbackError;
use crate::handle::{SimWorld, Stepper, WorldHandle};
use crate::queue::SortedEventQueue;

/// A timeline: world handle, persistent controls, and pending events.
pub struct FrameState<W: SimWorld, S: Stepper<W>> {
    handle: WorldHandle<W, S>,
    state: ControlState,
    queue: SortedEventQueue<Event>,
}

impl<W: SimWorld, S: Stepper<W>> FrameState<W, S> {
    /// Start a timeline with every control at rest.
    pub fn new(handle: WorldHandle<W, S>) -> Self {
        Self::with_state(handle, ControlState::new())
    }

    pub fn with_state(handle: WorldHandle<W, S>, state: ControlState) -> Self {
        Self {
            handle,
            state,
            queue: SortedEventQueue::new(),
        }
    }

    pub fn frame(&self) -> Frame {
        self.handle.frame()
    }

    pub fn world(&self) -> &W {
        self.handle.world()
    }

    pub fn handle(&self) -> &WorldHandle<W, S> {
        &self.handle
    }

    /// The controls currently in effect.
    pub fn state(&self) -> &ControlState {
        &self.state
    }

    pub fn queue(&self) -> &SortedEventQueue<Event> {
        &self.queue
    }

    /// Queue an event for replay. Refuses events behind the world frame.
    pub fn add_event(&mut self, event: Event) -> Result<(), RollbackError> {
        if event.frame < self.frame() {
            return Err(RollbackError::EventInPast {
                event_frame: event.frame,
                timeline_frame: self.frame(),
            });
        }
        self.queue.insert(event);
        Ok(())
    }

    /// Queue an event the caller has already pinned at or after the world
    /// frame.
    pub(crate) fn queue_unchecked(&mut self, event: Event) {
        debug_assert!(event.frame >= self.frame());
        self.queue.insert(event);
    }

    /// Merge a diff into the persistent controls right now, without
    /// queueing and without ticking.
    pub fn apply_diff(&mut self, diff: &ControlState) {
        self.state.apply(diff);
    }

    /// One tick with the current persistent controls.
    pub fn step(&mut self) {
        self.handle.step(&self.state);
    }

    /// Tick with unchanged controls until the world reaches `target`.
    fn step_until(&mut self, target: Frame) {
        while self.handle.frame() < target {
            self.handle.step(&self.state);
        }
    }

    /// Replay pending events up to and including `target`, ending with the
    /// world exactly at `target`.
    ///
    /// Panics if `target` is behind the current frame; timelines never run
    /// backwards.
    pub fn forward(&mut self, target: Frame) {
        assert!(
            target >= self.frame(),
            "forward to frame {target} from frame {}: timelines cannot run backwards",
            self.frame()
        );

        let due: Vec<Event> = self.queue.drain_through(target).collect();
        for event in due {
            self.step_until(event.frame);
            self.state.apply(&event.diff);
        }
        self.step_until(target);

        debug_assert_eq!(self.frame(), target);
    }

    /// Deep copy: independent world, same controls, same pending events.
    pub fn try_clone(&self) -> Result<Self, RollbackError> {
        Ok(Self {
            handle: self.handle.try_clone()?,
            state: self.state.clone(),
            queue: self.queue.clone(),
        })
    }

    /// Become a deep copy of `other`, releasing this timeline's world.
    pub fn make_copy_from(&mut self, other: &Self) -> Result<(), RollbackError> {
        let handle = other.handle.try_clone()?;
        self.handle = handle;
        self.state = other.state.clone();
        self.queue = other.queue.clone();
        Ok(())
    }
}
