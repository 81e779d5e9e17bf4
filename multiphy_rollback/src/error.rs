// Error taxonomy for the rollback core.
//
// Only conditions a caller can reasonably react to are errors here:
// - `EventInPast`: a diff addressed to a frame the timeline already passed.
//   Accepting it would rewrite confirmed history, so it is refused rather
//   than silently dropped.
// - `Snapshot`: the opaque world could not snapshot itself or restore from
//   its own snapshot.
//
// Programming errors (forwarding a timeline backwards) panic with a
// diagnostic instead. Use-after-free of a world cannot be expressed at all:
// `WorldHandle::free` consumes the handle.

use thiserror::Error;

use crate::control::Frame;

#[derive(Debug, Error)]
pub enum RollbackError {
    #[error(
        "event for frame {event_frame} arrived after the timeline reached frame \
         {timeline_frame}"
    )]
    EventInPast {
        event_frame: Frame,
        timeline_frame: Frame,
    },

    #[error("world snapshot round trip failed")]
    Snapshot(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl RollbackError {
    /// Wrap a world-specific snapshot or restore failure.
    pub fn snapshot(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Snapshot(Box::new(err))
    }
}
