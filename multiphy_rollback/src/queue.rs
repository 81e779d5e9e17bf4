// Sorted event queue — pending diffs ordered by frame.
//
// Each timeline keeps the events it has not yet folded into its world in a
// `SortedEventQueue`. Items are kept in a flat `Vec` sorted ascending by
// frame: insertion is a binary search plus a shift, and consumption always
// removes a contiguous prefix (`drain_through`), which is exactly what the
// replay loop in `frame_state.rs` needs.
//
// Ties: an item inserted with the same frame as existing items lands after
// all of them (stable insertion order). Callers still must not depend on the
// relative order of same-frame events from *different* peers, because the two
// peers insert them in different arrival orders; the sandbox keeps peers on
// disjoint keys so the order never matters for the result.
//
// Cloning copies the backing vector. Payloads are cloned along with it; the
// events are small sparse maps so this stays cheap next to a world clone.

use crate::control::{Event, Frame};

/// Anything that can be ordered by the frame it applies to.
pub trait Framed {
    fn frame(&self) -> Frame;
}

impl Framed for Event {
    fn frame(&self) -> Frame {
        self.frame
    }
}

/// Ascending-by-frame queue with stable tie-breaking.
#[derive(Clone, Debug)]
pub struct SortedEventQueue<T> {
    items: Vec<T>,
}

impl<T> Default for SortedEventQueue<T> {
    fn default() -> Self {
        Self { items: Vec::new() }
    }
}

impl<T: Framed> SortedEventQueue<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Index at which an item for `frame` would be inserted: the first
    /// position whose frame is strictly greater than `frame`.
    pub fn search(&self, frame: Frame) -> usize {
        self.items.partition_point(|item| item.frame() <= frame)
    }

    /// Insert keeping ascending order. Returns the index it landed at.
    pub fn insert(&mut self, item: T) -> usize {
        let pos = self.search(item.frame());
        self.items.insert(pos, item);
        pos
    }

    /// Remove and yield, in ascending order, every item with
    /// `frame <= target`.
    pub fn drain_through(&mut self, target: Frame) -> std::vec::Drain<'_, T> {
        let end = self.search(target);
        self.items.drain(..end)
    }

    /// Frame of the earliest pending item.
    pub fn peek_frame(&self) -> Option<Frame> {
        self.items.first().map(Framed::frame)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.items.iter()
    }
}
