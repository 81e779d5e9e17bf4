// Symbolic control state — the unit of synchronized input.
//
// A `ControlState` is a sparse mapping from control key (e.g. `"p0.speed"`)
// to an `f64` value. Absent keys read as 0.0, so a fresh peer starts with an
// empty map and every control at rest. The input collaborator produces a new
// full `ControlState` each tick; the coordinator diffs it against the last
// applied one and only the changed keys travel over the wire.
//
// This file also defines the two event shapes built on top of it:
// - `Event`: a diff that must be applied to a timeline exactly when that
//   timeline's frame counter equals `frame`, before the step at `frame` runs.
// - `RemoteEvent`: the wire form. A missing `diff` is a heartbeat, which
//   advances confirmation without changing any control.
//
// See also: `frame_state.rs` for where events are applied, `queue.rs` for
// the ordered container that holds pending events.
//
// **Critical constraint: determinism.** Iteration order feeds straight into
// stepper code, so the backing map is a `BTreeMap`. Values are compared by
// bit pattern so a state always diffs to "no change" against itself.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Simulation frame index. Advances by exactly one per world step.
pub type Frame = u64;

/// Sparse control values keyed by name. Absent keys are 0.0.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ControlState {
    values: BTreeMap<String, f64>,
}

impl ControlState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read a control value, defaulting to 0.0 when the key was never set.
    pub fn get(&self, key: &str) -> f64 {
        self.values.get(key).copied().unwrap_or(0.0)
    }

    pub fn set(&mut self, key: impl Into<String>, value: f64) {
        self.values.insert(key.into(), value);
    }

    /// Builder-style `set`, handy for constructing inputs inline.
    pub fn with(mut self, key: impl Into<String>, value: f64) -> Self {
        self.set(key, value);
        self
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Iterate keys and values in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.values.iter().map(|(k, v)| (k.as_str(), *v))
    }

    /// Compute the sparse delta that brings every key of `new` into `self`.
    ///
    /// Returns `None` when nothing changed. Only keys present in `new` are
    /// considered: a baseline usually also holds the other peer's controls,
    /// which a local input never mentions and must not reset.
    pub fn diff(&self, new: &ControlState) -> Option<ControlState> {
        let out: ControlState = new
            .values
            .iter()
            .filter(|(key, value)| self.get(key).to_bits() != value.to_bits())
            .map(|(key, value)| (key.clone(), *value))
            .collect();
        if out.is_empty() { None } else { Some(out) }
    }

    /// Overwrite every key present in `diff`, in place.
    pub fn apply(&mut self, diff: &ControlState) {
        for (key, &value) in &diff.values {
            self.values.insert(key.clone(), value);
        }
    }

    /// Every value is finite. Only finite values survive the JSON wire form.
    pub fn is_finite(&self) -> bool {
        self.values.values().all(|v| v.is_finite())
    }

    /// Copy with NaN and infinities replaced by 0.0.
    pub fn finite_or_zero(&self) -> ControlState {
        self.values
            .iter()
            .map(|(k, &v)| (k.clone(), if v.is_finite() { v } else { 0.0 }))
            .collect()
    }

    /// Copy of this state with every key prefixed by `namespace` and a dot.
    /// Used to give each peer its own slice of the shared key space.
    pub fn namespaced(&self, namespace: &str) -> ControlState {
        ControlState {
            values: self
                .values
                .iter()
                .map(|(k, v)| (format!("{namespace}.{k}"), *v))
                .collect(),
        }
    }
}

impl<K: Into<String>> FromIterator<(K, f64)> for ControlState {
    fn from_iter<I: IntoIterator<Item = (K, f64)>>(iter: I) -> Self {
        ControlState {
            values: iter.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }
}

/// A diff scheduled for a specific frame of a timeline.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub frame: Frame,
    pub diff: ControlState,
}

/// Wire form of an event. `diff: None` is a heartbeat.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RemoteEvent {
    pub frame: Frame,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diff: Option<ControlState>,
}

impl RemoteEvent {
    pub fn heartbeat(frame: Frame) -> Self {
        Self { frame, diff: None }
    }

    pub fn is_heartbeat(&self) -> bool {
        self.diff.is_none()
    }
}

impl From<Event> for RemoteEvent {
    fn from(ev: Event) -> Self {
        Self {
            frame: ev.frame,
            diff: Some(ev.diff),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state(pairs: &[(&str, f64)]) -> ControlState {
        pairs.iter().map(|&(k, v)| (k, v)).collect()
    }

    #[test]
    fn absent_keys_read_as_zero() {
        let s = state(&[("speed", 2.0)]);
        assert_eq!(s.get("speed"), 2.0);
        assert_eq!(s.get("rocket"), 0.0);
    }

    #[test]
    fn diff_of_identical_states_is_none() {
        let s = state(&[("speed", 1.0), ("rocket", -1.0)]);
        assert_eq!(s.diff(&s), None);
        assert_eq!(ControlState::new().diff(&ControlState::new()), None);
    }

    #[test]
    fn diff_against_default_skips_zero_values() {
        // A fresh state treats every key as 0, so an explicit 0 is no change.
        let new = state(&[("speed", 0.0), ("rocket", 1.0)]);
        let diff = ControlState::new().diff(&new).unwrap();
        assert_eq!(diff, state(&[("rocket", 1.0)]));
    }

    #[test]
    fn diff_then_apply_reaches_new_state() {
        let old = state(&[("speed", 1.0), ("rocket", 1.0)]);
        let new = state(&[("speed", 1.0), ("rocket", -1.0), ("steer", 0.25)]);

        let diff = old.diff(&new).unwrap();
        let mut applied = old.clone();
        applied.apply(&diff);

        assert_eq!(applied, new);
        // Unchanged key is not transmitted.
        assert!(!diff.contains_key("speed"));
        assert_eq!(diff.len(), 2);
    }

    #[test]
    fn diff_ignores_keys_missing_from_new_input() {
        // The baseline carries the other peer's control; local input does not.
        let baseline = state(&[("p0.speed", 1.0), ("p1.speed", -1.0)]);
        let input = state(&[("p0.speed", 0.5)]);

        let diff = baseline.diff(&input).unwrap();
        assert_eq!(diff, state(&[("p0.speed", 0.5)]));

        let mut applied = baseline.clone();
        applied.apply(&diff);
        assert_eq!(applied.get("p1.speed"), -1.0);
    }

    #[test]
    fn non_finite_values_collapse_to_rest() {
        let s = state(&[("speed", f64::NAN), ("rocket", f64::INFINITY), ("steer", 0.5)]);
        assert!(!s.is_finite());

        let clean = s.finite_or_zero();
        assert!(clean.is_finite());
        assert_eq!(clean, state(&[("speed", 0.0), ("rocket", 0.0), ("steer", 0.5)]));
        assert!(ControlState::new().is_finite());
    }

    #[test]
    fn namespaced_prefixes_every_key() {
        let s = state(&[("speed", 1.0), ("rocket", 0.5)]).namespaced("p1");
        assert_eq!(s.get("p1.speed"), 1.0);
        assert_eq!(s.get("p1.rocket"), 0.5);
        assert_eq!(s.len(), 2);
    }

    #[test]
    fn heartbeat_omits_diff_on_the_wire() {
        let json = serde_json::to_string(&RemoteEvent::heartbeat(40)).unwrap();
        assert_eq!(json, r#"{"frame":40}"#);

        let parsed: RemoteEvent = serde_json::from_str(&json).unwrap();
        assert!(parsed.is_heartbeat());
    }

    #[test]
    fn remote_event_diff_is_a_plain_object() {
        let ev = RemoteEvent::from(Event {
            frame: 3,
            diff: state(&[("p0.speed", 1.0)]),
        });
        let json = serde_json::to_string(&ev).unwrap();
        assert_eq!(json, r#"{"frame":3,"diff":{"p0.speed":1.0}}"#);
    }

    #[test]
    fn empty_diff_is_distinct_from_heartbeat() {
        let ev: RemoteEvent = serde_json::from_str(r#"{"frame":7,"diff":{}}"#).unwrap();
        assert!(!ev.is_heartbeat());
        assert!(ev.diff.unwrap().is_empty());
    }
}
