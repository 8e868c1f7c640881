//! Cooperative interrupt/resume: a node pauses the executor by returning
//! [`InterruptError`]; the caller resumes by re-invoking the executor with
//! a value stashed under a well-known state key.
//!
//! Modeled on the teacher's `runtimes::execution::PausedReason`/
//! `PausedReport` (pause is a first-class, inspectable result rather than a
//! special error path), generalized so any node — not only ones the runner
//! pauses before/after — can request a pause mid-execution.

use miette::Diagnostic;
use serde_json::Value;
use thiserror::Error;

use crate::state::StateSnapshot;

/// Reserved state key holding the single resume value for the most recent
/// interrupt in a node with exactly one interrupt point.
pub const RESUME_KEY: &str = "__resume__";
/// Reserved state key holding a map from interrupt id to resume value, for
/// nodes with multiple interrupt points.
pub const RESUME_MAP_KEY: &str = "__resume_map__";
/// Reserved state key tracking which interrupt ids have already been
/// consumed, so a replayed node does not re-pause on an already-resumed
/// interrupt.
pub const USED_INTERRUPTS_KEY: &str = "__used_interrupts__";

/// Returned by a node to pause the executor at the current superstep.
///
/// Unlike [`NodeError`], an interrupt is not subject to [`crate::retry::RetryPolicy`]:
/// the executor checkpoints the paused state and returns control to the
/// caller immediately.
#[derive(Debug, Error, Diagnostic)]
#[error("execution interrupted: {reason}")]
#[diagnostic(code(pregelflow::interrupt))]
pub struct InterruptError {
    /// Identifies this interrupt point within the node, so multiple
    /// interrupts in one node can be resumed independently via
    /// `resume_map`.
    pub id: String,
    pub reason: String,
    /// Value surfaced to the caller describing what input is needed to
    /// resume.
    pub payload: Value,
}

impl InterruptError {
    #[must_use]
    pub fn new(id: impl Into<String>, reason: impl Into<String>, payload: Value) -> Self {
        Self {
            id: id.into(),
            reason: reason.into(),
            payload,
        }
    }
}

/// The outcome of a resolved [`interrupt`] call: the value to treat as the
/// prompt's answer, plus (when the value was just consumed from a resume
/// channel rather than replayed) the `usedInterrupts` patch a node must fold
/// into its [`crate::node::NodePartial`] via
/// [`crate::node::NodePartial::with_used_interrupt`] to keep a later
/// re-execution of this node, within the same invocation, idempotent.
#[derive(Debug, Clone, PartialEq)]
pub struct InterruptResolution {
    pub value: Value,
    pub record: Option<Value>,
}

impl InterruptResolution {
    fn resumed(key: &str, value: Value) -> Self {
        let mut record = serde_json::Map::new();
        record.insert(key.to_string(), value.clone());
        Self {
            value,
            record: Some(Value::Object(record)),
        }
    }

    fn replayed(value: Value) -> Self {
        Self { value, record: None }
    }
}

/// Implements the `Interrupt(state, key, prompt)` operation (§4.5, module 7
/// "Interrupt/Resume"), in four branches, tried in order:
///
/// 1. Consume `state[resumeChannel]` (the single-slot resume value).
/// 2. Else consume `state[resumeMap][key]` (for nodes with multiple
///    interrupt points).
/// 3. Else, if `state[usedInterrupts][key]` already exists from a prior
///    execution of this node within the same invocation, replay it — this
///    node already paused and was resumed once; a later re-execution (e.g.
///    a cyclic graph, or a node upstream of a second interrupt point) must
///    not pause again on the same interrupt.
/// 4. Else return [`InterruptError`], pausing execution with `prompt` as
///    the payload surfaced to the caller.
pub fn interrupt(snapshot: &StateSnapshot, key: &str, prompt: Value) -> Result<InterruptResolution, InterruptError> {
    if let Some(value) = snapshot.get(RESUME_KEY) {
        return Ok(InterruptResolution::resumed(key, value.clone()));
    }
    if let Some(value) = snapshot
        .get(RESUME_MAP_KEY)
        .and_then(Value::as_object)
        .and_then(|map| map.get(key))
    {
        return Ok(InterruptResolution::resumed(key, value.clone()));
    }
    if let Some(value) = snapshot
        .get(USED_INTERRUPTS_KEY)
        .and_then(Value::as_object)
        .and_then(|map| map.get(key))
    {
        return Ok(InterruptResolution::replayed(value.clone()));
    }
    Err(InterruptError::new(key, "waiting for resume input", prompt))
}

/// A resume value supplied by the caller when re-invoking the executor
/// after a pause.
#[derive(Debug, Clone, Default)]
pub struct ResumeCommand {
    /// Resume value for a node with a single interrupt point.
    pub resume: Option<Value>,
    /// Resume values keyed by interrupt id, for nodes with multiple
    /// interrupt points.
    pub resume_map: rustc_hash::FxHashMap<String, Value>,
}

impl ResumeCommand {
    #[must_use]
    pub fn single(value: Value) -> Self {
        Self {
            resume: Some(value),
            resume_map: Default::default(),
        }
    }

    #[must_use]
    pub fn for_id(id: impl Into<String>, value: Value) -> Self {
        let mut resume_map = rustc_hash::FxHashMap::default();
        resume_map.insert(id.into(), value);
        Self {
            resume: None,
            resume_map,
        }
    }

    /// Looks up the resume value for `interrupt_id`, falling back to the
    /// single `resume` slot if no per-id entry exists.
    #[must_use]
    pub fn value_for(&self, interrupt_id: &str) -> Option<&Value> {
        self.resume_map
            .get(interrupt_id)
            .or(self.resume.as_ref())
    }

    /// Serializes this command into the state-write map under the reserved
    /// resume keys, ready to be merged at the next barrier.
    #[must_use]
    pub fn into_state_writes(self) -> rustc_hash::FxHashMap<String, Value> {
        let mut writes = rustc_hash::FxHashMap::default();
        if let Some(value) = self.resume {
            writes.insert(RESUME_KEY.to_string(), value);
        }
        if !self.resume_map.is_empty() {
            writes.insert(
                RESUME_MAP_KEY.to_string(),
                Value::Object(self.resume_map.into_iter().collect()),
            );
        }
        writes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn value_for_prefers_per_id_entry_over_single_slot() {
        let cmd = ResumeCommand {
            resume: Some(json!("fallback")),
            resume_map: rustc_hash::FxHashMap::from_iter([("a".to_string(), json!("specific"))]),
        };
        assert_eq!(cmd.value_for("a"), Some(&json!("specific")));
        assert_eq!(cmd.value_for("b"), Some(&json!("fallback")));
    }

    #[test]
    fn into_state_writes_round_trips_through_reserved_keys() {
        let cmd = ResumeCommand::for_id("step1", json!(42));
        let writes = cmd.into_state_writes();
        assert!(writes.contains_key(RESUME_MAP_KEY));
        assert!(!writes.contains_key(RESUME_KEY));
    }

    fn snapshot_with(values: rustc_hash::FxHashMap<String, Value>) -> StateSnapshot {
        StateSnapshot {
            values,
            versions: Default::default(),
        }
    }

    #[test]
    fn interrupt_consumes_the_single_resume_slot_first() {
        let snapshot = snapshot_with(rustc_hash::FxHashMap::from_iter([
            (RESUME_KEY.to_string(), json!(42)),
            (
                RESUME_MAP_KEY.to_string(),
                json!({ "ask": "should never be read" }),
            ),
        ]));
        let resolution = interrupt(&snapshot, "ask", json!("what?")).unwrap();
        assert_eq!(resolution.value, json!(42));
        assert_eq!(resolution.record, Some(json!({ "ask": 42 })));
    }

    #[test]
    fn interrupt_falls_back_to_the_resume_map_entry_for_its_key() {
        let snapshot = snapshot_with(rustc_hash::FxHashMap::from_iter([(
            RESUME_MAP_KEY.to_string(),
            json!({ "ask": "answer" }),
        )]));
        let resolution = interrupt(&snapshot, "ask", json!("what?")).unwrap();
        assert_eq!(resolution.value, json!("answer"));
        assert_eq!(resolution.record, Some(json!({ "ask": "answer" })));
    }

    #[test]
    fn interrupt_replays_a_previously_recorded_value_without_re_pausing() {
        let snapshot = snapshot_with(rustc_hash::FxHashMap::from_iter([(
            USED_INTERRUPTS_KEY.to_string(),
            json!({ "ask": "already answered" }),
        )]));
        let resolution = interrupt(&snapshot, "ask", json!("what?")).unwrap();
        assert_eq!(resolution.value, json!("already answered"));
        assert_eq!(resolution.record, None);
    }

    #[test]
    fn interrupt_pauses_when_nothing_resolves_the_key() {
        let snapshot = snapshot_with(rustc_hash::FxHashMap::default());
        let err = interrupt(&snapshot, "ask", json!("what?")).unwrap_err();
        assert_eq!(err.id, "ask");
        assert_eq!(err.payload, json!("what?"));
    }
}
