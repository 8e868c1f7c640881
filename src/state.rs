//! Generic, schema-driven workflow state.
//!
//! Generalizes the teacher's `VersionedState` (three hard-coded channels:
//! messages, extra, errors) into an arbitrary set of named channels backed
//! by a [`StateSchema`]. The `messages`/`extra`/`errors` keys still exist by
//! convention (seeded via [`State::new_with_user_message`] and friends) but
//! are ordinary schema entries rather than distinct Rust fields.

use rustc_hash::FxHashMap;
use serde_json::Value;
use std::sync::Arc;

use crate::channels::{ChannelManager, ChannelSnapshot};
use crate::interrupt::USED_INTERRUPTS_KEY;
use crate::message::Message;
use crate::reducers::{AppendList, Messages as MessagesReducer, MergeMap};
use crate::schema::{FieldSpec, StateSchema};

pub const MESSAGES_KEY: &str = "messages";
pub const EXTRA_KEY: &str = "extra";
pub const ERRORS_KEY: &str = "errors";

/// The default schema used when a graph is built without an explicit one:
/// `messages` (ordered message ops), `extra` (shallow map merge), `errors`
/// (append-only list), matching the teacher's three built-in channels, plus
/// `usedInterrupts` (shallow map merge, per §4.5's idempotent-replay record
/// — a custom schema that uses [`crate::node::NodeContext::interrupt`] must
/// register this key with the same reducer).
#[must_use]
pub fn default_schema() -> StateSchema {
    StateSchema::new()
        .with_field(
            MESSAGES_KEY,
            FieldSpec::new(Arc::new(MessagesReducer)).with_default(Arc::new(|| Value::Array(Vec::new()))),
        )
        .with_field(
            EXTRA_KEY,
            FieldSpec::new(Arc::new(MergeMap)).with_default(Arc::new(|| Value::Object(Default::default()))),
        )
        .with_field(
            ERRORS_KEY,
            FieldSpec::new(Arc::new(AppendList)).with_default(Arc::new(|| Value::Array(Vec::new()))),
        )
        .with_field(
            USED_INTERRUPTS_KEY,
            FieldSpec::new(Arc::new(MergeMap)).with_default(Arc::new(|| Value::Object(Default::default()))),
        )
}

/// The main state container for one execution session: a schema plus the
/// live [`ChannelManager`] it governs.
#[derive(Clone)]
pub struct State {
    schema: StateSchema,
    channels: ChannelManager,
}

/// Immutable, cloned view of state handed to a node for one superstep.
/// Nodes read from this; they never see the live `ChannelManager`.
#[derive(Clone, Debug, Default)]
pub struct StateSnapshot {
    pub values: FxHashMap<String, Value>,
    pub versions: FxHashMap<String, u64>,
}

impl StateSnapshot {
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    #[must_use]
    pub fn version(&self, key: &str) -> u64 {
        self.versions.get(key).copied().unwrap_or(0)
    }

    /// Convenience accessor for the conventional `messages` key.
    #[must_use]
    pub fn messages(&self) -> Vec<Message> {
        self.get(MESSAGES_KEY)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
            .unwrap_or_default()
    }

    /// Convenience accessor for the conventional `extra` key.
    #[must_use]
    pub fn extra(&self) -> FxHashMap<String, Value> {
        match self.get(EXTRA_KEY) {
            Some(Value::Object(map)) => map.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
            _ => FxHashMap::default(),
        }
    }
}

impl From<ChannelSnapshot> for StateSnapshot {
    fn from(snap: ChannelSnapshot) -> Self {
        Self {
            values: snap.values,
            versions: snap.versions,
        }
    }
}

impl State {
    #[must_use]
    pub fn new(schema: StateSchema) -> Self {
        Self {
            channels: ChannelManager::seed(&schema, FxHashMap::default()),
            schema,
        }
    }

    #[must_use]
    pub fn with_initial(schema: StateSchema, initial: FxHashMap<String, Value>) -> Self {
        Self {
            channels: ChannelManager::seed(&schema, initial),
            schema,
        }
    }

    #[must_use]
    pub fn new_with_user_message(user_text: &str) -> Self {
        let initial = FxHashMap::from_iter([(
            MESSAGES_KEY.to_string(),
            serde_json::to_value(vec![Message::user(user_text)]).expect("Message serializes"),
        )]);
        Self::with_initial(default_schema(), initial)
    }

    #[must_use]
    pub fn new_with_messages(messages: Vec<Message>) -> Self {
        let initial = FxHashMap::from_iter([(
            MESSAGES_KEY.to_string(),
            serde_json::to_value(messages).expect("Message serializes"),
        )]);
        Self::with_initial(default_schema(), initial)
    }

    #[must_use]
    pub fn builder() -> StateBuilder {
        StateBuilder::new()
    }

    #[must_use]
    pub fn schema(&self) -> &StateSchema {
        &self.schema
    }

    /// Applies one superstep's worth of writes, keyed by channel name,
    /// returning the keys whose version was bumped.
    pub fn apply_writes(&mut self, writes: FxHashMap<String, Value>) -> Vec<String> {
        self.channels.apply_writes(&self.schema, writes)
    }

    pub fn end_step(&mut self) {
        self.channels.end_step();
    }

    #[must_use]
    pub fn snapshot(&self) -> StateSnapshot {
        self.channels.snapshot().into()
    }

    #[must_use]
    pub fn channel_snapshot(&self) -> ChannelSnapshot {
        self.channels.snapshot()
    }

    #[must_use]
    pub fn versions(&self) -> FxHashMap<String, u64> {
        self.channels.versions()
    }

    /// Rehydrates state from a persisted channel snapshot (e.g. on resume
    /// from a checkpoint).
    #[must_use]
    pub fn restore(schema: StateSchema, snapshot: &ChannelSnapshot) -> Self {
        Self {
            channels: ChannelManager::restore(&schema, snapshot),
            schema,
        }
    }
}

/// Builder for constructing [`State`] with the default message/extra/errors
/// schema, ported from the teacher's `VersionedStateBuilder`.
#[derive(Debug, Default)]
pub struct StateBuilder {
    messages: Vec<Message>,
    extra: FxHashMap<String, Value>,
}

impl StateBuilder {
    fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_user_message(mut self, content: &str) -> Self {
        self.messages.push(Message::user(content));
        self
    }

    #[must_use]
    pub fn with_assistant_message(mut self, content: &str) -> Self {
        self.messages.push(Message::assistant(content));
        self
    }

    #[must_use]
    pub fn with_system_message(mut self, content: &str) -> Self {
        self.messages.push(Message::system(content));
        self
    }

    #[must_use]
    pub fn with_message(mut self, role: &str, content: &str) -> Self {
        self.messages.push(Message::new(role, content));
        self
    }

    #[must_use]
    pub fn with_extra(mut self, key: &str, value: Value) -> Self {
        self.extra.insert(key.to_string(), value);
        self
    }

    #[must_use]
    pub fn build(self) -> State {
        let mut initial = FxHashMap::default();
        if !self.messages.is_empty() {
            initial.insert(
                MESSAGES_KEY.to_string(),
                serde_json::to_value(self.messages).expect("Message serializes"),
            );
        }
        if !self.extra.is_empty() {
            initial.insert(
                EXTRA_KEY.to_string(),
                Value::Object(self.extra.into_iter().collect()),
            );
        }
        State::with_initial(default_schema(), initial)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_with_user_message_seeds_messages_channel() {
        let state = State::new_with_user_message("hi");
        let snap = state.snapshot();
        assert_eq!(snap.messages(), vec![Message::user("hi")]);
        assert_eq!(snap.version(MESSAGES_KEY), 1);
        assert!(snap.extra().is_empty());
    }

    #[test]
    fn builder_combines_messages_and_extra() {
        let state = State::builder()
            .with_user_message("hello")
            .with_assistant_message("hi there")
            .with_extra("session_id", Value::String("s1".into()))
            .build();
        let snap = state.snapshot();
        assert_eq!(snap.messages().len(), 2);
        assert_eq!(snap.extra().len(), 1);
    }

    #[test]
    fn apply_writes_bumps_versions_for_every_targeted_key() {
        let mut state = State::new_with_user_message("hi");
        let writes = FxHashMap::from_iter([(
            MESSAGES_KEY.to_string(),
            serde_json::to_value(vec![Message::assistant("ack")]).unwrap(),
        )]);
        let bumped = state.apply_writes(writes);
        assert_eq!(bumped, vec![MESSAGES_KEY.to_string()]);
        assert_eq!(state.snapshot().version(MESSAGES_KEY), 2);
    }

    #[test]
    fn apply_writes_bumps_version_even_when_the_reduced_value_is_unchanged() {
        let mut state = State::builder().with_extra("status", Value::String("ready".into())).build();
        assert_eq!(state.snapshot().version(EXTRA_KEY), 1);
        let writes = FxHashMap::from_iter([(
            EXTRA_KEY.to_string(),
            {
                let mut map = serde_json::Map::new();
                map.insert("status".to_string(), Value::String("ready".into()));
                Value::Object(map)
            },
        )]);
        let bumped = state.apply_writes(writes);
        assert_eq!(bumped, vec![EXTRA_KEY.to_string()]);
        assert_eq!(state.snapshot().version(EXTRA_KEY), 2);
    }
}
