use rustc_hash::FxHashMap;
use serde_json::Value;
use tracing::instrument;

use super::Channel;
use crate::schema::StateSchema;

/// Read-only view of a channel's value and version, returned by
/// [`ChannelManager::snapshot`]. Cloned independently of the live manager so
/// nodes can hold it across an `await` point.
#[derive(Clone, Debug, Default)]
pub struct ChannelSnapshot {
    pub values: FxHashMap<String, Value>,
    pub versions: FxHashMap<String, u64>,
}

impl ChannelSnapshot {
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    #[must_use]
    pub fn version(&self, key: &str) -> u64 {
        self.versions.get(key).copied().unwrap_or(0)
    }
}

/// Owns the live set of channels for one execution session.
///
/// Channels are created lazily on first write or first explicit
/// [`ChannelManager::ensure`] call, using the reducer and default declared
/// in the attached [`StateSchema`] (or [`crate::reducers::Overwrite`] with
/// no default for an unregistered key).
#[derive(Clone, Debug, Default)]
pub struct ChannelManager {
    channels: FxHashMap<String, Channel>,
}

impl ChannelManager {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds the manager from an initial state map, materializing a channel
    /// per key (and per required schema key with a default factory).
    #[must_use]
    pub fn seed(schema: &StateSchema, initial: FxHashMap<String, Value>) -> Self {
        let mut manager = Self::new();
        for key in schema.required_keys() {
            manager.ensure(schema, key);
        }
        for (key, value) in initial {
            manager.ensure(schema, &key);
            if let Some(channel) = manager.channels.get_mut(&key) {
                channel.value = Some(value);
                channel.version = 1;
            }
        }
        manager
    }

    fn ensure(&mut self, schema: &StateSchema, key: &str) {
        if self.channels.contains_key(key) {
            return;
        }
        let spec = schema.field(key);
        let mut channel = Channel::new(key.to_string(), spec.behavior, spec.reducer);
        if let Some(factory) = spec.default_factory {
            channel.value = Some(factory());
        }
        self.channels.insert(key.to_string(), channel);
    }

    /// Applies one step's worth of writes, keyed by channel name, returning
    /// the set of channel names that received a write (every targeted
    /// channel bumps its version, per §8's "equality iff no write targeted
    /// it" invariant — even a write that reduces to the same value counts).
    #[instrument(skip(self, schema, writes))]
    pub fn apply_writes(
        &mut self,
        schema: &StateSchema,
        writes: FxHashMap<String, Value>,
    ) -> Vec<String> {
        let mut bumped = Vec::new();
        for (key, value) in writes {
            self.ensure(schema, &key);
            if let Some(channel) = self.channels.get_mut(&key) {
                channel.apply_write(value);
                bumped.push(key);
            }
        }
        bumped
    }

    /// Clears ephemeral and topic channels; called once per superstep after
    /// the barrier has been observed by the checkpoint and event stream.
    pub fn end_step(&mut self) {
        for channel in self.channels.values_mut() {
            channel.clear_transient();
        }
    }

    #[must_use]
    pub fn snapshot(&self) -> ChannelSnapshot {
        let mut snap = ChannelSnapshot::default();
        for (key, channel) in &self.channels {
            if let Some(value) = &channel.value {
                snap.values.insert(key.clone(), value.clone());
            }
            snap.versions.insert(key.clone(), channel.version);
        }
        snap
    }

    /// Restores a manager from a persisted snapshot, re-attaching reducers
    /// from `schema` (reducers are never persisted; only the value/version
    /// pair is part of a checkpoint).
    #[must_use]
    pub fn restore(schema: &StateSchema, snapshot: &ChannelSnapshot) -> Self {
        let mut manager = Self::new();
        for (key, version) in &snapshot.versions {
            manager.ensure(schema, key);
            if let Some(channel) = manager.channels.get_mut(key) {
                channel.version = *version;
                channel.value = snapshot.values.get(key).cloned();
            }
        }
        manager
    }

    /// Channel names whose version exceeds the corresponding entry in
    /// `seen`, used to decide which nodes a trigger map wakes for the next
    /// superstep.
    #[must_use]
    pub fn updated_since(&self, seen: &FxHashMap<String, u64>) -> Vec<String> {
        self.channels
            .iter()
            .filter(|(name, channel)| channel.version > seen.get(*name).copied().unwrap_or(0))
            .map(|(name, _)| name.clone())
            .collect()
    }

    #[must_use]
    pub fn versions(&self) -> FxHashMap<String, u64> {
        self.channels
            .iter()
            .map(|(name, channel)| (name.clone(), channel.version))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reducers::{AppendList, Overwrite};
    use crate::schema::FieldSpec;
    use serde_json::json;
    use std::sync::Arc;

    fn schema() -> StateSchema {
        StateSchema::new()
            .with_field("log", FieldSpec::new(Arc::new(AppendList)))
            .with_field("status", FieldSpec::new(Arc::new(Overwrite)))
    }

    #[test]
    fn apply_writes_bumps_every_targeted_channel_even_on_an_unchanged_value() {
        let schema = schema();
        let mut manager = ChannelManager::new();
        let bumped = manager.apply_writes(
            &schema,
            FxHashMap::from_iter([("status".to_string(), json!("ready"))]),
        );
        assert_eq!(bumped, vec!["status".to_string()]);
        assert_eq!(manager.snapshot().version("status"), 1);

        let bumped = manager.apply_writes(
            &schema,
            FxHashMap::from_iter([("status".to_string(), json!("ready"))]),
        );
        assert_eq!(bumped, vec!["status".to_string()]);
        assert_eq!(manager.snapshot().version("status"), 2);
    }

    #[test]
    fn snapshot_and_restore_preserve_versions_and_values() {
        let schema = schema();
        let mut manager = ChannelManager::new();
        manager.apply_writes(
            &schema,
            FxHashMap::from_iter([("log".to_string(), json!(["a"]))]),
        );
        let snap = manager.snapshot();
        let restored = ChannelManager::restore(&schema, &snap);
        assert_eq!(restored.snapshot().values, snap.values);
        assert_eq!(restored.snapshot().versions, snap.versions);
    }

    #[test]
    fn topic_channel_clears_after_end_step_but_keeps_its_version() {
        let schema = StateSchema::new().with_field(
            "events",
            FieldSpec::new(Arc::new(AppendList)).with_behavior(super::super::ChannelBehavior::Topic),
        );
        let mut manager = ChannelManager::new();
        manager.apply_writes(
            &schema,
            FxHashMap::from_iter([("events".to_string(), json!("a"))]),
        );
        assert_eq!(manager.snapshot().get("events"), Some(&json!(["a"])));
        manager.end_step();
        assert_eq!(manager.snapshot().get("events"), None);
        assert_eq!(manager.snapshot().version("events"), 1);
    }
}
