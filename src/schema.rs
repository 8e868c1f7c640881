//! State schema: maps state keys to reducers, defaults, and requiredness.
//!
//! This is the generalization of the teacher's closed `ChannelType` enum
//! (`Message` / `Extra` / `Error`) into an open, user-defined key space, per
//! the data model's `StateSchema`. A key with no entry in the schema falls
//! back to [`crate::reducers::Overwrite`], matching "every registered key has
//! a non-nil reducer (default: overwrite)".

use rustc_hash::FxHashMap;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

use crate::channels::ChannelBehavior;
use crate::reducers::{Overwrite, Reducer};

/// Produces the default value for a key that has never been written.
pub type DefaultFactory = Arc<dyn Fn() -> Value + Send + Sync>;

/// Schema entry for a single state key.
#[derive(Clone)]
pub struct FieldSpec {
    pub reducer: Arc<dyn Reducer>,
    pub default_factory: Option<DefaultFactory>,
    pub required: bool,
    /// How the channel backing this key accumulates writes and what a
    /// barrier does to it once the step has observed it, per §3's Channel
    /// behavior taxonomy. `LastValue` (the default) never clears.
    pub behavior: ChannelBehavior,
}

impl fmt::Debug for FieldSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldSpec")
            .field("reducer", &self.reducer)
            .field("has_default", &self.default_factory.is_some())
            .field("required", &self.required)
            .field("behavior", &self.behavior)
            .finish()
    }
}

impl FieldSpec {
    #[must_use]
    pub fn new(reducer: Arc<dyn Reducer>) -> Self {
        Self {
            reducer,
            default_factory: None,
            required: false,
            behavior: ChannelBehavior::LastValue,
        }
    }

    #[must_use]
    pub fn with_default(mut self, factory: DefaultFactory) -> Self {
        self.default_factory = Some(factory);
        self
    }

    #[must_use]
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Declares this key's channel behavior (`Topic`, `BInOp`, `Ephemeral`);
    /// `LastValue` is the default and need not be set explicitly.
    #[must_use]
    pub fn with_behavior(mut self, behavior: ChannelBehavior) -> Self {
        self.behavior = behavior;
        self
    }
}

/// Thread-safe during construction (builder pattern, consumed before compile);
/// read-only once attached to a compiled graph.
#[derive(Clone, Default)]
pub struct StateSchema {
    fields: FxHashMap<String, FieldSpec>,
}

impl StateSchema {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a field. Overwrites any prior registration for `key`.
    #[must_use]
    pub fn with_field(mut self, key: impl Into<String>, spec: FieldSpec) -> Self {
        self.fields.insert(key.into(), spec);
        self
    }

    pub fn register(&mut self, key: impl Into<String>, spec: FieldSpec) -> &mut Self {
        self.fields.insert(key.into(), spec);
        self
    }

    /// Returns the field spec for `key`, or a synthesized overwrite-default
    /// spec if `key` was never registered.
    #[must_use]
    pub fn field(&self, key: &str) -> FieldSpec {
        self.fields
            .get(key)
            .cloned()
            .unwrap_or_else(|| FieldSpec::new(Arc::new(Overwrite)))
    }

    #[must_use]
    pub fn is_registered(&self, key: &str) -> bool {
        self.fields.contains_key(key)
    }

    /// Keys declared `required` that default-construct to nothing; used by
    /// the executor to validate the initial state merge.
    pub fn required_keys(&self) -> impl Iterator<Item = &str> {
        self.fields
            .iter()
            .filter(|(_, spec)| spec.required)
            .map(|(k, _)| k.as_str())
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(|k| k.as_str())
    }
}

impl fmt::Debug for StateSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateSchema")
            .field("fields", &self.fields.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reducers::AppendList;
    use serde_json::json;

    #[test]
    fn unregistered_key_defaults_to_overwrite() {
        let schema = StateSchema::new();
        let spec = schema.field("anything");
        assert_eq!(spec.reducer.reduce(Some(&json!(1)), json!(2)), json!(2));
    }

    #[test]
    fn registered_key_uses_configured_reducer_and_default() {
        let schema = StateSchema::new().with_field(
            "log",
            FieldSpec::new(Arc::new(AppendList)).with_default(Arc::new(|| json!([]))),
        );
        let spec = schema.field("log");
        assert_eq!((spec.default_factory.unwrap())(), json!([]));
        assert_eq!(
            spec.reducer.reduce(Some(&json!(["a"])), json!(["b"])),
            json!(["a", "b"])
        );
    }
}
