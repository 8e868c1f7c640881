//! Versioned channels: the unit of state the executor tracks, triggers
//! nodes from, and checkpoints.
//!
//! Generalizes the teacher's fixed `MessagesChannel`/`ExtrasChannel`/
//! `ErrorsChannel` (one Rust type per channel identity) into a single
//! `Channel` type parameterized by name and [`ChannelBehavior`], keyed by
//! name in a [`ChannelManager`]. `errors.rs` (`ErrorEvent`/`LadderError`)
//! is kept as-is; it is a payload shape, not a channel identity.

pub mod errors;
mod manager;
mod trigger;

pub use errors::{ErrorEvent, ErrorScope, LadderError};
pub use manager::{ChannelManager, ChannelSnapshot};
pub use trigger::TriggerMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

use crate::reducers::Reducer;

/// How a channel accumulates writes across supersteps, per the data model's
/// channel-behavior taxonomy.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChannelBehavior {
    /// Holds the most recent write; reads return the latest value only.
    LastValue,
    /// Accumulates every write made since the channel was last read, then
    /// clears (pub/sub style fan-in for the current step).
    Topic,
    /// Folds writes through a binary operator (the channel's reducer);
    /// equivalent to `LastValue` plus an explicit combine function.
    BInOp,
    /// Visible only during the step that wrote it; cleared at the next
    /// barrier regardless of whether it was read.
    Ephemeral,
}

/// A single named, versioned slot of state.
///
/// `value` is `None` until the first write (or until a schema default is
/// materialized by the owning [`ChannelManager`]). `version` starts at 0
/// and increments once per superstep in which the channel receives at
/// least one write, regardless of whether the reduced result differs from
/// the prior value (§8: version is non-decreasing, with equality iff no
/// write targeted the channel).
#[derive(Clone, Debug)]
pub struct Channel {
    pub name: String,
    pub behavior: ChannelBehavior,
    pub value: Option<Value>,
    pub version: u64,
    reducer: Arc<dyn Reducer>,
}

impl Channel {
    #[must_use]
    pub fn new(name: impl Into<String>, behavior: ChannelBehavior, reducer: Arc<dyn Reducer>) -> Self {
        Self {
            name: name.into(),
            behavior,
            value: None,
            version: 0,
            reducer,
        }
    }

    /// Folds `update` into the channel's value via its reducer and bumps
    /// `version`, unconditionally: a write always counts, even one that
    /// reduces back to the same value (e.g. a node re-asserting an
    /// unchanged `Overwrite` field).
    pub fn apply_write(&mut self, update: Value) {
        let reduced = self.reducer.reduce(self.value.as_ref(), update);
        self.value = Some(reduced);
        self.version += 1;
    }

    /// Clears an [`ChannelBehavior::Ephemeral`] or [`ChannelBehavior::Topic`]
    /// channel's value after it has been observed for the current step.
    pub fn clear_transient(&mut self) {
        if matches!(self.behavior, ChannelBehavior::Ephemeral | ChannelBehavior::Topic) {
            self.value = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reducers::Overwrite;
    use serde_json::json;

    #[test]
    fn version_bumps_on_every_write_even_an_unchanged_value() {
        let mut ch = Channel::new("k", ChannelBehavior::LastValue, Arc::new(Overwrite));
        ch.apply_write(json!(1));
        assert_eq!(ch.version, 1);
        ch.apply_write(json!(1));
        assert_eq!(ch.version, 2);
        ch.apply_write(json!(2));
        assert_eq!(ch.version, 3);
    }

    #[test]
    fn ephemeral_clears_after_step() {
        let mut ch = Channel::new("tmp", ChannelBehavior::Ephemeral, Arc::new(Overwrite));
        ch.apply_write(json!("x"));
        assert_eq!(ch.value, Some(json!("x")));
        ch.clear_transient();
        assert_eq!(ch.value, None);
    }
}
