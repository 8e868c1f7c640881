//! Reducers fold a node's write for one state key into the key's current
//! value. Every registered key has exactly one reducer (via
//! [`crate::schema::StateSchema`]); unregistered keys fall back to
//! [`Overwrite`].
//!
//! This generalizes the teacher's fixed `ReducerRegistry` (dispatch keyed on
//! a closed `ChannelType` enum, with each reducer mutating `VersionedState`
//! directly) into a pure, channel-name-agnostic function over
//! `serde_json::Value`, so schema authors can attach any reducer to any key.

mod append_list;
mod merge_map;
mod messages;
mod overwrite;

pub use append_list::AppendList;
pub use merge_map::MergeMap;
pub use messages::{MessageOp, Messages};
pub use overwrite::Overwrite;

use serde_json::Value;
use std::fmt;

/// Folds an incoming write into a key's current value.
///
/// `current` is `None` the first time a key is written (no default applied
/// yet, or the default was never materialized). Implementations must be
/// pure and side-effect free; the executor may call `reduce` speculatively
/// during retries.
pub trait Reducer: Send + Sync + fmt::Debug {
    fn reduce(&self, current: Option<&Value>, update: Value) -> Value;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn overwrite_ignores_current() {
        let r = Overwrite;
        assert_eq!(r.reduce(Some(&json!("old")), json!("new")), json!("new"));
        assert_eq!(r.reduce(None, json!("new")), json!("new"));
    }
}
