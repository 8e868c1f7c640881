use super::Reducer;
use serde_json::Value;

/// Replaces the current value wholesale. The default reducer for any key
/// with no schema entry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Overwrite;

impl Reducer for Overwrite {
    fn reduce(&self, _current: Option<&Value>, update: Value) -> Value {
        update
    }
}
