use super::Reducer;
use serde_json::{Map, Value};

/// Shallow-merges two JSON objects, keys from `update` winning on conflict.
/// Ported from the teacher's `MapMerge`, generalized from `extra`-channel
/// dispatch to any object-valued key.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct MergeMap;

impl Reducer for MergeMap {
    fn reduce(&self, current: Option<&Value>, update: Value) -> Value {
        let mut merged = match current {
            Some(Value::Object(map)) => map.clone(),
            _ => Map::new(),
        };
        if let Value::Object(incoming) = update {
            for (k, v) in incoming {
                merged.insert(k, v);
            }
        }
        Value::Object(merged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn merges_and_overwrites_keys() {
        let r = MergeMap;
        let out = r.reduce(Some(&json!({"a": 1, "b": 2})), json!({"b": 3, "c": 4}));
        assert_eq!(out, json!({"a": 1, "b": 3, "c": 4}));
    }

    #[test]
    fn missing_current_starts_empty() {
        let r = MergeMap;
        assert_eq!(r.reduce(None, json!({"a": 1})), json!({"a": 1}));
    }
}
