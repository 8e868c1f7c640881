use super::Reducer;
use serde_json::Value;

/// Appends to a JSON array. `update` may itself be an array (its elements
/// are appended individually) or a single scalar/object (appended as one
/// element). A non-array `current` is treated as an empty list.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct AppendList;

impl Reducer for AppendList {
    fn reduce(&self, current: Option<&Value>, update: Value) -> Value {
        let mut list = match current {
            Some(Value::Array(items)) => items.clone(),
            _ => Vec::new(),
        };
        match update {
            Value::Array(items) => list.extend(items),
            other => list.push(other),
        }
        Value::Array(list)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn appends_single_value() {
        let r = AppendList;
        let out = r.reduce(Some(&json!(["a"])), json!("b"));
        assert_eq!(out, json!(["a", "b"]));
    }

    #[test]
    fn appends_array_elements_individually() {
        let r = AppendList;
        let out = r.reduce(Some(&json!(["a"])), json!(["b", "c"]));
        assert_eq!(out, json!(["a", "b", "c"]));
    }

    #[test]
    fn missing_current_starts_fresh() {
        let r = AppendList;
        assert_eq!(r.reduce(None, json!("first")), json!(["first"]));
    }
}
