use super::Reducer;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::message::Message;

/// A single ordered operation applied to a message list.
///
/// `update` values that are a bare JSON array are treated as an implicit
/// `vec![MessageOp::Append(..)]` for ergonomics, matching how node authors
/// write `NodePartial` updates most of the time; the tagged form is for
/// nodes that need to replace or truncate history.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum MessageOp {
    /// Appends `messages` to the end of the list.
    Append { messages: Vec<Message> },
    /// Replaces the most recent message with role `user`, if any; otherwise
    /// appends.
    ReplaceLastUser { message: Message },
    /// Clears the list.
    RemoveAll,
}

/// Reduces ordered message operations over a `Vec<Message>`-shaped value.
/// Ported from the teacher's `AddMessages` channel dispatch, generalized to
/// accept either a raw append array or a sequence of tagged ops.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Messages;

impl Messages {
    fn current_list(current: Option<&Value>) -> Vec<Message> {
        current
            .and_then(|v| serde_json::from_value::<Vec<Message>>(v.clone()).ok())
            .unwrap_or_default()
    }

    fn apply_op(list: &mut Vec<Message>, op: MessageOp) {
        match op {
            MessageOp::Append { mut messages } => list.append(&mut messages),
            MessageOp::ReplaceLastUser { message } => {
                if let Some(pos) = list.iter().rposition(|m| m.has_role(Message::USER)) {
                    list[pos] = message;
                } else {
                    list.push(message);
                }
            }
            MessageOp::RemoveAll => list.clear(),
        }
    }
}

impl Reducer for Messages {
    fn reduce(&self, current: Option<&Value>, update: Value) -> Value {
        let mut list = Self::current_list(current);

        let ops: Vec<MessageOp> = match update {
            Value::Array(items) => {
                if let Ok(messages) = serde_json::from_value::<Vec<Message>>(Value::Array(items))
                {
                    vec![MessageOp::Append { messages }]
                } else {
                    Vec::new()
                }
            }
            other => serde_json::from_value::<Vec<MessageOp>>(other.clone())
                .or_else(|_| serde_json::from_value::<MessageOp>(other).map(|op| vec![op]))
                .unwrap_or_default(),
        };

        for op in ops {
            Self::apply_op(&mut list, op);
        }

        serde_json::to_value(list).unwrap_or(Value::Array(Vec::new()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn raw_array_update_appends() {
        let r = Messages;
        let current = serde_json::to_value(vec![Message::user("hi")]).unwrap();
        let update = serde_json::to_value(vec![Message::assistant("hello")]).unwrap();
        let out = r.reduce(Some(&current), update);
        let list: Vec<Message> = serde_json::from_value(out).unwrap();
        assert_eq!(list, vec![Message::user("hi"), Message::assistant("hello")]);
    }

    #[test]
    fn replace_last_user_replaces_most_recent_user_message() {
        let r = Messages;
        let current = serde_json::to_value(vec![
            Message::user("first"),
            Message::assistant("ack"),
            Message::user("second"),
        ])
        .unwrap();
        let update = json!([{"op": "replace_last_user", "message": {"role": "user", "content": "edited"}}]);
        let out = r.reduce(Some(&current), update);
        let list: Vec<Message> = serde_json::from_value(out).unwrap();
        assert_eq!(
            list,
            vec![
                Message::user("first"),
                Message::assistant("ack"),
                Message::user("edited"),
            ]
        );
    }

    #[test]
    fn remove_all_clears_the_list() {
        let r = Messages;
        let current = serde_json::to_value(vec![Message::user("hi")]).unwrap();
        let update = json!([{"op": "remove_all"}]);
        let out = r.reduce(Some(&current), update);
        let list: Vec<Message> = serde_json::from_value(out).unwrap();
        assert!(list.is_empty());
    }

    #[test]
    fn missing_current_starts_empty() {
        let r = Messages;
        let update = serde_json::to_value(vec![Message::system("boot")]).unwrap();
        let out = r.reduce(None, update);
        let list: Vec<Message> = serde_json::from_value(out).unwrap();
        assert_eq!(list, vec![Message::system("boot")]);
    }
}
