//! Core identifiers shared across the engine: node ids and the error
//! category taxonomy surfaced to callers.
//!
//! These are the fundamental domain concepts that define what a graph *is*;
//! runtime execution types (lineage ids, step numbers) live in
//! [`crate::runtimes`] and [`crate::checkpoint`].

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifies a node within a compiled graph.
///
/// `__start__` and `__end__` are reserved virtual identifiers: `Start` seeds
/// the first superstep, `End` is a sink that stops the executor when written
/// to. Both are never registered with [`crate::graphs::GraphBuilder::add_node`].
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeKind {
    /// Virtual entry point; seeds the first superstep.
    Start,
    /// Virtual sink; writes to it stop the executor.
    End,
    /// A user-registered node, identified by a unique name.
    Custom(String),
}

impl NodeKind {
    pub const START_ID: &'static str = "__start__";
    pub const END_ID: &'static str = "__end__";

    /// Encode into the persisted string form used by checkpoints.
    #[must_use]
    pub fn encode(&self) -> String {
        match self {
            NodeKind::Start => Self::START_ID.to_string(),
            NodeKind::End => Self::END_ID.to_string(),
            NodeKind::Custom(s) => format!("Custom:{s}"),
        }
    }

    /// Decode a persisted string form, forward-compatibly treating unknown
    /// formats as custom node ids.
    #[must_use]
    pub fn decode(s: &str) -> Self {
        if s == Self::START_ID {
            NodeKind::Start
        } else if s == Self::END_ID {
            NodeKind::End
        } else if let Some(rest) = s.strip_prefix("Custom:") {
            NodeKind::Custom(rest.to_string())
        } else {
            NodeKind::Custom(s.to_string())
        }
    }

    #[must_use]
    pub fn is_start(&self) -> bool {
        matches!(self, Self::Start)
    }

    #[must_use]
    pub fn is_end(&self) -> bool {
        matches!(self, Self::End)
    }

    #[must_use]
    pub fn is_custom(&self) -> bool {
        matches!(self, Self::Custom(_))
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Start => write!(f, "{}", Self::START_ID),
            Self::End => write!(f, "{}", Self::END_ID),
            Self::Custom(name) => write!(f, "{name}"),
        }
    }
}

impl From<&str> for NodeKind {
    fn from(s: &str) -> Self {
        match s {
            Self::START_ID | "Start" => NodeKind::Start,
            Self::END_ID | "End" => NodeKind::End,
            other => NodeKind::Custom(other.to_string()),
        }
    }
}

impl From<String> for NodeKind {
    fn from(s: String) -> Self {
        NodeKind::from(s.as_str())
    }
}

/// Error category tags surfaced to callers in event payloads and
/// `NodeError`/`GraphCompileError` variants, per the error taxonomy in
/// the external-interfaces contract.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorCategory {
    GraphExecution,
    InvalidNode,
    InvalidState,
    InvalidEdge,
    ConditionalEdge,
    StateValidation,
    NodeExecution,
    CircularReference,
    Concurrency,
    Timeout,
    ModelGeneration,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::GraphExecution => "graph_execution",
            Self::InvalidNode => "invalid_node",
            Self::InvalidState => "invalid_state",
            Self::InvalidEdge => "invalid_edge",
            Self::ConditionalEdge => "conditional_edge",
            Self::StateValidation => "state_validation",
            Self::NodeExecution => "node_execution",
            Self::CircularReference => "circular_reference",
            Self::Concurrency => "concurrency",
            Self::Timeout => "timeout",
            Self::ModelGeneration => "model_generation",
        };
        write!(f, "{s}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nodekind_roundtrip() {
        let k = NodeKind::Custom("fetch".into());
        assert_eq!(NodeKind::decode(&k.encode()), k);
        assert_eq!(NodeKind::decode("__start__"), NodeKind::Start);
        assert_eq!(NodeKind::decode("__end__"), NodeKind::End);
        assert_eq!(
            NodeKind::decode("anything"),
            NodeKind::Custom("anything".into())
        );
    }

    #[test]
    fn nodekind_display_matches_reserved_ids() {
        assert_eq!(NodeKind::Start.to_string(), "__start__");
        assert_eq!(NodeKind::End.to_string(), "__end__");
    }
}
