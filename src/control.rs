//! Control-flow primitives emitted by nodes to influence subsequent scheduling.
//!
//! Frontier commands are kept separate from state updates so nodes can
//! express routing intent without mutating application state directly. The
//! barrier aggregates these directives in a deterministic order and the runner
//! reconciles them with unconditional / conditional edges.

use crate::types::NodeKind;

/// Route identifier used by frontier commands.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum NodeRoute {
    /// Route to another node in the graph, already resolved.
    Node(NodeKind),
    /// A `Command::GoTo` symbolic key, resolved against the originating
    /// node's `ends` map at the barrier (falling back to treating the key
    /// itself as a literal node id), per §4.4 step 3.
    Key(String),
}

impl NodeRoute {
    /// Resolves this route to a concrete [`NodeKind`], looking `from`'s
    /// `ends` map up in `graph` for [`NodeRoute::Key`].
    #[must_use]
    pub fn resolve(&self, graph: &crate::graph::Graph, from: &NodeKind) -> NodeKind {
        match self {
            NodeRoute::Node(kind) => kind.clone(),
            NodeRoute::Key(key) => graph.resolve_goto(from, key),
        }
    }
}

impl From<NodeKind> for NodeRoute {
    fn from(kind: NodeKind) -> Self {
        NodeRoute::Node(kind)
    }
}

impl From<&str> for NodeRoute {
    /// A bare branch key, resolved via the originating node's `ends` map
    /// (or taken verbatim as a node id) rather than a pre-resolved
    /// [`NodeKind`].
    fn from(key: &str) -> Self {
        NodeRoute::Key(key.to_string())
    }
}

/// Command emitted by a node to manipulate the next frontier.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FrontierCommand {
    /// Append additional routes to the existing frontier calculation.
    Append(Vec<NodeRoute>),
    /// Replace the default routes emitted for the node.
    Replace(Vec<NodeRoute>),
}
