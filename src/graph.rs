//! The compiled graph: an immutable table of nodes, edges, conditional
//! edges, and the channel/trigger declarations they imply.
//!
//! Generalizes the teacher's now-removed `graphs::builder::GraphBuilder`
//! (which hard-coded a three-channel `VersionedState` and a closed
//! `ChannelType` registry) into the data model's graph: nodes keyed by
//! [`NodeKind`], routed by unconditional edges, conditional edges with a
//! `condFn(state) -> key` plus an optional path map, and a [`TriggerMap`]
//! for nodes woken by channel subscription rather than an explicit edge.
//! Per spec's Non-goal on builder ergonomics, the surface here is kept to
//! the documented shape — no DSL macros, no YAML loader.

use std::fmt;
use std::sync::Arc;

use miette::Diagnostic;
use rustc_hash::FxHashMap;
use thiserror::Error;
use tracing::instrument;

use crate::channels::TriggerMap;
use crate::node::{AfterNodeHook, BeforeNodeHook, Node, NodeHooks, OnErrorNodeHook};
use crate::retry::RetryPolicy;
use crate::runtimes::RuntimeConfig;
use crate::schema::{FieldSpec, StateSchema};
use crate::state::StateSnapshot;
use crate::types::NodeKind;

/// `condFn(state) -> key`, evaluated against the node's snapshot to pick a
/// branch. The returned key is looked up in the conditional edge's path map,
/// falling back to the originating node's `ends` map.
pub type EdgePredicate = Arc<dyn Fn(&StateSnapshot) -> String + Send + Sync>;

/// A dynamically routed edge: `from -> (condition, path_map)`.
#[derive(Clone)]
pub struct ConditionalEdge {
    pub from: NodeKind,
    pub condition: EdgePredicate,
    /// Maps a branch key to a target node. Falls back to the originating
    /// node's `ends` map (registered via
    /// [`GraphBuilder::add_node_with_ends`]) when a key has no entry here.
    pub path_map: Option<FxHashMap<String, NodeKind>>,
}

impl fmt::Debug for ConditionalEdge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConditionalEdge")
            .field("from", &self.from)
            .field("path_map", &self.path_map)
            .finish_non_exhaustive()
    }
}

/// Validation failures raised by [`GraphBuilder::compile`].
#[derive(Debug, Error, Diagnostic)]
pub enum GraphCompileError {
    #[error("graph has no entry point: no edge registered from __start__")]
    #[diagnostic(code(pregelflow::graph::no_entry_point))]
    NoEntryPoint,

    #[error("edge target {to} (from {from}) is not a registered node")]
    #[diagnostic(code(pregelflow::graph::unknown_edge_target))]
    UnknownEdgeTarget { from: NodeKind, to: NodeKind },

    #[error("conditional edge from {from} routes key {key:?} to unregistered node {to}")]
    #[diagnostic(code(pregelflow::graph::unknown_conditional_target))]
    UnknownConditionalTarget {
        from: NodeKind,
        key: String,
        to: NodeKind,
    },

    #[error("node {id} registered more than once")]
    #[diagnostic(code(pregelflow::graph::duplicate_node))]
    DuplicateNode { id: NodeKind },

    #[error("graph has no registered nodes")]
    #[diagnostic(code(pregelflow::graph::empty))]
    EmptyGraph,
}

/// Immutable, compiled graph: the only form execution ever sees.
///
/// Read-only lookups for nodes, edges, conditional edges, entry points,
/// the schema, and the trigger map, exactly as the data model's "Graph
/// (Compiled)" component specifies.
#[derive(Clone)]
pub struct Graph {
    nodes: FxHashMap<NodeKind, Arc<dyn Node>>,
    edges: FxHashMap<NodeKind, Vec<NodeKind>>,
    conditional_edges: Vec<ConditionalEdge>,
    /// Branch-key routing declared per node, consulted when a conditional
    /// edge's own path map has no entry for the computed key.
    node_ends: FxHashMap<NodeKind, FxHashMap<String, NodeKind>>,
    node_hooks: FxHashMap<NodeKind, NodeHooks>,
    /// Per-node retry policy override; nodes absent here run under the
    /// executor's default policy, per §4.6.
    node_retry: FxHashMap<NodeKind, RetryPolicy>,
    schema: StateSchema,
    trigger_map: TriggerMap,
    runtime_config: RuntimeConfig,
}

impl fmt::Debug for Graph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Graph")
            .field("nodes", &self.nodes.keys().collect::<Vec<_>>())
            .field("edges", &self.edges)
            .field("conditional_edges", &self.conditional_edges.len())
            .finish()
    }
}

impl Graph {
    #[must_use]
    pub fn nodes(&self) -> &FxHashMap<NodeKind, Arc<dyn Node>> {
        &self.nodes
    }

    #[must_use]
    pub fn node(&self, id: &NodeKind) -> Option<&Arc<dyn Node>> {
        self.nodes.get(id)
    }

    #[must_use]
    pub fn edges(&self) -> &FxHashMap<NodeKind, Vec<NodeKind>> {
        &self.edges
    }

    #[must_use]
    pub fn edges_from(&self, id: &NodeKind) -> &[NodeKind] {
        self.edges.get(id).map(Vec::as_slice).unwrap_or_default()
    }

    /// Converts the unconditional edge table into a `petgraph::DiGraph`.
    /// Conditional-edge targets are not represented since they depend on
    /// runtime branch resolution.
    #[cfg(feature = "petgraph-compat")]
    #[must_use]
    pub fn to_petgraph(&self) -> crate::petgraph_compat::PetgraphConversion {
        crate::petgraph_compat::to_petgraph(&self.edges)
    }

    /// Renders the unconditional edge table as a DOT digraph.
    #[cfg(feature = "petgraph-compat")]
    #[must_use]
    pub fn to_dot(&self) -> String {
        crate::petgraph_compat::to_dot(&self.edges)
    }

    #[must_use]
    pub fn conditional_edges(&self) -> &[ConditionalEdge] {
        &self.conditional_edges
    }

    #[must_use]
    pub fn conditional_edges_from(&self, id: &NodeKind) -> Vec<&ConditionalEdge> {
        self.conditional_edges
            .iter()
            .filter(|edge| &edge.from == id)
            .collect()
    }

    /// Resolves a branch `key` produced by a node's conditional edge into a
    /// target node: the edge's own path map first, then the node's `ends`.
    #[must_use]
    pub fn resolve_branch(&self, edge: &ConditionalEdge, key: &str) -> Option<NodeKind> {
        edge.path_map
            .as_ref()
            .and_then(|map| map.get(key))
            .or_else(|| self.node_ends.get(&edge.from).and_then(|ends| ends.get(key)))
            .cloned()
    }

    /// Resolves a `Command::GoTo` branch key via the node's `ends`, falling
    /// back to treating the key as a literal node id (per spec: "taken
    /// verbatim as a node id" when no mapping exists).
    #[must_use]
    pub fn resolve_goto(&self, from: &NodeKind, key: &str) -> NodeKind {
        self.node_ends
            .get(from)
            .and_then(|ends| ends.get(key))
            .cloned()
            .unwrap_or_else(|| NodeKind::from(key))
    }

    /// Entry-point nodes: the targets of every edge declared from
    /// [`NodeKind::Start`].
    #[must_use]
    pub fn entry_nodes(&self) -> &[NodeKind] {
        self.edges_from(&NodeKind::Start)
    }

    #[must_use]
    pub fn schema(&self) -> &StateSchema {
        &self.schema
    }

    #[must_use]
    pub fn trigger_map(&self) -> &TriggerMap {
        &self.trigger_map
    }

    #[must_use]
    pub fn runtime_config(&self) -> &RuntimeConfig {
        &self.runtime_config
    }

    #[must_use]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    #[must_use]
    pub fn is_registered(&self, id: &NodeKind) -> bool {
        matches!(id, NodeKind::End) || self.nodes.contains_key(id)
    }

    #[must_use]
    pub fn hooks_for(&self, id: &NodeKind) -> Option<&NodeHooks> {
        self.node_hooks.get(id)
    }

    /// The retry policy registered for `id` via
    /// [`GraphBuilder::with_retry_policy`], if any. Falls back to the
    /// executor's default policy when absent.
    #[must_use]
    pub fn retry_policy_for(&self, id: &NodeKind) -> Option<&RetryPolicy> {
        self.node_retry.get(id)
    }
}

/// Builds a [`Graph`]. Per spec's Non-goal on builder ergonomics, this
/// exposes exactly the documented shape: `add_node`, `add_edge`,
/// `add_conditional_edge`, entry/finish points, schema/trigger
/// registration, and `compile()`.
#[derive(Default)]
pub struct GraphBuilder {
    nodes: FxHashMap<NodeKind, Arc<dyn Node>>,
    edges: FxHashMap<NodeKind, Vec<NodeKind>>,
    conditional_edges: Vec<ConditionalEdge>,
    node_ends: FxHashMap<NodeKind, FxHashMap<String, NodeKind>>,
    node_hooks: FxHashMap<NodeKind, NodeHooks>,
    node_retry: FxHashMap<NodeKind, RetryPolicy>,
    schema: StateSchema,
    trigger_map: TriggerMap,
    runtime_config: RuntimeConfig,
}

impl GraphBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self {
            schema: crate::state::default_schema(),
            ..Self::default()
        }
    }

    /// Registers a node under `id`. `id` must not be [`NodeKind::Start`] or
    /// [`NodeKind::End`] — those are virtual and never run.
    #[must_use]
    pub fn add_node(mut self, id: NodeKind, node: impl Node + 'static) -> Self {
        if matches!(id, NodeKind::Start | NodeKind::End) {
            tracing::warn!(?id, "ignoring attempt to register a virtual node id");
            return self;
        }
        self.nodes.insert(id, Arc::new(node));
        self
    }

    /// Registers a node along with its `ends` map: branch keys a
    /// `Command::GoTo` or conditional edge from this node may resolve to.
    #[must_use]
    pub fn add_node_with_ends(
        mut self,
        id: NodeKind,
        node: impl Node + 'static,
        ends: FxHashMap<String, NodeKind>,
    ) -> Self {
        self.node_ends.insert(id.clone(), ends);
        self.add_node(id, node)
    }

    /// Appends a before-node hook, run in registration order ahead of
    /// `node`'s body; the first one to return `Some` short-circuits it.
    #[must_use]
    pub fn with_before_hook(mut self, id: NodeKind, hook: BeforeNodeHook) -> Self {
        self.node_hooks.entry(id).or_default().before.push(hook);
        self
    }

    /// Appends an after-node hook, run in registration order once `node`'s
    /// body (or a before-hook short-circuit) succeeds.
    #[must_use]
    pub fn with_after_hook(mut self, id: NodeKind, hook: AfterNodeHook) -> Self {
        self.node_hooks.entry(id).or_default().after.push(hook);
        self
    }

    /// Appends an on-error hook, notified (observationally) when `node`
    /// fails after exhausting its retry policy.
    #[must_use]
    pub fn with_error_hook(mut self, id: NodeKind, hook: OnErrorNodeHook) -> Self {
        self.node_hooks.entry(id).or_default().on_error.push(hook);
        self
    }

    /// Overrides the executor-default retry policy for `id`, per §4.6.
    #[must_use]
    pub fn with_retry_policy(mut self, id: NodeKind, policy: RetryPolicy) -> Self {
        self.node_retry.insert(id, policy);
        self
    }

    #[must_use]
    pub fn add_edge(mut self, from: NodeKind, to: NodeKind) -> Self {
        self.edges.entry(from).or_default().push(to);
        self
    }

    #[must_use]
    pub fn add_conditional_edge(
        mut self,
        from: NodeKind,
        condition: EdgePredicate,
        path_map: Option<FxHashMap<String, NodeKind>>,
    ) -> Self {
        self.conditional_edges.push(ConditionalEdge {
            from,
            condition,
            path_map,
        });
        self
    }

    /// Convenience for `add_edge(Start, id)`.
    #[must_use]
    pub fn set_entry_point(self, id: NodeKind) -> Self {
        self.add_edge(NodeKind::Start, id)
    }

    /// Convenience for `add_edge(id, End)`.
    #[must_use]
    pub fn set_finish_point(self, id: NodeKind) -> Self {
        self.add_edge(id, NodeKind::End)
    }

    #[must_use]
    pub fn with_schema_field(mut self, key: impl Into<String>, spec: FieldSpec) -> Self {
        self.schema = self.schema.with_field(key, spec);
        self
    }

    /// Registers a channel-subscription wakeup: `node` reruns whenever
    /// `channel`'s version advances, even with no explicit edge into it.
    #[must_use]
    pub fn with_trigger(mut self, channel: impl Into<String>, node: NodeKind) -> Self {
        self.trigger_map.subscribe(channel, node);
        self
    }

    #[must_use]
    pub fn with_runtime_config(mut self, config: RuntimeConfig) -> Self {
        self.runtime_config = config;
        self
    }

    #[must_use]
    pub fn nodes_ref(&self) -> &FxHashMap<NodeKind, Arc<dyn Node>> {
        &self.nodes
    }

    #[must_use]
    pub fn edges_ref(&self) -> &FxHashMap<NodeKind, Vec<NodeKind>> {
        &self.edges
    }

    /// Validates and freezes the graph.
    ///
    /// Checks: an entry point exists; every unconditional edge target is a
    /// registered node or `__end__`; every conditional-edge path-map and
    /// node-`ends` target is a registered node or `__end__`.
    #[instrument(skip(self), err)]
    pub fn compile(self) -> Result<Graph, GraphCompileError> {
        if self.nodes.is_empty() {
            return Err(GraphCompileError::EmptyGraph);
        }

        if self.edges.get(&NodeKind::Start).map(Vec::is_empty).unwrap_or(true) {
            return Err(GraphCompileError::NoEntryPoint);
        }

        for (from, targets) in &self.edges {
            for to in targets {
                if !matches!(to, NodeKind::End) && !self.nodes.contains_key(to) {
                    return Err(GraphCompileError::UnknownEdgeTarget {
                        from: from.clone(),
                        to: to.clone(),
                    });
                }
            }
        }

        for edge in &self.conditional_edges {
            if let Some(path_map) = &edge.path_map {
                for (key, to) in path_map {
                    if !matches!(to, NodeKind::End) && !self.nodes.contains_key(to) {
                        return Err(GraphCompileError::UnknownConditionalTarget {
                            from: edge.from.clone(),
                            key: key.clone(),
                            to: to.clone(),
                        });
                    }
                }
            }
        }

        for (from, ends) in &self.node_ends {
            for (key, to) in ends {
                if !matches!(to, NodeKind::End) && !self.nodes.contains_key(to) {
                    return Err(GraphCompileError::UnknownConditionalTarget {
                        from: from.clone(),
                        key: key.clone(),
                        to: to.clone(),
                    });
                }
            }
        }

        Ok(Graph {
            nodes: self.nodes,
            edges: self.edges,
            conditional_edges: self.conditional_edges,
            node_ends: self.node_ends,
            node_hooks: self.node_hooks,
            node_retry: self.node_retry,
            schema: self.schema,
            trigger_map: self.trigger_map,
            runtime_config: self.runtime_config,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::{NodeContext, NodeError, NodePartial};
    use async_trait::async_trait;

    struct NoOp;

    #[async_trait]
    impl Node for NoOp {
        async fn run(&self, _: StateSnapshot, _: NodeContext) -> Result<NodePartial, NodeError> {
            Ok(NodePartial::default())
        }
    }

    #[test]
    fn compile_fails_without_entry_point() {
        let err = GraphBuilder::new()
            .add_node(NodeKind::Custom("a".into()), NoOp)
            .compile()
            .unwrap_err();
        assert!(matches!(err, GraphCompileError::NoEntryPoint));
    }

    #[test]
    fn compile_fails_on_unknown_edge_target() {
        let err = GraphBuilder::new()
            .add_node(NodeKind::Custom("a".into()), NoOp)
            .set_entry_point(NodeKind::Custom("a".into()))
            .add_edge(NodeKind::Custom("a".into()), NodeKind::Custom("ghost".into()))
            .compile()
            .unwrap_err();
        assert!(matches!(err, GraphCompileError::UnknownEdgeTarget { .. }));
    }

    #[test]
    fn compile_succeeds_for_a_linear_graph() {
        let graph = GraphBuilder::new()
            .add_node(NodeKind::Custom("a".into()), NoOp)
            .add_node(NodeKind::Custom("b".into()), NoOp)
            .set_entry_point(NodeKind::Custom("a".into()))
            .add_edge(NodeKind::Custom("a".into()), NodeKind::Custom("b".into()))
            .set_finish_point(NodeKind::Custom("b".into()))
            .compile()
            .unwrap();
        assert_eq!(graph.entry_nodes(), &[NodeKind::Custom("a".into())]);
        assert_eq!(graph.node_count(), 2);
    }

    #[test]
    fn conditional_edge_falls_back_to_node_ends() {
        let mut ends = FxHashMap::default();
        ends.insert("go".to_string(), NodeKind::Custom("b".into()));
        let graph = GraphBuilder::new()
            .add_node_with_ends(NodeKind::Custom("a".into()), NoOp, ends)
            .add_node(NodeKind::Custom("b".into()), NoOp)
            .set_entry_point(NodeKind::Custom("a".into()))
            .add_conditional_edge(
                NodeKind::Custom("a".into()),
                Arc::new(|_state| "go".to_string()),
                None,
            )
            .compile()
            .unwrap();
        let edge = &graph.conditional_edges()[0];
        assert_eq!(
            graph.resolve_branch(edge, "go"),
            Some(NodeKind::Custom("b".into()))
        );
    }
}
