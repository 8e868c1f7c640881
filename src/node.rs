//! Node execution framework for the Weavegraph workflow system.
//!
//! This module provides the core abstractions for executable workflow nodes,
//! including the [`Node`] trait, execution context, state updates, and error handling.

// Standard library and external crates
use async_trait::async_trait;
use miette::Diagnostic;
use rustc_hash::FxHashMap;
use serde_json;
use thiserror::Error;

// Internal crate modules
use crate::channels::errors::ErrorEvent;
use crate::control::{FrontierCommand, NodeRoute};
use crate::event_bus::{Event, EventEmitter, LLMStreamingEvent};
use crate::interrupt::{self, InterruptResolution, USED_INTERRUPTS_KEY};
use crate::message::Message;
use crate::state::{EXTRA_KEY, ERRORS_KEY, MESSAGES_KEY, StateSnapshot};
use crate::types::NodeKind;
use std::sync::Arc;

// ============================================================================
// Core Trait
// ============================================================================

/// Core trait defining executable workflow nodes.
///
/// The `Node` trait represents a single unit of computation within a workflow.
/// Nodes receive the current state snapshot and execution context, perform
/// their work, and return partial state updates.
///
/// # Design Principles
///
/// - **Stateless**: Nodes should be stateless and deterministic
/// - **Focused**: Each node should have a single, well-defined responsibility
/// - **Composable**: Nodes should be easily combined into larger workflows
/// - **Observable**: Use the context to emit events for monitoring and debugging
///
/// # Error Handling
///
/// Nodes can handle errors in two ways:
/// 1. **Fatal errors**: Return `Err(NodeError)` to stop workflow execution
/// 2. **Recoverable errors**: Add to `NodePartial.errors` and return `Ok`
///
/// # Examples
///
/// ```rust,no_run
/// use pregelflow::node::{Node, NodeContext, NodePartial, NodeError};
/// use pregelflow::state::StateSnapshot;
/// use pregelflow::channels::errors::{ErrorEvent, LadderError};
/// use async_trait::async_trait;
///
/// struct ValidationNode {
///     required_fields: Vec<String>,
/// }
///
/// #[async_trait]
/// impl Node for ValidationNode {
///     async fn run(&self, snapshot: StateSnapshot, ctx: NodeContext) -> Result<NodePartial, NodeError> {
///         ctx.emit("validation", "Starting validation")?;
///
///         for field in &self.required_fields {
///             if !snapshot.extra().contains_key(field) {
///                 return Err(NodeError::ValidationFailed(format!("Missing field: {}", field)));
///             }
///         }
///
///         // Demonstrate the fluent API for success with warnings
///         if snapshot.messages().is_empty() {
///             let warning = ErrorEvent {
///                 error: LadderError {
///                     message: "No messages to validate, but continuing".to_string(),
///                     ..Default::default()
///                 },
///                 ..Default::default()
///             };
///             return Ok(NodePartial::new().with_errors(vec![warning]));
///         }
///
///         Ok(NodePartial::default())
///     }
/// }
/// ```
#[async_trait]
pub trait Node: Send + Sync {
    /// Execute this node with the given state snapshot and context.
    async fn run(
        &self,
        snapshot: StateSnapshot,
        ctx: NodeContext,
    ) -> Result<NodePartial, NodeError>;
}

// ============================================================================
// Execution Context
// ============================================================================

/// Execution context passed to nodes during workflow execution.
///
/// Provides nodes with access to their execution environment, including step
/// information, node identity, and communication channels for observability.
#[derive(Clone, Debug)]
pub struct NodeContext {
    /// Unique identifier for this node instance.
    pub node_id: String,
    /// Current execution step number.
    pub step: u64,
    /// Channel for emitting events to the workflow's event system.
    pub event_emitter: Arc<dyn EventEmitter>,
}

impl NodeContext {
    /// Emit a node-scoped event enriched with this context's metadata.
    ///
    /// Creates structured events that include the node's ID and step information,
    /// making them traceable in the workflow execution log.
    pub fn emit(
        &self,
        scope: impl Into<String>,
        message: impl Into<String>,
    ) -> Result<(), NodeContextError> {
        self.emit_node(scope, message)
    }

    /// Emit a node event using this context's node identifier and step metadata.
    pub fn emit_node(
        &self,
        scope: impl Into<String>,
        message: impl Into<String>,
    ) -> Result<(), NodeContextError> {
        self.emit_event(Event::node_message_with_meta(
            self.node_id.clone(),
            self.step,
            scope,
            message,
        ))
    }

    /// Emit a diagnostic event for general workflow telemetry.
    pub fn emit_diagnostic(
        &self,
        scope: impl Into<String>,
        message: impl Into<String>,
    ) -> Result<(), NodeContextError> {
        self.emit_event(Event::diagnostic(scope, message))
    }

    /// Emit an LLM streaming chunk event with optional metadata.
    pub fn emit_llm_chunk(
        &self,
        session_id: Option<String>,
        stream_id: Option<String>,
        chunk: impl Into<String>,
        metadata: Option<FxHashMap<String, serde_json::Value>>,
    ) -> Result<(), NodeContextError> {
        let event = LLMStreamingEvent::chunk_event(
            session_id,
            Some(self.node_id.clone()),
            stream_id,
            chunk,
            metadata.unwrap_or_default(),
        );
        self.emit_event(Event::LLM(event))
    }

    /// Emit a final LLM streaming event signalling completion.
    pub fn emit_llm_final(
        &self,
        session_id: Option<String>,
        stream_id: Option<String>,
        chunk: impl Into<String>,
        metadata: Option<FxHashMap<String, serde_json::Value>>,
    ) -> Result<(), NodeContextError> {
        let event = LLMStreamingEvent::final_event(
            session_id,
            Some(self.node_id.clone()),
            stream_id,
            chunk,
            metadata.unwrap_or_default(),
        );
        self.emit_event(Event::LLM(event))
    }

    /// Emit an LLM error event with the provided error message.
    pub fn emit_llm_error(
        &self,
        session_id: Option<String>,
        stream_id: Option<String>,
        error_message: impl Into<String>,
    ) -> Result<(), NodeContextError> {
        let event = LLMStreamingEvent::error_event(
            session_id,
            Some(self.node_id.clone()),
            stream_id,
            error_message,
        );
        self.emit_event(Event::LLM(event))
    }

    fn emit_event(&self, event: Event) -> Result<(), NodeContextError> {
        self.event_emitter
            .emit(event)
            .map_err(|_| NodeContextError::EventBusUnavailable)
    }

    /// The `Interrupt(state, key, prompt)` operation (§4.5): resolves a
    /// resume value for `key` against `snapshot`, replaying an already-used
    /// value on a later re-execution within the same invocation, or returns
    /// `Err` to pause execution. On `Ok`, fold the returned
    /// [`InterruptResolution`]'s `record` into the node's result via
    /// [`NodePartial::with_used_interrupt`] to keep replay idempotent.
    pub fn interrupt(
        &self,
        snapshot: &StateSnapshot,
        key: impl Into<String>,
        prompt: serde_json::Value,
    ) -> Result<InterruptResolution, NodeError> {
        interrupt::interrupt(snapshot, &key.into(), prompt).map_err(NodeError::from)
    }
}

// ============================================================================
// State Updates
// ============================================================================

/// Partial state updates returned by node execution.
///
/// Represents the changes a node wants to make to the workflow state.
/// All fields are optional, allowing nodes to update only the state aspects
/// they care about. The workflow runtime merges these partial updates.
///
/// # Examples
///
/// ```rust
/// use pregelflow::node::NodePartial;
/// use pregelflow::message::Message;
/// use pregelflow::channels::errors::{ErrorEvent, LadderError};
/// use serde_json::json;
/// use rustc_hash::FxHashMap;
///
/// // Simple message-only response
/// let partial = NodePartial::new().with_messages(vec![Message::assistant("Done")]);
///
/// // Rich response with metadata
/// let mut extra = FxHashMap::default();
/// extra.insert("status".to_string(), json!("success"));
/// extra.insert("duration_ms".to_string(), json!(150));
/// let partial = NodePartial::new()
///     .with_messages(vec![Message::assistant("Processing complete")])
///     .with_extra(extra);
///
/// // Response with warnings
/// let errors = vec![ErrorEvent {
///     error: LadderError {
///         message: "Low confidence result".to_string(),
///         ..Default::default()
///     },
///     ..Default::default()
/// }];
/// let partial = NodePartial::new()
///     .with_messages(vec![Message::assistant("Result with warnings")])
///     .with_errors(errors);
/// ```
///
/// Any other schema key can be written with [`NodePartial::with_update`];
/// `messages`/`extra`/`errors` are ordinary keys handled by the default
/// schema's reducers, not distinct fields.
#[derive(Clone, Debug, Default)]
pub struct NodePartial {
    /// Raw per-key writes, reduced against the owning state's schema at the
    /// barrier.
    pub updates: FxHashMap<String, serde_json::Value>,
    /// Frontier commands emitted by the node to influence subsequent routing.
    pub frontier: Option<FrontierCommand>,
}

impl NodePartial {
    pub fn new() -> Self {
        Self::default()
    }

    /// Writes a single schema key.
    #[must_use]
    pub fn with_update(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.updates.insert(key.into(), value);
        self
    }

    /// Appends one or more messages via the conventional `messages` key.
    #[must_use]
    pub fn with_messages(mut self, messages: Vec<Message>) -> Self {
        let value = serde_json::to_value(messages).unwrap_or(serde_json::Value::Array(Vec::new()));
        self.updates.insert(MESSAGES_KEY.to_string(), value);
        self
    }

    /// Merges key-value pairs into the conventional `extra` map.
    #[must_use]
    pub fn with_extra(mut self, extra: FxHashMap<String, serde_json::Value>) -> Self {
        let value = serde_json::Value::Object(extra.into_iter().collect());
        self.updates.insert(EXTRA_KEY.to_string(), value);
        self
    }

    /// Appends one or more errors via the conventional `errors` key.
    #[must_use]
    pub fn with_errors(mut self, errors: Vec<ErrorEvent>) -> Self {
        let value = serde_json::to_value(errors).unwrap_or(serde_json::Value::Array(Vec::new()));
        self.updates.insert(ERRORS_KEY.to_string(), value);
        self
    }

    /// Replace the default frontier with the provided list of targets.
    ///
    /// The runner will skip conditional edges for the originating node when a
    /// replace command is present.
    #[must_use]
    pub fn with_frontier_replace<I>(mut self, targets: I) -> Self
    where
        I: IntoIterator<Item = NodeKind>,
    {
        let routes = targets.into_iter().map(NodeRoute::from).collect();
        self.frontier = Some(FrontierCommand::Replace(routes));
        self
    }

    /// Append additional targets to the frontier alongside the default routes.
    ///
    /// The default unconditional edges remain in place and the supplied
    /// routes are appended in-order for deterministic processing.
    #[must_use]
    pub fn with_frontier_append<I>(mut self, targets: I) -> Self
    where
        I: IntoIterator<Item = NodeKind>,
    {
        let routes = targets.into_iter().map(NodeRoute::from).collect();
        self.frontier = Some(FrontierCommand::Append(routes));
        self
    }

    /// Attach a pre-built frontier command.
    #[must_use]
    pub fn with_frontier_command(mut self, command: FrontierCommand) -> Self {
        self.frontier = Some(command);
        self
    }

    /// Folds an [`InterruptResolution::record`] into the conventional
    /// `usedInterrupts` key, merging with any record already staged in this
    /// `NodePartial` (a node with more than one interrupt point may resolve
    /// several in one run). No-op for `None` (the replay case, where the
    /// record already exists from a prior execution).
    #[must_use]
    pub fn with_used_interrupt(mut self, record: Option<serde_json::Value>) -> Self {
        let Some(record) = record else { return self };
        let merged = match self.updates.remove(USED_INTERRUPTS_KEY) {
            Some(serde_json::Value::Object(mut existing)) => {
                if let serde_json::Value::Object(new) = record {
                    existing.extend(new);
                }
                serde_json::Value::Object(existing)
            }
            _ => record,
        };
        self.updates.insert(USED_INTERRUPTS_KEY.to_string(), merged);
        self
    }

    /// `Command{GoTo: key}`: replaces the frontier with a single symbolic
    /// branch key, resolved against this node's `ends` map at the barrier
    /// (or taken verbatim as a node id if `ends` has no entry for it), per
    /// §4.4 step 3 / §3's `Node.ends`.
    #[must_use]
    pub fn with_goto(mut self, key: impl Into<String>) -> Self {
        self.frontier = Some(FrontierCommand::Replace(vec![NodeRoute::from(key.into().as_str())]));
        self
    }
}

// ============================================================================
// Node Hooks
// ============================================================================

/// Runs before a node's `run`; returning `Some(result)` short-circuits the
/// node entirely (the node body and its retry policy never run) and that
/// result becomes the step's outcome for this node, error or not.
pub type BeforeNodeHook =
    Arc<dyn Fn(&StateSnapshot, &NodeContext) -> Option<Result<NodePartial, NodeError>> + Send + Sync>;

/// Runs after a node's `run` succeeds (including after a before-hook
/// short-circuit); may substitute the result passed to later hooks and to
/// the barrier.
pub type AfterNodeHook =
    Arc<dyn Fn(&StateSnapshot, &NodeContext, NodePartial) -> NodePartial + Send + Sync>;

/// Runs when a node's `run` (after retries are exhausted) returns an error.
/// Purely observational: cannot substitute a result or suppress the error.
pub type OnErrorNodeHook = Arc<dyn Fn(&StateSnapshot, &NodeContext, &NodeError) + Send + Sync>;

/// Ordered before/after/on-error callback lists attached to one node.
///
/// Before-hooks run in registration order until one returns `Some`; after-
/// and on-error hooks all run, each after-hook seeing the previous one's
/// substituted result.
#[derive(Clone, Default)]
pub struct NodeHooks {
    pub before: Vec<BeforeNodeHook>,
    pub after: Vec<AfterNodeHook>,
    pub on_error: Vec<OnErrorNodeHook>,
}

impl NodeHooks {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.before.is_empty() && self.after.is_empty() && self.on_error.is_empty()
    }

    /// Runs the before-hooks in order; returns the first `Some` short-circuit
    /// result, if any.
    pub fn run_before(
        &self,
        snapshot: &StateSnapshot,
        ctx: &NodeContext,
    ) -> Option<Result<NodePartial, NodeError>> {
        self.before.iter().find_map(|hook| hook(snapshot, ctx))
    }

    /// Folds every after-hook over a successful result, in order.
    #[must_use]
    pub fn run_after(
        &self,
        snapshot: &StateSnapshot,
        ctx: &NodeContext,
        mut result: NodePartial,
    ) -> NodePartial {
        for hook in &self.after {
            result = hook(snapshot, ctx, result);
        }
        result
    }

    /// Notifies every on-error hook; does not affect the error returned to
    /// the executor.
    pub fn run_on_error(&self, snapshot: &StateSnapshot, ctx: &NodeContext, error: &NodeError) {
        for hook in &self.on_error {
            hook(snapshot, ctx, error);
        }
    }
}

// ============================================================================
// Error Types
// ============================================================================

/// Errors that can occur when using NodeContext methods.
#[derive(Debug, Error, Diagnostic)]
pub enum NodeContextError {
    /// Event could not be sent due to event bus disconnection or capacity issues.
    #[error("failed to emit event: event bus unavailable")]
    #[diagnostic(
        code(pregelflow::node::event_bus_unavailable),
        help("The event bus may be disconnected or at capacity. Check workflow state.")
    )]
    EventBusUnavailable,
}

/// Errors that can occur during node execution.
///
/// `NodeError` represents fatal errors that should halt workflow execution.
/// For recoverable errors that should be tracked but not halt execution,
/// use `NodePartial.errors` instead.
#[derive(Debug, Error, Diagnostic)]
pub enum NodeError {
    /// Expected input data is missing from the state snapshot.
    #[error("missing expected input: {what}")]
    #[diagnostic(
        code(pregelflow::node::missing_input),
        help("Check that the previous node produced the required data: {what}.")
    )]
    MissingInput { what: &'static str },

    /// External provider or service error.
    #[error("provider error ({provider}): {message}")]
    #[diagnostic(code(pregelflow::node::provider))]
    Provider {
        provider: &'static str,
        message: String,
    },

    /// JSON serialization/deserialization error.
    #[error(transparent)]
    #[diagnostic(code(pregelflow::node::serde_json))]
    Serde(#[from] serde_json::Error),

    /// Input validation failed.
    #[error("validation failed: {0}")]
    #[diagnostic(
        code(pregelflow::node::validation),
        help("Check input data format and required fields.")
    )]
    ValidationFailed(String),

    /// Event bus communication error.
    #[error("event bus error: {0}")]
    #[diagnostic(code(pregelflow::node::event_bus))]
    EventBus(#[from] NodeContextError),

    /// The node cooperatively paused execution; not a true failure and never
    /// subject to [`crate::retry::RetryPolicy`].
    #[error(transparent)]
    #[diagnostic(code(pregelflow::node::interrupted))]
    Interrupted(#[from] crate::interrupt::InterruptError),
}

impl NodeError {
    /// `true` for [`NodeError::Interrupted`], the one variant the retry loop
    /// must never attempt to retry regardless of a configured `retry_on`.
    #[must_use]
    pub fn is_interrupt(&self) -> bool {
        matches!(self, NodeError::Interrupted(_))
    }
}
