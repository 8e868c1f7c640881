//! # pregelflow: a Pregel-style execution engine for agent workflows
//!
//! `pregelflow` runs a directed graph of nodes to completion one superstep
//! at a time: every node triggered in a step runs concurrently against a
//! read-only snapshot, their writes fold through a schema of per-channel
//! reducers, and the result is checkpointed before the next step's trigger
//! set is computed. Nodes can cooperatively pause mid-graph and resume
//! later from exactly where they left off.
//!
//! ## Core Concepts
//!
//! - **Nodes**: async units of work that turn a state snapshot into a
//!   partial update plus optional routing instructions
//! - **State**: a schema-driven set of named channels, each reduced by its
//!   own [`reducers::Reducer`]
//! - **Graph**: a compiled table of nodes, edges, and conditional edges
//! - **Executor**: the superstep loop that drives a [`graph::Graph`] to
//!   completion or interruption
//! - **Checkpoints**: an immutable, branchable history of every step, used
//!   for resume and time travel
//!
//! ## Quick Start
//!
//! ### Working with Messages
//!
//! ```
//! use pregelflow::message::Message;
//!
//! let user_msg = Message::user("What's the weather like?");
//! let assistant_msg = Message::assistant("It's sunny and 75°F!");
//! let system_msg = Message::system("You are a helpful assistant.");
//!
//! assert!(user_msg.has_role(Message::USER));
//! assert!(!user_msg.has_role(Message::ASSISTANT));
//! ```
//!
//! ### Building and Running a Simple Workflow
//!
//! ```no_run
//! use pregelflow::{
//!     event_bus::EventBus,
//!     executor::Executor,
//!     graph::GraphBuilder,
//!     message::Message,
//!     node::{Node, NodeContext, NodeError, NodePartial},
//!     state::{State, StateSnapshot},
//!     types::NodeKind,
//! };
//! use async_trait::async_trait;
//! use std::sync::Arc;
//!
//! struct GreetingNode;
//!
//! #[async_trait]
//! impl Node for GreetingNode {
//!     async fn run(&self, _snapshot: StateSnapshot, _ctx: NodeContext) -> Result<NodePartial, NodeError> {
//!         let greeting = Message::assistant("Hello! How can I help you today?");
//!         Ok(NodePartial::new().with_messages(vec![greeting]))
//!     }
//! }
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let graph = GraphBuilder::new()
//!     .add_node(NodeKind::Custom("greet".into()), GreetingNode)
//!     .set_entry_point(NodeKind::Custom("greet".into()))
//!     .set_finish_point(NodeKind::Custom("greet".into()))
//!     .compile()?;
//!
//! let executor = Executor::new(Arc::new(graph), Arc::new(EventBus::default()));
//! let outcome = executor
//!     .invoke(State::new_with_user_message("Hello, system!"), "session-1")
//!     .await?;
//! println!("{:?}", outcome.state().snapshot().messages());
//! # Ok(())
//! # }
//! ```
//!
//! ### State Management
//!
//! ```
//! use pregelflow::state::State;
//!
//! let state = State::new_with_user_message("Hello, system!");
//!
//! let complex_state = State::builder()
//!     .with_user_message("What's the weather?")
//!     .with_system_message("You are a weather assistant")
//!     .with_extra("location", serde_json::json!("San Francisco"))
//!     .build();
//! ```
//!
//! ### Error Handling
//!
//! The framework uses comprehensive error types with detailed context via
//! `thiserror`/`miette`, and nodes can emit structured diagnostics through
//! their [`node::NodeContext`]:
//!
//! ```
//! use pregelflow::node::{NodeError, NodeContext};
//!
//! fn example_error_handling(ctx: &NodeContext) -> Result<(), NodeError> {
//!     ctx.emit("validation", "Checking input parameters")?;
//!     Err(NodeError::MissingInput { what: "user_id" })
//! }
//! ```
//!
//! ## Module Guide
//!
//! - [`message`] - Message types and construction utilities
//! - [`state`] - Schema-driven state management and snapshots
//! - [`schema`] - Per-key reducer/default declarations
//! - [`node`] - Node trait and execution primitives
//! - [`control`] - Frontier commands nodes use to influence routing
//! - [`graph`] - Workflow graph definition and compilation
//! - [`executor`] - The Pregel superstep loop
//! - [`interrupt`] - Cooperative pause/resume primitives
//! - [`retry`] - Per-node retry policy
//! - [`runtimes`] - Runtime configuration and checkpointer selection
//! - [`checkpoint`] - Checkpoint tree, lineages, and the `Saver` trait
//! - [`channels`] - Channel-based state storage and versioning
//! - [`reducers`] - State merge strategies and conflict resolution
//! - [`event_bus`] - Event broadcasting and observability sinks
//! - [`telemetry`] - Event formatting for logs and sinks
//! - [`petgraph_compat`] - `petgraph`/DOT interop (feature `petgraph-compat`)

pub mod app;
pub mod channels;
pub mod checkpoint;
pub mod control;
pub mod event_bus;
pub mod executor;
pub mod graph;
pub mod interrupt;
pub mod message;
pub mod node;
#[cfg(feature = "petgraph-compat")]
pub mod petgraph_compat;
pub mod reducers;
pub mod retry;
pub mod runtimes;
pub mod schema;
pub mod state;
pub mod telemetry;
pub mod types;
pub mod utils;
