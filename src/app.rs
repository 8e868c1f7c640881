//! `App`: a thin facade binding a compiled [`Graph`] to a [`RuntimeConfig`],
//! building the [`Executor`] and its [`EventBus`]/checkpointer on demand.
//!
//! Generalizes the teacher's `App` (which owned the node/edge tables
//! directly and handed them to `AppRunner`) by delegating topology to
//! [`crate::graph::Graph`] and superstep execution to
//! [`crate::executor::Executor`] — `App` itself only resolves runtime
//! configuration into the pieces those two need.

use std::sync::Arc;

use miette::Diagnostic;
use thiserror::Error;
use tracing::instrument;

use crate::checkpoint::{CheckpointManager, InMemorySaver};
use crate::event_bus::{EventBus, EventSink, MemorySink, StdOutSink};
use crate::executor::{ExecutionOutcome, Executor, ExecutorError};
use crate::graph::Graph;
use crate::interrupt::ResumeCommand;
use crate::runtimes::{CheckpointerType, RuntimeConfig, SinkConfig};
use crate::state::State;

#[derive(Debug, Error, Diagnostic)]
pub enum AppError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Executor(#[from] ExecutorError),

    #[error("failed to initialize checkpointer: {0}")]
    #[diagnostic(code(pregelflow::app::checkpointer))]
    Checkpointer(String),
}

/// Orchestrates graph execution: resolves a [`RuntimeConfig`] into an
/// [`Executor`], drives it, and unwraps the final [`State`].
///
/// # Examples
///
/// ```rust,no_run
/// use pregelflow::app::App;
/// use pregelflow::graph::GraphBuilder;
/// use pregelflow::state::State;
/// use pregelflow::types::NodeKind;
/// use pregelflow::node::{Node, NodeContext, NodeError, NodePartial};
/// use async_trait::async_trait;
///
/// # struct MyNode;
/// # #[async_trait]
/// # impl Node for MyNode {
/// #     async fn run(&self, _: pregelflow::state::StateSnapshot, _: NodeContext) -> Result<NodePartial, NodeError> {
/// #         Ok(NodePartial::default())
/// #     }
/// # }
/// #
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let graph = GraphBuilder::new()
///     .add_node(NodeKind::Custom("process".into()), MyNode)
///     .set_entry_point(NodeKind::Custom("process".into()))
///     .set_finish_point(NodeKind::Custom("process".into()))
///     .compile()?;
///
/// let app = App::new(graph);
/// let final_state = app.invoke(State::new_with_user_message("Hello")).await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct App {
    graph: Arc<Graph>,
    runtime_config: RuntimeConfig,
}

impl App {
    #[must_use]
    pub fn new(graph: Graph) -> Self {
        let runtime_config = graph.runtime_config().clone();
        Self {
            graph: Arc::new(graph),
            runtime_config,
        }
    }

    #[must_use]
    pub fn with_runtime_config(mut self, config: RuntimeConfig) -> Self {
        self.runtime_config = config;
        self
    }

    #[must_use]
    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    #[must_use]
    pub fn runtime_config(&self) -> &RuntimeConfig {
        &self.runtime_config
    }

    fn event_bus(&self) -> EventBus {
        let mut sinks: Vec<Box<dyn EventSink>> = Vec::new();
        for sink in self.runtime_config.event_bus.sinks() {
            match sink {
                SinkConfig::StdOut => sinks.push(Box::new(StdOutSink::default())),
                SinkConfig::Memory => sinks.push(Box::new(MemorySink::default())),
            }
        }
        if sinks.is_empty() {
            sinks.push(Box::new(StdOutSink::default()));
        }
        EventBus::with_capacity(sinks, self.runtime_config.event_bus.buffer_capacity())
    }

    async fn build_executor(&self) -> Result<Executor, AppError> {
        let bus = Arc::new(self.event_bus());
        let checkpointer_type = self
            .runtime_config
            .checkpointer
            .clone()
            .unwrap_or(CheckpointerType::InMemory);

        let manager = match checkpointer_type {
            CheckpointerType::InMemory => CheckpointManager::new(Arc::new(InMemorySaver::new())),
            #[cfg(feature = "sqlite-saver")]
            CheckpointerType::Sqlite => {
                let db_name = self
                    .runtime_config
                    .sqlite_db_name
                    .clone()
                    .unwrap_or_else(|| "pregelflow.db".to_string());
                let saver = crate::checkpoint::SqliteSaver::connect(&format!("sqlite://{db_name}"))
                    .await
                    .map_err(|e| AppError::Checkpointer(e.to_string()))?;
                CheckpointManager::new(Arc::new(saver))
            }
        };

        Ok(Executor::new(self.graph.clone(), bus).with_checkpoints(manager))
    }

    fn lineage_id(&self) -> String {
        self.runtime_config
            .session_id
            .clone()
            .unwrap_or_else(|| crate::utils::id_generator::IdGenerator::new().generate_run_id())
    }

    /// Runs the graph to completion or interruption, returning whichever
    /// state the run ended on.
    #[instrument(skip(self, initial_state), err)]
    pub async fn invoke(&self, initial_state: State) -> Result<State, AppError> {
        let executor = self.build_executor().await?;
        let lineage_id = self.lineage_id();
        let outcome = executor.invoke(initial_state, lineage_id).await?;
        Ok(match outcome {
            ExecutionOutcome::Completed { state, .. } => state,
            ExecutionOutcome::Interrupted { state, .. } => state,
        })
    }

    /// Runs the graph and returns the full [`ExecutionOutcome`], preserving
    /// whether the run completed or paused on an interrupt.
    #[instrument(skip(self, initial_state), err)]
    pub async fn invoke_detailed(&self, initial_state: State) -> Result<ExecutionOutcome, AppError> {
        let executor = self.build_executor().await?;
        let lineage_id = self.lineage_id();
        Ok(executor.invoke(initial_state, lineage_id).await?)
    }

    /// Resumes the latest checkpoint for `lineage_id`/`namespace`, injecting
    /// `resume` before re-running the previously interrupted frontier.
    #[instrument(skip(self, resume), err)]
    pub async fn resume(
        &self,
        lineage_id: &str,
        namespace: &str,
        resume: ResumeCommand,
    ) -> Result<ExecutionOutcome, AppError> {
        let executor = self.build_executor().await?;
        Ok(executor.resume(lineage_id, namespace, resume).await?)
    }
}
