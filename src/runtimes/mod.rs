//! Runtime configuration: the executor's lineage id, checkpointer choice,
//! and event-bus sink setup.
//!
//! Trimmed from the teacher's much larger `runtimes` (which also carried a
//! superstep runner, session bookkeeping, and per-backend checkpointer
//! structs — superseded here by [`crate::executor::Executor`] and
//! [`crate::checkpoint`]) down to the configuration surface that still
//! applies: `RuntimeConfig`/`EventBusConfig` kept as the teacher wrote them,
//! plus a `CheckpointerType` enum selecting which [`crate::checkpoint::Saver`]
//! backs a run.

pub mod runtime_config;

pub use runtime_config::{EventBusConfig, RuntimeConfig, SinkConfig};

/// Which [`crate::checkpoint::Saver`] backend an [`crate::executor::Executor`]
/// invocation should use.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CheckpointerType {
    /// [`crate::checkpoint::InMemorySaver`]; nothing survives the process.
    InMemory,
    /// A SQLite-backed [`crate::checkpoint::Saver`], gated behind the
    /// `sqlite-saver` feature.
    #[cfg(feature = "sqlite-saver")]
    Sqlite,
}
