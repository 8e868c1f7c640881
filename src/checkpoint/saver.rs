//! The `Saver` trait: durable storage for the checkpoint tree.
//!
//! Generalizes the teacher's `runtimes::checkpointer::Checkpointer` trait
//! (keyed by a bare `session_id`, one "latest" checkpoint per session) to a
//! lineage/namespace-addressed store that can list history and branch.

use async_trait::async_trait;
use miette::Diagnostic;
use thiserror::Error;

use super::{Checkpoint, CheckpointId, LineageId, Namespace};

/// Error taxonomy for saver operations, named after the conditions callers
/// must distinguish (a required identifier was omitted vs. simply not
/// found), matching the teacher's `CheckpointerError` style of one variant
/// per caller-actionable condition.
#[derive(Debug, Error, Diagnostic)]
pub enum SaverError {
    #[error("lineage id is required")]
    #[diagnostic(code(pregelflow::checkpoint::lineage_id_required))]
    ErrLineageIDRequired,

    #[error("lineage id must not be empty")]
    #[diagnostic(code(pregelflow::checkpoint::lineage_id_empty))]
    ErrLineageIDEmpty,

    #[error("both lineage id and checkpoint id are required for this operation")]
    #[diagnostic(code(pregelflow::checkpoint::lineage_and_checkpoint_id_required))]
    ErrLineageIDAndCheckpointIDRequired,

    #[error("checkpoint not found: lineage={lineage_id} namespace={namespace} id={checkpoint_id:?}")]
    #[diagnostic(code(pregelflow::checkpoint::not_found))]
    ErrCheckpointNotFound {
        lineage_id: LineageId,
        namespace: Namespace,
        checkpoint_id: Option<CheckpointId>,
    },

    #[error("checkpoint backend error: {message}")]
    #[diagnostic(code(pregelflow::checkpoint::backend))]
    Backend { message: String },
}

pub type Result<T> = std::result::Result<T, SaverError>;

/// A checkpoint plus enough context to resume from it: its id and its
/// parent's, if any.
#[derive(Clone, Debug)]
pub struct CheckpointTuple {
    pub checkpoint: Checkpoint,
    pub parent_checkpoint_id: Option<CheckpointId>,
}

/// Filters for listing checkpoints within a lineage.
#[derive(Clone, Debug, Default)]
pub struct ListFilter {
    pub namespace: Option<Namespace>,
    pub before: Option<CheckpointId>,
    pub limit: Option<usize>,
}

impl ListFilter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    #[must_use]
    pub fn with_before(mut self, checkpoint_id: impl Into<String>) -> Self {
        self.before = Some(checkpoint_id.into());
        self
    }

    #[must_use]
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// Durable storage for the checkpoint tree. Implementations must validate
/// `lineage_id` is non-empty before touching storage (see [`SaverError`]).
#[async_trait]
pub trait Saver: Send + Sync {
    async fn put(&self, checkpoint: Checkpoint) -> Result<()>;

    async fn get(
        &self,
        lineage_id: &str,
        namespace: &str,
        checkpoint_id: &str,
    ) -> Result<CheckpointTuple>;

    /// Most recent checkpoint in `namespace` for `lineage_id`.
    async fn get_latest(&self, lineage_id: &str, namespace: &str) -> Result<Option<CheckpointTuple>>;

    async fn list(&self, lineage_id: &str, filter: ListFilter) -> Result<Vec<CheckpointTuple>>;

    async fn list_lineages(&self) -> Result<Vec<LineageId>>;

    fn validate_lineage_id(lineage_id: &str) -> Result<()> {
        if lineage_id.is_empty() {
            return Err(SaverError::ErrLineageIDEmpty);
        }
        Ok(())
    }
}
