//! The checkpoint tree: immutable snapshots keyed by `(lineage, namespace,
//! id)`, related by parent pointers, supporting branching into new lineages.
//!
//! Generalizes the teacher's `runtimes::checkpointer::Checkpoint` (a flat
//! "latest checkpoint per session" record keyed only by `session_id`) into
//! the data model's lineage/namespace tree: a session (`lineage`) has many
//! checkpoints across possibly many namespaces (sub-graphs), each with a
//! parent, enabling time travel and branching.

mod manager;
mod memory_saver;
pub mod saver;
#[cfg(feature = "sqlite-saver")]
pub mod sqlite_saver;

pub use manager::{BranchOutcome, CheckpointManager};
pub use memory_saver::InMemorySaver;
pub use saver::{CheckpointTuple, ListFilter, Saver, SaverError};
#[cfg(feature = "sqlite-saver")]
pub use sqlite_saver::SqliteSaver;

use chrono::{DateTime, Utc};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::channels::ChannelSnapshot;
use crate::types::NodeKind;

/// Identifies one independent run of a graph. All checkpoints sharing a
/// lineage id form one branchable history.
pub type LineageId = String;
/// Identifies a sub-graph scope within a lineage (the root scope is the
/// empty string); distinct namespaces checkpoint independently but share a
/// lineage for the purpose of cross-namespace parent pointers.
pub type Namespace = String;
/// Uniquely identifies one checkpoint within its lineage.
pub type CheckpointId = String;

/// Provenance tag recording why a checkpoint was created, set by the
/// executor at each of the four call sites the data model names.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckpointSource {
    /// The first checkpoint of a lineage, taken before any node has run.
    Input,
    /// A normal superstep boundary reached by ordinary node execution.
    Loop,
    /// The checkpoint immediately following an externally supplied patch
    /// (e.g. a [`crate::interrupt::ResumeCommand`] applied before resuming).
    Update,
    /// Created by branching an existing checkpoint into a new lineage or
    /// namespace rather than by executing a step.
    Fork,
}

/// A single immutable execution snapshot.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Checkpoint {
    pub id: CheckpointId,
    pub lineage_id: LineageId,
    pub namespace: Namespace,
    /// The checkpoint this one was created from, if any. May reference a
    /// checkpoint in a different namespace (cross-namespace parenting,
    /// e.g. a sub-graph's first checkpoint parents the caller's last one).
    pub parent_id: Option<CheckpointId>,
    pub source: CheckpointSource,
    pub step: u64,
    pub channel_values: ChannelSnapshot,
    pub frontier: Vec<NodeKind>,
    /// Per-node, per-channel versions the scheduler had already observed as
    /// of this checkpoint, used to recompute the trigger set on resume.
    pub versions_seen: FxHashMap<String, FxHashMap<String, u64>>,
    pub pending_writes: Vec<PendingWrite>,
    pub interrupt: Option<InterruptInfo>,
    pub created_at: DateTime<Utc>,
}

impl Checkpoint {
    #[must_use]
    pub fn root(lineage_id: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            lineage_id: lineage_id.into(),
            namespace: namespace.into(),
            parent_id: None,
            source: CheckpointSource::Input,
            step: 0,
            channel_values: ChannelSnapshot::default(),
            frontier: Vec::new(),
            versions_seen: FxHashMap::default(),
            pending_writes: Vec::new(),
            interrupt: None,
            created_at: Utc::now(),
        }
    }

    #[must_use]
    pub fn next(&self, step: u64) -> Self {
        self.next_in_namespace(self.namespace.clone(), step)
    }

    /// Like [`Checkpoint::next`], but parents `self` from a (possibly
    /// different) namespace, per §4.7's cross-namespace branching.
    ///
    /// Defaults `source` to [`CheckpointSource::Loop`]; callers that use this
    /// for branching rather than ordinary step progression (e.g.
    /// [`crate::checkpoint::CheckpointManager::branch_from`]) overwrite it.
    #[must_use]
    pub fn next_in_namespace(&self, namespace: impl Into<String>, step: u64) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            lineage_id: self.lineage_id.clone(),
            namespace: namespace.into(),
            parent_id: Some(self.id.clone()),
            source: CheckpointSource::Loop,
            step,
            channel_values: ChannelSnapshot::default(),
            frontier: Vec::new(),
            versions_seen: self.versions_seen.clone(),
            pending_writes: Vec::new(),
            interrupt: None,
            created_at: Utc::now(),
        }
    }
}

/// A write collected during a superstep but not yet folded through the
/// barrier, tagged with a monotonic sequence number so replay after a crash
/// or resume reapplies writes in the order they were originally produced.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PendingWrite {
    pub sequence: u64,
    pub node: String,
    pub channel: String,
    pub value: serde_json::Value,
}

/// One node invocation scheduled for a superstep, as recorded in a
/// checkpoint for replay/debugging.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Task {
    pub node: NodeKind,
    pub step: u64,
    pub triggers: Vec<String>,
}

/// Records that a checkpoint was produced by a node pausing mid-step, so
/// `ResumeFromCheckpoint` knows which interrupt(s) are awaiting a value.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct InterruptInfo {
    pub node: NodeKind,
    pub interrupt_id: String,
    pub reason: String,
    pub payload: serde_json::Value,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn next_checkpoint_parents_the_previous_one_and_keeps_lineage() {
        let root = Checkpoint::root("lineage-1", "");
        let child = root.next(1);
        assert_eq!(child.parent_id, Some(root.id.clone()));
        assert_eq!(child.lineage_id, root.lineage_id);
        assert_eq!(child.step, 1);
    }
}
