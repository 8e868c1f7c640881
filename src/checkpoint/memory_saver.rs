//! In-memory [`Saver`], adapted from the teacher's `InMemoryCheckpointer`.
//! Suitable for tests and single-process runs; nothing survives past the
//! process.

use std::sync::RwLock;

use async_trait::async_trait;
use rustc_hash::FxHashMap;

use super::saver::{CheckpointTuple, ListFilter, Result, Saver, SaverError};
use super::{Checkpoint, LineageId};

#[derive(Default)]
pub struct InMemorySaver {
    // keyed by (lineage_id, namespace) -> checkpoints in insertion order
    inner: RwLock<FxHashMap<(LineageId, String), Vec<Checkpoint>>>,
}

impl InMemorySaver {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Saver for InMemorySaver {
    async fn put(&self, checkpoint: Checkpoint) -> Result<()> {
        Self::validate_lineage_id(&checkpoint.lineage_id)?;
        let key = (checkpoint.lineage_id.clone(), checkpoint.namespace.clone());
        let mut guard = self
            .inner
            .write()
            .map_err(|_| SaverError::Backend { message: "poisoned lock".into() })?;
        guard.entry(key).or_default().push(checkpoint);
        Ok(())
    }

    async fn get(
        &self,
        lineage_id: &str,
        namespace: &str,
        checkpoint_id: &str,
    ) -> Result<CheckpointTuple> {
        Self::validate_lineage_id(lineage_id)?;
        let guard = self
            .inner
            .read()
            .map_err(|_| SaverError::Backend { message: "poisoned lock".into() })?;
        let checkpoints = guard
            .get(&(lineage_id.to_string(), namespace.to_string()))
            .ok_or_else(|| SaverError::ErrCheckpointNotFound {
                lineage_id: lineage_id.to_string(),
                namespace: namespace.to_string(),
                checkpoint_id: Some(checkpoint_id.to_string()),
            })?;
        let checkpoint = checkpoints
            .iter()
            .find(|c| c.id == checkpoint_id)
            .cloned()
            .ok_or_else(|| SaverError::ErrCheckpointNotFound {
                lineage_id: lineage_id.to_string(),
                namespace: namespace.to_string(),
                checkpoint_id: Some(checkpoint_id.to_string()),
            })?;
        let parent_checkpoint_id = checkpoint.parent_id.clone();
        Ok(CheckpointTuple { checkpoint, parent_checkpoint_id })
    }

    async fn get_latest(&self, lineage_id: &str, namespace: &str) -> Result<Option<CheckpointTuple>> {
        Self::validate_lineage_id(lineage_id)?;
        let guard = self
            .inner
            .read()
            .map_err(|_| SaverError::Backend { message: "poisoned lock".into() })?;
        let Some(checkpoints) = guard.get(&(lineage_id.to_string(), namespace.to_string())) else {
            return Ok(None);
        };
        Ok(checkpoints.last().cloned().map(|checkpoint| {
            let parent_checkpoint_id = checkpoint.parent_id.clone();
            CheckpointTuple { checkpoint, parent_checkpoint_id }
        }))
    }

    async fn list(&self, lineage_id: &str, filter: ListFilter) -> Result<Vec<CheckpointTuple>> {
        Self::validate_lineage_id(lineage_id)?;
        let guard = self
            .inner
            .read()
            .map_err(|_| SaverError::Backend { message: "poisoned lock".into() })?;
        let mut out = Vec::new();
        for ((lid, ns), checkpoints) in guard.iter() {
            if lid != lineage_id {
                continue;
            }
            if let Some(wanted_ns) = &filter.namespace
                && ns != wanted_ns
            {
                continue;
            }
            let mut seen_before = filter.before.is_none();
            for checkpoint in checkpoints {
                if let Some(before) = &filter.before {
                    if !seen_before {
                        if &checkpoint.id == before {
                            seen_before = true;
                        }
                        continue;
                    }
                }
                let parent_checkpoint_id = checkpoint.parent_id.clone();
                out.push(CheckpointTuple { checkpoint: checkpoint.clone(), parent_checkpoint_id });
            }
        }
        out.sort_by_key(|t| t.checkpoint.created_at);
        if let Some(limit) = filter.limit {
            out.truncate(limit);
        }
        Ok(out)
    }

    async fn list_lineages(&self) -> Result<Vec<LineageId>> {
        let guard = self
            .inner
            .read()
            .map_err(|_| SaverError::Backend { message: "poisoned lock".into() })?;
        let mut lineages: Vec<LineageId> = guard.keys().map(|(lid, _)| lid.clone()).collect();
        lineages.sort();
        lineages.dedup();
        Ok(lineages)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn put_then_get_latest_round_trips() {
        let saver = InMemorySaver::new();
        let root = Checkpoint::root("lineage-1", "");
        saver.put(root.clone()).await.unwrap();
        let child = root.next(1);
        saver.put(child.clone()).await.unwrap();

        let latest = saver.get_latest("lineage-1", "").await.unwrap().unwrap();
        assert_eq!(latest.checkpoint.id, child.id);
        assert_eq!(latest.parent_checkpoint_id, Some(root.id));
    }

    #[tokio::test]
    async fn get_missing_checkpoint_errors() {
        let saver = InMemorySaver::new();
        let err = saver.get("lineage-1", "", "missing").await.unwrap_err();
        assert!(matches!(err, SaverError::ErrCheckpointNotFound { .. }));
    }

    #[tokio::test]
    async fn empty_lineage_id_is_rejected() {
        let saver = InMemorySaver::new();
        let err = saver.put(Checkpoint::root("", "")).await.unwrap_err();
        assert!(matches!(err, SaverError::ErrLineageIDEmpty));
    }
}
