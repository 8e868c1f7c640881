//! A SQLite-backed [`Saver`], feature-gated behind `sqlite-saver`.
//!
//! Stores one row per checkpoint in a single `checkpoints` table keyed by
//! `(lineage_id, namespace, checkpoint_id)`, matching the relational layout
//! sketched in the data model's external-interfaces contract. The whole
//! checkpoint is persisted as a single JSON blob column rather than the
//! teacher's hand-rolled multi-table schema
//! (`runtimes::checkpointer_sqlite`) — sqlx's `query!` macros round-trip
//! `serde_json::Value` columns directly, so there is nothing the wider
//! schema bought that a blob doesn't already give us here.

use async_trait::async_trait;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Row, SqlitePool};

use super::saver::{CheckpointTuple, ListFilter, Result, Saver, SaverError};
use super::{Checkpoint, LineageId};

pub struct SqliteSaver {
    pool: SqlitePool,
}

impl SqliteSaver {
    /// Connects to (and migrates) a SQLite database at `database_url`, e.g.
    /// `sqlite://weavegraph.db` or `sqlite::memory:`.
    pub async fn connect(database_url: &str) -> std::result::Result<Self, sqlx::Error> {
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await?;
        let saver = Self { pool };
        saver.migrate().await?;
        Ok(saver)
    }

    async fn migrate(&self) -> std::result::Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS checkpoints (
                lineage_id TEXT NOT NULL,
                namespace TEXT NOT NULL,
                checkpoint_id TEXT NOT NULL,
                parent_id TEXT,
                step INTEGER NOT NULL,
                created_at TEXT NOT NULL,
                blob TEXT NOT NULL,
                PRIMARY KEY (lineage_id, namespace, checkpoint_id)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    fn to_backend_err(err: sqlx::Error) -> SaverError {
        SaverError::Backend {
            message: err.to_string(),
        }
    }

    fn row_to_checkpoint(row: &sqlx::sqlite::SqliteRow) -> Result<Checkpoint> {
        let blob: String = row.try_get("blob").map_err(Self::to_backend_err)?;
        serde_json::from_str(&blob).map_err(|e| SaverError::Backend {
            message: format!("corrupt checkpoint blob: {e}"),
        })
    }
}

#[async_trait]
impl Saver for SqliteSaver {
    async fn put(&self, checkpoint: Checkpoint) -> Result<()> {
        Self::validate_lineage_id(&checkpoint.lineage_id)?;
        let blob = serde_json::to_string(&checkpoint).map_err(|e| SaverError::Backend {
            message: format!("failed to serialize checkpoint: {e}"),
        })?;
        sqlx::query(
            r#"
            INSERT INTO checkpoints (lineage_id, namespace, checkpoint_id, parent_id, step, created_at, blob)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            ON CONFLICT (lineage_id, namespace, checkpoint_id) DO UPDATE SET blob = excluded.blob
            "#,
        )
        .bind(&checkpoint.lineage_id)
        .bind(&checkpoint.namespace)
        .bind(&checkpoint.id)
        .bind(&checkpoint.parent_id)
        .bind(checkpoint.step as i64)
        .bind(checkpoint.created_at.to_rfc3339())
        .bind(blob)
        .execute(&self.pool)
        .await
        .map_err(Self::to_backend_err)?;
        Ok(())
    }

    async fn get(&self, lineage_id: &str, namespace: &str, checkpoint_id: &str) -> Result<CheckpointTuple> {
        Self::validate_lineage_id(lineage_id)?;
        let row = sqlx::query(
            "SELECT blob FROM checkpoints WHERE lineage_id = ?1 AND namespace = ?2 AND checkpoint_id = ?3",
        )
        .bind(lineage_id)
        .bind(namespace)
        .bind(checkpoint_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(Self::to_backend_err)?
        .ok_or_else(|| SaverError::ErrCheckpointNotFound {
            lineage_id: lineage_id.to_string(),
            namespace: namespace.to_string(),
            checkpoint_id: Some(checkpoint_id.to_string()),
        })?;
        let checkpoint = Self::row_to_checkpoint(&row)?;
        let parent_checkpoint_id = checkpoint.parent_id.clone();
        Ok(CheckpointTuple {
            checkpoint,
            parent_checkpoint_id,
        })
    }

    async fn get_latest(&self, lineage_id: &str, namespace: &str) -> Result<Option<CheckpointTuple>> {
        Self::validate_lineage_id(lineage_id)?;
        let row = sqlx::query(
            "SELECT blob FROM checkpoints WHERE lineage_id = ?1 AND namespace = ?2 ORDER BY created_at DESC LIMIT 1",
        )
        .bind(lineage_id)
        .bind(namespace)
        .fetch_optional(&self.pool)
        .await
        .map_err(Self::to_backend_err)?;
        let Some(row) = row else {
            return Ok(None);
        };
        let checkpoint = Self::row_to_checkpoint(&row)?;
        let parent_checkpoint_id = checkpoint.parent_id.clone();
        Ok(Some(CheckpointTuple {
            checkpoint,
            parent_checkpoint_id,
        }))
    }

    async fn list(&self, lineage_id: &str, filter: ListFilter) -> Result<Vec<CheckpointTuple>> {
        Self::validate_lineage_id(lineage_id)?;
        let rows = if let Some(namespace) = &filter.namespace {
            sqlx::query(
                "SELECT blob FROM checkpoints WHERE lineage_id = ?1 AND namespace = ?2 ORDER BY created_at ASC",
            )
            .bind(lineage_id)
            .bind(namespace)
            .fetch_all(&self.pool)
            .await
        } else {
            sqlx::query("SELECT blob FROM checkpoints WHERE lineage_id = ?1 ORDER BY created_at ASC")
                .bind(lineage_id)
                .fetch_all(&self.pool)
                .await
        }
        .map_err(Self::to_backend_err)?;

        let mut out = Vec::new();
        let mut seen_before = filter.before.is_none();
        for row in &rows {
            let checkpoint = Self::row_to_checkpoint(row)?;
            if let Some(before) = &filter.before {
                if !seen_before {
                    if &checkpoint.id == before {
                        seen_before = true;
                    }
                    continue;
                }
            }
            let parent_checkpoint_id = checkpoint.parent_id.clone();
            out.push(CheckpointTuple {
                checkpoint,
                parent_checkpoint_id,
            });
        }
        if let Some(limit) = filter.limit {
            out.truncate(limit);
        }
        Ok(out)
    }

    async fn list_lineages(&self) -> Result<Vec<LineageId>> {
        let rows = sqlx::query("SELECT DISTINCT lineage_id FROM checkpoints ORDER BY lineage_id ASC")
            .fetch_all(&self.pool)
            .await
            .map_err(Self::to_backend_err)?;
        rows.into_iter()
            .map(|row| row.try_get::<String, _>("lineage_id").map_err(Self::to_backend_err))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn saver() -> SqliteSaver {
        SqliteSaver::connect("sqlite::memory:").await.unwrap()
    }

    #[tokio::test]
    async fn put_then_get_latest_round_trips() {
        let saver = saver().await;
        let root = Checkpoint::root("lineage-1", "");
        saver.put(root.clone()).await.unwrap();
        let latest = saver.get_latest("lineage-1", "").await.unwrap().unwrap();
        assert_eq!(latest.checkpoint.id, root.id);
    }

    #[tokio::test]
    async fn get_missing_checkpoint_errors() {
        let saver = saver().await;
        let err = saver.get("lineage-1", "", "missing").await.unwrap_err();
        assert!(matches!(err, SaverError::ErrCheckpointNotFound { .. }));
    }
}
