use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{Row, SqlitePool};
use tracing::{debug, instrument};

use super::CanvasStore;
use crate::domain::canvas_state::CanvasStateDocument;

pub const DEFAULT_CANVAS_ID: &str = "default";

/// Canvas snapshots kept in SQLite, one JSON document per canvas id.
#[derive(Clone)]
pub struct CanvasSnapshotRepository {
    pool: SqlitePool,
    canvas_id: String,
}

impl CanvasSnapshotRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self::for_canvas(pool, DEFAULT_CANVAS_ID)
    }

    pub fn for_canvas(pool: SqlitePool, canvas_id: impl Into<String>) -> Self {
        Self {
            pool,
            canvas_id: canvas_id.into(),
        }
    }

    pub async fn delete(&self) -> Result<bool> {
        let result = sqlx::query("DELETE FROM canvas_snapshots WHERE canvas_id = ?")
            .bind(&self.canvas_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl CanvasStore for CanvasSnapshotRepository {
    fn name(&self) -> &str {
        "sqlite"
    }

    #[instrument(skip(self), fields(canvas_id = %self.canvas_id))]
    async fn load(&self) -> Result<Option<CanvasStateDocument>> {
        let record = sqlx::query("SELECT document FROM canvas_snapshots WHERE canvas_id = ?")
            .bind(&self.canvas_id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to query canvas snapshot")?;

        match record {
            Some(row) => {
                let raw: String = row.get("document");
                let document = serde_json::from_str(&raw)
                    .context("Stored canvas snapshot is not a valid document")?;
                Ok(Some(document))
            }
            None => Ok(None),
        }
    }

    #[instrument(skip(self, document), fields(canvas_id = %self.canvas_id))]
    async fn save(&self, document: &CanvasStateDocument) -> Result<()> {
        let raw = serde_json::to_string(document)?;
        sqlx::query(
            r#"
            INSERT INTO canvas_snapshots (canvas_id, document, last_modified, version, updated_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(canvas_id) DO UPDATE SET
                document = excluded.document,
                last_modified = excluded.last_modified,
                version = excluded.version,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&self.canvas_id)
        .bind(&raw)
        .bind(document.last_modified.to_rfc3339())
        .bind(&document.version)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await
        .context("Failed to write canvas snapshot")?;

        debug!(bytes = raw.len(), "Canvas snapshot stored");
        Ok(())
    }
}
