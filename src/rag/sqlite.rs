//! SQLite-backed vector store.
//!
//! Vectors are stored as little-endian `f32` blobs and ranked in process by
//! cosine distance. Each index remembers its dimension and embedding model.

use std::cmp::Ordering;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow, SqliteSynchronous,
};
use sqlx::{Row, SqlitePool};

use super::store::{IndexInfo, Neighbor, VectorRecord, VectorStore};
use crate::core::errors::RagError;

pub struct SqliteVectorStore {
    pool: SqlitePool,
    db_path: PathBuf,
}

impl SqliteVectorStore {
    pub async fn with_path(db_path: PathBuf, acquire_timeout: Duration) -> Result<Self, RagError> {
        if let Some(parent) = db_path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(RagError::storage)?;
        }

        let options = SqliteConnectOptions::new()
            .filename(&db_path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .min_connections(1)
            .max_connections(4)
            .acquire_timeout(acquire_timeout)
            .connect_with(options)
            .await
            .map_err(RagError::storage)?;

        let store = Self { pool, db_path };
        store.init_schema().await?;
        Ok(store)
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    async fn init_schema(&self) -> Result<(), RagError> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS vector_indexes (
                name TEXT PRIMARY KEY,
                dimension INTEGER NOT NULL,
                embedding_model TEXT,
                created_at TEXT NOT NULL DEFAULT (STRFTIME('%Y-%m-%dT%H:%M:%fZ', 'now'))
            )",
        )
        .execute(&self.pool)
        .await
        .map_err(RagError::storage)?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS vector_records (
                index_name TEXT NOT NULL,
                id TEXT NOT NULL,
                content TEXT NOT NULL,
                metadata TEXT NOT NULL DEFAULT '{}',
                embedding BLOB NOT NULL,
                updated_at TEXT NOT NULL DEFAULT (STRFTIME('%Y-%m-%dT%H:%M:%fZ', 'now')),
                PRIMARY KEY (index_name, id),
                FOREIGN KEY (index_name) REFERENCES vector_indexes(name) ON DELETE CASCADE
            )",
        )
        .execute(&self.pool)
        .await
        .map_err(RagError::storage)?;

        Ok(())
    }

    async fn index_row(&self, name: &str) -> Result<Option<(usize, Option<String>)>, RagError> {
        let row = sqlx::query("SELECT dimension, embedding_model FROM vector_indexes WHERE name = ?1")
            .bind(name)
            .fetch_optional(&self.pool)
            .await
            .map_err(RagError::storage)?;

        Ok(row.map(|row| {
            let dimension: i64 = row.get("dimension");
            let model: Option<String> = row.get("embedding_model");
            (dimension as usize, model)
        }))
    }

    async fn require_dimension(&self, name: &str) -> Result<usize, RagError> {
        self.index_row(name)
            .await?
            .map(|(dimension, _)| dimension)
            .ok_or_else(|| RagError::NotFound(format!("vector index '{}'", name)))
    }

    fn serialize_embedding(embedding: &[f32]) -> Vec<u8> {
        embedding.iter().flat_map(|f| f.to_le_bytes()).collect()
    }

    fn deserialize_embedding(bytes: &[u8]) -> Vec<f32> {
        bytes
            .chunks_exact(4)
            .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
            .collect()
    }

    fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
        if a.len() != b.len() || a.is_empty() {
            return 1.0;
        }

        let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
        let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
        let denom = norm_a * norm_b;

        if denom <= f32::EPSILON {
            1.0
        } else {
            1.0 - dot / denom
        }
    }

    fn row_to_neighbor(row: &SqliteRow, query: &[f32]) -> Neighbor {
        let metadata_str: String = row.get("metadata");
        let embedding: Vec<u8> = row.get("embedding");

        Neighbor {
            id: row.get("id"),
            content: row.get("content"),
            metadata: serde_json::from_str::<Value>(&metadata_str).unwrap_or(Value::Null),
            distance: Self::cosine_distance(query, &Self::deserialize_embedding(&embedding)),
        }
    }
}

#[async_trait]
impl VectorStore for SqliteVectorStore {
    async fn create_index(&self, name: &str, dimension: usize) -> Result<(), RagError> {
        if dimension == 0 {
            return Err(RagError::InvalidInput("index dimension must be > 0".to_string()));
        }

        if let Some((existing, _)) = self.index_row(name).await? {
            if existing != dimension {
                return Err(RagError::Storage(format!(
                    "index '{}' already exists with dimension {} (requested {})",
                    name, existing, dimension
                )));
            }
            return Ok(());
        }

        sqlx::query("INSERT OR IGNORE INTO vector_indexes (name, dimension) VALUES (?1, ?2)")
            .bind(name)
            .bind(dimension as i64)
            .execute(&self.pool)
            .await
            .map_err(RagError::storage)?;

        tracing::info!("Created vector index '{}' (dimension {})", name, dimension);
        Ok(())
    }

    async fn bind_embedding_model(&self, name: &str, model: &str) -> Result<(), RagError> {
        let (_, bound) = self
            .index_row(name)
            .await?
            .ok_or_else(|| RagError::NotFound(format!("vector index '{}'", name)))?;

        match bound {
            Some(existing) if existing == model => Ok(()),
            Some(existing) => Err(RagError::Storage(format!(
                "index '{}' holds embeddings from '{}', not '{}'; run reindex to switch models",
                name, existing, model
            ))),
            None => {
                sqlx::query("UPDATE vector_indexes SET embedding_model = ?1 WHERE name = ?2")
                    .bind(model)
                    .bind(name)
                    .execute(&self.pool)
                    .await
                    .map_err(RagError::storage)?;
                Ok(())
            }
        }
    }

    async fn embedding_model(&self, name: &str) -> Result<Option<String>, RagError> {
        self.index_row(name)
            .await?
            .map(|(_, model)| model)
            .ok_or_else(|| RagError::NotFound(format!("vector index '{}'", name)))
    }

    async fn upsert(&self, name: &str, records: &[VectorRecord]) -> Result<usize, RagError> {
        if records.is_empty() {
            return Ok(0);
        }
        let dimension = self.require_dimension(name).await?;

        let mut tx = self.pool.begin().await.map_err(RagError::storage)?;

        for record in records {
            if record.vector.len() != dimension {
                tx.rollback().await.map_err(RagError::storage)?;
                return Err(RagError::Storage(format!(
                    "record '{}' has dimension {}, index '{}' expects {}",
                    record.id,
                    record.vector.len(),
                    name,
                    dimension
                )));
            }

            let metadata_str = serde_json::to_string(&record.metadata).map_err(RagError::storage)?;

            sqlx::query(
                "INSERT INTO vector_records (index_name, id, content, metadata, embedding)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT (index_name, id) DO UPDATE SET
                    content = excluded.content,
                    metadata = excluded.metadata,
                    embedding = excluded.embedding,
                    updated_at = STRFTIME('%Y-%m-%dT%H:%M:%fZ', 'now')",
            )
            .bind(name)
            .bind(&record.id)
            .bind(&record.content)
            .bind(&metadata_str)
            .bind(Self::serialize_embedding(&record.vector))
            .execute(&mut *tx)
            .await
            .map_err(RagError::storage)?;
        }

        tx.commit().await.map_err(RagError::storage)?;
        Ok(records.len())
    }

    async fn query(
        &self,
        name: &str,
        vector: &[f32],
        top_k: usize,
    ) -> Result<Vec<Neighbor>, RagError> {
        let dimension = self.require_dimension(name).await?;
        if vector.len() != dimension {
            return Err(RagError::Storage(format!(
                "query vector has dimension {}, index '{}' expects {}",
                vector.len(),
                name,
                dimension
            )));
        }
        if top_k == 0 {
            return Ok(Vec::new());
        }

        let rows = sqlx::query(
            "SELECT id, content, metadata, embedding
             FROM vector_records
             WHERE index_name = ?1",
        )
        .bind(name)
        .fetch_all(&self.pool)
        .await
        .map_err(RagError::storage)?;

        let mut scored: Vec<Neighbor> = rows
            .iter()
            .map(|row| Self::row_to_neighbor(row, vector))
            .collect();

        scored.sort_by(|a, b| {
            a.distance
                .partial_cmp(&b.distance)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.id.cmp(&b.id))
        });
        scored.truncate(top_k);

        Ok(scored)
    }

    async fn count(&self, name: &str) -> Result<usize, RagError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM vector_records WHERE index_name = ?1")
            .bind(name)
            .fetch_one(&self.pool)
            .await
            .map_err(RagError::storage)?;

        Ok(count as usize)
    }

    async fn describe(&self) -> Result<Vec<IndexInfo>, RagError> {
        let rows = sqlx::query(
            "SELECT i.name, i.dimension, i.embedding_model, COUNT(r.id) AS records
             FROM vector_indexes i
             LEFT JOIN vector_records r ON r.index_name = i.name
             GROUP BY i.name
             ORDER BY i.name",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(RagError::storage)?;

        Ok(rows
            .iter()
            .map(|row| IndexInfo {
                name: row.get("name"),
                dimension: row.get::<i64, _>("dimension") as usize,
                embedding_model: row.get("embedding_model"),
                records: row.get::<i64, _>("records") as usize,
            })
            .collect())
    }

    async fn reindex(&self, name: &str, model: &str) -> Result<(), RagError> {
        self.require_dimension(name).await?;

        let mut tx = self.pool.begin().await.map_err(RagError::storage)?;

        let removed = sqlx::query("DELETE FROM vector_records WHERE index_name = ?1")
            .bind(name)
            .execute(&mut *tx)
            .await
            .map_err(RagError::storage)?
            .rows_affected();

        sqlx::query("UPDATE vector_indexes SET embedding_model = ?1 WHERE name = ?2")
            .bind(model)
            .bind(name)
            .execute(&mut *tx)
            .await
            .map_err(RagError::storage)?;

        tx.commit().await.map_err(RagError::storage)?;

        tracing::info!(
            "Reindexed '{}': removed {} records, now bound to '{}'",
            name,
            removed,
            model
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    async fn test_store() -> (SqliteVectorStore, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteVectorStore::with_path(dir.path().join("vectors.db"), Duration::from_secs(5))
            .await
            .unwrap();
        (store, dir)
    }

    fn record(id: &str, vector: Vec<f32>) -> VectorRecord {
        VectorRecord {
            id: id.to_string(),
            content: format!("content of {}", id),
            metadata: json!({ "source": "2019.pdf", "year": "2019" }),
            vector,
        }
    }

    #[tokio::test]
    async fn create_index_is_idempotent() {
        let (store, _dir) = test_store().await;

        store.create_index("letters", 3).await.unwrap();
        store.create_index("letters", 3).await.unwrap();

        let err = store.create_index("letters", 4).await.unwrap_err();
        assert!(matches!(err, RagError::Storage(_)));
    }

    #[tokio::test]
    async fn upsert_overwrites_by_id() {
        let (store, _dir) = test_store().await;
        store.create_index("letters", 2).await.unwrap();

        store
            .upsert("letters", &[record("a", vec![1.0, 0.0]), record("b", vec![0.0, 1.0])])
            .await
            .unwrap();
        store
            .upsert("letters", &[record("a", vec![0.0, 1.0])])
            .await
            .unwrap();

        assert_eq!(store.count("letters").await.unwrap(), 2);

        let hits = store.query("letters", &[0.0, 1.0], 2).await.unwrap();
        // both now point the same way; ties fall back to id order
        assert_eq!(hits[0].id, "a");
        assert_eq!(hits[1].id, "b");
    }

    #[tokio::test]
    async fn bad_record_rolls_back_whole_batch() {
        let (store, _dir) = test_store().await;
        store.create_index("letters", 2).await.unwrap();
        store.upsert("letters", &[record("kept", vec![1.0, 0.0])]).await.unwrap();

        let err = store
            .upsert(
                "letters",
                &[record("x", vec![1.0, 1.0]), record("y", vec![1.0, 2.0, 3.0])],
            )
            .await
            .unwrap_err();

        assert!(matches!(err, RagError::Storage(_)));
        assert_eq!(store.count("letters").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn query_orders_by_distance_and_truncates() {
        let (store, _dir) = test_store().await;
        store.create_index("letters", 2).await.unwrap();
        store
            .upsert(
                "letters",
                &[
                    record("far", vec![-1.0, 0.0]),
                    record("near", vec![1.0, 0.1]),
                    record("mid", vec![0.5, 0.5]),
                ],
            )
            .await
            .unwrap();

        let hits = store.query("letters", &[1.0, 0.0], 2).await.unwrap();
        let ids: Vec<&str> = hits.iter().map(|h| h.id.as_str()).collect();
        assert_eq!(ids, vec!["near", "mid"]);
        assert!(hits[0].distance < hits[1].distance);
        assert_eq!(hits[0].metadata["year"], "2019");
    }

    #[tokio::test]
    async fn unknown_index_is_not_found() {
        let (store, _dir) = test_store().await;
        let err = store.query("missing", &[1.0], 3).await.unwrap_err();
        assert!(matches!(err, RagError::NotFound(_)));
    }

    #[tokio::test]
    async fn model_binding_and_reindex() {
        let (store, _dir) = test_store().await;
        store.create_index("letters", 2).await.unwrap();
        store.bind_embedding_model("letters", "embed-a").await.unwrap();
        store.bind_embedding_model("letters", "embed-a").await.unwrap();
        store.upsert("letters", &[record("a", vec![1.0, 0.0])]).await.unwrap();

        assert_eq!(
            store.embedding_model("letters").await.unwrap().as_deref(),
            Some("embed-a")
        );
        let err = store.bind_embedding_model("letters", "embed-b").await.unwrap_err();
        assert!(err.to_string().contains("reindex"));

        store.reindex("letters", "embed-b").await.unwrap();
        assert_eq!(store.count("letters").await.unwrap(), 0);
        store.bind_embedding_model("letters", "embed-b").await.unwrap();

        let info = store.describe().await.unwrap();
        assert_eq!(info.len(), 1);
        assert_eq!(info[0].embedding_model.as_deref(), Some("embed-b"));
        assert_eq!(info[0].dimension, 2);
    }
}
