//! SQLite-backed vector store.
//!
//! Chunk text and metadata live in SQLite, embeddings as little-endian
//! `f32` blobs. Search is brute-force cosine similarity over one
//! collection, which is plenty for a handful of restaurant menus.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Row, SqlitePool};

use super::store::{CollectionSummary, IndexedDocument, SearchHit, VectorRecord, VectorStore};
use crate::chunking::{Chunk, ChunkMetadata};
use crate::core::config::AppPaths;
use crate::core::errors::RagError;

pub struct SqliteVectorStore {
    pool: SqlitePool,
    db_path: PathBuf,
}

impl SqliteVectorStore {
    pub async fn new(paths: &AppPaths) -> Result<Self, RagError> {
        Self::with_path(paths.vector_db_path.clone()).await
    }

    pub async fn with_path(db_path: PathBuf) -> Result<Self, RagError> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let options = SqliteConnectOptions::new()
            .filename(&db_path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal);

        let pool = SqlitePoolOptions::new()
            .min_connections(1)
            .max_connections(4)
            .connect_with(options)
            .await
            .map_err(RagError::store)?;

        let store = Self { pool, db_path };
        store.init_schema().await?;
        tracing::info!("Vector store opened at {}", store.db_path.display());
        Ok(store)
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    async fn init_schema(&self) -> Result<(), RagError> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS vector_records (
                chunk_id TEXT PRIMARY KEY,
                document_id TEXT NOT NULL,
                collection TEXT NOT NULL,
                ordinal INTEGER NOT NULL,
                content TEXT NOT NULL,
                metadata TEXT NOT NULL,
                embedding BLOB NOT NULL,
                created_at TEXT NOT NULL DEFAULT (STRFTIME('%Y-%m-%dT%H:%M:%fZ', 'now'))
            )",
        )
        .execute(&self.pool)
        .await
        .map_err(RagError::store)?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_vector_collection ON vector_records(collection)")
            .execute(&self.pool)
            .await
            .map_err(RagError::store)?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_vector_document ON vector_records(document_id)")
            .execute(&self.pool)
            .await
            .map_err(RagError::store)?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS store_meta (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at TEXT NOT NULL DEFAULT (STRFTIME('%Y-%m-%dT%H:%M:%fZ', 'now'))
            )",
        )
        .execute(&self.pool)
        .await
        .map_err(RagError::store)?;

        Ok(())
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

    fn row_to_chunk(row: &sqlx::sqlite::SqliteRow) -> Result<Chunk, RagError> {
        let metadata_str: String = row.get("metadata");
        let metadata: ChunkMetadata = serde_json::from_str(&metadata_str).map_err(RagError::store)?;

        Ok(Chunk {
            id: row.get("chunk_id"),
            text: row.get("content"),
            metadata,
        })
    }
}

pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    let denom = norm_a * norm_b;

    if denom <= f32::EPSILON {
        0.0
    } else {
        dot / denom
    }
}

#[async_trait]
impl VectorStore for SqliteVectorStore {
    async fn replace_document(
        &self,
        document_id: &str,
        records: Vec<VectorRecord>,
    ) -> Result<usize, RagError> {
        let mut tx = self.pool.begin().await.map_err(RagError::store)?;

        let removed = sqlx::query("DELETE FROM vector_records WHERE document_id = ?1")
            .bind(document_id)
            .execute(&mut *tx)
            .await
            .map_err(RagError::store)?
            .rows_affected();

        for record in &records {
            let blob = Self::serialize_embedding(&record.embedding);
            let metadata_str = serde_json::to_string(&record.chunk.metadata).map_err(RagError::store)?;

            sqlx::query(
                "INSERT OR REPLACE INTO vector_records
                    (chunk_id, document_id, collection, ordinal, content, metadata, embedding)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            )
            .bind(&record.chunk.id)
            .bind(document_id)
            .bind(record.collection())
            .bind(record.chunk.metadata.ordinal as i64)
            .bind(&record.chunk.text)
            .bind(&metadata_str)
            .bind(&blob)
            .execute(&mut *tx)
            .await
            .map_err(RagError::store)?;
        }

        tx.commit().await.map_err(RagError::store)?;
        tracing::debug!(
            "Replaced {} records of {} with {}",
            removed,
            document_id,
            records.len()
        );
        Ok(records.len())
    }

    async fn search(
        &self,
        query_embedding: &[f32],
        collection: &str,
        limit: usize,
    ) -> Result<Vec<SearchHit>, RagError> {
        if limit == 0 {
            return Ok(Vec::new());
        }

        let rows = sqlx::query(
            "SELECT chunk_id, content, metadata, embedding
             FROM vector_records
             WHERE collection = ?1
             ORDER BY document_id, ordinal",
        )
        .bind(collection)
        .fetch_all(&self.pool)
        .await
        .map_err(RagError::store)?;

        let mut scored = Vec::with_capacity(rows.len());
        for row in &rows {
            let embedding_bytes: Vec<u8> = row.get("embedding");
            if embedding_bytes.is_empty() {
                continue;
            }
            let stored = Self::deserialize_embedding(&embedding_bytes);
            scored.push(SearchHit {
                chunk: Self::row_to_chunk(row)?,
                score: cosine_similarity(query_embedding, &stored),
            });
        }

        // Stable: equal scores keep document order.
        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        scored.truncate(limit);

        Ok(scored)
    }

    async fn count(&self, collection: Option<&str>) -> Result<usize, RagError> {
        let count: i64 = if let Some(collection) = collection {
            sqlx::query_scalar("SELECT COUNT(*) FROM vector_records WHERE collection = ?1")
                .bind(collection)
                .fetch_one(&self.pool)
                .await
                .map_err(RagError::store)?
        } else {
            sqlx::query_scalar("SELECT COUNT(*) FROM vector_records")
                .fetch_one(&self.pool)
                .await
                .map_err(RagError::store)?
        };

        Ok(count as usize)
    }

    async fn collections(&self) -> Result<Vec<CollectionSummary>, RagError> {
        let rows = sqlx::query(
            "SELECT collection, COUNT(*) AS records
             FROM vector_records
             GROUP BY collection
             ORDER BY collection",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(RagError::store)?;

        Ok(rows
            .iter()
            .map(|row| CollectionSummary {
                name: row.get("collection"),
                count: row.get::<i64, _>("records") as usize,
            })
            .collect())
    }

    async fn documents(&self) -> Result<Vec<IndexedDocument>, RagError> {
        let rows = sqlx::query(
            "SELECT document_id, collection, MIN(metadata) AS metadata, COUNT(*) AS records
             FROM vector_records
             GROUP BY document_id, collection
             ORDER BY collection, document_id",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(RagError::store)?;

        rows.iter()
            .map(|row| {
                let metadata_str: String = row.get("metadata");
                let metadata: ChunkMetadata =
                    serde_json::from_str(&metadata_str).map_err(RagError::store)?;
                Ok(IndexedDocument {
                    document_id: row.get("document_id"),
                    restaurant: row.get("collection"),
                    source_file: metadata.source_file,
                    chunk_count: row.get::<i64, _>("records") as usize,
                })
            })
            .collect()
    }

    async fn delete_document(&self, document_id: &str) -> Result<usize, RagError> {
        let result = sqlx::query("DELETE FROM vector_records WHERE document_id = ?1")
            .bind(document_id)
            .execute(&self.pool)
            .await
            .map_err(RagError::store)?;

        Ok(result.rows_affected() as usize)
    }

    async fn embedding_model(&self) -> Result<Option<String>, RagError> {
        sqlx::query_scalar("SELECT value FROM store_meta WHERE key = 'embedding_model'")
            .fetch_optional(&self.pool)
            .await
            .map_err(RagError::store)
    }

    async fn reset(&self, embedding_model: &str) -> Result<(), RagError> {
        let mut tx = self.pool.begin().await.map_err(RagError::store)?;

        sqlx::query("DELETE FROM vector_records")
            .execute(&mut *tx)
            .await
            .map_err(RagError::store)?;

        sqlx::query(
            "INSERT OR REPLACE INTO store_meta (key, value, updated_at)
             VALUES ('embedding_model', ?1, STRFTIME('%Y-%m-%dT%H:%M:%fZ', 'now'))",
        )
        .bind(embedding_model)
        .execute(&mut *tx)
        .await
        .map_err(RagError::store)?;

        tx.commit().await.map_err(RagError::store)?;
        Ok(())
    }

    async fn close(&self) {
        self.pool.close().await;
        tracing::info!("Vector store closed");
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::parse::DocumentType;

    pub(crate) async fn test_store(dir: &tempfile::TempDir) -> SqliteVectorStore {
        SqliteVectorStore::with_path(dir.path().join("vectors.db"))
            .await
            .unwrap()
    }

    pub(crate) fn make_chunk(document_id: &str, restaurant: &str, ordinal: usize, text: &str) -> Chunk {
        Chunk {
            id: crate::chunking::chunk_id(document_id, ordinal),
            text: text.to_string(),
            metadata: ChunkMetadata {
                document_id: document_id.to_string(),
                restaurant: restaurant.to_string(),
                source_file: format!("{}.pdf", document_id),
                document_type: DocumentType::Menu,
                record_index: ordinal,
                ordinal,
                fragment: 0,
                fragment_count: 1,
                page: 1,
                item_name: None,
                ingredients: Vec::new(),
                declared_allergens: None,
            },
        }
    }

    fn record(document_id: &str, restaurant: &str, ordinal: usize, embedding: Vec<f32>) -> VectorRecord {
        VectorRecord {
            chunk: make_chunk(document_id, restaurant, ordinal, &format!("chunk {}", ordinal)),
            embedding,
        }
    }

    #[tokio::test]
    async fn replace_and_search_within_collection() {
        let dir = tempfile::tempdir().unwrap();
        let store = test_store(&dir).await;

        store
            .replace_document(
                "anchor__menu",
                vec![
                    record("anchor__menu", "anchor", 0, vec![1.0, 0.0, 0.0]),
                    record("anchor__menu", "anchor", 1, vec![0.0, 1.0, 0.0]),
                ],
            )
            .await
            .unwrap();
        store
            .replace_document("bella__menu", vec![record("bella__menu", "bella", 0, vec![1.0, 0.0, 0.0])])
            .await
            .unwrap();

        let hits = store.search(&[1.0, 0.0, 0.0], "anchor", 10).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].chunk.id, "anchor__menu#0");
        assert!(hits[0].score > 0.99);
        assert!(hits.iter().all(|hit| hit.chunk.metadata.restaurant == "anchor"));

        assert!(store.search(&[1.0, 0.0, 0.0], "unknown", 10).await.unwrap().is_empty());
        assert_eq!(store.search(&[1.0, 0.0, 0.0], "anchor", 1).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn reindexing_replaces_instead_of_duplicating() {
        let dir = tempfile::tempdir().unwrap();
        let store = test_store(&dir).await;

        let batch = || {
            vec![
                record("anchor__menu", "anchor", 0, vec![1.0, 0.0]),
                record("anchor__menu", "anchor", 1, vec![0.0, 1.0]),
            ]
        };
        store.replace_document("anchor__menu", batch()).await.unwrap();
        store.replace_document("anchor__menu", batch()).await.unwrap();
        assert_eq!(store.count(None).await.unwrap(), 2);

        store
            .replace_document("anchor__menu", vec![record("anchor__menu", "anchor", 0, vec![1.0, 0.0])])
            .await
            .unwrap();
        assert_eq!(store.count(Some("anchor")).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn lists_collections_and_documents() {
        let dir = tempfile::tempdir().unwrap();
        let store = test_store(&dir).await;

        store
            .replace_document("bella__menu", vec![record("bella__menu", "bella", 0, vec![1.0])])
            .await
            .unwrap();
        store
            .replace_document(
                "anchor__menu",
                vec![
                    record("anchor__menu", "anchor", 0, vec![1.0]),
                    record("anchor__menu", "anchor", 1, vec![1.0]),
                ],
            )
            .await
            .unwrap();

        let collections = store.collections().await.unwrap();
        assert_eq!(
            collections,
            vec![
                CollectionSummary { name: "anchor".into(), count: 2 },
                CollectionSummary { name: "bella".into(), count: 1 },
            ]
        );

        let documents = store.documents().await.unwrap();
        assert_eq!(documents.len(), 2);
        assert_eq!(documents[0].document_id, "anchor__menu");
        assert_eq!(documents[0].source_file, "anchor__menu.pdf");
        assert_eq!(documents[0].chunk_count, 2);

        assert_eq!(store.delete_document("anchor__menu").await.unwrap(), 2);
        assert_eq!(store.collections().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn reset_records_embedding_model() {
        let dir = tempfile::tempdir().unwrap();
        let store = test_store(&dir).await;
        assert_eq!(store.embedding_model().await.unwrap(), None);

        store
            .replace_document("anchor__menu", vec![record("anchor__menu", "anchor", 0, vec![1.0])])
            .await
            .unwrap();
        store.reset("mxbai-embed-large").await.unwrap();

        assert_eq!(store.count(None).await.unwrap(), 0);
        assert_eq!(
            store.embedding_model().await.unwrap().as_deref(),
            Some("mxbai-embed-large")
        );
    }

    #[tokio::test]
    async fn concurrent_readers_never_see_a_mixture() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(test_store(&dir).await);
        let batch = || {
            (0..5)
                .map(|ordinal| record("anchor__menu", "anchor", ordinal, vec![1.0, ordinal as f32]))
                .collect::<Vec<_>>()
        };
        store.replace_document("anchor__menu", batch()).await.unwrap();

        let writer = {
            let store = store.clone();
            tokio::spawn(async move {
                for _ in 0..20 {
                    store.replace_document("anchor__menu", batch()).await.unwrap();
                }
            })
        };

        for _ in 0..20 {
            let hits = store.search(&[1.0, 0.0], "anchor", 50).await.unwrap();
            assert_eq!(hits.len(), 5);
            let mut ids: Vec<_> = hits.iter().map(|hit| hit.chunk.id.clone()).collect();
            ids.sort();
            ids.dedup();
            assert_eq!(ids.len(), 5);
        }
        writer.await.unwrap();
        store.close().await;
    }

    #[test]
    fn cosine_handles_mismatched_and_zero_vectors() {
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[1.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[0.0, 0.0]), 0.0);
        assert!((cosine_similarity(&[1.0, 1.0], &[2.0, 2.0]) - 1.0).abs() < 1e-6);
    }
}
