//! VectorStore trait: the persistence seam of the retrieval pipeline.
//!
//! Records are partitioned into collections, one per restaurant. The
//! primary implementation is `SqliteVectorStore` in the `sqlite` module.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::chunking::Chunk;
use crate::core::errors::RagError;

/// A chunk and its embedding, stored under `chunk.metadata.restaurant`.
#[derive(Debug, Clone)]
pub struct VectorRecord {
    pub chunk: Chunk,
    pub embedding: Vec<f32>,
}

impl VectorRecord {
    pub fn collection(&self) -> &str {
        &self.chunk.metadata.restaurant
    }
}

/// Result of a similarity search.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchHit {
    pub chunk: Chunk,
    /// Cosine similarity (higher = better).
    pub score: f32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionSummary {
    pub name: String,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexedDocument {
    pub document_id: String,
    pub restaurant: String,
    pub source_file: String,
    pub chunk_count: usize,
}

#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Delete every record of `document_id`, then insert `records`, as one
    /// transaction. Readers see either the old set or the new one.
    async fn replace_document(
        &self,
        document_id: &str,
        records: Vec<VectorRecord>,
    ) -> Result<usize, RagError>;

    /// Top `limit` records of `collection` by similarity. Unknown or empty
    /// collections yield an empty list.
    async fn search(
        &self,
        query_embedding: &[f32],
        collection: &str,
        limit: usize,
    ) -> Result<Vec<SearchHit>, RagError>;

    /// Record count, optionally restricted to one collection.
    async fn count(&self, collection: Option<&str>) -> Result<usize, RagError>;

    /// Non-empty collections with their record counts, sorted by name.
    async fn collections(&self) -> Result<Vec<CollectionSummary>, RagError>;

    async fn documents(&self) -> Result<Vec<IndexedDocument>, RagError>;

    async fn delete_document(&self, document_id: &str) -> Result<usize, RagError>;

    /// Embedding model the stored vectors were computed with.
    async fn embedding_model(&self) -> Result<Option<String>, RagError>;

    /// Drop every record and remember the new embedding model.
    async fn reset(&self, embedding_model: &str) -> Result<(), RagError>;

    async fn close(&self);
}
