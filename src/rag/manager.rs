use std::sync::Arc;

use super::retrieval::{diversify, diversity_cap, merge_ranked, CollectionScope};
use super::store::{SearchHit, VectorRecord, VectorStore};
use crate::chunking::Chunk;
use crate::core::errors::RagError;
use crate::llm::LlmService;

/// Inputs embedded per provider call.
const EMBED_BATCH_SIZE: usize = 32;

/// Embeds chunks and queries with the LLM service and keeps them in the
/// vector store. Opened once at startup, closed at shutdown.
#[derive(Clone)]
pub struct VectorStoreManager {
    store: Arc<dyn VectorStore>,
    llm: LlmService,
}

impl VectorStoreManager {
    /// Vectors computed with another embedding model are meaningless for
    /// the configured one, so a model change empties the store.
    pub async fn open(store: Arc<dyn VectorStore>, llm: LlmService) -> Result<Self, RagError> {
        let configured = llm.embedding_model().to_string();
        match store.embedding_model().await? {
            Some(stored) if stored == configured => {}
            Some(stored) => {
                tracing::warn!(
                    "Embedding model changed from {} to {}; clearing {} stored vectors",
                    stored,
                    configured,
                    store.count(None).await?
                );
                store.reset(&configured).await?;
            }
            None => store.reset(&configured).await?,
        }
        Ok(Self { store, llm })
    }

    pub fn store(&self) -> &Arc<dyn VectorStore> {
        &self.store
    }

    pub fn llm(&self) -> &LlmService {
        &self.llm
    }

    /// Replaces the vectors of `document_id` with `chunks`. Nothing is
    /// written unless every chunk was embedded.
    pub async fn index(&self, document_id: &str, chunks: &[Chunk]) -> Result<usize, RagError> {
        let mut records = Vec::with_capacity(chunks.len());
        for batch in chunks.chunks(EMBED_BATCH_SIZE) {
            let texts: Vec<String> = batch.iter().map(|chunk| chunk.text.clone()).collect();
            let embeddings = self.llm.embed(&texts).await.map_err(|err| match err {
                RagError::Timeout(after) => {
                    RagError::EmbeddingUnavailable(format!("embedding timed out after {:?}", after))
                }
                other => other,
            })?;
            records.extend(batch.iter().cloned().zip(embeddings).map(|(chunk, embedding)| {
                VectorRecord { chunk, embedding }
            }));
        }

        let stored = self.store.replace_document(document_id, records).await?;
        tracing::info!("Indexed {} chunks for {}", stored, document_id);
        Ok(stored)
    }

    /// The `k` chunks closest to `text` within `scope`.
    ///
    /// Restricted queries rank the top `k` of each named collection. A query
    /// over every collection fetches `2k` per collection and caps each
    /// restaurant so one large menu does not crowd out the others.
    pub async fn query(
        &self,
        text: &str,
        scope: &CollectionScope,
        k: usize,
    ) -> Result<Vec<SearchHit>, RagError> {
        if k == 0 {
            return Ok(Vec::new());
        }

        let collections: Vec<String> = match scope {
            CollectionScope::All => self
                .store
                .collections()
                .await?
                .into_iter()
                .map(|summary| summary.name)
                .collect(),
            CollectionScope::Only(names) => names.clone(),
        };
        if collections.is_empty() {
            return Ok(Vec::new());
        }

        let embedding = self.llm.embed_one(text).await?;
        let fetch = if scope.is_all() { k * 2 } else { k };

        let mut per_collection = Vec::with_capacity(collections.len());
        for collection in &collections {
            per_collection.push(self.store.search(&embedding, collection, fetch).await?);
        }

        let hits = if scope.is_all() {
            diversify(merge_ranked(per_collection, fetch), k, diversity_cap(k))
        } else {
            merge_ranked(per_collection, k)
        };
        tracing::debug!(
            "Retrieved {} chunks from {} collections",
            hits.len(),
            collections.len()
        );
        Ok(hits)
    }

    pub async fn close(&self) {
        self.store.close().await;
    }
}
