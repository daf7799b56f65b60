//! Hybrid retrieval: dense vector search fused with full-text search.
//!
//! - [`rrf`] - Reciprocal Rank Fusion with the dual-channel boost
//! - [`sparse`] - tsquery building, synonym expansion, number boost
//! - [`hyde`] - hypothetical document expansion for vague queries

pub mod hyde;
pub mod rrf;
pub mod sparse;

pub use hyde::{HydeExpander, HydeResult};
pub use rrf::{fuse, DEFAULT_RRF_K};

use std::sync::Arc;

use tracing::{debug, instrument, warn};

use crate::error::Result;
use crate::llm::EmbeddingService;
use crate::traits::store::KnowledgeStore;
use crate::types::{FusedResult, RetrievedDocument};

/// Configuration for hybrid retrieval.
#[derive(Debug, Clone)]
pub struct RetrievalConfig {
    pub rrf_k: f32,
    pub dense_top_k: usize,
    pub sparse_top_k: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            rrf_k: DEFAULT_RRF_K,
            dense_top_k: 10,
            sparse_top_k: 10,
        }
    }
}

/// Hybrid retriever: embeds the (possibly HyDE-expanded) query, runs both
/// channels concurrently, and fuses with RRF.
///
/// Either channel failing degrades to the other alone; both failing yields
/// an empty result, never an error.
pub struct HybridRetriever {
    store: Arc<dyn KnowledgeStore>,
    embeddings: EmbeddingService,
    config: RetrievalConfig,
}

impl HybridRetriever {
    pub fn new(
        store: Arc<dyn KnowledgeStore>,
        embeddings: EmbeddingService,
        config: RetrievalConfig,
    ) -> Self {
        Self {
            store,
            embeddings,
            config,
        }
    }

    /// Retrieve the top-k fused documents for a query.
    ///
    /// `search_text` is what gets embedded (the HyDE passage when
    /// expansion ran); `raw_query` drives the sparse channel so exact
    /// citations keep their weight.
    #[instrument(skip(self), fields(limit = limit))]
    pub async fn retrieve(
        &self,
        raw_query: &str,
        search_text: &str,
        limit: usize,
    ) -> Result<Vec<RetrievedDocument>> {
        let dense_results = match self.embeddings.embed_query(search_text).await {
            Ok(query_embedding) => {
                match self
                    .store
                    .dense_search(&query_embedding, self.config.dense_top_k)
                    .await
                {
                    Ok(results) => results,
                    Err(err) => {
                        warn!(error = %err, "dense search failed, sparse alone drives RRF");
                        Vec::new()
                    }
                }
            }
            Err(err) => {
                warn!(error = %err, "query embedding failed, sparse alone drives RRF");
                Vec::new()
            }
        };

        let sparse_results = match self
            .store
            .sparse_search(raw_query, self.config.sparse_top_k)
            .await
        {
            Ok(results) => results,
            Err(err) => {
                warn!(error = %err, "sparse search failed, dense alone drives RRF");
                Vec::new()
            }
        };

        let fused = fuse(&dense_results, &sparse_results, self.config.rrf_k, limit);

        debug!(
            dense = dense_results.len(),
            sparse = sparse_results.len(),
            fused = fused.len(),
            "hybrid retrieval"
        );

        Ok(fused.into_iter().map(RetrievedDocument::from).collect())
    }

    /// Fused results with component scores, for callers that need them.
    pub async fn retrieve_fused(
        &self,
        raw_query: &str,
        search_text: &str,
        limit: usize,
    ) -> Result<Vec<FusedResult>> {
        let query_embedding = self.embeddings.embed_query(search_text).await?;
        let dense = self
            .store
            .dense_search(&query_embedding, self.config.dense_top_k)
            .await
            .unwrap_or_default();
        let sparse = self
            .store
            .sparse_search(raw_query, self.config.sparse_top_k)
            .await
            .unwrap_or_default();
        Ok(fuse(&dense, &sparse, self.config.rrf_k, limit))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::EmbeddingService;
    use crate::stores::memory::MemoryKnowledgeStore;
    use crate::testing::MockAi;
    use crate::types::{ContentType, KnowledgeChunk};

    async fn seeded_store(embeddings: &EmbeddingService) -> MemoryKnowledgeStore {
        let store = MemoryKnowledgeStore::new();

        let rule15 = "Rule 15: Khi hai tàu thuyền máy đi cắt hướng nhau, tàu thuyền nào thấy \
                      tàu thuyền kia ở bên mạn phải của mình thì phải nhường đường.";
        let rule13 = "Rule 13: Tàu thuyền vượt phải nhường đường cho tàu thuyền bị vượt.";

        for (i, (content, title)) in [(rule15, "Rule 15"), (rule13, "Rule 13")]
            .iter()
            .enumerate()
        {
            let embedding = embeddings.embed_document(content).await.unwrap();
            let chunk = KnowledgeChunk::new("colregs-vn", (i + 1) as i32, 0, *content)
                .with_embedding(embedding)
                .with_content_type(ContentType::Heading)
                .with_metadata(serde_json::json!({"title": title}));
            store.upsert_chunk(&chunk).await.unwrap();
        }

        store
    }

    #[tokio::test]
    async fn test_hybrid_retrieval_returns_results() {
        let ai = std::sync::Arc::new(MockAi::new());
        let embeddings = EmbeddingService::new(ai, 768);
        let store = std::sync::Arc::new(seeded_store(&embeddings).await);

        let retriever = HybridRetriever::new(store, embeddings, RetrievalConfig::default());
        let query = "Rule 15 cắt hướng";
        let docs = retriever.retrieve(query, query, 10).await.unwrap();

        assert!(!docs.is_empty());
        // number boost should favor the Rule 15 chunk in sparse, and
        // fusion keeps it at the top
        assert!(docs[0].content.contains("Rule 15"));
    }

    #[tokio::test]
    async fn test_embedding_failure_degrades_to_sparse() {
        let good_ai = std::sync::Arc::new(MockAi::new());
        let good_embeddings = EmbeddingService::new(good_ai, 768);
        let store = std::sync::Arc::new(seeded_store(&good_embeddings).await);

        let failing = EmbeddingService::new(std::sync::Arc::new(MockAi::new().failing_embeddings()), 768);
        let retriever = HybridRetriever::new(store, failing, RetrievalConfig::default());

        let docs = retriever
            .retrieve("Rule 15 cắt hướng", "Rule 15 cắt hướng", 10)
            .await
            .unwrap();
        assert!(!docs.is_empty());
    }
}
