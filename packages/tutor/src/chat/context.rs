//! Per-turn context assembly.
//!
//! Runs the three retrievals concurrently: prioritized insights plus
//! similar memories and facts (one memory-engine call), and the learning
//! graph snippet. Each source degrades independently.

use std::sync::Arc;

use tracing::warn;

use crate::graph::LearningGraphService;
use crate::memory::{MemoryContext, MemoryEngine};

/// Assembled context for one turn.
#[derive(Debug, Default)]
pub struct TurnContext {
    /// Behavioral-insight block for the prompt
    pub insights_block: String,

    /// Facts, relevant memories, and graph snippet
    pub memory_block: String,

    pub insights_count: usize,
    pub facts_count: usize,
    pub memories_count: usize,
}

/// Builds context from memory and the learning graph.
pub struct ContextBuilder {
    memory: Arc<MemoryEngine>,
    graph: Option<Arc<LearningGraphService>>,
}

impl ContextBuilder {
    pub fn new(memory: Arc<MemoryEngine>, graph: Option<Arc<LearningGraphService>>) -> Self {
        Self { memory, graph }
    }

    /// Build full context for a message.
    ///
    /// The three retrievals (insights, semantic recall, graph snippet)
    /// run concurrently; each degrades independently.
    pub async fn build(&self, user_id: &str, message: &str) -> TurnContext {
        let insights_future = self.memory.retrieve_insights_prioritized(user_id, 10);
        let recall_future = self.memory.semantic_recall(user_id, message, 5, 0.7);
        let graph_future = async {
            match &self.graph {
                Some(graph) => Some(graph.get_user_learning_context(user_id).await),
                None => None,
            }
        };

        let (insights, (memories, facts), graph_context) =
            tokio::join!(insights_future, recall_future, graph_future);

        let memory_context = MemoryContext {
            insights: insights.unwrap_or_else(|err| {
                warn!(error = %err, "insight retrieval failed");
                Vec::new()
            }),
            memories,
            facts,
        };

        let mut memory_block = memory_context.memory_block();
        if let Some(graph_context) = graph_context {
            let graph_block = graph_context.to_block();
            if !graph_block.is_empty() {
                if memory_block.is_empty() {
                    memory_block = graph_block;
                } else {
                    memory_block = format!("{}\n\n{}", memory_block, graph_block);
                }
            }
        }

        TurnContext {
            insights_block: memory_context.insights_block(),
            insights_count: memory_context.insights.len(),
            facts_count: memory_context.facts.len(),
            memories_count: memory_context.memories.len(),
            memory_block,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{EmbeddingService, LlmPool};
    use crate::memory::MemoryConfig;
    use crate::stores::memory::{InMemoryMemoryStore, MemoryGraphStore};
    use crate::testing::{MockAi, RecordingEventSink};
    use crate::types::{FactType, UserFact};

    #[tokio::test]
    async fn test_context_combines_memory_and_graph() {
        let ai = Arc::new(MockAi::new());
        let pool = LlmPool::new(ai.clone(), true);
        let embeddings = EmbeddingService::new(ai, 768);
        let store = Arc::new(InMemoryMemoryStore::new());
        let memory = Arc::new(MemoryEngine::new(
            store,
            embeddings,
            &pool,
            MemoryConfig::default(),
        ));

        memory
            .store_user_fact_upsert("u1", &UserFact::new(FactType::Name, "Minh"), None)
            .await
            .unwrap();

        let graph_store = Arc::new(MemoryGraphStore::new());
        let graph = Arc::new(LearningGraphService::new(
            graph_store,
            Arc::new(RecordingEventSink::new()),
        ));
        graph.record_study_session("u1", "colregs-basics", 0.5).await.unwrap();

        let builder = ContextBuilder::new(memory, Some(graph));
        let context = builder.build("u1", "Tôi tên là gì?").await;

        assert_eq!(context.facts_count, 1);
        assert!(context.memory_block.contains("name: Minh"));
        assert!(context.memory_block.contains("colregs-basics"));
    }
}
