//! Runtime wiring: dependency-injected assembly of the whole core.
//!
//! Components that were process-wide singletons in earlier iterations are
//! plain constructor-injected values here; the only shared state is the
//! LLM pool and the store handles.

use std::sync::Arc;

use crate::chat::ChatOrchestrator;
use crate::config::TutorConfig;
use crate::crag::{
    AnswerVerifier, CragOrchestrator, MiniJudge, MiniJudgeConfig, QualityPreset, QueryAnalyzer,
    QueryRewriter, ReflectionParser, RetrievalGrader,
};
use crate::graph::LearningGraphService;
use crate::llm::{EmbeddingService, LlmPool};
use crate::memory::{MemoryConfig, MemoryEngine};
use crate::retrieval::{HybridRetriever, HydeExpander, RetrievalConfig};
use crate::traits::ai::Ai;
use crate::traits::guard::{EventSink, InputGuard};
use crate::traits::store::{GraphStore, KnowledgeStore, MemoryStore};

/// The assembled core.
pub struct TutorRuntime {
    pub pool: LlmPool,
    pub embeddings: EmbeddingService,
    pub memory: Arc<MemoryEngine>,
    pub graph: Option<Arc<LearningGraphService>>,
    pub crag: Arc<CragOrchestrator>,
    pub chat: ChatOrchestrator,
}

impl TutorRuntime {
    /// Wire every component from its dependencies.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        ai: Arc<dyn Ai>,
        knowledge: Arc<dyn KnowledgeStore>,
        memories: Arc<dyn MemoryStore>,
        graph_store: Option<Arc<dyn GraphStore>>,
        events: Arc<dyn EventSink>,
        guard: Arc<dyn InputGuard>,
        config: TutorConfig,
    ) -> Self {
        let pool = LlmPool::new(Arc::clone(&ai), config.thinking_enabled);
        let embeddings = EmbeddingService::new(Arc::clone(&ai), config.embedding_dimensions);
        let preset = QualityPreset::for_mode(config.quality_mode);

        let retriever = HybridRetriever::new(
            Arc::clone(&knowledge),
            embeddings.clone(),
            RetrievalConfig {
                rrf_k: config.rrf_k,
                dense_top_k: config.dense_top_k,
                sparse_top_k: config.sparse_top_k,
            },
        );

        let mini_judge = MiniJudge::new(
            pool.light(),
            MiniJudgeConfig {
                max_parallel: config.mini_judge_max_parallel,
                timeout: std::time::Duration::from_secs_f64(config.mini_judge_timeout_secs),
            },
        );

        let crag = Arc::new(CragOrchestrator::new(
            QueryAnalyzer::new(pool.light()),
            HydeExpander::new(pool.light()),
            retriever,
            RetrievalGrader::new(pool.moderate(), mini_judge, preset.relevance_threshold),
            QueryRewriter::new(pool.light()),
            AnswerVerifier::new(pool.light(), preset.verifier_min_confidence),
            ReflectionParser::new(config.quality_mode),
            preset,
            pool.clone(),
        ));

        let memory = Arc::new(MemoryEngine::new(
            memories,
            embeddings.clone(),
            &pool,
            MemoryConfig {
                max_insights: config.max_insights,
                consolidation_threshold: config.consolidation_threshold,
                preserve_days: config.preserve_days,
                summarize_token_threshold: config.summarize_token_threshold,
            },
        ));
        let summarizer = Arc::new(memory.summarizer(&pool));

        let graph = graph_store
            .map(|store| Arc::new(LearningGraphService::new(store, Arc::clone(&events))));

        let chat = ChatOrchestrator::new(
            guard,
            Arc::clone(&memory),
            summarizer,
            graph.clone(),
            Arc::clone(&crag),
        );

        Self {
            pool,
            embeddings,
            memory,
            graph,
            crag,
            chat,
        }
    }
}
