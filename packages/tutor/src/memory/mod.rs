//! The persistent memory subsystem.
//!
//! - [`insight`] - behavioral insight extraction
//! - [`validator`] - duplicate/contradiction validation
//! - [`consolidator`] - LLM consolidation at capacity
//! - [`facts`] - user-fact extraction
//! - [`summarizer`] - session summarization
//!
//! `MemoryEngine` is the facade the chat layer talks to. Per user the
//! insight list is capped: consolidation triggers at the threshold, and
//! the hard cap falls back to FIFO eviction of insights not accessed
//! within the preserve window. Eviction honors the window on every path.

pub mod consolidator;
pub mod facts;
pub mod insight;
pub mod summarizer;
pub mod validator;

pub use consolidator::{ConsolidationResult, MemoryConsolidator, CONSOLIDATION_TARGET};
pub use facts::FactExtractor;
pub use insight::InsightExtractor;
pub use summarizer::SessionSummarizer;
pub use validator::{InsightValidator, ValidationAction, DUPLICATE_SIMILARITY_THRESHOLD};

use std::sync::Arc;

use chrono::{Duration, Utc};
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::llm::{EmbeddingService, LlmPool};
use crate::traits::store::MemoryStore;
use crate::types::{Insight, InsightCategory, MemoryKind, MemoryRecord, MemorySearchResult, UserFact};

/// Memory engine limits.
#[derive(Debug, Clone)]
pub struct MemoryConfig {
    pub max_insights: usize,
    pub consolidation_threshold: usize,
    pub preserve_days: i64,
    pub summarize_token_threshold: usize,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            max_insights: 50,
            consolidation_threshold: 40,
            preserve_days: 7,
            summarize_token_threshold: 2000,
        }
    }
}

/// Context assembled from memory for prompt building.
#[derive(Debug, Default)]
pub struct MemoryContext {
    pub insights: Vec<Insight>,
    pub memories: Vec<MemorySearchResult>,
    pub facts: Vec<MemoryRecord>,
}

impl MemoryContext {
    /// The behavioral-insight block for the generation prompt.
    pub fn insights_block(&self) -> String {
        if self.insights.is_empty() {
            return String::new();
        }
        let lines: Vec<String> = self
            .insights
            .iter()
            .take(5)
            .map(|insight| format!("- [{}] {}", insight.category.as_str(), insight.content))
            .collect();
        format!("=== Behavioral Insights ===\n{}", lines.join("\n"))
    }

    /// Facts + relevant memories block for the generation prompt.
    pub fn memory_block(&self) -> String {
        let mut sections = Vec::new();

        if !self.facts.is_empty() {
            let lines: Vec<String> = self.facts.iter().map(|f| format!("- {}", f.content)).collect();
            sections.push(format!("=== Thông tin người dùng ===\n{}", lines.join("\n")));
        }

        if !self.memories.is_empty() {
            let lines: Vec<String> = self
                .memories
                .iter()
                .map(|m| format!("- {}", m.record.content))
                .collect();
            sections.push(format!("=== Ký ức liên quan ===\n{}", lines.join("\n")));
        }

        sections.join("\n\n")
    }
}

/// Facade over extraction, validation, consolidation, and storage.
pub struct MemoryEngine {
    store: Arc<dyn MemoryStore>,
    embeddings: EmbeddingService,
    insight_extractor: InsightExtractor,
    validator: InsightValidator,
    consolidator: MemoryConsolidator,
    fact_extractor: FactExtractor,
    config: MemoryConfig,
}

impl MemoryEngine {
    pub fn new(
        store: Arc<dyn MemoryStore>,
        embeddings: EmbeddingService,
        pool: &LlmPool,
        config: MemoryConfig,
    ) -> Self {
        Self {
            store,
            embeddings: embeddings.clone(),
            insight_extractor: InsightExtractor::new(pool.light()),
            validator: InsightValidator::new(embeddings),
            consolidator: MemoryConsolidator::new(pool.light()),
            fact_extractor: FactExtractor::new(pool.light()),
            config,
        }
    }

    pub fn store(&self) -> Arc<dyn MemoryStore> {
        Arc::clone(&self.store)
    }

    /// Session summarizer wired to this engine's store.
    pub fn summarizer(&self, pool: &LlmPool) -> SessionSummarizer {
        SessionSummarizer::new(
            pool.light(),
            Arc::clone(&self.store),
            self.embeddings.clone(),
            self.config.summarize_token_threshold,
        )
    }

    // ==================== retrieval ====================

    /// All of a user's insights.
    pub async fn get_user_insights(&self, user_id: &str) -> Result<Vec<Insight>> {
        let records = self
            .store
            .get_by_kind(user_id, MemoryKind::Insight, self.config.max_insights * 2)
            .await?;
        Ok(records.iter().filter_map(Insight::from_record).collect())
    }

    /// Prioritized insight retrieval for prompt assembly.
    ///
    /// Priority categories (knowledge gaps, learning style) come first;
    /// each group is ordered by last access. The returned subset has its
    /// last-accessed timestamps touched.
    pub async fn retrieve_insights_prioritized(
        &self,
        user_id: &str,
        limit: usize,
    ) -> Result<Vec<Insight>> {
        let all = self.get_user_insights(user_id).await?;
        if all.is_empty() {
            return Ok(Vec::new());
        }

        let (mut priority, mut other): (Vec<Insight>, Vec<Insight>) = all
            .into_iter()
            .partition(|insight| insight.category.is_priority());

        let sort_key = |insight: &Insight| {
            insight
                .last_accessed
                .or(insight.created_at)
                .unwrap_or_else(|| Utc::now() - Duration::days(3650))
        };
        priority.sort_by_key(|i| std::cmp::Reverse(sort_key(i)));
        other.sort_by_key(|i| std::cmp::Reverse(sort_key(i)));

        let mut result = priority;
        result.extend(other);
        result.truncate(limit);

        for insight in &result {
            if let Some(id) = insight.id {
                let _ = self.store.touch_last_accessed(id).await;
            }
        }

        Ok(result)
    }

    /// Traditional semantic recall: memories similar to the query plus
    /// the user's facts (one per fact type by construction).
    pub async fn semantic_recall(
        &self,
        user_id: &str,
        query: &str,
        search_limit: usize,
        min_similarity: f32,
    ) -> (Vec<MemorySearchResult>, Vec<MemoryRecord>) {
        let memories = match self.embeddings.embed_query(query).await {
            Ok(embedding) => self
                .store
                .search_similar(user_id, &embedding, search_limit, min_similarity)
                .await
                .unwrap_or_default(),
            Err(err) => {
                warn!(error = %err, "memory search skipped, query embedding failed");
                Vec::new()
            }
        };

        // Fact rows come through the dedicated facts section, not the
        // similarity list
        let memories = memories
            .into_iter()
            .filter(|m| m.record.kind != MemoryKind::UserFact)
            .collect();

        let facts = self
            .store
            .get_by_kind(user_id, MemoryKind::UserFact, 10)
            .await
            .unwrap_or_default();

        (memories, facts)
    }

    /// Cross-session context for a query: prioritized insights, similar
    /// memories, and user facts, fetched concurrently.
    pub async fn retrieve_context(
        &self,
        user_id: &str,
        query: &str,
        search_limit: usize,
        min_similarity: f32,
    ) -> Result<MemoryContext> {
        let (insights, (memories, facts)) = tokio::join!(
            self.retrieve_insights_prioritized(user_id, 10),
            self.semantic_recall(user_id, query, search_limit, min_similarity),
        );

        Ok(MemoryContext {
            insights: insights.unwrap_or_default(),
            memories,
            facts,
        })
    }

    // ==================== writes ====================

    /// Persist both sides of a turn as message memories.
    pub async fn store_interaction(
        &self,
        user_id: &str,
        message: &str,
        response: &str,
        session_id: Option<&str>,
    ) -> Result<()> {
        for (content, importance) in [(message, 0.5_f32), (response, 0.4_f32)] {
            if content.trim().is_empty() {
                continue;
            }
            let embedding = self.embeddings.embed_document(content).await?;
            let mut record = MemoryRecord::new(user_id, MemoryKind::Message, content)
                .with_embedding(embedding)
                .with_importance(importance);
            if let Some(session_id) = session_id {
                record = record.with_session(session_id);
            }
            self.store.save_memory(&record).await?;
        }
        Ok(())
    }

    /// Persist a blocked message with its marker; never embedded.
    pub async fn store_blocked_message(
        &self,
        user_id: &str,
        message: &str,
        reason: &str,
        session_id: Option<&str>,
    ) -> Result<()> {
        let mut record = MemoryRecord::new(user_id, MemoryKind::Message, message)
            .with_importance(0.1)
            .with_metadata(serde_json::json!({
                "is_blocked": true,
                "block_reason": reason,
            }));
        if let Some(session_id) = session_id {
            record = record.with_session(session_id);
        }
        self.store.save_memory(&record).await?;
        Ok(())
    }

    /// Extract behavioral insights from a turn and store them with
    /// validation; then run the capacity checks.
    pub async fn extract_and_store_insights(
        &self,
        user_id: &str,
        message: &str,
        history: &[String],
        session_id: Option<&str>,
    ) -> Result<Vec<Insight>> {
        let extracted = self.insight_extractor.extract(user_id, message, history).await;
        if extracted.is_empty() {
            return Ok(Vec::new());
        }

        let mut existing = self.get_user_insights(user_id).await?;
        let mut stored = Vec::new();

        for insight in extracted {
            match self.validator.validate(&insight, &existing).await {
                ValidationAction::Reject { reason } => {
                    debug!(reason = %reason, "insight rejected");
                }
                ValidationAction::Merge { target, similarity } => {
                    self.merge_insight(&insight, &existing[target], similarity)
                        .await?;
                    stored.push(insight);
                }
                ValidationAction::Update { target } => {
                    self.supersede_insight(&insight, &existing[target]).await?;
                    stored.push(insight);
                }
                ValidationAction::Store => {
                    if let Some(saved) = self.store_new_insight(&insight, session_id).await? {
                        existing.push(saved.clone());
                        stored.push(saved);
                    }
                }
            }
        }

        self.check_capacity(user_id).await?;

        info!(user_id, stored = stored.len(), "insights processed");
        Ok(stored)
    }

    /// Extract user facts and upsert them per (user, fact_type).
    pub async fn extract_and_store_facts(
        &self,
        user_id: &str,
        message: &str,
        session_id: Option<&str>,
    ) -> Result<Vec<UserFact>> {
        let facts = self.fact_extractor.extract(message).await;
        for fact in &facts {
            self.store_user_fact_upsert(user_id, fact, session_id).await?;
        }
        Ok(facts)
    }

    /// Upsert one user fact.
    pub async fn store_user_fact_upsert(
        &self,
        user_id: &str,
        fact: &UserFact,
        session_id: Option<&str>,
    ) -> Result<()> {
        let content = fact.to_content();
        let embedding = self.embeddings.embed_document(&content).await?;

        let mut record = MemoryRecord::new(user_id, MemoryKind::UserFact, content)
            .with_embedding(embedding)
            .with_importance(fact.confidence)
            .with_metadata(fact.to_metadata());
        if let Some(session_id) = session_id {
            record = record.with_session(session_id);
        }

        self.store
            .upsert_user_fact(user_id, fact.fact_type.as_str(), &record)
            .await?;
        Ok(())
    }

    // ==================== capacity ====================

    /// Consolidate at the threshold; FIFO-evict at the hard cap.
    async fn check_capacity(&self, user_id: &str) -> Result<()> {
        let count = self.store.count_by_kind(user_id, MemoryKind::Insight).await?;

        if count >= self.config.consolidation_threshold {
            let insights = self.get_user_insights(user_id).await?;
            if let Some(result) = self.consolidator.consolidate(&insights).await {
                self.replace_insights(user_id, &insights, result.consolidated)
                    .await?;
                return Ok(());
            }
            warn!(user_id, count, "consolidation failed, falling back to eviction");
        }

        self.enforce_hard_limit(user_id).await
    }

    /// Hard cap: evict oldest insights not accessed within the preserve
    /// window until at or under the limit.
    pub async fn enforce_hard_limit(&self, user_id: &str) -> Result<()> {
        let count = self.store.count_by_kind(user_id, MemoryKind::Insight).await?;
        if count <= self.config.max_insights {
            return Ok(());
        }

        let preserve_after = Utc::now() - Duration::days(self.config.preserve_days);
        let excess = count - self.config.max_insights;
        let deleted = self
            .store
            .delete_oldest_unaccessed(user_id, MemoryKind::Insight, preserve_after, excess)
            .await?;

        if deleted < excess {
            // Everything left was recently accessed; the overshoot
            // resolves at the next consolidation check
            warn!(
                user_id,
                deleted, excess, "eviction limited by preserve window"
            );
        } else {
            info!(user_id, deleted, "FIFO eviction");
        }
        Ok(())
    }

    async fn replace_insights(
        &self,
        user_id: &str,
        old: &[Insight],
        consolidated: Vec<Insight>,
    ) -> Result<()> {
        for insight in old {
            if let Some(id) = insight.id {
                let _ = self.store.delete_memory(id).await;
            }
        }
        for insight in consolidated {
            self.store_new_insight(&insight, None).await?;
        }
        info!(user_id, "insights replaced after consolidation");
        Ok(())
    }

    async fn store_new_insight(
        &self,
        insight: &Insight,
        session_id: Option<&str>,
    ) -> Result<Option<Insight>> {
        let embedding = match self.embeddings.embed_document(&insight.content).await {
            Ok(embedding) => embedding,
            Err(err) => {
                warn!(error = %err, "insight embedding failed, skipping store");
                return Ok(None);
            }
        };

        let mut record = MemoryRecord::new(&insight.user_id, MemoryKind::Insight, &insight.content)
            .with_embedding(embedding)
            .with_importance(insight.confidence)
            .with_metadata(insight.to_metadata());
        if let Some(session_id) = session_id {
            record = record.with_session(session_id);
        }

        let id = self.store.save_memory(&record).await?;
        let mut saved = insight.clone();
        saved.id = Some(id);
        saved.created_at = Some(record.created_at);
        Ok(Some(saved))
    }

    /// Merge a duplicate: average confidences, append an evolution note.
    async fn merge_insight(
        &self,
        new_insight: &Insight,
        existing: &Insight,
        similarity: f32,
    ) -> Result<()> {
        let Some(id) = existing.id else {
            return Ok(());
        };

        let merged_confidence = (existing.confidence + new_insight.confidence) / 2.0;
        let mut merged = existing.clone();
        merged.confidence = merged_confidence;
        merged.evolution_notes.push(format!(
            "Merged with similar insight ({:.2}): {}",
            similarity,
            truncate_note(&new_insight.content)
        ));

        self.store
            .update_memory(id, &existing.content, None, &merged.to_metadata())
            .await?;
        Ok(())
    }

    /// Supersede a contradicted insight: new content and embedding, with
    /// a superseded note.
    async fn supersede_insight(&self, new_insight: &Insight, existing: &Insight) -> Result<()> {
        let Some(id) = existing.id else {
            return Ok(());
        };

        let embedding = self.embeddings.embed_document(&new_insight.content).await?;
        let mut updated = new_insight.clone();
        updated.evolution_notes = existing.evolution_notes.clone();
        updated
            .evolution_notes
            .push(format!("Superseded: {}", truncate_note(&existing.content)));

        self.store
            .update_memory(id, &new_insight.content, Some(&embedding), &updated.to_metadata())
            .await?;
        Ok(())
    }

    /// Insight categories currently present for a user (for graph sync).
    pub async fn knowledge_gap_insights(&self, user_id: &str) -> Result<Vec<Insight>> {
        Ok(self
            .get_user_insights(user_id)
            .await?
            .into_iter()
            .filter(|insight| insight.category == InsightCategory::KnowledgeGap)
            .collect())
    }
}

fn truncate_note(content: &str) -> String {
    let truncated: String = content.chars().take(50).collect();
    if truncated.chars().count() < content.chars().count() {
        format!("{}...", truncated)
    } else {
        truncated
    }
}
