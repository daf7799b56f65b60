//! In-memory storage implementations.
//!
//! Useful for tests and examples; mirror the Postgres store's semantics
//! (upsert keys, eviction windows, number boost) without a database.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::RwLock;
use uuid::Uuid;

use crate::error::{Result, TutorError};
use crate::llm::cosine_similarity;
use crate::retrieval::sparse::{apply_number_boost, build_tsquery};
use crate::traits::store::{
    GraphStore, KnowledgeGapTopic, KnowledgeStore, MemoryStore, StudiedModule,
};
use crate::types::{
    DenseResult, KnowledgeChunk, MemoryKind, MemoryRecord, MemorySearchResult, SparseResult,
};

/// In-memory knowledge store backing both retrieval channels.
#[derive(Default)]
pub struct MemoryKnowledgeStore {
    // key: (document_id, page_number, chunk_index)
    chunks: RwLock<HashMap<(String, i32, i32), KnowledgeChunk>>,
}

impl MemoryKnowledgeStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.chunks.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl KnowledgeStore for MemoryKnowledgeStore {
    async fn upsert_chunk(&self, chunk: &KnowledgeChunk) -> Result<()> {
        let key = (
            chunk.document_id.clone(),
            chunk.page_number,
            chunk.chunk_index,
        );
        self.chunks.write().unwrap().insert(key, chunk.clone());
        Ok(())
    }

    async fn delete_chunk(&self, chunk_id: &str) -> Result<()> {
        let mut chunks = self.chunks.write().unwrap();
        chunks.retain(|_, chunk| chunk.id.to_string() != chunk_id);
        Ok(())
    }

    async fn dense_search(
        &self,
        query_embedding: &[f32],
        limit: usize,
    ) -> Result<Vec<DenseResult>> {
        let chunks = self.chunks.read().unwrap();
        let mut scored: Vec<DenseResult> = chunks
            .values()
            .filter(|chunk| !chunk.embedding.is_empty())
            .map(|chunk| {
                DenseResult::new(
                    chunk.id.to_string(),
                    chunk.content.clone(),
                    cosine_similarity(query_embedding, &chunk.embedding),
                )
            })
            .collect();

        scored.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        scored.truncate(limit);
        Ok(scored)
    }

    async fn sparse_search(&self, query: &str, limit: usize) -> Result<Vec<SparseResult>> {
        // Token-overlap stand-in for ts_rank over the same OR-joined terms
        let tsquery = build_tsquery(query);
        let terms: Vec<&str> = tsquery.split(" | ").collect();

        let chunks = self.chunks.read().unwrap();
        let mut results: Vec<SparseResult> = chunks
            .values()
            .filter_map(|chunk| {
                let content_lower = chunk.content.to_lowercase();
                let matches = terms
                    .iter()
                    .filter(|term| content_lower.contains(&term.to_lowercase()))
                    .count();
                if matches == 0 {
                    return None;
                }
                let score = matches as f32 / terms.len().max(1) as f32;
                Some(
                    SparseResult::new(chunk.id.to_string(), chunk.content.clone(), score)
                        .with_title(chunk.title())
                        .with_page(chunk.document_id.clone(), chunk.page_number),
                )
                .map(|mut result| {
                    result.image_url = chunk.image_url.clone();
                    result.bounding_boxes = chunk.bounding_boxes.clone();
                    result
                })
            })
            .collect();

        results.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        // Fetch 2x then boost + truncate, as the SQL store does
        results.truncate(limit * 2);
        Ok(apply_number_boost(results, query, limit))
    }

    async fn get_chunk(&self, chunk_id: &str) -> Result<Option<KnowledgeChunk>> {
        let chunks = self.chunks.read().unwrap();
        Ok(chunks
            .values()
            .find(|chunk| chunk.id.to_string() == chunk_id)
            .cloned())
    }

    async fn count_page_chunks(&self, document_id: &str, page_number: i32) -> Result<usize> {
        let chunks = self.chunks.read().unwrap();
        Ok(chunks
            .keys()
            .filter(|(doc, page, _)| doc == document_id && *page == page_number)
            .count())
    }
}

/// In-memory semantic memory store.
#[derive(Default)]
pub struct InMemoryMemoryStore {
    records: RwLock<Vec<MemoryRecord>>,
}

impl InMemoryMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl MemoryStore for InMemoryMemoryStore {
    async fn save_memory(&self, record: &MemoryRecord) -> Result<Uuid> {
        if record.content.trim().is_empty() {
            return Err(TutorError::Validation {
                reason: "memory content cannot be empty".into(),
            });
        }
        self.records.write().unwrap().push(record.clone());
        Ok(record.id)
    }

    async fn search_similar(
        &self,
        user_id: &str,
        query_embedding: &[f32],
        limit: usize,
        min_similarity: f32,
    ) -> Result<Vec<MemorySearchResult>> {
        let records = self.records.read().unwrap();
        let mut scored: Vec<MemorySearchResult> = records
            .iter()
            .filter(|r| r.user_id == user_id && !r.embedding.is_empty())
            .map(|r| MemorySearchResult {
                record: r.clone(),
                similarity: cosine_similarity(query_embedding, &r.embedding),
            })
            .filter(|r| r.similarity >= min_similarity)
            .collect();

        scored.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        scored.truncate(limit);
        Ok(scored)
    }

    async fn get_by_kind(
        &self,
        user_id: &str,
        kind: MemoryKind,
        limit: usize,
    ) -> Result<Vec<MemoryRecord>> {
        let records = self.records.read().unwrap();
        let mut matching: Vec<MemoryRecord> = records
            .iter()
            .filter(|r| r.user_id == user_id && r.kind == kind)
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        matching.truncate(limit);
        Ok(matching)
    }

    async fn update_memory(
        &self,
        id: Uuid,
        content: &str,
        embedding: Option<&[f32]>,
        metadata: &serde_json::Value,
    ) -> Result<bool> {
        let mut records = self.records.write().unwrap();
        for record in records.iter_mut() {
            if record.id == id {
                record.content = content.to_string();
                if let Some(embedding) = embedding {
                    record.embedding = embedding.to_vec();
                }
                record.metadata = metadata.clone();
                record.updated_at = Some(Utc::now());
                return Ok(true);
            }
        }
        Ok(false)
    }

    async fn touch_last_accessed(&self, id: Uuid) -> Result<bool> {
        let mut records = self.records.write().unwrap();
        for record in records.iter_mut() {
            if record.id == id {
                record.last_accessed = Some(Utc::now());
                return Ok(true);
            }
        }
        Ok(false)
    }

    async fn count_by_kind(&self, user_id: &str, kind: MemoryKind) -> Result<usize> {
        let records = self.records.read().unwrap();
        Ok(records
            .iter()
            .filter(|r| r.user_id == user_id && r.kind == kind)
            .count())
    }

    async fn delete_memory(&self, id: Uuid) -> Result<bool> {
        let mut records = self.records.write().unwrap();
        let before = records.len();
        records.retain(|r| r.id != id);
        Ok(records.len() < before)
    }

    async fn delete_oldest_unaccessed(
        &self,
        user_id: &str,
        kind: MemoryKind,
        preserve_after: DateTime<Utc>,
        max_delete: usize,
    ) -> Result<usize> {
        let mut records = self.records.write().unwrap();

        let mut candidates: Vec<(Uuid, DateTime<Utc>)> = records
            .iter()
            .filter(|r| {
                r.user_id == user_id
                    && r.kind == kind
                    && r.last_accessed.unwrap_or(r.created_at) < preserve_after
            })
            .map(|r| (r.id, r.created_at))
            .collect();

        candidates.sort_by_key(|(_, created)| *created);
        let to_delete: Vec<Uuid> = candidates
            .into_iter()
            .take(max_delete)
            .map(|(id, _)| id)
            .collect();

        let before = records.len();
        records.retain(|r| !to_delete.contains(&r.id));
        Ok(before - records.len())
    }

    async fn upsert_user_fact(
        &self,
        user_id: &str,
        fact_type: &str,
        record: &MemoryRecord,
    ) -> Result<Uuid> {
        let mut records = self.records.write().unwrap();

        for existing in records.iter_mut() {
            if existing.user_id == user_id
                && existing.kind == MemoryKind::UserFact
                && existing.metadata.get("fact_type").and_then(|v| v.as_str()) == Some(fact_type)
            {
                existing.content = record.content.clone();
                existing.embedding = record.embedding.clone();
                existing.metadata = record.metadata.clone();
                existing.updated_at = Some(Utc::now());
                return Ok(existing.id);
            }
        }

        records.push(record.clone());
        Ok(record.id)
    }

    async fn delete_session_messages(&self, user_id: &str, session_id: &str) -> Result<usize> {
        let mut records = self.records.write().unwrap();
        let before = records.len();
        records.retain(|r| {
            !(r.user_id == user_id
                && r.kind == MemoryKind::Message
                && r.session_id.as_deref() == Some(session_id))
        });
        Ok(before - records.len())
    }
}

/// In-memory learning graph store.
#[derive(Default)]
pub struct MemoryGraphStore {
    studied: RwLock<HashMap<(String, String), StudiedModule>>,
    weaknesses: RwLock<HashMap<(String, String), f32>>,
    prerequisites: RwLock<Vec<(String, String)>>,
}

impl MemoryGraphStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl GraphStore for MemoryGraphStore {
    async fn mark_studied(
        &self,
        user_id: &str,
        module_id: &str,
        progress: f32,
        last_studied: DateTime<Utc>,
    ) -> Result<()> {
        let key = (user_id.to_string(), module_id.to_string());
        let mut studied = self.studied.write().unwrap();
        let entry = studied.entry(key).or_insert(StudiedModule {
            module_id: module_id.to_string(),
            title: module_id.to_string(),
            progress: 0.0,
            last_studied,
            completed: false,
        });
        entry.progress = progress.clamp(0.0, 1.0);
        entry.last_studied = last_studied;
        Ok(())
    }

    async fn mark_completed(&self, user_id: &str, module_id: &str) -> Result<()> {
        let key = (user_id.to_string(), module_id.to_string());
        let mut studied = self.studied.write().unwrap();
        let entry = studied.entry(key).or_insert(StudiedModule {
            module_id: module_id.to_string(),
            title: module_id.to_string(),
            progress: 1.0,
            last_studied: Utc::now(),
            completed: false,
        });
        entry.completed = true;
        entry.progress = 1.0;
        Ok(())
    }

    async fn mark_weak_at(&self, user_id: &str, topic: &str, confidence: f32) -> Result<()> {
        self.weaknesses
            .write()
            .unwrap()
            .insert((user_id.to_string(), topic.to_string()), confidence);
        Ok(())
    }

    async fn add_prerequisite(&self, module_id: &str, requires_module_id: &str) -> Result<()> {
        let mut prerequisites = self.prerequisites.write().unwrap();
        let pair = (module_id.to_string(), requires_module_id.to_string());
        if !prerequisites.contains(&pair) {
            prerequisites.push(pair);
        }
        Ok(())
    }

    async fn learning_path(&self, user_id: &str, limit: usize) -> Result<Vec<StudiedModule>> {
        let studied = self.studied.read().unwrap();
        let mut modules: Vec<StudiedModule> = studied
            .iter()
            .filter(|((user, _), _)| user == user_id)
            .map(|(_, module)| module.clone())
            .collect();
        modules.sort_by(|a, b| b.last_studied.cmp(&a.last_studied));
        modules.truncate(limit);
        Ok(modules)
    }

    async fn knowledge_gaps(&self, user_id: &str, limit: usize) -> Result<Vec<KnowledgeGapTopic>> {
        let weaknesses = self.weaknesses.read().unwrap();
        let mut gaps: Vec<KnowledgeGapTopic> = weaknesses
            .iter()
            .filter(|((user, _), _)| user == user_id)
            .map(|((_, topic), confidence)| KnowledgeGapTopic {
                topic: topic.clone(),
                confidence: *confidence,
            })
            .collect();
        gaps.sort_by(|a, b| {
            b.confidence
                .partial_cmp(&a.confidence)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        gaps.truncate(limit);
        Ok(gaps)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[tokio::test]
    async fn test_chunk_upsert_is_keyed_on_page_and_index() {
        let store = MemoryKnowledgeStore::new();

        let first = KnowledgeChunk::new("doc", 1, 0, "old content");
        let second = KnowledgeChunk::new("doc", 1, 0, "new content");
        store.upsert_chunk(&first).await.unwrap();
        store.upsert_chunk(&second).await.unwrap();

        assert_eq!(store.len(), 1);
        assert_eq!(store.count_page_chunks("doc", 1).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_user_fact_upsert_keeps_one_row() {
        let store = InMemoryMemoryStore::new();

        let first = MemoryRecord::new("u1", MemoryKind::UserFact, "name: Minh")
            .with_metadata(serde_json::json!({"fact_type": "name"}));
        let second = MemoryRecord::new("u1", MemoryKind::UserFact, "name: Minh Nguyễn")
            .with_metadata(serde_json::json!({"fact_type": "name"}));

        store.upsert_user_fact("u1", "name", &first).await.unwrap();
        store.upsert_user_fact("u1", "name", &second).await.unwrap();

        let facts = store
            .get_by_kind("u1", MemoryKind::UserFact, 10)
            .await
            .unwrap();
        assert_eq!(facts.len(), 1);
        assert_eq!(facts[0].content, "name: Minh Nguyễn");
        assert!(facts[0].updated_at.is_some());
    }

    #[tokio::test]
    async fn test_delete_oldest_respects_preserve_window() {
        let store = InMemoryMemoryStore::new();
        let now = Utc::now();

        // One old, unaccessed insight and one recently accessed
        let mut old = MemoryRecord::new("u1", MemoryKind::Insight, "old insight about habits");
        old.created_at = now - Duration::days(30);
        let mut fresh = MemoryRecord::new("u1", MemoryKind::Insight, "fresh insight about style");
        fresh.created_at = now - Duration::days(30);
        fresh.last_accessed = Some(now);

        store.save_memory(&old).await.unwrap();
        store.save_memory(&fresh).await.unwrap();

        let cutoff = now - Duration::days(7);
        let deleted = store
            .delete_oldest_unaccessed("u1", MemoryKind::Insight, cutoff, 10)
            .await
            .unwrap();

        assert_eq!(deleted, 1);
        assert_eq!(
            store.count_by_kind("u1", MemoryKind::Insight).await.unwrap(),
            1
        );
    }

    #[tokio::test]
    async fn test_graph_upserts_are_idempotent() {
        let graph = MemoryGraphStore::new();
        let now = Utc::now();

        graph.mark_studied("u1", "colregs-1", 0.5, now).await.unwrap();
        graph.mark_studied("u1", "colregs-1", 0.8, now).await.unwrap();
        graph.add_prerequisite("m2", "m1").await.unwrap();
        graph.add_prerequisite("m2", "m1").await.unwrap();

        let path = graph.learning_path("u1", 10).await.unwrap();
        assert_eq!(path.len(), 1);
        assert!((path[0].progress - 0.8).abs() < 1e-6);
        assert_eq!(graph.prerequisites.read().unwrap().len(), 1);
    }
}
