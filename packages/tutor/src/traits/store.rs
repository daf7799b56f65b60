//! Storage traits for knowledge chunks, memories, blobs, and the
//! learning graph.
//!
//! The storage layer is split into focused traits:
//! - `KnowledgeStore`: the chunk table behind both retrieval indexes
//! - `MemoryStore`: per-user semantic memories (messages, facts, insights)
//! - `BlobStore`: page-image uploads
//! - `GraphStore`: the external user learning graph

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::Result;
use crate::types::{
    DenseResult, KnowledgeChunk, MemoryKind, MemoryRecord, MemorySearchResult, SparseResult,
};

/// Store for knowledge chunks, serving both the dense and sparse indexes.
///
/// One row carries content, vector, derived tsvector, and citation
/// attributes; the unique key is `(document_id, page_number, chunk_index)`.
#[async_trait]
pub trait KnowledgeStore: Send + Sync {
    /// Upsert a chunk. A second upsert of the same key replaces values.
    async fn upsert_chunk(&self, chunk: &KnowledgeChunk) -> Result<()>;

    /// Delete a chunk by id. Idempotent.
    async fn delete_chunk(&self, chunk_id: &str) -> Result<()>;

    /// Dense search: top-k rows by cosine similarity, highest first.
    async fn dense_search(&self, query_embedding: &[f32], limit: usize)
        -> Result<Vec<DenseResult>>;

    /// Sparse search: ranked full-text search over the derived tsvector.
    ///
    /// Implementations receive the raw natural-language query and are
    /// responsible for tsquery building, synonym expansion, and the
    /// number boost.
    async fn sparse_search(&self, query: &str, limit: usize) -> Result<Vec<SparseResult>>;

    /// Fetch a chunk by id, with citation attributes.
    async fn get_chunk(&self, chunk_id: &str) -> Result<Option<KnowledgeChunk>>;

    /// Count chunks for one page of a document.
    async fn count_page_chunks(&self, document_id: &str, page_number: i32) -> Result<usize>;
}

/// Store for per-user semantic memories.
#[async_trait]
pub trait MemoryStore: Send + Sync {
    /// Insert a memory record.
    async fn save_memory(&self, record: &MemoryRecord) -> Result<Uuid>;

    /// Similarity search across a user's memories.
    async fn search_similar(
        &self,
        user_id: &str,
        query_embedding: &[f32],
        limit: usize,
        min_similarity: f32,
    ) -> Result<Vec<MemorySearchResult>>;

    /// All memories of one kind for a user, newest first.
    async fn get_by_kind(
        &self,
        user_id: &str,
        kind: MemoryKind,
        limit: usize,
    ) -> Result<Vec<MemoryRecord>>;

    /// Update content/embedding/metadata of an existing row.
    ///
    /// `embedding: None` keeps the stored vector.
    async fn update_memory(
        &self,
        id: Uuid,
        content: &str,
        embedding: Option<&[f32]>,
        metadata: &serde_json::Value,
    ) -> Result<bool>;

    /// Touch the last-accessed timestamp.
    async fn touch_last_accessed(&self, id: Uuid) -> Result<bool>;

    /// Count a user's memories of one kind.
    async fn count_by_kind(&self, user_id: &str, kind: MemoryKind) -> Result<usize>;

    /// Delete a memory row by id. Idempotent.
    async fn delete_memory(&self, id: Uuid) -> Result<bool>;

    /// Delete the oldest rows of a kind not accessed since the cutoff.
    ///
    /// Rows accessed after `preserve_after` are never evicted. Returns the
    /// number of rows deleted (at most `max_delete`).
    async fn delete_oldest_unaccessed(
        &self,
        user_id: &str,
        kind: MemoryKind,
        preserve_after: DateTime<Utc>,
        max_delete: usize,
    ) -> Result<usize>;

    /// Upsert a user-fact row on `(user_id, fact_type)`.
    ///
    /// Replaces content, embedding, and metadata; bumps `updated_at`; the
    /// row count per key stays at one.
    async fn upsert_user_fact(
        &self,
        user_id: &str,
        fact_type: &str,
        record: &MemoryRecord,
    ) -> Result<Uuid>;

    /// Delete all raw message rows of a session (after summarization).
    async fn delete_session_messages(&self, user_id: &str, session_id: &str) -> Result<usize>;
}

/// Store for page-image blobs.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Upload a JPEG at `{document_id}/page_{N}.jpg` with upsert
    /// semantics; returns the public URL.
    async fn upload_page_image(
        &self,
        document_id: &str,
        page_number: i32,
        jpeg_bytes: &[u8],
    ) -> Result<String>;

    /// Delete one page image.
    async fn delete_page_image(&self, document_id: &str, page_number: i32) -> Result<()>;

    /// Delete every image of a document. Returns the number removed.
    async fn delete_document_images(&self, document_id: &str) -> Result<usize>;
}

/// Store for the user learning graph.
///
/// Node identities are external (supplied by the surrounding LMS); every
/// relationship write is an idempotent upsert.
#[async_trait]
pub trait GraphStore: Send + Sync {
    async fn mark_studied(
        &self,
        user_id: &str,
        module_id: &str,
        progress: f32,
        last_studied: DateTime<Utc>,
    ) -> Result<()>;

    async fn mark_completed(&self, user_id: &str, module_id: &str) -> Result<()>;

    async fn mark_weak_at(&self, user_id: &str, topic: &str, confidence: f32) -> Result<()>;

    async fn add_prerequisite(&self, module_id: &str, requires_module_id: &str) -> Result<()>;

    /// Modules the user has studied, most recent first.
    async fn learning_path(&self, user_id: &str, limit: usize) -> Result<Vec<StudiedModule>>;

    /// Topics the user is weak at, highest confidence first.
    async fn knowledge_gaps(&self, user_id: &str, limit: usize) -> Result<Vec<KnowledgeGapTopic>>;
}

/// A module with study progress, from the learning graph.
#[derive(Debug, Clone)]
pub struct StudiedModule {
    pub module_id: String,
    pub title: String,
    pub progress: f32,
    pub last_studied: DateTime<Utc>,
    pub completed: bool,
}

/// A weak topic, from the learning graph.
#[derive(Debug, Clone)]
pub struct KnowledgeGapTopic {
    pub topic: String,
    pub confidence: f32,
}
