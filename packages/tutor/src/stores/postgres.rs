//! PostgreSQL storage implementation.
//!
//! One relational store backs both retrieval channels and the semantic
//! memory table:
//!
//! - **Hybrid retrieval**: pgvector cosine search plus `tsvector` full-text
//!   search with `simple` (language-agnostic) tokenization
//! - **Versioned schema from code**: `CREATE TABLE IF NOT EXISTS`
//!   migrations run at connection time
//! - **Low-connection footprint**: pool capped small for managed databases
//!   with tight connection quotas

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use pgvector::Vector;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::Row;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use crate::error::{Result, TutorError};
use crate::retrieval::sparse::{apply_number_boost, build_tsquery};
use crate::traits::store::{KnowledgeStore, MemoryStore};
use crate::types::{
    BoundingBox, ContentType, DenseResult, KnowledgeChunk, MemoryKind, MemoryRecord,
    MemorySearchResult, SparseResult,
};

/// Maximum pool size. The operational context is a managed Postgres with
/// a low connection quota, so the pool stays small.
const MAX_CONNECTIONS: u32 = 4;

/// PostgreSQL-backed knowledge store (dense + sparse indexes).
pub struct PgKnowledgeStore {
    pool: PgPool,
    has_pgvector: bool,
}

impl PgKnowledgeStore {
    /// Connect and run migrations.
    pub async fn new(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .min_connections(1)
            .max_connections(MAX_CONNECTIONS)
            .connect(database_url)
            .await
            .map_err(TutorError::storage)?;

        Self::from_pool(pool).await
    }

    /// Create from an existing connection pool.
    ///
    /// Use this when the application already has a pool; avoids duplicate
    /// connections against the quota.
    pub async fn from_pool(pool: PgPool) -> Result<Self> {
        let mut store = Self {
            pool,
            has_pgvector: false,
        };
        store.detect_capabilities().await?;
        store.run_migrations().await?;
        Ok(store)
    }

    /// Get the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Check if the pgvector extension is available.
    pub fn has_pgvector(&self) -> bool {
        self.has_pgvector
    }

    async fn detect_capabilities(&mut self) -> Result<()> {
        // Try to install the extension, then check it is present
        sqlx::query("CREATE EXTENSION IF NOT EXISTS vector")
            .execute(&self.pool)
            .await
            .ok();

        let pgvector_check: Option<(String,)> =
            sqlx::query_as("SELECT extname FROM pg_extension WHERE extname = 'vector'")
                .fetch_optional(&self.pool)
                .await
                .map_err(TutorError::storage)?;

        self.has_pgvector = pgvector_check.is_some();
        if !self.has_pgvector {
            warn!("pgvector extension not available, dense search will fail");
        }
        Ok(())
    }

    async fn run_migrations(&mut self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS knowledge_embeddings (
                id UUID PRIMARY KEY,
                document_id TEXT NOT NULL,
                page_number INT NOT NULL,
                chunk_index INT NOT NULL,
                content TEXT NOT NULL,
                embedding vector(768),
                search_vector tsvector GENERATED ALWAYS AS (to_tsvector('simple', content)) STORED,
                content_type TEXT NOT NULL DEFAULT 'text',
                confidence_score REAL NOT NULL DEFAULT 1.0,
                image_url TEXT,
                bounding_boxes JSONB NOT NULL DEFAULT '[]',
                metadata JSONB NOT NULL DEFAULT '{}',
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                updated_at TIMESTAMPTZ
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(TutorError::storage)?;

        sqlx::query(
            r#"
            CREATE UNIQUE INDEX IF NOT EXISTS idx_knowledge_doc_page_chunk
            ON knowledge_embeddings(document_id, page_number, chunk_index)
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(TutorError::storage)?;

        if self.has_pgvector {
            sqlx::query(
                r#"
                CREATE INDEX IF NOT EXISTS idx_knowledge_embedding_vector
                ON knowledge_embeddings USING ivfflat (embedding vector_cosine_ops)
                WITH (lists = 100)
                "#,
            )
            .execute(&self.pool)
            .await
            .ok();
        }

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_knowledge_search_vector
            ON knowledge_embeddings USING gin(search_vector)
            "#,
        )
        .execute(&self.pool)
        .await
        .ok();

        Ok(())
    }
}

#[async_trait]
impl KnowledgeStore for PgKnowledgeStore {
    async fn upsert_chunk(&self, chunk: &KnowledgeChunk) -> Result<()> {
        let bounding_boxes = serde_json::to_value(&chunk.bounding_boxes)?;

        sqlx::query(
            r#"
            INSERT INTO knowledge_embeddings
                (id, document_id, page_number, chunk_index, content, embedding,
                 content_type, confidence_score, image_url, bounding_boxes, metadata)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            ON CONFLICT (document_id, page_number, chunk_index)
            DO UPDATE SET
                content = EXCLUDED.content,
                embedding = EXCLUDED.embedding,
                content_type = EXCLUDED.content_type,
                confidence_score = EXCLUDED.confidence_score,
                image_url = EXCLUDED.image_url,
                bounding_boxes = EXCLUDED.bounding_boxes,
                metadata = EXCLUDED.metadata,
                updated_at = NOW()
            "#,
        )
        .bind(chunk.id)
        .bind(&chunk.document_id)
        .bind(chunk.page_number)
        .bind(chunk.chunk_index)
        .bind(&chunk.content)
        .bind(Vector::from(chunk.embedding.clone()))
        .bind(chunk.content_type.as_str())
        .bind(chunk.confidence)
        .bind(&chunk.image_url)
        .bind(&bounding_boxes)
        .bind(&chunk.metadata)
        .execute(&self.pool)
        .await
        .map_err(TutorError::storage)?;

        debug!(
            document_id = %chunk.document_id,
            page = chunk.page_number,
            chunk_index = chunk.chunk_index,
            "upserted chunk"
        );
        Ok(())
    }

    async fn delete_chunk(&self, chunk_id: &str) -> Result<()> {
        let id = Uuid::parse_str(chunk_id).map_err(|e| TutorError::Validation {
            reason: format!("invalid chunk id: {}", e),
        })?;

        sqlx::query("DELETE FROM knowledge_embeddings WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(TutorError::storage)?;
        Ok(())
    }

    #[instrument(skip(self, query_embedding), fields(limit = limit))]
    async fn dense_search(
        &self,
        query_embedding: &[f32],
        limit: usize,
    ) -> Result<Vec<DenseResult>> {
        let rows = sqlx::query(
            r#"
            SELECT id::text AS chunk_id,
                   content,
                   1 - (embedding <=> $1) AS similarity
            FROM knowledge_embeddings
            WHERE embedding IS NOT NULL
            ORDER BY embedding <=> $1
            LIMIT $2
            "#,
        )
        .bind(Vector::from(query_embedding.to_vec()))
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(TutorError::storage)?;

        let results = rows
            .into_iter()
            .map(|row| {
                DenseResult::new(
                    row.get::<String, _>("chunk_id"),
                    row.get::<String, _>("content"),
                    row.get::<f64, _>("similarity") as f32,
                )
            })
            .collect::<Vec<_>>();

        debug!(count = results.len(), "dense search");
        Ok(results)
    }

    #[instrument(skip(self), fields(query = %query, limit = limit))]
    async fn sparse_search(&self, query: &str, limit: usize) -> Result<Vec<SparseResult>> {
        let tsquery = build_tsquery(query);
        debug!(tsquery = %tsquery, "sparse search tsquery");

        // Fetch 2x the limit; the number boost re-sorts before truncation
        let rows = sqlx::query(
            r#"
            SELECT id::text AS chunk_id,
                   COALESCE(metadata->>'title', '') AS title,
                   content,
                   document_id,
                   page_number,
                   ts_rank(search_vector, to_tsquery('simple', $1)) AS score,
                   COALESCE(image_url, '') AS image_url,
                   bounding_boxes
            FROM knowledge_embeddings
            WHERE search_vector @@ to_tsquery('simple', $1)
            ORDER BY score DESC
            LIMIT $2
            "#,
        )
        .bind(&tsquery)
        .bind((limit * 2) as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(TutorError::storage)?;

        let results: Vec<SparseResult> = rows
            .into_iter()
            .map(|row| {
                let image_url: String = row.get("image_url");
                let bounding_boxes: Vec<BoundingBox> =
                    serde_json::from_value(row.get::<serde_json::Value, _>("bounding_boxes"))
                        .unwrap_or_default();

                let mut result = SparseResult::new(
                    row.get::<String, _>("chunk_id"),
                    row.get::<String, _>("content"),
                    row.get::<f32, _>("score"),
                )
                .with_title(row.get::<String, _>("title"))
                .with_page(
                    row.get::<String, _>("document_id"),
                    row.get::<i32, _>("page_number"),
                );
                result.image_url = if image_url.is_empty() {
                    None
                } else {
                    Some(image_url)
                };
                result.bounding_boxes = bounding_boxes;
                result
            })
            .collect();

        Ok(apply_number_boost(results, query, limit))
    }

    async fn get_chunk(&self, chunk_id: &str) -> Result<Option<KnowledgeChunk>> {
        let id = Uuid::parse_str(chunk_id).map_err(|e| TutorError::Validation {
            reason: format!("invalid chunk id: {}", e),
        })?;

        let row = sqlx::query(
            r#"
            SELECT id, document_id, page_number, chunk_index, content, embedding,
                   content_type, confidence_score, image_url, bounding_boxes,
                   metadata, created_at
            FROM knowledge_embeddings
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(TutorError::storage)?;

        Ok(row.map(|row| {
            let embedding: Option<Vector> = row.get("embedding");
            KnowledgeChunk {
                id: row.get("id"),
                document_id: row.get("document_id"),
                page_number: row.get("page_number"),
                chunk_index: row.get("chunk_index"),
                content: row.get("content"),
                embedding: embedding.map(|v| v.to_vec()).unwrap_or_default(),
                content_type: ContentType::parse(row.get::<String, _>("content_type").as_str()),
                confidence: row.get::<f32, _>("confidence_score"),
                image_url: row.get("image_url"),
                bounding_boxes: serde_json::from_value(
                    row.get::<serde_json::Value, _>("bounding_boxes"),
                )
                .unwrap_or_default(),
                metadata: row.get("metadata"),
                created_at: row.get("created_at"),
            }
        }))
    }

    async fn count_page_chunks(&self, document_id: &str, page_number: i32) -> Result<usize> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS count FROM knowledge_embeddings
             WHERE document_id = $1 AND page_number = $2",
        )
        .bind(document_id)
        .bind(page_number)
        .fetch_one(&self.pool)
        .await
        .map_err(TutorError::storage)?;

        Ok(row.get::<i64, _>("count") as usize)
    }
}

/// PostgreSQL-backed semantic memory store.
pub struct PgMemoryStore {
    pool: PgPool,
}

impl PgMemoryStore {
    pub async fn new(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .min_connections(1)
            .max_connections(MAX_CONNECTIONS)
            .connect(database_url)
            .await
            .map_err(TutorError::storage)?;
        Self::from_pool(pool).await
    }

    pub async fn from_pool(pool: PgPool) -> Result<Self> {
        let store = Self { pool };
        store.run_migrations().await?;
        Ok(store)
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn run_migrations(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS semantic_memories (
                id UUID PRIMARY KEY,
                user_id TEXT NOT NULL,
                content TEXT NOT NULL,
                embedding vector(768),
                memory_type TEXT NOT NULL DEFAULT 'message',
                importance REAL NOT NULL DEFAULT 0.5,
                metadata JSONB NOT NULL DEFAULT '{}',
                session_id TEXT,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                updated_at TIMESTAMPTZ,
                last_accessed TIMESTAMPTZ
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(TutorError::storage)?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_semantic_memories_user
             ON semantic_memories(user_id)",
        )
        .execute(&self.pool)
        .await
        .ok();

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_semantic_memories_user_type
             ON semantic_memories(user_id, memory_type)",
        )
        .execute(&self.pool)
        .await
        .ok();

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_semantic_memories_embedding
            ON semantic_memories USING ivfflat (embedding vector_cosine_ops)
            WITH (lists = 100)
            "#,
        )
        .execute(&self.pool)
        .await
        .ok();

        // One row per (user, fact_type) for user facts
        sqlx::query(
            r#"
            CREATE UNIQUE INDEX IF NOT EXISTS idx_semantic_memories_user_fact
            ON semantic_memories(user_id, (metadata->>'fact_type'))
            WHERE memory_type = 'user_fact'
            "#,
        )
        .execute(&self.pool)
        .await
        .ok();

        Ok(())
    }

    fn record_from_row(row: &sqlx::postgres::PgRow) -> MemoryRecord {
        let embedding: Option<Vector> = row.get("embedding");
        MemoryRecord {
            id: row.get("id"),
            user_id: row.get("user_id"),
            kind: MemoryKind::parse(row.get::<String, _>("memory_type").as_str())
                .unwrap_or(MemoryKind::Message),
            content: row.get("content"),
            embedding: embedding.map(|v| v.to_vec()).unwrap_or_default(),
            importance: row.get::<f32, _>("importance"),
            metadata: row.get("metadata"),
            session_id: row.get("session_id"),
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
            last_accessed: row.get("last_accessed"),
        }
    }
}

#[async_trait]
impl MemoryStore for PgMemoryStore {
    async fn save_memory(&self, record: &MemoryRecord) -> Result<Uuid> {
        if record.content.trim().is_empty() {
            return Err(TutorError::Validation {
                reason: "memory content cannot be empty".into(),
            });
        }

        sqlx::query(
            r#"
            INSERT INTO semantic_memories
                (id, user_id, content, embedding, memory_type, importance,
                 metadata, session_id, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(record.id)
        .bind(&record.user_id)
        .bind(&record.content)
        .bind(Vector::from(record.embedding.clone()))
        .bind(record.kind.as_str())
        .bind(record.importance)
        .bind(&record.metadata)
        .bind(&record.session_id)
        .bind(record.created_at)
        .execute(&self.pool)
        .await
        .map_err(TutorError::storage)?;

        Ok(record.id)
    }

    async fn search_similar(
        &self,
        user_id: &str,
        query_embedding: &[f32],
        limit: usize,
        min_similarity: f32,
    ) -> Result<Vec<MemorySearchResult>> {
        let rows = sqlx::query(
            r#"
            SELECT *, 1 - (embedding <=> $2) AS similarity
            FROM semantic_memories
            WHERE user_id = $1 AND embedding IS NOT NULL
              AND 1 - (embedding <=> $2) >= $3
            ORDER BY embedding <=> $2
            LIMIT $4
            "#,
        )
        .bind(user_id)
        .bind(Vector::from(query_embedding.to_vec()))
        .bind(min_similarity as f64)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(TutorError::storage)?;

        Ok(rows
            .iter()
            .map(|row| MemorySearchResult {
                record: Self::record_from_row(row),
                similarity: row.get::<f64, _>("similarity") as f32,
            })
            .collect())
    }

    async fn get_by_kind(
        &self,
        user_id: &str,
        kind: MemoryKind,
        limit: usize,
    ) -> Result<Vec<MemoryRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM semantic_memories
            WHERE user_id = $1 AND memory_type = $2
            ORDER BY created_at DESC
            LIMIT $3
            "#,
        )
        .bind(user_id)
        .bind(kind.as_str())
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(TutorError::storage)?;

        Ok(rows.iter().map(Self::record_from_row).collect())
    }

    async fn update_memory(
        &self,
        id: Uuid,
        content: &str,
        embedding: Option<&[f32]>,
        metadata: &serde_json::Value,
    ) -> Result<bool> {
        let result = match embedding {
            Some(embedding) => sqlx::query(
                r#"
                UPDATE semantic_memories
                SET content = $2, embedding = $3, metadata = $4, updated_at = NOW()
                WHERE id = $1
                "#,
            )
            .bind(id)
            .bind(content)
            .bind(Vector::from(embedding.to_vec()))
            .bind(metadata)
            .execute(&self.pool)
            .await
            .map_err(TutorError::storage)?,
            None => sqlx::query(
                r#"
                UPDATE semantic_memories
                SET content = $2, metadata = $3, updated_at = NOW()
                WHERE id = $1
                "#,
            )
            .bind(id)
            .bind(content)
            .bind(metadata)
            .execute(&self.pool)
            .await
            .map_err(TutorError::storage)?,
        };

        Ok(result.rows_affected() > 0)
    }

    async fn touch_last_accessed(&self, id: Uuid) -> Result<bool> {
        let result = sqlx::query("UPDATE semantic_memories SET last_accessed = NOW() WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(TutorError::storage)?;
        Ok(result.rows_affected() > 0)
    }

    async fn count_by_kind(&self, user_id: &str, kind: MemoryKind) -> Result<usize> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS count FROM semantic_memories
             WHERE user_id = $1 AND memory_type = $2",
        )
        .bind(user_id)
        .bind(kind.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(TutorError::storage)?;

        Ok(row.get::<i64, _>("count") as usize)
    }

    async fn delete_memory(&self, id: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM semantic_memories WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(TutorError::storage)?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_oldest_unaccessed(
        &self,
        user_id: &str,
        kind: MemoryKind,
        preserve_after: DateTime<Utc>,
        max_delete: usize,
    ) -> Result<usize> {
        let result = sqlx::query(
            r#"
            DELETE FROM semantic_memories
            WHERE id IN (
                SELECT id FROM semantic_memories
                WHERE user_id = $1 AND memory_type = $2
                  AND COALESCE(last_accessed, created_at) < $3
                ORDER BY created_at ASC
                LIMIT $4
            )
            "#,
        )
        .bind(user_id)
        .bind(kind.as_str())
        .bind(preserve_after)
        .bind(max_delete as i64)
        .execute(&self.pool)
        .await
        .map_err(TutorError::storage)?;

        Ok(result.rows_affected() as usize)
    }

    async fn upsert_user_fact(
        &self,
        user_id: &str,
        fact_type: &str,
        record: &MemoryRecord,
    ) -> Result<Uuid> {
        debug_assert_eq!(
            record.metadata.get("fact_type").and_then(|v| v.as_str()),
            Some(fact_type)
        );

        let row = sqlx::query(
            r#"
            INSERT INTO semantic_memories
                (id, user_id, content, embedding, memory_type, importance,
                 metadata, session_id, created_at)
            VALUES ($1, $2, $3, $4, 'user_fact', $5, $6, $7, NOW())
            ON CONFLICT (user_id, (metadata->>'fact_type')) WHERE memory_type = 'user_fact'
            DO UPDATE SET
                content = EXCLUDED.content,
                embedding = EXCLUDED.embedding,
                importance = EXCLUDED.importance,
                metadata = EXCLUDED.metadata,
                updated_at = NOW()
            RETURNING id
            "#,
        )
        .bind(record.id)
        .bind(user_id)
        .bind(&record.content)
        .bind(Vector::from(record.embedding.clone()))
        .bind(record.importance)
        .bind(&record.metadata)
        .bind(&record.session_id)
        .fetch_one(&self.pool)
        .await
        .map_err(TutorError::storage)?;

        Ok(row.get("id"))
    }

    async fn delete_session_messages(&self, user_id: &str, session_id: &str) -> Result<usize> {
        let result = sqlx::query(
            r#"
            DELETE FROM semantic_memories
            WHERE user_id = $1 AND session_id = $2 AND memory_type = 'message'
            "#,
        )
        .bind(user_id)
        .bind(session_id)
        .execute(&self.pool)
        .await
        .map_err(TutorError::storage)?;

        Ok(result.rows_affected() as usize)
    }
}
