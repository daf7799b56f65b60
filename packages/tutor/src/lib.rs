//! # Maritime Tutor Core
//!
//! A corrective-RAG tutor for maritime regulations (COLREGs, SOLAS,
//! MARPOL, Vietnamese maritime law): cited, verified answers from
//! ingested PDF documents, with persistent user modeling across sessions.
//!
//! ## Architecture
//!
//! ```text
//! INGEST:  PDF → classify page → direct text | vision → chunk → enrich
//!          → embed → dense + sparse indexes
//!
//! ANSWER:  guard → context (insights + memories + graph) → analyze
//!          → budget → retrieve (HyDE? → dense ∥ sparse → RRF)
//!          → mini-judge → full grade → [rewrite ↺] → generate
//!          → reflect → verify → assemble (+ background persistence)
//! ```
//!
//! ## Quick start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use tutor::{TutorConfig, TutorRuntime};
//! use tutor::ai::GeminiAi;
//! use tutor::stores::{PgKnowledgeStore, PgMemoryStore};
//! use tutor::testing::AllowAllGuard;
//! use tutor::types::ChatTurnRequest;
//!
//! let config = TutorConfig::from_env()?;
//! let ai = Arc::new(GeminiAi::from_config(&config)?);
//! let knowledge = Arc::new(PgKnowledgeStore::new(&database_url).await?);
//! let memories = Arc::new(PgMemoryStore::new(&database_url).await?);
//!
//! let runtime = TutorRuntime::new(
//!     ai, knowledge, memories, None,
//!     Arc::new(my_event_sink), Arc::new(AllowAllGuard), config,
//! );
//!
//! let response = runtime
//!     .chat
//!     .handle_turn(ChatTurnRequest::new("user-1", "Rule 15 COLREGs là gì?"))
//!     .await?;
//! println!("{}", response.message);
//! ```
//!
//! ## Modules
//!
//! - [`traits`] - the external-capability seams (AI, stores, guard, PDF)
//! - [`types`] - domain types (chunks, memories, traces, chat shapes)
//! - [`retrieval`] - hybrid dense+sparse retrieval with RRF and HyDE
//! - [`ingest`] - the multimodal ingestion pipeline
//! - [`crag`] - the corrective RAG orchestrator and its stages
//! - [`memory`] - behavioral insights, facts, consolidation
//! - [`chat`] - the per-turn façade
//! - [`stores`] - Postgres, in-memory, and Supabase implementations
//! - [`testing`] - mock implementations for tests

pub mod ai;
pub mod chat;
pub mod config;
pub mod crag;
pub mod error;
pub mod graph;
pub mod ingest;
pub mod llm;
pub mod memory;
pub mod prompts;
pub mod retrieval;
pub mod runtime;
pub mod stores;
pub mod testing;
pub mod traits;
pub mod types;

// Re-export core types at crate root
pub use config::{QualityMode, TutorConfig};
pub use error::{Result, TutorError};
pub use runtime::TutorRuntime;

pub use chat::ChatOrchestrator;
pub use crag::{CragOrchestrator, CragOutcome, CragRequest};
pub use ingest::{IngestConfig, IngestOptions, IngestionPipeline, IngestionReport};
pub use llm::{EmbeddingService, LlmPool, ThinkingTier};
pub use memory::{MemoryConfig, MemoryEngine};
pub use retrieval::{HybridRetriever, HydeExpander, RetrievalConfig};
pub use types::{ChatTurnRequest, ChatTurnResponse, KnowledgeChunk, ReasoningTrace, UserRole};
