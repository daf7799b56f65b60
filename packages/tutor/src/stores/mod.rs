//! Storage implementations.
//!
//! - [`postgres`] - production store: pgvector + tsvector over one table
//!   per concern (`knowledge_embeddings`, `semantic_memories`)
//! - [`memory`] - in-memory stores for tests and examples
//! - [`supabase`] - blob store for rendered page images

pub mod memory;
pub mod postgres;
pub mod supabase;

pub use memory::{InMemoryMemoryStore, MemoryGraphStore, MemoryKnowledgeStore};
pub use postgres::{PgKnowledgeStore, PgMemoryStore};
pub use supabase::SupabaseStorage;
