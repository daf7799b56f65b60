//! Core trait abstractions.
//!
//! The external capabilities the core consumes (generative LLM, embedding
//! model, vision model, relational/blob/graph stores, the input guard, and
//! the LMS event sink) are all trait seams so production wiring and tests
//! inject their own implementations.

pub mod ai;
pub mod guard;
pub mod pdf;
pub mod store;

pub use ai::{Ai, GenerateOptions, Generation, TaskType};
pub use guard::{EventSink, GuardDecision, InputGuard, LifecycleEvent};
pub use pdf::{PageRasterizer, PdfSource};
pub use store::{BlobStore, GraphStore, KnowledgeStore, MemoryStore};
