//! Domain types for the tutor core.
//!
//! - [`chunk`] - Knowledge chunks, content types, section hierarchy
//! - [`memory`] - Memory records, behavioral insights, user facts
//! - [`search`] - Dense/sparse/fused retrieval results
//! - [`chat`] - Per-turn request/response shapes
//! - [`trace`] - Reasoning trace steps for explainability

pub mod chat;
pub mod chunk;
pub mod memory;
pub mod search;
pub mod trace;

pub use chat::{ChatTurnRequest, ChatTurnResponse, SourceInfo, ToolUse, UserRole};
pub use chunk::{BoundingBox, ContentType, ExtractionMethod, KnowledgeChunk, SectionHierarchy};
pub use memory::{
    FactType, Insight, InsightCategory, MemoryKind, MemoryRecord, MemorySearchResult, UserFact,
};
pub use search::{DenseResult, FusedResult, RetrievedDocument, SparseResult};
pub use trace::{MergePosition, ReasoningStep, ReasoningTrace, StepName};
