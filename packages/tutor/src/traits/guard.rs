//! External collaborator seams: the input guard and the LMS event sink.

use async_trait::async_trait;
use serde::Serialize;

/// Decision of the content-policy guard.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardDecision {
    Allow,
    Block { reason: String },
}

/// Content-policy predicate consumed from the surrounding system.
///
/// A blocked message never reaches the generative or retrieval stages;
/// the orchestrator returns a canned refusal and persists the message
/// with a blocked marker.
pub trait InputGuard: Send + Sync {
    fn check(&self, message: &str) -> GuardDecision;
}

/// Lifecycle events emitted to the LMS collaborator.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum LifecycleEvent {
    KnowledgeGap {
        user_id: String,
        topic: String,
        confidence: f32,
    },
    GoalEvolution {
        user_id: String,
        description: String,
    },
    ModuleCompleted {
        user_id: String,
        module_id: String,
    },
}

/// Fire-and-forget event sink. Failures are the sink's problem; the
/// chat turn never waits on delivery.
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn emit(&self, event: LifecycleEvent);
}
