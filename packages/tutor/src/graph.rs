//! Learning graph service.
//!
//! Thin orchestration over the external relationship store: records study
//! activity, marks weaknesses detected during conversation, and produces
//! the small graph snippet the context builder folds into prompts.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, warn};

use crate::error::Result;
use crate::traits::guard::{EventSink, LifecycleEvent};
use crate::traits::store::GraphStore;

/// Learning graph context for prompt assembly.
#[derive(Debug, Default)]
pub struct GraphContext {
    pub learning_path: Vec<String>,
    pub knowledge_gaps: Vec<String>,
}

impl GraphContext {
    /// Render as a prompt block, empty string when there is nothing.
    pub fn to_block(&self) -> String {
        let mut sections = Vec::new();

        if !self.learning_path.is_empty() {
            let lines: Vec<String> = self.learning_path.iter().map(|m| format!("- {}", m)).collect();
            sections.push(format!("=== Learning Path ===\n{}", lines.join("\n")));
        }
        if !self.knowledge_gaps.is_empty() {
            let lines: Vec<String> = self.knowledge_gaps.iter().map(|g| format!("- {}", g)).collect();
            sections.push(format!("=== Knowledge Gaps ===\n{}", lines.join("\n")));
        }

        sections.join("\n\n")
    }
}

/// Service over the external graph store.
pub struct LearningGraphService {
    store: Arc<dyn GraphStore>,
    events: Arc<dyn EventSink>,
}

impl LearningGraphService {
    pub fn new(store: Arc<dyn GraphStore>, events: Arc<dyn EventSink>) -> Self {
        Self { store, events }
    }

    /// Record a study session against a module.
    pub async fn record_study_session(
        &self,
        user_id: &str,
        module_id: &str,
        progress: f32,
    ) -> Result<()> {
        self.store
            .mark_studied(user_id, module_id, progress, Utc::now())
            .await?;
        debug!(user_id, module_id, progress, "study session recorded");
        Ok(())
    }

    /// Mark a module completed and notify the LMS.
    pub async fn mark_module_completed(&self, user_id: &str, module_id: &str) -> Result<()> {
        self.store.mark_completed(user_id, module_id).await?;
        self.events
            .emit(LifecycleEvent::ModuleCompleted {
                user_id: user_id.to_string(),
                module_id: module_id.to_string(),
            })
            .await;
        Ok(())
    }

    /// Record a weakness signal (e.g. the reflection parser saw
    /// confusion about a topic) and notify the LMS.
    pub async fn record_weakness(
        &self,
        user_id: &str,
        topic: &str,
        confidence: f32,
    ) -> Result<()> {
        self.store.mark_weak_at(user_id, topic, confidence).await?;
        self.events
            .emit(LifecycleEvent::KnowledgeGap {
                user_id: user_id.to_string(),
                topic: topic.to_string(),
                confidence,
            })
            .await;
        Ok(())
    }

    /// Top modules and gaps for the context builder.
    pub async fn get_user_learning_context(&self, user_id: &str) -> GraphContext {
        let learning_path = match self.store.learning_path(user_id, 5).await {
            Ok(modules) => modules.into_iter().map(|m| m.title).collect(),
            Err(err) => {
                warn!(error = %err, "learning path unavailable");
                Vec::new()
            }
        };

        let knowledge_gaps = match self.store.knowledge_gaps(user_id, 5).await {
            Ok(gaps) => gaps.into_iter().map(|g| g.topic).collect(),
            Err(err) => {
                warn!(error = %err, "knowledge gaps unavailable");
                Vec::new()
            }
        };

        GraphContext {
            learning_path,
            knowledge_gaps,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stores::memory::MemoryGraphStore;
    use crate::testing::RecordingEventSink;

    #[tokio::test]
    async fn test_study_and_context() {
        let store = Arc::new(MemoryGraphStore::new());
        let sink = Arc::new(RecordingEventSink::new());
        let service = LearningGraphService::new(store, sink.clone());

        service.record_study_session("u1", "colregs-basics", 0.4).await.unwrap();
        service.record_weakness("u1", "Rule 15", 0.8).await.unwrap();

        let context = service.get_user_learning_context("u1").await;
        assert_eq!(context.learning_path, vec!["colregs-basics".to_string()]);
        assert_eq!(context.knowledge_gaps, vec!["Rule 15".to_string()]);

        let block = context.to_block();
        assert!(block.contains("=== Learning Path ==="));
        assert!(block.contains("Rule 15"));

        // Weakness emitted a lifecycle event
        assert_eq!(sink.events().len(), 1);
    }

    #[tokio::test]
    async fn test_completion_emits_event() {
        let store = Arc::new(MemoryGraphStore::new());
        let sink = Arc::new(RecordingEventSink::new());
        let service = LearningGraphService::new(store, sink.clone());

        service.mark_module_completed("u1", "colregs-basics").await.unwrap();

        let events = sink.events();
        assert!(matches!(
            events[0],
            LifecycleEvent::ModuleCompleted { .. }
        ));
    }

    #[test]
    fn test_empty_context_renders_empty() {
        assert!(GraphContext::default().to_block().is_empty());
    }
}
