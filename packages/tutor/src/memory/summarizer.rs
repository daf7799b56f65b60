//! Session summarization.
//!
//! When a session's raw message rows grow past the token threshold, the
//! oldest batch is summarized into one `Summary` memory and the raw rows
//! it covered are deleted.

use std::sync::Arc;

use tracing::{info, warn};

use crate::llm::{estimate_tokens, EmbeddingService, TieredLlm};
use crate::prompts::format_summary_prompt;
use crate::traits::ai::GenerateOptions;
use crate::traits::store::MemoryStore;
use crate::types::{MemoryKind, MemoryRecord};

/// Session summarizer over the memory store.
pub struct SessionSummarizer {
    llm: TieredLlm,
    store: Arc<dyn MemoryStore>,
    embeddings: EmbeddingService,
    token_threshold: usize,
}

impl SessionSummarizer {
    pub fn new(
        llm: TieredLlm,
        store: Arc<dyn MemoryStore>,
        embeddings: EmbeddingService,
        token_threshold: usize,
    ) -> Self {
        Self {
            llm,
            store,
            embeddings,
            token_threshold,
        }
    }

    /// Summarize the session if its raw messages exceed the threshold.
    ///
    /// Returns true when a summary was written.
    pub async fn check_and_summarize(&self, user_id: &str, session_id: &str) -> bool {
        let messages = match self
            .store
            .get_by_kind(user_id, MemoryKind::Message, 200)
            .await
        {
            Ok(messages) => messages,
            Err(err) => {
                warn!(error = %err, "summarization skipped, cannot read messages");
                return false;
            }
        };

        let session_messages: Vec<&MemoryRecord> = messages
            .iter()
            .filter(|m| m.session_id.as_deref() == Some(session_id))
            .collect();

        let total_tokens: usize = session_messages
            .iter()
            .map(|m| estimate_tokens(&m.content))
            .sum();

        if total_tokens <= self.token_threshold {
            return false;
        }

        // Oldest first for the conversation transcript
        let mut ordered = session_messages;
        ordered.sort_by_key(|m| m.created_at);
        let conversation = ordered
            .iter()
            .map(|m| m.content.as_str())
            .collect::<Vec<_>>()
            .join("\n");

        let prompt = format_summary_prompt(&conversation);
        let summary_text = match self
            .llm
            .invoke(
                &prompt,
                GenerateOptions::default()
                    .with_temperature(0.3)
                    .with_budgets(0, 512),
            )
            .await
        {
            Ok(generation) if !generation.text.trim().is_empty() => {
                generation.text.trim().to_string()
            }
            Ok(_) => return false,
            Err(err) => {
                warn!(error = %err, "session summarization failed");
                return false;
            }
        };

        let mut record = MemoryRecord::new(user_id, MemoryKind::Summary, summary_text)
            .with_importance(0.7)
            .with_session(session_id);
        if let Ok(embedding) = self.embeddings.embed_document(&record.content).await {
            record = record.with_embedding(embedding);
        }

        if let Err(err) = self.store.save_memory(&record).await {
            warn!(error = %err, "failed to save session summary");
            return false;
        }

        // The raw rows are now represented by the summary
        match self.store.delete_session_messages(user_id, session_id).await {
            Ok(deleted) => {
                info!(session_id, deleted, "session summarized");
                true
            }
            Err(err) => {
                warn!(error = %err, "failed to delete summarized messages");
                true
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{LlmPool, ThinkingTier};
    use crate::stores::memory::InMemoryMemoryStore;
    use crate::testing::MockAi;

    async fn seed_messages(store: &InMemoryMemoryStore, session: &str, n: usize) {
        for i in 0..n {
            let record = MemoryRecord::new(
                "u1",
                MemoryKind::Message,
                format!("Câu hỏi dài về quy tắc hàng hải số {} với nhiều chi tiết lặp lại. ", i)
                    .repeat(20),
            )
            .with_session(session);
            store.save_memory(&record).await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_summarizes_over_threshold() {
        let store = Arc::new(InMemoryMemoryStore::new());
        seed_messages(&store, "s1", 5).await;

        let mock = Arc::new(
            MockAi::new().with_rule("Tóm tắt", "Người học hỏi về Rule 15 và các tình huống cắt hướng."),
        );
        let pool = LlmPool::new(mock.clone(), true);
        let summarizer = SessionSummarizer::new(
            pool.get(ThinkingTier::Light),
            store.clone(),
            crate::llm::EmbeddingService::new(mock, 768),
            100,
        );

        let summarized = summarizer.check_and_summarize("u1", "s1").await;
        assert!(summarized);

        // Raw messages gone, one summary row remains
        assert_eq!(
            store.count_by_kind("u1", MemoryKind::Message).await.unwrap(),
            0
        );
        assert_eq!(
            store.count_by_kind("u1", MemoryKind::Summary).await.unwrap(),
            1
        );
    }

    #[tokio::test]
    async fn test_below_threshold_is_noop() {
        let store = Arc::new(InMemoryMemoryStore::new());
        seed_messages(&store, "s1", 1).await;

        let mock = Arc::new(MockAi::new());
        let pool = LlmPool::new(mock.clone(), true);
        let summarizer = SessionSummarizer::new(
            pool.get(ThinkingTier::Light),
            store.clone(),
            crate::llm::EmbeddingService::new(mock, 768),
            1_000_000,
        );

        let summarized = summarizer.check_and_summarize("u1", "s1").await;
        assert!(!summarized);
        assert_eq!(
            store.count_by_kind("u1", MemoryKind::Message).await.unwrap(),
            1
        );
    }
}
