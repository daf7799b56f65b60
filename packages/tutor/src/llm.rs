//! Shared LLM pool, thinking tiers, and the embedding service.
//!
//! The pool holds the three tier handles (DEEP/MODERATE/LIGHT) every
//! component shares; tiers only differ in their thinking budget and
//! whether thoughts are returned. `clean_json_response` is the single
//! normalization seam every JSON-parsing component goes through.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::error::{Result, TutorError};
use crate::traits::ai::{Ai, GenerateOptions, Generation, TaskType};

/// Thinking budget tiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThinkingTier {
    /// 8192 tokens - teaching, complex reasoning
    Deep,
    /// 4096 tokens - synthesis, grading
    Moderate,
    /// 1024 tokens - quick analysis, routing
    Light,
    /// 512 tokens - extraction, simple tasks
    Minimal,
    /// 0 tokens - no thinking
    Off,
}

impl ThinkingTier {
    /// Numeric thinking budget for this tier.
    pub fn budget(&self) -> u32 {
        match self {
            ThinkingTier::Deep => 8192,
            ThinkingTier::Moderate => 4096,
            ThinkingTier::Light => 1024,
            ThinkingTier::Minimal => 512,
            ThinkingTier::Off => 0,
        }
    }

    /// Whether this tier returns the model's thoughts.
    pub fn includes_thoughts(&self) -> bool {
        matches!(self, ThinkingTier::Deep | ThinkingTier::Moderate)
    }

    /// The next cheaper tier, for retry-at-lower-tier degradation.
    pub fn lower(&self) -> ThinkingTier {
        match self {
            ThinkingTier::Deep => ThinkingTier::Moderate,
            ThinkingTier::Moderate => ThinkingTier::Light,
            ThinkingTier::Light => ThinkingTier::Minimal,
            ThinkingTier::Minimal | ThinkingTier::Off => ThinkingTier::Off,
        }
    }
}

/// An LLM handle bound to a thinking tier.
///
/// Cloning shares the underlying client.
#[derive(Clone)]
pub struct TieredLlm {
    ai: Arc<dyn Ai>,
    tier: ThinkingTier,
    thinking_enabled: bool,
}

impl TieredLlm {
    pub fn tier(&self) -> ThinkingTier {
        self.tier
    }

    /// Invoke with the tier's thinking budget applied.
    pub async fn invoke(&self, prompt: &str, options: GenerateOptions) -> Result<Generation> {
        self.ai.invoke(prompt, &self.apply_tier(options)).await
    }

    /// Invoke, retrying once at the next lower tier on transient failure.
    pub async fn invoke_with_retry(
        &self,
        prompt: &str,
        options: GenerateOptions,
    ) -> Result<Generation> {
        match self.invoke(prompt, options.clone()).await {
            Ok(generation) => Ok(generation),
            Err(err) if err.is_transient() => {
                let lower = self.at_tier(self.tier.lower());
                warn!(tier = ?self.tier, error = %err, "LLM call failed, retrying at lower tier");
                lower.invoke(prompt, options).await
            }
            Err(err) => Err(err),
        }
    }

    /// The same client bound to a different tier.
    pub fn at_tier(&self, tier: ThinkingTier) -> TieredLlm {
        TieredLlm {
            ai: Arc::clone(&self.ai),
            tier,
            thinking_enabled: self.thinking_enabled,
        }
    }

    fn apply_tier(&self, mut options: GenerateOptions) -> GenerateOptions {
        if options.thinking_budget.is_none() {
            let budget = if self.thinking_enabled {
                self.tier.budget()
            } else {
                0
            };
            options.thinking_budget = Some(budget);
            if self.tier.includes_thoughts() && budget > 0 {
                options.include_thoughts = true;
            }
        }
        options
    }
}

/// Pool of shared tier handles over one underlying client.
///
/// MINIMAL and OFF map to the LIGHT handle; separate instances buy
/// nothing since budgets are applied per call.
#[derive(Clone)]
pub struct LlmPool {
    ai: Arc<dyn Ai>,
    thinking_enabled: bool,
}

impl LlmPool {
    pub fn new(ai: Arc<dyn Ai>, thinking_enabled: bool) -> Self {
        debug!(thinking_enabled, "LLM pool initialized (DEEP/MODERATE/LIGHT)");
        Self {
            ai,
            thinking_enabled,
        }
    }

    pub fn get(&self, tier: ThinkingTier) -> TieredLlm {
        let tier = match tier {
            ThinkingTier::Minimal | ThinkingTier::Off => ThinkingTier::Light,
            other => other,
        };
        TieredLlm {
            ai: Arc::clone(&self.ai),
            tier,
            thinking_enabled: self.thinking_enabled,
        }
    }

    pub fn deep(&self) -> TieredLlm {
        self.get(ThinkingTier::Deep)
    }

    pub fn moderate(&self) -> TieredLlm {
        self.get(ThinkingTier::Moderate)
    }

    pub fn light(&self) -> TieredLlm {
        self.get(ThinkingTier::Light)
    }

    /// The raw client, for the embedding service and vision extractor.
    pub fn raw(&self) -> Arc<dyn Ai> {
        Arc::clone(&self.ai)
    }
}

/// Strip markdown code fences from an LLM response before JSON parsing.
///
/// Every JSON-consuming parser (analyzer, graders, verifier, rewriter,
/// insight extraction, consolidation) goes through this one seam, so
/// provider response-shape quirks are handled in exactly one place.
pub fn clean_json_response(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(inner) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let inner = inner.strip_prefix("json").unwrap_or(inner);
    let inner = inner.strip_suffix("```").unwrap_or(inner);
    inner.trim()
}

/// The embedding service: the single point enforcing dimensionality and
/// normalization.
///
/// The underlying model self-normalizes only at full width; Matryoshka
/// truncation to 768 requires an explicit L2 pass here.
#[derive(Clone)]
pub struct EmbeddingService {
    ai: Arc<dyn Ai>,
    dimensions: usize,
}

impl EmbeddingService {
    pub fn new(ai: Arc<dyn Ai>, dimensions: usize) -> Self {
        Self { ai, dimensions }
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    /// Embed a document for storage.
    pub async fn embed_document(&self, text: &str) -> Result<Vec<f32>> {
        self.embed(text, TaskType::Document).await
    }

    /// Embed a search query.
    pub async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        self.embed(text, TaskType::Query).await
    }

    /// Embed text for similarity comparison.
    pub async fn embed_for_similarity(&self, text: &str) -> Result<Vec<f32>> {
        self.embed(text, TaskType::Similarity).await
    }

    /// Embed a batch of documents.
    ///
    /// A failed item degrades to a zero vector so ingestion does not lose
    /// a whole page for one bad chunk. Queries never degrade this way.
    pub async fn embed_documents(&self, texts: &[&str]) -> Vec<Vec<f32>> {
        let mut results = Vec::with_capacity(texts.len());
        for text in texts {
            match self.embed(text, TaskType::Document).await {
                Ok(vector) => results.push(vector),
                Err(err) => {
                    warn!(error = %err, "document embedding failed, substituting zero vector");
                    results.push(vec![0.0; self.dimensions]);
                }
            }
        }
        results
    }

    async fn embed(&self, text: &str, task_type: TaskType) -> Result<Vec<f32>> {
        let raw = self.ai.embed(text, task_type).await?;

        if raw.len() < self.dimensions {
            return Err(TutorError::Embedding(format!(
                "model returned {} dimensions, expected at least {}",
                raw.len(),
                self.dimensions
            )));
        }

        let mut vector = raw;
        vector.truncate(self.dimensions);
        Ok(l2_normalize(vector))
    }
}

/// L2-normalize a vector in place. A zero vector is returned unchanged.
pub fn l2_normalize(mut vector: Vec<f32>) -> Vec<f32> {
    let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in vector.iter_mut() {
            *x /= norm;
        }
    } else {
        warn!("zero vector encountered during normalization");
    }
    vector
}

/// Cosine similarity between two vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot / (norm_a * norm_b)
}

/// Token estimate used by the summarization threshold (chars / 4).
pub fn estimate_tokens(text: &str) -> usize {
    text.chars().count() / 4
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockAi;

    #[test]
    fn test_tier_budgets() {
        assert_eq!(ThinkingTier::Deep.budget(), 8192);
        assert_eq!(ThinkingTier::Moderate.budget(), 4096);
        assert_eq!(ThinkingTier::Light.budget(), 1024);
        assert_eq!(ThinkingTier::Minimal.budget(), 512);
        assert_eq!(ThinkingTier::Off.budget(), 0);
    }

    #[test]
    fn test_tier_lowering_stops_at_off() {
        assert_eq!(ThinkingTier::Deep.lower(), ThinkingTier::Moderate);
        assert_eq!(ThinkingTier::Off.lower(), ThinkingTier::Off);
    }

    #[test]
    fn test_clean_json_response() {
        assert_eq!(clean_json_response("{\"a\": 1}"), "{\"a\": 1}");
        assert_eq!(clean_json_response("```json\n{\"a\": 1}\n```"), "{\"a\": 1}");
        assert_eq!(clean_json_response("```\n[1, 2]\n```"), "[1, 2]");
        assert_eq!(clean_json_response("  {\"a\": 1}  "), "{\"a\": 1}");
    }

    #[test]
    fn test_l2_normalize() {
        let vector = l2_normalize(vec![3.0, 4.0]);
        assert!((vector[0] - 0.6).abs() < 1e-6);
        assert!((vector[1] - 0.8).abs() < 1e-6);

        let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_l2_normalize_zero_vector() {
        let vector = l2_normalize(vec![0.0, 0.0, 0.0]);
        assert_eq!(vector, vec![0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_cosine_similarity() {
        let a = vec![1.0, 0.0, 0.0];
        let b = vec![1.0, 0.0, 0.0];
        assert!((cosine_similarity(&a, &b) - 1.0).abs() < 0.001);

        let c = vec![0.0, 1.0, 0.0];
        assert!(cosine_similarity(&a, &c).abs() < 0.001);
    }

    #[tokio::test]
    async fn test_embedding_service_normalizes_and_truncates() {
        let mock = MockAi::new().with_embedding(vec![1.0; 1536]);
        let service = EmbeddingService::new(std::sync::Arc::new(mock), 768);

        let vector = service.embed_query("tàu thuyền").await.unwrap();
        assert_eq!(vector.len(), 768);

        let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[tokio::test]
    async fn test_embed_documents_degrades_to_zero_vector() {
        let mock = MockAi::new().failing_embeddings();
        let service = EmbeddingService::new(std::sync::Arc::new(mock), 768);

        let vectors = service.embed_documents(&["one", "two"]).await;
        assert_eq!(vectors.len(), 2);
        assert!(vectors.iter().all(|v| v.iter().all(|x| *x == 0.0)));
    }

    #[tokio::test]
    async fn test_query_embedding_does_not_degrade() {
        let mock = MockAi::new().failing_embeddings();
        let service = EmbeddingService::new(std::sync::Arc::new(mock), 768);

        assert!(service.embed_query("query").await.is_err());
    }
}
