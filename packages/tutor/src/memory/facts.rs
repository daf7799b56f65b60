//! User-fact extraction.
//!
//! Facts are atomic identity attributes (name, role, level, goal,
//! preference, weakness) kept separate from behavioral insights. One row
//! per (user, fact_type); deprecated type names map to the canonical six
//! at parse time.

use serde::Deserialize;
use tracing::{debug, warn};

use crate::llm::{clean_json_response, TieredLlm};
use crate::prompts::format_fact_prompt;
use crate::traits::ai::GenerateOptions;
use crate::types::{FactType, UserFact};

#[derive(Deserialize)]
struct ExtractedFact {
    #[serde(default)]
    fact_type: String,
    #[serde(default)]
    value: String,
    #[serde(default = "default_confidence")]
    confidence: f32,
}

fn default_confidence() -> f32 {
    0.8
}

/// Extracts user facts from messages.
pub struct FactExtractor {
    llm: TieredLlm,
}

impl FactExtractor {
    pub fn new(llm: TieredLlm) -> Self {
        Self { llm }
    }

    /// Extract facts from a message. Unknown and ignored fact types are
    /// dropped; deprecated names are mapped.
    pub async fn extract(&self, message: &str) -> Vec<UserFact> {
        let prompt = format_fact_prompt(message);

        let generation = match self
            .llm
            .invoke(
                &prompt,
                GenerateOptions::default()
                    .with_temperature(0.1)
                    .with_budgets(0, 512)
                    .json(),
            )
            .await
        {
            Ok(generation) => generation,
            Err(err) => {
                warn!(error = %err, "fact extraction failed");
                return Vec::new();
            }
        };

        let items: Vec<ExtractedFact> =
            match serde_json::from_str(clean_json_response(&generation.text)) {
                Ok(items) => items,
                Err(err) => {
                    warn!(error = %err, "fact extraction response unparseable");
                    return Vec::new();
                }
            };

        let facts: Vec<UserFact> = items
            .into_iter()
            .filter_map(|item| {
                let fact_type = FactType::parse(&item.fact_type.to_lowercase())?;
                let value = item.value.trim();
                if value.is_empty() {
                    return None;
                }
                let mut fact = UserFact::new(fact_type, value);
                fact.confidence = item.confidence.clamp(0.0, 1.0);
                fact.source_message = Some(message.to_string());
                Some(fact)
            })
            .collect();

        debug!(count = facts.len(), "facts extracted");
        facts
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{LlmPool, ThinkingTier};
    use crate::testing::MockAi;
    use std::sync::Arc;

    fn extractor_with(mock: MockAi) -> FactExtractor {
        let pool = LlmPool::new(Arc::new(mock), true);
        FactExtractor::new(pool.get(ThinkingTier::Light))
    }

    #[tokio::test]
    async fn test_extracts_facts_with_deprecated_mapping() {
        let reply = r#"[
            {"fact_type": "name", "value": "Minh", "confidence": 0.95},
            {"fact_type": "background", "value": "sinh viên năm 3", "confidence": 0.9},
            {"fact_type": "strong_area", "value": "navigation", "confidence": 0.8},
            {"fact_type": "shoe_size", "value": "42", "confidence": 0.8}
        ]"#;
        let extractor = extractor_with(MockAi::new().with_rule("thông tin cá nhân", reply));

        let facts = extractor.extract("Tôi là Minh, sinh viên năm 3").await;
        assert_eq!(facts.len(), 2);
        assert_eq!(facts[0].fact_type, FactType::Name);
        assert_eq!(facts[0].value, "Minh");
        // "background" mapped to role; strong_area and unknown dropped
        assert_eq!(facts[1].fact_type, FactType::Role);
    }

    #[tokio::test]
    async fn test_empty_on_failure() {
        let extractor = extractor_with(MockAi::new().failing_invokes(5));
        assert!(extractor.extract("msg").await.is_empty());
    }
}
