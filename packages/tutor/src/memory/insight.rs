//! Behavioral insight extraction from conversation turns.
//!
//! Insights describe *how* a user learns or what they struggle with,
//! never atomic identity facts. Extraction is an LLM JSON call; items
//! that are too short or smell like identity facts are rejected here.

use serde::Deserialize;
use tracing::{debug, warn};

use crate::llm::{clean_json_response, TieredLlm};
use crate::prompts::format_insight_prompt;
use crate::traits::ai::GenerateOptions;
use crate::types::{Insight, InsightCategory};

#[derive(Deserialize)]
struct ExtractedInsight {
    #[serde(default)]
    category: String,
    #[serde(default)]
    content: String,
    sub_topic: Option<String>,
    #[serde(default = "default_confidence")]
    confidence: f32,
}

fn default_confidence() -> f32 {
    0.8
}

/// Extracts behavioral insights from user messages.
pub struct InsightExtractor {
    llm: TieredLlm,
}

impl InsightExtractor {
    pub fn new(llm: TieredLlm) -> Self {
        Self { llm }
    }

    /// Extract insights from a message with recent conversation lines as
    /// context. Failures yield an empty list; extraction is best-effort.
    pub async fn extract(
        &self,
        user_id: &str,
        message: &str,
        history: &[String],
    ) -> Vec<Insight> {
        let prompt = format_insight_prompt(message, history);

        let generation = match self
            .llm
            .invoke(
                &prompt,
                GenerateOptions::default()
                    .with_temperature(0.2)
                    .with_budgets(0, 1024)
                    .json(),
            )
            .await
        {
            Ok(generation) => generation,
            Err(err) => {
                warn!(error = %err, "insight extraction failed");
                return Vec::new();
            }
        };

        let items: Vec<ExtractedInsight> =
            match serde_json::from_str(clean_json_response(&generation.text)) {
                Ok(items) => items,
                Err(err) => {
                    warn!(error = %err, "insight extraction response unparseable");
                    return Vec::new();
                }
            };

        let insights: Vec<Insight> = items
            .into_iter()
            .filter_map(|item| {
                let category = InsightCategory::parse(&item.category.to_lowercase())?;
                let content = item.content.trim().to_string();
                if content.chars().count() < Insight::MIN_CONTENT_LENGTH {
                    debug!(content = %content, "insight rejected: too short");
                    return None;
                }

                let mut insight = Insight::new(user_id, category, content)
                    .with_confidence(item.confidence);
                if let Some(topic) = item.sub_topic {
                    insight = insight.with_sub_topic(topic);
                }
                insight.source_messages = vec![message.to_string()];
                Some(insight)
            })
            .collect();

        debug!(count = insights.len(), user_id, "insights extracted");
        insights
    }
}
