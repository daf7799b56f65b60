//! Memory consolidation at capacity.
//!
//! When a user's insight list grows past the threshold, the LLM merges it
//! down to a core set, preserving category diversity (knowledge gaps and
//! learning style first) and recording what each merged insight replaces
//! in its evolution notes.

use serde::Deserialize;
use tracing::{info, warn};

use crate::llm::{clean_json_response, TieredLlm};
use crate::prompts::format_consolidation_prompt;
use crate::traits::ai::GenerateOptions;
use crate::types::{Insight, InsightCategory};

/// Target size after consolidation.
pub const CONSOLIDATION_TARGET: usize = 30;

#[derive(Deserialize)]
struct ConsolidatedItem {
    #[serde(default)]
    category: String,
    #[serde(default)]
    content: String,
    sub_topic: Option<String>,
    #[serde(default = "default_confidence")]
    confidence: f32,
    #[serde(default)]
    evolution_notes: Vec<String>,
}

fn default_confidence() -> f32 {
    0.8
}

/// Result of a consolidation run.
#[derive(Debug)]
pub struct ConsolidationResult {
    pub original_count: usize,
    pub consolidated: Vec<Insight>,
}

/// LLM-driven insight consolidator.
pub struct MemoryConsolidator {
    llm: TieredLlm,
}

impl MemoryConsolidator {
    pub fn new(llm: TieredLlm) -> Self {
        Self { llm }
    }

    /// Consolidate a user's insights down to at most
    /// [`CONSOLIDATION_TARGET`].
    ///
    /// Returns `None` when the LLM fails or produces nothing usable; the
    /// caller falls back to FIFO eviction.
    pub async fn consolidate(&self, insights: &[Insight]) -> Option<ConsolidationResult> {
        if insights.is_empty() {
            return None;
        }
        let user_id = insights[0].user_id.clone();
        let prompt = format_consolidation_prompt(insights, CONSOLIDATION_TARGET);

        let generation = match self
            .llm
            .invoke_with_retry(
                &prompt,
                GenerateOptions::default()
                    .with_temperature(0.2)
                    .with_budgets(0, 2048)
                    .json(),
            )
            .await
        {
            Ok(generation) => generation,
            Err(err) => {
                warn!(error = %err, "consolidation LLM call failed");
                return None;
            }
        };

        let items: Vec<ConsolidatedItem> =
            match serde_json::from_str(clean_json_response(&generation.text)) {
                Ok(items) => items,
                Err(err) => {
                    warn!(error = %err, "consolidation response unparseable");
                    return None;
                }
            };

        let mut consolidated: Vec<Insight> = items
            .into_iter()
            .filter_map(|item| {
                let category = InsightCategory::parse(&item.category.to_lowercase())?;
                let content = item.content.trim().to_string();
                if content.chars().count() < Insight::MIN_CONTENT_LENGTH {
                    return None;
                }
                let mut insight = Insight::new(user_id.clone(), category, content)
                    .with_confidence(item.confidence);
                insight.sub_topic = item.sub_topic;
                insight.evolution_notes = item.evolution_notes;
                Some(insight)
            })
            .collect();

        if consolidated.is_empty() {
            return None;
        }

        // Still over target: keep priority categories first, then truncate
        if consolidated.len() > CONSOLIDATION_TARGET {
            warn!(
                count = consolidated.len(),
                target = CONSOLIDATION_TARGET,
                "consolidation exceeded target, truncating"
            );
            consolidated.sort_by_key(|insight| !insight.category.is_priority());
            consolidated.truncate(CONSOLIDATION_TARGET);
        }

        info!(
            from = insights.len(),
            to = consolidated.len(),
            "insights consolidated"
        );

        Some(ConsolidationResult {
            original_count: insights.len(),
            consolidated,
        })
    }
}
