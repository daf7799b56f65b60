//! HyDE (Hypothetical Document Embeddings) query expansion.
//!
//! Vague queries embed poorly against formal regulatory text. For those,
//! the LLM drafts a hypothetical passage in the register of the corpus and
//! the passage is embedded instead of the raw query. Queries carrying an
//! exact citation skip expansion; the raw terms are the better signal.

use regex::Regex;
use tracing::{debug, warn};

use crate::error::Result;
use crate::llm::TieredLlm;
use crate::prompts::format_hyde_prompt;
use crate::traits::ai::GenerateOptions;

/// Result of HyDE query enhancement.
#[derive(Debug, Clone)]
pub struct HydeResult {
    pub original_query: String,
    pub hypothetical_document: String,
    pub language: &'static str,
    pub expanded: bool,
}

/// Decides whether to expand and generates the hypothetical passage.
pub struct HydeExpander {
    llm: TieredLlm,
    vague_patterns: Vec<Regex>,
    specific_patterns: Vec<Regex>,
}

impl HydeExpander {
    pub fn new(llm: TieredLlm) -> Self {
        let vague = [
            r"^(what|how|why|when|where|who|which)\s",
            r"^(là gì|như thế nào|tại sao|khi nào|ở đâu|ai|cái gì)\b",
            r"^(giải thích|mô tả|định nghĩa|nêu)\s",
            r"^(explain|describe|define|what is)\s",
        ];
        let specific = [
            r"\b(rule|quy tắc|điều)\s*\d+\b",
            r"\b\d{2,}\b",
            r#"^".*"$"#,
        ];

        Self {
            llm,
            vague_patterns: compile(&vague),
            specific_patterns: compile(&specific),
        }
    }

    /// Detect Vietnamese by diacritics.
    pub fn detect_language(text: &str) -> &'static str {
        const VIETNAMESE_CHARS: &str =
            "ăâđêôơưáàảãạắằẳẵặấầẩẫậéèẻẽẹếềểễệíìỉĩịóòỏõọốồổỗộớờởỡợúùủũụứừửữựýỳỷỹỵ";
        let lower = text.to_lowercase();
        if lower.chars().any(|c| VIETNAMESE_CHARS.contains(c)) {
            "vi"
        } else {
            "en"
        }
    }

    /// True for vague/complex queries that benefit from expansion.
    ///
    /// Specific patterns (rule numbers, quoted phrases) win over vague
    /// ones; unmatched queries of ≥5 tokens default to expansion.
    pub fn should_expand(&self, query: &str) -> bool {
        let query_lower = query.trim().to_lowercase();

        for pattern in &self.specific_patterns {
            if pattern.is_match(&query_lower) {
                debug!(query = %query, "HyDE skipped: specific pattern");
                return false;
            }
        }

        for pattern in &self.vague_patterns {
            if pattern.is_match(&query_lower) {
                return true;
            }
        }

        query.split_whitespace().count() >= 5
    }

    /// Generate the hypothetical passage for a query.
    pub async fn generate(&self, query: &str) -> Result<HydeResult> {
        let language = Self::detect_language(query);
        let prompt = format_hyde_prompt(query, language == "vi");

        let generation = self
            .llm
            .invoke(
                &prompt,
                GenerateOptions::default()
                    .with_temperature(0.3)
                    .with_budgets(0, 512),
            )
            .await?;

        let passage = generation.text.trim().to_string();
        if passage.chars().count() < 50 {
            warn!(len = passage.len(), "HyDE generated a short passage");
        }

        debug!(query = %query, passage_len = passage.len(), "HyDE passage generated");

        Ok(HydeResult {
            original_query: query.to_string(),
            hypothetical_document: passage,
            language,
            expanded: true,
        })
    }

    /// Expand when beneficial; failures degrade to the raw query.
    pub async fn enhance(&self, query: &str) -> String {
        if !self.should_expand(query) {
            return query.to_string();
        }

        match self.generate(query).await {
            Ok(result) if !result.hypothetical_document.is_empty() => {
                result.hypothetical_document
            }
            Ok(_) => query.to_string(),
            Err(err) => {
                warn!(error = %err, "HyDE generation failed, using raw query");
                query.to_string()
            }
        }
    }
}

fn compile(patterns: &[&str]) -> Vec<Regex> {
    patterns
        .iter()
        .filter_map(|p| Regex::new(p).ok())
        .collect()
}
