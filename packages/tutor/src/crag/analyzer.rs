//! Query analysis: complexity classification and processing strategy.
//!
//! LLM JSON call with a rule-based keyword fallback, so analysis always
//! produces something even when the model is down.

use serde::Deserialize;
use tracing::{debug, warn};

use crate::error::Result;
use crate::llm::{clean_json_response, TieredLlm};
use crate::prompts::format_analysis_prompt;
use crate::traits::ai::GenerateOptions;

/// Query complexity levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryComplexity {
    /// Direct lookup, single fact
    Simple,
    /// Requires context or comparison
    Moderate,
    /// Multi-step reasoning, synthesis
    Complex,
}

/// Result of query analysis.
#[derive(Debug, Clone)]
pub struct QueryAnalysis {
    pub original_query: String,
    pub complexity: QueryComplexity,
    pub requires_multi_step: bool,
    pub requires_verification: bool,
    pub is_maritime_related: bool,
    pub suggested_sub_queries: Vec<String>,
    pub detected_topics: Vec<String>,
    pub confidence: f32,
}

#[derive(Deserialize)]
struct AnalysisResponse {
    complexity: Option<String>,
    #[serde(default)]
    requires_multi_step: bool,
    #[serde(default)]
    requires_verification: bool,
    #[serde(default = "default_true")]
    is_maritime_related: bool,
    #[serde(default)]
    detected_topics: Vec<String>,
    #[serde(default)]
    sub_queries: Vec<String>,
    #[serde(default = "default_confidence")]
    confidence: f32,
}

fn default_true() -> bool {
    true
}

fn default_confidence() -> f32 {
    0.8
}

/// Maritime topic keywords for the rule-based path.
const MARITIME_TOPICS: &[(&str, &str)] = &[
    ("colregs", "COLREGs"),
    ("solas", "SOLAS"),
    ("marpol", "MARPOL"),
    ("rule", "Regulations"),
    ("điều", "Regulations"),
    ("tàu", "Ships"),
    ("thuyền", "Ships"),
    ("hàng hải", "Maritime"),
];

const COMPLEX_INDICATORS: &[&str] = &[
    "so sánh", "compare", "phân tích", "analyze", "tất cả", "all", "liệt kê", "list", "tổng hợp",
];

const MODERATE_INDICATORS: &[&str] = &[
    "tại sao", "why", "như thế nào", "how", "giải thích", "explain", "khác nhau", "difference",
];

/// Analyzes query complexity for the CRAG orchestrator.
pub struct QueryAnalyzer {
    llm: TieredLlm,
}

impl QueryAnalyzer {
    pub fn new(llm: TieredLlm) -> Self {
        Self { llm }
    }

    /// Analyze a query; the rule-based fallback covers LLM failure.
    pub async fn analyze(&self, query: &str) -> QueryAnalysis {
        match self.analyze_with_llm(query).await {
            Ok(analysis) => analysis,
            Err(err) => {
                warn!(error = %err, "LLM analysis failed, using rule-based");
                Self::rule_based(query)
            }
        }
    }

    async fn analyze_with_llm(&self, query: &str) -> Result<QueryAnalysis> {
        let prompt = format_analysis_prompt(query);
        let generation = self
            .llm
            .invoke(
                &prompt,
                GenerateOptions::default()
                    .with_system("You are a query analyzer. Return only valid JSON.")
                    .with_temperature(0.1)
                    .with_budgets(0, 500)
                    .json(),
            )
            .await?;

        let parsed: AnalysisResponse =
            serde_json::from_str(clean_json_response(&generation.text))?;

        let complexity = match parsed.complexity.as_deref() {
            Some("simple") => QueryComplexity::Simple,
            Some("complex") => QueryComplexity::Complex,
            _ => QueryComplexity::Moderate,
        };

        let analysis = QueryAnalysis {
            original_query: query.to_string(),
            complexity,
            requires_multi_step: parsed.requires_multi_step,
            requires_verification: parsed.requires_verification,
            is_maritime_related: parsed.is_maritime_related,
            suggested_sub_queries: parsed.sub_queries,
            detected_topics: parsed.detected_topics,
            confidence: parsed.confidence.clamp(0.0, 1.0),
        };

        debug!(
            complexity = ?analysis.complexity,
            multi_step = analysis.requires_multi_step,
            topics = analysis.detected_topics.len(),
            "query analyzed"
        );

        Ok(analysis)
    }

    /// Keyword-pattern fallback.
    pub fn rule_based(query: &str) -> QueryAnalysis {
        let lower = query.to_lowercase();

        let detected_topics: Vec<String> = MARITIME_TOPICS
            .iter()
            .filter(|(keyword, _)| lower.contains(keyword))
            .map(|(_, topic)| topic.to_string())
            .collect();
        let is_maritime = !detected_topics.is_empty();

        let mut complexity = QueryComplexity::Simple;
        let mut requires_multi_step = false;
        let mut requires_verification = false;

        if COMPLEX_INDICATORS.iter().any(|i| lower.contains(i)) {
            complexity = QueryComplexity::Complex;
            requires_multi_step = true;
            requires_verification = true;
        } else if MODERATE_INDICATORS.iter().any(|i| lower.contains(i)) {
            complexity = QueryComplexity::Moderate;
            requires_verification = true;
        }

        QueryAnalysis {
            original_query: query.to_string(),
            complexity,
            requires_multi_step,
            requires_verification,
            is_maritime_related: is_maritime,
            suggested_sub_queries: Vec::new(),
            detected_topics,
            confidence: 0.7,
        }
    }
}
