//! Answer verification against cited sources.
//!
//! Asks the LLM (strict JSON) whether the answer's factual content appears
//! in the sources and whether it carries unsupported claims; citation
//! regexes cross-check rule references against the source corpus.
//! Degrades to keyword-overlap verification with a lower confidence
//! ceiling.

use std::collections::HashMap;

use regex::Regex;
use serde::Deserialize;
use tracing::{info, warn};

use crate::llm::{clean_json_response, TieredLlm};
use crate::prompts::format_verify_prompt;
use crate::traits::ai::GenerateOptions;
use crate::types::RetrievedDocument;

/// Confidence ceiling for the rule-based fallback path.
const FALLBACK_CONFIDENCE_CEILING: f32 = 60.0;

/// Result of answer verification.
#[derive(Debug, Clone)]
pub struct VerificationResult {
    pub is_valid: bool,

    /// Confidence 0–100
    pub confidence: f32,

    pub issues: Vec<String>,
    pub warning: Option<String>,
}

impl VerificationResult {
    pub fn needs_warning(&self, min_confidence: f32) -> bool {
        !self.is_valid || self.confidence < min_confidence
    }
}

#[derive(Deserialize)]
struct VerifyResponse {
    #[serde(default = "default_true")]
    is_factually_correct: bool,
    #[serde(default = "default_confidence")]
    confidence: f32,
    #[serde(default)]
    issues: Vec<String>,
    #[serde(default)]
    has_unsupported_claims: bool,
}

fn default_true() -> bool {
    true
}

fn default_confidence() -> f32 {
    80.0
}

/// Verifies answers for hallucinations.
pub struct AnswerVerifier {
    llm: TieredLlm,
    min_confidence: f32,
    citation_patterns: Vec<Regex>,
}

impl AnswerVerifier {
    pub fn new(llm: TieredLlm, min_confidence: f32) -> Self {
        let patterns = [
            r"Điều\s+\d+",
            r"Rule\s+\d+",
            r"SOLAS\s+Chapter\s+[\w-]+",
            r"MARPOL\s+Annex\s+\w+",
        ];
        Self {
            llm,
            min_confidence,
            citation_patterns: patterns
                .iter()
                .filter_map(|p| Regex::new(&format!("(?i){}", p)).ok())
                .collect(),
        }
    }

    /// Verify an answer against its sources.
    pub async fn verify(
        &self,
        answer: &str,
        sources: &[RetrievedDocument],
    ) -> VerificationResult {
        if answer.is_empty() {
            return VerificationResult {
                is_valid: false,
                confidence: 0.0,
                issues: vec!["Empty answer".to_string()],
                warning: Some("Không có câu trả lời".to_string()),
            };
        }

        if sources.is_empty() {
            return VerificationResult {
                is_valid: true,
                confidence: 50.0,
                issues: vec!["No sources to verify against".to_string()],
                warning: Some(
                    "Câu trả lời có thể không chính xác do thiếu nguồn tham khảo".to_string(),
                ),
            };
        }

        match self.verify_with_llm(answer, sources).await {
            Some(result) => result,
            None => self.rule_based_verify(answer, sources),
        }
    }

    async fn verify_with_llm(
        &self,
        answer: &str,
        sources: &[RetrievedDocument],
    ) -> Option<VerificationResult> {
        let prompt = format_verify_prompt(answer, sources);

        let generation = match self
            .llm
            .invoke_with_retry(
                &prompt,
                GenerateOptions::default()
                    .with_system("You are a fact-checker. Return only valid JSON.")
                    .with_temperature(0.0)
                    .with_budgets(0, 500)
                    .json(),
            )
            .await
        {
            Ok(generation) => generation,
            Err(err) => {
                warn!(error = %err, "LLM verification failed");
                return None;
            }
        };

        let parsed: VerifyResponse =
            match serde_json::from_str(clean_json_response(&generation.text)) {
                Ok(parsed) => parsed,
                Err(err) => {
                    warn!(error = %err, "verification response unparseable");
                    return None;
                }
            };

        let confidence = parsed.confidence.clamp(0.0, 100.0);
        let is_valid = parsed.is_factually_correct
            && !parsed.has_unsupported_claims
            && confidence >= self.min_confidence;

        let warning = if is_valid {
            None
        } else if parsed.has_unsupported_claims {
            Some("Câu trả lời có thể chứa thông tin chưa được xác minh".to_string())
        } else if confidence < self.min_confidence {
            Some(format!(
                "Độ tin cậy thấp ({:.0}%). Vui lòng kiểm tra lại với nguồn chính thức",
                confidence
            ))
        } else {
            Some("Một số thông tin có thể không chính xác".to_string())
        };

        info!(
            is_valid,
            confidence,
            issues = parsed.issues.len(),
            "answer verified"
        );

        Some(VerificationResult {
            is_valid,
            confidence,
            issues: parsed.issues,
            warning,
        })
    }

    /// Check that citations appearing in the answer exist in the sources.
    pub fn check_citations(
        &self,
        answer: &str,
        sources: &[RetrievedDocument],
    ) -> HashMap<String, bool> {
        let source_text = sources
            .iter()
            .map(|s| s.content.to_lowercase())
            .collect::<Vec<_>>()
            .join(" ");

        let mut results = HashMap::new();
        for pattern in &self.citation_patterns {
            for found in pattern.find_iter(answer) {
                let citation = found.as_str().to_string();
                let present = source_text.contains(&citation.to_lowercase());
                results.insert(citation, present);
            }
        }
        results
    }

    /// Keyword-overlap verification with a lowered confidence ceiling.
    fn rule_based_verify(
        &self,
        answer: &str,
        sources: &[RetrievedDocument],
    ) -> VerificationResult {
        let source_words: std::collections::HashSet<String> = sources
            .iter()
            .flat_map(|s| {
                s.content
                    .to_lowercase()
                    .split_whitespace()
                    .map(String::from)
                    .collect::<Vec<_>>()
            })
            .collect();

        let answer_words: Vec<String> = answer
            .to_lowercase()
            .split_whitespace()
            .map(String::from)
            .collect();

        if answer_words.is_empty() {
            return VerificationResult {
                is_valid: false,
                confidence: 0.0,
                issues: vec!["Empty answer".to_string()],
                warning: Some("Không có câu trả lời".to_string()),
            };
        }

        let overlap = answer_words
            .iter()
            .filter(|w| source_words.contains(*w))
            .count();
        let ratio = overlap as f32 / answer_words.len() as f32;
        let confidence = (ratio * 150.0).min(FALLBACK_CONFIDENCE_CEILING);

        let mut issues = Vec::new();
        if ratio < 0.3 {
            issues.push("Low keyword overlap with sources".to_string());
        }

        let is_valid = confidence >= self.min_confidence;
        VerificationResult {
            is_valid,
            confidence,
            issues,
            warning: if is_valid {
                None
            } else {
                Some("Không thể xác minh hoàn toàn do giới hạn hệ thống".to_string())
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{LlmPool, ThinkingTier};
    use crate::testing::MockAi;
    use std::sync::Arc;

    fn source(content: &str) -> RetrievedDocument {
        RetrievedDocument {
            id: "s1".to_string(),
            title: String::new(),
            content: content.to_string(),
            document_id: "doc".to_string(),
            page_number: 1,
            image_url: None,
            bounding_boxes: Vec::new(),
            score: None,
        }
    }

    fn verifier_with(mock: MockAi) -> AnswerVerifier {
        let pool = LlmPool::new(Arc::new(mock), true);
        AnswerVerifier::new(pool.get(ThinkingTier::Light), 70.0)
    }

    #[tokio::test]
    async fn test_valid_answer_passes() {
        let reply = r#"{"is_factually_correct": true, "confidence": 92, "issues": [], "has_unsupported_claims": false}"#;
        let verifier = verifier_with(MockAi::new().with_rule("Answer Verifier", reply));

        let result = verifier
            .verify("Rule 15 quy định về tình huống cắt hướng.", &[source("Rule 15 ...")])
            .await;

        assert!(result.is_valid);
        assert!(result.confidence >= 70.0);
        assert!(result.warning.is_none());
    }

    #[tokio::test]
    async fn test_unsupported_claims_warn() {
        let reply = r#"{"is_factually_correct": true, "confidence": 90, "issues": ["số liệu lạ"], "has_unsupported_claims": true}"#;
        let verifier = verifier_with(MockAi::new().with_rule("Answer Verifier", reply));

        let result = verifier.verify("answer", &[source("src")]).await;
        assert!(!result.is_valid);
        assert!(result.warning.as_deref().unwrap().contains("chưa được xác minh"));
    }

    #[tokio::test]
    async fn test_no_sources_is_uncertain() {
        let verifier = verifier_with(MockAi::new());
        let result = verifier.verify("answer", &[]).await;
        assert!((result.confidence - 50.0).abs() < 1e-6);
        assert!(result.warning.is_some());
    }

    #[tokio::test]
    async fn test_fallback_has_confidence_ceiling() {
        let verifier = verifier_with(MockAi::new().failing_invokes(5));
        let answer = "tàu thuyền phải nhường đường khi cắt hướng";
        let result = verifier.verify(answer, &[source(answer)]).await;

        // Full overlap, but the fallback path cannot exceed its ceiling
        assert!(result.confidence <= FALLBACK_CONFIDENCE_CEILING);
        assert!(!result.is_valid);
    }

    #[test]
    fn test_citation_check() {
        let verifier = verifier_with(MockAi::new());
        let sources = [source("Điều 15 của COLREGs quy định... SOLAS Chapter V nói về an toàn")];

        let citations = verifier.check_citations(
            "Theo Điều 15 và MARPOL Annex I, tàu phải nhường đường. Xem SOLAS Chapter V.",
            &sources,
        );

        assert_eq!(citations.get("Điều 15"), Some(&true));
        assert_eq!(citations.get("SOLAS Chapter V"), Some(&true));
        assert_eq!(citations.get("MARPOL Annex I"), Some(&false));
    }
}
