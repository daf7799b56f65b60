//! Self-reflection parsing of the generator's output.
//!
//! Extracts "is supported / is useful / needs correction" signals from
//! explicit tokens (`[IS_SUPPORTED: yes]`), JSON-style confidence scores,
//! and natural-language indicators, over both the answer text and any
//! thinking block.

use regex::Regex;
use tracing::debug;

use crate::config::QualityMode;

/// Confidence bucket for a reflection assessment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReflectionConfidence {
    High,
    Medium,
    Low,
    Unknown,
}

/// Result of reflection parsing.
#[derive(Debug, Clone)]
pub struct ReflectionResult {
    pub is_supported: bool,
    pub is_useful: bool,
    pub needs_correction: bool,
    pub confidence: ReflectionConfidence,
    pub correction_reason: Option<String>,
}

impl Default for ReflectionResult {
    /// The degradation default: supported, useful, no correction.
    fn default() -> Self {
        Self {
            is_supported: true,
            is_useful: true,
            needs_correction: false,
            confidence: ReflectionConfidence::Unknown,
            correction_reason: None,
        }
    }
}

/// Negative indicators suggesting a correction is needed.
const CORRECTION_INDICATORS: &[&str] = &[
    // Vietnamese
    "không chắc chắn",
    "cần xác minh",
    "thiếu thông tin",
    "không đủ",
    "có thể không chính xác",
    "cần kiểm tra",
    // English
    "not sure",
    "uncertain",
    "need verification",
    "insufficient",
    "may be incorrect",
    "need to check",
    "i don't know",
    "cannot determine",
    "unclear",
];

/// Positive indicators suggesting the answer is good.
const POSITIVE_INDICATORS: &[&str] = &[
    // Vietnamese
    "chắc chắn",
    "rõ ràng",
    "chính xác",
    "theo điều",
    "căn cứ",
    "dựa trên",
    // English
    "certain",
    "clear",
    "accurate",
    "according to",
    "based on",
    "as stated in",
];

/// Parses reflection tokens from generator output.
pub struct ReflectionParser {
    quality_mode: QualityMode,
    supported_pattern: Regex,
    useful_pattern: Regex,
    needs_correction_pattern: Regex,
    confidence_pattern: Regex,
    citation_patterns: Vec<Regex>,
}

impl ReflectionParser {
    pub fn new(quality_mode: QualityMode) -> Self {
        Self {
            quality_mode,
            supported_pattern: Regex::new(r"(?i)\[(?:IS_?)?SUPPORTED[:\s]*([^\]]+)\]").unwrap(),
            useful_pattern: Regex::new(r"(?i)\[(?:IS_?)?USEFUL[:\s]*([^\]]+)\]").unwrap(),
            needs_correction_pattern: Regex::new(r"(?i)\[NEEDS_?CORRECTION[:\s]*([^\]]+)\]")
                .unwrap(),
            confidence_pattern: Regex::new(
                r#"(?i)"(?:confidence|độ tin cậy)"[:\s]*["']?(\d+(?:\.\d+)?)["']?"#,
            )
            .unwrap(),
            citation_patterns: [
                r"(?i)theo điều\s*\d+",
                r"(?i)căn cứ",
                r"(?i)dựa trên",
                r"(?i)according to",
                r"(?i)based on",
                r"(?i)as per",
            ]
            .iter()
            .filter_map(|p| Regex::new(p).ok())
            .collect(),
        }
    }

    /// Parse reflection signals from answer + thinking.
    pub fn parse(&self, answer: &str, thinking: Option<&str>) -> ReflectionResult {
        let combined = match thinking {
            Some(thinking) => format!("{} {}", answer, thinking),
            None => answer.to_string(),
        };

        let is_supported = self.check_supported(&combined);
        let is_useful = self.check_useful(answer, &combined);
        let confidence = self.extract_confidence(&combined);
        let (needs_correction, correction_reason) =
            self.check_needs_correction(thinking, is_supported, is_useful, confidence, &combined);

        let result = ReflectionResult {
            is_supported,
            is_useful,
            needs_correction,
            confidence,
            correction_reason,
        };

        debug!(
            supported = result.is_supported,
            useful = result.is_useful,
            needs_correction = result.needs_correction,
            confidence = ?result.confidence,
            "reflection parsed"
        );

        result
    }

    fn check_supported(&self, combined: &str) -> bool {
        if let Some(captures) = self.supported_pattern.captures(combined) {
            return parse_bool(&captures[1]);
        }

        // Citation indicators imply grounding
        if self
            .citation_patterns
            .iter()
            .any(|p| p.is_match(combined))
        {
            return true;
        }

        let lower = combined.to_lowercase();
        !["không có thông tin", "no information"]
            .iter()
            .any(|ind| lower.contains(ind))
    }

    fn check_useful(&self, answer: &str, combined: &str) -> bool {
        if let Some(captures) = self.useful_pattern.captures(combined) {
            return parse_bool(&captures[1]);
        }

        let lower = combined.to_lowercase();
        let unhelpful = ["tôi không thể", "i cannot", "không có câu trả lời", "no answer"];
        if unhelpful.iter().any(|ind| lower.contains(ind)) {
            return false;
        }

        answer.trim().chars().count() > 50
    }

    fn extract_confidence(&self, combined: &str) -> ReflectionConfidence {
        if let Some(captures) = self.confidence_pattern.captures(combined) {
            if let Ok(score) = captures[1].parse::<f32>() {
                return if score >= 8.0 || (score <= 1.0 && score >= 0.8) {
                    ReflectionConfidence::High
                } else if score >= 5.0 || (score <= 1.0 && score >= 0.5) {
                    ReflectionConfidence::Medium
                } else {
                    ReflectionConfidence::Low
                };
            }
        }

        let lower = combined.to_lowercase();
        let positive = POSITIVE_INDICATORS
            .iter()
            .filter(|ind| lower.contains(*ind))
            .count();
        let negative = CORRECTION_INDICATORS
            .iter()
            .filter(|ind| lower.contains(*ind))
            .count();

        if positive > negative + 2 {
            ReflectionConfidence::High
        } else if negative > positive {
            ReflectionConfidence::Low
        } else {
            ReflectionConfidence::Medium
        }
    }

    fn check_needs_correction(
        &self,
        thinking: Option<&str>,
        is_supported: bool,
        is_useful: bool,
        confidence: ReflectionConfidence,
        combined: &str,
    ) -> (bool, Option<String>) {
        if let Some(captures) = self.needs_correction_pattern.captures(combined) {
            if parse_bool(&captures[1]) {
                return (true, Some("Explicit correction token found".to_string()));
            }
        }

        if let Some(thinking) = thinking {
            let lower = thinking.to_lowercase();
            for indicator in CORRECTION_INDICATORS {
                if lower.contains(indicator) {
                    return (
                        true,
                        Some(format!("Correction indicator in thinking: {}", indicator)),
                    );
                }
            }
        }

        if confidence == ReflectionConfidence::Low {
            return (true, Some("Low confidence detected".to_string()));
        }

        if !is_supported {
            return (true, Some("Answer not supported by documents".to_string()));
        }

        if !is_useful {
            return (true, Some("Answer doesn't address query".to_string()));
        }

        // Quality mode also iterates on medium confidence
        if self.quality_mode == QualityMode::Quality
            && confidence == ReflectionConfidence::Medium
        {
            return (
                true,
                Some("Quality mode: medium confidence triggers correction".to_string()),
            );
        }

        (false, None)
    }
}

fn parse_bool(value: &str) -> bool {
    matches!(
        value.trim().to_lowercase().as_str(),
        "yes" | "true" | "1" | "có" | "đúng" | "chính xác"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parser() -> ReflectionParser {
        ReflectionParser::new(QualityMode::Balanced)
    }

    #[test]
    fn test_explicit_not_supported_token() {
        let answer = "Tàu phải nhường đường theo nguyên tắc chung. [IS_SUPPORTED: no]";
        let result = parser().parse(answer, None);

        assert!(!result.is_supported);
        assert!(result.needs_correction);
        assert!(result
            .correction_reason
            .as_deref()
            .unwrap()
            .contains("not supported"));
    }

    #[test]
    fn test_explicit_supported_and_useful() {
        let answer = "Theo Điều 15, tàu thuyền nào thấy tàu kia bên mạn phải phải nhường đường. \
                      [IS_SUPPORTED: yes] [IS_USEFUL: yes]";
        let result = parser().parse(answer, None);

        assert!(result.is_supported);
        assert!(result.is_useful);
        assert!(!result.needs_correction);
    }

    #[test]
    fn test_correction_indicator_in_thinking() {
        let answer = "Theo Điều 15, câu trả lời là tàu bên phải được ưu tiên và tàu kia phải nhường đường ngay.";
        let thinking = "Tôi không chắc chắn về số điều luật này.";
        let result = parser().parse(answer, Some(thinking));

        assert!(result.needs_correction);
        assert!(result
            .correction_reason
            .as_deref()
            .unwrap()
            .contains("không chắc chắn"));
    }

    #[test]
    fn test_json_confidence_high() {
        let answer = r#"Câu trả lời dài dựa trên các nguồn đã cho về tình huống cắt hướng của tàu thuyền. {"confidence": 9}"#;
        let result = parser().parse(answer, None);
        assert_eq!(result.confidence, ReflectionConfidence::High);
        assert!(!result.needs_correction);
    }

    #[test]
    fn test_indicator_counting_low_confidence() {
        let answer = "Thông tin không đủ, có thể không chính xác, cần kiểm tra thêm với các nguồn chính thức khác.";
        let result = parser().parse(answer, None);
        assert_eq!(result.confidence, ReflectionConfidence::Low);
        assert!(result.needs_correction);
    }

    #[test]
    fn test_quality_mode_iterates_on_medium() {
        let answer = "Theo điều 15, tàu thuyền phải nhường đường trong tình huống cắt hướng có nguy cơ va chạm.";
        let balanced = ReflectionParser::new(QualityMode::Balanced).parse(answer, None);
        let quality = ReflectionParser::new(QualityMode::Quality).parse(answer, None);

        assert!(!balanced.needs_correction);
        assert!(quality.needs_correction || quality.confidence == ReflectionConfidence::High);
    }

    #[test]
    fn test_default_is_no_correction() {
        let result = ReflectionResult::default();
        assert!(result.is_supported);
        assert!(result.is_useful);
        assert!(!result.needs_correction);
        assert_eq!(result.confidence, ReflectionConfidence::Unknown);
    }

    #[test]
    fn test_unhelpful_answer_not_useful() {
        let result = parser().parse("Tôi không thể trả lời câu hỏi này.", None);
        assert!(!result.is_useful);
        assert!(result.needs_correction);
    }
}
