//! Adaptive token budgeting.
//!
//! Maps (query, analysis, cache state) to a thinking/response token
//! allocation so greetings don't pay for deep synthesis.

use tracing::debug;

use crate::crag::analyzer::{QueryAnalysis, QueryComplexity};

/// Token budget tiers, cheapest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum BudgetTier {
    /// Greeting, yes/no
    Minimal,
    /// Simple fact lookup
    Light,
    /// Analytical query
    Moderate,
    /// Multi-step reasoning
    Standard,
    /// Complex synthesis or teaching
    Deep,
}

impl BudgetTier {
    const ORDER: [BudgetTier; 5] = [
        BudgetTier::Minimal,
        BudgetTier::Light,
        BudgetTier::Moderate,
        BudgetTier::Standard,
        BudgetTier::Deep,
    ];

    /// One tier up, saturating at Deep.
    pub fn bumped(&self) -> BudgetTier {
        let idx = Self::ORDER.iter().position(|t| t == self).unwrap_or(0);
        Self::ORDER[(idx + 1).min(Self::ORDER.len() - 1)]
    }
}

/// Token allocation for one query.
#[derive(Debug, Clone)]
pub struct TokenBudget {
    pub tier: BudgetTier,
    pub thinking_tokens: u32,
    pub response_tokens: u32,
    pub reason: &'static str,
}

impl TokenBudget {
    pub fn total(&self) -> u32 {
        self.thinking_tokens + self.response_tokens
    }

    fn for_tier(tier: BudgetTier) -> Self {
        let (thinking, response, reason) = match tier {
            BudgetTier::Minimal => (100, 256, "greeting or very simple query"),
            BudgetTier::Light => (200, 512, "simple fact lookup"),
            BudgetTier::Moderate => (400, 1024, "analytical query"),
            BudgetTier::Standard => (500, 2000, "multi-step reasoning"),
            BudgetTier::Deep => (800, 4096, "complex synthesis or teaching"),
        };
        Self {
            tier,
            thinking_tokens: thinking,
            response_tokens: response,
            reason,
        }
    }
}

/// Greeting patterns that collapse the budget.
const GREETING_PATTERNS: &[&str] = &[
    "xin chào", "hello", "hi", "hey", "chào", "cảm ơn", "thank", "ok", "được", "rồi",
];

/// Complexity keywords, used when no analysis is available.
const COMPLEX_KEYWORDS: &[&str] = &[
    "so sánh", "compare", "phân tích", "analyze", "giải thích chi tiết", "explain in detail",
    "toàn diện", "comprehensive", "mối quan hệ", "relationship", "tại sao", "why",
    "như thế nào", "how",
];

const MODERATE_KEYWORDS: &[&str] = &[
    "là gì", "what is", "nghĩa là", "means", "định nghĩa", "define", "điều", "article",
    "quy định", "regulation",
];

/// Adaptive token budget selector.
#[derive(Debug, Default, Clone)]
pub struct AdaptiveBudget;

impl AdaptiveBudget {
    pub fn new() -> Self {
        Self
    }

    /// Select the budget for a query.
    pub fn get_budget(
        &self,
        query: &str,
        analysis: Option<&QueryAnalysis>,
        cache_similarity: Option<f32>,
    ) -> TokenBudget {
        let tier = self.determine_tier(query, analysis, cache_similarity);
        let budget = TokenBudget::for_tier(tier);
        debug!(tier = ?budget.tier, total = budget.total(), "token budget selected");
        budget
    }

    /// Budget for an explicit tier.
    pub fn budget_for_tier(&self, tier: BudgetTier) -> TokenBudget {
        TokenBudget::for_tier(tier)
    }

    /// True when the query is a short greeting.
    pub fn is_greeting(query: &str) -> bool {
        let trimmed = query.trim();
        trimmed.chars().count() < 20 && {
            let lower = trimmed.to_lowercase();
            GREETING_PATTERNS.iter().any(|p| lower.contains(p))
        }
    }

    fn determine_tier(
        &self,
        query: &str,
        analysis: Option<&QueryAnalysis>,
        cache_similarity: Option<f32>,
    ) -> BudgetTier {
        if Self::is_greeting(query) {
            return BudgetTier::Minimal;
        }

        if let Some(similarity) = cache_similarity {
            if similarity >= 0.95 {
                return BudgetTier::Light;
            }
        }

        if let Some(analysis) = analysis {
            let tier = match analysis.complexity {
                QueryComplexity::Simple => BudgetTier::Light,
                QueryComplexity::Moderate => BudgetTier::Moderate,
                QueryComplexity::Complex => BudgetTier::Standard,
            };
            // Maritime queries get one extra tier of headroom
            return if analysis.is_maritime_related {
                tier.bumped()
            } else {
                tier
            };
        }

        let lower = query.to_lowercase();
        if COMPLEX_KEYWORDS.iter().any(|k| lower.contains(k)) {
            return BudgetTier::Standard;
        }
        if MODERATE_KEYWORDS.iter().any(|k| lower.contains(k)) {
            return BudgetTier::Moderate;
        }

        BudgetTier::Moderate
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn analysis(complexity: QueryComplexity, maritime: bool) -> QueryAnalysis {
        QueryAnalysis {
            original_query: "q".into(),
            complexity,
            requires_multi_step: false,
            requires_verification: false,
            is_maritime_related: maritime,
            suggested_sub_queries: Vec::new(),
            detected_topics: Vec::new(),
            confidence: 0.8,
        }
    }

    #[test]
    fn test_short_greeting_is_minimal() {
        let budget = AdaptiveBudget::new().get_budget("xin chào", None, None);
        assert_eq!(budget.tier, BudgetTier::Minimal);
        assert_eq!(budget.response_tokens, 256);
    }

    #[test]
    fn test_long_message_with_greeting_word_is_not_minimal() {
        let query = "chào bạn, hãy giải thích chi tiết Rule 15 về tình huống cắt hướng";
        let budget = AdaptiveBudget::new().get_budget(query, None, None);
        assert_ne!(budget.tier, BudgetTier::Minimal);
    }

    #[test]
    fn test_cache_hit_is_light() {
        let budget = AdaptiveBudget::new().get_budget("Rule 15 là gì?", None, Some(0.97));
        assert_eq!(budget.tier, BudgetTier::Light);
    }

    #[test]
    fn test_maritime_bump() {
        let non_maritime =
            AdaptiveBudget::new().get_budget("q", Some(&analysis(QueryComplexity::Moderate, false)), None);
        assert_eq!(non_maritime.tier, BudgetTier::Moderate);

        let maritime =
            AdaptiveBudget::new().get_budget("q", Some(&analysis(QueryComplexity::Moderate, true)), None);
        assert_eq!(maritime.tier, BudgetTier::Standard);
    }

    #[test]
    fn test_bump_saturates_at_deep() {
        let budget =
            AdaptiveBudget::new().get_budget("q", Some(&analysis(QueryComplexity::Complex, true)), None);
        assert_eq!(budget.tier, BudgetTier::Deep);
        assert_eq!(BudgetTier::Deep.bumped(), BudgetTier::Deep);
    }

    #[test]
    fn test_allocations() {
        let budget = AdaptiveBudget::new().budget_for_tier(BudgetTier::Deep);
        assert_eq!(budget.thinking_tokens, 800);
        assert_eq!(budget.response_tokens, 4096);
        assert_eq!(budget.total(), 4896);
    }
}
