//! Insight validation: behavioral filtering, semantic duplicate
//! detection, and contradiction handling.
//!
//! Duplicates (same category, embedding cosine ≥ 0.85) are merged into
//! the existing row; contradictions (same sub-topic, antonym pair) update
//! the existing row with a superseded note; everything else stores new.

use tracing::{debug, warn};

use crate::llm::{cosine_similarity, EmbeddingService};
use crate::types::Insight;

/// Cosine similarity at or above which two insights are duplicates.
pub const DUPLICATE_SIMILARITY_THRESHOLD: f32 = 0.85;

/// What to do with a validated insight.
#[derive(Debug, Clone)]
pub enum ValidationAction {
    /// Store as a new row
    Store,
    /// Merge into an existing duplicate (index into the existing list)
    Merge { target: usize, similarity: f32 },
    /// Replace a contradicted existing row (index into the existing list)
    Update { target: usize },
    /// Drop the insight
    Reject { reason: String },
}

/// Atomic identity patterns that disqualify an insight.
const ATOMIC_PATTERNS: &[&str] = &[
    "tên là",
    "name is",
    "tuổi",
    "age",
    "sinh năm",
    "born",
    "địa chỉ",
    "address",
    "số điện thoại",
    "phone",
    "email",
    "làm việc tại",
    "work at",
    "công ty",
    "company",
];

/// Behavioral vocabulary an insight is expected to carry.
const BEHAVIORAL_PATTERNS: &[&str] = &[
    // Preference
    "thích",
    "prefer",
    "quan tâm",
    "interested in",
    "không thích",
    "dislike",
    "tránh",
    "avoid",
    // Learning
    "học",
    "learn",
    "hiểu",
    "understand",
    "tiếp cận",
    "approach",
    "phương pháp",
    "method",
    "cách",
    // Tendency
    "thường",
    "usually",
    "có xu hướng",
    "tend to",
    "thói quen",
    "habit",
    "luôn",
    "always",
    "hay",
    "often",
    // Evolution
    "đã chuyển",
    "changed from",
    "bây giờ",
    "now",
    "trước đây",
    "previously",
    "tiến bộ",
    "progress",
    "cải thiện",
    "improve",
    // Gaps
    "chưa hiểu",
    "don't understand",
    "nhầm lẫn",
    "confuse",
    "khó khăn",
    "difficulty",
    "yếu",
    "weak at",
    "thiếu",
    "lack",
];

/// Antonym pairs for contradiction detection.
const CONTRADICTION_PAIRS: &[(&[&str], &[&str])] = &[
    (&["thích", "prefer", "yêu thích"], &["không thích", "dislike", "tránh"]),
    (&["giỏi", "good at", "mạnh"], &["yếu", "weak", "kém"]),
    (&["hiểu", "understand", "nắm"], &["không hiểu", "don't understand", "chưa hiểu"]),
    (&["lý thuyết", "theory", "theoretical"], &["thực hành", "practical", "hands-on"]),
    (&["nhanh", "fast", "quick"], &["chậm", "slow"]),
];

/// Validates insights against a user's existing set.
pub struct InsightValidator {
    embeddings: EmbeddingService,
}

impl InsightValidator {
    pub fn new(embeddings: EmbeddingService) -> Self {
        Self { embeddings }
    }

    /// Decide what to do with an extracted insight.
    pub async fn validate(
        &self,
        insight: &Insight,
        existing: &[Insight],
    ) -> ValidationAction {
        // Basic checks
        if insight.content.trim().chars().count() < Insight::MIN_CONTENT_LENGTH {
            return ValidationAction::Reject {
                reason: format!(
                    "content too short (min {} chars)",
                    Insight::MIN_CONTENT_LENGTH
                ),
            };
        }
        if !Self::is_behavioral(&insight.content) {
            return ValidationAction::Reject {
                reason: "content is an atomic fact, not a behavioral insight".to_string(),
            };
        }

        // Duplicate detection: same category, semantic similarity
        if let Some((target, similarity)) = self.find_duplicate(insight, existing).await {
            debug!(similarity, "duplicate insight found");
            return ValidationAction::Merge { target, similarity };
        }

        // Contradiction detection: same sub-topic, antonym pair
        if let Some(target) = Self::find_contradiction(insight, existing) {
            debug!("contradicting insight found");
            return ValidationAction::Update { target };
        }

        ValidationAction::Store
    }

    /// True when content describes behavior rather than identity.
    pub fn is_behavioral(content: &str) -> bool {
        let lower = content.to_lowercase();
        if lower.chars().count() < Insight::MIN_CONTENT_LENGTH {
            return false;
        }

        let atomic = ATOMIC_PATTERNS.iter().any(|p| lower.contains(p));
        if atomic {
            return false;
        }

        BEHAVIORAL_PATTERNS.iter().any(|p| lower.contains(p))
    }

    async fn find_duplicate(
        &self,
        insight: &Insight,
        existing: &[Insight],
    ) -> Option<(usize, f32)> {
        let candidates: Vec<usize> = existing
            .iter()
            .enumerate()
            .filter(|(_, e)| e.category == insight.category)
            .map(|(i, _)| i)
            .collect();
        if candidates.is_empty() {
            return None;
        }

        let new_embedding = match self.embeddings.embed_for_similarity(&insight.content).await {
            Ok(embedding) => embedding,
            Err(err) => {
                warn!(error = %err, "embedding failed, falling back to token overlap");
                return Self::find_duplicate_by_tokens(insight, existing, &candidates);
            }
        };

        let mut best: Option<(usize, f32)> = None;
        for index in candidates {
            let Ok(other) = self
                .embeddings
                .embed_for_similarity(&existing[index].content)
                .await
            else {
                continue;
            };
            let similarity = cosine_similarity(&new_embedding, &other);
            if similarity >= DUPLICATE_SIMILARITY_THRESHOLD
                && best.map(|(_, s)| similarity > s).unwrap_or(true)
            {
                best = Some((index, similarity));
            }
        }
        best
    }

    /// Jaccard fallback when embeddings are down (0.6 Jaccard ≈ 0.85
    /// cosine on this kind of text).
    fn find_duplicate_by_tokens(
        insight: &Insight,
        existing: &[Insight],
        candidates: &[usize],
    ) -> Option<(usize, f32)> {
        const COMMON_WORDS: &[&str] = &[
            "user", "người", "dùng", "học", "tập", "là", "có", "và", "the", "a", "an", "is",
            "has", "and",
        ];

        let tokens = |content: &str| -> std::collections::HashSet<String> {
            content
                .to_lowercase()
                .split_whitespace()
                .filter(|w| !COMMON_WORDS.contains(w))
                .map(String::from)
                .collect()
        };

        let new_tokens = tokens(&insight.content);
        let mut best: Option<(usize, f32)> = None;
        for &index in candidates {
            let other_tokens = tokens(&existing[index].content);
            if new_tokens.is_empty() || other_tokens.is_empty() {
                continue;
            }
            let intersection = new_tokens.intersection(&other_tokens).count();
            let union = new_tokens.union(&other_tokens).count();
            let jaccard = intersection as f32 / union as f32;
            if jaccard > 0.6 && best.map(|(_, s)| jaccard > s).unwrap_or(true) {
                best = Some((index, jaccard));
            }
        }
        best
    }

    fn find_contradiction(insight: &Insight, existing: &[Insight]) -> Option<usize> {
        let sub_topic = insight.sub_topic.as_deref()?.to_lowercase();

        existing.iter().position(|other| {
            other.category == insight.category
                && other
                    .sub_topic
                    .as_deref()
                    .map(|t| t.to_lowercase() == sub_topic)
                    .unwrap_or(false)
                && Self::contents_contradict(&insight.content, &other.content)
        })
    }

    fn contents_contradict(a: &str, b: &str) -> bool {
        let a = a.to_lowercase();
        let b = b.to_lowercase();

        for (positive, negative) in CONTRADICTION_PAIRS {
            // "hiểu" also matches inside "không hiểu": a side counts as
            // positive only without its negative form
            let has_negative = |text: &str| negative.iter().any(|w| text.contains(w));
            let has_positive =
                |text: &str| positive.iter().any(|w| text.contains(w)) && !has_negative(text);

            if (has_positive(&a) && has_negative(&b)) || (has_negative(&a) && has_positive(&b)) {
                return true;
            }
        }
        false
    }
}
