//! Quality mode presets: the global quality/latency trade-off.
//!
//! One preset carries every threshold the pipeline reads, including the
//! grader relevance threshold and the verifier confidence floor, which
//! live here and nowhere else.

use crate::config::QualityMode;
use crate::llm::ThinkingTier;

/// When the answer verifier runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerificationPolicy {
    /// Never verify
    Off,
    /// Verify when the analyzer flags the query or the budget tier is deep
    OnDemand,
    /// Always verify
    Always,
}

/// Preset configuration for a quality mode.
#[derive(Debug, Clone)]
pub struct QualityPreset {
    pub mode: QualityMode,

    /// Maximum retrieve→grade→rewrite iterations
    pub max_iterations: usize,

    /// Parse reflection tokens from the generator's output
    pub enable_reflection: bool,

    pub verification: VerificationPolicy,

    /// Thinking tier for generation
    pub generation_tier: ThinkingTier,

    /// Grader score at or above which a document is relevant (0–10)
    pub relevance_threshold: f32,

    /// Verifier confidence floor (0–100)
    pub verifier_min_confidence: f32,

    /// Reflection confidence thresholds
    pub confidence_high: f32,
    pub confidence_medium: f32,

    /// Stop iterating as soon as grading passes
    pub early_exit: bool,
}

impl QualityPreset {
    /// Preset for a quality mode.
    pub fn for_mode(mode: QualityMode) -> Self {
        match mode {
            QualityMode::Speed => Self {
                mode,
                max_iterations: 1,
                enable_reflection: false,
                verification: VerificationPolicy::Off,
                generation_tier: ThinkingTier::Light,
                relevance_threshold: 7.0,
                verifier_min_confidence: 70.0,
                confidence_high: 0.70,
                confidence_medium: 0.50,
                early_exit: true,
            },
            QualityMode::Balanced => Self {
                mode,
                max_iterations: 2,
                enable_reflection: true,
                verification: VerificationPolicy::OnDemand,
                generation_tier: ThinkingTier::Moderate,
                relevance_threshold: 7.0,
                verifier_min_confidence: 70.0,
                confidence_high: 0.85,
                confidence_medium: 0.60,
                early_exit: true,
            },
            QualityMode::Quality => Self {
                mode,
                max_iterations: 3,
                enable_reflection: true,
                verification: VerificationPolicy::Always,
                generation_tier: ThinkingTier::Deep,
                relevance_threshold: 7.0,
                verifier_min_confidence: 70.0,
                confidence_high: 0.92,
                confidence_medium: 0.75,
                early_exit: false,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_iteration_counts_per_mode() {
        assert_eq!(QualityPreset::for_mode(QualityMode::Speed).max_iterations, 1);
        assert_eq!(
            QualityPreset::for_mode(QualityMode::Balanced).max_iterations,
            2
        );
        assert_eq!(
            QualityPreset::for_mode(QualityMode::Quality).max_iterations,
            3
        );
    }

    #[test]
    fn test_thresholds_unified_in_preset() {
        for mode in [QualityMode::Speed, QualityMode::Balanced, QualityMode::Quality] {
            let preset = QualityPreset::for_mode(mode);
            assert!((preset.relevance_threshold - 7.0).abs() < 1e-6);
            assert!((preset.verifier_min_confidence - 70.0).abs() < 1e-6);
        }
    }

    #[test]
    fn test_speed_skips_reflection_and_verification() {
        let preset = QualityPreset::for_mode(QualityMode::Speed);
        assert!(!preset.enable_reflection);
        assert_eq!(preset.verification, VerificationPolicy::Off);
    }
}
