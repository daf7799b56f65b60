//! Application configuration loaded from environment variables.

use dotenvy::dotenv;
use std::env;

use crate::error::{Result, TutorError};

/// RAG quality mode: the global quality/latency trade-off.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QualityMode {
    Speed,
    Balanced,
    Quality,
}

impl QualityMode {
    pub fn parse(value: &str) -> Self {
        match value {
            "speed" => QualityMode::Speed,
            "quality" => QualityMode::Quality,
            _ => QualityMode::Balanced,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            QualityMode::Speed => "speed",
            QualityMode::Balanced => "balanced",
            QualityMode::Quality => "quality",
        }
    }
}

/// Tutor core configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct TutorConfig {
    // LLM
    pub google_api_key: Option<String>,
    pub google_model: String,
    pub embedding_model: String,
    pub embedding_dimensions: usize,
    pub thinking_enabled: bool,

    // RAG
    pub quality_mode: QualityMode,
    pub rrf_k: f32,
    pub dense_top_k: usize,
    pub sparse_top_k: usize,
    pub mini_judge_max_parallel: usize,
    pub mini_judge_timeout_secs: f64,

    // Ingestion
    pub ingestion_dpi: u32,
    pub min_text_length_for_direct: usize,
    pub force_vision_mode: bool,
    pub enrichment_enabled: bool,

    // Memory
    pub max_insights: usize,
    pub consolidation_threshold: usize,
    pub preserve_days: i64,
    pub summarize_token_threshold: usize,

    // Stores
    pub database_url: Option<String>,
    pub supabase_url: Option<String>,
    pub supabase_key: Option<String>,
}

impl Default for TutorConfig {
    fn default() -> Self {
        Self {
            google_api_key: None,
            google_model: "gemini-2.5-flash".to_string(),
            embedding_model: "gemini-embedding-001".to_string(),
            embedding_dimensions: 768,
            thinking_enabled: true,
            quality_mode: QualityMode::Balanced,
            rrf_k: 60.0,
            dense_top_k: 10,
            sparse_top_k: 10,
            mini_judge_max_parallel: 10,
            mini_judge_timeout_secs: 4.0,
            ingestion_dpi: 150,
            min_text_length_for_direct: 100,
            force_vision_mode: false,
            enrichment_enabled: true,
            max_insights: 50,
            consolidation_threshold: 40,
            preserve_days: 7,
            summarize_token_threshold: 2000,
            database_url: None,
            supabase_url: None,
            supabase_key: None,
        }
    }
}

impl TutorConfig {
    /// Load configuration from environment variables.
    ///
    /// Loads a `.env` file if present (development). Every variable has a
    /// default; only malformed values are errors.
    pub fn from_env() -> Result<Self> {
        let _ = dotenv();
        let defaults = Self::default();

        Ok(Self {
            google_api_key: env::var("GOOGLE_API_KEY").ok(),
            google_model: env_or("GOOGLE_MODEL", &defaults.google_model),
            embedding_model: env_or("EMBEDDING_MODEL", &defaults.embedding_model),
            embedding_dimensions: env_parse("EMBEDDING_DIMENSIONS", defaults.embedding_dimensions)?,
            thinking_enabled: env_parse("THINKING_ENABLED", defaults.thinking_enabled)?,
            quality_mode: QualityMode::parse(&env_or(
                "RAG_QUALITY_MODE",
                defaults.quality_mode.as_str(),
            )),
            rrf_k: env_parse("RRF_K", defaults.rrf_k)?,
            dense_top_k: env_parse("DENSE_TOP_K", defaults.dense_top_k)?,
            sparse_top_k: env_parse("SPARSE_TOP_K", defaults.sparse_top_k)?,
            mini_judge_max_parallel: env_parse(
                "MINI_JUDGE_MAX_PARALLEL",
                defaults.mini_judge_max_parallel,
            )?,
            mini_judge_timeout_secs: env_parse(
                "MINI_JUDGE_TIMEOUT_SECS",
                defaults.mini_judge_timeout_secs,
            )?,
            ingestion_dpi: env_parse("INGESTION_DPI", defaults.ingestion_dpi)?,
            min_text_length_for_direct: env_parse(
                "MIN_TEXT_LENGTH_FOR_DIRECT",
                defaults.min_text_length_for_direct,
            )?,
            force_vision_mode: env_parse("FORCE_VISION_MODE", defaults.force_vision_mode)?,
            enrichment_enabled: env_parse("ENRICHMENT_ENABLED", defaults.enrichment_enabled)?,
            max_insights: env_parse("MAX_INSIGHTS", defaults.max_insights)?,
            consolidation_threshold: env_parse(
                "CONSOLIDATION_THRESHOLD",
                defaults.consolidation_threshold,
            )?,
            preserve_days: env_parse("PRESERVE_DAYS", defaults.preserve_days)?,
            summarize_token_threshold: env_parse(
                "SUMMARIZE_TOKEN_THRESHOLD",
                defaults.summarize_token_threshold,
            )?,
            database_url: env::var("DATABASE_URL").ok(),
            supabase_url: env::var("SUPABASE_URL").ok(),
            supabase_key: env::var("SUPABASE_KEY").ok(),
        })
    }
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parse<T>(key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw
            .parse()
            .map_err(|e| TutorError::Config(format!("{} must be valid: {}", key, e))),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = TutorConfig::default();
        assert_eq!(config.embedding_dimensions, 768);
        assert_eq!(config.rrf_k, 60.0);
        assert_eq!(config.max_insights, 50);
        assert_eq!(config.consolidation_threshold, 40);
        assert_eq!(config.preserve_days, 7);
        assert_eq!(config.quality_mode, QualityMode::Balanced);
    }

    #[test]
    fn test_quality_mode_parse() {
        assert_eq!(QualityMode::parse("speed"), QualityMode::Speed);
        assert_eq!(QualityMode::parse("quality"), QualityMode::Quality);
        assert_eq!(QualityMode::parse("nonsense"), QualityMode::Balanced);
    }
}
