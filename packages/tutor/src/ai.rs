//! Gemini implementation of the [`Ai`] trait.
//!
//! The production wiring: one `GeminiClient` serves generation (with
//! thinking budgets), task-typed embeddings, and vision extraction.

use async_trait::async_trait;

use gemini_client::{EmbeddingTaskType, GeminiClient, GenerationConfig};

use crate::config::TutorConfig;
use crate::error::{Result, TutorError};
use crate::traits::ai::{Ai, GenerateOptions, Generation, TaskType};

/// Gemini-backed AI implementation.
#[derive(Clone)]
pub struct GeminiAi {
    client: GeminiClient,
    model: String,
    embedding_model: String,
    embedding_dimensions: u32,
}

impl GeminiAi {
    pub fn new(
        client: GeminiClient,
        model: impl Into<String>,
        embedding_model: impl Into<String>,
        embedding_dimensions: u32,
    ) -> Self {
        Self {
            client,
            model: model.into(),
            embedding_model: embedding_model.into(),
            embedding_dimensions,
        }
    }

    /// Build from configuration; requires `GOOGLE_API_KEY`.
    pub fn from_config(config: &TutorConfig) -> Result<Self> {
        let api_key = config
            .google_api_key
            .clone()
            .ok_or_else(|| TutorError::Config("GOOGLE_API_KEY not set".into()))?;
        Ok(Self::new(
            GeminiClient::new(api_key),
            config.google_model.clone(),
            config.embedding_model.clone(),
            config.embedding_dimensions as u32,
        ))
    }

    fn generation_config(options: &GenerateOptions) -> GenerationConfig {
        let mut config = GenerationConfig::default();
        if let Some(temperature) = options.temperature {
            config = config.temperature(temperature);
        }
        if let Some(response_budget) = options.response_budget {
            config = config.max_output_tokens(response_budget);
        }
        if let Some(thinking_budget) = options.thinking_budget {
            config = config.thinking(thinking_budget, options.include_thoughts);
        }
        if options.json_output {
            config = config.json_output();
        }
        config
    }
}

#[async_trait]
impl Ai for GeminiAi {
    async fn invoke(&self, prompt: &str, options: &GenerateOptions) -> Result<Generation> {
        let config = Self::generation_config(options);

        let generation = match &options.system {
            Some(system) => {
                self.client
                    .generate_with_system(&self.model, system, prompt, config)
                    .await?
            }
            None => self.client.generate(&self.model, prompt, config).await?,
        };

        Ok(Generation {
            text: generation.text,
            thinking: generation.thinking,
        })
    }

    async fn embed(&self, text: &str, task_type: TaskType) -> Result<Vec<f32>> {
        let task_type = match task_type {
            TaskType::Document => EmbeddingTaskType::RetrievalDocument,
            TaskType::Query => EmbeddingTaskType::RetrievalQuery,
            TaskType::Similarity => EmbeddingTaskType::SemanticSimilarity,
        };

        self.client
            .embed(&self.embedding_model, text, task_type, self.embedding_dimensions)
            .await
            .map_err(|e| TutorError::Embedding(e.to_string()))
    }

    async fn vision_extract(
        &self,
        prompt: &str,
        image_bytes: &[u8],
        image_uri: Option<&str>,
    ) -> Result<String> {
        let generation = self
            .client
            .generate_with_image(&self.model, prompt, "image/jpeg", image_bytes, image_uri)
            .await
            .map_err(|e| TutorError::Vision(e.to_string()))?;
        Ok(generation.text)
    }
}
