//! Pure Google Gemini REST API client
//!
//! A clean, minimal client for the Gemini API with no domain-specific logic.
//! Supports content generation with thinking budgets, task-typed embeddings
//! with Matryoshka truncation, vision extraction, and structured outputs.
//!
//! # Example
//!
//! ```rust,ignore
//! use gemini_client::{GeminiClient, GenerationConfig};
//!
//! let client = GeminiClient::from_env()?;
//!
//! // Generation with a thinking budget
//! let generation = client
//!     .generate(
//!         "gemini-2.5-flash",
//!         "Rule 15 COLREGs là gì?",
//!         GenerationConfig::default().thinking(1024, true),
//!     )
//!     .await?;
//! println!("{}", generation.text);
//!
//! // Embeddings (768-dim Matryoshka truncation)
//! let vector = client
//!     .embed("gemini-embedding-001", "crossing situation", EmbeddingTaskType::RetrievalQuery, 768)
//!     .await?;
//! ```
//!
//! # Vision
//!
//! ```rust,ignore
//! let text = client
//!     .generate_with_image("gemini-2.5-flash", prompt, "image/jpeg", &jpeg_bytes, None)
//!     .await?;
//! ```

pub mod error;
pub mod schema;
pub mod types;

pub use error::{GeminiError, Result};
pub use schema::StructuredOutput;
pub use types::*;

use reqwest::Client;
use tracing::{debug, warn};

/// Default API endpoint.
const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Pure Gemini API client.
#[derive(Clone)]
pub struct GeminiClient {
    http_client: Client,
    api_key: String,
    base_url: String,
}

impl GeminiClient {
    /// Create a new Gemini client with the given API key.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            http_client: Client::new(),
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }

    /// Create from environment variable `GOOGLE_API_KEY`.
    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var("GOOGLE_API_KEY")
            .map_err(|_| GeminiError::Config("GOOGLE_API_KEY not set".into()))?;
        Ok(Self::new(api_key))
    }

    /// Set a custom base URL (for proxies, regional endpoints).
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    /// Get the base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Generate content from a plain text prompt.
    ///
    /// Thought parts are split from answer parts; `Generation::thinking`
    /// is `Some` only when the model returned any.
    pub async fn generate(
        &self,
        model: &str,
        prompt: &str,
        config: GenerationConfig,
    ) -> Result<Generation> {
        let request = GenerateRequest::from_prompt(prompt).config(config);
        self.generate_request(model, request).await
    }

    /// Generate content with a system instruction.
    pub async fn generate_with_system(
        &self,
        model: &str,
        system: &str,
        prompt: &str,
        config: GenerationConfig,
    ) -> Result<Generation> {
        let request = GenerateRequest::from_prompt(prompt)
            .system(system)
            .config(config);
        self.generate_request(model, request).await
    }

    /// Generate content from a prompt plus an inline image (vision).
    ///
    /// `image_uri` takes precedence over `image_bytes` when both are given.
    pub async fn generate_with_image(
        &self,
        model: &str,
        prompt: &str,
        mime_type: &str,
        image_bytes: &[u8],
        image_uri: Option<&str>,
    ) -> Result<Generation> {
        let image_part = match image_uri {
            Some(uri) => Part::image_uri(mime_type, uri),
            None => Part::image_bytes(mime_type, image_bytes),
        };
        let request = GenerateRequest {
            contents: vec![Content::user_parts(vec![Part::text(prompt), image_part])],
            system_instruction: None,
            generation_config: None,
        };
        self.generate_request(model, request).await
    }

    /// Send a fully-built generation request.
    pub async fn generate_request(
        &self,
        model: &str,
        request: GenerateRequest,
    ) -> Result<Generation> {
        let start = std::time::Instant::now();
        let url = format!("{}/models/{}:generateContent", self.base_url, model);

        let response = self
            .http_client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                warn!(error = %e, "Gemini request failed");
                GeminiError::Network(e.to_string())
            })?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            warn!(status = %status, error = %error_text, "Gemini API error");
            return Err(GeminiError::Api(format!("{}: {}", status, error_text)));
        }

        let raw: GenerateResponseRaw = response
            .json()
            .await
            .map_err(|e| GeminiError::Parse(e.to_string()))?;

        if let Some(feedback) = &raw.prompt_feedback {
            if let Some(reason) = &feedback.block_reason {
                return Err(GeminiError::Blocked(reason.clone()));
            }
        }

        let candidate = raw
            .candidates
            .into_iter()
            .next()
            .ok_or_else(|| GeminiError::Api("No candidates in response".into()))?;

        let generation = split_candidate(candidate, raw.usage_metadata);

        debug!(
            model = %model,
            duration_ms = start.elapsed().as_millis(),
            text_len = generation.text.len(),
            has_thinking = generation.thinking.is_some(),
            "Gemini generation"
        );

        Ok(generation)
    }

    /// Generate strict-JSON output and deserialize into `T`.
    ///
    /// The schema is generated from the type with `schemars` and attached
    /// as `responseSchema`, so the model cannot return free text.
    pub async fn generate_structured<T: StructuredOutput>(
        &self,
        model: &str,
        system: &str,
        prompt: &str,
        config: GenerationConfig,
    ) -> Result<T> {
        let schema = T::gemini_schema();
        debug!(type_name = %T::type_name(), "Generated Gemini response schema");

        let request = GenerateRequest::from_prompt(prompt)
            .system(system)
            .config(config.json_schema(schema));

        let generation = self.generate_request(model, request).await?;

        serde_json::from_str(&generation.text)
            .map_err(|e| GeminiError::Parse(format!("Failed to deserialize response: {}", e)))
    }

    /// Create an embedding for text.
    ///
    /// Returns the raw vector as produced by the model, truncated to
    /// `dimensions` by the API (Matryoshka). Callers that need unit vectors
    /// must normalize; the model only self-normalizes at full width.
    pub async fn embed(
        &self,
        model: &str,
        text: &str,
        task_type: EmbeddingTaskType,
        dimensions: u32,
    ) -> Result<Vec<f32>> {
        let url = format!("{}/models/{}:embedContent", self.base_url, model);
        let request = EmbedRequest {
            content: Content::text(text),
            task_type: Some(task_type),
            output_dimensionality: Some(dimensions),
        };

        let response = self
            .http_client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                warn!(error = %e, "Embedding request failed");
                GeminiError::Network(e.to_string())
            })?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            warn!(status = %status, error = %error_text, "Gemini embedding error");
            return Err(GeminiError::Api(format!("{}: {}", status, error_text)));
        }

        let embed_response: EmbedResponse = response
            .json()
            .await
            .map_err(|e| GeminiError::Parse(e.to_string()))?;

        Ok(embed_response.embedding.values)
    }
}

/// Split a candidate's parts into answer text and thinking text.
fn split_candidate(candidate: Candidate, usage: Option<UsageMetadata>) -> Generation {
    let mut answer_parts = Vec::new();
    let mut thought_parts = Vec::new();

    for part in candidate.content.parts {
        let Some(text) = part.text else { continue };
        if part.thought.unwrap_or(false) {
            thought_parts.push(text);
        } else {
            answer_parts.push(text);
        }
    }

    Generation {
        text: answer_parts.join(""),
        thinking: if thought_parts.is_empty() {
            None
        } else {
            Some(thought_parts.join("\n"))
        },
        usage,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_builder() {
        let client = GeminiClient::new("test-key").with_base_url("https://custom.api.com");

        assert_eq!(client.api_key, "test-key");
        assert_eq!(client.base_url, "https://custom.api.com");
    }

    #[test]
    fn test_split_candidate_separates_thoughts() {
        let candidate = Candidate {
            content: Content {
                role: Some("model".into()),
                parts: vec![
                    Part {
                        text: Some("step one".into()),
                        thought: Some(true),
                        ..Default::default()
                    },
                    Part::text("Final "),
                    Part::text("answer."),
                ],
            },
            finish_reason: Some("STOP".into()),
        };

        let generation = split_candidate(candidate, None);
        assert_eq!(generation.text, "Final answer.");
        assert_eq!(generation.thinking.as_deref(), Some("step one"));
    }

    #[test]
    fn test_split_candidate_no_thoughts() {
        let candidate = Candidate {
            content: Content {
                role: Some("model".into()),
                parts: vec![Part::text("plain")],
            },
            finish_reason: None,
        };

        let generation = split_candidate(candidate, None);
        assert_eq!(generation.text, "plain");
        assert!(generation.thinking.is_none());
    }
}
