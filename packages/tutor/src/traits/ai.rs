//! AI trait for LLM, embedding, and vision operations.
//!
//! Implementations wrap a specific hosted provider and handle the
//! specifics of prompting and response shapes. The core never talks to a
//! provider SDK directly; every LLM-touching component takes an
//! `Arc<dyn Ai>`.

use async_trait::async_trait;

use crate::error::Result;

/// Task type hint for embeddings.
///
/// The embedding space shifts per task so queries land near the documents
/// that answer them; similarity comparisons use their own space.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskType {
    Document,
    Query,
    Similarity,
}

/// Options for a single generation call.
#[derive(Debug, Clone, Default)]
pub struct GenerateOptions {
    /// System instruction, when the provider supports one
    pub system: Option<String>,

    /// Internal deliberation budget in tokens; zero disables thinking
    pub thinking_budget: Option<u32>,

    /// Response token cap
    pub response_budget: Option<u32>,

    /// Return the model's thinking alongside the answer
    pub include_thoughts: bool,

    /// Sampling temperature
    pub temperature: Option<f32>,

    /// Force strict JSON output
    pub json_output: bool,
}

impl GenerateOptions {
    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    pub fn with_budgets(mut self, thinking: u32, response: u32) -> Self {
        self.thinking_budget = Some(thinking);
        self.response_budget = Some(response);
        self
    }

    pub fn with_thoughts(mut self) -> Self {
        self.include_thoughts = true;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn json(mut self) -> Self {
        self.json_output = true;
        self
    }
}

/// Normalized generation result.
#[derive(Debug, Clone, Default)]
pub struct Generation {
    /// Answer text, already flattened to a single string
    pub text: String,

    /// Model thinking, when requested and returned
    pub thinking: Option<String>,
}

impl Generation {
    pub fn text_only(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            thinking: None,
        }
    }
}

/// AI trait for generative, embedding, and vision operations.
#[async_trait]
pub trait Ai: Send + Sync {
    /// Generate text from a prompt under the given budgets.
    async fn invoke(&self, prompt: &str, options: &GenerateOptions) -> Result<Generation>;

    /// Generate an embedding for text with a task-type hint.
    ///
    /// Returns the provider's raw vector; dimensionality and normalization
    /// are enforced by the `EmbeddingService` wrapper, not here.
    async fn embed(&self, text: &str, task_type: TaskType) -> Result<Vec<f32>>;

    /// Extract text from an image with the vision model.
    ///
    /// `image_uri` takes precedence over `image_bytes` when both are given.
    async fn vision_extract(
        &self,
        prompt: &str,
        image_bytes: &[u8],
        image_uri: Option<&str>,
    ) -> Result<String>;
}
