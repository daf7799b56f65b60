//! Gemini API request and response types.

use serde::{Deserialize, Serialize};

// =============================================================================
// Content generation
// =============================================================================

/// Content generation request (`models/{model}:generateContent`).
#[derive(Debug, Clone, Serialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct GenerateRequest {
    /// Conversation contents (usually a single user turn)
    pub contents: Vec<Content>,

    /// Optional system instruction
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_instruction: Option<Content>,

    /// Generation configuration
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generation_config: Option<GenerationConfig>,
}

impl GenerateRequest {
    /// Create a request with a single user prompt.
    pub fn from_prompt(prompt: impl Into<String>) -> Self {
        Self {
            contents: vec![Content::user_text(prompt)],
            system_instruction: None,
            generation_config: None,
        }
    }

    /// Set the system instruction.
    pub fn system(mut self, text: impl Into<String>) -> Self {
        self.system_instruction = Some(Content::text(text));
        self
    }

    /// Set the generation config.
    pub fn config(mut self, config: GenerationConfig) -> Self {
        self.generation_config = Some(config);
        self
    }
}

/// A content block: a role plus a list of parts.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Content {
    /// Role: "user" or "model" (absent for system instructions)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,

    /// Content parts
    #[serde(default)]
    pub parts: Vec<Part>,
}

impl Content {
    /// A role-less content holding one text part.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            role: None,
            parts: vec![Part::text(text)],
        }
    }

    /// A user-role content holding one text part.
    pub fn user_text(text: impl Into<String>) -> Self {
        Self {
            role: Some("user".to_string()),
            parts: vec![Part::text(text)],
        }
    }

    /// A user-role content with arbitrary parts (text + images).
    pub fn user_parts(parts: Vec<Part>) -> Self {
        Self {
            role: Some("user".to_string()),
            parts,
        }
    }
}

/// A single content part. Responses may interleave thought parts with
/// answer parts when `include_thoughts` is on.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct Part {
    /// Text payload
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,

    /// Marks a thinking part in responses
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thought: Option<bool>,

    /// Inline binary payload (vision input)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inline_data: Option<InlineData>,

    /// Remote file payload (vision input by URI)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_data: Option<FileData>,
}

impl Part {
    /// A plain text part.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Default::default()
        }
    }

    /// An inline image part from raw bytes.
    pub fn image_bytes(mime_type: impl Into<String>, data: &[u8]) -> Self {
        use base64::Engine;
        Self {
            inline_data: Some(InlineData {
                mime_type: mime_type.into(),
                data: base64::engine::general_purpose::STANDARD.encode(data),
            }),
            ..Default::default()
        }
    }

    /// An image part referencing an already-uploaded URI.
    pub fn image_uri(mime_type: impl Into<String>, uri: impl Into<String>) -> Self {
        Self {
            file_data: Some(FileData {
                mime_type: mime_type.into(),
                file_uri: uri.into(),
            }),
            ..Default::default()
        }
    }
}

/// Base64-encoded inline data.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InlineData {
    pub mime_type: String,
    pub data: String,
}

/// Reference to an uploaded file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileData {
    pub mime_type: String,
    pub file_uri: String,
}

/// Generation configuration.
#[derive(Debug, Clone, Serialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    /// Sampling temperature (0.0 to 2.0)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,

    /// Maximum tokens in the response
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_output_tokens: Option<u32>,

    /// Response MIME type ("application/json" for strict JSON output)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_mime_type: Option<String>,

    /// JSON schema constraining the response (with JSON MIME type)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_schema: Option<serde_json::Value>,

    /// Thinking configuration (Gemini 2.5+)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thinking_config: Option<ThinkingConfig>,
}

impl GenerationConfig {
    pub fn temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn max_output_tokens(mut self, max_output_tokens: u32) -> Self {
        self.max_output_tokens = Some(max_output_tokens);
        self
    }

    pub fn json_output(mut self) -> Self {
        self.response_mime_type = Some("application/json".to_string());
        self
    }

    pub fn json_schema(mut self, schema: serde_json::Value) -> Self {
        self.response_mime_type = Some("application/json".to_string());
        self.response_schema = Some(schema);
        self
    }

    /// Set the thinking budget; zero disables thinking.
    pub fn thinking(mut self, budget: u32, include_thoughts: bool) -> Self {
        self.thinking_config = Some(ThinkingConfig {
            thinking_budget: budget,
            include_thoughts,
        });
        self
    }
}

/// Thinking budget configuration.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ThinkingConfig {
    pub thinking_budget: u32,
    pub include_thoughts: bool,
}

/// Raw generation response as returned by the API.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateResponseRaw {
    #[serde(default)]
    pub candidates: Vec<Candidate>,

    #[serde(default)]
    pub usage_metadata: Option<UsageMetadata>,

    #[serde(default)]
    pub prompt_feedback: Option<PromptFeedback>,
}

/// A response candidate.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
    #[serde(default)]
    pub content: Content,

    #[serde(default)]
    pub finish_reason: Option<String>,
}

/// Safety feedback on the prompt.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptFeedback {
    #[serde(default)]
    pub block_reason: Option<String>,
}

/// Token usage statistics.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageMetadata {
    #[serde(default)]
    pub prompt_token_count: u32,

    #[serde(default)]
    pub candidates_token_count: u32,

    #[serde(default)]
    pub thoughts_token_count: Option<u32>,
}

/// Normalized generation result: answer text with thinking split out.
#[derive(Debug, Clone, Default)]
pub struct Generation {
    /// Answer text (all non-thought parts joined)
    pub text: String,

    /// Thinking text if the model returned thought parts
    pub thinking: Option<String>,

    /// Token usage if reported
    pub usage: Option<UsageMetadata>,
}

// =============================================================================
// Embeddings
// =============================================================================

/// Task type hint for the embedding model. The hint shifts the embedding
/// space so queries land near the documents that answer them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EmbeddingTaskType {
    RetrievalDocument,
    RetrievalQuery,
    SemanticSimilarity,
}

/// Embedding request (`models/{model}:embedContent`).
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EmbedRequest {
    pub content: Content,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_type: Option<EmbeddingTaskType>,

    /// Matryoshka truncation width
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_dimensionality: Option<u32>,
}

/// Embedding response.
#[derive(Debug, Clone, Deserialize)]
pub struct EmbedResponse {
    pub embedding: EmbeddingValues,
}

/// The embedding vector payload.
#[derive(Debug, Clone, Deserialize)]
pub struct EmbeddingValues {
    pub values: Vec<f32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_request_serialization() {
        let request = GenerateRequest::from_prompt("Hello")
            .system("Be brief.")
            .config(
                GenerationConfig::default()
                    .temperature(0.5)
                    .max_output_tokens(256)
                    .thinking(1024, true),
            );

        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["contents"][0]["role"], "user");
        assert_eq!(json["contents"][0]["parts"][0]["text"], "Hello");
        assert_eq!(
            json["generationConfig"]["thinkingConfig"]["thinkingBudget"],
            1024
        );
        // Unset options must not be serialized
        assert!(json["generationConfig"].get("responseMimeType").is_none());
    }

    #[test]
    fn test_response_parsing_with_thoughts() {
        let raw = r#"{
            "candidates": [{
                "content": {
                    "role": "model",
                    "parts": [
                        {"text": "pondering...", "thought": true},
                        {"text": "The answer."}
                    ]
                },
                "finishReason": "STOP"
            }],
            "usageMetadata": {"promptTokenCount": 10, "candidatesTokenCount": 5}
        }"#;

        let parsed: GenerateResponseRaw = serde_json::from_str(raw).unwrap();
        let candidate = &parsed.candidates[0];
        assert_eq!(candidate.content.parts.len(), 2);
        assert_eq!(candidate.content.parts[0].thought, Some(true));
        assert_eq!(
            candidate.content.parts[1].text.as_deref(),
            Some("The answer.")
        );
    }

    #[test]
    fn test_embed_request_task_type_casing() {
        let request = EmbedRequest {
            content: Content::text("tàu thuyền"),
            task_type: Some(EmbeddingTaskType::RetrievalQuery),
            output_dimensionality: Some(768),
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["taskType"], "RETRIEVAL_QUERY");
        assert_eq!(json["outputDimensionality"], 768);
    }
}
