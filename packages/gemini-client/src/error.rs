//! Error types for the Gemini client.

use thiserror::Error;

/// Result type for Gemini client operations.
pub type Result<T> = std::result::Result<T, GeminiError>;

/// Gemini client errors.
#[derive(Debug, Error)]
pub enum GeminiError {
    /// Configuration error (missing API key, invalid settings)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Network error (connection failed, timeout)
    #[error("Network error: {0}")]
    Network(String),

    /// API error (non-2xx response, rate limit, invalid request)
    #[error("API error: {0}")]
    Api(String),

    /// Parse error (invalid JSON, unexpected response format)
    #[error("Parse error: {0}")]
    Parse(String),

    /// The response was blocked by the provider's safety filters
    #[error("Blocked by safety filter: {0}")]
    Blocked(String),
}

impl GeminiError {
    /// True when the failure is worth a retry (timeouts, 5xx, rate limits).
    pub fn is_transient(&self) -> bool {
        match self {
            GeminiError::Network(_) => true,
            GeminiError::Api(msg) => {
                msg.contains("429") || msg.contains("500") || msg.contains("503")
            }
            _ => false,
        }
    }
}
