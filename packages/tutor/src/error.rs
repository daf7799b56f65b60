//! Typed errors for the tutor core.
//!
//! Uses `thiserror` for library errors (not `anyhow`) to provide
//! strongly-typed, composable error handling. Variants follow the error
//! taxonomy of the pipeline: transient/permanent external failures,
//! validation failures, policy blocks, and logic invariant violations.

use thiserror::Error;

/// Errors that can occur in the tutor core.
#[derive(Debug, Error)]
pub enum TutorError {
    /// Generative model call failed
    #[error("AI service error: {0}")]
    Ai(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// Vision model call failed
    #[error("vision extraction error: {0}")]
    Vision(String),

    /// Embedding generation failed
    #[error("embedding error: {0}")]
    Embedding(String),

    /// Relational store operation failed
    #[error("storage error: {0}")]
    Storage(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// Blob store operation failed
    #[error("blob storage error: {0}")]
    Blob(String),

    /// PDF could not be opened or read
    #[error("PDF error: {0}")]
    Pdf(String),

    /// A stage exceeded its timeout
    #[error("timeout in stage: {stage}")]
    Timeout { stage: &'static str },

    /// An item failed validation and was rejected
    #[error("validation failed: {reason}")]
    Validation { reason: String },

    /// The input guard refused the message
    #[error("input blocked: {reason}")]
    PolicyBlock { reason: String },

    /// A component returned data violating a pipeline invariant
    #[error("invariant violation: {detail}")]
    InvariantViolation { detail: String },

    /// JSON parsing error
    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),

    /// Configuration error
    #[error("config error: {0}")]
    Config(String),
}

impl TutorError {
    /// Convenience constructor for storage errors from sqlx and friends.
    pub fn storage(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        TutorError::Storage(Box::new(err))
    }

    /// Convenience constructor for AI errors.
    pub fn ai(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        TutorError::Ai(Box::new(err))
    }

    /// True when a one-shot retry at a lower thinking tier is worthwhile.
    pub fn is_transient(&self) -> bool {
        match self {
            TutorError::Timeout { .. } => true,
            TutorError::Ai(source) => source
                .downcast_ref::<gemini_client::GeminiError>()
                .map(|e| e.is_transient())
                .unwrap_or(false),
            TutorError::Embedding(_) | TutorError::Vision(_) => true,
            _ => false,
        }
    }
}

impl From<gemini_client::GeminiError> for TutorError {
    fn from(err: gemini_client::GeminiError) -> Self {
        TutorError::Ai(Box::new(err))
    }
}

/// Result type alias for tutor operations.
pub type Result<T> = std::result::Result<T, TutorError>;
