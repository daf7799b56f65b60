//! Per-turn chat boundary types.

use serde::{Deserialize, Serialize};

use super::chunk::BoundingBox;
use super::trace::ReasoningTrace;

/// Caller role, used for role-aware system prompting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    Student,
    Teacher,
    Admin,
}

impl Default for UserRole {
    fn default() -> Self {
        UserRole::Student
    }
}

impl UserRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserRole::Student => "student",
            UserRole::Teacher => "teacher",
            UserRole::Admin => "admin",
        }
    }
}

/// Input of one chat turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatTurnRequest {
    pub user_id: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,

    pub message: String,

    #[serde(default)]
    pub role: UserRole,

    /// Extra caller-supplied context lines
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
}

impl ChatTurnRequest {
    pub fn new(user_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            session_id: None,
            message: message.into(),
            role: UserRole::Student,
            context: None,
        }
    }

    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn with_role(mut self, role: UserRole) -> Self {
        self.role = role;
        self
    }
}

/// A cited source in the response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceInfo {
    pub title: String,
    pub content: String,
    pub page_number: i32,
    pub document_id: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,

    #[serde(default)]
    pub bounding_boxes: Vec<BoundingBox>,
}

/// A tool invocation surfaced to the caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolUse {
    pub name: String,
    pub args_summary: String,
}

/// Output of one chat turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatTurnResponse {
    pub message: String,

    #[serde(default)]
    pub sources: Vec<SourceInfo>,

    #[serde(default)]
    pub suggested_questions: Vec<String>,

    #[serde(default)]
    pub tools_used: Vec<ToolUse>,

    #[serde(default)]
    pub topics: Vec<String>,

    pub reasoning_trace: ReasoningTrace,

    /// Prose "Thought Process" rendering for UI display
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thinking: Option<String>,

    /// Raw model thinking when the tier includes thoughts
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thinking_content: Option<String>,

    #[serde(default)]
    pub metadata: serde_json::Value,
}

impl ChatTurnResponse {
    /// A minimal response carrying just a message (refusals, apologies).
    pub fn message_only(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            sources: Vec::new(),
            suggested_questions: Vec::new(),
            tools_used: Vec::new(),
            topics: Vec::new(),
            reasoning_trace: ReasoningTrace::default(),
            thinking: None,
            thinking_content: None,
            metadata: serde_json::Value::Null,
        }
    }
}
