//! Reasoning trace types - the explainability record of a turn.

use serde::{Deserialize, Serialize};

/// Closed vocabulary of reasoning step names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepName {
    Routing,
    QueryAnalysis,
    Retrieval,
    Grading,
    QueryRewrite,
    Generation,
    Verification,
    QualityCheck,
    Synthesis,
    DirectResponse,
    Teaching,
    MemoryLookup,
    ToolCall,
}

impl StepName {
    pub fn as_str(&self) -> &'static str {
        match self {
            StepName::Routing => "routing",
            StepName::QueryAnalysis => "query_analysis",
            StepName::Retrieval => "retrieval",
            StepName::Grading => "grading",
            StepName::QueryRewrite => "query_rewrite",
            StepName::Generation => "generation",
            StepName::Verification => "verification",
            StepName::QualityCheck => "quality_check",
            StepName::Synthesis => "synthesis",
            StepName::DirectResponse => "direct_response",
            StepName::Teaching => "teaching",
            StepName::MemoryLookup => "memory_lookup",
            StepName::ToolCall => "tool_call",
        }
    }
}

/// One timed, typed step of the pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReasoningStep {
    pub step_name: StepName,
    pub description: String,
    pub result: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f32>,

    pub duration_ms: u64,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

/// The complete ordered trace of a turn.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReasoningTrace {
    pub total_steps: usize,
    pub total_duration_ms: u64,
    pub was_corrected: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub correction_reason: Option<String>,

    pub final_confidence: f32,
    pub steps: Vec<ReasoningStep>,
}

/// Where to insert another trace's steps when merging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergePosition {
    /// Insert at the beginning
    Prepend,
    /// Insert after the first step (keeps a routing step first)
    AfterFirst,
    /// Insert at the end
    Append,
}
