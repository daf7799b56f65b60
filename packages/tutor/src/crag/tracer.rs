//! Reasoning tracer: the explainability layer.
//!
//! Captures each pipeline stage as a timed, typed step and renders the
//! result both as a structured trace for the API and as a prose
//! "Thought Process" for UI display. Sub-pipeline traces can be merged
//! into a parent at a chosen insertion position.

use std::time::Instant;

use tracing::debug;

use crate::types::{MergePosition, ReasoningStep, ReasoningTrace, StepName};

struct OpenStep {
    step_name: StepName,
    description: String,
    started: Instant,
}

/// Per-turn step accumulator.
pub struct ReasoningTracer {
    steps: Vec<ReasoningStep>,
    current: Option<OpenStep>,
    started: Instant,
    was_corrected: bool,
    correction_reason: Option<String>,
}

impl Default for ReasoningTracer {
    fn default() -> Self {
        Self::new()
    }
}

impl ReasoningTracer {
    pub fn new() -> Self {
        Self {
            steps: Vec::new(),
            current: None,
            started: Instant::now(),
            was_corrected: false,
            correction_reason: None,
        }
    }

    /// Start tracking a step; auto-closes any open step.
    pub fn start_step(&mut self, step_name: StepName, description: impl Into<String>) {
        if self.current.is_some() {
            self.end_step("Auto-closed", None);
        }
        self.current = Some(OpenStep {
            step_name,
            description: description.into(),
            started: Instant::now(),
        });
    }

    /// End the current step with its result.
    pub fn end_step(&mut self, result: impl Into<String>, confidence: Option<f32>) {
        self.end_step_with_details(result, confidence, None);
    }

    /// End the current step with structured details attached.
    pub fn end_step_with_details(
        &mut self,
        result: impl Into<String>,
        confidence: Option<f32>,
        details: Option<serde_json::Value>,
    ) {
        let Some(open) = self.current.take() else {
            debug!("end_step called without active step");
            return;
        };

        self.steps.push(ReasoningStep {
            step_name: open.step_name,
            description: open.description,
            result: result.into(),
            confidence,
            duration_ms: open.started.elapsed().as_millis() as u64,
            details,
        });
    }

    /// Add a complete step directly (for instantaneous steps).
    pub fn add_step(
        &mut self,
        step_name: StepName,
        description: impl Into<String>,
        result: impl Into<String>,
        confidence: Option<f32>,
    ) {
        self.steps.push(ReasoningStep {
            step_name,
            description: description.into(),
            result: result.into(),
            confidence,
            duration_ms: 0,
            details: None,
        });
    }

    /// Record that a query rewrite occurred.
    pub fn record_correction(&mut self, reason: impl Into<String>) {
        self.was_corrected = true;
        self.correction_reason = Some(reason.into());
    }

    pub fn was_corrected(&self) -> bool {
        self.was_corrected
    }

    pub fn step_count(&self) -> usize {
        self.steps.len()
    }

    /// Merge steps from another trace at the given position.
    ///
    /// `AfterFirst` keeps a routing step first and slots the sub-pipeline
    /// right behind it; with no steps yet it degrades to prepend.
    pub fn merge_trace(&mut self, other: ReasoningTrace, position: MergePosition) {
        if other.steps.is_empty() {
            return;
        }

        if other.was_corrected {
            self.was_corrected = true;
            self.correction_reason = other.correction_reason.clone();
        }

        match position {
            MergePosition::Prepend => {
                let mut merged = other.steps;
                merged.append(&mut self.steps);
                self.steps = merged;
            }
            MergePosition::AfterFirst if !self.steps.is_empty() => {
                let tail = self.steps.split_off(1);
                self.steps.extend(other.steps);
                self.steps.extend(tail);
            }
            MergePosition::AfterFirst | MergePosition::Append => {
                self.steps.extend(other.steps);
            }
        }
    }

    /// Build the final trace.
    ///
    /// `final_confidence` defaults to the average of step confidences.
    pub fn build_trace(&mut self, final_confidence: Option<f32>) -> ReasoningTrace {
        if self.current.is_some() {
            self.end_step("Auto-closed", None);
        }

        let confidences: Vec<f32> = self.steps.iter().filter_map(|s| s.confidence).collect();
        let final_confidence = final_confidence.unwrap_or_else(|| {
            if confidences.is_empty() {
                0.8
            } else {
                confidences.iter().sum::<f32>() / confidences.len() as f32
            }
        });

        ReasoningTrace {
            total_steps: self.steps.len(),
            total_duration_ms: self.started.elapsed().as_millis() as u64,
            was_corrected: self.was_corrected,
            correction_reason: self.correction_reason.clone(),
            final_confidence,
            steps: self.steps.clone(),
        }
    }

    /// Prose "Thought Process" rendering for UI display.
    pub fn build_thinking_summary(&self) -> String {
        if self.steps.is_empty() {
            return String::new();
        }

        let mut lines = vec!["**Quá trình suy nghĩ:**\n".to_string()];

        for (i, step) in self.steps.iter().enumerate() {
            lines.push(format!("{}. **{}**: {}", i + 1, step.description, step.result));
            if let Some(confidence) = step.confidence {
                lines.push(format!("   _(Độ tin cậy: {:.0}%)_", confidence * 100.0));
            }
        }

        if self.was_corrected {
            if let Some(reason) = &self.correction_reason {
                lines.push(format!("\n⚠️ **Lưu ý**: {}", reason));
            }
        }

        lines.join("\n")
    }
}
