//! The corrective RAG orchestrator.
//!
//! Drives the per-turn state machine: analyze → budget → retrieve →
//! pre-grade → full-grade → decide → (rewrite and loop) → generate →
//! reflect → verify. Every stage degrades per its failure policy; the
//! worst case is an apology with the best available sources and a
//! low-confidence warning, never an error surfaced to the chat boundary.
//!
//! - [`analyzer`] - query complexity analysis
//! - [`budget`] - adaptive token budgeting
//! - [`quality`] - quality mode presets
//! - [`grader`] - mini-judge + batched full grading
//! - [`rewriter`] - query rewriting and decomposition
//! - [`verifier`] - answer verification
//! - [`reflection`] - reflection-token parsing
//! - [`tracer`] - the explainability trace

pub mod analyzer;
pub mod budget;
pub mod grader;
pub mod quality;
pub mod reflection;
pub mod rewriter;
pub mod tracer;
pub mod verifier;

pub use analyzer::{QueryAnalysis, QueryAnalyzer, QueryComplexity};
pub use budget::{AdaptiveBudget, BudgetTier, TokenBudget};
pub use grader::{
    DocumentGrade, GradingResult, MiniJudge, MiniJudgeConfig, MiniJudgeResult, RetrievalGrader,
};
pub use quality::{QualityPreset, VerificationPolicy};
pub use reflection::{ReflectionParser, ReflectionResult};
pub use rewriter::QueryRewriter;
pub use tracer::ReasoningTracer;
pub use verifier::{AnswerVerifier, VerificationResult};

use tracing::{info, warn};

use crate::error::Result;
use crate::llm::LlmPool;
use crate::prompts::{format_generation_prompt, generation_system_prompt};
use crate::retrieval::HybridRetriever;
use crate::traits::ai::GenerateOptions;
use crate::types::{ReasoningTrace, RetrievedDocument, StepName, UserRole};

/// Apology returned when generation fails outright.
const APOLOGY_MESSAGE: &str =
    "Xin lỗi, hệ thống đang gặp sự cố khi tạo câu trả lời. Vui lòng thử lại sau ít phút.";

/// Documents retrieved per iteration before grading.
const K_INITIAL: usize = 10;

/// Sub-queries expanded for multi-step retrieval.
const MAX_SUB_QUERIES: usize = 3;

/// Input of one CRAG run.
#[derive(Debug, Clone)]
pub struct CragRequest {
    pub query: String,
    pub role: UserRole,

    /// Pre-formatted behavioral-insight block for the prompt
    pub insights_block: String,

    /// Pre-formatted memory/context block for the prompt
    pub memory_block: String,

    /// Semantic-cache hit similarity, if the caller has one
    pub cache_similarity: Option<f32>,
}

impl CragRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            role: UserRole::Student,
            insights_block: String::new(),
            memory_block: String::new(),
            cache_similarity: None,
        }
    }
}

/// Output of one CRAG run.
#[derive(Debug, Clone)]
pub struct CragOutcome {
    pub answer: String,
    pub sources: Vec<RetrievedDocument>,
    pub trace: ReasoningTrace,
    pub thinking_summary: String,
    pub thinking_content: Option<String>,
    pub analysis: QueryAnalysis,
    pub budget: TokenBudget,
    pub verification: Option<VerificationResult>,
    pub reflection: Option<ReflectionResult>,

    /// True when every grading iteration failed and the answer ships
    /// with best-available sources
    pub low_confidence: bool,
}

/// The corrective RAG orchestrator.
pub struct CragOrchestrator {
    analyzer: QueryAnalyzer,
    budget: AdaptiveBudget,
    hyde: crate::retrieval::HydeExpander,
    retriever: HybridRetriever,
    grader: RetrievalGrader,
    rewriter: QueryRewriter,
    verifier: AnswerVerifier,
    reflection: ReflectionParser,
    preset: QualityPreset,
    pool: LlmPool,
}

impl CragOrchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        analyzer: QueryAnalyzer,
        hyde: crate::retrieval::HydeExpander,
        retriever: HybridRetriever,
        grader: RetrievalGrader,
        rewriter: QueryRewriter,
        verifier: AnswerVerifier,
        reflection: ReflectionParser,
        preset: QualityPreset,
        pool: LlmPool,
    ) -> Self {
        Self {
            analyzer,
            budget: AdaptiveBudget::new(),
            hyde,
            retriever,
            grader,
            rewriter,
            verifier,
            reflection,
            preset,
            pool,
        }
    }

    /// Run the full pipeline for one query.
    pub async fn answer(&self, request: CragRequest) -> Result<CragOutcome> {
        let mut tracer = ReasoningTracer::new();

        // ---- Analyze -------------------------------------------------
        tracer.start_step(StepName::QueryAnalysis, "Phân tích câu hỏi");
        let analysis = self.analyzer.analyze(&request.query).await;
        tracer.end_step(
            format!(
                "complexity={:?}, multi_step={}, topics={}",
                analysis.complexity,
                analysis.requires_multi_step,
                analysis.detected_topics.join(",")
            ),
            Some(analysis.confidence),
        );

        // ---- Budget --------------------------------------------------
        let budget =
            self.budget
                .get_budget(&request.query, Some(&analysis), request.cache_similarity);

        // Greetings answer directly, no retrieval
        if budget.tier == BudgetTier::Minimal {
            return self.direct_response(request, analysis, budget, tracer).await;
        }

        // ---- Corrective loop -----------------------------------------
        let mut current_query = request.query.clone();
        let mut iteration = 0;
        let mut sources: Vec<RetrievedDocument> = Vec::new();
        let mut exhausted_low = false;
        let mut answer = String::new();
        let mut raw_answer = String::new();
        let mut thinking_content: Option<String> = None;
        let mut reflection_result: Option<ReflectionResult> = None;
        let mut generator_failed = false;

        loop {
            iteration += 1;

            // Retrieve (through HyDE when beneficial)
            tracer.start_step(
                StepName::Retrieval,
                format!("Tìm kiếm tài liệu (lần {})", iteration),
            );
            let search_text = self.hyde.enhance(&current_query).await;
            let mut documents = self
                .retriever
                .retrieve(&current_query, &search_text, K_INITIAL)
                .await?;

            // Multi-step: widen the pool with sub-query retrievals
            if iteration == 1 && analysis.requires_multi_step {
                let sub_queries = if analysis.suggested_sub_queries.is_empty() {
                    self.rewriter.decompose(&current_query).await
                } else {
                    analysis.suggested_sub_queries.clone()
                };
                for sub_query in sub_queries.iter().take(MAX_SUB_QUERIES) {
                    if sub_query == &current_query {
                        continue;
                    }
                    let extra = self
                        .retriever
                        .retrieve(sub_query, sub_query, K_INITIAL / 2)
                        .await
                        .unwrap_or_default();
                    for doc in extra {
                        if !documents.iter().any(|d| d.id == doc.id) {
                            documents.push(doc);
                        }
                    }
                }
            }
            tracer.end_step(
                format!("{} tài liệu (hyde={})", documents.len(), search_text != current_query),
                None,
            );

            // Grade
            tracer.start_step(StepName::Grading, "Chấm điểm mức độ liên quan");
            let grading = self.grader.grade_documents(&current_query, &documents).await;
            tracer.end_step_with_details(
                format!(
                    "avg={:.1}, relevant={}/{}",
                    grading.avg_score,
                    grading.relevant_count,
                    grading.grades.len()
                ),
                Some((grading.avg_score / 10.0).clamp(0.0, 1.0)),
                Some(serde_json::json!({ "saved_calls": grading.saved_calls })),
            );

            let needs_rewrite = grading.needs_rewrite(self.preset.relevance_threshold);

            if needs_rewrite && iteration < self.preset.max_iterations {
                tracer.start_step(StepName::QueryRewrite, "Viết lại câu hỏi");
                let rewritten = self.rewriter.rewrite(&current_query, &grading.feedback).await;
                tracer.end_step(format!("'{}'", rewritten), None);
                tracer.record_correction(grading.feedback.clone());
                current_query = rewritten;
                continue;
            }

            sources = select_sources(&documents, &grading);
            exhausted_low = needs_rewrite;
            if exhausted_low {
                warn!(
                    iterations = iteration,
                    "grading never passed, generating from best available sources"
                );
            }

            // ---- Generate --------------------------------------------
            tracer.start_step(StepName::Generation, "Tạo câu trả lời");
            let reflection_enabled = self.preset.enable_reflection;
            let system = generation_system_prompt(request.role, reflection_enabled);
            let prompt = format_generation_prompt(
                &request.query,
                &request.insights_block,
                &request.memory_block,
                &sources,
            );

            let options = GenerateOptions::default()
                .with_system(system)
                .with_budgets(budget.thinking_tokens, budget.response_tokens);
            let options = if reflection_enabled {
                options.with_thoughts()
            } else {
                options
            };

            let llm = self.pool.get(self.preset.generation_tier);
            let generation = match llm.invoke(&prompt, options.clone()).await {
                Ok(generation) => Ok(generation),
                // Generation retries once at the same tier
                Err(err) if err.is_transient() => llm.invoke(&prompt, options).await,
                Err(err) => Err(err),
            };

            match generation {
                Ok(generation) => {
                    raw_answer = generation.text;
                    answer = strip_reflection_tokens(&raw_answer);
                    thinking_content = generation.thinking;
                    tracer.end_step(format!("{} ký tự", answer.chars().count()), None);
                }
                Err(err) => {
                    warn!(error = %err, "generation failed after retry");
                    answer = APOLOGY_MESSAGE.to_string();
                    generator_failed = true;
                    tracer.end_step(format!("thất bại: {}", err), Some(0.0));
                    break;
                }
            }

            // ---- Reflect ---------------------------------------------
            // Parses the raw generation text: the reflection tokens are
            // stripped from the user-visible answer
            if reflection_enabled {
                let parsed = self
                    .reflection
                    .parse(&raw_answer, thinking_content.as_deref());

                if parsed.needs_correction && iteration < self.preset.max_iterations {
                    let reason = parsed
                        .correction_reason
                        .clone()
                        .unwrap_or_else(|| "Self-reflection requested correction".to_string());
                    tracer.start_step(StepName::QueryRewrite, "Viết lại sau tự đánh giá");
                    let rewritten = self.rewriter.rewrite(&current_query, &reason).await;
                    tracer.end_step(format!("'{}'", rewritten), None);
                    tracer.record_correction(reason);
                    reflection_result = Some(parsed);
                    current_query = rewritten;
                    continue;
                }
                reflection_result = Some(parsed);
            }

            break;
        }

        // ---- Verify --------------------------------------------------
        let mut verification = None;
        if !generator_failed {
            let should_verify = exhausted_low
                || match self.preset.verification {
                    VerificationPolicy::Always => true,
                    VerificationPolicy::OnDemand => {
                        analysis.requires_verification || budget.tier >= BudgetTier::Standard
                    }
                    VerificationPolicy::Off => false,
                };

            if should_verify && !sources.is_empty() {
                tracer.start_step(StepName::Verification, "Kiểm chứng câu trả lời");
                let mut result = self.verifier.verify(&answer, &sources).await;

                // Citation cross-check: every cited rule/article must
                // exist in the source corpus
                let citations = self.verifier.check_citations(&answer, &sources);
                let missing: Vec<String> = citations
                    .iter()
                    .filter(|(_, present)| !**present)
                    .map(|(citation, _)| citation.clone())
                    .collect();
                if !missing.is_empty() {
                    result
                        .issues
                        .push(format!("Citations not found in sources: {}", missing.join(", ")));
                }

                tracer.end_step_with_details(
                    format!("valid={}, confidence={:.0}", result.is_valid, result.confidence),
                    Some(result.confidence / 100.0),
                    Some(serde_json::json!({
                        "citations_checked": citations.len(),
                        "citations_missing": missing,
                    })),
                );
                verification = Some(result);
            }
        }

        let low_confidence = exhausted_low || generator_failed;
        let final_confidence = verification
            .as_ref()
            .map(|v| v.confidence / 100.0)
            .unwrap_or(if low_confidence { 0.3 } else { 0.8 });

        let thinking_summary = tracer.build_thinking_summary();
        let trace = tracer.build_trace(Some(final_confidence));

        info!(
            steps = trace.total_steps,
            corrected = trace.was_corrected,
            sources = sources.len(),
            low_confidence,
            "CRAG run complete"
        );

        Ok(CragOutcome {
            answer,
            sources,
            trace,
            thinking_summary,
            thinking_content,
            analysis,
            budget,
            verification,
            reflection: reflection_result,
            low_confidence,
        })
    }

    /// Minimal-tier path: no retrieval, one cheap generation.
    async fn direct_response(
        &self,
        request: CragRequest,
        analysis: QueryAnalysis,
        budget: TokenBudget,
        mut tracer: ReasoningTracer,
    ) -> Result<CragOutcome> {
        tracer.start_step(StepName::DirectResponse, "Trả lời trực tiếp");

        let system = generation_system_prompt(request.role, false);
        let llm = self.pool.light();
        let answer = match llm
            .invoke(
                &request.query,
                GenerateOptions::default()
                    .with_system(system)
                    .with_budgets(budget.thinking_tokens, budget.response_tokens),
            )
            .await
        {
            Ok(generation) => generation.text,
            Err(err) => {
                warn!(error = %err, "direct response failed");
                "Xin chào! Tôi là trợ giảng hàng hải. Bạn muốn hỏi về quy tắc nào?".to_string()
            }
        };
        tracer.end_step("greeting", Some(0.9));

        let thinking_summary = tracer.build_thinking_summary();
        let trace = tracer.build_trace(Some(0.9));

        Ok(CragOutcome {
            answer,
            sources: Vec::new(),
            trace,
            thinking_summary,
            thinking_content: None,
            analysis,
            budget,
            verification: None,
            reflection: None,
            low_confidence: false,
        })
    }
}

/// Pick the documents the generator sees.
///
/// Relevant documents in grade order; when nothing passed, the best
/// available by score so the answer still cites something.
fn select_sources(
    documents: &[RetrievedDocument],
    grading: &GradingResult,
) -> Vec<RetrievedDocument> {
    let mut by_id: std::collections::HashMap<&str, &RetrievedDocument> =
        documents.iter().map(|d| (d.id.as_str(), d)).collect();

    let relevant: Vec<RetrievedDocument> = grading
        .relevant_ids()
        .into_iter()
        .filter_map(|id| by_id.remove(id))
        .map(|doc| {
            let mut doc = doc.clone();
            doc.score = grading
                .grades
                .iter()
                .find(|g| g.document_id == doc.id)
                .map(|g| g.score);
            doc
        })
        .collect();

    if !relevant.is_empty() {
        return relevant;
    }

    // Best available: every graded document, highest score first
    let mut graded: Vec<(&DocumentGrade, &RetrievedDocument)> = grading
        .grades
        .iter()
        .filter_map(|g| {
            documents
                .iter()
                .find(|d| d.id == g.document_id)
                .map(|d| (g, d))
        })
        .collect();
    graded.sort_by(|a, b| {
        b.0.score
            .partial_cmp(&a.0.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    graded
        .into_iter()
        .take(5)
        .map(|(grade, doc)| {
            let mut doc = doc.clone();
            doc.score = Some(grade.score);
            doc
        })
        .collect()
}

/// Remove reflection tokens from the user-visible answer.
fn strip_reflection_tokens(text: &str) -> String {
    let pattern = regex::Regex::new(r"(?i)\[(?:IS_?SUPPORTED|IS_?USEFUL|NEEDS_?CORRECTION)[:\s]*[^\]]*\]")
        .expect("valid regex");
    pattern.replace_all(text, "").trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(id: &str, content: &str) -> RetrievedDocument {
        RetrievedDocument {
            id: id.to_string(),
            title: String::new(),
            content: content.to_string(),
            document_id: "doc".to_string(),
            page_number: 1,
            image_url: None,
            bounding_boxes: Vec::new(),
            score: None,
        }
    }

    #[test]
    fn test_select_sources_prefers_relevant() {
        let documents = vec![doc("a", "x"), doc("b", "y")];
        let grading = GradingResult {
            query: "q".into(),
            grades: vec![
                DocumentGrade {
                    document_id: "a".into(),
                    content_preview: "x".into(),
                    score: 8.5,
                    is_relevant: true,
                    reason: String::new(),
                },
                DocumentGrade {
                    document_id: "b".into(),
                    content_preview: "y".into(),
                    score: 2.0,
                    is_relevant: false,
                    reason: String::new(),
                },
            ],
            ..Default::default()
        };

        let sources = select_sources(&documents, &grading);
        assert_eq!(sources.len(), 1);
        assert_eq!(sources[0].id, "a");
        assert_eq!(sources[0].score, Some(8.5));
    }

    #[test]
    fn test_select_sources_best_available_when_none_relevant() {
        let documents = vec![doc("a", "x"), doc("b", "y")];
        let grading = GradingResult {
            query: "q".into(),
            grades: vec![
                DocumentGrade {
                    document_id: "a".into(),
                    content_preview: "x".into(),
                    score: 3.0,
                    is_relevant: false,
                    reason: String::new(),
                },
                DocumentGrade {
                    document_id: "b".into(),
                    content_preview: "y".into(),
                    score: 5.0,
                    is_relevant: false,
                    reason: String::new(),
                },
            ],
            ..Default::default()
        };

        let sources = select_sources(&documents, &grading);
        assert_eq!(sources.len(), 2);
        assert_eq!(sources[0].id, "b");
    }

    #[test]
    fn test_strip_reflection_tokens() {
        let text = "Câu trả lời đầy đủ. [IS_SUPPORTED: yes] [IS_USEFUL: yes]";
        assert_eq!(strip_reflection_tokens(text), "Câu trả lời đầy đủ.");

        let untouched = "Không có token nào ở đây.";
        assert_eq!(strip_reflection_tokens(untouched), untouched);
    }
}
