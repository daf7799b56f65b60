//! Tiered relevance grading.
//!
//! Tier 1: the mini-judge, a cheap binary yes/no LLM call per candidate,
//! run in parallel under a concurrency bound and per-call timeout.
//! Tier 2: the full grader, one batched JSON call scoring the remaining
//! uncertain candidates 0–10. Mini-judge approvals skip the second call.

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::join_all;
use serde::Deserialize;
use tokio::sync::Semaphore;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::llm::{clean_json_response, TieredLlm};
use crate::prompts::{format_batch_grading_prompt, format_mini_judge_prompt};
use crate::traits::ai::GenerateOptions;
use crate::types::RetrievedDocument;

/// Score granted to documents the mini-judge marked relevant; sits in the
/// "strongly relevant" band without a second LLM call.
const MINI_JUDGE_APPROVED_SCORE: f32 = 8.5;

/// Maximum uncertain documents sent to the full grader.
const MAX_FULL_GRADING: usize = 5;

/// Configuration for the mini-judge fan-out.
#[derive(Debug, Clone)]
pub struct MiniJudgeConfig {
    pub max_parallel: usize,
    pub timeout: Duration,
}

impl Default for MiniJudgeConfig {
    fn default() -> Self {
        Self {
            max_parallel: 10,
            timeout: Duration::from_secs(4),
        }
    }
}

/// Mini-judge confidence in its own verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JudgeConfidence {
    High,
    Medium,
    Low,
}

/// Result from one mini-judge call.
#[derive(Debug, Clone)]
pub struct MiniJudgeResult {
    pub document_id: String,
    pub is_relevant: bool,
    pub confidence: JudgeConfidence,
    pub reason: String,
    pub latency_ms: u64,
}

impl MiniJudgeResult {
    /// Confirmed relevant: skips full grading.
    pub fn is_confirmed(&self) -> bool {
        self.is_relevant && matches!(self.confidence, JudgeConfidence::High | JudgeConfidence::Medium)
    }
}

/// Binary yes/no pre-grader.
pub struct MiniJudge {
    llm: TieredLlm,
    config: MiniJudgeConfig,
}

impl MiniJudge {
    pub fn new(llm: TieredLlm, config: MiniJudgeConfig) -> Self {
        Self { llm, config }
    }

    /// Pre-grade all documents in parallel (bounded).
    ///
    /// Timeouts and errors mark the document uncertain, routing it to the
    /// full grader. Results keep document order.
    pub async fn pre_grade_batch(
        &self,
        query: &str,
        documents: &[RetrievedDocument],
    ) -> Vec<MiniJudgeResult> {
        if documents.is_empty() {
            return Vec::new();
        }

        let semaphore = Arc::new(Semaphore::new(self.config.max_parallel));
        let started = Instant::now();

        let tasks = documents.iter().map(|doc| {
            let semaphore = Arc::clone(&semaphore);
            async move {
                let _permit = semaphore.acquire().await.expect("semaphore closed");
                self.judge_single(query, doc).await
            }
        });

        let results = join_all(tasks).await;

        let relevant = results.iter().filter(|r| r.is_relevant).count();
        info!(
            total = results.len(),
            relevant,
            duration_ms = started.elapsed().as_millis() as u64,
            "mini-judge pre-grading"
        );

        results
    }

    async fn judge_single(&self, query: &str, doc: &RetrievedDocument) -> MiniJudgeResult {
        let started = Instant::now();
        let prompt = format_mini_judge_prompt(query, &doc.content);

        let options = GenerateOptions::default().with_budgets(0, 16);
        let outcome = timeout(self.config.timeout, self.llm.invoke(&prompt, options)).await;

        let latency_ms = started.elapsed().as_millis() as u64;

        match outcome {
            Ok(Ok(generation)) => {
                let text = generation.text.trim().to_lowercase();
                let is_relevant = text.chars().take(10).collect::<String>().contains("yes");

                let confidence = if text.starts_with("yes") || text.starts_with("no") {
                    JudgeConfidence::High
                } else if text.contains("yes") || text.contains("no") {
                    JudgeConfidence::Medium
                } else {
                    JudgeConfidence::Low
                };

                MiniJudgeResult {
                    document_id: doc.id.clone(),
                    is_relevant,
                    confidence,
                    reason: format!("Mini-Judge: {}", text.chars().take(30).collect::<String>()),
                    latency_ms,
                }
            }
            Ok(Err(err)) => {
                warn!(doc = %doc.id, error = %err, "mini-judge call failed");
                MiniJudgeResult {
                    document_id: doc.id.clone(),
                    is_relevant: false,
                    confidence: JudgeConfidence::Low,
                    reason: format!("[Error] {}", err.to_string().chars().take(50).collect::<String>()),
                    latency_ms,
                }
            }
            Err(_) => {
                warn!(doc = %doc.id, "mini-judge timeout");
                MiniJudgeResult {
                    document_id: doc.id.clone(),
                    is_relevant: false,
                    confidence: JudgeConfidence::Low,
                    reason: "[Timeout] Needs full grading".to_string(),
                    latency_ms,
                }
            }
        }
    }
}

/// Grade for a single document.
#[derive(Debug, Clone)]
pub struct DocumentGrade {
    pub document_id: String,
    pub content_preview: String,
    pub score: f32,
    pub is_relevant: bool,
    pub reason: String,
}

/// Result of grading a retrieval batch.
#[derive(Debug, Clone, Default)]
pub struct GradingResult {
    pub query: String,
    pub grades: Vec<DocumentGrade>,
    pub avg_score: f32,
    pub relevant_count: usize,
    pub feedback: String,

    /// Full-grader calls avoided by mini-judge approvals
    pub saved_calls: usize,
}

impl GradingResult {
    fn finalize(mut self, threshold: f32) -> Self {
        if !self.grades.is_empty() {
            self.avg_score =
                self.grades.iter().map(|g| g.score).sum::<f32>() / self.grades.len() as f32;
            self.relevant_count = self.grades.iter().filter(|g| g.is_relevant).count();
        }
        if self.needs_rewrite(threshold) {
            let issues: Vec<&str> = self
                .grades
                .iter()
                .filter(|g| !g.is_relevant)
                .map(|g| g.reason.as_str())
                .collect();
            self.feedback =
                build_feedback(self.avg_score, self.relevant_count, self.grades.len(), &issues);
        }
        self
    }

    /// True when the query should be rewritten and retried.
    pub fn needs_rewrite(&self, threshold: f32) -> bool {
        self.avg_score < threshold || self.relevant_count == 0
    }

    /// Ids of relevant documents, best score first.
    pub fn relevant_ids(&self) -> Vec<&str> {
        let mut relevant: Vec<&DocumentGrade> =
            self.grades.iter().filter(|g| g.is_relevant).collect();
        relevant.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        relevant.into_iter().map(|g| g.document_id.as_str()).collect()
    }
}

#[derive(Deserialize)]
struct BatchGradeItem {
    #[serde(default)]
    doc_index: usize,
    #[serde(default = "default_score")]
    score: f32,
    #[serde(default)]
    reason: String,
}

fn default_score() -> f32 {
    5.0
}

/// Full grader: batched scoring of uncertain candidates.
pub struct RetrievalGrader {
    llm: TieredLlm,
    mini_judge: MiniJudge,
    threshold: f32,
}

impl RetrievalGrader {
    pub fn new(llm: TieredLlm, mini_judge: MiniJudge, threshold: f32) -> Self {
        Self {
            llm,
            mini_judge,
            threshold,
        }
    }

    /// Grade documents with mini-judge pre-filtering.
    pub async fn grade_documents(
        &self,
        query: &str,
        documents: &[RetrievedDocument],
    ) -> GradingResult {
        if documents.is_empty() {
            return GradingResult {
                query: query.to_string(),
                feedback: "No documents retrieved. Try different keywords.".to_string(),
                ..Default::default()
            };
        }

        let judge_results = self.mini_judge.pre_grade_batch(query, documents).await;

        let mut grades = Vec::new();
        let mut uncertain: Vec<&RetrievedDocument> = Vec::new();

        for (doc, judge) in documents.iter().zip(judge_results.iter()) {
            if judge.is_confirmed() {
                grades.push(DocumentGrade {
                    document_id: doc.id.clone(),
                    content_preview: preview(&doc.content),
                    score: MINI_JUDGE_APPROVED_SCORE,
                    is_relevant: true,
                    reason: format!("[Mini-Judge] {}", judge.reason),
                });
            } else {
                uncertain.push(doc);
            }
        }

        let saved_calls = grades.len();
        let for_full_grading: Vec<&RetrievedDocument> =
            uncertain.into_iter().take(MAX_FULL_GRADING).collect();

        if !for_full_grading.is_empty() {
            grades.extend(self.batch_grade(query, &for_full_grading).await);
        }

        info!(
            total = documents.len(),
            approved = saved_calls,
            full_graded = for_full_grading.len(),
            "tiered grading"
        );

        GradingResult {
            query: query.to_string(),
            grades,
            saved_calls,
            ..Default::default()
        }
        .finalize(self.threshold)
    }

    /// One batched LLM call scoring every document, with rule-based
    /// degradation per document on failure.
    async fn batch_grade(&self, query: &str, documents: &[&RetrievedDocument]) -> Vec<DocumentGrade> {
        let owned: Vec<RetrievedDocument> = documents.iter().map(|d| (*d).clone()).collect();
        let prompt = format_batch_grading_prompt(query, &owned);

        let outcome = self
            .llm
            .invoke_with_retry(
                &prompt,
                GenerateOptions::default()
                    .with_system("Grade document relevance. Return only valid JSON array.")
                    .with_temperature(0.1)
                    .json(),
            )
            .await;

        match outcome {
            Ok(generation) => match self.parse_batch(&generation.text, documents) {
                Some(grades) => {
                    debug!(count = grades.len(), "batch graded in one call");
                    grades
                }
                None => {
                    warn!("batch grading response unparseable, using rule-based grades");
                    documents
                        .iter()
                        .map(|doc| rule_based_grade(query, doc, self.threshold))
                        .collect()
                }
            },
            Err(err) => {
                warn!(error = %err, "batch grading failed, using rule-based grades");
                documents
                    .iter()
                    .map(|doc| rule_based_grade(query, doc, self.threshold))
                    .collect()
            }
        }
    }

    fn parse_batch(
        &self,
        response: &str,
        documents: &[&RetrievedDocument],
    ) -> Option<Vec<DocumentGrade>> {
        let items: Vec<BatchGradeItem> =
            serde_json::from_str(clean_json_response(response)).ok()?;

        let mut grades: Vec<Option<DocumentGrade>> = vec![None; documents.len()];
        for item in items {
            let Some(doc) = documents.get(item.doc_index) else {
                // Grader invented an index: coerce rather than fail
                warn!(
                    doc_index = item.doc_index,
                    "grader returned unknown doc_index, ignoring entry"
                );
                continue;
            };
            let score = item.score.clamp(0.0, 10.0);
            grades[item.doc_index] = Some(DocumentGrade {
                document_id: doc.id.clone(),
                content_preview: preview(&doc.content),
                score,
                is_relevant: score >= self.threshold,
                reason: if item.reason.is_empty() {
                    "Batch graded".to_string()
                } else {
                    item.reason
                },
            });
        }

        // Documents the reply skipped get rule-based grades
        Some(
            grades
                .into_iter()
                .enumerate()
                .map(|(i, grade)| {
                    grade.unwrap_or_else(|| rule_based_grade("", documents[i], self.threshold))
                })
                .collect(),
        )
    }
}

/// Keyword-overlap grading, the no-LLM fallback.
pub fn rule_based_grade(query: &str, doc: &RetrievedDocument, threshold: f32) -> DocumentGrade {
    let query_words: std::collections::HashSet<String> = query
        .to_lowercase()
        .split_whitespace()
        .map(String::from)
        .collect();
    let content_words: std::collections::HashSet<String> = doc
        .content
        .to_lowercase()
        .split_whitespace()
        .map(String::from)
        .collect();

    let overlap = query_words.intersection(&content_words).count();
    let ratio = overlap as f32 / query_words.len().max(1) as f32;
    let score = (ratio * 15.0).min(10.0);

    DocumentGrade {
        document_id: doc.id.clone(),
        content_preview: preview(&doc.content),
        score,
        is_relevant: score >= threshold,
        reason: format!("Keyword overlap: {} words", overlap),
    }
}

/// Rule-based rewrite feedback: severity bucket + top unique issues +
/// a language-appropriate suggestion. No LLM call.
fn build_feedback(avg_score: f32, relevant_count: usize, total: usize, issues: &[&str]) -> String {
    let mut unique_issues: Vec<&str> = Vec::new();
    for issue in issues {
        if !unique_issues.contains(issue) {
            unique_issues.push(issue);
        }
        if unique_issues.len() == 3 {
            break;
        }
    }
    let issues_text = if unique_issues.is_empty() {
        "Documents không trực tiếp trả lời query".to_string()
    } else {
        unique_issues.join("; ")
    };

    let (severity, suggestion) = if avg_score < 3.0 {
        (
            "Rất thấp",
            "Thử sử dụng thuật ngữ hàng hải chuẩn (SOLAS, COLREGs, MARPOL)",
        )
    } else if avg_score < 5.0 {
        ("Thấp", "Thêm từ khóa cụ thể hoặc diễn đạt lại câu hỏi")
    } else {
        (
            "Trung bình",
            "Cân nhắc thêm context hoặc phạm vi cụ thể hơn",
        )
    };

    let issues_short: String = issues_text.chars().take(200).collect();
    format!(
        "Độ liên quan {} ({:.1}/10, {}/{} docs). Vấn đề: {}. Gợi ý: {}",
        severity, avg_score, relevant_count, total, issues_short, suggestion
    )
}

fn preview(content: &str) -> String {
    content.chars().take(100).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{LlmPool, ThinkingTier};
    use crate::testing::MockAi;

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

    fn grader_with(mock: MockAi) -> RetrievalGrader {
        let pool = LlmPool::new(Arc::new(mock), true);
        RetrievalGrader::new(
            pool.get(ThinkingTier::Moderate),
            MiniJudge::new(pool.get(ThinkingTier::Light), MiniJudgeConfig::default()),
            7.0,
        )
    }

    #[tokio::test]
    async fn test_mini_judge_approvals_skip_full_grading() {
        // Ten documents: six contain the marker the mock answers "yes"
        // for, four get "no" and go to the batch grader.
        let mut docs = Vec::new();
        for i in 0..6 {
            docs.push(doc(&format!("rel{}", i), "crossing situation give-way"));
        }
        for i in 0..4 {
            docs.push(doc(&format!("unc{}", i), "engine room maintenance"));
        }

        let batch_reply = r#"[
            {"doc_index": 0, "score": 4.0, "is_relevant": false, "reason": "off topic"},
            {"doc_index": 1, "score": 3.0, "is_relevant": false, "reason": "off topic"},
            {"doc_index": 2, "score": 2.0, "is_relevant": false, "reason": "off topic"},
            {"doc_index": 3, "score": 5.0, "is_relevant": false, "reason": "partial"}
        ]"#;

        let mock = MockAi::new()
            .with_rule("Retrieval Grader", batch_reply)
            .with_rule("crossing situation", "yes")
            .with_rule("engine room", "no");

        let grading = grader_with(mock)
            .grade_documents("quy tắc nhường đường", &docs)
            .await;

        assert_eq!(grading.saved_calls, 6);
        assert_eq!(grading.grades.len(), 10);
        assert_eq!(grading.relevant_count, 6);
        assert!(grading
            .grades
            .iter()
            .filter(|g| g.is_relevant)
            .all(|g| (g.score - 8.5).abs() < 1e-6));
    }

    #[tokio::test]
    async fn test_uncertain_capped_at_five() {
        let docs: Vec<RetrievedDocument> = (0..9)
            .map(|i| doc(&format!("d{}", i), "engine room maintenance"))
            .collect();

        let mock = MockAi::new()
            .with_rule("Retrieval Grader", "[]")
            .with_rule("engine room", "no");

        let grading = grader_with(mock).grade_documents("crossing rules", &docs).await;

        // Five uncertain docs graded (rule-based since reply was empty);
        // the other four uncertain docs are dropped
        assert_eq!(grading.grades.len(), 5);
        assert_eq!(grading.saved_calls, 0);
    }

    #[tokio::test]
    async fn test_unknown_doc_index_coerced() {
        let docs = vec![doc("a", "engine room maintenance")];
        let batch_reply = r#"[
            {"doc_index": 7, "score": 9.0, "is_relevant": true, "reason": "ghost"}
        ]"#;

        let mock = MockAi::new()
            .with_rule("Retrieval Grader", batch_reply)
            .with_rule("engine room", "no");

        let grading = grader_with(mock).grade_documents("crossing rules", &docs).await;

        // The invented index is ignored; the real doc gets a rule-based
        // keyword-overlap grade
        assert_eq!(grading.grades.len(), 1);
        assert!(grading.grades[0].reason.contains("Keyword overlap"));
    }

    #[tokio::test]
    async fn test_low_scores_trigger_rewrite_feedback() {
        let docs = vec![doc("a", "engine room"), doc("b", "cargo manifest")];
        let batch_reply = r#"[
            {"doc_index": 0, "score": 2.0, "is_relevant": false, "reason": "không liên quan"},
            {"doc_index": 1, "score": 1.0, "is_relevant": false, "reason": "sai chủ đề"}
        ]"#;

        let mock = MockAi::new()
            .with_rule("Retrieval Grader", batch_reply)
            .with_rule("engine room", "no")
            .with_rule("cargo manifest", "no");

        let grading = grader_with(mock).grade_documents("lookout rules", &docs).await;

        assert!(grading.needs_rewrite(7.0));
        assert!(grading.feedback.contains("Rất thấp"));
        assert!(grading.feedback.contains("không liên quan"));
    }

    #[tokio::test]
    async fn test_empty_input() {
        let grading = grader_with(MockAi::new()).grade_documents("q", &[]).await;
        assert!(grading.needs_rewrite(7.0));
        assert!(grading.feedback.contains("No documents"));
    }

    #[test]
    fn test_rule_based_grade_overlap() {
        let d = doc("a", "tàu thuyền phải nhường đường khi cắt hướng");
        let grade = rule_based_grade("tàu thuyền cắt hướng", &d, 7.0);
        assert!(grade.score > 7.0);
        assert!(grade.is_relevant);
    }
}
