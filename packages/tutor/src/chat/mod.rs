//! Per-turn chat orchestration.
//!
//! Sequence: input guard → context assembly → CRAG → response assembly →
//! background persistence. A blocked message never reaches retrieval or
//! the generative model; background tasks never block the reply.
//!
//! - [`context`] - concurrent context assembly
//! - [`response`] - source merging and follow-up questions
//! - [`session`] - process-wide session state

pub mod context;
pub mod response;
pub mod session;

pub use context::{ContextBuilder, TurnContext};
pub use response::ResponseBuilder;
pub use session::{PronounStyle, SessionRegistry, SessionState};

use std::sync::Arc;

use tracing::{info, warn};
use uuid::Uuid;

use crate::crag::{CragOrchestrator, CragOutcome, CragRequest, ReasoningTracer};
use crate::error::Result;
use crate::graph::LearningGraphService;
use crate::memory::{MemoryEngine, SessionSummarizer};
use crate::traits::guard::{GuardDecision, InputGuard};
use crate::traits::store::MemoryStore;
use crate::types::{
    ChatTurnRequest, ChatTurnResponse, MemoryKind, MergePosition, StepName, ToolUse,
};

/// Canned refusal for blocked input.
const REFUSAL_MESSAGE: &str =
    "Xin lỗi, tôi không thể trả lời nội dung này. Vui lòng sử dụng ngôn ngữ phù hợp \
     khi trao đổi về các chủ đề hàng hải.";

/// Warning prefix when the answer ships with low confidence.
const LOW_CONFIDENCE_WARNING: &str =
    "Độ tin cậy thấp: không tìm được tài liệu khớp hoàn toàn với câu hỏi. \
     Vui lòng đối chiếu với nguồn chính thức.";

/// The per-turn façade the HTTP layer calls.
pub struct ChatOrchestrator {
    guard: Arc<dyn InputGuard>,
    context_builder: ContextBuilder,
    crag: Arc<CragOrchestrator>,
    response_builder: ResponseBuilder,
    memory: Arc<MemoryEngine>,
    summarizer: Arc<SessionSummarizer>,
    graph: Option<Arc<LearningGraphService>>,
    sessions: SessionRegistry,

    /// Await background tasks before returning (tests only)
    inline_background: bool,
}

impl ChatOrchestrator {
    pub fn new(
        guard: Arc<dyn InputGuard>,
        memory: Arc<MemoryEngine>,
        summarizer: Arc<SessionSummarizer>,
        graph: Option<Arc<LearningGraphService>>,
        crag: Arc<CragOrchestrator>,
    ) -> Self {
        Self {
            guard,
            context_builder: ContextBuilder::new(Arc::clone(&memory), graph.clone()),
            crag,
            response_builder: ResponseBuilder::new(),
            memory,
            summarizer,
            graph,
            sessions: SessionRegistry::new(),
            inline_background: false,
        }
    }

    /// Await background tasks before returning. Only for tests that need
    /// deterministic persistence.
    pub fn with_inline_background(mut self) -> Self {
        self.inline_background = true;
        self
    }

    pub fn sessions(&self) -> &SessionRegistry {
        &self.sessions
    }

    /// Handle one chat turn.
    pub async fn handle_turn(&self, request: ChatTurnRequest) -> Result<ChatTurnResponse> {
        let session_id = request
            .session_id
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        // ---- Input guard --------------------------------------------
        if let GuardDecision::Block { reason } = self.guard.check(&request.message) {
            warn!(user_id = %request.user_id, reason = %reason, "message blocked");
            return Ok(self
                .blocked_response(&request, &session_id, reason)
                .await);
        }

        // ---- Context ------------------------------------------------
        let mut tracer = ReasoningTracer::new();
        tracer.start_step(StepName::Routing, "Tiếp nhận câu hỏi");
        let context = self
            .context_builder
            .build(&request.user_id, &request.message)
            .await;
        tracer.end_step(
            format!(
                "insights={}, facts={}, memories={}",
                context.insights_count, context.facts_count, context.memories_count
            ),
            None,
        );

        // Caller-supplied context rides along with the memory block
        let memory_block = match &request.context {
            Some(extra) if !extra.is_empty() => {
                if context.memory_block.is_empty() {
                    extra.clone()
                } else {
                    format!("{}\n\n{}", context.memory_block, extra)
                }
            }
            _ => context.memory_block.clone(),
        };

        // ---- CRAG ---------------------------------------------------
        let outcome = self
            .crag
            .answer(CragRequest {
                query: request.message.clone(),
                role: request.role,
                insights_block: context.insights_block.clone(),
                memory_block,
                cache_similarity: None,
            })
            .await?;

        // ---- Response -----------------------------------------------
        let response = self.assemble_response(&request, &session_id, tracer, &outcome);
        self.sessions.record_response(&session_id);

        // ---- Background ---------------------------------------------
        let background = self.background_task(
            request.user_id.clone(),
            session_id,
            request.message.clone(),
            response.message.clone(),
            outcome.analysis.detected_topics.clone(),
            outcome
                .reflection
                .as_ref()
                .map(|r| r.needs_correction)
                .unwrap_or(false),
        );

        if self.inline_background {
            background.await;
        } else {
            tokio::spawn(background);
        }

        Ok(response)
    }

    fn assemble_response(
        &self,
        request: &ChatTurnRequest,
        session_id: &str,
        mut tracer: ReasoningTracer,
        outcome: &CragOutcome,
    ) -> ChatTurnResponse {
        let sources = self.response_builder.merge_same_page_sources(&outcome.sources);
        let suggested_questions = self
            .response_builder
            .suggest_questions(&sources, &outcome.analysis.detected_topics);

        // Verifier warning wins; the bare low-confidence case gets the
        // generic one
        let warning = outcome
            .verification
            .as_ref()
            .and_then(|v| v.warning.clone())
            .or_else(|| {
                if outcome.low_confidence {
                    Some(LOW_CONFIDENCE_WARNING.to_string())
                } else {
                    None
                }
            });

        let message = match warning {
            Some(warning) => format!("⚠️ {}\n\n{}", warning, outcome.answer),
            None => outcome.answer.clone(),
        };

        tracer.merge_trace(outcome.trace.clone(), MergePosition::AfterFirst);
        tracer.add_step(
            StepName::Synthesis,
            "Tổng hợp câu trả lời",
            format!("{} nguồn, {} câu hỏi gợi ý", sources.len(), suggested_questions.len()),
            None,
        );
        let thinking = tracer.build_thinking_summary();
        let trace = tracer.build_trace(Some(outcome.trace.final_confidence));

        info!(
            user_id = %request.user_id,
            session_id = %session_id,
            sources = sources.len(),
            corrected = trace.was_corrected,
            "turn complete"
        );

        ChatTurnResponse {
            message,
            sources,
            suggested_questions,
            tools_used: Vec::<ToolUse>::new(),
            topics: outcome.analysis.detected_topics.clone(),
            reasoning_trace: trace,
            thinking: if thinking.is_empty() {
                None
            } else {
                Some(thinking)
            },
            thinking_content: outcome.thinking_content.clone(),
            metadata: serde_json::json!({
                "session_id": session_id,
                "budget_tier": format!("{:?}", outcome.budget.tier),
                "low_confidence": outcome.low_confidence,
            }),
        }
    }

    async fn blocked_response(
        &self,
        request: &ChatTurnRequest,
        session_id: &str,
        reason: String,
    ) -> ChatTurnResponse {
        // The blocked message is persisted with its marker; this must not
        // delay the refusal in production
        let memory = Arc::clone(&self.memory);
        let user_id = request.user_id.clone();
        let message = request.message.clone();
        let session = session_id.to_string();
        let reason_clone = reason.clone();
        let persist = async move {
            if let Err(err) = memory
                .store_blocked_message(&user_id, &message, &reason_clone, Some(&session))
                .await
            {
                warn!(error = %err, "failed to persist blocked message");
            }
        };
        if self.inline_background {
            persist.await;
        } else {
            tokio::spawn(persist);
        }

        let mut tracer = ReasoningTracer::new();
        tracer.add_step(
            StepName::Routing,
            "Kiểm tra nội dung",
            format!("blocked: {}", reason),
            Some(1.0),
        );
        let trace = tracer.build_trace(Some(1.0));

        let mut response = ChatTurnResponse::message_only(REFUSAL_MESSAGE);
        response.reasoning_trace = trace;
        response.metadata = serde_json::json!({
            "session_id": session_id,
            "is_blocked": true,
        });
        response
    }

    /// Everything that runs after the reply is sent: persistence, insight
    /// and fact extraction, summarization, graph updates.
    fn background_task(
        &self,
        user_id: String,
        session_id: String,
        message: String,
        answer: String,
        topics: Vec<String>,
        reflection_flagged_confusion: bool,
    ) -> impl std::future::Future<Output = ()> + Send + 'static {
        let memory = Arc::clone(&self.memory);
        let summarizer = Arc::clone(&self.summarizer);
        let graph = self.graph.clone();

        async move {
            // Recent lines give insight extraction its context
            let history: Vec<String> = memory
                .store()
                .get_by_kind(&user_id, MemoryKind::Message, 5)
                .await
                .map(|records| records.into_iter().map(|r| r.content).collect())
                .unwrap_or_default();

            if let Err(err) = memory
                .store_interaction(&user_id, &message, &answer, Some(&session_id))
                .await
            {
                warn!(error = %err, "failed to persist turn");
            }

            if let Err(err) = memory
                .extract_and_store_insights(&user_id, &message, &history, Some(&session_id))
                .await
            {
                warn!(error = %err, "insight extraction failed");
            }

            if let Err(err) = memory
                .extract_and_store_facts(&user_id, &message, Some(&session_id))
                .await
            {
                warn!(error = %err, "fact extraction failed");
            }

            summarizer.check_and_summarize(&user_id, &session_id).await;

            if let Some(graph) = graph {
                if let Some(topic) = topics.first() {
                    let _ = graph.record_study_session(&user_id, topic, 0.1).await;
                    if reflection_flagged_confusion {
                        let _ = graph.record_weakness(&user_id, topic, 0.7).await;
                    }
                }
            }
        }
    }
}
