//! LLM prompts for the tutor pipeline.
//!
//! Prompts keep the bilingual (vi/en) discipline of the deployed system:
//! strict JSON output for analyzer/graders/verifier, formal regulatory
//! register for HyDE, behavior-not-facts discipline for insights.

use crate::types::{Insight, RetrievedDocument, UserRole};

/// Query analysis prompt. Strict JSON out.
pub const ANALYSIS_PROMPT: &str = r#"Bạn là Query Analyzer cho hệ thống Maritime AI.

Phân tích query sau và trả về JSON:

Query: {query}

Trả về JSON với format:
{
    "complexity": "simple" | "moderate" | "complex",
    "requires_multi_step": true/false,
    "requires_verification": true/false,
    "is_maritime_related": true/false,
    "detected_topics": ["topic1", "topic2"],
    "sub_queries": ["sub_query1", "sub_query2"],
    "confidence": 0.0-1.0
}

Hướng dẫn:
- SIMPLE: Câu hỏi trực tiếp, tra cứu đơn (VD: "Rule 15 là gì?")
- MODERATE: Cần so sánh hoặc context (VD: "So sánh Rule 15 và Rule 17")
- COMPLEX: Cần tổng hợp nhiều nguồn (VD: "Phân tích tất cả quy tắc nhường đường")

CHỈ TRẢ VỀ JSON, KHÔNG CÓ TEXT KHÁC."#;

/// Binary relevance prompt for the mini-judge. One word out.
pub const MINI_JUDGE_PROMPT: &str = r#"Determine if this document is RELEVANT to answer the user's question.

Question: {query}

Document excerpt:
{document}

Instructions:
- Answer ONLY with "yes" or "no"
- "yes" = document contains information to answer the question
- "no" = document is off-topic or doesn't help answer

Answer:"#;

/// Batched grading prompt. JSON array out, one object per document.
pub const BATCH_GRADING_PROMPT: &str = r#"Bạn là Retrieval Grader cho hệ thống Maritime AI.

Đánh giá mức độ liên quan của TỪNG document với query dưới đây.

Query: {query}

Documents:
{documents}

Trả về JSON ARRAY (một mảng các object):
[
    {"doc_index": 0, "score": 0-10, "is_relevant": true/false, "reason": "Lý do ngắn gọn"},
    {"doc_index": 1, "score": 0-10, "is_relevant": true/false, "reason": "Lý do ngắn gọn"}
]

Hướng dẫn chấm điểm:
- 9-10: Trực tiếp trả lời hoàn toàn query
- 7-8: Liên quan mạnh, chứa thông tin chính
- 5-6: Liên quan một phần, cần bổ sung
- 3-4: Liên quan yếu, chỉ context chung
- 0-2: Không liên quan

CHỈ TRẢ VỀ JSON ARRAY, KHÔNG CÓ TEXT KHÁC."#;

/// Query rewrite prompt. Returns only the improved query.
pub const REWRITE_PROMPT: &str = r#"Bạn là Query Rewriter cho hệ thống Maritime AI.

Query gốc không tìm được kết quả tốt. Hãy viết lại query để tìm kiếm hiệu quả hơn.

Query gốc: {query}
Feedback: {feedback}

Yêu cầu:
1. Giữ nguyên ý nghĩa câu hỏi
2. Thêm từ khóa liên quan (maritime, COLREGs, SOLAS, etc.)
3. Sử dụng thuật ngữ chuẩn tiếng Anh nếu phù hợp
4. Đơn giản hóa nếu quá phức tạp

Chỉ trả về query mới, không giải thích."#;

/// Query decomposition prompt. One sub-query per line.
pub const DECOMPOSE_PROMPT: &str = r#"Query này quá phức tạp. Hãy chia thành các sub-queries nhỏ hơn:

Query: {query}

Trả về danh sách sub-queries (mỗi dòng một query):"#;

/// HyDE prompt, Vietnamese register.
pub const HYDE_PROMPT_VI: &str = r#"Bạn là chuyên gia về luật hàng hải Việt Nam.

Hãy viết một đoạn văn ngắn (100-200 từ) trả lời câu hỏi sau.
Viết như thể đây là trích đoạn từ văn bản pháp luật hoặc tài liệu hàng hải chính thức.
Sử dụng thuật ngữ chuyên ngành và ngôn ngữ trang trọng.

Câu hỏi: {question}

Yêu cầu:
- Trả lời trực tiếp, không mở đầu bằng "Theo..."
- Sử dụng thuật ngữ chính xác (ví dụ: chủ tàu, thuyền viên, tàu biển)
- Nếu liên quan đến COLREG/SOLAS, đề cập các quy tắc cụ thể
- CHỈ trả về nội dung, không có giải thích thêm

Đoạn văn:"#;

/// HyDE prompt, English register.
pub const HYDE_PROMPT_EN: &str = r#"You are an expert in maritime law and COLREG regulations.

Write a short paragraph (100-200 words) answering the following question.
Write as if this is an excerpt from official maritime documentation or COLREG rules.
Use precise technical terminology.

Question: {question}

Requirements:
- Answer directly, formal language
- Use exact terms (vessel, give-way, stand-on, crossing situation)
- Reference specific Rule numbers if applicable
- ONLY return the content, no explanations

Paragraph:"#;

/// Answer verification prompt. Strict JSON out.
pub const VERIFY_PROMPT: &str = r#"Bạn là Answer Verifier cho hệ thống Maritime AI.

Kiểm tra xem câu trả lời có chính xác với nguồn không.

Câu trả lời:
{answer}

Nguồn tham khảo:
{sources}

Trả về JSON:
{
    "is_factually_correct": true/false,
    "confidence": 0-100,
    "issues": ["issue1", "issue2"],
    "has_unsupported_claims": true/false
}

Kiểm tra:
1. Thông tin trong câu trả lời có xuất hiện trong nguồn không?
2. Có thông tin bịa đặt (hallucination) không?
3. Số liệu, tên, điều luật có chính xác không?

CHỈ TRẢ VỀ JSON."#;

/// Chunk context generation prompt (contextual retrieval).
pub const ENRICH_PROMPT: &str = r#"Bạn đang hỗ trợ hệ thống RAG tạo context cho các đoạn văn bản pháp luật hàng hải.

<document>
Tài liệu: {document_title}
Trang: {page_number}/{total_pages}
</document>

<chunk>
{chunk_content}
</chunk>

Viết MỘT đoạn context ngắn (50-80 từ) mô tả chunk này để cải thiện retrieval:
1. Chunk này thuộc phần/chương/điều/khoản nào của tài liệu?
2. Nội dung chính và mục đích của quy định này là gì?
3. Liên quan đến khái niệm/quy tắc hàng hải nào (nếu có)?

QUAN TRỌNG: Chỉ trả về đoạn context, không có tiêu đề, bullet points hay định dạng khác."#;

/// Vision extraction prompt for rendered regulation pages.
pub const VISION_EXTRACTION_PROMPT: &str = r#"Đóng vai chuyên gia số hóa dữ liệu Hàng hải.
Hãy nhìn bức ảnh này và mô tả lại toàn bộ nội dung thành văn bản định dạng Markdown.

HƯỚNG DẪN CHI TIẾT:
1. Giữ nguyên các tiêu đề (Điều, Khoản, Mục, Chương).
2. Nếu có Bảng biểu: Chuyển thành Markdown Table với header và separator (|---|).
3. Nếu có Hình vẽ (Đèn hiệu/Tàu bè): Mô tả chi tiết:
   - Màu sắc của đèn (đỏ, xanh, trắng, vàng)
   - Vị trí của đèn (mũi, lái, cột, mạn)
   - Ý nghĩa tín hiệu
4. Không bỏ sót bất kỳ chữ nào trên trang.
5. Giữ nguyên số hiệu điều luật (Rule 15, Điều 15, etc.)

OUTPUT FORMAT:
- Sử dụng Markdown headers (##, ###) cho tiêu đề
- Sử dụng Markdown tables cho bảng biểu
- Sử dụng bullet points cho danh sách
- Mô tả hình ảnh trong block [Hình: ...]"#;

/// Behavioral insight extraction prompt. JSON array out.
pub const INSIGHT_EXTRACTION_PROMPT: &str = r#"Bạn là chuyên gia phân tích hành vi học tập. Nhiệm vụ của bạn là trích xuất BEHAVIORAL INSIGHTS (sự thấu hiểu hành vi) từ tin nhắn của người dùng, KHÔNG PHẢI atomic facts (dữ liệu đơn lẻ).

QUAN TRỌNG: Tập trung vào HÀNH VI, PHONG CÁCH, XU HƯỚNG - không phải tên, tuổi, địa chỉ.

Tin nhắn người dùng: "{message}"{context}

Hãy trích xuất các insights thuộc 5 loại sau:

1. learning_style: Phong cách học tập (lý thuyết vs thực hành, cách tiếp cận vấn đề)
2. knowledge_gap: Lỗ hổng kiến thức cụ thể (hiểu lầm, nhầm lẫn, thiếu kiến thức)
3. goal_evolution: Sự thay đổi mục tiêu học tập theo thời gian
4. habit: Thói quen học tập và làm việc
5. preference: Sở thích cá nhân ảnh hưởng đến học tập

YÊU CẦU FORMAT:
- Mỗi insight phải là câu văn HOÀN CHỈNH mô tả hành vi/xu hướng
- Tối thiểu 20 ký tự
- Bao gồm ngữ cảnh và lý do
- KHÔNG trích xuất tên, tuổi, địa chỉ, số điện thoại

Trả về JSON array:
[
  {
    "category": "learning_style",
    "content": "User thích học qua ví dụ thực tế và case studies hơn là đọc lý thuyết",
    "sub_topic": "practical_learning",
    "confidence": 0.8
  }
]

Nếu không tìm thấy insights hành vi nào, trả về: []"#;

/// User-fact extraction prompt. JSON array out.
pub const FACT_EXTRACTION_PROMPT: &str = r#"Trích xuất thông tin cá nhân từ tin nhắn của người dùng.

Tin nhắn: "{message}"

Các loại fact được phép: name, role, level, goal, preference, weakness

Trả về JSON array (rỗng nếu không có):
[
  {"fact_type": "name", "value": "Minh", "confidence": 0.9}
]

CHỈ TRẢ VỀ JSON ARRAY."#;

/// Memory consolidation prompt. JSON array out, at most {target} items.
pub const CONSOLIDATION_PROMPT: &str = r#"Bạn là chuyên gia quản lý bộ nhớ AI. Nhiệm vụ của bạn là consolidate (gộp và tinh gọn) danh sách insights về người dùng.

HIỆN TẠI: {count} insights
MỤC TIÊU: Giảm xuống tối đa {target} insights cốt lõi

NGUYÊN TẮC CONSOLIDATION:
1. Merge duplicates: Gộp các insights tương tự thành một
2. Update evolution: Nếu có thay đổi theo thời gian, ghi nhận sự phát triển
3. Keep recent: Ưu tiên thông tin mới nhất và quan trọng nhất
4. Preserve diversity: Giữ đa dạng các categories
5. Remove redundant: Loại bỏ thông tin không còn quan trọng

DANH SÁCH INSIGHTS HIỆN TẠI:
{insights}

YÊU CẦU OUTPUT:
- Trả về JSON array với tối đa {target} insights đã được consolidate
- Nếu merge nhiều insights, ghi rõ trong evolution_notes
- Ưu tiên giữ insights về knowledge_gap và learning_style

FORMAT:
[
  {
    "category": "learning_style",
    "content": "...",
    "sub_topic": "...",
    "confidence": 0.9,
    "evolution_notes": ["Merged from insights #1, #3"]
  }
]"#;

/// Session summary prompt.
pub const SUMMARY_PROMPT: &str = r#"Tóm tắt đoạn hội thoại sau giữa người dùng và Maritime AI Tutor.

Hội thoại:
{conversation}

Yêu cầu:
- Tóm tắt 3-5 câu, giữ các chủ đề hàng hải đã thảo luận
- Ghi nhận các điều luật/quy tắc đã trích dẫn (Rule N, Điều N)
- Ghi nhận trạng thái người học (hiểu/chưa hiểu điều gì)

Chỉ trả về đoạn tóm tắt."#;

/// Format the analysis prompt.
pub fn format_analysis_prompt(query: &str) -> String {
    ANALYSIS_PROMPT.replace("{query}", query)
}

/// Format the mini-judge prompt, truncating for speed.
pub fn format_mini_judge_prompt(query: &str, document: &str) -> String {
    MINI_JUDGE_PROMPT
        .replace("{query}", truncate(query, 200))
        .replace("{document}", truncate(document, 300))
}

/// Format the batched grading prompt.
pub fn format_batch_grading_prompt(query: &str, documents: &[RetrievedDocument]) -> String {
    let documents_text = documents
        .iter()
        .enumerate()
        .map(|(i, doc)| format!("[Document {}]\nID: {}\n{}", i, doc.id, truncate(&doc.content, 800)))
        .collect::<Vec<_>>()
        .join("\n\n");

    BATCH_GRADING_PROMPT
        .replace("{query}", query)
        .replace("{documents}", &documents_text)
}

/// Format the rewrite prompt.
pub fn format_rewrite_prompt(query: &str, feedback: &str) -> String {
    let feedback = if feedback.is_empty() {
        "Documents retrieved were not relevant"
    } else {
        feedback
    };
    REWRITE_PROMPT
        .replace("{query}", query)
        .replace("{feedback}", feedback)
}

/// Format the decomposition prompt.
pub fn format_decompose_prompt(query: &str) -> String {
    DECOMPOSE_PROMPT.replace("{query}", query)
}

/// Format the HyDE prompt for the detected language.
pub fn format_hyde_prompt(question: &str, vietnamese: bool) -> String {
    let template = if vietnamese {
        HYDE_PROMPT_VI
    } else {
        HYDE_PROMPT_EN
    };
    template.replace("{question}", question)
}

/// Format the verification prompt. Answer and sources are truncated.
pub fn format_verify_prompt(answer: &str, sources: &[RetrievedDocument]) -> String {
    let sources_text = sources
        .iter()
        .take(3)
        .map(|s| truncate(&s.content, 500).to_string())
        .collect::<Vec<_>>()
        .join("\n---\n");

    VERIFY_PROMPT
        .replace("{answer}", truncate(answer, 1500))
        .replace("{sources}", &sources_text)
}

/// Format the enrichment prompt.
pub fn format_enrich_prompt(
    chunk_content: &str,
    document_title: &str,
    page_number: i32,
    total_pages: usize,
) -> String {
    ENRICH_PROMPT
        .replace("{document_title}", document_title)
        .replace("{page_number}", &page_number.to_string())
        .replace("{total_pages}", &total_pages.to_string())
        .replace("{chunk_content}", truncate(chunk_content, 1500))
}

/// Format the insight extraction prompt with recent conversation lines.
pub fn format_insight_prompt(message: &str, history: &[String]) -> String {
    let context = if history.is_empty() {
        String::new()
    } else {
        let recent = history
            .iter()
            .rev()
            .take(3)
            .rev()
            .map(|line| format!("- {}", line))
            .collect::<Vec<_>>()
            .join("\n");
        format!("\n\nConversation context:\n{}", recent)
    };

    INSIGHT_EXTRACTION_PROMPT
        .replace("{message}", message)
        .replace("{context}", &context)
}

/// Format the fact extraction prompt.
pub fn format_fact_prompt(message: &str) -> String {
    FACT_EXTRACTION_PROMPT.replace("{message}", message)
}

/// Format the consolidation prompt.
pub fn format_consolidation_prompt(insights: &[Insight], target: usize) -> String {
    let insights_text = insights
        .iter()
        .enumerate()
        .map(|(i, insight)| {
            let mut line = format!(
                "{}. [{}] {}",
                i + 1,
                insight.category.as_str(),
                insight.content
            );
            if let Some(topic) = &insight.sub_topic {
                line.push_str(&format!(" (Topic: {})", topic));
            }
            if let Some(created) = insight.created_at {
                line.push_str(&format!(" (Created: {})", created.format("%Y-%m-%d")));
            }
            line
        })
        .collect::<Vec<_>>()
        .join("\n");

    CONSOLIDATION_PROMPT
        .replace("{count}", &insights.len().to_string())
        .replace("{target}", &target.to_string())
        .replace("{insights}", &insights_text)
}

/// Format the session summary prompt.
pub fn format_summary_prompt(conversation: &str) -> String {
    SUMMARY_PROMPT.replace("{conversation}", conversation)
}

/// Role-aware system text for answer generation.
pub fn generation_system_prompt(role: UserRole, reflection_enabled: bool) -> String {
    let role_text = match role {
        UserRole::Student => {
            "Người dùng là sinh viên hàng hải. Giải thích rõ ràng, có ví dụ tình huống thực tế."
        }
        UserRole::Teacher => {
            "Người dùng là giảng viên. Trả lời chuyên sâu, nêu căn cứ pháp lý đầy đủ."
        }
        UserRole::Admin => "Người dùng là quản trị viên hệ thống. Trả lời ngắn gọn, chính xác.",
    };

    let mut prompt = format!(
        "Bạn là Maritime AI Tutor, trợ giảng chuyên về luật hàng hải \
         (COLREGs, SOLAS, MARPOL, luật hàng hải Việt Nam).\n\
         {}\n\
         Luôn trích dẫn nguồn (Rule N, Điều N) khi trả lời từ tài liệu.\n\
         Trả lời bằng ngôn ngữ của câu hỏi (tiếng Việt hoặc tiếng Anh).",
        role_text
    );

    if reflection_enabled {
        prompt.push_str(
            "\n\nSau câu trả lời, tự đánh giá bằng các token:\n\
             [IS_SUPPORTED: yes/no] - câu trả lời có được nguồn hỗ trợ không\n\
             [IS_USEFUL: yes/no] - câu trả lời có giải quyết câu hỏi không",
        );
    }

    prompt
}

/// Build the generation user prompt from context, sources, and the query.
pub fn format_generation_prompt(
    query: &str,
    insights_block: &str,
    memory_block: &str,
    sources: &[RetrievedDocument],
) -> String {
    let sources_text = if sources.is_empty() {
        "(không có nguồn nào được tìm thấy)".to_string()
    } else {
        sources
            .iter()
            .enumerate()
            .map(|(i, doc)| {
                format!(
                    "[Nguồn {} - {} trang {}]\n{}",
                    i + 1,
                    doc.document_id,
                    doc.page_number,
                    truncate(&doc.content, 1200)
                )
            })
            .collect::<Vec<_>>()
            .join("\n\n")
    };

    let mut prompt = String::new();
    if !insights_block.is_empty() {
        prompt.push_str(insights_block);
        prompt.push_str("\n\n");
    }
    if !memory_block.is_empty() {
        prompt.push_str(memory_block);
        prompt.push_str("\n\n");
    }
    prompt.push_str("=== Tài liệu tham khảo ===\n");
    prompt.push_str(&sources_text);
    prompt.push_str("\n\nCâu hỏi: ");
    prompt.push_str(query);
    prompt
}

/// Truncate on a char boundary without allocating when short enough.
fn truncate(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_mini_judge_truncates() {
        let long_doc = "x".repeat(1000);
        let prompt = format_mini_judge_prompt("query", &long_doc);
        assert!(prompt.len() < 800);
        assert!(prompt.contains("RELEVANT"));
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        let vietnamese = "cảnh giới mạn phải";
        let cut = truncate(vietnamese, 5);
        assert_eq!(cut.chars().count(), 5);
    }

    #[test]
    fn test_generation_prompt_handles_empty_sources() {
        let prompt = format_generation_prompt("Rule 15?", "", "", &[]);
        assert!(prompt.contains("không có nguồn"));
    }

    #[test]
    fn test_system_prompt_reflection_tokens() {
        let with = generation_system_prompt(UserRole::Student, true);
        assert!(with.contains("[IS_SUPPORTED"));

        let without = generation_system_prompt(UserRole::Student, false);
        assert!(!without.contains("[IS_SUPPORTED"));
    }
}
