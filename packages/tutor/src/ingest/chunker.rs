//! Semantic chunking of page text.
//!
//! Splits with a hierarchical separator preference, merges undersized
//! chunks into their predecessor, tags each chunk with a content type,
//! extracts the maritime section hierarchy, and scores confidence.

use regex::Regex;
use tracing::{debug, warn};

use crate::types::{ContentType, SectionHierarchy};

/// Separator preference: paragraph → line → sentence → clause → space.
const SEPARATORS: &[&str] = &["\n\n", "\n", ". ", "! ", "? ", "; ", ", ", " "];

/// Upper bound of the confidence sweet-spot length band.
const LONG_CHUNK_THRESHOLD: usize = 1000;

/// A chunk produced by the semantic chunker, before embedding.
#[derive(Debug, Clone)]
pub struct ChunkDraft {
    /// Sequential, gap-free index over surviving chunks
    pub chunk_index: i32,
    pub content: String,
    pub content_type: ContentType,
    pub confidence: f32,
    pub hierarchy: SectionHierarchy,

    /// Set by the context enricher: `"[Context: <desc>]\n\n<original>"`
    pub contextual_content: Option<String>,
}

impl ChunkDraft {
    /// The text to embed and store: enriched when available.
    pub fn storable_content(&self) -> &str {
        self.contextual_content.as_deref().unwrap_or(&self.content)
    }
}

/// Maritime hierarchy patterns.
struct MaritimePatterns {
    article: Regex,
    clause: Regex,
    point: Regex,
    rule: Regex,
    table_separator: Regex,
    diagram_reference: Regex,
    formula: Regex,
}

impl MaritimePatterns {
    fn new() -> Self {
        Self {
            article: Regex::new(r"(?i)(Điều|Article)\s+(\d+)").unwrap(),
            clause: Regex::new(r"(?i)(Khoản|Clause)\s+(\d+)").unwrap(),
            point: Regex::new(r"(?i)(Điểm|Point)\s+([a-zA-Z])\b").unwrap(),
            rule: Regex::new(r"(?i)Rule\s+(\d+)").unwrap(),
            table_separator: Regex::new(r"\|[-:]+\|").unwrap(),
            diagram_reference: Regex::new(r"(?i)(hình|sơ đồ|biểu đồ|figure|diagram)\s+\d+")
                .unwrap(),
            formula: Regex::new(r"(\d+\s*[+\-*/=]\s*\d+)|(\d+\s*[×÷]\s*\d+)").unwrap(),
        }
    }
}

/// Semantic chunker tuned for maritime regulation documents.
pub struct SemanticChunker {
    chunk_size: usize,
    chunk_overlap: usize,
    min_chunk_size: usize,
    patterns: MaritimePatterns,
}

impl Default for SemanticChunker {
    fn default() -> Self {
        Self::new(800, 100, 100)
    }
}

impl SemanticChunker {
    pub fn new(chunk_size: usize, chunk_overlap: usize, min_chunk_size: usize) -> Self {
        Self {
            chunk_size,
            chunk_overlap,
            min_chunk_size,
            patterns: MaritimePatterns::new(),
        }
    }

    /// Split page text into typed chunks with gap-free indices.
    pub fn chunk_page(&self, text: &str) -> Vec<ChunkDraft> {
        let text = text.trim();
        if text.is_empty() {
            warn!("empty text provided for chunking");
            return Vec::new();
        }

        let raw_chunks = self.split_text(text);
        let mut chunks: Vec<ChunkDraft> = Vec::new();

        for raw in raw_chunks {
            let piece = raw.trim();
            if piece.is_empty() {
                continue;
            }

            // Merge undersized pieces into the predecessor
            if piece.chars().count() < self.min_chunk_size {
                if let Some(prev) = chunks.last_mut() {
                    prev.content = format!("{}\n{}", prev.content, piece);
                    prev.confidence = self.confidence(&prev.content, prev.content_type);
                    continue;
                }
            }

            let content_type = self.detect_content_type(piece);
            let confidence = self.confidence(piece, content_type);
            let hierarchy = self.extract_hierarchy(piece);

            chunks.push(ChunkDraft {
                chunk_index: chunks.len() as i32,
                content: piece.to_string(),
                content_type,
                confidence,
                hierarchy,
                contextual_content: None,
            });
        }

        debug!(
            chunks = chunks.len(),
            chars = text.chars().count(),
            "chunked page"
        );
        chunks
    }

    /// Recursive character splitting with the separator hierarchy.
    fn split_text(&self, text: &str) -> Vec<String> {
        let pieces = self.split_recursive(text, SEPARATORS);
        self.merge_pieces(pieces)
    }

    fn split_recursive(&self, text: &str, separators: &[&str]) -> Vec<String> {
        if text.chars().count() <= self.chunk_size {
            return vec![text.to_string()];
        }

        let Some((separator, rest)) = separators.split_first() else {
            // No separator left: hard cut on char boundaries
            return text
                .chars()
                .collect::<Vec<_>>()
                .chunks(self.chunk_size)
                .map(|chars| chars.iter().collect())
                .collect();
        };

        if !text.contains(separator) {
            return self.split_recursive(text, rest);
        }

        let mut out = Vec::new();
        for piece in text.split_inclusive(*separator) {
            if piece.chars().count() > self.chunk_size {
                out.extend(self.split_recursive(piece, rest));
            } else {
                out.push(piece.to_string());
            }
        }
        out
    }

    /// Merge small pieces into chunks up to the target size, seeding each
    /// new chunk with the overlap tail of the previous one.
    fn merge_pieces(&self, pieces: Vec<String>) -> Vec<String> {
        let mut chunks = Vec::new();
        let mut current = String::new();

        for piece in pieces {
            if !current.is_empty()
                && current.chars().count() + piece.chars().count() > self.chunk_size
            {
                let tail = overlap_tail(&current, self.chunk_overlap);
                chunks.push(std::mem::take(&mut current));
                current = tail;
            }
            current.push_str(&piece);
        }

        if !current.trim().is_empty() {
            chunks.push(current);
        }
        chunks
    }

    /// Tag a chunk's content type. Deterministic on the text, so
    /// classifying a chunk's own content reproduces the same tag.
    pub fn detect_content_type(&self, text: &str) -> ContentType {
        // Markdown table: pipes plus a separator row
        if text.contains('|') && self.patterns.table_separator.is_match(text) {
            return ContentType::Table;
        }

        // Column-ish structure across most lines
        let lines: Vec<&str> = text.lines().collect();
        if lines.len() > 2 {
            let column_lines = lines
                .iter()
                .filter(|line| line.contains('\t') || line.contains("  "))
                .count();
            if column_lines * 2 > lines.len() {
                return ContentType::Table;
            }
        }

        if self.patterns.article.is_match(text)
            || self.patterns.clause.is_match(text)
            || self.patterns.rule.is_match(text)
        {
            return ContentType::Heading;
        }

        if self.patterns.diagram_reference.is_match(&text.to_lowercase()) {
            return ContentType::DiagramReference;
        }

        if self.patterns.formula.is_match(text) {
            return ContentType::Formula;
        }

        ContentType::Text
    }

    /// Confidence: 1.0 in the sweet-spot band, 0.7 long, 0.6 short;
    /// ×1.2 (capped at 1.0) for heading/table.
    fn confidence(&self, content: &str, content_type: ContentType) -> f32 {
        let length = content.trim().chars().count();

        let base = if length < self.min_chunk_size {
            0.6
        } else if length > LONG_CHUNK_THRESHOLD {
            0.7
        } else {
            1.0
        };

        if matches!(content_type, ContentType::Heading | ContentType::Table) {
            (base * 1.2_f32).min(1.0)
        } else {
            base
        }
    }

    /// Extract {article?, clause?, point?, rule?} from chunk text.
    pub fn extract_hierarchy(&self, text: &str) -> SectionHierarchy {
        SectionHierarchy {
            article: self
                .patterns
                .article
                .captures(text)
                .map(|c| c[2].to_string()),
            clause: self.patterns.clause.captures(text).map(|c| c[2].to_string()),
            point: self
                .patterns
                .point
                .captures(text)
                .map(|c| c[2].to_lowercase()),
            rule: self.patterns.rule.captures(text).map(|c| c[1].to_string()),
        }
    }
}

fn overlap_tail(text: &str, overlap: usize) -> String {
    let chars: Vec<char> = text.chars().collect();
    if chars.len() <= overlap {
        return text.to_string();
    }
    chars[chars.len() - overlap..].iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunker() -> SemanticChunker {
        SemanticChunker::new(200, 30, 40)
    }

    #[test]
    fn test_chunk_indices_are_gap_free() {
        let paragraph = "Tàu thuyền phải luôn duy trì cảnh giới thích đáng bằng mắt nhìn và tai nghe. ";
        let text = paragraph.repeat(10);
        let chunks = chunker().chunk_page(&text);

        assert!(chunks.len() > 1);
        for (i, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.chunk_index, i as i32);
        }
    }

    #[test]
    fn test_small_chunks_merged_into_predecessor() {
        let text = format!(
            "{}\n\nngắn",
            "Đây là một đoạn văn đủ dài để trở thành một chunk độc lập trong hệ thống."
        );
        let chunks = chunker().chunk_page(&text);

        assert_eq!(chunks.len(), 1);
        assert!(chunks[0].content.contains("ngắn"));
    }

    #[test]
    fn test_heading_detection_and_hierarchy() {
        let text = "Điều 15. Tình huống cắt hướng nhau của hai tàu thuyền máy đang hành trình";
        let chunks = chunker().chunk_page(text);

        assert_eq!(chunks[0].content_type, ContentType::Heading);
        assert_eq!(chunks[0].hierarchy.article.as_deref(), Some("15"));
    }

    #[test]
    fn test_rule_heading_detection() {
        let c = chunker();
        assert_eq!(
            c.detect_content_type("Rule 15 - Crossing situation between two power-driven vessels"),
            ContentType::Heading
        );
        assert_eq!(c.extract_hierarchy("Rule 15").rule.as_deref(), Some("15"));
    }

    #[test]
    fn test_table_detection() {
        let table = "| Loại đèn | Màu |\n|---|---|\n| đèn mạn phải | xanh lục |\n| đèn mạn trái | đỏ |";
        assert_eq!(chunker().detect_content_type(table), ContentType::Table);
    }

    #[test]
    fn test_classification_is_idempotent() {
        let c = chunker();
        let samples = [
            "Điều 5. Cảnh giới",
            "| a | b |\n|---|---|\n| 1 | 2 |",
            "xem Hình 3 để biết vị trí đèn",
            "khoảng cách = 2 + 3 hải lý",
            "một đoạn văn bản thường không có cấu trúc đặc biệt nào cả",
        ];
        for sample in samples {
            let first = c.detect_content_type(sample);
            let second = c.detect_content_type(sample);
            assert_eq!(first, second);
        }
    }

    #[test]
    fn test_confidence_bounds_and_boost() {
        let c = chunker();
        // short chunk penalty
        assert!((c.confidence("ngắn quá", ContentType::Text) - 0.6).abs() < 1e-6);
        // heading boost capped at 1.0
        let heading = "Điều 15. Tình huống cắt hướng nhau giữa hai tàu thuyền máy";
        assert!((c.confidence(heading, ContentType::Heading) - 0.72).abs() < 1e-6);
        // sweet spot
        let normal = "x".repeat(100);
        assert!((c.confidence(&normal, ContentType::Text) - 1.0).abs() < 1e-6);
        // long penalty
        let long = "x".repeat(1200);
        assert!((c.confidence(&long, ContentType::Text) - 0.7).abs() < 1e-6);
    }

    #[test]
    fn test_empty_text_yields_no_chunks() {
        assert!(chunker().chunk_page("   ").is_empty());
    }

    #[test]
    fn test_overlap_seeds_next_chunk() {
        let sentence = "Thuyền trưởng chịu trách nhiệm cao nhất trên tàu biển Việt Nam. ";
        let text = sentence.repeat(8);
        let chunks = chunker().chunk_page(&text);

        assert!(chunks.len() >= 2);
        // Each later chunk starts with the tail of its predecessor
        let first_tail: String = chunks[0]
            .content
            .chars()
            .rev()
            .take(10)
            .collect::<Vec<_>>()
            .into_iter()
            .rev()
            .collect();
        assert!(chunks[1].content.contains(first_tail.trim()));
    }
}
