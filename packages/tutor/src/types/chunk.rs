//! Knowledge chunk types - the retrievable unit of ingested documents.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Normalized bounding box `[x1, y1, x2, y2]` for source highlighting.
pub type BoundingBox = [f32; 4];

/// Content type tag assigned by the semantic chunker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentType {
    Text,
    Table,
    Heading,
    DiagramReference,
    Formula,
}

impl ContentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentType::Text => "text",
            ContentType::Table => "table",
            ContentType::Heading => "heading",
            ContentType::DiagramReference => "diagram_reference",
            ContentType::Formula => "formula",
        }
    }

    pub fn parse(value: &str) -> Self {
        match value {
            "table" => ContentType::Table,
            "heading" => ContentType::Heading,
            "diagram_reference" => ContentType::DiagramReference,
            "formula" => ContentType::Formula,
            _ => ContentType::Text,
        }
    }
}

/// How a page's text was obtained during ingestion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionMethod {
    /// Text pulled straight from the PDF content stream
    Direct,
    /// Text produced by the vision model from a rendered page image
    Vision,
}

impl ExtractionMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExtractionMethod::Direct => "direct",
            ExtractionMethod::Vision => "vision",
        }
    }
}

/// Section hierarchy extracted from maritime legal text.
///
/// Captures "Điều 5 Khoản 2 Điểm a" / "Rule 15" style references so a chunk
/// can be cited precisely.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectionHierarchy {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub article: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub clause: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub point: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub rule: Option<String>,
}

impl SectionHierarchy {
    pub fn is_empty(&self) -> bool {
        self.article.is_none() && self.clause.is_none() && self.point.is_none() && self.rule.is_none()
    }

    /// Short human-readable label, e.g. "Rule 15" or "Điều 5, Khoản 2".
    pub fn label(&self) -> Option<String> {
        if let Some(rule) = &self.rule {
            return Some(format!("Rule {}", rule));
        }
        match (&self.article, &self.clause) {
            (Some(article), Some(clause)) => Some(format!("Điều {}, Khoản {}", article, clause)),
            (Some(article), None) => Some(format!("Điều {}", article)),
            _ => None,
        }
    }
}

/// A knowledge chunk: one retrievable unit stored in both indexes.
///
/// `(document_id, page_number, chunk_index)` is unique; chunk indexes are
/// 0-based and gap-free within a page.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeChunk {
    /// Row identifier
    pub id: Uuid,

    /// Owning document
    pub document_id: String,

    /// 1-indexed page number in the source document
    pub page_number: i32,

    /// 0-based index within the page, gap-free
    pub chunk_index: i32,

    /// Chunk text (possibly context-enriched)
    pub content: String,

    /// 768-dim L2-unit embedding
    pub embedding: Vec<f32>,

    /// Content type tag
    pub content_type: ContentType,

    /// Chunker confidence in [0, 1]
    pub confidence: f32,

    /// Public URL of the rendered page image (vision-sourced pages)
    pub image_url: Option<String>,

    /// Normalized boxes for source highlighting
    #[serde(default)]
    pub bounding_boxes: Vec<BoundingBox>,

    /// Free-form metadata (section hierarchy, language, counts)
    #[serde(default)]
    pub metadata: serde_json::Value,

    pub created_at: DateTime<Utc>,
}

impl KnowledgeChunk {
    /// Create a chunk with a fresh id and empty optional fields.
    pub fn new(
        document_id: impl Into<String>,
        page_number: i32,
        chunk_index: i32,
        content: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            document_id: document_id.into(),
            page_number,
            chunk_index,
            content: content.into(),
            embedding: Vec::new(),
            content_type: ContentType::Text,
            confidence: 1.0,
            image_url: None,
            bounding_boxes: Vec::new(),
            metadata: serde_json::Value::Null,
            created_at: Utc::now(),
        }
    }

    pub fn with_embedding(mut self, embedding: Vec<f32>) -> Self {
        self.embedding = embedding;
        self
    }

    pub fn with_content_type(mut self, content_type: ContentType) -> Self {
        self.content_type = content_type;
        self
    }

    pub fn with_confidence(mut self, confidence: f32) -> Self {
        self.confidence = confidence;
        self
    }

    pub fn with_image_url(mut self, url: impl Into<String>) -> Self {
        self.image_url = Some(url.into());
        self
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }

    /// Title for citation display, derived from metadata or hierarchy.
    pub fn title(&self) -> String {
        if let Some(title) = self.metadata.get("title").and_then(|v| v.as_str()) {
            return title.to_string();
        }
        if let Some(hierarchy) = self
            .metadata
            .get("section_hierarchy")
            .and_then(|v| serde_json::from_value::<SectionHierarchy>(v.clone()).ok())
        {
            if let Some(label) = hierarchy.label() {
                return label;
            }
        }
        format!("{} - trang {}", self.document_id, self.page_number)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_type_roundtrip() {
        for ct in [
            ContentType::Text,
            ContentType::Table,
            ContentType::Heading,
            ContentType::DiagramReference,
            ContentType::Formula,
        ] {
            assert_eq!(ContentType::parse(ct.as_str()), ct);
        }
    }

    #[test]
    fn test_hierarchy_label() {
        let hierarchy = SectionHierarchy {
            rule: Some("15".into()),
            ..Default::default()
        };
        assert_eq!(hierarchy.label().as_deref(), Some("Rule 15"));

        let hierarchy = SectionHierarchy {
            article: Some("5".into()),
            clause: Some("2".into()),
            ..Default::default()
        };
        assert_eq!(hierarchy.label().as_deref(), Some("Điều 5, Khoản 2"));
    }

    #[test]
    fn test_chunk_title_falls_back_to_page() {
        let chunk = KnowledgeChunk::new("colregs-vn", 12, 0, "text");
        assert_eq!(chunk.title(), "colregs-vn - trang 12");
    }
}
