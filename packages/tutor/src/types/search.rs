//! Retrieval result types - dense, sparse, and fused.

use serde::{Deserialize, Serialize};

use super::chunk::BoundingBox;

/// Result from dense (vector) search.
///
/// Similarity is cosine similarity clamped to [0, 1].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DenseResult {
    pub chunk_id: String,
    pub content: String,
    pub similarity: f32,
}

impl DenseResult {
    pub fn new(chunk_id: impl Into<String>, content: impl Into<String>, similarity: f32) -> Self {
        Self {
            chunk_id: chunk_id.into(),
            content: content.into(),
            similarity: similarity.clamp(0.0, 1.0),
        }
    }
}

/// Result from sparse (full-text) search.
///
/// Carries citation attributes so image URLs, page numbers, and bounding
/// boxes survive all the way to the response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SparseResult {
    pub chunk_id: String,
    pub title: String,
    pub content: String,
    pub score: f32,
    pub document_id: String,
    pub page_number: i32,
    pub image_url: Option<String>,
    #[serde(default)]
    pub bounding_boxes: Vec<BoundingBox>,
}

impl SparseResult {
    pub fn new(chunk_id: impl Into<String>, content: impl Into<String>, score: f32) -> Self {
        Self {
            chunk_id: chunk_id.into(),
            title: String::new(),
            content: content.into(),
            score: score.max(0.0),
            document_id: String::new(),
            page_number: 0,
            image_url: None,
            bounding_boxes: Vec::new(),
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn with_page(mut self, document_id: impl Into<String>, page_number: i32) -> Self {
        self.document_id = document_id.into();
        self.page_number = page_number;
        self
    }
}

/// A document after RRF fusion, carrying its component scores.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FusedResult {
    pub chunk_id: String,
    pub title: String,
    pub content: String,

    /// Total RRF score (including the dual-channel boost)
    pub rrf_score: f32,

    /// Cosine similarity from the dense channel, if present there
    pub dense_similarity: Option<f32>,

    /// ts_rank score from the sparse channel, if present there
    pub sparse_score: Option<f32>,

    /// True when the document appeared in both ranked lists
    pub in_both_channels: bool,

    pub document_id: String,
    pub page_number: i32,
    pub image_url: Option<String>,
    #[serde(default)]
    pub bounding_boxes: Vec<BoundingBox>,
}

/// A retrieved document as seen by the graders and the generator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievedDocument {
    pub id: String,
    pub title: String,
    pub content: String,
    pub document_id: String,
    pub page_number: i32,
    pub image_url: Option<String>,
    #[serde(default)]
    pub bounding_boxes: Vec<BoundingBox>,

    /// Grader score in [0, 10], set after grading
    pub score: Option<f32>,
}

impl From<FusedResult> for RetrievedDocument {
    fn from(fused: FusedResult) -> Self {
        Self {
            id: fused.chunk_id,
            title: fused.title,
            content: fused.content,
            document_id: fused.document_id,
            page_number: fused.page_number,
            image_url: fused.image_url,
            bounding_boxes: fused.bounding_boxes,
            score: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dense_similarity_clamped() {
        assert_eq!(DenseResult::new("a", "x", 1.2).similarity, 1.0);
        assert_eq!(DenseResult::new("a", "x", -0.1).similarity, 0.0);
    }

    #[test]
    fn test_sparse_score_non_negative() {
        assert_eq!(SparseResult::new("a", "x", -3.0).score, 0.0);
    }
}
