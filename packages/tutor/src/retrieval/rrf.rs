//! Reciprocal Rank Fusion of the dense and sparse result lists.
//!
//! RRF score = sum of `1 / (k + rank)` over the lists a document appears
//! in; k (default 60) keeps low-ranked results from vanishing. Component
//! ranks are used, never raw scores: cosine similarity and ts_rank have
//! incomparable scales.

use std::collections::HashMap;

use crate::types::{DenseResult, FusedResult, SparseResult};

/// Default RRF constant from the original RRF paper.
pub const DEFAULT_RRF_K: f32 = 60.0;

/// Multiplier applied when a document appears in both channels.
/// Dual-channel agreement is a strictly stronger signal than either alone.
const BOTH_CHANNELS_BOOST: f32 = 1.10;

/// Fuse dense and sparse ranked lists into one, best first.
pub fn fuse(
    dense: &[DenseResult],
    sparse: &[SparseResult],
    k: f32,
    limit: usize,
) -> Vec<FusedResult> {
    struct Accum {
        rrf_score: f32,
        dense_similarity: Option<f32>,
        sparse_score: Option<f32>,
        title: String,
        content: String,
        document_id: String,
        page_number: i32,
        image_url: Option<String>,
        bounding_boxes: Vec<crate::types::BoundingBox>,
    }

    let mut scores: HashMap<String, Accum> = HashMap::new();

    for (rank, result) in dense.iter().enumerate() {
        let rrf = 1.0 / (k + rank as f32 + 1.0);
        scores
            .entry(result.chunk_id.clone())
            .and_modify(|acc| {
                acc.rrf_score += rrf;
                acc.dense_similarity = Some(result.similarity);
            })
            .or_insert(Accum {
                rrf_score: rrf,
                dense_similarity: Some(result.similarity),
                sparse_score: None,
                title: String::new(),
                content: result.content.clone(),
                document_id: String::new(),
                page_number: 0,
                image_url: None,
                bounding_boxes: Vec::new(),
            });
    }

    for (rank, result) in sparse.iter().enumerate() {
        let rrf = 1.0 / (k + rank as f32 + 1.0);
        scores
            .entry(result.chunk_id.clone())
            .and_modify(|acc| {
                acc.rrf_score += rrf;
                acc.sparse_score = Some(result.score);
                // Sparse rows carry the citation attributes
                acc.title = result.title.clone();
                acc.document_id = result.document_id.clone();
                acc.page_number = result.page_number;
                acc.image_url = result.image_url.clone();
                acc.bounding_boxes = result.bounding_boxes.clone();
                if acc.content.is_empty() {
                    acc.content = result.content.clone();
                }
            })
            .or_insert(Accum {
                rrf_score: rrf,
                dense_similarity: None,
                sparse_score: Some(result.score),
                title: result.title.clone(),
                content: result.content.clone(),
                document_id: result.document_id.clone(),
                page_number: result.page_number,
                image_url: result.image_url.clone(),
                bounding_boxes: result.bounding_boxes.clone(),
            });
    }

    let mut fused: Vec<FusedResult> = scores
        .into_iter()
        .map(|(chunk_id, acc)| {
            let in_both = acc.dense_similarity.is_some() && acc.sparse_score.is_some();
            let rrf_score = if in_both {
                acc.rrf_score * BOTH_CHANNELS_BOOST
            } else {
                acc.rrf_score
            };
            FusedResult {
                chunk_id,
                title: acc.title,
                content: acc.content,
                rrf_score,
                dense_similarity: acc.dense_similarity,
                sparse_score: acc.sparse_score,
                in_both_channels: in_both,
                document_id: acc.document_id,
                page_number: acc.page_number,
                image_url: acc.image_url,
                bounding_boxes: acc.bounding_boxes,
            }
        })
        .collect();

    // Ties: dual-channel first, then sparse score (tends to reflect exact
    // citations), then id for determinism.
    fused.sort_by(|a, b| {
        b.rrf_score
            .partial_cmp(&a.rrf_score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| b.in_both_channels.cmp(&a.in_both_channels))
            .then_with(|| {
                b.sparse_score
                    .unwrap_or(0.0)
                    .partial_cmp(&a.sparse_score.unwrap_or(0.0))
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
            .then_with(|| a.chunk_id.cmp(&b.chunk_id))
    });

    fused.truncate(limit);
    fused
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dense(id: &str, similarity: f32) -> DenseResult {
        DenseResult::new(id, format!("content {}", id), similarity)
    }

    fn sparse(id: &str, score: f32) -> SparseResult {
        SparseResult::new(id, format!("content {}", id), score).with_page("doc", 1)
    }

    #[test]
    fn test_document_in_both_lists_ranks_first() {
        let dense_list = vec![dense("a", 0.9), dense("b", 0.8)];
        let sparse_list = vec![sparse("b", 0.95), sparse("c", 0.85)];

        let fused = fuse(&dense_list, &sparse_list, DEFAULT_RRF_K, 10);

        assert_eq!(fused[0].chunk_id, "b");
        assert!(fused[0].in_both_channels);
        assert_eq!(fused.len(), 3);
    }

    #[test]
    fn test_dual_channel_boost_is_strict() {
        // "a" at dense rank 0 only; "b" at sparse rank 0 and dense rank 1.
        // Without the boost, equal summed reciprocal ranks would tie; the
        // boost makes dual-channel strictly higher.
        let dense_list = vec![dense("a", 0.9), dense("b", 0.5)];
        let sparse_list = vec![sparse("b", 1.0)];

        let fused = fuse(&dense_list, &sparse_list, DEFAULT_RRF_K, 10);
        let a = fused.iter().find(|f| f.chunk_id == "a").unwrap();
        let b = fused.iter().find(|f| f.chunk_id == "b").unwrap();

        assert!(b.rrf_score > a.rrf_score);
        assert_eq!(fused[0].chunk_id, "b");
    }

    #[test]
    fn test_component_scores_carried() {
        let fused = fuse(&[dense("a", 0.7)], &[sparse("a", 2.0)], DEFAULT_RRF_K, 10);
        assert_eq!(fused[0].dense_similarity, Some(0.7));
        assert_eq!(fused[0].sparse_score, Some(2.0));
    }

    #[test]
    fn test_citation_attributes_from_sparse() {
        let sparse_row = SparseResult::new("a", "nội dung", 1.0)
            .with_title("Rule 15")
            .with_page("colregs", 12);
        let fused = fuse(&[dense("a", 0.7)], &[sparse_row], DEFAULT_RRF_K, 10);

        assert_eq!(fused[0].title, "Rule 15");
        assert_eq!(fused[0].document_id, "colregs");
        assert_eq!(fused[0].page_number, 12);
    }

    #[test]
    fn test_limit_applied_after_sort() {
        let dense_list: Vec<_> = (0..20).map(|i| dense(&format!("d{}", i), 0.5)).collect();
        let fused = fuse(&dense_list, &[], DEFAULT_RRF_K, 5);
        assert_eq!(fused.len(), 5);
    }

    #[test]
    fn test_empty_channels() {
        assert!(fuse(&[], &[], DEFAULT_RRF_K, 10).is_empty());

        let only_sparse = fuse(&[], &[sparse("a", 1.0)], DEFAULT_RRF_K, 10);
        assert_eq!(only_sparse.len(), 1);
        assert!(!only_sparse[0].in_both_channels);
    }
}
