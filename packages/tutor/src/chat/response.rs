//! Response assembly.
//!
//! Merges same-page sources (concatenated content, unioned bounding
//! boxes), formats them for the API shape, and proposes cheap rule-based
//! follow-up questions from the top source.

use std::collections::HashMap;

use tracing::debug;

use crate::types::{RetrievedDocument, SourceInfo};

/// Builds the outward-facing response parts.
#[derive(Debug, Default)]
pub struct ResponseBuilder;

impl ResponseBuilder {
    pub fn new() -> Self {
        Self
    }

    /// Merge sources that share `(document, page)`.
    ///
    /// Content concatenates with a blank-line separator, bounding boxes
    /// union, the first image URL wins. Output ordered by (document,
    /// page).
    pub fn merge_same_page_sources(&self, sources: &[RetrievedDocument]) -> Vec<SourceInfo> {
        if sources.is_empty() {
            return Vec::new();
        }

        let mut pages: HashMap<(String, i32), SourceInfo> = HashMap::new();
        let mut order: Vec<(String, i32)> = Vec::new();

        for source in sources {
            let key = (source.document_id.clone(), source.page_number);
            match pages.get_mut(&key) {
                Some(existing) => {
                    if !source.content.is_empty() {
                        if existing.content.is_empty() {
                            existing.content = source.content.clone();
                        } else {
                            existing.content =
                                format!("{}\n\n{}", existing.content, source.content);
                        }
                    }
                    existing.bounding_boxes.extend(source.bounding_boxes.iter().copied());
                    if existing.image_url.is_none() {
                        existing.image_url = source.image_url.clone();
                    }
                }
                None => {
                    order.push(key.clone());
                    pages.insert(
                        key,
                        SourceInfo {
                            title: source.title.clone(),
                            content: source.content.clone(),
                            page_number: source.page_number,
                            document_id: source.document_id.clone(),
                            image_url: source.image_url.clone(),
                            bounding_boxes: source.bounding_boxes.clone(),
                        },
                    );
                }
            }
        }

        let mut merged: Vec<SourceInfo> = pages.into_values().collect();
        merged.sort_by(|a, b| {
            a.document_id
                .cmp(&b.document_id)
                .then(a.page_number.cmp(&b.page_number))
        });

        debug!(
            from = sources.len(),
            to = merged.len(),
            "merged same-page sources"
        );
        merged
    }

    /// Cheap rule-based follow-up questions from the top source and
    /// detected topics.
    pub fn suggest_questions(&self, sources: &[SourceInfo], topics: &[String]) -> Vec<String> {
        let mut questions = Vec::new();

        if let Some(top) = sources.first() {
            let title = if top.title.is_empty() {
                format!("trang {}", top.page_number)
            } else {
                top.title.clone()
            };
            questions.push(format!("{} áp dụng trong tình huống nào?", title));
            questions.push(format!("Cho ví dụ thực tế về {}?", title));
        }

        if let Some(topic) = topics.first() {
            questions.push(format!("Các quy định khác liên quan đến {}?", topic));
        }

        questions.truncate(3);
        questions
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(
        id: &str,
        document_id: &str,
        page: i32,
        content: &str,
        boxes: Vec<[f32; 4]>,
    ) -> RetrievedDocument {
        RetrievedDocument {
            id: id.to_string(),
            title: "Rule 15".to_string(),
            content: content.to_string(),
            document_id: document_id.to_string(),
            page_number: page,
            image_url: Some(format!("https://img/{}/p{}.jpg", document_id, page)),
            bounding_boxes: boxes,
            score: None,
        }
    }

    #[test]
    fn test_same_page_sources_merge() {
        let sources = vec![
            doc("a", "colregs", 12, "đoạn một", vec![[0.0, 0.0, 0.5, 0.1]]),
            doc("b", "colregs", 12, "đoạn hai", vec![[0.0, 0.2, 0.5, 0.3]]),
            doc("c", "colregs", 13, "trang khác", vec![]),
        ];

        let merged = ResponseBuilder::new().merge_same_page_sources(&sources);

        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].page_number, 12);
        assert!(merged[0].content.contains("đoạn một"));
        assert!(merged[0].content.contains("\n\nđoạn hai"));
        assert_eq!(merged[0].bounding_boxes.len(), 2);
        assert!(merged[0].image_url.is_some());
    }

    #[test]
    fn test_merge_orders_by_document_then_page() {
        let sources = vec![
            doc("a", "solas", 3, "x", vec![]),
            doc("b", "colregs", 7, "y", vec![]),
        ];
        let merged = ResponseBuilder::new().merge_same_page_sources(&sources);
        assert_eq!(merged[0].document_id, "colregs");
        assert_eq!(merged[1].document_id, "solas");
    }

    #[test]
    fn test_suggested_questions_from_top_source() {
        let sources = vec![SourceInfo {
            title: "Rule 15".to_string(),
            content: String::new(),
            page_number: 12,
            document_id: "colregs".to_string(),
            image_url: None,
            bounding_boxes: Vec::new(),
        }];

        let questions =
            ResponseBuilder::new().suggest_questions(&sources, &["COLREGs".to_string()]);
        assert_eq!(questions.len(), 3);
        assert!(questions[0].contains("Rule 15"));
        assert!(questions[2].contains("COLREGs"));
    }

    #[test]
    fn test_no_sources_no_page_questions() {
        let questions = ResponseBuilder::new().suggest_questions(&[], &[]);
        assert!(questions.is_empty());
    }
}
