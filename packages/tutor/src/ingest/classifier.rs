//! Page classifier for hybrid text/vision extraction.
//!
//! Text-only pages go through direct extraction (free, fast); pages with
//! visual content go through the vision model (accurate for tables,
//! diagrams, signal illustrations). The point is cutting vision API calls
//! on mostly-textual regulation documents.

use regex::Regex;
use tracing::debug;

/// Recommended extraction method for a page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecommendedMethod {
    Direct,
    Vision,
}

/// Result of page content analysis.
#[derive(Debug, Clone)]
pub struct PageAnalysis {
    pub page_number: i32,
    pub has_images: bool,
    pub has_tables: bool,
    pub has_diagrams: bool,
    pub has_maritime_signals: bool,
    pub text_length: usize,
    pub method: RecommendedMethod,
    pub confidence: f32,
    pub reasons: Vec<String>,
}

impl PageAnalysis {
    /// Any visual content indicator present.
    pub fn is_visual_content(&self) -> bool {
        self.has_images || self.has_tables || self.has_diagrams || self.has_maritime_signals
    }
}

/// Table detection patterns.
const TABLE_PATTERNS: &[&str] = &[
    r"\|[^|]+\|[^|]+\|",  // Markdown table: |col1|col2|
    r"[┌┐└┘├┤─│┬┴┼]",     // Unicode box drawing
    r"\+[-=]+\+",         // ASCII table: +---+
];

/// Diagram reference keywords (Vietnamese + English).
const DIAGRAM_KEYWORDS: &[&str] = &[
    "hình",
    "figure",
    "sơ đồ",
    "biểu đồ",
    "diagram",
    "minh họa",
    "illustration",
    "bản vẽ",
    "drawing",
];

/// Maritime signal keywords.
const MARITIME_KEYWORDS: &[&str] = &[
    "đèn",
    "tín hiệu",
    "cờ",
    "còi",
    "pháo hiệu",
    "light",
    "signal",
    "flag",
    "whistle",
    "flare",
    "đèn đỏ",
    "đèn xanh",
    "đèn trắng",
    "mạn phải",
    "mạn trái",
    "starboard",
    "port",
];

/// Classifies pages into direct vs vision extraction.
pub struct PageClassifier {
    table_regexes: Vec<Regex>,
    min_text_length: usize,
}

impl PageClassifier {
    pub fn new(min_text_length: usize) -> Self {
        Self {
            table_regexes: TABLE_PATTERNS
                .iter()
                .filter_map(|p| Regex::new(p).ok())
                .collect(),
            min_text_length,
        }
    }

    /// Analyze a page's extracted text and embedded-image flag.
    ///
    /// Decision table:
    /// - any visual signal → vision, confidence 0.9
    /// - text below minimum → vision (scanned-page suspicion), 0.7
    /// - otherwise → direct, 0.95
    pub fn analyze(&self, page_number: i32, text: &str, has_images: bool) -> PageAnalysis {
        let text_lower = text.to_lowercase();
        let mut reasons = Vec::new();

        if has_images {
            reasons.push("embedded raster image(s)".to_string());
        }

        let has_tables = self
            .table_regexes
            .iter()
            .find(|regex| regex.is_match(text))
            .map(|regex| {
                reasons.push(format!("table pattern detected: {}", regex.as_str()));
                true
            })
            .unwrap_or(false);

        let has_diagrams = DIAGRAM_KEYWORDS
            .iter()
            .find(|kw| text_lower.contains(*kw))
            .map(|kw| {
                reasons.push(format!("diagram keyword found: '{}'", kw));
                true
            })
            .unwrap_or(false);

        let has_maritime_signals = MARITIME_KEYWORDS
            .iter()
            .find(|kw| text_lower.contains(*kw))
            .map(|kw| {
                reasons.push(format!("maritime keyword found: '{}'", kw));
                true
            })
            .unwrap_or(false);

        let text_length = text.chars().count();

        let mut analysis = PageAnalysis {
            page_number,
            has_images,
            has_tables,
            has_diagrams,
            has_maritime_signals,
            text_length,
            method: RecommendedMethod::Direct,
            confidence: 0.95,
            reasons,
        };

        if analysis.is_visual_content() {
            analysis.method = RecommendedMethod::Vision;
            analysis.confidence = 0.9;
        } else if text_length < self.min_text_length {
            analysis.method = RecommendedMethod::Vision;
            analysis.confidence = 0.7;
            analysis.reasons.push(format!(
                "text too short ({} < {})",
                text_length, self.min_text_length
            ));
        }

        debug!(
            page = page_number,
            method = ?analysis.method,
            confidence = analysis.confidence,
            "page classified"
        );

        analysis
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classifier() -> PageClassifier {
        PageClassifier::new(100)
    }

    fn long_plain_text() -> String {
        "Khi hai tau thuyen may di cat huong nhau co nguy co va cham, \
         tau thuyen nao thay tau thuyen kia o ben phai cua minh thi phai nhuong duong \
         va tranh di qua phia truoc mui cua tau thuyen kia."
            .to_string()
    }

    #[test]
    fn test_plain_text_page_is_direct() {
        let analysis = classifier().analyze(1, &long_plain_text(), false);
        assert_eq!(analysis.method, RecommendedMethod::Direct);
        assert!((analysis.confidence - 0.95).abs() < 1e-6);
    }

    #[test]
    fn test_embedded_image_forces_vision() {
        let analysis = classifier().analyze(1, &long_plain_text(), true);
        assert_eq!(analysis.method, RecommendedMethod::Vision);
        assert!((analysis.confidence - 0.9).abs() < 1e-6);
    }

    #[test]
    fn test_markdown_table_detected() {
        let text = format!("{}\n| Cột A | Cột B |\n|---|---|\n| 1 | 2 |", long_plain_text());
        let analysis = classifier().analyze(1, &text, false);
        assert!(analysis.has_tables);
        assert_eq!(analysis.method, RecommendedMethod::Vision);
    }

    #[test]
    fn test_maritime_signal_keyword_detected() {
        let text = format!("{} Tàu phải trưng đèn mạn phải màu xanh.", long_plain_text());
        let analysis = classifier().analyze(1, &text, false);
        assert!(analysis.has_maritime_signals);
        assert_eq!(analysis.method, RecommendedMethod::Vision);
    }

    #[test]
    fn test_short_text_suspected_scan() {
        let analysis = classifier().analyze(1, "trang 5", false);
        assert_eq!(analysis.method, RecommendedMethod::Vision);
        assert!((analysis.confidence - 0.7).abs() < 1e-6);
        assert!(analysis
            .reasons
            .iter()
            .any(|r| r.contains("text too short")));
    }
}
