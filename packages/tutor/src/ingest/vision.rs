//! Vision extraction of rendered page images.
//!
//! Wraps the vision model with a requests-per-minute rate limit and
//! output validation. The prompt asks for headings preserved, tables as
//! Markdown, and diagrams described (colors, positions, meanings).

use std::num::NonZeroU32;
use std::sync::Arc;

use governor::{Quota, RateLimiter};
use nonzero_ext::nonzero;
use tracing::{debug, warn};

use crate::error::{Result, TutorError};
use crate::prompts::VISION_EXTRACTION_PROMPT;
use crate::traits::ai::Ai;

type DirectRateLimiter = RateLimiter<
    governor::state::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

/// Default vision API quota.
const MAX_REQUESTS_PER_MINUTE: NonZeroU32 = nonzero!(10u32);

/// Minimum plausible extraction length; shorter output is suspect.
const MIN_EXTRACTION_LENGTH: usize = 50;

/// Result of vision extraction for one page image.
#[derive(Debug, Clone)]
pub struct VisionExtraction {
    pub text: String,
    pub has_tables: bool,
    pub has_diagrams: bool,
    pub char_count: usize,
}

impl VisionExtraction {
    /// False when the output is too short to be a full page.
    pub fn looks_complete(&self) -> bool {
        self.char_count >= MIN_EXTRACTION_LENGTH
    }
}

/// Rate-limited vision extractor.
pub struct VisionExtractor {
    ai: Arc<dyn Ai>,
    limiter: DirectRateLimiter,
}

impl VisionExtractor {
    pub fn new(ai: Arc<dyn Ai>) -> Self {
        Self::with_quota(ai, MAX_REQUESTS_PER_MINUTE)
    }

    pub fn with_quota(ai: Arc<dyn Ai>, requests_per_minute: NonZeroU32) -> Self {
        Self {
            ai,
            limiter: RateLimiter::direct(Quota::per_minute(requests_per_minute)),
        }
    }

    /// Extract page text from JPEG bytes.
    pub async fn extract_from_image(&self, jpeg_bytes: &[u8]) -> Result<VisionExtraction> {
        self.limiter.until_ready().await;

        let text = self
            .ai
            .vision_extract(VISION_EXTRACTION_PROMPT, jpeg_bytes, None)
            .await
            .map_err(|e| TutorError::Vision(e.to_string()))?;

        Ok(self.analyze(text))
    }

    /// Extract page text from an already-uploaded image URL.
    pub async fn extract_from_url(&self, image_url: &str) -> Result<VisionExtraction> {
        self.limiter.until_ready().await;

        let text = self
            .ai
            .vision_extract(VISION_EXTRACTION_PROMPT, &[], Some(image_url))
            .await
            .map_err(|e| TutorError::Vision(e.to_string()))?;

        Ok(self.analyze(text))
    }

    fn analyze(&self, text: String) -> VisionExtraction {
        let extraction = VisionExtraction {
            has_tables: text.contains('|') && text.contains("---"),
            has_diagrams: text.contains("[Hình") || text.to_lowercase().contains("diagram"),
            char_count: text.chars().count(),
            text,
        };

        if !extraction.looks_complete() {
            warn!(
                chars = extraction.char_count,
                "vision extraction may be incomplete"
            );
        } else {
            debug!(
                chars = extraction.char_count,
                tables = extraction.has_tables,
                diagrams = extraction.has_diagrams,
                "vision extraction"
            );
        }

        extraction
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockAi;

    #[tokio::test]
    async fn test_extract_analyzes_output() {
        let page = "## Điều 15\n\n| Đèn | Màu |\n|---|---|\n| mạn phải | xanh |\n\n[Hình: hai tàu cắt hướng]";
        let mock = MockAi::new().with_vision_text(page);
        let extractor = VisionExtractor::new(Arc::new(mock));

        let extraction = extractor.extract_from_image(&[0xFF, 0xD8]).await.unwrap();
        assert!(extraction.has_tables);
        assert!(extraction.has_diagrams);
        assert!(extraction.looks_complete());
    }

    #[tokio::test]
    async fn test_short_output_flagged() {
        let mock = MockAi::new().with_vision_text("trang 5");
        let extractor = VisionExtractor::new(Arc::new(mock));

        let extraction = extractor.extract_from_image(&[0xFF, 0xD8]).await.unwrap();
        assert!(!extraction.looks_complete());
    }
}
