//! PDF access backed by `lopdf`.
//!
//! Covers the pure-Rust concerns: page count, per-page text extraction,
//! and embedded raster-image detection. Rasterization needs a native
//! renderer and stays behind the [`PageRasterizer`] seam; the default
//! [`NullRasterizer`] reports pages as unrenderable, which the pipeline
//! treats as a failed vision page (ingestion continues).

use std::path::Path;

use lopdf::{Document, Object};
use tracing::debug;

use crate::error::{Result, TutorError};
use crate::traits::pdf::{PageRasterizer, PdfSource};

/// PDF source reading directly from the document's content streams.
pub struct LopdfSource {
    doc: Document,
    page_numbers: Vec<u32>,
}

impl LopdfSource {
    /// Open a PDF file.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let doc = Document::load(path.as_ref())
            .map_err(|e| TutorError::Pdf(format!("failed to open PDF: {}", e)))?;
        Ok(Self::from_document(doc))
    }

    /// Open a PDF from raw bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let doc = Document::load_mem(bytes)
            .map_err(|e| TutorError::Pdf(format!("failed to parse PDF: {}", e)))?;
        Ok(Self::from_document(doc))
    }

    fn from_document(doc: Document) -> Self {
        let page_numbers: Vec<u32> = doc.get_pages().keys().copied().collect();
        debug!(pages = page_numbers.len(), "opened PDF");
        Self { doc, page_numbers }
    }

    /// Whitespace cleanup preserving paragraph breaks.
    fn clean_text(text: &str) -> String {
        let mut cleaned: Vec<&str> = Vec::new();
        for line in text.lines() {
            let stripped = line.trim();
            if !stripped.is_empty() {
                cleaned.push(stripped);
            } else if cleaned.last().map(|l| !l.is_empty()).unwrap_or(false) {
                cleaned.push("");
            }
        }
        cleaned.join("\n")
    }
}

impl PdfSource for LopdfSource {
    fn page_count(&self) -> usize {
        self.page_numbers.len()
    }

    fn page_text(&self, page_index: usize) -> Result<String> {
        let page_number = *self
            .page_numbers
            .get(page_index)
            .ok_or_else(|| TutorError::Pdf(format!("page {} out of range", page_index)))?;

        let raw = self
            .doc
            .extract_text(&[page_number])
            .map_err(|e| TutorError::Pdf(format!("text extraction failed: {}", e)))?;

        Ok(Self::clean_text(&raw))
    }

    fn page_has_images(&self, page_index: usize) -> bool {
        let Some(&page_number) = self.page_numbers.get(page_index) else {
            return false;
        };
        let pages = self.doc.get_pages();
        let Some(&page_id) = pages.get(&page_number) else {
            return false;
        };

        // Walk the page's XObject resources looking for Subtype /Image
        let Ok((resources, _)) = self.doc.get_page_resources(page_id) else {
            return false;
        };
        let Some(resources) = resources else {
            return false;
        };
        let Ok(xobjects) = resources.get(b"XObject").and_then(Object::as_dict) else {
            return false;
        };

        for (_, object) in xobjects.iter() {
            let stream = match object {
                Object::Reference(id) => self
                    .doc
                    .get_object(*id)
                    .ok()
                    .and_then(|o| o.as_stream().ok()),
                Object::Stream(stream) => Some(stream),
                _ => None,
            };
            let Some(stream) = stream else { continue };
            let is_image = stream
                .dict
                .get(b"Subtype")
                .and_then(Object::as_name)
                .map(|name| name == b"Image".as_slice())
                .unwrap_or(false);
            if is_image {
                return true;
            }
        }
        false
    }
}

/// Rasterizer used when no native renderer is wired in.
///
/// Every render fails, so pages classified as visual are marked failed
/// and skipped, which matches the vision-extraction failure policy.
pub struct NullRasterizer;

impl PageRasterizer for NullRasterizer {
    fn render_jpeg(&self, page_index: usize, _dpi: u32) -> Result<Vec<u8>> {
        Err(TutorError::Pdf(format!(
            "no rasterizer configured, cannot render page {}",
            page_index
        )))
    }
}
