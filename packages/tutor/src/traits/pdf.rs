//! PDF access seams for the ingestion pipeline.
//!
//! `PdfSource` answers questions about the document itself (page count,
//! text, embedded images); `PageRasterizer` turns a page into a JPEG for
//! the vision path. Splitting them keeps the pure-Rust text path usable
//! without a native renderer, and lets tests script both.

use crate::error::Result;

/// Read access to a PDF document.
pub trait PdfSource: Send + Sync {
    /// Total page count.
    fn page_count(&self) -> usize;

    /// Extract text from a page (0-indexed).
    fn page_text(&self, page_index: usize) -> Result<String>;

    /// True when the page embeds at least one raster image.
    fn page_has_images(&self, page_index: usize) -> bool;
}

/// Renders a PDF page to a JPEG image.
pub trait PageRasterizer: Send + Sync {
    /// Render a page (0-indexed) at the given DPI; returns JPEG bytes.
    fn render_jpeg(&self, page_index: usize, dpi: u32) -> Result<Vec<u8>>;
}
