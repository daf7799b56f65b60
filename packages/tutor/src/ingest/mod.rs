//! Multimodal ingestion pipeline.
//!
//! PDF → per-page classification (text-only vs visual) → direct text
//! extraction or vision-model extraction → semantic chunking → contextual
//! enrichment → embedding + storage in both indexes. Resumable per page
//! through a checkpoint file.
//!
//! - [`pdf`] - lopdf-backed `PdfSource` + the null rasterizer
//! - [`classifier`] - direct-vs-vision page classification
//! - [`chunker`] - semantic chunking with type tags and hierarchy
//! - [`enricher`] - contextual enrichment before embedding
//! - [`vision`] - rate-limited vision extraction
//! - [`progress`] - checkpoint files

pub mod chunker;
pub mod classifier;
pub mod enricher;
pub mod pdf;
pub mod progress;
pub mod vision;

pub use chunker::{ChunkDraft, SemanticChunker};
pub use classifier::{PageAnalysis, PageClassifier, RecommendedMethod};
pub use enricher::ContextEnricher;
pub use pdf::{LopdfSource, NullRasterizer};
pub use progress::IngestProgress;
pub use vision::{VisionExtraction, VisionExtractor};

use std::sync::Arc;

use tracing::{info, warn};

use crate::error::Result;
use crate::llm::EmbeddingService;
use crate::retrieval::hyde::HydeExpander;
use crate::traits::pdf::{PageRasterizer, PdfSource};
use crate::traits::store::{BlobStore, KnowledgeStore};
use crate::types::{ContentType, ExtractionMethod, KnowledgeChunk};

/// Pipeline tuning knobs.
#[derive(Debug, Clone)]
pub struct IngestConfig {
    pub dpi: u32,
    pub min_text_length: usize,
    pub force_vision: bool,
    pub enrichment_enabled: bool,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            dpi: 150,
            min_text_length: 100,
            force_vision: false,
            enrichment_enabled: true,
        }
    }
}

/// Page range and resume options for one run.
#[derive(Debug, Clone, Default)]
pub struct IngestOptions {
    /// Resume from the checkpoint if present
    pub resume: bool,

    /// 1-indexed first page to process
    pub start_page: Option<usize>,

    /// 1-indexed last page to process (inclusive)
    pub end_page: Option<usize>,

    /// Cap on pages processed this run
    pub max_pages: Option<usize>,
}

impl IngestOptions {
    pub fn resuming() -> Self {
        Self {
            resume: true,
            ..Default::default()
        }
    }
}

/// Summary of one ingestion run.
#[derive(Debug, Clone, Default)]
pub struct IngestionReport {
    pub document_id: String,
    pub total_pages: usize,
    pub successful_pages: usize,
    pub failed_pages: usize,
    pub errors: Vec<String>,

    /// Pages extracted by the vision model (including fallbacks)
    pub vision_pages: usize,

    /// Pages extracted directly from the PDF
    pub direct_pages: usize,

    /// Pages that fell back from direct to vision
    pub fallback_pages: usize,
}

impl IngestionReport {
    pub fn pages_processed(&self) -> usize {
        self.successful_pages + self.failed_pages
    }

    pub fn success_rate(&self) -> f32 {
        if self.total_pages == 0 {
            return 0.0;
        }
        (self.successful_pages as f32 / self.total_pages as f32) * 100.0
    }

    /// Share of pages that avoided a vision API call.
    pub fn api_savings_percent(&self) -> f32 {
        if self.total_pages == 0 {
            return 0.0;
        }
        (self.direct_pages as f32 / self.total_pages as f32) * 100.0
    }
}

struct PageOutcome {
    image_url: Option<String>,
    chunk_count: usize,
    method: ExtractionMethod,
    was_fallback: bool,
}

/// The multimodal ingestion pipeline.
pub struct IngestionPipeline {
    store: Arc<dyn KnowledgeStore>,
    blobs: Arc<dyn BlobStore>,
    vision: VisionExtractor,
    embeddings: EmbeddingService,
    chunker: SemanticChunker,
    enricher: Option<ContextEnricher>,
    classifier: PageClassifier,
    config: IngestConfig,
}

impl IngestionPipeline {
    pub fn new(
        store: Arc<dyn KnowledgeStore>,
        blobs: Arc<dyn BlobStore>,
        vision: VisionExtractor,
        embeddings: EmbeddingService,
        enricher: Option<ContextEnricher>,
        config: IngestConfig,
    ) -> Self {
        Self {
            store,
            blobs,
            vision,
            embeddings,
            chunker: SemanticChunker::default(),
            enricher: if config.enrichment_enabled {
                enricher
            } else {
                None
            },
            classifier: PageClassifier::new(config.min_text_length),
            config,
        }
    }

    pub fn with_chunker(mut self, chunker: SemanticChunker) -> Self {
        self.chunker = chunker;
        self
    }

    /// Ingest a document page by page.
    ///
    /// Single-page failures are recorded and skipped; the checkpoint
    /// advances only past successful pages, so a rerun with
    /// `IngestOptions::resuming()` picks up where this run stopped.
    pub async fn ingest_document(
        &self,
        pdf: &dyn PdfSource,
        raster: &dyn PageRasterizer,
        document_id: &str,
        options: IngestOptions,
    ) -> Result<IngestionReport> {
        let total_pages = pdf.page_count();
        let progress = IngestProgress::for_document(document_id);

        // 0-indexed start: explicit page range wins over the checkpoint
        let mut start = options.start_page.map(|p| p.saturating_sub(1)).unwrap_or(0);
        if options.start_page.is_none() && options.resume {
            let checkpoint = progress.load();
            if checkpoint > 0 {
                info!(document_id, checkpoint, "resuming ingestion from checkpoint");
                start = checkpoint;
            }
        }

        let mut end = options.end_page.unwrap_or(total_pages).min(total_pages);
        if let Some(max_pages) = options.max_pages {
            end = end.min(start + max_pages);
        }

        let mut report = IngestionReport {
            document_id: document_id.to_string(),
            total_pages,
            ..Default::default()
        };

        info!(
            document_id,
            total_pages,
            start = start + 1,
            end,
            "starting multimodal ingestion"
        );

        for page_index in start..end {
            let page_number = (page_index + 1) as i32;

            match self.process_page(pdf, raster, document_id, page_index).await {
                Ok(outcome) => {
                    report.successful_pages += 1;
                    match outcome.method {
                        ExtractionMethod::Vision => report.vision_pages += 1,
                        ExtractionMethod::Direct => report.direct_pages += 1,
                    }
                    if outcome.was_fallback {
                        report.fallback_pages += 1;
                    }
                    progress.save(page_index + 1);
                    info!(
                        page = page_number,
                        chunks = outcome.chunk_count,
                        method = outcome.method.as_str(),
                        image = outcome.image_url.is_some(),
                        "page ingested"
                    );
                }
                Err(err) => {
                    report.failed_pages += 1;
                    report.errors.push(format!("Page {}: {}", page_number, err));
                    warn!(page = page_number, error = %err, "page ingestion failed");
                }
            }
        }

        // Checkpoint only survives a partial run
        if start + report.pages_processed() >= total_pages {
            progress.clear();
        }

        info!(
            document_id,
            successful = report.successful_pages,
            failed = report.failed_pages,
            vision = report.vision_pages,
            direct = report.direct_pages,
            fallback = report.fallback_pages,
            api_savings = format!("{:.1}%", report.api_savings_percent()),
            "ingestion complete"
        );

        Ok(report)
    }

    async fn process_page(
        &self,
        pdf: &dyn PdfSource,
        raster: &dyn PageRasterizer,
        document_id: &str,
        page_index: usize,
    ) -> Result<PageOutcome> {
        let page_number = (page_index + 1) as i32;
        let direct_text = pdf.page_text(page_index).unwrap_or_default();
        let has_images = pdf.page_has_images(page_index);

        let analysis = self.classifier.analyze(page_number, &direct_text, has_images);

        let use_vision = self.config.force_vision || analysis.method == RecommendedMethod::Vision;

        let mut method = if use_vision {
            ExtractionMethod::Vision
        } else {
            ExtractionMethod::Direct
        };
        let mut was_fallback = false;
        let mut image_url = None;

        let text = if method == ExtractionMethod::Direct {
            if direct_text.trim().chars().count() < self.config.min_text_length {
                // Classifier approved direct but the content stream came
                // up short: promote to vision
                method = ExtractionMethod::Vision;
                was_fallback = true;
                String::new()
            } else {
                direct_text.clone()
            }
        } else {
            String::new()
        };

        let text = if method == ExtractionMethod::Vision {
            let jpeg = raster.render_jpeg(page_index, self.config.dpi)?;
            let url = self
                .blobs
                .upload_page_image(document_id, page_number, &jpeg)
                .await?;
            image_url = Some(url);

            let extraction = self.vision.extract_from_image(&jpeg).await?;
            extraction.text
        } else {
            text
        };

        if text.trim().is_empty() {
            return Err(crate::error::TutorError::Validation {
                reason: "no text extracted from page".into(),
            });
        }

        let mut chunks = self.chunker.chunk_page(&text);
        if chunks.is_empty() {
            // Whole page as one chunk rather than losing it
            chunks = vec![ChunkDraft {
                chunk_index: 0,
                content: text.clone(),
                content_type: ContentType::Text,
                confidence: 1.0,
                hierarchy: Default::default(),
                contextual_content: None,
            }];
        }

        if let Some(enricher) = &self.enricher {
            enricher
                .enrich_chunks(&mut chunks, document_id, page_number, pdf.page_count())
                .await;
        }

        let texts: Vec<&str> = chunks.iter().map(|c| c.storable_content()).collect();
        let embeddings = self.embeddings.embed_documents(&texts).await;

        let language = HydeExpander::detect_language(&text);
        let mut stored = 0;
        for (chunk, embedding) in chunks.iter().zip(embeddings) {
            let content = chunk.storable_content();
            let metadata = serde_json::json!({
                "title": chunk.hierarchy.label(),
                "section_hierarchy": chunk.hierarchy,
                "language": language,
                "word_count": content.split_whitespace().count(),
                "char_count": content.chars().count(),
                "extraction_method": method.as_str(),
                "source_type": "pdf",
            });

            let mut row = KnowledgeChunk::new(document_id, page_number, chunk.chunk_index, content)
                .with_embedding(embedding)
                .with_content_type(chunk.content_type)
                .with_confidence(chunk.confidence)
                .with_metadata(metadata);
            if let Some(url) = &image_url {
                row = row.with_image_url(url.clone());
            }

            match self.store.upsert_chunk(&row).await {
                Ok(()) => stored += 1,
                Err(err) => warn!(
                    page = page_number,
                    chunk = chunk.chunk_index,
                    error = %err,
                    "chunk upsert failed"
                ),
            }
        }

        if stored == 0 {
            return Err(crate::error::TutorError::Validation {
                reason: "all chunks failed to store".into(),
            });
        }

        Ok(PageOutcome {
            image_url,
            chunk_count: stored,
            method,
            was_fallback,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stores::memory::MemoryKnowledgeStore;
    use crate::testing::{MockAi, MockBlobStore, MockPdf, MockRasterizer};
    use std::sync::Arc;

    fn long_text(tag: &str) -> String {
        format!(
            "Khi hai tau thuyen may di cat huong nhau co nguy co va cham thi tau thuyen nao \
             thay tau thuyen kia o ben phai cua minh phai nhuong duong cho tau thuyen do. {}",
            tag
        )
    }

    fn pipeline(
        store: Arc<MemoryKnowledgeStore>,
        blobs: Arc<MockBlobStore>,
        ai: Arc<MockAi>,
    ) -> IngestionPipeline {
        let embeddings = EmbeddingService::new(ai.clone(), 768);
        IngestionPipeline::new(
            store,
            blobs,
            VisionExtractor::new(ai),
            embeddings,
            None,
            IngestConfig {
                enrichment_enabled: false,
                ..Default::default()
            },
        )
    }

    #[tokio::test]
    async fn test_mixed_document_routes_pages() {
        let store = Arc::new(MemoryKnowledgeStore::new());
        let blobs = Arc::new(MockBlobStore::new());
        let ai = Arc::new(MockAi::new().with_vision_text(long_text("## Điều 21 về đèn hiệu")));

        let pdf = MockPdf::new()
            .with_text_page(long_text("trang chữ"))
            .with_visual_page(long_text("trang hình"));

        let report = pipeline(store.clone(), blobs.clone(), ai)
            .ingest_document(&pdf, &MockRasterizer::default(), "colregs-vn", IngestOptions::default())
            .await
            .unwrap();

        assert_eq!(report.total_pages, 2);
        assert_eq!(report.successful_pages, 2);
        assert_eq!(report.failed_pages, 0);
        assert_eq!(report.direct_pages, 1);
        assert_eq!(report.vision_pages, 1);
        assert_eq!(blobs.upload_count(), 1);
        assert!((report.api_savings_percent() - 50.0).abs() < 1e-3);
    }

    #[tokio::test]
    async fn test_short_direct_page_promotes_to_vision() {
        let store = Arc::new(MemoryKnowledgeStore::new());
        let blobs = Arc::new(MockBlobStore::new());
        let ai = Arc::new(MockAi::new().with_vision_text(long_text("nội dung từ ảnh quét")));

        // Short text, no visual signals: classifier sends it to vision as
        // a suspected scan
        let pdf = MockPdf::new().with_text_page("5");

        let report = pipeline(store, blobs, ai)
            .ingest_document(&pdf, &MockRasterizer::default(), "doc", IngestOptions::default())
            .await
            .unwrap();

        assert_eq!(report.vision_pages, 1);
        assert_eq!(report.direct_pages, 0);
    }

    #[tokio::test]
    async fn test_render_failure_marks_page_failed_and_continues() {
        let store = Arc::new(MemoryKnowledgeStore::new());
        let blobs = Arc::new(MockBlobStore::new());
        let ai = Arc::new(MockAi::new());

        let pdf = MockPdf::new()
            .with_visual_page(long_text("trang hình"))
            .with_text_page(long_text("trang chữ"));

        let report = pipeline(store, blobs, ai)
            .ingest_document(&pdf, &NullRasterizer, "doc", IngestOptions::default())
            .await
            .unwrap();

        assert_eq!(report.failed_pages, 1);
        assert_eq!(report.successful_pages, 1);
        assert_eq!(report.pages_processed(), 2);
        assert_eq!(report.errors.len(), 1);
    }

    #[tokio::test]
    async fn test_resume_skips_completed_pages() {
        let store = Arc::new(MemoryKnowledgeStore::new());
        let blobs = Arc::new(MockBlobStore::new());
        let ai = Arc::new(MockAi::new());

        let pdf = MockPdf::new()
            .with_text_page(long_text("một"))
            .with_text_page(long_text("hai"))
            .with_text_page(long_text("ba"));

        let doc_id = "resume-test-doc";
        let progress = IngestProgress::for_document(doc_id);
        progress.clear();

        // First run: only page 1
        let report = pipeline(store.clone(), blobs.clone(), ai.clone())
            .ingest_document(
                &pdf,
                &MockRasterizer::default(),
                doc_id,
                IngestOptions {
                    resume: true,
                    max_pages: Some(1),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(report.successful_pages, 1);
        assert_eq!(progress.load(), 1);

        // Second run resumes at page 2 and finishes
        let report = pipeline(store.clone(), blobs, ai)
            .ingest_document(
                &pdf,
                &MockRasterizer::default(),
                doc_id,
                IngestOptions::resuming(),
            )
            .await
            .unwrap();
        assert_eq!(report.successful_pages, 2);
        assert!(!progress.exists());

        assert_eq!(store.count_page_chunks(doc_id, 1).await.unwrap(), 1);
        assert_eq!(store.count_page_chunks(doc_id, 3).await.unwrap(), 1);
    }
}
