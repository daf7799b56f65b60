//! End-to-end ingestion over a scripted PDF: mixed text/visual pages,
//! stored chunk metadata, and the savings report.

use std::sync::Arc;

use tutor::ingest::{
    ContextEnricher, IngestConfig, IngestOptions, IngestProgress, IngestionPipeline,
    VisionExtractor,
};
use tutor::llm::{EmbeddingService, LlmPool};
use tutor::stores::memory::MemoryKnowledgeStore;
use tutor::testing::{MockAi, MockBlobStore, MockPdf, MockRasterizer};
use tutor::traits::store::KnowledgeStore;

const TEXT_PAGE: &str =
    "Khi hai tau thuyen may di cat huong nhau co nguy co va cham thi tau thuyen nao thay \
     tau thuyen kia o ben phai cua minh phai nhuong duong va tranh di qua phia truoc mui.";

const VISION_PAGE_MARKDOWN: &str =
    "## Điều 21. Đèn hiệu\n\nTàu thuyền máy đang hành trình phải trưng đèn cột, đèn mạn và đèn lái \
     theo đúng vị trí quy định trong phụ lục kèm theo công ước quốc tế này.";

fn pipeline_with(
    store: Arc<MemoryKnowledgeStore>,
    blobs: Arc<MockBlobStore>,
    ai: Arc<MockAi>,
    enrichment: bool,
) -> IngestionPipeline {
    let pool = LlmPool::new(ai.clone(), true);
    let embeddings = EmbeddingService::new(ai.clone(), 768);
    let enricher = ContextEnricher::new(pool.light());
    IngestionPipeline::new(
        store,
        blobs,
        VisionExtractor::new(ai),
        embeddings,
        Some(enricher),
        IngestConfig {
            enrichment_enabled: enrichment,
            ..Default::default()
        },
    )
}

#[tokio::test]
async fn mixed_document_metadata_and_savings() {
    let store = Arc::new(MemoryKnowledgeStore::new());
    let blobs = Arc::new(MockBlobStore::new());
    let ai = Arc::new(MockAi::new().with_vision_text(VISION_PAGE_MARKDOWN));

    let pdf = MockPdf::new()
        .with_text_page(TEXT_PAGE)
        .with_visual_page("trang có hình vẽ đèn hiệu");

    // A real (tiny) JPEG so blob sizes are plausible
    let mut buffer = std::io::Cursor::new(Vec::new());
    image::RgbImage::new(8, 8)
        .write_to(&mut buffer, image::ImageFormat::Jpeg)
        .unwrap();
    let rasterizer = MockRasterizer::new(buffer.into_inner());

    let report = pipeline_with(store.clone(), blobs.clone(), ai, false)
        .ingest_document(&pdf, &rasterizer, "colregs-vn", IngestOptions::default())
        .await
        .unwrap();

    // Invariant: successful + failed = processed; direct + vision = successful
    assert_eq!(report.pages_processed(), report.successful_pages + report.failed_pages);
    assert_eq!(report.successful_pages, report.direct_pages + report.vision_pages);
    assert_eq!(report.direct_pages, 1);
    assert_eq!(report.vision_pages, 1);
    assert!((report.api_savings_percent() - 50.0).abs() < 1e-3);

    // Page 1 chunks carry direct extraction, no image
    let page1 = store.count_page_chunks("colregs-vn", 1).await.unwrap();
    assert!(page1 >= 1);

    // Page 2 chunks carry vision extraction with a public image URL
    let sparse = store.sparse_search("đèn hiệu điều 21", 10).await.unwrap();
    let vision_chunk = sparse
        .iter()
        .find(|r| r.page_number == 2)
        .expect("vision page chunk retrievable");
    assert!(vision_chunk
        .image_url
        .as_deref()
        .unwrap()
        .contains("colregs-vn/page_2.jpg"));

    let full = store.get_chunk(&vision_chunk.chunk_id).await.unwrap().unwrap();
    assert_eq!(
        full.metadata["extraction_method"].as_str(),
        Some("vision")
    );
}

#[tokio::test]
async fn enrichment_prepends_context_to_stored_chunks() {
    let store = Arc::new(MemoryKnowledgeStore::new());
    let blobs = Arc::new(MockBlobStore::new());
    let ai = Arc::new(MockAi::new().with_rule(
        "tạo context",
        "Chunk thuộc phần quy tắc hành trình và điều động của công ước COLREGs.",
    ));

    let pdf = MockPdf::new().with_text_page(TEXT_PAGE);

    let report = pipeline_with(store.clone(), blobs, ai, true)
        .ingest_document(
            &pdf,
            &MockRasterizer::default(),
            "colregs-enriched",
            IngestOptions::default(),
        )
        .await
        .unwrap();
    assert_eq!(report.successful_pages, 1);

    let sparse = store.sparse_search("nhuong duong", 10).await.unwrap();
    assert!(sparse[0].content.starts_with("[Context: "));
}

#[tokio::test]
async fn forced_vision_mode_routes_every_page() {
    let store = Arc::new(MemoryKnowledgeStore::new());
    let blobs = Arc::new(MockBlobStore::new());
    let ai = Arc::new(MockAi::new().with_vision_text(VISION_PAGE_MARKDOWN));

    let pdf = MockPdf::new()
        .with_text_page(TEXT_PAGE)
        .with_text_page(TEXT_PAGE);

    let pipeline = IngestionPipeline::new(
        store.clone(),
        blobs.clone(),
        VisionExtractor::new(ai.clone()),
        EmbeddingService::new(ai, 768),
        None,
        IngestConfig {
            force_vision: true,
            enrichment_enabled: false,
            ..Default::default()
        },
    );

    let report = pipeline
        .ingest_document(
            &pdf,
            &MockRasterizer::default(),
            "forced",
            IngestOptions::default(),
        )
        .await
        .unwrap();

    assert_eq!(report.vision_pages, 2);
    assert_eq!(report.direct_pages, 0);
    assert_eq!(blobs.upload_count(), 2);
    assert!((report.api_savings_percent() - 0.0).abs() < 1e-3);
}

#[tokio::test]
async fn reingest_reproduces_chunk_keys() {
    let store = Arc::new(MemoryKnowledgeStore::new());
    let blobs = Arc::new(MockBlobStore::new());
    let ai = Arc::new(MockAi::new());

    let pdf = MockPdf::new().with_text_page(TEXT_PAGE);

    let doc_id = "reingest-doc";
    IngestProgress::for_document(doc_id).clear();

    let pipeline = pipeline_with(store.clone(), blobs, ai, false);
    pipeline
        .ingest_document(&pdf, &MockRasterizer::default(), doc_id, IngestOptions::default())
        .await
        .unwrap();
    let first_count = store.count_page_chunks(doc_id, 1).await.unwrap();

    // Re-ingesting the same page upserts onto the same keys
    pipeline
        .ingest_document(&pdf, &MockRasterizer::default(), doc_id, IngestOptions::default())
        .await
        .unwrap();
    let second_count = store.count_page_chunks(doc_id, 1).await.unwrap();

    assert_eq!(first_count, second_count);
}
