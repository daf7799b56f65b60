//! Contextual enrichment of chunks before embedding.
//!
//! Each chunk gets an LLM-generated 50–80-word description of where it
//! sits in its document, prepended as `"[Context: <desc>]\n\n<original>"`.
//! Chunks embed far better when they carry their own context.

use std::time::Duration;

use tracing::{debug, warn};

use crate::ingest::chunker::ChunkDraft;
use crate::llm::TieredLlm;
use crate::prompts::format_enrich_prompt;
use crate::traits::ai::GenerateOptions;

/// Chunks enriched per batch before pausing.
const BATCH_SIZE: usize = 5;

/// Pause between batches, for provider rate limits (policy, not
/// correctness).
const INTER_BATCH_PAUSE: Duration = Duration::from_millis(500);

/// Enriches chunks with document context.
pub struct ContextEnricher {
    llm: TieredLlm,
}

impl ContextEnricher {
    pub fn new(llm: TieredLlm) -> Self {
        Self { llm }
    }

    /// Generate the context description for a single chunk.
    pub async fn generate_context(
        &self,
        chunk_content: &str,
        document_title: &str,
        page_number: i32,
        total_pages: usize,
    ) -> Option<String> {
        let prompt = format_enrich_prompt(chunk_content, document_title, page_number, total_pages);

        match self
            .llm
            .invoke(
                &prompt,
                GenerateOptions::default()
                    .with_temperature(0.3)
                    .with_budgets(0, 300),
            )
            .await
        {
            Ok(generation) => {
                let context = generation.text.trim().to_string();
                if context.is_empty() {
                    None
                } else {
                    Some(context)
                }
            }
            Err(err) => {
                warn!(error = %err, "context generation failed, keeping original chunk");
                None
            }
        }
    }

    /// Enrich a page's chunks in place, in batches with a pause between.
    ///
    /// Failed chunks keep their original content.
    pub async fn enrich_chunks(
        &self,
        chunks: &mut [ChunkDraft],
        document_title: &str,
        page_number: i32,
        total_pages: usize,
    ) {
        let mut enriched_count = 0;

        for (batch_index, batch) in chunks.chunks_mut(BATCH_SIZE).enumerate() {
            if batch_index > 0 {
                tokio::time::sleep(INTER_BATCH_PAUSE).await;
            }

            for chunk in batch.iter_mut() {
                if let Some(context) = self
                    .generate_context(&chunk.content, document_title, page_number, total_pages)
                    .await
                {
                    chunk.contextual_content =
                        Some(format!("[Context: {}]\n\n{}", context, chunk.content));
                    enriched_count += 1;
                }
            }
        }

        debug!(
            enriched = enriched_count,
            total = chunks.len(),
            page = page_number,
            "chunk enrichment"
        );
    }
}
