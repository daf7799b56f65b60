//! Testing utilities including mock implementations.
//!
//! These are useful for testing applications that use the tutor core
//! without making real AI, storage, or network calls.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, RwLock};

use sha2::{Digest, Sha256};

use crate::error::{Result, TutorError};
use crate::traits::{
    ai::{Ai, GenerateOptions, Generation, TaskType},
    guard::{EventSink, GuardDecision, InputGuard, LifecycleEvent},
    pdf::{PageRasterizer, PdfSource},
    store::BlobStore,
};

/// Record of a call made to the mock AI.
#[derive(Debug, Clone)]
pub enum MockAiCall {
    Invoke { prompt_prefix: String },
    Embed { text_len: usize },
    Vision { prompt_prefix: String },
}

/// A mock AI implementation for testing.
///
/// Responses resolve in order: queued responses first, then the first
/// matching prompt-substring rule, then the default response. Embeddings
/// are deterministic per text unless overridden.
#[derive(Default)]
pub struct MockAi {
    queue: Mutex<VecDeque<Generation>>,
    rules: RwLock<Vec<(String, Generation)>>,
    default_response: RwLock<Generation>,
    embedding_override: RwLock<Option<Vec<f32>>>,
    embedding_dim: usize,
    fail_embeddings: bool,
    fail_invokes: Mutex<usize>,
    vision_text: RwLock<String>,
    calls: Mutex<Vec<MockAiCall>>,
}

impl MockAi {
    pub fn new() -> Self {
        Self {
            embedding_dim: 768,
            default_response: RwLock::new(Generation::text_only("mock response")),
            vision_text: RwLock::new("mock vision text".to_string()),
            ..Default::default()
        }
    }

    /// Queue a response consumed before any rule matching.
    pub fn push_response(self, text: impl Into<String>) -> Self {
        self.queue
            .lock()
            .unwrap()
            .push_back(Generation::text_only(text));
        self
    }

    /// Respond with `text` whenever the prompt contains `pattern`.
    pub fn with_rule(self, pattern: impl Into<String>, text: impl Into<String>) -> Self {
        self.rules
            .write()
            .unwrap()
            .push((pattern.into(), Generation::text_only(text)));
        self
    }

    /// Rule variant that also returns thinking content.
    pub fn with_thinking_rule(
        self,
        pattern: impl Into<String>,
        text: impl Into<String>,
        thinking: impl Into<String>,
    ) -> Self {
        self.rules.write().unwrap().push((
            pattern.into(),
            Generation {
                text: text.into(),
                thinking: Some(thinking.into()),
            },
        ));
        self
    }

    /// Set the default response for unmatched prompts.
    pub fn with_default_response(self, text: impl Into<String>) -> Self {
        *self.default_response.write().unwrap() = Generation::text_only(text);
        self
    }

    /// Return this vector (before normalization) for every embedding call.
    pub fn with_embedding(self, embedding: Vec<f32>) -> Self {
        *self.embedding_override.write().unwrap() = Some(embedding);
        self
    }

    pub fn with_embedding_dim(mut self, dim: usize) -> Self {
        self.embedding_dim = dim;
        self
    }

    /// Make every embedding call fail.
    pub fn failing_embeddings(mut self) -> Self {
        self.fail_embeddings = true;
        self
    }

    /// Make the next `n` invoke calls fail with a transient error.
    pub fn failing_invokes(self, n: usize) -> Self {
        *self.fail_invokes.lock().unwrap() = n;
        self
    }

    /// Set the text the vision model returns.
    pub fn with_vision_text(self, text: impl Into<String>) -> Self {
        *self.vision_text.write().unwrap() = text.into();
        self
    }

    /// Get all calls made to this mock.
    pub fn calls(&self) -> Vec<MockAiCall> {
        self.calls.lock().unwrap().clone()
    }

    /// Count invoke calls made so far.
    pub fn invoke_count(&self) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| matches!(c, MockAiCall::Invoke { .. }))
            .count()
    }

    /// Generate a deterministic embedding from text content.
    fn deterministic_embedding(&self, text: &str) -> Vec<f32> {
        let mut hasher = Sha256::new();
        hasher.update(text.as_bytes());
        let digest = hasher.finalize();

        (0..self.embedding_dim)
            .map(|i| {
                let byte = digest[i % digest.len()];
                (byte as f32 / 255.0) - 0.5 + (i as f32 * 1e-4)
            })
            .collect()
    }
}

#[async_trait]
impl Ai for MockAi {
    async fn invoke(&self, prompt: &str, _options: &GenerateOptions) -> Result<Generation> {
        self.calls.lock().unwrap().push(MockAiCall::Invoke {
            prompt_prefix: prompt.chars().take(60).collect(),
        });

        {
            let mut remaining = self.fail_invokes.lock().unwrap();
            if *remaining > 0 {
                *remaining -= 1;
                return Err(TutorError::Timeout { stage: "mock" });
            }
        }

        if let Some(generation) = self.queue.lock().unwrap().pop_front() {
            return Ok(generation);
        }

        for (pattern, generation) in self.rules.read().unwrap().iter() {
            if prompt.contains(pattern.as_str()) {
                return Ok(generation.clone());
            }
        }

        Ok(self.default_response.read().unwrap().clone())
    }

    async fn embed(&self, text: &str, _task_type: TaskType) -> Result<Vec<f32>> {
        self.calls.lock().unwrap().push(MockAiCall::Embed {
            text_len: text.len(),
        });

        if self.fail_embeddings {
            return Err(TutorError::Embedding("mock embedding failure".into()));
        }

        if let Some(embedding) = self.embedding_override.read().unwrap().clone() {
            return Ok(embedding);
        }

        Ok(self.deterministic_embedding(text))
    }

    async fn vision_extract(
        &self,
        prompt: &str,
        _image_bytes: &[u8],
        _image_uri: Option<&str>,
    ) -> Result<String> {
        self.calls.lock().unwrap().push(MockAiCall::Vision {
            prompt_prefix: prompt.chars().take(60).collect(),
        });
        Ok(self.vision_text.read().unwrap().clone())
    }
}

/// In-memory blob store recording uploads.
#[derive(Default)]
pub struct MockBlobStore {
    uploads: Mutex<Vec<(String, i32, usize)>>,
}

impl MockBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn upload_count(&self) -> usize {
        self.uploads.lock().unwrap().len()
    }
}

#[async_trait]
impl BlobStore for MockBlobStore {
    async fn upload_page_image(
        &self,
        document_id: &str,
        page_number: i32,
        jpeg_bytes: &[u8],
    ) -> Result<String> {
        self.uploads
            .lock()
            .unwrap()
            .push((document_id.to_string(), page_number, jpeg_bytes.len()));
        Ok(format!(
            "https://storage.test/maritime-docs/{}/page_{}.jpg",
            document_id, page_number
        ))
    }

    async fn delete_page_image(&self, _document_id: &str, _page_number: i32) -> Result<()> {
        Ok(())
    }

    async fn delete_document_images(&self, document_id: &str) -> Result<usize> {
        let mut uploads = self.uploads.lock().unwrap();
        let before = uploads.len();
        uploads.retain(|(doc, _, _)| doc != document_id);
        Ok(before - uploads.len())
    }
}

/// Scripted PDF source: a list of page texts plus an image flag per page.
pub struct MockPdf {
    pages: Vec<(String, bool)>,
}

impl MockPdf {
    pub fn new() -> Self {
        Self { pages: Vec::new() }
    }

    /// Add a text-only page.
    pub fn with_text_page(mut self, text: impl Into<String>) -> Self {
        self.pages.push((text.into(), false));
        self
    }

    /// Add a page carrying an embedded image.
    pub fn with_visual_page(mut self, text: impl Into<String>) -> Self {
        self.pages.push((text.into(), true));
        self
    }
}

impl Default for MockPdf {
    fn default() -> Self {
        Self::new()
    }
}

impl PdfSource for MockPdf {
    fn page_count(&self) -> usize {
        self.pages.len()
    }

    fn page_text(&self, page_index: usize) -> Result<String> {
        self.pages
            .get(page_index)
            .map(|(text, _)| text.clone())
            .ok_or_else(|| TutorError::Pdf(format!("page {} out of range", page_index)))
    }

    fn page_has_images(&self, page_index: usize) -> bool {
        self.pages
            .get(page_index)
            .map(|(_, visual)| *visual)
            .unwrap_or(false)
    }
}

/// Rasterizer returning a fixed JPEG payload.
pub struct MockRasterizer {
    jpeg: Vec<u8>,
}

impl MockRasterizer {
    pub fn new(jpeg: Vec<u8>) -> Self {
        Self { jpeg }
    }
}

impl Default for MockRasterizer {
    fn default() -> Self {
        // Shortest valid-enough JPEG header for size assertions
        Self {
            jpeg: vec![0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10],
        }
    }
}

impl PageRasterizer for MockRasterizer {
    fn render_jpeg(&self, _page_index: usize, _dpi: u32) -> Result<Vec<u8>> {
        Ok(self.jpeg.clone())
    }
}

/// Guard that allows everything.
pub struct AllowAllGuard;

impl InputGuard for AllowAllGuard {
    fn check(&self, _message: &str) -> GuardDecision {
        GuardDecision::Allow
    }
}

/// Guard blocking messages containing any of the given words.
pub struct DenyListGuard {
    words: Vec<String>,
}

impl DenyListGuard {
    pub fn new(words: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            words: words.into_iter().map(Into::into).collect(),
        }
    }
}

impl InputGuard for DenyListGuard {
    fn check(&self, message: &str) -> GuardDecision {
        let lower = message.to_lowercase();
        for word in &self.words {
            if lower.contains(word.as_str()) {
                return GuardDecision::Block {
                    reason: format!("disallowed content: {}", word),
                };
            }
        }
        GuardDecision::Allow
    }
}

/// Event sink recording emitted events.
#[derive(Default)]
pub struct RecordingEventSink {
    events: Arc<Mutex<Vec<LifecycleEvent>>>,
}

impl RecordingEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<LifecycleEvent> {
        self.events.lock().unwrap().clone()
    }

    /// A handle sharing this sink's event log.
    pub fn handle(&self) -> Arc<Mutex<Vec<LifecycleEvent>>> {
        Arc::clone(&self.events)
    }
}

#[async_trait]
impl EventSink for RecordingEventSink {
    async fn emit(&self, event: LifecycleEvent) {
        self.events.lock().unwrap().push(event);
    }
}
