//! Resumable ingestion checkpoints.
//!
//! The checkpoint file `{document_id}.progress.json` in the temp dir is
//! the only durable state outside the database between ingestion
//! invocations. It is created on the first successful page, updated
//! monotonically, and deleted on completion.

use std::fs;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::warn;

const PROGRESS_FILE_SUFFIX: &str = ".progress.json";

#[derive(Debug, Serialize, Deserialize)]
struct ProgressFile {
    last_successful_page: usize,
}

/// Checkpoint handle for one document's ingestion.
pub struct IngestProgress {
    path: PathBuf,
}

impl IngestProgress {
    pub fn for_document(document_id: &str) -> Self {
        let mut path = std::env::temp_dir();
        path.push(format!("{}{}", document_id, PROGRESS_FILE_SUFFIX));
        Self { path }
    }

    /// 1-indexed number of the last successfully completed page, or 0.
    pub fn load(&self) -> usize {
        match fs::read_to_string(&self.path) {
            Ok(raw) => serde_json::from_str::<ProgressFile>(&raw)
                .map(|p| p.last_successful_page)
                .unwrap_or_else(|e| {
                    warn!(error = %e, "malformed progress file, starting over");
                    0
                }),
            Err(_) => 0,
        }
    }

    /// Record a completed page (1-indexed). Monotonic by construction:
    /// the pipeline only moves forward.
    pub fn save(&self, last_successful_page: usize) {
        let payload = ProgressFile {
            last_successful_page,
        };
        if let Ok(json) = serde_json::to_string(&payload) {
            if let Err(e) = fs::write(&self.path, json) {
                warn!(error = %e, "failed to save ingestion progress");
            }
        }
    }

    /// Remove the checkpoint after a complete run.
    pub fn clear(&self) {
        let _ = fs::remove_file(&self.path);
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checkpoint_lifecycle() {
        let progress = IngestProgress::for_document("test-doc-lifecycle");
        progress.clear();

        assert_eq!(progress.load(), 0);

        progress.save(3);
        assert!(progress.exists());
        assert_eq!(progress.load(), 3);

        progress.save(7);
        assert_eq!(progress.load(), 7);

        progress.clear();
        assert!(!progress.exists());
        assert_eq!(progress.load(), 0);
    }
}
