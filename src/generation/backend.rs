// Pluggable synthesis backend

use async_trait::async_trait;

use crate::models::{Citation, SectionId, SourceCorpus};

/// Human-readable failure reason reported by a backend
pub type BackendError = String;

/// One synthesized draft for a section
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedDraft {
    pub content: String,
    pub citations: Vec<Citation>,
}

impl GeneratedDraft {
    pub fn new(content: impl Into<String>, citations: Vec<Citation>) -> Self {
        GeneratedDraft {
            content: content.into(),
            citations,
        }
    }
}

/// Synthesis provider for section drafts.
///
/// Implementations receive the target section and a snapshot of the
/// session's source corpus, and return a draft with its supporting
/// citations. The engine enforces the timeout, so implementations do
/// not need their own deadline handling.
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    /// Produce a draft for `section` grounded in `corpus`.
    ///
    /// Errors are reported as human-readable strings and surface on the
    /// section as a failed generation.
    async fn generate(
        &self,
        section: SectionId,
        corpus: &SourceCorpus,
    ) -> Result<GeneratedDraft, BackendError>;
}
