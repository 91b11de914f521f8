//! Asynchronous section generation.
//!
//! Each request moves its section to `generating`, spawns a task around
//! the backend call, and hands back a [`GenerationHandle`]. Results settle
//! under the session lock: a completion whose token was cancelled or
//! superseded in the meantime is discarded instead of applied.

pub mod backend;

pub use backend::{BackendError, GeneratedDraft, GenerationBackend};

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::oneshot;

use crate::conflicts::ConflictAnalyzer;
use crate::error::{EngineError, GenerationError};
use crate::events::{
    ConflictDetectedPayload, EventBroadcaster, GenerationCancelledPayload,
    GenerationCompletedPayload, GenerationFailedPayload, GenerationStartedPayload,
    EVENT_CONFLICT_DETECTED, EVENT_GENERATION_CANCELLED, EVENT_GENERATION_COMPLETED,
    EVENT_GENERATION_FAILED, EVENT_GENERATION_STARTED,
};
use crate::file_storage::documents::save_document;
use crate::models::SectionId;
use crate::state::{lock_session, SessionState};

/// Outcome summary for one settled generation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationReceipt {
    pub section: SectionId,
    pub citation_count: usize,
    pub new_conflicts: usize,
}

type SettleResult = Result<GenerationReceipt, GenerationError>;

fn persist(data_root: &Path, session_id: &str, state: &SessionState) {
    if let Err(e) = save_document(data_root, session_id, state) {
        log::warn!("Failed to persist document for session {}: {}", session_id, e);
    }
}

/// Drives generations for one session. Cheap to clone; every instance
/// shares the same session state and broadcaster.
#[derive(Clone)]
pub(crate) struct GenerationCoordinator {
    pub session_id: String,
    pub state: Arc<Mutex<SessionState>>,
    pub backend: Arc<dyn GenerationBackend>,
    pub analyzer: Arc<dyn ConflictAnalyzer>,
    pub broadcaster: Arc<EventBroadcaster>,
    pub data_root: PathBuf,
    pub timeout: Duration,
}

impl GenerationCoordinator {
    /// Start a generation for `section`. Fails with `Busy` while the
    /// section already has one in flight. The task handle is registered
    /// before the lock is released, so even an immediately-returning
    /// backend cannot settle ahead of its own bookkeeping.
    pub fn request_generation(&self, section: SectionId) -> Result<GenerationHandle, EngineError> {
        let (tx, rx) = oneshot::channel();

        let mut guard = lock_session(&self.state);
        guard.document.begin_generation(section)?;
        let token = guard.inflight.issue_token();
        let corpus = guard.corpus.clone();

        let task = tokio::spawn({
            let coordinator = self.clone();
            async move {
                let outcome = match tokio::time::timeout(
                    coordinator.timeout,
                    coordinator.backend.generate(section, &corpus),
                )
                .await
                {
                    Ok(Ok(draft)) => coordinator.settle_success(section, token, draft),
                    Ok(Err(reason)) => coordinator.settle_failure(
                        section,
                        token,
                        GenerationError::Backend { section, reason },
                    ),
                    Err(_) => coordinator.settle_failure(
                        section,
                        token,
                        GenerationError::Timeout {
                            section,
                            seconds: coordinator.timeout.as_secs(),
                        },
                    ),
                };
                // Receiver may have been dropped; the outcome already landed
                let _ = tx.send(outcome);
            }
        });
        guard.inflight.insert(section, token, Some(task));
        persist(&self.data_root, &self.session_id, &guard);
        drop(guard);

        log::info!(
            "Generation started for section '{}' in session {}",
            section,
            self.session_id
        );
        self.broadcaster.broadcast(
            EVENT_GENERATION_STARTED,
            GenerationStartedPayload {
                session_id: self.session_id.clone(),
                section,
            },
        );

        Ok(GenerationHandle {
            coordinator: self.clone(),
            section,
            token,
            receiver: rx,
        })
    }

    /// Start generations for every section that is not already busy
    pub fn request_generation_all(&self) -> Vec<GenerationHandle> {
        let mut handles = Vec::new();
        for id in SectionId::all() {
            match self.request_generation(*id) {
                Ok(handle) => handles.push(handle),
                Err(e) if e.is_busy() => {
                    log::debug!("Skipping section '{}': generation already in flight", id);
                }
                Err(e) => {
                    log::warn!("Could not start generation for section '{}': {}", id, e);
                }
            }
        }
        handles
    }

    /// Cancel whatever is in flight for `section`. With a token, only the
    /// matching attempt is cancelled; without one, any attempt is. Returns
    /// `true` when this call performed the cancellation.
    pub fn cancel(&self, section: SectionId, token: Option<u64>) -> bool {
        let mut guard = lock_session(&self.state);
        let entry = match token {
            Some(token) => guard.inflight.take_if_current(section, token),
            None => guard.inflight.remove(section),
        };
        let entry = match entry {
            Some(entry) => entry,
            None => return false,
        };
        guard.document.cancel_generation(section);
        persist(&self.data_root, &self.session_id, &guard);
        drop(guard);

        if let Some(task) = entry.task {
            task.abort();
        }
        log::info!(
            "Generation cancelled for section '{}' in session {}",
            section,
            self.session_id
        );
        self.broadcaster.broadcast(
            EVENT_GENERATION_CANCELLED,
            GenerationCancelledPayload {
                session_id: self.session_id.clone(),
                section,
            },
        );
        true
    }

    fn settle_success(&self, section: SectionId, token: u64, draft: GeneratedDraft) -> SettleResult {
        let mut guard = lock_session(&self.state);
        if guard.inflight.take_if_current(section, token).is_none() {
            log::debug!("Discarding stale generation result for section '{}'", section);
            return Err(GenerationError::Cancelled { section });
        }

        let citation_count = draft.citations.len();
        guard.document.apply_generated(section, draft.content, draft.citations);
        let SessionState {
            document, conflicts, ..
        } = &mut *guard;
        let new_conflicts = conflicts.detect(section, document, self.analyzer.as_ref());
        persist(&self.data_root, &self.session_id, &guard);
        drop(guard);

        log::info!(
            "Generation completed for section '{}' ({} citations, {} new conflicts)",
            section,
            citation_count,
            new_conflicts.len()
        );
        self.broadcaster.broadcast(
            EVENT_GENERATION_COMPLETED,
            GenerationCompletedPayload {
                session_id: self.session_id.clone(),
                section,
                citation_count,
                new_conflicts: new_conflicts.len(),
            },
        );
        for conflict in &new_conflicts {
            self.broadcaster.broadcast(
                EVENT_CONFLICT_DETECTED,
                ConflictDetectedPayload {
                    session_id: self.session_id.clone(),
                    conflict_id: conflict.id.clone(),
                    section,
                    severity: conflict.severity,
                },
            );
        }

        Ok(GenerationReceipt {
            section,
            citation_count,
            new_conflicts: new_conflicts.len(),
        })
    }

    fn settle_failure(&self, section: SectionId, token: u64, error: GenerationError) -> SettleResult {
        let mut guard = lock_session(&self.state);
        if guard.inflight.take_if_current(section, token).is_none() {
            log::debug!(
                "Discarding stale generation failure for section '{}'",
                section
            );
            return Err(GenerationError::Cancelled { section });
        }
        guard.document.fail_generation(section);
        persist(&self.data_root, &self.session_id, &guard);
        drop(guard);

        log::warn!("Generation failed: {}", error);
        self.broadcaster.broadcast(
            EVENT_GENERATION_FAILED,
            GenerationFailedPayload {
                session_id: self.session_id.clone(),
                section,
                error: error.to_string(),
            },
        );
        Err(error)
    }
}

/// Live handle to one spawned generation. Dropping it detaches: the
/// generation keeps running and settles on its own.
pub struct GenerationHandle {
    coordinator: GenerationCoordinator,
    section: SectionId,
    token: u64,
    receiver: oneshot::Receiver<SettleResult>,
}

impl GenerationHandle {
    pub fn section(&self) -> SectionId {
        self.section
    }

    /// Cancel this attempt if it has not settled yet. The section returns
    /// to idle with its content untouched. Returns `true` when this call
    /// performed the cancellation, `false` when the attempt had already
    /// settled or was cancelled elsewhere.
    pub fn cancel(&self) -> bool {
        self.coordinator.cancel(self.section, Some(self.token))
    }

    /// Wait for the generation to settle. A cancelled or aborted attempt
    /// resolves as `GenerationError::Cancelled`.
    pub async fn wait(self) -> SettleResult {
        let section = self.section;
        match self.receiver.await {
            Ok(outcome) => outcome,
            Err(_) => Err(GenerationError::Cancelled { section }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conflicts::NoopConflictAnalyzer;
    use crate::models::{Citation, GenerationState};
    use async_trait::async_trait;
    use tempfile::TempDir;

    struct StaticBackend {
        draft: GeneratedDraft,
    }

    #[async_trait]
    impl GenerationBackend for StaticBackend {
        async fn generate(
            &self,
            _section: SectionId,
            _corpus: &crate::models::SourceCorpus,
        ) -> Result<GeneratedDraft, String> {
            Ok(self.draft.clone())
        }
    }

    struct FailingBackend;

    #[async_trait]
    impl GenerationBackend for FailingBackend {
        async fn generate(
            &self,
            _section: SectionId,
            _corpus: &crate::models::SourceCorpus,
        ) -> Result<GeneratedDraft, String> {
            Err("model unavailable".to_string())
        }
    }

    struct StalledBackend;

    #[async_trait]
    impl GenerationBackend for StalledBackend {
        async fn generate(
            &self,
            _section: SectionId,
            _corpus: &crate::models::SourceCorpus,
        ) -> Result<GeneratedDraft, String> {
            tokio::time::sleep(Duration::from_secs(300)).await;
            Ok(GeneratedDraft::new("too late", vec![]))
        }
    }

    fn coordinator(
        data_root: &Path,
        backend: Arc<dyn GenerationBackend>,
        timeout: Duration,
    ) -> GenerationCoordinator {
        GenerationCoordinator {
            session_id: "sess_test0001".to_string(),
            state: Arc::new(Mutex::new(SessionState::new(false))),
            backend,
            analyzer: Arc::new(NoopConflictAnalyzer),
            broadcaster: Arc::new(EventBroadcaster::new()),
            data_root: data_root.to_path_buf(),
            timeout,
        }
    }

    #[tokio::test]
    async fn test_successful_generation_applies_draft() {
        let temp_dir = TempDir::new().unwrap();
        let backend = Arc::new(StaticBackend {
            draft: GeneratedDraft::new(
                "Modernize the portal.",
                vec![Citation::new("slack-1", "msg-42")],
            ),
        });
        let coordinator = coordinator(temp_dir.path(), backend, Duration::from_secs(5));

        let handle = coordinator
            .request_generation(SectionId::ExecSummary)
            .unwrap();
        let report = handle.wait().await.unwrap();
        assert_eq!(report.section, SectionId::ExecSummary);
        assert_eq!(report.citation_count, 1);

        let guard = coordinator.state.lock().unwrap();
        let section = guard.document.section(SectionId::ExecSummary);
        assert_eq!(section.content, "Modernize the portal.");
        assert_eq!(section.citations, vec![Citation::new("slack-1", "msg-42")]);
        assert_eq!(section.generation_state, GenerationState::Idle);
        assert_eq!(guard.inflight.len(), 0);
    }

    #[tokio::test]
    async fn test_second_request_is_busy() {
        let temp_dir = TempDir::new().unwrap();
        let coordinator = coordinator(
            temp_dir.path(),
            Arc::new(StalledBackend),
            Duration::from_secs(60),
        );

        let handle = coordinator
            .request_generation(SectionId::Objectives)
            .unwrap();
        let second = coordinator.request_generation(SectionId::Objectives);
        assert!(matches!(second, Err(EngineError::Busy { .. })));

        // Other sections are unaffected
        assert!(coordinator.request_generation(SectionId::Timeline).is_ok());
        handle.cancel();
    }

    #[tokio::test]
    async fn test_backend_failure_marks_error_state() {
        let temp_dir = TempDir::new().unwrap();
        let coordinator = coordinator(
            temp_dir.path(),
            Arc::new(FailingBackend),
            Duration::from_secs(5),
        );

        let handle = coordinator.request_generation(SectionId::Metrics).unwrap();
        let err = handle.wait().await.unwrap_err();
        assert_eq!(
            err,
            GenerationError::Backend {
                section: SectionId::Metrics,
                reason: "model unavailable".to_string(),
            }
        );

        let guard = coordinator.state.lock().unwrap();
        assert_eq!(
            guard.document.generation_state(SectionId::Metrics),
            GenerationState::Error
        );
        assert_eq!(guard.document.section(SectionId::Metrics).content, "");
    }

    #[tokio::test]
    async fn test_timeout_marks_error_state() {
        let temp_dir = TempDir::new().unwrap();
        let coordinator = coordinator(
            temp_dir.path(),
            Arc::new(StalledBackend),
            Duration::from_millis(50),
        );

        let handle = coordinator.request_generation(SectionId::Timeline).unwrap();
        let err = handle.wait().await.unwrap_err();
        assert!(matches!(err, GenerationError::Timeout { .. }));

        let guard = coordinator.state.lock().unwrap();
        assert_eq!(
            guard.document.generation_state(SectionId::Timeline),
            GenerationState::Error
        );
    }

    #[tokio::test]
    async fn test_cancel_returns_section_to_idle_without_mutation() {
        let temp_dir = TempDir::new().unwrap();
        let coordinator = coordinator(
            temp_dir.path(),
            Arc::new(StalledBackend),
            Duration::from_secs(60),
        );
        {
            let mut guard = coordinator.state.lock().unwrap();
            guard
                .document
                .update_content(SectionId::ExecSummary, "Original text")
                .unwrap();
        }

        let handle = coordinator
            .request_generation(SectionId::ExecSummary)
            .unwrap();
        assert!(handle.cancel());
        // A second cancel is a no-op
        assert!(!handle.cancel());

        let err = handle.wait().await.unwrap_err();
        assert_eq!(
            err,
            GenerationError::Cancelled {
                section: SectionId::ExecSummary
            }
        );

        let guard = coordinator.state.lock().unwrap();
        let section = guard.document.section(SectionId::ExecSummary);
        assert_eq!(section.generation_state, GenerationState::Idle);
        assert_eq!(section.content, "Original text");
        assert_eq!(guard.inflight.len(), 0);
    }

    #[tokio::test]
    async fn test_cancel_without_token_clears_any_attempt() {
        let temp_dir = TempDir::new().unwrap();
        let coordinator = coordinator(
            temp_dir.path(),
            Arc::new(StalledBackend),
            Duration::from_secs(60),
        );

        let _handle = coordinator
            .request_generation(SectionId::Functional)
            .unwrap();
        assert!(coordinator.cancel(SectionId::Functional, None));
        assert!(!coordinator.cancel(SectionId::Functional, None));

        let guard = coordinator.state.lock().unwrap();
        assert_eq!(
            guard.document.generation_state(SectionId::Functional),
            GenerationState::Idle
        );
    }

    #[tokio::test]
    async fn test_generation_all_skips_busy_sections() {
        let temp_dir = TempDir::new().unwrap();
        let coordinator = coordinator(
            temp_dir.path(),
            Arc::new(StalledBackend),
            Duration::from_secs(60),
        );

        let first = coordinator
            .request_generation(SectionId::ExecSummary)
            .unwrap();
        let handles = coordinator.request_generation_all();
        assert_eq!(handles.len(), SectionId::all().len() - 1);
        assert!(handles
            .iter()
            .all(|h| h.section() != SectionId::ExecSummary));

        first.cancel();
        for handle in &handles {
            handle.cancel();
        }
    }

    #[tokio::test]
    async fn test_retry_after_failure_succeeds() {
        let temp_dir = TempDir::new().unwrap();
        let failing = coordinator(
            temp_dir.path(),
            Arc::new(FailingBackend),
            Duration::from_secs(5),
        );
        let handle = failing.request_generation(SectionId::ExecSummary).unwrap();
        assert!(handle.wait().await.is_err());

        // Same session state, working backend this time
        let retry = GenerationCoordinator {
            backend: Arc::new(StaticBackend {
                draft: GeneratedDraft::new("Recovered.", vec![]),
            }),
            ..failing.clone()
        };
        let handle = retry.request_generation(SectionId::ExecSummary).unwrap();
        assert!(handle.wait().await.is_ok());

        let guard = retry.state.lock().unwrap();
        let section = guard.document.section(SectionId::ExecSummary);
        assert_eq!(section.content, "Recovered.");
        assert_eq!(section.generation_state, GenerationState::Idle);
    }
}
