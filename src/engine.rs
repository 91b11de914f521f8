//! The `BrdEngine` facade.
//!
//! Wires the session registry, per-session document state, the generation
//! coordinator, durable persistence, and the event broadcaster into one
//! surface. Document and conflict operations address the active session;
//! section arguments arrive as wire ids and are parsed at this boundary.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::broadcast;

use crate::config::EngineConfig;
use crate::conflicts::{ConflictAnalyzer, ConflictFilter};
use crate::error::EngineError;
use crate::events::{
    ConflictDetectedPayload, ConflictResolvedPayload, EngineEvent, EventBroadcaster,
    SectionCitationAppendedPayload, SectionCitationsReplacedPayload, SectionContentUpdatedPayload,
    SessionActivatedPayload, SessionCreatedPayload, SessionPatchedPayload, SessionRemovedPayload,
    SourceAddedPayload, EVENT_CONFLICT_DETECTED, EVENT_CONFLICT_RESOLVED,
    EVENT_SECTION_CITATIONS_REPLACED, EVENT_SECTION_CITATION_APPENDED,
    EVENT_SECTION_CONTENT_UPDATED, EVENT_SESSION_ACTIVATED, EVENT_SESSION_CREATED,
    EVENT_SESSION_PATCHED, EVENT_SESSION_REMOVED, EVENT_SOURCE_ADDED,
};
use crate::export;
use crate::file_storage::{self, documents, sessions, NamespaceLock};
use crate::generation::{GenerationBackend, GenerationCoordinator, GenerationHandle};
use crate::models::{
    Citation, Conflict, Section, SectionId, Session, SessionCounters, SessionPatch, SourceFragment,
};
use crate::registry::{RegistryStats, SessionRegistry};
use crate::state::{lock_session, SessionState};

/// The engine's public surface. One instance owns a namespace directory
/// exclusively for its lifetime.
pub struct BrdEngine {
    registry: Mutex<SessionRegistry>,
    broadcaster: Arc<EventBroadcaster>,
    backend: Arc<dyn GenerationBackend>,
    analyzer: Arc<dyn ConflictAnalyzer>,
    config: EngineConfig,
    data_root: PathBuf,
    _lock: NamespaceLock,
}

impl BrdEngine {
    /// Opens (or creates) the namespace directory, takes its exclusive
    /// lock, and loads every persisted session with its document state.
    /// Sections persisted mid-generation come back idle.
    pub fn load_or_init(
        config: EngineConfig,
        backend: Arc<dyn GenerationBackend>,
        analyzer: Arc<dyn ConflictAnalyzer>,
    ) -> Result<Self, EngineError> {
        config.validate()?;
        let data_root = config.data_root();
        file_storage::init_data_root(&data_root).map_err(EngineError::Storage)?;
        let lock = NamespaceLock::acquire(&data_root).map_err(EngineError::Storage)?;

        let file = sessions::load_sessions(&data_root).map_err(EngineError::Storage)?;
        let mut states = HashMap::new();
        for session in &file.sessions {
            let state =
                documents::load_document(&data_root, &session.id, config.dedupe_citations)
                    .map_err(EngineError::Storage)?
                    .unwrap_or_else(|| SessionState::new(config.dedupe_citations));
            states.insert(session.id.clone(), Arc::new(Mutex::new(state)));
        }
        let mut registry = SessionRegistry::from_parts(
            file.sessions,
            file.active_session_id,
            states,
            config.dedupe_citations,
        );
        registry.refresh_all_counters();
        log::info!(
            "Loaded {} session(s) from {:?}",
            registry.len(),
            data_root
        );

        let engine = BrdEngine {
            registry: Mutex::new(registry),
            broadcaster: Arc::new(EventBroadcaster::new()),
            backend,
            analyzer,
            config,
            data_root,
            _lock: lock,
        };
        {
            let registry = engine.lock_registry();
            engine.save_registry(&registry)?;
        }
        Ok(engine)
    }

    pub fn data_root(&self) -> &Path {
        &self.data_root
    }

    /// Subscribe to engine lifecycle events
    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.broadcaster.subscribe()
    }

    fn lock_registry(&self) -> MutexGuard<'_, SessionRegistry> {
        self.registry
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn save_registry(&self, registry: &SessionRegistry) -> Result<(), EngineError> {
        sessions::save_sessions(&self.data_root, registry.active_session_id(), registry.list())
            .map_err(EngineError::Storage)
    }

    fn persist_document(&self, session_id: &str, state: &SessionState) -> Result<(), EngineError> {
        documents::save_document(&self.data_root, session_id, state)
            .map(|_| ())
            .map_err(EngineError::Storage)
    }

    fn parse_section(section_id: &str) -> Result<SectionId, EngineError> {
        SectionId::from_str(section_id)
            .map_err(|_| EngineError::SectionNotFound(section_id.to_string()))
    }

    /// The active session's id and shared state handle
    fn active_context(&self) -> Result<(String, Arc<Mutex<SessionState>>), EngineError> {
        let registry = self.lock_registry();
        let id = registry
            .active_session_id()
            .ok_or(EngineError::NoActiveSession)?
            .to_string();
        let state = registry.state_for(&id)?;
        Ok((id, state))
    }

    /// Recompute the active counters for one session and rewrite the
    /// session list. Best effort: a failed write here only logs, the next
    /// successful write carries the same data.
    fn refresh_counters(&self, session_id: &str) {
        let mut registry = self.lock_registry();
        if let Err(e) = registry.refresh_counters(session_id) {
            log::warn!("Could not refresh counters for session {}: {}", session_id, e);
            return;
        }
        if let Err(e) = self.save_registry(&registry) {
            log::warn!("Could not save session list: {}", e);
        }
    }

    // ----- Sessions -----

    pub fn create_session(
        &self,
        name: impl Into<String>,
        description: impl Into<String>,
    ) -> Result<Session, EngineError> {
        let mut registry = self.lock_registry();
        let session = registry.create_session(name, description);
        let state = registry.state_for(&session.id)?;
        {
            let guard = lock_session(&state);
            self.persist_document(&session.id, &guard)?;
        }
        self.save_registry(&registry)?;
        drop(registry);

        self.broadcaster.broadcast(
            EVENT_SESSION_CREATED,
            SessionCreatedPayload {
                session_id: session.id.clone(),
                name: session.name.clone(),
            },
        );
        Ok(session)
    }

    pub fn set_active_session(&self, session_id: &str) -> Result<(), EngineError> {
        let mut registry = self.lock_registry();
        registry.set_active(session_id)?;
        self.save_registry(&registry)?;
        drop(registry);

        self.broadcaster.broadcast(
            EVENT_SESSION_ACTIVATED,
            SessionActivatedPayload {
                session_id: session_id.to_string(),
            },
        );
        Ok(())
    }

    pub fn patch_session(
        &self,
        session_id: &str,
        patch: SessionPatch,
    ) -> Result<Session, EngineError> {
        let mut registry = self.lock_registry();
        let session = registry.patch(session_id, &patch)?;
        self.save_registry(&registry)?;
        drop(registry);

        self.broadcaster.broadcast(
            EVENT_SESSION_PATCHED,
            SessionPatchedPayload {
                session_id: session_id.to_string(),
            },
        );
        Ok(session)
    }

    /// Removes a session, its state, and its document file. In-flight
    /// generations for it are aborted first so a late settle cannot
    /// resurrect the file.
    pub fn remove_session(&self, session_id: &str) -> Result<(), EngineError> {
        let mut registry = self.lock_registry();
        let state = registry.state_for(session_id)?;
        {
            let mut guard = lock_session(&state);
            for section in SectionId::all() {
                if let Some(entry) = guard.inflight.remove(*section) {
                    guard.document.cancel_generation(*section);
                    if let Some(task) = entry.task {
                        task.abort();
                    }
                }
            }
        }
        let new_active = registry.remove(session_id)?;
        documents::delete_document(&self.data_root, session_id).map_err(EngineError::Storage)?;
        self.save_registry(&registry)?;
        drop(registry);

        self.broadcaster.broadcast(
            EVENT_SESSION_REMOVED,
            SessionRemovedPayload {
                session_id: session_id.to_string(),
                new_active_session_id: new_active,
            },
        );
        Ok(())
    }

    /// Sessions newest first, counters freshly recomputed
    pub fn list_sessions(&self) -> Vec<Session> {
        let mut registry = self.lock_registry();
        registry.refresh_all_counters();
        if let Err(e) = self.save_registry(&registry) {
            log::warn!("Could not save session list: {}", e);
        }
        registry.list().to_vec()
    }

    pub fn get_session(&self, session_id: &str) -> Result<Session, EngineError> {
        let mut registry = self.lock_registry();
        registry.refresh_counters(session_id)?;
        registry
            .get(session_id)
            .cloned()
            .ok_or_else(|| EngineError::SessionNotFound(session_id.to_string()))
    }

    pub fn active_session(&self) -> Option<Session> {
        let mut registry = self.lock_registry();
        let id = registry.active_session_id()?.to_string();
        if let Err(e) = registry.refresh_counters(&id) {
            log::warn!("Could not refresh counters for session {}: {}", id, e);
        }
        registry.get(&id).cloned()
    }

    pub fn registry_stats(&self) -> RegistryStats {
        self.lock_registry().stats()
    }

    // ----- Document (active session) -----

    pub fn get_section(&self, section_id: &str) -> Result<Section, EngineError> {
        let section = Self::parse_section(section_id)?;
        let (_, state) = self.active_context()?;
        let guard = lock_session(&state);
        Ok(guard.document.section(section).clone())
    }

    /// All sections of the active session's document, in template order
    pub fn sections(&self) -> Result<Vec<Section>, EngineError> {
        let (_, state) = self.active_context()?;
        let guard = lock_session(&state);
        Ok(guard.document.sections().to_vec())
    }

    pub fn update_content(
        &self,
        section_id: &str,
        text: impl Into<String>,
    ) -> Result<(), EngineError> {
        let section = Self::parse_section(section_id)?;
        let (session_id, state) = self.active_context()?;
        {
            let mut guard = lock_session(&state);
            guard.document.update_content(section, text)?;
            self.persist_document(&session_id, &guard)?;
        }
        self.refresh_counters(&session_id);

        self.broadcaster.broadcast(
            EVENT_SECTION_CONTENT_UPDATED,
            SectionContentUpdatedPayload {
                session_id,
                section,
            },
        );
        Ok(())
    }

    pub fn append_citation(
        &self,
        section_id: &str,
        citation: Citation,
    ) -> Result<(), EngineError> {
        let section = Self::parse_section(section_id)?;
        let (session_id, state) = self.active_context()?;
        let payload = SectionCitationAppendedPayload {
            session_id: session_id.clone(),
            section,
            source_id: citation.source_id.clone(),
            locator: citation.locator.clone(),
        };
        {
            let mut guard = lock_session(&state);
            guard.document.append_citation(section, citation)?;
            self.persist_document(&session_id, &guard)?;
        }
        self.refresh_counters(&session_id);

        self.broadcaster
            .broadcast(EVENT_SECTION_CITATION_APPENDED, payload);
        Ok(())
    }

    pub fn replace_citations(
        &self,
        section_id: &str,
        citations: Vec<Citation>,
    ) -> Result<(), EngineError> {
        let section = Self::parse_section(section_id)?;
        let (session_id, state) = self.active_context()?;
        let citation_count = citations.len();
        {
            let mut guard = lock_session(&state);
            guard.document.replace_citations(section, citations)?;
            self.persist_document(&session_id, &guard)?;
        }
        self.refresh_counters(&session_id);

        self.broadcaster.broadcast(
            EVENT_SECTION_CITATIONS_REPLACED,
            SectionCitationsReplacedPayload {
                session_id,
                section,
                citation_count,
            },
        );
        Ok(())
    }

    /// Derived counters for the active session's document
    pub fn snapshot_counters(&self) -> Result<SessionCounters, EngineError> {
        let (session_id, _) = self.active_context()?;
        let mut registry = self.lock_registry();
        let counters = registry.refresh_counters(&session_id)?;
        if let Err(e) = self.save_registry(&registry) {
            log::warn!("Could not save session list: {}", e);
        }
        Ok(counters)
    }

    /// Registers ingested source material into the active session's corpus
    pub fn add_source(&self, fragment: SourceFragment) -> Result<(), EngineError> {
        let (session_id, state) = self.active_context()?;
        let payload = SourceAddedPayload {
            session_id: session_id.clone(),
            source_id: fragment.source_id.clone(),
            locator: fragment.locator.clone(),
            kind: fragment.kind,
            label: fragment.label.clone(),
        };
        {
            let mut guard = lock_session(&state);
            guard.corpus.add(fragment);
            self.persist_document(&session_id, &guard)?;
        }

        self.broadcaster.broadcast(EVENT_SOURCE_ADDED, payload);
        Ok(())
    }

    // ----- Conflicts (active session) -----

    pub fn list_conflicts(&self, filter: ConflictFilter) -> Result<Vec<Conflict>, EngineError> {
        let (_, state) = self.active_context()?;
        let guard = lock_session(&state);
        Ok(guard.conflicts.list(filter))
    }

    /// Marks a conflict resolved. Resolving twice is a no-op and emits
    /// nothing the second time.
    pub fn resolve_conflict(&self, conflict_id: &str) -> Result<(), EngineError> {
        let (session_id, state) = self.active_context()?;
        let newly_resolved;
        {
            let mut guard = lock_session(&state);
            let was_resolved = guard.conflicts.get(conflict_id).map(|c| c.resolved);
            guard.conflicts.resolve(conflict_id)?;
            newly_resolved = was_resolved == Some(false);
            if newly_resolved {
                self.persist_document(&session_id, &guard)?;
            }
        }
        if newly_resolved {
            self.broadcaster.broadcast(
                EVENT_CONFLICT_RESOLVED,
                ConflictResolvedPayload {
                    session_id,
                    conflict_id: conflict_id.to_string(),
                },
            );
        }
        Ok(())
    }

    /// Re-runs conflict detection for one section against the rest of the
    /// active document. Regular detection runs automatically when a
    /// generation completes; this entry point covers manually edited
    /// content.
    pub fn detect_conflicts(&self, section_id: &str) -> Result<Vec<Conflict>, EngineError> {
        let section = Self::parse_section(section_id)?;
        let (session_id, state) = self.active_context()?;
        let new_conflicts;
        {
            let mut guard = lock_session(&state);
            let SessionState {
                document,
                conflicts,
                ..
            } = &mut *guard;
            new_conflicts = conflicts.detect(section, document, self.analyzer.as_ref());
            if !new_conflicts.is_empty() {
                self.persist_document(&session_id, &guard)?;
            }
        }
        for conflict in &new_conflicts {
            self.broadcaster.broadcast(
                EVENT_CONFLICT_DETECTED,
                ConflictDetectedPayload {
                    session_id: session_id.clone(),
                    conflict_id: conflict.id.clone(),
                    section,
                    severity: conflict.severity,
                },
            );
        }
        Ok(new_conflicts)
    }

    // ----- Generation (active session) -----

    fn coordinator(&self, session_id: String, state: Arc<Mutex<SessionState>>) -> GenerationCoordinator {
        GenerationCoordinator {
            session_id,
            state,
            backend: Arc::clone(&self.backend),
            analyzer: Arc::clone(&self.analyzer),
            broadcaster: Arc::clone(&self.broadcaster),
            data_root: self.data_root.clone(),
            timeout: self.config.generation_timeout(),
        }
    }

    /// Starts an asynchronous generation for one section of the active
    /// session. Fails with `Busy` while that section already has one in
    /// flight. Must be called from within a tokio runtime.
    pub fn request_generation(&self, section_id: &str) -> Result<GenerationHandle, EngineError> {
        let section = Self::parse_section(section_id)?;
        let (session_id, state) = self.active_context()?;
        self.coordinator(session_id, state).request_generation(section)
    }

    /// Starts a generation for every section not already generating
    pub fn request_generation_all(&self) -> Result<Vec<GenerationHandle>, EngineError> {
        let (session_id, state) = self.active_context()?;
        Ok(self.coordinator(session_id, state).request_generation_all())
    }

    /// Cancels whatever generation is in flight for the section. Returns
    /// `true` when one was actually cancelled.
    pub fn cancel_generation(&self, section_id: &str) -> Result<bool, EngineError> {
        let section = Self::parse_section(section_id)?;
        let (session_id, state) = self.active_context()?;
        Ok(self.coordinator(session_id, state).cancel(section, None))
    }

    // ----- Export -----

    /// Renders the active session's BRD as Markdown
    pub fn export_markdown(&self) -> Result<String, EngineError> {
        let (session_id, state) = self.active_context()?;
        let session = {
            let mut registry = self.lock_registry();
            if let Err(e) = registry.refresh_counters(&session_id) {
                log::warn!("Could not refresh counters for session {}: {}", session_id, e);
            }
            registry
                .get(&session_id)
                .cloned()
                .ok_or_else(|| EngineError::SessionNotFound(session_id.clone()))?
        };
        let guard = lock_session(&state);
        Ok(export::render_markdown(&session, &guard))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conflicts::NoopConflictAnalyzer;
    use crate::generation::{BackendError, GeneratedDraft};
    use crate::models::SourceCorpus;
    use async_trait::async_trait;
    use tempfile::TempDir;

    struct NullBackend;

    #[async_trait]
    impl GenerationBackend for NullBackend {
        async fn generate(
            &self,
            _section: SectionId,
            _corpus: &SourceCorpus,
        ) -> Result<GeneratedDraft, BackendError> {
            Err("no backend configured".to_string())
        }
    }

    fn engine_at(path: &Path) -> Result<BrdEngine, EngineError> {
        let config = EngineConfig {
            data_dir: Some(path.to_path_buf()),
            ..Default::default()
        };
        BrdEngine::load_or_init(config, Arc::new(NullBackend), Arc::new(NoopConflictAnalyzer))
    }

    #[test]
    fn test_init_creates_namespace_layout() {
        let temp_dir = TempDir::new().unwrap();
        let engine = engine_at(temp_dir.path()).unwrap();

        assert!(temp_dir.path().join("sessions.json").exists());
        assert!(temp_dir.path().join("documents").is_dir());
        assert!(engine.list_sessions().is_empty());
        assert_eq!(engine.registry_stats().total_sessions, 0);
    }

    #[test]
    fn test_namespace_lock_refuses_second_engine() {
        let temp_dir = TempDir::new().unwrap();
        let _engine = engine_at(temp_dir.path()).unwrap();

        let second = engine_at(temp_dir.path());
        match second {
            Err(EngineError::Storage(reason)) => assert!(reason.contains("locked")),
            other => panic!("Expected storage error, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_lock_released_on_drop() {
        let temp_dir = TempDir::new().unwrap();
        {
            let _engine = engine_at(temp_dir.path()).unwrap();
        }
        assert!(engine_at(temp_dir.path()).is_ok());
    }

    #[test]
    fn test_document_ops_require_active_session() {
        let temp_dir = TempDir::new().unwrap();
        let engine = engine_at(temp_dir.path()).unwrap();

        let err = engine.update_content("exec-summary", "text").unwrap_err();
        assert!(matches!(err, EngineError::NoActiveSession));
        let err = engine.snapshot_counters().unwrap_err();
        assert!(matches!(err, EngineError::NoActiveSession));
        assert!(engine.active_session().is_none());
    }

    #[test]
    fn test_unknown_section_id_is_not_found() {
        let temp_dir = TempDir::new().unwrap();
        let engine = engine_at(temp_dir.path()).unwrap();
        engine.create_session("Alpha", "").unwrap();

        let err = engine.get_section("milestones").unwrap_err();
        match err {
            EngineError::SectionNotFound(id) => assert_eq!(id, "milestones"),
            other => panic!("Expected SectionNotFound, got {:?}", other),
        }
    }
}
