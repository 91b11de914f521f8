// Session metadata registry: list, active pointer, derived counters

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::models::{generate_session_id, Session, SessionCounters, SessionPatch, SessionStatus};
use crate::state::SessionState;

/// Totals across the registry, per status
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RegistryStats {
    pub total_sessions: usize,
    pub draft: usize,
    pub active: usize,
    pub complete: usize,
}

/// Owns session metadata (newest first), the active-session pointer, and
/// each session's shared state handle. Not internally synchronized; the
/// engine serializes access to it.
pub struct SessionRegistry {
    sessions: Vec<Session>,
    active: Option<String>,
    states: HashMap<String, Arc<Mutex<SessionState>>>,
    dedupe_citations: bool,
}

impl SessionRegistry {
    pub fn new(dedupe_citations: bool) -> Self {
        SessionRegistry {
            sessions: Vec::new(),
            active: None,
            states: HashMap::new(),
            dedupe_citations,
        }
    }

    /// Rebuilds a registry from persisted parts. An active pointer that no
    /// longer matches any session falls back to the first session.
    pub fn from_parts(
        sessions: Vec<Session>,
        active: Option<String>,
        mut states: HashMap<String, Arc<Mutex<SessionState>>>,
        dedupe_citations: bool,
    ) -> Self {
        let active = match active {
            Some(id) if sessions.iter().any(|s| s.id == id) => Some(id),
            Some(id) => {
                log::warn!(
                    "Persisted active session {} no longer exists; falling back",
                    id
                );
                sessions.first().map(|s| s.id.clone())
            }
            None => None,
        };
        // Every listed session gets a state, even if its document never hit disk
        for session in &sessions {
            states
                .entry(session.id.clone())
                .or_insert_with(|| Arc::new(Mutex::new(SessionState::new(dedupe_citations))));
        }
        SessionRegistry {
            sessions,
            active,
            states,
            dedupe_citations,
        }
    }

    /// Creates a draft session, makes it active, and prepends it to the
    /// list so the newest session comes first
    pub fn create_session(
        &mut self,
        name: impl Into<String>,
        description: impl Into<String>,
    ) -> Session {
        let mut session = Session::new(name, description);
        while self.get(&session.id).is_some() {
            session.id = generate_session_id();
        }
        self.states.insert(
            session.id.clone(),
            Arc::new(Mutex::new(SessionState::new(self.dedupe_citations))),
        );
        self.sessions.insert(0, session.clone());
        self.active = Some(session.id.clone());
        log::info!("Created session {} ('{}')", session.id, session.name);
        session
    }

    pub fn get(&self, id: &str) -> Option<&Session> {
        self.sessions.iter().find(|s| s.id == id)
    }

    fn get_mut(&mut self, id: &str) -> Option<&mut Session> {
        self.sessions.iter_mut().find(|s| s.id == id)
    }

    /// Sessions newest first
    pub fn list(&self) -> &[Session] {
        &self.sessions
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn active_session_id(&self) -> Option<&str> {
        self.active.as_deref()
    }

    pub fn active_session(&self) -> Option<&Session> {
        self.active.as_ref().and_then(|id| self.get(id))
    }

    pub fn set_active(&mut self, id: &str) -> Result<(), EngineError> {
        if self.get(id).is_none() {
            return Err(EngineError::SessionNotFound(id.to_string()));
        }
        self.active = Some(id.to_string());
        Ok(())
    }

    /// Applies a metadata patch and returns the updated session
    pub fn patch(&mut self, id: &str, patch: &SessionPatch) -> Result<Session, EngineError> {
        let session = self
            .get_mut(id)
            .ok_or_else(|| EngineError::SessionNotFound(id.to_string()))?;
        patch.apply_to(session);
        Ok(session.clone())
    }

    /// Removes a session and its state. When the removed session was
    /// active, the pointer falls back to the first remaining session.
    /// Returns the new active id, if any.
    pub fn remove(&mut self, id: &str) -> Result<Option<String>, EngineError> {
        let index = self
            .sessions
            .iter()
            .position(|s| s.id == id)
            .ok_or_else(|| EngineError::SessionNotFound(id.to_string()))?;
        self.sessions.remove(index);
        self.states.remove(id);
        if self.active.as_deref() == Some(id) {
            self.active = self.sessions.first().map(|s| s.id.clone());
        }
        log::info!("Removed session {}", id);
        Ok(self.active.clone())
    }

    /// Shared handle to a session's state
    pub fn state_for(&self, id: &str) -> Result<Arc<Mutex<SessionState>>, EngineError> {
        self.states
            .get(id)
            .cloned()
            .ok_or_else(|| EngineError::SessionNotFound(id.to_string()))
    }

    /// Recomputes a session's counters from its document and stores them
    /// on the metadata row
    pub fn refresh_counters(&mut self, id: &str) -> Result<SessionCounters, EngineError> {
        let state = self.state_for(id)?;
        let counters = {
            let guard = state.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            guard.document.snapshot_counters()
        };
        if let Some(session) = self.get_mut(id) {
            session.counters = counters;
        }
        Ok(counters)
    }

    pub fn refresh_all_counters(&mut self) {
        let ids: Vec<String> = self.sessions.iter().map(|s| s.id.clone()).collect();
        for id in ids {
            if let Err(e) = self.refresh_counters(&id) {
                log::warn!("Could not refresh counters for session {}: {}", id, e);
            }
        }
    }

    pub fn stats(&self) -> RegistryStats {
        let mut stats = RegistryStats {
            total_sessions: self.sessions.len(),
            ..Default::default()
        };
        for session in &self.sessions {
            match session.status {
                SessionStatus::Draft => stats.draft += 1,
                SessionStatus::Active => stats.active += 1,
                SessionStatus::Complete => stats.complete += 1,
            }
        }
        stats
    }
}
