// Aggregate in-memory state for one session, shared between the engine
// facade and spawned generation tasks

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use tokio::task::JoinHandle;

use crate::conflicts::ConflictLedger;
use crate::document::DocumentStore;
use crate::models::section::SectionId;
use crate::models::{Conflict, SourceCorpus, SourceFragment};

/// Locks a session's state, recovering from a poisoned mutex
pub(crate) fn lock_session(state: &Mutex<SessionState>) -> MutexGuard<'_, SessionState> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// One in-flight generation: the token that must still be current for its
/// result to land, and the task driving it
#[derive(Debug)]
pub(crate) struct InFlightGeneration {
    pub token: u64,
    pub task: Option<JoinHandle<()>>,
}

/// Tracks at most one in-flight generation per section. Tokens are issued
/// from a per-session counter; a completion whose token no longer matches
/// the table entry is stale and must be discarded.
#[derive(Debug, Default)]
pub(crate) struct InFlightTable {
    entries: HashMap<SectionId, InFlightGeneration>,
    next_token: u64,
}

impl InFlightTable {
    pub fn issue_token(&mut self) -> u64 {
        self.next_token += 1;
        self.next_token
    }

    pub fn insert(&mut self, section: SectionId, token: u64, task: Option<JoinHandle<()>>) {
        self.entries
            .insert(section, InFlightGeneration { token, task });
    }

    pub fn contains(&self, section: SectionId) -> bool {
        self.entries.contains_key(&section)
    }

    /// Removes and returns the entry only if `token` is still the current
    /// one for the section. A `None` here means the operation was cancelled
    /// or superseded and its result must not be applied.
    pub fn take_if_current(&mut self, section: SectionId, token: u64) -> Option<InFlightGeneration> {
        match self.entries.get(&section) {
            Some(entry) if entry.token == token => self.entries.remove(&section),
            _ => None,
        }
    }

    /// Unconditionally removes the entry, returning it so the caller can
    /// abort the task
    pub fn remove(&mut self, section: SectionId) -> Option<InFlightGeneration> {
        self.entries.remove(&section)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

/// Everything the engine tracks for a single session: the sectioned
/// document, its conflict ledger, the ingested source corpus, and the
/// runtime-only in-flight generation table. All of it sits behind one
/// mutex per session; generation tasks lock it only briefly to start and
/// settle, never across the backend call.
#[derive(Debug)]
pub struct SessionState {
    pub document: DocumentStore,
    pub conflicts: ConflictLedger,
    pub corpus: SourceCorpus,
    pub(crate) inflight: InFlightTable,
}

impl SessionState {
    /// Fresh state for a newly created session
    pub fn new(dedupe_citations: bool) -> Self {
        SessionState {
            document: DocumentStore::with_options(dedupe_citations),
            conflicts: ConflictLedger::new(),
            corpus: SourceCorpus::new(),
            inflight: InFlightTable::default(),
        }
    }

    /// Rebuilds state from persisted parts. In-flight bookkeeping always
    /// starts empty; sections stuck in `generating` are reset by the
    /// document rebuild.
    pub fn from_parts(
        sections: Vec<crate::models::Section>,
        conflicts: Vec<Conflict>,
        sources: Vec<SourceFragment>,
        dedupe_citations: bool,
    ) -> Self {
        SessionState {
            document: DocumentStore::from_sections(sections, dedupe_citations),
            conflicts: ConflictLedger::from_conflicts(conflicts),
            corpus: SourceCorpus::from_fragments(sources),
            inflight: InFlightTable::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokens_are_monotonic() {
        let mut table = InFlightTable::default();
        let first = table.issue_token();
        let second = table.issue_token();
        assert!(second > first);
    }

    #[test]
    fn test_take_if_current_rejects_stale_tokens() {
        let mut table = InFlightTable::default();
        let stale = table.issue_token();
        let current = table.issue_token();
        table.insert(SectionId::ExecSummary, current, None);

        assert!(table.take_if_current(SectionId::ExecSummary, stale).is_none());
        assert!(table.contains(SectionId::ExecSummary));

        let taken = table.take_if_current(SectionId::ExecSummary, current);
        assert!(taken.is_some());
        assert_eq!(table.len(), 0);
    }

    #[test]
    fn test_take_after_remove_is_none() {
        let mut table = InFlightTable::default();
        let token = table.issue_token();
        table.insert(SectionId::Metrics, token, None);

        assert!(table.remove(SectionId::Metrics).is_some());
        // The completion arriving later finds nothing to settle
        assert!(table.take_if_current(SectionId::Metrics, token).is_none());
    }

    #[test]
    fn test_fresh_state_is_empty() {
        let state = SessionState::new(false);
        assert!(state.conflicts.is_empty());
        assert!(state.corpus.is_empty());
        assert_eq!(state.inflight.len(), 0);
        assert_eq!(state.document.snapshot_counters().section_count, 0);
    }
}
