// In-memory store for one session's sectioned BRD document

use chrono::Utc;

use crate::error::EngineError;
use crate::models::section::{transition_state, GenerationState, Section, SectionId};
use crate::models::{Citation, SessionCounters};

/// Holds the fixed set of sections for one session's document in template
/// order. Manual mutations are rejected while the target section has a
/// generation in flight; the generation lifecycle itself goes through the
/// crate-internal transition methods so content and citations always change
/// together.
#[derive(Debug, Clone)]
pub struct DocumentStore {
    sections: Vec<Section>,
    dedupe_citations: bool,
}

impl Default for DocumentStore {
    fn default() -> Self {
        DocumentStore::new()
    }
}

impl DocumentStore {
    /// Creates a document with every canonical section empty and idle
    pub fn new() -> Self {
        DocumentStore::with_options(false)
    }

    pub fn with_options(dedupe_citations: bool) -> Self {
        DocumentStore {
            sections: SectionId::all().iter().map(|id| Section::new(*id)).collect(),
            dedupe_citations,
        }
    }

    /// Rebuilds a document from persisted sections. Sections are realigned
    /// to template order; any missing section comes back empty. Sections
    /// persisted mid-generation are reset to idle, since in-flight work
    /// cannot survive a restart.
    pub fn from_sections(persisted: Vec<Section>, dedupe_citations: bool) -> Self {
        let mut store = DocumentStore::with_options(dedupe_citations);
        for mut section in persisted {
            if section.generation_state == GenerationState::Generating {
                log::info!(
                    "Section '{}' was generating at shutdown; resetting to idle",
                    section.id
                );
                section.generation_state = GenerationState::Idle;
            }
            let slot = section.id.index();
            store.sections[slot] = section;
        }
        store
    }

    pub fn section(&self, id: SectionId) -> &Section {
        &self.sections[id.index()]
    }

    pub fn sections(&self) -> &[Section] {
        &self.sections
    }

    fn section_mut(&mut self, id: SectionId) -> &mut Section {
        &mut self.sections[id.index()]
    }

    /// Rejects the manual mutation unless the section is free of in-flight
    /// generation work
    fn guard_manual_edit(&self, id: SectionId) -> Result<(), EngineError> {
        let state = self.section(id).generation_state;
        if state == GenerationState::Generating {
            return Err(EngineError::InvalidState { section: id, state });
        }
        Ok(())
    }

    /// Replaces the section's content. Citations are left untouched; the
    /// generation state is left as-is (an error flag stays until the next
    /// generation attempt).
    pub fn update_content(&mut self, id: SectionId, text: impl Into<String>) -> Result<(), EngineError> {
        self.guard_manual_edit(id)?;
        let section = self.section_mut(id);
        section.content = text.into();
        section.last_edited_at = Some(Utc::now());
        Ok(())
    }

    /// Appends a citation. Duplicates (same source id and locator) are kept
    /// unless the store was built with de-duplication enabled.
    pub fn append_citation(&mut self, id: SectionId, citation: Citation) -> Result<(), EngineError> {
        self.guard_manual_edit(id)?;
        let dedupe = self.dedupe_citations;
        let section = self.section_mut(id);
        if dedupe
            && section
                .citations
                .iter()
                .any(|c| c.source_id == citation.source_id && c.locator == citation.locator)
        {
            log::debug!(
                "Skipping duplicate citation {}#{} on section '{}'",
                citation.source_id,
                citation.locator,
                id
            );
            return Ok(());
        }
        section.citations.push(citation);
        Ok(())
    }

    /// Swaps the full citation list in one step
    pub fn replace_citations(&mut self, id: SectionId, citations: Vec<Citation>) -> Result<(), EngineError> {
        self.guard_manual_edit(id)?;
        self.section_mut(id).citations = citations;
        Ok(())
    }

    /// Moves the section into `generating`. Fails with `Busy` when a
    /// generation is already in flight for it.
    pub(crate) fn begin_generation(&mut self, id: SectionId) -> Result<(), EngineError> {
        let state = self.section(id).generation_state;
        let next = transition_state(state, GenerationState::Generating)
            .map_err(|_| EngineError::Busy { section: id })?;
        self.section_mut(id).generation_state = next;
        Ok(())
    }

    /// Applies a completed generation: new content and the full citation
    /// list land together, then the section settles back to idle.
    pub(crate) fn apply_generated(&mut self, id: SectionId, content: String, citations: Vec<Citation>) {
        let section = self.section_mut(id);
        section.content = content;
        section.citations = citations;
        section.last_edited_at = Some(Utc::now());
        section.generation_state = GenerationState::Idle;
    }

    /// Marks the in-flight generation as failed. Content and citations are
    /// left exactly as they were before the attempt.
    pub(crate) fn fail_generation(&mut self, id: SectionId) {
        self.section_mut(id).generation_state = GenerationState::Error;
    }

    /// Returns a cancelled section to idle without touching the document
    pub(crate) fn cancel_generation(&mut self, id: SectionId) {
        self.section_mut(id).generation_state = GenerationState::Idle;
    }

    pub fn generation_state(&self, id: SectionId) -> GenerationState {
        self.section(id).generation_state
    }

    /// Pure aggregate over the current document: sections with non-empty
    /// content, total citations, and whitespace-delimited word count.
    pub fn snapshot_counters(&self) -> SessionCounters {
        let mut counters = SessionCounters::default();
        for section in &self.sections {
            if section.has_content() {
                counters.section_count += 1;
            }
            counters.citation_count += section.citations.len() as u32;
            counters.word_count += section.word_count() as u32;
        }
        counters
    }
}
