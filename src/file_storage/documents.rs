//! Per-session document persistence
//!
//! Each session's document state (sections, conflict ledger, source corpus)
//! is one versioned JSON file at `documents/{session_id}.json`, rewritten
//! atomically after every mutation. Reloading resets any section persisted
//! mid-generation back to idle; in-flight work cannot survive a restart.

use super::{documents_dir, read_json, write_json, FileResult};
use crate::models::section::Section;
use crate::models::{Conflict, SourceFragment};
use crate::state::SessionState;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Version of the document file format
const DOCUMENT_FILE_VERSION: u32 = 1;

/// On-disk shape of one session's document state
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentFile {
    /// File format version
    pub version: u32,
    /// When this file was last updated
    pub updated_at: DateTime<Utc>,
    /// Owning session
    pub session_id: String,
    /// Sections in template order
    pub sections: Vec<Section>,
    /// Conflict ledger contents in detection order
    pub conflicts: Vec<Conflict>,
    /// Ingested source fragments in arrival order
    pub sources: Vec<SourceFragment>,
}

/// Get the file path for a session's document
pub fn document_path(data_root: &Path, session_id: &str) -> PathBuf {
    documents_dir(data_root).join(format!("{}.json", session_id))
}

/// Save a session's document state
pub fn save_document(
    data_root: &Path,
    session_id: &str,
    state: &SessionState,
) -> FileResult<PathBuf> {
    let path = document_path(data_root, session_id);
    let file = DocumentFile {
        version: DOCUMENT_FILE_VERSION,
        updated_at: Utc::now(),
        session_id: session_id.to_string(),
        sections: state.document.sections().to_vec(),
        conflicts: state.conflicts.conflicts().to_vec(),
        sources: state.corpus.fragments().to_vec(),
    };
    write_json(&path, &file)?;
    log::debug!("Saved document for session {} to {:?}", session_id, path);
    Ok(path)
}

/// Load a session's document state, or `None` when nothing was persisted
/// for it yet
pub fn load_document(
    data_root: &Path,
    session_id: &str,
    dedupe_citations: bool,
) -> FileResult<Option<SessionState>> {
    let path = document_path(data_root, session_id);
    if !path.exists() {
        return Ok(None);
    }
    let file: DocumentFile = read_json(&path)?;
    Ok(Some(SessionState::from_parts(
        file.sections,
        file.conflicts,
        file.sources,
        dedupe_citations,
    )))
}

/// Delete a session's document file. Missing files are fine; the session
/// may never have been saved.
pub fn delete_document(data_root: &Path, session_id: &str) -> FileResult<()> {
    let path = document_path(data_root, session_id);
    if path.exists() {
        fs::remove_file(&path)
            .map_err(|e| format!("Failed to delete document file {:?}: {}", path, e))?;
        log::info!("Deleted document file {:?}", path);
    }
    Ok(())
}
