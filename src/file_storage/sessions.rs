//! Session list persistence
//!
//! The full session list (metadata, counters, and the active pointer) lives
//! in a single versioned `sessions.json` under the namespace root. It is
//! loaded once at startup and rewritten atomically on every registry
//! mutation.

use super::{read_json, write_json, FileResult};
use crate::models::Session;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Version of the sessions file format
const SESSIONS_FILE_VERSION: u32 = 1;

/// On-disk shape of the session list
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionsFile {
    /// File format version
    pub version: u32,
    /// When this file was last updated
    pub updated_at: DateTime<Utc>,
    /// Currently active session, if any
    pub active_session_id: Option<String>,
    /// All sessions, newest first
    pub sessions: Vec<Session>,
}

impl Default for SessionsFile {
    fn default() -> Self {
        Self {
            version: SESSIONS_FILE_VERSION,
            updated_at: Utc::now(),
            active_session_id: None,
            sessions: Vec::new(),
        }
    }
}

/// Get the path of the sessions file
pub fn sessions_path(data_root: &Path) -> PathBuf {
    data_root.join("sessions.json")
}

/// Load the session list, returning an empty list if the file does not
/// exist yet
pub fn load_sessions(data_root: &Path) -> FileResult<SessionsFile> {
    let path = sessions_path(data_root);
    if !path.exists() {
        return Ok(SessionsFile::default());
    }
    read_json(&path)
}

/// Save the session list
pub fn save_sessions(
    data_root: &Path,
    active_session_id: Option<&str>,
    sessions: &[Session],
) -> FileResult<()> {
    let file = SessionsFile {
        version: SESSIONS_FILE_VERSION,
        updated_at: Utc::now(),
        active_session_id: active_session_id.map(|id| id.to_string()),
        sessions: sessions.to_vec(),
    };
    write_json(&sessions_path(data_root), &file)?;
    log::debug!(
        "Saved {} session(s) to {:?}",
        sessions.len(),
        sessions_path(data_root)
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_load_missing_file_returns_empty_list() {
        let temp_dir = TempDir::new().unwrap();
        let file = load_sessions(temp_dir.path()).unwrap();
        assert_eq!(file.version, SESSIONS_FILE_VERSION);
        assert!(file.sessions.is_empty());
        assert!(file.active_session_id.is_none());
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let temp_dir = TempDir::new().unwrap();
        let alpha = Session::new("Alpha", "Portal modernization");
        let beta = Session::new("Beta", "Mobile follow-up");

        save_sessions(
            temp_dir.path(),
            Some(&alpha.id),
            &[beta.clone(), alpha.clone()],
        )
        .unwrap();

        let file = load_sessions(temp_dir.path()).unwrap();
        assert_eq!(file.version, SESSIONS_FILE_VERSION);
        assert_eq!(file.active_session_id.as_deref(), Some(alpha.id.as_str()));
        assert_eq!(file.sessions.len(), 2);
        assert_eq!(file.sessions[0].id, beta.id);
        assert_eq!(file.sessions[1].name, "Alpha");
    }

    #[test]
    fn test_save_overwrites_previous_state() {
        let temp_dir = TempDir::new().unwrap();
        let session = Session::new("Alpha", "");
        save_sessions(temp_dir.path(), Some(&session.id), &[session]).unwrap();

        save_sessions(temp_dir.path(), None, &[]).unwrap();

        let file = load_sessions(temp_dir.path()).unwrap();
        assert!(file.sessions.is_empty());
        assert!(file.active_session_id.is_none());
    }
}
