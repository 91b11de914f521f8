//! File-based persistence for the engine's namespace directory
//!
//! Everything durable lives as pretty-printed, versioned JSON under one
//! namespace root: `sessions.json` for the session list and one file per
//! session under `documents/`. Writes go through a temp file and rename so
//! a crash never leaves a half-written file, and the whole namespace is
//! guarded by an exclusive advisory lock for the life of the process.

pub mod documents;
pub mod sessions;

use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

use fs2::FileExt;

/// Result type for file operations
pub type FileResult<T> = Result<T, String>;

/// Default namespace root under the platform-local data directory
pub fn default_data_root() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("brd-engine")
}

/// Directory holding per-session document files
pub fn documents_dir(data_root: &Path) -> PathBuf {
    data_root.join("documents")
}

/// Create the namespace directory structure if needed
pub fn init_data_root(data_root: &Path) -> FileResult<()> {
    ensure_dir(data_root)?;
    ensure_dir(&documents_dir(data_root))
}

/// Ensure a directory exists, creating parents as needed
pub fn ensure_dir(path: &Path) -> FileResult<()> {
    fs::create_dir_all(path).map_err(|e| format!("Failed to create directory {:?}: {}", path, e))
}

/// Write content to a file atomically (write to temp file, then rename)
pub fn atomic_write(path: &Path, content: &str) -> FileResult<()> {
    let tmp_path = path.with_extension("json.tmp");
    fs::write(&tmp_path, content)
        .map_err(|e| format!("Failed to write temp file {:?}: {}", tmp_path, e))?;
    fs::rename(&tmp_path, path)
        .map_err(|e| format!("Failed to move {:?} into place: {}", tmp_path, e))
}

/// Read and deserialize a JSON file
pub fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> FileResult<T> {
    let content =
        fs::read_to_string(path).map_err(|e| format!("Failed to read {:?}: {}", path, e))?;
    serde_json::from_str(&content).map_err(|e| format!("Failed to parse {:?}: {}", path, e))
}

/// Serialize and atomically write a JSON file, creating parent directories
pub fn write_json<T: serde::Serialize>(path: &Path, value: &T) -> FileResult<()> {
    if let Some(parent) = path.parent() {
        ensure_dir(parent)?;
    }
    let content = serde_json::to_string_pretty(value)
        .map_err(|e| format!("Failed to serialize {:?}: {}", path, e))?;
    atomic_write(path, &content)
}

/// Exclusive advisory lock over a namespace root. Held for the lifetime of
/// the value; a second process (or a second engine in the same process)
/// acquiring the same namespace fails immediately instead of corrupting
/// files behind the first one's back.
#[derive(Debug)]
pub struct NamespaceLock {
    file: File,
    path: PathBuf,
}

impl NamespaceLock {
    pub fn acquire(data_root: &Path) -> FileResult<NamespaceLock> {
        ensure_dir(data_root)?;
        let path = data_root.join(".lock");
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .open(&path)
            .map_err(|e| format!("Failed to open lock file {:?}: {}", path, e))?;
        file.try_lock_exclusive().map_err(|e| {
            format!(
                "Namespace {:?} is already locked by another engine instance: {}",
                data_root, e
            )
        })?;
        log::debug!("Acquired namespace lock at {:?}", path);
        Ok(NamespaceLock { file, path })
    }
}

impl Drop for NamespaceLock {
    fn drop(&mut self) {
        if let Err(e) = self.file.unlock() {
            log::warn!("Failed to release namespace lock {:?}: {}", self.path, e);
        }
    }
}
