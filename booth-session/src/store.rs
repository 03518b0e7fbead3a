//! Durable key-value storage for the session token and user
//!
//! The session is persisted as two string entries, `token` and `user`.
//! Both are written in one operation so a crash never leaves a token
//! without its user.

use booth_core::{BoothError, BoothResult, ErrorContext};
use std::collections::BTreeMap;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, warn};

/// Entry holding the raw bearer token
pub const TOKEN_KEY: &str = "token";
/// Entry holding the JSON-serialized user
pub const USER_KEY: &str = "user";

/// Storage backend for session entries
pub trait SessionStore: Send + Sync {
    /// Read one entry
    fn get(&self, key: &str) -> BoothResult<Option<String>>;

    /// Write all entries in a single atomic step
    fn set_all(&self, entries: &[(&str, &str)]) -> BoothResult<()>;

    /// Remove the given entries; missing entries are not an error
    fn remove_all(&self, keys: &[&str]) -> BoothResult<()>;
}

/// Session entries kept in one JSON file.
///
/// Writes go to a sibling temp file which is then renamed over the
/// session file, so readers see either the old or the new content.
pub struct FileSessionStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileSessionStore {
    /// File name used inside the data directory
    pub const FILE_NAME: &'static str = "session.json";

    /// Store at `<data_dir>/session.json`. The directory is created on first write.
    pub fn new<P: AsRef<Path>>(data_dir: P) -> Self {
        Self::at_path(data_dir.as_ref().join(Self::FILE_NAME))
    }

    /// Store at an explicit file path
    pub fn at_path<P: Into<PathBuf>>(path: P) -> Self {
        let path = path.into();
        info!("Session storage at: {}", path.display());
        Self {
            path,
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn guard(&self) -> MutexGuard<'_, ()> {
        self.lock.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn read_entries(&self) -> BoothResult<BTreeMap<String, String>> {
        let data = match std::fs::read_to_string(&self.path) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(BTreeMap::new()),
            Err(e) => {
                return Err(BoothError::Storage {
                    message: format!("Failed to read {}: {}", self.path.display(), e),
                    source: Some(Box::new(e)),
                    context: ErrorContext::new("file_session_store").with_operation("read"),
                })
            }
        };

        serde_json::from_str(&data).map_err(|e| BoothError::StorageCorruption {
            message: format!("{} is not a session file: {}", self.path.display(), e),
            context: ErrorContext::new("file_session_store")
                .with_operation("read")
                .with_suggestion("Log in again to replace the stored session"),
        })
    }

    /// Entries to modify; an unreadable file is replaced rather than patched
    fn entries_for_update(&self) -> BTreeMap<String, String> {
        match self.read_entries() {
            Ok(entries) => entries,
            Err(e) => {
                warn!("Replacing unreadable session file: {}", e);
                BTreeMap::new()
            }
        }
    }

    fn write_entries(&self, entries: &BTreeMap<String, String>) -> BoothResult<()> {
        if entries.is_empty() {
            return match std::fs::remove_file(&self.path) {
                Ok(()) => {
                    debug!("Deleted session file: {}", self.path.display());
                    Ok(())
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
                Err(e) => Err(self.write_error("delete", e)),
            };
        }

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| self.write_error("create_dir", e))?;
            }
        }

        let json_data = serde_json::to_string_pretty(entries)?;
        let temp_path = self.path.with_extension("json.tmp");

        std::fs::write(&temp_path, json_data).map_err(|e| self.write_error("write", e))?;
        restrict_permissions(&temp_path);
        std::fs::rename(&temp_path, &self.path).map_err(|e| {
            let _ = std::fs::remove_file(&temp_path);
            self.write_error("rename", e)
        })?;

        debug!("Saved session file: {}", self.path.display());
        Ok(())
    }

    fn write_error(&self, operation: &str, e: std::io::Error) -> BoothError {
        BoothError::Storage {
            message: format!("Failed to {} {}: {}", operation, self.path.display(), e),
            source: Some(Box::new(e)),
            context: ErrorContext::new("file_session_store")
                .with_operation(operation)
                .with_suggestion("Check that the data directory is writable"),
        }
    }
}

#[cfg(unix)]
fn restrict_permissions(path: &Path) {
    use std::os::unix::fs::PermissionsExt;

    // The file holds a bearer token
    if let Err(e) = std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600)) {
        warn!("Could not restrict permissions on {}: {}", path.display(), e);
    }
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Path) {}

impl SessionStore for FileSessionStore {
    fn get(&self, key: &str) -> BoothResult<Option<String>> {
        let _guard = self.guard();
        Ok(self.read_entries()?.remove(key))
    }

    fn set_all(&self, entries: &[(&str, &str)]) -> BoothResult<()> {
        let _guard = self.guard();
        let mut stored = self.entries_for_update();
        for (key, value) in entries {
            stored.insert(key.to_string(), value.to_string());
        }
        self.write_entries(&stored)
    }

    fn remove_all(&self, keys: &[&str]) -> BoothResult<()> {
        let _guard = self.guard();
        let mut stored = self.entries_for_update();
        for key in keys {
            stored.remove(*key);
        }
        self.write_entries(&stored)
    }
}

/// In-process store, for tests and short-lived tools
#[derive(Default)]
pub struct MemorySessionStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-populated store
    pub fn with_entries(entries: &[(&str, &str)]) -> Self {
        let store = Self::new();
        store.entries().extend(
            entries
                .iter()
                .map(|(key, value)| (key.to_string(), value.to_string())),
        );
        store
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<String, String>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl SessionStore for MemorySessionStore {
    fn get(&self, key: &str) -> BoothResult<Option<String>> {
        Ok(self.entries().get(key).cloned())
    }

    fn set_all(&self, entries: &[(&str, &str)]) -> BoothResult<()> {
        let mut stored = self.entries();
        for (key, value) in entries {
            stored.insert(key.to_string(), value.to_string());
        }
        Ok(())
    }

    fn remove_all(&self, keys: &[&str]) -> BoothResult<()> {
        let mut stored = self.entries();
        for key in keys {
            stored.remove(*key);
        }
        Ok(())
    }
}
