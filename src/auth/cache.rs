use crate::auth::session::{CachedSession, Session};
use log::{debug, error, warn};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Well-known key the session snapshot is stored under
pub const SESSION_CACHE_KEY: &str = "refugeeai_user";

/// Persisted snapshot of the last known identity.
///
/// Best-effort storage: implementations log failures and never return them.
pub trait SessionCache: Send + Sync {
    fn read(&self) -> Option<CachedSession>;

    /// Store the session's identity, or clear the entry when it has none
    fn write(&self, session: &Session);

    fn clear(&self);
}

/// Session cache backed by a JSON object file, one entry per key
pub struct FileSessionCache {
    path: PathBuf,
}

impl FileSessionCache {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load_entries(&self) -> Map<String, Value> {
        let raw = match std::fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Map::new(),
            Err(e) => {
                warn!("Session cache {} unreadable: {}", self.path.display(), e);
                return Map::new();
            }
        };
        match serde_json::from_str::<Value>(&raw) {
            Ok(Value::Object(entries)) => entries,
            Ok(_) | Err(_) => {
                warn!("Session cache {} is corrupt, starting empty", self.path.display());
                Map::new()
            }
        }
    }

    fn store_entries(&self, entries: &Map<String, Value>) {
        let result = (|| -> std::io::Result<()> {
            if let Some(parent) = self.path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let json = serde_json::to_string_pretty(entries)?;
            std::fs::write(&self.path, json)
        })();

        if let Err(e) = result {
            error!("Failed to write session cache {}: {}", self.path.display(), e);
        }
    }
}

impl SessionCache for FileSessionCache {
    fn read(&self) -> Option<CachedSession> {
        let mut entries = self.load_entries();
        let value = entries.remove(SESSION_CACHE_KEY)?;
        match serde_json::from_value::<CachedSession>(value) {
            Ok(cached) => Some(cached),
            Err(e) => {
                warn!("Ignoring malformed cached session: {}", e);
                None
            }
        }
    }

    fn write(&self, session: &Session) {
        let Some(cached) = CachedSession::of(session) else {
            self.clear();
            return;
        };
        let value = match serde_json::to_value(&cached) {
            Ok(value) => value,
            Err(e) => {
                error!("Failed to serialize session snapshot: {}", e);
                return;
            }
        };
        let mut entries = self.load_entries();
        entries.insert(SESSION_CACHE_KEY.to_string(), value);
        self.store_entries(&entries);
        debug!("Session cache updated");
    }

    fn clear(&self) {
        let mut entries = self.load_entries();
        if entries.remove(SESSION_CACHE_KEY).is_some() {
            self.store_entries(&entries);
            debug!("Session cache cleared");
        }
    }
}

#[derive(Default)]
pub struct MemorySessionCache {
    entry: Mutex<Option<CachedSession>>,
}

impl MemorySessionCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entry(cached: CachedSession) -> Self {
        Self {
            entry: Mutex::new(Some(cached)),
        }
    }

    fn slot(&self) -> std::sync::MutexGuard<'_, Option<CachedSession>> {
        self.entry.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl SessionCache for MemorySessionCache {
    fn read(&self) -> Option<CachedSession> {
        self.slot().clone()
    }

    fn write(&self, session: &Session) {
        *self.slot() = CachedSession::of(session);
    }

    fn clear(&self) {
        *self.slot() = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::session::identity_with_role;
    use crate::types::UserRole;

    #[test]
    fn file_cache_round_trips_under_the_well_known_key() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FileSessionCache::new(dir.path().join("nested").join("cache.json"));
        assert!(cache.read().is_none());

        let identity = identity_with_role(UserRole::Donor);
        cache.write(&Session::authenticated(identity.clone()));
        assert_eq!(cache.read().unwrap().identity, identity);

        let raw: Value = serde_json::from_str(&std::fs::read_to_string(cache.path()).unwrap()).unwrap();
        assert_eq!(raw[SESSION_CACHE_KEY]["identity"]["role"], "donor");
    }

    #[test]
    fn writing_an_anonymous_session_clears_the_entry() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FileSessionCache::new(dir.path().join("cache.json"));
        cache.write(&Session::authenticated(identity_with_role(UserRole::Admin)));
        cache.write(&Session::anonymous());
        assert!(cache.read().is_none());
    }

    #[test]
    fn clear_keeps_unrelated_entries() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.json");
        std::fs::write(&path, r#"{"theme":"dark"}"#).unwrap();

        let cache = FileSessionCache::new(&path);
        cache.write(&Session::authenticated(identity_with_role(UserRole::Volunteer)));
        cache.clear();

        let raw: Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw["theme"], "dark");
        assert!(raw.get(SESSION_CACHE_KEY).is_none());
    }

    #[test]
    fn corrupt_file_reads_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.json");
        std::fs::write(&path, "{not json").unwrap();
        let cache = FileSessionCache::new(&path);
        assert!(cache.read().is_none());

        // and is replaced on the next write
        cache.write(&Session::authenticated(identity_with_role(UserRole::Beneficiary)));
        assert!(cache.read().is_some());
    }

    #[test]
    fn memory_cache_behaves_the_same() {
        let cache = MemorySessionCache::new();
        cache.write(&Session::authenticated(identity_with_role(UserRole::Donor)));
        assert!(cache.read().is_some());
        cache.clear();
        assert!(cache.read().is_none());
    }
}
