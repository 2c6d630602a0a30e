//! File-backed session store.
//!
//! The file holds a JSON object of keys to records, like browser local
//! storage; this store owns the [`SESSION_KEY`] entry and leaves other keys
//! untouched.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde_json::{Map, Value};
use tracing::debug;

use scholaris_auth::ResolvedSession;

use super::{PersistedSession, SESSION_KEY, SessionStore, SessionStoreError};

#[derive(Debug)]
pub struct JsonFileSessionStore {
    path: PathBuf,
    /// Serializes read-modify-write cycles within this process.
    lock: Mutex<()>,
}

impl JsonFileSessionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_map(&self) -> Result<Map<String, Value>, SessionStoreError> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Map::new()),
            Err(e) => return Err(e.into()),
        };
        if raw.trim().is_empty() {
            return Ok(Map::new());
        }
        Ok(serde_json::from_str(&raw)?)
    }

    fn write_map(&self, map: &Map<String, Value>) -> Result<(), SessionStoreError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_vec_pretty(map)?)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

impl SessionStore for JsonFileSessionStore {
    fn persist(&self, session: &ResolvedSession) -> Result<(), SessionStoreError> {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        let mut map = self.read_map()?;
        map.insert(
            SESSION_KEY.to_string(),
            serde_json::to_value(PersistedSession::from_session(session))?,
        );
        self.write_map(&map)?;
        debug!(path = %self.path.display(), "session persisted");
        Ok(())
    }

    fn load(&self) -> Result<Option<PersistedSession>, SessionStoreError> {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        let mut map = self.read_map()?;
        match map.remove(SESSION_KEY) {
            None | Some(Value::Null) => Ok(None),
            Some(value) => Ok(Some(serde_json::from_value(value)?)),
        }
    }

    fn clear(&self) -> Result<(), SessionStoreError> {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        let mut map = self.read_map()?;
        if map.remove(SESSION_KEY).is_some() {
            self.write_map(&map)?;
            debug!(path = %self.path.display(), "session cleared");
        }
        Ok(())
    }
}
