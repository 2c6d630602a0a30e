use std::sync::{PoisonError, RwLock};

use scholaris_auth::ResolvedSession;

use super::{PersistedSession, SessionStore, SessionStoreError};

/// In-memory session store for tests/dev.
#[derive(Debug, Default)]
pub struct InMemorySessionStore {
    inner: RwLock<Option<PersistedSession>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the store with an arbitrary record.
    pub fn with_record(record: PersistedSession) -> Self {
        Self {
            inner: RwLock::new(Some(record)),
        }
    }
}

impl SessionStore for InMemorySessionStore {
    fn persist(&self, session: &ResolvedSession) -> Result<(), SessionStoreError> {
        let mut slot = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        *slot = Some(PersistedSession::from_session(session));
        Ok(())
    }

    fn load(&self) -> Result<Option<PersistedSession>, SessionStoreError> {
        let slot = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        Ok(slot.clone())
    }

    fn clear(&self) -> Result<(), SessionStoreError> {
        let mut slot = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        *slot = None;
        Ok(())
    }
}
