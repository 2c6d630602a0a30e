//! Client-local persistence of the selected school.
//!
//! Only the choices are stored, never the roles: a restored session is always
//! re-resolved against a freshly fetched identity.

pub mod in_memory;
pub mod json_file;

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use scholaris_auth::{Identity, PriorSelection, ResolvedSession, SchoolRef};
use scholaris_core::IdentityId;

pub use in_memory::InMemorySessionStore;
pub use json_file::JsonFileSessionStore;

/// Fixed key the session record is stored under.
pub const SESSION_KEY: &str = "selectedSchool";

#[derive(Debug, Error)]
pub enum SessionStoreError {
    #[error("session store IO failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("session record is malformed: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedSession {
    pub identity_id: IdentityId,
    /// `None` for global-scope (superadmin) sessions.
    pub selected_school: Option<SchoolRef>,
    #[serde(default)]
    pub sub_account_id: Option<IdentityId>,
}

impl PersistedSession {
    pub fn from_session(session: &ResolvedSession) -> Self {
        Self {
            identity_id: session.identity().id,
            selected_school: session.selected_school().cloned(),
            sub_account_id: session.selected_sub_account().map(|a| a.id),
        }
    }

    /// Choices to resume with, if they still hold for `fresh`.
    ///
    /// Returns `None` when the record belongs to someone else or the stored
    /// school is no longer among the identity's schools.
    pub fn revalidate(&self, fresh: &Identity) -> Option<PriorSelection> {
        if self.identity_id != fresh.id {
            return None;
        }
        match &self.selected_school {
            Some(school) if fresh.is_member_of(school.id) => Some(PriorSelection {
                school: Some(school.id),
                account: self.sub_account_id,
            }),
            Some(_) => None,
            None if !fresh.base_role.requires_school() => Some(PriorSelection::default()),
            None => None,
        }
    }
}

pub trait SessionStore: Send + Sync {
    fn persist(&self, session: &ResolvedSession) -> Result<(), SessionStoreError>;

    fn load(&self) -> Result<Option<PersistedSession>, SessionStoreError>;

    fn clear(&self) -> Result<(), SessionStoreError>;
}

impl<S> SessionStore for Arc<S>
where
    S: SessionStore + ?Sized,
{
    fn persist(&self, session: &ResolvedSession) -> Result<(), SessionStoreError> {
        (**self).persist(session)
    }

    fn load(&self) -> Result<Option<PersistedSession>, SessionStoreError> {
        (**self).load()
    }

    fn clear(&self) -> Result<(), SessionStoreError> {
        (**self).clear()
    }
}
