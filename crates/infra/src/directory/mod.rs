//! Identity directory: the external source of truth for schools, identities
//! and special-role assignments.

pub mod http;
pub mod in_memory;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use scholaris_auth::{BaseRole, Identity, SchoolRef, SpecialRoleAssignment};
use scholaris_core::{IdentityId, SchoolId};

pub use http::HttpDirectory;
pub use in_memory::InMemoryDirectory;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DirectoryError {
    #[error("directory call timed out after {0:?}")]
    Timeout(Duration),

    #[error("network error: {0}")]
    Network(String),

    #[error("API error ({0}): {1}")]
    Api(u16, String),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("not found: {0}")]
    NotFound(String),

    /// The directory refused the request (validation on its side).
    #[error("rejected: {0}")]
    Rejected(String),
}

/// Read side used by session resolution.
#[async_trait]
pub trait IdentityDirectory: Send + Sync {
    /// Every school (tenant listing for global-scope sessions).
    async fn schools(&self) -> Result<Vec<SchoolRef>, DirectoryError>;

    /// Current record for `id`, `None` if it no longer exists.
    async fn identity(&self, id: IdentityId) -> Result<Option<Identity>, DirectoryError>;

    /// All users holding `role` in `school` (sub-account candidates).
    async fn users_by_school_and_role(
        &self,
        school: SchoolId,
        role: BaseRole,
    ) -> Result<Vec<Identity>, DirectoryError>;
}

/// Special-role side used by the assignment engine.
///
/// `assign_role`/`remove_role` are set operations on the holder's roles and
/// report whether the set changed.
#[async_trait]
pub trait SpecialRoleDirectory: Send + Sync {
    async fn teachers(&self, school: SchoolId) -> Result<Vec<Identity>, DirectoryError>;

    async fn special_role_holders(&self, school: SchoolId) -> Result<Vec<Identity>, DirectoryError>;

    async fn assign_role(&self, assignment: &SpecialRoleAssignment) -> Result<bool, DirectoryError>;

    async fn remove_role(&self, assignment: &SpecialRoleAssignment) -> Result<bool, DirectoryError>;
}

#[async_trait]
impl<T> IdentityDirectory for Arc<T>
where
    T: IdentityDirectory + ?Sized,
{
    async fn schools(&self) -> Result<Vec<SchoolRef>, DirectoryError> {
        (**self).schools().await
    }

    async fn identity(&self, id: IdentityId) -> Result<Option<Identity>, DirectoryError> {
        (**self).identity(id).await
    }

    async fn users_by_school_and_role(
        &self,
        school: SchoolId,
        role: BaseRole,
    ) -> Result<Vec<Identity>, DirectoryError> {
        (**self).users_by_school_and_role(school, role).await
    }
}

#[async_trait]
impl<T> SpecialRoleDirectory for Arc<T>
where
    T: SpecialRoleDirectory + ?Sized,
{
    async fn teachers(&self, school: SchoolId) -> Result<Vec<Identity>, DirectoryError> {
        (**self).teachers(school).await
    }

    async fn special_role_holders(
        &self,
        school: SchoolId,
    ) -> Result<Vec<Identity>, DirectoryError> {
        (**self).special_role_holders(school).await
    }

    async fn assign_role(
        &self,
        assignment: &SpecialRoleAssignment,
    ) -> Result<bool, DirectoryError> {
        (**self).assign_role(assignment).await
    }

    async fn remove_role(
        &self,
        assignment: &SpecialRoleAssignment,
    ) -> Result<bool, DirectoryError> {
        (**self).remove_role(assignment).await
    }
}
