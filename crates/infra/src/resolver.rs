//! Tenant/role resolver.
//!
//! Drives the pure steps in `scholaris_auth::session` against the identity
//! directory. Every directory call is bounded by the configured timeout; a
//! timeout or directory failure surfaces as
//! [`SessionError::ResolutionUnavailable`] and never as a partial session.

use std::future::Future;
use std::time::Duration;

use tracing::{debug, info, warn};

use scholaris_auth::{
    Identity, PendingSelection, PriorSelection, ResolvedSession, SchoolRef, SessionError, Step,
    plan, settle_accounts,
};
use scholaris_core::IdentityId;

use crate::ScholarisConfig;
use crate::directory::{DirectoryError, IdentityDirectory};

/// Result of one resolution cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Resolved(ResolvedSession),
    Pending(PendingSelection),
}

impl Resolution {
    pub fn session(&self) -> Option<&ResolvedSession> {
        match self {
            Resolution::Resolved(session) => Some(session),
            Resolution::Pending(_) => None,
        }
    }

    pub(crate) fn into_step(self) -> Step {
        match self {
            Resolution::Resolved(session) => Step::Resolved(session),
            Resolution::Pending(pending) => Step::Pending(pending),
        }
    }
}

#[derive(Debug)]
pub struct TenantResolver<D> {
    directory: D,
    timeout: Duration,
}

impl<D: IdentityDirectory> TenantResolver<D> {
    pub fn new(directory: D, timeout: Duration) -> Self {
        Self { directory, timeout }
    }

    pub fn from_config(directory: D, config: &ScholarisConfig) -> Self {
        Self::new(directory, config.directory_timeout)
    }

    pub fn directory(&self) -> &D {
        &self.directory
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Resolve `identity` as far as the prior choices allow.
    ///
    /// Calling this again with an unchanged prior selection reproduces the
    /// same session, refreshed from the directory.
    pub async fn resolve(
        &self,
        identity: &Identity,
        prior: &PriorSelection,
    ) -> Result<Resolution, SessionError> {
        let school = match plan(identity, prior) {
            Ok(Step::Resolved(session)) => {
                info!(identity_id = %identity.id, step = "resolved", "global session resolved");
                return Ok(Resolution::Resolved(session));
            }
            Ok(Step::Pending(pending)) => {
                info!(
                    identity_id = %identity.id,
                    step = "choose-school",
                    "school selection required"
                );
                return Ok(Resolution::Pending(pending));
            }
            Ok(Step::FetchAccounts { school }) => school,
            Err(e) => {
                warn!(identity_id = %identity.id, error = %e, "resolution failed");
                return Err(e);
            }
        };

        let candidates = self.sub_accounts(identity, &school).await?;
        let school_id = school.id;
        match settle_accounts(identity, school, candidates, prior.account) {
            Ok(Step::Pending(pending)) => {
                info!(
                    identity_id = %identity.id,
                    school_id = %school_id,
                    accounts = pending.accounts.len(),
                    step = "choose-account",
                    "sub-account selection required"
                );
                Ok(Resolution::Pending(pending))
            }
            Ok(Step::Resolved(session)) => {
                info!(
                    identity_id = %identity.id,
                    school_id = %school_id,
                    acting_id = %session.acting_id(),
                    step = "resolved",
                    "school session resolved"
                );
                Ok(Resolution::Resolved(session))
            }
            Ok(Step::FetchAccounts { .. }) => Err(SessionError::ResolutionUnavailable(
                "sub-accounts were not settled".to_string(),
            )),
            Err(e) => {
                warn!(
                    identity_id = %identity.id,
                    school_id = %school_id,
                    error = %e,
                    "resolution failed"
                );
                Err(e)
            }
        }
    }

    /// Fresh directory record for `id`. `Ok(None)` if it no longer exists.
    pub async fn fetch_identity(&self, id: IdentityId) -> Result<Option<Identity>, SessionError> {
        self.bounded(self.directory.identity(id)).await
    }

    /// Every school known to the directory.
    pub async fn schools(&self) -> Result<Vec<SchoolRef>, SessionError> {
        self.bounded(self.directory.schools()).await
    }

    async fn sub_accounts(
        &self,
        identity: &Identity,
        school: &SchoolRef,
    ) -> Result<Vec<Identity>, SessionError> {
        debug!(identity_id = %identity.id, school_id = %school.id, "fetching sub-accounts");
        self.bounded(
            self.directory
                .users_by_school_and_role(school.id, identity.base_role),
        )
        .await
    }

    async fn bounded<T>(
        &self,
        call: impl Future<Output = Result<T, DirectoryError>>,
    ) -> Result<T, SessionError> {
        match tokio::time::timeout(self.timeout, call).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => {
                warn!(error = %e, "directory call failed");
                Err(SessionError::ResolutionUnavailable(e.to_string()))
            }
            Err(_) => {
                warn!(timeout = ?self.timeout, "directory call timed out");
                Err(SessionError::ResolutionUnavailable(
                    DirectoryError::Timeout(self.timeout).to_string(),
                ))
            }
        }
    }
}
