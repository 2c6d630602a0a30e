//! Role assignment engine.
//!
//! Special roles are validated locally before anything is sent to the
//! directory. Assign and remove are set operations: a duplicate assignment
//! or the removal of an unheld role is a successful no-op. Effective changes
//! are published on the event bus so active sessions can be marked stale.

use std::collections::BTreeSet;

use chrono::Utc;
use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};

use scholaris_auth::{
    AssignmentError, Identity, SpecialRole, SpecialRoleAssignment, SpecialRoleEvent,
    SpecialRoleKind,
};
use scholaris_core::{IdentityId, SchoolId};
use scholaris_events::EventBus;

use crate::directory::{DirectoryError, SpecialRoleDirectory};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EngineError {
    #[error(transparent)]
    Assignment(#[from] AssignmentError),

    #[error(transparent)]
    Directory(#[from] DirectoryError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AssignmentOutcome {
    Changed,
    /// Already in the requested state.
    Unchanged,
}

impl AssignmentOutcome {
    fn from_changed(changed: bool) -> Self {
        if changed {
            AssignmentOutcome::Changed
        } else {
            AssignmentOutcome::Unchanged
        }
    }
}

/// A teacher together with the special roles they hold.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HolderRoles {
    pub holder: Identity,
    pub special_roles: BTreeSet<SpecialRole>,
}

impl From<Identity> for HolderRoles {
    fn from(holder: Identity) -> Self {
        Self {
            special_roles: holder.special_roles.clone(),
            holder,
        }
    }
}

pub struct RoleAssignmentEngine<D, B> {
    directory: D,
    bus: B,
}

impl<D, B> RoleAssignmentEngine<D, B>
where
    D: SpecialRoleDirectory,
    B: EventBus<SpecialRoleEvent>,
{
    pub fn new(directory: D, bus: B) -> Self {
        Self { directory, bus }
    }

    pub fn directory(&self) -> &D {
        &self.directory
    }

    pub async fn assign(
        &self,
        holder_id: IdentityId,
        kind: SpecialRoleKind,
        department: Option<&str>,
    ) -> Result<AssignmentOutcome, EngineError> {
        let assignment = SpecialRoleAssignment {
            holder_id,
            role: SpecialRole::new(kind, department)?,
        };
        let changed = self.directory.assign_role(&assignment).await?;
        info!(holder_id = %holder_id, role = %assignment.role, changed, "special role assigned");
        if changed {
            self.publish(SpecialRoleEvent::Assigned {
                assignment,
                occurred_at: Utc::now(),
            });
        }
        Ok(AssignmentOutcome::from_changed(changed))
    }

    pub async fn remove(
        &self,
        holder_id: IdentityId,
        kind: SpecialRoleKind,
        department: Option<&str>,
    ) -> Result<AssignmentOutcome, EngineError> {
        let assignment = SpecialRoleAssignment {
            holder_id,
            role: SpecialRole::new(kind, department)?,
        };
        let changed = self.directory.remove_role(&assignment).await?;
        info!(holder_id = %holder_id, role = %assignment.role, changed, "special role removed");
        if changed {
            self.publish(SpecialRoleEvent::Removed {
                assignment,
                occurred_at: Utc::now(),
            });
        }
        Ok(AssignmentOutcome::from_changed(changed))
    }

    /// [`assign`](Self::assign) with the role type given by name, as submitted
    /// by a form. Unknown names fail with `UnknownSpecialRole`.
    pub async fn assign_named(
        &self,
        holder_id: IdentityId,
        kind: &str,
        department: Option<&str>,
    ) -> Result<AssignmentOutcome, EngineError> {
        self.assign(holder_id, kind.parse::<SpecialRoleKind>()?, department).await
    }

    pub async fn remove_named(
        &self,
        holder_id: IdentityId,
        kind: &str,
        department: Option<&str>,
    ) -> Result<AssignmentOutcome, EngineError> {
        self.remove(holder_id, kind.parse::<SpecialRoleKind>()?, department).await
    }

    /// Teachers of `school` holding at least one special role.
    pub async fn list(&self, school: SchoolId) -> Result<Vec<HolderRoles>, EngineError> {
        let holders = self.directory.special_role_holders(school).await?;
        Ok(holders
            .into_iter()
            .filter(|h| !h.special_roles.is_empty())
            .map(HolderRoles::from)
            .collect())
    }

    /// Teachers of `school` holding no special role yet.
    pub async fn eligible(&self, school: SchoolId) -> Result<Vec<Identity>, EngineError> {
        let teachers = self.directory.teachers(school).await?;
        Ok(teachers
            .into_iter()
            .filter(|t| t.special_roles.is_empty())
            .collect())
    }

    fn publish(&self, event: SpecialRoleEvent) {
        let holder_id = event.holder_id();
        if let Err(e) = self.bus.publish(event) {
            warn!(holder_id = %holder_id, error = ?e, "failed to publish special role change");
        }
    }
}
