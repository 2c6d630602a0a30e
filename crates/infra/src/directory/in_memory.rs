use std::collections::BTreeMap;
use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;
use chrono::Utc;

use scholaris_auth::{
    BaseRole, Identity, SchoolRef, SpecialRoleAssignment, SpecialRoleCommand, SpecialRoleHolder,
};
use scholaris_core::{Aggregate, IdentityId, SchoolId};

use super::{DirectoryError, IdentityDirectory, SpecialRoleDirectory};

#[derive(Debug, Default)]
struct DirectoryState {
    schools: Vec<SchoolRef>,
    identities: BTreeMap<IdentityId, Identity>,
}

/// In-memory directory for tests/dev.
///
/// Role changes go through the [`SpecialRoleHolder`] aggregate under a single
/// write lock, so concurrent assign/remove calls serialize per call.
#[derive(Debug, Default)]
pub struct InMemoryDirectory {
    inner: RwLock<DirectoryState>,
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_school(&self, school: SchoolRef) {
        let mut state = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        state.schools.retain(|s| s.id != school.id);
        state.schools.push(school);
    }

    /// Insert or replace an identity. Its schools are registered as well.
    pub fn upsert_identity(&self, identity: Identity) {
        let mut state = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        for school in &identity.schools {
            if !state.schools.iter().any(|s| s.id == school.id) {
                state.schools.push(school.clone());
            }
        }
        state.identities.insert(identity.id, identity);
    }

    /// Drop `school` from an identity's memberships (revocation).
    pub fn revoke_membership(&self, identity: IdentityId, school: SchoolId) {
        let mut state = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(record) = state.identities.get_mut(&identity) {
            record.schools.retain(|s| s.id != school);
        }
    }

    fn users(&self, school: SchoolId, role: BaseRole) -> Vec<Identity> {
        let state = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        state
            .identities
            .values()
            .filter(|i| i.base_role == role && i.is_member_of(school))
            .cloned()
            .collect()
    }

    fn change_roles(
        &self,
        command: SpecialRoleCommand,
        holder_id: IdentityId,
    ) -> Result<bool, DirectoryError> {
        let mut state = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        let record = state
            .identities
            .get_mut(&holder_id)
            .ok_or_else(|| DirectoryError::NotFound(format!("holder {holder_id}")))?;

        let mut holder = SpecialRoleHolder::from_identity(record);
        let events = holder
            .execute(&command)
            .map_err(|e| DirectoryError::Rejected(e.to_string()))?;

        record.special_roles = holder.roles;
        Ok(!events.is_empty())
    }
}

#[async_trait]
impl IdentityDirectory for InMemoryDirectory {
    async fn schools(&self) -> Result<Vec<SchoolRef>, DirectoryError> {
        let state = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        Ok(state.schools.clone())
    }

    async fn identity(&self, id: IdentityId) -> Result<Option<Identity>, DirectoryError> {
        let state = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        Ok(state.identities.get(&id).cloned())
    }

    async fn users_by_school_and_role(
        &self,
        school: SchoolId,
        role: BaseRole,
    ) -> Result<Vec<Identity>, DirectoryError> {
        Ok(self.users(school, role))
    }
}

#[async_trait]
impl SpecialRoleDirectory for InMemoryDirectory {
    async fn teachers(&self, school: SchoolId) -> Result<Vec<Identity>, DirectoryError> {
        Ok(self.users(school, BaseRole::Teacher))
    }

    async fn special_role_holders(
        &self,
        school: SchoolId,
    ) -> Result<Vec<Identity>, DirectoryError> {
        Ok(self
            .users(school, BaseRole::Teacher)
            .into_iter()
            .filter(|t| !t.special_roles.is_empty())
            .collect())
    }

    async fn assign_role(
        &self,
        assignment: &SpecialRoleAssignment,
    ) -> Result<bool, DirectoryError> {
        self.change_roles(
            SpecialRoleCommand::assign(assignment.holder_id, assignment.role.clone(), Utc::now()),
            assignment.holder_id,
        )
    }

    async fn remove_role(
        &self,
        assignment: &SpecialRoleAssignment,
    ) -> Result<bool, DirectoryError> {
        self.change_roles(
            SpecialRoleCommand::remove(assignment.holder_id, assignment.role.clone(), Utc::now()),
            assignment.holder_id,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scholaris_auth::SpecialRole;

    fn school() -> SchoolRef {
        SchoolRef::new(SchoolId::new(), "North", "N01")
    }

    #[tokio::test]
    async fn users_are_filtered_by_school_and_role() {
        let dir = InMemoryDirectory::new();
        let north = school();
        let south = SchoolRef::new(SchoolId::new(), "South", "S01");
        let t1 = Identity::new(IdentityId::new(), BaseRole::Teacher, "a@x.io", "A")
            .with_school(north.clone());
        let t2 = Identity::new(IdentityId::new(), BaseRole::Teacher, "b@x.io", "B")
            .with_school(south.clone());
        let s1 = Identity::new(IdentityId::new(), BaseRole::Student, "c@x.io", "C")
            .with_school(north.clone());
        for i in [&t1, &t2, &s1] {
            dir.upsert_identity(i.clone());
        }

        let found = dir.users_by_school_and_role(north.id, BaseRole::Teacher).await.unwrap();
        assert_eq!(found, vec![t1]);
        assert_eq!(dir.schools().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn role_changes_report_whether_anything_changed() {
        let dir = InMemoryDirectory::new();
        let teacher = Identity::new(IdentityId::new(), BaseRole::Teacher, "a@x.io", "A")
            .with_school(school());
        dir.upsert_identity(teacher.clone());

        let assignment = SpecialRoleAssignment {
            holder_id: teacher.id,
            role: SpecialRole::hod("Math").unwrap(),
        };
        assert!(dir.assign_role(&assignment).await.unwrap());
        assert!(!dir.assign_role(&assignment).await.unwrap());
        assert!(dir.remove_role(&assignment).await.unwrap());
        assert!(!dir.remove_role(&assignment).await.unwrap());
    }

    #[tokio::test]
    async fn unknown_holder_is_not_found() {
        let dir = InMemoryDirectory::new();
        let assignment = SpecialRoleAssignment {
            holder_id: IdentityId::new(),
            role: SpecialRole::principal(),
        };
        assert!(matches!(
            dir.assign_role(&assignment).await,
            Err(DirectoryError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn non_teacher_holder_is_rejected() {
        let dir = InMemoryDirectory::new();
        let admin = Identity::new(IdentityId::new(), BaseRole::Admin, "a@x.io", "A")
            .with_school(school());
        dir.upsert_identity(admin.clone());
        let assignment = SpecialRoleAssignment {
            holder_id: admin.id,
            role: SpecialRole::principal(),
        };
        assert!(matches!(
            dir.assign_role(&assignment).await,
            Err(DirectoryError::Rejected(_))
        ));
    }
}
