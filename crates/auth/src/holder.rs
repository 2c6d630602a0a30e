//! Special-role holder aggregate.
//!
//! A holder's special roles form a set of `(type, department)` pairs.
//! Assigning a held pair or removing an absent one is accepted and emits no
//! event, so repeated or concurrent submissions converge on the same set.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use scholaris_core::{Aggregate, AggregateRoot, DomainError, IdentityId};
use scholaris_events::Event;

use crate::{BaseRole, Identity, SpecialRole, SpecialRoleAssignment};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpecialRoleHolder {
    pub id: IdentityId,
    pub base_role: BaseRole,
    pub roles: BTreeSet<SpecialRole>,
    pub version: u64,
}

impl SpecialRoleHolder {
    pub fn new(id: IdentityId, base_role: BaseRole) -> Self {
        Self {
            id,
            base_role,
            roles: BTreeSet::new(),
            version: 0,
        }
    }

    pub fn from_identity(identity: &Identity) -> Self {
        Self {
            id: identity.id,
            base_role: identity.base_role,
            roles: identity.special_roles.clone(),
            version: 0,
        }
    }

    pub fn holds(&self, role: &SpecialRole) -> bool {
        self.roles.contains(role)
    }

    fn ensure_holder(&self, holder_id: IdentityId) -> Result<(), DomainError> {
        if holder_id != self.id {
            return Err(DomainError::invariant("holder mismatch"));
        }
        Ok(())
    }
}

impl AggregateRoot for SpecialRoleHolder {
    type Id = IdentityId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SpecialRoleCommand {
    Assign {
        assignment: SpecialRoleAssignment,
        occurred_at: DateTime<Utc>,
    },
    Remove {
        assignment: SpecialRoleAssignment,
        occurred_at: DateTime<Utc>,
    },
}

impl SpecialRoleCommand {
    pub fn assign(holder_id: IdentityId, role: SpecialRole, occurred_at: DateTime<Utc>) -> Self {
        Self::Assign {
            assignment: SpecialRoleAssignment { holder_id, role },
            occurred_at,
        }
    }

    pub fn remove(holder_id: IdentityId, role: SpecialRole, occurred_at: DateTime<Utc>) -> Self {
        Self::Remove {
            assignment: SpecialRoleAssignment { holder_id, role },
            occurred_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SpecialRoleEvent {
    Assigned {
        assignment: SpecialRoleAssignment,
        occurred_at: DateTime<Utc>,
    },
    Removed {
        assignment: SpecialRoleAssignment,
        occurred_at: DateTime<Utc>,
    },
}

impl SpecialRoleEvent {
    pub fn assignment(&self) -> &SpecialRoleAssignment {
        match self {
            SpecialRoleEvent::Assigned { assignment, .. }
            | SpecialRoleEvent::Removed { assignment, .. } => assignment,
        }
    }

    pub fn holder_id(&self) -> IdentityId {
        self.assignment().holder_id
    }
}

impl Event for SpecialRoleEvent {
    fn event_type(&self) -> &'static str {
        match self {
            SpecialRoleEvent::Assigned { .. } => "auth.special_role.assigned",
            SpecialRoleEvent::Removed { .. } => "auth.special_role.removed",
        }
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            SpecialRoleEvent::Assigned { occurred_at, .. }
            | SpecialRoleEvent::Removed { occurred_at, .. } => *occurred_at,
        }
    }
}

impl Aggregate for SpecialRoleHolder {
    type Command = SpecialRoleCommand;
    type Event = SpecialRoleEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            SpecialRoleEvent::Assigned { assignment, .. } => {
                self.roles.insert(assignment.role.clone());
            }
            SpecialRoleEvent::Removed { assignment, .. } => {
                self.roles.remove(&assignment.role);
            }
        }
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            SpecialRoleCommand::Assign {
                assignment,
                occurred_at,
            } => {
                self.ensure_holder(assignment.holder_id)?;
                if self.base_role != BaseRole::Teacher {
                    return Err(DomainError::validation(format!(
                        "special roles can only be held by teachers, not {}",
                        self.base_role
                    )));
                }
                if self.holds(&assignment.role) {
                    return Ok(vec![]);
                }
                Ok(vec![SpecialRoleEvent::Assigned {
                    assignment: assignment.clone(),
                    occurred_at: *occurred_at,
                }])
            }
            SpecialRoleCommand::Remove {
                assignment,
                occurred_at,
            } => {
                self.ensure_holder(assignment.holder_id)?;
                if !self.holds(&assignment.role) {
                    return Ok(vec![]);
                }
                Ok(vec![SpecialRoleEvent::Removed {
                    assignment: assignment.clone(),
                    occurred_at: *occurred_at,
                }])
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SpecialRoleKind;
    use proptest::prelude::*;

    fn teacher() -> SpecialRoleHolder {
        SpecialRoleHolder::new(IdentityId::new(), BaseRole::Teacher)
    }

    #[test]
    fn assign_twice_equals_assign_once() {
        let mut holder = teacher();
        let hod = SpecialRole::hod("Math").unwrap();
        let cmd = SpecialRoleCommand::assign(holder.id, hod.clone(), Utc::now());

        let first = holder.execute(&cmd).unwrap();
        let after_once = holder.roles.clone();
        let second = holder.execute(&cmd).unwrap();

        assert_eq!(first.len(), 1);
        assert!(second.is_empty());
        assert_eq!(holder.roles, after_once);
        assert_eq!(holder.version, 1);
    }

    #[test]
    fn removing_unheld_role_is_a_no_op() {
        let mut holder = teacher();
        let art = SpecialRole::hod("Art").unwrap();
        holder
            .execute(&SpecialRoleCommand::assign(holder.id, art, Utc::now()))
            .unwrap();
        let before = holder.roles.clone();

        let events = holder
            .execute(&SpecialRoleCommand::remove(holder.id, SpecialRole::principal(), Utc::now()))
            .unwrap();

        assert!(events.is_empty());
        assert_eq!(holder.roles, before);
    }

    #[test]
    fn departments_distinguish_hod_roles() {
        let mut holder = teacher();
        for dept in ["Math", "Science"] {
            let hod = SpecialRole::hod(dept).unwrap();
            holder
                .execute(&SpecialRoleCommand::assign(holder.id, hod, Utc::now()))
                .unwrap();
        }
        assert_eq!(holder.roles.len(), 2);

        let math = SpecialRole::hod("Math").unwrap();
        holder
            .execute(&SpecialRoleCommand::remove(holder.id, math, Utc::now()))
            .unwrap();
        assert_eq!(
            holder.roles.iter().collect::<Vec<_>>(),
            vec![&SpecialRole::hod("Science").unwrap()]
        );
    }

    #[test]
    fn only_teachers_receive_special_roles() {
        let holder = SpecialRoleHolder::new(IdentityId::new(), BaseRole::Student);
        let err = holder
            .handle(&SpecialRoleCommand::assign(holder.id, SpecialRole::principal(), Utc::now()))
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn command_for_another_holder_is_rejected() {
        let holder = teacher();
        let err = holder
            .handle(&SpecialRoleCommand::assign(
                IdentityId::new(),
                SpecialRole::principal(),
                Utc::now(),
            ))
            .unwrap_err();
        assert!(err.to_string().contains("holder"));
    }

    #[test]
    fn events_carry_stable_names() {
        let holder = teacher();
        let events = holder
            .handle(&SpecialRoleCommand::assign(holder.id, SpecialRole::principal(), Utc::now()))
            .unwrap();
        assert_eq!(events[0].event_type(), "auth.special_role.assigned");
        assert_eq!(events[0].holder_id(), holder.id);
    }

    fn any_role() -> impl Strategy<Value = SpecialRole> {
        let kinds = vec![
            SpecialRoleKind::Principal,
            SpecialRoleKind::VicePrincipal,
            SpecialRoleKind::Headmistress,
            SpecialRoleKind::Hod,
        ];
        (prop::sample::select(kinds), prop::sample::select(vec!["Math", "Science", "Art"]))
            .prop_map(|(kind, dept)| SpecialRole::new(kind, Some(dept)).unwrap())
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 256,
            ..ProptestConfig::default()
        })]

        /// Property: replaying every command twice yields the same set as
        /// replaying it once.
        #[test]
        fn duplicated_commands_converge(
            ops in prop::collection::vec((any::<bool>(), any_role()), 0..24)
        ) {
            let mut once = teacher();
            let mut twice = once.clone();

            for (assign, role) in ops {
                let cmd = if assign {
                    SpecialRoleCommand::assign(once.id, role, Utc::now())
                } else {
                    SpecialRoleCommand::remove(once.id, role, Utc::now())
                };
                once.execute(&cmd).unwrap();
                twice.execute(&cmd).unwrap();
                twice.execute(&cmd).unwrap();
            }

            prop_assert_eq!(once.roles, twice.roles);
        }
    }
}
