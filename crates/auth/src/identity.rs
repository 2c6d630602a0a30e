//! Identity records as returned by the directory.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use scholaris_core::{IdentityId, SchoolId};

use crate::{BaseRole, SpecialRole};

/// A school (tenant) an identity can act in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchoolRef {
    pub id: SchoolId,
    pub name: String,
    pub code: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contact: Option<String>,
}

impl SchoolRef {
    pub fn new(id: SchoolId, name: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            code: code.into(),
            address: None,
            contact: None,
        }
    }
}

/// An authenticated principal, independent of any one school.
///
/// Sub-accounts share this shape: the directory returns one record per
/// school-scoped profile, linked to the login identity by email.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    pub id: IdentityId,
    #[serde(rename = "role")]
    pub base_role: BaseRole,
    pub email: String,
    pub display_name: String,
    #[serde(default)]
    pub schools: Vec<SchoolRef>,
    #[serde(default)]
    pub special_roles: BTreeSet<SpecialRole>,
}

impl Identity {
    pub fn new(
        id: IdentityId,
        base_role: BaseRole,
        email: impl Into<String>,
        display_name: impl Into<String>,
    ) -> Self {
        Self {
            id,
            base_role,
            email: email.into(),
            display_name: display_name.into(),
            schools: Vec::new(),
            special_roles: BTreeSet::new(),
        }
    }

    pub fn with_school(mut self, school: SchoolRef) -> Self {
        if !self.is_member_of(school.id) {
            self.schools.push(school);
        }
        self
    }

    pub fn with_special_role(mut self, role: SpecialRole) -> Self {
        self.special_roles.insert(role);
        self
    }

    pub fn school(&self, id: SchoolId) -> Option<&SchoolRef> {
        self.schools.iter().find(|s| s.id == id)
    }

    pub fn is_member_of(&self, id: SchoolId) -> bool {
        self.school(id).is_some()
    }

    /// Whether `other` is a profile of the same person (same login email).
    pub fn same_person(&self, other: &Identity) -> bool {
        self.email.trim().eq_ignore_ascii_case(other.email.trim())
    }
}
