use std::collections::BTreeSet;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use scholaris_core::DomainError;

/// Base role of an identity. Exactly one per identity and per session.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BaseRole {
    Superadmin,
    Admin,
    Teacher,
    Student,
}

impl BaseRole {
    pub const ALL: [BaseRole; 4] = [
        BaseRole::Superadmin,
        BaseRole::Admin,
        BaseRole::Teacher,
        BaseRole::Student,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            BaseRole::Superadmin => "superadmin",
            BaseRole::Admin => "admin",
            BaseRole::Teacher => "teacher",
            BaseRole::Student => "student",
        }
    }

    /// Superadmins act in global scope; every other role acts inside one school.
    pub fn requires_school(&self) -> bool {
        !matches!(self, BaseRole::Superadmin)
    }
}

impl core::fmt::Display for BaseRole {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BaseRole {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "superadmin" => Ok(BaseRole::Superadmin),
            "admin" => Ok(BaseRole::Admin),
            "teacher" => Ok(BaseRole::Teacher),
            "student" => Ok(BaseRole::Student),
            other => Err(DomainError::validation(format!("unknown role '{other}'"))),
        }
    }
}

/// Set of base roles a capability accepts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoleSet(BTreeSet<BaseRole>);

impl RoleSet {
    pub fn of(roles: &[BaseRole]) -> Self {
        Self(roles.iter().copied().collect())
    }

    pub fn contains(&self, role: BaseRole) -> bool {
        self.0.contains(&role)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = BaseRole> + '_ {
        self.0.iter().copied()
    }
}

impl FromIterator<BaseRole> for RoleSet {
    fn from_iter<I: IntoIterator<Item = BaseRole>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}
