//! Hierarchical special roles layered on top of a teacher's base role.

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use scholaris_core::IdentityId;

#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpecialRoleKind {
    Principal,
    VicePrincipal,
    Headmistress,
    /// Head of department. The only kind scoped to a department.
    Hod,
}

impl SpecialRoleKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SpecialRoleKind::Principal => "principal",
            SpecialRoleKind::VicePrincipal => "vice_principal",
            SpecialRoleKind::Headmistress => "headmistress",
            SpecialRoleKind::Hod => "hod",
        }
    }

    pub fn requires_department(&self) -> bool {
        matches!(self, SpecialRoleKind::Hod)
    }
}

impl core::fmt::Display for SpecialRoleKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SpecialRoleKind {
    type Err = AssignmentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "principal" => Ok(SpecialRoleKind::Principal),
            "vice_principal" => Ok(SpecialRoleKind::VicePrincipal),
            "headmistress" => Ok(SpecialRoleKind::Headmistress),
            "hod" => Ok(SpecialRoleKind::Hod),
            _ => Err(AssignmentError::UnknownSpecialRole(s.to_string())),
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AssignmentError {
    #[error("a department is required for the hod role")]
    MissingDepartment,

    #[error("unknown special role '{0}'")]
    UnknownSpecialRole(String),
}

/// A `(type, department)` pair, the unit of uniqueness in a holder's role set.
///
/// Only constructible through [`SpecialRole::new`], which enforces the
/// department rules: required (non-blank) for `hod`, dropped for every other
/// kind.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawSpecialRole", into = "RawSpecialRole")]
pub struct SpecialRole {
    kind: SpecialRoleKind,
    department: Option<String>,
}

impl SpecialRole {
    pub fn new(kind: SpecialRoleKind, department: Option<&str>) -> Result<Self, AssignmentError> {
        let department = department.map(str::trim).filter(|d| !d.is_empty());

        if !kind.requires_department() {
            return Ok(Self {
                kind,
                department: None,
            });
        }

        match department {
            Some(dept) => Ok(Self {
                kind,
                department: Some(dept.to_string()),
            }),
            None => Err(AssignmentError::MissingDepartment),
        }
    }

    pub fn principal() -> Self {
        Self {
            kind: SpecialRoleKind::Principal,
            department: None,
        }
    }

    pub fn hod(department: &str) -> Result<Self, AssignmentError> {
        Self::new(SpecialRoleKind::Hod, Some(department))
    }

    pub fn kind(&self) -> SpecialRoleKind {
        self.kind
    }

    pub fn department(&self) -> Option<&str> {
        self.department.as_deref()
    }
}

impl core::fmt::Display for SpecialRole {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match &self.department {
            Some(dept) => write!(f, "{}/{}", self.kind, dept),
            None => write!(f, "{}", self.kind),
        }
    }
}

/// Wire shape: `{"type": "hod", "department": "Math"}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct RawSpecialRole {
    #[serde(rename = "type")]
    kind: SpecialRoleKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    department: Option<String>,
}

impl TryFrom<RawSpecialRole> for SpecialRole {
    type Error = AssignmentError;

    fn try_from(raw: RawSpecialRole) -> Result<Self, Self::Error> {
        SpecialRole::new(raw.kind, raw.department.as_deref())
    }
}

impl From<SpecialRole> for RawSpecialRole {
    fn from(role: SpecialRole) -> Self {
        Self {
            kind: role.kind,
            department: role.department,
        }
    }
}

/// A special role bound to the teacher holding it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpecialRoleAssignment {
    pub holder_id: IdentityId,
    #[serde(flatten)]
    pub role: SpecialRole,
}
