//! `scholaris-auth`: pure session resolution and authorization domain.
//!
//! Nothing in this crate performs IO. The infra layer feeds it identities
//! fetched from the directory and drives the transitions.

pub mod authorize;
pub mod claims;
pub mod holder;
pub mod identity;
pub mod navigation;
pub mod roles;
pub mod session;
pub mod special_roles;

pub use authorize::{
    AuthorizationDecision, AuthorizationExplanation, DenialKind, authorize, authorize_special,
    explain,
};
pub use claims::{ClaimsError, Login, LoginClaims, validate_claims};
pub use holder::{SpecialRoleCommand, SpecialRoleEvent, SpecialRoleHolder};
pub use identity::{Identity, SchoolRef};
pub use navigation::{
    ACCESS_DENIED_PATH, LOGIN_PATH, NavigationOutcome, Route, RouteTable, navigate,
};
pub use roles::{BaseRole, RoleSet};
pub use session::{
    PendingSelection, PriorSelection, ResolvedSession, SelectionState, SelectionStep,
    SessionError, Step, plan, settle_accounts,
};
pub use special_roles::{AssignmentError, SpecialRole, SpecialRoleAssignment, SpecialRoleKind};
