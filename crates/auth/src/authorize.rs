use serde::Serialize;

use scholaris_core::{IdentityId, SchoolId};

use crate::{BaseRole, ResolvedSession, RoleSet, SpecialRoleKind};

/// Outcome of a capability check. Never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthorizationDecision {
    Allow,
    DenyUnauthenticated,
    DenyForbidden,
}

impl AuthorizationDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, AuthorizationDecision::Allow)
    }
}

/// Decide whether `session` may use a capability requiring `required`.
///
/// - No IO
/// - No panics
/// - `required == None` marks a public capability
///
/// Callers must handle the loading state (session not yet resolved) before
/// asking; this function only sees "resolved" or "absent".
pub fn authorize(
    session: Option<&ResolvedSession>,
    required: Option<&RoleSet>,
) -> AuthorizationDecision {
    let Some(session) = session else {
        return AuthorizationDecision::DenyUnauthenticated;
    };

    match required {
        None => AuthorizationDecision::Allow,
        Some(roles) if roles.contains(session.effective_role()) => AuthorizationDecision::Allow,
        Some(_) => AuthorizationDecision::DenyForbidden,
    }
}

/// Like [`authorize`], for capabilities reserved to special-role holders.
///
/// Allows when the session holds any of `required` (in any department). An
/// empty `required` slice allows every authenticated session.
pub fn authorize_special(
    session: Option<&ResolvedSession>,
    required: &[SpecialRoleKind],
) -> AuthorizationDecision {
    let Some(session) = session else {
        return AuthorizationDecision::DenyUnauthenticated;
    };

    if required.is_empty()
        || session
            .effective_special_roles()
            .iter()
            .any(|r| required.contains(&r.kind()))
    {
        AuthorizationDecision::Allow
    } else {
        AuthorizationDecision::DenyForbidden
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Authorization Explanation (Audit Trail)
// ─────────────────────────────────────────────────────────────────────────────

/// Why a capability check came out the way it did.
#[derive(Debug, Clone, Serialize)]
pub struct AuthorizationExplanation {
    pub decision: AuthorizationDecision,
    /// `None` for public capabilities.
    pub required_roles: Option<Vec<BaseRole>>,
    pub reason: String,
    pub principal: Option<PrincipalState>,
    pub denial_reason: Option<DenialReason>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PrincipalState {
    pub identity_id: IdentityId,
    pub acting_id: IdentityId,
    pub school_id: Option<SchoolId>,
    pub effective_role: BaseRole,
    pub special_roles: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DenialReason {
    pub kind: DenialKind,
    pub message: String,
    pub suggestions: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DenialKind {
    Unauthenticated,
    RoleMismatch,
}

/// Explain the decision [`authorize`] makes for the same inputs.
pub fn explain(
    session: Option<&ResolvedSession>,
    required: Option<&RoleSet>,
) -> AuthorizationExplanation {
    let decision = authorize(session, required);
    let required_roles = required.map(|r| r.iter().collect::<Vec<_>>());

    let Some(session) = session else {
        return AuthorizationExplanation {
            decision,
            required_roles,
            reason: "No resolved session".to_string(),
            principal: None,
            denial_reason: Some(DenialReason {
                kind: DenialKind::Unauthenticated,
                message: "The request carries no authenticated session".to_string(),
                suggestions: vec!["Log in and select a school before retrying".to_string()],
            }),
        };
    };

    let principal = PrincipalState {
        identity_id: session.identity().id,
        acting_id: session.acting_id(),
        school_id: session.selected_school().map(|s| s.id),
        effective_role: session.effective_role(),
        special_roles: session
            .effective_special_roles()
            .iter()
            .map(|r| r.to_string())
            .collect(),
    };

    let role = session.effective_role();
    if decision.is_allowed() {
        let reason = match required {
            None => "Capability is public".to_string(),
            Some(_) => format!("Role '{role}' is accepted by this capability"),
        };
        return AuthorizationExplanation {
            decision,
            required_roles,
            reason,
            principal: Some(principal),
            denial_reason: None,
        };
    }

    let accepted = required
        .map(|roles| roles.iter().map(|r| r.as_str()).collect::<Vec<_>>().join(", "))
        .unwrap_or_default();

    AuthorizationExplanation {
        decision,
        required_roles,
        reason: format!("Role '{role}' is not among [{accepted}]"),
        principal: Some(principal),
        denial_reason: Some(DenialReason {
            kind: DenialKind::RoleMismatch,
            message: format!("Capability requires one of: {accepted}"),
            suggestions: vec![
                "Log in with an account holding one of the accepted roles".to_string(),
                "Switch to a school where this identity holds an accepted role".to_string(),
            ],
        }),
    }
}
