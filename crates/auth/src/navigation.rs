//! Route-level guard built on [`authorize`](crate::authorize()).
//!
//! Every functional route declares the roles it accepts; navigation turns the
//! current [`SelectionState`] plus the route into where the client should go.

use serde::{Deserialize, Serialize};

use crate::{
    AuthorizationDecision, RoleSet, SelectionState, SelectionStep, SpecialRoleKind, authorize,
    authorize_special,
};

pub const LOGIN_PATH: &str = "/login";
pub const ACCESS_DENIED_PATH: &str = "/unauthorized";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Route {
    pub path: String,
    /// `None`: any resolved session may enter.
    #[serde(default)]
    pub required_roles: Option<RoleSet>,
    /// Non-empty: the session must also hold one of these special roles.
    #[serde(default)]
    pub required_special_roles: Vec<SpecialRoleKind>,
    /// Reachable without logging in (login page, access-denied page).
    #[serde(default)]
    pub anonymous: bool,
}

impl Route {
    pub fn anonymous(path: impl Into<String>) -> Self {
        Self {
            path: normalize(&path.into()),
            required_roles: None,
            required_special_roles: Vec::new(),
            anonymous: true,
        }
    }

    pub fn public(path: impl Into<String>) -> Self {
        Self {
            anonymous: false,
            ..Self::anonymous(path)
        }
    }

    pub fn for_roles(path: impl Into<String>, roles: RoleSet) -> Self {
        Self {
            required_roles: Some(roles),
            ..Self::public(path)
        }
    }

    pub fn with_special_roles(mut self, kinds: &[SpecialRoleKind]) -> Self {
        self.required_special_roles = kinds.to_vec();
        self
    }

    fn matches(&self, path: &str) -> bool {
        path == self.path
            || self.path == "/"
            || path
                .strip_prefix(self.path.as_str())
                .is_some_and(|rest| rest.starts_with('/'))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NavigationOutcome {
    Render,
    RedirectToLogin,
    AccessDenied,
    /// Session not resolved yet, or the directory is unavailable. Never a denial.
    Loading,
    SelectSchool,
    SelectAccount,
    /// The identity has no school; show the blocking message.
    NoTenant,
    NotFound,
}

impl NavigationOutcome {
    pub fn redirect_path(&self) -> Option<&'static str> {
        match self {
            NavigationOutcome::RedirectToLogin => Some(LOGIN_PATH),
            NavigationOutcome::AccessDenied => Some(ACCESS_DENIED_PATH),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteTable {
    routes: Vec<Route>,
}

impl RouteTable {
    /// A table that already holds the login and access-denied surfaces.
    pub fn new() -> Self {
        Self {
            routes: vec![
                Route::anonymous(LOGIN_PATH),
                Route::anonymous(ACCESS_DENIED_PATH),
            ],
        }
    }

    /// Add or replace the route at `route.path`.
    pub fn with(mut self, route: Route) -> Self {
        self.routes.retain(|r| r.path != route.path);
        self.routes.push(route);
        self
    }

    /// Most specific route for `path` (longest matching prefix).
    pub fn find(&self, path: &str) -> Option<&Route> {
        let path = normalize(path);
        self.routes
            .iter()
            .filter(|r| r.matches(&path))
            .max_by_key(|r| r.path.len())
    }

    pub fn routes(&self) -> &[Route] {
        &self.routes
    }
}

/// Where navigating to `path` leads from `state`.
pub fn navigate(state: &SelectionState, table: &RouteTable, path: &str) -> NavigationOutcome {
    let Some(route) = table.find(path) else {
        return NavigationOutcome::NotFound;
    };

    if route.anonymous {
        return NavigationOutcome::Render;
    }

    let session = match state {
        SelectionState::Anonymous => return NavigationOutcome::RedirectToLogin,
        SelectionState::Unresolved { .. } | SelectionState::Unavailable { .. } => {
            return NavigationOutcome::Loading;
        }
        SelectionState::NoTenant { .. } => return NavigationOutcome::NoTenant,
        SelectionState::Pending { pending, .. } => {
            return match pending.step {
                SelectionStep::ChooseSchool => NavigationOutcome::SelectSchool,
                SelectionStep::ChooseAccount => NavigationOutcome::SelectAccount,
            };
        }
        SelectionState::Resolved(session) => session,
    };

    let mut decision = authorize(Some(session), route.required_roles.as_ref());
    if decision.is_allowed() && !route.required_special_roles.is_empty() {
        decision = authorize_special(Some(session), &route.required_special_roles);
    }

    match decision {
        AuthorizationDecision::Allow => NavigationOutcome::Render,
        AuthorizationDecision::DenyUnauthenticated => NavigationOutcome::RedirectToLogin,
        AuthorizationDecision::DenyForbidden => NavigationOutcome::AccessDenied,
    }
}

fn normalize(path: &str) -> String {
    let trimmed = path.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{trimmed}")
    }
}
