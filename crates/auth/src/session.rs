//! Session resolution state machine.
//!
//! An authenticated identity is narrowed into a [`ResolvedSession`] through
//! explicit steps:
//!
//! ```text
//! unresolved ──► choose-school ──► choose-account ──► resolved
//!      │                │                                ▲
//!      └────────────────┴──── (single option: auto) ─────┘
//! ```
//!
//! Transitions are pure. Fetching sub-accounts is the one step that needs the
//! directory, so [`plan`] stops with [`Step::FetchAccounts`] and the caller
//! feeds the fetched records to [`settle_accounts`].

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use scholaris_core::{IdentityId, SchoolId};

use crate::{BaseRole, ClaimsError, Identity, SchoolRef, SpecialRole};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// The identity belongs to no school and its role needs one. Not retryable.
    #[error("no school is available for this account")]
    NoTenantAvailable,

    /// A school or account id that is not among the offered options.
    #[error("invalid selection: {0}")]
    InvalidSelection(String),

    /// The directory could not be reached in time. Retry by resolving again.
    #[error("session resolution unavailable: {0}")]
    ResolutionUnavailable(String),

    #[error("login rejected: {0}")]
    Unauthenticated(#[from] ClaimsError),

    #[error("no selection is pending")]
    NoPendingSelection,
}

/// Choices already made by the user (or restored from the session store).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PriorSelection {
    pub school: Option<SchoolId>,
    pub account: Option<IdentityId>,
}

impl PriorSelection {
    pub fn school(school: SchoolId) -> Self {
        Self {
            school: Some(school),
            account: None,
        }
    }

    pub fn with_account(mut self, account: IdentityId) -> Self {
        self.account = Some(account);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SelectionStep {
    ChooseSchool,
    ChooseAccount,
}

/// Input the resolver needs from the user before it can continue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingSelection {
    pub step: SelectionStep,
    /// Offered schools (`choose-school`).
    pub schools: Vec<SchoolRef>,
    /// School already chosen (`choose-account`).
    pub school: Option<SchoolRef>,
    /// Offered sub-accounts (`choose-account`).
    pub accounts: Vec<Identity>,
}

impl PendingSelection {
    fn choose_school_from(schools: Vec<SchoolRef>) -> Self {
        Self {
            step: SelectionStep::ChooseSchool,
            schools,
            school: None,
            accounts: Vec::new(),
        }
    }

    fn choose_account_from(school: SchoolRef, accounts: Vec<Identity>) -> Self {
        Self {
            step: SelectionStep::ChooseAccount,
            schools: Vec::new(),
            school: Some(school),
            accounts,
        }
    }

    /// Validate a school choice and turn it into the next prior selection.
    pub fn choose_school(&self, school: SchoolId) -> Result<PriorSelection, SessionError> {
        if self.step != SelectionStep::ChooseSchool {
            return Err(SessionError::InvalidSelection(
                "a school has already been chosen".to_string(),
            ));
        }
        if !self.schools.iter().any(|s| s.id == school) {
            return Err(SessionError::InvalidSelection(format!(
                "school {school} is not available"
            )));
        }
        Ok(PriorSelection::school(school))
    }

    /// Validate a sub-account choice and turn it into the next prior selection.
    pub fn choose_account(&self, account: IdentityId) -> Result<PriorSelection, SessionError> {
        let Some(school) = self
            .school
            .as_ref()
            .filter(|_| self.step == SelectionStep::ChooseAccount)
        else {
            return Err(SessionError::InvalidSelection(
                "choose a school first".to_string(),
            ));
        };
        if !self.accounts.iter().any(|a| a.id == account) {
            return Err(SessionError::InvalidSelection(format!(
                "account {account} is not available in school {}",
                school.id
            )));
        }
        Ok(PriorSelection::school(school.id).with_account(account))
    }
}

/// The concrete, unambiguous authorization context of a navigation session.
///
/// # Invariants
/// - `effective_role` is exactly the identity's base role.
/// - `selected_school` is `None` if and only if the role is superadmin.
/// - The selected school is one of the identity's schools.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedSession {
    identity: Identity,
    selected_school: Option<SchoolRef>,
    selected_sub_account: Option<Identity>,
    effective_role: BaseRole,
    effective_special_roles: BTreeSet<SpecialRole>,
}

impl ResolvedSession {
    /// Global-scope session. Only superadmins qualify.
    pub fn global(identity: Identity) -> Result<Self, SessionError> {
        if identity.base_role.requires_school() {
            return Err(SessionError::NoTenantAvailable);
        }
        Ok(Self {
            effective_role: identity.base_role,
            effective_special_roles: BTreeSet::new(),
            selected_school: None,
            selected_sub_account: None,
            identity,
        })
    }

    /// School-scoped session.
    ///
    /// Special roles come from the sub-account when one is selected, since
    /// that record is the school-scoped source of truth.
    pub fn for_school(
        identity: Identity,
        school: SchoolRef,
        sub_account: Option<Identity>,
    ) -> Result<Self, SessionError> {
        if !identity.base_role.requires_school() {
            return Self::global(identity);
        }
        if !identity.is_member_of(school.id) {
            return Err(SessionError::InvalidSelection(format!(
                "school {} is not available",
                school.id
            )));
        }
        if let Some(account) = &sub_account {
            if account.base_role != identity.base_role || !identity.same_person(account) {
                return Err(SessionError::InvalidSelection(format!(
                    "account {} does not belong to this identity",
                    account.id
                )));
            }
        }

        let effective_special_roles = sub_account
            .as_ref()
            .map(|a| a.special_roles.clone())
            .unwrap_or_else(|| identity.special_roles.clone());

        Ok(Self {
            effective_role: identity.base_role,
            effective_special_roles,
            selected_school: Some(school),
            selected_sub_account: sub_account,
            identity,
        })
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn selected_school(&self) -> Option<&SchoolRef> {
        self.selected_school.as_ref()
    }

    pub fn selected_sub_account(&self) -> Option<&Identity> {
        self.selected_sub_account.as_ref()
    }

    pub fn effective_role(&self) -> BaseRole {
        self.effective_role
    }

    pub fn effective_special_roles(&self) -> &BTreeSet<SpecialRole> {
        &self.effective_special_roles
    }

    /// Id of the record that acts in the selected school.
    pub fn acting_id(&self) -> IdentityId {
        self.selected_sub_account
            .as_ref()
            .map(|a| a.id)
            .unwrap_or(self.identity.id)
    }

    /// The choices that reproduce this session when resolved again.
    pub fn prior_selection(&self) -> PriorSelection {
        PriorSelection {
            school: self.selected_school.as_ref().map(|s| s.id),
            account: self.selected_sub_account.as_ref().map(|a| a.id),
        }
    }
}

/// Outcome of one pure resolution step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    Resolved(ResolvedSession),
    Pending(PendingSelection),
    /// The school is settled; fetch its sub-accounts and call [`settle_accounts`].
    FetchAccounts { school: SchoolRef },
}

/// First resolution step: settle the school.
pub fn plan(identity: &Identity, prior: &PriorSelection) -> Result<Step, SessionError> {
    if !identity.base_role.requires_school() {
        return ResolvedSession::global(identity.clone()).map(Step::Resolved);
    }

    if identity.schools.is_empty() {
        return Err(SessionError::NoTenantAvailable);
    }

    if let Some(school_id) = prior.school {
        return match identity.school(school_id) {
            Some(school) => Ok(Step::FetchAccounts {
                school: school.clone(),
            }),
            None => Err(SessionError::InvalidSelection(format!(
                "school {school_id} is not available"
            ))),
        };
    }

    match identity.schools.as_slice() {
        [only] => Ok(Step::FetchAccounts {
            school: only.clone(),
        }),
        many => Ok(Step::Pending(PendingSelection::choose_school_from(
            many.to_vec(),
        ))),
    }
}

/// Second resolution step: settle the sub-account among `candidates`.
///
/// `candidates` is whatever the directory returned for `(school, role)`; only
/// records of the same person and role are kept. When none match, the login
/// identity itself acts in the school.
pub fn settle_accounts(
    identity: &Identity,
    school: SchoolRef,
    candidates: Vec<Identity>,
    prior_account: Option<IdentityId>,
) -> Result<Step, SessionError> {
    let mut accounts: Vec<Identity> = Vec::new();
    for candidate in candidates {
        if candidate.base_role == identity.base_role
            && identity.same_person(&candidate)
            && !accounts.iter().any(|a| a.id == candidate.id)
        {
            accounts.push(candidate);
        }
    }

    if let Some(account_id) = prior_account {
        if let Some(pos) = accounts.iter().position(|a| a.id == account_id) {
            let account = accounts.swap_remove(pos);
            return ResolvedSession::for_school(identity.clone(), school, Some(account))
                .map(Step::Resolved);
        }
        if accounts.is_empty() && account_id == identity.id {
            return ResolvedSession::for_school(identity.clone(), school, None).map(Step::Resolved);
        }
        return Err(SessionError::InvalidSelection(format!(
            "account {account_id} is not available in school {}",
            school.id
        )));
    }

    match accounts.len() {
        0 => ResolvedSession::for_school(identity.clone(), school, None).map(Step::Resolved),
        1 => {
            let account = accounts.pop();
            ResolvedSession::for_school(identity.clone(), school, account).map(Step::Resolved)
        }
        _ => Ok(Step::Pending(PendingSelection::choose_account_from(
            school, accounts,
        ))),
    }
}

/// Where the current navigation session stands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectionState {
    Anonymous,
    /// Authenticated, resolution not finished yet (loading).
    Unresolved { identity: Identity },
    Pending {
        identity: Identity,
        pending: PendingSelection,
    },
    Resolved(ResolvedSession),
    /// The directory failed or timed out; resolving again may succeed.
    Unavailable {
        identity: Identity,
        prior: PriorSelection,
        reason: String,
    },
    /// The identity can never resolve (no school).
    NoTenant { identity: Identity },
}

impl SelectionState {
    pub fn identity(&self) -> Option<&Identity> {
        match self {
            SelectionState::Anonymous => None,
            SelectionState::Unresolved { identity }
            | SelectionState::Pending { identity, .. }
            | SelectionState::Unavailable { identity, .. }
            | SelectionState::NoTenant { identity } => Some(identity),
            SelectionState::Resolved(session) => Some(session.identity()),
        }
    }

    pub fn session(&self) -> Option<&ResolvedSession> {
        match self {
            SelectionState::Resolved(session) => Some(session),
            _ => None,
        }
    }

    pub fn pending(&self) -> Option<&PendingSelection> {
        match self {
            SelectionState::Pending { pending, .. } => Some(pending),
            _ => None,
        }
    }

    /// Authenticated but without a usable answer yet.
    pub fn is_loading(&self) -> bool {
        matches!(
            self,
            SelectionState::Unresolved { .. } | SelectionState::Unavailable { .. }
        )
    }

    /// Fold a resolution outcome for `identity` into a state.
    pub fn from_outcome(
        identity: Identity,
        prior: PriorSelection,
        outcome: Result<Step, SessionError>,
    ) -> Self {
        match outcome {
            Ok(Step::Resolved(session)) => SelectionState::Resolved(session),
            Ok(Step::Pending(pending)) => SelectionState::Pending { identity, pending },
            Ok(Step::FetchAccounts { .. }) => SelectionState::Unresolved { identity },
            Err(SessionError::NoTenantAvailable) => SelectionState::NoTenant { identity },
            Err(SessionError::ResolutionUnavailable(reason)) => SelectionState::Unavailable {
                identity,
                prior,
                reason,
            },
            Err(_) => SelectionState::Unresolved { identity },
        }
    }

    /// Drop an unfinished selection. Nothing durable is touched.
    pub fn abandon(self) -> Self {
        match self {
            SelectionState::Pending { identity, .. } => SelectionState::Unresolved { identity },
            other => other,
        }
    }

    /// Leave the selected school and start over from school selection.
    pub fn switch_school(self) -> Self {
        match self {
            SelectionState::Resolved(session) => SelectionState::Unresolved {
                identity: session.identity,
            },
            other => other.abandon(),
        }
    }

    pub fn logout(self) -> Self {
        SelectionState::Anonymous
    }
}
