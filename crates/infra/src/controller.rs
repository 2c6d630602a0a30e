//! Session controller: owns one navigation session's [`SelectionState`].
//!
//! Resolution runs without holding the state lock. Each operation that starts
//! a resolution takes a new generation number; an outcome whose generation
//! is no longer current (the selection was abandoned, switched or logged out
//! meanwhile) is discarded. Observers therefore only ever see the previous
//! state or the new one.

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use scholaris_auth::{
    AuthorizationDecision, Identity, Login, NavigationOutcome, PriorSelection, ResolvedSession,
    RoleSet, RouteTable, SchoolRef, SelectionState, SessionError, authorize, navigate,
};
use scholaris_core::{IdentityId, SchoolId};

use crate::directory::IdentityDirectory;
use crate::resolver::{Resolution, TenantResolver};
use crate::session_store::SessionStore;
use crate::tracker::SessionTracker;

pub struct SessionController<D, S> {
    resolver: TenantResolver<D>,
    store: S,
    tracker: Option<SessionTracker>,
    routes: RouteTable,
    state: RwLock<SelectionState>,
    generation: AtomicU64,
}

impl<D, S> SessionController<D, S>
where
    D: IdentityDirectory,
    S: SessionStore,
{
    pub fn new(resolver: TenantResolver<D>, store: S, routes: RouteTable) -> Self {
        Self {
            resolver,
            store,
            tracker: None,
            routes,
            state: RwLock::new(SelectionState::Anonymous),
            generation: AtomicU64::new(0),
        }
    }

    /// Track special-role changes so [`refresh_if_stale`](Self::refresh_if_stale) can react.
    pub fn with_tracker(mut self, tracker: SessionTracker) -> Self {
        self.tracker = Some(tracker);
        self
    }

    pub fn resolver(&self) -> &TenantResolver<D> {
        &self.resolver
    }

    pub fn routes(&self) -> &RouteTable {
        &self.routes
    }

    pub async fn state(&self) -> SelectionState {
        self.state.read().await.clone()
    }

    pub async fn session(&self) -> Option<ResolvedSession> {
        self.state.read().await.session().cloned()
    }

    /// Authenticate and resolve, resuming a persisted selection when it still holds.
    pub async fn login(
        &self,
        login: Login,
        now: DateTime<Utc>,
    ) -> Result<SelectionState, SessionError> {
        let generation = self.next_generation();
        if let Err(e) = login.validate(now) {
            warn!(identity_id = %login.identity.id, error = %e, "login rejected");
            *self.state.write().await = SelectionState::Anonymous;
            return Err(e.into());
        }

        let identity = login.identity;
        info!(identity_id = %identity.id, role = identity.base_role.as_str(), "login accepted");
        *self.state.write().await = SelectionState::Unresolved {
            identity: identity.clone(),
        };

        let identity = match self.fresh_identity(&identity).await {
            Ok(fresh) => fresh,
            Err(e) => {
                return self
                    .apply(generation, identity, PriorSelection::default(), Err(e))
                    .await;
            }
        };
        let prior = self.restored_selection(&identity);
        self.resume(generation, identity, prior).await
    }

    pub async fn choose_school(&self, school: SchoolId) -> Result<SelectionState, SessionError> {
        let (identity, prior) = {
            let state = self.state.read().await;
            let (Some(identity), Some(pending)) = (state.identity(), state.pending()) else {
                return Err(SessionError::NoPendingSelection);
            };
            (identity.clone(), pending.choose_school(school)?)
        };
        debug!(identity_id = %identity.id, school_id = %school, "school chosen");
        let generation = self.next_generation();
        self.run(generation, identity, prior).await
    }

    pub async fn choose_account(
        &self,
        account: IdentityId,
    ) -> Result<SelectionState, SessionError> {
        let (identity, prior) = {
            let state = self.state.read().await;
            let (Some(identity), Some(pending)) = (state.identity(), state.pending()) else {
                return Err(SessionError::NoPendingSelection);
            };
            (identity.clone(), pending.choose_account(account)?)
        };
        debug!(identity_id = %identity.id, account_id = %account, "sub-account chosen");
        let generation = self.next_generation();
        self.run(generation, identity, prior).await
    }

    /// Resolve again after an unavailable directory or an abandoned selection.
    pub async fn retry(&self) -> Result<SelectionState, SessionError> {
        let (identity, prior) = match &*self.state.read().await {
            SelectionState::Unavailable {
                identity, prior, ..
            } => (identity.clone(), *prior),
            SelectionState::Unresolved { identity } => {
                (identity.clone(), PriorSelection::default())
            }
            other => return Ok(other.clone()),
        };
        let generation = self.next_generation();
        let identity = match self.fresh_identity(&identity).await {
            Ok(fresh) => fresh,
            Err(e) => return self.apply(generation, identity, prior, Err(e)).await,
        };
        // A login that never reached the store still has a selection to resume.
        let prior = if prior == PriorSelection::default() {
            self.restored_selection(&identity)
        } else {
            prior
        };
        self.resume(generation, identity, prior).await
    }

    /// Re-resolve the current session from the directory with the same choices.
    ///
    /// Picks up special-role changes and revoked memberships. Until this runs,
    /// a session keeps the authorization it was resolved with.
    pub async fn refresh(&self) -> Result<SelectionState, SessionError> {
        let Some(session) = self.session().await else {
            return Ok(self.state().await);
        };
        let generation = self.next_generation();
        let prior = session.prior_selection();
        let identity = match self.fresh_identity(session.identity()).await {
            Ok(fresh) => fresh,
            Err(e) => {
                warn!(identity_id = %session.identity().id, error = %e, "refresh unavailable");
                let identity = session.identity().clone();
                return self.apply(generation, identity, prior, Err(e)).await;
            }
        };
        info!(identity_id = %identity.id, "refreshing session");
        let state = self.resume(generation, identity, prior).await?;
        if let (Some(tracker), Some(fresh)) = (&self.tracker, state.session()) {
            tracker.mark_fresh(&session);
            tracker.mark_fresh(fresh);
        }
        Ok(state)
    }

    /// Refresh when a special-role change touched this session. Returns whether it did.
    pub async fn refresh_if_stale(&self) -> Result<bool, SessionError> {
        let Some(tracker) = &self.tracker else {
            return Ok(false);
        };
        let stale = match self.session().await {
            Some(session) => tracker.is_stale(&session),
            None => false,
        };
        if stale {
            self.refresh().await?;
        }
        Ok(stale)
    }

    /// Drop an unfinished selection and any resolution in flight.
    pub async fn abandon(&self) -> SelectionState {
        self.next_generation();
        let mut state = self.state.write().await;
        let next = std::mem::replace(&mut *state, SelectionState::Anonymous).abandon();
        *state = next.clone();
        next
    }

    /// Forget the selected school and start over from school selection.
    pub async fn switch_school(&self) -> Result<SelectionState, SessionError> {
        let generation = self.next_generation();
        self.clear_store();
        let identity = {
            let mut state = self.state.write().await;
            let next = std::mem::replace(&mut *state, SelectionState::Anonymous).switch_school();
            *state = next;
            match state.identity() {
                Some(identity) => identity.clone(),
                None => return Ok(state.clone()),
            }
        };
        info!(identity_id = %identity.id, "switching school");
        self.run(generation, identity, PriorSelection::default()).await
    }

    pub async fn logout(&self) {
        self.next_generation();
        self.clear_store();
        let mut state = self.state.write().await;
        if let Some(identity) = state.identity() {
            info!(identity_id = %identity.id, "logged out");
        }
        let next = std::mem::replace(&mut *state, SelectionState::Anonymous).logout();
        *state = next;
    }

    pub async fn navigate(&self, path: &str) -> NavigationOutcome {
        let state = self.state.read().await;
        let outcome = navigate(&state, &self.routes, path);
        if matches!(
            outcome,
            NavigationOutcome::AccessDenied | NavigationOutcome::RedirectToLogin
        ) {
            debug!(
                path,
                identity_id = ?state.identity().map(|i| i.id),
                outcome = ?outcome,
                "navigation denied"
            );
        }
        outcome
    }

    /// Guard decision for the current state.
    ///
    /// `None` while the session is loading, awaiting a selection or blocked
    /// without a school: callers show that state instead of a denial.
    pub async fn authorize(&self, required: Option<&RoleSet>) -> Option<AuthorizationDecision> {
        match &*self.state.read().await {
            SelectionState::Anonymous => Some(authorize(None, required)),
            SelectionState::Resolved(session) => Some(authorize(Some(session), required)),
            _ => None,
        }
    }

    /// Schools the current session may see: every school for a global-scope
    /// session, the identity's own schools otherwise.
    pub async fn tenant_listing(&self) -> Result<Vec<SchoolRef>, SessionError> {
        let state = self.state().await;
        match state.session() {
            Some(session) if session.selected_school().is_none() => self.resolver.schools().await,
            _ => Ok(state
                .identity()
                .map(|i| i.schools.clone())
                .unwrap_or_default()),
        }
    }

    fn next_generation(&self) -> u64 {
        self.generation.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn is_current(&self, generation: u64) -> bool {
        self.generation.load(Ordering::SeqCst) == generation
    }

    /// The directory's current record, or `identity` itself if the directory
    /// does not know it.
    async fn fresh_identity(&self, identity: &Identity) -> Result<Identity, SessionError> {
        Ok(self
            .resolver
            .fetch_identity(identity.id)
            .await?
            .unwrap_or_else(|| identity.clone()))
    }

    fn restored_selection(&self, identity: &Identity) -> PriorSelection {
        let record = match self.store.load() {
            Ok(Some(record)) => record,
            Ok(None) => return PriorSelection::default(),
            Err(e) => {
                warn!(error = %e, "ignoring unreadable session record");
                return PriorSelection::default();
            }
        };
        match record.revalidate(identity) {
            Some(prior) => {
                debug!(identity_id = %identity.id, "resuming persisted selection");
                prior
            }
            None => {
                info!(identity_id = %identity.id, "persisted selection no longer valid");
                self.clear_store();
                PriorSelection::default()
            }
        }
    }

    /// Resolve with `prior`, falling back to a fresh selection when the
    /// remembered choices are no longer offered.
    async fn resume(
        &self,
        generation: u64,
        identity: Identity,
        prior: PriorSelection,
    ) -> Result<SelectionState, SessionError> {
        let mut outcome = self.resolver.resolve(&identity, &prior).await;
        let mut prior = prior;
        if matches!(outcome, Err(SessionError::InvalidSelection(_)))
            && prior != PriorSelection::default()
        {
            info!(identity_id = %identity.id, "remembered selection rejected, starting over");
            self.clear_store();
            prior = PriorSelection::default();
            outcome = self.resolver.resolve(&identity, &prior).await;
        }
        self.apply(generation, identity, prior, outcome).await
    }

    async fn run(
        &self,
        generation: u64,
        identity: Identity,
        prior: PriorSelection,
    ) -> Result<SelectionState, SessionError> {
        let outcome = self.resolver.resolve(&identity, &prior).await;
        self.apply(generation, identity, prior, outcome).await
    }

    async fn apply(
        &self,
        generation: u64,
        identity: Identity,
        prior: PriorSelection,
        outcome: Result<Resolution, SessionError>,
    ) -> Result<SelectionState, SessionError> {
        let mut state = self.state.write().await;
        if !self.is_current(generation) {
            debug!(identity_id = %identity.id, "discarding superseded resolution");
            return Ok(state.clone());
        }

        match outcome {
            Ok(resolution) => {
                if let Resolution::Resolved(session) = &resolution {
                    if let Err(e) = self.store.persist(session) {
                        warn!(identity_id = %identity.id, error = %e, "failed to persist session");
                    }
                    if let Some(tracker) = &self.tracker {
                        tracker.watch(session);
                    }
                }
                *state = SelectionState::from_outcome(identity, prior, Ok(resolution.into_step()));
                Ok(state.clone())
            }
            // A rejected choice leaves the offered options in place.
            Err(e @ SessionError::InvalidSelection(_)) if state.pending().is_some() => Err(e),
            Err(e) => {
                *state = SelectionState::from_outcome(identity, prior, Err(e.clone()));
                Err(e)
            }
        }
    }

    fn clear_store(&self) {
        if let Err(e) = self.store.clear() {
            warn!(error = %e, "failed to clear session store");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use chrono::Duration as ChronoDuration;
    use scholaris_auth::{BaseRole, LoginClaims, Route, SelectionStep};
    use std::time::Duration;

    use crate::directory::InMemoryDirectory;
    use crate::session_store::InMemorySessionStore;

    type Controller = SessionController<Arc<InMemoryDirectory>, Arc<InMemorySessionStore>>;

    fn login_for(identity: &Identity) -> Login {
        let now = Utc::now();
        Login {
            identity: identity.clone(),
            token: "token".to_string(),
            claims: LoginClaims {
                sub: identity.id,
                role: identity.base_role,
                issued_at: now - ChronoDuration::minutes(1),
                expires_at: now + ChronoDuration::hours(1),
            },
        }
    }

    fn controller(dir: Arc<InMemoryDirectory>, store: Arc<InMemorySessionStore>) -> Controller {
        let routes = RouteTable::new()
            .with(Route::for_roles("/admin", RoleSet::of(&[BaseRole::Admin])))
            .with(Route::public("/dashboard"));
        SessionController::new(TenantResolver::new(dir, Duration::from_millis(200)), store, routes)
    }

    fn school(name: &str) -> SchoolRef {
        SchoolRef::new(SchoolId::new(), name, name.to_uppercase())
    }

    #[tokio::test]
    async fn expired_login_stays_anonymous() {
        let dir = Arc::new(InMemoryDirectory::new());
        let ctl = controller(dir, Arc::new(InMemorySessionStore::new()));
        let admin = Identity::new(IdentityId::new(), BaseRole::Admin, "a@x.io", "A")
            .with_school(school("north"));
        let mut login = login_for(&admin);
        login.claims.expires_at = Utc::now() - ChronoDuration::minutes(5);

        let err = ctl.login(login, Utc::now()).await.unwrap_err();
        assert!(matches!(err, SessionError::Unauthenticated(_)));
        assert_eq!(ctl.state().await, SelectionState::Anonymous);
        assert_eq!(ctl.navigate("/dashboard").await, NavigationOutcome::RedirectToLogin);
    }

    #[tokio::test]
    async fn single_school_login_resolves_and_persists() {
        let dir = Arc::new(InMemoryDirectory::new());
        let store = Arc::new(InMemorySessionStore::new());
        let north = school("north");
        let admin = Identity::new(IdentityId::new(), BaseRole::Admin, "a@x.io", "A")
            .with_school(north.clone());
        dir.upsert_identity(admin.clone());
        let ctl = controller(dir, store.clone());

        ctl.login(login_for(&admin), Utc::now()).await.unwrap();

        let record = store.load().unwrap().unwrap();
        assert_eq!(record.selected_school.map(|s| s.id), Some(north.id));
        assert_eq!(ctl.navigate("/admin").await, NavigationOutcome::Render);
        assert_eq!(
            ctl.authorize(Some(&RoleSet::of(&[BaseRole::Teacher]))).await,
            Some(AuthorizationDecision::DenyForbidden)
        );
    }

    #[tokio::test]
    async fn multi_school_login_waits_for_a_choice() {
        let dir = Arc::new(InMemoryDirectory::new());
        let north = school("north");
        let south = school("south");
        let teacher = Identity::new(IdentityId::new(), BaseRole::Teacher, "t@x.io", "T")
            .with_school(north.clone())
            .with_school(south);
        dir.upsert_identity(teacher.clone());
        let ctl = controller(dir, Arc::new(InMemorySessionStore::new()));

        let state = ctl.login(login_for(&teacher), Utc::now()).await.unwrap();
        assert_eq!(state.pending().map(|p| p.step), Some(SelectionStep::ChooseSchool));
        assert_eq!(ctl.navigate("/dashboard").await, NavigationOutcome::SelectSchool);
        assert_eq!(ctl.authorize(None).await, None);

        let err = ctl.choose_school(SchoolId::new()).await.unwrap_err();
        assert!(matches!(err, SessionError::InvalidSelection(_)));
        assert!(ctl.state().await.pending().is_some());

        let state = ctl.choose_school(north.id).await.unwrap();
        assert_eq!(
            state.session().and_then(|s| s.selected_school()).map(|s| s.id),
            Some(north.id)
        );
    }

    #[tokio::test]
    async fn persisted_school_is_dropped_after_revocation() {
        let dir = Arc::new(InMemoryDirectory::new());
        let store = Arc::new(InMemorySessionStore::new());
        let north = school("north");
        let south = school("south");
        let teacher = Identity::new(IdentityId::new(), BaseRole::Teacher, "t@x.io", "T")
            .with_school(north.clone())
            .with_school(south.clone());
        dir.upsert_identity(teacher.clone());
        let ctl = controller(dir.clone(), store.clone());

        ctl.login(login_for(&teacher), Utc::now()).await.unwrap();
        ctl.choose_school(north.id).await.unwrap();
        ctl.logout().await;
        assert!(store.load().unwrap().is_none());

        ctl.login(login_for(&teacher), Utc::now()).await.unwrap();
        ctl.choose_school(north.id).await.unwrap();

        // Reload: the remembered school resumes without prompting.
        let ctl = controller(dir.clone(), store.clone());
        let state = ctl.login(login_for(&teacher), Utc::now()).await.unwrap();
        assert!(state.session().is_some());

        // Revoked server-side: fall back to a choice.
        dir.revoke_membership(teacher.id, north.id);
        let ctl = controller(dir, store.clone());
        let state = ctl.login(login_for(&teacher), Utc::now()).await.unwrap();
        let resolved_school = state.session().and_then(|s| s.selected_school()).map(|s| s.id);
        assert_eq!(resolved_school, Some(south.id));
    }

    #[tokio::test]
    async fn abandon_returns_to_unresolved_without_touching_the_store() {
        let dir = Arc::new(InMemoryDirectory::new());
        let store = Arc::new(InMemorySessionStore::new());
        let teacher = Identity::new(IdentityId::new(), BaseRole::Teacher, "t@x.io", "T")
            .with_school(school("north"))
            .with_school(school("south"));
        dir.upsert_identity(teacher.clone());
        let ctl = controller(dir, store.clone());

        ctl.login(login_for(&teacher), Utc::now()).await.unwrap();
        let state = ctl.abandon().await;
        assert!(matches!(state, SelectionState::Unresolved { .. }));
        assert_eq!(ctl.navigate("/dashboard").await, NavigationOutcome::Loading);
        assert!(store.load().unwrap().is_none());

        let state = ctl.retry().await.unwrap();
        assert!(state.pending().is_some());
    }

    #[tokio::test]
    async fn superadmin_lists_every_school() {
        let dir = Arc::new(InMemoryDirectory::new());
        dir.add_school(school("north"));
        dir.add_school(school("south"));
        let root = Identity::new(IdentityId::new(), BaseRole::Superadmin, "r@x.io", "Root");
        let ctl = controller(dir, Arc::new(InMemorySessionStore::new()));

        ctl.login(login_for(&root), Utc::now()).await.unwrap();
        assert_eq!(ctl.tenant_listing().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn identity_without_school_is_blocked() {
        let dir = Arc::new(InMemoryDirectory::new());
        let student = Identity::new(IdentityId::new(), BaseRole::Student, "s@x.io", "S");
        let ctl = controller(dir, Arc::new(InMemorySessionStore::new()));

        let err = ctl.login(login_for(&student), Utc::now()).await.unwrap_err();
        assert_eq!(err, SessionError::NoTenantAvailable);
        assert_eq!(ctl.navigate("/dashboard").await, NavigationOutcome::NoTenant);
    }
}
