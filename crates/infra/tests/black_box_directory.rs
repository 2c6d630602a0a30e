use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;

use scholaris_auth::{
    BaseRole, Identity, PriorSelection, SchoolRef, SessionError, SpecialRole,
    SpecialRoleAssignment, SpecialRoleEvent, SpecialRoleKind,
};
use scholaris_core::{IdentityId, SchoolId};
use scholaris_events::{EventBus, InMemoryEventBus};
use scholaris_infra::directory::{HttpDirectory, InMemoryDirectory};
use scholaris_infra::{
    DirectoryError, EngineError, IdentityDirectory, RoleAssignmentEngine, SpecialRoleDirectory,
    TenantResolver,
};

const TOKEN: &str = "stub-token";

#[derive(Clone)]
struct Stub {
    directory: Arc<InMemoryDirectory>,
    delay: Duration,
    /// Reply to role changes with an empty object.
    terse: bool,
}

#[derive(Deserialize)]
struct RoleQuery {
    role: BaseRole,
}

fn fail(err: DirectoryError) -> Response {
    let status = match err {
        DirectoryError::NotFound(_) => StatusCode::NOT_FOUND,
        DirectoryError::Rejected(_) => StatusCode::UNPROCESSABLE_ENTITY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, err.to_string()).into_response()
}

fn authorized(headers: &HeaderMap) -> bool {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v == format!("Bearer {TOKEN}"))
}

async fn schools(State(stub): State<Stub>, headers: HeaderMap) -> Response {
    if !authorized(&headers) {
        return (StatusCode::UNAUTHORIZED, "missing token").into_response();
    }
    tokio::time::sleep(stub.delay).await;
    match stub.directory.schools().await {
        Ok(schools) => Json(schools).into_response(),
        Err(e) => fail(e),
    }
}

async fn user(State(stub): State<Stub>, Path(id): Path<IdentityId>) -> Response {
    match stub.directory.identity(id).await {
        Ok(Some(identity)) => Json(identity).into_response(),
        Ok(None) => (StatusCode::NOT_FOUND, "no such user").into_response(),
        Err(e) => fail(e),
    }
}

async fn users_by_role(
    State(stub): State<Stub>,
    Path(school): Path<SchoolId>,
    Query(query): Query<RoleQuery>,
) -> Response {
    tokio::time::sleep(stub.delay).await;
    match stub.directory.users_by_school_and_role(school, query.role).await {
        Ok(users) => Json(users).into_response(),
        Err(e) => fail(e),
    }
}

async fn teachers(State(stub): State<Stub>, Path(school): Path<SchoolId>) -> Response {
    match stub.directory.teachers(school).await {
        Ok(users) => Json(users).into_response(),
        Err(e) => fail(e),
    }
}

async fn holders(State(stub): State<Stub>, Path(school): Path<SchoolId>) -> Response {
    match stub.directory.special_role_holders(school).await {
        Ok(users) => Json(users).into_response(),
        Err(e) => fail(e),
    }
}

async fn assign(State(stub): State<Stub>, Json(body): Json<SpecialRoleAssignment>) -> Response {
    match stub.directory.assign_role(&body).await {
        Ok(_) if stub.terse => Json(json!({})).into_response(),
        Ok(changed) => Json(json!({ "changed": changed })).into_response(),
        Err(e) => fail(e),
    }
}

async fn remove(State(stub): State<Stub>, Json(body): Json<SpecialRoleAssignment>) -> Response {
    match stub.directory.remove_role(&body).await {
        Ok(changed) => Json(json!({ "changed": changed })).into_response(),
        Err(e) => fail(e),
    }
}

struct StubServer {
    base_url: String,
    handle: tokio::task::JoinHandle<()>,
}

impl StubServer {
    async fn spawn(directory: Arc<InMemoryDirectory>, delay: Duration) -> Self {
        Self::start(Stub {
            directory,
            delay,
            terse: false,
        })
        .await
    }

    async fn start(stub: Stub) -> Self {
        let app = Router::new()
            .route("/api/schools", get(schools))
            .route("/api/users/:id", get(user))
            .route("/api/schools/:school/users", get(users_by_role))
            .route("/api/schools/:school/teachers", get(teachers))
            .route("/api/schools/:school/special-role-holders", get(holders))
            .route("/api/special-roles/assign", post(assign))
            .route("/api/special-roles/remove", post(remove))
            .with_state(stub);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind ephemeral port");
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            base_url: format!("http://{addr}/api/"),
            handle,
        }
    }

    fn client(&self, timeout: Duration) -> HttpDirectory {
        HttpDirectory::new(self.base_url.clone(), Some(TOKEN.to_string()), timeout)
    }
}

impl Drop for StubServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

fn seeded() -> (Arc<InMemoryDirectory>, SchoolRef, Identity) {
    let directory = Arc::new(InMemoryDirectory::new());
    let north = SchoolRef::new(SchoolId::new(), "North High", "N01");
    let teacher = Identity::new(IdentityId::new(), BaseRole::Teacher, "t@x.io", "Tess")
        .with_school(north.clone());
    directory.upsert_identity(teacher.clone());
    (directory, north, teacher)
}

#[tokio::test]
async fn reads_schools_and_identities_over_http() {
    let (directory, north, teacher) = seeded();
    let server = StubServer::spawn(directory, Duration::ZERO).await;
    let client = server.client(Duration::from_secs(2));

    let schools = client.schools().await.unwrap();
    assert_eq!(schools, vec![north.clone()]);

    assert_eq!(client.identity(teacher.id).await.unwrap(), Some(teacher.clone()));
    assert_eq!(client.identity(IdentityId::new()).await.unwrap(), None);

    let teachers = client
        .users_by_school_and_role(north.id, BaseRole::Teacher)
        .await
        .unwrap();
    assert_eq!(teachers, vec![teacher]);
}

#[tokio::test]
async fn missing_token_is_an_api_error() {
    let (directory, _, _) = seeded();
    let server = StubServer::spawn(directory, Duration::ZERO).await;
    let client = HttpDirectory::new(server.base_url.clone(), None, Duration::from_secs(2));

    assert!(matches!(client.schools().await, Err(DirectoryError::Api(401, _))));
}

#[tokio::test]
async fn role_changes_round_trip_through_the_engine() {
    let (directory, north, teacher) = seeded();
    let server = StubServer::spawn(directory, Duration::ZERO).await;
    let bus: Arc<InMemoryEventBus<SpecialRoleEvent>> = Arc::new(InMemoryEventBus::new());
    let engine = RoleAssignmentEngine::new(server.client(Duration::from_secs(2)), bus);

    engine
        .assign(teacher.id, SpecialRoleKind::Hod, Some("Science"))
        .await
        .unwrap();
    let listed = engine.list(north.id).await.unwrap();
    assert_eq!(listed.len(), 1);
    assert!(listed[0]
        .special_roles
        .contains(&SpecialRole::hod("Science").unwrap()));

    engine
        .remove(teacher.id, SpecialRoleKind::Hod, Some("Science"))
        .await
        .unwrap();
    assert!(engine.list(north.id).await.unwrap().is_empty());
    assert_eq!(engine.eligible(north.id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn change_reply_without_flag_still_publishes() {
    let (directory, _, teacher) = seeded();
    let server = StubServer::start(Stub {
        directory,
        delay: Duration::ZERO,
        terse: true,
    })
    .await;
    let bus: Arc<InMemoryEventBus<SpecialRoleEvent>> = Arc::new(InMemoryEventBus::new());
    let subscription = bus.subscribe();
    let engine = RoleAssignmentEngine::new(server.client(Duration::from_secs(2)), bus.clone());

    engine
        .assign(teacher.id, SpecialRoleKind::Principal, None)
        .await
        .unwrap();
    let events = subscription.drain();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].holder_id(), teacher.id);
}

#[tokio::test]
async fn unknown_holder_maps_to_not_found() {
    let (directory, _, _) = seeded();
    let server = StubServer::spawn(directory, Duration::ZERO).await;
    let bus: Arc<InMemoryEventBus<SpecialRoleEvent>> = Arc::new(InMemoryEventBus::new());
    let engine = RoleAssignmentEngine::new(server.client(Duration::from_secs(2)), bus);

    let err = engine
        .assign(IdentityId::new(), SpecialRoleKind::Principal, None)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Directory(DirectoryError::NotFound(_))));
}

#[tokio::test]
async fn slow_directory_times_out() {
    let (directory, _, _) = seeded();
    let server = StubServer::spawn(directory, Duration::from_millis(500)).await;
    let client = server.client(Duration::from_millis(50));

    assert!(matches!(client.schools().await, Err(DirectoryError::Timeout(_))));
}

#[tokio::test]
async fn slow_sub_account_lookup_leaves_resolution_unavailable() {
    let (directory, north, teacher) = seeded();
    let server = StubServer::spawn(directory, Duration::from_millis(500)).await;
    let resolver =
        TenantResolver::new(server.client(Duration::from_secs(5)), Duration::from_millis(50));

    let err = resolver
        .resolve(&teacher, &PriorSelection::school(north.id))
        .await
        .unwrap_err();
    assert!(matches!(err, SessionError::ResolutionUnavailable(_)));
}
