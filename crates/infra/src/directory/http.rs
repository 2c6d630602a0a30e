//! REST client for the directory API.
//!
//! | call | endpoint |
//! |---|---|
//! | schools | `GET {base}/schools` |
//! | identity | `GET {base}/users/{id}` |
//! | users by school and role | `GET {base}/schools/{school}/users?role={role}` |
//! | teachers | `GET {base}/schools/{school}/teachers` |
//! | special-role holders | `GET {base}/schools/{school}/special-role-holders` |
//! | assign | `POST {base}/special-roles/assign` |
//! | remove | `POST {base}/special-roles/remove` |

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde::de::DeserializeOwned;

use scholaris_auth::{BaseRole, Identity, SchoolRef, SpecialRoleAssignment};
use scholaris_core::{IdentityId, SchoolId};

use super::{DirectoryError, IdentityDirectory, SpecialRoleDirectory};
use crate::ScholarisConfig;

#[derive(Debug, Clone)]
pub struct HttpDirectory {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
    timeout: Duration,
}

/// Body returned by the assign/remove endpoints.
///
/// A body without `changed` counts as a change, so sessions are re-checked.
#[derive(Debug, Deserialize)]
struct RoleChange {
    #[serde(default = "assume_changed")]
    changed: bool,
}

fn assume_changed() -> bool {
    true
}

impl HttpDirectory {
    pub fn new(base_url: impl Into<String>, token: Option<String>, timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token,
            timeout,
        }
    }

    pub fn from_config(config: &ScholarisConfig) -> Self {
        Self::new(
            config.api_url.clone(),
            config.api_token.clone(),
            config.directory_timeout,
        )
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    fn authorized(&self, req: RequestBuilder) -> RequestBuilder {
        let req = req.timeout(self.timeout);
        match &self.token {
            Some(token) => req.bearer_auth(token),
            None => req,
        }
    }

    async fn send(&self, req: RequestBuilder) -> Result<Response, DirectoryError> {
        self.authorized(req).send().await.map_err(|e| {
            if e.is_timeout() {
                DirectoryError::Timeout(self.timeout)
            } else {
                DirectoryError::Network(e.to_string())
            }
        })
    }

    async fn json<T: DeserializeOwned>(resp: Response) -> Result<T, DirectoryError> {
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(match status {
                StatusCode::NOT_FOUND => DirectoryError::NotFound(body),
                StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => {
                    DirectoryError::Rejected(body)
                }
                other => DirectoryError::Api(other.as_u16(), body),
            });
        }
        resp.json::<T>()
            .await
            .map_err(|e| DirectoryError::Parse(e.to_string()))
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, DirectoryError> {
        let resp = self.send(self.client.get(self.url(path))).await?;
        Self::json(resp).await
    }

    async fn post_change(
        &self,
        path: &str,
        assignment: &SpecialRoleAssignment,
    ) -> Result<bool, DirectoryError> {
        let resp = self
            .send(self.client.post(self.url(path)).json(assignment))
            .await?;
        let change: RoleChange = Self::json(resp).await?;
        Ok(change.changed)
    }
}

#[async_trait]
impl IdentityDirectory for HttpDirectory {
    async fn schools(&self) -> Result<Vec<SchoolRef>, DirectoryError> {
        self.get("schools").await
    }

    async fn identity(&self, id: IdentityId) -> Result<Option<Identity>, DirectoryError> {
        match self.get(&format!("users/{id}")).await {
            Ok(identity) => Ok(Some(identity)),
            Err(DirectoryError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn users_by_school_and_role(
        &self,
        school: SchoolId,
        role: BaseRole,
    ) -> Result<Vec<Identity>, DirectoryError> {
        self.get(&format!("schools/{school}/users?role={}", role.as_str()))
            .await
    }
}

#[async_trait]
impl SpecialRoleDirectory for HttpDirectory {
    async fn teachers(&self, school: SchoolId) -> Result<Vec<Identity>, DirectoryError> {
        self.get(&format!("schools/{school}/teachers")).await
    }

    async fn special_role_holders(
        &self,
        school: SchoolId,
    ) -> Result<Vec<Identity>, DirectoryError> {
        self.get(&format!("schools/{school}/special-role-holders"))
            .await
    }

    async fn assign_role(
        &self,
        assignment: &SpecialRoleAssignment,
    ) -> Result<bool, DirectoryError> {
        self.post_change("special-roles/assign", assignment).await
    }

    async fn remove_role(
        &self,
        assignment: &SpecialRoleAssignment,
    ) -> Result<bool, DirectoryError> {
        self.post_change("special-roles/remove", assignment).await
    }
}
