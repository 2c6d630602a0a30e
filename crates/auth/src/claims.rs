use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use scholaris_core::IdentityId;

use crate::{BaseRole, Identity};

/// Claims carried by the token issued at login.
///
/// Signature verification happens wherever the token is decoded; only the
/// claim values are checked here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginClaims {
    pub sub: IdentityId,
    pub role: BaseRole,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// What a successful login hands to the session layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Login {
    pub identity: Identity,
    pub token: String,
    pub claims: LoginClaims,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ClaimsError {
    #[error("token has expired")]
    Expired,

    #[error("token not yet valid (issued_at is in the future)")]
    NotYetValid,

    #[error("invalid token time window (expires_at <= issued_at)")]
    InvalidTimeWindow,

    #[error("token subject does not match the identity")]
    SubjectMismatch,
}

pub fn validate_claims(claims: &LoginClaims, now: DateTime<Utc>) -> Result<(), ClaimsError> {
    if claims.expires_at <= claims.issued_at {
        return Err(ClaimsError::InvalidTimeWindow);
    }
    if now < claims.issued_at {
        return Err(ClaimsError::NotYetValid);
    }
    if now >= claims.expires_at {
        return Err(ClaimsError::Expired);
    }
    Ok(())
}

impl Login {
    /// Validate the claim window and that the token was minted for this identity.
    pub fn validate(&self, now: DateTime<Utc>) -> Result<(), ClaimsError> {
        validate_claims(&self.claims, now)?;
        if self.claims.sub != self.identity.id || self.claims.role != self.identity.base_role {
            return Err(ClaimsError::SubjectMismatch);
        }
        Ok(())
    }
}
