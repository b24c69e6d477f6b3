use crate::application_port::{AccessToken, AuthError};
use crate::domain_model::*;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Claims carried by every access token.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct AccessClaims {
    pub sub: String,
    pub role: String,
    pub iss: String,
    pub jti: String,
    pub iat: i64,
    pub exp: i64,
}

impl AccessClaims {
    pub fn user_id(&self) -> Result<UserId, AuthError> {
        self.sub.parse::<UserId>().map_err(|_| AuthError::TokenInvalid)
    }

    pub fn principal(&self) -> Result<Principal, AuthError> {
        Ok(Principal {
            user_id: self.user_id()?,
            role: Role::new(self.role.clone()),
        })
    }
}

#[derive(Debug, Clone)]
pub struct IssuedAccessToken {
    pub token: AccessToken,
    pub jti: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct IssuedRefreshToken {
    pub token: RefreshToken,
    pub expires_at: DateTime<Utc>,
}

#[async_trait::async_trait]
pub trait CredentialSigner: Send + Sync {
    async fn issue_access_token(
        &self,
        principal: &Principal,
    ) -> Result<IssuedAccessToken, AuthError>;

    /// Signature, issuer and expiry check. Never touches any store.
    async fn verify_access_token(&self, token: &str) -> Result<AccessClaims, AuthError>;

    async fn issue_refresh_token(&self, user_id: UserId) -> Result<IssuedRefreshToken, AuthError>;
}
