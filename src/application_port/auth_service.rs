use crate::application_port::{AccessClaims, CallScope};
use crate::domain_model::*;
use crate::domain_port::StoreError;
use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error("token invalid")]
    TokenInvalid,
    #[error("token expired")]
    TokenExpired,
    /// Internal signal: an already-consumed refresh token was presented again.
    /// Callers outside the service only ever see `TokenInvalid`.
    #[error("token reused")]
    TokenReused,
    #[error("store unavailable: {0}")]
    StoreUnavailable(String),
    #[error("key load error: {0}")]
    KeyLoad(String),
    #[error("internal error: {0}")]
    InternalError(String),
}

impl From<StoreError> for AuthError {
    fn from(err: StoreError) -> Self {
        AuthError::StoreUnavailable(err.to_string())
    }
}

#[derive(Debug, Clone)]
pub struct LoginInput {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone)]
pub struct LoginResult {
    pub user_id: UserId,
    pub tokens: TokenPair,
}

#[derive(Debug, Clone)]
pub struct RefreshInput {
    pub refresh_token: RefreshToken,
    /// Access token sent along with the refresh request, if any. Only used to
    /// attribute a replayed refresh token to its owner.
    pub access_hint: Option<String>,
}

#[derive(Clone, Eq, PartialEq, Serialize)]
#[serde(transparent)]
pub struct AccessToken(pub String);

impl std::fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("AccessToken(..)")
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TokenPair {
    pub access_token: AccessToken,
    pub refresh_token: RefreshToken,
    /// Access token lifetime in seconds.
    pub expires_in: i64,
    pub access_token_expires_at: DateTime<Utc>,
    pub refresh_token_expires_at: DateTime<Utc>,
}

#[async_trait::async_trait]
pub trait AuthService: Send + Sync {
    async fn login(&self, input: LoginInput, scope: &CallScope) -> Result<LoginResult, AuthError>;

    /// Start a session for an already authenticated principal.
    async fn issue_session(
        &self,
        principal: &Principal,
        scope: &CallScope,
    ) -> Result<TokenPair, AuthError>;

    async fn refresh(&self, input: RefreshInput, scope: &CallScope)
    -> Result<TokenPair, AuthError>;

    async fn logout(&self, refresh_token: &RefreshToken, scope: &CallScope)
    -> Result<(), AuthError>;

    async fn logout_all(&self, user_id: UserId, scope: &CallScope) -> Result<usize, AuthError>;

    async fn list_sessions(
        &self,
        user_id: UserId,
        scope: &CallScope,
    ) -> Result<Vec<SessionEntry>, AuthError>;

    async fn revoke_session(
        &self,
        user_id: UserId,
        refresh_token: &RefreshToken,
        scope: &CallScope,
    ) -> Result<bool, AuthError>;

    async fn verify_access_token(&self, token: &str) -> Result<AccessClaims, AuthError>;
}
