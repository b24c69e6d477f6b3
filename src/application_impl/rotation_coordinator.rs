use crate::application_impl::{ReplayGuard, SessionRevocationIndex, StoreCall};
use crate::application_port::*;
use crate::domain_model::*;
use crate::domain_port::*;
use crate::logger::*;
use chrono::Utc;
use std::sync::Arc;

/// Login, refresh and logout over the signer, the refresh token store and the
/// replay guard.
///
/// Refresh tokens move through `issued -> consumed by rotation | consumed by
/// logout | expired`, and every terminal state is simply absence from the
/// store. Rotation relies on the store's atomic consume: of several requests
/// presenting the same token only one can win.
pub struct RotationCoordinator {
    signer: Arc<dyn CredentialSigner>,
    store: Arc<dyn RefreshTokenStore>,
    replay_guard: Arc<ReplayGuard>,
    sessions: Arc<SessionRevocationIndex>,
    users: Arc<dyn UserDirectory>,
    calls: StoreCall,
}

impl RotationCoordinator {
    pub fn new(
        signer: Arc<dyn CredentialSigner>,
        store: Arc<dyn RefreshTokenStore>,
        replay_guard: Arc<ReplayGuard>,
        sessions: Arc<SessionRevocationIndex>,
        users: Arc<dyn UserDirectory>,
        calls: StoreCall,
    ) -> Self {
        Self {
            signer,
            store,
            replay_guard,
            sessions,
            users,
            calls,
        }
    }

    /// Owner and expiry of a live refresh token. Deleted, rotated, expired and
    /// never-issued tokens all fail the same way.
    pub async fn lookup(
        &self,
        token: &RefreshToken,
        scope: &CallScope,
    ) -> Result<TokenRecord, AuthError> {
        let record = self
            .calls
            .run(scope, "get", move || self.store.get(token))
            .await?;
        match record {
            Some(record) if !record.is_expired_at(Utc::now()) => Ok(record),
            _ => Err(AuthError::TokenInvalid),
        }
    }

    async fn start_session(
        &self,
        principal: &Principal,
        scope: &CallScope,
    ) -> Result<TokenPair, AuthError> {
        let refresh = self.signer.issue_refresh_token(principal.user_id).await?;
        let user_id = principal.user_id;
        let token = &refresh.token;
        let expires_at = refresh.expires_at;
        self.calls
            .run(scope, "store", move || {
                self.store.store(user_id, token, expires_at)
            })
            .await?;

        let access = self.signer.issue_access_token(principal).await?;
        debug!(
            %user_id,
            access_jti = %access.jti,
            token_fp = %refresh.token.short_fingerprint(),
            "session tokens issued"
        );

        Ok(TokenPair {
            expires_in: (access.expires_at - Utc::now()).num_seconds().max(0),
            access_token: access.token,
            access_token_expires_at: access.expires_at,
            refresh_token: refresh.token,
            refresh_token_expires_at: refresh.expires_at,
        })
    }

    async fn hinted_owner(&self, access_hint: Option<&str>) -> Option<UserId> {
        let claims = self.signer.verify_access_token(access_hint?).await.ok()?;
        claims.user_id().ok()
    }
}

#[async_trait::async_trait]
impl AuthService for RotationCoordinator {
    async fn login(&self, input: LoginInput, scope: &CallScope) -> Result<LoginResult, AuthError> {
        let LoginInput { email, password } = input;
        let principal = self.users.authenticate(&email, &password).await?;
        let tokens = self.start_session(&principal, scope).await?;
        info!(user_id = %principal.user_id, "login succeeded");
        Ok(LoginResult {
            user_id: principal.user_id,
            tokens,
        })
    }

    async fn issue_session(
        &self,
        principal: &Principal,
        scope: &CallScope,
    ) -> Result<TokenPair, AuthError> {
        self.start_session(principal, scope).await
    }

    async fn refresh(
        &self,
        input: RefreshInput,
        scope: &CallScope,
    ) -> Result<TokenPair, AuthError> {
        let RefreshInput {
            refresh_token,
            access_hint,
        } = input;
        if !refresh_token.is_well_formed() {
            return Err(AuthError::TokenInvalid);
        }

        // Check-and-delete in one step. Never retried: a retry after a lost
        // reply would find the token gone and look like a replay.
        let token = &refresh_token;
        let consumed = self
            .calls
            .run_once(scope, "consume", move || self.store.consume(token))
            .await?;

        let record = match consumed {
            Some(record) if !record.is_expired_at(Utc::now()) => record,
            Some(_) => return Err(AuthError::TokenInvalid),
            None => {
                let hint = self.hinted_owner(access_hint.as_deref()).await;
                return match self.replay_guard.on_missing(&refresh_token, hint, scope).await {
                    Ok(()) | Err(AuthError::TokenReused) => Err(AuthError::TokenInvalid),
                    Err(e) => {
                        error!(
                            target: "security",
                            error = %e,
                            token_fp = %refresh_token.short_fingerprint(),
                            "replay handling failed"
                        );
                        Err(AuthError::TokenInvalid)
                    }
                };
            }
        };

        let principal = self
            .users
            .find(record.user_id)
            .await?
            .ok_or(AuthError::TokenInvalid)?;

        let tokens = self.start_session(&principal, scope).await?;

        // Marked only once the new session is stored; a failed rotation
        // leaves no mark behind.
        let jti = refresh_token.fingerprint();
        if let Err(e) = self
            .replay_guard
            .mark_consumed(&jti, record.user_id, record.expires_at, scope)
            .await
        {
            warn!(user_id = %record.user_id, error = %e, "replay mark not recorded");
        }
        info!(
            user_id = %principal.user_id,
            old_fp = %refresh_token.short_fingerprint(),
            new_fp = %tokens.refresh_token.short_fingerprint(),
            "refresh token rotated"
        );
        Ok(tokens)
    }

    async fn logout(
        &self,
        refresh_token: &RefreshToken,
        scope: &CallScope,
    ) -> Result<(), AuthError> {
        if !refresh_token.is_well_formed() {
            return Ok(());
        }
        self.calls
            .run(scope, "delete", move || self.store.delete(refresh_token))
            .await?;
        debug!(token_fp = %refresh_token.short_fingerprint(), "logged out");
        Ok(())
    }

    async fn logout_all(&self, user_id: UserId, scope: &CallScope) -> Result<usize, AuthError> {
        self.sessions.revoke_all(user_id, scope).await
    }

    async fn list_sessions(
        &self,
        user_id: UserId,
        scope: &CallScope,
    ) -> Result<Vec<SessionEntry>, AuthError> {
        self.sessions.list_sessions(user_id, scope).await
    }

    async fn revoke_session(
        &self,
        user_id: UserId,
        refresh_token: &RefreshToken,
        scope: &CallScope,
    ) -> Result<bool, AuthError> {
        self.sessions.revoke_one(user_id, refresh_token, scope).await
    }

    async fn verify_access_token(&self, token: &str) -> Result<AccessClaims, AuthError> {
        self.signer.verify_access_token(token).await
    }
}
