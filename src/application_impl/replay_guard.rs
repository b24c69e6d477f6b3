use crate::application_impl::{SessionRevocationIndex, StoreCall};
use crate::application_port::*;
use crate::domain_model::*;
use crate::domain_port::*;
use crate::logger::*;
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// Remembers consumed single-use tokens for as long as they would otherwise
/// have been valid, and reacts when one shows up again.
pub struct ReplayGuard {
    marks: Arc<dyn ReplayMarkStore>,
    sessions: Arc<SessionRevocationIndex>,
    calls: StoreCall,
}

impl ReplayGuard {
    pub fn new(
        marks: Arc<dyn ReplayMarkStore>,
        sessions: Arc<SessionRevocationIndex>,
        calls: StoreCall,
    ) -> Self {
        Self {
            marks,
            sessions,
            calls,
        }
    }

    /// Record `jti` as consumed until `expires_at`. Nothing is written when the
    /// token has no lifetime left, since it could not be replayed anyway.
    pub async fn mark_consumed(
        &self,
        jti: &str,
        owner: UserId,
        expires_at: DateTime<Utc>,
        scope: &CallScope,
    ) -> Result<(), AuthError> {
        let Ok(ttl) = (expires_at - Utc::now()).to_std() else {
            return Ok(());
        };
        if ttl.is_zero() {
            return Ok(());
        }
        self.calls
            .run(scope, "mark_consumed", move || {
                self.marks.mark_consumed(jti, owner, ttl)
            })
            .await
    }

    pub async fn is_consumed(&self, jti: &str, scope: &CallScope) -> Result<bool, AuthError> {
        let owner = self
            .calls
            .run(scope, "consumed_by", move || self.marks.consumed_by(jti))
            .await?;
        Ok(owner.is_some())
    }

    /// A well-formed refresh token was presented but no longer exists.
    ///
    /// If the owner can be determined, either from the replay mark or from
    /// the access token presented alongside, every session of that owner is
    /// revoked and `TokenReused` is returned. Otherwise the event is only
    /// logged for external alerting and `Ok(())` is returned.
    pub async fn on_missing(
        &self,
        token: &RefreshToken,
        hint: Option<UserId>,
        scope: &CallScope,
    ) -> Result<(), AuthError> {
        let jti = token.fingerprint();
        let jti = jti.as_str();
        let marked_owner = self
            .calls
            .run(scope, "consumed_by", move || self.marks.consumed_by(jti))
            .await?;

        let owner = match (marked_owner, hint) {
            (Some(owner), Some(hinted)) if owner != hinted => {
                warn!(
                    target: "security",
                    %owner,
                    %hinted,
                    token_fp = %token.short_fingerprint(),
                    "replayed refresh token presented with another user's access token"
                );
                owner
            }
            (Some(owner), _) => {
                warn!(
                    target: "security",
                    %owner,
                    token_fp = %token.short_fingerprint(),
                    "consumed refresh token presented again"
                );
                owner
            }
            (None, Some(hinted)) => {
                warn!(
                    target: "security",
                    owner = %hinted,
                    token_fp = %token.short_fingerprint(),
                    "unknown refresh token presented by an authenticated user, suspected replay"
                );
                hinted
            }
            (None, None) => {
                warn!(
                    target: "security",
                    token_fp = %token.short_fingerprint(),
                    "unknown refresh token presented, owner undeterminable"
                );
                return Ok(());
            }
        };

        let revoked = self.sessions.revoke_all(owner, scope).await?;
        warn!(target: "security", %owner, revoked, "sessions revoked after refresh token reuse");
        Err(AuthError::TokenReused)
    }
}
