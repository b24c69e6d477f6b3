use crate::application_impl::StoreCall;
use crate::application_port::*;
use crate::domain_model::*;
use crate::domain_port::*;
use crate::logger::*;
use futures_util::future::try_join_all;
use std::sync::Arc;

/// "Log out this device" and "log out everywhere" on top of the per-user
/// index. Index entries whose record is gone are dropped on sight.
pub struct SessionRevocationIndex {
    store: Arc<dyn RefreshTokenStore>,
    calls: StoreCall,
}

impl SessionRevocationIndex {
    pub fn new(store: Arc<dyn RefreshTokenStore>, calls: StoreCall) -> Self {
        Self { store, calls }
    }

    pub async fn list_sessions(
        &self,
        user_id: UserId,
        scope: &CallScope,
    ) -> Result<Vec<SessionEntry>, AuthError> {
        let (live, _) = self.sweep(user_id, scope).await?;
        Ok(live)
    }

    pub async fn revoke_all(&self, user_id: UserId, scope: &CallScope) -> Result<usize, AuthError> {
        let revoked = self
            .calls
            .run(scope, "revoke_all", move || self.store.revoke_all(user_id))
            .await?;
        info!(%user_id, revoked, "all sessions revoked");
        Ok(revoked)
    }

    /// Returns whether a live session was actually revoked. A token owned by
    /// another user is rejected without touching it.
    pub async fn revoke_one(
        &self,
        user_id: UserId,
        token: &RefreshToken,
        scope: &CallScope,
    ) -> Result<bool, AuthError> {
        let record = self
            .calls
            .run(scope, "get", move || self.store.get(token))
            .await?;
        match record {
            Some(record) if record.user_id == user_id => {
                self.calls
                    .run(scope, "delete", move || self.store.delete(token))
                    .await?;
                info!(%user_id, token_fp = %token.short_fingerprint(), "session revoked");
                Ok(true)
            }
            Some(_) => Err(AuthError::TokenInvalid),
            None => {
                let stale = std::slice::from_ref(token);
                self.calls
                    .run(scope, "remove_index_entries", move || {
                        self.store.remove_index_entries(user_id, stale)
                    })
                    .await?;
                Ok(false)
            }
        }
    }

    /// Drop index entries that no longer have a record. Returns how many.
    pub async fn prune(&self, user_id: UserId, scope: &CallScope) -> Result<usize, AuthError> {
        let (_, pruned) = self.sweep(user_id, scope).await?;
        Ok(pruned)
    }

    async fn sweep(
        &self,
        user_id: UserId,
        scope: &CallScope,
    ) -> Result<(Vec<SessionEntry>, usize), AuthError> {
        let entries = self
            .calls
            .run(scope, "list_index", move || self.store.list_index(user_id))
            .await?;

        let records = try_join_all(entries.iter().map(|entry| {
            let token = &entry.token;
            self.calls.run(scope, "get", move || self.store.get(token))
        }))
        .await?;

        let mut live = Vec::with_capacity(entries.len());
        let mut stale = Vec::new();
        for (entry, record) in entries.into_iter().zip(records) {
            match record {
                Some(record) if record.user_id == user_id => live.push(SessionEntry {
                    token: entry.token,
                    expires_at: record.expires_at,
                }),
                _ => stale.push(entry.token),
            }
        }

        if !stale.is_empty() {
            let stale = stale.as_slice();
            self.calls
                .run(scope, "remove_index_entries", move || {
                    self.store.remove_index_entries(user_id, stale)
                })
                .await?;
            debug!(%user_id, pruned = stale.len(), "stale index entries pruned");
        }

        Ok((live, stale.len()))
    }
}
