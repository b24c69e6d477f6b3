use crate::domain_model::*;
use crate::domain_port::StoreError;
use chrono::{DateTime, Utc};

/// Persistence of refresh-token sessions in a shared, TTL-capable store.
///
/// The token record is the source of truth for whether a session is valid.
/// The per-user index is bookkeeping on the side: it may briefly list tokens
/// whose record is already gone, and readers are expected to prune those.
#[async_trait::async_trait]
pub trait RefreshTokenStore: Send + Sync {
    /// Write the record with a TTL of `expires_at - now` and add the token to
    /// the owner's index. A record that is already expired is not written.
    async fn store(
        &self,
        user_id: UserId,
        token: &RefreshToken,
        expires_at: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    /// Look up a live record. Expired and deleted tokens both read as `None`.
    async fn get(&self, token: &RefreshToken) -> Result<Option<TokenRecord>, StoreError>;

    /// Atomically read and delete the record. Of several concurrent callers
    /// presenting the same token at most one gets `Some`.
    async fn consume(&self, token: &RefreshToken) -> Result<Option<TokenRecord>, StoreError>;

    /// Remove the record and its index entry. Absent tokens are not an error.
    async fn delete(&self, token: &RefreshToken) -> Result<(), StoreError>;

    /// Delete every record listed in the user's index, then the index itself.
    /// Returns how many records were actually deleted.
    async fn revoke_all(&self, user_id: UserId) -> Result<usize, StoreError>;

    /// Raw index content, oldest expiry first. Entries past their expiry are
    /// dropped; entries whose record was deleted may still be present.
    async fn list_index(&self, user_id: UserId) -> Result<Vec<SessionEntry>, StoreError>;

    async fn remove_index_entries(
        &self,
        user_id: UserId,
        tokens: &[RefreshToken],
    ) -> Result<(), StoreError>;

    /// Users that currently have an index.
    async fn indexed_users(&self) -> Result<Vec<UserId>, StoreError>;
}
