use crate::domain_model::UserId;
use crate::domain_port::StoreError;
use std::time::Duration;

#[async_trait::async_trait]
pub trait ReplayMarkStore: Send + Sync {
    /// Remember that `jti` was consumed on behalf of `owner` for `ttl`.
    async fn mark_consumed(&self, jti: &str, owner: UserId, ttl: Duration)
    -> Result<(), StoreError>;

    /// Owner of a consumed jti, if the mark has not expired yet.
    async fn consumed_by(&self, jti: &str) -> Result<Option<UserId>, StoreError>;
}
