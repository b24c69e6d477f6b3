use super::redis_codec::store_error;
use crate::domain_model::UserId;
use crate::domain_port::*;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use std::time::Duration;

pub struct RedisReplayMarkStore {
    conn: ConnectionManager,
    prefix: String,
}

impl RedisReplayMarkStore {
    pub fn new(conn: ConnectionManager, prefix: impl Into<String>) -> Self {
        RedisReplayMarkStore {
            conn,
            prefix: prefix.into(),
        }
    }

    fn key(&self, jti: &str) -> String {
        format!("{}:replay:{}", self.prefix, jti)
    }
}

#[async_trait::async_trait]
impl ReplayMarkStore for RedisReplayMarkStore {
    async fn mark_consumed(
        &self,
        jti: &str,
        owner: UserId,
        ttl: Duration,
    ) -> Result<(), StoreError> {
        let ttl_ms = ttl.as_millis().min(u64::MAX as u128) as u64;
        if ttl_ms == 0 {
            return Ok(());
        }
        let mut conn = self.conn.clone();
        let _: () = conn
            .pset_ex(self.key(jti), &owner, ttl_ms)
            .await
            .map_err(store_error)?;
        Ok(())
    }

    async fn consumed_by(&self, jti: &str) -> Result<Option<UserId>, StoreError> {
        let mut conn = self.conn.clone();
        conn.get(self.key(jti)).await.map_err(store_error)
    }
}
