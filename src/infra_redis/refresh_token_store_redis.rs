use super::redis_codec::store_error;
use crate::domain_model::*;
use crate::domain_port::*;
use crate::logger::*;
use chrono::{DateTime, Duration, Utc};
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Script};

const CONSUME_REFRESH_TOKEN: &str = include_str!("consume_refresh_token.lua");
const SCAN_BATCH: usize = 200;

/// Refresh token records as `{prefix}:token:{value}` string keys holding the
/// owner, with a native TTL. The per-user index is a sorted set
/// `{prefix}:user_tokens:{user}` scored by expiry in unix millis.
pub struct RedisRefreshTokenStore {
    conn: ConnectionManager,
    prefix: String,
}

impl RedisRefreshTokenStore {
    pub fn new(conn: ConnectionManager, prefix: impl Into<String>) -> Self {
        RedisRefreshTokenStore {
            conn,
            prefix: prefix.into(),
        }
    }

    fn token_key(&self, token: &str) -> String {
        format!("{}:token:{}", self.prefix, token)
    }

    fn index_key(&self, user_id: UserId) -> String {
        format!("{}:user_tokens:{}", self.prefix, user_id)
    }

    fn index_pattern(&self) -> String {
        format!("{}:user_tokens:*", self.prefix)
    }

    /// Keep the index alive exactly as long as its newest member.
    async fn extend_index(
        &self,
        conn: &mut ConnectionManager,
        key: &str,
    ) -> Result<(), StoreError> {
        let newest: Vec<(String, f64)> = conn
            .zrange_withscores(key, -1, -1)
            .await
            .map_err(store_error)?;
        if let Some((_, score)) = newest.first() {
            let _: () = conn
                .pexpire_at(key, *score as i64)
                .await
                .map_err(store_error)?;
        }
        Ok(())
    }
}

fn record_from_pttl(user_id: UserId, pttl_ms: i64) -> TokenRecord {
    TokenRecord {
        user_id,
        expires_at: Utc::now() + Duration::milliseconds(pttl_ms),
    }
}

#[async_trait::async_trait]
impl RefreshTokenStore for RedisRefreshTokenStore {
    async fn store(
        &self,
        user_id: UserId,
        token: &RefreshToken,
        expires_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let ttl_ms = (expires_at - Utc::now()).num_milliseconds();
        if ttl_ms <= 0 {
            return Ok(());
        }
        let record_key = self.token_key(token.as_str());
        let index_key = self.index_key(user_id);
        let mut conn = self.conn.clone();

        let _: () = conn
            .pset_ex(&record_key, &user_id, ttl_ms as u64)
            .await
            .map_err(store_error)?;

        // A record nobody can find through the index could not be revoked.
        let indexed: redis::RedisResult<()> = conn
            .zadd(&index_key, token.as_str(), expires_at.timestamp_millis())
            .await;
        if let Err(e) = indexed {
            let undone: redis::RedisResult<()> = conn.del(&record_key).await;
            if let Err(undo) = undone {
                error!(
                    %user_id,
                    token_fp = %token.short_fingerprint(),
                    error = %undo,
                    "unindexed refresh token record left behind"
                );
            }
            return Err(store_error(e));
        }

        self.extend_index(&mut conn, &index_key).await
    }

    async fn get(&self, token: &RefreshToken) -> Result<Option<TokenRecord>, StoreError> {
        let key = self.token_key(token.as_str());
        let mut conn = self.conn.clone();
        let (user_id, pttl): (Option<UserId>, i64) = redis::pipe()
            .atomic()
            .get(&key)
            .pttl(&key)
            .query_async(&mut conn)
            .await
            .map_err(store_error)?;

        match (user_id, pttl) {
            (None, _) | (_, -2) => Ok(None),
            (Some(_), -1) => Err(StoreError::Corrupt(format!(
                "refresh token record {} has no expiry",
                token.short_fingerprint()
            ))),
            (Some(user_id), pttl) => Ok(Some(record_from_pttl(user_id, pttl))),
        }
    }

    async fn consume(&self, token: &RefreshToken) -> Result<Option<TokenRecord>, StoreError> {
        let key = self.token_key(token.as_str());
        let mut conn = self.conn.clone();
        let consumed: Option<(UserId, i64)> = Script::new(CONSUME_REFRESH_TOKEN)
            .key(&key)
            .invoke_async(&mut conn)
            .await
            .map_err(store_error)?;

        let Some((user_id, pttl)) = consumed else {
            return Ok(None);
        };

        let unindexed: redis::RedisResult<()> =
            conn.zrem(self.index_key(user_id), token.as_str()).await;
        if let Err(e) = unindexed {
            warn!(
                %user_id,
                token_fp = %token.short_fingerprint(),
                error = %e,
                "stale index entry left after consume"
            );
        }

        match pttl {
            -1 => Err(StoreError::Corrupt(format!(
                "refresh token record {} has no expiry",
                token.short_fingerprint()
            ))),
            pttl if pttl <= 0 => Ok(None),
            pttl => Ok(Some(record_from_pttl(user_id, pttl))),
        }
    }

    async fn delete(&self, token: &RefreshToken) -> Result<(), StoreError> {
        self.consume(token).await.map(|_| ())
    }

    async fn revoke_all(&self, user_id: UserId) -> Result<usize, StoreError> {
        let index_key = self.index_key(user_id);
        let mut conn = self.conn.clone();
        let tokens: Vec<String> = conn.zrange(&index_key, 0, -1).await.map_err(store_error)?;

        let mut revoked = 0;
        if !tokens.is_empty() {
            let keys: Vec<String> = tokens.iter().map(|t| self.token_key(t)).collect();
            revoked = conn.del(keys).await.map_err(store_error)?;
        }
        let _: () = conn.del(&index_key).await.map_err(store_error)?;
        Ok(revoked)
    }

    async fn list_index(&self, user_id: UserId) -> Result<Vec<SessionEntry>, StoreError> {
        let index_key = self.index_key(user_id);
        let mut conn = self.conn.clone();
        let now_ms = Utc::now().timestamp_millis();

        let _: () = conn
            .zrembyscore(&index_key, "-inf", now_ms)
            .await
            .map_err(store_error)?;
        let members: Vec<(String, f64)> = conn
            .zrange_withscores(&index_key, 0, -1)
            .await
            .map_err(store_error)?;

        members
            .into_iter()
            .map(|(token, score)| {
                let expires_at = DateTime::from_timestamp_millis(score as i64).ok_or_else(|| {
                    StoreError::Corrupt(format!("index score {} out of range", score))
                })?;
                Ok(SessionEntry {
                    token: RefreshToken(token),
                    expires_at,
                })
            })
            .collect()
    }

    async fn remove_index_entries(
        &self,
        user_id: UserId,
        tokens: &[RefreshToken],
    ) -> Result<(), StoreError> {
        if tokens.is_empty() {
            return Ok(());
        }
        let members: Vec<&str> = tokens.iter().map(RefreshToken::as_str).collect();
        let mut conn = self.conn.clone();
        let _: () = conn
            .zrem(self.index_key(user_id), members)
            .await
            .map_err(store_error)?;
        Ok(())
    }

    async fn indexed_users(&self) -> Result<Vec<UserId>, StoreError> {
        let pattern = self.index_pattern();
        let strip = pattern.trim_end_matches('*').to_string();
        let mut conn = self.conn.clone();
        let mut cursor: u64 = 0;
        let mut users = Vec::new();

        loop {
            let (next, keys): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(SCAN_BATCH)
                .query_async(&mut conn)
                .await
                .map_err(store_error)?;

            for key in keys {
                match key.strip_prefix(&strip).map(str::parse::<UserId>) {
                    Some(Ok(user_id)) => users.push(user_id),
                    _ => debug!(%key, "skipping foreign key in index namespace"),
                }
            }

            if next == 0 {
                break;
            }
            cursor = next;
        }

        users.sort();
        users.dedup();
        Ok(users)
    }
}
