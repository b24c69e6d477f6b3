use crate::domain_model::*;
use crate::domain_port::*;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::collections::HashMap;

/// Process-local refresh token store. Only suitable for a single instance;
/// expiry is enforced on read rather than by a background reaper.
#[derive(Default)]
pub struct MemoryRefreshTokenStore {
    records: DashMap<String, TokenRecord>,
    index: DashMap<UserId, HashMap<String, DateTime<Utc>>>,
}

impl MemoryRefreshTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn unindex(&self, user_id: UserId, tokens: &[RefreshToken]) {
        if let Some(mut entries) = self.index.get_mut(&user_id) {
            for token in tokens {
                entries.remove(token.as_str());
            }
        }
        self.index.remove_if(&user_id, |_, entries| entries.is_empty());
    }
}

#[async_trait::async_trait]
impl RefreshTokenStore for MemoryRefreshTokenStore {
    async fn store(
        &self,
        user_id: UserId,
        token: &RefreshToken,
        expires_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        if expires_at <= Utc::now() {
            return Ok(());
        }
        self.records.insert(
            token.as_str().to_string(),
            TokenRecord {
                user_id,
                expires_at,
            },
        );
        self.index
            .entry(user_id)
            .or_default()
            .insert(token.as_str().to_string(), expires_at);
        Ok(())
    }

    async fn get(&self, token: &RefreshToken) -> Result<Option<TokenRecord>, StoreError> {
        let now = Utc::now();
        let record = self.records.get(token.as_str()).map(|r| r.clone());
        match record {
            Some(record) if record.is_expired_at(now) => {
                self.records
                    .remove_if(token.as_str(), |_, r| r.is_expired_at(now));
                Ok(None)
            }
            other => Ok(other),
        }
    }

    async fn consume(&self, token: &RefreshToken) -> Result<Option<TokenRecord>, StoreError> {
        let Some((_, record)) = self.records.remove(token.as_str()) else {
            return Ok(None);
        };
        self.unindex(record.user_id, std::slice::from_ref(token));
        if record.is_expired_at(Utc::now()) {
            return Ok(None);
        }
        Ok(Some(record))
    }

    async fn delete(&self, token: &RefreshToken) -> Result<(), StoreError> {
        self.consume(token).await.map(|_| ())
    }

    async fn revoke_all(&self, user_id: UserId) -> Result<usize, StoreError> {
        let Some((_, entries)) = self.index.remove(&user_id) else {
            return Ok(0);
        };
        let now = Utc::now();
        let revoked = entries
            .keys()
            .filter_map(|token| self.records.remove(token))
            .filter(|(_, record)| !record.is_expired_at(now))
            .count();
        Ok(revoked)
    }

    async fn list_index(&self, user_id: UserId) -> Result<Vec<SessionEntry>, StoreError> {
        let now = Utc::now();
        let mut listed = match self.index.get_mut(&user_id) {
            Some(mut entries) => {
                entries.retain(|_, expires_at| *expires_at > now);
                entries
                    .iter()
                    .map(|(token, expires_at)| SessionEntry {
                        token: RefreshToken(token.clone()),
                        expires_at: *expires_at,
                    })
                    .collect::<Vec<_>>()
            }
            None => Vec::new(),
        };
        self.index.remove_if(&user_id, |_, entries| entries.is_empty());
        listed.sort_by_key(|entry| entry.expires_at);
        Ok(listed)
    }

    async fn remove_index_entries(
        &self,
        user_id: UserId,
        tokens: &[RefreshToken],
    ) -> Result<(), StoreError> {
        self.unindex(user_id, tokens);
        Ok(())
    }

    async fn indexed_users(&self) -> Result<Vec<UserId>, StoreError> {
        Ok(self.index.iter().map(|entry| *entry.key()).collect())
    }
}
