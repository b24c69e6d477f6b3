use crate::domain_model::UserId;
use crate::domain_port::*;
use dashmap::DashMap;
use std::time::{Duration, Instant};

/// Marks beyond this count trigger a sweep of expired ones on the next write.
const SWEEP_THRESHOLD: usize = 10_000;

#[derive(Default)]
pub struct MemoryReplayMarkStore {
    marks: DashMap<String, (UserId, Instant)>,
}

impl MemoryReplayMarkStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sweep(&self) {
        let now = Instant::now();
        self.marks.retain(|_, (_, expires_at)| *expires_at > now);
    }

    pub fn len(&self) -> usize {
        self.marks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.marks.is_empty()
    }
}

#[async_trait::async_trait]
impl ReplayMarkStore for MemoryReplayMarkStore {
    async fn mark_consumed(
        &self,
        jti: &str,
        owner: UserId,
        ttl: Duration,
    ) -> Result<(), StoreError> {
        if self.marks.len() > SWEEP_THRESHOLD {
            self.sweep();
        }
        self.marks
            .insert(jti.to_string(), (owner, Instant::now() + ttl));
        Ok(())
    }

    async fn consumed_by(&self, jti: &str) -> Result<Option<UserId>, StoreError> {
        let now = Instant::now();
        let mark = self.marks.get(jti).map(|m| *m);
        match mark {
            Some((owner, expires_at)) if expires_at > now => Ok(Some(owner)),
            Some(_) => {
                self.marks.remove_if(jti, |_, (_, expires_at)| *expires_at <= now);
                Ok(None)
            }
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn marked_jti_reports_owner() {
        let store = MemoryReplayMarkStore::new();
        let owner = UserId(uuid::Uuid::new_v4());
        assert!(store.consumed_by("jti-1").await.unwrap().is_none());

        store
            .mark_consumed("jti-1", owner, Duration::from_secs(60))
            .await
            .unwrap();
        assert_eq!(store.consumed_by("jti-1").await.unwrap(), Some(owner));
        assert!(store.consumed_by("jti-2").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn marks_expire() {
        let store = MemoryReplayMarkStore::new();
        let owner = UserId(uuid::Uuid::new_v4());
        store
            .mark_consumed("short", owner, Duration::from_millis(5))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert!(store.consumed_by("short").await.unwrap().is_none());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn sweep_drops_only_expired_marks() {
        let store = MemoryReplayMarkStore::new();
        let owner = UserId(uuid::Uuid::new_v4());
        store
            .mark_consumed("short", owner, Duration::from_millis(1))
            .await
            .unwrap();
        store
            .mark_consumed("long", owner, Duration::from_secs(60))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;

        store.sweep();
        assert_eq!(store.len(), 1);
        assert!(store.consumed_by("long").await.unwrap().is_some());
    }
}
