use crate::application_impl::{SessionRevocationIndex, StoreCall};
use crate::application_port::CallScope;
use crate::domain_port::RefreshTokenStore;
use crate::logger::*;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

/// Periodically drops per-user index entries whose token record is gone.
/// Readers already tolerate stale entries; this only keeps indices small.
pub struct IndexPruner {
    store: Arc<dyn RefreshTokenStore>,
    sessions: Arc<SessionRevocationIndex>,
    calls: StoreCall,
    interval: Duration,
    call_timeout: Duration,
    cancellation_token: CancellationToken,
}

impl IndexPruner {
    pub fn new(
        store: Arc<dyn RefreshTokenStore>,
        sessions: Arc<SessionRevocationIndex>,
        calls: StoreCall,
        interval: Duration,
        call_timeout: Duration,
        cancellation_token: CancellationToken,
    ) -> Self {
        Self {
            store,
            sessions,
            calls,
            interval,
            call_timeout,
            cancellation_token,
        }
    }

    fn scope(&self) -> CallScope {
        CallScope::with_timeout(self.call_timeout)
            .with_cancel(self.cancellation_token.child_token())
    }

    /// One pass over every indexed user. Returns the number of entries dropped.
    pub async fn tick_once(&self) -> anyhow::Result<usize> {
        let scope = self.scope();
        let users = self
            .calls
            .run(&scope, "indexed_users", || self.store.indexed_users())
            .await?;

        let mut pruned = 0;
        for user_id in users {
            if self.cancellation_token.is_cancelled() {
                break;
            }
            match self.sessions.prune(user_id, &self.scope()).await {
                Ok(n) => pruned += n,
                Err(e) => warn!(%user_id, error = %e, "index prune failed"),
            }
        }
        Ok(pruned)
    }

    pub async fn run(&self) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;
                _ = self.cancellation_token.cancelled() => {
                    info!("index pruner shutting down...");
                    break;
                }
                _ = ticker.tick() => {
                    match self.tick_once().await {
                        Ok(0) => {}
                        Ok(pruned) => debug!(pruned, "stale index entries dropped"),
                        Err(e) => error!("index pruner error: {:#}", e),
                    }
                }
            }
        }
    }
}
