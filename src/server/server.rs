use crate::application_impl::*;
use crate::application_port::*;
use crate::domain_port::*;
use crate::infra_memory::*;
use crate::infra_redis::*;
use crate::logger::*;
use crate::server::IndexPruner;
use crate::settings::{Settings, StoreBackend};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Per-request knobs the HTTP layer needs from the settings.
#[derive(Debug, Clone)]
pub struct HttpOptions {
    pub call_timeout: Duration,
    pub secure_cookie: bool,
    pub refresh_ttl: Duration,
}

pub struct Server {
    pub auth_service: Arc<dyn AuthService>,
    pub http_options: HttpOptions,
    pruner_handle: Mutex<Option<JoinHandle<()>>>,
    cancel: CancellationToken,
}

impl Server {
    pub async fn try_new(settings: &Settings) -> anyhow::Result<Self> {
        let (store, marks): (Arc<dyn RefreshTokenStore>, Arc<dyn ReplayMarkStore>) =
            match settings.store.backend {
                StoreBackend::Redis => {
                    let url = settings
                        .store
                        .redis_url
                        .as_deref()
                        .ok_or_else(|| anyhow::anyhow!("store.redis_url is not set"))?;
                    let redis_client = redis::Client::open(url)?;
                    let redis_manager = redis_client.get_connection_manager().await?;
                    (
                        Arc::new(RedisRefreshTokenStore::new(
                            redis_manager.clone(),
                            settings.store.prefix.clone(),
                        )),
                        Arc::new(RedisReplayMarkStore::new(
                            redis_manager,
                            settings.store.prefix.clone(),
                        )),
                    )
                }
                StoreBackend::Memory => {
                    warn!("using in-memory token store; sessions do not survive a restart");
                    (
                        Arc::new(MemoryRefreshTokenStore::new()),
                        Arc::new(MemoryReplayMarkStore::new()),
                    )
                }
            };

        let users: Arc<dyn UserDirectory> = match settings.users.backend.as_str() {
            "static" => Arc::new(StaticUserDirectory::new(settings.users.entries.clone())?),
            other => return Err(anyhow::anyhow!("Unknown users backend: {}", other)),
        };

        let keys = KeyPair::load(
            &settings.token.private_key_path,
            &settings.token.public_key_path,
        )?;
        let signer: Arc<dyn CredentialSigner> =
            Arc::new(JwtCredentialSigner::new(settings.token.jwt_config(), &keys)?);

        Ok(Self::assemble(settings, signer, store, marks, users))
    }

    /// Wire the services around already constructed ports and start the
    /// background tasks.
    pub fn assemble(
        settings: &Settings,
        signer: Arc<dyn CredentialSigner>,
        store: Arc<dyn RefreshTokenStore>,
        marks: Arc<dyn ReplayMarkStore>,
        users: Arc<dyn UserDirectory>,
    ) -> Self {
        let calls = StoreCall::new(settings.store.retry_policy());
        let sessions = Arc::new(SessionRevocationIndex::new(store.clone(), calls));
        let replay_guard = Arc::new(ReplayGuard::new(marks, sessions.clone(), calls));
        let auth_service: Arc<dyn AuthService> = Arc::new(RotationCoordinator::new(
            signer,
            store.clone(),
            replay_guard,
            sessions.clone(),
            users,
            calls,
        ));

        let cancel = CancellationToken::new();
        let pruner = IndexPruner::new(
            store,
            sessions,
            calls,
            settings.store.prune_interval(),
            settings.store.call_timeout(),
            cancel.clone(),
        );
        let pruner_handle = tokio::spawn(async move { pruner.run().await });

        info!(backend = ?settings.store.backend, "server started");

        Self {
            auth_service,
            http_options: HttpOptions {
                call_timeout: settings.store.call_timeout(),
                secure_cookie: !settings.http.insecure_cookie,
                refresh_ttl: Duration::from_secs(settings.token.refresh_ttl_secs),
            },
            pruner_handle: Mutex::new(Some(pruner_handle)),
            cancel,
        }
    }

    /// Scope for the store calls of one request. Cancelled at shutdown.
    pub fn call_scope(&self) -> CallScope {
        CallScope::with_timeout(self.http_options.call_timeout)
            .with_cancel(self.cancel.child_token())
    }

    pub async fn shutdown(&self) {
        info!("server shutting down...");

        self.cancel.cancel();

        let handle = self.pruner_handle.lock().ok().and_then(|mut lock| lock.take());
        if let Some(handle) = handle {
            let r = handle.await;
            info!("index pruner handle dropped: {:?}", r);
        }
    }
}
