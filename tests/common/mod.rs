#![allow(dead_code)]

use argon2::password_hash::SaltString;
use argon2::password_hash::rand_core::OsRng;
use argon2::{Argon2, PasswordHasher};
use chrono::{DateTime, Utc};
use credence::application_impl::*;
use credence::application_port::*;
use credence::domain_model::*;
use credence::domain_port::*;
use credence::infra_memory::*;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const ED_PRIVATE: &[u8] = include_bytes!("../fixtures/ed25519.pem");
pub const ED_PUBLIC: &[u8] = include_bytes!("../fixtures/ed25519.pub.pem");

pub const ALICE: &str = "alice@example.com";
pub const BOB: &str = "bob@example.com";
pub const PASSWORD: &str = "hunter2-but-longer";

pub fn hash(password: &str) -> String {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .unwrap()
        .to_string()
}

pub fn signer(access_ttl: Duration, refresh_ttl: Duration) -> Arc<JwtCredentialSigner> {
    Arc::new(
        JwtCredentialSigner::new(
            JwtConfig {
                issuer: "credence.test".to_string(),
                algorithm: SigningAlgorithm::EdDsa,
                access_ttl,
                refresh_ttl,
            },
            &KeyPair::from_pem(ED_PRIVATE, ED_PUBLIC),
        )
        .unwrap(),
    )
}

pub fn scope() -> CallScope {
    CallScope::with_timeout(Duration::from_secs(2))
}

pub fn fast_retry() -> StoreCall {
    StoreCall::new(RetryPolicy {
        max_attempts: 3,
        base_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(5),
    })
}

/// User directory whose accounts can be removed mid-test.
pub struct TestUsers {
    inner: StaticUserDirectory,
    removed: Mutex<HashSet<UserId>>,
}

impl TestUsers {
    pub fn new() -> Self {
        let hashed = hash(PASSWORD);
        let entries = [(ALICE, "admin"), (BOB, "user")]
            .into_iter()
            .map(|(email, role)| UserEntry {
                email: email.to_string(),
                user_id: None,
                role: role.to_string(),
                password_hash: hashed.clone(),
            })
            .collect();
        Self {
            inner: StaticUserDirectory::new(entries).unwrap(),
            removed: Mutex::new(HashSet::new()),
        }
    }

    pub fn remove(&self, user_id: UserId) {
        self.removed.lock().unwrap().insert(user_id);
    }
}

#[async_trait::async_trait]
impl UserDirectory for TestUsers {
    async fn authenticate(&self, email: &str, password: &str) -> Result<Principal, AuthError> {
        let principal = self.inner.authenticate(email, password).await?;
        if self.removed.lock().unwrap().contains(&principal.user_id) {
            return Err(AuthError::InvalidCredentials);
        }
        Ok(principal)
    }

    async fn find(&self, user_id: UserId) -> Result<Option<Principal>, AuthError> {
        if self.removed.lock().unwrap().contains(&user_id) {
            return Ok(None);
        }
        self.inner.find(user_id).await
    }
}

#[derive(Default)]
pub struct Faults {
    /// Fail this many calls of each listed operation with `Unavailable`.
    pub unavailable: Mutex<HashMap<&'static str, u32>>,
    /// Operations that sleep before answering.
    pub delay: Mutex<Option<Duration>>,
    /// Run `consume` for real, then report `Unavailable` as if the reply was lost.
    pub lose_consume_reply: Mutex<bool>,
    /// Tokens whose record reads as absent while their index entry stays.
    pub forgotten: Mutex<HashSet<String>>,
    pub calls: Mutex<HashMap<&'static str, u32>>,
}

/// Memory store with injectable faults, used to exercise the store call
/// discipline and stale index handling.
pub struct FaultyStore {
    pub inner: MemoryRefreshTokenStore,
    pub faults: Faults,
}

impl FaultyStore {
    pub fn new() -> Self {
        Self {
            inner: MemoryRefreshTokenStore::new(),
            faults: Faults::default(),
        }
    }

    pub fn fail(&self, op: &'static str, times: u32) {
        self.faults.unavailable.lock().unwrap().insert(op, times);
    }

    pub fn forget(&self, token: &RefreshToken) {
        self.faults
            .forgotten
            .lock()
            .unwrap()
            .insert(token.as_str().to_string());
    }

    pub fn calls(&self, op: &'static str) -> u32 {
        *self.faults.calls.lock().unwrap().get(op).unwrap_or(&0)
    }

    async fn enter(&self, op: &'static str) -> Result<(), StoreError> {
        *self.faults.calls.lock().unwrap().entry(op).or_default() += 1;
        let delay = *self.faults.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let mut unavailable = self.faults.unavailable.lock().unwrap();
        if let Some(left) = unavailable.get_mut(op) {
            if *left > 0 {
                *left -= 1;
                return Err(StoreError::Unavailable(format!("{} injected", op)));
            }
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl RefreshTokenStore for FaultyStore {
    async fn store(
        &self,
        user_id: UserId,
        token: &RefreshToken,
        expires_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        self.enter("store").await?;
        self.inner.store(user_id, token, expires_at).await
    }

    async fn get(&self, token: &RefreshToken) -> Result<Option<TokenRecord>, StoreError> {
        self.enter("get").await?;
        if self.faults.forgotten.lock().unwrap().contains(token.as_str()) {
            return Ok(None);
        }
        self.inner.get(token).await
    }

    async fn consume(&self, token: &RefreshToken) -> Result<Option<TokenRecord>, StoreError> {
        self.enter("consume").await?;
        let consumed = self.inner.consume(token).await?;
        if *self.faults.lose_consume_reply.lock().unwrap() {
            return Err(StoreError::Unavailable("reply lost".into()));
        }
        Ok(consumed)
    }

    async fn delete(&self, token: &RefreshToken) -> Result<(), StoreError> {
        self.enter("delete").await?;
        self.inner.delete(token).await
    }

    async fn revoke_all(&self, user_id: UserId) -> Result<usize, StoreError> {
        self.enter("revoke_all").await?;
        self.inner.revoke_all(user_id).await
    }

    async fn list_index(&self, user_id: UserId) -> Result<Vec<SessionEntry>, StoreError> {
        self.enter("list_index").await?;
        self.inner.list_index(user_id).await
    }

    async fn remove_index_entries(
        &self,
        user_id: UserId,
        tokens: &[RefreshToken],
    ) -> Result<(), StoreError> {
        self.enter("remove_index_entries").await?;
        self.inner.remove_index_entries(user_id, tokens).await
    }

    async fn indexed_users(&self) -> Result<Vec<UserId>, StoreError> {
        self.enter("indexed_users").await?;
        self.inner.indexed_users().await
    }
}

pub struct Harness {
    pub service: Arc<RotationCoordinator>,
    pub store: Arc<FaultyStore>,
    pub marks: Arc<MemoryReplayMarkStore>,
    pub sessions: Arc<SessionRevocationIndex>,
    pub replay_guard: Arc<ReplayGuard>,
    pub users: Arc<TestUsers>,
    pub signer: Arc<JwtCredentialSigner>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_ttls(Duration::from_secs(300), Duration::from_secs(3600))
    }

    pub fn with_ttls(access_ttl: Duration, refresh_ttl: Duration) -> Self {
        let store = Arc::new(FaultyStore::new());
        let marks = Arc::new(MemoryReplayMarkStore::new());
        let users = Arc::new(TestUsers::new());
        let signer = signer(access_ttl, refresh_ttl);
        let calls = fast_retry();

        let sessions = Arc::new(SessionRevocationIndex::new(store.clone(), calls));
        let replay_guard = Arc::new(ReplayGuard::new(marks.clone(), sessions.clone(), calls));
        let service = Arc::new(RotationCoordinator::new(
            signer.clone(),
            store.clone(),
            replay_guard.clone(),
            sessions.clone(),
            users.clone(),
            calls,
        ));

        Self {
            service,
            store,
            marks,
            sessions,
            replay_guard,
            users,
            signer,
        }
    }

    pub async fn login(&self, email: &str) -> LoginResult {
        self.service
            .login(
                LoginInput {
                    email: email.to_string(),
                    password: PASSWORD.to_string(),
                },
                &scope(),
            )
            .await
            .unwrap()
    }

    pub async fn refresh(&self, token: &RefreshToken) -> Result<TokenPair, AuthError> {
        self.refresh_with_hint(token, None).await
    }

    pub async fn refresh_with_hint(
        &self,
        token: &RefreshToken,
        access_hint: Option<&AccessToken>,
    ) -> Result<TokenPair, AuthError> {
        self.service
            .refresh(
                RefreshInput {
                    refresh_token: token.clone(),
                    access_hint: access_hint.map(|t| t.0.clone()),
                },
                &scope(),
            )
            .await
    }
}
