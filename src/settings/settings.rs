use crate::application_impl::{JwtConfig, RetryPolicy, SigningAlgorithm, UserEntry};
use anyhow::{Result, anyhow};
use config::{Config, Environment, File};
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Deserialize)]
pub struct Settings {
    pub http: Http,
    pub log: Log,
    pub store: Store,
    pub token: Token,
    pub users: Users,
}

#[derive(Debug, Deserialize)]
pub struct Http {
    pub address: String,
    /// Plain HTTP when absent. Only meant for local development.
    pub tls: Option<Tls>,
    /// Drop the `Secure` attribute from the refresh cookie. Never in release.
    #[serde(default)]
    pub insecure_cookie: bool,
}

#[derive(Debug, Deserialize)]
pub struct Tls {
    pub cert_path: String,
    pub key_path: String,
}

#[derive(Debug, Deserialize)]
pub struct Log {
    pub filter: String,
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Redis,
    Memory,
}

#[derive(Debug, Deserialize)]
pub struct Store {
    pub backend: StoreBackend,
    #[serde(default)]
    pub redis_url: Option<String>,
    pub prefix: String,
    pub call_timeout_ms: u64,
    pub retry_attempts: u32,
    pub retry_base_ms: u64,
    pub retry_max_ms: u64,
    pub prune_interval_secs: u64,
}

impl Store {
    pub fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.call_timeout_ms)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.retry_attempts.max(1),
            base_delay: Duration::from_millis(self.retry_base_ms),
            max_delay: Duration::from_millis(self.retry_max_ms),
        }
    }

    pub fn prune_interval(&self) -> Duration {
        Duration::from_secs(self.prune_interval_secs.max(1))
    }
}

#[derive(Debug, Deserialize)]
pub struct Token {
    pub issuer: String,
    pub algorithm: SigningAlgorithm,
    pub private_key_path: String,
    pub public_key_path: String,
    pub access_ttl_secs: u64,
    pub refresh_ttl_secs: u64,
}

impl Token {
    pub fn jwt_config(&self) -> JwtConfig {
        JwtConfig {
            issuer: self.issuer.clone(),
            algorithm: self.algorithm,
            access_ttl: Duration::from_secs(self.access_ttl_secs),
            refresh_ttl: Duration::from_secs(self.refresh_ttl_secs),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct Users {
    pub backend: String, // "static" only for now
    #[serde(default)]
    pub entries: Vec<UserEntry>,
}

#[cfg(debug_assertions)]
const SETTINGS_PATH: &str = "settings/dev.toml";
#[cfg(not(debug_assertions))]
const SETTINGS_PATH: &str = "settings/release.toml";

/// Reads the settings file, then lets `CREDENCE__SECTION__KEY` environment
/// variables override individual values.
pub fn parse_settings(path: Option<&str>) -> Result<Settings> {
    let path = path.unwrap_or(SETTINGS_PATH);

    let settings: Settings = Config::builder()
        .add_source(File::with_name(path))
        .add_source(Environment::with_prefix("CREDENCE").separator("__"))
        .build()
        .map_err(|e| anyhow!(e))?
        .try_deserialize()
        .map_err(|e| anyhow!(e))?;

    if settings.token.access_ttl_secs == 0 || settings.token.refresh_ttl_secs == 0 {
        return Err(anyhow!("token lifetimes must be positive"));
    }
    if settings.store.backend == StoreBackend::Redis && settings.store.redis_url.is_none() {
        return Err(anyhow!("store.redis_url is required for the redis backend"));
    }

    Ok(settings)
}
