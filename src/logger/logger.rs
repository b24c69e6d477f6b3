use anyhow::{Result, anyhow};
use tracing_subscriber::{
    EnvFilter, Registry, fmt, layer::SubscriberExt, reload, util::SubscriberInitExt,
};

/// Security events (token reuse, mass revocation) are logged under this
/// target so they can be routed and alerted on separately.
pub const SECURITY_TARGET: &str = "security";

/// Used until the settings file has been read.
const BOOTSTRAP_FILTER: &str = "info";

pub struct LogConfig {
    pub filter: String,
}

impl LogConfig {
    /// The configured filter, with security events kept at `warn` or louder
    /// unless the filter already says something about them.
    pub fn env_filter(&self) -> Result<EnvFilter> {
        let mut directives = self.filter.clone();
        if !directives.contains(SECURITY_TARGET) {
            if !directives.is_empty() {
                directives.push(',');
            }
            directives.push_str(SECURITY_TARGET);
            directives.push_str("=warn");
        }
        EnvFilter::try_new(&directives).map_err(|e| anyhow!(e))
    }
}

pub struct Logger {
    reload_handle: reload::Handle<EnvFilter, Registry>,
}

impl Logger {
    pub fn new_bootstrap() -> Self {
        let filter = EnvFilter::new(BOOTSTRAP_FILTER);
        let (filter, reload_handle) = reload::Layer::new(filter);

        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true))
            .init();

        Self { reload_handle }
    }

    pub fn reload_from_config(&self, config: &LogConfig) -> Result<()> {
        let filter = config.env_filter()?;
        self.reload_handle.reload(filter).map_err(|e| anyhow!(e))?;
        Ok(())
    }
}
