use crate::api::constants::*;
use crate::api::error::{Error, Result};
use serde::Deserialize;
use std::time::Duration;

/// Bounded exponential backoff applied after a failed long-polling request.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    /// Delay after the first failure (unit: milliseconds)
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    /// Upper bound of the delay (unit: milliseconds)
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

impl BackoffPolicy {
    /// Delay before the next attempt after `failures` consecutive failures.
    pub fn delay(&self, failures: u32) -> Duration {
        if failures == 0 {
            return Duration::ZERO;
        }
        let factor = 1u64 << (failures - 1).min(16);
        Duration::from_millis(
            self.base_delay_ms
                .saturating_mul(factor)
                .min(self.max_delay_ms),
        )
    }
}

/// Nacos config client settings.
#[derive(Debug, Deserialize, Clone)]
pub struct ClientConfig {
    /// The Nacos server address, `host:port`
    #[serde(default = "default_server_addr")]
    pub server_addr: String,
    #[serde(default = "default_scheme")]
    pub scheme: String,
    #[serde(default = "default_context_path")]
    pub context_path: String,
    /// Namespace (tenant) used when the caller passes an empty one; `""` is public.
    #[serde(default)]
    pub namespace: String,

    /// How long the server may hold a long-polling request (unit: milliseconds)
    #[serde(default = "default_long_polling_timeout")]
    pub long_polling_timeout: u64,
    /// Network margin on top of the long-polling hold, also the plain request timeout (unit: milliseconds)
    #[serde(default = "default_read_timeout")]
    pub read_timeout: u64,
    /// Budget of one listener invocation (unit: milliseconds)
    #[serde(default = "default_event_processing_timeout")]
    pub event_processing_timeout: u64,
    /// Wait before re-checking an empty watch set (unit: milliseconds)
    #[serde(default = "default_idle_interval")]
    pub idle_interval: u64,
    /// How long shutdown waits for in-flight fetch and notify tasks (unit: milliseconds)
    #[serde(default = "default_shutdown_grace")]
    pub shutdown_grace: u64,
    #[serde(default)]
    pub backoff: BackoffPolicy,

    #[serde(default = "default_fetching_pool_size")]
    pub fetching_pool_size: usize,
    #[serde(default = "default_fetching_thread_name")]
    pub fetching_thread_name: String,
    #[serde(default = "default_listening_thread_name")]
    pub listening_thread_name: String,
    #[serde(default = "default_publishing_pool_size")]
    pub publishing_pool_size: usize,
    #[serde(default = "default_publishing_thread_name")]
    pub publishing_thread_name: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_addr: default_server_addr(),
            scheme: default_scheme(),
            context_path: default_context_path(),
            namespace: String::new(),
            long_polling_timeout: default_long_polling_timeout(),
            read_timeout: default_read_timeout(),
            event_processing_timeout: default_event_processing_timeout(),
            idle_interval: default_idle_interval(),
            shutdown_grace: default_shutdown_grace(),
            backoff: BackoffPolicy::default(),
            fetching_pool_size: default_fetching_pool_size(),
            fetching_thread_name: default_fetching_thread_name(),
            listening_thread_name: default_listening_thread_name(),
            publishing_pool_size: default_publishing_pool_size(),
            publishing_thread_name: default_publishing_thread_name(),
        }
    }
}

impl ClientConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load from a TOML file, overridden by `NACOS_*` environment variables
    /// (e.g. `NACOS_SERVER_ADDR`, `NACOS_LONG_POLLING_TIMEOUT`).
    pub fn load(path: &str) -> Result<Self> {
        let config = ::config::Config::builder()
            .add_source(::config::File::with_name(path).required(false))
            .add_source(::config::Environment::with_prefix("NACOS").try_parsing(true))
            .build()?;
        let client_config: ClientConfig = config.try_deserialize()?;
        client_config.validate()?;
        Ok(client_config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.server_addr.trim().is_empty() {
            return Err(Error::InvalidConfig("server_addr must not be empty".into()));
        }
        if self.fetching_pool_size == 0 || self.publishing_pool_size == 0 {
            return Err(Error::InvalidConfig(
                "worker pool sizes must be greater than 0".into(),
            ));
        }
        if self.long_polling_timeout == 0 {
            return Err(Error::InvalidConfig(
                "long_polling_timeout must be greater than 0".into(),
            ));
        }
        Ok(())
    }

    /// `scheme://server_addr/context_path`, without a trailing slash.
    pub fn base_url(&self) -> String {
        let context_path = self.context_path.trim_matches('/');
        if context_path.is_empty() {
            format!("{}://{}", self.scheme, self.server_addr)
        } else {
            format!("{}://{}/{}", self.scheme, self.server_addr, context_path)
        }
    }

    pub fn server_addr(mut self, server_addr: impl Into<String>) -> Self {
        self.server_addr = server_addr.into();
        self
    }

    pub fn scheme(mut self, scheme: impl Into<String>) -> Self {
        self.scheme = scheme.into();
        self
    }

    pub fn context_path(mut self, context_path: impl Into<String>) -> Self {
        self.context_path = context_path.into();
        self
    }

    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    pub fn long_polling_timeout(mut self, timeout: Duration) -> Self {
        self.long_polling_timeout = timeout.as_millis() as u64;
        self
    }

    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout.as_millis() as u64;
        self
    }

    pub fn event_processing_timeout(mut self, timeout: Duration) -> Self {
        self.event_processing_timeout = timeout.as_millis() as u64;
        self
    }

    pub fn idle_interval(mut self, interval: Duration) -> Self {
        self.idle_interval = interval.as_millis() as u64;
        self
    }

    pub fn shutdown_grace(mut self, grace: Duration) -> Self {
        self.shutdown_grace = grace.as_millis() as u64;
        self
    }

    pub fn backoff(mut self, backoff: BackoffPolicy) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn fetching_pool(mut self, size: usize, thread_name: impl Into<String>) -> Self {
        self.fetching_pool_size = size;
        self.fetching_thread_name = thread_name.into();
        self
    }

    pub fn publishing_pool(mut self, size: usize, thread_name: impl Into<String>) -> Self {
        self.publishing_pool_size = size;
        self.publishing_thread_name = thread_name.into();
        self
    }

    pub(crate) fn long_polling_hold(&self) -> Duration {
        Duration::from_millis(self.long_polling_timeout)
    }

    pub(crate) fn read_timeout_duration(&self) -> Duration {
        Duration::from_millis(self.read_timeout)
    }

    pub(crate) fn event_processing_budget(&self) -> Duration {
        Duration::from_millis(self.event_processing_timeout)
    }

    pub(crate) fn idle_interval_duration(&self) -> Duration {
        Duration::from_millis(self.idle_interval)
    }

    pub(crate) fn shutdown_grace_duration(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace)
    }
}

fn default_server_addr() -> String {
    DEFAULT_SERVER_ADDR.to_string()
}
fn default_scheme() -> String {
    DEFAULT_SCHEME.to_string()
}
fn default_context_path() -> String {
    DEFAULT_CONTEXT_PATH.to_string()
}
fn default_long_polling_timeout() -> u64 {
    LONG_POLLING_TIMEOUT
}
fn default_read_timeout() -> u64 {
    READ_TIMEOUT
}
fn default_event_processing_timeout() -> u64 {
    EVENT_PROCESSING_TIMEOUT
}
fn default_idle_interval() -> u64 {
    IDLE_INTERVAL
}
fn default_shutdown_grace() -> u64 {
    SHUTDOWN_GRACE
}
fn default_base_delay_ms() -> u64 {
    1000
}
fn default_max_delay_ms() -> u64 {
    30000
}
fn default_fetching_pool_size() -> usize {
    DEFAULT_FETCHING_POOL_SIZE
}
fn default_fetching_thread_name() -> String {
    DEFAULT_FETCHING_CONFIG_THREAD_NAME.to_string()
}
fn default_listening_thread_name() -> String {
    DEFAULT_LISTENING_CONFIG_THREAD_NAME.to_string()
}
fn default_publishing_pool_size() -> usize {
    DEFAULT_PUBLISHING_POOL_SIZE
}
fn default_publishing_thread_name() -> String {
    DEFAULT_PUBLISHING_CONFIG_EVENT_THREAD_NAME.to_string()
}
