use crate::api::model::{ConfigDetail, HistoryConfig, NewConfig, Page};
use crate::api::{client_config, error};
use crate::common::remote::ConfigTransport;
use crate::config::target::WatchTarget;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::SystemTime;

/// Callback invoked with every change of a listened config.
pub type ConfigChangeListenFn = dyn Fn(&ConfigChangedEvent) + Send + Sync;

#[async_trait]
pub trait ConfigService: Send + Sync {
    /// Get config, return the content. `None` if the config does not exist.
    async fn get_config(
        &self,
        namespace: &str,
        group: &str,
        data_id: &str,
        tag: Option<&str>,
    ) -> error::Result<Option<String>>;

    /// Get config with all of its metadata.
    async fn get_config_detail(
        &self,
        namespace: &str,
        group: &str,
        data_id: &str,
    ) -> error::Result<Option<ConfigDetail>>;

    /// Create or overwrite a config.
    async fn publish_config(
        &self,
        namespace: &str,
        group: &str,
        data_id: &str,
        content: &str,
    ) -> error::Result<bool>;

    /// Create or overwrite a config together with its metadata.
    async fn publish_new_config(&self, config: NewConfig) -> error::Result<bool>;

    /// Delete a config.
    async fn remove_config(
        &self,
        namespace: &str,
        group: &str,
        data_id: &str,
        tag: Option<&str>,
    ) -> error::Result<bool>;

    /// Recorded revisions of a config, newest first. `page_number` is 1-based
    /// and `page_size` at most [`MAX_PAGE_SIZE`](crate::api::constants::MAX_PAGE_SIZE).
    async fn get_history_configs(
        &self,
        namespace: &str,
        group: &str,
        data_id: &str,
        page_number: u32,
        page_size: u32,
    ) -> error::Result<Page<HistoryConfig>>;

    async fn get_history_config(
        &self,
        namespace: &str,
        group: &str,
        data_id: &str,
        revision: i64,
    ) -> error::Result<Option<HistoryConfig>>;

    /// The revision before the current one, `id` being the config id from
    /// [`ConfigDetail::id`].
    async fn get_previous_history_config(
        &self,
        namespace: &str,
        group: &str,
        data_id: &str,
        id: &str,
    ) -> error::Result<Option<HistoryConfig>>;

    /// Listen the config change. Every call registers an independent listener,
    /// even when the same callback is passed twice.
    fn add_event_listener(
        &self,
        namespace: &str,
        group: &str,
        data_id: &str,
        tag: Option<&str>,
        listener: Arc<ConfigChangeListenFn>,
    ) -> ListenerHandle;

    /// Remove one listener; `false` if it was already removed.
    fn remove_event_listener(&self, handle: &ListenerHandle) -> bool;

    /// Stop polling and drain in-flight work within the configured grace period.
    async fn shutdown(&self);
}

/// What happened to a config.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ChangeKind {
    Created,
    Modified,
    Deleted,
}

/// A detected change of one config, shared by all of its listeners.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConfigChangedEvent {
    /// Namespace/Tenant
    namespace: String,
    /// DataId
    data_id: String,
    /// Group
    group: String,
    kind: ChangeKind,
    /// New content, or the last known content for [`ChangeKind::Deleted`].
    content: String,
    observed_at: SystemTime,
}

impl ConfigChangedEvent {
    pub(crate) fn new(target: &WatchTarget, kind: ChangeKind, content: String) -> Self {
        Self {
            namespace: target.namespace().to_string(),
            data_id: target.data_id().to_string(),
            group: target.group().to_string(),
            kind,
            content,
            observed_at: SystemTime::now(),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }
    pub fn data_id(&self) -> &str {
        &self.data_id
    }
    pub fn group(&self) -> &str {
        &self.group
    }
    pub fn kind(&self) -> ChangeKind {
        self.kind
    }
    pub fn content(&self) -> &str {
        &self.content
    }
    pub fn observed_at(&self) -> SystemTime {
        self.observed_at
    }
}

/// Identifies one registered listener, returned by
/// [`ConfigService::add_event_listener`].
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ListenerHandle {
    target: WatchTarget,
    id: u64,
}

impl ListenerHandle {
    pub(crate) fn new(target: WatchTarget, id: u64) -> Self {
        Self { target, id }
    }

    pub fn target(&self) -> &WatchTarget {
        &self.target
    }

    pub(crate) fn id(&self) -> u64 {
        self.id
    }
}

pub struct ConfigServiceBuilder {
    client_config: client_config::ClientConfig,
    transport: Option<Arc<dyn ConfigTransport>>,
}

impl Default for ConfigServiceBuilder {
    fn default() -> Self {
        ConfigServiceBuilder::new(client_config::ClientConfig::new())
    }
}

impl ConfigServiceBuilder {
    pub fn new(client_config: client_config::ClientConfig) -> Self {
        ConfigServiceBuilder {
            client_config,
            transport: None,
        }
    }

    /// Talk to the server through `transport` instead of the HTTP open API.
    pub fn transport(mut self, transport: Arc<dyn ConfigTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Builds a new [`ConfigService`] and starts listening on the current tokio runtime.
    pub async fn build(self) -> error::Result<impl ConfigService> {
        self.client_config.validate()?;
        let transport = match self.transport {
            Some(transport) => transport,
            None => default_transport(&self.client_config)?,
        };
        let config_service = crate::config::NacosConfigService::new(self.client_config, transport);
        config_service.start();
        Ok(config_service)
    }
}

#[cfg(feature = "http")]
fn default_transport(
    client_config: &client_config::ClientConfig,
) -> error::Result<Arc<dyn ConfigTransport>> {
    Ok(Arc::new(
        crate::common::remote::http::HttpConfigTransport::new(client_config)?,
    ))
}

#[cfg(not(feature = "http"))]
fn default_transport(
    _client_config: &client_config::ClientConfig,
) -> error::Result<Arc<dyn ConfigTransport>> {
    Err(error::Error::InvalidConfig(
        "no transport given and the `http` feature is disabled".into(),
    ))
}
