pub(crate) mod cache;
mod fetch;
mod notify;
#[cfg(feature = "http")]
pub(crate) mod server_response;
pub(crate) mod target;
mod worker;

use crate::api::client_config::ClientConfig;
use crate::api::config::{ConfigChangeListenFn, ConfigService, ListenerHandle};
use crate::api::constants::MAX_PAGE_SIZE;
use crate::api::error::{Error, Result};
use crate::api::model::{ConfigDetail, HistoryConfig, NewConfig, Page};
use crate::common::remote::ConfigTransport;
use crate::config::cache::WatchRegistry;
use crate::config::fetch::FetchStage;
use crate::config::notify::NotifyStage;
use crate::config::target::WatchTarget;
use crate::config::worker::ConfigWorker;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

pub(crate) struct NacosConfigService {
    client_config: ClientConfig,
    transport: Arc<dyn ConfigTransport>,
    registry: Arc<WatchRegistry>,
    fetch: Arc<FetchStage>,
    notify: Arc<NotifyStage>,
    cancel: CancellationToken,
    worker_handle: Mutex<Option<JoinHandle<()>>>,
}

impl NacosConfigService {
    /// Must be called within a tokio runtime, the worker pools start here.
    pub(crate) fn new(client_config: ClientConfig, transport: Arc<dyn ConfigTransport>) -> Self {
        let registry = Arc::new(WatchRegistry::new());
        let notify = Arc::new(NotifyStage::new(
            registry.clone(),
            &client_config.publishing_thread_name,
            client_config.publishing_pool_size,
            client_config.event_processing_budget(),
        ));
        let fetch = Arc::new(FetchStage::new(
            registry.clone(),
            transport.clone(),
            notify.clone(),
            &client_config.fetching_thread_name,
            client_config.fetching_pool_size,
        ));
        NacosConfigService {
            client_config,
            transport,
            registry,
            fetch,
            notify,
            cancel: CancellationToken::new(),
            worker_handle: Mutex::new(None),
        }
    }

    /// Spawn the long-polling loop, once.
    pub(crate) fn start(&self) {
        let mut worker_handle = self.worker_handle.lock();
        if worker_handle.is_some() || self.cancel.is_cancelled() {
            return;
        }
        let worker = ConfigWorker::new(
            self.client_config.clone(),
            self.registry.clone(),
            self.transport.clone(),
            self.fetch.clone(),
            self.cancel.clone(),
        );
        *worker_handle = Some(worker.spawn());
    }

    fn target(&self, namespace: &str, group: &str, data_id: &str, tag: Option<&str>) -> WatchTarget {
        let namespace = if namespace.is_empty() {
            self.client_config.namespace.as_str()
        } else {
            namespace
        };
        WatchTarget::new(namespace, group, data_id, tag)
    }

    fn ensure_running(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            Err(Error::Shutdown)
        } else {
            Ok(())
        }
    }
}

impl Drop for NacosConfigService {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

#[async_trait]
impl ConfigService for NacosConfigService {
    async fn get_config(
        &self,
        namespace: &str,
        group: &str,
        data_id: &str,
        tag: Option<&str>,
    ) -> Result<Option<String>> {
        self.ensure_running()?;
        let target = self.target(namespace, group, data_id, tag);
        match self.transport.fetch(&target).await {
            Ok(config) => Ok(config.map(|c| c.content)),
            Err(Error::NotFound) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn get_config_detail(
        &self,
        namespace: &str,
        group: &str,
        data_id: &str,
    ) -> Result<Option<ConfigDetail>> {
        self.ensure_running()?;
        let target = self.target(namespace, group, data_id, None);
        match self.transport.fetch_detail(&target).await {
            Err(Error::NotFound) => Ok(None),
            other => other,
        }
    }

    async fn publish_config(
        &self,
        namespace: &str,
        group: &str,
        data_id: &str,
        content: &str,
    ) -> Result<bool> {
        self.publish_new_config(NewConfig::new(namespace, group, data_id, content))
            .await
    }

    async fn publish_new_config(&self, mut config: NewConfig) -> Result<bool> {
        self.ensure_running()?;
        if config.namespace.is_empty() {
            config.namespace = self.client_config.namespace.clone();
        }
        self.transport.publish(&config).await
    }

    async fn remove_config(
        &self,
        namespace: &str,
        group: &str,
        data_id: &str,
        tag: Option<&str>,
    ) -> Result<bool> {
        self.ensure_running()?;
        let target = self.target(namespace, group, data_id, tag);
        self.transport.remove(&target).await
    }

    async fn get_history_configs(
        &self,
        namespace: &str,
        group: &str,
        data_id: &str,
        page_number: u32,
        page_size: u32,
    ) -> Result<Page<HistoryConfig>> {
        self.ensure_running()?;
        if page_number < 1 {
            return Err(Error::InvalidArgument(
                "page_number must be greater than 0".into(),
            ));
        }
        if page_size < 1 || page_size > MAX_PAGE_SIZE {
            return Err(Error::InvalidArgument(format!(
                "page_size must be within 1..={MAX_PAGE_SIZE}"
            )));
        }
        let target = self.target(namespace, group, data_id, None);
        self.transport.history(&target, page_number, page_size).await
    }

    async fn get_history_config(
        &self,
        namespace: &str,
        group: &str,
        data_id: &str,
        revision: i64,
    ) -> Result<Option<HistoryConfig>> {
        self.ensure_running()?;
        let target = self.target(namespace, group, data_id, None);
        match self.transport.history_revision(&target, revision).await {
            Err(Error::NotFound) => Ok(None),
            other => other,
        }
    }

    async fn get_previous_history_config(
        &self,
        namespace: &str,
        group: &str,
        data_id: &str,
        id: &str,
    ) -> Result<Option<HistoryConfig>> {
        self.ensure_running()?;
        let target = self.target(namespace, group, data_id, None);
        match self.transport.previous_history(&target, id).await {
            Err(Error::NotFound) => Ok(None),
            other => other,
        }
    }

    fn add_event_listener(
        &self,
        namespace: &str,
        group: &str,
        data_id: &str,
        tag: Option<&str>,
        listener: Arc<ConfigChangeListenFn>,
    ) -> ListenerHandle {
        let target = self.target(namespace, group, data_id, tag);
        if self.cancel.is_cancelled() {
            tracing::warn!(group_key = %target, "listener added after shutdown, it will not be notified");
        }
        let handle = self.registry.register(target, listener);
        tracing::info!(group_key = %handle.target(), "add config listener");
        handle
    }

    fn remove_event_listener(&self, handle: &ListenerHandle) -> bool {
        let removed = self.registry.unregister(handle);
        if removed {
            tracing::info!(group_key = %handle.target(), "remove config listener");
        }
        removed
    }

    async fn shutdown(&self) {
        self.cancel.cancel();
        let worker_handle = self.worker_handle.lock().take();
        if let Some(handle) = worker_handle {
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "config long polling task failed");
            }
        }

        let deadline = tokio::time::Instant::now() + self.client_config.shutdown_grace_duration();
        self.fetch
            .shutdown(deadline.saturating_duration_since(tokio::time::Instant::now()))
            .await;
        self.notify
            .shutdown(deadline.saturating_duration_since(tokio::time::Instant::now()))
            .await;
        tracing::info!("config service shut down");
    }
}
