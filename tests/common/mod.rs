#![allow(dead_code)]

use async_trait::async_trait;
use nacos_config_watcher::api::client_config::{BackoffPolicy, ClientConfig};
use nacos_config_watcher::api::config::{ConfigChangeListenFn, ConfigChangedEvent};
use nacos_config_watcher::api::model::NewConfig;
use nacos_config_watcher::{ConfigContent, ConfigTransport, Error, Result, WatchItem, WatchTarget};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Notify};

type ConfigKey = (String, String, String);

/// In-memory config server answering long polls like Nacos does.
#[derive(Default)]
pub struct FakeServer {
    configs: Mutex<HashMap<ConfigKey, String>>,
    changed: Notify,
    batches: Mutex<Vec<Vec<WatchItem>>>,
    failing_fetches: AtomicUsize,
    fetches: AtomicUsize,
}

fn key(target: &WatchTarget) -> ConfigKey {
    (
        target.namespace().to_string(),
        target.group().to_string(),
        target.data_id().to_string(),
    )
}

impl FakeServer {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Change a config behind the client's back.
    pub fn put(&self, namespace: &str, group: &str, data_id: &str, content: &str) {
        self.configs.lock().insert(
            (namespace.into(), group.into(), data_id.into()),
            content.into(),
        );
        self.changed.notify_waiters();
    }

    pub fn delete(&self, namespace: &str, group: &str, data_id: &str) {
        self.configs
            .lock()
            .remove(&(namespace.into(), group.into(), data_id.into()));
        self.changed.notify_waiters();
    }

    /// Make the next `n` fetches fail with a transport error.
    pub fn fail_next_fetches(&self, n: usize) {
        self.failing_fetches.store(n, Ordering::SeqCst);
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    pub fn batch_count(&self) -> usize {
        self.batches.lock().len()
    }

    pub fn last_batch(&self) -> Option<Vec<WatchTarget>> {
        self.batches
            .lock()
            .last()
            .map(|batch| batch.iter().map(|item| item.target.clone()).collect())
    }

    fn digest_of(&self, target: &WatchTarget) -> String {
        self.configs
            .lock()
            .get(&key(target))
            .map(|content| ConfigContent::new(content.as_str()).digest)
            .unwrap_or_default()
    }

    fn diff(&self, batch: &[WatchItem]) -> HashSet<WatchTarget> {
        batch
            .iter()
            .filter(|item| self.digest_of(&item.target) != item.digest)
            .map(|item| item.target.clone())
            .collect()
    }
}

#[async_trait]
impl ConfigTransport for FakeServer {
    async fn listen(&self, batch: &[WatchItem], hold: Duration) -> Result<HashSet<WatchTarget>> {
        self.batches.lock().push(batch.to_vec());
        let deadline = tokio::time::Instant::now() + hold;
        loop {
            let notified = self.changed.notified();
            let changed = self.diff(batch);
            if !changed.is_empty() {
                return Ok(changed);
            }
            tokio::select! {
                _ = notified => {}
                _ = tokio::time::sleep_until(deadline) => return Ok(HashSet::new()),
            }
        }
    }

    async fn fetch(&self, target: &WatchTarget) -> Result<Option<ConfigContent>> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        let failing = self.failing_fetches.load(Ordering::SeqCst);
        if failing > 0 {
            self.failing_fetches.store(failing - 1, Ordering::SeqCst);
            return Err(Error::Transport("connection reset".into()));
        }
        Ok(self
            .configs
            .lock()
            .get(&key(target))
            .map(|content| ConfigContent::new(content.as_str())))
    }

    async fn publish(&self, config: &NewConfig) -> Result<bool> {
        self.put(&config.namespace, &config.group, &config.data_id, &config.content);
        Ok(true)
    }

    async fn remove(&self, target: &WatchTarget) -> Result<bool> {
        self.delete(target.namespace(), target.group(), target.data_id());
        Ok(true)
    }
}

pub fn client_config() -> ClientConfig {
    ClientConfig::new()
        .long_polling_timeout(Duration::from_millis(300))
        .read_timeout(Duration::from_millis(100))
        .event_processing_timeout(Duration::from_millis(200))
        .idle_interval(Duration::from_millis(10))
        .shutdown_grace(Duration::from_millis(500))
        .backoff(BackoffPolicy {
            base_delay_ms: 10,
            max_delay_ms: 50,
        })
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_env_filter("nacos_config_watcher=debug")
        .try_init();
}

/// A listener forwarding events into a channel.
pub fn channel_listener() -> (
    Arc<ConfigChangeListenFn>,
    mpsc::UnboundedReceiver<ConfigChangedEvent>,
) {
    let (tx, rx) = mpsc::unbounded_channel();
    let listener: Arc<ConfigChangeListenFn> = Arc::new(move |event: &ConfigChangedEvent| {
        let _ = tx.send(event.clone());
    });
    (listener, rx)
}

pub async fn next_event(rx: &mut mpsc::UnboundedReceiver<ConfigChangedEvent>) -> ConfigChangedEvent {
    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("no event within 5s")
        .expect("listener channel closed")
}

/// Assert nothing arrives for a while.
pub async fn no_event(rx: &mut mpsc::UnboundedReceiver<ConfigChangedEvent>) {
    if let Ok(Some(event)) = tokio::time::timeout(Duration::from_millis(700), rx.recv()).await {
        panic!("unexpected event {event:?}");
    }
}

pub async fn wait_until(mut condition: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}
