use crate::api::config::{ConfigChangeListenFn, ConfigChangedEvent};
use crate::common::executor::WorkerPool;
use crate::config::cache::{DeliveryStamp, DigestTransition, WatchRegistry};
use crate::config::target::WatchTarget;
use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;

/// Delivers change events to listeners on its own worker pool.
pub(crate) struct NotifyStage {
    pool: WorkerPool,
    registry: Arc<WatchRegistry>,
    listener_timeout: Duration,
}

impl NotifyStage {
    pub(crate) fn new(
        registry: Arc<WatchRegistry>,
        pool_name: &str,
        pool_size: usize,
        listener_timeout: Duration,
    ) -> Self {
        Self {
            pool: WorkerPool::new(pool_name, pool_size),
            registry,
            listener_timeout,
        }
    }

    /// Build the event for `transition` once and queue its delivery.
    pub(crate) fn submit(&self, target: WatchTarget, transition: DigestTransition) -> bool {
        let event = Arc::new(ConfigChangedEvent::new(
            &target,
            transition.kind,
            transition.content,
        ));
        let registry = self.registry.clone();
        let listener_timeout = self.listener_timeout;
        let stamp = transition.stamp;
        let submitted = self.pool.submit(async move {
            deliver(&registry, &target, stamp, event, listener_timeout).await;
        });
        if !submitted {
            tracing::debug!(pool = %self.pool.name(), "notify pool closed, event dropped");
        }
        submitted
    }

    pub(crate) async fn shutdown(&self, grace: Duration) {
        self.pool.shutdown(grace).await
    }
}

/// Call every listener of `target` with `event`, each on the blocking pool
/// under its own time budget. Events older than one already delivered for
/// the same target, or produced before the target was last re-tracked, are
/// dropped.
pub(crate) async fn deliver(
    registry: &WatchRegistry,
    target: &WatchTarget,
    stamp: DeliveryStamp,
    event: Arc<ConfigChangedEvent>,
    listener_timeout: Duration,
) {
    if !registry.claim_delivery(target, stamp) {
        tracing::debug!(group_key = %target, ?stamp, "stale or untracked event, skipped");
        return;
    }
    let listeners = registry.listeners_for(target);
    if listeners.is_empty() {
        return;
    }

    let calls = listeners
        .into_iter()
        .enumerate()
        .map(|(index, listener)| call_listener(index, listener, event.clone(), listener_timeout));
    join_all(calls).await;
    tracing::debug!(group_key = %target, kind = ?event.kind(), "event delivered");
}

async fn call_listener(
    index: usize,
    listener: Arc<ConfigChangeListenFn>,
    event: Arc<ConfigChangedEvent>,
    listener_timeout: Duration,
) {
    let group = event.group().to_string();
    let data_id = event.data_id().to_string();
    let call = tokio::task::spawn_blocking(move || (listener)(event.as_ref()));
    match tokio::time::timeout(listener_timeout, call).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => {
            tracing::warn!(data_id = %data_id, group = %group, listener = index, error = %e, "config listener failed");
        }
        // the blocking call keeps running, its result is ignored
        Err(_) => {
            tracing::warn!(data_id = %data_id, group = %group, listener = index, ?listener_timeout, "config listener timed out, abandoned");
        }
    }
}
