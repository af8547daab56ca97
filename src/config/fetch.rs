use crate::api::error::{Error, Result};
use crate::common::executor::WorkerPool;
use crate::common::remote::ConfigTransport;
use crate::config::cache::WatchRegistry;
use crate::config::notify::NotifyStage;
use crate::config::target::WatchTarget;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Retrieves the content of changed configs and hands real changes to the
/// [`NotifyStage`].
pub(crate) struct FetchStage {
    pool: WorkerPool,
    registry: Arc<WatchRegistry>,
    transport: Arc<dyn ConfigTransport>,
    notify: Arc<NotifyStage>,
    /// Targets queued or being fetched.
    pending: Arc<Mutex<HashSet<WatchTarget>>>,
    /// Fetches failed in a row, reset by the next one that succeeds.
    failures: Arc<AtomicU32>,
}

/// Clears the pending mark of a target however its fetch ends.
struct PendingGuard {
    pending: Arc<Mutex<HashSet<WatchTarget>>>,
    target: WatchTarget,
}

impl Drop for PendingGuard {
    fn drop(&mut self) {
        self.pending.lock().remove(&self.target);
    }
}

impl FetchStage {
    pub(crate) fn new(
        registry: Arc<WatchRegistry>,
        transport: Arc<dyn ConfigTransport>,
        notify: Arc<NotifyStage>,
        pool_name: &str,
        pool_size: usize,
    ) -> Self {
        Self {
            pool: WorkerPool::new(pool_name, pool_size),
            registry,
            transport,
            notify,
            pending: Arc::new(Mutex::new(HashSet::new())),
            failures: Arc::new(AtomicU32::new(0)),
        }
    }

    /// Queue a fetch of `target`; `false` if one is already pending or the
    /// pool is shut down.
    pub(crate) fn submit(&self, target: WatchTarget) -> bool {
        if !self.pending.lock().insert(target.clone()) {
            tracing::debug!(group_key = %target, "fetch already pending");
            return false;
        }
        let guard = PendingGuard {
            pending: self.pending.clone(),
            target: target.clone(),
        };
        let registry = self.registry.clone();
        let transport = self.transport.clone();
        let notify = self.notify.clone();
        let failures = self.failures.clone();
        self.pool.submit(async move {
            let _guard = guard;
            match fetch_and_compare(&registry, transport.as_ref(), &notify, &target).await {
                Ok(()) => failures.store(0, Ordering::Relaxed),
                Err(e) => {
                    let failed = failures.fetch_add(1, Ordering::Relaxed).saturating_add(1);
                    tracing::warn!(group_key = %target, error = %e, failures = failed, "fetch config failed, retry on next poll");
                }
            }
        })
    }

    /// Fetches that failed in a row since the last successful one.
    pub(crate) fn consecutive_failures(&self) -> u32 {
        self.failures.load(Ordering::Relaxed)
    }

    pub(crate) async fn shutdown(&self, grace: Duration) {
        self.pool.shutdown(grace).await
    }
}

/// Fetch `target`, record its digest and publish an event if it changed.
///
/// "Not found" counts as absent content. Any other failure is returned and
/// leaves the digest untouched so the next poll reports the target again.
pub(crate) async fn fetch_and_compare(
    registry: &WatchRegistry,
    transport: &dyn ConfigTransport,
    notify: &NotifyStage,
    target: &WatchTarget,
) -> Result<()> {
    if !registry.contains(target) {
        tracing::debug!(group_key = %target, "target no longer tracked, fetch skipped");
        return Ok(());
    }
    let (digest, content) = match transport.fetch(target).await {
        Ok(Some(config)) => (config.digest, Some(config.content)),
        Ok(None) | Err(Error::NotFound) => (String::new(), None),
        Err(e) => return Err(e),
    };

    match registry.update_digest(target, digest, content) {
        Some(transition) => {
            tracing::info!(group_key = %target, kind = ?transition.kind, "config changed");
            notify.submit(target.clone(), transition);
        }
        None => {
            tracing::debug!(group_key = %target, "config unchanged");
        }
    }
    Ok(())
}
