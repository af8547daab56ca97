use crate::api::client_config::ClientConfig;
use crate::api::error::Error;
use crate::common::remote::{ConfigTransport, WatchItem};
use crate::config::cache::WatchRegistry;
use crate::config::fetch::FetchStage;
use crate::config::target::WatchTarget;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

enum PollOutcome {
    /// Possibly empty set of targets the server reports as changed.
    Changed(HashSet<WatchTarget>),
    /// A target entered the registry, poll again with the new batch.
    Restart,
    Failed(Error),
    Cancelled,
}

/// The long-polling loop. Exactly one instance runs per config service and at
/// most one long-polling request is in flight.
pub(crate) struct ConfigWorker {
    client_config: ClientConfig,
    registry: Arc<WatchRegistry>,
    transport: Arc<dyn ConfigTransport>,
    fetch: Arc<FetchStage>,
    cancel: CancellationToken,
}

impl ConfigWorker {
    pub(crate) fn new(
        client_config: ClientConfig,
        registry: Arc<WatchRegistry>,
        transport: Arc<dyn ConfigTransport>,
        fetch: Arc<FetchStage>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            client_config,
            registry,
            transport,
            fetch,
            cancel,
        }
    }

    /// Spawn the loop on the current runtime.
    pub(crate) fn spawn(self) -> tokio::task::JoinHandle<()> {
        let span = tracing::info_span!("config_listening", worker = %self.client_config.listening_thread_name);
        tokio::spawn(self.run().instrument(span))
    }

    pub(crate) async fn run(self) {
        tracing::info!("config long polling started");
        let idle = self.client_config.idle_interval_duration();
        let mut failures: u32 = 0;

        loop {
            if self.cancel.is_cancelled() {
                break;
            }
            let batch = self.registry.snapshot();
            if batch.is_empty() {
                tokio::select! {
                    _ = self.cancel.cancelled() => break,
                    _ = self.registry.target_added() => {},
                    _ = tokio::time::sleep(idle) => {},
                }
                continue;
            }

            match self.poll_once(&batch).await {
                PollOutcome::Cancelled => break,
                PollOutcome::Restart => {
                    tracing::debug!("watch set grew, restart long polling");
                }
                PollOutcome::Changed(changed) => {
                    failures = 0;
                    if changed.is_empty() {
                        continue;
                    }
                    let queued = self.dispatch(changed);
                    let fetch_failures = self.fetch.consecutive_failures();
                    let delay = if fetch_failures > 0 {
                        // the server keeps reporting what we fail to fetch
                        let delay = self.client_config.backoff.delay(fetch_failures);
                        tracing::debug!(fetch_failures, ?delay, "config fetch failing, slow down long polling");
                        Some(delay)
                    } else if !queued {
                        Some(idle)
                    } else {
                        None
                    };
                    if let Some(delay) = delay {
                        if !self.pause(delay).await {
                            break;
                        }
                    }
                }
                PollOutcome::Failed(e) => {
                    failures = failures.saturating_add(1);
                    let delay = self.client_config.backoff.delay(failures);
                    tracing::warn!(error = %e, failures, ?delay, "config long polling failed");
                    if !self.pause(delay).await {
                        break;
                    }
                }
            }
        }
        tracing::info!("config long polling stopped");
    }

    /// One long-polling request. Hitting the deadline is the normal "nothing
    /// changed" outcome.
    async fn poll_once(&self, batch: &[WatchItem]) -> PollOutcome {
        let hold = self.client_config.long_polling_hold();
        let deadline = hold + self.client_config.read_timeout_duration();
        tracing::debug!(targets = batch.len(), ?hold, "long polling");

        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => PollOutcome::Cancelled,
            _ = self.registry.target_added() => PollOutcome::Restart,
            result = tokio::time::timeout(deadline, self.transport.listen(batch, hold)) => match result {
                Err(_) | Ok(Err(Error::Timeout)) => PollOutcome::Changed(HashSet::new()),
                Ok(Ok(changed)) => PollOutcome::Changed(changed),
                Ok(Err(e)) => PollOutcome::Failed(e),
            },
        }
    }

    /// Queue a fetch for every changed target that is still tracked.
    ///
    /// Returns `false` when all of them are already being fetched, in which
    /// case polling right away would only get the same answer.
    fn dispatch(&self, changed: HashSet<WatchTarget>) -> bool {
        let mut queued = 0;
        for target in changed {
            if !self.registry.contains(&target) {
                continue;
            }
            tracing::debug!(group_key = %target, "server reports config changed");
            if self.fetch.submit(target) {
                queued += 1;
            }
        }
        queued > 0
    }

    /// Sleep for `delay`; `false` if cancelled meanwhile.
    async fn pause(&self, delay: Duration) -> bool {
        tokio::select! {
            _ = self.cancel.cancelled() => false,
            _ = tokio::time::sleep(delay) => true,
        }
    }
}
