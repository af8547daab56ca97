use futures::future::{join_all, BoxFuture};
use futures::FutureExt;
use parking_lot::Mutex;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

type Job = BoxFuture<'static, ()>;

/// A fixed number of named workers draining one job queue.
pub(crate) struct WorkerPool {
    name: String,
    sender: Mutex<Option<mpsc::UnboundedSender<Job>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl WorkerPool {
    /// Spawn `size` workers on the current tokio runtime.
    pub(crate) fn new(name: impl Into<String>, size: usize) -> Self {
        let name = name.into();
        let (sender, receiver) = mpsc::unbounded_channel::<Job>();
        let receiver = Arc::new(tokio::sync::Mutex::new(receiver));
        let workers = (0..size.max(1))
            .map(|index| {
                let receiver = receiver.clone();
                let worker_name = format!("{name}-{index}");
                tokio::spawn(async move {
                    loop {
                        let job = { receiver.lock().await.recv().await };
                        let Some(job) = job else {
                            break;
                        };
                        if AssertUnwindSafe(job).catch_unwind().await.is_err() {
                            tracing::warn!(worker = %worker_name, "job panicked");
                        }
                    }
                    tracing::debug!(worker = %worker_name, "worker exit");
                })
            })
            .collect();
        Self {
            name,
            sender: Mutex::new(Some(sender)),
            workers: Mutex::new(workers),
        }
    }

    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    /// Queue a job; `false` once the pool is shut down.
    pub(crate) fn submit<F>(&self, job: F) -> bool
    where
        F: Future<Output = ()> + Send + 'static,
    {
        match self.sender.lock().as_ref() {
            Some(sender) => sender.send(job.boxed()).is_ok(),
            None => false,
        }
    }

    /// Stop accepting jobs, let workers drain the queue for up to `grace`,
    /// then abort whatever is still running.
    pub(crate) async fn shutdown(&self, grace: Duration) {
        self.sender.lock().take();
        let mut workers = std::mem::take(&mut *self.workers.lock());
        if workers.is_empty() {
            return;
        }
        let drained = tokio::time::timeout(grace, join_all(workers.iter_mut())).await;
        if drained.is_err() {
            tracing::warn!(pool = %self.name, ?grace, "pool not drained in time, discarding remaining jobs");
            for worker in &workers {
                worker.abort();
            }
        }
    }
}
