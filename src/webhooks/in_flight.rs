//! Tracking of detached pipeline runs.
//!
//! Webhook calls return before their event is published. [`InFlight`] keeps
//! the handles of those background runs so shutdown can wait for each one to
//! reach an outcome (published, dropped or failed) instead of cancelling it.

use std::future::Future;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::task::JoinSet;
use tracing::{info, warn};

/// Set of background runs spawned by the webhook handler.
#[derive(Debug, Default)]
pub struct InFlight {
    tasks: Mutex<JoinSet<()>>,
}

impl InFlight {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawn `task` and keep its handle. Finished runs are reaped here so the
    /// set only holds work that is still pending.
    pub async fn spawn<F>(&self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let mut tasks = self.tasks.lock().await;
        while tasks.try_join_next().is_some() {}
        tasks.spawn(task);
    }

    /// Number of runs not yet reaped.
    pub async fn len(&self) -> usize {
        self.tasks.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Wait up to `deadline` for every pending run to finish.
    ///
    /// Returns the number of runs still pending at the deadline; those are
    /// aborted.
    pub async fn drain(&self, deadline: Duration) -> usize {
        let mut tasks = std::mem::take(&mut *self.tasks.lock().await);
        if tasks.is_empty() {
            return 0;
        }
        info!(pending = tasks.len(), "Waiting for in-flight publishes to complete");

        let finished = tokio::time::timeout(deadline, async {
            while let Some(result) = tasks.join_next().await {
                if let Err(e) = result {
                    warn!(error = %e, "Background pipeline run did not complete");
                }
            }
        })
        .await;

        if finished.is_err() {
            let abandoned = tasks.len();
            warn!(abandoned, ?deadline, "In-flight publishes abandoned at shutdown");
            tasks.abort_all();
            return abandoned;
        }
        0
    }
}
