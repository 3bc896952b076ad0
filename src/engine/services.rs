//! Tracker for the engine's background tasks.

use std::future::Future;

use parking_lot::Mutex;
use tokio::task::JoinSet;
use tracing::Instrument;

/// Every long-running task a subsystem spawns is registered here so that
/// `Engine::stop` can wait for all of them.
#[derive(Debug, Default)]
pub struct ServiceGroup {
    tasks: Mutex<JoinSet<()>>,
}

impl ServiceGroup {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawns `task` on the current runtime and tracks it.
    pub fn spawn<F>(&self, name: &'static str, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let span = tracing::info_span!("service", name);
        self.tasks.lock().spawn(task.instrument(span));
        tracing::debug!(service = name, "Background service registered");
    }

    /// Number of tracked tasks that have not been reaped yet.
    pub fn len(&self) -> usize {
        self.tasks.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Waits until every tracked task has finished, including tasks
    /// registered while waiting.
    pub async fn wait(&self) {
        loop {
            let mut tasks = std::mem::take(&mut *self.tasks.lock());
            if tasks.is_empty() {
                return;
            }
            while let Some(result) = tasks.join_next().await {
                if let Err(e) = result {
                    tracing::error!(error = %e, "Background service terminated abnormally");
                }
            }
        }
    }
}
