use std::{future::Future, sync::Arc};

use tokio::{sync::Semaphore, task::JoinSet};

/// Tracks the sub-tasks of one stage, optionally capping how many run at
/// once. With a cap, `spawn` waits for a free slot, which pushes back on the
/// stage's input reader.
pub struct BoundedSpawner {
    stage: &'static str,
    tasks: JoinSet<()>,
    permits: Option<Arc<Semaphore>>,
}

impl BoundedSpawner {
    pub fn new(stage: &'static str, limit: Option<usize>) -> Self {
        Self {
            stage,
            tasks: JoinSet::new(),
            permits: limit.map(|n| Arc::new(Semaphore::new(n.max(1)))),
        }
    }

    pub fn unbounded(stage: &'static str) -> Self {
        Self::new(stage, None)
    }

    pub async fn spawn<F>(&mut self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        while let Some(res) = self.tasks.try_join_next() {
            self.report(res);
        }

        let permit = match &self.permits {
            // the semaphore is never closed
            Some(permits) => permits.clone().acquire_owned().await.ok(),
            None => None,
        };
        self.tasks.spawn(async move {
            task.await;
            drop(permit);
        });
    }

    pub fn in_flight(&self) -> usize {
        self.tasks.len()
    }

    pub async fn wait(mut self) {
        while let Some(res) = self.tasks.join_next().await {
            self.report(res);
        }
    }

    fn report(&self, res: Result<(), tokio::task::JoinError>) {
        if let Err(err) = res {
            if err.is_panic() {
                tracing::error!(target: "pipeline", stage = self.stage, error = %err, "stage task panicked");
            }
        }
    }
}
