use std::{future::Future, sync::Arc, time::Duration};

use tokio::{sync::mpsc, time::timeout};
use tokio_util::sync::CancellationToken;

use crate::backend::BackendError;

use super::stats::RunStats;

#[derive(Clone)]
pub struct StageContext {
    cancel: CancellationToken,
    stats: Arc<RunStats>,
    call_timeout: Option<Duration>,
}

impl StageContext {
    pub fn new(cancel: CancellationToken, call_timeout: Option<Duration>) -> Self {
        Self {
            cancel,
            stats: Arc::new(RunStats::default()),
            call_timeout,
        }
    }

    pub fn stats(&self) -> &Arc<RunStats> {
        &self.stats
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub async fn recv<T>(&self, input: &mut mpsc::Receiver<T>) -> Option<T> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => None,
            item = input.recv() => item,
        }
    }

    pub async fn send<T>(&self, output: &mpsc::Sender<T>, item: T) -> bool {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => false,
            res = output.send(item) => res.is_ok(),
        }
    }

    /// Runs one collaborator call under the configured timeout. `None` means
    /// the run was cancelled while the call was in flight.
    pub async fn call<T, F>(&self, fut: F) -> Option<Result<T, BackendError>>
    where
        F: Future<Output = Result<T, BackendError>>,
    {
        if self.is_cancelled() {
            return None;
        }
        let bounded = async {
            match self.call_timeout {
                Some(limit) => timeout(limit, fut)
                    .await
                    .unwrap_or(Err(BackendError::Timeout(limit))),
                None => fut.await,
            }
        };
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => None,
            res = bounded => Some(res),
        }
    }
}
