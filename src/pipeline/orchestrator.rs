use async_trait::async_trait;
use thiserror::Error;
use tokio::{sync::mpsc, task::JoinSet};

use super::context::StageContext;

/// One link of the chain: drains `input`, writes to `output`, and returns
/// only after all of its own sub-work has finished. Dropping `output` on
/// return closes the channel for the next stage.
#[async_trait]
pub trait Stage: Send + 'static {
    type In: Send + 'static;
    type Out: Send + 'static;

    fn name(&self) -> &'static str;

    async fn run(
        self,
        ctx: StageContext,
        input: mpsc::Receiver<Self::In>,
        output: mpsc::Sender<Self::Out>,
    );
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("{failed} of {total} pipeline stages did not finish cleanly: {first}")]
    StagesFailed {
        failed: usize,
        total: usize,
        first: tokio::task::JoinError,
    },
}

/// Typed builder that chains stages through bounded channels. Each call to
/// [`Pipeline::stage`] spawns the stage immediately.
pub struct Pipeline<T> {
    ctx: StageContext,
    capacity: usize,
    head: mpsc::Receiver<T>,
    stages: JoinSet<&'static str>,
}

impl<T: Send + 'static> Pipeline<T> {
    pub fn from_source(ctx: StageContext, source: mpsc::Receiver<T>, capacity: usize) -> Self {
        Self {
            ctx,
            capacity: capacity.max(1),
            head: source,
            stages: JoinSet::new(),
        }
    }

    pub fn stage<S>(mut self, stage: S) -> Pipeline<S::Out>
    where
        S: Stage<In = T>,
    {
        let (tx, rx) = mpsc::channel(self.capacity);
        let ctx = self.ctx.clone();
        let input = self.head;
        let name = stage.name();
        self.stages.spawn(async move {
            tracing::debug!(target: "pipeline", stage = name, "stage started");
            stage.run(ctx, input, tx).await;
            tracing::debug!(target: "pipeline", stage = name, "stage finished");
            name
        });
        Pipeline {
            ctx: self.ctx,
            capacity: self.capacity,
            head: rx,
            stages: self.stages,
        }
    }

    pub fn finish(self) -> (mpsc::Receiver<T>, PipelineHandle) {
        let total = self.stages.len();
        (
            self.head,
            PipelineHandle {
                stages: self.stages,
                total,
            },
        )
    }
}

pub struct PipelineHandle {
    stages: JoinSet<&'static str>,
    total: usize,
}

impl PipelineHandle {
    pub fn stage_count(&self) -> usize {
        self.total
    }

    /// Waits until every stage has completed, observing each exactly once.
    /// The final output must be drained concurrently or this never returns.
    pub async fn wait(&mut self) -> Result<(), PipelineError> {
        let mut failed = 0;
        let mut first = None;
        while let Some(res) = self.stages.join_next().await {
            match res {
                Ok(name) => tracing::debug!(target: "pipeline", stage = name, "stage joined"),
                Err(err) => {
                    tracing::error!(target: "pipeline", error = %err, "stage did not finish cleanly");
                    failed += 1;
                    first.get_or_insert(err);
                }
            }
        }
        match first {
            Some(first) => Err(PipelineError::StagesFailed {
                failed,
                total: self.total,
                first,
            }),
            None => Ok(()),
        }
    }

    pub fn abort(&mut self) {
        self.stages.abort_all();
    }
}

#[cfg(test)]
mod tests {
    use std::{
        sync::{
            atomic::{AtomicUsize, Ordering},
            Arc,
        },
        time::Duration,
    };

    use tokio_util::sync::CancellationToken;

    use super::*;
    use crate::pipeline::spawner::BoundedSpawner;

    struct Double;

    #[async_trait]
    impl Stage for Double {
        type In = u32;
        type Out = u32;

        fn name(&self) -> &'static str {
            "double"
        }

        async fn run(self, ctx: StageContext, mut input: mpsc::Receiver<u32>, output: mpsc::Sender<u32>) {
            while let Some(n) = ctx.recv(&mut input).await {
                if !ctx.send(&output, n * 2).await {
                    break;
                }
            }
        }
    }

    struct Slow {
        finished: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Stage for Slow {
        type In = u32;
        type Out = String;

        fn name(&self) -> &'static str {
            "slow"
        }

        async fn run(self, ctx: StageContext, mut input: mpsc::Receiver<u32>, output: mpsc::Sender<String>) {
            let mut spawner = BoundedSpawner::unbounded("slow");
            while let Some(n) = ctx.recv(&mut input).await {
                let (ctx, output, finished) = (ctx.clone(), output.clone(), self.finished.clone());
                spawner
                    .spawn(async move {
                        tokio::time::sleep(Duration::from_millis(10)).await;
                        ctx.send(&output, n.to_string()).await;
                        finished.fetch_add(1, Ordering::SeqCst);
                    })
                    .await;
            }
            spawner.wait().await;
        }
    }

    struct Explode;

    #[async_trait]
    impl Stage for Explode {
        type In = u32;
        type Out = u32;

        fn name(&self) -> &'static str {
            "explode"
        }

        async fn run(self, _ctx: StageContext, _input: mpsc::Receiver<u32>, _output: mpsc::Sender<u32>) {
            panic!("stage blew up");
        }
    }

    fn source(items: Vec<u32>) -> mpsc::Receiver<u32> {
        let (tx, rx) = mpsc::channel(1);
        tokio::spawn(async move {
            for item in items {
                if tx.send(item).await.is_err() {
                    break;
                }
            }
        });
        rx
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn chains_stages_and_waits_for_all_sub_work() {
        let finished = Arc::new(AtomicUsize::new(0));
        let ctx = StageContext::new(CancellationToken::new(), None);
        let (mut out, mut handle) = Pipeline::from_source(ctx, source(vec![1, 2, 3]), 1)
            .stage(Double)
            .stage(Slow {
                finished: finished.clone(),
            })
            .finish();
        assert_eq!(handle.stage_count(), 2);

        let mut seen = Vec::new();
        while let Some(item) = out.recv().await {
            seen.push(item);
        }
        handle.wait().await.unwrap();

        seen.sort();
        assert_eq!(seen, vec!["2", "4", "6"]);
        assert_eq!(finished.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn panicking_stage_is_reported() {
        let ctx = StageContext::new(CancellationToken::new(), None);
        let (mut out, mut handle) = Pipeline::from_source(ctx, source(vec![1]), 1)
            .stage(Explode)
            .stage(Double)
            .finish();
        while out.recv().await.is_some() {}
        let err = handle.wait().await.unwrap_err();
        assert!(matches!(err, PipelineError::StagesFailed { failed: 1, total: 2, .. }));
    }

    #[tokio::test]
    async fn cancellation_stops_a_stalled_source() {
        let token = CancellationToken::new();
        let ctx = StageContext::new(token.clone(), None);
        // sender kept alive: the input never closes on its own
        let (_tx, rx) = mpsc::channel::<u32>(1);
        let (mut out, mut handle) = Pipeline::from_source(ctx, rx, 1).stage(Double).finish();

        token.cancel();
        assert_eq!(out.recv().await, None);
        tokio::time::timeout(Duration::from_secs(1), handle.wait())
            .await
            .expect("stages should stop after cancellation")
            .unwrap();
    }
}
