use std::{mem, sync::Arc};

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::{
    backend::MessageStore,
    domain::{Message, User},
};

use super::{
    context::StageContext,
    orchestrator::Stage,
    spawner::BoundedSpawner,
    stats::{Counter, DropEvent},
};

pub struct BatchFetchStage {
    store: Arc<dyn MessageStore>,
    batch_size: usize,
    concurrency: Option<usize>,
}

impl BatchFetchStage {
    pub fn new(store: Arc<dyn MessageStore>, batch_size: usize, concurrency: Option<usize>) -> Self {
        Self {
            store,
            batch_size: batch_size.max(1),
            concurrency,
        }
    }

    async fn dispatch(
        &self,
        fetches: &mut BoundedSpawner,
        ctx: &StageContext,
        batch: Vec<User>,
        output: &mpsc::Sender<Message>,
    ) {
        ctx.stats().incr(Counter::BatchesDispatched);
        tracing::debug!(target: "batch_fetch", size = batch.len(), "dispatching batch");
        fetches
            .spawn(fetch_batch(
                self.store.clone(),
                ctx.clone(),
                batch,
                output.clone(),
            ))
            .await;
    }
}

#[async_trait]
impl Stage for BatchFetchStage {
    type In = User;
    type Out = Message;

    fn name(&self) -> &'static str {
        "batch_fetch"
    }

    async fn run(self, ctx: StageContext, mut input: mpsc::Receiver<User>, output: mpsc::Sender<Message>) {
        let mut fetches = BoundedSpawner::new(self.name(), self.concurrency);
        let mut batch = Vec::with_capacity(self.batch_size);

        while let Some(user) = ctx.recv(&mut input).await {
            batch.push(user);
            if batch.len() == self.batch_size {
                let full = mem::replace(&mut batch, Vec::with_capacity(self.batch_size));
                self.dispatch(&mut fetches, &ctx, full, &output).await;
            }
        }

        if !batch.is_empty() && !ctx.is_cancelled() {
            self.dispatch(&mut fetches, &ctx, batch, &output).await;
        }

        tracing::debug!(target: "batch_fetch", pending = fetches.in_flight(), "input drained; waiting for fetches");
        fetches.wait().await;
    }
}

async fn fetch_batch(
    store: Arc<dyn MessageStore>,
    ctx: StageContext,
    batch: Vec<User>,
    output: mpsc::Sender<Message>,
) {
    let messages = match ctx.call(store.fetch_messages(&batch)).await {
        None => return,
        Some(Ok(messages)) => messages,
        Some(Err(err)) => {
            ctx.stats().record_drop(DropEvent::Batch {
                user_ids: batch.iter().map(|u| u.id).collect(),
                error: err.to_string(),
            });
            return;
        }
    };

    ctx.stats().add(Counter::MessagesFetched, messages.len() as u64);
    for message in messages {
        if !ctx.send(&output, message).await {
            break;
        }
    }
}
