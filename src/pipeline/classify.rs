use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{mpsc, Mutex};

use crate::{
    backend::SpamChecker,
    domain::{Message, MsgData},
};

use super::{
    context::StageContext,
    orchestrator::Stage,
    spawner::BoundedSpawner,
    stats::{Counter, DropEvent},
};

pub struct ClassifyStage {
    checker: Arc<dyn SpamChecker>,
    workers: usize,
}

impl ClassifyStage {
    pub fn new(checker: Arc<dyn SpamChecker>, workers: usize) -> Self {
        Self {
            checker,
            workers: workers.max(1),
        }
    }
}

#[async_trait]
impl Stage for ClassifyStage {
    type In = Message;
    type Out = MsgData;

    fn name(&self) -> &'static str {
        "classify"
    }

    async fn run(self, ctx: StageContext, input: mpsc::Receiver<Message>, output: mpsc::Sender<MsgData>) {
        let input = Arc::new(Mutex::new(input));
        let mut pool = BoundedSpawner::unbounded(self.name());
        for worker in 0..self.workers {
            pool.spawn(classify_worker(
                worker,
                self.checker.clone(),
                ctx.clone(),
                input.clone(),
                output.clone(),
            ))
            .await;
        }
        pool.wait().await;
    }
}

async fn classify_worker(
    worker: usize,
    checker: Arc<dyn SpamChecker>,
    ctx: StageContext,
    input: Arc<Mutex<mpsc::Receiver<Message>>>,
    output: mpsc::Sender<MsgData>,
) {
    let mut handled = 0_u64;
    loop {
        let next = {
            let mut input = input.lock().await;
            ctx.recv(&mut *input).await
        };
        let Some(message) = next else { break };

        match ctx.call(checker.check_spam(message.id)).await {
            None => break,
            Some(Ok(has_spam)) => {
                ctx.stats().incr(Counter::MessagesClassified);
                handled += 1;
                if !ctx.send(&output, MsgData::new(message.id, has_spam)).await {
                    break;
                }
            }
            Some(Err(err)) => ctx.stats().record_drop(DropEvent::Classification {
                msg_id: message.id,
                error: err.to_string(),
            }),
        }
    }
    tracing::debug!(target: "classify", worker, handled, "worker finished");
}
