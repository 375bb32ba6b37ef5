use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::domain::{MsgData, OutputLine};

use super::{context::StageContext, orchestrator::Stage, stats::Counter};

const PREALLOCATE: usize = 100;

#[derive(Debug, Default)]
pub struct AggregateStage;

#[async_trait]
impl Stage for AggregateStage {
    type In = MsgData;
    type Out = OutputLine;

    fn name(&self) -> &'static str {
        "aggregate"
    }

    async fn run(self, ctx: StageContext, mut input: mpsc::Receiver<MsgData>, output: mpsc::Sender<OutputLine>) {
        let mut results = Vec::with_capacity(PREALLOCATE);
        while let Some(data) = ctx.recv(&mut input).await {
            results.push(data);
        }

        if ctx.is_cancelled() {
            tracing::info!(
                target: "aggregate",
                buffered = results.len(),
                "run cancelled; report discarded"
            );
            return;
        }

        results.sort_unstable_by(MsgData::report_order);
        tracing::debug!(target: "aggregate", total = results.len(), "emitting report");
        for data in results {
            if !ctx.send(&output, OutputLine::from(data)).await {
                break;
            }
            ctx.stats().incr(Counter::ReportLines);
        }
    }
}
