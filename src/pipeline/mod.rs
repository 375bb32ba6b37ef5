//! Stage chain: emails → unique users → messages → verdicts → sorted report.

pub mod aggregate;
pub mod batch_fetch;
pub mod classify;
pub mod context;
pub mod dedup;
pub mod orchestrator;
pub mod spawner;
pub mod stats;

use tokio::sync::mpsc;

pub use aggregate::AggregateStage;
pub use batch_fetch::BatchFetchStage;
pub use classify::ClassifyStage;
pub use context::StageContext;
pub use dedup::DedupStage;
pub use orchestrator::{Pipeline, PipelineHandle};
pub use stats::RunSummary;

use crate::{
    backend::Backends,
    config::PipelineConfig,
    domain::{Email, OutputLine},
};

/// Starts all four stages. The returned receiver yields the report once every
/// upstream stage is done.
pub fn spawn_spam_pipeline(
    ctx: StageContext,
    config: &PipelineConfig,
    backends: &Backends,
    emails: mpsc::Receiver<Email>,
) -> (mpsc::Receiver<OutputLine>, PipelineHandle) {
    tracing::info!(
        target: "pipeline",
        batch_size = config.max_users_per_fetch_batch,
        spam_workers = config.max_concurrent_spam_checks,
        resolve_concurrency = ?config.resolve_concurrency,
        fetch_concurrency = ?config.fetch_concurrency,
        "starting pipeline"
    );
    Pipeline::from_source(ctx, emails, config.channel_capacity)
        .stage(DedupStage::new(
            backends.users.clone(),
            config.resolve_concurrency,
        ))
        .stage(BatchFetchStage::new(
            backends.messages.clone(),
            config.max_users_per_fetch_batch,
            config.fetch_concurrency,
        ))
        .stage(ClassifyStage::new(
            backends.spam.clone(),
            config.max_concurrent_spam_checks,
        ))
        .stage(AggregateStage)
        .finish()
}
