use std::path::Path;

use anyhow::{Context, Result};
use tokio::{
    fs::File,
    io::{self, AsyncWrite, AsyncWriteExt, BufWriter},
    sync::mpsc,
};

use crate::{config::IoTarget, domain::OutputLine, pipeline::RunSummary};

pub type ReportWriter = Box<dyn AsyncWrite + Unpin + Send>;

pub async fn open_sink(target: &IoTarget) -> Result<ReportWriter> {
    match target {
        IoTarget::Stdio => Ok(Box::new(io::stdout())),
        IoTarget::File(path) => {
            let file = File::create(path)
                .await
                .with_context(|| format!("failed to create output {}", path.display()))?;
            Ok(Box::new(file))
        }
    }
}

/// Drains the report channel into `writer`, one line per result.
pub async fn write_report(mut lines: mpsc::Receiver<OutputLine>, writer: ReportWriter) -> Result<u64> {
    let mut writer = BufWriter::new(writer);
    let mut written = 0_u64;
    while let Some(line) = lines.recv().await {
        writer.write_all(line.as_str().as_bytes()).await?;
        writer.write_all(b"\n").await?;
        written += 1;
    }
    writer.flush().await.context("failed to flush report")?;
    Ok(written)
}

pub async fn write_summary(path: &Path, summary: &RunSummary) -> Result<()> {
    let json = serde_json::to_vec_pretty(summary)?;
    tokio::fs::write(path, json)
        .await
        .with_context(|| format!("failed to write summary {}", path.display()))
}
