use std::{sync::Arc, time::Duration};

use anyhow::{anyhow, bail, Context, Result};
use tokio::{sync::mpsc, time::timeout};
use tokio_util::sync::CancellationToken;

use crate::{
    backend::Backends,
    config::AppConfig,
    pipeline::{spawn_spam_pipeline, RunSummary, StageContext},
    report::{open_sink, write_report, write_summary},
    source::{open_source, spawn_email_feed},
};

pub struct SpamReportApp {
    config: Arc<AppConfig>,
    backends: Backends,
    cancel: CancellationToken,
}

impl SpamReportApp {
    pub fn initialize(config: AppConfig, cancel: CancellationToken) -> Result<Self> {
        let backends = Backends::from_config(&config.backend)?;
        Ok(Self {
            config: Arc::new(config),
            backends,
            cancel,
        })
    }

    pub async fn run(self) -> Result<RunSummary> {
        let SpamReportApp {
            config,
            backends,
            cancel,
        } = self;

        let source = open_source(&config.io.input).await?;
        let writer = open_sink(&config.io.output).await?;

        let ctx = StageContext::new(cancel.clone(), config.pipeline.call_timeout);
        let (emails_tx, emails_rx) = mpsc::channel(config.pipeline.channel_capacity.max(1));
        let feed = spawn_email_feed(source, emails_tx, cancel.clone());
        let (lines, mut pipeline) =
            spawn_spam_pipeline(ctx.clone(), &config.pipeline, &backends, emails_rx);
        let sink = tokio::spawn(write_report(lines, writer));
        tracing::info!(target: "app", stages = pipeline.stage_count(), "pipeline running");

        let shutdown_timeout = config.shutdown_timeout;
        let mut completion = Box::pin(pipeline.wait());
        let finished = tokio::select! {
            res = &mut completion => Some(res),
            _ = cancel.cancelled() => None,
        };
        let pipeline_result = match finished {
            Some(res) => res,
            None => match timeout(shutdown_timeout, &mut completion).await {
                Ok(res) => res,
                Err(_) => {
                    drop(completion);
                    pipeline.abort();
                    tracing::warn!(
                        target: "app",
                        "pipeline did not stop within {:?}; stages aborted",
                        shutdown_timeout
                    );
                    return Err(anyhow!(
                        "pipeline did not stop within {}ms",
                        shutdown_timeout.as_millis()
                    ));
                }
            },
        };

        let written = join_with_deadline(sink, shutdown_timeout)
            .await
            .context("report writer")??;
        let fed = join_with_deadline(feed, shutdown_timeout)
            .await
            .context("email feed")??;
        pipeline_result?;

        let summary = ctx.stats().summary();
        summary.log();
        if let Some(path) = &config.io.summary_path {
            write_summary(path, &summary).await?;
        }

        if cancel.is_cancelled() {
            bail!("run cancelled after reading {fed} emails; report discarded");
        }
        tracing::info!(target: "app", emails = fed, lines = written, "report written");
        Ok(summary)
    }
}

async fn join_with_deadline<T>(
    handle: tokio::task::JoinHandle<T>,
    deadline: Duration,
) -> Result<T> {
    let abort = handle.abort_handle();
    match timeout(deadline, handle).await {
        Ok(res) => Ok(res?),
        Err(_) => {
            abort.abort();
            bail!("task did not finish within {}ms", deadline.as_millis())
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn app_config(pairs: &[(&str, String)]) -> AppConfig {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect();
        AppConfig::from_lookup(|key| vars.get(key).cloned()).unwrap()
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn simulated_run_writes_sorted_report_and_summary() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("emails.txt");
        let output = dir.path().join("report.txt");
        let summary_path = dir.path().join("summary.json");
        tokio::fs::write(
            &input,
            "bruce.wayne@mail.ru\nalfred@mail.ru\nbrucewayne+cave@mail.ru\n\nbroken@mail.ru\n",
        )
        .await
        .unwrap();

        let config = app_config(&[
            ("INPUT_PATH", input.display().to_string()),
            ("OUTPUT_PATH", output.display().to_string()),
            ("SUMMARY_PATH", summary_path.display().to_string()),
            ("SIM_MESSAGES_PER_USER", "4".into()),
            ("SIM_FAIL_MARKER", "broken".into()),
        ]);
        let app = SpamReportApp::initialize(config, CancellationToken::new()).unwrap();
        let summary = app.run().await.unwrap();

        assert_eq!(summary.emails_received, 4);
        assert_eq!(summary.users_emitted, 2);
        assert_eq!(summary.report_lines, 8);
        assert_eq!(summary.drops.len(), 1);

        let report = tokio::fs::read_to_string(&output).await.unwrap();
        let parsed: Vec<(bool, u64)> = report
            .lines()
            .map(|line| {
                let (spam, id) = line.split_once(' ').unwrap();
                (spam.parse().unwrap(), id.parse().unwrap())
            })
            .collect();
        assert_eq!(parsed.len(), 8);
        let mut sorted = parsed.clone();
        sorted.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)));
        assert_eq!(parsed, sorted);

        let json: serde_json::Value =
            serde_json::from_slice(&tokio::fs::read(&summary_path).await.unwrap()).unwrap();
        assert_eq!(json["drops"][0]["kind"], "lookup");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn cancelled_run_is_an_error_with_empty_report() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("emails.txt");
        let output = dir.path().join("report.txt");
        tokio::fs::write(&input, "a@x.com\nb@x.com\n").await.unwrap();

        let config = app_config(&[
            ("INPUT_PATH", input.display().to_string()),
            ("OUTPUT_PATH", output.display().to_string()),
            ("SIM_LATENCY_MS", "200".into()),
            ("SHUTDOWN_TIMEOUT_MS", "2000".into()),
        ]);
        let cancel = CancellationToken::new();
        let app = SpamReportApp::initialize(config, cancel.clone()).unwrap();
        let run = tokio::spawn(app.run());
        tokio::time::sleep(Duration::from_millis(20)).await;
        cancel.cancel();

        assert!(run.await.unwrap().is_err());
        assert_eq!(tokio::fs::read_to_string(&output).await.unwrap(), "");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn unreadable_input_fails_without_partial_report() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("emails.txt");
        let output = dir.path().join("report.txt");
        tokio::fs::write(&input, b"a@x.com\nb@x.com\n\xff\xfe\nc@x.com\n")
            .await
            .unwrap();

        let config = app_config(&[
            ("INPUT_PATH", input.display().to_string()),
            ("OUTPUT_PATH", output.display().to_string()),
        ]);
        let app = SpamReportApp::initialize(config, CancellationToken::new()).unwrap();
        let err = app.run().await.unwrap_err();

        assert!(format!("{err:#}").contains("failed to read input"));
        assert_eq!(tokio::fs::read_to_string(&output).await.unwrap(), "");
    }
}
