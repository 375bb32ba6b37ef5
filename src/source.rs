use std::{
    io::{self as std_io, BufRead},
    thread,
};

use anyhow::{Context, Result};
use tokio::{
    fs::File,
    io::{self, AsyncBufRead, AsyncBufReadExt, BufReader, Lines},
    sync::mpsc,
    task::JoinHandle,
};
use tokio_util::sync::CancellationToken;

use crate::{config::IoTarget, domain::Email};

const STDIN_BACKLOG: usize = 64;

pub enum EmailSource {
    Stream(Lines<Box<dyn AsyncBufRead + Unpin + Send>>),
    /// Lines read by a detached OS thread. A blocking stdin read cannot be
    /// interrupted; on a plain thread it does not hold up runtime shutdown.
    Thread(mpsc::Receiver<std_io::Result<String>>),
}

impl EmailSource {
    pub fn from_reader<R>(reader: R) -> Self
    where
        R: AsyncBufRead + Unpin + Send + 'static,
    {
        let boxed: Box<dyn AsyncBufRead + Unpin + Send> = Box::new(reader);
        EmailSource::Stream(boxed.lines())
    }

    pub fn stdin() -> Result<Self> {
        let (tx, rx) = mpsc::channel(STDIN_BACKLOG);
        thread::Builder::new()
            .name("stdin-reader".into())
            .spawn(move || {
                for line in std_io::stdin().lock().lines() {
                    let failed = line.is_err();
                    if tx.blocking_send(line).is_err() || failed {
                        break;
                    }
                }
            })
            .context("failed to start stdin reader")?;
        Ok(EmailSource::Thread(rx))
    }

    async fn next_line(&mut self) -> io::Result<Option<String>> {
        match self {
            EmailSource::Stream(lines) => lines.next_line().await,
            EmailSource::Thread(rx) => rx.recv().await.transpose(),
        }
    }
}

pub async fn open_source(target: &IoTarget) -> Result<EmailSource> {
    match target {
        IoTarget::Stdio => EmailSource::stdin(),
        IoTarget::File(path) => {
            let file = File::open(path)
                .await
                .with_context(|| format!("failed to open input {}", path.display()))?;
            Ok(EmailSource::from_reader(BufReader::new(file)))
        }
    }
}

/// Pushes one email per non-blank line into the pipeline. Dropping the sender
/// when the source is exhausted closes the first stage's input; a read error
/// cancels the run first so no report is built from partial input.
pub fn spawn_email_feed(
    source: EmailSource,
    emails: mpsc::Sender<Email>,
    cancel: CancellationToken,
) -> JoinHandle<Result<u64>> {
    tokio::spawn(async move {
        let res = feed(source, &emails, &cancel).await;
        if let Err(err) = &res {
            tracing::error!(target: "app", error = %err, "input failed; cancelling run");
            cancel.cancel();
        }
        drop(emails);
        res
    })
}

async fn feed(
    mut source: EmailSource,
    emails: &mpsc::Sender<Email>,
    cancel: &CancellationToken,
) -> Result<u64> {
    let mut sent = 0_u64;
    loop {
        let line = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            line = source.next_line() => line.context("failed to read input")?,
        };
        let Some(line) = line else { break };
        let email = line.trim();
        if email.is_empty() {
            continue;
        }
        let delivered = tokio::select! {
            biased;
            _ = cancel.cancelled() => false,
            res = emails.send(email.to_string()) => res.is_ok(),
        };
        if !delivered {
            break;
        }
        sent += 1;
    }
    tracing::debug!(target: "app", sent, "email feed closed");
    Ok(sent)
}
