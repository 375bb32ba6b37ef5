use std::{io, path::Path};

use anyhow::{Context, Result};
use once_cell::sync::OnceCell;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::config::LoggingConfig;

static GUARD: OnceCell<tracing_appender::non_blocking::WorkerGuard> = OnceCell::new();

/// Console output goes to stderr; stdout is reserved for the report.
pub fn init_tracing(logging: &LoggingConfig, logs_dir: &Path) -> Result<()> {
    if GUARD.get().is_some() {
        return Ok(());
    }

    let env_filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => level_filter(&logging.level)?,
    };

    let file_appender = tracing_appender::rolling::daily(logs_dir, "spammer.log");
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_writer(io::stderr).with_target(true))
        .with(
            fmt::layer()
                .with_writer(file_writer)
                .with_target(true)
                .with_ansi(false),
        )
        .try_init()
        .context("a global tracing subscriber is already installed")?;
    let _ = GUARD.set(guard);

    tracing::info!(logs = %logs_dir.display(), level = %logging.level, "tracing initialized");
    Ok(())
}

fn level_filter(level: &str) -> Result<EnvFilter> {
    EnvFilter::try_new(level).with_context(|| format!("invalid LOG_LEVEL {level:?}"))
}
