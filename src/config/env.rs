use std::{path::PathBuf, time::Duration};

use thiserror::Error;
use url::Url;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub pipeline: PipelineConfig,
    pub backend: BackendConfig,
    pub io: IoConfig,
    pub directories: DirectoryConfig,
    pub logging: LoggingConfig,
    pub shutdown_timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub max_users_per_fetch_batch: usize,
    pub max_concurrent_spam_checks: usize,
    /// `None` keeps per-email lookups unbounded.
    pub resolve_concurrency: Option<usize>,
    /// `None` keeps batch dispatch unbounded.
    pub fetch_concurrency: Option<usize>,
    pub channel_capacity: usize,
    pub call_timeout: Option<Duration>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_users_per_fetch_batch: 2,
            max_concurrent_spam_checks: 5,
            resolve_concurrency: None,
            fetch_concurrency: None,
            channel_capacity: 1,
            call_timeout: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    Simulated,
    Http,
}

#[derive(Debug, Clone)]
pub struct BackendConfig {
    pub kind: BackendKind,
    pub base_url: Option<Url>,
    pub simulated: SimulatedConfig,
}

#[derive(Debug, Clone)]
pub struct SimulatedConfig {
    pub messages_per_user: u64,
    pub latency: Duration,
    pub fail_marker: Option<String>,
}

impl Default for SimulatedConfig {
    fn default() -> Self {
        Self {
            messages_per_user: 3,
            latency: Duration::ZERO,
            fail_marker: None,
        }
    }
}

/// `-` on the command line side maps to [`IoTarget::Stdio`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IoTarget {
    Stdio,
    File(PathBuf),
}

impl IoTarget {
    pub fn parse(value: &str) -> Self {
        match value.trim() {
            "" | "-" => IoTarget::Stdio,
            path => IoTarget::File(PathBuf::from(path)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct IoConfig {
    pub input: IoTarget,
    pub output: IoTarget,
    pub summary_path: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct DirectoryConfig {
    pub logs_dir: String,
}

#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub level: String,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    Missing(&'static str),
    #[error("invalid value for {key}: {value:?} ({reason})")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}
