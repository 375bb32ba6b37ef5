use std::{env, path::PathBuf, str::FromStr, time::Duration};

use url::Url;

use super::env::{
    AppConfig, BackendConfig, BackendKind, ConfigError, DirectoryConfig, IoConfig, IoTarget,
    LoggingConfig, PipelineConfig, SimulatedConfig,
};

pub fn load_config() -> Result<AppConfig, ConfigError> {
    AppConfig::from_lookup(|key| env::var(key).ok())
}

impl AppConfig {
    pub(crate) fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let defaults = PipelineConfig::default();
        let pipeline = PipelineConfig {
            max_users_per_fetch_batch: positive(
                "MAX_USERS_PER_FETCH_BATCH",
                get("MAX_USERS_PER_FETCH_BATCH"),
                defaults.max_users_per_fetch_batch,
            )?,
            max_concurrent_spam_checks: positive(
                "MAX_CONCURRENT_SPAM_CHECKS",
                get("MAX_CONCURRENT_SPAM_CHECKS"),
                defaults.max_concurrent_spam_checks,
            )?,
            resolve_concurrency: limit("RESOLVE_CONCURRENCY", get("RESOLVE_CONCURRENCY"))?,
            fetch_concurrency: limit("FETCH_CONCURRENCY", get("FETCH_CONCURRENCY"))?,
            channel_capacity: positive(
                "CHANNEL_CAPACITY",
                get("CHANNEL_CAPACITY"),
                defaults.channel_capacity,
            )?,
            call_timeout: parse::<u64>("CALL_TIMEOUT_MS", get("CALL_TIMEOUT_MS"))?
                .filter(|ms| *ms > 0)
                .map(Duration::from_millis),
        };

        let kind = match get("BACKEND").as_deref().map(str::trim) {
            None | Some("simulated") => BackendKind::Simulated,
            Some("http") => BackendKind::Http,
            Some(other) => {
                return Err(ConfigError::Invalid {
                    key: "BACKEND",
                    value: other.to_string(),
                    reason: "expected `simulated` or `http`".into(),
                })
            }
        };
        let base_url = get("BACKEND_URL")
            .map(|value| {
                Url::parse(&value).map_err(|err| ConfigError::Invalid {
                    key: "BACKEND_URL",
                    value,
                    reason: err.to_string(),
                })
            })
            .transpose()?;
        if kind == BackendKind::Http && base_url.is_none() {
            return Err(ConfigError::Missing("BACKEND_URL"));
        }

        let sim_defaults = SimulatedConfig::default();
        let backend = BackendConfig {
            kind,
            base_url,
            simulated: SimulatedConfig {
                messages_per_user: parse("SIM_MESSAGES_PER_USER", get("SIM_MESSAGES_PER_USER"))?
                    .unwrap_or(sim_defaults.messages_per_user),
                latency: parse::<u64>("SIM_LATENCY_MS", get("SIM_LATENCY_MS"))?
                    .map(Duration::from_millis)
                    .unwrap_or(sim_defaults.latency),
                fail_marker: get("SIM_FAIL_MARKER"),
            },
        };

        let io = IoConfig {
            input: get("INPUT_PATH")
                .map(|v| IoTarget::parse(&v))
                .unwrap_or(IoTarget::Stdio),
            output: get("OUTPUT_PATH")
                .map(|v| IoTarget::parse(&v))
                .unwrap_or(IoTarget::Stdio),
            summary_path: get("SUMMARY_PATH").map(PathBuf::from),
        };

        let directories = DirectoryConfig {
            logs_dir: get("LOGS_DIR").unwrap_or_else(|| "logs".to_string()),
        };

        let logging = LoggingConfig {
            level: get("LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
        };

        let shutdown_timeout = Duration::from_millis(
            parse("SHUTDOWN_TIMEOUT_MS", get("SHUTDOWN_TIMEOUT_MS"))?.unwrap_or(5_000),
        );

        Ok(Self {
            pipeline,
            backend,
            io,
            directories,
            logging,
            shutdown_timeout,
        })
    }
}

fn parse<T>(key: &'static str, value: Option<String>) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value
        .map(|value| {
            value
                .trim()
                .parse::<T>()
                .map_err(|err| ConfigError::Invalid {
                    key,
                    reason: err.to_string(),
                    value,
                })
        })
        .transpose()
}

fn positive(key: &'static str, value: Option<String>, default: usize) -> Result<usize, ConfigError> {
    match parse::<usize>(key, value)? {
        None => Ok(default),
        Some(0) => Err(ConfigError::Invalid {
            key,
            value: "0".into(),
            reason: "must be at least 1".into(),
        }),
        Some(n) => Ok(n),
    }
}

/// `0` or unset means unbounded.
fn limit(key: &'static str, value: Option<String>) -> Result<Option<usize>, ConfigError> {
    Ok(parse::<usize>(key, value)?.filter(|n| *n > 0))
}
