use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("invalid endpoint url: {0}")]
    Url(#[from] url::ParseError),
    #[error("unknown user for {0}")]
    UnknownUser(String),
    #[error("backend unavailable: {0}")]
    Unavailable(String),
    #[error("call timed out after {0:?}")]
    Timeout(Duration),
}
