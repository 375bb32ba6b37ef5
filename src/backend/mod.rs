//! Collaborators the pipeline calls out to: user lookup, batched message
//! fetch and per-message spam check.

mod error;
pub mod http;
pub mod simulated;
#[cfg(test)]
pub(crate) mod table;

use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;

pub use error::BackendError;
pub use http::HttpBackend;
pub use simulated::SimulatedBackend;

use crate::{
    config::{BackendConfig, BackendKind},
    domain::{Message, MsgId, User},
};

#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn resolve_user(&self, email: &str) -> Result<User, BackendError>;
}

#[async_trait]
pub trait MessageStore: Send + Sync {
    /// `users` is never empty and never larger than the configured batch size.
    async fn fetch_messages(&self, users: &[User]) -> Result<Vec<Message>, BackendError>;
}

#[async_trait]
pub trait SpamChecker: Send + Sync {
    async fn check_spam(&self, id: MsgId) -> Result<bool, BackendError>;
}

#[derive(Clone)]
pub struct Backends {
    pub users: Arc<dyn UserDirectory>,
    pub messages: Arc<dyn MessageStore>,
    pub spam: Arc<dyn SpamChecker>,
}

impl Backends {
    pub fn from_shared<B>(backend: Arc<B>) -> Self
    where
        B: UserDirectory + MessageStore + SpamChecker + 'static,
    {
        Self {
            users: backend.clone(),
            messages: backend.clone(),
            spam: backend,
        }
    }

    pub fn from_config(config: &BackendConfig) -> Result<Self> {
        match config.kind {
            BackendKind::Simulated => {
                tracing::info!(
                    target: "backend",
                    messages_per_user = config.simulated.messages_per_user,
                    latency_ms = config.simulated.latency.as_millis() as u64,
                    "using simulated backend"
                );
                Ok(Self::from_shared(Arc::new(SimulatedBackend::new(
                    config.simulated.clone(),
                ))))
            }
            BackendKind::Http => {
                let base_url = config
                    .base_url
                    .clone()
                    .context("BACKEND_URL must be configured for the http backend")?;
                let http = Client::builder()
                    .user_agent(format!("spam-report/{}", env!("CARGO_PKG_VERSION")))
                    .build()?;
                tracing::info!(target: "backend", url = %base_url, "using http backend");
                Ok(Self::from_shared(Arc::new(HttpBackend::new(http, base_url))))
            }
        }
    }
}
