use async_trait::async_trait;
use tokio::time::sleep;

use crate::{
    config::SimulatedConfig,
    domain::{Message, MsgId, User, UserId},
};

use super::{BackendError, MessageStore, SpamChecker, UserDirectory};

const USER_ID_SPACE: u64 = 1_000_000;
const MAX_MESSAGES_PER_USER: u64 = 999;

/// Deterministic in-process stand-in for the remote services.
#[derive(Debug, Clone)]
pub struct SimulatedBackend {
    config: SimulatedConfig,
}

impl SimulatedBackend {
    pub fn new(config: SimulatedConfig) -> Self {
        Self { config }
    }

    async fn simulate_latency(&self) {
        if !self.config.latency.is_zero() {
            sleep(self.config.latency).await;
        }
    }
}

#[async_trait]
impl UserDirectory for SimulatedBackend {
    async fn resolve_user(&self, email: &str) -> Result<User, BackendError> {
        self.simulate_latency().await;
        if let Some(marker) = &self.config.fail_marker {
            if email.contains(marker.as_str()) {
                return Err(BackendError::UnknownUser(email.to_string()));
            }
        }
        let canonical = canonical_email(email);
        Ok(User {
            id: user_id_for(&canonical),
            email: canonical,
        })
    }
}

#[async_trait]
impl MessageStore for SimulatedBackend {
    async fn fetch_messages(&self, users: &[User]) -> Result<Vec<Message>, BackendError> {
        self.simulate_latency().await;
        let per_user = self.config.messages_per_user.min(MAX_MESSAGES_PER_USER);
        Ok(users
            .iter()
            .flat_map(|user| {
                (1..=per_user).map(move |k| Message {
                    id: MsgId(user.id.wrapping_mul(1_000).wrapping_add(k)),
                    user_id: user.id,
                })
            })
            .collect())
    }
}

#[async_trait]
impl SpamChecker for SimulatedBackend {
    async fn check_spam(&self, id: MsgId) -> Result<bool, BackendError> {
        self.simulate_latency().await;
        Ok(fnv1a(&id.0.to_le_bytes()) % 3 == 0)
    }
}

/// Lowercases, strips a `+tag` suffix and dots from the local part so that
/// aliases of one mailbox collapse to the same user.
pub fn canonical_email(email: &str) -> String {
    let email = email.trim().to_lowercase();
    match email.split_once('@') {
        Some((local, domain)) => {
            let local = local.split('+').next().unwrap_or_default().replace('.', "");
            format!("{local}@{domain}")
        }
        None => email,
    }
}

fn user_id_for(canonical: &str) -> UserId {
    fnv1a(canonical.as_bytes()) % USER_ID_SPACE + 1
}

fn fnv1a(bytes: &[u8]) -> u64 {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for byte in bytes {
        hash ^= u64::from(*byte);
        hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
    }
    hash
}
