//! Table-driven collaborator fixture for pipeline tests.

use std::{
    collections::{HashMap, HashSet},
    sync::atomic::{AtomicUsize, Ordering},
    time::Duration,
};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::time::sleep;

use crate::domain::{Message, MsgId, User, UserId};

use super::{BackendError, MessageStore, SpamChecker, UserDirectory};

#[derive(Default)]
pub(crate) struct TableBackend {
    users: HashMap<String, User>,
    messages: HashMap<UserId, Vec<MsgId>>,
    verdicts: HashMap<MsgId, bool>,
    failing_users: HashSet<UserId>,
    failing_checks: HashSet<MsgId>,
    delay: Duration,
    batches: Mutex<Vec<Vec<UserId>>>,
    lookups: InFlight,
    fetches: InFlight,
    checks: InFlight,
}

/// Concurrent-call gauge with a high-water mark.
#[derive(Default)]
struct InFlight {
    now: AtomicUsize,
    peak: AtomicUsize,
}

impl InFlight {
    fn enter(&self) {
        let now = self.now.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
    }

    fn leave(&self) {
        self.now.fetch_sub(1, Ordering::SeqCst);
    }

    fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

impl TableBackend {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn user(mut self, email: &str, id: UserId) -> Self {
        self.users.insert(
            email.to_string(),
            User {
                id,
                email: email.to_string(),
            },
        );
        self
    }

    pub(crate) fn messages(mut self, user: UserId, ids: &[u64]) -> Self {
        self.messages
            .insert(user, ids.iter().copied().map(MsgId).collect());
        self
    }

    pub(crate) fn verdict(mut self, id: u64, has_spam: bool) -> Self {
        self.verdicts.insert(MsgId(id), has_spam);
        self
    }

    /// Any batch containing this user fails as a whole.
    pub(crate) fn failing_fetch_for(mut self, user: UserId) -> Self {
        self.failing_users.insert(user);
        self
    }

    pub(crate) fn failing_check(mut self, id: u64) -> Self {
        self.failing_checks.insert(MsgId(id));
        self
    }

    pub(crate) fn delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub(crate) fn batches(&self) -> Vec<Vec<UserId>> {
        self.batches.lock().clone()
    }

    pub(crate) fn max_in_flight_lookups(&self) -> usize {
        self.lookups.peak()
    }

    pub(crate) fn max_in_flight_fetches(&self) -> usize {
        self.fetches.peak()
    }

    pub(crate) fn max_in_flight_checks(&self) -> usize {
        self.checks.peak()
    }

    async fn pause(&self) {
        if !self.delay.is_zero() {
            sleep(self.delay).await;
        }
    }
}

#[async_trait]
impl UserDirectory for TableBackend {
    async fn resolve_user(&self, email: &str) -> Result<User, BackendError> {
        self.lookups.enter();
        self.pause().await;
        self.lookups.leave();
        self.users
            .get(email)
            .cloned()
            .ok_or_else(|| BackendError::UnknownUser(email.to_string()))
    }
}

#[async_trait]
impl MessageStore for TableBackend {
    async fn fetch_messages(&self, users: &[User]) -> Result<Vec<Message>, BackendError> {
        self.batches
            .lock()
            .push(users.iter().map(|u| u.id).collect());
        self.fetches.enter();
        self.pause().await;
        self.fetches.leave();
        if users.iter().any(|u| self.failing_users.contains(&u.id)) {
            return Err(BackendError::Unavailable("batch rejected".into()));
        }
        Ok(users
            .iter()
            .flat_map(|user| {
                self.messages
                    .get(&user.id)
                    .into_iter()
                    .flatten()
                    .map(move |id| Message {
                        id: *id,
                        user_id: user.id,
                    })
            })
            .collect())
    }
}

#[async_trait]
impl SpamChecker for TableBackend {
    async fn check_spam(&self, id: MsgId) -> Result<bool, BackendError> {
        self.checks.enter();
        self.pause().await;
        self.checks.leave();

        if self.failing_checks.contains(&id) {
            return Err(BackendError::Unavailable(format!("spam check for {id}")));
        }
        Ok(self.verdicts.get(&id).copied().unwrap_or(false))
    }
}
