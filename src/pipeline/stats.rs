use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use serde::Serialize;

use crate::domain::{MsgId, UserId};

#[derive(Debug, Clone, Copy)]
pub enum Counter {
    EmailsReceived,
    UsersEmitted,
    DuplicateUsers,
    BatchesDispatched,
    MessagesFetched,
    MessagesClassified,
    ReportLines,
}

const COUNTERS: usize = 7;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DropEvent {
    Lookup { email: String, error: String },
    Batch { user_ids: Vec<UserId>, error: String },
    Classification { msg_id: MsgId, error: String },
}

#[derive(Debug, Default)]
pub struct RunStats {
    counters: [AtomicU64; COUNTERS],
    drops: Mutex<Vec<DropEvent>>,
}

impl RunStats {
    pub fn add(&self, counter: Counter, n: u64) {
        self.counters[counter as usize].fetch_add(n, Ordering::Relaxed);
    }

    pub fn incr(&self, counter: Counter) {
        self.add(counter, 1);
    }

    pub fn get(&self, counter: Counter) -> u64 {
        self.counters[counter as usize].load(Ordering::Relaxed)
    }

    pub fn record_drop(&self, event: DropEvent) {
        match &event {
            DropEvent::Lookup { email, error } => {
                tracing::warn!(target: "dedup", %email, %error, "user lookup failed; email dropped");
            }
            DropEvent::Batch { user_ids, error } => {
                tracing::warn!(
                    target: "batch_fetch",
                    users = ?user_ids,
                    %error,
                    "message fetch failed; batch dropped"
                );
            }
            DropEvent::Classification { msg_id, error } => {
                tracing::warn!(
                    target: "classify",
                    msg_id = msg_id.0,
                    %error,
                    "spam check failed; message dropped"
                );
            }
        }
        self.drops.lock().push(event);
    }

    pub fn drops(&self) -> Vec<DropEvent> {
        self.drops.lock().clone()
    }

    pub fn summary(&self) -> RunSummary {
        RunSummary {
            emails_received: self.get(Counter::EmailsReceived),
            users_emitted: self.get(Counter::UsersEmitted),
            duplicate_users: self.get(Counter::DuplicateUsers),
            batches_dispatched: self.get(Counter::BatchesDispatched),
            messages_fetched: self.get(Counter::MessagesFetched),
            messages_classified: self.get(Counter::MessagesClassified),
            report_lines: self.get(Counter::ReportLines),
            drops: self.drops(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub emails_received: u64,
    pub users_emitted: u64,
    pub duplicate_users: u64,
    pub batches_dispatched: u64,
    pub messages_fetched: u64,
    pub messages_classified: u64,
    pub report_lines: u64,
    pub drops: Vec<DropEvent>,
}

impl RunSummary {
    pub fn log(&self) {
        tracing::info!(
            target: "pipeline",
            emails = self.emails_received,
            users = self.users_emitted,
            duplicates = self.duplicate_users,
            batches = self.batches_dispatched,
            fetched = self.messages_fetched,
            classified = self.messages_classified,
            lines = self.report_lines,
            dropped = self.drops.len(),
            "run summary"
        );
    }
}
