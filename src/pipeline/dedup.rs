use std::{collections::HashSet, sync::Arc};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::{
    backend::UserDirectory,
    domain::{Email, User, UserId},
};

use super::{
    context::StageContext,
    orchestrator::Stage,
    spawner::BoundedSpawner,
    stats::{Counter, DropEvent},
};

pub struct DedupStage {
    users: Arc<dyn UserDirectory>,
    concurrency: Option<usize>,
}

impl DedupStage {
    pub fn new(users: Arc<dyn UserDirectory>, concurrency: Option<usize>) -> Self {
        Self { users, concurrency }
    }
}

#[async_trait]
impl Stage for DedupStage {
    type In = Email;
    type Out = User;

    fn name(&self) -> &'static str {
        "dedup"
    }

    async fn run(self, ctx: StageContext, mut input: mpsc::Receiver<Email>, output: mpsc::Sender<User>) {
        let seen: Arc<Mutex<HashSet<UserId>>> = Arc::new(Mutex::new(HashSet::new()));
        let mut lookups = BoundedSpawner::new(self.name(), self.concurrency);

        while let Some(email) = ctx.recv(&mut input).await {
            ctx.stats().incr(Counter::EmailsReceived);
            let users = self.users.clone();
            let seen = seen.clone();
            let ctx = ctx.clone();
            let output = output.clone();
            lookups
                .spawn(async move {
                    let user = match ctx.call(users.resolve_user(&email)).await {
                        None => return,
                        Some(Ok(user)) => user,
                        Some(Err(err)) => {
                            ctx.stats().record_drop(DropEvent::Lookup {
                                email,
                                error: err.to_string(),
                            });
                            return;
                        }
                    };

                    let first_sight = seen.lock().insert(user.id);
                    if !first_sight {
                        ctx.stats().incr(Counter::DuplicateUsers);
                        tracing::trace!(target: "dedup", user_id = user.id, %email, "duplicate user skipped");
                        return;
                    }
                    if ctx.send(&output, user).await {
                        ctx.stats().incr(Counter::UsersEmitted);
                    }
                })
                .await;
        }

        tracing::debug!(target: "dedup", pending = lookups.in_flight(), "input drained; waiting for lookups");
        lookups.wait().await;
    }
}
