use std::{cmp::Ordering, fmt};

use serde::{Deserialize, Serialize};

use super::types::{MsgId, UserId};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: MsgId,
    pub user_id: UserId,
}

/// Verdict for one successfully classified message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MsgData {
    pub id: MsgId,
    pub has_spam: bool,
}

impl MsgData {
    pub fn new(id: MsgId, has_spam: bool) -> Self {
        Self { id, has_spam }
    }

    /// Spam first, then ascending message id.
    pub fn report_order(&self, other: &Self) -> Ordering {
        other
            .has_spam
            .cmp(&self.has_spam)
            .then_with(|| self.id.cmp(&other.id))
    }
}

/// One formatted report line: `"<has_spam> <id>"`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputLine(String);

impl OutputLine {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<MsgData> for OutputLine {
    fn from(data: MsgData) -> Self {
        Self(format!("{} {}", data.has_spam, data.id))
    }
}

impl fmt::Display for OutputLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
