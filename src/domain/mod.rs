pub mod message;
pub mod types;

pub use message::{Message, MsgData, OutputLine};
pub use types::{Email, MsgId, User, UserId};
