use crate::event::EventExtras;
use crate::identity::{Scope, UserId};
use std::path::PathBuf;

/// A single outgoing message produced in reaction to a poke.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    Text(String),
    Image(PathBuf),
    /// The same QQ face repeated `count` times in one message.
    Faces { id: i32, count: usize },
}

/// A poke rewritten into a bot command, to be fed back into the host's
/// command pipeline instead of being answered directly.
#[derive(Debug, Clone, PartialEq)]
pub struct SyntheticCommand {
    pub scope: Scope,
    pub self_id: UserId,
    pub user_id: UserId,
    pub command: String,
    pub extras: EventExtras,
}

impl SyntheticCommand {
    pub fn new(scope: Scope, self_id: UserId, user_id: UserId, command: impl Into<String>) -> Self {
        Self {
            scope,
            self_id,
            user_id,
            command: command.into(),
            extras: EventExtras { poke_handled: true },
        }
    }
}

/// What a response module asks the host to do after it ran.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// Nothing to send.
    Silent,
    /// Side effects already happened; stop further processing of the event.
    Handled,
    Reply(Reply),
    Redispatch(SyntheticCommand),
}

impl Outcome {
    /// Whether the platform should stop passing this event to other handlers.
    pub fn stops_event(&self) -> bool {
        matches!(self, Outcome::Handled | Outcome::Redispatch(_))
    }
}
