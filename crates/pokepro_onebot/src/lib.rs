pub mod client;
pub mod error;
pub mod event;

pub use client::{OneBotClient, QueuedAction};
pub use error::ActionError;
pub use event::{ActionRequest, ActionResponse, Frame, MessageEvent, Segment};
