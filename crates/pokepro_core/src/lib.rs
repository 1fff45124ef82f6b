pub mod config;
pub mod event;
pub mod identity;
pub mod module;
pub mod platform;
pub mod reply;

pub use config::PokeConfig;
pub use event::{EventExtras, EventOrigin, InboundEvent, PokeEvent};
pub use identity::{GroupId, IdentityKey, Scope, UserId};
pub use module::ResponseModule;
pub use platform::{
    ChatTurn, ConversationContext, ConversationSource, LlmProvider, MemberInfo, PlatformClient,
};
pub use reply::{Outcome, Reply, SyntheticCommand};
