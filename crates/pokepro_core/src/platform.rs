//! Capabilities the responder consumes. Implementations live elsewhere
//! (the OneBot adapter, the reasoning crate) or in tests.

use crate::identity::{GroupId, Scope, UserId};
use crate::reply::Reply;
use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Profile fields used to address a user by name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MemberInfo {
    #[serde(default)]
    pub card: Option<String>,
    #[serde(default)]
    pub nickname: Option<String>,
    #[serde(default)]
    pub nick: Option<String>,
}

impl MemberInfo {
    /// Group card, then nickname, then nick. Empty strings are skipped.
    pub fn display_name(&self) -> Option<&str> {
        [&self.card, &self.nickname, &self.nick]
            .into_iter()
            .filter_map(|s| s.as_deref())
            .find(|s| !s.is_empty())
    }
}

/// The chat platform. Every call may fail with a generic action error.
#[async_trait]
pub trait PlatformClient: Send + Sync {
    async fn group_poke(&self, group_id: GroupId, user_id: UserId) -> Result<()>;
    async fn friend_poke(&self, user_id: UserId) -> Result<()>;
    async fn set_group_ban(&self, group_id: GroupId, user_id: UserId, duration: Duration) -> Result<()>;
    async fn get_group_member_list(&self, group_id: GroupId) -> Result<Vec<UserId>>;
    /// Senders of the recent messages in a group, newest last.
    async fn get_group_msg_history(&self, group_id: GroupId) -> Result<Vec<UserId>>;
    async fn get_group_member_info(&self, group_id: GroupId, user_id: UserId) -> Result<MemberInfo>;
    async fn get_stranger_info(&self, user_id: UserId) -> Result<MemberInfo>;
    async fn send_reply(&self, scope: Scope, user_id: UserId, reply: &Reply) -> Result<()>;
}

/// One turn of conversation history handed to the provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: String,
    pub content: String,
}

/// Everything the provider needs besides the user prompt.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConversationContext {
    pub system_prompt: String,
    pub history: Vec<ChatTurn>,
}

/// Text generation backend.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    async fn generate_reply(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        history: &[ChatTurn],
    ) -> Result<String>;
}

/// Conversation and persona lookup. `None` means there is no active
/// conversation for this scope, which is not an error.
#[async_trait]
pub trait ConversationSource: Send + Sync {
    async fn context(&self, scope: Scope, user_id: UserId) -> Option<ConversationContext>;
}
