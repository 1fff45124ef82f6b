//! Test doubles shared by the unit tests of this crate.

use anyhow::Result;
use async_trait::async_trait;
use pokepro_core::{
    ChatTurn, ConversationContext, ConversationSource, GroupId, LlmProvider, MemberInfo,
    PlatformClient, Reply, Scope, UserId,
};
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    GroupPoke { group: GroupId, user: UserId },
    FriendPoke { user: UserId },
    Ban { group: GroupId, user: UserId, duration: Duration },
    Reply { scope: Scope, reply: Reply },
}

#[derive(Default)]
pub struct RecordingClient {
    pub actions: Mutex<Vec<(Action, Instant)>>,
    pub fail_pokes_for: Option<UserId>,
    pub fail_ban: bool,
    pub members: Vec<UserId>,
    pub history: Vec<UserId>,
    pub member_info: Option<MemberInfo>,
}

impl RecordingClient {
    pub fn actions(&self) -> Vec<Action> {
        self.actions.lock().unwrap().iter().map(|(a, _)| a.clone()).collect()
    }

    pub fn timed_actions(&self) -> Vec<(Action, Instant)> {
        self.actions.lock().unwrap().clone()
    }

    pub fn poked_users(&self) -> Vec<UserId> {
        self.actions()
            .into_iter()
            .filter_map(|a| match a {
                Action::GroupPoke { user, .. } | Action::FriendPoke { user } => Some(user),
                _ => None,
            })
            .collect()
    }

    fn record(&self, action: Action) {
        self.actions.lock().unwrap().push((action, Instant::now()));
    }
}

#[async_trait]
impl PlatformClient for RecordingClient {
    async fn group_poke(&self, group: GroupId, user: UserId) -> Result<()> {
        self.record(Action::GroupPoke { group, user });
        if self.fail_pokes_for == Some(user) {
            anyhow::bail!("group_poke failed (retcode 1200)");
        }
        Ok(())
    }

    async fn friend_poke(&self, user: UserId) -> Result<()> {
        self.record(Action::FriendPoke { user });
        if self.fail_pokes_for == Some(user) {
            anyhow::bail!("friend_poke failed (retcode 1200)");
        }
        Ok(())
    }

    async fn set_group_ban(&self, group: GroupId, user: UserId, duration: Duration) -> Result<()> {
        if self.fail_ban {
            anyhow::bail!("set_group_ban failed: permission denied");
        }
        self.record(Action::Ban { group, user, duration });
        Ok(())
    }

    async fn get_group_member_list(&self, _group: GroupId) -> Result<Vec<UserId>> {
        Ok(self.members.clone())
    }

    async fn get_group_msg_history(&self, _group: GroupId) -> Result<Vec<UserId>> {
        Ok(self.history.clone())
    }

    async fn get_group_member_info(&self, _group: GroupId, _user: UserId) -> Result<MemberInfo> {
        self.member_info
            .clone()
            .ok_or_else(|| anyhow::anyhow!("member not found"))
    }

    async fn get_stranger_info(&self, _user: UserId) -> Result<MemberInfo> {
        Ok(MemberInfo {
            nickname: Some("stranger".into()),
            ..Default::default()
        })
    }

    async fn send_reply(&self, scope: Scope, _user: UserId, reply: &Reply) -> Result<()> {
        self.record(Action::Reply {
            scope,
            reply: reply.clone(),
        });
        Ok(())
    }
}

/// Provider that echoes the user prompt, or fails when asked to.
#[derive(Default)]
pub struct EchoProvider {
    pub fail: bool,
    pub prompts: Mutex<Vec<String>>,
}

#[async_trait]
impl LlmProvider for EchoProvider {
    async fn generate_reply(&self, _system: &str, user_prompt: &str, _history: &[ChatTurn]) -> Result<String> {
        self.prompts.lock().unwrap().push(user_prompt.to_string());
        if self.fail {
            anyhow::bail!("provider unavailable");
        }
        Ok(format!("echo: {}", user_prompt))
    }
}

/// Conversation source with a fixed persona, or none at all.
pub struct FixedConversation(pub Option<ConversationContext>);

impl FixedConversation {
    pub fn persona(prompt: &str) -> Self {
        Self(Some(ConversationContext {
            system_prompt: prompt.to_string(),
            history: vec![],
        }))
    }
}

#[async_trait]
impl ConversationSource for FixedConversation {
    async fn context(&self, _scope: Scope, _user: UserId) -> Option<ConversationContext> {
        self.0.clone()
    }
}
