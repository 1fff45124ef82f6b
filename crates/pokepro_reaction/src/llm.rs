//! LLM-backed replies. Every missing piece (conversation, persona,
//! provider) or provider failure yields "no reply" rather than an error.

use pokepro_core::{ConversationSource, LlmProvider, PlatformClient, PokeEvent, Scope, UserId};
use std::sync::Arc;

pub struct LlmService {
    provider: Option<Arc<dyn LlmProvider>>,
    conversations: Arc<dyn ConversationSource>,
}

impl LlmService {
    pub fn new(
        provider: Option<Arc<dyn LlmProvider>>,
        conversations: Arc<dyn ConversationSource>,
    ) -> Self {
        Self {
            provider,
            conversations,
        }
    }

    pub fn has_provider(&self) -> bool {
        self.provider.is_some()
    }

    /// Generate a reply to `event` using `template` as the user prompt.
    pub async fn reply(
        &self,
        client: &dyn PlatformClient,
        event: &PokeEvent,
        template: &str,
    ) -> Option<String> {
        let scope = event.scope();
        let context = self.conversations.context(scope, event.user_id).await?;
        if context.system_prompt.trim().is_empty() {
            tracing::debug!("LlmService: no persona for {}, skipping", scope);
            return None;
        }
        let provider = self.provider.as_ref()?;

        let username = resolve_nickname(client, scope, event.user_id).await;
        let prompt = render_template(template, &username);
        tracing::debug!("LlmService: prompt {:?}", prompt);

        match provider
            .generate_reply(&context.system_prompt, &prompt, &context.history)
            .await
        {
            Ok(text) if !text.trim().is_empty() => Some(text.trim().to_string()),
            Ok(_) => None,
            Err(e) => {
                tracing::error!("LlmService: generation failed: {:#}", e);
                None
            }
        }
    }
}

/// Substitute `{username}` in a prompt template.
pub fn render_template(template: &str, username: &str) -> String {
    template.replace("{username}", username)
}

/// Group card or nickname of a user, degrading from group member info to
/// stranger info to the bare number.
pub async fn resolve_nickname(client: &dyn PlatformClient, scope: Scope, user_id: UserId) -> String {
    if let Scope::Group(group_id) = scope {
        if let Ok(info) = client.get_group_member_info(group_id, user_id).await {
            if let Some(name) = info.display_name() {
                return name.to_string();
            }
        }
    }
    if let Ok(info) = client.get_stranger_info(user_id).await {
        if let Some(name) = info.display_name() {
            return name.to_string();
        }
    }
    user_id.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{EchoProvider, FixedConversation, RecordingClient};
    use pokepro_core::{EventOrigin, MemberInfo};

    fn event() -> PokeEvent {
        PokeEvent {
            time: 0,
            self_id: 1,
            user_id: 2,
            target_id: 1,
            group_id: Some(10),
            raw_info: vec![],
            origin: EventOrigin::Peer,
        }
    }

    #[tokio::test]
    async fn test_reply_uses_group_card() {
        let client = RecordingClient {
            member_info: Some(MemberInfo {
                card: Some("群名片".into()),
                ..Default::default()
            }),
            ..Default::default()
        };
        let provider = Arc::new(EchoProvider::default());
        let svc = LlmService::new(
            Some(provider.clone()),
            Arc::new(FixedConversation::persona("be cute")),
        );
        let text = svc.reply(&client, &event(), "{username} poked you").await;
        assert_eq!(text.as_deref(), Some("echo: 群名片 poked you"));
    }

    #[tokio::test]
    async fn test_nickname_falls_back_to_stranger_info() {
        let client = RecordingClient::default();
        assert_eq!(resolve_nickname(&client, Scope::Group(10), 2).await, "stranger");
        assert_eq!(resolve_nickname(&client, Scope::Direct, 2).await, "stranger");
    }

    #[tokio::test]
    async fn test_missing_pieces_produce_no_reply() {
        let client = RecordingClient::default();

        let no_conversation = LlmService::new(
            Some(Arc::new(EchoProvider::default())),
            Arc::new(FixedConversation(None)),
        );
        assert!(no_conversation.reply(&client, &event(), "x").await.is_none());

        let no_provider = LlmService::new(None, Arc::new(FixedConversation::persona("p")));
        assert!(no_provider.reply(&client, &event(), "x").await.is_none());

        let no_persona = LlmService::new(
            Some(Arc::new(EchoProvider::default())),
            Arc::new(FixedConversation::persona("  ")),
        );
        assert!(no_persona.reply(&client, &event(), "x").await.is_none());
    }

    #[tokio::test]
    async fn test_provider_failure_is_swallowed() {
        let client = RecordingClient::default();
        let svc = LlmService::new(
            Some(Arc::new(EchoProvider {
                fail: true,
                ..Default::default()
            })),
            Arc::new(FixedConversation::persona("p")),
        );
        assert!(svc.reply(&client, &event(), "x").await.is_none());
    }
}
