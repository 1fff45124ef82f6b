//! Conversation sources.

use async_trait::async_trait;
use pokepro_core::{ConversationContext, ConversationSource, Scope, UserId};

/// The same system prompt for every conversation, with no history.
#[derive(Debug, Clone)]
pub struct StaticPersona {
    system_prompt: String,
}

impl StaticPersona {
    pub fn new(system_prompt: impl Into<String>) -> Self {
        Self {
            system_prompt: system_prompt.into(),
        }
    }
}

#[async_trait]
impl ConversationSource for StaticPersona {
    async fn context(&self, _scope: Scope, _user_id: UserId) -> Option<ConversationContext> {
        if self.system_prompt.trim().is_empty() {
            return None;
        }
        Some(ConversationContext {
            system_prompt: self.system_prompt.clone(),
            history: vec![],
        })
    }
}
