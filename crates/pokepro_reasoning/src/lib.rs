pub mod persona;
pub mod provider;
pub mod retry;

pub use persona::StaticPersona;
pub use provider::OpenAiCompatProvider;
pub use retry::{with_retry, RetryConfig};

use pokepro_core::config::ProviderConfig;
use pokepro_core::LlmProvider;
use std::sync::Arc;

/// Build the configured provider, or `None` when no API key is set.
pub fn build_provider(config: &ProviderConfig) -> Option<Arc<dyn LlmProvider>> {
    if config.api_key.as_deref().map_or(true, |k| k.trim().is_empty()) {
        tracing::info!("No LLM API key configured, LLM replies are disabled");
        return None;
    }
    match OpenAiCompatProvider::new(config) {
        Ok(p) => Some(Arc::new(p)),
        Err(e) => {
            tracing::error!("Failed to build LLM provider: {:#}", e);
            None
        }
    }
}
