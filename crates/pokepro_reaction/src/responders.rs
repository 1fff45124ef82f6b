//! One responder per [`ResponseModule`], registered once and looked up by tag.

use crate::llm::LlmService;
use crate::sender::PokeSender;
use crate::targets::normalize_one;
use anyhow::Result;
use async_trait::async_trait;
use pokepro_core::{
    Outcome, PlatformClient, PokeConfig, PokeEvent, Reply, ResponseModule, Scope, SyntheticCommand,
};
use rand::seq::SliceRandom;
use rand::Rng;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// Everything a responder may touch while handling one event.
pub struct ResponseContext<'a> {
    pub event: &'a PokeEvent,
    pub config: &'a PokeConfig,
    pub client: &'a dyn PlatformClient,
    pub sender: &'a PokeSender,
    pub llm: &'a LlmService,
}

#[async_trait]
pub trait Responder: Send + Sync {
    fn module(&self) -> ResponseModule;
    async fn respond(&self, ctx: &ResponseContext<'_>) -> Result<Outcome>;
}

/// Module → responder table.
#[derive(Clone, Default)]
pub struct ResponderRegistry {
    responders: HashMap<ResponseModule, Arc<dyn Responder>>,
}

impl ResponderRegistry {
    /// Registry with the built-in responder for every module.
    pub fn with_defaults() -> Self {
        let mut registry = Self::default();
        registry.register(Arc::new(AntiPokeResponder));
        registry.register(Arc::new(LlmResponder));
        registry.register(Arc::new(FaceResponder));
        registry.register(Arc::new(MemeResponder));
        registry.register(Arc::new(BanResponder));
        registry.register(Arc::new(CommandResponder));
        registry
    }

    /// Add or replace the responder for its module.
    pub fn register(&mut self, responder: Arc<dyn Responder>) {
        self.responders.insert(responder.module(), responder);
    }

    pub fn get(&self, module: ResponseModule) -> Option<&Arc<dyn Responder>> {
        self.responders.get(&module)
    }
}

// ============================================================================
// Built-in responders
// ============================================================================

/// Pokes the poker back 1..=max_times times.
pub struct AntiPokeResponder;

#[async_trait]
impl Responder for AntiPokeResponder {
    fn module(&self) -> ResponseModule {
        ResponseModule::AntiPoke
    }

    async fn respond(&self, ctx: &ResponseContext<'_>) -> Result<Outcome> {
        let times = rand::thread_rng().gen_range(1..=ctx.config.antipoke.max_times.max(1));
        let targets = normalize_one(ctx.event.user_id, Some(ctx.event.self_id));
        ctx.sender
            .send(ctx.client, &targets, ctx.event.scope(), times)
            .await;
        Ok(Outcome::Handled)
    }
}

pub struct LlmResponder;

#[async_trait]
impl Responder for LlmResponder {
    fn module(&self) -> ResponseModule {
        ResponseModule::Llm
    }

    async fn respond(&self, ctx: &ResponseContext<'_>) -> Result<Outcome> {
        let text = ctx
            .llm
            .reply(ctx.client, ctx.event, &ctx.config.llm.template)
            .await;
        Ok(text.map_or(Outcome::Silent, |t| Outcome::Reply(Reply::Text(t))))
    }
}

/// A burst of one randomly chosen QQ face.
pub struct FaceResponder;

#[async_trait]
impl Responder for FaceResponder {
    fn module(&self) -> ResponseModule {
        ResponseModule::Face
    }

    async fn respond(&self, ctx: &ResponseContext<'_>) -> Result<Outcome> {
        let face = &ctx.config.face;
        let (id, count) = {
            let mut rng = rand::thread_rng();
            let id = *face
                .pool
                .choose(&mut rng)
                .ok_or_else(|| anyhow::anyhow!("face pool is empty"))?;
            (id, rng.gen_range(1..=face.max_copy_count.max(1)))
        };
        Ok(Outcome::Reply(Reply::Faces { id, count }))
    }
}

/// One random image from the media pool.
pub struct MemeResponder;

#[async_trait]
impl Responder for MemeResponder {
    fn module(&self) -> ResponseModule {
        ResponseModule::Meme
    }

    async fn respond(&self, ctx: &ResponseContext<'_>) -> Result<Outcome> {
        let entry = ctx
            .config
            .meme
            .pool
            .choose(&mut rand::thread_rng())
            .ok_or_else(|| anyhow::anyhow!("meme pool is empty"))?;
        Ok(Outcome::Reply(Reply::Image(ctx.config.resolve_media(entry))))
    }
}

/// Mutes the poker; the LLM comments on success or on failure.
pub struct BanResponder;

#[async_trait]
impl Responder for BanResponder {
    fn module(&self) -> ResponseModule {
        ResponseModule::Ban
    }

    async fn respond(&self, ctx: &ResponseContext<'_>) -> Result<Outcome> {
        let ban = &ctx.config.ban;
        let duration = jittered_duration(&mut rand::thread_rng(), ban.duration, ban.delta);

        let muted = match ctx.event.scope() {
            Scope::Group(group_id) => {
                match ctx
                    .client
                    .set_group_ban(group_id, ctx.event.user_id, duration)
                    .await
                {
                    Ok(()) => true,
                    Err(e) => {
                        tracing::warn!("BanResponder: mute failed for {}: {:#}", ctx.event.user_id, e);
                        false
                    }
                }
            }
            Scope::Direct => false,
        };

        let template = if muted {
            &ban.ban_template
        } else {
            &ban.ban_fail_template
        };
        let text = ctx.llm.reply(ctx.client, ctx.event, template).await;
        Ok(text.map_or(Outcome::Silent, |t| Outcome::Reply(Reply::Text(t))))
    }
}

/// Turns the poke into a random command from the pool.
pub struct CommandResponder;

#[async_trait]
impl Responder for CommandResponder {
    fn module(&self) -> ResponseModule {
        ResponseModule::Command
    }

    async fn respond(&self, ctx: &ResponseContext<'_>) -> Result<Outcome> {
        let command = ctx
            .config
            .command
            .pool
            .choose(&mut rand::thread_rng())
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("command pool is empty"))?;
        let event = ctx.event;
        Ok(Outcome::Redispatch(SyntheticCommand::new(
            event.scope(),
            event.self_id,
            event.user_id,
            command,
        )))
    }
}

/// `base ± delta` seconds, floored at zero.
pub fn jittered_duration<R: Rng + ?Sized>(rng: &mut R, base: u64, delta: u64) -> Duration {
    let base = base.min(i64::MAX as u64) as i64;
    let delta = delta.min(i64::MAX as u64 / 2) as i64;
    let offset = if delta == 0 { 0 } else { rng.gen_range(-delta..=delta) };
    Duration::from_secs(base.saturating_add(offset).max(0) as u64)
}
