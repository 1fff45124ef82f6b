//! Turns one inbound notification into at most one reaction.

use crate::cooldown::CooldownGate;
use crate::llm::LlmService;
use crate::pool::ResponsePool;
use crate::responders::{ResponderRegistry, ResponseContext};
use crate::sender::PokeSender;
use crate::targets::normalize_one;
use arc_swap::ArcSwap;
use futures::FutureExt;
use pokepro_core::{
    EventOrigin, InboundEvent, Outcome, PlatformClient, PokeConfig, PokeEvent, ResponseModule,
    Scope, SyntheticCommand, UserId,
};
use rand::Rng;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::mpsc;

/// What happened to one inbound event.
#[derive(Debug, Clone, PartialEq)]
pub enum DispatchOutcome {
    /// Reactions are switched off or no module has a positive weight.
    Disabled,
    NotAPoke,
    /// Echo of the bot's own poke, or an event this process already handled.
    Suppressed(EventOrigin),
    CoolingDown,
    /// Someone else was poked and the bot joined in.
    Followed { target: UserId },
    /// Someone else was poked and the bot stayed out of it.
    Ignored,
    Responded {
        module: ResponseModule,
        scope: Scope,
        user_id: UserId,
        outcome: Outcome,
    },
    /// The selected responder returned an error or panicked.
    Failed { module: ResponseModule },
}

/// Configuration-derived state, replaced as a whole on reload.
struct DispatchState {
    config: Arc<PokeConfig>,
    pool: ResponsePool,
    sender: PokeSender,
}

impl DispatchState {
    fn build(config: PokeConfig) -> Self {
        let pool = ResponsePool::from_config(&config);
        let sender = PokeSender::new(config.poke_interval());
        Self {
            config: Arc::new(config),
            pool,
            sender,
        }
    }
}

pub struct PokeDispatcher {
    client: Arc<dyn PlatformClient>,
    llm: LlmService,
    registry: ResponderRegistry,
    cooldown: CooldownGate,
    state: ArcSwap<DispatchState>,
}

impl PokeDispatcher {
    pub fn new(config: PokeConfig, client: Arc<dyn PlatformClient>, llm: LlmService) -> Self {
        let cooldown = CooldownGate::with_capacity(config.cooldown(), config.cooldown_capacity);
        Self {
            client,
            llm,
            registry: ResponderRegistry::with_defaults(),
            cooldown,
            state: ArcSwap::from_pointee(DispatchState::build(config)),
        }
    }

    /// Replace the responder table (tests, custom deployments).
    pub fn with_registry(mut self, registry: ResponderRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Swap in a new configuration: rebuild the pool and restart cooldowns.
    pub fn reload(&self, config: PokeConfig) {
        self.cooldown.reconfigure(config.cooldown());
        self.state.store(Arc::new(DispatchState::build(config)));
        tracing::info!("PokeDispatcher: configuration reloaded");
    }

    pub fn config(&self) -> Arc<PokeConfig> {
        self.state.load().config.clone()
    }

    pub fn cooldown(&self) -> &CooldownGate {
        &self.cooldown
    }

    pub fn client(&self) -> &Arc<dyn PlatformClient> {
        &self.client
    }

    pub async fn dispatch(&self, inbound: &InboundEvent) -> DispatchOutcome {
        let state = self.state.load_full();
        if !state.config.on_poke || state.pool.is_empty() {
            return DispatchOutcome::Disabled;
        }

        let Some(event) = PokeEvent::parse(inbound) else {
            return DispatchOutcome::NotAPoke;
        };
        if event.origin != EventOrigin::Peer {
            tracing::debug!("PokeDispatcher: suppressed {:?} poke", event.origin);
            return DispatchOutcome::Suppressed(event.origin);
        }

        let scope = event.scope();
        if !self.cooldown.allow(scope, event.user_id) {
            tracing::debug!(
                "PokeDispatcher: {} in {} cooling down ({:?} left)",
                event.user_id,
                scope,
                self.cooldown.remaining(scope, event.user_id)
            );
            return DispatchOutcome::CoolingDown;
        }

        if !event.is_self_poked() {
            let follow = rand::thread_rng().gen::<f64>() < state.config.follow_prob;
            if !follow {
                return DispatchOutcome::Ignored;
            }
            let targets = normalize_one(event.target_id, Some(event.self_id));
            state
                .sender
                .send(self.client.as_ref(), &targets, scope, 1)
                .await;
            return DispatchOutcome::Followed {
                target: event.target_id,
            };
        }

        let module = state.pool.select(&mut rand::thread_rng());
        let Some(responder) = self.registry.get(module).cloned() else {
            tracing::error!("PokeDispatcher: no responder registered for {}", module);
            return DispatchOutcome::Failed { module };
        };

        let ctx = ResponseContext {
            event: &event,
            config: &state.config,
            client: self.client.as_ref(),
            sender: &state.sender,
            llm: &self.llm,
        };
        match AssertUnwindSafe(responder.respond(&ctx)).catch_unwind().await {
            Ok(Ok(outcome)) => {
                tracing::debug!("PokeDispatcher: {} -> {:?}", module, outcome);
                DispatchOutcome::Responded {
                    module,
                    scope,
                    user_id: event.user_id,
                    outcome,
                }
            }
            Ok(Err(e)) => {
                tracing::error!("PokeDispatcher: responder {} failed: {:#}", module, e);
                DispatchOutcome::Failed { module }
            }
            Err(_) => {
                tracing::error!("PokeDispatcher: responder {} panicked", module);
                DispatchOutcome::Failed { module }
            }
        }
    }

    /// Carry out the host-side part of an outcome: send the reply, or queue
    /// the synthetic command for the command pipeline.
    pub async fn deliver(&self, outcome: &DispatchOutcome, commands: &mpsc::Sender<SyntheticCommand>) {
        let DispatchOutcome::Responded {
            scope,
            user_id,
            outcome,
            ..
        } = outcome
        else {
            return;
        };

        match outcome {
            Outcome::Reply(reply) => {
                if let Err(e) = self.client.send_reply(*scope, *user_id, reply).await {
                    tracing::error!("PokeDispatcher: failed to send reply in {}: {:#}", scope, e);
                }
            }
            Outcome::Redispatch(cmd) => match commands.try_send(cmd.clone()) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(_)) => {
                    tracing::warn!("PokeDispatcher: command queue full, dropping {:?}", cmd.command);
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    tracing::warn!("PokeDispatcher: command pipeline closed, dropping {:?}", cmd.command);
                }
            },
            Outcome::Silent | Outcome::Handled => {}
        }
    }
}
