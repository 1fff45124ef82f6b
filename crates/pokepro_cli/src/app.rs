//! Event loop wiring the OneBot connection to the dispatcher, the command
//! pipeline and the scheduler.

use anyhow::Result;
use pokepro_core::{InboundEvent, PlatformClient, PokeConfig, Scope, SyntheticCommand};
use pokepro_onebot::MessageEvent;
use pokepro_reaction::{CommandMessage, CommandRunner, LlmService, PokeDispatcher, PokeScheduler, PokeSender};
use pokepro_reasoning::{build_provider, StaticPersona};
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

const COMMAND_QUEUE: usize = 64;
const SWEEP_INTERVAL: Duration = Duration::from_secs(600);

pub struct App {
    config_path: PathBuf,
    dispatcher: Arc<PokeDispatcher>,
    scheduler: Option<PokeScheduler>,
    commands: mpsc::Sender<SyntheticCommand>,
    client_attached: bool,
}

impl App {
    pub fn new(config: PokeConfig, config_path: PathBuf, client: Arc<dyn PlatformClient>) -> Self {
        let llm = LlmService::new(
            build_provider(&config.provider),
            Arc::new(StaticPersona::new(config.provider.system_prompt.clone())),
        );
        let scheduler = build_scheduler(&config);
        let dispatcher = Arc::new(PokeDispatcher::new(config, client, llm));

        let (commands, queue) = mpsc::channel(COMMAND_QUEUE);
        tokio::spawn(run_command_pipeline(dispatcher.clone(), queue));
        tokio::spawn(run_cooldown_sweeper(dispatcher.clone()));

        Self {
            config_path,
            dispatcher,
            scheduler,
            commands,
            client_attached: false,
        }
    }

    /// Route one raw OneBot event. Work is spawned so a slow LLM call never
    /// holds up the socket.
    pub fn handle_event(&mut self, event: Value) {
        if !self.client_attached {
            self.client_attached = true;
            if let Some(scheduler) = &self.scheduler {
                scheduler.set_client(self.dispatcher.client().clone());
            }
        }

        match event.get("post_type").and_then(Value::as_str) {
            Some("notice") => {
                let dispatcher = self.dispatcher.clone();
                let commands = self.commands.clone();
                tokio::spawn(async move {
                    let outcome = dispatcher.dispatch(&InboundEvent::new(event)).await;
                    tracing::debug!("Poke dispatch: {:?}", outcome);
                    dispatcher.deliver(&outcome, &commands).await;
                });
            }
            Some("message") => {
                let Some(message) = MessageEvent::from_value(&event) else {
                    return;
                };
                let dispatcher = self.dispatcher.clone();
                tokio::spawn(async move {
                    let config = dispatcher.config();
                    let sender = PokeSender::new(config.poke_interval());
                    let runner = CommandRunner {
                        client: dispatcher.client().as_ref(),
                        sender: &sender,
                        config: &config,
                    };
                    runner.handle_message(&command_message(&message)).await;
                });
            }
            Some("meta_event") => {
                tracing::debug!("OneBot meta event: {}", event);
            }
            _ => {}
        }
    }

    /// Re-read the config file. A file that fails to load keeps the
    /// current configuration.
    pub fn reload(&mut self) {
        let config = match PokeConfig::load(&self.config_path) {
            Ok(c) => c,
            Err(e) => {
                tracing::error!("Config reload failed, keeping the current one: {:#}", e);
                return;
            }
        };

        if let Some(old) = self.scheduler.take() {
            old.shutdown();
        }
        self.scheduler = build_scheduler(&config);
        if let Some(scheduler) = &self.scheduler {
            if self.client_attached {
                scheduler.set_client(self.dispatcher.client().clone());
            }
        }

        self.dispatcher.reload(config);
        tracing::info!("Reloaded {}", self.config_path.display());
    }

    pub fn shutdown(&mut self) {
        if let Some(scheduler) = self.scheduler.take() {
            scheduler.shutdown();
        }
    }

    pub async fn run(mut self, mut events: mpsc::Receiver<Value>) -> Result<()> {
        let mut hangup = HangupSignal::new();
        let shutdown = shutdown_signal();
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                event = events.recv() => match event {
                    Some(event) => self.handle_event(event),
                    None => {
                        tracing::warn!("OneBot event stream ended");
                        break;
                    }
                },
                _ = hangup.recv() => self.reload(),
                _ = &mut shutdown => {
                    tracing::info!("Shutting down");
                    break;
                }
            }
        }

        self.shutdown();
        Ok(())
    }
}

fn build_scheduler(config: &PokeConfig) -> Option<PokeScheduler> {
    if !config.scheduler.enabled {
        return None;
    }
    let scheduler = PokeScheduler::new(&config.scheduler, PokeSender::new(config.poke_interval()));
    scheduler.start();
    Some(scheduler)
}

/// Reduce a OneBot message to what the command layer reads. Private chats
/// count as addressed to the bot.
pub fn command_message(message: &MessageEvent) -> CommandMessage {
    let mentions = message.mentions();
    CommandMessage {
        scope: Scope::from_group(message.group_id),
        self_id: message.self_id,
        sender: message.user_id,
        text: message.plain_text().trim().to_string(),
        addressed: message.message_type == "private" || mentions.contains(&message.self_id),
        mentions,
    }
}

async fn run_command_pipeline(dispatcher: Arc<PokeDispatcher>, mut queue: mpsc::Receiver<SyntheticCommand>) {
    while let Some(cmd) = queue.recv().await {
        tracing::debug!("Command pipeline: {:?} from {} in {}", cmd.command, cmd.user_id, cmd.scope);
        let config = dispatcher.config();
        let sender = PokeSender::new(config.poke_interval());
        let runner = CommandRunner {
            client: dispatcher.client().as_ref(),
            sender: &sender,
            config: &config,
        };
        runner.handle_synthetic(&cmd).await;
    }
}

async fn run_cooldown_sweeper(dispatcher: Arc<PokeDispatcher>) {
    let mut ticker = tokio::time::interval(SWEEP_INTERVAL);
    ticker.tick().await;
    loop {
        ticker.tick().await;
        let removed = dispatcher.cooldown().sweep_expired();
        if removed > 0 {
            tracing::debug!("Swept {} expired cooldown record(s)", removed);
        }
    }
}

/// SIGHUP on unix, never elsewhere.
struct HangupSignal {
    #[cfg(unix)]
    inner: Option<tokio::signal::unix::Signal>,
}

impl HangupSignal {
    fn new() -> Self {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};
            let inner = match signal(SignalKind::hangup()) {
                Ok(s) => Some(s),
                Err(e) => {
                    tracing::warn!("SIGHUP handler unavailable, hot reload disabled: {}", e);
                    None
                }
            };
            Self { inner }
        }
        #[cfg(not(unix))]
        {
            Self {}
        }
    }

    #[cfg(unix)]
    async fn recv(&mut self) {
        if let Some(signal) = self.inner.as_mut() {
            if signal.recv().await.is_some() {
                return;
            }
        }
        std::future::pending::<()>().await
    }

    #[cfg(not(unix))]
    async fn recv(&mut self) {
        std::future::pending::<()>().await
    }
}

/// Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Ctrl+C handler unavailable: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut s) => {
                s.recv().await;
            }
            Err(_) => std::future::pending::<()>().await,
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
