//! The `戳` chat command and keyword-triggered pokes.

use crate::sender::PokeSender;
use crate::targets::{normalize, RawTarget};
use pokepro_core::{PlatformClient, PokeConfig, Scope, SyntheticCommand, UserId};
use rand::seq::SliceRandom;

/// Largest member sample poked by `戳全体成员`.
pub const MEMBER_SAMPLE_LIMIT: usize = 200;

const COMMAND_NAMES: [&str; 3] = ["戳", "戳我", "戳全体成员"];

/// A chat message, reduced to what the command layer needs.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandMessage {
    pub scope: Scope,
    pub self_id: UserId,
    pub sender: UserId,
    /// Plain text with the wake prefix still attached, if any.
    pub text: String,
    /// Users mentioned by at-segments. May include the bot itself.
    pub mentions: Vec<UserId>,
    /// The message mentions the bot or arrived in a private chat.
    pub addressed: bool,
}

impl CommandMessage {
    /// A re-queued command from a poke reaction is always addressed to the bot.
    pub fn from_synthetic(cmd: &SyntheticCommand) -> Self {
        Self {
            scope: cmd.scope,
            self_id: cmd.self_id,
            sender: cmd.user_id,
            text: cmd.command.clone(),
            mentions: vec![],
            addressed: true,
        }
    }

    /// Command text with a wake prefix removed, or `None` when the message
    /// is not addressed to the bot at all.
    pub fn addressed_text(&self, wake_prefix: &[String]) -> Option<&str> {
        let text = self.text.trim_start();
        for prefix in wake_prefix.iter().filter(|p| !p.is_empty()) {
            if let Some(rest) = text.strip_prefix(prefix.as_str()) {
                return Some(rest.trim_start());
            }
        }
        self.addressed.then_some(text)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PokeCommand {
    pub times: u32,
    pub include_sender: bool,
    pub everyone: bool,
    /// `@123` tokens written as plain text.
    pub text_mentions: Vec<UserId>,
}

impl PokeCommand {
    /// Parse addressed command text. The first token has to be one of the
    /// command names; a trailing integer token is the repeat count.
    pub fn parse(text: &str) -> Option<Self> {
        let mut tokens = text.split_whitespace();
        let head = tokens.next()?;
        if !COMMAND_NAMES.contains(&head) {
            return None;
        }

        let last = text.split_whitespace().last().unwrap_or(head);
        let times = if last.chars().all(|c| c.is_ascii_digit()) {
            last.parse().unwrap_or(1)
        } else {
            1
        };

        let text_mentions = text
            .split_whitespace()
            .filter_map(|t| t.strip_prefix('@'))
            .filter(|t| !t.is_empty() && t.chars().all(|c| c.is_ascii_digit()))
            .filter_map(|t| t.parse().ok())
            .collect();

        Some(Self {
            times,
            include_sender: text.contains('我'),
            everyone: text.contains("全体成员"),
            text_mentions,
        })
    }
}

/// Clamp a requested repeat count for a non-admin sender.
pub fn capped_times(requested: u32, max_times: u32) -> u32 {
    requested.min(max_times.max(1))
}

/// Runs the poke command and keyword pokes against a platform client.
pub struct CommandRunner<'a> {
    pub client: &'a dyn PlatformClient,
    pub sender: &'a PokeSender,
    pub config: &'a PokeConfig,
}

impl CommandRunner<'_> {
    /// Handle an inbound chat message. Returns true when a poke was sent,
    /// meaning the message was consumed.
    pub async fn handle_message(&self, msg: &CommandMessage) -> bool {
        let Some(text) = msg.addressed_text(&self.config.wake_prefix) else {
            return false;
        };

        if let Some(cmd) = PokeCommand::parse(text) {
            return self.run_poke_command(msg, &cmd).await;
        }

        if self.config.hit_poke_keywords(text) {
            tracing::debug!("CommandRunner: keyword poke from {}", msg.sender);
            let targets = normalize([msg.sender], Some(msg.self_id));
            self.sender.send(self.client, &targets, msg.scope, 1).await;
            return !targets.is_empty();
        }
        false
    }

    /// Handle a command re-queued by a poke reaction. Only the poke
    /// command has a local handler.
    pub async fn handle_synthetic(&self, cmd: &SyntheticCommand) -> bool {
        let msg = CommandMessage::from_synthetic(cmd);
        match PokeCommand::parse(msg.text.trim()) {
            Some(poke) => self.run_poke_command(&msg, &poke).await,
            None => {
                tracing::info!(
                    "CommandRunner: no handler for re-dispatched command {:?}, dropped",
                    cmd.command
                );
                false
            }
        }
    }

    pub async fn run_poke_command(&self, msg: &CommandMessage, cmd: &PokeCommand) -> bool {
        let is_admin = self.config.is_admin(msg.sender);
        let times = if is_admin {
            cmd.times
        } else {
            capped_times(cmd.times, self.config.poke_max_times)
        };

        let mut raw: Vec<RawTarget> = msg
            .mentions
            .iter()
            .chain(cmd.text_mentions.iter())
            .map(RawTarget::from)
            .collect();
        if cmd.include_sender {
            raw.push(msg.sender.into());
        }
        if cmd.everyone {
            match (is_admin, msg.scope) {
                (true, Scope::Group(group)) => {
                    raw = self.sample_members(group).await.into_iter().map(Into::into).collect();
                }
                (false, _) => {
                    tracing::info!("CommandRunner: {} is not an admin, 全体成员 ignored", msg.sender);
                }
                (true, Scope::Direct) => {}
            }
        }

        let mut targets = normalize(raw, Some(msg.self_id));
        if targets.is_empty() {
            if let Scope::Group(group) = msg.scope {
                match self.client.get_group_msg_history(group).await {
                    Ok(senders) => targets = normalize(senders, Some(msg.self_id)),
                    Err(e) => tracing::warn!("CommandRunner: history lookup in {} failed: {:#}", group, e),
                }
            }
        }
        if targets.is_empty() {
            tracing::debug!("CommandRunner: poke command from {} has no targets", msg.sender);
            return false;
        }

        tracing::info!(
            "CommandRunner: {} pokes {} target(s) x{} in {}",
            msg.sender,
            targets.len(),
            times,
            msg.scope
        );
        self.sender.send(self.client, &targets, msg.scope, times).await;
        true
    }

    async fn sample_members(&self, group: i64) -> Vec<UserId> {
        match self.client.get_group_member_list(group).await {
            Ok(members) => members
                .choose_multiple(&mut rand::thread_rng(), MEMBER_SAMPLE_LIMIT)
                .copied()
                .collect(),
            Err(e) => {
                tracing::error!("CommandRunner: member list of {} unavailable: {:#}", group, e);
                vec![]
            }
        }
    }
}
