use crate::identity::{Scope, UserId};
use crate::module::ResponseModule;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

// ============================================================================
// Top-level config
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PokeConfig {
    /// Master switch for reacting to pokes.
    pub on_poke: bool,
    /// Per-user cooldown, in seconds.
    pub poke_cd: f64,
    /// Probability of joining in when someone else gets poked.
    pub follow_prob: f64,
    /// Pause between two consecutive poke actions, in seconds.
    pub poke_interval: f64,
    /// Upper bound on repeat count for non-admin poke commands.
    pub poke_max_times: u32,
    pub poke_keywords: Vec<String>,
    pub admins: Vec<UserId>,
    pub wake_prefix: Vec<String>,
    pub data_dir: PathBuf,
    /// Soft bound on tracked cooldown identities.
    pub cooldown_capacity: usize,

    pub antipoke: AntiPokeConfig,
    pub llm: LlmConfig,
    pub face: FaceConfig,
    pub meme: MemeConfig,
    pub ban: BanConfig,
    pub command: CommandConfig,

    pub scheduler: SchedulerConfig,
    pub onebot: Option<OneBotConfig>,
    pub provider: ProviderConfig,
}

impl Default for PokeConfig {
    fn default() -> Self {
        Self {
            on_poke: true,
            poke_cd: 3.0,
            follow_prob: 0.0,
            poke_interval: 0.5,
            poke_max_times: 3,
            poke_keywords: vec![],
            admins: vec![],
            wake_prefix: vec!["/".to_string()],
            data_dir: PathBuf::from("data"),
            cooldown_capacity: 10_000,
            antipoke: AntiPokeConfig::default(),
            llm: LlmConfig::default(),
            face: FaceConfig::default(),
            meme: MemeConfig::default(),
            ban: BanConfig::default(),
            command: CommandConfig::default(),
            scheduler: SchedulerConfig::default(),
            onebot: None,
            provider: ProviderConfig::default(),
        }
    }
}

impl PokeConfig {
    /// Load config from a TOML file, falling back to defaults for missing fields.
    /// Env var overrides and pool normalization are applied after parsing.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;
        let mut config: PokeConfig =
            toml::from_str(&content).with_context(|| "Failed to parse TOML config")?;
        config.apply_env_overrides();
        config.normalize();
        Ok(config)
    }

    /// Try to load from path; if the file is missing or invalid, use defaults.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Self {
        match Self::load(path) {
            Ok(cfg) => cfg,
            Err(e) => {
                tracing::info!("Config file not found or invalid ({:#}), using defaults", e);
                let mut cfg = Self::default();
                cfg.apply_env_overrides();
                cfg.normalize();
                cfg
            }
        }
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(url) = std::env::var("ONEBOT_WS_URL") {
            let previous = self.onebot.take().unwrap_or_default();
            self.onebot = Some(OneBotConfig {
                ws_url: url,
                ..previous
            });
        }
        if let Ok(token) = std::env::var("ONEBOT_ACCESS_TOKEN") {
            if let Some(onebot) = self.onebot.as_mut() {
                onebot.access_token = Some(token);
            }
        }
        if let Ok(v) = std::env::var("POKE_LLM_BASE_URL") {
            self.provider.base_url = v;
        }
        if let Ok(v) = std::env::var("POKE_LLM_MODEL") {
            self.provider.model = v;
        }
        if let Ok(v) = std::env::var("POKE_LLM_API_KEY") {
            self.provider.api_key = Some(v);
        }
    }

    /// Enforce the invariants the responders rely on.
    pub fn normalize(&mut self) {
        if !self.follow_prob.is_finite() {
            tracing::warn!("follow_prob {} invalid, using 0", self.follow_prob);
            self.follow_prob = 0.0;
        } else if !(0.0..=1.0).contains(&self.follow_prob) {
            tracing::warn!("follow_prob {} out of range, clamped", self.follow_prob);
            self.follow_prob = self.follow_prob.clamp(0.0, 1.0);
        }
        self.poke_cd = seconds_in_range("poke_cd", self.poke_cd);
        self.poke_interval = seconds_in_range("poke_interval", self.poke_interval);
        self.antipoke.max_times = self.antipoke.max_times.max(1);
        self.face.max_copy_count = self.face.max_copy_count.max(1);

        if self.face.pool.is_empty() {
            self.face.pool.push(1);
            tracing::warn!("Face pool is empty, added default face id 1");
        }
        if self.command.pool.is_empty() {
            self.command.pool.push("盒".to_string());
            tracing::warn!("Command pool is empty, added default command 盒");
        }
        if self.meme.pool.is_empty() {
            self.meme.pool = scan_media_dir(&self.data_dir, &self.media_dir());
            if self.meme.pool.is_empty() {
                tracing::warn!(
                    "Meme pool is empty and {} has no files",
                    self.media_dir().display()
                );
            }
        }
    }

    pub fn cooldown(&self) -> Duration {
        Duration::try_from_secs_f64(self.poke_cd).unwrap_or(Duration::ZERO)
    }

    pub fn poke_interval(&self) -> Duration {
        Duration::try_from_secs_f64(self.poke_interval).unwrap_or(Duration::ZERO)
    }

    pub fn weight_of(&self, module: ResponseModule) -> u32 {
        match module {
            ResponseModule::AntiPoke => self.antipoke.weight,
            ResponseModule::Llm => self.llm.weight,
            ResponseModule::Face => self.face.weight,
            ResponseModule::Meme => self.meme.weight,
            ResponseModule::Ban => self.ban.weight,
            ResponseModule::Command => self.command.weight,
        }
    }

    /// Weight table in module declaration order.
    pub fn module_weights(&self) -> Vec<(ResponseModule, u32)> {
        ResponseModule::ALL
            .iter()
            .map(|m| (*m, self.weight_of(*m)))
            .collect()
    }

    pub fn is_admin(&self, user_id: UserId) -> bool {
        self.admins.contains(&user_id)
    }

    pub fn hit_poke_keywords(&self, text: &str) -> bool {
        self.poke_keywords
            .iter()
            .any(|k| !k.is_empty() && text.contains(k.as_str()))
    }

    /// Directory scanned for meme images when no explicit pool is given.
    pub fn media_dir(&self) -> PathBuf {
        self.data_dir.join("files").join("meme").join("pool")
    }

    /// Resolve a meme pool entry relative to the data directory.
    pub fn resolve_media(&self, entry: &str) -> PathBuf {
        let path = Path::new(entry);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.data_dir.join(path)
        }
    }
}

/// Longest accepted cooldown or poke interval, in seconds.
pub const MAX_DURATION_SECS: f64 = 86_400.0;

/// Invalid values become 0, oversized ones are capped at one day.
fn seconds_in_range(name: &str, secs: f64) -> f64 {
    if secs < 0.0 || !secs.is_finite() {
        tracing::warn!("{} {} invalid, using 0", name, secs);
        0.0
    } else if secs > MAX_DURATION_SECS {
        tracing::warn!("{} {} too large, capped at {}", name, secs, MAX_DURATION_SECS);
        MAX_DURATION_SECS
    } else {
        secs
    }
}

/// List files under `dir` as pool entries relative to `data_dir`, sorted.
fn scan_media_dir(data_dir: &Path, dir: &Path) -> Vec<String> {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return vec![];
    };
    let mut files: Vec<String> = entries
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.is_file())
        .map(|p| {
            p.strip_prefix(data_dir)
                .map(|rel| rel.to_string_lossy().into_owned())
                .unwrap_or_else(|_| p.to_string_lossy().into_owned())
        })
        .collect();
    files.sort();
    files
}

// ============================================================================
// Response modules
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AntiPokeConfig {
    pub weight: u32,
    pub max_times: u32,
}

impl Default for AntiPokeConfig {
    fn default() -> Self {
        Self {
            weight: 1,
            max_times: 3,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub weight: u32,
    /// User prompt; `{username}` is replaced with the poker's display name.
    pub template: String,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            weight: 1,
            template: "{username} 戳了你一下，请用一句简短俏皮的话回应。".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FaceConfig {
    pub weight: u32,
    pub pool: Vec<i32>,
    pub max_copy_count: usize,
}

impl Default for FaceConfig {
    fn default() -> Self {
        Self {
            weight: 1,
            pool: vec![],
            max_copy_count: 3,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MemeConfig {
    pub weight: u32,
    /// Image paths, relative to `data_dir` unless absolute.
    pub pool: Vec<String>,
}

impl Default for MemeConfig {
    fn default() -> Self {
        Self {
            weight: 1,
            pool: vec![],
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BanConfig {
    pub weight: u32,
    /// Base mute duration in seconds.
    pub duration: u64,
    /// Jitter applied to `duration`, in seconds, both directions.
    pub delta: u64,
    pub ban_template: String,
    pub ban_fail_template: String,
}

impl Default for BanConfig {
    fn default() -> Self {
        Self {
            weight: 0,
            duration: 60,
            delta: 30,
            ban_template: "你刚刚把戳你的 {username} 禁言了，用一句话得意地告诉对方。".to_string(),
            ban_fail_template: "你想禁言戳你的 {username} 但是失败了，用一句话掩饰尴尬。"
                .to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CommandConfig {
    pub weight: u32,
    pub pool: Vec<String>,
}

impl Default for CommandConfig {
    fn default() -> Self {
        Self {
            weight: 0,
            pool: vec![],
        }
    }
}

// ============================================================================
// Scheduler / platform / provider
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub enabled: bool,
    /// Standard 5-field crontab expression (a leading seconds field is also accepted).
    pub cron: String,
    /// `"group:user"` entries; group `0` or empty means a private poke.
    pub target: Vec<String>,
    pub times: u32,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            cron: "0 8 * * *".to_string(),
            target: vec![],
            times: 1,
        }
    }
}

impl SchedulerConfig {
    /// Parse `target` into `(scope, user)` pairs, dropping malformed entries.
    pub fn targets(&self) -> Vec<(Scope, UserId)> {
        self.target
            .iter()
            .filter_map(|raw| match parse_target(raw) {
                Some(t) => Some(t),
                None => {
                    tracing::warn!("Ignoring malformed scheduler target: {:?}", raw);
                    None
                }
            })
            .collect()
    }
}

fn parse_target(raw: &str) -> Option<(Scope, UserId)> {
    let (group, user) = raw.split_once([':', '：'])?;
    let group = group.trim();
    let user: UserId = user.trim().parse().ok().filter(|u| *u > 0)?;
    let scope = if group.is_empty() {
        Scope::Direct
    } else {
        Scope::from_group(Some(group.parse().ok()?))
    };
    Some((scope, user))
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OneBotConfig {
    pub ws_url: String,
    pub access_token: Option<String>,
    pub action_timeout_secs: u64,
}

impl Default for OneBotConfig {
    fn default() -> Self {
        Self {
            ws_url: "ws://127.0.0.1:3001".to_string(),
            access_token: None,
            action_timeout_secs: 10,
        }
    }
}

/// OpenAI-compatible chat completion endpoint.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    pub base_url: String,
    pub model: String,
    /// Without a key the LLM modules produce no reply.
    pub api_key: Option<String>,
    pub system_prompt: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            model: "gpt-4o-mini".to_string(),
            api_key: None,
            system_prompt: "你是一个活泼的 QQ 群聊机器人。".to_string(),
            temperature: 0.8,
            max_tokens: 256,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
