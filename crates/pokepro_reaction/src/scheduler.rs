//! Cron-driven proactive pokes.

use crate::sender::PokeSender;
use crate::targets::normalize_one;
use chrono::{DateTime, Local};
use cron::Schedule;
use pokepro_core::config::SchedulerConfig;
use pokepro_core::{PlatformClient, Scope, UserId};
use std::str::FromStr;
use std::sync::{Arc, Mutex, OnceLock};
use std::time::Duration;
use tokio::task::JoinHandle;

const WEEKDAYS: [&str; 7] = ["SUN", "MON", "TUE", "WED", "THU", "FRI", "SAT"];

/// Parse a crontab expression. Five-field expressions use crontab weekday
/// numbering (0 and 7 are Sunday) and get a `0` seconds field prepended;
/// six and seven field forms are passed through in `cron` crate syntax.
pub fn parse_cron(expr: &str) -> Result<Schedule, cron::error::Error> {
    let fields: Vec<&str> = expr.split_whitespace().collect();
    if let [minute, hour, dom, month, dow] = fields.as_slice() {
        let dow = crontab_weekdays(dow);
        Schedule::from_str(&format!("0 {} {} {} {} {}", minute, hour, dom, month, dow))
    } else {
        Schedule::from_str(expr.trim())
    }
}

/// Rewrite numeric crontab weekdays as names, which the `cron` crate reads
/// unambiguously. Steps stay numeric; anything unrecognised is left for the
/// parser to reject.
fn crontab_weekdays(field: &str) -> String {
    field
        .split(',')
        .map(|item| {
            let (range, step) = match item.split_once('/') {
                Some((range, step)) => (range, Some(step)),
                None => (item, None),
            };
            let range = match range.split_once('-') {
                Some((start, end)) => match (weekday_number(start), weekday_number(end)) {
                    (Some(s), Some(7)) if s != 7 && step.is_none() => {
                        if s == 0 {
                            format!("{}-{}", WEEKDAYS[0], WEEKDAYS[6])
                        } else {
                            format!("{}-{},{}", WEEKDAYS[s], WEEKDAYS[6], WEEKDAYS[0])
                        }
                    }
                    (Some(s), Some(e)) => {
                        format!("{}-{}", WEEKDAYS[s % 7], WEEKDAYS[e % 7])
                    }
                    _ => range.to_string(),
                },
                None => match weekday_number(range) {
                    Some(n) => WEEKDAYS[n % 7].to_string(),
                    None => range.to_string(),
                },
            };
            match step {
                Some(step) => format!("{}/{}", range, step),
                None => range,
            }
        })
        .collect::<Vec<_>>()
        .join(",")
}

fn weekday_number(token: &str) -> Option<usize> {
    token.parse::<usize>().ok().filter(|n| *n <= 7)
}

/// The work done on every fire. Shared between the cron loop and the
/// in-flight fires it spawns.
pub struct PokeJob {
    targets: Vec<(Scope, UserId)>,
    times: u32,
    sender: PokeSender,
    client: OnceLock<Arc<dyn PlatformClient>>,
}

impl PokeJob {
    pub fn new(targets: Vec<(Scope, UserId)>, times: u32, sender: PokeSender) -> Self {
        Self {
            targets,
            times,
            sender,
            client: OnceLock::new(),
        }
    }

    /// Poke every configured target. Returns false when the tick was
    /// skipped for lack of a platform client.
    pub async fn fire(&self) -> bool {
        let Some(client) = self.client.get() else {
            tracing::debug!("PokeScheduler: no platform client yet, tick skipped");
            return false;
        };
        tracing::info!("PokeScheduler: firing for {} target(s)", self.targets.len());
        for (scope, user) in &self.targets {
            let targets = normalize_one(*user, None);
            self.sender.send(client.as_ref(), &targets, *scope, self.times).await;
        }
        true
    }
}

#[derive(Default)]
struct SchedulerState {
    started: bool,
    task: Option<JoinHandle<()>>,
}

pub struct PokeScheduler {
    cron: String,
    job: Arc<PokeJob>,
    state: Mutex<SchedulerState>,
}

impl PokeScheduler {
    pub fn new(config: &SchedulerConfig, sender: PokeSender) -> Self {
        Self {
            cron: config.cron.clone(),
            job: Arc::new(PokeJob::new(config.targets(), config.times, sender)),
            state: Mutex::new(SchedulerState::default()),
        }
    }

    /// Inject the platform client. Only the first call has an effect.
    pub fn set_client(&self, client: Arc<dyn PlatformClient>) {
        if self.job.client.set(client).is_ok() {
            tracing::debug!("PokeScheduler: platform client attached");
        }
    }

    pub fn has_client(&self) -> bool {
        self.job.client.get().is_some()
    }

    pub fn job(&self) -> &Arc<PokeJob> {
        &self.job
    }

    /// Register the cron job and start ticking. Calling it again while
    /// started does nothing. An invalid expression is logged and leaves the
    /// scheduler started with no job registered.
    pub fn start(&self) {
        let mut state = self.lock();
        if state.started {
            return;
        }
        state.started = true;

        let schedule = match parse_cron(&self.cron) {
            Ok(s) => s,
            Err(e) => {
                tracing::error!("PokeScheduler: invalid cron {:?}: {}", self.cron, e);
                return;
            }
        };
        tracing::debug!("PokeScheduler: registered job, cron {:?}", self.cron);
        state.task = Some(tokio::spawn(run_schedule(schedule, self.job.clone())));
    }

    /// Stop future fires. In-flight fires are left to finish on their own.
    pub fn shutdown(&self) {
        let mut state = self.lock();
        if !state.started {
            return;
        }
        state.started = false;
        if let Some(task) = state.task.take() {
            task.abort();
        }
        tracing::info!("PokeScheduler: stopped");
    }

    pub fn is_started(&self) -> bool {
        self.lock().started
    }

    /// A job is registered and ticking.
    pub fn is_registered(&self) -> bool {
        self.lock().task.is_some()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, SchedulerState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Drop for PokeScheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}

async fn run_schedule(schedule: Schedule, job: Arc<PokeJob>) {
    let mut last_fire: Option<DateTime<Local>> = None;
    loop {
        let now = Local::now();
        let from = match last_fire {
            Some(last) if last > now => last,
            _ => now,
        };
        let Some(next) = schedule.after(&from).next() else {
            tracing::warn!("PokeScheduler: schedule has no upcoming fire time, stopping");
            return;
        };
        let wait = (next - now).to_std().unwrap_or(Duration::ZERO);
        tokio::time::sleep(wait).await;
        last_fire = Some(next);

        let job = job.clone();
        tokio::spawn(async move {
            job.fire().await;
        });
    }
}
