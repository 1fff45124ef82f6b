//! Per-identity cooldown gate.
//!
//! Admission records the trigger time in the same critical section as the
//! check, so two near-simultaneous events for one identity can never both
//! be admitted.

use pokepro_core::{IdentityKey, Scope, UserId};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;

struct GateState {
    cooldown: Duration,
    last_trigger: HashMap<IdentityKey, Instant>,
}

pub struct CooldownGate {
    state: Mutex<GateState>,
    capacity: usize,
}

impl CooldownGate {
    pub fn new(cooldown: Duration) -> Self {
        Self::with_capacity(cooldown, usize::MAX)
    }

    /// `capacity` bounds the number of tracked identities softly: once it is
    /// reached, expired records are swept before a new one is inserted.
    pub fn with_capacity(cooldown: Duration, capacity: usize) -> Self {
        Self {
            state: Mutex::new(GateState {
                cooldown,
                last_trigger: HashMap::new(),
            }),
            capacity,
        }
    }

    /// Admit and record, or deny without side effects.
    pub fn allow(&self, scope: Scope, user: UserId) -> bool {
        let key = IdentityKey::new(scope, user);
        let now = Instant::now();
        let mut state = self.lock();

        if let Some(last) = state.last_trigger.get(&key) {
            if now.saturating_duration_since(*last) < state.cooldown {
                return false;
            }
        } else if state.last_trigger.len() >= self.capacity {
            let cooldown = state.cooldown;
            state
                .last_trigger
                .retain(|_, last| now.saturating_duration_since(*last) < cooldown);
        }

        state.last_trigger.insert(key, now);
        true
    }

    /// Time left before `allow` would admit this identity again.
    pub fn remaining(&self, scope: Scope, user: UserId) -> Duration {
        let key = IdentityKey::new(scope, user);
        let state = self.lock();
        match state.last_trigger.get(&key) {
            Some(last) => state
                .cooldown
                .saturating_sub(Instant::now().saturating_duration_since(*last)),
            None => Duration::ZERO,
        }
    }

    pub fn reset(&self, scope: Scope, user: UserId) {
        self.lock()
            .last_trigger
            .remove(&IdentityKey::new(scope, user));
    }

    pub fn clear(&self) {
        self.lock().last_trigger.clear();
    }

    /// Change the cooldown duration and drop every record. Used on config reload.
    pub fn reconfigure(&self, cooldown: Duration) {
        let mut state = self.lock();
        state.cooldown = cooldown;
        state.last_trigger.clear();
    }

    /// Drop records whose cooldown has fully elapsed. Returns how many were removed.
    pub fn sweep_expired(&self) -> usize {
        let now = Instant::now();
        let mut state = self.lock();
        let cooldown = state.cooldown;
        let before = state.last_trigger.len();
        state
            .last_trigger
            .retain(|_, last| now.saturating_duration_since(*last) < cooldown);
        before - state.last_trigger.len()
    }

    pub fn cooldown(&self) -> Duration {
        self.lock().cooldown
    }

    pub fn len(&self) -> usize {
        self.lock().last_trigger.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, GateState> {
        // Every critical section leaves the map consistent, so poisoning is ignored.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}
