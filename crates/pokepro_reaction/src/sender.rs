//! Sequential, throttled poke sending.

use crate::targets::TargetSet;
use pokepro_core::{PlatformClient, Scope};
use std::time::Duration;

/// Issues poke actions one at a time with a fixed pause between them.
///
/// The client is passed per call so that callers without a live connection
/// (the scheduler before the first event) can still own a sender.
#[derive(Debug, Clone)]
pub struct PokeSender {
    interval: Duration,
}

impl PokeSender {
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Poke every target `times` times, in order. A failed action is logged
    /// and skipped; it never aborts the remaining attempts.
    pub async fn send(
        &self,
        client: &dyn PlatformClient,
        targets: &TargetSet,
        scope: Scope,
        times: u32,
    ) {
        if targets.is_empty() || times == 0 {
            return;
        }

        let total = targets.len() * times as usize;
        let mut attempt = 0usize;
        for &user_id in targets {
            for _ in 0..times {
                let result = match scope {
                    Scope::Group(group_id) => client.group_poke(group_id, user_id).await,
                    Scope::Direct => client.friend_poke(user_id).await,
                };
                if let Err(e) = result {
                    tracing::warn!("PokeSender: poke failed user_id={} scope={}: {:#}", user_id, scope, e);
                }

                attempt += 1;
                if attempt < total && !self.interval.is_zero() {
                    tokio::time::sleep(self.interval).await;
                }
            }
        }
        tracing::debug!("PokeSender: issued {} poke(s) in {}", total, scope);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::targets::normalize;
    use crate::testing::{Action, RecordingClient};
    use tokio::time::Instant;

    #[tokio::test(start_paused = true)]
    async fn test_order_and_delay_between_actions() {
        let client = RecordingClient::default();
        let sender = PokeSender::new(Duration::from_millis(500));
        let start = Instant::now();

        sender
            .send(&client, &normalize([1i64, 2], None), Scope::Group(9), 2)
            .await;

        let calls = client.timed_actions();
        assert_eq!(client.poked_users(), vec![1, 1, 2, 2]);
        assert!(calls
            .iter()
            .all(|(a, _)| matches!(a, Action::GroupPoke { group: 9, .. })));
        for (i, (_, at)) in calls.iter().enumerate() {
            assert_eq!(*at - start, Duration::from_millis(500) * i as u32);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_does_not_abort_remaining_targets() {
        let client = RecordingClient {
            fail_pokes_for: Some(1),
            ..Default::default()
        };
        let sender = PokeSender::new(Duration::from_millis(100));
        sender
            .send(&client, &normalize([1i64, 2], None), Scope::Direct, 2)
            .await;

        assert_eq!(client.poked_users(), vec![1, 1, 2, 2]);
        assert!(client
            .actions()
            .iter()
            .all(|a| matches!(a, Action::FriendPoke { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_targets_is_a_no_op_without_delay() {
        let client = RecordingClient::default();
        let sender = PokeSender::new(Duration::from_secs(5));
        let start = Instant::now();
        sender.send(&client, &TargetSet::default(), Scope::Direct, 3).await;
        assert!(client.actions().is_empty());
        assert_eq!(Instant::now(), start);
    }
}
