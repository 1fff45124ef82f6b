//! Property-based tests for pokepro_reaction.
//!
//! Cooldown timing runs on a paused tokio clock so boundaries are exact.

use pokepro_core::{ResponseModule, Scope};
use pokepro_reaction::responders::jittered_duration;
use pokepro_reaction::{normalize, CooldownGate, RawTarget, ResponsePool};
use proptest::prelude::*;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::time::Duration;

fn paused_runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .start_paused(true)
        .build()
        .unwrap()
}

fn arb_scope() -> impl Strategy<Value = Scope> {
    prop_oneof![Just(Scope::Direct), (1i64..1_000_000).prop_map(Scope::Group)]
}

fn arb_raw_target() -> impl Strategy<Value = RawTarget> {
    prop_oneof![
        (-5i64..50).prop_map(RawTarget::Number),
        (0i64..50).prop_map(|n| RawTarget::Text(format!(" {} ", n))),
        "[a-z@ ]{0,4}".prop_map(RawTarget::Text),
    ]
}

// ============================================================================
// CooldownGate
// ============================================================================

proptest! {
    #[test]
    fn cooldown_denies_before_and_admits_at_boundary(
        cd_ms in 1u64..10_000,
        early_ms in 1u64..10_000,
        scope in arb_scope(),
        user in 1i64..1_000_000,
    ) {
        let early = early_ms.min(cd_ms);
        paused_runtime().block_on(async {
            let cd = Duration::from_millis(cd_ms);
            let gate = CooldownGate::new(cd);
            prop_assert!(gate.allow(scope, user));

            tokio::time::advance(cd - Duration::from_millis(early)).await;
            prop_assert!(!gate.allow(scope, user));

            tokio::time::advance(Duration::from_millis(early)).await;
            prop_assert!(gate.allow(scope, user));
            Ok(())
        })?;
    }

    #[test]
    fn cooldown_remaining_is_non_increasing(
        cd_ms in 0u64..5_000,
        steps in prop::collection::vec(0u64..1_000, 1..20),
    ) {
        paused_runtime().block_on(async {
            let gate = CooldownGate::new(Duration::from_millis(cd_ms));
            prop_assert_eq!(gate.remaining(Scope::Group(1), 2), Duration::ZERO);
            gate.allow(Scope::Group(1), 2);

            let mut previous = gate.remaining(Scope::Group(1), 2);
            prop_assert!(previous <= Duration::from_millis(cd_ms));
            for step in steps {
                tokio::time::advance(Duration::from_millis(step)).await;
                let now = gate.remaining(Scope::Group(1), 2);
                prop_assert!(now <= previous);
                previous = now;
            }
            tokio::time::advance(Duration::from_millis(cd_ms)).await;
            prop_assert_eq!(gate.remaining(Scope::Group(1), 2), Duration::ZERO);
            Ok(())
        })?;
    }

    #[test]
    fn cooldown_keys_are_independent(
        users in prop::collection::hash_set(1i64..10_000, 1..30),
    ) {
        paused_runtime().block_on(async {
            let gate = CooldownGate::new(Duration::from_secs(60));
            for user in &users {
                prop_assert!(gate.allow(Scope::Group(7), *user));
                prop_assert!(gate.allow(Scope::Direct, *user));
            }
            prop_assert_eq!(gate.len(), users.len() * 2);
            Ok(())
        })?;
    }
}

// ============================================================================
// Target normalization
// ============================================================================

proptest! {
    #[test]
    fn normalize_is_idempotent(raw in prop::collection::vec(arb_raw_target(), 0..40)) {
        let once = normalize(raw, None);
        let twice = normalize(once.iter(), None);
        prop_assert_eq!(once, twice);
    }

    #[test]
    fn normalize_has_no_duplicates_or_self(
        raw in prop::collection::vec(arb_raw_target(), 0..40),
        self_id in 0i64..50,
    ) {
        let set = normalize(raw.clone(), Some(self_id));
        let ids = set.as_slice();
        prop_assert!(!ids.contains(&self_id));
        for (i, id) in ids.iter().enumerate() {
            prop_assert!(*id >= 0);
            prop_assert!(!ids[i + 1..].contains(id));
        }

        // First-seen order of valid entries.
        let mut expected = Vec::new();
        for r in &raw {
            if let Some(id) = r.as_user_id() {
                if id != self_id && !expected.contains(&id) {
                    expected.push(id);
                }
            }
        }
        prop_assert_eq!(ids, expected.as_slice());
    }
}

// ============================================================================
// ResponsePool and randomized parameters
// ============================================================================

proptest! {
    #[test]
    fn pool_only_selects_positive_weights(
        weights in prop::collection::vec(0u32..5, 6),
        seed in any::<u64>(),
    ) {
        let table: Vec<_> = ResponseModule::ALL.iter().copied().zip(weights.iter().copied()).collect();
        let pool = ResponsePool::build(table.clone());
        let any_positive = weights.iter().any(|w| *w > 0);
        prop_assert_eq!(pool.is_empty(), !any_positive);

        if any_positive {
            let mut rng = StdRng::seed_from_u64(seed);
            for _ in 0..50 {
                let m = pool.select(&mut rng);
                let w = table.iter().find(|(tm, _)| *tm == m).map(|(_, w)| *w);
                prop_assert!(w.unwrap_or(0) > 0);
            }
        }
    }

    #[test]
    fn jitter_stays_in_range(base in 0u64..1_000, delta in 0u64..1_000, seed in any::<u64>()) {
        let mut rng = StdRng::seed_from_u64(seed);
        let d = jittered_duration(&mut rng, base, delta).as_secs();
        prop_assert!(d <= base + delta);
        prop_assert!(d >= base.saturating_sub(delta));
    }
}
