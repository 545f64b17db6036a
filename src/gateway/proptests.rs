//! Property-based tests for the resilience primitives
//!
//! - Backoff delays follow `base * 2^(attempt-1)` exactly
//! - The breaker is open on `[T, T+cooldown)` and closed afterwards
//! - The dispatcher never runs more than `max_concurrent` tasks at once
//! - Error classification is consistent for every status code

use super::*;
use proptest::prelude::*;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

// ============================================================================
// Strategies
// ============================================================================

fn arb_base_delay() -> impl Strategy<Value = Duration> {
    (1u64..5_000).prop_map(Duration::from_millis)
}

/// Task durations for a burst of dispatcher submissions
fn arb_task_burst() -> impl Strategy<Value = Vec<u64>> {
    prop::collection::vec(0u64..5, 1..25)
}

// ============================================================================
// Backoff
// ============================================================================

proptest! {
    #[test]
    fn prop_backoff_is_exponential(base in arb_base_delay(), attempt in 1u32..20) {
        let policy = BackoffPolicy::new(base);
        let expected = base * 2u32.pow(attempt - 1);
        prop_assert_eq!(policy.compute_delay(attempt), expected);
    }

    #[test]
    fn prop_backoff_is_monotonic(base in arb_base_delay(), attempt in 1u32..60) {
        let policy = BackoffPolicy::new(base);
        prop_assert!(policy.compute_delay(attempt + 1) >= policy.compute_delay(attempt));
    }

    #[test]
    fn prop_full_jitter_never_exceeds_delay(
        base in arb_base_delay(),
        attempt in 1u32..10,
        seed in any::<u64>(),
    ) {
        use rand::SeedableRng;
        let policy = BackoffPolicy::new(base).with_jitter(Jitter::Full);
        let mut rng = rand::rngs::StdRng::seed_from_u64(seed);
        prop_assert!(policy.delay_with_rng(attempt, &mut rng) <= policy.compute_delay(attempt));
    }
}

// ============================================================================
// Circuit breaker
// ============================================================================

proptest! {
    #[test]
    fn prop_breaker_open_window(cooldown_ms in 1u64..60_000, probe_ms in 0u64..120_000) {
        let breaker = CircuitBreaker::new();
        let t = tokio::time::Instant::now();
        let cooldown = Duration::from_millis(cooldown_ms);
        breaker.trip_at(t, cooldown);

        let open = breaker.is_open_at(t + Duration::from_millis(probe_ms));
        prop_assert_eq!(open, probe_ms < cooldown_ms);
    }

    #[test]
    fn prop_latest_trip_wins(
        first_ms in 1u64..10_000,
        gap_ms in 0u64..10_000,
        second_ms in 1u64..10_000,
    ) {
        let breaker = CircuitBreaker::new();
        let t = tokio::time::Instant::now();
        breaker.trip_at(t, Duration::from_millis(first_ms));
        let t2 = t + Duration::from_millis(gap_ms);
        breaker.trip_at(t2, Duration::from_millis(second_ms));

        let deadline = t2 + Duration::from_millis(second_ms);
        prop_assert!(breaker.is_open_at(t2));
        prop_assert!(!breaker.is_open_at(deadline));
    }
}

// ============================================================================
// Dispatcher
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn prop_dispatcher_respects_cap(max in 1usize..6, burst in arb_task_burst()) {
        let rt = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(4)
            .enable_all()
            .build()
            .unwrap();

        let (peak, completed) = rt.block_on(async {
            let dispatcher = Arc::new(Dispatcher::new(max));
            let running = Arc::new(AtomicUsize::new(0));
            let peak = Arc::new(AtomicUsize::new(0));

            let handles: Vec<_> = burst
                .iter()
                .map(|&ms| {
                    let dispatcher = Arc::clone(&dispatcher);
                    let running = Arc::clone(&running);
                    let peak = Arc::clone(&peak);
                    tokio::spawn(async move {
                        dispatcher
                            .submit(|| async {
                                let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                                peak.fetch_max(now, Ordering::SeqCst);
                                tokio::time::sleep(Duration::from_millis(ms)).await;
                                running.fetch_sub(1, Ordering::SeqCst);
                            })
                            .await;
                    })
                })
                .collect();

            let mut completed = 0;
            for handle in handles {
                handle.await.unwrap();
                completed += 1;
            }
            (peak.load(Ordering::SeqCst), completed)
        });

        prop_assert!(peak <= max, "peak {} exceeded cap {}", peak, max);
        prop_assert_eq!(completed, burst.len());
    }
}

// ============================================================================
// Error classification
// ============================================================================

proptest! {
    #[test]
    fn prop_only_429_and_503_are_overload(status in 100u16..600) {
        let err = GatewayError::server(status, "x");
        prop_assert_eq!(err.is_overload(), status == 429 || status == 503);
        prop_assert!(err.is_retryable());
    }

    #[test]
    fn prop_exhausted_is_terminal(status in 400u16..600, attempts in 1u32..5) {
        let err = GatewayError::Exhausted {
            attempts,
            last: Box::new(GatewayError::server(status, "x")),
        };
        prop_assert!(!err.is_retryable());
        prop_assert_eq!(err.status(), Some(status));
    }
}
