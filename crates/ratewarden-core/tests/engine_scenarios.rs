//! Decision engine behavior, run against both store variants

mod common;

use std::sync::Arc;
use std::time::Duration;

use ratewarden_core::{RateLimitEngine, Verdict};
use ratewarden_core::rate_limit::{DecisionState, Unenforced};
use ratewarden_types::prelude::*;

const T0: Timestamp = Timestamp(1_700_000_000_000);

fn at(secs: u64) -> Timestamp {
	T0 + Duration::from_secs(secs)
}

/// Send `n` requests at `now` and return the verdict of the last one
async fn burst(
	engine: &RateLimitEngine,
	identity: &str,
	endpoint: &str,
	n: u32,
	now: Timestamp,
) -> Verdict {
	let mut last = None;
	for _ in 0..n {
		last = Some(engine.check(identity, endpoint, now).await);
	}
	last.unwrap()
}

/// Retry-After of a denied verdict
fn retry_after(verdict: &Verdict) -> u64 {
	verdict.deny_response.as_ref().map(|d| d.retry_after).unwrap()
}

macro_rules! both_stores {
	($($scenario:ident),* $(,)?) => {
		$(
			mod $scenario {
				#[tokio::test]
				async fn memory() {
					super::common::setup_test_logging();
					super::$scenario(&super::common::memory_engine()).await;
				}

				#[tokio::test]
				async fn sqlite() {
					super::common::setup_test_logging();
					let (engine, _dir) = super::common::sqlite_engine().await;
					super::$scenario(&engine).await;
				}
			}
		)*
	};
}

both_stores!(
	nth_request_allowed_iff_within_max,
	request_after_block_expiry_is_decided_afresh,
	blocked_requests_do_not_touch_the_window,
	escalation_spans_endpoints,
	escalation_never_decreases,
	violations_older_than_a_day_do_not_count,
	elapsed_window_is_never_reused,
	endpoints_without_policy_are_never_limited,
	unknown_callers_share_a_bucket,
	longest_active_block_decides_retry_after,
);

async fn nth_request_allowed_iff_within_max(engine: &RateLimitEngine) {
	for expected in [4, 3, 2, 1, 0] {
		let verdict = engine.check("198.51.100.1", "endpoint-a", at(10)).await;
		assert!(verdict.allowed);
		assert_eq!(verdict.remaining, Some(expected));
		assert_eq!(verdict.reset_time, Some(at(60)));
	}

	let sixth = engine.check("198.51.100.1", "endpoint-a", at(20)).await;
	assert!(!sixth.allowed);
	assert_eq!(sixth.state, DecisionState::LimitExceeded);
	assert_eq!(sixth.remaining, Some(0));
	assert_eq!(sixth.reset_time, Some(at(140)));
	assert_eq!(retry_after(&sixth), 120);

	// Other identities are unaffected
	assert!(engine.check("198.51.100.2", "endpoint-a", at(20)).await.allowed);
}

async fn request_after_block_expiry_is_decided_afresh(engine: &RateLimitEngine) {
	// 60s window: by the time the block expires the window has elapsed too
	let sixth = burst(engine, "198.51.100.1", "endpoint-a", 6, at(0)).await;
	assert_eq!(retry_after(&sixth), 120);
	let seventh = engine.check("198.51.100.1", "endpoint-a", at(121)).await;
	assert!(seventh.allowed);
	assert_eq!(seventh.remaining, Some(4));

	// 600s window with a 60s block: the window is still exhausted when the
	// block runs out, so the next request is a new violation
	let third = burst(engine, "198.51.100.9", "slow-window", 3, at(0)).await;
	assert_eq!(third.state, DecisionState::LimitExceeded);
	assert_eq!(retry_after(&third), 60);
	let fourth = engine.check("198.51.100.9", "slow-window", at(61)).await;
	assert_eq!(fourth.state, DecisionState::LimitExceeded);
	assert_eq!(retry_after(&fourth), 180);
}

async fn blocked_requests_do_not_touch_the_window(engine: &RateLimitEngine) {
	burst(engine, "198.51.100.1", "endpoint-a", 6, at(0)).await;
	let before = engine.status("198.51.100.1", "endpoint-a", at(0)).await.unwrap();

	let blocked = engine.check("198.51.100.1", "endpoint-a", at(30)).await;
	assert_eq!(blocked.state, DecisionState::Blocked);
	assert_eq!(retry_after(&blocked), 90);
	assert_eq!(blocked.reset_time, Some(at(120)));

	// Retry-After tracks the active block and never drops below one second
	let almost = engine.check("198.51.100.1", "endpoint-a", at(120) - Duration::from_millis(500)).await;
	assert_eq!(retry_after(&almost), 1);

	let after = engine.status("198.51.100.1", "endpoint-a", at(30)).await.unwrap();
	assert_eq!(before.window.unwrap().count, after.window.unwrap().count);
	assert_eq!(after.violations, 1);
}

async fn escalation_spans_endpoints(engine: &RateLimitEngine) {
	let first = burst(engine, "203.0.113.5", "endpoint-a", 6, at(0)).await;
	assert_eq!(retry_after(&first), 120);

	// Endpoint B has its own window but the same ledger: second violation
	let second = burst(engine, "203.0.113.5", "endpoint-b", 6, at(5)).await;
	assert_eq!(second.state, DecisionState::LimitExceeded);
	assert_eq!(retry_after(&second), 360);

	// The block only covers the endpoint it was issued for
	assert_eq!(engine.check("203.0.113.5", "endpoint-a", at(10)).await.state, DecisionState::Blocked);
	assert_eq!(engine.status("203.0.113.5", "endpoint-b", at(10)).await.unwrap().violations, 2);
}

async fn escalation_never_decreases(engine: &RateLimitEngine) {
	// Each round starts after the previous block on that endpoint expired and
	// its window elapsed
	let rounds = [
		("endpoint-a", 0),
		("endpoint-b", 121),
		("endpoint-a", 200),
		("endpoint-b", 500),
		("endpoint-a", 1700),
	];

	let mut durations = Vec::new();
	for (endpoint, secs) in rounds {
		let verdict = burst(engine, "203.0.113.7", endpoint, 6, at(secs)).await;
		assert_eq!(verdict.state, DecisionState::LimitExceeded, "{} at {}s", endpoint, secs);
		durations.push(retry_after(&verdict));
	}

	assert_eq!(durations, vec![120, 360, 1440, 24 * 3600, 24 * 3600]);
	assert!(durations.is_sorted());
}

async fn violations_older_than_a_day_do_not_count(engine: &RateLimitEngine) {
	let first = burst(engine, "203.0.113.8", "endpoint-a", 6, at(0)).await;
	assert_eq!(retry_after(&first), 120);

	let next_day = at(25 * 3600);
	let again = burst(engine, "203.0.113.8", "endpoint-a", 6, next_day).await;
	assert_eq!(again.state, DecisionState::LimitExceeded);
	assert_eq!(retry_after(&again), 120);
	assert_eq!(engine.status("203.0.113.8", "endpoint-a", next_day).await.unwrap().violations, 1);
}

async fn elapsed_window_is_never_reused(engine: &RateLimitEngine) {
	let fifth = burst(engine, "198.51.100.3", "endpoint-a", 5, at(0)).await;
	assert_eq!(fifth.remaining, Some(0));

	// The window end itself still belongs to the window
	let at_end = engine.check("198.51.100.3", "endpoint-a", at(60)).await;
	assert!(!at_end.allowed);

	burst(engine, "198.51.100.4", "endpoint-a", 5, at(0)).await;
	let fresh = engine.check("198.51.100.4", "endpoint-a", at(61)).await;
	assert!(fresh.allowed);
	assert_eq!(fresh.remaining, Some(4));
	assert_eq!(fresh.reset_time, Some(at(121)));
}

async fn endpoints_without_policy_are_never_limited(engine: &RateLimitEngine) {
	let verdict = burst(engine, "198.51.100.1", "reports", 500, at(0)).await;
	assert!(verdict.allowed);
	assert_eq!(verdict.unenforced, Some(Unenforced::NoPolicy));
	assert_eq!(verdict.remaining, None);
	assert!(engine.status("198.51.100.1", "reports", at(0)).await.unwrap().window.is_none());
}

async fn unknown_callers_share_a_bucket(engine: &RateLimitEngine) {
	burst(engine, UNKNOWN_IDENTITY, "endpoint-a", 5, at(0)).await;
	let verdict = engine.check(UNKNOWN_IDENTITY, "endpoint-a", at(1)).await;
	assert!(!verdict.allowed);
}

async fn longest_active_block_decides_retry_after(engine: &RateLimitEngine) {
	let identity = "203.0.113.20";
	engine.block(identity, Some("endpoint-a"), Duration::from_secs(900), None, at(0)).await.unwrap();
	engine.block(identity, None, Duration::from_secs(100), None, at(0)).await.unwrap();

	// The shorter wildcard block does not hide the longer specific one
	let denied = engine.check(identity, "endpoint-a", at(0)).await;
	assert_eq!(denied.state, DecisionState::Blocked);
	assert_eq!(retry_after(&denied), 900);
	assert_eq!(retry_after(&engine.check(identity, "endpoint-b", at(0)).await), 100);

	// Retrying when told is enough
	let retried = engine.check(identity, "endpoint-a", at(100)).await;
	assert_eq!(retry_after(&retried), 800);
	assert!(engine.check(identity, "endpoint-b", at(100)).await.allowed);

	// A shorter block never cuts an active one short
	let kept =
		engine.block(identity, Some("endpoint-a"), Duration::from_secs(60), None, at(100)).await.unwrap();
	assert_eq!(kept.blocked_until, at(900));
	assert_eq!(retry_after(&engine.check(identity, "endpoint-a", at(200)).await), 700);
}

/// Fire 40 simultaneous requests of one identity at `now`
async fn storm(engine: &Arc<RateLimitEngine>, identity: &'static str, now: Timestamp) -> Vec<Verdict> {
	let tasks = (0..40).map(|_| {
		let engine = Arc::clone(engine);
		tokio::spawn(async move { engine.check(identity, "endpoint-a", now).await })
	});
	futures::future::join_all(tasks).await.into_iter().map(Result::unwrap).collect()
}

/// One storm is one violation: exactly `max` requests pass, the rest are
/// denied with the first-tier block, and the next storm escalates one tier
async fn storm_is_a_single_violation(engine: RateLimitEngine) {
	let engine = Arc::new(engine);
	let identity = "192.0.2.77";

	let verdicts = storm(&engine, identity, at(0)).await;
	assert_eq!(verdicts.iter().filter(|v| v.allowed).count(), 5);
	let denied: Vec<_> = verdicts.iter().filter(|v| v.is_denied()).collect();
	assert_eq!(denied.len(), 35);
	assert!(denied.iter().all(|v| retry_after(v) == 120), "{:?}", denied);

	let status = engine.status(identity, "endpoint-a", at(0)).await.unwrap();
	assert_eq!(status.violations, 1);
	assert_eq!(status.block.map(|b| b.blocked_until), Some(at(120)));
	assert_eq!(engine.stats().store_errors, 0);

	// Block and window both over: the next storm is the second violation
	let verdicts = storm(&engine, identity, at(121)).await;
	assert_eq!(verdicts.iter().filter(|v| v.allowed).count(), 5);
	// Requests racing the block write are told the first-tier penalty
	let waits: Vec<u64> = verdicts.iter().filter(|v| v.is_denied()).map(retry_after).collect();
	assert_eq!(waits.len(), 35);
	assert!(waits.iter().all(|&w| w == 120 || w == 360), "{:?}", waits);
	assert!(waits.contains(&360));

	let status = engine.status(identity, "endpoint-a", at(121)).await.unwrap();
	assert_eq!(status.violations, 2);
	assert_eq!(status.block.map(|b| b.blocked_until), Some(at(121 + 360)));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_storm_memory() {
	common::setup_test_logging();
	storm_is_a_single_violation(common::memory_engine()).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_storm_sqlite() {
	common::setup_test_logging();
	let (engine, _dir) = common::sqlite_engine().await;
	storm_is_a_single_violation(engine).await;
}

// vim: ts=4
