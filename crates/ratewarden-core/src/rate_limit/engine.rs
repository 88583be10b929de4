//! Rate Limit Decision Engine
//!
//! Per request: resolve the identity, check the blocklist, then count the
//! request against the window of the endpoint policy. The request pushing a
//! window over its ceiling is recorded in the violation ledger and the
//! identity is blocked on that endpoint for the escalated duration. Requests
//! racing it into the same exhausted window are denied without a new
//! violation.
//!
//! Store faults never deny a request. A failed block check reads as "not
//! blocked", a failed window count admits the request uncounted.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use hyper::{Method, Request};

use ratewarden_types::policy::{EscalationTier, Policy};
use ratewarden_types::store_adapter::{BlockEntry, RateLimitAdapter, WindowHit, WindowRecord};

use super::api::{DecisionState, RateLimitStatus, RateLimiterStats, Unenforced};
use super::blocklist::Blocklist;
use super::config::RateLimitConfig;
use super::extractors::IdentityResolver;
use super::ledger::ViolationLedger;
use super::lookup::Lookup;
use super::registry::PolicyRegistry;
use super::window::WindowCounter;
use crate::prelude::*;

/// Reason of a manual block
const MANUAL_BLOCK_REASON: &str = "manual block";

#[derive(Debug, Default)]
struct Counters {
	evaluations: AtomicU64,
	allowed: AtomicU64,
	blocked: AtomicU64,
	exceeded: AtomicU64,
	unenforced: AtomicU64,
	store_errors: AtomicU64,
	blocks_issued: AtomicU64,
}

impl Counters {
	fn bump(counter: &AtomicU64) {
		counter.fetch_add(1, Ordering::Relaxed);
	}
}

#[derive(Debug)]
pub struct RateLimitEngine {
	resolver: IdentityResolver,
	registry: PolicyRegistry,
	blocklist: Blocklist,
	windows: WindowCounter,
	ledger: ViolationLedger,
	counters: Counters,
}

impl RateLimitEngine {
	pub fn new(
		store: Arc<dyn RateLimitAdapter>,
		registry: PolicyRegistry,
		config: &RateLimitConfig,
	) -> Self {
		let timeout = config.store_timeout;
		Self {
			resolver: IdentityResolver::new(config.trust_peer_addr),
			registry,
			blocklist: Blocklist::new(Arc::clone(&store), timeout),
			windows: WindowCounter::new(Arc::clone(&store), timeout),
			ledger: ViolationLedger::new(store, timeout),
			counters: Counters::default(),
		}
	}

	pub fn registry(&self) -> &PolicyRegistry {
		&self.registry
	}

	pub fn blocklist(&self) -> &Blocklist {
		&self.blocklist
	}

	pub fn windows(&self) -> &WindowCounter {
		&self.windows
	}

	pub fn ledger(&self) -> &ViolationLedger {
		&self.ledger
	}

	/// Evaluate a request against the policy of `endpoint`. Preflight
	/// requests are admitted without touching the store.
	///
	/// The request is only inspected up front, the returned future does not
	/// borrow it.
	pub fn evaluate<'a, B>(
		&'a self,
		req: &Request<B>,
		endpoint: &'a str,
	) -> impl Future<Output = Verdict> + Send + use<'a, B> {
		let identity =
			if req.method() == Method::OPTIONS { None } else { Some(self.resolver.resolve(req)) };

		async move {
			match identity {
				Some(identity) => self.check(&identity, endpoint, Timestamp::now()).await,
				None => {
					Counters::bump(&self.counters.evaluations);
					Counters::bump(&self.counters.unenforced);
					Verdict::unenforced(Unenforced::Preflight)
				}
			}
		}
	}

	/// Decide on a request of `identity` to `endpoint` at `now`
	pub async fn check(&self, identity: &str, endpoint: &str, now: Timestamp) -> Verdict {
		Counters::bump(&self.counters.evaluations);
		let policy = self.registry.lookup(endpoint);

		match self.blocklist.is_blocked(identity, endpoint, now).await {
			Lookup::Found(block) => return self.blocked(identity, endpoint, policy, &block, now),
			Lookup::StoreError(_) => Counters::bump(&self.counters.store_errors),
			Lookup::NotFound => {}
		}

		let Some(policy) = policy else {
			Counters::bump(&self.counters.unenforced);
			return Verdict::unenforced(Unenforced::NoPolicy);
		};

		match self.windows.hit(identity, policy, now).await {
			Ok(WindowHit::Exceeded(record)) => self.exceeded(identity, policy, &record, now).await,
			Ok(WindowHit::Saturated(record)) => self.saturated(identity, policy, &record, now).await,
			Ok(WindowHit::Started(record) | WindowHit::Counted(record)) => {
				Counters::bump(&self.counters.allowed);
				Verdict::counted(policy.max_requests, record.count, record.window_end)
			}
			Err(err) => {
				debug!("admitting {} on {} uncounted: {}", identity, endpoint, err);
				Counters::bump(&self.counters.store_errors);
				Counters::bump(&self.counters.unenforced);
				Verdict::unenforced(Unenforced::StoreFault)
			}
		}
	}

	fn blocked(
		&self,
		identity: &str,
		endpoint: &str,
		policy: Option<&Policy>,
		block: &BlockEntry,
		now: Timestamp,
	) -> Verdict {
		Counters::bump(&self.counters.blocked);
		debug!(
			"{} blocked on {} until {} ({})",
			identity, endpoint, block.blocked_until, block.reason
		);
		Verdict::denied(
			DecisionState::Blocked,
			policy.map(|p| p.max_requests),
			block.blocked_until,
			now,
		)
	}

	async fn exceeded(
		&self,
		identity: &str,
		policy: &Policy,
		record: &WindowRecord,
		now: Timestamp,
	) -> Verdict {
		Counters::bump(&self.counters.exceeded);

		let (prior, block_duration) =
			match self.ledger.record_violation(identity, policy, record.count, now).await {
				Ok(outcome) => (Some(outcome.prior), outcome.block_duration),
				Err(_) => {
					Counters::bump(&self.counters.store_errors);
					(None, policy.base_block)
				}
			};
		let tier = prior.map_or(EscalationTier::First, EscalationTier::from_prior);
		let reason = format!(
			"rate limit exceeded on {}: {} requests in {}s ({} violation tier)",
			policy.endpoint,
			record.count,
			policy.window.as_secs(),
			tier.name()
		);

		let blocked_until = match self
			.blocklist
			.block(identity, Some(&policy.endpoint), block_duration, &reason, now)
			.await
		{
			Ok(entry) => {
				Counters::bump(&self.counters.blocks_issued);
				entry.blocked_until
			}
			Err(_) => {
				Counters::bump(&self.counters.store_errors);
				now + block_duration
			}
		};

		info!(
			"{} exceeded {} ({}/{} in window), blocked for {}s",
			identity,
			policy.endpoint,
			record.count,
			policy.max_requests,
			block_duration.as_secs()
		);
		Verdict::denied(DecisionState::LimitExceeded, Some(policy.max_requests), blocked_until, now)
	}

	/// Deny a request into a window whose violation was already recorded by
	/// an earlier request
	async fn saturated(
		&self,
		identity: &str,
		policy: &Policy,
		record: &WindowRecord,
		now: Timestamp,
	) -> Verdict {
		Counters::bump(&self.counters.exceeded);

		let blocked_until = match self.blocklist.is_blocked(identity, &policy.endpoint, now).await {
			Lookup::Found(block) => block.blocked_until,
			Lookup::StoreError(_) => {
				Counters::bump(&self.counters.store_errors);
				record.penalty_until.unwrap_or(now + policy.base_block)
			}
			Lookup::NotFound => record.penalty_until.unwrap_or(now + policy.base_block),
		};

		debug!(
			"{} over the limit on {} ({}/{} in window), violation already recorded",
			identity, policy.endpoint, record.count, policy.max_requests
		);
		Verdict::denied(DecisionState::LimitExceeded, Some(policy.max_requests), blocked_until, now)
	}

	// Operator API
	//**************

	/// Current window, block and violation count of a key
	pub async fn status(
		&self,
		identity: &str,
		endpoint: &str,
		now: Timestamp,
	) -> WdResult<RateLimitStatus> {
		let policy = self.registry.lookup(endpoint);
		let window = match self.windows.get(identity, endpoint, now).await {
			Lookup::Found(window) => Some(window),
			Lookup::NotFound => None,
			Lookup::StoreError(err) => return Err(err),
		};
		let block = match self.blocklist.is_blocked(identity, endpoint, now).await {
			Lookup::Found(block) => Some(block),
			Lookup::NotFound => None,
			Lookup::StoreError(err) => return Err(err),
		};
		let violations = self.ledger.violations(identity, now).await?.count();

		let remaining = policy.map(|p| {
			if block.is_some() {
				0
			} else {
				p.max_requests.saturating_sub(window.as_ref().map_or(0, |w| w.count))
			}
		});

		Ok(RateLimitStatus {
			identity: identity.into(),
			endpoint: endpoint.into(),
			limit: policy.map(|p| p.max_requests),
			remaining,
			window,
			block,
			violations,
		})
	}

	/// Block an identity manually. `endpoint: None` blocks every endpoint.
	pub async fn block(
		&self,
		identity: &str,
		endpoint: Option<&str>,
		duration: Duration,
		reason: Option<&str>,
		now: Timestamp,
	) -> WdResult<BlockEntry> {
		if endpoint == Some(WILDCARD_ENDPOINT) {
			return Err(Error::ValidationError(format!(
				"use no endpoint instead of '{}' to block every endpoint",
				WILDCARD_ENDPOINT
			)));
		}
		let entry = self
			.blocklist
			.block(identity, endpoint, duration, reason.unwrap_or(MANUAL_BLOCK_REASON), now)
			.await?;
		Counters::bump(&self.counters.blocks_issued);
		info!(
			"{} blocked on {} until {}",
			identity,
			endpoint.unwrap_or(WILDCARD_ENDPOINT),
			entry.blocked_until
		);
		Ok(entry)
	}

	/// Lift blocks of an identity. `endpoint: None` lifts all of them.
	pub async fn unblock(&self, identity: &str, endpoint: Option<&str>) -> WdResult<()> {
		self.blocklist.unblock(identity, endpoint).await?;
		info!("{} unblocked on {}", identity, endpoint.unwrap_or(WILDCARD_ENDPOINT));
		Ok(())
	}

	pub async fn list_blocks(&self, now: Timestamp) -> WdResult<Vec<BlockEntry>> {
		self.blocklist.list(now).await
	}

	pub fn stats(&self) -> RateLimiterStats {
		let c = &self.counters;
		RateLimiterStats {
			evaluations: c.evaluations.load(Ordering::Relaxed),
			allowed: c.allowed.load(Ordering::Relaxed),
			blocked: c.blocked.load(Ordering::Relaxed),
			exceeded: c.exceeded.load(Ordering::Relaxed),
			unenforced: c.unenforced.load(Ordering::Relaxed),
			store_errors: c.store_errors.load(Ordering::Relaxed),
			blocks_issued: c.blocks_issued.load(Ordering::Relaxed),
		}
	}
}


// vim: ts=4
