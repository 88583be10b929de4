//! Adapter that stores window counters, blocklist entries and the violation ledger.
//!
//! Two implementations exist: a durable one shared between process instances
//! and a volatile in-process one. The decision engine only ever talks to this
//! trait and must not care which one it got.
//!
//! Expiry is always checked at read time: an elapsed window, an expired block
//! or a violation older than the retention period is never returned, whether
//! or not it has been physically purged yet.

use async_trait::async_trait;
use serde::Serialize;
use serde_with::skip_serializing_none;
use std::fmt::Debug;
use std::time::Duration;

use crate::policy::Policy;
use crate::prelude::*;

/// Counter of a single (identity, endpoint) window
#[skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WindowRecord {
	pub identity: Box<str>,
	pub endpoint: Box<str>,
	/// Requests counted in this window. Saturates at `max_requests + 1` once
	/// the window is exhausted.
	pub count: u32,
	pub window_start: Timestamp,
	pub window_end: Timestamp,
	/// Set by the request that pushed the window over its ceiling. Until it
	/// passes, further requests over the ceiling are denied without being
	/// recorded as new violations.
	pub penalty_until: Option<Timestamp>,
	/// Expiry of an active block on this key, if any
	pub blocked_until: Option<Timestamp>,
}

impl WindowRecord {
	/// A window is live until `now` passes its end
	pub fn is_live(&self, now: Timestamp) -> bool {
		self.window_start <= now && now <= self.window_end
	}

	pub fn is_stale(&self, now: Timestamp) -> bool {
		now > self.window_end
	}

	/// An earlier request already opened a violation on this window
	pub fn is_penalized(&self, now: Timestamp) -> bool {
		self.penalty_until.is_some_and(|until| now < until)
	}
}

/// Outcome of an atomic check-and-count on a window
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WindowHit {
	/// No live window existed; a new one was started with count 1
	Started(WindowRecord),
	/// The live window had room; its count was incremented
	Counted(WindowRecord),
	/// The live window was already at its ceiling and this request opens a
	/// violation
	Exceeded(WindowRecord),
	/// The live window was already at its ceiling and an earlier request
	/// opened the violation
	Saturated(WindowRecord),
}

impl WindowHit {
	pub fn record(&self) -> &WindowRecord {
		match self {
			WindowHit::Started(rec)
			| WindowHit::Counted(rec)
			| WindowHit::Exceeded(rec)
			| WindowHit::Saturated(rec) => rec,
		}
	}

	/// The request was over the ceiling, whether or not it opened a violation
	pub fn is_over_limit(&self) -> bool {
		matches!(self, WindowHit::Exceeded(_) | WindowHit::Saturated(_))
	}
}

/// Pure window transition shared by the adapters: what a hit at `now` does
/// to the current record of a key.
///
/// Only one request per exhausted window opens a violation: the one crossing
/// the ceiling, or the first one after its penalty ran out.
pub fn apply_hit(
	current: Option<&WindowRecord>,
	identity: &str,
	policy: &Policy,
	now: Timestamp,
) -> WindowHit {
	match current {
		Some(rec) if !rec.is_stale(now) => {
			if rec.count >= policy.max_requests {
				let mut rec = rec.clone();
				rec.count = policy.max_requests.saturating_add(1);
				if rec.is_penalized(now) {
					WindowHit::Saturated(rec)
				} else {
					rec.penalty_until = Some(now + policy.base_block);
					WindowHit::Exceeded(rec)
				}
			} else {
				let mut rec = rec.clone();
				rec.count += 1;
				WindowHit::Counted(rec)
			}
		}
		_ => WindowHit::Started(WindowRecord {
			identity: identity.into(),
			endpoint: policy.endpoint.clone(),
			count: 1,
			window_start: now,
			window_end: now + policy.window,
			penalty_until: None,
			blocked_until: None,
		}),
	}
}

/// Time-bounded deny rule
#[skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockEntry {
	pub identity: Box<str>,
	/// `None` blocks every endpoint of the identity
	pub endpoint: Option<Box<str>>,
	pub blocked_until: Timestamp,
	pub reason: Box<str>,
	pub created_at: Timestamp,
}

impl BlockEntry {
	pub fn is_active(&self, now: Timestamp) -> bool {
		now < self.blocked_until
	}

	pub fn is_wildcard(&self) -> bool {
		self.endpoint.is_none()
	}

	/// Time until the block expires, zero once expired
	pub fn remaining(&self, now: Timestamp) -> Duration {
		self.blocked_until.remaining_from(now)
	}

	/// Endpoint column value, with the wildcard spelled out
	pub fn endpoint_key(&self) -> &str {
		self.endpoint.as_deref().unwrap_or(WILDCARD_ENDPOINT)
	}

	pub fn matches(&self, identity: &str, endpoint: &str) -> bool {
		self.identity.as_ref() == identity
			&& self.endpoint.as_deref().is_none_or(|ep| ep == endpoint)
	}
}

/// Pick the authoritative active block among candidates.
///
/// The block expiring last wins, so the reported expiry is the moment the
/// key is free again. On equal expiry the wildcard block is reported.
pub fn select_block<'a>(
	candidates: impl IntoIterator<Item = &'a BlockEntry>,
	now: Timestamp,
) -> Option<&'a BlockEntry> {
	candidates
		.into_iter()
		.filter(|b| b.is_active(now))
		.max_by_key(|b| (b.blocked_until, b.is_wildcard()))
}

/// Merge a new block into the stored one of the same key. An active block
/// is only ever extended, never shortened.
pub fn merge_block(existing: Option<&BlockEntry>, new: &BlockEntry) -> BlockEntry {
	match existing {
		Some(existing) if existing.blocked_until >= new.blocked_until => existing.clone(),
		_ => new.clone(),
	}
}

/// A single recorded violation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Violation {
	pub endpoint: Box<str>,
	pub requests_count: u32,
	pub block_duration_ms: i64,
	pub created_at: Timestamp,
}

/// Violations of an identity within the retention period, oldest first
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ViolationRecord {
	pub identity: Box<str>,
	pub violations: Vec<Violation>,
}

impl ViolationRecord {
	pub fn count(&self) -> u32 {
		u32::try_from(self.violations.len()).unwrap_or(u32::MAX)
	}

	pub fn timestamps(&self) -> impl Iterator<Item = Timestamp> + '_ {
		self.violations.iter().map(|v| v.created_at)
	}
}

/// Data of a violation to record
#[derive(Debug, Clone, Copy)]
pub struct NewViolation<'a> {
	pub identity: &'a str,
	pub endpoint: &'a str,
	/// Requests counted in the window that was exceeded
	pub requests_count: u32,
	/// Base block of the exceeded policy
	pub base_block: Duration,
}

/// Result of recording a violation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ViolationOutcome {
	/// Violations of the identity in the retention period before this one
	pub prior: u32,
	/// Escalated block duration for this violation
	pub block_duration: Duration,
}

/// Start of the retention period ending at `now`; violations at or before it
/// no longer count
pub fn retention_cutoff(now: Timestamp) -> Timestamp {
	now - crate::policy::VIOLATION_RETENTION
}

/// Number of records removed by a purge
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PurgeStats {
	pub windows: u64,
	pub blocks: u64,
	pub violations: u64,
}

impl PurgeStats {
	pub fn total(&self) -> u64 {
		self.windows + self.blocks + self.violations
	}
}

#[async_trait]
pub trait RateLimitAdapter: Debug + Send + Sync {
	// Window counters
	//*****************

	/// Read the live window of a key
	async fn read_window(
		&self,
		identity: &str,
		endpoint: &str,
		now: Timestamp,
	) -> WdResult<Option<WindowRecord>>;

	/// Start a new window with count 1, superseding any previous one
	async fn start_window(
		&self,
		identity: &str,
		endpoint: &str,
		window: Duration,
		now: Timestamp,
	) -> WdResult<WindowRecord>;

	/// Increment the count of the live window. Fails with `Error::NotFound`
	/// if there is no live window.
	async fn increment_window(
		&self,
		identity: &str,
		endpoint: &str,
		now: Timestamp,
	) -> WdResult<u32>;

	/// Atomically check a key against its policy and count the request.
	/// Must not lose updates under concurrent calls for the same key.
	async fn hit_window(
		&self,
		identity: &str,
		policy: &Policy,
		now: Timestamp,
	) -> WdResult<WindowHit>;

	/// Remove elapsed windows that have no active block
	async fn purge_windows(&self, now: Timestamp) -> WdResult<u64>;

	// Blocklist
	//***********

	/// Read the authoritative active block for a key, wildcard blocks included
	async fn read_block(
		&self,
		identity: &str,
		endpoint: &str,
		now: Timestamp,
	) -> WdResult<Option<BlockEntry>>;

	/// Insert the block of `(identity, endpoint)`, or extend the stored one.
	/// A stored block expiring later is kept. Returns the block now in effect.
	async fn upsert_block(&self, block: &BlockEntry) -> WdResult<BlockEntry>;

	/// Delete the block of `(identity, endpoint)`; `None` deletes every block
	/// of the identity
	async fn delete_block(&self, identity: &str, endpoint: Option<&str>) -> WdResult<()>;

	/// List active blocks
	async fn list_blocks(&self, now: Timestamp) -> WdResult<Vec<BlockEntry>>;

	/// Remove expired blocks
	async fn purge_blocks(&self, now: Timestamp) -> WdResult<u64>;

	// Violation ledger
	//******************

	/// Append a violation and return the number of prior violations within
	/// the retention period together with the escalated block duration
	async fn record_violation(
		&self,
		violation: &NewViolation<'_>,
		now: Timestamp,
	) -> WdResult<ViolationOutcome>;

	/// Read the violations of an identity within the retention period
	async fn read_violations(&self, identity: &str, now: Timestamp) -> WdResult<ViolationRecord>;

	/// Remove violations older than the retention period
	async fn purge_violations(&self, now: Timestamp) -> WdResult<u64>;
}


// vim: ts=4
