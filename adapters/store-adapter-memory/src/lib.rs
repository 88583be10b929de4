//! In-process store adapter.
//!
//! Keeps window counters, blocks and violations in memory. Nothing is shared
//! between processes, so this adapter is only suitable for single-process
//! deployments. Every table sits behind its own lock; a lock is never held
//! while another one is acquired.

use std::collections::{HashMap, VecDeque};
use std::num::NonZeroUsize;
use std::time::Duration;

use async_trait::async_trait;
use lru::LruCache;
use parking_lot::{Mutex, RwLock};

use ratewarden_types::policy::{Policy, escalated_block};
use ratewarden_types::prelude::*;
use ratewarden_types::store_adapter::{
	BlockEntry, NewViolation, RateLimitAdapter, Violation, ViolationOutcome, ViolationRecord,
	WindowHit, WindowRecord, apply_hit, merge_block, retention_cutoff, select_block,
};
use ratewarden_types::types::duration_millis;

pub use ratewarden_types::types::DEFAULT_MAX_TRACKED_KEYS;

type Key = (Box<str>, Box<str>);

fn key(identity: &str, endpoint: &str) -> Key {
	(identity.into(), endpoint.into())
}

pub struct StoreAdapterMemory {
	/// Window counters, least recently used evicted first
	windows: Mutex<LruCache<Key, WindowRecord>>,
	/// Blocks keyed by (identity, endpoint or wildcard)
	blocks: RwLock<HashMap<Key, BlockEntry>>,
	/// Violations per identity, oldest first
	violations: Mutex<HashMap<Box<str>, VecDeque<Violation>>>,
}

impl StoreAdapterMemory {
	pub fn new(max_tracked_keys: usize) -> Self {
		// The default is a non-zero constant
		const DEFAULT_CAP: NonZeroUsize = match NonZeroUsize::new(DEFAULT_MAX_TRACKED_KEYS) {
			Some(v) => v,
			None => unreachable!(),
		};
		let cap = NonZeroUsize::new(max_tracked_keys).unwrap_or(DEFAULT_CAP);
		debug!("[store-adapter-memory] tracking up to {} windows", cap);

		Self {
			windows: Mutex::new(LruCache::new(cap)),
			blocks: RwLock::new(HashMap::new()),
			violations: Mutex::new(HashMap::new()),
		}
	}

	/// Latest expiry among the active blocks covering a key
	fn blocked_until(&self, identity: &str, endpoint: &str, now: Timestamp) -> Option<Timestamp> {
		let blocks = self.blocks.read();
		[blocks.get(&key(identity, endpoint)), blocks.get(&key(identity, WILDCARD_ENDPOINT))]
			.into_iter()
			.flatten()
			.filter(|b| b.is_active(now))
			.map(|b| b.blocked_until)
			.max()
	}
}

impl Default for StoreAdapterMemory {
	fn default() -> Self {
		Self::new(DEFAULT_MAX_TRACKED_KEYS)
	}
}

impl std::fmt::Debug for StoreAdapterMemory {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("StoreAdapterMemory")
			.field("windows", &self.windows.lock().len())
			.field("blocks", &self.blocks.read().len())
			.field("violations", &self.violations.lock().len())
			.finish()
	}
}

#[async_trait]
impl RateLimitAdapter for StoreAdapterMemory {
	// Window counters
	//*****************
	async fn read_window(
		&self,
		identity: &str,
		endpoint: &str,
		now: Timestamp,
	) -> WdResult<Option<WindowRecord>> {
		let record = self
			.windows
			.lock()
			.peek(&key(identity, endpoint))
			.filter(|rec| rec.is_live(now))
			.cloned();

		Ok(record.map(|mut rec| {
			rec.blocked_until = self.blocked_until(identity, endpoint, now);
			rec
		}))
	}

	async fn start_window(
		&self,
		identity: &str,
		endpoint: &str,
		window: Duration,
		now: Timestamp,
	) -> WdResult<WindowRecord> {
		let record = WindowRecord {
			identity: identity.into(),
			endpoint: endpoint.into(),
			count: 1,
			window_start: now,
			window_end: now + window,
			penalty_until: None,
			blocked_until: None,
		};
		self.windows.lock().put(key(identity, endpoint), record.clone());
		Ok(record)
	}

	async fn increment_window(
		&self,
		identity: &str,
		endpoint: &str,
		now: Timestamp,
	) -> WdResult<u32> {
		let mut windows = self.windows.lock();
		match windows.get_mut(&key(identity, endpoint)) {
			Some(rec) if rec.is_live(now) => {
				rec.count = rec.count.saturating_add(1);
				Ok(rec.count)
			}
			_ => Err(Error::NotFound),
		}
	}

	async fn hit_window(
		&self,
		identity: &str,
		policy: &Policy,
		now: Timestamp,
	) -> WdResult<WindowHit> {
		let key = key(identity, &policy.endpoint);
		let mut windows = self.windows.lock();

		let hit = apply_hit(windows.get(&key), identity, policy, now);
		windows.put(key, hit.record().clone());
		Ok(hit)
	}

	async fn purge_windows(&self, now: Timestamp) -> WdResult<u64> {
		let blocked: Vec<Key> = {
			let blocks = self.blocks.read();
			blocks
				.values()
				.filter(|b| b.is_active(now))
				.map(|b| key(&b.identity, b.endpoint_key()))
				.collect()
		};
		let is_blocked = |(identity, endpoint): &Key| {
			blocked.iter().any(|(b_identity, b_endpoint)| {
				b_identity == identity
					&& (b_endpoint == endpoint || b_endpoint.as_ref() == WILDCARD_ENDPOINT)
			})
		};

		let mut windows = self.windows.lock();
		let stale: Vec<Key> = windows
			.iter()
			.filter(|&(key, rec)| rec.is_stale(now) && !is_blocked(key))
			.map(|(key, _)| key.clone())
			.collect();
		for key in &stale {
			windows.pop(key);
		}

		Ok(stale.len() as u64)
	}

	// Blocklist
	//***********
	async fn read_block(
		&self,
		identity: &str,
		endpoint: &str,
		now: Timestamp,
	) -> WdResult<Option<BlockEntry>> {
		let blocks = self.blocks.read();
		let candidates = [
			blocks.get(&key(identity, endpoint)),
			blocks.get(&key(identity, WILDCARD_ENDPOINT)),
		];
		Ok(select_block(candidates.into_iter().flatten(), now).cloned())
	}

	async fn upsert_block(&self, block: &BlockEntry) -> WdResult<BlockEntry> {
		let mut blocks = self.blocks.write();
		let key = key(&block.identity, block.endpoint_key());
		let merged = merge_block(blocks.get(&key), block);
		blocks.insert(key, merged.clone());
		Ok(merged)
	}

	async fn delete_block(&self, identity: &str, endpoint: Option<&str>) -> WdResult<()> {
		let mut blocks = self.blocks.write();
		match endpoint {
			Some(endpoint) => {
				blocks.remove(&key(identity, endpoint));
			}
			None => blocks.retain(|(b_identity, _), _| b_identity.as_ref() != identity),
		}
		Ok(())
	}

	async fn list_blocks(&self, now: Timestamp) -> WdResult<Vec<BlockEntry>> {
		let mut list: Vec<BlockEntry> =
			self.blocks.read().values().filter(|b| b.is_active(now)).cloned().collect();
		list.sort_by(|a, b| a.blocked_until.cmp(&b.blocked_until));
		Ok(list)
	}

	async fn purge_blocks(&self, now: Timestamp) -> WdResult<u64> {
		let mut blocks = self.blocks.write();
		let before = blocks.len();
		blocks.retain(|_, b| b.is_active(now));
		Ok((before - blocks.len()) as u64)
	}

	// Violation ledger
	//******************
	async fn record_violation(
		&self,
		violation: &NewViolation<'_>,
		now: Timestamp,
	) -> WdResult<ViolationOutcome> {
		let cutoff = retention_cutoff(now);
		let mut violations = self.violations.lock();
		let ledger = violations.entry(violation.identity.into()).or_default();

		while ledger.front().is_some_and(|v| v.created_at <= cutoff) {
			ledger.pop_front();
		}
		let prior = u32::try_from(ledger.len()).unwrap_or(u32::MAX);
		let block_duration = escalated_block(violation.base_block, prior);

		ledger.push_back(Violation {
			endpoint: violation.endpoint.into(),
			requests_count: violation.requests_count,
			block_duration_ms: duration_millis(block_duration),
			created_at: now,
		});

		Ok(ViolationOutcome { prior, block_duration })
	}

	async fn read_violations(&self, identity: &str, now: Timestamp) -> WdResult<ViolationRecord> {
		let cutoff = retention_cutoff(now);
		let violations = self.violations.lock();
		let list = violations
			.get(identity)
			.map(|ledger| ledger.iter().filter(|v| v.created_at > cutoff).cloned().collect())
			.unwrap_or_default();

		Ok(ViolationRecord { identity: identity.into(), violations: list })
	}

	async fn purge_violations(&self, now: Timestamp) -> WdResult<u64> {
		let cutoff = retention_cutoff(now);
		let mut violations = self.violations.lock();
		let mut removed = 0u64;

		for ledger in violations.values_mut() {
			let before = ledger.len();
			ledger.retain(|v| v.created_at > cutoff);
			removed += (before - ledger.len()) as u64;
		}
		violations.retain(|_, ledger| !ledger.is_empty());

		Ok(removed)
	}
}


// vim: ts=4
