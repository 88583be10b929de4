//! Shared test helpers: engines over both store variants and stores that
//! misbehave on purpose.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use ratewarden_core::{PolicyRegistry, RateLimitConfig, RateLimitEngine};
use ratewarden_store_adapter_memory::StoreAdapterMemory;
use ratewarden_store_adapter_sqlite::StoreAdapterSqlite;
use ratewarden_types::policy::Policy;
use ratewarden_types::prelude::*;
use ratewarden_types::store_adapter::{
	BlockEntry, NewViolation, RateLimitAdapter, ViolationOutcome, ViolationRecord, WindowHit,
	WindowRecord,
};

pub fn setup_test_logging() {
	let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

/// The 60s / 5 requests / 120s policy plus a second endpoint sharing the
/// ledger
pub fn registry() -> PolicyRegistry {
	PolicyRegistry::new([
		Policy::new("endpoint-a", Duration::from_secs(60), 5, Duration::from_secs(120)),
		Policy::new("endpoint-b", Duration::from_secs(60), 5, Duration::from_secs(120)),
		Policy::new("slow-window", Duration::from_secs(600), 2, Duration::from_secs(60)),
	])
	.unwrap()
}

/// Engine with a store timeout generous enough for a loaded test machine
pub fn engine_with(store: Arc<dyn RateLimitAdapter>) -> RateLimitEngine {
	let config = RateLimitConfig { store_timeout: Duration::from_secs(10), ..RateLimitConfig::default() };
	RateLimitEngine::new(store, registry(), &config)
}

pub fn memory_engine() -> RateLimitEngine {
	engine_with(Arc::new(StoreAdapterMemory::default()))
}

pub async fn sqlite_engine() -> (RateLimitEngine, tempfile::TempDir) {
	let dir = tempfile::tempdir().unwrap();
	let store = StoreAdapterSqlite::new(dir.path().join("ratelimit.db")).await.unwrap();
	(engine_with(Arc::new(store)), dir)
}

/// A store whose every call fails
#[derive(Debug, Default)]
pub struct FailingStore;

#[async_trait]
impl RateLimitAdapter for FailingStore {
	async fn read_window(&self, _: &str, _: &str, _: Timestamp) -> WdResult<Option<WindowRecord>> {
		Err(Error::DbError)
	}

	async fn start_window(
		&self,
		_: &str,
		_: &str,
		_: Duration,
		_: Timestamp,
	) -> WdResult<WindowRecord> {
		Err(Error::DbError)
	}

	async fn increment_window(&self, _: &str, _: &str, _: Timestamp) -> WdResult<u32> {
		Err(Error::DbError)
	}

	async fn hit_window(&self, _: &str, _: &Policy, _: Timestamp) -> WdResult<WindowHit> {
		Err(Error::DbError)
	}

	async fn purge_windows(&self, _: Timestamp) -> WdResult<u64> {
		Err(Error::DbError)
	}

	async fn read_block(&self, _: &str, _: &str, _: Timestamp) -> WdResult<Option<BlockEntry>> {
		Err(Error::DbError)
	}

	async fn upsert_block(&self, _: &BlockEntry) -> WdResult<BlockEntry> {
		Err(Error::DbError)
	}

	async fn delete_block(&self, _: &str, _: Option<&str>) -> WdResult<()> {
		Err(Error::DbError)
	}

	async fn list_blocks(&self, _: Timestamp) -> WdResult<Vec<BlockEntry>> {
		Err(Error::DbError)
	}

	async fn purge_blocks(&self, _: Timestamp) -> WdResult<u64> {
		Err(Error::DbError)
	}

	async fn record_violation(
		&self,
		_: &NewViolation<'_>,
		_: Timestamp,
	) -> WdResult<ViolationOutcome> {
		Err(Error::DbError)
	}

	async fn read_violations(&self, _: &str, _: Timestamp) -> WdResult<ViolationRecord> {
		Err(Error::DbError)
	}

	async fn purge_violations(&self, _: Timestamp) -> WdResult<u64> {
		Err(Error::DbError)
	}
}

/// In-memory store whose selected operations hang or fail
#[derive(Debug, Default)]
pub struct FlakyStore {
	pub inner: StoreAdapterMemory,
	/// `hit_window` never completes
	pub hang_hits: bool,
	/// The ledger cannot be written
	pub fail_ledger: bool,
	/// Blocks cannot be written
	pub fail_block_writes: bool,
}

#[async_trait]
impl RateLimitAdapter for FlakyStore {
	async fn read_window(
		&self,
		identity: &str,
		endpoint: &str,
		now: Timestamp,
	) -> WdResult<Option<WindowRecord>> {
		self.inner.read_window(identity, endpoint, now).await
	}

	async fn start_window(
		&self,
		identity: &str,
		endpoint: &str,
		window: Duration,
		now: Timestamp,
	) -> WdResult<WindowRecord> {
		self.inner.start_window(identity, endpoint, window, now).await
	}

	async fn increment_window(&self, identity: &str, endpoint: &str, now: Timestamp) -> WdResult<u32> {
		self.inner.increment_window(identity, endpoint, now).await
	}

	async fn hit_window(&self, identity: &str, policy: &Policy, now: Timestamp) -> WdResult<WindowHit> {
		if self.hang_hits {
			std::future::pending::<()>().await;
		}
		self.inner.hit_window(identity, policy, now).await
	}

	async fn purge_windows(&self, now: Timestamp) -> WdResult<u64> {
		self.inner.purge_windows(now).await
	}

	async fn read_block(
		&self,
		identity: &str,
		endpoint: &str,
		now: Timestamp,
	) -> WdResult<Option<BlockEntry>> {
		self.inner.read_block(identity, endpoint, now).await
	}

	async fn upsert_block(&self, block: &BlockEntry) -> WdResult<BlockEntry> {
		if self.fail_block_writes {
			return Err(Error::DbError);
		}
		self.inner.upsert_block(block).await
	}

	async fn delete_block(&self, identity: &str, endpoint: Option<&str>) -> WdResult<()> {
		self.inner.delete_block(identity, endpoint).await
	}

	async fn list_blocks(&self, now: Timestamp) -> WdResult<Vec<BlockEntry>> {
		self.inner.list_blocks(now).await
	}

	async fn purge_blocks(&self, now: Timestamp) -> WdResult<u64> {
		self.inner.purge_blocks(now).await
	}

	async fn record_violation(
		&self,
		violation: &NewViolation<'_>,
		now: Timestamp,
	) -> WdResult<ViolationOutcome> {
		if self.fail_ledger {
			return Err(Error::DbError);
		}
		self.inner.record_violation(violation, now).await
	}

	async fn read_violations(&self, identity: &str, now: Timestamp) -> WdResult<ViolationRecord> {
		self.inner.read_violations(identity, now).await
	}

	async fn purge_violations(&self, now: Timestamp) -> WdResult<u64> {
		self.inner.purge_violations(now).await
	}
}

// vim: ts=4
