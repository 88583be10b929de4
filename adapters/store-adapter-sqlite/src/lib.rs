//! SQLite store adapter for ratewarden.
//!
//! Window counters, blocks and violations live in one database file which can
//! be shared by every instance of the service on the host. All check-and-count
//! operations are single statements, so concurrent writers never lose updates.

use async_trait::async_trait;
use sqlx::sqlite::{self, SqlitePool};
use std::path::Path;
use std::time::Duration;

use ratewarden_types::policy::Policy;
use ratewarden_types::prelude::*;
use ratewarden_types::store_adapter::{
	BlockEntry, NewViolation, RateLimitAdapter, ViolationOutcome, ViolationRecord, WindowHit,
	WindowRecord,
};

mod block;
mod schema;
mod utils;
mod violation;
mod window;

/// How long a writer waits for a locked database before giving up
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug)]
pub struct StoreAdapterSqlite {
	db: SqlitePool,
}

impl StoreAdapterSqlite {
	/// Open (or create) the database at `path`
	pub async fn new(path: impl AsRef<Path>) -> WdResult<Self> {
		let path = path.as_ref();
		if let Some(dir) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
			tokio::fs::create_dir_all(dir).await?;
		}

		let opts = sqlite::SqliteConnectOptions::new()
			.filename(path)
			.create_if_missing(true)
			.journal_mode(sqlite::SqliteJournalMode::Wal)
			.busy_timeout(BUSY_TIMEOUT);
		let db = sqlite::SqlitePoolOptions::new()
			.max_connections(5)
			.connect_with(opts)
			.await
			.inspect_err(|err| error!("DbError: {:#?}", err))
			.or(Err(Error::DbError))?;

		schema::init_db(&db)
			.await
			.inspect_err(|err| error!("DbError: {:#?}", err))
			.or(Err(Error::DbError))?;

		info!("rate limit store opened at {}", path.display());
		Ok(Self { db })
	}
}

#[async_trait]
impl RateLimitAdapter for StoreAdapterSqlite {
	// Window counters
	//*****************
	async fn read_window(
		&self,
		identity: &str,
		endpoint: &str,
		now: Timestamp,
	) -> WdResult<Option<WindowRecord>> {
		window::read(&self.db, identity, endpoint, now).await
	}

	async fn start_window(
		&self,
		identity: &str,
		endpoint: &str,
		window: Duration,
		now: Timestamp,
	) -> WdResult<WindowRecord> {
		window::start(&self.db, identity, endpoint, window, now).await
	}

	async fn increment_window(
		&self,
		identity: &str,
		endpoint: &str,
		now: Timestamp,
	) -> WdResult<u32> {
		window::increment(&self.db, identity, endpoint, now).await
	}

	async fn hit_window(
		&self,
		identity: &str,
		policy: &Policy,
		now: Timestamp,
	) -> WdResult<WindowHit> {
		window::hit(&self.db, identity, policy, now).await
	}

	async fn purge_windows(&self, now: Timestamp) -> WdResult<u64> {
		window::purge(&self.db, now).await
	}

	// Blocklist
	//***********
	async fn read_block(
		&self,
		identity: &str,
		endpoint: &str,
		now: Timestamp,
	) -> WdResult<Option<BlockEntry>> {
		block::read(&self.db, identity, endpoint, now).await
	}

	async fn upsert_block(&self, block: &BlockEntry) -> WdResult<BlockEntry> {
		block::upsert(&self.db, block).await
	}

	async fn delete_block(&self, identity: &str, endpoint: Option<&str>) -> WdResult<()> {
		block::delete(&self.db, identity, endpoint).await
	}

	async fn list_blocks(&self, now: Timestamp) -> WdResult<Vec<BlockEntry>> {
		block::list(&self.db, now).await
	}

	async fn purge_blocks(&self, now: Timestamp) -> WdResult<u64> {
		block::purge(&self.db, now).await
	}

	// Violation ledger
	//******************
	async fn record_violation(
		&self,
		violation: &NewViolation<'_>,
		now: Timestamp,
	) -> WdResult<ViolationOutcome> {
		violation::record(&self.db, violation, now).await
	}

	async fn read_violations(&self, identity: &str, now: Timestamp) -> WdResult<ViolationRecord> {
		violation::read(&self.db, identity, now).await
	}

	async fn purge_violations(&self, now: Timestamp) -> WdResult<u64> {
		violation::purge(&self.db, now).await
	}
}

// vim: ts=4
