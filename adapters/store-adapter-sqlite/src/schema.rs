//! Database schema initialization and migrations

use sqlx::{Sqlite, SqlitePool, Transaction};

/// Get the current database version from vars table
async fn get_db_version(tx: &mut Transaction<'_, Sqlite>) -> i64 {
	sqlx::query_scalar::<_, String>("SELECT value FROM vars WHERE key = 'db_version'")
		.fetch_optional(&mut **tx)
		.await
		.ok()
		.flatten()
		.and_then(|v| v.parse().ok())
		.unwrap_or(0)
}

/// Set the database version in vars table
async fn set_db_version(tx: &mut Transaction<'_, Sqlite>, version: i64) -> Result<(), sqlx::Error> {
	sqlx::query("INSERT OR REPLACE INTO vars (key, value) VALUES ('db_version', ?)")
		.bind(version.to_string())
		.execute(&mut **tx)
		.await?;
	Ok(())
}

// Current schema version - update this when adding new migrations
const CURRENT_DB_VERSION: i64 = 2;

/// Initialize the database schema and run migrations
pub(crate) async fn init_db(db: &SqlitePool) -> Result<(), sqlx::Error> {
	let mut tx = db.begin().await?;

	// Create vars table first (needed for version tracking)
	sqlx::query(
		"CREATE TABLE IF NOT EXISTS vars (
		key text NOT NULL,
		value text NOT NULL,
		created_at INTEGER DEFAULT (unixepoch()),
		updated_at INTEGER DEFAULT (unixepoch()),
		PRIMARY KEY(key)
	)",
	)
	.execute(&mut *tx)
	.await?;

	let version = get_db_version(&mut tx).await;

	// Schema creation - safe to run every time (uses IF NOT EXISTS)
	// All timestamps are unix epoch milliseconds

	// Window counters
	sqlx::query(
		"CREATE TABLE IF NOT EXISTS rl_windows (
			identity text NOT NULL,
			endpoint text NOT NULL,
			count integer NOT NULL,
			window_start INTEGER NOT NULL,
			window_end INTEGER NOT NULL,
			penalty_until INTEGER,
			violation integer NOT NULL DEFAULT 0,
			PRIMARY KEY(identity, endpoint)
		)",
	)
	.execute(&mut *tx)
	.await?;
	sqlx::query("CREATE INDEX IF NOT EXISTS idx_rl_windows_end ON rl_windows (window_end)")
		.execute(&mut *tx)
		.await?;

	// Blocklist ('*' endpoint blocks every endpoint)
	sqlx::query(
		"CREATE TABLE IF NOT EXISTS rl_blocks (
			identity text NOT NULL,
			endpoint text NOT NULL,
			blocked_until INTEGER NOT NULL,
			reason text NOT NULL,
			created_at INTEGER NOT NULL,
			PRIMARY KEY(identity, endpoint)
		)",
	)
	.execute(&mut *tx)
	.await?;
	sqlx::query("CREATE INDEX IF NOT EXISTS idx_rl_blocks_until ON rl_blocks (blocked_until)")
		.execute(&mut *tx)
		.await?;

	// Violation ledger
	sqlx::query(
		"CREATE TABLE IF NOT EXISTS rl_violations (
			v_id integer NOT NULL,
			identity text NOT NULL,
			endpoint text NOT NULL,
			requests_count integer NOT NULL,
			prior_count integer NOT NULL DEFAULT 0,
			block_duration INTEGER,
			created_at INTEGER NOT NULL,
			PRIMARY KEY(v_id)
		)",
	)
	.execute(&mut *tx)
	.await?;

	sqlx::query(
		"CREATE INDEX IF NOT EXISTS idx_rl_violations_identity ON rl_violations (identity, created_at)",
	)
	.execute(&mut *tx)
	.await?;

	// Version 2: saturated windows remember their penalty
	if version == 1 {
		sqlx::query("ALTER TABLE rl_windows ADD COLUMN penalty_until INTEGER")
			.execute(&mut *tx)
			.await?;
		sqlx::query("ALTER TABLE rl_windows ADD COLUMN violation integer NOT NULL DEFAULT 0")
			.execute(&mut *tx)
			.await?;
	}

	if version < CURRENT_DB_VERSION {
		set_db_version(&mut tx, CURRENT_DB_VERSION).await?;
	}

	tx.commit().await?;
	Ok(())
}

// vim: ts=4
