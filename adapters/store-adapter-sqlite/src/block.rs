//! Blocklist

use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use ratewarden_types::prelude::*;
use ratewarden_types::store_adapter::BlockEntry;

use crate::utils::*;

fn block_from_row(row: &SqliteRow) -> Result<BlockEntry, sqlx::Error> {
	let endpoint: String = row.try_get("endpoint")?;
	Ok(BlockEntry {
		identity: row.try_get::<String, _>("identity")?.into(),
		endpoint: if endpoint == WILDCARD_ENDPOINT { None } else { Some(endpoint.into()) },
		blocked_until: Timestamp(row.try_get("blocked_until")?),
		reason: row.try_get::<String, _>("reason")?.into(),
		created_at: Timestamp(row.try_get("created_at")?),
	})
}

/// Read the authoritative active block for a key: the latest expiry, the
/// wildcard block on a tie
pub(crate) async fn read(
	db: &SqlitePool,
	identity: &str,
	endpoint: &str,
	now: Timestamp,
) -> WdResult<Option<BlockEntry>> {
	let row = sqlx::query(
		"SELECT identity, endpoint, blocked_until, reason, created_at FROM rl_blocks
		WHERE identity = ?1 AND endpoint IN (?2, ?3) AND blocked_until > ?4
		ORDER BY blocked_until DESC, endpoint = ?3 DESC LIMIT 1",
	)
	.bind(identity)
	.bind(endpoint)
	.bind(WILDCARD_ENDPOINT)
	.bind(now.0)
	.fetch_optional(db)
	.await
	.inspect_err(inspect)
	.map_err(|_| Error::DbError)?;

	row.as_ref().map(block_from_row).transpose().inspect_err(inspect).map_err(|_| Error::DbError)
}

/// Insert a block, or extend the stored one if the new one expires later
pub(crate) async fn upsert(db: &SqlitePool, block: &BlockEntry) -> WdResult<BlockEntry> {
	let row = sqlx::query(
		"INSERT INTO rl_blocks (identity, endpoint, blocked_until, reason, created_at)
		VALUES (?1, ?2, ?3, ?4, ?5)
		ON CONFLICT (identity, endpoint) DO UPDATE SET
			reason = CASE WHEN excluded.blocked_until > rl_blocks.blocked_until
				THEN excluded.reason ELSE rl_blocks.reason END,
			created_at = CASE WHEN excluded.blocked_until > rl_blocks.blocked_until
				THEN excluded.created_at ELSE rl_blocks.created_at END,
			blocked_until = max(rl_blocks.blocked_until, excluded.blocked_until)
		RETURNING identity, endpoint, blocked_until, reason, created_at",
	)
	.bind(block.identity.as_ref())
	.bind(block.endpoint_key())
	.bind(block.blocked_until.0)
	.bind(block.reason.as_ref())
	.bind(block.created_at.0)
	.fetch_one(db)
	.await
	.inspect_err(inspect)
	.map_err(|_| Error::DbError)?;

	block_from_row(&row).inspect_err(inspect).map_err(|_| Error::DbError)
}

/// Delete one block of an identity, or all of them
pub(crate) async fn delete(db: &SqlitePool, identity: &str, endpoint: Option<&str>) -> WdResult<()> {
	let query = match endpoint {
		Some(endpoint) => {
			sqlx::query("DELETE FROM rl_blocks WHERE identity = ?1 AND endpoint = ?2")
				.bind(identity)
				.bind(endpoint)
		}
		None => sqlx::query("DELETE FROM rl_blocks WHERE identity = ?1").bind(identity),
	};
	query.execute(db).await.inspect_err(inspect).map_err(|_| Error::DbError)?;
	Ok(())
}

/// List active blocks, soonest expiry first
pub(crate) async fn list(db: &SqlitePool, now: Timestamp) -> WdResult<Vec<BlockEntry>> {
	let rows = sqlx::query(
		"SELECT identity, endpoint, blocked_until, reason, created_at FROM rl_blocks
		WHERE blocked_until > ?1 ORDER BY blocked_until",
	)
	.bind(now.0)
	.fetch_all(db)
	.await
	.inspect_err(inspect)
	.map_err(|_| Error::DbError)?;

	rows.iter()
		.map(block_from_row)
		.collect::<Result<Vec<_>, _>>()
		.inspect_err(inspect)
		.map_err(|_| Error::DbError)
}

/// Delete expired blocks
pub(crate) async fn purge(db: &SqlitePool, now: Timestamp) -> WdResult<u64> {
	let res = sqlx::query("DELETE FROM rl_blocks WHERE blocked_until <= ?1")
		.bind(now.0)
		.execute(db)
		.await
		.inspect_err(inspect)
		.map_err(|_| Error::DbError)?;

	Ok(res.rows_affected())
}

// vim: ts=4
