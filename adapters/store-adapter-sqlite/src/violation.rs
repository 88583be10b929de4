//! Violation ledger

use sqlx::{Row, SqlitePool};

use ratewarden_types::policy::escalated_block;
use ratewarden_types::prelude::*;
use ratewarden_types::store_adapter::{
	NewViolation, Violation, ViolationOutcome, ViolationRecord, retention_cutoff,
};
use ratewarden_types::types::duration_millis;

use crate::utils::*;

/// Append a violation.
///
/// The prior count is taken by the inserting statement itself, so concurrent
/// violations of the same identity each see a distinct count.
pub(crate) async fn record(
	db: &SqlitePool,
	violation: &NewViolation<'_>,
	now: Timestamp,
) -> WdResult<ViolationOutcome> {
	let mut tx = db.begin().await.inspect_err(inspect).map_err(|_| Error::DbError)?;

	let row = sqlx::query(
		"INSERT INTO rl_violations (identity, endpoint, requests_count, prior_count, created_at)
		SELECT ?1, ?2, ?3, count(*), ?4 FROM rl_violations WHERE identity = ?1 AND created_at > ?5
		RETURNING v_id, prior_count",
	)
	.bind(violation.identity)
	.bind(violation.endpoint)
	.bind(i64::from(violation.requests_count))
	.bind(now.0)
	.bind(retention_cutoff(now).0)
	.fetch_one(&mut *tx)
	.await
	.inspect_err(inspect)
	.map_err(|_| Error::DbError)?;

	let v_id: i64 = row.try_get("v_id").inspect_err(inspect).map_err(|_| Error::DbError)?;
	let prior = get_u32(&row, "prior_count").inspect_err(inspect).map_err(|_| Error::DbError)?;
	let block_duration = escalated_block(violation.base_block, prior);

	sqlx::query("UPDATE rl_violations SET block_duration = ?1 WHERE v_id = ?2")
		.bind(duration_millis(block_duration))
		.bind(v_id)
		.execute(&mut *tx)
		.await
		.inspect_err(inspect)
		.map_err(|_| Error::DbError)?;

	tx.commit().await.inspect_err(inspect).map_err(|_| Error::DbError)?;
	Ok(ViolationOutcome { prior, block_duration })
}

/// Read the violations of an identity within the retention period
pub(crate) async fn read(db: &SqlitePool, identity: &str, now: Timestamp) -> WdResult<ViolationRecord> {
	let rows = sqlx::query(
		"SELECT endpoint, requests_count, block_duration, created_at FROM rl_violations
		WHERE identity = ?1 AND created_at > ?2 ORDER BY created_at, v_id",
	)
	.bind(identity)
	.bind(retention_cutoff(now).0)
	.fetch_all(db)
	.await
	.inspect_err(inspect)
	.map_err(|_| Error::DbError)?;

	let violations = rows
		.iter()
		.map(|row| -> Result<Violation, sqlx::Error> {
			Ok(Violation {
				endpoint: row.try_get::<String, _>("endpoint")?.into(),
				requests_count: get_u32(row, "requests_count")?,
				block_duration_ms: row.try_get::<Option<i64>, _>("block_duration")?.unwrap_or(0),
				created_at: Timestamp(row.try_get("created_at")?),
			})
		})
		.collect::<Result<Vec<_>, sqlx::Error>>()
		.inspect_err(inspect)
		.map_err(|_| Error::DbError)?;

	Ok(ViolationRecord { identity: identity.into(), violations })
}

/// Delete violations older than the retention period
pub(crate) async fn purge(db: &SqlitePool, now: Timestamp) -> WdResult<u64> {
	let res = sqlx::query("DELETE FROM rl_violations WHERE created_at <= ?1")
		.bind(retention_cutoff(now).0)
		.execute(db)
		.await
		.inspect_err(inspect)
		.map_err(|_| Error::DbError)?;

	Ok(res.rows_affected())
}

// vim: ts=4
