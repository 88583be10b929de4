//! Window counters

use std::time::Duration;

use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use ratewarden_types::policy::Policy;
use ratewarden_types::prelude::*;
use ratewarden_types::store_adapter::{WindowHit, WindowRecord};

use crate::utils::*;

fn window_from_row(row: &SqliteRow) -> Result<WindowRecord, sqlx::Error> {
	Ok(WindowRecord {
		identity: row.try_get::<String, _>("identity")?.into(),
		endpoint: row.try_get::<String, _>("endpoint")?.into(),
		count: get_u32(row, "count")?,
		window_start: Timestamp(row.try_get("window_start")?),
		window_end: Timestamp(row.try_get("window_end")?),
		penalty_until: row.try_get::<Option<i64>, _>("penalty_until")?.map(Timestamp),
		blocked_until: row.try_get::<Option<i64>, _>("blocked_until")?.map(Timestamp),
	})
}

/// Read the live window of a key, with the latest active block covering it
pub(crate) async fn read(
	db: &SqlitePool,
	identity: &str,
	endpoint: &str,
	now: Timestamp,
) -> WdResult<Option<WindowRecord>> {
	let row = sqlx::query(
		"SELECT w.identity, w.endpoint, w.count, w.window_start, w.window_end, w.penalty_until,
			(SELECT max(b.blocked_until) FROM rl_blocks b
				WHERE b.identity = w.identity AND b.endpoint IN (w.endpoint, ?4)
				AND b.blocked_until > ?3) AS blocked_until
		FROM rl_windows w
		WHERE w.identity = ?1 AND w.endpoint = ?2 AND w.window_start <= ?3 AND w.window_end >= ?3
		ORDER BY w.window_start DESC LIMIT 1",
	)
	.bind(identity)
	.bind(endpoint)
	.bind(now.0)
	.bind(WILDCARD_ENDPOINT)
	.fetch_optional(db)
	.await
	.inspect_err(inspect)
	.map_err(|_| Error::DbError)?;

	row.as_ref()
		.map(window_from_row)
		.transpose()
		.inspect_err(inspect)
		.map_err(|_| Error::DbError)
}

/// Start a new window, superseding whatever was stored for the key
pub(crate) async fn start(
	db: &SqlitePool,
	identity: &str,
	endpoint: &str,
	window: Duration,
	now: Timestamp,
) -> WdResult<WindowRecord> {
	let window_end = now + window;
	sqlx::query(
		"INSERT INTO rl_windows (identity, endpoint, count, window_start, window_end)
		VALUES (?1, ?2, 1, ?3, ?4)
		ON CONFLICT (identity, endpoint) DO UPDATE SET
			count = 1, window_start = excluded.window_start, window_end = excluded.window_end,
			penalty_until = NULL, violation = 0",
	)
	.bind(identity)
	.bind(endpoint)
	.bind(now.0)
	.bind(window_end.0)
	.execute(db)
	.await
	.inspect_err(inspect)
	.map_err(|_| Error::DbError)?;

	Ok(WindowRecord {
		identity: identity.into(),
		endpoint: endpoint.into(),
		count: 1,
		window_start: now,
		window_end,
		penalty_until: None,
		blocked_until: None,
	})
}

/// Increment the live window of a key
pub(crate) async fn increment(
	db: &SqlitePool,
	identity: &str,
	endpoint: &str,
	now: Timestamp,
) -> WdResult<u32> {
	let row = sqlx::query(
		"UPDATE rl_windows SET count = count + 1
		WHERE identity = ?1 AND endpoint = ?2 AND window_start <= ?3 AND window_end >= ?3
		RETURNING count",
	)
	.bind(identity)
	.bind(endpoint)
	.bind(now.0)
	.fetch_optional(db)
	.await
	.inspect_err(inspect)
	.map_err(|_| Error::DbError)?;

	match row {
		Some(row) => get_u32(&row, "count").inspect_err(inspect).map_err(|_| Error::DbError),
		None => Err(Error::NotFound),
	}
}

/// Check-and-count in a single statement.
///
/// A stale window is replaced by a fresh one, a live window below the ceiling
/// is incremented and an exhausted one saturates at `max_requests + 1`. The
/// request crossing the ceiling, or the first one over it after the penalty
/// ran out, sets a new penalty and is flagged as opening a violation. Every
/// other request over the ceiling only sees the saturated window.
pub(crate) async fn hit(
	db: &SqlitePool,
	identity: &str,
	policy: &Policy,
	now: Timestamp,
) -> WdResult<WindowHit> {
	let row = sqlx::query(
		"INSERT INTO rl_windows (identity, endpoint, count, window_start, window_end)
		VALUES (?1, ?2, 1, ?3, ?4)
		ON CONFLICT (identity, endpoint) DO UPDATE SET
			count = CASE
				WHEN rl_windows.window_end < ?3 THEN 1
				WHEN rl_windows.count < ?5 THEN rl_windows.count + 1
				ELSE ?5 + 1 END,
			violation = CASE
				WHEN rl_windows.window_end < ?3 THEN 0
				WHEN rl_windows.count < ?5 THEN 0
				WHEN rl_windows.penalty_until > ?3 THEN 0
				ELSE 1 END,
			penalty_until = CASE
				WHEN rl_windows.window_end < ?3 THEN NULL
				WHEN rl_windows.count < ?5 THEN NULL
				WHEN rl_windows.penalty_until > ?3 THEN rl_windows.penalty_until
				ELSE ?6 END,
			window_start = CASE
				WHEN rl_windows.window_end < ?3 THEN ?3
				ELSE rl_windows.window_start END,
			window_end = CASE
				WHEN rl_windows.window_end < ?3 THEN ?4
				ELSE rl_windows.window_end END
		RETURNING identity, endpoint, count, window_start, window_end, penalty_until, violation,
			NULL AS blocked_until",
	)
	.bind(identity)
	.bind(policy.endpoint.as_ref())
	.bind(now.0)
	.bind((now + policy.window).0)
	.bind(i64::from(policy.max_requests))
	.bind((now + policy.base_block).0)
	.fetch_one(db)
	.await
	.inspect_err(inspect)
	.map_err(|_| Error::DbError)?;

	let record = window_from_row(&row).inspect_err(inspect).map_err(|_| Error::DbError)?;
	let violation: bool = row.try_get("violation").inspect_err(inspect).map_err(|_| Error::DbError)?;
	Ok(if record.count > policy.max_requests {
		if violation { WindowHit::Exceeded(record) } else { WindowHit::Saturated(record) }
	} else if record.count == 1 {
		WindowHit::Started(record)
	} else {
		WindowHit::Counted(record)
	})
}

/// Delete elapsed windows which are not covered by an active block
pub(crate) async fn purge(db: &SqlitePool, now: Timestamp) -> WdResult<u64> {
	let res = sqlx::query(
		"DELETE FROM rl_windows WHERE window_end < ?1 AND NOT EXISTS (
			SELECT 1 FROM rl_blocks b
			WHERE b.identity = rl_windows.identity AND b.endpoint IN (rl_windows.endpoint, ?2)
			AND b.blocked_until > ?1)",
	)
	.bind(now.0)
	.bind(WILDCARD_ENDPOINT)
	.execute(db)
	.await
	.inspect_err(inspect)
	.map_err(|_| Error::DbError)?;

	Ok(res.rows_affected())
}

// vim: ts=4
