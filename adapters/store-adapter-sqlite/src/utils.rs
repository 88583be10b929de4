//! Utility functions for database operations

use sqlx::Row;
use sqlx::sqlite::SqliteRow;

use ratewarden_types::prelude::*;

/// Log database errors
pub(crate) fn inspect(err: &sqlx::Error) {
	warn!("DB: {:#?}", err);
}

/// Read a non-negative integer column as `u32`
pub(crate) fn get_u32(row: &SqliteRow, column: &str) -> Result<u32, sqlx::Error> {
	let value: i64 = row.try_get(column)?;
	u32::try_from(value).map_err(|err| sqlx::Error::ColumnDecode {
		index: column.to_string(),
		source: Box::new(err),
	})
}

// vim: ts=4
