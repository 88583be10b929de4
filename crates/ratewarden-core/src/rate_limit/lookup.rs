//! Fail-open store access
//!
//! Every store call made on the request path runs under a time budget, and
//! its outcome keeps "the record is not there" apart from "the store could
//! not tell". Both lead to the same decision, but only the latter is a fault.

use std::time::Duration;

use crate::prelude::*;

/// Outcome of a store read on the request path
#[derive(Debug)]
pub enum Lookup<T> {
	Found(T),
	NotFound,
	StoreError(Error),
}

impl<T> Lookup<T> {
	pub fn from_result(res: WdResult<Option<T>>) -> Self {
		match res {
			Ok(Some(value)) => Lookup::Found(value),
			Ok(None) | Err(Error::NotFound) => Lookup::NotFound,
			Err(err) => Lookup::StoreError(err),
		}
	}

	/// The found value. A store error reads as absent.
	pub fn found(self) -> Option<T> {
		match self {
			Lookup::Found(value) => Some(value),
			Lookup::NotFound | Lookup::StoreError(_) => None,
		}
	}

	pub fn is_store_error(&self) -> bool {
		matches!(self, Lookup::StoreError(_))
	}
}

/// Run a store call within `timeout`, logging faults with the operation name
pub(crate) async fn guarded<T>(
	op: &'static str,
	timeout: Duration,
	fut: impl Future<Output = WdResult<T>>,
) -> WdResult<T> {
	match tokio::time::timeout(timeout, fut).await {
		Ok(Ok(value)) => Ok(value),
		Ok(Err(err)) => {
			if err.is_store_fault() {
				warn!("rate limit store fault in {}: {}", op, err);
			}
			Err(err)
		}
		Err(_) => {
			warn!("rate limit store call {} timed out after {:?}", op, timeout);
			Err(Error::Timeout)
		}
	}
}


// vim: ts=4
