//! Blocklist

use std::sync::Arc;
use std::time::Duration;

use ratewarden_types::store_adapter::{BlockEntry, RateLimitAdapter};

use super::lookup::{Lookup, guarded};
use crate::prelude::*;

/// Time-bounded deny rules per identity, for one endpoint or all of them
#[derive(Debug, Clone)]
pub struct Blocklist {
	store: Arc<dyn RateLimitAdapter>,
	timeout: Duration,
}

impl Blocklist {
	pub fn new(store: Arc<dyn RateLimitAdapter>, timeout: Duration) -> Self {
		Self { store, timeout }
	}

	/// The active block covering `(identity, endpoint)` that expires last,
	/// wildcard blocks included
	pub async fn is_blocked(&self, identity: &str, endpoint: &str, now: Timestamp) -> Lookup<BlockEntry> {
		Lookup::from_result(
			guarded("read_block", self.timeout, self.store.read_block(identity, endpoint, now)).await,
		)
	}

	/// Block an identity until `now + duration`. An active block of the same
	/// key expiring later stays in effect and is returned instead.
	/// `endpoint: None` blocks every endpoint.
	pub async fn block(
		&self,
		identity: &str,
		endpoint: Option<&str>,
		duration: Duration,
		reason: &str,
		now: Timestamp,
	) -> WdResult<BlockEntry> {
		let entry = BlockEntry {
			identity: identity.into(),
			endpoint: endpoint.map(Into::into),
			blocked_until: now + duration,
			reason: reason.into(),
			created_at: now,
		};
		guarded("upsert_block", self.timeout, self.store.upsert_block(&entry)).await
	}

	pub async fn unblock(&self, identity: &str, endpoint: Option<&str>) -> WdResult<()> {
		guarded("delete_block", self.timeout, self.store.delete_block(identity, endpoint)).await
	}

	pub async fn list(&self, now: Timestamp) -> WdResult<Vec<BlockEntry>> {
		guarded("list_blocks", self.timeout, self.store.list_blocks(now)).await
	}
}

// vim: ts=4
