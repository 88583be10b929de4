//! Window Counter

use std::sync::Arc;
use std::time::Duration;

use ratewarden_types::policy::Policy;
use ratewarden_types::store_adapter::{RateLimitAdapter, WindowHit, WindowRecord};

use super::lookup::{Lookup, guarded};
use crate::prelude::*;

/// Fixed-window request counters of (identity, endpoint) keys
#[derive(Debug, Clone)]
pub struct WindowCounter {
	store: Arc<dyn RateLimitAdapter>,
	timeout: Duration,
}

impl WindowCounter {
	pub fn new(store: Arc<dyn RateLimitAdapter>, timeout: Duration) -> Self {
		Self { store, timeout }
	}

	/// The live window of a key
	pub async fn get(&self, identity: &str, endpoint: &str, now: Timestamp) -> Lookup<WindowRecord> {
		Lookup::from_result(
			guarded("read_window", self.timeout, self.store.read_window(identity, endpoint, now))
				.await,
		)
	}

	pub async fn start_window(
		&self,
		identity: &str,
		policy: &Policy,
		now: Timestamp,
	) -> WdResult<WindowRecord> {
		guarded(
			"start_window",
			self.timeout,
			self.store.start_window(identity, &policy.endpoint, policy.window, now),
		)
		.await
	}

	pub async fn increment(&self, identity: &str, endpoint: &str, now: Timestamp) -> WdResult<u32> {
		guarded("increment_window", self.timeout, self.store.increment_window(identity, endpoint, now))
			.await
	}

	/// Count a request against the policy of its endpoint
	pub async fn hit(&self, identity: &str, policy: &Policy, now: Timestamp) -> WdResult<WindowHit> {
		guarded("hit_window", self.timeout, self.store.hit_window(identity, policy, now)).await
	}
}

// vim: ts=4
