//! Violation Ledger
//!
//! Identity-scoped: violations on any endpoint count towards the same
//! escalation.

use std::sync::Arc;
use std::time::Duration;

use ratewarden_types::policy::Policy;
use ratewarden_types::store_adapter::{
	NewViolation, RateLimitAdapter, ViolationOutcome, ViolationRecord,
};

use super::lookup::guarded;
use crate::prelude::*;

#[derive(Debug, Clone)]
pub struct ViolationLedger {
	store: Arc<dyn RateLimitAdapter>,
	timeout: Duration,
}

impl ViolationLedger {
	pub fn new(store: Arc<dyn RateLimitAdapter>, timeout: Duration) -> Self {
		Self { store, timeout }
	}

	/// Record a violation of `policy` and return the prior violation count
	/// with the escalated block duration
	pub async fn record_violation(
		&self,
		identity: &str,
		policy: &Policy,
		requests_count: u32,
		now: Timestamp,
	) -> WdResult<ViolationOutcome> {
		let violation = NewViolation {
			identity,
			endpoint: &policy.endpoint,
			requests_count,
			base_block: policy.base_block,
		};
		guarded("record_violation", self.timeout, self.store.record_violation(&violation, now)).await
	}

	/// Violations of an identity in the retention period
	pub async fn violations(&self, identity: &str, now: Timestamp) -> WdResult<ViolationRecord> {
		guarded("read_violations", self.timeout, self.store.read_violations(identity, now)).await
	}
}

// vim: ts=4
