//! Rate limit policies and the violation escalation rules.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::prelude::*;

/// How long violations count towards escalation
pub const VIOLATION_RETENTION: Duration = Duration::from_secs(24 * 3600);

/// Block applied to identities with three or more recent violations
pub const PERSISTENT_ABUSER_BLOCK: Duration = Duration::from_secs(24 * 3600);

/// Rate limit policy of a single logical endpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Policy {
	pub endpoint: Box<str>,
	/// Length of a counting window
	pub window: Duration,
	/// Requests allowed per window
	pub max_requests: u32,
	/// Block applied on a first violation; escalated on repeated ones
	pub base_block: Duration,
}

impl Policy {
	pub fn new(
		endpoint: impl Into<Box<str>>,
		window: Duration,
		max_requests: u32,
		base_block: Duration,
	) -> Self {
		Self { endpoint: endpoint.into(), window, max_requests, base_block }
	}

	pub fn validate(&self) -> WdResult<()> {
		if self.endpoint.trim().is_empty() {
			return Err(Error::ValidationError("policy endpoint cannot be empty".to_string()));
		}
		if self.endpoint.as_ref() == WILDCARD_ENDPOINT {
			return Err(Error::ValidationError(format!(
				"'{}' is reserved for wildcard blocks",
				WILDCARD_ENDPOINT
			)));
		}
		if self.window.is_zero() {
			return Err(Error::ValidationError(format!(
				"policy '{}': window must be non-zero",
				self.endpoint
			)));
		}
		if self.max_requests == 0 {
			return Err(Error::ValidationError(format!(
				"policy '{}': max_requests must be at least 1",
				self.endpoint
			)));
		}
		Ok(())
	}
}

/// Serialized form of a policy, as found in policy files
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyDef {
	pub endpoint: Box<str>,
	pub window_secs: u64,
	pub max_requests: u32,
	pub block_secs: u64,
}

impl From<PolicyDef> for Policy {
	fn from(def: PolicyDef) -> Self {
		Policy {
			endpoint: def.endpoint,
			window: Duration::from_secs(def.window_secs),
			max_requests: def.max_requests,
			base_block: Duration::from_secs(def.block_secs),
		}
	}
}

impl From<&Policy> for PolicyDef {
	fn from(policy: &Policy) -> Self {
		PolicyDef {
			endpoint: policy.endpoint.clone(),
			window_secs: policy.window.as_secs(),
			max_requests: policy.max_requests,
			block_secs: policy.base_block.as_secs(),
		}
	}
}

/// Escalation tier, selected by the number of prior violations in the
/// trailing retention period
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum EscalationTier {
	First,
	Second,
	Third,
	PersistentAbuser,
}

impl EscalationTier {
	pub fn from_prior(prior: u32) -> Self {
		match prior {
			0 => EscalationTier::First,
			1 => EscalationTier::Second,
			2 => EscalationTier::Third,
			_ => EscalationTier::PersistentAbuser,
		}
	}

	/// Block duration of this tier for a policy's base block
	pub fn block_duration(self, base: Duration) -> Duration {
		match self {
			EscalationTier::First => base,
			EscalationTier::Second => base.saturating_mul(3),
			EscalationTier::Third => base.saturating_mul(12),
			// Flat, but never shorter than the tier below
			EscalationTier::PersistentAbuser => PERSISTENT_ABUSER_BLOCK.max(base.saturating_mul(12)),
		}
	}

	pub fn name(self) -> &'static str {
		match self {
			EscalationTier::First => "first",
			EscalationTier::Second => "second",
			EscalationTier::Third => "third",
			EscalationTier::PersistentAbuser => "persistent",
		}
	}
}

/// Block duration for a violation given the count of prior violations
pub fn escalated_block(base: Duration, prior: u32) -> Duration {
	EscalationTier::from_prior(prior).block_duration(base)
}


// vim: ts=4
