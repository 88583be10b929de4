//! Rate Limiting API Types
//!
//! Verdicts returned to the calling middleware and status types for
//! operators.

use serde::Serialize;

use ratewarden_types::store_adapter::{BlockEntry, WindowRecord};

use super::error::Denial;
use crate::prelude::*;

/// Terminal state of a decision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DecisionState {
	/// An active block covers the key
	Blocked,
	/// The request was admitted
	WithinLimit,
	/// The request exceeded the window ceiling and the identity got blocked
	LimitExceeded,
}

/// Why a request was admitted without being counted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Unenforced {
	/// The endpoint has no policy
	NoPolicy,
	/// The store failed or timed out
	StoreFault,
	/// CORS preflight
	Preflight,
}

/// Outcome of a rate limit evaluation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verdict {
	pub allowed: bool,
	pub state: DecisionState,
	/// Requests left in the current window
	pub remaining: Option<u32>,
	/// Ceiling of the policy that applied
	pub limit: Option<u32>,
	/// End of the current window, or of the block for a denial
	pub reset_time: Option<Timestamp>,
	pub unenforced: Option<Unenforced>,
	pub deny_response: Option<Denial>,
}

impl Verdict {
	/// Admitted and counted against a window
	pub(crate) fn counted(limit: u32, count: u32, window_end: Timestamp) -> Self {
		Self {
			allowed: true,
			state: DecisionState::WithinLimit,
			remaining: Some(limit.saturating_sub(count)),
			limit: Some(limit),
			reset_time: Some(window_end),
			unenforced: None,
			deny_response: None,
		}
	}

	/// Admitted without counting
	pub(crate) fn unenforced(reason: Unenforced) -> Self {
		Self {
			allowed: true,
			state: DecisionState::WithinLimit,
			remaining: None,
			limit: None,
			reset_time: None,
			unenforced: Some(reason),
			deny_response: None,
		}
	}

	pub(crate) fn denied(
		state: DecisionState,
		limit: Option<u32>,
		blocked_until: Timestamp,
		now: Timestamp,
	) -> Self {
		Self {
			allowed: false,
			state,
			remaining: Some(0),
			limit,
			reset_time: Some(blocked_until),
			unenforced: None,
			deny_response: Some(Denial::new(blocked_until, now)),
		}
	}

	pub fn is_denied(&self) -> bool {
		!self.allowed
	}
}

/// Rate limit state of an (identity, endpoint) key
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitStatus {
	pub identity: Box<str>,
	pub endpoint: Box<str>,
	/// Ceiling of the endpoint policy, if it has one
	pub limit: Option<u32>,
	pub remaining: Option<u32>,
	pub window: Option<WindowRecord>,
	pub block: Option<BlockEntry>,
	/// Violations of the identity in the last 24 hours, on any endpoint
	pub violations: u32,
}

/// Engine counters since startup
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimiterStats {
	pub evaluations: u64,
	pub allowed: u64,
	pub blocked: u64,
	pub exceeded: u64,
	/// Requests admitted without counting (no policy, store fault, preflight)
	pub unenforced: u64,
	pub store_errors: u64,
	pub blocks_issued: u64,
}

// vim: ts=4
