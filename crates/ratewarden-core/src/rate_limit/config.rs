//! Rate Limiting Configuration

use std::time::Duration;

/// Default time budget of a single store call
pub const DEFAULT_STORE_TIMEOUT: Duration = Duration::from_millis(250);

/// Default interval of the maintenance sweeper
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(5 * 60);

pub use ratewarden_types::types::DEFAULT_MAX_TRACKED_KEYS;

/// Main rate limit configuration
#[derive(Clone, Debug)]
pub struct RateLimitConfig {
	/// Time budget of a single store call. A call running longer is treated
	/// as a store fault.
	pub store_timeout: Duration,
	/// How often expired records are purged
	pub sweep_interval: Duration,
	/// Maximum number of (identity, endpoint) windows kept by the in-memory store
	pub max_tracked_keys: usize,
	/// Fall back to the socket peer address when no forwarding header is present
	pub trust_peer_addr: bool,
}

impl Default for RateLimitConfig {
	fn default() -> Self {
		Self {
			store_timeout: DEFAULT_STORE_TIMEOUT,
			sweep_interval: DEFAULT_SWEEP_INTERVAL,
			max_tracked_keys: DEFAULT_MAX_TRACKED_KEYS,
			trust_peer_addr: false,
		}
	}
}

// vim: ts=4
