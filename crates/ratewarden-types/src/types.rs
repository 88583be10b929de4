//! Common types used throughout ratewarden.

use serde::{Deserialize, Serialize};
use std::time::{Duration, SystemTime};

/// Identity shared by every caller whose address could not be resolved
pub const UNKNOWN_IDENTITY: &str = "unknown";

/// Endpoint value of a block entry that applies to every endpoint
pub const WILDCARD_ENDPOINT: &str = "*";

/// Default number of (identity, endpoint) windows an in-process store tracks
pub const DEFAULT_MAX_TRACKED_KEYS: usize = 100_000;

// Timestamp //
//***********//
/// Unix epoch timestamp in milliseconds
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp(pub i64);

impl Timestamp {
	pub fn now() -> Timestamp {
		let millis = SystemTime::now()
			.duration_since(SystemTime::UNIX_EPOCH)
			.map(|d| i64::try_from(d.as_millis()).unwrap_or(i64::MAX))
			.unwrap_or_default();
		Timestamp(millis)
	}

	pub fn from_secs(secs: i64) -> Timestamp {
		Timestamp(secs.saturating_mul(1000))
	}

	pub fn as_millis(self) -> i64 {
		self.0
	}

	pub fn as_secs(self) -> i64 {
		self.0.div_euclid(1000)
	}

	/// Time remaining from `now` until `self`, zero if `self` is in the past
	pub fn remaining_from(self, now: Timestamp) -> Duration {
		u64::try_from(self.0.saturating_sub(now.0)).map(Duration::from_millis).unwrap_or_default()
	}
}

impl std::ops::Add<Duration> for Timestamp {
	type Output = Timestamp;

	fn add(self, duration: Duration) -> Timestamp {
		Timestamp(self.0.saturating_add(duration_millis(duration)))
	}
}

impl std::ops::Sub<Duration> for Timestamp {
	type Output = Timestamp;

	fn sub(self, duration: Duration) -> Timestamp {
		Timestamp(self.0.saturating_sub(duration_millis(duration)))
	}
}

impl std::fmt::Display for Timestamp {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "{}", self.0)
	}
}

impl Serialize for Timestamp {
	fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
	where
		S: serde::Serializer,
	{
		serializer.serialize_i64(self.0)
	}
}

impl<'de> Deserialize<'de> for Timestamp {
	fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
	where
		D: serde::Deserializer<'de>,
	{
		Ok(Timestamp(i64::deserialize(deserializer)?))
	}
}

/// Duration in whole milliseconds, saturating at `i64::MAX`
pub fn duration_millis(duration: Duration) -> i64 {
	i64::try_from(duration.as_millis()).unwrap_or(i64::MAX)
}

/// Duration in whole seconds, rounded up
pub fn duration_secs_ceil(duration: Duration) -> u64 {
	let secs = duration.as_secs();
	if duration.subsec_nanos() > 0 { secs + 1 } else { secs }
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_timestamp_arithmetic() {
		let ts = Timestamp::from_secs(100);
		assert_eq!(ts.as_millis(), 100_000);
		assert_eq!(ts + Duration::from_secs(60), Timestamp::from_secs(160));
		assert_eq!(ts - Duration::from_millis(500), Timestamp(99_500));
		assert_eq!(ts.as_secs(), 100);
	}

	#[test]
	fn test_remaining_from_never_negative() {
		let until = Timestamp::from_secs(10);
		assert_eq!(until.remaining_from(Timestamp::from_secs(4)), Duration::from_secs(6));
		assert_eq!(until.remaining_from(Timestamp::from_secs(11)), Duration::ZERO);
	}

	#[test]
	fn test_duration_secs_ceil() {
		assert_eq!(duration_secs_ceil(Duration::from_millis(1)), 1);
		assert_eq!(duration_secs_ceil(Duration::from_millis(1000)), 1);
		assert_eq!(duration_secs_ceil(Duration::from_millis(1001)), 2);
		assert_eq!(duration_secs_ceil(Duration::ZERO), 0);
	}

	#[test]
	fn test_timestamp_serde() {
		let json = serde_json::to_string(&Timestamp(42)).unwrap();
		assert_eq!(json, "42");
		let ts: Timestamp = serde_json::from_str("1700000000000").unwrap();
		assert_eq!(ts, Timestamp(1_700_000_000_000));
	}
}

// vim: ts=4
