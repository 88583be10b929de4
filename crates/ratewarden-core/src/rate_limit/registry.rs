//! Policy Registry
//!
//! Static table of endpoint policies, loaded once at startup. Endpoints
//! without a policy are not rate limited.

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use ratewarden_types::policy::{Policy, PolicyDef};

use crate::prelude::*;

const MINUTE: u64 = 60;

/// (endpoint, window, max requests, base block) in seconds
const DEFAULT_POLICIES: &[(&str, u64, u32, u64)] = &[
	// Credential endpoints: slow windows, long blocks
	("auth-login", 15 * MINUTE, 5, 15 * MINUTE),
	("auth-signup", 15 * MINUTE, 3, 60 * MINUTE),
	("auth-password-reset", 15 * MINUTE, 3, 30 * MINUTE),
	("auth-mfa-verify", 15 * MINUTE, 5, 5 * MINUTE),
	// Integration proxies
	("payroll-sync", MINUTE, 20, 10 * MINUTE),
	("accounting-sync", MINUTE, 30, 5 * MINUTE),
	("delivery-proxy", MINUTE, 60, 2 * MINUTE),
	("pos-proxy", MINUTE, 100, 2 * MINUTE),
	("webhook", MINUTE, 300, 2 * MINUTE),
];

#[derive(Debug, Clone)]
pub struct PolicyRegistry {
	policies: HashMap<Box<str>, Policy>,
}

impl PolicyRegistry {
	/// Build a registry, validating every policy. Duplicate endpoints are
	/// rejected.
	pub fn new(policies: impl IntoIterator<Item = Policy>) -> WdResult<Self> {
		let mut map = HashMap::new();
		for policy in policies {
			policy.validate()?;
			if map.contains_key(&policy.endpoint) {
				return Err(Error::ConfigError(format!(
					"duplicate policy for endpoint '{}'",
					policy.endpoint
				)));
			}
			map.insert(policy.endpoint.clone(), policy);
		}
		Ok(Self { policies: map })
	}

	/// Parse a JSON array of policy definitions
	pub fn from_json(json: &str) -> WdResult<Self> {
		let defs: Vec<PolicyDef> = serde_json::from_str(json)?;
		Self::new(defs.into_iter().map(Policy::from))
	}

	/// Load a policy file
	pub async fn load(path: impl AsRef<Path>) -> WdResult<Self> {
		let json = tokio::fs::read_to_string(path.as_ref()).await?;
		let registry = Self::from_json(&json)?;
		info!("loaded {} rate limit policies from {}", registry.len(), path.as_ref().display());
		Ok(registry)
	}

	pub fn lookup(&self, endpoint: &str) -> Option<&Policy> {
		self.policies.get(endpoint)
	}

	pub fn iter(&self) -> impl Iterator<Item = &Policy> {
		self.policies.values()
	}

	/// Endpoint names in alphabetical order
	pub fn endpoints(&self) -> Vec<&str> {
		let mut endpoints: Vec<&str> = self.policies.keys().map(AsRef::as_ref).collect();
		endpoints.sort_unstable();
		endpoints
	}

	pub fn len(&self) -> usize {
		self.policies.len()
	}

	pub fn is_empty(&self) -> bool {
		self.policies.is_empty()
	}
}

impl Default for PolicyRegistry {
	fn default() -> Self {
		let policies = DEFAULT_POLICIES
			.iter()
			.map(|&(endpoint, window, max_requests, block)| {
				let policy = Policy::new(
					endpoint,
					Duration::from_secs(window),
					max_requests,
					Duration::from_secs(block),
				);
				(policy.endpoint.clone(), policy)
			})
			.collect();
		Self { policies }
	}
}


// vim: ts=4
