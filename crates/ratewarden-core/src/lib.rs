//! Rate limit decision engine for ratewarden.
//!
//! Resolves the caller identity of a request, checks it against the
//! blocklist and the windowed policy of the requested endpoint, escalates
//! repeated violations and answers with a verdict. Storage is delegated to a
//! [`RateLimitAdapter`](ratewarden_types::store_adapter::RateLimitAdapter).

#![deny(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![forbid(unsafe_code)]

pub mod prelude;
pub mod rate_limit;

pub use rate_limit::{
	IdentityResolver, PolicyRegistry, RateLimitConfig, RateLimitEngine, RateLimitLayer, Sweeper,
	Verdict,
};

// vim: ts=4
