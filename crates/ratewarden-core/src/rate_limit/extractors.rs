//! Identity Resolver
//!
//! Derives the rate limit partition key of a request from the headers set by
//! the fronting proxies.

use std::net::SocketAddr;

use axum::extract::ConnectInfo;
use hyper::Request;

use crate::prelude::*;

/// Single-hop header set by the CDN edge
const CF_CONNECTING_IP: &str = "cf-connecting-ip";
const X_REAL_IP: &str = "x-real-ip";
const X_FORWARDED_FOR: &str = "x-forwarded-for";

/// Resolves the caller identity of a request. Never fails: callers without a
/// resolvable address share the [`UNKNOWN_IDENTITY`] bucket.
#[derive(Clone, Copy, Debug, Default)]
pub struct IdentityResolver {
	trust_peer_addr: bool,
}

impl IdentityResolver {
	/// With `trust_peer_addr` the socket peer address is used when no
	/// forwarding header is present (the server has to be started with
	/// connect info for this).
	pub fn new(trust_peer_addr: bool) -> Self {
		Self { trust_peer_addr }
	}

	pub fn resolve<B>(&self, req: &Request<B>) -> Box<str> {
		header_value(req, CF_CONNECTING_IP)
			.or_else(|| header_value(req, X_REAL_IP))
			.or_else(|| first_forwarded(req))
			.map(Box::<str>::from)
			.or_else(|| if self.trust_peer_addr { peer_addr(req) } else { None })
			.unwrap_or_else(|| UNKNOWN_IDENTITY.into())
	}
}

/// Trimmed, non-empty value of a header
fn header_value<'a, B>(req: &'a Request<B>, name: &str) -> Option<&'a str> {
	req.headers()
		.get(name)
		.and_then(|h| h.to_str().ok())
		.map(str::trim)
		.filter(|s| !s.is_empty())
}

/// Leftmost entry of X-Forwarded-For ("client, proxy1, proxy2")
fn first_forwarded<B>(req: &Request<B>) -> Option<&str> {
	header_value(req, X_FORWARDED_FOR)
		.and_then(|s| s.split(',').next())
		.map(str::trim)
		.filter(|s| !s.is_empty())
}

fn peer_addr<B>(req: &Request<B>) -> Option<Box<str>> {
	req.extensions()
		.get::<ConnectInfo<SocketAddr>>()
		.map(|ci| ci.0.ip().to_string().into())
}


// vim: ts=4
