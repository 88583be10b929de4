//! Rate Limiting Middleware
//!
//! Tower middleware layer applying the policy of one logical endpoint to an
//! Axum route.

use std::sync::Arc;
use std::task::{Context, Poll};

use axum::body::Body;
use axum::http::{HeaderMap, HeaderValue};
use axum::response::IntoResponse;
use futures::future::BoxFuture;
use hyper::Request;
use tower::{Layer, Service};

use super::api::{Unenforced, Verdict};
use super::engine::RateLimitEngine;
use super::error::{X_RATELIMIT_LIMIT, X_RATELIMIT_REMAINING, X_RATELIMIT_RESET, preflight_response};

/// Rate limit middleware layer
#[derive(Clone)]
pub struct RateLimitLayer {
	engine: Arc<RateLimitEngine>,
	endpoint: Arc<str>,
}

impl RateLimitLayer {
	/// Create a rate limit layer for a logical endpoint
	pub fn new(engine: Arc<RateLimitEngine>, endpoint: impl Into<Arc<str>>) -> Self {
		Self { engine, endpoint: endpoint.into() }
	}
}

impl<S> Layer<S> for RateLimitLayer {
	type Service = RateLimitService<S>;

	fn layer(&self, inner: S) -> Self::Service {
		RateLimitService {
			inner,
			engine: self.engine.clone(),
			endpoint: self.endpoint.clone(),
		}
	}
}

/// Rate limit middleware service
#[derive(Clone)]
pub struct RateLimitService<S> {
	inner: S,
	engine: Arc<RateLimitEngine>,
	endpoint: Arc<str>,
}

impl<S> Service<Request<Body>> for RateLimitService<S>
where
	S: Service<Request<Body>, Response = axum::response::Response> + Clone + Send + 'static,
	S::Future: Send + 'static,
{
	type Response = S::Response;
	type Error = S::Error;
	type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

	fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
		self.inner.poll_ready(cx)
	}

	fn call(&mut self, req: Request<Body>) -> Self::Future {
		let engine = self.engine.clone();
		let endpoint = self.endpoint.clone();
		let mut inner = self.inner.clone();

		Box::pin(async move {
			let pending = engine.evaluate(&req, &endpoint);
			let mut verdict = pending.await;

			// Preflight never reaches the handler
			if verdict.unenforced == Some(Unenforced::Preflight) {
				return Ok(preflight_response());
			}
			if let Some(denial) = verdict.deny_response.take() {
				return Ok(denial.into_response());
			}

			let mut response = inner.call(req).await?;
			add_limit_headers(response.headers_mut(), &verdict);
			Ok(response)
		})
	}
}

/// Tell an admitted caller where it stands in its window
fn add_limit_headers(headers: &mut HeaderMap, verdict: &Verdict) {
	if let (Some(limit), Some(remaining), Some(reset)) =
		(verdict.limit, verdict.remaining, verdict.reset_time)
	{
		headers.insert(X_RATELIMIT_LIMIT, HeaderValue::from(limit));
		headers.insert(X_RATELIMIT_REMAINING, HeaderValue::from(remaining));
		headers.insert(X_RATELIMIT_RESET, HeaderValue::from(reset.as_millis()));
	}
}

// vim: ts=4
