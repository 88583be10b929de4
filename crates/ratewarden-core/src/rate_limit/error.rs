//! Rate Limiting Responses
//!
//! The 429 denial sent to a limited caller and the fixed CORS preflight
//! response.

use axum::Json;
use axum::http::{HeaderName, HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};

use ratewarden_types::types::duration_secs_ceil;

use crate::prelude::*;

pub(crate) const X_RATELIMIT_LIMIT: HeaderName = HeaderName::from_static("x-ratelimit-limit");
pub(crate) const X_RATELIMIT_REMAINING: HeaderName =
	HeaderName::from_static("x-ratelimit-remaining");
pub(crate) const X_RATELIMIT_RESET: HeaderName = HeaderName::from_static("x-ratelimit-reset");

/// Denial of a rate limited request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Denial {
	/// Seconds until the block expires, rounded up and at least 1
	pub retry_after: u64,
	/// Block expiry
	pub reset_time: Timestamp,
}

impl Denial {
	pub fn new(blocked_until: Timestamp, now: Timestamp) -> Self {
		let retry_after = duration_secs_ceil(blocked_until.remaining_from(now)).max(1);
		Self { retry_after, reset_time: blocked_until }
	}
}

impl std::fmt::Display for Denial {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "Rate limited, retry after {}s", self.retry_after)
	}
}

impl IntoResponse for Denial {
	fn into_response(self) -> Response {
		let body = serde_json::json!({
			"error": "Too Many Requests",
			"message": "Rate limit exceeded. Please try again later.",
			"retryAfter": self.retry_after,
		});

		let mut response = (StatusCode::TOO_MANY_REQUESTS, Json(body)).into_response();
		let headers = response.headers_mut();
		headers.insert(header::RETRY_AFTER, HeaderValue::from(self.retry_after));
		headers.insert(X_RATELIMIT_REMAINING, HeaderValue::from(0u32));
		headers.insert(X_RATELIMIT_RESET, HeaderValue::from(self.reset_time.as_millis()));
		headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));

		response
	}
}

/// Fixed permissive CORS answer to a preflight request
pub fn preflight_response() -> Response {
	(
		StatusCode::NO_CONTENT,
		[
			(header::ACCESS_CONTROL_ALLOW_ORIGIN, "*"),
			(header::ACCESS_CONTROL_ALLOW_METHODS, "GET, POST, PUT, PATCH, DELETE, OPTIONS"),
			(
				header::ACCESS_CONTROL_ALLOW_HEADERS,
				"authorization, content-type, x-client-info, apikey",
			),
			(header::ACCESS_CONTROL_MAX_AGE, "86400"),
		],
	)
		.into_response()
}

#[cfg(test)]
mod tests {
	use super::*;
	use http_body_util::BodyExt;

	#[test]
	fn test_retry_after_rounding() {
		let now = Timestamp(1_000_000);
		assert_eq!(Denial::new(Timestamp(1_120_000), now).retry_after, 120);
		assert_eq!(Denial::new(Timestamp(1_000_001), now).retry_after, 1);
		assert_eq!(Denial::new(Timestamp(1_001_500), now).retry_after, 2);
		// Never zero or negative, even for a block expiring right now
		assert_eq!(Denial::new(now, now).retry_after, 1);
		assert_eq!(Denial::new(Timestamp(0), now).retry_after, 1);
	}

	#[tokio::test]
	async fn test_denial_response() {
		let response = Denial::new(Timestamp(1_120_000), Timestamp(1_000_000)).into_response();
		assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);

		let headers = response.headers();
		assert_eq!(headers[header::RETRY_AFTER], "120");
		assert_eq!(headers["x-ratelimit-remaining"], "0");
		assert_eq!(headers["x-ratelimit-reset"], "1120000");
		assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");

		let body = response.into_body().collect().await.unwrap().to_bytes();
		let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
		assert_eq!(json["error"], "Too Many Requests");
		assert_eq!(json["retryAfter"], 120);
		assert!(json["message"].is_string());
	}

	#[test]
	fn test_preflight_response() {
		let response = preflight_response();
		assert_eq!(response.status(), StatusCode::NO_CONTENT);
		assert_eq!(response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");
		assert!(response.headers().contains_key(header::ACCESS_CONTROL_ALLOW_METHODS));
	}
}

// vim: ts=4
