//! Error type shared by the engine and the store adapters.

use axum::{Json, http::StatusCode, response::IntoResponse};

pub type WdResult<T> = std::result::Result<T, Error>;

#[derive(Debug)]
pub enum Error {
	NotFound,
	DbError,
	/// A store call did not complete within its time budget
	Timeout,
	ConfigError(String),
	ValidationError(String),
	Parse,

	// externals
	Io(std::io::Error),
}

impl Error {
	/// Whether the error originates from the backing store (as opposed to a
	/// missing record or invalid input)
	pub fn is_store_fault(&self) -> bool {
		matches!(self, Error::DbError | Error::Timeout | Error::Io(_))
	}
}

impl From<std::io::Error> for Error {
	fn from(err: std::io::Error) -> Self {
		Self::Io(err)
	}
}

impl From<serde_json::Error> for Error {
	fn from(err: serde_json::Error) -> Self {
		Self::ConfigError(err.to_string())
	}
}

impl std::fmt::Display for Error {
	fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
		match self {
			Error::NotFound => write!(f, "not found"),
			Error::DbError => write!(f, "database error"),
			Error::Timeout => write!(f, "store call timed out"),
			Error::ConfigError(msg) => write!(f, "configuration error: {}", msg),
			Error::ValidationError(msg) => write!(f, "validation error: {}", msg),
			Error::Parse => write!(f, "parse error"),
			Error::Io(err) => write!(f, "io error: {}", err),
		}
	}
}

impl std::error::Error for Error {
	fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
		match self {
			Error::Io(err) => Some(err),
			_ => None,
		}
	}
}

impl IntoResponse for Error {
	fn into_response(self) -> axum::response::Response {
		let (status, code) = match self {
			Error::NotFound => (StatusCode::NOT_FOUND, "E-NOT-FOUND"),
			Error::ValidationError(_) | Error::Parse => (StatusCode::BAD_REQUEST, "E-VALIDATION"),
			Error::Timeout => (StatusCode::SERVICE_UNAVAILABLE, "E-TIMEOUT"),
			_ => (StatusCode::INTERNAL_SERVER_ERROR, "E-INTERNAL"),
		};
		let body = serde_json::json!({
			"error": {
				"code": code,
				"message": self.to_string(),
			}
		});
		(status, Json(body)).into_response()
	}
}


// vim: ts=4
